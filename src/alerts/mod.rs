//! Alert evaluator (spec §4.8): given a freshly meta-analysed window, fires
//! or resolves notifications per rule via the four-transition state machine.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cron::Schedule;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::domain::{
    AlertHistory, AlertState, Criterion, EffectiveScore, NotificationChannel, NotificationRule,
    RuleTriggerKind,
};
use crate::error::AlertError;
use crate::repository::Repositories;

/// The payload handed to an external channel on fire or resolve (spec §6.5).
#[derive(Debug, Clone)]
pub struct DispatchPayload {
    pub title: String,
    pub body: String,
    pub severity: &'static str,
    pub variant: AlertState,
    pub system_name: String,
    pub criterion: Criterion,
}

/// The external notification surface. The adapter owns retries; this
/// evaluator only decides whether and what to dispatch.
#[async_trait]
pub trait ChannelDispatcher: Send + Sync {
    async fn dispatch(
        &self,
        channel: &NotificationChannel,
        payload: &DispatchPayload,
    ) -> Result<(), AlertError>;
}

/// Posts the payload as JSON to the URL in `channel.config["url"]`, with
/// `env:VAR_NAME` secret fields resolved from the process environment first.
pub struct WebhookDispatcher {
    http: reqwest::Client,
}

impl WebhookDispatcher {
    pub fn new() -> Self {
        Self { http: reqwest::Client::new() }
    }
}

impl Default for WebhookDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelDispatcher for WebhookDispatcher {
    async fn dispatch(
        &self,
        channel: &NotificationChannel,
        payload: &DispatchPayload,
    ) -> Result<(), AlertError> {
        let resolved = resolve_env_secrets(&channel.config);
        let url = resolved
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AlertError::Dispatch(format!("channel {} has no url", channel.id)))?;

        let body = serde_json::json!({
            "title": payload.title,
            "body": payload.body,
            "severity": payload.severity,
            "variant": match payload.variant {
                AlertState::Firing => "firing",
                AlertState::Resolved => "resolved",
            },
            "system_name": payload.system_name,
            "criterion": payload.criterion.slug(),
        });

        self.http
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AlertError::Dispatch(e.to_string()))?;
        Ok(())
    }
}

/// Resolves every top-level string value of the form `env:VAR_NAME` in a
/// channel config object against the process environment. Values that
/// don't match the pattern, or whose variable is unset, pass through
/// unchanged (missing secrets surface as a dispatch failure downstream,
/// never as a silently empty string baked into the config).
pub fn resolve_env_secrets(config: &serde_json::Value) -> serde_json::Value {
    match config {
        serde_json::Value::Object(map) => {
            let mut resolved = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                resolved.insert(k.clone(), resolve_env_secrets(v));
            }
            serde_json::Value::Object(resolved)
        }
        serde_json::Value::String(s) => {
            if let Some(var_name) = s.strip_prefix("env:") {
                match std::env::var(var_name) {
                    Ok(value) => serde_json::Value::String(value),
                    Err(_) => {
                        warn!(var = var_name, "referenced env secret is unset");
                        config.clone()
                    }
                }
            } else {
                config.clone()
            }
        }
        other => other.clone(),
    }
}

pub struct AlertEvaluator {
    repos: Repositories,
    dispatcher: Arc<dyn ChannelDispatcher>,
}

impl AlertEvaluator {
    pub fn new(repos: Repositories, dispatcher: Arc<dyn ChannelDispatcher>) -> Self {
        Self { repos, dispatcher }
    }

    /// Evaluates every enabled rule against one window's freshly written
    /// effective scores. A failed rule is logged and skipped; it never
    /// blocks the remaining rules (spec §4.8 failure isolation).
    #[instrument(skip(self, system_name, effective_scores))]
    pub async fn evaluate_window(
        &self,
        system_id: Uuid,
        system_name: &str,
        effective_scores: &[EffectiveScore],
    ) -> Result<(), AlertError> {
        let now = Utc::now();
        let rules = self.repos.alerts.enabled_rules().await?;
        let silences = self.repos.alerts.active_silences(now).await?;

        for rule in &rules {
            if !rule.trigger_config.systems.is_empty()
                && !rule.trigger_config.systems.contains(&system_id)
            {
                continue;
            }
            if let Err(e) = self
                .evaluate_rule(rule, system_id, system_name, effective_scores, &silences, now)
                .await
            {
                warn!(rule_id = %rule.id, error = %e, "alert rule evaluation failed");
            }
        }
        Ok(())
    }

    async fn evaluate_rule(
        &self,
        rule: &NotificationRule,
        system_id: Uuid,
        system_name: &str,
        effective_scores: &[EffectiveScore],
        silences: &[crate::domain::Silence],
        now: DateTime<Utc>,
    ) -> Result<(), AlertError> {
        let Some((criterion, triggering_value, crossed)) =
            self.compute_trigger(rule, system_id, effective_scores, now)?
        else {
            return Ok(());
        };

        let previous = self
            .repos
            .alerts
            .last_history(rule.id, system_id, criterion)
            .await?;
        let previous_state = previous.as_ref().map(|h| h.state).unwrap_or(AlertState::Resolved);

        let channel = self.repos.alerts.get_channel(rule.channel_id).await?;

        match (previous_state, crossed) {
            (AlertState::Resolved, true) => {
                self.transition(
                    rule,
                    system_id,
                    system_name,
                    criterion,
                    triggering_value,
                    AlertState::Firing,
                    channel.as_ref(),
                    silences,
                    now,
                )
                .await?;
            }
            (AlertState::Firing, true) => {
                let throttled = previous
                    .as_ref()
                    .map(|h| (now - h.created_at).num_seconds() < rule.throttle_interval_seconds)
                    .unwrap_or(false);
                if !throttled && !rule.notify_only_on_state_change {
                    self.transition(
                        rule,
                        system_id,
                        system_name,
                        criterion,
                        triggering_value,
                        AlertState::Firing,
                        channel.as_ref(),
                        silences,
                        now,
                    )
                    .await?;
                }
            }
            (AlertState::Firing, false) => {
                self.transition(
                    rule,
                    system_id,
                    system_name,
                    criterion,
                    triggering_value,
                    AlertState::Resolved,
                    channel.as_ref(),
                    silences,
                    now,
                )
                .await?;
            }
            (AlertState::Resolved, false) => {}
        }

        Ok(())
    }

    /// Returns `(criterion, triggering_value, crossed)` for a rule, or
    /// `None` if the rule's trigger doesn't apply to this evaluation.
    fn compute_trigger(
        &self,
        rule: &NotificationRule,
        system_id: Uuid,
        effective_scores: &[EffectiveScore],
        now: DateTime<Utc>,
    ) -> Result<Option<(Criterion, f64, bool)>, AlertError> {
        match rule.trigger_config.kind {
            RuleTriggerKind::Threshold => {
                let Some(criterion) = rule.trigger_config.criterion else { return Ok(None) };
                let Some(min_score) = rule.trigger_config.min_score else { return Ok(None) };
                let Some(score) = effective_scores
                    .iter()
                    .find(|s| s.system_id == system_id && s.criterion == criterion)
                else {
                    return Ok(None);
                };
                Ok(Some((criterion, score.effective_value, score.effective_value >= min_score)))
            }
            RuleTriggerKind::Schedule => {
                let Some(expr) = rule.trigger_config.cron_expression.as_deref() else {
                    return Ok(None);
                };
                let schedule = Schedule::from_str(expr)
                    .map_err(|e| AlertError::InvalidCron(e.to_string()))?;
                let matched = schedule.includes(now);
                // Schedule rules have no inherent criterion; anomaly stands
                // in as the nominal axis for history bookkeeping.
                Ok(Some((Criterion::Anomaly, if matched { 1.0 } else { 0.0 }, matched)))
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn transition(
        &self,
        rule: &NotificationRule,
        system_id: Uuid,
        system_name: &str,
        criterion: Criterion,
        triggering_value: f64,
        new_state: AlertState,
        channel: Option<&NotificationChannel>,
        silences: &[crate::domain::Silence],
        now: DateTime<Utc>,
    ) -> Result<(), AlertError> {
        let suppressed = silences.iter().any(|s| {
            s.is_active(now) && s.matches(system_id, criterion, rule.id)
        });

        let should_dispatch = match new_state {
            AlertState::Firing => true,
            AlertState::Resolved => rule.send_recovery,
        };

        let dispatched = if suppressed || !should_dispatch {
            false
        } else if let Some(channel) = channel {
            let payload = DispatchPayload {
                title: format!("{} {}", rule.name, match new_state {
                    AlertState::Firing => "firing",
                    AlertState::Resolved => "resolved",
                }),
                body: format!(
                    "{system_name}: {} = {triggering_value:.3}",
                    criterion.slug()
                ),
                severity: severity_for(new_state),
                variant: new_state,
                system_name: system_name.to_string(),
                criterion,
            };
            match self.dispatcher.dispatch(channel, &payload).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(rule_id = %rule.id, error = %e, "channel dispatch failed");
                    false
                }
            }
        } else {
            warn!(rule_id = %rule.id, "rule has no resolvable channel");
            false
        };

        self.repos
            .alerts
            .record_history(&AlertHistory {
                id: Uuid::new_v4(),
                rule_id: rule.id,
                system_id,
                criterion,
                state: new_state,
                triggering_value,
                created_at: now,
                dispatched,
                suppressed_by_silence: suppressed,
            })
            .await?;

        Ok(())
    }
}

fn severity_for(state: AlertState) -> &'static str {
    match state {
        AlertState::Firing => "warning",
        AlertState::Resolved => "info",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_env_secrets_substitutes_present_var() {
        std::env::set_var("LOGRISK_TEST_SECRET", "shh");
        let config = serde_json::json!({"token": "env:LOGRISK_TEST_SECRET", "url": "https://example.com"});
        let resolved = resolve_env_secrets(&config);
        assert_eq!(resolved["token"], "shh");
        assert_eq!(resolved["url"], "https://example.com");
        std::env::remove_var("LOGRISK_TEST_SECRET");
    }

    #[test]
    fn resolve_env_secrets_leaves_unset_var_untouched() {
        std::env::remove_var("LOGRISK_TEST_MISSING");
        let config = serde_json::json!({"token": "env:LOGRISK_TEST_MISSING"});
        let resolved = resolve_env_secrets(&config);
        assert_eq!(resolved["token"], "env:LOGRISK_TEST_MISSING");
    }
}
