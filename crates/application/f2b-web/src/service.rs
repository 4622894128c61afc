//! What the handlers ask of the daemon, in live or demo mode.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use f2b_actionlog::{LogQuery, NewEntry};
use f2b_core::{validate_address, validate_jail_name, ActionKind, ActionLogEntry, Jail, StatusSnapshot};
use f2b_demo::{DemoData, DemoGenerator};
use f2b_exec::ExecError;
use f2b_parse::{attach_ban_times, parse_banned_with_time, parse_jail_list, parse_jail_status};
use f2b_stats::{floor_hour, snapshot, TIMELINE_HOURS};
use futures::future::join_all;
use serde::Serialize;

use crate::error::ApiError;
use crate::state::AppState;

pub const DEFAULT_LOG_LIMIT: usize = 100;
pub const MAX_LOG_LIMIT: usize = 1000;

/// Result of a ban/unban request.
///
/// A failed dispatch is still an `ActionOutcome` (not an [`ApiError`]) so the
/// caller learns whether the failure itself was logged.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionOutcome {
    /// `ok` or `error`.
    pub status: &'static str,
    pub action: ActionKind,
    pub jail: String,
    pub ip: String,
    pub message: String,
    pub demo: bool,
    pub logged: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry: Option<ActionLogEntry>,
}

impl ActionOutcome {
    pub fn succeeded(&self) -> bool {
        self.status == "ok"
    }
}

fn done_message(action: ActionKind, jail: &str, ip: &str) -> String {
    match action {
        ActionKind::Ban => format!("Banned {ip} in {jail}"),
        ActionKind::Unban => format!("Unbanned {ip} from {jail}"),
    }
}

impl AppState {
    pub fn demo_data(&self, now: DateTime<Utc>) -> DemoData {
        self.demo_seed
            .map_or_else(|| DemoGenerator::for_hour(now), DemoGenerator::new)
            .generate(now)
    }

    pub async fn jail_names(&self) -> Result<Vec<String>, ExecError> {
        let output = self.client.status().await?;
        Ok(parse_jail_list(&output))
    }

    /// One jail's counters and bans, with ban times when the daemon can
    /// report them.
    async fn fetch_jail(&self, name: &str) -> Result<Jail, ExecError> {
        let output = self.client.jail_status(name).await?;
        let mut jail = parse_jail_status(name, &output);

        if jail.currently_banned() > 0 {
            match self.client.banned_with_time(name).await {
                Ok(output) => {
                    let attached = attach_ban_times(&mut jail, &parse_banned_with_time(&output));
                    tracing::debug!(jail = name, attached, "ban times attached");
                }
                Err(e) => tracing::debug!(jail = name, error = %e, "ban times unavailable"),
            }
        }
        Ok(jail)
    }

    /// Every jail the daemon lists, fetched concurrently. A jail whose status
    /// cannot be read is left out.
    pub async fn live_jails(&self) -> Result<Vec<Jail>, ApiError> {
        let names = self.jail_names().await?;
        let results = join_all(names.iter().map(|name| self.fetch_jail(name))).await;

        let mut jails = Vec::with_capacity(names.len());
        for (name, result) in names.iter().zip(results) {
            match result {
                Ok(jail) => jails.push(jail),
                Err(e) => tracing::warn!(jail = %name, error = %e, "skipping jail"),
            }
        }
        Ok(jails)
    }

    pub async fn status(&self) -> Result<StatusSnapshot, ApiError> {
        self.status_at(Utc::now()).await
    }

    pub async fn status_at(&self, now: DateTime<Utc>) -> Result<StatusSnapshot, ApiError> {
        if self.is_demo() {
            let data = self.demo_data(now);
            return Ok(snapshot(self.mode, data.jails, &data.ban_events, now));
        }

        let jails = self.live_jails().await?;
        let since = floor_hour(now) - Duration::hours(TIMELINE_HOURS as i64 - 1);
        let events = match self.log.ban_times_since(since).await {
            Ok(events) => events,
            Err(e) => {
                tracing::warn!(error = %e, "action log unreadable, timeline left empty");
                Vec::new()
            }
        };
        Ok(snapshot(self.mode, jails, &events, now))
    }

    pub async fn jail(&self, name: &str) -> Result<Jail, ApiError> {
        let name = validate_jail_name(name)?;
        let not_found = || ApiError::NotFound(format!("Jail '{name}' not found"));

        if self.is_demo() {
            return self
                .demo_data(Utc::now())
                .jails
                .into_iter()
                .find(|j| j.name() == name)
                .ok_or_else(not_found);
        }

        if !self.jail_names().await?.iter().any(|n| n == name) {
            return Err(not_found());
        }
        Ok(self.fetch_jail(name).await?)
    }

    /// Validate, dispatch, record the outcome.
    ///
    /// Only validation errors come back as `Err`. Dispatch failures are an
    /// outcome with status `error`; a log write failure never changes the
    /// reported outcome. Once validated, the dispatch and its log entry run
    /// on their own task and finish even if the request is dropped.
    pub async fn apply(
        self: &Arc<Self>,
        action: ActionKind,
        jail: &str,
        ip: &str,
    ) -> Result<ActionOutcome, ApiError> {
        let jail = validate_jail_name(jail)?.to_string();
        let ip = validate_address(ip)?.to_string();

        if self.is_demo() {
            let message = match action {
                ActionKind::Ban => format!("[DEMO] Would ban {ip} in {jail}"),
                ActionKind::Unban => format!("[DEMO] Would unban {ip} from {jail}"),
            };
            return Ok(ActionOutcome {
                status: "ok",
                action,
                jail,
                ip,
                message,
                demo: true,
                logged: false,
                log_error: None,
                error: None,
                entry: None,
            });
        }

        let state = Arc::clone(self);
        tokio::spawn(async move { state.dispatch_and_log(action, jail, ip).await })
            .await
            .map_err(|e| ApiError::Internal(format!("action task failed: {e}")))
    }

    async fn dispatch_and_log(&self, action: ActionKind, jail: String, ip: String) -> ActionOutcome {
        let (new_entry, message, error) = match self.client.apply(action, &jail, &ip).await {
            Ok(_) => {
                tracing::info!(%action, %jail, %ip, "action applied");
                (
                    NewEntry::success(action, &jail, &ip),
                    done_message(action, &jail, &ip),
                    None,
                )
            }
            Err(e) => {
                let reason = e.to_string();
                tracing::warn!(%action, %jail, %ip, error = %reason, "action failed");
                (
                    NewEntry::failure(action, &jail, &ip, &reason),
                    format!("Failed to {action} {ip}: {reason}"),
                    Some(reason),
                )
            }
        };

        let (logged, log_error, entry) = match self.log.append(new_entry).await {
            Ok(entry) => (true, None, Some(entry)),
            Err(e) => {
                tracing::warn!(%action, %jail, %ip, error = %e, "action log write failed");
                (false, Some(e.to_string()), None)
            }
        };

        ActionOutcome {
            status: if error.is_none() { "ok" } else { "error" },
            action,
            jail,
            ip,
            message,
            demo: false,
            logged,
            log_error,
            error,
            entry,
        }
    }

    pub async fn action_log(&self, query: &LogQuery) -> Result<Vec<ActionLogEntry>, ApiError> {
        Ok(self.log.query(query).await?)
    }
}
