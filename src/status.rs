//! Sync status lifecycle for a remote site.
//!
//! ```text
//! IDLE ──begin──▶ SYNCING ──complete──▶ SUCCESS | PARTIAL | FAILED
//!                    ▲                              │
//!                    └────────────begin─────────────┘
//! ```
//!
//! The tracker is the only writer of a site's status, counters and last
//! error, so those fields always describe the most recently completed run.

use crate::config::Config;
use crate::db::ContentStore;
use crate::sync::SyncResult;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    Idle,
    Syncing,
    Success,
    Partial,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Idle => "IDLE",
            SyncStatus::Syncing => "SYNCING",
            SyncStatus::Success => "SUCCESS",
            SyncStatus::Partial => "PARTIAL",
            SyncStatus::Failed => "FAILED",
        }
    }

    pub fn parse(value: &str) -> Option<SyncStatus> {
        match value {
            "IDLE" => Some(SyncStatus::Idle),
            "SYNCING" => Some(SyncStatus::Syncing),
            "SUCCESS" => Some(SyncStatus::Success),
            "PARTIAL" => Some(SyncStatus::Partial),
            "FAILED" => Some(SyncStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The status-owned fields of a site
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteSyncState {
    pub status: SyncStatus,
    pub last_error: Option<String>,
    pub total_found: u32,
    pub total_synced: u32,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub sync_started_at: Option<DateTime<Utc>>,
}

impl Default for SiteSyncState {
    fn default() -> Self {
        Self {
            status: SyncStatus::Idle,
            last_error: None,
            total_found: 0,
            total_synced: 0,
            last_sync_at: None,
            sync_started_at: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum StatusError {
    #[error("Site {0} not found")]
    SiteNotFound(i64),

    #[error("Site {site_id} is already syncing (started {started_at})")]
    AlreadySyncing {
        site_id: i64,
        started_at: String,
    },

    #[error("Invalid sync status transition {from} -> {to}")]
    InvalidTransition { from: SyncStatus, to: SyncStatus },

    #[error("Sync of site {site_id} started {started_at} was superseded by a newer run")]
    Superseded { site_id: i64, started_at: String },

    #[error("Storage error: {0}")]
    Store(#[from] anyhow::Error),
}

/// Final status for a finished run: no errors is a success, errors with at
/// least one synced post is partial, anything else failed.
pub fn status_for(result: &SyncResult) -> SyncStatus {
    if result.errors.is_empty() {
        SyncStatus::Success
    } else if result.synced > 0 {
        SyncStatus::Partial
    } else {
        SyncStatus::Failed
    }
}

/// Join at most `limit` errors, noting how many were left out.
pub fn summarize_errors(errors: &[String], limit: usize) -> Option<String> {
    if errors.is_empty() {
        return None;
    }

    let shown = errors.iter().take(limit.max(1)).cloned().collect::<Vec<_>>();
    let mut summary = shown.join("; ");
    if errors.len() > shown.len() {
        summary.push_str(&format!("; ... and {} more", errors.len() - shown.len()));
    }
    Some(summary)
}

/// Ownership of a site's SYNCING state, returned by `begin`.
///
/// Only the holder of the current claim can finalize the run; a run whose
/// claim was taken over as stale finishes without touching the site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncClaim {
    pub site_id: i64,
    pub started_at: DateTime<Utc>,
}

pub struct SyncStatusTracker<'a> {
    store: &'a dyn ContentStore,
    stale_after: Duration,
    error_summary_limit: usize,
}

impl<'a> SyncStatusTracker<'a> {
    pub fn new(store: &'a dyn ContentStore, config: &Config) -> Self {
        Self {
            store,
            stale_after: Duration::minutes(config.sync_stale_after_minutes),
            error_summary_limit: config.error_summary_limit,
        }
    }

    /// Move the site to SYNCING and clear the previous error.
    ///
    /// Rejected while another run holds SYNCING, unless that run started
    /// longer ago than the stale window (a cancelled request never calls
    /// `complete`).
    pub fn begin(&self, site_id: i64) -> Result<SyncClaim, StatusError> {
        let now = Utc::now();
        let stale_before = now - self.stale_after;

        if self.store.claim_sync(site_id, now, stale_before)? {
            info!("Site {} -> SYNCING", site_id);
            return Ok(SyncClaim {
                site_id,
                started_at: now,
            });
        }

        let site = self
            .store
            .get_site(site_id)?
            .ok_or(StatusError::SiteNotFound(site_id))?;

        Err(StatusError::AlreadySyncing {
            site_id,
            started_at: site
                .sync
                .sync_started_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "unknown".to_string()),
        })
    }

    /// Record the outcome of a run that reached the end of its loop.
    pub fn complete(
        &self,
        claim: &SyncClaim,
        result: &SyncResult,
    ) -> Result<SyncStatus, StatusError> {
        let status = status_for(result);
        let last_error = summarize_errors(&result.errors, self.error_summary_limit);
        self.finish(claim, status, last_error, result.found, result.synced)?;
        Ok(status)
    }

    /// Record a run that crashed after `begin`.
    pub fn fail(&self, claim: &SyncClaim, message: &str) -> Result<(), StatusError> {
        self.finish(claim, SyncStatus::Failed, Some(message.to_string()), 0, 0)
    }

    fn finish(
        &self,
        claim: &SyncClaim,
        status: SyncStatus,
        last_error: Option<String>,
        total_found: u32,
        total_synced: u32,
    ) -> Result<(), StatusError> {
        let state = SiteSyncState {
            status,
            last_error,
            total_found,
            total_synced,
            last_sync_at: Some(Utc::now()),
            sync_started_at: Some(claim.started_at),
        };

        if !self.store.finish_sync(claim.site_id, claim.started_at, &state)? {
            let site = self
                .store
                .get_site(claim.site_id)?
                .ok_or(StatusError::SiteNotFound(claim.site_id))?;

            if site.sync.status != SyncStatus::Syncing {
                return Err(StatusError::InvalidTransition {
                    from: site.sync.status,
                    to: status,
                });
            }
            return Err(StatusError::Superseded {
                site_id: claim.site_id,
                started_at: claim.started_at.to_rfc3339(),
            });
        }

        if status == SyncStatus::Success {
            info!("Site {} -> {}", claim.site_id, status);
        } else {
            warn!(
                "Site {} -> {}: {}",
                claim.site_id,
                status,
                state.last_error.as_deref().unwrap_or("")
            );
        }
        Ok(())
    }
}
