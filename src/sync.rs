//! One sync run for one remote site.
//!
//! Languages are processed one after another and posts in the order the
//! site returns them (newest first). Errors are collected at three levels:
//! a single post, a whole language, or the run itself. Only problems found
//! before the site enters SYNCING are returned as `Err`; everything after
//! that ends up in `SyncResult::errors` and the final site status.

use crate::config::Config;
use crate::db::{ContentStore, RemoteSite};
use crate::detector::{Plugin, PluginDetector};
use crate::i18n::normalize;
use crate::reconcile::{reconcile, ReconcileOutcome};
use crate::retry::{with_retry_if, RetryConfig};
use crate::status::{StatusError, SyncClaim, SyncStatusTracker};
use crate::wordpress::{FetchError, PostQuery, WordPressClient};
use anyhow::Result;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Overwrite translations that already exist (remote wins)
    Full,
    /// Leave existing translations untouched
    Incremental,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    pub found: u32,
    pub synced: u32,
    pub skipped: u32,
    pub errors: Vec<String>,
}

/// Reasons a sync never started. Once SYNCING has begun every failure is
/// reported through `SyncResult::errors` instead.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Site {0} not found")]
    SiteNotFound(i64),

    #[error("No application password supplied")]
    MissingCredential,

    #[error("Invalid site: {0}")]
    InvalidSite(String),

    #[error("Site {site_id} is already syncing (started {started_at})")]
    AlreadySyncing { site_id: i64, started_at: String },

    #[error("Storage error: {0}")]
    Store(String),
}

impl From<StatusError> for SyncError {
    fn from(err: StatusError) -> Self {
        match err {
            StatusError::SiteNotFound(id) => SyncError::SiteNotFound(id),
            StatusError::AlreadySyncing {
                site_id,
                started_at,
            } => SyncError::AlreadySyncing {
                site_id,
                started_at,
            },
            other => SyncError::Store(other.to_string()),
        }
    }
}

/// `SyncSite(site, appPassword, mode, languages[])`
///
/// `languages` are raw remote tags as the plugin expects them in its filter
/// parameter. `None` or empty falls back to the site's detected list.
pub async fn sync_site(
    config: &Config,
    store: &dyn ContentStore,
    site_id: i64,
    app_password: &str,
    mode: SyncMode,
    languages: Option<Vec<String>>,
) -> Result<SyncResult, SyncError> {
    let site = store
        .get_site(site_id)
        .map_err(|e| SyncError::Store(e.to_string()))?
        .ok_or(SyncError::SiteNotFound(site_id))?;

    if app_password.trim().is_empty() {
        return Err(SyncError::MissingCredential);
    }

    let client = WordPressClient::new(
        &site.base_url,
        &site.username,
        app_password,
        config.http_timeout(),
    )
    .map_err(|e| SyncError::InvalidSite(e.to_string()))?;

    let tracker = SyncStatusTracker::new(store, config);
    let claim = tracker.begin(site_id)?;

    info!(
        "Starting {:?} sync for site {} ({})",
        mode, site.id, site.base_url
    );

    let run = SyncRun {
        config,
        store,
        client: &client,
        site: &site,
        plugin: site.plugin,
        mode,
    };

    // From here on the site is SYNCING and must always be finalized
    let outcome = AssertUnwindSafe(run.execute(languages))
        .catch_unwind()
        .await;

    let result = match outcome {
        Ok(Ok(mut result)) => {
            match tracker.complete(&claim, &result) {
                Ok(_) => {}
                Err(StatusError::Superseded { started_at, .. }) => warn!(
                    "Site {} was taken over by a newer sync; dropping result of run started {}",
                    site_id, started_at
                ),
                Err(e) => {
                    let message = format!("Failed to record sync outcome: {}", e);
                    error!("Site {}: {}", site_id, message);
                    mark_failed(&tracker, &claim, &message);
                    result.errors.push(message);
                }
            }
            result
        }
        Ok(Err(e)) => abort(&tracker, &claim, format!("Sync aborted: {:#}", e)),
        Err(panic) => abort(
            &tracker,
            &claim,
            format!("Sync crashed: {}", panic_message(panic.as_ref())),
        ),
    };

    info!(
        "Sync for site {} finished: found={}, synced={}, skipped={}, errors={}",
        site_id,
        result.found,
        result.synced,
        result.skipped,
        result.errors.len()
    );

    Ok(result)
}

fn abort(tracker: &SyncStatusTracker<'_>, claim: &SyncClaim, message: String) -> SyncResult {
    error!("Site {}: {}", claim.site_id, message);
    mark_failed(tracker, claim, &message);
    SyncResult {
        errors: vec![message],
        ..SyncResult::default()
    }
}

fn mark_failed(tracker: &SyncStatusTracker<'_>, claim: &SyncClaim, message: &str) {
    match tracker.fail(claim, message) {
        Ok(()) => {}
        Err(StatusError::Superseded { .. }) => {
            warn!("Site {} was taken over by a newer sync", claim.site_id)
        }
        Err(e) => error!("Failed to mark site {} as FAILED: {}", claim.site_id, e),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Everything one run needs while walking languages and pages
struct SyncRun<'a> {
    config: &'a Config,
    store: &'a dyn ContentStore,
    client: &'a WordPressClient,
    site: &'a RemoteSite,
    plugin: Plugin,
    mode: SyncMode,
}

impl SyncRun<'_> {
    async fn execute(mut self, requested: Option<Vec<String>>) -> Result<SyncResult> {
        let mut result = SyncResult::default();
        let mut languages = requested
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| self.site.supported_languages.clone());

        // Sites registered but never probed get detected on their first sync
        if self.site.detected_at.is_none() {
            match PluginDetector::new().detect(self.client).await {
                Ok(info) => {
                    self.store.save_plugin_info(self.site.id, &info)?;
                    self.plugin = info.plugin;
                    if languages.is_empty() {
                        languages = info.supported_languages;
                    }
                }
                Err(e) => result.errors.push(format!("Plugin detection failed: {}", e)),
            }
        }

        if languages.is_empty() {
            result
                .errors
                .push("No languages to sync: none requested and none detected".to_string());
            return Ok(result);
        }

        for raw_language in &languages {
            self.sync_language(raw_language, &mut result).await;
        }

        Ok(result)
    }

    async fn sync_language(&self, raw_language: &str, result: &mut SyncResult) {
        let Some(requested) = normalize(raw_language) else {
            warn!("Skipping unsupported language '{}'", raw_language);
            result
                .errors
                .push(format!("{}: unsupported language code", raw_language));
            return;
        };

        let language_param = self.plugin.language_param();
        info!(
            "Syncing language {} ({}) via {}={}",
            raw_language, requested, language_param, raw_language
        );

        let retry = RetryConfig::wordpress_fetch();
        let mut page = 1;
        let (mut found, mut synced, mut skipped) = (0, 0, 0);

        loop {
            let query = PostQuery {
                page,
                per_page: self.config.sync_page_size,
                language_param,
                language: raw_language,
            };

            let fetched = with_retry_if(
                &retry,
                &format!("Fetch {} page {}", raw_language, page),
                || self.client.fetch_posts(&query),
                FetchError::is_retryable,
            )
            .await;

            let batch = match fetched {
                Ok(batch) => batch,
                Err(e) if page > 1 && e.is_past_last_page() => {
                    // Previous page was exactly full and the site sent no page count
                    debug!("{}: no page {}, list ends at page {}", raw_language, page, page - 1);
                    break;
                }
                Err(e) => {
                    warn!("✗ {} page {}: {}", raw_language, page, e);
                    result.errors.push(format!(
                        "{}: failed to fetch posts (page {}): {}",
                        raw_language, page, e
                    ));
                    break;
                }
            };

            for post in &batch.posts {
                found += 1;

                // Posts may carry their own tag; otherwise they are in the requested language
                let language = match post.language.as_deref() {
                    Some(tag) => match normalize(tag) {
                        Some(language) => language,
                        None => {
                            result.errors.push(format!(
                                "{}: post {} has unsupported language '{}'",
                                raw_language, post.id, tag
                            ));
                            continue;
                        }
                    },
                    None => requested,
                };

                match reconcile(self.store, post, language, self.site, self.mode) {
                    ReconcileOutcome::Created { .. } | ReconcileOutcome::Updated { .. } => {
                        synced += 1
                    }
                    ReconcileOutcome::Skipped { .. } => skipped += 1,
                    ReconcileOutcome::Failed(reason) => {
                        warn!("✗ {} post {}: {}", raw_language, post.id, reason);
                        result
                            .errors
                            .push(format!("{}: post {}: {}", raw_language, post.id, reason));
                    }
                }
            }

            let last_page = batch.posts.len() < self.config.sync_page_size as usize
                || batch.total_pages.map(|total| page >= total).unwrap_or(false);
            if last_page {
                break;
            }
            if page >= self.config.sync_max_pages {
                warn!(
                    "{}: stopping at page cap {} (more posts remain)",
                    raw_language, self.config.sync_max_pages
                );
                break;
            }
            page += 1;
        }

        result.found += found;
        result.synced += synced;
        result.skipped += skipped;

        info!(
            "✓ {} done: {} found, {} synced, {} skipped",
            raw_language, found, synced, skipped
        );
    }
}
