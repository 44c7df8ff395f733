//! Merge one remote post into the local store.
//!
//! The idempotency key is (site, remote post id): a remote post maps to
//! exactly one local translation no matter how often it is re-synced.

use crate::db::{
    ContentStatus, ContentStore, LocalTranslation, NewArticle, NewTranslation, RemoteSite,
    TranslationUpdate,
};
use crate::i18n::Language;
use crate::sync::SyncMode;
use crate::wordpress::RemotePost;
use anyhow::{bail, Result};
use chrono::Utc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Created { article_id: i64, translation_id: i64 },
    Updated { translation_id: i64 },
    Skipped { translation_id: i64 },
    Failed(String),
}

fn content_status(post: &RemotePost) -> ContentStatus {
    if post.is_published() {
        ContentStatus::Published
    } else {
        ContentStatus::Draft
    }
}

/// Reconcile a single post in an already-normalized language.
///
/// Never returns an error: anything that goes wrong becomes
/// [`ReconcileOutcome::Failed`] so the caller can keep going.
pub fn reconcile(
    store: &dyn ContentStore,
    post: &RemotePost,
    language: Language,
    site: &RemoteSite,
    mode: SyncMode,
) -> ReconcileOutcome {
    match try_reconcile(store, post, language, site, mode) {
        Ok(outcome) => outcome,
        Err(e) => ReconcileOutcome::Failed(format!("{:#}", e)),
    }
}

fn try_reconcile(
    store: &dyn ContentStore,
    post: &RemotePost,
    language: Language,
    site: &RemoteSite,
    mode: SyncMode,
) -> Result<ReconcileOutcome> {
    if let Some(existing) = store.find_translation_by_remote(site.id, post.id)? {
        return match mode {
            SyncMode::Incremental => {
                debug!("Post {} already synced as translation {}", post.id, existing.id);
                Ok(ReconcileOutcome::Skipped {
                    translation_id: existing.id,
                })
            }
            SyncMode::Full => overwrite(store, &existing, post),
        };
    }

    create(store, post, language, site)
}

/// Remote is authoritative: overwrite content and provenance in place
fn overwrite(
    store: &dyn ContentStore,
    existing: &LocalTranslation,
    post: &RemotePost,
) -> Result<ReconcileOutcome> {
    store.update_translation(
        existing.id,
        &TranslationUpdate {
            title: post.title.clone(),
            content: post.content.clone(),
            excerpt: post.excerpt.clone(),
            slug: post.slug.clone(),
            link: post.link.clone(),
            synced_at: Utc::now(),
            published_at: post.published_at,
            status: content_status(post),
        },
    )?;

    debug!("Post {} overwrote translation {}", post.id, existing.id);
    Ok(ReconcileOutcome::Updated {
        translation_id: existing.id,
    })
}

fn create(
    store: &dyn ContentStore,
    post: &RemotePost,
    language: Language,
    site: &RemoteSite,
) -> Result<ReconcileOutcome> {
    // A previous run may have created the article and died before the translation
    let article = match store.find_article_by_remote(site.id, post.id)? {
        Some(article) => {
            debug!("Post {} reusing article {}", post.id, article.id);
            article
        }
        None => {
            let template_id = store.ensure_default_template()?;
            store.create_article(&NewArticle {
                source_language: language,
                title: post.title.clone(),
                content: post.content.clone(),
                excerpt: post.excerpt.clone(),
                status: content_status(post),
                owner_id: site.owner_id,
                template_id: Some(template_id),
                origin_site_id: Some(site.id),
                origin_remote_post_id: Some(post.id),
            })?
        }
    };

    if let Some(other) = store.find_translation_for_article(article.id, language)? {
        bail!(
            "article {} already has a {} translation ({}) not linked to this post",
            article.id,
            language,
            other.id
        );
    }

    let translation = store.create_translation(&NewTranslation {
        article_id: article.id,
        language,
        title: post.title.clone(),
        content: post.content.clone(),
        excerpt: post.excerpt.clone(),
        slug: post.slug.clone(),
        link: post.link.clone(),
        site_id: Some(site.id),
        remote_post_id: Some(post.id),
        synced_at: Some(Utc::now()),
        published_at: post.published_at,
        status: content_status(post),
    })?;

    debug!(
        "Post {} created article {} / translation {}",
        post.id, article.id, translation.id
    );
    Ok(ReconcileOutcome::Created {
        article_id: article.id,
        translation_id: translation.id,
    })
}
