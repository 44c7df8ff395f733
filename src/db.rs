use crate::detector::{Plugin, PluginInfo};
use crate::i18n::Language;
use crate::status::{SiteSyncState, SyncStatus};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};

/// Publish state shared by articles and translations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentStatus {
    Draft,
    Published,
}

impl ContentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentStatus::Draft => "DRAFT",
            ContentStatus::Published => "PUBLISHED",
        }
    }

    pub fn parse(value: &str) -> Option<ContentStatus> {
        match value {
            "DRAFT" => Some(ContentStatus::Draft),
            "PUBLISHED" => Some(ContentStatus::Published),
            _ => None,
        }
    }
}

/// A WordPress site we sync from
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSite {
    pub id: i64,
    pub name: String,
    pub base_url: String,
    pub username: String,
    pub owner_id: i64,
    pub plugin: Plugin,
    pub plugin_version: Option<String>,
    /// Raw language tags from the last detection
    pub supported_languages: Vec<String>,
    pub plugin_settings: Value,
    pub detected_at: Option<DateTime<Utc>>,
    pub sync: SiteSyncState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSite {
    pub name: String,
    pub base_url: String,
    pub username: String,
    pub owner_id: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalArticle {
    pub id: i64,
    pub source_language: Language,
    pub title: String,
    pub content: String,
    pub excerpt: String,
    pub status: ContentStatus,
    pub owner_id: i64,
    pub template_id: Option<i64>,
    /// Set when the article was created by a sync
    pub origin_site_id: Option<i64>,
    pub origin_remote_post_id: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewArticle {
    pub source_language: Language,
    pub title: String,
    pub content: String,
    pub excerpt: String,
    pub status: ContentStatus,
    pub owner_id: i64,
    pub template_id: Option<i64>,
    pub origin_site_id: Option<i64>,
    pub origin_remote_post_id: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalTranslation {
    pub id: i64,
    pub article_id: i64,
    pub language: Language,
    pub title: String,
    pub content: String,
    pub excerpt: String,
    pub slug: String,
    pub link: String,
    /// Provenance; all `None` for locally authored translations
    pub site_id: Option<i64>,
    pub remote_post_id: Option<u64>,
    pub synced_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
    pub status: ContentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LocalTranslation {
    pub fn is_sync_derived(&self) -> bool {
        self.site_id.is_some() && self.remote_post_id.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct NewTranslation {
    pub article_id: i64,
    pub language: Language,
    pub title: String,
    pub content: String,
    pub excerpt: String,
    pub slug: String,
    pub link: String,
    pub site_id: Option<i64>,
    pub remote_post_id: Option<u64>,
    pub synced_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
    pub status: ContentStatus,
}

/// Fields a full-mode sync overwrites on an existing translation
#[derive(Debug, Clone)]
pub struct TranslationUpdate {
    pub title: String,
    pub content: String,
    pub excerpt: String,
    pub slug: String,
    pub link: String,
    pub synced_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
    pub status: ContentStatus,
}

/// Storage operations the sync subsystem needs.
///
/// `Database` is the production implementation; tests wrap it to inject
/// failures.
pub trait ContentStore: Send + Sync {
    fn get_site(&self, site_id: i64) -> Result<Option<RemoteSite>>;

    fn save_plugin_info(&self, site_id: i64, info: &PluginInfo) -> Result<()>;

    /// Atomically move a site to SYNCING unless it is already SYNCING with a
    /// start time at or after `stale_before`. Returns false when not claimed.
    fn claim_sync(
        &self,
        site_id: i64,
        started_at: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<bool>;

    /// Write the final state of the run that claimed the site at
    /// `claimed_at`. Returns false when that run no longer holds SYNCING.
    fn finish_sync(
        &self,
        site_id: i64,
        claimed_at: DateTime<Utc>,
        state: &SiteSyncState,
    ) -> Result<bool>;

    fn find_translation_by_remote(
        &self,
        site_id: i64,
        remote_post_id: u64,
    ) -> Result<Option<LocalTranslation>>;

    fn find_article_by_remote(
        &self,
        site_id: i64,
        remote_post_id: u64,
    ) -> Result<Option<LocalArticle>>;

    fn find_translation_for_article(
        &self,
        article_id: i64,
        language: Language,
    ) -> Result<Option<LocalTranslation>>;

    /// Id of the default article template, created on first use
    fn ensure_default_template(&self) -> Result<i64>;

    fn create_article(&self, article: &NewArticle) -> Result<LocalArticle>;

    fn create_translation(&self, translation: &NewTranslation) -> Result<LocalTranslation>;

    fn update_translation(&self, translation_id: i64, update: &TranslationUpdate) -> Result<()>;
}

const DEFAULT_TEMPLATE_NAME: &str = "default";

const SITE_COLUMNS: &str = "id, name, base_url, username, owner_id, plugin, plugin_version,
    supported_languages, plugin_settings, detected_at, sync_status, last_error, total_found,
    total_synced, last_sync_at, sync_started_at, created_at, updated_at";

const ARTICLE_COLUMNS: &str = "id, source_language, title, content, excerpt, status, owner_id,
    template_id, origin_site_id, origin_remote_post_id, created_at, updated_at";

const TRANSLATION_COLUMNS: &str = "id, article_id, language, title, content, excerpt, slug,
    link, site_id, remote_post_id, synced_at, published_at, status, created_at, updated_at";

/// Fixed-width UTC timestamps so stored values compare correctly as text
fn ts(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, anyhow!(message).into())
}

fn get_ts(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, format!("bad timestamp '{}': {}", raw, e)))
}

fn get_opt_ts(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(_) => get_ts(row, idx).map(Some),
        None => Ok(None),
    }
}

fn get_language(row: &Row, idx: usize) -> rusqlite::Result<Language> {
    let raw: String = row.get(idx)?;
    Language::from_code(&raw).map_err(|e| conversion_error(idx, e.to_string()))
}

fn get_content_status(row: &Row, idx: usize) -> rusqlite::Result<ContentStatus> {
    let raw: String = row.get(idx)?;
    ContentStatus::parse(&raw).ok_or_else(|| conversion_error(idx, format!("bad status '{}'", raw)))
}

fn get_opt_post_id(row: &Row, idx: usize) -> rusqlite::Result<Option<u64>> {
    Ok(row.get::<_, Option<i64>>(idx)?.map(|id| id as u64))
}

fn site_from_row(row: &Row) -> rusqlite::Result<RemoteSite> {
    let plugin_raw: String = row.get(5)?;
    let languages_raw: String = row.get(7)?;
    let settings_raw: String = row.get(8)?;
    let status_raw: String = row.get(10)?;

    Ok(RemoteSite {
        id: row.get(0)?,
        name: row.get(1)?,
        base_url: row.get(2)?,
        username: row.get(3)?,
        owner_id: row.get(4)?,
        plugin: Plugin::parse(&plugin_raw)
            .ok_or_else(|| conversion_error(5, format!("bad plugin '{}'", plugin_raw)))?,
        plugin_version: row.get(6)?,
        supported_languages: serde_json::from_str(&languages_raw)
            .map_err(|e| conversion_error(7, e.to_string()))?,
        plugin_settings: serde_json::from_str(&settings_raw)
            .map_err(|e| conversion_error(8, e.to_string()))?,
        detected_at: get_opt_ts(row, 9)?,
        sync: SiteSyncState {
            status: SyncStatus::parse(&status_raw)
                .ok_or_else(|| conversion_error(10, format!("bad status '{}'", status_raw)))?,
            last_error: row.get(11)?,
            total_found: row.get(12)?,
            total_synced: row.get(13)?,
            last_sync_at: get_opt_ts(row, 14)?,
            sync_started_at: get_opt_ts(row, 15)?,
        },
        created_at: get_ts(row, 16)?,
        updated_at: get_ts(row, 17)?,
    })
}

fn article_from_row(row: &Row) -> rusqlite::Result<LocalArticle> {
    Ok(LocalArticle {
        id: row.get(0)?,
        source_language: get_language(row, 1)?,
        title: row.get(2)?,
        content: row.get(3)?,
        excerpt: row.get(4)?,
        status: get_content_status(row, 5)?,
        owner_id: row.get(6)?,
        template_id: row.get(7)?,
        origin_site_id: row.get(8)?,
        origin_remote_post_id: get_opt_post_id(row, 9)?,
        created_at: get_ts(row, 10)?,
        updated_at: get_ts(row, 11)?,
    })
}

fn translation_from_row(row: &Row) -> rusqlite::Result<LocalTranslation> {
    Ok(LocalTranslation {
        id: row.get(0)?,
        article_id: row.get(1)?,
        language: get_language(row, 2)?,
        title: row.get(3)?,
        content: row.get(4)?,
        excerpt: row.get(5)?,
        slug: row.get(6)?,
        link: row.get(7)?,
        site_id: row.get(8)?,
        remote_post_id: get_opt_post_id(row, 9)?,
        synced_at: get_opt_ts(row, 10)?,
        published_at: get_opt_ts(row, 11)?,
        status: get_content_status(row, 12)?,
        created_at: get_ts(row, 13)?,
        updated_at: get_ts(row, 14)?,
    })
}

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the database and make sure all tables exist
    pub fn new(database_path: &str) -> Result<Self> {
        let conn = Connection::open(database_path)
            .context(format!("Failed to open database at {}", database_path))?;

        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS sites (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                base_url TEXT NOT NULL,
                username TEXT NOT NULL,
                owner_id INTEGER NOT NULL,
                plugin TEXT NOT NULL DEFAULT 'NONE',
                plugin_version TEXT,
                supported_languages TEXT NOT NULL DEFAULT '[]',
                plugin_settings TEXT NOT NULL DEFAULT '{}',
                detected_at TEXT,
                sync_status TEXT NOT NULL DEFAULT 'IDLE',
                last_error TEXT,
                total_found INTEGER NOT NULL DEFAULT 0,
                total_synced INTEGER NOT NULL DEFAULT 0,
                last_sync_at TEXT,
                sync_started_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )
        .context("Failed to create sites table")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS templates (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
            )",
            [],
        )
        .context("Failed to create templates table")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS articles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_language TEXT NOT NULL,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                excerpt TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL,
                owner_id INTEGER NOT NULL,
                template_id INTEGER REFERENCES templates(id),
                origin_site_id INTEGER REFERENCES sites(id),
                origin_remote_post_id INTEGER,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )
        .context("Failed to create articles table")?;

        conn.execute(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_articles_origin
                ON articles(origin_site_id, origin_remote_post_id)
                WHERE origin_site_id IS NOT NULL",
            [],
        )
        .context("Failed to create articles origin index")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS translations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                article_id INTEGER NOT NULL REFERENCES articles(id) ON DELETE CASCADE,
                language TEXT NOT NULL,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                excerpt TEXT NOT NULL DEFAULT '',
                slug TEXT NOT NULL DEFAULT '',
                link TEXT NOT NULL DEFAULT '',
                site_id INTEGER REFERENCES sites(id),
                remote_post_id INTEGER,
                synced_at TEXT,
                published_at TEXT,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(article_id, language)
            )",
            [],
        )
        .context("Failed to create translations table")?;

        // The (site, remote post) idempotency key
        conn.execute(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_translations_remote
                ON translations(site_id, remote_post_id)
                WHERE site_id IS NOT NULL",
            [],
        )
        .context("Failed to create translations remote index")?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Database connection mutex poisoned"))
    }

    pub fn create_site(&self, site: &NewSite) -> Result<RemoteSite> {
        let id = {
            let conn = self.conn()?;
            let now = ts(Utc::now());
            conn.execute(
                "INSERT INTO sites (name, base_url, username, owner_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![site.name, site.base_url, site.username, site.owner_id, now],
            )
            .context("Failed to create site")?;
            conn.last_insert_rowid()
        };

        self.get_site(id)?
            .context("Site vanished right after insert")
    }

    pub fn list_sites(&self) -> Result<Vec<RemoteSite>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("SELECT {} FROM sites ORDER BY id", SITE_COLUMNS))?;
        let sites = stmt
            .query_map([], site_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sites)
    }

    pub fn get_article(&self, article_id: i64) -> Result<Option<LocalArticle>> {
        let conn = self.conn()?;
        let article = conn
            .query_row(
                &format!("SELECT {} FROM articles WHERE id = ?1", ARTICLE_COLUMNS),
                params![article_id],
                article_from_row,
            )
            .optional()?;
        Ok(article)
    }

    pub fn list_translations_for_site(&self, site_id: i64) -> Result<Vec<LocalTranslation>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM translations WHERE site_id = ?1 ORDER BY remote_post_id",
            TRANSLATION_COLUMNS
        ))?;
        let translations = stmt
            .query_map(params![site_id], translation_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(translations)
    }

    pub fn article_count(&self) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM articles", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn translation_count(&self) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM translations", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Overwrite the status fields unconditionally. Used to reset a stuck
    /// run by hand; normal runs finish through `finish_sync`.
    pub fn save_sync_state(&self, site_id: i64, state: &SiteSyncState) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE sites SET sync_status = ?1, last_error = ?2, total_found = ?3,
                total_synced = ?4, last_sync_at = ?5, sync_started_at = ?6, updated_at = ?7
             WHERE id = ?8",
            params![
                state.status.as_str(),
                state.last_error,
                state.total_found,
                state.total_synced,
                state.last_sync_at.map(ts),
                state.sync_started_at.map(ts),
                ts(Utc::now()),
                site_id
            ],
        )
        .context("Failed to save sync state")?;
        Ok(())
    }
}

impl ContentStore for Database {
    fn get_site(&self, site_id: i64) -> Result<Option<RemoteSite>> {
        let conn = self.conn()?;
        let site = conn
            .query_row(
                &format!("SELECT {} FROM sites WHERE id = ?1", SITE_COLUMNS),
                params![site_id],
                site_from_row,
            )
            .optional()
            .context("Failed to load site")?;
        Ok(site)
    }

    fn save_plugin_info(&self, site_id: i64, info: &PluginInfo) -> Result<()> {
        let conn = self.conn()?;
        let now = ts(Utc::now());
        let languages = serde_json::to_string(&info.supported_languages)?;
        let settings = serde_json::to_string(&info.settings)?;

        conn.execute(
            "UPDATE sites SET plugin = ?1, plugin_version = ?2, supported_languages = ?3,
                plugin_settings = ?4, detected_at = ?5, updated_at = ?5
             WHERE id = ?6",
            params![
                info.plugin.as_str(),
                info.version,
                languages,
                settings,
                now,
                site_id
            ],
        )
        .context("Failed to save plugin info")?;
        Ok(())
    }

    fn claim_sync(
        &self,
        site_id: i64,
        started_at: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<bool> {
        let conn = self.conn()?;
        let rows = conn
            .execute(
                "UPDATE sites SET sync_status = 'SYNCING', last_error = NULL,
                    sync_started_at = ?1, updated_at = ?1
                 WHERE id = ?2
                   AND (sync_status != 'SYNCING'
                        OR sync_started_at IS NULL
                        OR sync_started_at < ?3)",
                params![ts(started_at), site_id, ts(stale_before)],
            )
            .context("Failed to claim sync")?;
        Ok(rows > 0)
    }

    fn finish_sync(
        &self,
        site_id: i64,
        claimed_at: DateTime<Utc>,
        state: &SiteSyncState,
    ) -> Result<bool> {
        let conn = self.conn()?;
        let rows = conn
            .execute(
                "UPDATE sites SET sync_status = ?1, last_error = ?2, total_found = ?3,
                    total_synced = ?4, last_sync_at = ?5, updated_at = ?6
                 WHERE id = ?7 AND sync_status = 'SYNCING' AND sync_started_at = ?8",
                params![
                    state.status.as_str(),
                    state.last_error,
                    state.total_found,
                    state.total_synced,
                    state.last_sync_at.map(ts),
                    ts(Utc::now()),
                    site_id,
                    ts(claimed_at)
                ],
            )
            .context("Failed to finish sync")?;
        Ok(rows > 0)
    }

    fn find_translation_by_remote(
        &self,
        site_id: i64,
        remote_post_id: u64,
    ) -> Result<Option<LocalTranslation>> {
        let conn = self.conn()?;
        let translation = conn
            .query_row(
                &format!(
                    "SELECT {} FROM translations WHERE site_id = ?1 AND remote_post_id = ?2",
                    TRANSLATION_COLUMNS
                ),
                params![site_id, remote_post_id as i64],
                translation_from_row,
            )
            .optional()?;
        Ok(translation)
    }

    fn find_article_by_remote(
        &self,
        site_id: i64,
        remote_post_id: u64,
    ) -> Result<Option<LocalArticle>> {
        let conn = self.conn()?;
        let article = conn
            .query_row(
                &format!(
                    "SELECT {} FROM articles
                     WHERE origin_site_id = ?1 AND origin_remote_post_id = ?2",
                    ARTICLE_COLUMNS
                ),
                params![site_id, remote_post_id as i64],
                article_from_row,
            )
            .optional()?;
        Ok(article)
    }

    fn find_translation_for_article(
        &self,
        article_id: i64,
        language: Language,
    ) -> Result<Option<LocalTranslation>> {
        let conn = self.conn()?;
        let translation = conn
            .query_row(
                &format!(
                    "SELECT {} FROM translations WHERE article_id = ?1 AND language = ?2",
                    TRANSLATION_COLUMNS
                ),
                params![article_id, language.code()],
                translation_from_row,
            )
            .optional()?;
        Ok(translation)
    }

    fn ensure_default_template(&self) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO templates (name, created_at) VALUES (?1, ?2)",
            params![DEFAULT_TEMPLATE_NAME, ts(Utc::now())],
        )
        .context("Failed to create default template")?;

        let id: i64 = conn.query_row(
            "SELECT id FROM templates WHERE name = ?1",
            params![DEFAULT_TEMPLATE_NAME],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    fn create_article(&self, article: &NewArticle) -> Result<LocalArticle> {
        let conn = self.conn()?;
        let now = ts(Utc::now());
        conn.execute(
            "INSERT INTO articles (source_language, title, content, excerpt, status, owner_id,
                template_id, origin_site_id, origin_remote_post_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
            params![
                article.source_language.code(),
                article.title,
                article.content,
                article.excerpt,
                article.status.as_str(),
                article.owner_id,
                article.template_id,
                article.origin_site_id,
                article.origin_remote_post_id.map(|id| id as i64),
                now
            ],
        )
        .context("Failed to create article")?;

        let id = conn.last_insert_rowid();
        let created = conn.query_row(
            &format!("SELECT {} FROM articles WHERE id = ?1", ARTICLE_COLUMNS),
            params![id],
            article_from_row,
        )?;
        Ok(created)
    }

    fn create_translation(&self, translation: &NewTranslation) -> Result<LocalTranslation> {
        let conn = self.conn()?;
        let now = ts(Utc::now());
        conn.execute(
            "INSERT INTO translations (article_id, language, title, content, excerpt, slug, link,
                site_id, remote_post_id, synced_at, published_at, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)",
            params![
                translation.article_id,
                translation.language.code(),
                translation.title,
                translation.content,
                translation.excerpt,
                translation.slug,
                translation.link,
                translation.site_id,
                translation.remote_post_id.map(|id| id as i64),
                translation.synced_at.map(ts),
                translation.published_at.map(ts),
                translation.status.as_str(),
                now
            ],
        )
        .context("Failed to create translation")?;

        let id = conn.last_insert_rowid();
        let created = conn.query_row(
            &format!("SELECT {} FROM translations WHERE id = ?1", TRANSLATION_COLUMNS),
            params![id],
            translation_from_row,
        )?;
        Ok(created)
    }

    fn update_translation(&self, translation_id: i64, update: &TranslationUpdate) -> Result<()> {
        let conn = self.conn()?;
        let rows = conn
            .execute(
                "UPDATE translations SET title = ?1, content = ?2, excerpt = ?3, slug = ?4,
                    link = ?5, synced_at = ?6, published_at = ?7, status = ?8, updated_at = ?9
                 WHERE id = ?10",
                params![
                    update.title,
                    update.content,
                    update.excerpt,
                    update.slug,
                    update.link,
                    ts(update.synced_at),
                    update.published_at.map(ts),
                    update.status.as_str(),
                    ts(Utc::now()),
                    translation_id
                ],
            )
            .context("Failed to update translation")?;

        if rows == 0 {
            anyhow::bail!("Translation {} not found", translation_id);
        }
        Ok(())
    }
}
