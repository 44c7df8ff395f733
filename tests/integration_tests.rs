//! End-to-end sync flows over a mocked WordPress site and a real SQLite file.
//!
//! Each test spins up its own `MockServer` and temp database so they can
//! run in parallel.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use tempfile::TempDir;
use wiremock::{
    matchers::{method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

use wp_multilingual_sync::{
    config::Config,
    db::{
        ContentStore, Database, LocalArticle, LocalTranslation, NewArticle, NewSite,
        NewTranslation, RemoteSite, TranslationUpdate,
    },
    detector::{detect_plugin_for, Plugin, PluginInfo},
    i18n::Language,
    status::{SiteSyncState, SyncStatus},
    sync::{sync_site, SyncError, SyncMode, SyncResult},
};

// ==================== Test Helpers ====================

fn create_test_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("integration.db");
    let db = Database::new(db_path.to_str().unwrap()).expect("Failed to create database");
    (db, temp_dir)
}

fn test_config() -> Config {
    Config {
        http_timeout_secs: 2,
        sync_page_size: 10,
        ..Config::default()
    }
}

fn register_site(db: &Database, base_url: &str) -> RemoteSite {
    db.create_site(&NewSite {
        name: "Newsroom".to_string(),
        base_url: base_url.to_string(),
        username: "editor".to_string(),
        owner_id: 1,
    })
    .expect("create site")
}

fn mark_detected(db: &Database, site_id: i64, plugin: Plugin, languages: &[&str]) {
    db.save_plugin_info(
        site_id,
        &PluginInfo {
            plugin,
            version: Some("1.0".to_string()),
            supported_languages: languages.iter().map(|l| l.to_string()).collect(),
            settings: json!({}),
        },
    )
    .expect("save plugin info");
}

fn wp_post(id: u64, title: &str) -> Value {
    json!({
        "id": id,
        "date_gmt": "2024-03-01T10:00:00",
        "modified_gmt": "2024-03-02T10:00:00",
        "slug": title.to_lowercase().replace(' ', "-"),
        "status": "publish",
        "link": format!("https://news.example.com/?p={}", id),
        "title": {"rendered": title},
        "content": {"rendered": format!("<p>{}</p>", title)},
        "excerpt": {"rendered": ""}
    })
}

async fn mount_posts(server: &MockServer, param: &str, language: &str, posts: Value) {
    Mock::given(method("GET"))
        .and(path("/wp-json/wp/v2/posts"))
        .and(query_param(param, language))
        .respond_with(ResponseTemplate::new(200).set_body_json(posts))
        .mount(server)
        .await;
}

/// Delegates to a real database with switchable faults: a panic while
/// creating translations, or a store that refuses any final status other
/// than FAILED.
struct FaultyStore {
    inner: Database,
    panic_on_translation: AtomicBool,
    reject_final_status: AtomicBool,
}

impl FaultyStore {
    fn new(inner: Database) -> Self {
        Self {
            inner,
            panic_on_translation: AtomicBool::new(false),
            reject_final_status: AtomicBool::new(false),
        }
    }
}

impl ContentStore for FaultyStore {
    fn get_site(&self, site_id: i64) -> Result<Option<RemoteSite>> {
        self.inner.get_site(site_id)
    }

    fn save_plugin_info(&self, site_id: i64, info: &PluginInfo) -> Result<()> {
        self.inner.save_plugin_info(site_id, info)
    }

    fn claim_sync(
        &self,
        site_id: i64,
        started_at: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<bool> {
        self.inner.claim_sync(site_id, started_at, stale_before)
    }

    fn finish_sync(
        &self,
        site_id: i64,
        claimed_at: DateTime<Utc>,
        state: &SiteSyncState,
    ) -> Result<bool> {
        if self.reject_final_status.load(Ordering::SeqCst) && state.status != SyncStatus::Failed {
            anyhow::bail!("status write rejected");
        }
        self.inner.finish_sync(site_id, claimed_at, state)
    }

    fn find_translation_by_remote(
        &self,
        site_id: i64,
        remote_post_id: u64,
    ) -> Result<Option<LocalTranslation>> {
        self.inner.find_translation_by_remote(site_id, remote_post_id)
    }

    fn find_article_by_remote(
        &self,
        site_id: i64,
        remote_post_id: u64,
    ) -> Result<Option<LocalArticle>> {
        self.inner.find_article_by_remote(site_id, remote_post_id)
    }

    fn find_translation_for_article(
        &self,
        article_id: i64,
        language: Language,
    ) -> Result<Option<LocalTranslation>> {
        self.inner.find_translation_for_article(article_id, language)
    }

    fn ensure_default_template(&self) -> Result<i64> {
        self.inner.ensure_default_template()
    }

    fn create_article(&self, article: &NewArticle) -> Result<LocalArticle> {
        self.inner.create_article(article)
    }

    fn create_translation(&self, translation: &NewTranslation) -> Result<LocalTranslation> {
        if self.panic_on_translation.load(Ordering::SeqCst) {
            panic!("storage driver crashed");
        }
        self.inner.create_translation(translation)
    }

    fn update_translation(&self, translation_id: i64, update: &TranslationUpdate) -> Result<()> {
        self.inner.update_translation(translation_id, update)
    }
}

// ==================== End-to-End Counts ====================

#[tokio::test]
async fn test_full_then_incremental_counts() {
    let server = MockServer::start().await;
    mount_posts(
        &server,
        "lang",
        "en",
        json!([wp_post(3, "Third"), wp_post(2, "Second"), wp_post(1, "First")]),
    )
    .await;

    let (db, _temp_dir) = create_test_db();
    let site = register_site(&db, &server.uri());
    mark_detected(&db, site.id, Plugin::Polylang, &["en"]);
    let config = test_config();

    let first = sync_site(&config, &db, site.id, "app-pw", SyncMode::Full, None)
        .await
        .unwrap();
    assert_eq!(
        first,
        SyncResult {
            found: 3,
            synced: 3,
            skipped: 0,
            errors: vec![],
        }
    );

    let second = sync_site(&config, &db, site.id, "app-pw", SyncMode::Incremental, None)
        .await
        .unwrap();
    assert_eq!(
        second,
        SyncResult {
            found: 3,
            synced: 0,
            skipped: 3,
            errors: vec![],
        }
    );

    let site = db.get_site(site.id).unwrap().unwrap();
    assert_eq!(site.sync.status, SyncStatus::Success);
    assert_eq!(site.sync.total_found, 3);
    assert_eq!(site.sync.total_synced, 0);
    assert!(site.sync.last_error.is_none());
    assert!(site.sync.last_sync_at.is_some());
}

// ==================== Idempotence & Uniqueness ====================

#[tokio::test]
async fn test_repeated_syncs_never_duplicate() {
    let server = MockServer::start().await;
    mount_posts(
        &server,
        "wpml_language",
        "en",
        json!([wp_post(11, "Alpha"), wp_post(10, "Beta")]),
    )
    .await;
    mount_posts(&server, "wpml_language", "fr", json!([wp_post(21, "Gamma")])).await;

    let (db, _temp_dir) = create_test_db();
    let site = register_site(&db, &server.uri());
    mark_detected(&db, site.id, Plugin::Wpml, &["en", "fr"]);
    let config = test_config();

    for mode in [SyncMode::Full, SyncMode::Incremental, SyncMode::Full] {
        let result = sync_site(&config, &db, site.id, "pw", mode, None)
            .await
            .unwrap();
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert_eq!(result.found, 3);
    }

    assert_eq!(db.article_count().unwrap(), 3);
    assert_eq!(db.translation_count().unwrap(), 3);

    let translations = db.list_translations_for_site(site.id).unwrap();
    let mut keys: Vec<u64> = translations
        .iter()
        .filter_map(|t| t.remote_post_id)
        .collect();
    keys.sort_unstable();
    assert_eq!(keys, vec![10, 11, 21]);

    let french = translations
        .iter()
        .find(|t| t.remote_post_id == Some(21))
        .unwrap();
    assert_eq!(french.language, Language::FRENCH);
}

#[tokio::test]
async fn test_full_mode_applies_remote_edits() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wp-json/wp/v2/posts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([wp_post(5, "Draft Title")])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/wp-json/wp/v2/posts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([wp_post(5, "Final Title")])))
        .mount(&server)
        .await;

    let (db, _temp_dir) = create_test_db();
    let site = register_site(&db, &server.uri());
    mark_detected(&db, site.id, Plugin::Polylang, &["es"]);
    let config = test_config();

    sync_site(&config, &db, site.id, "pw", SyncMode::Full, None)
        .await
        .unwrap();
    let result = sync_site(&config, &db, site.id, "pw", SyncMode::Full, None)
        .await
        .unwrap();
    assert_eq!(result.synced, 1);

    let translation = db.find_translation_by_remote(site.id, 5).unwrap().unwrap();
    assert_eq!(translation.title, "Final Title");
    assert_eq!(translation.slug, "final-title");
    assert_eq!(translation.language, Language::SPANISH);
    assert_eq!(db.translation_count().unwrap(), 1);
}

// ==================== Partial Failure Isolation ====================

#[tokio::test]
async fn test_failing_language_does_not_stop_others() {
    let server = MockServer::start().await;
    mount_posts(&server, "lang", "en", json!([wp_post(1, "English")])).await;
    Mock::given(method("GET"))
        .and(path("/wp-json/wp/v2/posts"))
        .and(query_param("lang", "ar"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({"code": "rest_forbidden"})))
        .mount(&server)
        .await;
    mount_posts(&server, "lang", "es", json!([wp_post(3, "Spanish")])).await;

    let (db, _temp_dir) = create_test_db();
    let site = register_site(&db, &server.uri());
    mark_detected(&db, site.id, Plugin::Polylang, &["en", "ar", "es"]);

    let result = sync_site(&test_config(), &db, site.id, "pw", SyncMode::Full, None)
        .await
        .unwrap();

    assert_eq!(result.synced, 2);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].starts_with("ar:"), "{}", result.errors[0]);

    let site = db.get_site(site.id).unwrap().unwrap();
    assert_eq!(site.sync.status, SyncStatus::Partial);
    assert!(site.sync.last_error.unwrap().contains("ar:"));
}

#[tokio::test]
async fn test_every_language_failing_is_failed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wp-json/wp/v2/posts"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let (db, _temp_dir) = create_test_db();
    let site = register_site(&db, &server.uri());
    mark_detected(&db, site.id, Plugin::Polylang, &["en", "fr"]);

    let result = sync_site(&test_config(), &db, site.id, "wrong", SyncMode::Full, None)
        .await
        .unwrap();

    assert_eq!(result.synced, 0);
    assert_eq!(result.errors.len(), 2);
    let site = db.get_site(site.id).unwrap().unwrap();
    assert_eq!(site.sync.status, SyncStatus::Failed);
}

#[tokio::test]
async fn test_slow_language_times_out_without_blocking_others() {
    let server = MockServer::start().await;
    mount_posts(&server, "lang", "en", json!([wp_post(1, "Quick")])).await;
    Mock::given(method("GET"))
        .and(path("/wp-json/wp/v2/posts"))
        .and(query_param("lang", "ar"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([wp_post(2, "Slow")]))
                .set_delay(std::time::Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let (db, _temp_dir) = create_test_db();
    let site = register_site(&db, &server.uri());
    mark_detected(&db, site.id, Plugin::Polylang, &["ar", "en"]);
    let config = Config {
        http_timeout_secs: 1,
        ..test_config()
    };

    let result = sync_site(&config, &db, site.id, "pw", SyncMode::Full, None)
        .await
        .unwrap();

    assert_eq!(result.found, 1);
    assert_eq!(result.synced, 1);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].starts_with("ar:"), "{}", result.errors[0]);
    assert!(db.find_translation_by_remote(site.id, 1).unwrap().is_some());
    assert!(db.find_translation_by_remote(site.id, 2).unwrap().is_none());

    let site = db.get_site(site.id).unwrap().unwrap();
    assert_eq!(site.sync.status, SyncStatus::Partial);
}

#[tokio::test]
async fn test_transient_error_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wp-json/wp/v2/posts"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_posts(&server, "lang", "en", json!([wp_post(1, "Eventually")])).await;

    let (db, _temp_dir) = create_test_db();
    let site = register_site(&db, &server.uri());
    mark_detected(&db, site.id, Plugin::Polylang, &["en"]);

    let result = sync_site(&test_config(), &db, site.id, "pw", SyncMode::Full, None)
        .await
        .unwrap();

    assert_eq!(result.synced, 1);
    assert!(result.errors.is_empty());
}

// ==================== Status Never Stuck ====================

#[tokio::test]
async fn test_crash_mid_sync_ends_failed() {
    let server = MockServer::start().await;
    mount_posts(&server, "lang", "en", json!([wp_post(1, "Boom")])).await;

    let (db, _temp_dir) = create_test_db();
    let site = register_site(&db, &server.uri());
    mark_detected(&db, site.id, Plugin::Polylang, &["en"]);

    let store = FaultyStore::new(db.clone());
    store.panic_on_translation.store(true, Ordering::SeqCst);

    let result = sync_site(&test_config(), &store, site.id, "pw", SyncMode::Full, None)
        .await
        .unwrap();

    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].contains("storage driver crashed"));

    let site = db.get_site(site.id).unwrap().unwrap();
    assert_eq!(site.sync.status, SyncStatus::Failed);
    assert!(site.sync.last_error.unwrap().contains("crashed"));

    // The site can be synced again afterwards
    store.panic_on_translation.store(false, Ordering::SeqCst);
    let retry = sync_site(&test_config(), &store, site.id, "pw", SyncMode::Full, None)
        .await
        .unwrap();
    assert_eq!(retry.synced, 1);
}

#[tokio::test]
async fn test_unrecordable_outcome_falls_back_to_failed() {
    let server = MockServer::start().await;
    mount_posts(&server, "lang", "en", json!([wp_post(1, "Fine")])).await;

    let (db, _temp_dir) = create_test_db();
    let site = register_site(&db, &server.uri());
    mark_detected(&db, site.id, Plugin::Polylang, &["en"]);

    let store = FaultyStore::new(db.clone());
    store.reject_final_status.store(true, Ordering::SeqCst);

    let result = sync_site(&test_config(), &store, site.id, "pw", SyncMode::Full, None)
        .await
        .unwrap();

    assert_eq!(result.synced, 1);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].contains("status write rejected"));

    let site = db.get_site(site.id).unwrap().unwrap();
    assert_eq!(site.sync.status, SyncStatus::Failed);
    assert!(site
        .sync
        .last_error
        .unwrap()
        .contains("Failed to record sync outcome"));
}

#[tokio::test]
async fn test_concurrent_sync_is_rejected() {
    let (db, _temp_dir) = create_test_db();
    let site = register_site(&db, "https://news.example.com");
    mark_detected(&db, site.id, Plugin::Polylang, &["en"]);

    db.save_sync_state(
        site.id,
        &SiteSyncState {
            status: SyncStatus::Syncing,
            sync_started_at: Some(Utc::now()),
            ..SiteSyncState::default()
        },
    )
    .unwrap();

    let result = sync_site(&test_config(), &db, site.id, "pw", SyncMode::Full, None).await;
    assert!(matches!(result, Err(SyncError::AlreadySyncing { .. })));
}

#[tokio::test]
async fn test_stale_sync_can_be_taken_over() {
    let server = MockServer::start().await;
    mount_posts(&server, "lang", "en", json!([])).await;

    let (db, _temp_dir) = create_test_db();
    let site = register_site(&db, &server.uri());
    mark_detected(&db, site.id, Plugin::Polylang, &["en"]);

    db.save_sync_state(
        site.id,
        &SiteSyncState {
            status: SyncStatus::Syncing,
            sync_started_at: Some(Utc::now() - chrono::Duration::hours(3)),
            ..SiteSyncState::default()
        },
    )
    .unwrap();

    let result = sync_site(&test_config(), &db, site.id, "pw", SyncMode::Full, None)
        .await
        .unwrap();
    assert_eq!(result.found, 0);

    let site = db.get_site(site.id).unwrap().unwrap();
    assert_ne!(site.sync.status, SyncStatus::Syncing);
}

// ==================== Detection Priority ====================

#[tokio::test]
async fn test_wpml_wins_when_several_plugins_answer() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wp-json/wpml/v1/languages"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{"code": "en"}, {"code": "ar"}])),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/wp-json/wp/v2/posts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 1, "lang": "en", "translations": {"fr": 2}}
        ])))
        .mount(&server)
        .await;

    let info = detect_plugin_for(&test_config(), &server.uri(), "editor", "pw")
        .await
        .unwrap();

    assert_eq!(info.plugin, Plugin::Wpml);
    assert_eq!(info.supported_languages, vec!["en", "ar"]);
}

#[tokio::test]
async fn test_plain_site_detects_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let info = detect_plugin_for(&test_config(), &server.uri(), "editor", "pw")
        .await
        .unwrap();

    assert_eq!(info.plugin, Plugin::None);
    assert!(info.supported_languages.is_empty());
}
