//! Translation plugin detection.
//!
//! WordPress has no endpoint that answers "which multilingual plugin is
//! active", so detection runs a fixed, ordered list of probers against the
//! site's REST API and takes the first positive answer. Order matters:
//! several plugins accept a `lang` query parameter, so the more specific
//! namespaces are tried first.

use crate::config::Config;
use crate::db::ContentStore;
use crate::wordpress::WordPressClient;
use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Translation plugins we know how to recognise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Plugin {
    None,
    Wpml,
    Polylang,
    TranslatePress,
    Weglot,
    LocoTranslate,
    QtranslateXt,
}

impl Plugin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Plugin::None => "NONE",
            Plugin::Wpml => "WPML",
            Plugin::Polylang => "POLYLANG",
            Plugin::TranslatePress => "TRANSLATE_PRESS",
            Plugin::Weglot => "WEGLOT",
            Plugin::LocoTranslate => "LOCO_TRANSLATE",
            Plugin::QtranslateXt => "QTRANSLATE_XT",
        }
    }

    pub fn parse(value: &str) -> Option<Plugin> {
        [
            Plugin::None,
            Plugin::Wpml,
            Plugin::Polylang,
            Plugin::TranslatePress,
            Plugin::Weglot,
            Plugin::LocoTranslate,
            Plugin::QtranslateXt,
        ]
        .into_iter()
        .find(|p| p.as_str() == value)
    }

    /// Query parameter that filters `/wp/v2/posts` by language for this plugin.
    pub fn language_param(&self) -> &'static str {
        match self {
            Plugin::Wpml => "wpml_language",
            Plugin::TranslatePress => "trp-language",
            _ => "lang",
        }
    }
}

impl fmt::Display for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a detection run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginInfo {
    pub plugin: Plugin,
    pub version: Option<String>,
    /// Language tags exactly as the remote reported them
    pub supported_languages: Vec<String>,
    pub settings: Value,
}

impl PluginInfo {
    /// "No plugin detected". A valid outcome, not an error.
    pub fn none() -> Self {
        Self {
            plugin: Plugin::None,
            version: None,
            supported_languages: Vec::new(),
            settings: json!({}),
        }
    }
}

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("Invalid site: {0}")]
    InvalidSite(String),

    #[error("Site {0} not found")]
    SiteNotFound(i64),

    #[error("Site is unreachable: {0}")]
    Unreachable(String),

    #[error("Storage error: {0}")]
    Store(String),
}

/// One plugin-specific probe.
///
/// `Ok(None)` means "not this plugin". Errors are logged and treated the
/// same way by the detector.
#[async_trait]
pub trait PluginProber: Send + Sync {
    fn plugin(&self) -> Plugin;

    async fn probe(&self, client: &WordPressClient) -> Result<Option<PluginInfo>>;
}

/// Runs probers in order, first match wins
pub struct PluginDetector {
    probers: Vec<Box<dyn PluginProber>>,
}

impl Default for PluginDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginDetector {
    /// Detector with the standard priority order:
    /// WPML, Polylang, TranslatePress, Weglot, Loco Translate, qTranslate-XT.
    pub fn new() -> Self {
        Self::with_probers(vec![
            Box::new(WpmlProber),
            Box::new(PolylangProber),
            Box::new(TranslatePressProber),
            Box::new(WeglotProber),
            Box::new(LocoTranslateProber),
            Box::new(QtranslateXtProber),
        ])
    }

    pub fn with_probers(probers: Vec<Box<dyn PluginProber>>) -> Self {
        Self { probers }
    }

    pub async fn detect(&self, client: &WordPressClient) -> Result<PluginInfo, DetectError> {
        for (index, prober) in self.probers.iter().enumerate() {
            let plugin = prober.plugin();
            debug!("Probing {} for {}", client.api_root(), plugin);

            match prober.probe(client).await {
                Ok(Some(info)) => {
                    info!(
                        "✓ Detected {} on {} ({} languages)",
                        info.plugin,
                        client.api_root(),
                        info.supported_languages.len()
                    );
                    return Ok(info);
                }
                Ok(None) => debug!("{} probe negative", plugin),
                Err(e) => {
                    // The first request doubles as a reachability check
                    if index == 0 && is_unreachable(&e) {
                        warn!("Site {} unreachable: {}", client.api_root(), e);
                        return Err(DetectError::Unreachable(e.to_string()));
                    }
                    warn!("{} probe failed, continuing: {}", plugin, e);
                }
            }
        }

        info!("No translation plugin detected on {}", client.api_root());
        Ok(PluginInfo::none())
    }
}

fn is_unreachable(error: &anyhow::Error) -> bool {
    error
        .downcast_ref::<reqwest::Error>()
        .map(|e| e.is_connect() || e.is_timeout())
        .unwrap_or(false)
}

/// `DetectPlugin(siteURL, username, appPassword)`
pub async fn detect_plugin_for(
    config: &Config,
    site_url: &str,
    username: &str,
    app_password: &str,
) -> Result<PluginInfo, DetectError> {
    let client = WordPressClient::new(site_url, username, app_password, config.http_timeout())
        .map_err(|e| DetectError::InvalidSite(e.to_string()))?;
    PluginDetector::new().detect(&client).await
}

/// Detect the plugin for a stored site and persist the result on it.
pub async fn detect_and_store(
    config: &Config,
    store: &dyn ContentStore,
    site_id: i64,
    app_password: &str,
) -> Result<PluginInfo, DetectError> {
    let site = store
        .get_site(site_id)
        .map_err(|e| DetectError::Store(e.to_string()))?
        .ok_or(DetectError::SiteNotFound(site_id))?;

    let info = detect_plugin_for(config, &site.base_url, &site.username, app_password).await?;

    store
        .save_plugin_info(site_id, &info)
        .map_err(|e| DetectError::Store(e.to_string()))?;

    Ok(info)
}

// ==================== Probe Helpers ====================

struct Probed {
    headers: HeaderMap,
    body: Value,
}

/// GET a route and decode JSON. Non-2xx and non-JSON bodies are "no signal".
async fn get_json(
    client: &WordPressClient,
    route: &str,
    query: &[(&str, &str)],
) -> Result<Option<Probed>> {
    let response = client.get(route, query).await?;
    let status = response.status();
    if !status.is_success() {
        debug!("{} returned {}", route, status);
        return Ok(None);
    }

    let headers = response.headers().clone();
    let text = response.text().await?;
    match serde_json::from_str(&text) {
        Ok(body) => Ok(Some(Probed { headers, body })),
        Err(e) => {
            debug!("{} returned non-JSON body: {}", route, e);
            Ok(None)
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn has_header_containing(headers: &HeaderMap, needle: &str) -> bool {
    headers.keys().any(|k| k.as_str().contains(needle))
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Pull language codes out of the shapes plugins use for language lists:
/// `["en", ...]`, `[{"code": "en"}, ...]`, `{"en": {...}, ...}` or
/// `{"languages": <any of those>}`.
fn extract_language_codes(value: &Value) -> Vec<String> {
    const CODE_KEYS: [&str; 5] = ["code", "language_code", "locale", "slug", "language_to"];

    let mut codes = Vec::new();
    match value {
        Value::Array(items) => {
            for item in items {
                match item {
                    Value::String(s) => codes.push(s.clone()),
                    Value::Object(obj) => {
                        if let Some(code) = CODE_KEYS
                            .iter()
                            .find_map(|k| obj.get(*k).and_then(Value::as_str))
                        {
                            codes.push(code.to_string());
                        }
                    }
                    _ => {}
                }
            }
        }
        Value::Object(obj) => {
            if let Some(inner) = obj.get("languages") {
                return extract_language_codes(inner);
            }
            for (key, inner) in obj {
                if inner.is_object() {
                    codes.push(key.clone());
                }
            }
        }
        _ => {}
    }

    dedup_preserving_order(codes)
}

fn dedup_preserving_order(codes: Vec<String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    codes
        .into_iter()
        .filter(|c| !c.trim().is_empty())
        .filter(|c| seen.insert(c.clone()))
        .collect()
}

fn first_post(body: &Value) -> Option<&serde_json::Map<String, Value>> {
    body.as_array()?.first()?.as_object()
}

// ==================== Probers ====================

/// `GET /wpml/v1/languages`
pub struct WpmlProber;

#[async_trait]
impl PluginProber for WpmlProber {
    fn plugin(&self) -> Plugin {
        Plugin::Wpml
    }

    async fn probe(&self, client: &WordPressClient) -> Result<Option<PluginInfo>> {
        let Some(probed) = get_json(client, "/wpml/v1/languages", &[]).await? else {
            return Ok(None);
        };

        let languages = extract_language_codes(&probed.body);
        if languages.is_empty() {
            return Ok(None);
        }

        let version = probed
            .body
            .get("version")
            .and_then(Value::as_str)
            .or_else(|| header_str(&probed.headers, "x-wpml-version"))
            .map(str::to_string);

        Ok(Some(PluginInfo {
            plugin: Plugin::Wpml,
            version,
            supported_languages: languages,
            settings: json!({
                "defaultLanguage": probed.body.get("default_language").cloned().unwrap_or(Value::Null),
            }),
        }))
    }
}

/// `GET /wp/v2/posts?per_page=1&lang=all`, inspecting headers and the
/// `lang`/`translations` fields Polylang adds to posts.
pub struct PolylangProber;

#[async_trait]
impl PluginProber for PolylangProber {
    fn plugin(&self) -> Plugin {
        Plugin::Polylang
    }

    async fn probe(&self, client: &WordPressClient) -> Result<Option<PluginInfo>> {
        let Some(probed) =
            get_json(client, "/wp/v2/posts", &[("per_page", "1"), ("lang", "all")]).await?
        else {
            return Ok(None);
        };

        let header_signal = has_header_containing(&probed.headers, "polylang")
            || has_header_containing(&probed.headers, "pll");
        let post = first_post(&probed.body);
        let post_signal = post
            .map(|p| p.get("lang").map(Value::is_string).unwrap_or(false) || p.contains_key("translations"))
            .unwrap_or(false);

        if !header_signal && !post_signal {
            return Ok(None);
        }

        let mut languages = Vec::new();
        if let Some(post) = post {
            if let Some(lang) = post.get("lang").and_then(Value::as_str) {
                languages.push(lang.to_string());
            }
            if let Some(translations) = post.get("translations").and_then(Value::as_object) {
                languages.extend(translations.keys().cloned());
            }
        }

        // Polylang Pro exposes the full list; the free plugin does not
        match get_json(client, "/pll/v1/languages", &[]).await {
            Ok(Some(list)) => languages.extend(extract_language_codes(&list.body)),
            Ok(None) => {}
            Err(e) => debug!("Polylang language list unavailable: {}", e),
        }

        Ok(Some(PluginInfo {
            plugin: Plugin::Polylang,
            version: header_str(&probed.headers, "x-polylang-version").map(str::to_string),
            supported_languages: dedup_preserving_order(languages),
            settings: json!({ "headerSignal": header_signal }),
        }))
    }
}

/// `GET /wp/v2/posts?per_page=1&trp-language=en_US`
pub struct TranslatePressProber;

#[async_trait]
impl PluginProber for TranslatePressProber {
    fn plugin(&self) -> Plugin {
        Plugin::TranslatePress
    }

    async fn probe(&self, client: &WordPressClient) -> Result<Option<PluginInfo>> {
        let Some(probed) = get_json(
            client,
            "/wp/v2/posts",
            &[("per_page", "1"), ("trp-language", "en_US")],
        )
        .await?
        else {
            return Ok(None);
        };

        let header_signal = has_header_containing(&probed.headers, "x-trp");
        let post_language = first_post(&probed.body)
            .and_then(|p| p.get("trp_language"))
            .and_then(Value::as_str)
            .map(str::to_string);

        if !header_signal && post_language.is_none() {
            return Ok(None);
        }

        let mut languages = header_str(&probed.headers, "x-trp-languages")
            .map(split_list)
            .unwrap_or_default();
        languages.extend(post_language);
        if languages.is_empty() {
            languages.push("en_US".to_string());
        }

        Ok(Some(PluginInfo {
            plugin: Plugin::TranslatePress,
            version: header_str(&probed.headers, "x-trp-version").map(str::to_string),
            supported_languages: dedup_preserving_order(languages),
            settings: json!({
                "defaultLanguage": header_str(&probed.headers, "x-trp-default-language"),
            }),
        }))
    }
}

/// `GET /weglot/v1/languages`
pub struct WeglotProber;

#[async_trait]
impl PluginProber for WeglotProber {
    fn plugin(&self) -> Plugin {
        Plugin::Weglot
    }

    async fn probe(&self, client: &WordPressClient) -> Result<Option<PluginInfo>> {
        let Some(probed) = get_json(client, "/weglot/v1/languages", &[]).await? else {
            return Ok(None);
        };

        let body = &probed.body;
        let original = body
            .get("original_language")
            .and_then(Value::as_str)
            .map(str::to_string);

        let mut languages: Vec<String> = original.iter().cloned().collect();
        match body.get("destination_languages") {
            Some(destinations) => languages.extend(extract_language_codes(destinations)),
            None => languages.extend(extract_language_codes(body)),
        }

        let languages = dedup_preserving_order(languages);
        if languages.is_empty() {
            return Ok(None);
        }

        Ok(Some(PluginInfo {
            plugin: Plugin::Weglot,
            version: body.get("version").and_then(Value::as_str).map(str::to_string),
            supported_languages: languages,
            settings: json!({ "originalLanguage": original }),
        }))
    }
}

/// `GET /loco/v1/locales`
pub struct LocoTranslateProber;

#[async_trait]
impl PluginProber for LocoTranslateProber {
    fn plugin(&self) -> Plugin {
        Plugin::LocoTranslate
    }

    async fn probe(&self, client: &WordPressClient) -> Result<Option<PluginInfo>> {
        let Some(probed) = get_json(client, "/loco/v1/locales", &[]).await? else {
            return Ok(None);
        };

        let languages = extract_language_codes(&probed.body);
        if languages.is_empty() {
            return Ok(None);
        }

        Ok(Some(PluginInfo {
            plugin: Plugin::LocoTranslate,
            version: header_str(&probed.headers, "x-loco-version").map(str::to_string),
            supported_languages: languages,
            settings: json!({}),
        }))
    }
}

static QTX_MARKER_REGEX: OnceLock<Regex> = OnceLock::new();

/// Matches `[:en]`, `{:en}` and `<!--:en-->` language blocks
fn qtx_marker_regex() -> &'static Regex {
    QTX_MARKER_REGEX.get_or_init(|| {
        Regex::new(r"(?:\[:([a-z]{2})\]|\{:([a-z]{2})\}|<!--:([a-z]{2})-->)")
            .expect("qTranslate marker regex is valid")
    })
}

fn qtx_languages(text: &str) -> Vec<String> {
    qtx_marker_regex()
        .captures_iter(text)
        .filter_map(|cap| cap.get(1).or_else(|| cap.get(2)).or_else(|| cap.get(3)))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// `GET /wp/v2/posts?per_page=1&lang=en`, looking for qTranslate-XT's
/// inline language markers or its REST fields.
pub struct QtranslateXtProber;

#[async_trait]
impl PluginProber for QtranslateXtProber {
    fn plugin(&self) -> Plugin {
        Plugin::QtranslateXt
    }

    async fn probe(&self, client: &WordPressClient) -> Result<Option<PluginInfo>> {
        let Some(probed) =
            get_json(client, "/wp/v2/posts", &[("per_page", "1"), ("lang", "en")]).await?
        else {
            return Ok(None);
        };

        let header_signal = has_header_containing(&probed.headers, "qtranslate");
        let field_signal = first_post(&probed.body)
            .map(|p| p.keys().any(|k| k.starts_with("qtranslate") || k.starts_with("qtx")))
            .unwrap_or(false);
        let marker_languages = qtx_languages(&probed.body.to_string());

        if !header_signal && !field_signal && marker_languages.is_empty() {
            return Ok(None);
        }

        let mut languages = header_str(&probed.headers, "x-qtranslate-languages")
            .map(split_list)
            .unwrap_or_default();
        languages.extend(marker_languages);
        if languages.is_empty() {
            languages.push("en".to_string());
        }

        Ok(Some(PluginInfo {
            plugin: Plugin::QtranslateXt,
            version: header_str(&probed.headers, "x-qtranslate-version").map(str::to_string),
            supported_languages: dedup_preserving_order(languages),
            settings: json!({}),
        }))
    }
}
