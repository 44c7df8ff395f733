use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Errors from the WordPress REST API, split so retry logic can tell
/// transient failures from permanent ones.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("WordPress API error ({status}): {body}")]
    Status { status: u16, body: String },

    #[error("Request to WordPress failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Malformed WordPress response: {0}")]
    Decode(String),
}

impl FetchError {
    /// 429, 5xx and network-level failures are worth another attempt.
    /// Other 4xx (bad credentials, unknown route) will not fix themselves.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            FetchError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            FetchError::Decode(_) => false,
        }
    }

    /// WordPress answers a page past the end with 400
    /// `rest_post_invalid_page_number`. Only meaningful for page > 1.
    pub fn is_past_last_page(&self) -> bool {
        matches!(self, FetchError::Status { status: 400, .. })
    }
}

/// WordPress wraps rendered strings as `{"rendered": "..."}`
#[derive(Debug, Default, Deserialize)]
struct Rendered {
    #[serde(default)]
    rendered: String,
}

/// Post shape as returned by `/wp/v2/posts`, including the language fields
/// the various translation plugins bolt on.
#[derive(Debug, Deserialize)]
struct WpPost {
    id: u64,
    #[serde(default)]
    title: Rendered,
    #[serde(default)]
    content: Rendered,
    #[serde(default)]
    excerpt: Rendered,
    #[serde(default)]
    slug: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    status: String,
    date_gmt: Option<String>,
    modified_gmt: Option<String>,
    // Polylang / qTranslate-XT
    lang: Option<String>,
    // WPML
    wpml_current_locale: Option<String>,
    // TranslatePress
    trp_language: Option<String>,
}

/// A post as seen on the remote site. Transient: reconciliation copies the
/// fields it needs into local records and drops this value.
#[derive(Debug, Clone, PartialEq)]
pub struct RemotePost {
    pub id: u64,
    pub title: String,
    pub content: String,
    pub excerpt: String,
    pub slug: String,
    pub link: String,
    /// Raw language tag reported by the plugin, if the post carries one
    pub language: Option<String>,
    /// WordPress post status ("publish", "draft", "future", ...)
    pub status: String,
    pub published_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
}

impl RemotePost {
    pub fn is_published(&self) -> bool {
        self.status == "publish"
    }
}

impl From<WpPost> for RemotePost {
    fn from(post: WpPost) -> Self {
        let language = post
            .lang
            .or(post.wpml_current_locale)
            .or(post.trp_language)
            .filter(|l| !l.trim().is_empty());

        Self {
            id: post.id,
            title: post.title.rendered,
            content: post.content.rendered,
            excerpt: post.excerpt.rendered,
            slug: post.slug,
            link: post.link,
            language,
            status: post.status,
            published_at: post.date_gmt.as_deref().and_then(parse_wp_datetime),
            modified_at: post.modified_gmt.as_deref().and_then(parse_wp_datetime),
        }
    }
}

/// WordPress `*_gmt` fields are naive ISO timestamps without an offset.
fn parse_wp_datetime(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|dt| dt.and_utc())
        .or_else(|| {
            DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        })
}

/// One page of posts filtered to a single language
#[derive(Debug, Clone)]
pub struct PostQuery<'a> {
    pub page: u32,
    pub per_page: u32,
    /// Plugin-specific filter parameter name (`lang`, `wpml_language`, ...)
    pub language_param: &'a str,
    pub language: &'a str,
}

#[derive(Debug, Clone)]
pub struct PostPage {
    pub posts: Vec<RemotePost>,
    /// Value of `X-WP-TotalPages`, when the site sends it
    pub total_pages: Option<u32>,
}

/// Authenticated client for one WordPress site's REST API.
///
/// Every request uses HTTP Basic auth with an application password and the
/// configured timeout.
#[derive(Debug, Clone)]
pub struct WordPressClient {
    http: reqwest::Client,
    api_root: String,
    username: String,
    app_password: String,
}

impl WordPressClient {
    pub fn new(
        base_url: &str,
        username: &str,
        app_password: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let base = base_url.trim().trim_end_matches('/');
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            bail!("Site URL must start with http:// or https://: {}", base_url);
        }

        let api_root = if base.ends_with("/wp-json") {
            base.to_string()
        } else {
            format!("{}/wp-json", base)
        };

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("wp-multilingual-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            api_root,
            username: username.to_string(),
            app_password: app_password.to_string(),
        })
    }

    pub fn api_root(&self) -> &str {
        &self.api_root
    }

    /// Authenticated GET against a REST route (e.g. `/wpml/v1/languages`).
    ///
    /// Returns the raw response so probers can inspect status and headers
    /// themselves; a non-2xx status is not an error here.
    pub async fn get(
        &self,
        route: &str,
        query: &[(&str, &str)],
    ) -> Result<reqwest::Response, reqwest::Error> {
        let url = format!("{}{}", self.api_root, route);
        debug!("GET {} {:?}", url, query);

        self.http
            .get(&url)
            .basic_auth(&self.username, Some(&self.app_password))
            .query(query)
            .send()
            .await
    }

    /// Fetch one page of posts, newest first, for one language.
    pub async fn fetch_posts(&self, query: &PostQuery<'_>) -> Result<PostPage, FetchError> {
        let page = query.page.to_string();
        let per_page = query.per_page.to_string();

        let response = self
            .get(
                "/wp/v2/posts",
                &[
                    ("page", page.as_str()),
                    ("per_page", per_page.as_str()),
                    ("orderby", "date"),
                    ("order", "desc"),
                    (query.language_param, query.language),
                ],
            )
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("<failed to read body: {}>", e));
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let total_pages = response
            .headers()
            .get("x-wp-totalpages")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u32>().ok());

        let body = response.text().await?;
        let posts: Vec<WpPost> =
            serde_json::from_str(&body).map_err(|e| FetchError::Decode(e.to_string()))?;

        Ok(PostPage {
            posts: posts.into_iter().map(RemotePost::from).collect(),
            total_pages,
        })
    }
}
