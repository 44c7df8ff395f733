//! Canonical languages and remote language-tag normalization.
//!
//! # Architecture
//!
//! - `registry`: the four canonical languages and their alias tables
//! - `language`: validated `Language` type stored on local records
//! - `normalizer`: maps raw WordPress language tags onto a `Language`
//!
//! # Example
//!
//! ```rust,ignore
//! use crate::i18n::{normalize, Language};
//!
//! assert_eq!(normalize("ar_SA"), Some(Language::ARABIC));
//! assert_eq!(normalize("xx-unknown"), None);
//! ```

mod language;
mod normalizer;
mod registry;

pub use language::Language;
pub use normalizer::normalize;
pub use registry::{LanguageConfig, LanguageRegistry};
