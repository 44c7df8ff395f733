//! Remote language tag normalization.
//!
//! WordPress plugins disagree on how to spell a language: WPML reports
//! "ar", TranslatePress "ar_SA", Polylang slugs may be "ar-sa", and some
//! settings pages hand back "EN". `normalize` folds all of these onto a
//! canonical [`Language`], or returns `None` when the tag is not one of
//! ours. A `None` is a per-item problem for the caller, never fatal.

use crate::i18n::{Language, LanguageRegistry};

/// Map a raw remote language tag to a canonical language.
///
/// Lookup order:
/// 1. trimmed, lowercased tag against the alias table
/// 2. first two characters against the primary subtags
/// 3. uppercased tag against the canonical codes
pub fn normalize(raw: &str) -> Option<Language> {
    let registry = LanguageRegistry::get();
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let lowered = trimmed.to_lowercase();
    if let Some(config) = registry.get_by_alias(&lowered) {
        return Some(Language::from_config(config));
    }

    let primary: String = lowered.chars().take(2).collect();
    if let Some(config) = registry.get_by_primary(&primary) {
        return Some(Language::from_config(config));
    }

    registry
        .get_by_code(&trimmed.to_uppercase())
        .map(Language::from_config)
}
