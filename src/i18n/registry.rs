//! Language registry: Single source of truth for the canonical languages.
//!
//! Every remote language tag is eventually mapped onto one of the languages
//! listed here. The registry uses a `OnceLock` singleton so the alias tables
//! are built once and shared across sync runs.

use std::sync::OnceLock;

/// Configuration for a canonical language.
#[derive(Debug, Clone)]
pub struct LanguageConfig {
    /// Canonical code stored locally (e.g., "EN", "AR")
    pub code: &'static str,

    /// ISO 639-1 primary subtag (e.g., "en", "ar")
    pub primary: &'static str,

    /// English name of the language
    pub name: &'static str,

    /// Native name of the language
    pub native_name: &'static str,

    /// Lowercase remote spellings that map exactly onto this language.
    ///
    /// Covers WordPress locales ("ar_sa"), BCP 47 tags ("ar-sa") and the
    /// English names some plugins expose instead of codes.
    pub aliases: &'static [&'static str],
}

/// Global language registry singleton.
pub struct LanguageRegistry {
    languages: Vec<LanguageConfig>,
}

static REGISTRY: OnceLock<LanguageRegistry> = OnceLock::new();

impl LanguageRegistry {
    /// Get the global language registry instance.
    pub fn get() -> &'static LanguageRegistry {
        REGISTRY.get_or_init(|| LanguageRegistry {
            languages: default_languages(),
        })
    }

    /// Look up a language by its canonical code ("EN"). Case-sensitive.
    pub fn get_by_code(&self, code: &str) -> Option<&LanguageConfig> {
        self.languages.iter().find(|lang| lang.code == code)
    }

    /// Look up a language by an exact lowercase alias ("ar_sa", "english").
    pub fn get_by_alias(&self, alias: &str) -> Option<&LanguageConfig> {
        self.languages
            .iter()
            .find(|lang| lang.aliases.contains(&alias))
    }

    /// Look up a language by its two-letter primary subtag ("fr").
    pub fn get_by_primary(&self, primary: &str) -> Option<&LanguageConfig> {
        self.languages.iter().find(|lang| lang.primary == primary)
    }

    /// All canonical languages in registry order.
    pub fn list_all(&self) -> Vec<&LanguageConfig> {
        self.languages.iter().collect()
    }
}

fn default_languages() -> Vec<LanguageConfig> {
    vec![
        LanguageConfig {
            code: "EN",
            primary: "en",
            name: "English",
            native_name: "English",
            aliases: &[
                "en", "en_us", "en-us", "en_gb", "en-gb", "en_au", "en-au", "en_ca", "en-ca",
                "eng", "english",
            ],
        },
        LanguageConfig {
            code: "AR",
            primary: "ar",
            name: "Arabic",
            native_name: "العربية",
            aliases: &[
                "ar", "ar_sa", "ar-sa", "ar_ae", "ar-ae", "ar_eg", "ar-eg", "ar_ma", "ar-ma",
                "ara", "arabic",
            ],
        },
        LanguageConfig {
            code: "FR",
            primary: "fr",
            name: "French",
            native_name: "Français",
            aliases: &[
                "fr", "fr_fr", "fr-fr", "fr_ca", "fr-ca", "fr_be", "fr-be", "fra", "fre",
                "french",
            ],
        },
        LanguageConfig {
            code: "ES",
            primary: "es",
            name: "Spanish",
            native_name: "Español",
            aliases: &[
                "es", "es_es", "es-es", "es_mx", "es-mx", "es_ar", "es-ar", "spa", "spanish",
            ],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_has_four_languages() {
        assert_eq!(LanguageRegistry::get().list_all().len(), 4);
    }

    #[test]
    fn test_codes_are_uppercase_primary() {
        for lang in LanguageRegistry::get().list_all() {
            assert_eq!(lang.code, lang.primary.to_uppercase());
        }
    }

    #[test]
    fn test_aliases_are_lowercase_and_unique() {
        let registry = LanguageRegistry::get();
        let mut seen = std::collections::HashSet::new();
        for lang in registry.list_all() {
            for alias in lang.aliases {
                assert_eq!(*alias, alias.to_lowercase());
                assert!(seen.insert(*alias), "duplicate alias {}", alias);
            }
        }
    }

    #[test]
    fn test_get_by_code_is_case_sensitive() {
        let registry = LanguageRegistry::get();
        assert!(registry.get_by_code("AR").is_some());
        assert!(registry.get_by_code("ar").is_none());
    }

    #[test]
    fn test_get_by_primary() {
        let registry = LanguageRegistry::get();
        assert_eq!(registry.get_by_primary("es").map(|l| l.code), Some("ES"));
        assert!(registry.get_by_primary("de").is_none());
    }
}
