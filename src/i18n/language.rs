//! Language type: validated canonical language.
//!
//! A `Language` can only be constructed for codes present in the registry,
//! so any value of this type is safe to persist as a local language.

use crate::i18n::{LanguageConfig, LanguageRegistry};
use anyhow::{bail, Result};
use serde::{Serialize, Serializer};
use std::fmt;

/// A validated canonical language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Language {
    /// Canonical code (e.g., "EN", "AR")
    code: &'static str,
}

impl Language {
    pub const ENGLISH: Language = Language { code: "EN" };
    pub const ARABIC: Language = Language { code: "AR" };
    pub const FRENCH: Language = Language { code: "FR" };
    pub const SPANISH: Language = Language { code: "ES" };

    /// Create a Language from an exact canonical code ("EN").
    ///
    /// This is the strict constructor used when reading local data. Remote
    /// tags go through [`crate::i18n::normalize`] instead.
    pub fn from_code(code: &str) -> Result<Language> {
        match LanguageRegistry::get().get_by_code(code) {
            Some(config) => Ok(Language { code: config.code }),
            None => bail!("Unknown canonical language code: '{}'", code),
        }
    }

    pub(crate) fn from_config(config: &LanguageConfig) -> Language {
        Language { code: config.code }
    }

    /// Get the canonical code.
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// Get the full language configuration from the registry.
    ///
    /// # Panics
    /// Panics if the code is not in the registry, which cannot happen for a
    /// Language built through `from_code`, `normalize` or the constants.
    pub fn config(&self) -> &'static LanguageConfig {
        LanguageRegistry::get()
            .get_by_code(self.code)
            .expect("Language code should always be valid")
    }

    /// English name of the language.
    pub fn name(&self) -> &'static str {
        self.config().name
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code)
    }
}

impl Serialize for Language {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code)
    }
}
