//! Internationalization module
//!
//! Localized display strings for drain types, label fallbacks and the
//! ranked table, in English and French. App names come from the label
//! resolver; this module only covers the built-in vocabulary.

mod en;
mod fr;

/// A supported display language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    En,
    Fr,
}

impl Language {
    /// Supported languages, in menu order.
    pub const ALL: [Language; 2] = [Language::En, Language::Fr];

    pub fn code(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Fr => "fr",
        }
    }

    pub fn native_name(self) -> &'static str {
        match self {
            Language::En => "English",
            Language::Fr => "Fran\u{00E7}ais",
        }
    }

    fn table(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Language::En => en::TABLE,
            Language::Fr => fr::TABLE,
        }
    }

    /// Parse a configured language code.
    pub fn from_code(code: &str) -> Option<Language> {
        Language::ALL.into_iter().find(|l| l.code() == code)
    }

    /// Pick a language from the process locale, e.g. "fr_FR.UTF-8" -> Fr.
    fn detect() -> Language {
        let raw = std::env::var("LANG")
            .or_else(|_| std::env::var("LC_ALL"))
            .or_else(|_| std::env::var("LC_MESSAGES"))
            .unwrap_or_default();
        let code = raw.split(&['_', '.'][..]).next().unwrap_or("");
        Language::from_code(code).unwrap_or(Language::En)
    }
}

/// Internationalization manager
pub struct I18n {
    language: Language,
}

impl I18n {
    /// Create a manager for a configured language code; "auto" detects
    /// from the environment.
    pub fn new(code: &str) -> Self {
        let mut i18n = Self {
            language: Language::En,
        };
        i18n.set_language(code);
        i18n
    }

    /// Switch languages. Unsupported codes fall back to English.
    pub fn set_language(&mut self, code: &str) {
        self.language = match code {
            "auto" => Language::detect(),
            other => Language::from_code(other).unwrap_or_else(|| {
                log::warn!("Unsupported language '{}', falling back to English", other);
                Language::En
            }),
        };
        log::info!("Language set to: {}", self.language.code());
    }

    /// Look up a translated string; unknown keys echo back unchanged.
    pub fn get(&self, key: &str) -> String {
        self.language
            .table()
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| (*v).to_string())
            .unwrap_or_else(|| key.to_string())
    }

    /// Code of the current language
    pub fn current_language(&self) -> &str {
        self.language.code()
    }

    /// Languages offered in settings, as (code, native name) pairs
    pub fn available_languages() -> Vec<(&'static str, &'static str)> {
        Language::ALL
            .into_iter()
            .map(|l| (l.code(), l.native_name()))
            .collect()
    }
}

impl Default for I18n {
    fn default() -> Self {
        Self::new("auto")
    }
}
