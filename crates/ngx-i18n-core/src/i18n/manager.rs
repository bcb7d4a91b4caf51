//! Merges translations from the source xlf and the workbook into one table.

use std::sync::LazyLock;

use regex::Regex;

use super::types::{group_by_locale, Key, KeyLocaleValueMap, KeyValueMap, Locale, LocaleKeyValueMap};

const DEFAULT_TRANSLATION_VALUE: &str = "";

/// ASCII whitespace only: typographic spaces such as U+00A0 are content.
static MULTIPLE_SPACES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\t\n\x0C\r ]{2,}").expect("static regex"));

/// Errors raised while merging translations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TranslationError {
    /// Without a source locale we cannot tell a source string from a
    /// translation of a deleted key, so the add is refused.
    #[error("trying to add translations in locale {locale:?} but source locale not set yet")]
    SourceLocaleNotSet { locale: String },
}

/// Translation table with source-key tracking.
///
/// Every key carries a value for every known locale (empty by default).
/// Only keys added in the source locale are exported back to the workbook;
/// keys that exist only in the workbook (deleted from the source) still reach
/// the per-locale output but disappear from the workbook on the next write.
#[derive(Debug, Clone, Default)]
pub struct TranslationManager {
    locales: Vec<Locale>,
    source_locale: Option<Locale>,
    translations: KeyLocaleValueMap,
    source_keys: Vec<Key>,
}

impl TranslationManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_source_locale(&mut self, locale: Locale) {
        self.ensure_locale(locale.clone());
        self.source_locale = Some(locale);
    }

    pub fn source_locale(&self) -> Option<&Locale> {
        self.source_locale.as_ref()
    }

    /// Register `locale`, back-filling a default value for every known key.
    pub fn ensure_locale(&mut self, locale: Locale) {
        if self.has_locale(&locale) {
            return;
        }
        for by_locale in self.translations.values_mut() {
            by_locale
                .entry(locale.clone())
                .or_insert_with(|| DEFAULT_TRANSLATION_VALUE.to_string());
        }
        self.locales.push(locale);
    }

    pub fn has_locale(&self, locale: &Locale) -> bool {
        self.locales.contains(locale)
    }

    pub fn locales(&self) -> &[Locale] {
        &self.locales
    }

    /// Add `values` for `locale`, normalising whitespace.
    pub fn add_translations(
        &mut self,
        values: &KeyValueMap,
        locale: &Locale,
    ) -> Result<(), TranslationError> {
        let Some(source_locale) = self.source_locale.clone() else {
            return Err(TranslationError::SourceLocaleNotSet {
                locale: locale.to_string(),
            });
        };

        self.ensure_locale(locale.clone());

        for (key, value) in values {
            if *locale == source_locale {
                self.ensure_source_key(key);
            }
            self.ensure_translations_for_key(key);
            if let Some(by_locale) = self.translations.get_mut(key) {
                by_locale.insert(locale.clone(), normalize_value(value));
            }
        }

        Ok(())
    }

    fn ensure_source_key(&mut self, key: &Key) {
        if !self.source_keys.contains(key) {
            self.source_keys.push(key.clone());
        }
    }

    fn ensure_translations_for_key(&mut self, key: &Key) {
        let by_locale = self.translations.entry(key.clone()).or_default();
        for locale in &self.locales {
            by_locale
                .entry(locale.clone())
                .or_insert_with(|| DEFAULT_TRANSLATION_VALUE.to_string());
        }
    }

    /// Known locales other than the source, sorted.
    pub fn non_source_locales(&self) -> Vec<Locale> {
        let mut locales: Vec<Locale> = self
            .locales
            .iter()
            .filter(|l| Some(*l) != self.source_locale.as_ref())
            .cloned()
            .collect();
        locales.sort();
        locales
    }

    pub fn source_keys(&self) -> &[Key] {
        &self.source_keys
    }

    /// The subset of the table that belongs in the workbook: source keys only.
    pub fn exportable_translations(&self) -> KeyLocaleValueMap {
        self.source_keys
            .iter()
            .filter_map(|key| {
                self.translations
                    .get(key)
                    .map(|by_locale| (key.clone(), by_locale.clone()))
            })
            .collect()
    }

    pub fn translations(&self) -> &KeyLocaleValueMap {
        &self.translations
    }

    pub fn translations_by_locale(&self) -> LocaleKeyValueMap {
        group_by_locale(&self.translations)
    }
}

/// Trim surrounding spaces and collapse whitespace runs to a single space.
pub fn normalize_value(value: &str) -> String {
    let trimmed = value.trim_matches(' ');
    MULTIPLE_SPACES.replace_all(trimmed, " ").into_owned()
}
