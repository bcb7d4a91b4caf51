//! Vocabulary types for translation tables.

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A locale, with or without region: `en-US`, `fr`, `nl-BE`.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Locale(String);

/// A translation key: the `id` of an XLIFF trans-unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Key(String);

/// A translation value. Placeholders are spelled `${{ID}}`.
pub type Value = String;

macro_rules! string_newtype {
    ($name:ident) => {
        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_newtype!(Locale);
string_newtype!(Key);

pub type KeyValueMap = BTreeMap<Key, Value>;

pub type LocaleValueMap = BTreeMap<Locale, Value>;

/// Translations keyed by key first, as the workbook stores them.
pub type KeyLocaleValueMap = BTreeMap<Key, LocaleValueMap>;

/// Translations keyed by locale first, as xlf files need them.
pub type LocaleKeyValueMap = BTreeMap<Locale, KeyValueMap>;

/// Regroup key → locale → value into locale → key → value.
pub fn group_by_locale(translations: &KeyLocaleValueMap) -> LocaleKeyValueMap {
    let mut grouped = LocaleKeyValueMap::new();
    for (key, by_locale) in translations {
        for (locale, value) in by_locale {
            grouped
                .entry(locale.clone())
                .or_default()
                .insert(key.clone(), value.clone());
        }
    }
    grouped
}
