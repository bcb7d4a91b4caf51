//! Translation table domain: locales, keys, and the merge rules between the
//! source xlf and the workbook.

pub mod manager;
pub mod types;

pub use manager::{normalize_value, TranslationError, TranslationManager};
pub use types::{
    group_by_locale, Key, KeyLocaleValueMap, KeyValueMap, Locale, LocaleKeyValueMap,
    LocaleValueMap, Value,
};
