//! Angular workspace configuration (`angular.json`): just the i18n parts.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::i18n::Locale;

const PROJECT_TYPE_APPLICATION: &str = "application";

/// Angular's own default when `i18n.sourceLocale` is omitted.
pub const DEFAULT_SOURCE_LOCALE: &str = "en-US";

#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("invalid angular configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("angular project {0:?} not found")]
    ProjectNotFound(String),

    #[error("angular project {0:?} is not an application")]
    NotAnApplication(String),

    #[error("main angular project not found")]
    NoApplication,

    #[error("locale {0} lists no translation file")]
    NoTranslationFile(Locale),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AngularConfig {
    #[serde(default)]
    pub projects: BTreeMap<String, Project>,
    #[serde(default)]
    pub default_project: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    #[serde(default)]
    pub project_type: String,
    #[serde(default)]
    pub i18n: Option<I18nConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct I18nConfig {
    #[serde(default)]
    pub source_locale: Option<SourceLocale>,
    /// Target locales. May or may not repeat the source locale.
    #[serde(default)]
    pub locales: BTreeMap<Locale, LocaleEntry>,
}

/// `"sourceLocale": "en-US"` or `"sourceLocale": {"code": "en-US", "baseHref": "/"}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SourceLocale {
    Code(Locale),
    Detailed { code: Locale },
}

/// `"fr": "src/locale/messages.fr.xlf"` or `"fr": {"translation": ...}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LocaleEntry {
    Path(String),
    Detailed { translation: TranslationFiles },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TranslationFiles {
    One(String),
    Many(Vec<String>),
}

impl LocaleEntry {
    /// The xlf file this tool writes for the locale: the first one listed.
    pub fn translation_path(&self) -> Option<&str> {
        match self {
            LocaleEntry::Path(path)
            | LocaleEntry::Detailed {
                translation: TranslationFiles::One(path),
            } => Some(path.as_str()),
            LocaleEntry::Detailed {
                translation: TranslationFiles::Many(paths),
            } => paths.first().map(String::as_str),
        }
    }
}

impl AngularConfig {
    pub fn parse(text: &str) -> Result<Self, ProjectError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Pick the application whose translations are managed.
    ///
    /// An explicit `preferred` name wins, then `defaultProject` when it is an
    /// application, then the first application in name order.
    pub fn main_project(&self, preferred: Option<&str>) -> Result<MainProject, ProjectError> {
        if let Some(name) = preferred {
            let project = self
                .projects
                .get(name)
                .ok_or_else(|| ProjectError::ProjectNotFound(name.to_string()))?;
            if project.project_type != PROJECT_TYPE_APPLICATION {
                return Err(ProjectError::NotAnApplication(name.to_string()));
            }
            return MainProject::from_project(name, project);
        }

        if let Some((name, project)) = self
            .default_project
            .as_deref()
            .and_then(|name| self.projects.get_key_value(name))
            .filter(|(_, p)| p.project_type == PROJECT_TYPE_APPLICATION)
        {
            return MainProject::from_project(name, project);
        }

        self.projects
            .iter()
            .find(|(_, p)| p.project_type == PROJECT_TYPE_APPLICATION)
            .map(|(name, project)| MainProject::from_project(name, project))
            .unwrap_or(Err(ProjectError::NoApplication))
    }
}

/// The resolved i18n settings of the main application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MainProject {
    pub name: String,
    pub source_locale: Locale,
    /// Non-source locale → xlf path, as written in `angular.json`.
    pub locales: BTreeMap<Locale, String>,
}

impl MainProject {
    fn from_project(name: &str, project: &Project) -> Result<Self, ProjectError> {
        let i18n = project.i18n.clone().unwrap_or_default();
        let source_locale = match i18n.source_locale {
            Some(SourceLocale::Code(code)) | Some(SourceLocale::Detailed { code }) => code,
            None => Locale::from(DEFAULT_SOURCE_LOCALE),
        };

        let mut locales = BTreeMap::new();
        for (locale, entry) in i18n.locales {
            if locale == source_locale {
                continue;
            }
            let path = entry
                .translation_path()
                .ok_or_else(|| ProjectError::NoTranslationFile(locale.clone()))?;
            locales.insert(locale, path.to_string());
        }

        Ok(Self {
            name: name.to_string(),
            source_locale,
            locales,
        })
    }

    pub fn non_source_locales(&self) -> Vec<Locale> {
        self.locales.keys().cloned().collect()
    }

    /// Every locale with its xlf path, the source locale mapped to `source_xlf`.
    pub fn locales_map(&self, source_xlf: &str) -> BTreeMap<Locale, String> {
        let mut map = self.locales.clone();
        map.insert(self.source_locale.clone(), source_xlf.to_string());
        map
    }
}
