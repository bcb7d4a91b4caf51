//! Layered settings for a sync run.
//!
//! Built-in defaults, overridden by the capability context env, overridden by
//! command-line flags.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::ToolError;
use crate::workbook::{SheetLayout, DEFAULT_COLUMN_WIDTH, DEFAULT_SHEET_NAME};

pub const DEFAULT_ANGULAR_CONFIG: &str = "angular.json";
pub const DEFAULT_WORKBOOK: &str = "translations.xlsx";
pub const DEFAULT_SOURCE_XLF: &str = "src/locale/messages.xlf";

pub const ENV_WORKBOOK: &str = "NGX_XLF_XLSX_WORKBOOK";
pub const ENV_SOURCE_XLF: &str = "NGX_XLF_XLSX_SOURCE_XLF";
pub const ENV_PROJECT: &str = "NGX_XLF_XLSX_PROJECT";

/// Flag values that override the env layer. `None` means not given.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOverrides {
    pub angular_config: Option<String>,
    pub workbook: Option<String>,
    pub source_xlf: Option<String>,
    pub project: Option<String>,
    pub report: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncConfig {
    pub angular_config: String,
    pub workbook: String,
    pub source_xlf: String,
    pub project: Option<String>,
    pub report: Option<String>,
    pub sheet_name: String,
    pub column_width: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            angular_config: DEFAULT_ANGULAR_CONFIG.to_string(),
            workbook: DEFAULT_WORKBOOK.to_string(),
            source_xlf: DEFAULT_SOURCE_XLF.to_string(),
            project: None,
            report: None,
            sheet_name: DEFAULT_SHEET_NAME.to_string(),
            column_width: DEFAULT_COLUMN_WIDTH,
        }
    }
}

impl SyncConfig {
    /// Resolve the effective settings from `env` and `overrides`.
    pub fn load(env: &BTreeMap<String, String>, overrides: &SyncOverrides) -> Result<Self, ToolError> {
        let mut config = Self::default();
        config.apply_env(env);
        config.apply_overrides(overrides);
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self, env: &BTreeMap<String, String>) {
        let var = |name: &str| env.get(name).filter(|v| !v.is_empty()).cloned();
        if let Some(workbook) = var(ENV_WORKBOOK) {
            self.workbook = workbook;
        }
        if let Some(source_xlf) = var(ENV_SOURCE_XLF) {
            self.source_xlf = source_xlf;
        }
        if let Some(project) = var(ENV_PROJECT) {
            self.project = Some(project);
        }
    }

    fn apply_overrides(&mut self, overrides: &SyncOverrides) {
        if let Some(angular_config) = &overrides.angular_config {
            self.angular_config = angular_config.clone();
        }
        if let Some(workbook) = &overrides.workbook {
            self.workbook = workbook.clone();
        }
        if let Some(source_xlf) = &overrides.source_xlf {
            self.source_xlf = source_xlf.clone();
        }
        if let Some(project) = &overrides.project {
            self.project = Some(project.clone());
        }
        if let Some(report) = &overrides.report {
            self.report = Some(report.clone());
        }
    }

    fn validate(&self) -> Result<(), ToolError> {
        let paths = [
            ("angular config", &self.angular_config),
            ("workbook", &self.workbook),
            ("source xlf", &self.source_xlf),
        ];
        for (what, path) in paths {
            if path.trim().is_empty() {
                return Err(ToolError::Config(format!("{what} path is empty")));
            }
        }
        if self.report.as_deref().is_some_and(|r| r.trim().is_empty()) {
            return Err(ToolError::Config("report path is empty".into()));
        }
        Ok(())
    }

    pub fn sheet_layout(&self) -> SheetLayout {
        SheetLayout {
            sheet_name: self.sheet_name.clone(),
            column_width: self.column_width,
        }
    }
}
