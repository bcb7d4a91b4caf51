//! Execution core: the `run`, `check`, `inspect` and `locales` commands.
//!
//! Every file access goes through the [`CapabilityContext`]. Output paths
//! are resolved for write before anything is written, and every write is
//! staged next to its destination and committed only if the run has not
//! been cancelled in the meantime.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use futures::future::join_all;
use ngx_i18n_sandbox::{Access, CapabilityContext, ScopedPath, WriteStatus};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::angular::{AngularConfig, MainProject};
use crate::config::{SyncConfig, SyncOverrides};
use crate::console::Console;
use crate::dispatch::{Command, CommandInvocation, GlobalOptions};
use crate::error::{Result, ToolError};
use crate::i18n::{group_by_locale, KeyValueMap, Locale, TranslationManager};
use crate::obs;
use crate::report::{FileRecord, FileRole, IssueRecord, SyncReport};
use crate::workbook::Workbook;
use crate::xliff::XliffDocument;

const TOTAL_STEPS: usize = 6;
const BANNER_RULE: &str = "================================";

/// What a successful command did.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub command: &'static str,
    pub files: Vec<FileRecord>,
    pub issues: usize,
    pub report: Option<SyncReport>,
}

impl RunSummary {
    fn empty(command: &'static str) -> Self {
        Self {
            command,
            files: Vec::new(),
            issues: 0,
            report: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncMode {
    Write,
    DryRun,
}

/// Run `invocation` against `ctx`.
pub async fn execute(
    invocation: CommandInvocation,
    ctx: Arc<CapabilityContext>,
    console: Console,
    cancel: CancellationToken,
) -> Result<RunSummary> {
    Engine::new(ctx, console, cancel).execute(invocation).await
}

/// One invocation's view of the world: context, output streams, cancellation.
#[derive(Clone)]
pub struct Engine {
    ctx: Arc<CapabilityContext>,
    console: Console,
    cancel: CancellationToken,
    run_id: Uuid,
    options: GlobalOptions,
}

impl Engine {
    pub fn new(ctx: Arc<CapabilityContext>, console: Console, cancel: CancellationToken) -> Self {
        Self {
            ctx,
            console,
            cancel,
            run_id: Uuid::new_v4(),
            options: GlobalOptions::default(),
        }
    }

    pub fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = run_id;
        self
    }

    pub async fn execute(mut self, invocation: CommandInvocation) -> Result<RunSummary> {
        self.options = invocation.options;
        self.checkpoint()?;
        match invocation.command {
            Command::Run(overrides) => self.sync(overrides, SyncMode::Write).await,
            Command::Check(overrides) => self.sync(overrides, SyncMode::DryRun).await,
            Command::Inspect { xlf, locale_target } => {
                self.blocking(move |engine| engine.inspect(&xlf, locale_target)).await
            }
            Command::Locales(overrides) => {
                self.blocking(move |engine| engine.locales(&overrides)).await
            }
        }
    }

    /// Run `f` on the blocking pool; file I/O and retry backoff block.
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Engine) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let engine = self.clone();
        tokio::task::spawn_blocking(move || f(&engine))
            .await
            .map_err(|e| ToolError::Task(e.to_string()))?
    }

    fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            obs::emit_run_interrupted(&self.run_id.to_string());
            return Err(ToolError::Interrupted);
        }
        Ok(())
    }

    fn progress(&self, line: &str) {
        if !self.options.quiet {
            self.console.err(line);
        }
    }

    fn step(&self, index: usize, title: &str) -> Result<()> {
        obs::emit_step(index, TOTAL_STEPS, title);
        self.progress(&format!("[{index}/{TOTAL_STEPS}]\t{title}"));
        self.checkpoint()
    }

    fn read_xlf(&self, path: &str) -> Result<XliffDocument> {
        let raw = self.ctx.read_to_string(path)?;
        XliffDocument::parse(raw).map_err(|source| ToolError::Xliff {
            path: path.to_string(),
            source,
        })
    }

    fn read_project(&self, config: &SyncConfig) -> Result<MainProject> {
        let text = self.ctx.read_to_string(&config.angular_config)?;
        let angular = AngularConfig::parse(&text)?;
        Ok(angular.main_project(config.project.as_deref())?)
    }

    fn commit(&self, path: &ScopedPath, data: &[u8]) -> Result<WriteStatus> {
        let cancel = &self.cancel;
        Ok(self.ctx.write_if_changed(path, data, || cancel.is_cancelled())?)
    }

    async fn sync(&self, overrides: SyncOverrides, mode: SyncMode) -> Result<RunSummary> {
        let prepared = self
            .blocking(move |engine| engine.prepare(&overrides, mode))
            .await?;
        let Prepared {
            config,
            outputs,
            rendered,
            mut summary,
            mut report,
        } = prepared;

        if let Some(outputs) = &outputs {
            let records = self.write_locale_files(outputs, rendered).await?;
            summary.files.extend(records);
        }
        report.files = summary.files.clone();

        self.blocking(move |engine| engine.conclude(config, outputs, summary, report, mode))
            .await
    }

    /// Steps 1 to 6 up to rendering: everything but the locale file writes.
    fn prepare(&self, overrides: &SyncOverrides, mode: SyncMode) -> Result<Prepared> {
        let command = match mode {
            SyncMode::Write => "run",
            SyncMode::DryRun => "check",
        };
        let config = SyncConfig::load(self.ctx.env(), overrides)?;
        let layout = config.sheet_layout();
        let mut tm = TranslationManager::new();

        self.progress(BANNER_RULE);
        self.progress("ngx-xlf-xlsx");
        self.progress(BANNER_RULE);
        self.progress("");

        self.step(1, "Reading Angular project configuration")?;
        let project = self.read_project(&config)?;
        let source_locale = project.source_locale.clone();
        tm.set_source_locale(source_locale.clone());
        let non_source_locales = project.non_source_locales();
        for locale in &non_source_locales {
            tm.ensure_locale(locale.clone());
        }
        let mut header = vec![source_locale.clone()];
        header.extend(non_source_locales.iter().cloned());

        let outputs = match mode {
            SyncMode::Write => Some(self.resolve_outputs(&config, &project)?),
            SyncMode::DryRun => None,
        };

        self.step(2, "Reading source xlf file")?;
        let source_xlf = self.read_xlf(&config.source_xlf)?;
        tm.add_translations(&source_xlf.key_values(), &source_locale)?;

        let mut summary = RunSummary::empty(command);
        let mut report = SyncReport::new(self.run_id, project.name.clone(), source_locale.clone());

        self.step(3, "Ensuring xlsx file exists")?;
        let workbook_exists = self.ctx.exists(&config.workbook)?;
        if !workbook_exists {
            if let Some(outputs) = &outputs {
                let bytes = Workbook::header_only(header.clone())
                    .to_bytes(&layout)
                    .map_err(|source| workbook_error(&config.workbook, source))?;
                let status = self.commit(&outputs.workbook, &bytes)?;
                obs::emit_file_written(&config.workbook, status.digest(), status.is_written());
            }
        }

        self.step(4, "Reading xlsx file")?;
        let workbook = if workbook_exists || outputs.is_some() {
            let bytes = self.ctx.read(&config.workbook)?;
            Workbook::from_bytes(&bytes).map_err(|source| workbook_error(&config.workbook, source))?
        } else {
            Workbook::header_only(header.clone())
        };
        for (locale, values) in group_by_locale(workbook.rows()) {
            if locale == source_locale {
                continue;
            }
            if !tm.has_locale(&locale) {
                tracing::debug!(locale = %locale, "skipping workbook column for unknown locale");
                continue;
            }
            self.progress(&format!("\tAdding translations for locale {:?}", locale.as_str()));
            tm.add_translations(&values, &locale)?;
        }

        let workbook_title = match mode {
            SyncMode::Write => "Writing to xlsx file",
            SyncMode::DryRun => "Checking xlsx file",
        };
        self.step(5, workbook_title)?;
        let bytes = Workbook::new(header, tm.exportable_translations())
            .to_bytes(&layout)
            .map_err(|source| workbook_error(&config.workbook, source))?;
        if let Some(outputs) = &outputs {
            let status = self.commit(&outputs.workbook, &bytes)?;
            obs::emit_file_written(&config.workbook, status.digest(), status.is_written());
            summary.files.push(FileRecord {
                path: config.workbook.clone(),
                role: FileRole::Workbook,
                locale: None,
                digest: status.digest().to_string(),
                written: status.is_written(),
            });
        }

        let xlf_title = match mode {
            SyncMode::Write => "Writing xlf files",
            SyncMode::DryRun => "Checking xlf files",
        };
        self.step(6, xlf_title)?;
        let by_locale = tm.translations_by_locale();
        let empty = KeyValueMap::new();
        let mut rendered = Vec::new();
        for locale in tm.non_source_locales() {
            let verb = match mode {
                SyncMode::Write => "Writing",
                SyncMode::DryRun => "Checking",
            };
            self.progress(&format!("\t{verb} xlf file for locale {:?}", locale.as_str()));
            let translations = by_locale.get(&locale).unwrap_or(&empty);
            let output = source_xlf.render_with_targets(translations);
            for issue in output.issues {
                let detail = issue.detail();
                obs::emit_placeholder_issue(locale.as_str(), issue.key().as_str(), &detail);
                self.console
                    .warn(&format!("locale {:?}, key {:?}: {detail}", locale.as_str(), issue.key().as_str()));
                report.warnings.push(IssueRecord {
                    locale: locale.clone(),
                    issue,
                });
            }
            rendered.push((locale, output.text));
        }
        summary.issues = report.warnings.len();
        report.locales = non_source_locales;
        report.key_count = tm.source_keys().len();

        Ok(Prepared {
            config,
            outputs,
            rendered,
            summary,
            report,
        })
    }

    /// Write the report, close the banner, and settle `check`.
    fn conclude(
        &self,
        config: SyncConfig,
        outputs: Option<Outputs>,
        mut summary: RunSummary,
        report: SyncReport,
        mode: SyncMode,
    ) -> Result<RunSummary> {
        if let (Some(outputs), Some(report_path)) = (&outputs, &config.report) {
            if let Some(path) = &outputs.report {
                let bytes = report.to_json_bytes()?;
                let status = self.commit(path, &bytes)?;
                obs::emit_file_written(report_path, status.digest(), status.is_written());
            }
        }

        self.progress("");
        self.progress(BANNER_RULE);
        self.progress("Done!");
        self.progress("Excel file is at:");
        self.progress(&config.workbook);
        self.progress(BANNER_RULE);

        if mode == SyncMode::DryRun && summary.issues > 0 {
            return Err(ToolError::IssuesFound(summary.issues));
        }

        summary.report = Some(report);
        Ok(summary)
    }

    /// Resolve every path the run will write, before the first write.
    fn resolve_outputs(&self, config: &SyncConfig, project: &MainProject) -> Result<Outputs> {
        let workbook = self.ctx.resolve(&config.workbook, Access::Write)?;
        let mut locale_xlfs = BTreeMap::new();
        for (locale, path) in &project.locales {
            let scoped = self.ctx.resolve(path, Access::Write)?;
            locale_xlfs.insert(locale.clone(), (path.clone(), scoped));
        }
        let report = config
            .report
            .as_deref()
            .map(|path| self.ctx.resolve(path, Access::Write))
            .transpose()?;

        let source = self.ctx.resolve(&config.source_xlf, Access::Read)?;
        let mut seen: BTreeMap<PathBuf, String> = BTreeMap::new();
        seen.insert(source.host_path().to_path_buf(), config.source_xlf.clone());
        let mut claim = |scoped: &ScopedPath, shown: &str| -> Result<()> {
            if let Some(previous) = seen.insert(scoped.host_path().to_path_buf(), shown.to_string()) {
                return Err(ToolError::Config(format!(
                    "{shown} and {previous} refer to the same file"
                )));
            }
            Ok(())
        };
        claim(&workbook, &config.workbook)?;
        for (path, scoped) in locale_xlfs.values() {
            claim(scoped, path)?;
        }
        if let (Some(scoped), Some(path)) = (&report, &config.report) {
            claim(scoped, path)?;
        }

        Ok(Outputs {
            workbook,
            locale_xlfs,
            report,
        })
    }

    /// Commit the rendered locale files in parallel.
    async fn write_locale_files(
        &self,
        outputs: &Outputs,
        rendered: Vec<(Locale, String)>,
    ) -> Result<Vec<FileRecord>> {
        let tasks = rendered.into_iter().filter_map(|(locale, text)| {
            let (shown, scoped) = outputs.locale_xlfs.get(&locale)?.clone();
            let engine = self.clone();
            Some(tokio::task::spawn_blocking(move || {
                let status = engine.commit(&scoped, text.as_bytes());
                (locale, shown, status)
            }))
        });

        let mut records = Vec::new();
        let mut first_error = None;
        for joined in join_all(tasks).await {
            let (locale, shown, status) = joined.map_err(|e| ToolError::Task(e.to_string()))?;
            match status {
                Ok(status) => {
                    obs::emit_file_written(&shown, status.digest(), status.is_written());
                    records.push(FileRecord {
                        path: shown,
                        role: FileRole::LocaleXlf,
                        locale: Some(locale),
                        digest: status.digest().to_string(),
                        written: status.is_written(),
                    });
                }
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(records),
        }
    }

    fn inspect(&self, xlf: &str, locale_target: bool) -> Result<RunSummary> {
        let doc = self.read_xlf(xlf)?;
        let values = if locale_target {
            doc.target_values()
        } else {
            doc.key_values()
        };
        self.console.out(&serde_json::to_string_pretty(&values)?);
        Ok(RunSummary::empty("inspect"))
    }

    fn locales(&self, overrides: &SyncOverrides) -> Result<RunSummary> {
        let config = SyncConfig::load(self.ctx.env(), overrides)?;
        let project = self.read_project(&config)?;
        let listing = LocaleListing {
            project: &project.name,
            source_locale: &project.source_locale,
            locales: project.locales_map(&config.source_xlf),
        };
        self.console.out(&serde_json::to_string_pretty(&listing)?);
        Ok(RunSummary::empty("locales"))
    }
}

/// Printed by `locales`: every locale with its xlf path, source included.
#[derive(Serialize)]
struct LocaleListing<'a> {
    project: &'a str,
    source_locale: &'a Locale,
    locales: BTreeMap<Locale, String>,
}

/// What the blocking half of a sync hands back for the parallel writes.
struct Prepared {
    config: SyncConfig,
    outputs: Option<Outputs>,
    rendered: Vec<(Locale, String)>,
    summary: RunSummary,
    report: SyncReport,
}

/// Write targets checked up front.
struct Outputs {
    workbook: ScopedPath,
    locale_xlfs: BTreeMap<Locale, (String, ScopedPath)>,
    report: Option<ScopedPath>,
}

fn workbook_error(path: &str, source: crate::workbook::WorkbookError) -> ToolError {
    ToolError::Workbook {
        path: path.to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ngx_i18n_sandbox::{AccessMode, DEFAULT_ROOT};

    fn context(dir: &std::path::Path) -> CapabilityContext {
        CapabilityContext::builder()
            .root(DEFAULT_ROOT, dir, AccessMode::ReadWrite)
            .build()
            .unwrap()
    }

    fn engine(dir: &std::path::Path, cancel: CancellationToken) -> Engine {
        let (console, _, _) = Console::capture();
        Engine::new(Arc::new(context(dir)), console, cancel)
    }

    #[test]
    fn test_commit_skips_identical_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), CancellationToken::new());
        let path = engine.ctx.resolve("out.txt", Access::Write).unwrap();

        let first = engine.commit(&path, b"hello").unwrap();
        assert!(first.is_written());
        let second = engine.commit(&path, b"hello").unwrap();
        assert!(!second.is_written());
        assert_eq!(first.digest(), second.digest());
    }

    #[test]
    fn test_commit_after_cancel_is_interrupted() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let engine = engine(dir.path(), cancel.clone());
        let path = engine.ctx.resolve("out.txt", Access::Write).unwrap();
        cancel.cancel();

        let err = engine.commit(&path, b"hello").unwrap_err();
        assert!(matches!(err, ToolError::Interrupted));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_pre_cancelled_engine_does_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Arc::new(context(dir.path()));
        let (console, _, err) = Console::capture();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let invocation = CommandInvocation {
            command: Command::Run(SyncOverrides::default()),
            options: GlobalOptions::default(),
        };
        let result = execute(invocation, ctx, console, cancel).await;
        assert!(matches!(result, Err(ToolError::Interrupted)));
        assert!(err.contents().is_empty());
    }
}
