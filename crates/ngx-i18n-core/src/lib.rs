//! ngx-xlf-xlsx core library
//!
//! Keeps an Angular project's XLIFF translation files in sync with an Excel
//! workbook that translators edit, running inside a capability context
//! (see the `ngx-i18n-sandbox` crate) instead of against ambient process
//! state.
//!
//! - [`dispatch`]: argv → [`Invocation`] or [`UsageError`]
//! - [`engine`]: the `run`, `check`, `inspect` and `locales` commands
//! - [`shell`]: context construction, interrupts, exit codes

pub mod angular;
pub mod config;
pub mod console;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod i18n;
pub mod obs;
pub mod outcome;
pub mod report;
pub mod shell;
pub mod telemetry;
pub mod workbook;
pub mod xliff;
mod xml;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use angular::{AngularConfig, MainProject, ProjectError};
pub use config::{SyncConfig, SyncOverrides};
pub use console::{CaptureBuffer, Console};
pub use dispatch::{dispatch, Command, CommandInvocation, GlobalOptions, Invocation, UsageError};
pub use engine::{execute, Engine, RunSummary};
pub use error::{
    Result, ToolError, EXIT_CAPABILITY, EXIT_CONTEXT, EXIT_FAILURE, EXIT_INTERRUPTED,
    EXIT_SUCCESS, EXIT_USAGE,
};
pub use i18n::{Key, Locale, TranslationManager};
pub use outcome::{ExitOutcome, Lifecycle, RunState};
pub use report::SyncReport;
pub use shell::{context_failure, context_from_os, spawn_interrupt_listener, HostShell};
pub use workbook::{SheetLayout, Workbook, WorkbookError};
pub use xliff::{PlaceholderIssue, XliffDocument, XliffError};
