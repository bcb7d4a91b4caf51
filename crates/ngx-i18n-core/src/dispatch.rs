//! Entry dispatcher: argv in, [`Invocation`] or [`UsageError`] out.
//!
//! Dispatch is a pure function of the argument vector. Nothing here reads
//! the environment, queries the terminal, or touches the filesystem.

use clap::error::ErrorKind;
use clap::{ColorChoice, Parser, Subcommand};
use tracing::Level;

use crate::config::SyncOverrides;

pub const BIN_NAME: &str = "ngx-xlf-xlsx";

#[derive(Parser, Debug)]
#[command(name = BIN_NAME, bin_name = BIN_NAME)]
#[command(version)]
#[command(about = "Keep Angular xlf translation files in sync with an Excel workbook", long_about = None)]
#[command(color = ColorChoice::Never)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Only print warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sync xlf files and the workbook (reads both, writes both)
    #[command(alias = "sync")]
    Run {
        #[command(flatten)]
        sync: ProjectArgs,

        /// Write a JSON run report to this path
        #[arg(long, value_name = "PATH")]
        report: Option<String>,
    },

    /// Run the sync without writing anything; fail on placeholder issues
    Check {
        #[command(flatten)]
        sync: ProjectArgs,
    },

    /// Print the trans-unit texts of an xlf file as JSON
    Inspect {
        /// Path to the xlf file
        xlf: String,

        /// Print target texts instead of source texts
        #[arg(long)]
        locale_target: bool,
    },

    /// List the source locale and target locales of the project
    Locales {
        /// Path to angular.json (default: angular.json)
        angular_config: Option<String>,

        /// Angular project name (default: the main application)
        #[arg(long)]
        project: Option<String>,
    },
}

#[derive(clap::Args, Debug)]
struct ProjectArgs {
    /// Path to angular.json (default: angular.json)
    angular_config: Option<String>,

    /// Workbook path (default: translations.xlsx)
    #[arg(long, value_name = "PATH")]
    workbook: Option<String>,

    /// Source xlf path (default: src/locale/messages.xlf)
    #[arg(long, value_name = "PATH")]
    source_xlf: Option<String>,

    /// Angular project name (default: the main application)
    #[arg(long)]
    project: Option<String>,
}

impl ProjectArgs {
    fn into_overrides(self, report: Option<String>) -> SyncOverrides {
        SyncOverrides {
            angular_config: self.angular_config,
            workbook: self.workbook,
            source_xlf: self.source_xlf,
            project: self.project,
            report,
        }
    }
}

/// The parsed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    Help { text: String },
    Version { text: String },
    Command(CommandInvocation),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation {
    pub command: Command,
    pub options: GlobalOptions,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GlobalOptions {
    pub verbose: bool,
    pub json: bool,
    pub quiet: bool,
}

impl GlobalOptions {
    /// Default tracing level when no filter directives are configured.
    pub fn log_level(&self) -> Level {
        if self.verbose {
            Level::DEBUG
        } else if self.quiet {
            Level::ERROR
        } else {
            Level::WARN
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Run(SyncOverrides),
    Check(SyncOverrides),
    Inspect { xlf: String, locale_target: bool },
    Locales(SyncOverrides),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Run(_) => "run",
            Command::Check(_) => "check",
            Command::Inspect { .. } => "inspect",
            Command::Locales(_) => "locales",
        }
    }
}

/// A rejected command line. Each variant carries clap's rendered message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UsageError {
    #[error("{0}")]
    UnrecognizedFlag(String),
    #[error("{0}")]
    UnrecognizedCommand(String),
    #[error("{0}")]
    MissingValue(String),
    #[error("{0}")]
    MissingCommand(String),
    #[error("{0}")]
    InvalidValue(String),
    #[error("{0}")]
    Malformed(String),
}

impl UsageError {
    pub fn message(&self) -> &str {
        match self {
            UsageError::UnrecognizedFlag(m)
            | UsageError::UnrecognizedCommand(m)
            | UsageError::MissingValue(m)
            | UsageError::MissingCommand(m)
            | UsageError::InvalidValue(m)
            | UsageError::Malformed(m) => m,
        }
    }

    fn from_clap(kind: ErrorKind, message: String) -> Self {
        match kind {
            ErrorKind::UnknownArgument => UsageError::UnrecognizedFlag(message),
            ErrorKind::InvalidSubcommand => UsageError::UnrecognizedCommand(message),
            ErrorKind::MissingRequiredArgument => UsageError::MissingValue(message),
            ErrorKind::MissingSubcommand | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                UsageError::MissingCommand(message)
            }
            ErrorKind::InvalidValue | ErrorKind::ValueValidation | ErrorKind::NoEquals => {
                UsageError::InvalidValue(message)
            }
            _ => UsageError::Malformed(message),
        }
    }
}

/// Parse `args` (program name first) into an [`Invocation`].
pub fn dispatch(args: &[String]) -> Result<Invocation, UsageError> {
    match Cli::try_parse_from(args) {
        Ok(cli) => Ok(Invocation::Command(cli.into_invocation())),
        Err(err) => {
            let text = err.render().to_string();
            match err.kind() {
                ErrorKind::DisplayHelp => Ok(Invocation::Help { text }),
                ErrorKind::DisplayVersion => Ok(Invocation::Version { text }),
                kind => Err(UsageError::from_clap(kind, text.trim_end().to_string())),
            }
        }
    }
}

impl Cli {
    fn into_invocation(self) -> CommandInvocation {
        let options = GlobalOptions {
            verbose: self.verbose,
            json: self.json,
            quiet: self.quiet,
        };
        let command = match self.command {
            Commands::Run { sync, report } => Command::Run(sync.into_overrides(report)),
            Commands::Check { sync } => Command::Check(sync.into_overrides(None)),
            Commands::Inspect { xlf, locale_target } => Command::Inspect { xlf, locale_target },
            Commands::Locales {
                angular_config,
                project,
            } => Command::Locales(SyncOverrides {
                angular_config,
                project,
                ..Default::default()
            }),
        };
        CommandInvocation { command, options }
    }
}
