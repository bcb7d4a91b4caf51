//! Host shell: builds the capability context, runs one invocation, and maps
//! the result to an [`ExitOutcome`].

use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Instant;

use ngx_i18n_sandbox::{AccessMode, CapabilityContext, ContextError, DEFAULT_ROOT};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::console::Console;
use crate::dispatch::{dispatch, Invocation};
use crate::engine::{Engine, RunSummary};
use crate::error::{ToolError, EXIT_SUCCESS, EXIT_USAGE};
use crate::obs::{self, RunSpan};
use crate::outcome::{ExitOutcome, Lifecycle, RunState};
use crate::telemetry::{init_tracing, LOG_FILTER_VAR};

/// Build the one context a process gets: its argv, its environment, and the
/// working directory granted read-write as `/`.
pub fn context_from_os() -> Result<CapabilityContext, ContextError> {
    let cwd = std::env::current_dir().map_err(ContextError::WorkingDirectory)?;
    CapabilityContext::builder()
        .args(std::env::args_os().map(|a| a.to_string_lossy().into_owned()))
        .envs(std::env::vars_os().map(|(k, v)| {
            (
                k.to_string_lossy().into_owned(),
                v.to_string_lossy().into_owned(),
            )
        }))
        .root(DEFAULT_ROOT, cwd, AccessMode::ReadWrite)
        .build()
}

/// Report a context construction failure; no invocation exists yet.
pub fn context_failure(err: ContextError, console: &Console) -> ExitOutcome {
    let err = ToolError::Context(err);
    console.error(&err.to_string());
    ExitOutcome {
        code: err.exit_code(),
        stderr_emitted: console.stderr_emitted(),
        state: RunState::Idle,
    }
}

/// Record the roots `ctx` grants. The context is built before tracing is
/// configured, so this runs once the subscriber is in place.
pub(crate) fn log_grants(ctx: &CapabilityContext) {
    for root in ctx.roots() {
        obs::emit_root_granted(root.name(), root.path(), root.mode());
    }
}

/// Cancel `cancel` on Ctrl-C until `done` fires.
pub fn spawn_interrupt_listener(cancel: CancellationToken, done: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if result.is_ok() {
                    tracing::debug!("interrupt received, cancelling run");
                    cancel.cancel();
                }
            }
            _ = done.cancelled() => {}
        }
    })
}

pub struct HostShell {
    ctx: Arc<CapabilityContext>,
    console: Console,
}

impl HostShell {
    pub fn new(ctx: CapabilityContext, console: Console) -> Self {
        Self {
            ctx: Arc::new(ctx),
            console,
        }
    }

    /// Context from the process, output to the process streams.
    pub fn from_os() -> Result<Self, ContextError> {
        let ctx = context_from_os()?;
        let color = std::io::stderr().is_terminal() && ctx.env_var("NO_COLOR").is_none();
        Ok(Self::new(ctx, Console::stdio(color)))
    }

    pub fn context(&self) -> &CapabilityContext {
        &self.ctx
    }

    pub fn console(&self) -> &Console {
        &self.console
    }

    /// Dispatch and execute the context's argv. Never panics on bad input.
    pub async fn run(self, cancel: CancellationToken) -> ExitOutcome {
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        let mut lifecycle = Lifecycle::new(run_id.to_string());
        self.transition(&mut lifecycle, RunState::Parsing);

        let invocation = match dispatch(self.ctx.args()) {
            Ok(Invocation::Help { text }) | Ok(Invocation::Version { text }) => {
                self.console.out(text.trim_end());
                return self.finish(lifecycle, EXIT_SUCCESS, started);
            }
            Err(usage) => {
                self.console.err(usage.message());
                return self.finish(lifecycle, EXIT_USAGE, started);
            }
            Ok(Invocation::Command(invocation)) => invocation,
        };

        let options = invocation.options;
        init_tracing(options.json, options.log_level(), self.ctx.env_var(LOG_FILTER_VAR));
        log_grants(&self.ctx);

        let command = invocation.command.name();
        {
            let _span = RunSpan::enter(&run_id.to_string(), command);
            obs::emit_run_started(&run_id.to_string(), command, self.ctx.args().len());
        }
        self.transition(&mut lifecycle, RunState::Executing);

        let engine = Engine::new(Arc::clone(&self.ctx), self.console.clone(), cancel.clone())
            .with_run_id(run_id);
        let task = tokio::spawn(
            engine
                .execute(invocation)
                .instrument(RunSpan::span(&run_id.to_string(), command)),
        );
        // Awaited even after an interrupt so staged files are dropped first.
        let result: Result<RunSummary, ToolError> = match task.await {
            Ok(result) => result,
            Err(join) => Err(ToolError::Task(join.to_string())),
        };

        let code = match result {
            Ok(summary) => {
                tracing::debug!(
                    command = summary.command,
                    files = summary.files.len(),
                    issues = summary.issues,
                    "command finished"
                );
                EXIT_SUCCESS
            }
            Err(err) => {
                self.console.error(&err.to_string());
                err.exit_code()
            }
        };
        self.finish(lifecycle, code, started)
    }

    fn transition(&self, lifecycle: &mut Lifecycle, next: RunState) {
        if let Err(err) = lifecycle.advance(next) {
            tracing::error!(error = %err, "lifecycle violation");
        }
    }

    fn finish(&self, mut lifecycle: Lifecycle, code: i32, started: Instant) -> ExitOutcome {
        let success = code == EXIT_SUCCESS;
        if let Err(err) = lifecycle.finish(success) {
            tracing::error!(error = %err, "lifecycle violation");
        }
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        obs::emit_run_finished(lifecycle.run_id(), duration_ms, code, lifecycle.state());
        ExitOutcome {
            code,
            stderr_emitted: self.console.stderr_emitted(),
            state: lifecycle.state(),
        }
    }
}

impl std::fmt::Debug for HostShell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostShell")
            .field("ctx", &self.ctx)
            .field("console", &self.console)
            .finish()
    }
}
