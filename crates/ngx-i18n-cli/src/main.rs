//! `ngx-xlf-xlsx`: keep Angular xlf files and a translations workbook in sync.
//!
//! ## Commands
//!
//! - `run` (alias `sync`): merge the source xlf and the workbook, write both
//! - `check`: same pipeline, no writes, non-zero exit on placeholder issues
//! - `inspect`: print an xlf file's texts as JSON
//! - `locales`: print the project's locales and xlf paths
//!
//! The process gets exactly one capability: its working directory, mounted
//! read-write at `/`.

use std::process::ExitCode;

use anyhow::{Context, Result};
use ngx_i18n_core::{context_failure, spawn_interrupt_listener, Console, ExitOutcome, HostShell};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(outcome) => {
            tracing::debug!(code = outcome.code, state = %outcome.state, "exiting");
            ExitCode::from(u8::try_from(outcome.code).unwrap_or(1))
        }
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<ExitOutcome> {
    let shell = match HostShell::from_os() {
        Ok(shell) => shell,
        Err(err) => return Ok(context_failure(err, &Console::stdio(false))),
    };

    let cancel = CancellationToken::new();
    let done = CancellationToken::new();
    let listener = spawn_interrupt_listener(cancel.clone(), done.clone());

    let outcome = shell.run(cancel).await;

    done.cancel();
    listener.await.context("interrupt listener failed")?;
    Ok(outcome)
}
