//! Structured observability hooks for ngx-xlf-xlsx runs.
//!
//! This module provides:
//! - A run-scoped tracing span via the `RunSpan` RAII guard
//! - Emission functions for lifecycle events: start, state transition, step,
//!   file write, placeholder issue, finish
//!
//! Events are emitted at `info!` level unless noted. Events the console
//! already prints for the user (placeholder issues, interrupts) are `debug!`
//! so the default filter does not repeat them. Filtering follows the
//! `RUST_LOG` value carried in the capability context.

use std::path::Path;

use ngx_i18n_sandbox::AccessMode;
use tracing::{debug, info};

use crate::outcome::RunState;

/// RAII guard that enters a run-scoped tracing span for the duration of a run.
///
/// # Example
///
/// ```ignore
/// let _span = RunSpan::enter("0b6f...", "run");
/// // every event below carries run_id and command
/// ```
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    /// The run span, unentered, for instrumenting spawned tasks.
    pub fn span(run_id: &str, command: &str) -> tracing::Span {
        tracing::info_span!("ngx_xlf_xlsx.run", run_id = %run_id, command = %command)
    }

    pub fn enter(run_id: &str, command: &str) -> Self {
        Self {
            _span: Self::span(run_id, command).entered(),
        }
    }
}

pub fn emit_run_started(run_id: &str, command: &str, arg_count: usize) {
    info!(event = "run.started", run_id = %run_id, command = %command, arg_count = arg_count);
}

/// Emit event: a filesystem root granted to the run (debug level).
pub fn emit_root_granted(name: &str, path: &Path, mode: AccessMode) {
    debug!(event = "run.root_granted", root = %name, path = %path.display(), mode = %mode);
}

pub fn emit_state_transition(run_id: &str, from: RunState, to: RunState) {
    debug!(event = "run.state", run_id = %run_id, from = %from, to = %to);
}

/// Emit event: pipeline step `index` of `total` began.
pub fn emit_step(index: usize, total: usize, title: &str) {
    info!(event = "run.step", step = index, total = total, title = %title);
}

pub fn emit_file_written(path: &str, digest: &str, written: bool) {
    info!(event = "file.write", path = %path, digest = %digest, written = written);
}

/// Emit event: a placeholder inconsistency (debug level).
pub fn emit_placeholder_issue(locale: &str, key: &str, detail: &str) {
    debug!(event = "xlf.placeholder_issue", locale = %locale, key = %key, detail = %detail);
}

pub fn emit_run_finished(run_id: &str, duration_ms: u64, exit_code: i32, state: RunState) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        exit_code = exit_code,
        state = %state,
    );
}

/// Emit event: the run was cancelled by an interrupt (debug level).
pub fn emit_run_interrupted(run_id: &str) {
    debug!(event = "run.interrupted", run_id = %run_id);
}
