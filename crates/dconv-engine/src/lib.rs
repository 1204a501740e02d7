//! The Conversion Engine (§4.5): the iterative controller that drives a
//! `Backend` through shrink/grow/migrate/verify/delete until the source
//! volume is empty, persisting to a `JournalStore` so it can resume after
//! a crash.

extern crate failure;
#[macro_use]
extern crate failure_derive;

use std::sync::atomic::AtomicBool;

mod context;
mod controller;
mod error;
mod events;

pub use self::context::ConversionContext;
pub use self::controller::run;
pub use self::error::EngineError;
pub use self::events::{LogLevel, ProgressPanel, PromptResponse, RecordingSink, UiSink};

pub use dconv_journal::{ConversionState, JournalError, JournalStore, LastOperation};

/// Set by the CLI's signal handler on receipt of a termination signal
/// (§5 Cancellation & signals). The controller checks this at the top of
/// every iteration and before finalization's mutating steps, ceasing to
/// launch new subprocesses and returning `EngineError::Interrupted` once
/// the in-flight step has journaled, rather than mid-step.
///
/// Grounded on distinst's own `pub static KILL_SWITCH: AtomicBool` in
/// `src/lib.rs`, checked by `InstallerState::apply` before every step.
pub static KILL_SWITCH: AtomicBool = AtomicBool::new(false);
