//! In-place conversion of an NTFS volume into a target Linux filesystem
//! (§1 Overview): shrink the source, carve out (or reuse) a target
//! partition, migrate and verify files, repeat until the source is
//! empty, then delete it and expand the target to fill the disk.
//!
//! This crate is a thin façade over its member crates: `dconv-types` for
//! the shared data model, `dconv-external` for the process-spawning
//! seam, `dconv-backend` for the Block Layer Adapter / Volume Inspector
//! / Verified Migrator, `dconv-journal` for crash-safe resume state, and
//! `dconv-engine` for the controller that drives them all.

pub extern crate dconv_backend as backend;
pub extern crate dconv_engine as engine;
pub extern crate dconv_external as external;
pub extern crate dconv_journal as journal;
pub extern crate dconv_types as types;

extern crate dirs;
extern crate fern;
#[macro_use]
extern crate log;

mod logging;

pub use self::logging::log as init_logging;

pub use dconv_backend::{Backend, DryRunBackend, DummyBackend, SystemBackend};
pub use dconv_engine::{
    run as run_conversion, ConversionContext, EngineError, LogLevel, ProgressPanel, PromptResponse, UiSink,
};
pub use dconv_journal::{ConversionState, JournalError, JournalStore};
pub use dconv_types::{Device, DiskRotation, FsKind, Partition};
