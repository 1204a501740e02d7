use dconv_backend::{BlockError, MigrateError};
use dconv_journal::JournalError;

/// The closed set of errors the Conversion Engine can raise (§7).
#[derive(Debug, Fail)]
pub enum EngineError {
    #[fail(display = "environment is unsuitable for conversion: {}", reason)]
    PreflightFailed { reason: String },
    #[fail(display = "block operation {} failed: {}", op, why)]
    BlockOpFailed { op: &'static str, why: BlockError },
    #[fail(display = "mount precondition unmet: {}", why)]
    MountBusy { why: BlockError },
    #[fail(display = "unmount did not release after retries: {}", why)]
    UnmountStuck { why: BlockError },
    #[fail(display = "verification gate rejected the migration: {}", why)]
    VerificationFailed { why: MigrateError },
    #[fail(display = "migration step failed: {}", why)]
    MigrationFailed { why: MigrateError },
    #[fail(display = "kernel partition table view did not converge: {}", why)]
    KernelViewStale { why: BlockError },
    #[fail(display = "no progress for 3 consecutive iterations")]
    NoProgress,
    #[fail(display = "user aborted the conversion")]
    UserAborted,
    #[fail(display = "conversion interrupted by signal")]
    Interrupted,
    #[fail(display = "journal error: {}", why)]
    Journal { why: JournalError },
}

impl From<JournalError> for EngineError {
    fn from(why: JournalError) -> EngineError { EngineError::Journal { why } }
}

impl EngineError {
    /// Classifies a `BlockError` surfaced mid-iteration into the specific
    /// `EngineError` variant §7 names for it, tagging it with the named
    /// operation that was in flight.
    pub fn from_block(op: &'static str, why: BlockError) -> EngineError {
        match why {
            BlockError::MountFailed { .. } => EngineError::MountBusy { why },
            BlockError::UnmountStuck { .. } => EngineError::UnmountStuck { why },
            BlockError::KernelViewStale { .. } => EngineError::KernelViewStale { why },
            other => EngineError::BlockOpFailed { op, why: other },
        }
    }
}

impl From<MigrateError> for EngineError {
    fn from(why: MigrateError) -> EngineError {
        match why {
            MigrateError::VerificationFailed { .. } => EngineError::VerificationFailed { why },
            MigrateError::Mount { why: block_why } => EngineError::from_block("mount for migration", block_why),
            other => EngineError::MigrationFailed { why: other },
        }
    }
}
