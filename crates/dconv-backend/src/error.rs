use std::io;
use std::path::PathBuf;

/// Errors raised by the Block Layer Adapter (§4.1) and Volume Inspector
/// (§4.2).
#[derive(Debug, Fail)]
pub enum BlockError {
    #[fail(display = "unable to run {}: {}", tool, why)]
    ToolFailed { tool: &'static str, why: io::Error },
    #[fail(display = "validation pass for shrinking {:?} failed: {}", partition, why)]
    ShrinkValidationFailed { partition: PathBuf, why: io::Error },
    #[fail(display = "partition {:?} is mounted; unmount before resizing", partition)]
    PartitionMounted { partition: PathBuf },
    #[fail(display = "failed to find new partition on {:?} after create", device)]
    NewPartitionNotFound { device: PathBuf },
    #[fail(display = "kernel partition table view did not converge on {:?} within the timeout", device)]
    KernelViewStale { device: PathBuf },
    #[fail(display = "unable to mount {:?} at {:?}: {}", partition, target, why)]
    MountFailed { partition: PathBuf, target: PathBuf, why: io::Error },
    #[fail(display = "unable to unmount {:?} after {} attempts: {}", target, attempts, why)]
    UnmountStuck { target: PathBuf, attempts: u64, why: io::Error },
    #[fail(display = "{}", why)]
    Io { why: io::Error },
}

impl From<io::Error> for BlockError {
    fn from(why: io::Error) -> BlockError { BlockError::Io { why } }
}

/// Errors raised by the Verified Migrator (§4.3).
#[derive(Debug, Fail)]
pub enum MigrateError {
    #[fail(display = "unable to mount source or target for migration: {}", why)]
    Mount { why: BlockError },
    #[fail(display = "copy tool failed: {}", why)]
    CopyFailed { why: io::Error },
    #[fail(display = "verification gate rejected the migration: {} missing, {} failed, {} of {} verified", missing, failed, verified, total)]
    VerificationFailed { missing: usize, failed: usize, verified: usize, total: usize },
    #[fail(display = "unable to prune verified files from source: {}", why)]
    PruneFailed { why: io::Error },
    #[fail(display = "{}", why)]
    Io { why: io::Error },
}

impl From<io::Error> for MigrateError {
    fn from(why: io::Error) -> MigrateError { MigrateError::Io { why } }
}

impl From<BlockError> for MigrateError {
    fn from(why: BlockError) -> MigrateError { MigrateError::Mount { why } }
}
