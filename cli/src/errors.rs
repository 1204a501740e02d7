use dconv::{EngineError, JournalError};

#[derive(Debug, Fail)]
pub(crate) enum CliError {
    #[fail(display = "dconv must be run as root")]
    NotRoot,
    #[fail(display = "'{}' is not a recognized target filesystem", kind)]
    InvalidFsKind { kind: String },
    #[fail(display = "device '{}' could not be probed: {}", device, why)]
    DeviceProbeFailed { device: String, why: std::io::Error },
    #[fail(display = "no NTFS partition was found on '{}'", device)]
    NoNtfsPartition { device: String },
    #[fail(display = "partition {} was not found on '{}'", index, device)]
    PartitionNotFound { device: String, index: u32 },
    #[fail(display = "journal error: {}", why)]
    Journal { why: JournalError },
    #[fail(display = "conversion failed: {}", why)]
    Engine { why: EngineError },
}

impl From<JournalError> for CliError {
    fn from(why: JournalError) -> CliError { CliError::Journal { why } }
}

impl From<EngineError> for CliError {
    fn from(why: EngineError) -> CliError { CliError::Engine { why } }
}
