use dconv_types::{Device, FsKind, Partition};
use std::fmt;
use std::str::FromStr;

/// The state machine's states (§4.5): the value of `last_operation` names
/// the last checkpoint that has observably completed on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LastOperation {
    IterationStart,
    ShrinkNtfs,
    CreateTarget,
    FormatTarget,
    ExpandPartitionTable,
    MigrateFiles,
    DeleteSource,
    ExpandFinal,
    Complete,
}

impl LastOperation {
    fn as_str(self) -> &'static str {
        match self {
            LastOperation::IterationStart => "iteration_start",
            LastOperation::ShrinkNtfs => "shrink_ntfs",
            LastOperation::CreateTarget => "create_target",
            LastOperation::FormatTarget => "format_target",
            LastOperation::ExpandPartitionTable => "expand_partition_table",
            LastOperation::MigrateFiles => "migrate_files",
            LastOperation::DeleteSource => "delete_source",
            LastOperation::ExpandFinal => "expand_final",
            LastOperation::Complete => "complete",
        }
    }
}

impl fmt::Display for LastOperation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result { write!(f, "{}", self.as_str()) }
}

impl FromStr for LastOperation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "iteration_start" => Ok(LastOperation::IterationStart),
            "shrink_ntfs" => Ok(LastOperation::ShrinkNtfs),
            "create_target" => Ok(LastOperation::CreateTarget),
            "format_target" => Ok(LastOperation::FormatTarget),
            "expand_partition_table" => Ok(LastOperation::ExpandPartitionTable),
            "migrate_files" => Ok(LastOperation::MigrateFiles),
            "delete_source" => Ok(LastOperation::DeleteSource),
            "expand_final" => Ok(LastOperation::ExpandFinal),
            "complete" => Ok(LastOperation::Complete),
            other => Err(format!("unrecognized last_operation: {}", other)),
        }
    }
}

/// The Journal payload (§3 Data Model). Persisted only after the
/// operation it names has observably completed on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionState {
    pub device: Device,
    pub target_kind: FsKind,
    pub source_partition: Partition,
    pub target_partition: Option<Partition>,
    pub use_existing_target: bool,
    pub iteration: u32,
    pub last_operation: LastOperation,
    pub files_migrated_total: u64,
}

impl ConversionState {
    /// The initial state of a fresh run (§4.5): `iteration_start` with
    /// `iteration = 0`, no target partition yet.
    pub fn fresh(device: Device, target_kind: FsKind, source_partition: Partition, use_existing_target: bool) -> ConversionState {
        ConversionState {
            device,
            target_kind,
            source_partition,
            target_partition: None,
            use_existing_target,
            iteration: 0,
            last_operation: LastOperation::IterationStart,
            files_migrated_total: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_operation_round_trips_through_str() {
        let all = [
            LastOperation::IterationStart,
            LastOperation::ShrinkNtfs,
            LastOperation::CreateTarget,
            LastOperation::FormatTarget,
            LastOperation::ExpandPartitionTable,
            LastOperation::MigrateFiles,
            LastOperation::DeleteSource,
            LastOperation::ExpandFinal,
            LastOperation::Complete,
        ];

        for op in all {
            assert_eq!(op.as_str().parse::<LastOperation>().unwrap(), op);
        }
    }

    #[test]
    fn rejects_unknown_operation() {
        assert!("reticulate_splines".parse::<LastOperation>().is_err());
    }
}
