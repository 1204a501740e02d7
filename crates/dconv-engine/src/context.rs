use dconv_types::{Device, FsKind, Partition};

/// The engine's explicit configuration record (§9 Design Notes: "Global
/// mutable state in the original... re-architect into an explicit
/// `ConversionContext` record passed to the controller").
///
/// Replaces distinst's module globals (target kind, current partitions,
/// iteration counter, dry-run flag) with values threaded through the
/// call, rather than read from `static`s.
#[derive(Debug, Clone)]
pub struct ConversionContext {
    pub device: Device,
    pub target_kind: FsKind,
    pub source_partition: Partition,
    /// Set when the caller (typically the CLI, after probing free space
    /// on an already-existing volume) wants the engine to reuse a
    /// pre-existing target partition rather than carving a new one out of
    /// the shrunk source (§4.5 step 6: "If a pre-existing target
    /// partition was chosen... skip shrink/create/format").
    pub existing_target: Option<Partition>,
    pub instance_id: String,
}

impl ConversionContext {
    pub fn new(device: Device, target_kind: FsKind, source_partition: Partition) -> ConversionContext {
        ConversionContext {
            device,
            target_kind,
            source_partition,
            existing_target: None,
            instance_id: dconv_external::instance_id(),
        }
    }

    pub fn with_existing_target(mut self, target: Partition) -> ConversionContext {
        self.existing_target = Some(target);
        self
    }

    pub fn use_existing_target(&self) -> bool { self.existing_target.is_some() }
}
