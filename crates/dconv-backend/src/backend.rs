//! The one seam the Conversion Engine calls through (§9 Design Notes:
//! "process spawning... this is the only seam that callers mock for
//! tests. The simulated ('dummy') backend is a second implementation of
//! this seam, not a branch in every call site.").
//!
//! `SystemBackend` wires the Block Layer Adapter, Volume Inspector, and
//! Verified Migrator functions above to a real `Executor`. `DummyBackend`
//! answers every query with scripted numbers and records every mutating
//! call without touching the disk, backing `--dummy-mode` and the
//! engine's own test suite.

use crate::error::{BlockError, MigrateError};
use crate::migrator::{self, MigrationJob};
use crate::{block, inspector};
use dconv_external::Executor;
use dconv_types::{Device, DiskRotation, FsKind, Partition};
use std::collections::VecDeque;
use std::io;
use std::sync::Mutex;

/// Unifies the Block Layer Adapter (§4.1), Volume Inspector (§4.2), and
/// Verified Migrator (§4.3) behind one trait so the Conversion Engine
/// never branches on whether it is running for real or in `--dummy-mode`.
pub trait Backend: Send + Sync {
    fn shrink_ntfs(&self, partition: &Partition, new_size_kb: u64) -> Result<(), BlockError>;
    fn create_partition(&self, device: &Device, start_kb: u64, end_kb: u64) -> Result<Partition, BlockError>;
    fn format(&self, partition: &Partition, kind: FsKind) -> Result<(), BlockError>;
    fn grow(&self, partition: &Partition, kind: FsKind) -> Result<(), BlockError>;
    fn delete_partition(&self, partition: &Partition) -> Result<(), BlockError>;

    fn used_kb(&self, partition: &Partition, kind: FsKind) -> io::Result<u64>;
    fn disk_total_kb(&self, device: &Device) -> io::Result<u64>;
    fn is_mounted(&self, partition: &Partition) -> io::Result<bool>;
    fn is_rotational(&self, device: &Device) -> DiskRotation;

    fn migrate(&self, source: &Partition, target: &Partition) -> Result<MigrationJob, MigrateError>;
}

/// The real implementation: every operation shells out via the supplied
/// `Executor` (which is itself `SystemExecutor` in production, or
/// `DummyExecutor` when only the process-spawning seam, not the whole
/// backend, needs stubbing for a finer-grained test).
pub struct SystemBackend<E: Executor> {
    exec: E,
}

impl<E: Executor> SystemBackend<E> {
    pub fn new(exec: E) -> SystemBackend<E> { SystemBackend { exec } }
}

impl<E: Executor> Backend for SystemBackend<E> {
    fn shrink_ntfs(&self, partition: &Partition, new_size_kb: u64) -> Result<(), BlockError> {
        block::shrink_ntfs(&self.exec, partition, new_size_kb)
    }

    fn create_partition(&self, device: &Device, start_kb: u64, end_kb: u64) -> Result<Partition, BlockError> {
        block::create_partition(&self.exec, device, start_kb, end_kb)
    }

    fn format(&self, partition: &Partition, kind: FsKind) -> Result<(), BlockError> {
        block::format(&self.exec, partition, kind)
    }

    fn grow(&self, partition: &Partition, kind: FsKind) -> Result<(), BlockError> {
        block::grow(&self.exec, partition, kind)
    }

    fn delete_partition(&self, partition: &Partition) -> Result<(), BlockError> {
        block::delete_partition(&self.exec, partition)
    }

    fn used_kb(&self, partition: &Partition, kind: FsKind) -> io::Result<u64> {
        inspector::used_kb(&self.exec, partition, kind)
    }

    fn disk_total_kb(&self, device: &Device) -> io::Result<u64> {
        inspector::disk_total_kb(&self.exec, device)
    }

    fn is_mounted(&self, partition: &Partition) -> io::Result<bool> {
        inspector::is_mounted(partition)
    }

    fn is_rotational(&self, device: &Device) -> DiskRotation {
        inspector::is_rotational(&self.exec, device)
    }

    fn migrate(&self, source: &Partition, target: &Partition) -> Result<MigrationJob, MigrateError> {
        migrator::migrate(&self.exec, source, target)
    }
}

/// A recorded mutating call, for assertions in tests and for the
/// `--dummy-mode` "log intent, return success" behaviour of §4.5's dry
/// run (the dry-run flag itself lives in `dconv-engine`; this backend is
/// what it's backed by).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DummyCall {
    ShrinkNtfs { partition: Partition, new_size_kb: u64 },
    CreatePartition { device: Device, start_kb: u64, end_kb: u64 },
    Format { partition: Partition, kind: FsKind },
    Grow { partition: Partition, kind: FsKind },
    DeletePartition { partition: Partition },
}

/// A scripted `Backend` for `--dummy-mode` and the engine's own
/// end-to-end tests (§8). Queries return values fed in advance via the
/// `script_*` methods rather than touching any real device; mutating
/// calls are recorded and always succeed unless a canned failure was
/// queued for that exact call.
#[derive(Default)]
pub struct DummyBackend {
    calls: Mutex<Vec<DummyCall>>,
    used_kb_sequence: Mutex<VecDeque<u64>>,
    disk_total_kb: Mutex<u64>,
    rotational: Mutex<DiskRotation>,
    migration_script: Mutex<VecDeque<Result<MigrationJob, MigrateError>>>,
    next_partition_index: Mutex<u32>,
}

impl DummyBackend {
    pub fn new() -> DummyBackend {
        DummyBackend {
            calls: Mutex::new(Vec::new()),
            used_kb_sequence: Mutex::new(VecDeque::new()),
            disk_total_kb: Mutex::new(0),
            rotational: Mutex::new(DiskRotation::Unknown),
            migration_script: Mutex::new(VecDeque::new()),
            next_partition_index: Mutex::new(2),
        }
    }

    /// Queues the sequence of `used_kb` values successive calls will
    /// return; once exhausted the last value repeats.
    pub fn script_used_kb<I: IntoIterator<Item = u64>>(&self, values: I) {
        *self.used_kb_sequence.lock().unwrap() = values.into_iter().collect();
    }

    pub fn script_disk_total_kb(&self, value: u64) { *self.disk_total_kb.lock().unwrap() = value; }

    pub fn script_rotational(&self, value: DiskRotation) { *self.rotational.lock().unwrap() = value; }

    /// Queues the result of successive `migrate` calls.
    pub fn script_migration(&self, result: Result<MigrationJob, MigrateError>) {
        self.migration_script.lock().unwrap().push_back(result);
    }

    pub fn calls(&self) -> Vec<DummyCall> { self.calls.lock().unwrap().clone() }

    fn record(&self, call: DummyCall) { self.calls.lock().unwrap().push(call); }
}

impl Backend for DummyBackend {
    fn shrink_ntfs(&self, partition: &Partition, new_size_kb: u64) -> Result<(), BlockError> {
        self.record(DummyCall::ShrinkNtfs { partition: partition.clone(), new_size_kb });
        Ok(())
    }

    fn create_partition(&self, device: &Device, start_kb: u64, end_kb: u64) -> Result<Partition, BlockError> {
        self.record(DummyCall::CreatePartition { device: device.clone(), start_kb, end_kb });
        let mut index = self.next_partition_index.lock().unwrap();
        let partition = Partition::new(device.clone(), *index, start_kb, end_kb);
        *index += 1;
        Ok(partition)
    }

    fn format(&self, partition: &Partition, kind: FsKind) -> Result<(), BlockError> {
        self.record(DummyCall::Format { partition: partition.clone(), kind });
        Ok(())
    }

    fn grow(&self, partition: &Partition, kind: FsKind) -> Result<(), BlockError> {
        self.record(DummyCall::Grow { partition: partition.clone(), kind });
        Ok(())
    }

    fn delete_partition(&self, partition: &Partition) -> Result<(), BlockError> {
        self.record(DummyCall::DeletePartition { partition: partition.clone() });
        Ok(())
    }

    fn used_kb(&self, _partition: &Partition, _kind: FsKind) -> io::Result<u64> {
        let mut sequence = self.used_kb_sequence.lock().unwrap();
        Ok(if sequence.len() > 1 { sequence.pop_front().unwrap() } else { sequence.front().copied().unwrap_or(0) })
    }

    fn disk_total_kb(&self, _device: &Device) -> io::Result<u64> { Ok(*self.disk_total_kb.lock().unwrap()) }

    fn is_mounted(&self, _partition: &Partition) -> io::Result<bool> { Ok(false) }

    fn is_rotational(&self, _device: &Device) -> DiskRotation { *self.rotational.lock().unwrap() }

    fn migrate(&self, _source: &Partition, _target: &Partition) -> Result<MigrationJob, MigrateError> {
        let mut script = self.migration_script.lock().unwrap();
        script.pop_front().unwrap_or_else(|| Ok(MigrationJob::default()))
    }
}

/// Wraps any `Backend` so that every mutating operation logs its intent
/// and returns success without touching the disk, while every query
/// passes straight through to the inner backend (§4.5 "Dry run": "every
/// mutating Block Layer and Migrator operation... log[s] its intent and
/// return[s] success without side effect; queries still run.").
///
/// This is the third implementation of the one backend seam (§9 Design
/// Notes), not a `dry_run` branch threaded through every call site.
pub struct DryRunBackend<B> {
    inner: B,
}

impl<B: Backend> DryRunBackend<B> {
    pub fn new(inner: B) -> DryRunBackend<B> { DryRunBackend { inner } }
}

impl<B: Backend> Backend for DryRunBackend<B> {
    fn shrink_ntfs(&self, partition: &Partition, new_size_kb: u64) -> Result<(), BlockError> {
        info!("[dry-run] would shrink {} to {} KiB", partition, new_size_kb);
        Ok(())
    }

    fn create_partition(&self, device: &Device, start_kb: u64, end_kb: u64) -> Result<Partition, BlockError> {
        info!("[dry-run] would create a partition on {} spanning [{}, {}) KiB", device, start_kb, end_kb);
        Ok(Partition::new(device.clone(), 0, start_kb, end_kb))
    }

    fn format(&self, partition: &Partition, kind: FsKind) -> Result<(), BlockError> {
        info!("[dry-run] would format {} as {}", partition, kind);
        Ok(())
    }

    fn grow(&self, partition: &Partition, kind: FsKind) -> Result<(), BlockError> {
        info!("[dry-run] would grow {} ({}) to fill its partition", partition, kind);
        Ok(())
    }

    fn delete_partition(&self, partition: &Partition) -> Result<(), BlockError> {
        info!("[dry-run] would delete partition {}", partition);
        Ok(())
    }

    fn used_kb(&self, partition: &Partition, kind: FsKind) -> io::Result<u64> { self.inner.used_kb(partition, kind) }

    fn disk_total_kb(&self, device: &Device) -> io::Result<u64> { self.inner.disk_total_kb(device) }

    fn is_mounted(&self, partition: &Partition) -> io::Result<bool> { self.inner.is_mounted(partition) }

    fn is_rotational(&self, device: &Device) -> DiskRotation { self.inner.is_rotational(device) }

    fn migrate(&self, source: &Partition, target: &Partition) -> Result<MigrationJob, MigrateError> {
        info!("[dry-run] would migrate files from {} to {}", source, target);
        Ok(MigrationJob::default())
    }
}

impl<T: Backend + ?Sized> Backend for &T {
    fn shrink_ntfs(&self, partition: &Partition, new_size_kb: u64) -> Result<(), BlockError> {
        (**self).shrink_ntfs(partition, new_size_kb)
    }

    fn create_partition(&self, device: &Device, start_kb: u64, end_kb: u64) -> Result<Partition, BlockError> {
        (**self).create_partition(device, start_kb, end_kb)
    }

    fn format(&self, partition: &Partition, kind: FsKind) -> Result<(), BlockError> { (**self).format(partition, kind) }

    fn grow(&self, partition: &Partition, kind: FsKind) -> Result<(), BlockError> { (**self).grow(partition, kind) }

    fn delete_partition(&self, partition: &Partition) -> Result<(), BlockError> { (**self).delete_partition(partition) }

    fn used_kb(&self, partition: &Partition, kind: FsKind) -> io::Result<u64> { (**self).used_kb(partition, kind) }

    fn disk_total_kb(&self, device: &Device) -> io::Result<u64> { (**self).disk_total_kb(device) }

    fn is_mounted(&self, partition: &Partition) -> io::Result<bool> { (**self).is_mounted(partition) }

    fn is_rotational(&self, device: &Device) -> DiskRotation { (**self).is_rotational(device) }

    fn migrate(&self, source: &Partition, target: &Partition) -> Result<MigrationJob, MigrateError> {
        (**self).migrate(source, target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dconv_types::Device;

    #[test]
    fn dummy_backend_records_mutating_calls() {
        let backend = DummyBackend::new();
        let device = Device::new("/dev/sda");
        let partition = Partition::new(device.clone(), 1, 0, 1000);
        backend.shrink_ntfs(&partition, 500).unwrap();
        backend.format(&partition, FsKind::Ext4).unwrap();
        assert_eq!(backend.calls().len(), 2);
    }

    #[test]
    fn dummy_backend_scripted_used_kb_sequence_then_holds_last() {
        let backend = DummyBackend::new();
        backend.script_used_kb([3_000, 1_000, 500]);
        let device = Device::new("/dev/sda");
        let partition = Partition::new(device, 1, 0, 1000);
        assert_eq!(backend.used_kb(&partition, FsKind::Ntfs).unwrap(), 3_000);
        assert_eq!(backend.used_kb(&partition, FsKind::Ntfs).unwrap(), 1_000);
        assert_eq!(backend.used_kb(&partition, FsKind::Ntfs).unwrap(), 500);
        assert_eq!(backend.used_kb(&partition, FsKind::Ntfs).unwrap(), 500);
    }

    #[test]
    fn dry_run_backend_never_forwards_mutations_to_the_inner_backend() {
        let dummy = DummyBackend::new();
        let device = Device::new("/dev/sda");
        let partition = Partition::new(device.clone(), 1, 0, 1000);

        {
            let dry_run = DryRunBackend::new(&dummy);
            dry_run.shrink_ntfs(&partition, 500).unwrap();
            dry_run.format(&partition, FsKind::Ext4).unwrap();
            dry_run.delete_partition(&partition).unwrap();
        }

        assert!(dummy.calls().is_empty());
    }

    #[test]
    fn dummy_backend_create_partition_assigns_increasing_indices() {
        let backend = DummyBackend::new();
        let device = Device::new("/dev/sda");
        let a = backend.create_partition(&device, 0, 100).unwrap();
        let b = backend.create_partition(&device, 100, 200).unwrap();
        assert_ne!(a.index(), b.index());
    }
}
