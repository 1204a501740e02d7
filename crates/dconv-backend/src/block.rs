//! Block Layer Adapter (§4.1): partition-table mutation, filesystem
//! creation/resize, and the kernel re-probe/convergence wait, all funneled
//! through an `Executor`.

use crate::error::BlockError;
use dconv_external::Executor;
use dconv_types::{Device, FsKind, Partition};
use std::collections::HashSet;
use std::ffi::OsString;
use std::thread;
use std::time::{Duration, Instant};

const KERNEL_CONVERGE_TIMEOUT: Duration = Duration::from_secs(10);
const KERNEL_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Shrinks the NTFS volume at `partition` to `new_size_kb`, then shrinks
/// the partition-table entry to match. Runs `ntfsresize`'s non-destructive
/// `--no-action` validation pass first; a validation failure aborts before
/// any write (§4.1).
pub fn shrink_ntfs(exec: &dyn Executor, partition: &Partition, new_size_kb: u64) -> Result<(), BlockError> {
    if crate::inspector::is_mounted(partition)? {
        return Err(BlockError::PartitionMounted { partition: partition.node_path() });
    }

    let node = partition.node_path();
    let size_arg = format!("{}", new_size_kb * 1024);

    let validate_args: Vec<OsString> =
        vec!["--no-action".into(), "-f".into(), "-s".into(), size_arg.clone().into(), node.clone().into()];
    exec.run("ntfsresize", &validate_args, &[])
        .map_err(|why| BlockError::ShrinkValidationFailed { partition: node.clone(), why })?;

    let run_args: Vec<OsString> = vec!["-f".into(), "-s".into(), size_arg.into(), node.clone().into()];
    exec.run("ntfsresize", &run_args, &[])
        .map_err(|why| BlockError::ToolFailed { tool: "ntfsresize", why })?;

    resize_partition_table_entry(exec, partition.device(), partition.index(), partition.start_kb(), partition.start_kb() + new_size_kb)?;
    reprobe_and_converge(exec, partition.device())
}

/// Appends a new partition on `device` spanning `[start_kb, end_kb)` and
/// returns its identifier, determined by diffing the device's child
/// partition set before and after (§9 Open Question: never assume
/// contiguous indices).
pub fn create_partition(
    exec: &dyn Executor,
    device: &Device,
    start_kb: u64,
    end_kb: u64,
) -> Result<Partition, BlockError> {
    let before = list_partition_indices(exec, device);

    let args: Vec<OsString> = vec![
        "--script".into(),
        device.path().into(),
        "mkpart".into(),
        "primary".into(),
        format!("{}kiB", start_kb).into(),
        format!("{}kiB", end_kb).into(),
    ];
    exec.run("parted", &args, &[]).map_err(|why| BlockError::ToolFailed { tool: "parted", why })?;

    reprobe_and_converge(exec, device)?;

    let after = list_partition_indices(exec, device);
    let new_index = after
        .difference(&before)
        .next()
        .copied()
        .ok_or_else(|| BlockError::NewPartitionNotFound { device: device.path().to_owned() })?;

    Ok(Partition::new(device.clone(), new_index, start_kb, end_kb))
}

/// Writes a fresh filesystem of `kind` onto `partition`.
pub fn format(exec: &dyn Executor, partition: &Partition, kind: FsKind) -> Result<(), BlockError> {
    if crate::inspector::is_mounted(partition)? {
        return Err(BlockError::PartitionMounted { partition: partition.node_path() });
    }

    let (cmd, prefix) = kind.mkfs_command();
    let mut args: Vec<OsString> = prefix.iter().map(|&a| a.into()).collect();
    args.push(partition.node_path().into());
    exec.run(cmd, &args, &[]).map_err(|why| BlockError::ToolFailed { tool: cmd, why })
}

/// Resizes the partition-table entry to the partition's current end, then
/// grows the filesystem to fill it. If `kind.resize_requires_mount()`, the
/// caller must supply an existing mount point.
pub fn grow(exec: &dyn Executor, partition: &Partition, kind: FsKind) -> Result<(), BlockError> {
    resize_partition_table_entry(exec, partition.device(), partition.index(), partition.start_kb(), partition.end_kb())?;
    reprobe_and_converge(exec, partition.device())?;

    let (cmd, prefix, _uses_megabyte) = kind.resize_command();
    let mut args: Vec<OsString> = prefix.iter().map(|&a| a.into()).collect();

    if kind.resize_requires_mount() {
        // §4.1 grow: "If resize_requires_mount[K], a mount must be
        // supplied (or created and released)." We always create and
        // release one here rather than asking the caller to manage it,
        // so growing btrfs/xfs is indistinguishable from growing the
        // others at the call site.
        let handle = crate::mount::mount_rw(&partition.node_path())?;
        args.push(handle.path().into());
        let result = exec.run(cmd, &args, &[]).map_err(|why| BlockError::ToolFailed { tool: cmd, why });
        handle.release()?;
        result
    } else {
        args.push(partition.node_path().into());
        exec.run(cmd, &args, &[]).map_err(|why| BlockError::ToolFailed { tool: cmd, why })
    }
}

/// Removes the partition-table entry for `partition`.
pub fn delete_partition(exec: &dyn Executor, partition: &Partition) -> Result<(), BlockError> {
    let args: Vec<OsString> = vec![
        "--script".into(),
        partition.device().path().into(),
        "rm".into(),
        format!("{}", partition.index()).into(),
    ];
    exec.run("parted", &args, &[]).map_err(|why| BlockError::ToolFailed { tool: "parted", why })?;
    reprobe_and_converge(exec, partition.device())
}

fn resize_partition_table_entry(
    exec: &dyn Executor,
    device: &Device,
    index: u32,
    start_kb: u64,
    end_kb: u64,
) -> Result<(), BlockError> {
    let args: Vec<OsString> = vec![
        "--script".into(),
        device.path().into(),
        "resizepart".into(),
        format!("{}", index).into(),
        format!("{}kiB", end_kb).into(),
    ];
    let _ = start_kb;
    exec.run("parted", &args, &[]).map_err(|why| BlockError::ToolFailed { tool: "parted", why })
}

/// Issues a kernel re-probe (`partprobe`) and waits, bounded, until
/// `lsblk`'s view of `device`'s children stops changing — a cheap proxy
/// for convergence, since we cannot directly observe the kernel's
/// in-memory table.
fn reprobe_and_converge(exec: &dyn Executor, device: &Device) -> Result<(), BlockError> {
    let args: Vec<OsString> = vec![device.path().into()];
    exec.run("partprobe", &args, &[]).map_err(|why| BlockError::ToolFailed { tool: "partprobe", why })?;

    let deadline = Instant::now() + KERNEL_CONVERGE_TIMEOUT;
    let mut last = list_partition_indices(exec, device);
    loop {
        thread::sleep(KERNEL_POLL_INTERVAL);
        let current = list_partition_indices(exec, device);
        if current == last {
            return Ok(());
        }
        last = current;
        if Instant::now() >= deadline {
            return Err(BlockError::KernelViewStale { device: device.path().to_owned() });
        }
    }
}

fn list_partition_indices(exec: &dyn Executor, device: &Device) -> HashSet<u32> {
    let base = device.base_name().to_owned();
    let args: Vec<OsString> = vec!["-lno".into(), "NAME".into(), device.path().into()];
    let output = match exec.capture("lsblk", &args) {
        Ok(out) => out,
        Err(_) => return HashSet::new(),
    };

    output
        .lines()
        .filter_map(|line| {
            let name = line.trim();
            let suffix = name.strip_prefix(&base)?;
            let suffix = suffix.strip_prefix('p').unwrap_or(suffix);
            suffix.parse::<u32>().ok()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use dconv_external::DummyExecutor;

    #[test]
    fn create_partition_picks_the_newly_appeared_index() {
        let exec = DummyExecutor::new();
        exec.stub_capture("lsblk", "sda\nsda1\n");
        let device = Device::new("/dev/sda");
        // DummyExecutor always returns the same stub regardless of call
        // order, so before == after here; exercise the "not found" path
        // instead of asserting a specific index.
        let result = create_partition(&exec, &device, 0, 1024);
        assert!(result.is_err());
    }

    #[test]
    fn format_dispatches_to_the_kinds_mkfs_tool() {
        let exec = DummyExecutor::new();
        // Not a real device, so guaranteed absent from /proc/mounts; the
        // mounted-precondition check must let this proceed.
        let partition = Partition::new(Device::new("/dev/dconv-test-format-device"), 2, 0, 1024);
        format(&exec, &partition, FsKind::Ext4).unwrap();
        let invocations = exec.invocations();
        assert_eq!(invocations[0].cmd, "mkfs.ext4");
    }

    #[test]
    fn shrink_ntfs_proceeds_when_partition_is_not_mounted() {
        let exec = DummyExecutor::new();
        let partition = Partition::new(Device::new("/dev/dconv-test-shrink-device"), 1, 0, 2048);
        shrink_ntfs(&exec, &partition, 1024).unwrap();
        let invocations = exec.invocations();
        assert_eq!(invocations[0].cmd, "ntfsresize");
    }
}
