//! Volume Inspector (§4.2): pure queries over geometry and live usage.
//!
//! `used_kb` is the one query with a side effect — it mounts read-only,
//! scoped, when the volume is not already mounted (§4.2: "no side effects
//! except a temporary read-only mount... that mount is scoped and
//! released").

use crate::error::BlockError;
use crate::mount::mount_readonly;
use dconv_external::Executor;
use dconv_types::{Device, DiskRotation, FsKind, Partition};
use proc_mounts::MountList;
use std::ffi::OsString;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use sysfs_class::{Block, SysClass};

fn sys_block_path(device: &Device) -> std::path::PathBuf {
    std::path::PathBuf::from(format!("/sys/class/block/{}", device.base_name()))
}

/// Whether `partition` currently appears in `/proc/mounts`, and if so its
/// mount point.
pub fn mount_point(partition: &Partition) -> io::Result<Option<std::path::PathBuf>> {
    let mounts = MountList::new()?;
    Ok(mounts.get_mount_point(partition.node_path()))
}

pub fn is_mounted(partition: &Partition) -> io::Result<bool> {
    Ok(mount_point(partition)?.is_some())
}

/// Live data on `partition`, in kilobytes. If the volume is already
/// mounted, queries through that mount point; otherwise mounts read-only,
/// queries, and releases. Falls back to a conservative `0.8 × size_kb`
/// estimate if the mount itself fails (§9 Open Question: surfaced as a
/// loud warning by the caller, not silently swallowed — this function
/// returns the warning as part of its error so the engine can log it
/// before falling back).
pub fn used_kb(exec: &dyn Executor, partition: &Partition, kind: FsKind) -> io::Result<u64> {
    if let Some(mount) = mount_point(partition)? {
        return used_kb_at_path(exec, &partition.node_path(), &mount, kind);
    }

    match mount_readonly(&partition.node_path()) {
        Ok(handle) => {
            let result = used_kb_at_path(exec, &partition.node_path(), handle.path(), kind);
            handle.release().map_err(block_to_io)?;
            result
        }
        Err(why) => {
            let estimate = (partition.size_kb() * 8) / 10;
            warn!(
                "unable to mount {} read-only to probe usage ({}); falling back to a conservative estimate of {} KiB (80% of {} KiB)",
                partition, why, estimate, partition.size_kb()
            );
            Ok(estimate)
        }
    }
}

fn used_kb_at_path(exec: &dyn Executor, node: &Path, mount: &Path, kind: FsKind) -> io::Result<u64> {
    match kind {
        FsKind::Ext4 => ext4_used_kb(exec, node),
        FsKind::Ntfs => ntfs_used_kb(exec, node),
        _ => statvfs_used_kb(mount),
    }
}

/// Ported near-verbatim from `disk/usage.rs::get_ext4_usage`: parses
/// `dumpe2fs -h` output rather than mounting, so it works whether or not
/// the caller already has a mount in hand.
fn ext4_used_kb(exec: &dyn Executor, node: &Path) -> io::Result<u64> {
    let args: Vec<OsString> = vec!["-h".into(), node.into()];
    let output = exec.capture("dumpe2fs", &args)?;
    let mut lines = output.lines().skip(1).map(|l| Ok(l.to_owned()));

    let total_blocks = parse_dump_field(&mut lines, "Block count:")?;
    let free_blocks = parse_dump_field(&mut lines, "Free blocks:")?;
    let block_size = parse_dump_field(&mut lines, "Block size:")?;
    Ok(((total_blocks - free_blocks) * block_size) / 1024)
}

/// NTFS usage via `ntfsresize --info`, which doubles as the dry-run
/// validation pass §4.1's `shrink_ntfs` performs before any write.
fn ntfs_used_kb(exec: &dyn Executor, node: &Path) -> io::Result<u64> {
    let args: Vec<OsString> = vec!["--info".into(), "--no-action".into(), node.into()];
    let output = exec.capture("ntfsresize", &args)?;

    for line in output.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("You might resize at") {
            if let Some(bytes) = rest.split_whitespace().next() {
                if let Ok(bytes) = bytes.parse::<u64>() {
                    return Ok(bytes / 1024);
                }
            }
        }
    }

    Err(io::Error::new(io::ErrorKind::Other, "ntfsresize --info output missing resize estimate"))
}

fn parse_dump_field<R: Iterator<Item = io::Result<String>>>(reader: &mut R, start: &str) -> io::Result<u64> {
    loop {
        match reader.next() {
            Some(line) => {
                let line = line?;
                if line.starts_with(start) {
                    let value = line[start.len()..]
                        .split_whitespace()
                        .next()
                        .and_then(|v| v.parse::<u64>().ok())
                        .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "invalid dump output: bad value"))?;
                    return Ok(value);
                }
            }
            None => return Err(io::Error::new(io::ErrorKind::Other, "invalid dump output: EOF")),
        }
    }
}

/// Fallback used-space probe for target kinds with no kind-specific dump
/// tool parsed above (btrfs/xfs/f2fs/reiserfs/jfs): reads `statvfs` on the
/// mounted path.
fn statvfs_used_kb(mount: &Path) -> io::Result<u64> {
    let path = std::ffi::CString::new(mount.as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::Other, "mount path contains a NUL byte"))?;

    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::statvfs(path.as_ptr(), &mut stat) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }

    let block_size = stat.f_frsize as u64;
    let total = stat.f_blocks as u64 * block_size;
    let free = stat.f_bfree as u64 * block_size;
    Ok((total - free) / 1024)
}

/// Total size of `device`, in kilobytes, via `blockdev --getsize64`.
pub fn disk_total_kb(exec: &dyn Executor, device: &Device) -> io::Result<u64> {
    let args: Vec<OsString> = vec!["--getsize64".into(), device.path().into()];
    let output = exec.capture("blockdev", &args)?;
    output
        .trim()
        .parse::<u64>()
        .map(|bytes| bytes / 1024)
        .map_err(|_| io::Error::new(io::ErrorKind::Other, "blockdev --getsize64 returned non-numeric output"))
}

/// Rotational detection chain (§4.2): sysfs rotational flag, then
/// `lsblk -d -o ROTA`, then a best-effort `smartctl` probe, else unknown.
pub fn is_rotational(exec: &dyn Executor, device: &Device) -> DiskRotation {
    if let Ok(block) = Block::from_path(&sys_block_path(device)) {
        if let Ok(rotational) = block.queue_rotational() {
            return if rotational == 1 { DiskRotation::Rotational } else { DiskRotation::SolidState };
        }
    }

    let args: Vec<OsString> = vec!["-d".into(), "-n".into(), "-o".into(), "ROTA".into(), device.path().into()];
    if let Ok(output) = exec.capture("lsblk", &args) {
        match output.trim() {
            "1" => return DiskRotation::Rotational,
            "0" => return DiskRotation::SolidState,
            _ => {}
        }
    }

    let args: Vec<OsString> = vec!["-i".into(), device.path().into()];
    if let Ok(output) = exec.capture("smartctl", &args) {
        if output.to_lowercase().contains("solid state device") {
            return DiskRotation::SolidState;
        }
        if output.to_lowercase().contains("rotation rate") {
            return DiskRotation::Rotational;
        }
    }

    DiskRotation::Unknown
}

fn block_to_io(why: BlockError) -> io::Error {
    io::Error::new(io::ErrorKind::Other, format!("{}", why))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dconv_external::DummyExecutor;

    const EXT_DUMP: &str = r#"dumpe2fs 1.43.9 (8-Feb-2018)
Filesystem volume name:   <none>
Block count:              5242880
Free blocks:              5116591
Block size:               4096
"#;

    #[test]
    fn ext4_usage_parses_dumpe2fs_output() {
        let exec = DummyExecutor::new();
        exec.stub_capture("dumpe2fs", EXT_DUMP);
        let kb = ext4_used_kb(&exec, Path::new("/dev/sda2")).unwrap();
        assert_eq!(kb, ((5242880 - 5116591) * 4096) / 1024);
    }

    #[test]
    fn ntfs_usage_parses_resize_estimate() {
        let exec = DummyExecutor::new();
        exec.stub_capture(
            "ntfsresize",
            "Would resize to 2147483648 bytes\nYou might resize at 2097152000 bytes\n",
        );
        let kb = ntfs_used_kb(&exec, Path::new("/dev/sda1")).unwrap();
        assert_eq!(kb, 2097152000 / 1024);
    }

    #[test]
    fn disk_total_parses_getsize64() {
        let exec = DummyExecutor::new();
        exec.stub_capture("blockdev", "500107862016\n");
        let device = Device::new("/dev/sda");
        assert_eq!(disk_total_kb(&exec, &device).unwrap(), 500107862016 / 1024);
    }

    #[test]
    fn rotational_falls_back_to_lsblk_column() {
        let exec = DummyExecutor::new();
        exec.stub_capture("lsblk", "0\n");
        let device = Device::new("/dev/sda-not-a-real-device");
        assert_eq!(is_rotational(&exec, &device), DiskRotation::SolidState);
    }

    #[test]
    fn used_kb_falls_back_to_conservative_estimate_when_mount_fails() {
        // Not mounted and not a real device, so the read-only probe mount
        // is guaranteed to fail here; `used_kb` must downgrade to the
        // 80%-of-size_kb estimate rather than propagate the mount error.
        let exec = DummyExecutor::new();
        let device = Device::new("/dev/dconv-test-nonexistent-device");
        let partition = Partition::new(device, 1, 0, 1_000_000);
        let kb = used_kb(&exec, &partition, FsKind::Ntfs).unwrap();
        assert_eq!(kb, 800_000);
    }
}
