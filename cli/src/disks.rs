//! Disk/volume enumeration collaborator: resolves a user-supplied device
//! path into the `Partition`s the engine operates on. Runs outside the
//! engine's `Executor` seam — like the teacher CLI's own direct call to
//! `Disks::probe_devices()`, this is one-shot argument resolution, not
//! engine logic that needs to be mockable.

use dconv::{Device, Partition};
use std::io;
use std::process::Command;

pub(crate) struct PartitionInfo {
    pub index: u32,
    pub start_kb: u64,
    pub end_kb: u64,
    pub fs_type: Option<String>,
}

/// Lists the partitions `parted` reports for `device`, in KiB units.
///
/// Grounded on the `parted --script ... unit KiB print` invocations
/// `dconv-backend::block` already uses for partition-table mutation;
/// this is the read-only counterpart.
pub(crate) fn list_partitions(device: &Device) -> io::Result<Vec<PartitionInfo>> {
    let device_path = device.path().to_string_lossy();
    let args = vec!["--script", device_path.as_ref(), "unit", "KiB", "print"];
    let output = Command::new("parted").args(&args).output()?;

    if !output.status.success() {
        return Err(io::Error::new(io::ErrorKind::Other, "parted print failed"));
    }

    let text = String::from_utf8_lossy(&output.stdout);
    Ok(text.lines().filter_map(parse_partition_line).collect())
}

fn parse_partition_line(line: &str) -> Option<PartitionInfo> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let index: u32 = fields.first()?.parse().ok()?;
    let start_kb = parse_kib_field(fields.get(1)?)?;
    let end_kb = parse_kib_field(fields.get(2)?)?;
    let fs_type = fields.get(4).map(|s| s.to_lowercase());

    Some(PartitionInfo { index, start_kb, end_kb, fs_type })
}

fn parse_kib_field(field: &str) -> Option<u64> {
    field.strip_suffix("kiB").or_else(|| field.strip_suffix("KiB"))?.parse::<f64>().ok().map(|v| v as u64)
}

/// Finds the first NTFS partition on `device`, the conversion's required
/// source (§2 Overview).
pub(crate) fn find_ntfs_partition(device: &Device) -> io::Result<Option<Partition>> {
    let partitions = list_partitions(device)?;
    Ok(partitions
        .into_iter()
        .find(|p| p.fs_type.as_deref() == Some("ntfs"))
        .map(|p| Partition::new(device.clone(), p.index, p.start_kb, p.end_kb)))
}

/// Resolves an explicit `--use-existing <index>` argument to its current
/// extent on disk.
pub(crate) fn find_partition_by_index(device: &Device, index: u32) -> io::Result<Option<Partition>> {
    let partitions = list_partitions(device)?;
    Ok(partitions.into_iter().find(|p| p.index == index).map(|p| Partition::new(device.clone(), p.index, p.start_kb, p.end_kb)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "Model: ATA Disk (scsi)\n\
Disk /dev/sda: 500107862KiB\n\
Sector size (logical/physical): 512B/512B\n\
Partition Table: gpt\n\
\n\
Number  Start       End          Size         File system  Name  Flags\n\
 1      1024KiB     1050624KiB   1049600KiB   ntfs\n\
 2      1050624KiB  500106838KiB 499056214KiB  ext4\n";

    #[test]
    fn parses_ntfs_and_ext4_rows() {
        let rows: Vec<PartitionInfo> = SAMPLE.lines().filter_map(parse_partition_line).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].fs_type.as_deref(), Some("ntfs"));
        assert_eq!(rows[0].start_kb, 1024);
        assert_eq!(rows[0].end_kb, 1050624);
        assert_eq!(rows[1].fs_type.as_deref(), Some("ext4"));
    }

    #[test]
    fn ignores_non_partition_lines() {
        assert!(parse_partition_line("Model: ATA Disk (scsi)").is_none());
        assert!(parse_partition_line("").is_none());
    }
}
