use crate::device::Device;
use std::fmt;

/// A partition on a `Device`, identified by its 1-based index in the
/// partition table.
///
/// The engine does not assume indices are contiguous or stable across a
/// table rewrite — see the Open Question in §9 on renumbering. `Partition`
/// only carries the index it had at the moment it was last read from the
/// table; callers that mutate the table are responsible for re-reading it
/// afterwards rather than trusting a stale `Partition`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Partition {
    device: Device,
    index: u32,
    start_kb: u64,
    end_kb: u64,
}

impl Partition {
    pub fn new(device: Device, index: u32, start_kb: u64, end_kb: u64) -> Partition {
        assert!(end_kb > start_kb, "partition end must be after its start");
        Partition { device, index, start_kb, end_kb }
    }

    pub fn device(&self) -> &Device { &self.device }

    pub fn index(&self) -> u32 { self.index }

    pub fn start_kb(&self) -> u64 { self.start_kb }

    pub fn end_kb(&self) -> u64 { self.end_kb }

    pub fn size_kb(&self) -> u64 { self.end_kb - self.start_kb }

    /// Whether this partition's extent overlaps another's. Used to check
    /// the disjointness invariant before committing a new partition table.
    pub fn overlaps(&self, other: &Partition) -> bool {
        self.device == other.device
            && self.start_kb < other.end_kb
            && other.start_kb < self.end_kb
    }

    /// The device node this partition appears as, e.g. `/dev/sda1` or
    /// `/dev/nvme0n1p1` depending on `Device::needs_partition_infix`.
    pub fn node_path(&self) -> std::path::PathBuf {
        let infix = if self.device.needs_partition_infix() { "p" } else { "" };
        let mut name = self.device.path().as_os_str().to_owned();
        name.push(format!("{}{}", infix, self.index));
        std::path::PathBuf::from(name)
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.node_path().display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_path_adds_infix_for_nvme() {
        let part = Partition::new(Device::new("/dev/nvme0n1"), 2, 0, 1024);
        assert_eq!(part.node_path().to_str().unwrap(), "/dev/nvme0n1p2");
    }

    #[test]
    fn node_path_plain_for_sata() {
        let part = Partition::new(Device::new("/dev/sda"), 1, 0, 1024);
        assert_eq!(part.node_path().to_str().unwrap(), "/dev/sda1");
    }

    #[test]
    fn detects_overlap() {
        let a = Partition::new(Device::new("/dev/sda"), 1, 0, 100);
        let b = Partition::new(Device::new("/dev/sda"), 2, 50, 150);
        let c = Partition::new(Device::new("/dev/sda"), 3, 100, 150);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }

    #[test]
    #[should_panic]
    fn rejects_inverted_extent() {
        Partition::new(Device::new("/dev/sda"), 1, 100, 50);
    }
}
