use std::fmt;
use std::path::{Path, PathBuf};

/// An opaque block device identifier, such as `/dev/sda` or
/// `/dev/nvme0n1`.
///
/// The engine never creates or destroys a `Device`; it is owned by the OS
/// and only ever referenced.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Device(PathBuf);

impl Device {
    pub fn new<P: Into<PathBuf>>(path: P) -> Device { Device(path.into()) }

    pub fn path(&self) -> &Path { &self.0 }

    /// The device's base name, such as `sda` or `nvme0n1`, used to derive
    /// per-device journal paths and to build partition identifiers.
    pub fn base_name(&self) -> &str {
        self.0
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("unknown")
    }

    /// Whether this device's name ends in a digit, in which case
    /// partition identifiers take a `p` infix (`nvme0n1p1`) rather than a
    /// bare numeric suffix (`sda1`). See the partition-identifier note in
    /// §3 of the data model: "with or without a separator, device-class
    /// dependent."
    pub fn needs_partition_infix(&self) -> bool {
        self.base_name()
            .chars()
            .last()
            .map_or(false, |c| c.is_ascii_digit())
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result { write!(f, "{}", self.0.display()) }
}

/// Whether a device is backed by spinning media. Derived, never persisted
/// (§3 Data Model); used only by the defrag collaborator outside this
/// crate's scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskRotation {
    Rotational,
    SolidState,
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infix_for_nvme() {
        let device = Device::new("/dev/nvme0n1");
        assert!(device.needs_partition_infix());
    }

    #[test]
    fn no_infix_for_sata() {
        let device = Device::new("/dev/sda");
        assert!(!device.needs_partition_infix());
    }

    #[test]
    fn base_name_extraction() {
        assert_eq!(Device::new("/dev/sdb").base_name(), "sdb");
    }
}
