use std::fmt;
use std::str::FromStr;

/// The closed set of filesystem kinds the engine understands: the always
/// source `Ntfs`, plus the six kinds it can convert into.
///
/// Per Design Note §9 ("dynamic dispatch over filesystem kind... the
/// original uses associative tables keyed by filesystem name"), this is a
/// plain sum type. The per-kind command tables live next to it as pure
/// functions rather than as a runtime-constructed map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FsKind {
    Ntfs,
    Ext4,
    Btrfs,
    Xfs,
    F2fs,
    Reiserfs,
    Jfs,
}

impl FsKind {
    pub const TARGETS: [FsKind; 6] = [
        FsKind::Ext4,
        FsKind::Btrfs,
        FsKind::Xfs,
        FsKind::F2fs,
        FsKind::Reiserfs,
        FsKind::Jfs,
    ];

    /// Whether growing a volume of this kind requires it to be mounted
    /// first (§3 Data Model: `resize_requires_mount`).
    pub fn resize_requires_mount(self) -> bool {
        matches!(self, FsKind::Btrfs | FsKind::Xfs)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FsKind::Ntfs => "ntfs",
            FsKind::Ext4 => "ext4",
            FsKind::Btrfs => "btrfs",
            FsKind::Xfs => "xfs",
            FsKind::F2fs => "f2fs",
            FsKind::Reiserfs => "reiserfs",
            FsKind::Jfs => "jfs",
        }
    }

    /// The `mkfs.*` command and its fixed argument prefix, per
    /// `crates/external/src/block.rs::mkfs`'s table, extended with the
    /// target kinds that table did not carry.
    pub fn mkfs_command(self) -> (&'static str, &'static [&'static str]) {
        match self {
            FsKind::Ntfs => ("mkfs.ntfs", &["-FQ", "-q"]),
            FsKind::Ext4 => ("mkfs.ext4", &["-F", "-q", "-E", "lazy_itable_init"]),
            FsKind::Btrfs => ("mkfs.btrfs", &["-f"]),
            FsKind::Xfs => ("mkfs.xfs", &["-f"]),
            FsKind::F2fs => {
                ("mkfs.f2fs", &["-f", "-q", "-O", "extra_attr,inode_checksum,sb_checksum"])
            }
            FsKind::Reiserfs => ("mkfs.reiserfs", &["-f", "-q"]),
            FsKind::Jfs => ("mkfs.jfs", &["-q"]),
        }
    }

    /// The resize command, its fixed argument prefix, and whether the
    /// size argument is expressed in megabytes (vs. mebibytes) — the
    /// workaround `src/disk/resize.rs` calls out as needed "due to
    /// different tools using different standards."
    pub fn resize_command(self) -> (&'static str, &'static [&'static str], bool) {
        match self {
            FsKind::Ntfs => ("ntfsresize", &["-f", "-s"], true),
            FsKind::Ext4 => ("resize2fs", &["-f"], false),
            FsKind::Btrfs => ("btrfs", &["filesystem", "resize"], false),
            FsKind::Xfs => ("xfs_growfs", &[], false),
            FsKind::F2fs => ("resize.f2fs", &[], false),
            FsKind::Reiserfs => ("resize_reiserfs", &["-s"], true),
            FsKind::Jfs => ("mount", &["-o", "remount,resize"], false),
        }
    }

    pub fn fsck_command(self) -> (&'static str, &'static str) {
        match self {
            FsKind::Ntfs => ("ntfsfix", "-d"),
            FsKind::Ext4 => ("e2fsck", "-fy"),
            FsKind::Btrfs => ("btrfs", "check"),
            FsKind::Xfs => ("xfs_repair", ""),
            FsKind::F2fs => ("fsck.f2fs", "-fy"),
            FsKind::Reiserfs => ("reiserfsck", "-y"),
            FsKind::Jfs => ("fsck.jfs", "-y"),
        }
    }
}

impl fmt::Display for FsKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result { write!(f, "{}", self.as_str()) }
}

impl FromStr for FsKind {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ntfs" => Ok(FsKind::Ntfs),
            "ext4" => Ok(FsKind::Ext4),
            "btrfs" => Ok(FsKind::Btrfs),
            "xfs" => Ok(FsKind::Xfs),
            "f2fs" => Ok(FsKind::F2fs),
            "reiserfs" => Ok(FsKind::Reiserfs),
            "jfs" => Ok(FsKind::Jfs),
            _ => Err("unrecognized filesystem kind"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resize_requires_mount_matches_spec_table() {
        assert!(FsKind::Btrfs.resize_requires_mount());
        assert!(FsKind::Xfs.resize_requires_mount());
        assert!(!FsKind::Ext4.resize_requires_mount());
        assert!(!FsKind::F2fs.resize_requires_mount());
        assert!(!FsKind::Reiserfs.resize_requires_mount());
        assert!(!FsKind::Jfs.resize_requires_mount());
    }

    #[test]
    fn round_trips_through_str() {
        for kind in FsKind::TARGETS {
            assert_eq!(kind.as_str().parse::<FsKind>().unwrap(), kind);
        }
    }

    #[test]
    fn rejects_unknown_kind() {
        assert!("zfs".parse::<FsKind>().is_err());
    }
}
