use crate::error::BlockError;
use dconv_external::Retry;
use std::path::{Path, PathBuf};
use sys_mount::{unmount, Mount, MountFlags, UnmountFlags};
use tempdir::TempDir;

/// A scoped mount: the mount point is released exactly once, either via an
/// explicit call to `unmount` or, if the caller drops this value without
/// calling it, on drop of the backing `TempDir` — which only removes the
/// (by then unmounted) directory, never the mount itself, so callers on
/// every exit path are expected to call `unmount` before dropping.
///
/// Grounded on `crates/disks/src/external.rs`'s "bind a temp dir, do the
/// risky thing, always unmount" shape.
pub struct MountHandle {
    _mount: Mount,
    tmp: TempDir,
    target: PathBuf,
}

impl MountHandle {
    pub fn path(&self) -> &Path { &self.target }

    /// Unmounts, retrying on transient failure per §4.1: "on transient
    /// failure it must retry up to 3 times with a delay before reporting
    /// failure." Verifies the mount point is actually released afterward.
    pub fn release(self) -> Result<(), BlockError> {
        let target = self.target.clone();
        Retry::default()
            .attempts(3)
            .interval(1000)
            .retry_until_ok(|| unmount(&target, UnmountFlags::empty()))
            .map_err(|why| BlockError::UnmountStuck { target: target.clone(), attempts: 3, why })?;

        drop(self.tmp);
        Ok(())
    }
}

pub fn mount_readonly(partition: &Path) -> Result<MountHandle, BlockError> {
    mount(partition, MountFlags::RDONLY)
}

pub fn mount_rw(partition: &Path) -> Result<MountHandle, BlockError> {
    mount(partition, MountFlags::empty())
}

fn mount(partition: &Path, flags: MountFlags) -> Result<MountHandle, BlockError> {
    let tmp = TempDir::new("dconv").map_err(|why| BlockError::MountFailed {
        partition: partition.to_owned(),
        target: PathBuf::from("<tmp>"),
        why,
    })?;

    let target = tmp.path().to_owned();

    let mount = Mount::builder()
        .flags(flags)
        .mount(partition, &target)
        .map_err(|why| BlockError::MountFailed { partition: partition.to_owned(), target: target.clone(), why })?;

    Ok(MountHandle { _mount: mount, tmp, target })
}
