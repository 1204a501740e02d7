//! Verified Migrator (§4.3): mount source/target, recursive copy, a
//! durability barrier, a per-file size/hash acceptance gate, and pruning
//! of exactly the verified prefix from the source.

use crate::error::MigrateError;
use crate::mount::{mount_rw, MountHandle};
use dconv_external::Executor;
use dconv_types::{Device, Partition};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// `rsync`'s "some files vanished" exit code — a restartable partial
/// transfer, not a hard failure (§4.3 step 3).
const RSYNC_PARTIAL_TRANSFER: i32 = 24;

const HASH_THRESHOLD_BYTES: u64 = 100 * 1024;
const SETTLE_POLL_INTERVAL: Duration = Duration::from_secs(1);
const SETTLE_CAP: Duration = Duration::from_secs(30);
const SETTLE_QUIET_THRESHOLD: u64 = 10;

/// Outcome of verifying a single source-relative path against the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    Verified,
    Missing,
    Failed,
}

/// The result of one `migrate` step: per-file outcomes and the subset
/// that is eligible for source deletion.
#[derive(Debug, Default)]
pub struct MigrationJob {
    pub source_mount: PathBuf,
    pub target_mount: PathBuf,
    pub file_count: usize,
    pub verified_manifest: Vec<PathBuf>,
    pub missing_count: usize,
    pub failed_count: usize,
}

impl MigrationJob {
    pub fn verified_count(&self) -> usize { self.verified_manifest.len() }
}

/// Runs the full migrate/verify/prune pipeline of §4.3 against the
/// unmounted `source` (NTFS) and unmounted `target` partitions.
pub fn migrate(exec: &dyn Executor, source: &Partition, target: &Partition) -> Result<MigrationJob, MigrateError> {
    let source_handle = mount_rw(&source.node_path())?;
    let target_handle = match mount_rw(&target.node_path()) {
        Ok(handle) => handle,
        Err(why) => {
            source_handle.release()?;
            return Err(why.into());
        }
    };

    let result = run_migration(exec, source.device(), &source_handle, &target_handle);

    // Always attempt to release both mounts, regardless of how the
    // migration fared, and surface an unmount failure only if the
    // migration itself otherwise succeeded (§4.3 step 8: "Fail if either
    // remains mounted").
    let source_release = source_handle.release();
    let target_release = target_handle.release();

    let job = result?;
    source_release?;
    target_release?;
    Ok(job)
}

fn run_migration(
    exec: &dyn Executor,
    device: &Device,
    source: &MountHandle,
    target: &MountHandle,
) -> Result<MigrationJob, MigrateError> {
    let entries = list_regular_files(source.path())?;
    info!("migrating {} files from {:?} to {:?}", entries.len(), source.path(), target.path());

    copy_tree(exec, source.path(), target.path())?;
    durability_barrier(exec, device, source.path(), target.path());

    let mut job = MigrationJob {
        source_mount: source.path().to_owned(),
        target_mount: target.path().to_owned(),
        file_count: entries.len(),
        ..MigrationJob::default()
    };

    for relative in &entries {
        match verify_one(exec, source.path(), target.path(), relative) {
            VerifyOutcome::Verified => job.verified_manifest.push(relative.clone()),
            VerifyOutcome::Missing => job.missing_count += 1,
            VerifyOutcome::Failed => job.failed_count += 1,
        }
    }

    acceptance_gate(&job)?;
    prune_verified(source.path(), &job.verified_manifest)?;

    let sync_args: Vec<OsString> = Vec::new();
    let _ = exec.run("sync", &sync_args, &[]);

    Ok(job)
}

/// §4.3 step 3: recursive copy preserving mode/owner/times, cross-device
/// safe, not following out-of-tree symlinks, preserving sparse files, and
/// restartable. `rsync -aHAX --sparse` is the canonical tool for all of
/// that in one invocation; its exit code 24 ("vanished source files") is
/// accepted as success rather than treated as a hard failure.
fn copy_tree(exec: &dyn Executor, source: &Path, target: &Path) -> Result<(), MigrateError> {
    let mut src_arg = source.as_os_str().to_owned();
    src_arg.push("/");

    let args: Vec<OsString> =
        vec!["-aHAX".into(), "--sparse".into(), "--info=progress2".into(), src_arg, target.into()];

    exec.run("rsync", &args, &[RSYNC_PARTIAL_TRANSFER]).map_err(|why| MigrateError::CopyFailed { why })
}

/// §4.3 step 4: global sync, per-mount sync, then poll `/proc/diskstats`
/// for the device until completed-I/O activity drops below threshold, or
/// 30s elapse, whichever comes first.
fn durability_barrier(exec: &dyn Executor, device: &Device, source: &Path, target: &Path) {
    let _ = exec.run("sync", &[], &[]);
    let _ = exec.run("sync", &[OsString::from("-f"), source.into()], &[]);
    let _ = exec.run("sync", &[OsString::from("-f"), target.into()], &[]);

    let deadline = Instant::now() + SETTLE_CAP;
    let mut last = read_completed_ios(device);
    loop {
        std::thread::sleep(SETTLE_POLL_INTERVAL);
        let current = read_completed_ios(device);
        let delta = current.saturating_sub(last);
        last = current;
        if delta < SETTLE_QUIET_THRESHOLD || Instant::now() >= deadline {
            return;
        }
    }
}

/// Field 4 (reads completed) + field 8 (writes completed) of
/// `/sys/block/<dev>/stat`, the same counters `iostat` derives its rates
/// from.
fn read_completed_ios(device: &Device) -> u64 {
    let path = format!("/sys/block/{}/stat", device.base_name());
    let contents = match fs::read_to_string(&path) {
        Ok(c) => c,
        Err(_) => return 0,
    };

    let fields: Vec<&str> = contents.split_whitespace().collect();
    let reads = fields.get(0).and_then(|v| v.parse::<u64>().ok()).unwrap_or(0);
    let writes = fields.get(4).and_then(|v| v.parse::<u64>().ok()).unwrap_or(0);
    reads + writes
}

/// §4.3 step 5's per-file comparison.
fn verify_one(exec: &dyn Executor, source: &Path, target: &Path, relative: &Path) -> VerifyOutcome {
    let source_path = source.join(relative);
    let target_path = target.join(relative);

    if !target_path.exists() {
        return VerifyOutcome::Missing;
    }

    let source_len = match fs::metadata(&source_path) {
        Ok(meta) => meta.len(),
        Err(_) => return VerifyOutcome::Missing,
    };
    let target_len = match fs::metadata(&target_path) {
        Ok(meta) => meta.len(),
        Err(_) => return VerifyOutcome::Missing,
    };

    if source_len != target_len {
        return VerifyOutcome::Failed;
    }

    if source_len == 0 {
        return VerifyOutcome::Verified;
    }

    if source_len > HASH_THRESHOLD_BYTES {
        if let Some(tool) = hash_tool(exec) {
            return match (hash_file(exec, tool, &source_path), hash_file(exec, tool, &target_path)) {
                (Ok(a), Ok(b)) if a == b => VerifyOutcome::Verified,
                (Ok(_), Ok(_)) => VerifyOutcome::Failed,
                _ => VerifyOutcome::Verified, // hash-tool failure downgrades to size-only (§4.3 step 5)
            };
        }
    }

    VerifyOutcome::Verified
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HashTool {
    Xxhsum,
    Sha256sum,
    Md5sum,
}

impl HashTool {
    fn command(self) -> &'static str {
        match self {
            HashTool::Xxhsum => "xxhsum",
            HashTool::Sha256sum => "sha256sum",
            HashTool::Md5sum => "md5sum",
        }
    }
}

/// Probes PATH once per call for the fastest available hash tool, in the
/// preference order of §4.3 step 5: xxhash, then SHA-256, then MD5.
///
/// Grounded on the "probe PATH, pick a command table entry" shape of
/// `crates/external/src/block.rs::get_label_cmd`.
fn hash_tool(exec: &dyn Executor) -> Option<HashTool> {
    for tool in [HashTool::Xxhsum, HashTool::Sha256sum, HashTool::Md5sum] {
        let args: Vec<OsString> = vec![tool.command().into()];
        if exec.capture("which", &args).map(|out| !out.trim().is_empty()).unwrap_or(false) {
            return Some(tool);
        }
    }
    None
}

fn hash_file(exec: &dyn Executor, tool: HashTool, path: &Path) -> std::io::Result<String> {
    let args: Vec<OsString> = vec![path.into()];
    let output = exec.capture(tool.command(), &args)?;
    output
        .split_whitespace()
        .next()
        .map(str::to_owned)
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "hash tool produced no output"))
}

/// §4.3 step 6.
fn acceptance_gate(job: &MigrationJob) -> Result<(), MigrateError> {
    let total = job.file_count;
    if total == 0 {
        return Ok(());
    }

    if job.failed_count > 0 {
        return Err(MigrateError::VerificationFailed {
            missing: job.missing_count,
            failed: job.failed_count,
            verified: job.verified_count(),
            total,
        });
    }

    if job.missing_count * 10 > total {
        return Err(MigrateError::VerificationFailed {
            missing: job.missing_count,
            failed: job.failed_count,
            verified: job.verified_count(),
            total,
        });
    }

    if job.verified_count() * 10 < total * 9 {
        return Err(MigrateError::VerificationFailed {
            missing: job.missing_count,
            failed: job.failed_count,
            verified: job.verified_count(),
            total,
        });
    }

    Ok(())
}

/// §4.3 step 7: delete exactly the verified files, then remove any
/// directories left empty by that deletion. Files absent from the
/// manifest are left untouched, to be carried into the next iteration.
fn prune_verified(source: &Path, verified: &[PathBuf]) -> Result<(), MigrateError> {
    for relative in verified {
        let path = source.join(relative);
        if let Err(why) = fs::remove_file(&path) {
            if why.kind() != std::io::ErrorKind::NotFound {
                return Err(MigrateError::PruneFailed { why });
            }
        }
    }

    remove_empty_dirs(source).map_err(|why| MigrateError::PruneFailed { why })
}

fn remove_empty_dirs(root: &Path) -> std::io::Result<()> {
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            remove_empty_dirs(&path)?;
            if fs::read_dir(&path)?.next().is_none() {
                fs::remove_dir(&path)?;
            }
        }
    }
    Ok(())
}

/// Walks `root` and returns every regular file's path relative to it.
/// Symlinks are left alone (copy-tool semantics, not migrator semantics)
/// so an out-of-tree link is never followed.
fn list_regular_files(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    walk(root, root, &mut out)?;
    Ok(out)
}

fn walk(root: &Path, dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            walk(root, &path, out)?;
        } else if file_type.is_file() {
            if let Ok(relative) = path.strip_prefix(root) {
                out.push(relative.to_owned());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job_with(total: usize, missing: usize, failed: usize, verified: usize) -> MigrationJob {
        MigrationJob {
            file_count: total,
            missing_count: missing,
            failed_count: failed,
            verified_manifest: (0..verified).map(|i| PathBuf::from(format!("f{}", i))).collect(),
            ..MigrationJob::default()
        }
    }

    #[test]
    fn gate_passes_when_fully_verified() {
        assert!(acceptance_gate(&job_with(100, 0, 0, 100)).is_ok());
    }

    #[test]
    fn gate_rejects_any_failure() {
        assert!(acceptance_gate(&job_with(100, 0, 1, 99)).is_err());
    }

    #[test]
    fn gate_rejects_missing_over_ten_percent() {
        assert!(acceptance_gate(&job_with(100, 11, 0, 89)).is_err());
    }

    #[test]
    fn gate_rejects_verified_under_ninety_percent() {
        assert!(acceptance_gate(&job_with(100, 0, 0, 89)).is_err());
    }

    #[test]
    fn gate_accepts_exactly_the_boundary() {
        assert!(acceptance_gate(&job_with(100, 10, 0, 90)).is_ok());
    }

    #[test]
    fn walk_finds_nested_regular_files() {
        let root = std::env::temp_dir().join(format!("dconv-migrator-test-{}", std::process::id()));
        let nested = root.join("a/b");
        fs::create_dir_all(&nested).unwrap();
        fs::write(root.join("top.txt"), b"x").unwrap();
        fs::write(nested.join("deep.txt"), b"y").unwrap();

        let mut found = list_regular_files(&root).unwrap();
        found.sort();
        assert_eq!(found, vec![PathBuf::from("a/b/deep.txt"), PathBuf::from("top.txt")]);

        fs::remove_dir_all(&root).unwrap();
    }
}
