use crate::error::JournalError;
use crate::state::{ConversionState, LastOperation};
use dconv_types::{Device, FsKind, Partition};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Resolves the per-device journal directory: a hidden subdirectory of
/// the user's home, the way distinst's `logging.rs` resolves its own
/// home-relative paths via `dirs::home_dir()`.
fn journal_dir() -> Result<PathBuf, JournalError> {
    dirs::home_dir().map(|home| home.join(".dconv")).ok_or(JournalError::NoHomeDirectory)
}

fn journal_path_for(base_name: &str) -> Result<PathBuf, JournalError> {
    Ok(journal_dir()?.join(format!("{}.journal", base_name)))
}

/// Reads/writes/enumerates the per-device `KEY=value` journal files under
/// `~/.dconv` (§4.4, §6 Persisted state layout).
pub struct JournalStore;

impl JournalStore {
    /// The well-known path for `device`'s journal, whether or not it
    /// currently exists.
    pub fn path_for(device: &Device) -> Result<PathBuf, JournalError> { journal_path_for(device.base_name()) }

    /// Persists `state` as a whole-file overwrite. Callers are required by
    /// §4.4 to call this only after the operation named by
    /// `state.last_operation` has observably completed.
    pub fn write(state: &ConversionState) -> Result<(), JournalError> {
        let dir = journal_dir()?;
        fs::create_dir_all(&dir).map_err(|why| JournalError::Io { why })?;

        let path = journal_path_for(state.device.base_name())?;
        let contents = serialize(state);
        fs::write(&path, contents).map_err(|why| JournalError::Io { why })
    }

    /// Reads the journal for `device`, if one exists.
    pub fn read(device: &Device) -> Result<Option<ConversionState>, JournalError> {
        let path = journal_path_for(device.base_name())?;
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path).map_err(|why| JournalError::Io { why })?;
        deserialize(&contents).map(Some)
    }

    /// Removes the journal entry once finalization reaches `complete`
    /// (§4.5 Finalization step 3).
    pub fn remove(device: &Device) -> Result<(), JournalError> {
        let path = journal_path_for(device.base_name())?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(why) if why.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(why) => Err(JournalError::Io { why }),
        }
    }

    /// Enumerates every journal file present, for the startup resume
    /// prompt (§4.4: "On startup the engine enumerates journal files; if
    /// any exist, the engine offers resume.").
    pub fn enumerate() -> Result<Vec<ConversionState>, JournalError> {
        let dir = journal_dir()?;
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut states = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|why| JournalError::Io { why })? {
            let entry = entry.map_err(|why| JournalError::Io { why })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("journal") {
                continue;
            }
            let contents = fs::read_to_string(&path).map_err(|why| JournalError::Io { why })?;
            states.push(deserialize(&contents)?);
        }
        Ok(states)
    }
}

fn serialize(state: &ConversionState) -> String {
    let mut out = String::new();
    out.push_str(&format!("DEVICE={}\n", state.device.path().display()));
    out.push_str(&format!("TARGET_KIND={}\n", state.target_kind));
    out.push_str(&format!("SOURCE_PARTITION_INDEX={}\n", state.source_partition.index()));
    out.push_str(&format!("SOURCE_PARTITION_START_KB={}\n", state.source_partition.start_kb()));
    out.push_str(&format!("SOURCE_PARTITION_END_KB={}\n", state.source_partition.end_kb()));

    match &state.target_partition {
        Some(target) => {
            out.push_str(&format!("TARGET_PARTITION_INDEX={}\n", target.index()));
            out.push_str(&format!("TARGET_PARTITION_START_KB={}\n", target.start_kb()));
            out.push_str(&format!("TARGET_PARTITION_END_KB={}\n", target.end_kb()));
        }
        None => {
            out.push_str("TARGET_PARTITION_INDEX=\n");
            out.push_str("TARGET_PARTITION_START_KB=\n");
            out.push_str("TARGET_PARTITION_END_KB=\n");
        }
    }

    out.push_str(&format!("USE_EXISTING_TARGET={}\n", state.use_existing_target));
    out.push_str(&format!("ITERATION={}\n", state.iteration));
    out.push_str(&format!("LAST_OPERATION={}\n", state.last_operation));
    out.push_str(&format!("FILES_MIGRATED_TOTAL={}\n", state.files_migrated_total));
    out
}

fn deserialize(contents: &str) -> Result<ConversionState, JournalError> {
    let mut fields = std::collections::HashMap::new();
    for line in contents.lines() {
        if let Some(eq) = line.find('=') {
            fields.insert(&line[..eq], &line[eq + 1..]);
        }
    }

    let get = |key: &str| -> Result<String, JournalError> {
        fields.get(key).map(|v| v.to_string()).ok_or_else(|| JournalError::MalformedField { field: key.to_owned() })
    };
    let get_u64 = |key: &str| -> Result<u64, JournalError> {
        get(key)?.parse().map_err(|_| JournalError::MalformedField { field: key.to_owned() })
    };

    let device = Device::new(get("DEVICE")?);
    let target_kind = FsKind::from_str(&get("TARGET_KIND")?)
        .map_err(|_| JournalError::MalformedField { field: "TARGET_KIND".to_owned() })?;

    let source_partition = Partition::new(
        device.clone(),
        get("SOURCE_PARTITION_INDEX")?
            .parse()
            .map_err(|_| JournalError::MalformedField { field: "SOURCE_PARTITION_INDEX".to_owned() })?,
        get_u64("SOURCE_PARTITION_START_KB")?,
        get_u64("SOURCE_PARTITION_END_KB")?,
    );

    let target_index = fields.get("TARGET_PARTITION_INDEX").copied().unwrap_or("");
    let target_partition = if target_index.trim().is_empty() {
        None
    } else {
        Some(Partition::new(
            device.clone(),
            target_index.parse().map_err(|_| JournalError::MalformedField { field: "TARGET_PARTITION_INDEX".to_owned() })?,
            get_u64("TARGET_PARTITION_START_KB")?,
            get_u64("TARGET_PARTITION_END_KB")?,
        ))
    };

    let use_existing_target = get("USE_EXISTING_TARGET")?
        .parse()
        .map_err(|_| JournalError::MalformedField { field: "USE_EXISTING_TARGET".to_owned() })?;
    let iteration = get("ITERATION")?.parse().map_err(|_| JournalError::MalformedField { field: "ITERATION".to_owned() })?;
    let last_operation = LastOperation::from_str(&get("LAST_OPERATION")?)
        .map_err(|_| JournalError::MalformedField { field: "LAST_OPERATION".to_owned() })?;
    let files_migrated_total = get_u64("FILES_MIGRATED_TOTAL")?;

    Ok(ConversionState {
        device,
        target_kind,
        source_partition,
        target_partition,
        use_existing_target,
        iteration,
        last_operation,
        files_migrated_total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ConversionState {
        ConversionState {
            device: Device::new("/dev/sda"),
            target_kind: FsKind::Ext4,
            source_partition: Partition::new(Device::new("/dev/sda"), 1, 0, 2_000_000),
            target_partition: Some(Partition::new(Device::new("/dev/sda"), 2, 2_000_000, 10_000_000)),
            use_existing_target: false,
            iteration: 1,
            last_operation: LastOperation::MigrateFiles,
            files_migrated_total: 42,
        }
    }

    #[test]
    fn round_trips_through_serialization() {
        let state = sample();
        let text = serialize(&state);
        let parsed = deserialize(&text).unwrap();
        assert_eq!(parsed, state);
    }

    #[test]
    fn round_trips_with_no_target_partition_yet() {
        let mut state = sample();
        state.target_partition = None;
        state.last_operation = LastOperation::IterationStart;
        let text = serialize(&state);
        let parsed = deserialize(&text).unwrap();
        assert_eq!(parsed, state);
    }

    #[test]
    fn rejects_malformed_contents() {
        assert!(deserialize("DEVICE=/dev/sda\n").is_err());
    }
}
