//! Conversion Engine / Controller (§4.5): the iterative state machine
//! that drives shrink → grow target → migrate/verify → prune against a
//! `Backend`, persisting a checkpoint to the `JournalStore` after every
//! completed step, and the finalization that runs once the source is
//! empty.

use crate::context::ConversionContext;
use crate::error::EngineError;
use crate::events::{LogLevel, ProgressPanel, PromptResponse, UiSink};
use crate::KILL_SWITCH;
use dconv_backend::Backend;
use dconv_journal::{ConversionState, JournalStore, LastOperation};
use dconv_types::{FsKind, Partition};
use std::sync::atomic::Ordering;

/// §5: "the journal must reflect the last fully completed step — never a
/// step that is in progress." Checked at the top of every iteration and
/// again before each finalization step, so a tripped kill switch never
/// interrupts a step that has already started mutating the disk.
fn check_interrupted(state: &ConversionState) -> Result<(), EngineError> {
    if KILL_SWITCH.load(Ordering::SeqCst) {
        let _ = JournalStore::write(state);
        return Err(EngineError::Interrupted);
    }
    Ok(())
}

const ONE_MEBIBYTE_KB: u64 = 1024;
const TEN_MEBIBYTES_KB: u64 = 10 * 1024;

/// Runs (or resumes) a conversion to completion.
///
/// `resume` is `Some` when the caller (the CLI, after prompting the user
/// on startup per §4.4) has loaded an existing journal entry for this
/// device; otherwise a fresh `ConversionState` is built from `ctx`.
pub fn run(
    ctx: &ConversionContext,
    backend: &dyn Backend,
    ui: &dyn UiSink,
    resume: Option<ConversionState>,
) -> Result<(), EngineError> {
    let mut state = resume.unwrap_or_else(|| {
        ConversionState::fresh(
            ctx.device.clone(),
            ctx.target_kind,
            ctx.source_partition.clone(),
            ctx.use_existing_target(),
        )
    });

    if let Some(existing) = &ctx.existing_target {
        state.target_partition.get_or_insert_with(|| existing.clone());
    }

    // Finalization steps live outside the iteration loop; a journal
    // resumed at one of these is routed straight there rather than
    // re-entering the loop (§4.5 Resume semantics).
    if matches!(state.last_operation, LastOperation::DeleteSource | LastOperation::ExpandFinal | LastOperation::Complete) {
        return finalize(&mut state, backend, ui);
    }

    let resumed_at = state.last_operation;
    let mut first_pass = true;
    let mut prior_used_kb: Option<u64> = None;
    let mut no_progress_count = 0u32;

    loop {
        check_interrupted(&state)?;

        state.last_operation = LastOperation::IterationStart;
        JournalStore::write(&state)?;
        ui.status(&format!("inspecting iteration {}", state.iteration), None);

        let used_kb = query_used_kb(backend, &state.source_partition, "source")?;
        let disk_total_kb = query_disk_total_kb(backend, &state)?;

        // A source that is already below threshold still needs a target
        // filesystem carved out before finalization if none exists yet
        // (e.g. the very first check on a practically-empty NTFS volume);
        // only short-circuit here once a target is already in place.
        let empty_threshold = (disk_total_kb / 1000).max(ONE_MEBIBYTE_KB);
        if used_kb < empty_threshold && state.target_partition.is_some() {
            ui.log(LogLevel::Info, "source volume is effectively empty; exiting the migration loop");
            break;
        }

        if state.iteration > 0 {
            if let Some(prior) = prior_used_kb {
                let delta = prior.saturating_sub(used_kb);
                if delta < ONE_MEBIBYTE_KB {
                    no_progress_count += 1;
                    if no_progress_count >= 3 {
                        match ui.prompt("No progress for 3 consecutive iterations. Continue or abort?", &["Continue", "Abort"]) {
                            PromptResponse::Index(0) => no_progress_count = 0,
                            _ => return Err(EngineError::NoProgress),
                        }
                    }
                } else {
                    no_progress_count = 0;
                }
            }
        }
        prior_used_kb = Some(used_kb);

        // 5% safety buffer above live data (§4.5 step 5), floored so a
        // practically-empty source still gets a partition large enough to
        // hold filesystem metadata.
        let target_size_kb = (used_kb + used_kb / 20).max(ONE_MEBIBYTE_KB);

        if !state.use_existing_target {
            backend
                .shrink_ntfs(&state.source_partition, target_size_kb)
                .map_err(|why| EngineError::from_block("shrink_ntfs", why))?;
            state.source_partition = Partition::new(
                state.source_partition.device().clone(),
                state.source_partition.index(),
                state.source_partition.start_kb(),
                state.source_partition.start_kb() + target_size_kb,
            );
            state.last_operation = LastOperation::ShrinkNtfs;
            JournalStore::write(&state)?;

            if state.iteration == 0 {
                let skip_create = first_pass && state.target_partition.is_some();
                if !skip_create {
                    let target_start = state.source_partition.end_kb() + ONE_MEBIBYTE_KB;
                    let target = backend
                        .create_partition(&state.device, target_start, disk_total_kb)
                        .map_err(|why| EngineError::from_block("create_partition", why))?;
                    state.target_partition = Some(target);
                    state.last_operation = LastOperation::CreateTarget;
                    JournalStore::write(&state)?;
                }

                let skip_format = first_pass
                    && matches!(resumed_at, LastOperation::FormatTarget | LastOperation::MigrateFiles);
                if !skip_format {
                    let target = state.target_partition.clone().expect("target partition created above");
                    backend.format(&target, state.target_kind).map_err(|why| EngineError::from_block("format", why))?;
                    state.last_operation = LastOperation::FormatTarget;
                    JournalStore::write(&state)?;
                }
            } else {
                let prior = state.target_partition.clone().expect("target partition exists by iteration > 0");
                let grown = Partition::new(prior.device().clone(), prior.index(), prior.start_kb(), disk_total_kb);
                backend.grow(&grown, state.target_kind).map_err(|why| EngineError::from_block("grow", why))?;
                state.target_partition = Some(grown);
                state.last_operation = LastOperation::ExpandPartitionTable;
                JournalStore::write(&state)?;
            }
        } else {
            let target = state.target_partition.as_ref().expect("use_existing_target requires a target partition");
            if let Ok(target_used) = backend.used_kb(target, state.target_kind) {
                let free = target.size_kb().saturating_sub(target_used);
                if free < target_size_kb {
                    ui.log(
                        LogLevel::Warning,
                        "the pre-existing target partition may not have enough free space for this iteration's migration",
                    );
                }
            }
        }

        first_pass = false;

        check_interrupted(&state)?;

        let target = state.target_partition.clone().expect("target partition must be established before migration");

        state.last_operation = LastOperation::MigrateFiles;
        JournalStore::write(&state)?;

        ui.status("migrating files", None);
        let job = backend.migrate(&state.source_partition, &target)?;
        state.files_migrated_total += job.verified_count() as u64;
        ui.log(
            LogLevel::Success,
            &format!("verified and migrated {} of {} files this iteration", job.verified_count(), job.file_count),
        );

        let remaining_kb = query_used_kb(backend, &state.source_partition, "source")?;
        let migrated_kb = used_kb as i64 - remaining_kb as i64;
        ui.log(LogLevel::Info, &format!("freed roughly {} KiB on the source this iteration", migrated_kb));

        let continue_threshold = (disk_total_kb / 100).max(TEN_MEBIBYTES_KB);

        // §6 `progress_panel`: a snapshot for the UI, emitted once per
        // iteration after migration settles. `estimated_iterations` is a
        // rough projection from this iteration's throughput (remaining /
        // migrated-this-iteration), not a guarantee.
        let percent = if job.file_count == 0 {
            100
        } else {
            ((job.verified_count() as u64 * 100) / job.file_count as u64) as u8
        };
        let estimated_iterations = if remaining_kb <= continue_threshold {
            state.iteration + 1
        } else if migrated_kb > 0 {
            state.iteration + 1 + (remaining_kb as i64 / migrated_kb).max(1) as u32
        } else {
            state.iteration + 2
        };
        ui.progress_panel(&ProgressPanel {
            source: state.source_partition.node_path(),
            target: target.node_path(),
            iteration: state.iteration,
            estimated_iterations,
            percent,
            files_migrated: state.files_migrated_total,
            current_op: state.last_operation.to_string(),
        });

        if remaining_kb > continue_threshold {
            state.iteration += 1;
        } else {
            break;
        }
    }

    finalize(&mut state, backend, ui)
}

/// Finalization (§4.5): remove the now-empty source partition, then grow
/// the target to consume the disk tail.
fn finalize(state: &mut ConversionState, backend: &dyn Backend, ui: &dyn UiSink) -> Result<(), EngineError> {
    if state.last_operation != LastOperation::ExpandFinal {
        check_interrupted(state)?;
        state.last_operation = LastOperation::DeleteSource;
        JournalStore::write(state)?;
        backend.delete_partition(&state.source_partition).map_err(|why| EngineError::from_block("delete_partition", why))?;
    }

    check_interrupted(state)?;

    let disk_total_kb = query_disk_total_kb(backend, state)?;
    let target = state.target_partition.clone().expect("target partition must exist by finalization");
    let grown = Partition::new(target.device().clone(), target.index(), target.start_kb(), disk_total_kb);

    state.last_operation = LastOperation::ExpandFinal;
    state.target_partition = Some(grown.clone());
    JournalStore::write(state)?;
    backend.grow(&grown, state.target_kind).map_err(|why| EngineError::from_block("grow", why))?;

    state.last_operation = LastOperation::Complete;
    JournalStore::write(state)?;
    JournalStore::remove(&state.device)?;

    ui.log(LogLevel::Success, "conversion complete");
    Ok(())
}

fn query_used_kb(backend: &dyn Backend, partition: &Partition, what: &str) -> Result<u64, EngineError> {
    backend
        .used_kb(partition, FsKind::Ntfs)
        .map_err(|why| EngineError::PreflightFailed { reason: format!("unable to probe {} usage: {}", what, why) })
}

fn query_disk_total_kb(backend: &dyn Backend, state: &ConversionState) -> Result<u64, EngineError> {
    backend
        .disk_total_kb(&state.device)
        .map_err(|why| EngineError::PreflightFailed { reason: format!("unable to probe disk size: {}", why) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingSink;
    use dconv_backend::DummyBackend;
    use dconv_types::Device;
    use std::sync::Mutex;

    /// `KILL_SWITCH` is a process-wide static; cargo runs this module's
    /// tests on separate threads by default, so every test that drives
    /// `run` takes this lock first to keep the kill-switch test below
    /// from racing the ones that assume it stays clear.
    static KILL_SWITCH_TEST_LOCK: Mutex<()> = Mutex::new(());

    fn ctx(used_kb_sequence: Vec<u64>, disk_total_kb: u64) -> (ConversionContext, DummyBackend) {
        let device = Device::new("/dev/sda");
        let source = Partition::new(device.clone(), 1, 0, 10 * 1024 * 1024);
        let backend = DummyBackend::new();
        backend.script_used_kb(used_kb_sequence);
        backend.script_disk_total_kb(disk_total_kb);
        (ConversionContext::new(device, FsKind::Ext4, source), backend)
    }

    #[test]
    fn empty_source_still_gets_a_target_before_finalizing() {
        let _guard = KILL_SWITCH_TEST_LOCK.lock().unwrap();
        // Already below the empty threshold on the very first check, but
        // no target partition exists yet, so one pass still runs to carve
        // out the destination filesystem before the source is dropped.
        let (context, backend) = ctx(vec![0], 10 * 1024 * 1024);
        let ui = RecordingSink::new();
        run(&context, &backend, &ui, None).unwrap();

        let calls = backend.calls();
        assert!(calls.iter().any(|c| matches!(c, dconv_backend::DummyCall::CreatePartition { .. })));
        assert!(calls.iter().any(|c| matches!(c, dconv_backend::DummyCall::DeletePartition { .. })));
    }

    #[test]
    fn pre_existing_target_skips_shrink_and_exits_immediately_when_already_empty() {
        let _guard = KILL_SWITCH_TEST_LOCK.lock().unwrap();
        let device = Device::new("/dev/sda");
        let source = Partition::new(device.clone(), 1, 0, 10 * 1024 * 1024);
        let target = Partition::new(device.clone(), 2, 10 * 1024 * 1024 + 1024, 20 * 1024 * 1024);
        let backend = DummyBackend::new();
        backend.script_used_kb([0]);
        backend.script_disk_total_kb(20 * 1024 * 1024);
        let context = ConversionContext::new(device, FsKind::Ext4, source).with_existing_target(target);

        let ui = RecordingSink::new();
        run(&context, &backend, &ui, None).unwrap();

        let calls = backend.calls();
        assert!(!calls.iter().any(|c| matches!(c, dconv_backend::DummyCall::ShrinkNtfs { .. })));
        assert!(!calls.iter().any(|c| matches!(c, dconv_backend::DummyCall::CreatePartition { .. })));
        assert!(calls.iter().any(|c| matches!(c, dconv_backend::DummyCall::DeletePartition { .. })));
    }

    #[test]
    fn single_iteration_shrinks_creates_and_migrates() {
        let _guard = KILL_SWITCH_TEST_LOCK.lock().unwrap();
        let (context, backend) = ctx(vec![2 * 1024 * 1024, 0], 10 * 1024 * 1024);
        let ui = RecordingSink::new();
        run(&context, &backend, &ui, None).unwrap();

        let calls = backend.calls();
        assert!(calls.iter().any(|c| matches!(c, dconv_backend::DummyCall::ShrinkNtfs { .. })));
        assert!(calls.iter().any(|c| matches!(c, dconv_backend::DummyCall::CreatePartition { .. })));
        assert!(calls.iter().any(|c| matches!(c, dconv_backend::DummyCall::Format { .. })));
        assert!(calls.iter().any(|c| matches!(c, dconv_backend::DummyCall::DeletePartition { .. })));
    }

    #[test]
    fn single_iteration_emits_a_progress_panel() {
        let _guard = KILL_SWITCH_TEST_LOCK.lock().unwrap();
        let (context, backend) = ctx(vec![2 * 1024 * 1024, 0], 10 * 1024 * 1024);
        let ui = RecordingSink::new();
        run(&context, &backend, &ui, None).unwrap();

        let panels = ui.panels.lock().unwrap();
        assert_eq!(panels.len(), 1);
        assert_eq!(panels[0].iteration, 0);
        assert_eq!(panels[0].percent, 100);
    }

    #[test]
    fn no_progress_three_times_surfaces_a_prompt_and_aborts_on_request() {
        let _guard = KILL_SWITCH_TEST_LOCK.lock().unwrap();
        // used_kb never drops: iteration 0 reads 5 MiB, then every
        // subsequent re-probe (within an iteration and across
        // iterations) also reads 5 MiB, so no real progress is ever
        // observed.
        let sequence = vec![5 * 1024 * 1024; 16];
        let (context, backend) = ctx(sequence, 10 * 1024 * 1024);
        let ui = RecordingSink::new();
        ui.script_prompt(PromptResponse::Cancelled);

        let result = run(&context, &backend, &ui, None);
        assert!(matches!(result, Err(EngineError::NoProgress)));
    }

    #[test]
    fn dry_run_backend_never_mutates_and_still_completes() {
        let _guard = KILL_SWITCH_TEST_LOCK.lock().unwrap();
        let (context, backend) = ctx(vec![2 * 1024 * 1024, 0], 10 * 1024 * 1024);
        let dry_run = dconv_backend::DryRunBackend::new(&backend);
        let ui = RecordingSink::new();
        run(&context, &dry_run, &ui, None).unwrap();
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn tripped_kill_switch_journals_and_returns_interrupted() {
        let _guard = KILL_SWITCH_TEST_LOCK.lock().unwrap();
        let (context, backend) = ctx(vec![2 * 1024 * 1024, 0], 10 * 1024 * 1024);
        let ui = RecordingSink::new();

        KILL_SWITCH.store(true, Ordering::SeqCst);
        let result = run(&context, &backend, &ui, None);
        KILL_SWITCH.store(false, Ordering::SeqCst);

        assert!(matches!(result, Err(EngineError::Interrupted)));
        // Nothing was mutated: the switch was already tripped before the
        // very first step of the very first iteration.
        assert!(backend.calls().is_empty());

        let journaled = JournalStore::read(&context.device).unwrap().expect("journal entry written on interrupt");
        assert_eq!(journaled.last_operation, LastOperation::IterationStart);
        let _ = JournalStore::remove(&context.device);
    }
}
