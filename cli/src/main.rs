extern crate clap;
extern crate dconv;
extern crate failure;
#[macro_use]
extern crate failure_derive;
extern crate libc;
extern crate pbr;

mod disks;
mod errors;
mod ui;

use clap::{App, Arg};
use dconv::{
    ConversionContext, Device, DryRunBackend, DummyBackend, FsKind, JournalStore, PromptResponse, SystemBackend,
    UiSink,
};
use errors::CliError;
use std::process::exit;
use ui::TerminalUi;

fn main() {
    let matches = App::new("dconv")
        .about("Converts an in-place NTFS volume into a target Linux filesystem")
        .arg(
            Arg::with_name("device")
                .long("device")
                .help("the block device to convert, e.g. /dev/sda")
                .takes_value(true)
                .required(true),
        )
        .arg(
            Arg::with_name("target-fs")
                .long("target-fs")
                .help("the filesystem to convert the NTFS volume into")
                .takes_value(true)
                .possible_values(&["ext4", "btrfs", "xfs", "f2fs", "reiserfs", "jfs"])
                .required(true),
        )
        .arg(
            Arg::with_name("use-existing")
                .long("use-existing")
                .help("reuse the partition at this index as the target instead of carving a new one")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("dry-run")
                .long("dry-run")
                .conflicts_with("dummy-mode")
                .help("probe and log every step without mutating the disk"),
        )
        .arg(
            Arg::with_name("dummy-mode")
                .long("dummy-mode")
                .conflicts_with("dry-run")
                .help("run against a simulated device, touching nothing real (for smoke-testing)"),
        )
        .get_matches();

    if let Err(why) = dconv::init_logging(|_level, _message| {}) {
        eprintln!("failed to initialize logging: {}", why);
    }

    let dummy_mode = matches.is_present("dummy-mode");
    let dry_run = matches.is_present("dry-run");

    if !dummy_mode && unsafe { libc::geteuid() } != 0 {
        eprintln!("dconv: {}", CliError::NotRoot);
        exit(1);
    }

    configure_signal_handling();

    let device = Device::new(matches.value_of("device").unwrap());

    let target_kind = match matches.value_of("target-fs").unwrap().parse::<FsKind>() {
        Ok(kind) => kind,
        Err(_) => {
            eprintln!("dconv: {}", CliError::InvalidFsKind { kind: matches.value_of("target-fs").unwrap().into() });
            exit(1);
        }
    };

    let use_existing_index = match matches.value_of("use-existing").map(str::parse::<u32>) {
        Some(Ok(index)) => Some(index),
        Some(Err(_)) => {
            eprintln!("dconv: --use-existing requires a partition number");
            exit(1);
        }
        None => None,
    };

    match run(&device, target_kind, use_existing_index, dry_run, dummy_mode) {
        Ok(()) => exit(0),
        Err(why) => {
            eprintln!("dconv: {}", why);
            exit(1);
        }
    }
}

fn run(
    device: &Device,
    target_kind: FsKind,
    use_existing_index: Option<u32>,
    dry_run: bool,
    dummy_mode: bool,
) -> Result<(), CliError> {
    let ui = TerminalUi::new();

    // §4.4: on startup, enumerate every journal file present (not only one
    // for the requested device) and offer to resume whichever is found
    // before starting fresh. A journal matching the requested device is
    // preferred; otherwise the first journal found is offered, since it is
    // the only unfinished conversion on record.
    let journals = JournalStore::enumerate()?;
    let found = journals.iter().find(|state| &state.device == device).or_else(|| journals.first());
    let resume = match found {
        Some(state) => match prompt_resume(&ui, &state.device) {
            PromptResponse::Index(0) => Some(state.clone()),
            _ => {
                JournalStore::remove(&state.device)?;
                None
            }
        },
        None => None,
    };

    let (context, resume_state) = match resume {
        Some(state) => {
            let context = ConversionContext::new(device.clone(), state.target_kind, state.source_partition.clone());
            let context = match &state.target_partition {
                Some(target) if state.use_existing_target => context.with_existing_target(target.clone()),
                _ => context,
            };
            (context, Some(state))
        }
        None => {
            let source = find_source_partition(device, dummy_mode)?;
            let mut context = ConversionContext::new(device.clone(), target_kind, source);

            if let Some(index) = use_existing_index {
                let target = find_existing_target(device, index, dummy_mode)?;
                context = context.with_existing_target(target);
            }

            (context, None)
        }
    };

    // `--dry-run` and `--dummy-mode` are mutually exclusive (enforced at
    // parse time above), so a dummy backend is never also wrapped in
    // `DryRunBackend`.
    if dummy_mode {
        let backend = build_dummy_backend(&context);
        dconv::run_conversion(&context, &backend, &ui, resume_state).map_err(Into::into)
    } else if dry_run {
        let backend = SystemBackend::new(dconv::external::SystemExecutor);
        dconv::run_conversion(&context, &DryRunBackend::new(backend), &ui, resume_state).map_err(Into::into)
    } else {
        let backend = SystemBackend::new(dconv::external::SystemExecutor);
        dconv::run_conversion(&context, &backend, &ui, resume_state).map_err(Into::into)
    }
}

fn prompt_resume(ui: &TerminalUi, device: &Device) -> PromptResponse {
    ui.prompt(
        &format!("a previous conversion of {} did not finish. Resume it?", device),
        &["Resume", "Start over"],
    )
}

fn find_source_partition(device: &Device, dummy_mode: bool) -> Result<dconv::Partition, CliError> {
    if dummy_mode {
        return Ok(dconv::Partition::new(device.clone(), 1, 0, 10 * 1024 * 1024));
    }

    disks::find_ntfs_partition(device)
        .map_err(|why| CliError::DeviceProbeFailed { device: device.to_string(), why })?
        .ok_or_else(|| CliError::NoNtfsPartition { device: device.to_string() })
}

fn find_existing_target(device: &Device, index: u32, dummy_mode: bool) -> Result<dconv::Partition, CliError> {
    if dummy_mode {
        return Ok(dconv::Partition::new(device.clone(), index, 10 * 1024 * 1024 + 1024, 20 * 1024 * 1024));
    }

    disks::find_partition_by_index(device, index)
        .map_err(|why| CliError::DeviceProbeFailed { device: device.to_string(), why })?
        .ok_or_else(|| CliError::PartitionNotFound { device: device.to_string(), index })
}

/// §5 Cancellation & signals: on `SIGINT`/`SIGTERM`, trip the engine's
/// kill switch rather than exiting the process outright, so the
/// controller can finish its in-flight journal write and exit cleanly at
/// the next checkpoint instead of leaving a partially-applied step.
///
/// Grounded on distinst's own `cli/src/main.rs::configure_signal_handling`
/// (the same `extern "C" fn handler` + `libc::signal` shape), generalized
/// to also catch `SIGTERM` and to trip `dconv::engine::KILL_SWITCH`
/// instead of distinst's `KILL_SWITCH`.
fn configure_signal_handling() {
    extern "C" fn handler(signal: i32) {
        match signal {
            libc::SIGINT | libc::SIGTERM => dconv::engine::KILL_SWITCH.store(true, std::sync::atomic::Ordering::SeqCst),
            _ => unreachable!(),
        }
    }

    for signal in [libc::SIGINT, libc::SIGTERM] {
        if unsafe { libc::signal(signal, handler as libc::sighandler_t) } == libc::SIG_ERR {
            eprintln!("dconv: signal handling error: {}", std::io::Error::last_os_error());
            exit(1);
        }
    }
}

fn build_dummy_backend(context: &ConversionContext) -> DummyBackend {
    let backend = DummyBackend::new();
    let source_size_kb = context.source_partition.size_kb();
    backend.script_disk_total_kb(source_size_kb * 2);
    backend.script_used_kb([source_size_kb / 2, source_size_kb / 8, 0]);
    backend
}
