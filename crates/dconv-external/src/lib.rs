//! The one process-spawning seam the conversion engine calls through.
//!
//! Every external tool invocation — `ntfsresize`, `mkfs.*`, `rsync`,
//! `lsblk`, `partprobe`, and so on — goes through an `Executor`. Production
//! code is wired to `SystemExecutor`; `--dummy-mode` and tests are wired to
//! `DummyExecutor`. Nothing upstream branches on which one it has.

#[macro_use]
extern crate log;
extern crate rand;

mod retry;

pub use self::retry::Retry;

use rand::Rng;
use std::ffi::OsString;
use std::io::{self, Write};
use std::process::{Command, Stdio};
use std::sync::Mutex;

/// Abstracts "run this external command" so the rest of the engine never
/// calls `std::process::Command` directly.
pub trait Executor: Send + Sync {
    /// Runs `cmd` with `args`, succeeding only if the process exits with
    /// status 0 or a code in `valid_codes`.
    fn run(&self, cmd: &str, args: &[OsString], valid_codes: &[i32]) -> io::Result<()>;

    /// Runs `cmd` with `args`, writing `input` to its stdin.
    fn run_with_stdin(&self, cmd: &str, args: &[OsString], input: &[u8]) -> io::Result<()>;

    /// Runs `cmd` with `args` and returns its captured stdout as text.
    fn capture(&self, cmd: &str, args: &[OsString]) -> io::Result<String>;
}

/// The real implementation: shells out via `std::process::Command`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemExecutor;

impl Executor for SystemExecutor {
    fn run(&self, cmd: &str, args: &[OsString], valid_codes: &[i32]) -> io::Result<()> {
        info!("executing {} with {:?}", cmd, args);

        let status = Command::new(cmd).args(args).stdin(Stdio::null()).stdout(Stdio::null()).status()?;

        let success = status.success()
            || status.code().map_or(false, |code| valid_codes.contains(&code));

        if success {
            Ok(())
        } else {
            Err(exit_error(cmd, status.code()))
        }
    }

    fn run_with_stdin(&self, cmd: &str, args: &[OsString], input: &[u8]) -> io::Result<()> {
        info!("executing {} with {:?}", cmd, args);

        let mut child =
            Command::new(cmd).args(args).stdin(Stdio::piped()).stdout(Stdio::null()).spawn()?;

        child.stdin.as_mut().expect("stdin not obtained").write_all(input)?;

        let status = child.wait()?;
        if status.success() {
            Ok(())
        } else {
            Err(exit_error(cmd, status.code()))
        }
    }

    fn capture(&self, cmd: &str, args: &[OsString]) -> io::Result<String> {
        info!("capturing output of {} with {:?}", cmd, args);

        let output = Command::new(cmd).args(args).stdin(Stdio::null()).output()?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(exit_error(cmd, output.status.code()))
        }
    }
}

fn exit_error(cmd: &str, code: Option<i32>) -> io::Error {
    io::Error::new(
        io::ErrorKind::Other,
        format!(
            "{} failed with status: {}",
            cmd,
            match code {
                Some(code) => format!("{}", code),
                None => "unknown".into(),
            }
        ),
    )
}

/// A single recorded invocation, for tests that want to assert on what the
/// engine would have run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub cmd: String,
    pub args: Vec<OsString>,
}

/// A no-op backend used by `--dummy-mode` and by unit/integration tests.
/// Records every call it receives and returns configured canned output for
/// `capture`, keyed by command name; everything else succeeds
/// unconditionally.
#[derive(Default)]
pub struct DummyExecutor {
    log: Mutex<Vec<Invocation>>,
    captures: Mutex<std::collections::HashMap<String, String>>,
}

impl DummyExecutor {
    pub fn new() -> DummyExecutor { DummyExecutor::default() }

    /// Registers canned stdout for future `capture` calls to `cmd`.
    pub fn stub_capture(&self, cmd: &str, output: &str) {
        self.captures.lock().unwrap().insert(cmd.to_owned(), output.to_owned());
    }

    pub fn invocations(&self) -> Vec<Invocation> { self.log.lock().unwrap().clone() }

    fn record(&self, cmd: &str, args: &[OsString]) {
        self.log.lock().unwrap().push(Invocation { cmd: cmd.to_owned(), args: args.to_vec() });
    }
}

impl Executor for DummyExecutor {
    fn run(&self, cmd: &str, args: &[OsString], _valid_codes: &[i32]) -> io::Result<()> {
        self.record(cmd, args);
        Ok(())
    }

    fn run_with_stdin(&self, cmd: &str, args: &[OsString], _input: &[u8]) -> io::Result<()> {
        self.record(cmd, args);
        Ok(())
    }

    fn capture(&self, cmd: &str, args: &[OsString]) -> io::Result<String> {
        self.record(cmd, args);
        Ok(self.captures.lock().unwrap().get(cmd).cloned().unwrap_or_default())
    }
}

/// Generates a short random identifier for ephemeral mount points and
/// manifest files (§5 Shared resources: "a unique, per-run temp mount
/// point and manifest path so concurrent runs against different devices
/// do not collide").
pub fn instance_id() -> String {
    const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..8).map(|_| CHARSET[rng.gen_range(0, CHARSET.len())] as char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dummy_executor_records_invocations() {
        let exec = DummyExecutor::new();
        exec.run("ntfsresize", &["-f".into(), "-s".into(), "1024M".into()], &[]).unwrap();
        let invocations = exec.invocations();
        assert_eq!(invocations.len(), 1);
        assert_eq!(invocations[0].cmd, "ntfsresize");
    }

    #[test]
    fn dummy_executor_returns_stubbed_capture() {
        let exec = DummyExecutor::new();
        exec.stub_capture("lsblk", "sda 500107862016\n");
        let out = exec.capture("lsblk", &[]).unwrap();
        assert_eq!(out, "sda 500107862016\n");
    }

    #[test]
    fn instance_ids_are_distinct() {
        let a = instance_id();
        let b = instance_id();
        assert_eq!(a.len(), 8);
        assert_ne!(a, b);
    }
}
