//! UI collaborator interface (§6): the engine emits structured events; the
//! UI is a passive consumer that never reaches into engine state (§1).

use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Snapshot of the controller's progress, emitted at the points the UI
/// would want to redraw a progress panel (§6 `progress_panel`).
#[derive(Debug, Clone)]
pub struct ProgressPanel {
    pub source: PathBuf,
    pub target: PathBuf,
    pub iteration: u32,
    pub estimated_iterations: u32,
    pub percent: u8,
    pub files_migrated: u64,
    pub current_op: String,
}

/// A cancel-or-continue style prompt (§6 `prompt`). The index of the
/// chosen option is returned, or `Cancelled` if the collaborator declines
/// to answer (closing the dialog, EOF on stdin, etc).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptResponse {
    Index(usize),
    Cancelled,
}

/// The collaborator the engine drives; never read from directly (§9
/// Design Notes: "the engine calls the UI collaborator's `prompt`; it
/// does not read stdin directly... allows property tests to drive prompt
/// answers as data.").
pub trait UiSink {
    fn log(&self, level: LogLevel, text: &str);
    fn status(&self, text: &str, percent: Option<u8>);
    fn progress_panel(&self, panel: &ProgressPanel);
    fn prompt(&self, title: &str, options: &[&str]) -> PromptResponse;
}

/// A `UiSink` that records every event and answers every prompt from a
/// scripted queue — what engine property tests (§8) drive instead of a
/// terminal.
#[derive(Default)]
pub struct RecordingSink {
    pub logs: std::sync::Mutex<Vec<(LogLevel, String)>>,
    pub statuses: std::sync::Mutex<Vec<(String, Option<u8>)>>,
    pub panels: std::sync::Mutex<Vec<ProgressPanel>>,
    pub prompt_script: std::sync::Mutex<std::collections::VecDeque<PromptResponse>>,
}

impl RecordingSink {
    pub fn new() -> RecordingSink { RecordingSink::default() }

    pub fn script_prompt(&self, response: PromptResponse) {
        self.prompt_script.lock().unwrap().push_back(response);
    }
}

impl UiSink for RecordingSink {
    fn log(&self, level: LogLevel, text: &str) {
        self.logs.lock().unwrap().push((level, text.to_owned()));
    }

    fn status(&self, text: &str, percent: Option<u8>) {
        self.statuses.lock().unwrap().push((text.to_owned(), percent));
    }

    fn progress_panel(&self, panel: &ProgressPanel) {
        self.panels.lock().unwrap().push(panel.clone());
    }

    fn prompt(&self, _title: &str, _options: &[&str]) -> PromptResponse {
        self.prompt_script.lock().unwrap().pop_front().unwrap_or(PromptResponse::Cancelled)
    }
}
