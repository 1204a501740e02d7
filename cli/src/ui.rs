//! Terminal `UiSink` (§6): a progress bar driven by `pbr`, log lines on
//! stderr, and a stdin-backed prompt. Grounded on the teacher CLI's own
//! `pbr::ProgressBar` usage in `main.rs`.

use dconv::{LogLevel, ProgressPanel, PromptResponse, UiSink};
use pbr::ProgressBar;
use std::cell::RefCell;
use std::io::{self, Write};

pub(crate) struct TerminalUi {
    bar: RefCell<Option<ProgressBar<io::Stdout>>>,
}

impl TerminalUi {
    pub(crate) fn new() -> TerminalUi { TerminalUi { bar: RefCell::new(None) } }

    fn finish_bar(&self) {
        if let Some(mut bar) = self.bar.borrow_mut().take() {
            bar.finish_println("");
        }
    }
}

impl UiSink for TerminalUi {
    fn log(&self, level: LogLevel, text: &str) {
        self.finish_bar();
        let label = match level {
            LogLevel::Info => "info",
            LogLevel::Success => "ok",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        };
        eprintln!("dconv [{}]: {}", label, text);
    }

    fn status(&self, text: &str, percent: Option<u8>) {
        let mut slot = self.bar.borrow_mut();
        if slot.is_none() {
            let mut bar = ProgressBar::new(100);
            bar.show_speed = false;
            *slot = Some(bar);
        }

        if let Some(bar) = slot.as_mut() {
            bar.message(&format!("{} ", text));
            if let Some(percent) = percent {
                bar.set(percent as u64);
            }
        }
    }

    fn progress_panel(&self, panel: &ProgressPanel) {
        self.status(
            &format!(
                "{} -> {} (iteration {}/{}, {} files migrated)",
                panel.source.display(),
                panel.target.display(),
                panel.iteration + 1,
                panel.estimated_iterations.max(panel.iteration + 1),
                panel.files_migrated
            ),
            Some(panel.percent),
        );
    }

    fn prompt(&self, title: &str, options: &[&str]) -> PromptResponse {
        self.finish_bar();
        eprintln!("{}", title);
        for (index, option) in options.iter().enumerate() {
            eprintln!("  [{}] {}", index + 1, option);
        }
        eprint!("> ");
        let _ = io::stderr().flush();

        let mut line = String::new();
        if io::stdin().read_line(&mut line).is_err() {
            return PromptResponse::Cancelled;
        }

        match line.trim().parse::<usize>() {
            Ok(choice) if choice >= 1 && choice <= options.len() => PromptResponse::Index(choice - 1),
            _ => PromptResponse::Cancelled,
        }
    }
}
