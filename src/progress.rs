//! Download progress reporting.
//!
//! The downloader emits [`ProgressEvent`]s into a [`ProgressSink`]; the CLI
//! renders them with an `indicatif` byte bar on stderr so stdout stays clean.

use std::sync::Mutex;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// A transfer began. `total` comes from `Content-Length` when present.
    Started { label: String, total: Option<u64> },
    /// `bytes` more were written since the previous event.
    Advanced { bytes: u64 },
    Finished,
    Status(String),
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Default)]
pub struct TerminalProgress {
    bar: Mutex<Option<ProgressBar>>,
}

impl TerminalProgress {
    pub fn new() -> Self {
        Self::default()
    }

    fn start(label: String, total: Option<u64>) -> ProgressBar {
        let bar = match total {
            Some(total) if total > 0 => {
                let bar = ProgressBar::new(total);
                bar.set_style(
                    ProgressStyle::with_template(
                        "{msg} {wide_bar:.cyan/blue} {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
                    )
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=> "),
                );
                bar
            }
            _ => {
                let bar = ProgressBar::new_spinner();
                bar.enable_steady_tick(Duration::from_millis(100));
                bar.set_style(
                    ProgressStyle::with_template("{spinner:.cyan} {msg} {bytes} ({bytes_per_sec})")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                bar
            }
        };
        bar.set_message(label);
        bar
    }
}

impl ProgressSink for TerminalProgress {
    fn event(&self, event: ProgressEvent) {
        let Ok(mut guard) = self.bar.lock() else {
            return;
        };
        match event {
            ProgressEvent::Started { label, total } => {
                if let Some(previous) = guard.take() {
                    previous.finish_and_clear();
                }
                *guard = Some(Self::start(label, total));
            }
            ProgressEvent::Advanced { bytes } => {
                if let Some(bar) = guard.as_ref() {
                    bar.inc(bytes);
                }
            }
            ProgressEvent::Finished => {
                if let Some(bar) = guard.take() {
                    bar.finish_and_clear();
                }
            }
            ProgressEvent::Status(message) => match guard.as_ref() {
                Some(bar) => bar.println(message),
                None => eprintln!("{message}"),
            },
        }
    }
}

/// A sink that draws nothing and keeps every event in memory, for callers
/// that want to inspect a transfer afterwards (byte totals, status lines).
#[derive(Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingProgress {
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn bytes(&self) -> u64 {
        self.events()
            .iter()
            .map(|event| match event {
                ProgressEvent::Advanced { bytes } => *bytes,
                _ => 0,
            })
            .sum()
    }
}

impl ProgressSink for RecordingProgress {
    fn event(&self, event: ProgressEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
