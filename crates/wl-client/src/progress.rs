//! Upload progress reporting.

use std::io::Write;
use std::sync::{Mutex, PoisonError};

use tracing::warn;

/// Handle returned by [`Progress::track`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackerId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Done,
    Errored,
}

/// Receives one tracker per upload call.
///
/// Implementations are shared between upload workers, so they must be safe to
/// call from several tasks at once.
pub trait Progress: Send + Sync {
    /// Registers a call that is about to start.
    fn track(&self, message: &str) -> TrackerId;

    /// Marks a previously registered call as finished.
    fn finish(&self, id: TrackerId, outcome: Outcome);
}

/// Discards every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn track(&self, _message: &str) -> TrackerId {
        TrackerId(0)
    }

    fn finish(&self, _id: TrackerId, _outcome: Outcome) {}
}

#[derive(Debug)]
struct Tracker {
    message: String,
    outcome: Option<Outcome>,
}

#[derive(Debug)]
struct State<W> {
    out: W,
    trackers: Vec<Tracker>,
}

/// Writes a line per finished upload to `out`.
///
/// ```text
/// Write docs        uploaded!
/// Fix the bug...    failed!
/// ```
#[derive(Debug)]
pub struct TerminalProgress<W> {
    message_length: usize,
    state: Mutex<State<W>>,
}

impl<W: Write + Send> TerminalProgress<W> {
    /// Messages longer than `message_length` characters are cut and suffixed
    /// with `...`.
    pub const fn new(out: W, message_length: usize) -> Self {
        Self {
            message_length,
            state: Mutex::new(State {
                out,
                trackers: Vec::new(),
            }),
        }
    }

    /// Starts a new run, forgetting trackers of any previous one.
    pub fn start(&self) {
        self.lock().trackers.clear();
    }

    /// Ends the run and writes a totals line.
    pub fn stop(&self) {
        let (done, errored, pending) = self.counts();
        let mut state = self.lock();
        let mut line = format!("{done} uploaded, {errored} failed");
        if pending > 0 {
            line.push_str(&format!(", {pending} unfinished"));
        }
        if let Err(err) = writeln!(state.out, "{line}").and_then(|()| state.out.flush()) {
            warn!(error = %err, "failed to write progress");
        }
    }

    /// Number of finished, failed and still running trackers.
    pub fn counts(&self) -> (usize, usize, usize) {
        let state = self.lock();
        state
            .trackers
            .iter()
            .fold((0, 0, 0), |(done, errored, pending), tracker| match tracker.outcome {
                Some(Outcome::Done) => (done + 1, errored, pending),
                Some(Outcome::Errored) => (done, errored + 1, pending),
                None => (done, errored, pending + 1),
            })
    }

    /// Consumes the reporter and returns the writer.
    pub fn into_inner(self) -> W {
        self.state
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .out
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State<W>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write + Send> Progress for TerminalProgress<W> {
    fn track(&self, message: &str) -> TrackerId {
        let mut state = self.lock();
        state.trackers.push(Tracker {
            message: truncate(message, self.message_length),
            outcome: None,
        });
        TrackerId(state.trackers.len() - 1)
    }

    fn finish(&self, id: TrackerId, outcome: Outcome) {
        let mut state = self.lock();
        let Some(tracker) = state.trackers.get_mut(id.0) else {
            return;
        };
        if tracker.outcome.is_some() {
            return;
        }
        tracker.outcome = Some(outcome);

        let status = match outcome {
            Outcome::Done => "uploaded!",
            Outcome::Errored => "failed!",
        };
        let line = format!("{}\t{status}", tracker.message);
        if let Err(err) = writeln!(state.out, "{line}") {
            warn!(error = %err, "failed to write progress");
        }
    }
}

fn truncate(message: &str, max_chars: usize) -> String {
    if message.chars().count() <= max_chars {
        return message.to_string();
    }
    let kept = max_chars.saturating_sub(3);
    let mut truncated: String = message.chars().take(kept).collect();
    truncated.push_str("...");
    truncated
}
