//! Concurrent upload of reconciled entries.
//!
//! Entries are grouped by task id. Each group is uploaded sequentially by its
//! own worker while groups run in parallel, so a target never sees two writes
//! for the same task at once. Every entry produces exactly one
//! [`UploadResult`] on the result channel, whatever happens to it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info_span, warn};
use wl_core::Entry;
use wl_core::duration::round_to_minute;

use crate::client::Uploader;
use crate::error::{ClientError, UploadError};
use crate::progress::{Outcome, Progress};

/// Deadline applied to each upload call unless configured otherwise.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct UploadOpts {
    /// Target specific user the entries are logged for.
    pub user: String,
    /// Log unbillable time as billable.
    pub treat_all_billable: bool,
    /// Round each duration to the nearest minute before uploading.
    pub round_to_minute: bool,
    pub timeout: Duration,
    /// Upper bound on task groups uploading at once. `None` is unbounded.
    pub max_workers: Option<usize>,
}

impl Default for UploadOpts {
    fn default() -> Self {
        Self {
            user: String::new(),
            treat_all_billable: false,
            round_to_minute: false,
            timeout: DEFAULT_TIMEOUT,
            max_workers: None,
        }
    }
}

impl UploadOpts {
    /// Applies the duration transforms to a copy of `entry`.
    ///
    /// Unbillable time is folded into billable first, then each duration is
    /// rounded on its own.
    pub fn prepare(&self, entry: &Entry) -> Entry {
        let (mut billable, mut unbillable) = (entry.billable, entry.unbillable);

        if self.treat_all_billable {
            billable += unbillable;
            unbillable = Duration::ZERO;
        }
        if self.round_to_minute {
            billable = round_to_minute(billable);
            unbillable = round_to_minute(unbillable);
        }

        Entry {
            billable,
            unbillable,
            ..entry.clone()
        }
    }
}

/// Outcome of uploading one entry.
#[derive(Debug)]
pub struct UploadResult {
    /// The entry as it was sent, after the duration transforms.
    pub entry: Entry,
    pub outcome: Result<(), UploadError>,
}

/// Creates a result channel large enough for `len` results, so workers never
/// wait on a slow consumer.
pub fn results_channel(len: usize) -> (mpsc::Sender<UploadResult>, mpsc::Receiver<UploadResult>) {
    mpsc::channel(len.max(1))
}

/// Groups entries by task id, keeping the first-occurrence order of groups and
/// the input order within each group.
pub fn group_by_task(entries: impl IntoIterator<Item = Entry>) -> Vec<(String, Vec<Entry>)> {
    let mut groups: Vec<(String, Vec<Entry>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for entry in entries {
        if let Some(&position) = index.get(&entry.task.id) {
            groups[position].1.push(entry);
        } else {
            index.insert(entry.task.id.clone(), groups.len());
            groups.push((entry.task.id.clone(), vec![entry]));
        }
    }

    groups
}

/// Starts uploading `entries` and returns without waiting.
///
/// Results arrive on `results`; the caller should drain exactly
/// `entries.len()` of them, for example with [`collect_results`]. Must be
/// called from within a Tokio runtime.
///
/// Cancelling `cancel` interrupts in-flight calls and skips the remaining
/// entries; each of them still yields a result carrying
/// [`ClientError::Cancelled`].
pub fn upload(
    uploader: Arc<dyn Uploader>,
    entries: Vec<Entry>,
    results: mpsc::Sender<UploadResult>,
    opts: &UploadOpts,
    progress: Arc<dyn Progress>,
    cancel: CancellationToken,
) {
    let limiter = opts
        .max_workers
        .map(|workers| Arc::new(Semaphore::new(workers.max(1))));
    let groups = group_by_task(entries);
    debug!(
        uploader = uploader.name(),
        groups = groups.len(),
        max_workers = ?opts.max_workers,
        "starting upload"
    );

    for (task_id, group) in groups {
        let worker = Worker {
            uploader: Arc::clone(&uploader),
            results: results.clone(),
            opts: opts.clone(),
            progress: Arc::clone(&progress),
            cancel: cancel.clone(),
        };
        let limiter = limiter.clone();
        let span = info_span!("upload_group", task_id = %task_id, entries = group.len());

        tokio::spawn(
            async move {
                // Held until the whole group is done.
                let _permit = match limiter {
                    Some(semaphore) => tokio::select! {
                        biased;
                        permit = semaphore.acquire_owned() => permit.ok(),
                        () = worker.cancel.cancelled() => None,
                    },
                    None => None,
                };
                worker.run(group).await;
            }
            .instrument(span),
        );
    }
}

struct Worker {
    uploader: Arc<dyn Uploader>,
    results: mpsc::Sender<UploadResult>,
    opts: UploadOpts,
    progress: Arc<dyn Progress>,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(self, group: Vec<Entry>) {
        for entry in group {
            let entry = self.opts.prepare(&entry);
            let outcome = if self.cancel.is_cancelled() {
                Err(ClientError::Cancelled)
            } else {
                self.upload_one(&entry).await
            };

            if let Err(cause) = &outcome {
                warn!(summary = %entry.summary, error = %cause, "upload failed");
            }
            let result = UploadResult {
                outcome: outcome.map_err(|cause| UploadError::new(&entry, cause)),
                entry,
            };
            if self.results.send(result).await.is_err() {
                warn!("result receiver dropped, abandoning group");
                return;
            }
        }
    }

    async fn upload_one(&self, entry: &Entry) -> Result<(), ClientError> {
        let tracker = self.progress.track(&entry.summary);
        let call = tokio::time::timeout(
            self.opts.timeout,
            self.uploader.upload_entry(entry, &self.opts),
        );

        let outcome = tokio::select! {
            biased;
            result = call => result.unwrap_or(Err(ClientError::Timeout(self.opts.timeout))),
            () = self.cancel.cancelled() => Err(ClientError::Cancelled),
        };

        let status = if outcome.is_ok() {
            Outcome::Done
        } else {
            Outcome::Errored
        };
        self.progress.finish(tracker, status);
        outcome
    }
}

/// Aggregated results of an upload run.
#[derive(Debug, Default)]
pub struct UploadReport {
    pub succeeded: usize,
    pub errors: Vec<UploadError>,
    /// Results that never arrived because every sender was dropped early.
    pub missing: usize,
}

impl UploadReport {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty() && self.missing == 0
    }

    /// Number of entries skipped or interrupted by cancellation.
    pub fn cancelled(&self) -> usize {
        self.errors.iter().filter(|err| err.is_cancelled()).count()
    }
}

/// Drains `expected` results from `receiver`.
///
/// Returns early, counting the shortfall as missing, if all senders are
/// dropped before that many results arrived.
pub async fn collect_results(
    mut receiver: mpsc::Receiver<UploadResult>,
    expected: usize,
) -> UploadReport {
    let mut report = UploadReport::default();

    for received in 0..expected {
        let Some(result) = receiver.recv().await else {
            report.missing = expected - received;
            warn!(missing = report.missing, "upload results missing");
            break;
        };
        match result.outcome {
            Ok(()) => report.succeeded += 1,
            Err(err) => report.errors.push(err),
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::DateTime;
    use tokio::sync::Barrier;
    use wl_core::Field;

    use super::*;
    use crate::progress::{NoProgress, TerminalProgress};

    fn entry(task: &str, summary: &str) -> Entry {
        Entry {
            client: Field::new("client", "Client"),
            project: Field::new("project", "Project"),
            task: Field::new(task, task),
            summary: summary.to_string(),
            notes: String::new(),
            start: Some(DateTime::parse_from_rfc3339("2021-10-02T05:00:00Z").unwrap()),
            billable: Duration::from_secs(3600),
            unbillable: Duration::ZERO,
        }
    }

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
        fail: HashSet<String>,
        hang: HashSet<String>,
    }

    impl Recorder {
        fn failing(summaries: &[&str]) -> Self {
            Self {
                fail: summaries.iter().map(ToString::to_string).collect(),
                ..Self::default()
            }
        }

        fn hanging(summaries: &[&str]) -> Self {
            Self {
                hang: summaries.iter().map(ToString::to_string).collect(),
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Uploader for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        async fn upload_entry(&self, entry: &Entry, _opts: &UploadOpts) -> Result<(), ClientError> {
            self.calls.lock().unwrap().push(entry.summary.clone());
            if self.hang.contains(&entry.summary) {
                std::future::pending::<()>().await;
            }
            tokio::task::yield_now().await;
            if self.fail.contains(&entry.summary) {
                return Err(ClientError::Api {
                    status: 400,
                    body: "rejected".to_string(),
                });
            }
            Ok(())
        }
    }

    async fn run(
        uploader: Arc<dyn Uploader>,
        entries: Vec<Entry>,
        opts: &UploadOpts,
        cancel: CancellationToken,
    ) -> Vec<UploadResult> {
        let expected = entries.len();
        let (tx, mut rx) = results_channel(expected);
        upload(uploader, entries, tx, opts, Arc::new(NoProgress), cancel);

        let mut results = Vec::with_capacity(expected);
        for _ in 0..expected {
            results.push(rx.recv().await.unwrap());
        }
        results
    }

    fn failed(results: &[UploadResult]) -> Vec<&UploadError> {
        results.iter().filter_map(|r| r.outcome.as_ref().err()).collect()
    }

    #[test]
    fn prepare_folds_unbillable_then_rounds() {
        let source = Entry {
            billable: Duration::from_secs(61 * 60 + 29),
            unbillable: Duration::from_secs(31),
            ..entry("T-1", "Work")
        };

        let folded = UploadOpts {
            treat_all_billable: true,
            ..UploadOpts::default()
        }
        .prepare(&source);
        assert_eq!(folded.billable, Duration::from_secs(3720));
        assert_eq!(folded.unbillable, Duration::ZERO);

        let rounded = UploadOpts {
            round_to_minute: true,
            ..UploadOpts::default()
        }
        .prepare(&source);
        assert_eq!(rounded.billable, Duration::from_secs(61 * 60));
        assert_eq!(rounded.unbillable, Duration::from_secs(60));

        let both = UploadOpts {
            treat_all_billable: true,
            round_to_minute: true,
            ..UploadOpts::default()
        }
        .prepare(&source);
        assert_eq!(both.billable, Duration::from_secs(62 * 60));
        assert_eq!(both.unbillable, Duration::ZERO);

        // The source entry is untouched.
        assert_eq!(source.unbillable, Duration::from_secs(31));
    }

    #[test]
    fn prepare_without_transforms_is_identity() {
        let source = entry("T-1", "Work");
        assert_eq!(UploadOpts::default().prepare(&source), source);
    }

    #[test]
    fn group_by_task_keeps_first_occurrence_order() {
        let groups = group_by_task(vec![
            entry("B", "b1"),
            entry("A", "a1"),
            entry("B", "b2"),
            entry("C", "c1"),
            entry("A", "a2"),
        ]);

        let shape: Vec<(&str, Vec<&str>)> = groups
            .iter()
            .map(|(task, entries)| {
                (
                    task.as_str(),
                    entries.iter().map(|e| e.summary.as_str()).collect(),
                )
            })
            .collect();
        assert_eq!(
            shape,
            [
                ("B", vec!["b1", "b2"]),
                ("A", vec!["a1", "a2"]),
                ("C", vec!["c1"]),
            ]
        );
    }

    #[tokio::test]
    async fn failures_are_isolated() {
        let uploader = Arc::new(Recorder::failing(&["bad"]));
        let entries = vec![
            entry("T-1", "ok 1"),
            entry("T-1", "bad"),
            entry("T-1", "ok 2"),
            entry("T-2", "ok 3"),
            entry("T-3", "ok 4"),
        ];

        let results = run(
            uploader.clone(),
            entries,
            &UploadOpts::default(),
            CancellationToken::new(),
        )
        .await;

        let errors = failed(&results);
        assert_eq!(results.len(), 5);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].summary, "bad");
        assert_eq!(uploader.calls().len(), 5);
    }

    #[tokio::test]
    async fn entries_of_one_task_upload_in_order() {
        let uploader = Arc::new(Recorder::default());
        let entries = vec![
            entry("A", "a1"),
            entry("B", "b1"),
            entry("A", "a2"),
            entry("B", "b2"),
            entry("A", "a3"),
        ];

        let results = run(
            uploader.clone(),
            entries,
            &UploadOpts::default(),
            CancellationToken::new(),
        )
        .await;

        let calls = uploader.calls();
        let group_a: Vec<&str> = calls
            .iter()
            .map(String::as_str)
            .filter(|s| s.starts_with('a'))
            .collect();
        assert_eq!(group_a, ["a1", "a2", "a3"]);

        let results_a: Vec<&str> = results
            .iter()
            .map(|r| r.entry.summary.as_str())
            .filter(|s| s.starts_with('a'))
            .collect();
        assert_eq!(results_a, ["a1", "a2", "a3"]);
    }

    struct Rendezvous(Barrier);

    #[async_trait]
    impl Uploader for Rendezvous {
        fn name(&self) -> &'static str {
            "rendezvous"
        }

        async fn upload_entry(&self, _entry: &Entry, _opts: &UploadOpts) -> Result<(), ClientError> {
            self.0.wait().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn different_tasks_upload_concurrently() {
        // Both calls must be in flight at the same time to pass the barrier.
        let uploader = Arc::new(Rendezvous(Barrier::new(2)));
        let entries = vec![entry("A", "a"), entry("B", "b")];

        let (tx, rx) = results_channel(entries.len());
        upload(
            uploader,
            entries,
            tx,
            &UploadOpts::default(),
            Arc::new(NoProgress),
            CancellationToken::new(),
        );
        let report = tokio::time::timeout(Duration::from_secs(5), collect_results(rx, 2))
            .await
            .unwrap();

        assert_eq!(report.succeeded, 2);
        assert!(report.is_success());
    }

    #[tokio::test]
    async fn hanging_call_times_out() {
        let uploader = Arc::new(Recorder::hanging(&["stuck"]));
        let opts = UploadOpts {
            timeout: Duration::from_millis(50),
            ..UploadOpts::default()
        };
        let entries = vec![entry("A", "stuck"), entry("A", "after"), entry("B", "other")];

        let (tx, rx) = results_channel(entries.len());
        upload(
            uploader,
            entries,
            tx,
            &opts,
            Arc::new(NoProgress),
            CancellationToken::new(),
        );
        let report = collect_results(rx, 3).await;

        assert_eq!(report.succeeded, 2);
        assert_eq!(report.errors.len(), 1);
        assert!(matches!(report.errors[0].cause, ClientError::Timeout(_)));
    }

    struct CancelsOnSecondCall {
        calls: AtomicUsize,
        cancel: CancellationToken,
    }

    #[async_trait]
    impl Uploader for CancelsOnSecondCall {
        fn name(&self) -> &'static str {
            "cancels"
        }

        async fn upload_entry(&self, _entry: &Entry, _opts: &UploadOpts) -> Result<(), ClientError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 1 {
                self.cancel.cancel();
                std::future::pending::<()>().await;
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn cancellation_still_yields_one_result_per_entry() {
        let cancel = CancellationToken::new();
        let uploader = Arc::new(CancelsOnSecondCall {
            calls: AtomicUsize::new(0),
            cancel: cancel.clone(),
        });
        let entries: Vec<Entry> = (1..=5).map(|i| entry("A", &format!("e{i}"))).collect();

        let (tx, rx) = results_channel(entries.len());
        upload(
            uploader.clone(),
            entries,
            tx,
            &UploadOpts::default(),
            Arc::new(NoProgress),
            cancel,
        );
        let report = tokio::time::timeout(Duration::from_secs(5), collect_results(rx, 5))
            .await
            .unwrap();

        assert_eq!(report.succeeded, 1);
        assert_eq!(report.errors.len(), 4);
        assert_eq!(report.cancelled(), 4);
        assert_eq!(report.missing, 0);
        assert_eq!(uploader.calls.load(Ordering::SeqCst), 2);
    }

    /// Rejects summaries starting with `bad` and cancels the run on call
    /// number `cancel_at`, which then never returns.
    struct FailsThenCancels {
        calls: Mutex<Vec<String>>,
        cancel_at: usize,
        cancel: CancellationToken,
    }

    #[async_trait]
    impl Uploader for FailsThenCancels {
        fn name(&self) -> &'static str {
            "fails-then-cancels"
        }

        async fn upload_entry(&self, entry: &Entry, _opts: &UploadOpts) -> Result<(), ClientError> {
            let call = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(entry.summary.clone());
                calls.len()
            };
            if call == self.cancel_at {
                self.cancel.cancel();
                std::future::pending::<()>().await;
            }
            tokio::task::yield_now().await;
            if entry.summary.starts_with("bad") {
                return Err(ClientError::Api {
                    status: 400,
                    body: "rejected".to_string(),
                });
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn failures_and_cancellation_across_capped_groups() {
        let cancel = CancellationToken::new();
        let uploader = Arc::new(FailsThenCancels {
            calls: Mutex::new(Vec::new()),
            cancel_at: 12,
            cancel: cancel.clone(),
        });
        let entries: Vec<Entry> = (0..40)
            .map(|i| {
                let summary = if i % 4 == 0 { format!("bad {i}") } else { format!("ok {i}") };
                entry(&format!("T-{}", i % 7), &summary)
            })
            .collect();
        let opts = UploadOpts {
            max_workers: Some(3),
            ..UploadOpts::default()
        };

        let results = tokio::time::timeout(
            Duration::from_secs(5),
            run(uploader.clone(), entries, &opts, cancel),
        )
        .await
        .unwrap();

        // One result per entry, none lost or duplicated.
        let summaries: HashSet<&str> = results.iter().map(|r| r.entry.summary.as_str()).collect();
        assert_eq!(results.len(), 40);
        assert_eq!(summaries.len(), 40);

        let calls = uploader.calls.lock().unwrap().clone();
        assert!(calls.len() < 40, "cancellation skipped nothing");

        let errors = failed(&results);
        let cancelled = errors.iter().filter(|err| err.is_cancelled()).count();
        let rejected: Vec<&str> = errors
            .iter()
            .filter(|err| !err.is_cancelled())
            .map(|err| err.summary.as_str())
            .collect();
        assert!(cancelled >= 40 - calls.len());
        assert!(!rejected.is_empty());
        assert!(rejected.iter().all(|summary| summary.starts_with("bad")));
        assert!(rejected.iter().all(|summary| calls.iter().any(|call| call == summary)));

        let succeeded = results.iter().filter(|r| r.outcome.is_ok()).count();
        assert_eq!(succeeded + errors.len(), 40);
        assert!(
            results
                .iter()
                .filter(|r| r.outcome.is_ok())
                .all(|r| r.entry.summary.starts_with("ok"))
        );
    }

    #[tokio::test]
    async fn cancelled_before_start_skips_every_call() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let uploader = Arc::new(Recorder::default());
        let entries = vec![entry("A", "a"), entry("B", "b"), entry("B", "c")];

        let results = run(uploader.clone(), entries, &UploadOpts::default(), cancel).await;

        let errors = failed(&results);
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().all(|err| err.is_cancelled()));
        assert!(uploader.calls().is_empty());
    }

    #[tokio::test]
    async fn progress_tracks_every_call() {
        let uploader = Arc::new(Recorder::failing(&["bad"]));
        let progress = Arc::new(TerminalProgress::new(std::io::sink(), 40));
        progress.start();
        let entries = vec![entry("A", "good"), entry("A", "bad"), entry("B", "fine")];

        let (tx, rx) = results_channel(entries.len());
        upload(
            uploader,
            entries,
            tx,
            &UploadOpts::default(),
            progress.clone(),
            CancellationToken::new(),
        );
        let report = collect_results(rx, 3).await;

        assert_eq!(report.succeeded, 2);
        assert_eq!(progress.counts(), (2, 1, 0));
    }

    struct Concurrency {
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl Uploader for Concurrency {
        fn name(&self) -> &'static str {
            "concurrency"
        }

        async fn upload_entry(&self, _entry: &Entry, _opts: &UploadOpts) -> Result<(), ClientError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn max_workers_caps_active_groups() {
        let uploader = Arc::new(Concurrency {
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let opts = UploadOpts {
            max_workers: Some(1),
            ..UploadOpts::default()
        };
        let entries = vec![entry("A", "a"), entry("B", "b"), entry("C", "c")];

        let (tx, rx) = results_channel(entries.len());
        upload(
            uploader.clone(),
            entries,
            tx,
            &opts,
            Arc::new(NoProgress),
            CancellationToken::new(),
        );
        let report = collect_results(rx, 3).await;

        assert_eq!(report.succeeded, 3);
        assert_eq!(uploader.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn collect_results_reports_missing_when_senders_drop() {
        let (tx, rx) = results_channel(3);
        tx.send(UploadResult {
            entry: entry("A", "a"),
            outcome: Ok(()),
        })
        .await
        .unwrap();
        drop(tx);

        let report = collect_results(rx, 3).await;
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.missing, 2);
        assert!(!report.is_success());
    }

    #[tokio::test]
    async fn empty_batch_produces_no_results() {
        let (tx, rx) = results_channel(0);
        upload(
            Arc::new(Recorder::default()),
            Vec::new(),
            tx,
            &UploadOpts::default(),
            Arc::new(NoProgress),
            CancellationToken::new(),
        );
        let report = collect_results(rx, 0).await;
        assert!(report.is_success());
        assert_eq!(report.succeeded, 0);
    }
}
