//! Periodic backup cycle loop
//!
//! The scheduler waits an initial settle delay, then runs one cycle per
//! interval. Each cycle goes through the resilience policy. Detection and every
//! single target backup run under their own hard timeouts. A successful cycle
//! advances the heartbeat. A failed one is logged and followed by a cooldown. Cancellation wakes any
//! sleep at once and gives an in-flight cycle a bounded grace period.

use parking_lot::Mutex;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use warden_config::SchedulerConfig;
use warden_ipc::RuntimeSettings;
use warden_resilience::{CircuitBreaker, CircuitState, ResiliencePolicy, RetryError};

use crate::error::WorkerError;
use crate::heartbeat::HeartbeatTracker;
use crate::recent::RecentErrors;
use crate::target::{TargetDetector, TargetProcessor};

/// Lifecycle of the scheduler task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerState::Starting => write!(f, "starting"),
            SchedulerState::Running => write!(f, "running"),
            SchedulerState::Stopping => write!(f, "stopping"),
            SchedulerState::Stopped => write!(f, "stopped"),
        }
    }
}

/// A target that could not be processed
#[derive(Debug, Clone, PartialEq)]
pub struct TargetFailure {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of one completed cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub detected: usize,
    pub succeeded: usize,
    pub failures: Vec<TargetFailure>,
    /// Stopped between targets because of shutdown
    pub interrupted: bool,
}

/// Hard limits for the collaborator calls inside one cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleTimeouts {
    pub detection: Duration,
    pub target: Duration,
}

impl From<&SchedulerConfig> for CycleTimeouts {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            detection: config.detection_timeout,
            target: config.target_timeout,
        }
    }
}

#[derive(Debug)]
enum SchedulerCommand {
    Restart,
}

enum Wake {
    Elapsed,
    Restart,
    Stop,
}

/// Run one cycle: detect targets, then process each in isolation.
///
/// Detection failure, including a detection timeout, fails the cycle. A
/// failing or timed-out target is logged, recorded in the report, and does not
/// stop the others.
pub async fn run_cycle(
    detector: &dyn TargetDetector,
    processor: &dyn TargetProcessor,
    timeouts: CycleTimeouts,
    recent_errors: &RecentErrors,
    cancel: &CancellationToken,
) -> Result<CycleReport, WorkerError> {
    let targets = tokio::time::timeout(timeouts.detection, detector.detect_targets())
        .await
        .map_err(|_| WorkerError::Timeout {
            operation: "target detection",
            limit: timeouts.detection,
        })??;
    let mut report = CycleReport {
        detected: targets.len(),
        ..CycleReport::default()
    };

    if targets.is_empty() {
        debug!("No targets detected");
        return Ok(report);
    }

    info!(count = targets.len(), "Processing detected targets");

    for target in &targets {
        if cancel.is_cancelled() {
            report.interrupted = true;
            break;
        }

        let outcome = match tokio::time::timeout(timeouts.target, processor.process_target(target)).await {
            Ok(result) => result,
            Err(_) => Err(WorkerError::processing(
                &target.path,
                format!("timed out after {:?}", timeouts.target),
            )),
        };

        match outcome {
            Ok(_) => report.succeeded += 1,
            Err(e) => {
                error!(path = %target.path.display(), "Target failed: {}", e);
                recent_errors.push(e.to_string());
                report.failures.push(TargetFailure {
                    path: target.path.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    Ok(report)
}

/// Read side of a scheduler, shared with status handlers
#[derive(Clone)]
pub struct SchedulerHandle {
    commands: mpsc::Sender<SchedulerCommand>,
    state: watch::Receiver<SchedulerState>,
    last_report: Arc<Mutex<Option<CycleReport>>>,
    heartbeat: Arc<HeartbeatTracker>,
    recent_errors: Arc<RecentErrors>,
    breaker: CircuitBreaker,
}

impl SchedulerHandle {
    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.state() == SchedulerState::Running
    }

    /// Wait until the scheduler reaches `target`, or return false if it
    /// finished without doing so
    pub async fn wait_for(&self, target: SchedulerState) -> bool {
        let mut state = self.state.clone();
        let reached = state.wait_for(|s| *s == target).await.is_ok();
        reached
    }

    /// Report of the last completed cycle
    pub fn last_report(&self) -> Option<CycleReport> {
        self.last_report.lock().clone()
    }

    pub fn heartbeat(&self) -> &Arc<HeartbeatTracker> {
        &self.heartbeat
    }

    pub fn recent_errors(&self) -> &Arc<RecentErrors> {
        &self.recent_errors
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    /// Reset the circuit breaker and run a fresh cycle now
    pub fn restart(&self) -> Result<(), WorkerError> {
        match self.commands.try_send(SchedulerCommand::Restart) {
            // A restart is already queued
            Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => Ok(()),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(WorkerError::SchedulerStopped),
        }
    }
}

/// The cycle loop. Build with [`Scheduler::new`], then drive with [`Scheduler::run`].
pub struct Scheduler {
    config: SchedulerConfig,
    policy: ResiliencePolicy,
    detector: Arc<dyn TargetDetector>,
    processor: Arc<dyn TargetProcessor>,
    settings: watch::Receiver<RuntimeSettings>,
    commands: mpsc::Receiver<SchedulerCommand>,
    state: watch::Sender<SchedulerState>,
    last_report: Arc<Mutex<Option<CycleReport>>>,
    heartbeat: Arc<HeartbeatTracker>,
    recent_errors: Arc<RecentErrors>,
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        policy: ResiliencePolicy,
        detector: Arc<dyn TargetDetector>,
        processor: Arc<dyn TargetProcessor>,
        settings: watch::Receiver<RuntimeSettings>,
    ) -> (Self, SchedulerHandle) {
        let (command_tx, command_rx) = mpsc::channel(4);
        let (state_tx, state_rx) = watch::channel(SchedulerState::Starting);
        let last_report = Arc::new(Mutex::new(None));
        let heartbeat = Arc::new(HeartbeatTracker::new(config.health_timeout));
        let recent_errors = Arc::new(RecentErrors::default());

        let handle = SchedulerHandle {
            commands: command_tx,
            state: state_rx,
            last_report: Arc::clone(&last_report),
            heartbeat: Arc::clone(&heartbeat),
            recent_errors: Arc::clone(&recent_errors),
            breaker: policy.breaker().clone(),
        };

        let scheduler = Self {
            config,
            policy,
            detector,
            processor,
            settings,
            commands: command_rx,
            state: state_tx,
            last_report,
            heartbeat,
            recent_errors,
        };

        (scheduler, handle)
    }

    /// Run until `cancel` fires
    pub async fn run(mut self, cancel: CancellationToken) {
        self.set_state(SchedulerState::Running);
        info!(
            initial_delay = ?self.config.initial_delay,
            interval_secs = self.settings.borrow().backup_interval_seconds,
            "Scheduler running"
        );

        let mut wait = self.config.initial_delay;
        loop {
            match self.pause(wait, &cancel).await {
                Wake::Elapsed => {}
                Wake::Restart => {
                    info!("Restart requested, resetting circuit breaker");
                    self.policy.breaker().reset();
                }
                Wake::Stop => break,
            }

            let started = Instant::now();
            match self.guarded_cycle(&cancel).await {
                Ok(report) if report.interrupted => {
                    info!(
                        succeeded = report.succeeded,
                        remaining = report.detected - report.succeeded - report.failures.len(),
                        "Backup cycle interrupted by shutdown"
                    );
                    *self.last_report.lock() = Some(report);
                }
                Ok(report) => {
                    info!(
                        detected = report.detected,
                        succeeded = report.succeeded,
                        failed = report.failures.len(),
                        elapsed = ?started.elapsed(),
                        "Backup cycle completed"
                    );
                    *self.last_report.lock() = Some(report);
                    self.heartbeat.beat();
                    wait = self.interval();
                }
                Err(RetryError::Cancelled) => break,
                Err(RetryError::CircuitBreakerOpen) => {
                    let breaker = self.policy.breaker();
                    warn!(
                        retry_in = ?breaker.remaining_break(),
                        rejected = breaker.metrics().total_rejected,
                        "Circuit open, backup cycle skipped"
                    );
                    self.recent_errors.push("Backup cycle skipped: circuit open");
                    wait = self.interval().saturating_add(self.config.failure_cooldown);
                }
                Err(e) => {
                    error!("Backup cycle failed: {}", e);
                    self.recent_errors.push(format!("Backup cycle failed: {}", e));
                    wait = self.interval().saturating_add(self.config.failure_cooldown);
                }
            }

            if cancel.is_cancelled() {
                break;
            }
        }

        self.set_state(SchedulerState::Stopping);
        self.set_state(SchedulerState::Stopped);
        info!("Scheduler stopped");
    }

    fn set_state(&self, state: SchedulerState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "Scheduler state changed");
        }
    }

    fn interval(&self) -> Duration {
        Duration::from_secs(self.settings.borrow().backup_interval_seconds)
    }

    /// Sleep for `duration`, waking early on cancellation or a restart command
    async fn pause(&mut self, duration: Duration, cancel: &CancellationToken) -> Wake {
        let commands = &mut self.commands;
        let command = async {
            match commands.recv().await {
                Some(command) => command,
                // Every handle dropped; only time and cancellation remain
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Wake::Stop,
            SchedulerCommand::Restart = command => Wake::Restart,
            _ = tokio::time::sleep(duration) => Wake::Elapsed,
        }
    }

    /// Run a cycle; on cancellation let it finish within the shutdown grace
    async fn guarded_cycle(
        &self,
        cancel: &CancellationToken,
    ) -> Result<CycleReport, RetryError<WorkerError>> {
        let cycle = self.execute_cycle(cancel);
        tokio::pin!(cycle);

        tokio::select! {
            result = &mut cycle => result,
            _ = cancel.cancelled() => {
                self.set_state(SchedulerState::Stopping);
                match tokio::time::timeout(self.config.shutdown_grace, &mut cycle).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(grace = ?self.config.shutdown_grace, "Abandoning in-flight backup cycle");
                        Err(RetryError::Cancelled)
                    }
                }
            }
        }
    }

    async fn execute_cycle(
        &self,
        cancel: &CancellationToken,
    ) -> Result<CycleReport, RetryError<WorkerError>> {
        let timeouts = CycleTimeouts::from(&self.config);

        self.policy
            .execute(cancel, |attempt| async move {
                debug!(attempt, "Starting backup cycle");
                run_cycle(
                    self.detector.as_ref(),
                    self.processor.as_ref(),
                    timeouts,
                    &self.recent_errors,
                    cancel,
                )
                .await
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU32, Ordering};
    use warden_ipc::BackupRecord;
    use warden_resilience::{CircuitBreakerConfig, RetryPolicy};

    use crate::target::Target;

    /// Fails the first `failures` scans, then reports `targets`
    struct ScriptedDetector {
        targets: Vec<Target>,
        failures: AtomicU32,
        stall: Option<Duration>,
        calls: AtomicU32,
    }

    impl ScriptedDetector {
        fn new(targets: Vec<Target>) -> Self {
            Self {
                targets,
                failures: AtomicU32::new(0),
                stall: None,
                calls: AtomicU32::new(0),
            }
        }

        fn failing(mut self, failures: u32) -> Self {
            self.failures = AtomicU32::new(failures);
            self
        }

        fn stalling(mut self, stall: Duration) -> Self {
            self.stall = Some(stall);
            self
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TargetDetector for ScriptedDetector {
        async fn detect_targets(&self) -> Result<Vec<Target>, WorkerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(stall) = self.stall {
                tokio::time::sleep(stall).await;
            }

            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(WorkerError::Detection("process table unavailable".into()));
            }
            Ok(self.targets.clone())
        }
    }

    #[derive(Default)]
    struct RecordingProcessor {
        fail: HashSet<PathBuf>,
        delay: Option<Duration>,
        processed: Mutex<Vec<PathBuf>>,
    }

    #[async_trait]
    impl TargetProcessor for RecordingProcessor {
        async fn process_target(&self, target: &Target) -> Result<BackupRecord, WorkerError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail.contains(&target.path) {
                return Err(WorkerError::processing(&target.path, "source file missing"));
            }

            self.processed.lock().push(target.path.clone());
            Ok(BackupRecord {
                source_path: target.path.clone(),
                backup_path: PathBuf::from("/backups").join(target.path.file_name().unwrap_or_default()),
                application: target.application.clone(),
                kind: target.kind,
                backed_up_at: Utc::now(),
                size_bytes: 1,
            })
        }
    }

    fn targets() -> Vec<Target> {
        ["/docs/a.odt", "/docs/b.odt", "/docs/c.pdf"]
            .into_iter()
            .map(|p| Target::new(p, "LibreOffice"))
            .collect()
    }

    fn config() -> SchedulerConfig {
        SchedulerConfig {
            interval: Duration::from_secs(120),
            initial_delay: Duration::from_secs(10),
            failure_cooldown: Duration::from_secs(60),
            scan_timeout: Duration::from_secs(10),
            detection_timeout: Duration::from_secs(30),
            target_timeout: Duration::from_secs(60),
            health_timeout: Duration::from_secs(600),
            shutdown_grace: Duration::from_secs(10),
        }
    }

    fn settings() -> watch::Receiver<RuntimeSettings> {
        let (tx, rx) = watch::channel(RuntimeSettings {
            backup_interval_seconds: 120,
            backup_folder: PathBuf::from("/backups"),
            max_versions: 10,
        });
        // Keep the value readable after the sender is gone
        drop(tx);
        rx
    }

    fn policy(retry: RetryPolicy, break_duration: Duration) -> ResiliencePolicy {
        ResiliencePolicy::new(
            retry,
            CircuitBreakerConfig {
                failure_threshold: 5,
                break_duration,
            },
        )
    }

    fn timeouts() -> CycleTimeouts {
        CycleTimeouts::from(&config())
    }

    fn spawn(
        config: SchedulerConfig,
        policy: ResiliencePolicy,
        detector: Arc<ScriptedDetector>,
        processor: Arc<RecordingProcessor>,
    ) -> (SchedulerHandle, CancellationToken, tokio::task::JoinHandle<()>) {
        spawn_with(config, policy, detector, processor, settings())
    }

    fn spawn_with(
        config: SchedulerConfig,
        policy: ResiliencePolicy,
        detector: Arc<ScriptedDetector>,
        processor: Arc<RecordingProcessor>,
        settings: watch::Receiver<RuntimeSettings>,
    ) -> (SchedulerHandle, CancellationToken, tokio::task::JoinHandle<()>) {
        let (scheduler, handle) = Scheduler::new(config, policy, detector, processor, settings);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(scheduler.run(cancel.clone()));
        (handle, cancel, task)
    }

    #[tokio::test]
    async fn test_failing_target_does_not_stop_cycle() {
        let detector = ScriptedDetector::new(targets());
        let processor = RecordingProcessor {
            fail: HashSet::from([PathBuf::from("/docs/b.odt")]),
            ..Default::default()
        };
        let recent = RecentErrors::default();

        let report = run_cycle(&detector, &processor, timeouts(), &recent, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.detected, 3);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].path, PathBuf::from("/docs/b.odt"));
        assert!(!report.interrupted);
        assert_eq!(
            *processor.processed.lock(),
            vec![PathBuf::from("/docs/a.odt"), PathBuf::from("/docs/c.pdf")]
        );
        assert_eq!(recent.len(), 1);
    }

    #[tokio::test]
    async fn test_detection_failure_fails_cycle() {
        let detector = ScriptedDetector::new(targets()).failing(1);
        let processor = RecordingProcessor::default();

        let err = run_cycle(
            &detector,
            &processor,
            timeouts(),
            &RecentErrors::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, WorkerError::Detection(_)));
        assert!(processor.processed.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_target_fails_alone() {
        let detector = ScriptedDetector::new(targets());
        let processor = RecordingProcessor {
            delay: Some(Duration::from_secs(90)),
            ..Default::default()
        };
        let recent = RecentErrors::default();

        let report = run_cycle(&detector, &processor, timeouts(), &recent, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.detected, 3);
        assert_eq!(report.succeeded, 0);
        assert_eq!(report.failures.len(), 3);
        assert!(report.failures[0].reason.contains("timed out"));
        assert_eq!(report.failures[1].path, PathBuf::from("/docs/b.odt"));
        assert_eq!(recent.len(), 3);
        assert_eq!(detector.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycle_advances_heartbeat() {
        let detector = Arc::new(ScriptedDetector::new(targets()));
        let processor = Arc::new(RecordingProcessor {
            fail: HashSet::from([PathBuf::from("/docs/b.odt")]),
            ..Default::default()
        });
        let (handle, cancel, task) = spawn(
            config(),
            policy(RetryPolicy::no_retry(), Duration::from_secs(60)),
            Arc::clone(&detector),
            processor,
        );

        assert!(handle.wait_for(SchedulerState::Running).await);
        assert!(handle.heartbeat().last_success().is_none());

        // Nothing happens during the initial settle delay
        tokio::time::sleep(Duration::from_secs(9)).await;
        assert_eq!(detector.calls(), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(detector.calls(), 1);
        let report = handle.last_report().unwrap();
        assert_eq!((report.succeeded, report.failures.len()), (2, 1));
        assert!(handle.heartbeat().last_success().is_some());
        assert!(handle.heartbeat().is_healthy());

        // Next cycle one interval later
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(detector.calls(), 2);

        cancel.cancel();
        task.await.unwrap();
        assert_eq!(handle.state(), SchedulerState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_sleep_stops_promptly() {
        let detector = Arc::new(ScriptedDetector::new(Vec::new()));
        let (handle, cancel, task) = spawn(
            config(),
            policy(RetryPolicy::no_retry(), Duration::from_secs(60)),
            Arc::clone(&detector),
            Arc::new(RecordingProcessor::default()),
        );

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(detector.calls(), 1);

        let started = Instant::now();
        cancel.cancel();
        task.await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(handle.state(), SchedulerState::Stopped);
        assert_eq!(detector.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_within_a_cycle() {
        let detector = Arc::new(ScriptedDetector::new(targets()).failing(2));
        let retry = RetryPolicy::exponential(3, 2.0, Duration::from_secs(1), Duration::from_secs(60));
        let (handle, cancel, _task) = spawn(
            config(),
            policy(retry, Duration::from_secs(60)),
            Arc::clone(&detector),
            Arc::new(RecordingProcessor::default()),
        );

        // Attempts at 10s, 12s, 16s
        tokio::time::sleep(Duration::from_secs(17)).await;

        assert_eq!(detector.calls(), 3);
        assert_eq!(handle.last_report().unwrap().succeeded, 3);
        assert!(handle.recent_errors().is_empty());
        assert_eq!(handle.circuit_state(), CircuitState::Closed);
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_cycle_is_not_retried() {
        let detector = Arc::new(ScriptedDetector::new(targets()));
        let processor = Arc::new(RecordingProcessor {
            delay: Some(Duration::from_secs(15)),
            ..Default::default()
        });
        let retry = RetryPolicy::exponential(1, 2.0, Duration::from_secs(1), Duration::from_secs(60));
        let mut config = config();
        config.initial_delay = Duration::ZERO;
        let (handle, cancel, _task) = spawn(
            config,
            policy(retry, Duration::from_secs(60)),
            Arc::clone(&detector),
            Arc::clone(&processor),
        );

        // Three 15s copies add up past the detection limit without failing anything
        tokio::time::sleep(Duration::from_secs(50)).await;

        assert_eq!(detector.calls(), 1);
        assert_eq!(processor.processed.lock().len(), 3);
        assert_eq!(handle.last_report().unwrap().succeeded, 3);
        assert!(handle.heartbeat().last_success().is_some());
        assert!(handle.recent_errors().is_empty());
        assert_eq!(handle.breaker.metrics().total_failures, 0);
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_detection_hits_detection_timeout() {
        let detector = Arc::new(ScriptedDetector::new(targets()).stalling(Duration::from_secs(3600)));
        let mut config = config();
        config.initial_delay = Duration::ZERO;
        let (handle, cancel, _task) = spawn(
            config,
            policy(RetryPolicy::no_retry(), Duration::from_secs(60)),
            Arc::clone(&detector),
            Arc::new(RecordingProcessor::default()),
        );

        tokio::time::sleep(Duration::from_secs(31)).await;

        assert!(handle.last_report().is_none());
        let errors = handle.recent_errors().snapshot();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("timed out"), "{}", errors[0]);
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_circuit_skips_cycles_until_restart() {
        let detector = Arc::new(ScriptedDetector::new(targets()).failing(u32::MAX));
        let mut config = config();
        config.initial_delay = Duration::ZERO;
        let (handle, cancel, _task) = spawn(
            config,
            policy(RetryPolicy::no_retry(), Duration::from_secs(3600)),
            Arc::clone(&detector),
            Arc::new(RecordingProcessor::default()),
        );

        // Failed cycles at 0, 180, 360, 540 and 720 open the circuit
        tokio::time::sleep(Duration::from_secs(721)).await;
        assert_eq!(detector.calls(), 5);
        assert_eq!(handle.circuit_state(), CircuitState::Open);

        // The sixth cycle at 900 is rejected without scanning
        tokio::time::sleep(Duration::from_secs(200)).await;
        assert_eq!(detector.calls(), 5);
        assert!(handle.recent_errors().snapshot()[0].contains("circuit open"));

        // Restart closes the circuit and runs at once
        handle.restart().unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(detector.calls(), 6);
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_lets_in_flight_cycle_finish_current_target() {
        let detector = Arc::new(ScriptedDetector::new(targets()));
        let processor = Arc::new(RecordingProcessor {
            delay: Some(Duration::from_secs(5)),
            ..Default::default()
        });
        let mut config = config();
        config.initial_delay = Duration::ZERO;
        let (handle, cancel, task) = spawn(
            config,
            policy(RetryPolicy::no_retry(), Duration::from_secs(60)),
            detector,
            Arc::clone(&processor),
        );

        tokio::time::sleep(Duration::from_secs(2)).await;
        cancel.cancel();
        task.await.unwrap();

        let report = handle.last_report().unwrap();
        assert!(report.interrupted);
        assert_eq!(report.succeeded, 1);
        assert_eq!(processor.processed.lock().len(), 1);
        // A partial cycle does not count as a success
        assert!(handle.heartbeat().last_success().is_none());
        assert_eq!(handle.state(), SchedulerState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_abandons_cycle_after_grace() {
        let detector = Arc::new(ScriptedDetector::new(targets()).stalling(Duration::from_secs(25)));
        let mut config = config();
        config.initial_delay = Duration::ZERO;
        config.shutdown_grace = Duration::from_secs(1);
        let (handle, cancel, task) = spawn(
            config,
            policy(RetryPolicy::no_retry(), Duration::from_secs(60)),
            detector,
            Arc::new(RecordingProcessor::default()),
        );

        tokio::time::sleep(Duration::from_secs(2)).await;
        let started = Instant::now();
        cancel.cancel();
        task.await.unwrap();

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(1) && elapsed < Duration::from_secs(2));
        assert!(handle.last_report().is_none());
        assert_eq!(handle.state(), SchedulerState::Stopped);
        // Cancellation is not a breaker failure
        assert_eq!(handle.circuit_state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_interval_survives_failed_cycles() {
        let (tx, rx) = watch::channel(RuntimeSettings {
            backup_interval_seconds: u64::MAX,
            backup_folder: PathBuf::from("/backups"),
            max_versions: 10,
        });
        drop(tx);
        let detector = Arc::new(ScriptedDetector::new(targets()).failing(u32::MAX));
        let mut config = config();
        config.initial_delay = Duration::ZERO;
        let (handle, cancel, task) = spawn_with(
            config,
            policy(RetryPolicy::no_retry(), Duration::from_secs(60)),
            Arc::clone(&detector),
            Arc::new(RecordingProcessor::default()),
            rx,
        );

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(detector.calls(), 1);
        assert_eq!(handle.recent_errors().len(), 1);
        assert!(!task.is_finished());

        cancel.cancel();
        task.await.unwrap();
        assert_eq!(handle.state(), SchedulerState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_after_stop_is_refused() {
        let (handle, cancel, task) = spawn(
            config(),
            policy(RetryPolicy::no_retry(), Duration::from_secs(60)),
            Arc::new(ScriptedDetector::new(Vec::new())),
            Arc::new(RecordingProcessor::default()),
        );

        cancel.cancel();
        task.await.unwrap();

        assert_eq!(handle.restart(), Err(WorkerError::SchedulerStopped));
    }
}
