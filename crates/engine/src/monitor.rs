//! Monitor loop: one enforcement cycle over a set of subjects.
//!
//! A cycle takes a snapshot from the accounting source, evaluates each
//! subject against it and acts on the result: OK subjects are only logged,
//! WARN subjects get a warning notice, CANCEL subjects get a cancellation
//! notice and every active job cancelled. Nothing is remembered between
//! cycles, so a subject that stays over quota is notified again next cycle.

use std::sync::Arc;

use chrono::{DateTime, TimeZone};
use serde::Serialize;
use tracing::{debug, info, warn};

use gpuquota_accounting::{AccountingQuery, AccountingSource, Selector};
use gpuquota_core::{JobRecord, QuotaSubject, Timestamp, WindowSpec, DEFAULT_GRACE_HOURS};
use gpuquota_notify::NotifyError;

use crate::control::SchedulerControl;
use crate::enforcement::{evaluate_in, EnforcementState, Evaluation};
use crate::error::Result;
use crate::forecast::{forecast, ForecastPoint, DEFAULT_FORECAST_OFFSETS};
use crate::report::{summary_line, usage_report};
use crate::usage::{active_jobs, active_subjects};
use crate::window::resolve;

/// Delivers quota notices for a subject.
#[async_trait::async_trait]
pub trait QuotaNotifier: Send + Sync {
    /// Over quota, still within the grace period.
    async fn warn(
        &self,
        subject: &QuotaSubject,
        report: &str,
        active_jobs: &[JobRecord],
    ) -> std::result::Result<(), NotifyError>;

    /// Over quota past the grace period; `active_jobs` are about to be cancelled.
    async fn cancel_notice(
        &self,
        subject: &QuotaSubject,
        report: &str,
        active_jobs: &[JobRecord],
    ) -> std::result::Result<(), NotifyError>;
}

/// Cycle-wide parameters.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    /// Partitions whose usage counts against the quota. Empty means all.
    pub partitions: Vec<String>,
    /// Per-user quota in GPU-hours, for user cycles.
    pub quota: f64,
    /// Per-user usage window, for user cycles.
    pub user_window: WindowSpec,
    /// How far back discovery looks for active jobs.
    pub discovery_window_minutes: i64,
    pub grace_hours: i64,
    pub forecast_offsets: Vec<i64>,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            partitions: vec!["pli-c".to_string()],
            quota: 500.0,
            user_window: WindowSpec::rolling_days(30),
            discovery_window_minutes: 30,
            grace_hours: DEFAULT_GRACE_HOURS,
            forecast_offsets: DEFAULT_FORECAST_OFFSETS.to_vec(),
        }
    }
}

/// Something the cycle did, or tried to do.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Warned,
    /// Rendered but not sent: no notification channel (e.g. a dry run).
    WarnSkipped,
    WarnFailed { error: String },
    CancelNoticeSent,
    CancelNoticeSkipped,
    CancelNoticeFailed { error: String },
    JobCancelled { job_id: String },
    CancelFailed { job_id: String, error: String },
}

/// Everything known about one subject at evaluation time.
#[derive(Debug, Clone, Serialize)]
pub struct Assessment {
    pub evaluation: Evaluation,
    /// `None` for calendar windows.
    pub forecast: Option<Vec<ForecastPoint>>,
    pub active_jobs: Vec<JobRecord>,
    pub report: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubjectOutcome {
    Evaluated {
        assessment: Assessment,
        actions: Vec<Action>,
    },
    /// Usage could not be computed; no action was taken.
    Unknown { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct SubjectReport {
    pub subject: QuotaSubject,
    pub outcome: SubjectOutcome,
}

impl SubjectReport {
    pub fn state(&self) -> Option<EnforcementState> {
        match &self.outcome {
            SubjectOutcome::Evaluated { assessment, .. } => Some(assessment.evaluation.state),
            SubjectOutcome::Unknown { .. } => None,
        }
    }

    pub fn actions(&self) -> &[Action] {
        match &self.outcome {
            SubjectOutcome::Evaluated { actions, .. } => actions,
            SubjectOutcome::Unknown { .. } => &[],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleMode {
    Users,
    Accounts,
}

/// Outcome of one monitor cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub mode: CycleMode,
    pub evaluated_at: Timestamp,
    pub subjects: Vec<SubjectReport>,
}

impl CycleReport {
    pub fn count(&self, state: EnforcementState) -> usize {
        self.subjects.iter().filter(|s| s.state() == Some(state)).count()
    }

    pub fn unknown(&self) -> usize {
        self.subjects.iter().filter(|s| s.state().is_none()).count()
    }

    /// Jobs successfully cancelled this cycle.
    pub fn cancelled_jobs(&self) -> Vec<&str> {
        self.subjects
            .iter()
            .flat_map(|s| s.actions())
            .filter_map(|a| match a {
                Action::JobCancelled { job_id } => Some(job_id.as_str()),
                _ => None,
            })
            .collect()
    }

    fn log_summary(&self) {
        info!(
            mode = ?self.mode,
            subjects = self.subjects.len(),
            ok = self.count(EnforcementState::Ok),
            warn = self.count(EnforcementState::Warn),
            cancel = self.count(EnforcementState::Cancel),
            unknown = self.unknown(),
            jobs_cancelled = self.cancelled_jobs().len(),
            "monitor cycle complete"
        );
    }
}

/// Runs enforcement cycles against an accounting source.
pub struct Monitor {
    source: Arc<dyn AccountingSource>,
    notifier: Arc<dyn QuotaNotifier>,
    control: Arc<dyn SchedulerControl>,
    settings: MonitorSettings,
}

impl Monitor {
    pub fn new(
        source: Arc<dyn AccountingSource>,
        notifier: Arc<dyn QuotaNotifier>,
        control: Arc<dyn SchedulerControl>,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            source,
            notifier,
            control,
            settings,
        }
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    /// The subject a user cycle would evaluate for `user`.
    pub fn user_subject(&self, user: &str) -> QuotaSubject {
        QuotaSubject::user(user, self.settings.quota, self.settings.user_window)
            .with_grace_hours(self.settings.grace_hours)
    }

    /// Fetch a subject's records and evaluate them, without acting.
    pub async fn assess<Tz: TimeZone>(
        &self,
        subject: &QuotaSubject,
        now: &DateTime<Tz>,
    ) -> Result<Assessment> {
        let window = resolve(&subject.window, now)?;
        let query = AccountingQuery::new(
            Selector::from(&subject.kind),
            &self.settings.partitions,
            window.start,
            window.end,
        );

        let mut records = self.source.fetch(&query).await?.records;
        records.retain(|job| subject.kind.matches(job));

        let evaluation = evaluate_in(subject, &window, &records)?;
        let forecast = if window.supports_forecast() {
            Some(forecast(
                &window,
                subject.quota,
                &records,
                &self.settings.forecast_offsets,
            )?)
        } else {
            None
        };
        let report = usage_report(
            subject,
            &evaluation,
            forecast.as_deref(),
            &self.settings.partitions,
        );
        let active = active_jobs(&records).into_iter().cloned().collect();

        Ok(Assessment {
            evaluation,
            forecast,
            active_jobs: active,
            report,
        })
    }

    /// Evaluate one subject and carry out what its state calls for.
    ///
    /// Errors never escape: a subject whose usage cannot be computed is
    /// reported as unknown, and notifier or control failures are recorded
    /// as failed actions.
    pub async fn evaluate_subject<Tz: TimeZone>(
        &self,
        subject: QuotaSubject,
        now: &DateTime<Tz>,
    ) -> SubjectReport {
        let assessment = match self.assess(&subject, now).await {
            Ok(assessment) => assessment,
            Err(e) => {
                warn!(subject = %subject, error = %e, "usage unavailable, skipping enforcement");
                return SubjectReport {
                    subject,
                    outcome: SubjectOutcome::Unknown {
                        reason: e.to_string(),
                    },
                };
            }
        };

        info!(
            subject = %subject.name(),
            state = %assessment.evaluation.state,
            "{}",
            summary_line(&subject, &assessment.evaluation)
        );

        let actions = match assessment.evaluation.state {
            EnforcementState::Ok => Vec::new(),
            EnforcementState::Warn => vec![self.warn(&subject, &assessment).await],
            EnforcementState::Cancel => self.cancel(&subject, &assessment).await,
        };

        SubjectReport {
            subject,
            outcome: SubjectOutcome::Evaluated {
                assessment,
                actions,
            },
        }
    }

    async fn warn(&self, subject: &QuotaSubject, assessment: &Assessment) -> Action {
        match self
            .notifier
            .warn(subject, &assessment.report, &assessment.active_jobs)
            .await
        {
            Ok(()) => Action::Warned,
            Err(NotifyError::NoChannels) => {
                info!(subject = %subject.name(), "quota warning not sent: no notification channel");
                Action::WarnSkipped
            }
            Err(e) => {
                warn!(subject = %subject.name(), error = %e, "quota warning not delivered");
                Action::WarnFailed {
                    error: e.to_string(),
                }
            }
        }
    }

    async fn cancel(&self, subject: &QuotaSubject, assessment: &Assessment) -> Vec<Action> {
        let mut actions = Vec::with_capacity(assessment.active_jobs.len() + 1);

        match self
            .notifier
            .cancel_notice(subject, &assessment.report, &assessment.active_jobs)
            .await
        {
            Ok(()) => actions.push(Action::CancelNoticeSent),
            Err(NotifyError::NoChannels) => {
                info!(subject = %subject.name(), "cancellation notice not sent: no notification channel");
                actions.push(Action::CancelNoticeSkipped);
            }
            Err(e) => {
                warn!(subject = %subject.name(), error = %e, "cancellation notice not delivered");
                actions.push(Action::CancelNoticeFailed {
                    error: e.to_string(),
                });
            }
        }

        for job in &assessment.active_jobs {
            match self.control.cancel(&job.job_id).await {
                Ok(()) => {
                    info!(
                        subject = %subject.name(),
                        job_id = %job.job_id,
                        control = self.control.control_name(),
                        "cancelled over-quota job"
                    );
                    actions.push(Action::JobCancelled {
                        job_id: job.job_id.clone(),
                    });
                }
                Err(e) => {
                    warn!(subject = %subject.name(), job_id = %job.job_id, error = %e, "cancel failed");
                    actions.push(Action::CancelFailed {
                        job_id: job.job_id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        actions
    }

    /// Discover users with active jobs and enforce each user's quota.
    ///
    /// Fails only if discovery itself fails; per-user failures become
    /// unknown outcomes.
    pub async fn run_user_cycle<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Result<CycleReport> {
        let end = now.timestamp();
        let discovery = resolve(
            &WindowSpec::Rolling {
                minutes: self.settings.discovery_window_minutes,
            },
            now,
        )?;
        let query = AccountingQuery::new(
            Selector::AllUsers,
            &self.settings.partitions,
            discovery.start,
            end,
        );

        let snapshot = self.source.fetch(&query).await?;
        let users = active_subjects(&snapshot.records);
        debug!(
            source = self.source.source_name(),
            active_users = users.len(),
            "discovery complete"
        );

        let mut subjects = Vec::with_capacity(users.len());
        for user in &users {
            subjects.push(self.evaluate_subject(self.user_subject(user), now).await);
        }

        let report = CycleReport {
            mode: CycleMode::Users,
            evaluated_at: end,
            subjects,
        };
        report.log_summary();
        Ok(report)
    }

    /// Enforce quotas for an explicit subject list, e.g. from the account mapping.
    pub async fn run_account_cycle<Tz: TimeZone>(
        &self,
        subjects: &[QuotaSubject],
        now: &DateTime<Tz>,
    ) -> CycleReport {
        let mut reports = Vec::with_capacity(subjects.len());
        for subject in subjects {
            reports.push(self.evaluate_subject(subject.clone(), now).await);
        }

        let report = CycleReport {
            mode: CycleMode::Accounts,
            evaluated_at: now.timestamp(),
            subjects: reports,
        };
        report.log_summary();
        report
    }
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("source", &self.source.source_name())
            .field("control", &self.control.control_name())
            .field("settings", &self.settings)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::ControlError;
    use chrono::Utc;
    use gpuquota_accounting::{AccountingError, ParsedJobs};
    use gpuquota_core::JobState;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const HOUR: i64 = 3600;

    struct MockSource {
        records: Vec<JobRecord>,
        fail_discovery: bool,
        fail_user: Option<String>,
        queries: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl AccountingSource for MockSource {
        async fn fetch(
            &self,
            query: &AccountingQuery,
        ) -> gpuquota_accounting::error::Result<ParsedJobs> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            match &query.selector {
                Selector::AllUsers if self.fail_discovery => {
                    return Err(AccountingError::MalformedResponse("truncated".into()))
                }
                Selector::User(name) if Some(name) == self.fail_user.as_ref() => {
                    return Err(AccountingError::CommandFailed {
                        program: "sacct".into(),
                        status: "exit status: 1".into(),
                        stderr: "slurmdbd unreachable".into(),
                    })
                }
                _ => {}
            }
            Ok(ParsedJobs {
                records: self
                    .records
                    .iter()
                    .filter(|r| query.selector.matches(r))
                    .cloned()
                    .collect(),
                errors: Vec::new(),
            })
        }

        fn source_name(&self) -> &str {
            "mock"
        }
    }

    #[derive(Default)]
    struct MockNotifier {
        sent: Mutex<Vec<(String, String)>>,
        should_fail: bool,
    }

    impl MockNotifier {
        fn record(&self, kind: &str, subject: &QuotaSubject) -> std::result::Result<(), NotifyError> {
            self.sent
                .lock()
                .unwrap()
                .push((kind.to_string(), subject.name()));
            if self.should_fail {
                Err(NotifyError::Smtp("relay refused".into()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait::async_trait]
    impl QuotaNotifier for MockNotifier {
        async fn warn(
            &self,
            subject: &QuotaSubject,
            _report: &str,
            _active_jobs: &[JobRecord],
        ) -> std::result::Result<(), NotifyError> {
            self.record("warn", subject)
        }

        async fn cancel_notice(
            &self,
            subject: &QuotaSubject,
            _report: &str,
            _active_jobs: &[JobRecord],
        ) -> std::result::Result<(), NotifyError> {
            self.record("cancel", subject)
        }
    }

    #[derive(Default)]
    struct MockControl {
        cancelled: Mutex<Vec<String>>,
        reject: Option<String>,
    }

    #[async_trait::async_trait]
    impl SchedulerControl for MockControl {
        async fn cancel(&self, job_id: &str) -> std::result::Result<(), ControlError> {
            if self.reject.as_deref() == Some(job_id) {
                return Err(ControlError::Rejected {
                    program: "scancel".into(),
                    job_id: job_id.into(),
                    status: "exit status: 1".into(),
                    stderr: "Job has already finished".into(),
                });
            }
            self.cancelled.lock().unwrap().push(job_id.to_string());
            Ok(())
        }

        fn control_name(&self) -> &str {
            "mock"
        }
    }

    fn job(
        id: &str,
        user: &str,
        state: JobState,
        hours_ago: Option<i64>,
        gpus: u32,
        hours: u64,
        now: i64,
    ) -> JobRecord {
        JobRecord {
            job_id: id.into(),
            job_name: format!("job-{id}"),
            user: user.into(),
            account: "lab".into(),
            qos: "high".into(),
            partition: "pli-c".into(),
            state,
            gpu_count: gpus,
            elapsed_seconds: hours * 3600,
            start_time: hours_ago.map(|h| now - h * HOUR),
            submission_time: now - 100 * HOUR,
            wall_time_limit: None,
        }
    }

    /// alice: over quota for days, bob: newly over, carol: fine, dave: idle.
    fn cluster(now: i64) -> Vec<JobRecord> {
        vec![
            job("a1", "alice", JobState::Completed, Some(96), 8, 80, now),
            job("a2", "alice", JobState::Running, Some(1), 1, 1, now),
            job("a3", "alice", JobState::Pending, None, 4, 0, now),
            job("b1", "bob", JobState::Completed, Some(72), 4, 100, now),
            job("b2", "bob", JobState::Running, Some(2), 64, 2, now),
            job("c1", "carol", JobState::Running, Some(3), 2, 3, now),
            job("d1", "dave", JobState::Completed, Some(5), 8, 1, now),
        ]
    }

    struct Harness {
        monitor: Monitor,
        notifier: Arc<MockNotifier>,
        control: Arc<MockControl>,
        queries: Arc<AtomicUsize>,
    }

    fn harness(source: MockSource, notifier: MockNotifier, control: MockControl) -> Harness {
        let queries = source.queries.clone();
        let notifier = Arc::new(notifier);
        let control = Arc::new(control);
        let monitor = Monitor::new(
            Arc::new(source),
            notifier.clone(),
            control.clone(),
            MonitorSettings::default(),
        );
        Harness {
            monitor,
            notifier,
            control,
            queries,
        }
    }

    fn source(records: Vec<JobRecord>) -> MockSource {
        MockSource {
            records,
            fail_discovery: false,
            fail_user: None,
            queries: Arc::new(AtomicUsize::new(0)),
        }
    }

    #[tokio::test]
    async fn user_cycle_warns_and_cancels() {
        let now = Utc::now();
        let h = harness(
            source(cluster(now.timestamp())),
            MockNotifier::default(),
            MockControl::default(),
        );

        let report = h.monitor.run_user_cycle(&now).await.unwrap();

        let names: Vec<String> = report.subjects.iter().map(|s| s.subject.name()).collect();
        assert_eq!(names, vec!["alice", "bob", "carol"]);
        assert_eq!(report.count(EnforcementState::Cancel), 1);
        assert_eq!(report.count(EnforcementState::Warn), 1);
        assert_eq!(report.count(EnforcementState::Ok), 1);

        let sent = h.notifier.sent.lock().unwrap().clone();
        assert_eq!(
            sent,
            vec![
                ("cancel".to_string(), "alice".to_string()),
                ("warn".to_string(), "bob".to_string()),
            ]
        );
        assert_eq!(*h.control.cancelled.lock().unwrap(), vec!["a2", "a3"]);
        assert_eq!(report.cancelled_jobs(), vec!["a2", "a3"]);
        // One discovery query plus one per active user.
        assert_eq!(h.queries.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn assessment_carries_report_and_forecast() {
        let now = Utc::now();
        let h = harness(
            source(cluster(now.timestamp())),
            MockNotifier::default(),
            MockControl::default(),
        );

        let assessment = h
            .monitor
            .assess(&h.monitor.user_subject("bob"), &now)
            .await
            .unwrap();
        assert_eq!(assessment.evaluation.used, 528.0);
        assert_eq!(assessment.evaluation.state, EnforcementState::Warn);
        assert_eq!(assessment.forecast.as_ref().map(Vec::len), Some(4));
        assert!(assessment.report.contains("User: bob"));
        let active: Vec<&str> = assessment.active_jobs.iter().map(|j| j.job_id.as_str()).collect();
        assert_eq!(active, vec!["b2"]);
        assert!(h.notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn discovery_failure_aborts_cycle() {
        let now = Utc::now();
        let mut src = source(cluster(now.timestamp()));
        src.fail_discovery = true;
        let h = harness(src, MockNotifier::default(), MockControl::default());

        assert!(h.monitor.run_user_cycle(&now).await.is_err());
        assert!(h.notifier.sent.lock().unwrap().is_empty());
        assert!(h.control.cancelled.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn subject_fetch_failure_is_unknown_not_ok() {
        let now = Utc::now();
        let mut src = source(cluster(now.timestamp()));
        src.fail_user = Some("alice".into());
        let h = harness(src, MockNotifier::default(), MockControl::default());

        let report = h.monitor.run_user_cycle(&now).await.unwrap();
        assert_eq!(report.unknown(), 1);
        match &report.subjects[0].outcome {
            SubjectOutcome::Unknown { reason } => assert!(reason.contains("slurmdbd unreachable")),
            other => panic!("expected Unknown, got {:?}", other),
        }
        // alice was skipped entirely; bob still warned.
        assert!(h.control.cancelled.lock().unwrap().is_empty());
        assert_eq!(h.notifier.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn notifier_failure_does_not_stop_cancellation() {
        let now = Utc::now();
        let notifier = MockNotifier {
            should_fail: true,
            ..Default::default()
        };
        let h = harness(source(cluster(now.timestamp())), notifier, MockControl::default());

        let report = h.monitor.run_user_cycle(&now).await.unwrap();
        let alice = &report.subjects[0];
        assert!(matches!(alice.actions()[0], Action::CancelNoticeFailed { .. }));
        assert_eq!(alice.actions().len(), 3);
        assert!(matches!(report.subjects[1].actions()[0], Action::WarnFailed { .. }));
        assert_eq!(*h.control.cancelled.lock().unwrap(), vec!["a2", "a3"]);
    }

    #[tokio::test]
    async fn rejected_cancel_is_recorded_and_others_proceed() {
        let now = Utc::now();
        let control = MockControl {
            reject: Some("a2".into()),
            ..Default::default()
        };
        let h = harness(source(cluster(now.timestamp())), MockNotifier::default(), control);

        let report = h.monitor.run_user_cycle(&now).await.unwrap();
        let actions = report.subjects[0].actions();
        assert!(matches!(&actions[1], Action::CancelFailed { job_id, .. } if job_id == "a2"));
        assert!(matches!(&actions[2], Action::JobCancelled { job_id } if job_id == "a3"));
        assert_eq!(report.cancelled_jobs(), vec!["a3"]);
    }

    #[tokio::test]
    async fn account_cycle_uses_given_subjects() {
        let now = Utc::now();
        let mut records = cluster(now.timestamp());
        records.push(JobRecord {
            account: "other".into(),
            ..job("o1", "erin", JobState::Running, Some(1), 8, 1, now.timestamp())
        });
        let h = harness(source(records), MockNotifier::default(), MockControl::default());

        let subjects = vec![
            QuotaSubject::account(
                "lab",
                "high",
                1000.0,
                WindowSpec::Anchored {
                    start: now.timestamp() - 200 * HOUR,
                },
            ),
            QuotaSubject::account(
                "other",
                "high",
                100.0,
                WindowSpec::Anchored {
                    start: now.timestamp() - 200 * HOUR,
                },
            ),
        ];
        let report = h.monitor.run_account_cycle(&subjects, &now).await;

        assert_eq!(report.mode, CycleMode::Accounts);
        // lab: 640 + 1 + 400 + 128 + 6 + 8 = 1183 GPU h, over for more than a day.
        assert_eq!(report.subjects[0].state(), Some(EnforcementState::Cancel));
        assert_eq!(report.subjects[1].state(), Some(EnforcementState::Ok));
        assert_eq!(
            *h.control.cancelled.lock().unwrap(),
            vec!["a2", "a3", "b2", "c1"]
        );
    }

    #[tokio::test]
    async fn notices_without_channels_are_recorded_as_skipped() {
        let now = Utc::now();
        let control = Arc::new(MockControl::default());
        let monitor = Monitor::new(
            Arc::new(source(cluster(now.timestamp()))),
            Arc::new(crate::notice::NoticeNotifier::new(
                gpuquota_notify::Dispatcher::empty(),
                "example.edu",
                vec![],
                &["pli-c".to_string()],
            )),
            control.clone(),
            MonitorSettings::default(),
        );

        let report = monitor.run_user_cycle(&now).await.unwrap();
        let alice = report.subjects[0].actions();
        assert_eq!(alice[0], Action::CancelNoticeSkipped);
        assert!(!alice.contains(&Action::CancelNoticeSent));
        assert_eq!(report.subjects[1].actions(), &[Action::WarnSkipped]);
        // Cancellation still proceeds.
        assert_eq!(*control.cancelled.lock().unwrap(), vec!["a2", "a3"]);

        let value = serde_json::to_value(&report.subjects[1].actions()[0]).unwrap();
        assert_eq!(value["action"], "warn_skipped");
    }

    #[tokio::test]
    async fn invalid_quota_is_unknown_and_nothing_is_cancelled() {
        let now = Utc::now();
        let control = Arc::new(MockControl::default());
        let notifier = Arc::new(MockNotifier::default());
        let monitor = Monitor::new(
            Arc::new(source(cluster(now.timestamp()))),
            notifier.clone(),
            control.clone(),
            MonitorSettings {
                quota: -1.0,
                ..MonitorSettings::default()
            },
        );

        let report = monitor.run_user_cycle(&now).await.unwrap();
        assert_eq!(report.unknown(), report.subjects.len());
        assert!(notifier.sent.lock().unwrap().is_empty());
        assert!(control.cancelled.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn repeated_cycles_act_again() {
        let now = Utc::now();
        let h = harness(
            source(cluster(now.timestamp())),
            MockNotifier::default(),
            MockControl::default(),
        );
        h.monitor.run_user_cycle(&now).await.unwrap();
        h.monitor.run_user_cycle(&now).await.unwrap();
        assert_eq!(h.notifier.sent.lock().unwrap().len(), 4);
    }
}
