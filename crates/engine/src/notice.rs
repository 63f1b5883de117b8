//! [`QuotaNotifier`] backed by the notice dispatcher.

use chrono::Local;

use gpuquota_core::{JobRecord, QuotaSubject, SubjectKind};
use gpuquota_notify::{Dispatcher, NoticeContext, NoticeJob, NoticeKind, NotifyError};

use crate::monitor::QuotaNotifier;
use crate::report::format_timestamp;

/// Addresses notices and hands them to a [`Dispatcher`].
///
/// User notices go to `<user>@<email_domain>`; account notices go to the
/// admin list. Admins are Bcc'd on everything by the email channel.
pub struct NoticeNotifier {
    dispatcher: Dispatcher,
    email_domain: String,
    admin_emails: Vec<String>,
    partitions: String,
}

impl NoticeNotifier {
    pub fn new(
        dispatcher: Dispatcher,
        email_domain: impl Into<String>,
        admin_emails: Vec<String>,
        partitions: &[String],
    ) -> Self {
        Self {
            dispatcher,
            email_domain: email_domain.into(),
            admin_emails,
            partitions: if partitions.is_empty() {
                "all partitions".to_string()
            } else {
                partitions.join(",")
            },
        }
    }

    pub fn recipients(&self, subject: &QuotaSubject) -> Vec<String> {
        match &subject.kind {
            SubjectKind::User { name } if !self.email_domain.is_empty() => {
                vec![format!("{}@{}", name, self.email_domain)]
            }
            SubjectKind::User { .. } => Vec::new(),
            SubjectKind::Account { .. } => self.admin_emails.clone(),
        }
    }

    fn context(
        &self,
        kind: NoticeKind,
        subject: &QuotaSubject,
        report: &str,
        active_jobs: &[JobRecord],
    ) -> NoticeContext {
        NoticeContext {
            kind,
            subject_key: subject.name(),
            subject_label: subject.to_string(),
            recipients: self.recipients(subject),
            partitions: self.partitions.clone(),
            grace_hours: subject.grace_hours,
            report: report.to_string(),
            jobs: active_jobs.iter().map(notice_job).collect(),
            timestamp: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

fn notice_job(job: &JobRecord) -> NoticeJob {
    NoticeJob {
        job_id: job.job_id.clone(),
        job_name: job.job_name.clone(),
        user: job.user.clone(),
        state: job.state.to_string(),
        partition: job.partition.clone(),
        gpu_count: job.gpu_count,
        start_time: job
            .start_time
            .map(format_timestamp)
            .unwrap_or_else(|| "pending".to_string()),
    }
}

#[async_trait::async_trait]
impl QuotaNotifier for NoticeNotifier {
    async fn warn(
        &self,
        subject: &QuotaSubject,
        report: &str,
        active_jobs: &[JobRecord],
    ) -> Result<(), NotifyError> {
        let ctx = self.context(NoticeKind::Warning, subject, report, active_jobs);
        self.dispatcher.notify(&ctx).await.map(|_| ())
    }

    async fn cancel_notice(
        &self,
        subject: &QuotaSubject,
        report: &str,
        active_jobs: &[JobRecord],
    ) -> Result<(), NotifyError> {
        let ctx = self.context(NoticeKind::Cancellation, subject, report, active_jobs);
        self.dispatcher.notify(&ctx).await.map(|_| ())
    }
}
