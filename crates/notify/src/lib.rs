//! Quota notices: warnings and cancellation notices for GPU quota overruns.
//!
//! This crate provides:
//! - `Notifier` trait for pluggable delivery channels
//! - Email (SMTP via lettre) and webhook channels
//! - Minijinja notice templates with built-in defaults
//! - Dispatcher that renders a notice once and fans it out to every channel

pub mod dispatcher;
pub mod email;
pub mod notice;
pub mod templating;
pub mod traits;
pub mod webhook;

pub use dispatcher::Dispatcher;
pub use email::EmailNotifier;
pub use notice::{NoticeContext, NoticeJob, NoticeKind};
pub use templating::{NoticeTemplates, TemplateRenderer};
pub use traits::{DispatchResult, Notification, Notifier, NotifyError};
pub use webhook::WebhookNotifier;
