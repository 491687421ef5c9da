use std::collections::HashSet;

use log::info;

use crate::daily::{seconds_for_hostname, DailyRecord};
use crate::policy::Settings;

pub const FOCUS_WARNING_TITLE: &str = "Focus Mode Alert";
pub const FOCUS_WARNING_MESSAGE: &str = "Focus Mode ON. Avoid:";
pub const LIMIT_EXCEEDED_TITLE: &str = "Time Limit Exceeded";
pub const LIMIT_EXCEEDED_MESSAGE: &str = "Limit reached for:";

/// Fire-and-forget user notifications. No acknowledgment is tracked.
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, message: &str, priority: u8);
}

/// Routes notifications to the log. Stand-in when no shell notifier is
/// attached.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, message: &str, priority: u8) {
        info!("notification [p{priority}] {title}: {message}");
    }
}

/// Receives the focus-mode on/off indicator, e.g. a toolbar badge.
pub trait BadgeSink: Send + Sync {
    fn set_focus_badge(&self, on: bool);
}

pub struct NoopBadge;

impl BadgeSink for NoopBadge {
    fn set_focus_badge(&self, _on: bool) {}
}

/// De-duplicates focus-mode and limit-exceeded warnings so each fires once
/// per domain per state change.
#[derive(Debug, Default)]
pub struct NotificationGate {
    /// Domains already warned about an exceeded limit. Never cleared within
    /// a run; a new local day does not reset it.
    notified_domains: HashSet<String>,
    /// Domains already warned for the current visit. Cleared on every URL
    /// change so the warning re-fires on a renewed visit.
    focus_notified_domains: HashSet<String>,
}

impl NotificationGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear_focus_notified(&mut self) {
        self.focus_notified_domains.clear();
    }

    /// Warns once per visit when a non-work domain is open while focus mode
    /// is on. The caller checks the focus-mode flag; blacklisted domains
    /// never warn.
    pub fn check_focus_violation(
        &mut self,
        hostname: &str,
        settings: &Settings,
        notifier: &dyn Notifier,
    ) {
        if self.focus_notified_domains.contains(hostname) {
            return;
        }
        if settings.is_blacklisted(hostname) {
            return;
        }
        if settings.is_for_work(hostname) {
            return;
        }
        notifier.notify(
            FOCUS_WARNING_TITLE,
            &format!("{FOCUS_WARNING_MESSAGE} {hostname}"),
            2,
        );
        self.focus_notified_domains.insert(hostname.to_string());
    }

    /// Warns once per run when the day's usage for `hostname` crosses its
    /// resolved limit, summed across every URL of that hostname in the
    /// merged daily record.
    pub fn check_limit(
        &mut self,
        hostname: &str,
        daily: &DailyRecord,
        settings: &Settings,
        notifier: &dyn Notifier,
    ) {
        if settings.is_blacklisted(hostname) {
            return;
        }
        let limit_minutes = settings.resolve_limit_minutes(hostname);
        if limit_minutes == 0 {
            return;
        }

        let used_minutes = seconds_for_hostname(daily, hostname) as f64 / 60.0;
        if used_minutes >= f64::from(limit_minutes) && !self.notified_domains.contains(hostname) {
            notifier.notify(
                LIMIT_EXCEEDED_TITLE,
                &format!("{LIMIT_EXCEEDED_MESSAGE} {hostname}"),
                2,
            );
            self.notified_domains.insert(hostname.to_string());
        }
    }
}
