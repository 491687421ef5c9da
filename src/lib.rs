//! Per-tab web activity time tracking core.
//!
//! A 1 Hz tick attributes seconds to the currently focused, valid tab and
//! buffers them in memory; a single-concurrency flush worker periodically
//! merges the buffer into per-day durable storage without ever losing
//! ticks that race the flush. Blacklist, daily-limit, and focus-mode
//! policy is evaluated against the accumulating data.
//!
//! The browser shell, the durable key-value substrate, and the user
//! notification surface are external collaborators behind the
//! [`Storage`], [`Notifier`], and [`BadgeSink`] traits.

mod buffer;
mod daily;
mod notify;
mod policy;
mod state;
mod storage;
mod tracker;

pub use buffer::{AccumulationBuffer, UrlStat};
pub use daily::{date_key, merge_into_daily, seconds_for_hostname, today_key, DailyRecord};
pub use notify::{
    BadgeSink, LogNotifier, NoopBadge, NotificationGate, Notifier, FOCUS_WARNING_TITLE,
    LIMIT_EXCEEDED_TITLE,
};
pub use policy::{default_categories, Settings, UNCATEGORIZED};
pub use state::{hostname_of, is_valid_protocol, TrackingState, DIAGNOSTIC_PAGE_FRAGMENT};
pub use storage::{MemoryStorage, Storage};
pub use tracker::{LiveData, TabInfo, TrackerController, FOCUS_MODE_KEY, SETTINGS_KEY};

/// Initializes logging from the `RUST_LOG` environment, defaulting to info.
pub fn init_logging() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();
}
