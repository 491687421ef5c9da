use std::collections::HashMap;

use chrono::{Local, NaiveDate};

use crate::buffer::UrlStat;
use crate::state::hostname_of;

/// One calendar day of tracked time, keyed by URL. Persisted under the
/// local-date key; seconds only ever grow via merge.
pub type DailyRecord = HashMap<String, UrlStat>;

/// `YYYY-MM-DD` for `date`. This exact format is the on-disk contract for
/// daily records and must not change.
pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Today's date key from the local wall clock. UTC would drift a day near
/// midnight in non-UTC time zones.
pub fn today_key() -> String {
    date_key(Local::now().date_naive())
}

/// Integrates a detached buffer into `daily`: seconds add, the title is
/// overwritten, and `last_visit` becomes the flush time rather than the
/// tick time.
pub fn merge_into_daily(
    daily: &mut DailyRecord,
    detached: &HashMap<String, UrlStat>,
    flushed_at_ms: i64,
) {
    for (url, stat) in detached {
        let entry = daily.entry(url.clone()).or_insert_with(|| UrlStat {
            seconds: 0,
            title: stat.title.clone(),
            last_visit: 0,
        });
        entry.seconds += stat.seconds;
        entry.title = stat.title.clone();
        entry.last_visit = flushed_at_ms;
    }
}

/// Total seconds recorded for `hostname` across every URL in the record.
pub fn seconds_for_hostname(daily: &DailyRecord, hostname: &str) -> u64 {
    daily
        .iter()
        .filter(|(url, _)| hostname_of(url) == hostname)
        .map(|(_, stat)| stat.seconds)
        .sum()
}
