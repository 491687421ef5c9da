use std::collections::HashMap;

use regex::RegexBuilder;
use serde::{Deserialize, Serialize};

/// Category assigned to domains that have no explicit mapping.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// User-editable tracking policy. Stored as one JSON object under the
/// `settings` storage key and replaced wholesale when that key changes
/// (last writer wins, no field-level merge).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Hostname rules excluded from tracking, limits, and focus warnings.
    /// Rules may contain `*` wildcards (e.g. `*.example.com`).
    pub blacklist: Vec<String>,
    /// Per-domain daily budget in minutes. Takes precedence over any
    /// category limit for the same domain.
    pub limits: HashMap<String, u32>,
    /// Domain -> category name.
    pub categories: HashMap<String, String>,
    /// Category -> daily budget in minutes.
    pub category_limits: HashMap<String, u32>,
    /// Categories considered "work" while focus mode is on.
    pub for_work_categories: Vec<String>,
}

impl Settings {
    /// Returns true when `hostname` matches any blacklist rule, exactly or
    /// via wildcard. A rule that fails to compile never matches, so a bad
    /// rule can never block tracking.
    pub fn is_blacklisted(&self, hostname: &str) -> bool {
        self.blacklist
            .iter()
            .any(|rule| rule_matches(rule, hostname))
    }

    /// Effective daily limit in minutes for `hostname`, 0 meaning no limit.
    /// A positive domain limit always wins over the category limit, even a
    /// larger one.
    pub fn resolve_limit_minutes(&self, hostname: &str) -> u32 {
        if let Some(&minutes) = self.limits.get(hostname) {
            if minutes > 0 {
                return minutes;
            }
        }
        if let Some(&minutes) = self
            .categories
            .get(hostname)
            .and_then(|cat| self.category_limits.get(cat))
        {
            if minutes > 0 {
                return minutes;
            }
        }
        0
    }

    pub fn category_of(&self, hostname: &str) -> &str {
        self.categories
            .get(hostname)
            .map(String::as_str)
            .unwrap_or(UNCATEGORIZED)
    }

    pub fn is_for_work(&self, hostname: &str) -> bool {
        let category = self.category_of(hostname);
        self.for_work_categories.iter().any(|c| c == category)
    }
}

fn rule_matches(rule: &str, hostname: &str) -> bool {
    if rule == hostname {
        return true;
    }
    if !rule.contains('*') {
        return false;
    }

    // Escape everything, then turn the escaped `*` back into `.*`.
    let pattern = format!("^{}$", regex::escape(rule).replace("\\*", ".*"));
    match RegexBuilder::new(&pattern).case_insensitive(true).build() {
        Ok(re) => re.is_match(hostname),
        Err(_) => false,
    }
}

/// Seed domain -> category table installed when stored settings carry no
/// categories of their own.
pub fn default_categories() -> HashMap<String, String> {
    let table: &[(&str, &str)] = &[
        ("gemini.google.com", "AI"),
        ("chatgpt.com", "AI"),
        ("claude.ai", "AI"),
        ("grok.com", "AI"),
        ("perplexity.ai", "AI"),
        ("facebook.com", "Social"),
        ("instagram.com", "Social"),
        ("threads.com", "Social"),
        ("twitter.com", "Social"),
        ("x.com", "Social"),
        ("reddit.com", "Social"),
        ("linkedin.com", "Social"),
        ("dcard.tw", "Social"),
        ("ptt.cc", "Social"),
        ("youtube.com", "Video"),
        ("netflix.com", "Video"),
        ("twitch.tv", "Video"),
        ("disneyplus.com", "Video"),
        ("tiktok.com", "Video"),
        ("github.com", "Work"),
        ("stackoverflow.com", "Work"),
        ("notion.so", "Work"),
        ("figma.com", "Work"),
        ("docs.google.com", "Work"),
        ("slack.com", "Work"),
        ("amazon.com", "Shopping"),
        ("shopee.tw", "Shopping"),
        ("momo.com.tw", "Shopping"),
        ("yahoo.com", "News"),
        ("ettoday.com", "News"),
        ("www.tvbs.com.tw", "News"),
    ];
    table
        .iter()
        .map(|(domain, category)| (domain.to_string(), category.to_string()))
        .collect()
}
