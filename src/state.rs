use url::Url;

/// Internal diagnostics page that is tracked despite not being http(s).
pub const DIAGNOSTIC_PAGE_FRAGMENT: &str = "console.html";

/// What the browser shell last told us about the active tab and window.
/// Mutated only by the shell-event handlers, read by `tick()`.
#[derive(Debug, Clone)]
pub struct TrackingState {
    pub current_url: Option<String>,
    pub current_tab_id: Option<i64>,
    pub current_title: Option<String>,
    pub is_window_focused: bool,
}

impl Default for TrackingState {
    fn default() -> Self {
        Self {
            current_url: None,
            current_tab_id: None,
            current_title: None,
            is_window_focused: true,
        }
    }
}

impl TrackingState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Only http(s) URLs accrue time, with one allowance for the internal
/// diagnostics page.
pub fn is_valid_protocol(url: &str) -> bool {
    if url.contains(DIAGNOSTIC_PAGE_FRAGMENT) {
        return true;
    }
    url.starts_with("http://") || url.starts_with("https://")
}

/// Hostname of `url`, falling back to the raw string when it does not
/// parse. Malformed URLs are never fatal.
pub fn hostname_of(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => parsed
            .host_str()
            .map(str::to_string)
            .unwrap_or_else(|| url.to_string()),
        Err(_) => url.to_string(),
    }
}
