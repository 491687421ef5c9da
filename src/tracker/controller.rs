use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, RwLock,
};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Utc;
use log::{error, info, warn};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::buffer::{AccumulationBuffer, UrlStat};
use crate::daily::{merge_into_daily, today_key, DailyRecord};
use crate::notify::{BadgeSink, NotificationGate, Notifier};
use crate::policy::{default_categories, Settings};
use crate::state::{hostname_of, is_valid_protocol, TrackingState};
use crate::storage::Storage;

/// Storage key holding the `Settings` object.
pub const SETTINGS_KEY: &str = "settings";
/// Storage key holding the focus-mode boolean.
pub const FOCUS_MODE_KEY: &str = "focusMode";

const TICK_INTERVAL: Duration = Duration::from_secs(1);
/// Buffered seconds reach durable storage at most this often unless a
/// flush is forced.
const SAVE_INTERVAL: Duration = Duration::from_secs(5);

/// Active-tab snapshot delivered by the browser shell.
#[derive(Debug, Clone)]
pub struct TabInfo {
    pub id: i64,
    pub url: Option<String>,
    pub title: Option<String>,
}

/// Synchronous snapshot served to UI collaborators.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveData {
    pub unsaved_data: HashMap<String, UrlStat>,
    pub current_url: Option<String>,
    pub is_window_focused: bool,
}

struct FlushRequest {
    ack: Option<oneshot::Sender<()>>,
}

struct Inner {
    state: Mutex<TrackingState>,
    buffer: Mutex<AccumulationBuffer>,
    settings: RwLock<Settings>,
    focus_mode: AtomicBool,
    gate: Mutex<NotificationGate>,
    last_flush: Mutex<Instant>,
    storage: Arc<dyn Storage>,
    notifier: Arc<dyn Notifier>,
    badge: Arc<dyn BadgeSink>,
}

/// The tracking core: owns the live buffer and tracking state, runs the
/// 1 Hz tick, and hands flush requests to a single-concurrency worker.
///
/// `tick()` and the shell-event handlers only take short lock sections and
/// never suspend while holding one; the flush worker is the only routine
/// that awaits storage I/O. Flushes are serialized by the capacity-1 queue,
/// so two read-merge-write cycles can never race on the same date key.
#[derive(Clone)]
pub struct TrackerController {
    inner: Arc<Inner>,
    flush_tx: mpsc::Sender<FlushRequest>,
    cancel: CancellationToken,
}

impl TrackerController {
    /// Creates the controller and spawns its flush worker. Must be called
    /// from within a tokio runtime.
    pub fn new(
        storage: Arc<dyn Storage>,
        notifier: Arc<dyn Notifier>,
        badge: Arc<dyn BadgeSink>,
    ) -> Self {
        let (flush_tx, flush_rx) = mpsc::channel(1);
        let inner = Arc::new(Inner {
            state: Mutex::new(TrackingState::new()),
            buffer: Mutex::new(AccumulationBuffer::new()),
            settings: RwLock::new(Settings::default()),
            focus_mode: AtomicBool::new(false),
            gate: Mutex::new(NotificationGate::new()),
            last_flush: Mutex::new(Instant::now()),
            storage,
            notifier,
            badge,
        });

        let cancel = CancellationToken::new();
        tokio::spawn(run_flush_worker(inner.clone(), flush_rx, cancel.clone()));

        Self {
            inner,
            flush_tx,
            cancel,
        }
    }

    /// Loads `settings` and `focusMode` from storage. When the stored
    /// settings carry no categories, the built-in seed table is installed
    /// and persisted back.
    pub async fn load_settings(&self) -> Result<()> {
        let mut settings = match self.inner.storage.get(SETTINGS_KEY).await? {
            Some(value) => serde_json::from_value(value).unwrap_or_else(|err| {
                warn!("stored settings undecodable, starting from defaults: {err}");
                Settings::default()
            }),
            None => Settings::default(),
        };

        if settings.categories.is_empty() {
            settings.categories = default_categories();
            let value = serde_json::to_value(&settings).context("encode seeded settings")?;
            self.inner
                .storage
                .set(SETTINGS_KEY, value)
                .await
                .context("persist seeded settings")?;
            info!("seeded default category table");
        }

        if let Some(Value::Bool(on)) = self.inner.storage.get(FOCUS_MODE_KEY).await? {
            self.inner.focus_mode.store(on, Ordering::Relaxed);
        }

        *self.inner.settings.write().unwrap() = settings;
        self.update_badge();
        Ok(())
    }

    /// Spawns the 1 Hz ticker. Stops when `shutdown()` cancels it.
    pub fn spawn_ticker(&self) -> JoinHandle<()> {
        let controller = self.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let mut interval = time::interval(TICK_INTERVAL);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = interval.tick() => controller.tick(),
                    _ = cancel.cancelled() => break,
                }
            }
        })
    }

    /// One attribution step. Synchronous: completes fully before the next
    /// scheduled tick can run.
    pub fn tick(&self) {
        let (url, title) = {
            let state = self.inner.state.lock().unwrap();
            if !state.is_window_focused || state.current_tab_id.is_none() {
                return;
            }
            match &state.current_url {
                Some(url) if is_valid_protocol(url) => (url.clone(), state.current_title.clone()),
                _ => return,
            }
        };

        let hostname = hostname_of(&url);
        {
            let settings = self.inner.settings.read().unwrap();
            if settings.is_blacklisted(&hostname) {
                return;
            }

            self.inner.buffer.lock().unwrap().record_tick(
                &url,
                title.as_deref(),
                Utc::now().timestamp_millis(),
            );

            if self.inner.focus_mode.load(Ordering::Relaxed) {
                self.inner.gate.lock().unwrap().check_focus_violation(
                    &hostname,
                    &settings,
                    self.inner.notifier.as_ref(),
                );
            }
        }

        self.update_badge();

        if self.inner.last_flush.lock().unwrap().elapsed() >= SAVE_INTERVAL {
            self.request_flush();
        }
    }

    /// Fire-and-forget flush. A full queue means a flush is already
    /// pending, in which case the request is dropped.
    fn request_flush(&self) {
        let _ = self.flush_tx.try_send(FlushRequest { ack: None });
    }

    /// Runs one full flush cycle and resolves when it completes. Internal
    /// flush failures are recovered (merge-back) and never surface here.
    pub async fn force_save(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self
            .flush_tx
            .send(FlushRequest { ack: Some(ack_tx) })
            .await
            .is_ok()
        {
            let _ = ack_rx.await;
        }
    }

    /// Snapshot of the live buffer and tracking state for UI collaborators.
    pub fn get_live_data(&self) -> LiveData {
        let (current_url, is_window_focused) = {
            let state = self.inner.state.lock().unwrap();
            (state.current_url.clone(), state.is_window_focused)
        };
        LiveData {
            unsaved_data: self.inner.buffer.lock().unwrap().snapshot(),
            current_url,
            is_window_focused,
        }
    }

    pub fn focus_mode(&self) -> bool {
        self.inner.focus_mode.load(Ordering::Relaxed)
    }

    /// Startup snapshot of the active tab. No flush and no focus-warning
    /// reset: nothing has been tracked yet.
    pub fn init_from_tab(&self, tab: Option<TabInfo>) {
        let Some(tab) = tab else { return };
        let Some(url) = tab.url.filter(|u| is_valid_protocol(u)) else {
            return;
        };
        let mut state = self.inner.state.lock().unwrap();
        state.current_tab_id = Some(tab.id);
        state.current_url = Some(url);
        state.current_title = tab.title;
    }

    /// Shell event: a different tab became active. The previous tab's time
    /// is flushed first so the next tick cannot misattribute it.
    pub async fn handle_tab_activated(&self, tab: TabInfo) {
        self.force_save().await;
        self.adopt_tab(tab);
    }

    /// Shell event: the tab's URL or title changed. Only honored for the
    /// currently active tab.
    pub async fn handle_tab_updated(
        &self,
        tab_id: i64,
        is_active: bool,
        url: Option<String>,
        title: Option<String>,
    ) {
        let is_current = {
            let state = self.inner.state.lock().unwrap();
            state.current_tab_id == Some(tab_id)
        };
        if !is_current || !is_active {
            return;
        }

        if let Some(url) = url {
            self.force_save().await;
            if is_valid_protocol(&url) {
                self.inner.gate.lock().unwrap().clear_focus_notified();
                self.inner.state.lock().unwrap().current_url = Some(url);
            } else {
                self.inner.state.lock().unwrap().current_url = None;
            }
        }
        if let Some(title) = title {
            self.inner.state.lock().unwrap().current_title = Some(title);
        }
    }

    /// Shell event: browser window focus changed. `active_tab` carries the
    /// focused window's active tab when focus was gained.
    pub async fn handle_window_focus_changed(&self, focused: bool, active_tab: Option<TabInfo>) {
        self.force_save().await;
        {
            let mut state = self.inner.state.lock().unwrap();
            state.is_window_focused = focused;
        }
        if !focused {
            return;
        }
        if let Some(tab) = active_tab {
            self.adopt_tab(tab);
        }
    }

    /// Best-effort final flush at process suspend.
    pub async fn handle_suspend(&self) {
        self.force_save().await;
    }

    /// Change notification from the storage substrate. Settings are
    /// replaced wholesale (last writer wins); the focus-mode flag also
    /// refreshes the badge.
    pub fn apply_storage_change(&self, key: &str, new_value: Value) {
        match key {
            SETTINGS_KEY => match serde_json::from_value::<Settings>(new_value) {
                Ok(settings) => {
                    *self.inner.settings.write().unwrap() = settings;
                    info!("settings replaced from storage change");
                }
                Err(err) => warn!("ignoring undecodable settings change: {err}"),
            },
            FOCUS_MODE_KEY => {
                if let Value::Bool(on) = new_value {
                    self.inner.focus_mode.store(on, Ordering::Relaxed);
                    self.update_badge();
                }
            }
            _ => {}
        }
    }

    /// Final flush, then stop the ticker and worker.
    pub async fn shutdown(&self) {
        self.force_save().await;
        self.cancel.cancel();
    }

    fn adopt_tab(&self, tab: TabInfo) {
        let url_changed = {
            let mut state = self.inner.state.lock().unwrap();
            match tab.url.filter(|u| is_valid_protocol(u)) {
                Some(url) => {
                    let changed = state.current_url.as_deref() != Some(url.as_str());
                    state.current_tab_id = Some(tab.id);
                    state.current_url = Some(url);
                    state.current_title = tab.title;
                    changed
                }
                None => {
                    state.current_url = None;
                    false
                }
            }
        };
        if url_changed {
            self.inner.gate.lock().unwrap().clear_focus_notified();
        }
    }

    fn update_badge(&self) {
        self.inner
            .badge
            .set_focus_badge(self.inner.focus_mode.load(Ordering::Relaxed));
    }
}

/// Processes flush requests one at a time. The capacity-1 request channel
/// plus this single loop is what guarantees a flush is never re-entered
/// while one is in flight.
async fn run_flush_worker(
    inner: Arc<Inner>,
    mut flush_rx: mpsc::Receiver<FlushRequest>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            request = flush_rx.recv() => {
                let Some(request) = request else { break };
                flush_once(&inner).await;
                if let Some(ack) = request.ack {
                    let _ = ack.send(());
                }
            }
            _ = cancel.cancelled() => {
                // Best effort: drain whatever is buffered before stopping.
                flush_once(&inner).await;
                break;
            }
        }
    }
}

/// One flush cycle: detach the live buffer, read-merge-write today's
/// record, check limits, and on failure merge the detached entries back
/// into whatever buffer is live by then.
async fn flush_once(inner: &Inner) {
    let detached = {
        let mut buffer = inner.buffer.lock().unwrap();
        if buffer.is_empty() {
            return;
        }
        buffer.detach()
    };

    let date_key = today_key();
    match persist(inner, &date_key, &detached).await {
        Ok(()) => {
            *inner.last_flush.lock().unwrap() = Instant::now();
            info!("flushed {} url(s) into {date_key}", detached.len());
        }
        Err(err) => {
            error!("flush into {date_key} failed, restoring buffer: {err:#}");
            inner.buffer.lock().unwrap().merge_back(detached);
        }
    }
}

async fn persist(inner: &Inner, date_key: &str, detached: &HashMap<String, UrlStat>) -> Result<()> {
    let mut daily: DailyRecord = match inner
        .storage
        .get(date_key)
        .await
        .context("read daily record")?
    {
        Some(value) => serde_json::from_value(value).unwrap_or_else(|err| {
            warn!("daily record {date_key} undecodable, starting empty: {err}");
            DailyRecord::default()
        }),
        None => DailyRecord::default(),
    };

    merge_into_daily(&mut daily, detached, Utc::now().timestamp_millis());

    let mut hostnames: Vec<String> = detached.keys().map(|url| hostname_of(url)).collect();
    hostnames.sort();
    hostnames.dedup();
    {
        let settings = inner.settings.read().unwrap();
        let mut gate = inner.gate.lock().unwrap();
        for hostname in &hostnames {
            gate.check_limit(hostname, &daily, &settings, inner.notifier.as_ref());
        }
    }

    let value = serde_json::to_value(&daily).context("encode daily record")?;
    inner
        .storage
        .set(date_key, value)
        .await
        .context("write daily record")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::sync::Mutex as StdMutex;

    use anyhow::bail;
    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::notify::{LIMIT_EXCEEDED_TITLE, FOCUS_WARNING_TITLE};
    use crate::storage::MemoryStorage;

    #[derive(Default)]
    struct RecordingNotifier {
        sent: StdMutex<Vec<String>>,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, title: &str, _message: &str, _priority: u8) {
            self.sent.lock().unwrap().push(title.to_string());
        }
    }

    impl RecordingNotifier {
        fn titles(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }
    }

    struct NoBadge;
    impl BadgeSink for NoBadge {
        fn set_focus_badge(&self, _on: bool) {}
    }

    /// Storage whose writes fail while `fail_sets` is on; reads always work.
    struct FailingStorage {
        inner: MemoryStorage,
        fail_sets: AtomicBool,
    }

    impl FailingStorage {
        fn new() -> Self {
            Self {
                inner: MemoryStorage::new(),
                fail_sets: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl Storage for FailingStorage {
        async fn get(&self, key: &str) -> Result<Option<Value>> {
            self.inner.get(key).await
        }
        async fn set(&self, key: &str, value: Value) -> Result<()> {
            if self.fail_sets.load(Ordering::SeqCst) {
                bail!("storage offline");
            }
            self.inner.set(key, value).await
        }
        async fn remove(&self, key: &str) -> Result<()> {
            self.inner.remove(key).await
        }
    }

    /// Storage whose first write signals entry and then blocks until
    /// released, so a test can run ticks in the middle of a flush.
    struct GatedStorage {
        inner: MemoryStorage,
        entered: StdMutex<Option<oneshot::Sender<()>>>,
        release: StdMutex<Option<oneshot::Receiver<()>>>,
    }

    #[async_trait]
    impl Storage for GatedStorage {
        async fn get(&self, key: &str) -> Result<Option<Value>> {
            self.inner.get(key).await
        }
        async fn set(&self, key: &str, value: Value) -> Result<()> {
            if let Some(tx) = self.entered.lock().unwrap().take() {
                let _ = tx.send(());
            }
            let gate = self.release.lock().unwrap().take();
            if let Some(rx) = gate {
                let _ = rx.await;
            }
            self.inner.set(key, value).await
        }
        async fn remove(&self, key: &str) -> Result<()> {
            self.inner.remove(key).await
        }
    }

    fn tab(id: i64, url: &str, title: &str) -> TabInfo {
        TabInfo {
            id,
            url: Some(url.to_string()),
            title: Some(title.to_string()),
        }
    }

    fn controller_with(storage: Arc<dyn Storage>) -> (TrackerController, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::default());
        let controller = TrackerController::new(storage, notifier.clone(), Arc::new(NoBadge));
        (controller, notifier)
    }

    async fn daily_record(storage: &dyn Storage) -> DailyRecord {
        match storage.get(&today_key()).await.unwrap() {
            Some(value) => serde_json::from_value(value).unwrap(),
            None => DailyRecord::default(),
        }
    }

    // ── tick preconditions ────────────────────────────────────────────────────

    #[tokio::test]
    async fn unfocused_window_never_accrues_time() {
        let (controller, _) = controller_with(Arc::new(MemoryStorage::new()));
        controller.init_from_tab(Some(tab(1, "https://a.com/", "A")));
        controller.handle_window_focus_changed(false, None).await;

        controller.tick();
        assert!(controller.get_live_data().unsaved_data.is_empty());
    }

    #[tokio::test]
    async fn invalid_protocol_is_not_tracked() {
        let (controller, _) = controller_with(Arc::new(MemoryStorage::new()));
        controller.init_from_tab(Some(tab(1, "chrome://extensions", "x")));

        controller.tick();
        assert!(controller.get_live_data().unsaved_data.is_empty());
    }

    #[tokio::test]
    async fn blacklisted_domain_is_not_tracked() {
        let (controller, _) = controller_with(Arc::new(MemoryStorage::new()));
        controller.apply_storage_change(SETTINGS_KEY, json!({ "blacklist": ["a.com"] }));
        controller.init_from_tab(Some(tab(1, "https://a.com/", "A")));

        controller.tick();
        assert!(controller.get_live_data().unsaved_data.is_empty());
    }

    #[tokio::test]
    async fn ticks_accumulate_per_url() {
        let (controller, _) = controller_with(Arc::new(MemoryStorage::new()));
        controller.init_from_tab(Some(tab(1, "https://a.com/", "A")));

        for _ in 0..3 {
            controller.tick();
        }
        let live = controller.get_live_data();
        assert_eq!(live.unsaved_data["https://a.com/"].seconds, 3);
        assert_eq!(live.current_url.as_deref(), Some("https://a.com/"));
    }

    // ── flush ─────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn force_save_moves_buffer_into_todays_record() {
        let storage = Arc::new(MemoryStorage::new());
        let (controller, _) = controller_with(storage.clone());
        controller.init_from_tab(Some(tab(1, "https://a.com/", "A")));

        for _ in 0..10 {
            controller.tick();
        }
        controller.force_save().await;

        let daily = daily_record(storage.as_ref()).await;
        assert_eq!(daily["https://a.com/"].seconds, 10);
        assert_eq!(daily["https://a.com/"].title.as_deref(), Some("A"));
        assert!(controller.get_live_data().unsaved_data.is_empty());
    }

    #[tokio::test]
    async fn repeated_flushes_merge_instead_of_overwriting() {
        let storage = Arc::new(MemoryStorage::new());
        let (controller, _) = controller_with(storage.clone());
        controller.init_from_tab(Some(tab(1, "https://a.com/", "A")));

        for _ in 0..4 {
            controller.tick();
        }
        controller.force_save().await;
        for _ in 0..6 {
            controller.tick();
        }
        controller.force_save().await;

        let daily = daily_record(storage.as_ref()).await;
        assert_eq!(daily["https://a.com/"].seconds, 10);
    }

    #[tokio::test]
    async fn failed_flush_restores_buffer_and_next_flush_recovers() {
        let storage = Arc::new(FailingStorage::new());
        let (controller, _) = controller_with(storage.clone());
        controller.init_from_tab(Some(tab(1, "https://a.com/", "A")));

        storage.fail_sets.store(true, Ordering::SeqCst);
        for _ in 0..3 {
            controller.tick();
        }
        // Resolves despite the write failure; data is merged back.
        controller.force_save().await;
        assert_eq!(
            controller.get_live_data().unsaved_data["https://a.com/"].seconds,
            3
        );
        assert!(daily_record(&storage.inner).await.is_empty());

        storage.fail_sets.store(false, Ordering::SeqCst);
        for _ in 0..2 {
            controller.tick();
        }
        controller.force_save().await;

        // Exactly once per tick, no loss and no double counting.
        let daily = daily_record(&storage.inner).await;
        assert_eq!(daily["https://a.com/"].seconds, 5);
        assert!(controller.get_live_data().unsaved_data.is_empty());
    }

    #[tokio::test]
    async fn ticks_during_flush_stay_out_of_that_write_and_survive() {
        let (entered_tx, entered_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        let storage = Arc::new(GatedStorage {
            inner: MemoryStorage::new(),
            entered: StdMutex::new(Some(entered_tx)),
            release: StdMutex::new(Some(release_rx)),
        });
        let (controller, _) = controller_with(storage.clone());
        controller.init_from_tab(Some(tab(1, "https://a.com/", "A")));

        for _ in 0..10 {
            controller.tick();
        }

        let saver = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.force_save().await })
        };
        entered_rx.await.unwrap();

        // The flush already detached its buffer; these hit the new one.
        for _ in 0..3 {
            controller.tick();
        }
        release_tx.send(()).unwrap();
        saver.await.unwrap();

        let daily = daily_record(&storage.inner).await;
        assert_eq!(daily["https://a.com/"].seconds, 10);
        assert_eq!(
            controller.get_live_data().unsaved_data["https://a.com/"].seconds,
            3
        );
    }

    // ── policy through the flush path ─────────────────────────────────────────

    #[tokio::test]
    async fn domain_limit_overrides_category_limit() {
        let storage = Arc::new(MemoryStorage::new());
        // 9m59s already on record for the day.
        storage
            .set(
                &today_key(),
                json!({ "https://a.com/x": { "seconds": 599, "title": "A", "lastVisit": 0 } }),
            )
            .await
            .unwrap();

        let (controller, notifier) = controller_with(storage.clone());
        controller.apply_storage_change(
            SETTINGS_KEY,
            json!({
                "limits": { "a.com": 10 },
                "categories": { "a.com": "Video" },
                "categoryLimits": { "Video": 60 }
            }),
        );
        controller.init_from_tab(Some(tab(1, "https://a.com/x", "A")));

        controller.tick();
        controller.force_save().await;

        // 600 s = 10 min: the 10-minute domain limit fires, not the
        // 60-minute category limit.
        assert_eq!(notifier.titles(), vec![LIMIT_EXCEEDED_TITLE.to_string()]);

        controller.tick();
        controller.force_save().await;
        assert_eq!(notifier.titles().len(), 1, "limit warning fires once per run");
    }

    #[tokio::test]
    async fn focus_warning_fires_once_per_visit_and_refires_after_navigation() {
        let (controller, notifier) = controller_with(Arc::new(MemoryStorage::new()));
        controller.apply_storage_change(
            SETTINGS_KEY,
            json!({
                "categories": { "work.com": "Work" },
                "forWorkCategories": ["Work"]
            }),
        );
        controller.apply_storage_change(FOCUS_MODE_KEY, json!(true));
        controller.init_from_tab(Some(tab(1, "https://fun.com/", "Fun")));

        controller.tick();
        controller.tick();
        assert_eq!(notifier.titles(), vec![FOCUS_WARNING_TITLE.to_string()]);

        // Navigating to a work domain clears the per-visit set and warns
        // nothing.
        controller
            .handle_tab_updated(1, true, Some("https://work.com/".into()), None)
            .await;
        controller.tick();
        assert_eq!(notifier.titles().len(), 1);

        // Coming back to the non-work domain warns again.
        controller
            .handle_tab_updated(1, true, Some("https://fun.com/".into()), None)
            .await;
        controller.tick();
        assert_eq!(notifier.titles().len(), 2);
    }

    // ── shell events and settings ─────────────────────────────────────────────

    #[tokio::test]
    async fn tab_activation_flushes_previous_tab_time() {
        let storage = Arc::new(MemoryStorage::new());
        let (controller, _) = controller_with(storage.clone());
        controller.init_from_tab(Some(tab(1, "https://a.com/", "A")));

        for _ in 0..2 {
            controller.tick();
        }
        controller
            .handle_tab_activated(tab(2, "https://b.com/", "B"))
            .await;

        let daily = daily_record(storage.as_ref()).await;
        assert_eq!(daily["https://a.com/"].seconds, 2);

        controller.tick();
        assert_eq!(
            controller.get_live_data().unsaved_data["https://b.com/"].seconds,
            1
        );
    }

    #[tokio::test]
    async fn updates_for_inactive_or_other_tabs_are_ignored() {
        let (controller, _) = controller_with(Arc::new(MemoryStorage::new()));
        controller.init_from_tab(Some(tab(1, "https://a.com/", "A")));

        controller
            .handle_tab_updated(99, true, Some("https://b.com/".into()), None)
            .await;
        controller
            .handle_tab_updated(1, false, Some("https://c.com/".into()), None)
            .await;

        assert_eq!(
            controller.get_live_data().current_url.as_deref(),
            Some("https://a.com/")
        );
    }

    #[tokio::test]
    async fn navigating_to_invalid_url_stops_tracking() {
        let (controller, _) = controller_with(Arc::new(MemoryStorage::new()));
        controller.init_from_tab(Some(tab(1, "https://a.com/", "A")));

        controller
            .handle_tab_updated(1, true, Some("chrome://settings".into()), None)
            .await;
        controller.tick();
        assert!(controller.get_live_data().unsaved_data.is_empty());
    }

    #[tokio::test]
    async fn load_settings_seeds_default_categories_once() {
        let storage = Arc::new(MemoryStorage::new());
        let (controller, _) = controller_with(storage.clone());

        controller.load_settings().await.unwrap();

        let stored: Settings =
            serde_json::from_value(storage.get(SETTINGS_KEY).await.unwrap().unwrap()).unwrap();
        assert!(!stored.categories.is_empty());
        assert_eq!(
            stored.categories.get("youtube.com").map(String::as_str),
            Some("Video")
        );
    }

    #[tokio::test]
    async fn load_settings_keeps_existing_categories() {
        let storage = Arc::new(MemoryStorage::new());
        storage
            .set(SETTINGS_KEY, json!({ "categories": { "a.com": "Mine" } }))
            .await
            .unwrap();
        let (controller, _) = controller_with(storage.clone());

        controller.load_settings().await.unwrap();

        let stored: Settings =
            serde_json::from_value(storage.get(SETTINGS_KEY).await.unwrap().unwrap()).unwrap();
        assert_eq!(stored.categories.len(), 1);
    }

    #[tokio::test]
    async fn focus_mode_hot_reloads_from_storage_change() {
        let (controller, _) = controller_with(Arc::new(MemoryStorage::new()));
        assert!(!controller.focus_mode());
        controller.apply_storage_change(FOCUS_MODE_KEY, json!(true));
        assert!(controller.focus_mode());
        controller.apply_storage_change(FOCUS_MODE_KEY, json!(false));
        assert!(!controller.focus_mode());
    }

    #[tokio::test]
    async fn shutdown_flushes_remaining_seconds() {
        let storage = Arc::new(MemoryStorage::new());
        let (controller, _) = controller_with(storage.clone());
        controller.init_from_tab(Some(tab(1, "https://a.com/", "A")));

        controller.tick();
        controller.shutdown().await;

        let daily = daily_record(storage.as_ref()).await;
        assert_eq!(daily["https://a.com/"].seconds, 1);
    }
}
