//! Window bookkeeping, the background worker, and bracket queries.
//!
//! Locking rule: `state` guards slot bookkeeping only. It is never held
//! across an `.await`, a download, a decode, or an interpolator build.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::config::WindowConfig;
use common::{Blend, Error, GeoPoint, Result};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::field::{ForecastField, ForecastLoader};
use crate::slot::{Slot, SlotInfo, SlotState};

type SampleOf<L> = <<L as ForecastLoader>::Field as ForecastField>::Sample;
type SharedOf<L> = <<L as ForecastLoader>::Field as ForecastField>::Shared;

#[derive(Debug, Clone)]
pub struct WindowSettings {
    /// Slots in the window (N).
    pub hours: usize,
    /// Slots queued on initialize (P).
    pub priority_hours: usize,
    pub preload_margin: chrono::Duration,
    pub load_throttle: Duration,
    pub idle_poll: Duration,
    pub stop_timeout: Duration,
}

impl WindowSettings {
    pub fn from_config(cfg: &WindowConfig) -> Self {
        Self {
            hours: cfg.hours,
            priority_hours: cfg.priority_hours,
            preload_margin: chrono::Duration::milliseconds(
                (cfg.preload_margin_hours * 3_600_000.0) as i64,
            ),
            load_throttle: Duration::from_secs_f64(cfg.load_throttle_secs.max(0.0)),
            idle_poll: Duration::from_millis(cfg.idle_poll_ms),
            stop_timeout: Duration::from_millis(cfg.stop_timeout_ms),
        }
    }
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self::from_config(&WindowConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoadProgress {
    pub loaded: usize,
    pub total: usize,
    pub loading: bool,
}

struct WindowState<F: ForecastField> {
    slots: VecDeque<Slot<F>>,
    /// Pending hour indices, FIFO.
    queue: VecDeque<u64>,
    loaded_count: usize,
    /// First artifact published by any loaded hour this session.
    shared: Option<F::Shared>,
    /// Hour indices are never reused, so a stale load can't land in a new slot.
    next_index: u64,
}

struct Job<S> {
    hour_index: u64,
    valid_time: DateTime<Utc>,
    shared: Option<S>,
}

/// Cooperative stop signal for one worker.
#[derive(Default)]
struct StopToken {
    flag: AtomicBool,
    notify: Notify,
}

impl StopToken {
    fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
        // notify_one leaves a permit if the worker is not parked yet.
        self.notify.notify_one();
    }

    fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Sleep for `d`, returning early on cancel.
    async fn pause(&self, d: Duration) {
        if self.is_cancelled() {
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(d) => {}
            _ = self.notify.notified() => {}
        }
    }
}

struct Worker {
    handle: JoinHandle<()>,
    token: Arc<StopToken>,
}

struct Inner<L: ForecastLoader> {
    name: String,
    loader: L,
    settings: WindowSettings,
    state: Mutex<WindowState<L::Field>>,
}

/// Generic sliding forecast window. One instance per field type.
pub struct ForecastWindowManager<L: ForecastLoader> {
    inner: Arc<Inner<L>>,
    worker: Mutex<Option<Worker>>,
}

impl<L: ForecastLoader> ForecastWindowManager<L> {
    pub fn new(name: impl Into<String>, loader: L, settings: WindowSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                loader,
                settings,
                state: Mutex::new(WindowState {
                    slots: VecDeque::new(),
                    queue: VecDeque::new(),
                    loaded_count: 0,
                    shared: None,
                    next_index: 0,
                }),
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn loader(&self) -> &L {
        &self.inner.loader
    }

    pub fn settings(&self) -> &WindowSettings {
        &self.inner.settings
    }

    /// Lay out N empty hourly slots from `start_time`, queue the first P,
    /// and start the worker if it is not already running.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn initialize(&self, start_time: DateTime<Utc>) {
        let n = self.inner.settings.hours;
        let p = self.inner.settings.priority_hours.min(n);
        {
            let mut state = self.inner.state.lock();
            let base = state.next_index;
            state.slots = (0..n)
                .map(|i| Slot::empty(base + i as u64, start_time + chrono::Duration::hours(i as i64)))
                .collect();
            state.queue = (0..p).map(|i| base + i as u64).collect();
            state.loaded_count = 0;
            state.next_index = base + n as u64;
        }
        info!(
            "{} window initialized: {} hours from {} ({} priority)",
            self.inner.name,
            n,
            start_time.format("%Y-%m-%d %H:%M"),
            p
        );

        let mut worker = self.worker.lock();
        let running = worker.as_ref().is_some_and(|w| !w.handle.is_finished());
        if !running {
            let token = Arc::new(StopToken::default());
            let handle = tokio::spawn(run_worker(Arc::clone(&self.inner), Arc::clone(&token)));
            *worker = Some(Worker { handle, token });
        }
    }

    /// Slide forward one hour once less than the preload margin remains
    /// before the last slot. Returns true if the window moved.
    pub fn update_window(&self, current_time: DateTime<Utc>) -> bool {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        let Some(last) = state.slots.back() else {
            return false;
        };
        if last.valid_time - current_time >= self.inner.settings.preload_margin {
            return false;
        }

        let new_time = last.valid_time + chrono::Duration::hours(1);
        if let Some(evicted) = state.slots.pop_front() {
            if evicted.ready().is_some() {
                state.loaded_count = state.loaded_count.saturating_sub(1);
            }
            debug!(
                "{} evicted hour {}",
                self.inner.name,
                evicted.valid_time.format("%Y-%m-%d %H:%M")
            );
        }
        let idx = state.next_index;
        state.next_index += 1;
        state.slots.push_back(Slot::empty(idx, new_time));
        state.queue.push_back(idx);
        info!(
            "{} window slid: added {}",
            self.inner.name,
            new_time.format("%Y-%m-%d %H:%M")
        );
        true
    }

    /// Blend the Ready slots bracketing `query_time` at one point.
    /// `None` when no slot is Ready yet.
    pub fn get_value(&self, query_time: DateTime<Utc>, lat: f64, lon: f64) -> Option<SampleOf<L>> {
        let (before, after) = self.bracket(query_time);
        match (before, after) {
            (Some((bt, b)), Some((at, a))) => {
                let fraction = fraction_between(bt, at, query_time);
                Some(b.sample(lat, lon).blend(&a.sample(lat, lon), fraction))
            }
            (Some((_, only)), None) | (None, Some((_, only))) => Some(only.sample(lat, lon)),
            (None, None) => None,
        }
    }

    /// Same bracket as [`get_value`](Self::get_value), one batch query per field.
    pub fn get_value_batch(
        &self,
        query_time: DateTime<Utc>,
        points: &[GeoPoint],
    ) -> Option<Vec<SampleOf<L>>> {
        let (before, after) = self.bracket(query_time);
        match (before, after) {
            (Some((bt, b)), Some((at, a))) => {
                let fraction = fraction_between(bt, at, query_time);
                let early = b.sample_batch(points);
                let late = a.sample_batch(points);
                Some(
                    early
                        .iter()
                        .zip(late.iter())
                        .map(|(e, l)| e.blend(l, fraction))
                        .collect(),
                )
            }
            (Some((_, only)), None) | (None, Some((_, only))) => Some(only.sample_batch(points)),
            (None, None) => None,
        }
    }

    pub fn get_load_progress(&self) -> LoadProgress {
        let state = self.inner.state.lock();
        LoadProgress {
            loaded: state.loaded_count,
            total: state.slots.len(),
            loading: state.loaded_count < state.slots.len(),
        }
    }

    pub fn slots(&self) -> Vec<SlotInfo> {
        self.inner.state.lock().slots.iter().map(Slot::info).collect()
    }

    /// The artifact recorded from the first loaded hour, if any.
    pub fn shared(&self) -> Option<SharedOf<L>> {
        self.inner.state.lock().shared.clone()
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|w| !w.handle.is_finished())
    }

    /// Signal the worker and wait up to the stop timeout. An in-flight load
    /// is not cancelled; past the timeout the worker is detached and exits
    /// after that load completes.
    pub async fn stop(&self) {
        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        worker.token.cancel();
        let timeout = self.inner.settings.stop_timeout;
        match tokio::time::timeout(timeout, worker.handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("{} loader ended abnormally: {}", self.inner.name, e),
            Err(_) => warn!(
                "{} loader still busy after {:?}; detaching",
                self.inner.name, timeout
            ),
        }
    }

    /// Ready fields around `t`: greatest valid_time <= t, least valid_time > t.
    #[allow(clippy::type_complexity)]
    fn bracket(
        &self,
        t: DateTime<Utc>,
    ) -> (
        Option<(DateTime<Utc>, Arc<L::Field>)>,
        Option<(DateTime<Utc>, Arc<L::Field>)>,
    ) {
        let state = self.inner.state.lock();
        let mut before = None;
        let mut after = None;
        for slot in &state.slots {
            let Some(field) = slot.ready() else { continue };
            if slot.valid_time <= t {
                before = Some((slot.valid_time, Arc::clone(field)));
            } else {
                after = Some((slot.valid_time, Arc::clone(field)));
                break;
            }
        }
        (before, after)
    }
}

impl<L: ForecastLoader> Drop for ForecastWindowManager<L> {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            worker.token.cancel();
        }
    }
}

fn fraction_between(before: DateTime<Utc>, after: DateTime<Utc>, t: DateTime<Utc>) -> f64 {
    let span = (after - before).num_milliseconds();
    if span <= 0 {
        return 0.0;
    }
    ((t - before).num_milliseconds() as f64 / span as f64).clamp(0.0, 1.0)
}

// ── Worker ────────────────────────────────────────────────────────────

impl<L: ForecastLoader> Inner<L> {
    /// Pop the next loadable slot and mark it Loading.
    fn next_job(&self) -> Option<Job<SharedOf<L>>> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let mut chosen = None;
        while let Some(idx) = state.queue.pop_front() {
            if state
                .slots
                .iter()
                .any(|s| s.hour_index == idx && s.is_loadable())
            {
                chosen = Some(idx);
                break;
            }
        }
        if chosen.is_none() && state.loaded_count < state.slots.len() {
            chosen = state
                .slots
                .iter()
                .find(|s| s.is_loadable())
                .map(|s| s.hour_index);
        }

        let idx = chosen?;
        let slot = state.slots.iter_mut().find(|s| s.hour_index == idx)?;
        slot.state = SlotState::Loading;
        slot.attempted = true;
        Some(Job {
            hour_index: idx,
            valid_time: slot.valid_time,
            shared: state.shared.clone(),
        })
    }

    /// Locate the slot by hour index (the window may have slid) and publish.
    fn publish(&self, hour_index: u64, valid_time: DateTime<Utc>, result: Result<L::Field>) {
        let mut guard = self.state.lock();
        let WindowState {
            slots,
            loaded_count,
            shared,
            ..
        } = &mut *guard;
        let total = slots.len();
        let slot = slots
            .iter_mut()
            .find(|s| s.hour_index == hour_index && matches!(s.state, SlotState::Loading));

        match result {
            Ok(field) => {
                if shared.is_none() {
                    *shared = field.shared();
                }
                let Some(slot) = slot else {
                    debug!(
                        "{} hour {} left the window while loading; discarded",
                        self.name,
                        valid_time.format("%Y-%m-%d %H:%M")
                    );
                    return;
                };
                slot.state = SlotState::Ready(Arc::new(field));
                *loaded_count += 1;
                info!(
                    "{} forecast {} ready ({}/{})",
                    self.name,
                    valid_time.format("%Y-%m-%d %H:%M"),
                    loaded_count,
                    total
                );
            }
            Err(e) => {
                if let Some(slot) = slot {
                    slot.state = SlotState::Empty;
                }
                warn!(
                    "{} forecast {} failed to load: {}",
                    self.name,
                    valid_time.format("%Y-%m-%d %H:%M"),
                    e
                );
            }
        }
    }
}

async fn run_worker<L: ForecastLoader>(inner: Arc<Inner<L>>, token: Arc<StopToken>) {
    info!("{} loader started", inner.name);

    while !token.is_cancelled() {
        let Some(job) = inner.next_job() else {
            token.pause(inner.settings.idle_poll).await;
            continue;
        };

        debug!(
            "{} loading {}",
            inner.name,
            job.valid_time.format("%Y-%m-%d %H:%M")
        );

        // Own task so a panicking loader can't take the worker down with it.
        let task_inner = Arc::clone(&inner);
        let Job {
            hour_index,
            valid_time,
            shared,
        } = job;
        let load = tokio::spawn(async move { task_inner.loader.load(valid_time, shared).await });
        let result = match load.await {
            Ok(result) => result,
            Err(e) => Err(Error::Other(format!("loader task failed: {}", e))),
        };
        inner.publish(hour_index, valid_time, result);

        token.pause(inner.settings.load_throttle).await;
    }

    info!("{} loader stopped", inner.name);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slot::SlotStatus;
    use chrono::TimeZone;
    use common::WindSample;

    struct FakeField {
        valid: DateTime<Utc>,
        sample: WindSample,
    }

    impl ForecastField for FakeField {
        type Sample = WindSample;
        type Shared = u32;

        fn valid_time(&self) -> DateTime<Utc> {
            self.valid
        }

        fn sample(&self, _lat: f64, lon: f64) -> WindSample {
            // Vary with longitude so batch vs single is a real comparison.
            WindSample::new(self.sample.direction_deg, self.sample.speed_kts + lon.abs() * 0.01)
        }

        fn shared(&self) -> Option<u32> {
            Some(7)
        }
    }

    struct FakeLoader {
        start: DateTime<Utc>,
        samples: Vec<WindSample>,
        fail_hours: Vec<i64>,
        delay: Duration,
        calls: Mutex<Vec<(DateTime<Utc>, Option<u32>)>>,
    }

    impl FakeLoader {
        fn new(start: DateTime<Utc>, samples: Vec<WindSample>) -> Self {
            Self {
                start,
                samples,
                fail_hours: Vec::new(),
                delay: Duration::ZERO,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<(DateTime<Utc>, Option<u32>)> {
            self.calls.lock().clone()
        }
    }

    impl ForecastLoader for FakeLoader {
        type Field = FakeField;

        async fn load(&self, target: DateTime<Utc>, shared: Option<u32>) -> Result<FakeField> {
            self.calls.lock().push((target, shared));
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let h = (target - self.start).num_hours();
            if self.fail_hours.contains(&h) {
                return Err(Error::NoData(format!("hour {h} unavailable")));
            }
            let sample = self
                .samples
                .get(h as usize)
                .copied()
                .unwrap_or(WindSample::new(0.0, h as f64));
            Ok(FakeField {
                valid: target,
                sample,
            })
        }
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 30, 12, 0, 0).unwrap()
    }

    fn settings(hours: usize, priority: usize) -> WindowSettings {
        WindowSettings {
            hours,
            priority_hours: priority,
            preload_margin: chrono::Duration::minutes(30),
            load_throttle: Duration::from_millis(2),
            idle_poll: Duration::from_millis(2),
            stop_timeout: Duration::from_millis(500),
        }
    }

    async fn wait_until(cond: impl Fn() -> bool) -> bool {
        for _ in 0..1000 {
            if cond() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }

    fn winds() -> Vec<WindSample> {
        vec![
            WindSample::new(350.0, 10.0),
            WindSample::new(10.0, 20.0),
            WindSample::new(30.0, 30.0),
        ]
    }

    #[tokio::test]
    async fn test_initialize_lays_out_empty_hourly_slots() {
        let mgr = ForecastWindowManager::new("test", FakeLoader::new(start(), winds()), settings(4, 2));
        mgr.initialize(start());

        let slots = mgr.slots();
        assert_eq!(slots.len(), 4);
        for (i, slot) in slots.iter().enumerate() {
            assert_eq!(slot.valid_time, start() + chrono::Duration::hours(i as i64));
            assert_eq!(slot.status, SlotStatus::Empty);
        }
        assert_eq!(
            mgr.get_load_progress(),
            LoadProgress { loaded: 0, total: 4, loading: true }
        );
        assert!(mgr.get_value(start(), 37.8, -122.4).is_none(), "nothing Ready yet");
        mgr.stop().await;
    }

    #[tokio::test]
    async fn test_progress_reaches_full() {
        let mgr = ForecastWindowManager::new("test", FakeLoader::new(start(), winds()), settings(3, 1));
        mgr.initialize(start());

        let done = wait_until(|| !mgr.get_load_progress().loading).await;
        assert!(done, "window never finished loading");
        let progress = mgr.get_load_progress();
        assert_eq!(progress.loaded, 3);
        assert!(!progress.loading);
        assert!(mgr.slots().iter().all(|s| s.status == SlotStatus::Ready));
        mgr.stop().await;
    }

    #[tokio::test]
    async fn test_progress_is_monotonic() {
        let mut loader = FakeLoader::new(start(), winds());
        loader.delay = Duration::from_millis(10);
        let mgr = ForecastWindowManager::new("test", loader, settings(3, 1));
        mgr.initialize(start());

        let mut last = 0;
        let mut reached_one = false;
        for _ in 0..400 {
            let loaded = mgr.get_load_progress().loaded;
            assert!(loaded >= last, "loaded went from {last} to {loaded}");
            reached_one |= loaded >= 1;
            last = loaded;
            if loaded == 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(reached_one);
        assert_eq!(last, 3);
        mgr.stop().await;
    }

    #[tokio::test]
    async fn test_query_at_valid_time_returns_slot_value() {
        let mgr = ForecastWindowManager::new("test", FakeLoader::new(start(), winds()), settings(3, 3));
        mgr.initialize(start());
        assert!(wait_until(|| !mgr.get_load_progress().loading).await);

        let at = start() + chrono::Duration::hours(1);
        let v = mgr.get_value(at, 37.8, 0.0).unwrap();
        assert!((v.direction_deg - 10.0).abs() < 1e-9);
        assert!((v.speed_kts - 20.0).abs() < 1e-9);
        mgr.stop().await;
    }

    #[tokio::test]
    async fn test_blend_takes_short_path() {
        let mgr = ForecastWindowManager::new("test", FakeLoader::new(start(), winds()), settings(2, 2));
        mgr.initialize(start());
        assert!(wait_until(|| !mgr.get_load_progress().loading).await);

        let mid = start() + chrono::Duration::minutes(30);
        let v = mgr.get_value(mid, 37.8, 0.0).unwrap();
        assert!(v.direction_deg.abs() < 1e-9 || (v.direction_deg - 360.0).abs() < 1e-9, "got {}", v.direction_deg);
        assert!((v.speed_kts - 15.0).abs() < 1e-9);
        mgr.stop().await;
    }

    #[tokio::test]
    async fn test_no_extrapolation_past_last_ready() {
        let mgr = ForecastWindowManager::new("test", FakeLoader::new(start(), winds()), settings(3, 3));
        mgr.initialize(start());
        assert!(wait_until(|| !mgr.get_load_progress().loading).await);

        let late = start() + chrono::Duration::hours(7);
        let v = mgr.get_value(late, 37.8, 0.0).unwrap();
        assert_eq!(v, WindSample::new(30.0, 30.0));

        let early = start() - chrono::Duration::hours(2);
        let v = mgr.get_value(early, 37.8, 0.0).unwrap();
        assert_eq!(v, WindSample::new(350.0, 10.0));
        mgr.stop().await;
    }

    #[tokio::test]
    async fn test_batch_matches_single_queries() {
        let mgr = ForecastWindowManager::new("test", FakeLoader::new(start(), winds()), settings(3, 3));
        mgr.initialize(start());
        assert!(wait_until(|| !mgr.get_load_progress().loading).await);

        let t = start() + chrono::Duration::minutes(75);
        let points = vec![GeoPoint::new(37.8, -122.4), GeoPoint::new(37.7, -122.3)];
        let batch = mgr.get_value_batch(t, &points).unwrap();
        for (p, b) in points.iter().zip(batch.iter()) {
            let single = mgr.get_value(t, p.lat, p.lon).unwrap();
            assert!((single.direction_deg - b.direction_deg).abs() < 1e-9);
            assert!((single.speed_kts - b.speed_kts).abs() < 1e-9);
        }
        mgr.stop().await;
    }

    #[tokio::test]
    async fn test_failed_hour_is_not_retried() {
        let mut loader = FakeLoader::new(start(), winds());
        loader.fail_hours = vec![1];
        let mgr = ForecastWindowManager::new("test", loader, settings(3, 1));
        mgr.initialize(start());

        assert!(wait_until(|| mgr.get_load_progress().loaded == 2).await);
        // Give the worker plenty of idle polls to misbehave.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let hour1 = start() + chrono::Duration::hours(1);
        let attempts = mgr.loader().calls().iter().filter(|(t, _)| *t == hour1).count();
        assert_eq!(attempts, 1);
        let progress = mgr.get_load_progress();
        assert_eq!(progress.loaded, 2);
        assert!(progress.loading);
        let slot1 = &mgr.slots()[1];
        assert_eq!(slot1.status, SlotStatus::Empty);
        assert!(slot1.attempted);

        // Queries bracket across the hole.
        let v = mgr.get_value(hour1, 37.8, 0.0).unwrap();
        assert!((v.speed_kts - 20.0).abs() < 1e-9, "blend of 10 and 30 at the midpoint");
        mgr.stop().await;
    }

    #[tokio::test]
    async fn test_shared_artifact_reaches_later_loads() {
        let mgr = ForecastWindowManager::new("test", FakeLoader::new(start(), winds()), settings(3, 1));
        mgr.initialize(start());
        assert!(wait_until(|| !mgr.get_load_progress().loading).await);

        let calls = mgr.loader().calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].1, None);
        assert!(calls[1..].iter().all(|(_, s)| *s == Some(7)));
        assert_eq!(mgr.shared(), Some(7));
        mgr.stop().await;
    }

    #[tokio::test]
    async fn test_update_window_slides_near_end() {
        let mgr = ForecastWindowManager::new("test", FakeLoader::new(start(), winds()), settings(3, 3));
        mgr.initialize(start());
        assert!(wait_until(|| !mgr.get_load_progress().loading).await);

        // Last slot is start+2h; an hour left is above the margin.
        assert!(!mgr.update_window(start() + chrono::Duration::hours(1)));
        assert!(mgr.update_window(start() + chrono::Duration::minutes(100)));

        let slots = mgr.slots();
        assert_eq!(slots.len(), 3);
        assert_eq!(slots[0].valid_time, start() + chrono::Duration::hours(1));
        assert_eq!(slots[2].valid_time, start() + chrono::Duration::hours(3));
        assert_eq!(slots[2].status, SlotStatus::Empty);
        assert_eq!(mgr.get_load_progress().loaded, 2);

        assert!(wait_until(|| !mgr.get_load_progress().loading).await);
        assert_eq!(mgr.get_load_progress().loaded, 3);
        mgr.stop().await;
    }

    #[tokio::test]
    async fn test_slide_during_load_discards_stale_result() {
        let mut loader = FakeLoader::new(start(), winds());
        loader.delay = Duration::from_millis(80);
        let mgr = ForecastWindowManager::new("test", loader, settings(2, 1));
        mgr.initialize(start());

        assert!(wait_until(|| mgr.slots()[0].status == SlotStatus::Loading).await);
        // Last slot is start+1h; being at it forces a slide that evicts the loading slot.
        assert!(mgr.update_window(start() + chrono::Duration::hours(1)));

        assert!(wait_until(|| !mgr.get_load_progress().loading).await);
        let slots = mgr.slots();
        assert_eq!(slots[0].valid_time, start() + chrono::Duration::hours(1));
        assert_eq!(slots[1].valid_time, start() + chrono::Duration::hours(2));
        assert_eq!(mgr.get_load_progress(), LoadProgress { loaded: 2, total: 2, loading: false });
        mgr.stop().await;
    }

    #[tokio::test]
    async fn test_stop_joins_idle_worker() {
        let mgr = ForecastWindowManager::new("test", FakeLoader::new(start(), winds()), settings(1, 1));
        mgr.initialize(start());
        assert!(wait_until(|| !mgr.get_load_progress().loading).await);
        assert!(mgr.is_running());
        mgr.stop().await;
        assert!(!mgr.is_running());
    }

    #[tokio::test]
    async fn test_stop_is_bounded_during_long_load() {
        let mut loader = FakeLoader::new(start(), winds());
        loader.delay = Duration::from_secs(30);
        let mut s = settings(2, 1);
        s.stop_timeout = Duration::from_millis(50);
        let mgr = ForecastWindowManager::new("test", loader, s);
        mgr.initialize(start());
        assert!(wait_until(|| mgr.slots()[0].status == SlotStatus::Loading).await);

        let began = std::time::Instant::now();
        mgr.stop().await;
        assert!(began.elapsed() < Duration::from_secs(5));
        assert!(!mgr.is_running());
    }

    #[test]
    fn test_fraction_between() {
        let a = start();
        let b = start() + chrono::Duration::hours(1);
        assert_eq!(fraction_between(a, b, a), 0.0);
        assert_eq!(fraction_between(a, b, b), 1.0);
        assert!((fraction_between(a, b, a + chrono::Duration::minutes(15)) - 0.25).abs() < 1e-12);
        assert_eq!(fraction_between(a, a, a), 0.0);
    }
}
