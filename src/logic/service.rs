//! Telemetry Service - producer facade and delivery state machine
//!
//! Owns the event buffer and the persistent cache, wires the scheduler to
//! the reachability probe and the delivery client, and reacts to host
//! lifecycle signals.
//!
//! ```text
//!   Idle ──tick──▶ Probing ──unreachable──▶ Idle
//!                     │
//!                     └─reachable─▶ (replay cache) ─▶ Sending ──▶ Idle
//!
//!   any ──suspend/terminate──▶ Caching ──▶ Idle
//! ```
//!
//! Replay policy: cached batches are placed ahead of live events and the
//! cache is cleared only once a delivery containing them succeeded.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use crate::logic::cache::PersistentCache;
use crate::logic::config::TelemetryConfig;
use crate::logic::delivery::{build_http_client, DeliveryClient, DeliveryOutcome, ReachabilityProbe};
use crate::logic::error::{TelemetryError, TelemetryResult};
use crate::logic::scheduler::Scheduler;
use crate::logic::telemetry::{Event, EventBuffer, Watermark};

// ============================================================================
// PUBLIC TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ServiceState {
    Idle,
    Probing,
    Sending,
    Caching,
}

/// What a single delivery cycle did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Another cycle is still running
    InFlight,
    /// Service is suspended or terminated
    Stopped,
    /// Buffer and cache are empty
    NothingToSend,
    /// Probe failed, nothing was sent
    Unreachable,
    Delivered { events: usize },
    /// Rejected or transport failure, everything retained
    Failed,
    /// Batch could not be encoded and was dropped
    Discarded { events: usize },
}

/// Snapshot for status displays
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub state: ServiceState,
    pub is_running: bool,
    pub buffered: usize,
    pub cache_empty: bool,
    pub cached_events: usize,
    pub delivered_events: u64,
    pub failed_attempts: u64,
    pub evicted_events: u64,
    pub discarded_events: u64,
    pub last_delivery: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

// ============================================================================
// INTERNAL STATE
// ============================================================================

/// Buffer and cache share one lock so eviction, replay and drain are atomic
struct Store {
    buffer: EventBuffer,
    cache: PersistentCache,
    /// Cache lines mirrored by the buffer's replayed prefix
    replayed_lines: usize,
}

impl Store {
    /// Move cached batches in front of the buffer, once per cache generation
    fn replay(&mut self) -> TelemetryResult<usize> {
        if self.buffer.replayed_count() > 0 || self.cache.is_empty()? {
            return Ok(0);
        }

        let (batches, lines) = self.cache.read_all_counted()?;
        let replayed: Vec<Event> = batches.into_iter().flatten().collect();
        if replayed.is_empty() {
            // nothing readable left, drop the unreadable remains
            self.cache.clear()?;
            return Ok(0);
        }

        let count = replayed.len();
        self.buffer.prepend_replayed(replayed);
        self.replayed_lines = lines;
        Ok(count)
    }

    /// Cache lines covered by a snapshot taken at `mark`
    fn lines_covered(&self, mark: &Watermark) -> usize {
        if mark.replayed() > 0 {
            self.replayed_lines
        } else {
            0
        }
    }

    /// Write the in-memory-only part of the buffer as one batch, then clear it
    fn persist_buffer(&mut self) -> TelemetryResult<usize> {
        let pending = self.buffer.unpersisted();
        let count = pending.len();

        self.cache.append(pending)?;
        self.buffer.clear();
        Ok(count)
    }
}

#[derive(Debug, Default)]
struct Stats {
    delivered_events: u64,
    failed_attempts: u64,
    evicted_events: u64,
    discarded_events: u64,
    last_delivery: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleKind {
    /// Cooldown tick: only worth probing when something is buffered
    Flush,
    /// Reachability tick: also picks up a non-empty cache
    Replay,
}

/// Single-flight guard around probe → replay → send
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Returns the state to `Idle` when a cycle ends, also when its future is dropped mid-way
struct IdleOnDrop<'a>(&'a Mutex<ServiceState>);

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        *self.0.lock() = ServiceState::Idle;
    }
}

struct Inner {
    config: TelemetryConfig,
    store: Mutex<Store>,
    client: DeliveryClient,
    probe: ReachabilityProbe,
    scheduler: Mutex<Scheduler>,
    state: Mutex<ServiceState>,
    stats: Mutex<Stats>,
    in_flight: AtomicBool,
    suspended: AtomicBool,
    terminated: AtomicBool,
}

impl Inner {
    fn set_state(&self, state: ServiceState) {
        *self.state.lock() = state;
    }

    fn record_error(&self, err: &TelemetryError) {
        self.stats.lock().last_error = Some(err.to_string());
    }

    fn is_stopped(&self) -> bool {
        self.suspended.load(Ordering::Acquire) || self.terminated.load(Ordering::Acquire)
    }

    async fn run_cycle(&self, kind: CycleKind) -> CycleOutcome {
        if self.is_stopped() {
            return CycleOutcome::Stopped;
        }

        let _guard = match InFlightGuard::acquire(&self.in_flight) {
            Some(guard) => guard,
            None => {
                log::debug!("Delivery already in flight, skipping tick");
                return CycleOutcome::InFlight;
            }
        };
        let _idle = IdleOnDrop(&self.state);

        let has_work = {
            let store = self.store.lock();
            match kind {
                CycleKind::Flush => !store.buffer.is_empty(),
                CycleKind::Replay => {
                    !store.buffer.is_empty() || !store.cache.is_empty().unwrap_or_else(|e| {
                        log::warn!("Cache check failed: {}", e);
                        false
                    })
                }
            }
        };
        if !has_work {
            return CycleOutcome::NothingToSend;
        }

        self.set_state(ServiceState::Probing);
        if !self.probe.check().await {
            log::debug!("Collector unreachable, keeping events for the next cycle");
            return CycleOutcome::Unreachable;
        }

        if self.is_stopped() {
            return CycleOutcome::Stopped;
        }

        let (snapshot, mark, cache_lines) = {
            let mut store = self.store.lock();
            match store.replay() {
                Ok(0) => {}
                Ok(count) => log::info!("Replayed {} cached events ahead of live events", count),
                Err(e) => {
                    log::error!("Cache replay failed: {}", e);
                    self.record_error(&e);
                }
            }
            let mark = store.buffer.watermark();
            (store.buffer.snapshot(), mark, store.lines_covered(&mark))
        };

        if snapshot.is_empty() {
            return CycleOutcome::NothingToSend;
        }

        self.set_state(ServiceState::Sending);
        match self.client.send(&snapshot).await {
            Ok(DeliveryOutcome::Delivered) => {
                self.complete(mark, cache_lines);

                let mut stats = self.stats.lock();
                stats.delivered_events += snapshot.len() as u64;
                stats.last_delivery = Some(Utc::now());
                log::info!("Delivered {} events", snapshot.len());
                CycleOutcome::Delivered { events: snapshot.len() }
            }
            Ok(DeliveryOutcome::Rejected { status, message }) => {
                let err = TelemetryError::Transport(format!("collector answered {}: {}", status, message));
                log::warn!("Delivery of {} events failed: {}", snapshot.len(), err);
                self.stats.lock().failed_attempts += 1;
                self.record_error(&err);
                CycleOutcome::Failed
            }
            Ok(DeliveryOutcome::TransportFailure(cause)) => {
                let err = TelemetryError::Transport(cause);
                log::warn!("Delivery of {} events failed: {}", snapshot.len(), err);
                self.stats.lock().failed_attempts += 1;
                self.record_error(&err);
                CycleOutcome::Failed
            }
            Err(e) => {
                log::error!("Discarding batch of {} events: {}", snapshot.len(), e);
                for event in &snapshot {
                    log::debug!("Discarded event\n{}", event.formatted());
                }
                self.complete(mark, cache_lines);
                self.stats.lock().discarded_events += snapshot.len() as u64;
                self.record_error(&e);
                CycleOutcome::Discarded { events: snapshot.len() }
            }
        }
    }

    /// Drop a finished snapshot from the buffer and the cache lines it replayed.
    ///
    /// Live events moved to the cache while the snapshot was in flight stay
    /// there and may be sent again.
    fn complete(&self, mark: Watermark, cache_lines: usize) {
        let mut store = self.store.lock();

        let removed = store.buffer.remove_delivered(mark);
        log::debug!("Removed {} delivered events from the buffer", removed);

        if let Err(e) = store.cache.remove_front(cache_lines) {
            log::error!("Failed to drop delivered cache lines, events may be sent again: {}", e);
            self.record_error(&e);
        }
    }

    fn persist_buffer(&self, reason: &str) -> TelemetryResult<usize> {
        self.set_state(ServiceState::Caching);
        let result = self.store.lock().persist_buffer();
        self.set_state(ServiceState::Idle);

        match &result {
            Ok(0) => log::debug!("Nothing to cache on {}", reason),
            Ok(count) => log::info!("Cached {} buffered events on {}", count, reason),
            Err(e) => {
                log::error!("Failed to cache buffered events on {}: {}", reason, e);
                self.record_error(e);
            }
        }
        result
    }
}

// ============================================================================
// SERVICE HANDLE
// ============================================================================

/// Cheap-to-clone handle. Timers stop when the last handle is dropped.
#[derive(Clone)]
pub struct TelemetryService {
    inner: Arc<Inner>,
}

impl TelemetryService {
    /// Validate the configuration and build the components. Starts no timers.
    pub fn new(config: TelemetryConfig) -> TelemetryResult<Self> {
        let config = config.validate()?;
        let cache = PersistentCache::open(&config.cache)?;
        Self::with_cache(config, cache)
    }

    /// Same as [`TelemetryService::new`] with an already opened cache
    pub fn with_cache(config: TelemetryConfig, cache: PersistentCache) -> TelemetryResult<Self> {
        let config = config.validate()?;
        let http_client = build_http_client(config.timeout())?;

        let inner = Inner {
            client: DeliveryClient::new(&config.server_url, http_client.clone()),
            probe: ReachabilityProbe::new(&config.server_url, http_client),
            store: Mutex::new(Store {
                buffer: EventBuffer::new(config.max_count),
                cache,
                replayed_lines: 0,
            }),
            scheduler: Mutex::new(Scheduler::new()),
            state: Mutex::new(ServiceState::Idle),
            stats: Mutex::new(Stats::default()),
            in_flight: AtomicBool::new(false),
            suspended: AtomicBool::new(false),
            terminated: AtomicBool::new(false),
            config,
        };

        log::info!(
            "Telemetry service ready: {} (cooldown {}s, max {} events)",
            inner.config.server_url,
            inner.config.cooldown_secs,
            inner.config.max_count
        );

        Ok(Self { inner: Arc::new(inner) })
    }

    /// Build and start in one go
    pub fn launch(config: TelemetryConfig) -> TelemetryResult<Self> {
        let service = Self::new(config)?;
        service.start()?;
        Ok(service)
    }

    /// Start the flush and reachability loops. Must run inside a tokio runtime.
    pub fn start(&self) -> TelemetryResult<()> {
        if self.inner.terminated.load(Ordering::Acquire) {
            return Err(TelemetryError::Configuration("service was terminated".to_string()));
        }
        tokio::runtime::Handle::try_current().map_err(|_| {
            TelemetryError::Configuration("telemetry service must be started inside a tokio runtime".to_string())
        })?;

        let mut scheduler = self.inner.scheduler.lock();
        if scheduler.is_running() {
            return Ok(());
        }
        self.inner.suspended.store(false, Ordering::Release);

        let flush_ref = Arc::downgrade(&self.inner);
        let probe_ref: Weak<Inner> = Arc::downgrade(&self.inner);

        scheduler.start(
            self.inner.config.cooldown(),
            self.inner.config.probe_interval(),
            move || {
                let inner = flush_ref.upgrade();
                async move {
                    if let Some(inner) = inner {
                        inner.run_cycle(CycleKind::Flush).await;
                    }
                }
            },
            move || {
                let inner = probe_ref.upgrade();
                async move {
                    if let Some(inner) = inner {
                        inner.run_cycle(CycleKind::Replay).await;
                    }
                }
            },
        );

        log::info!("Telemetry scheduler started");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.inner.scheduler.lock().is_running()
    }

    // ------------------------------------------------------------------------
    // Producer API
    // ------------------------------------------------------------------------

    /// Track an event. Never fails toward the caller.
    pub fn track_event(&self, kind: impl Into<String>, payload: impl Into<String>) {
        self.track(Event::new(kind, payload));
    }

    pub fn track(&self, event: Event) {
        let mut store = self.inner.store.lock();

        if self.inner.terminated.load(Ordering::Acquire) {
            // no flush will ever run again, go straight to disk
            if let Err(e) = store.cache.append(std::slice::from_ref(&event)) {
                log::error!("Failed to cache event after terminate: {}", e);
                self.inner.record_error(&e);
            }
            return;
        }

        let Store { buffer, cache, .. } = &mut *store;
        match buffer.enqueue(event, |batch| cache.append(batch)) {
            Ok(0) => {}
            Ok(evicted) => {
                log::info!("Buffer full, moved {} events to cache", evicted);
                self.inner.stats.lock().evicted_events += evicted as u64;
            }
            Err(e) => {
                log::error!("Failed to cache full buffer, keeping events in memory: {}", e);
                self.inner.record_error(&e);
            }
        }
    }

    // ------------------------------------------------------------------------
    // Delivery
    // ------------------------------------------------------------------------

    /// Run one full cycle now: probe, replay the cache, send
    pub async fn flush(&self) -> CycleOutcome {
        self.inner.run_cycle(CycleKind::Replay).await
    }

    // ------------------------------------------------------------------------
    // Host lifecycle
    // ------------------------------------------------------------------------

    /// Host is being suspended: stop timers and write the buffer to the cache.
    /// Entirely synchronous.
    pub fn on_suspend(&self) -> TelemetryResult<usize> {
        self.inner.suspended.store(true, Ordering::Release);
        self.inner.scheduler.lock().cancel();
        self.inner.persist_buffer("suspend")
    }

    /// Host came back: restart the loops (the reachability loop replays the cache)
    pub fn on_resume(&self) -> TelemetryResult<()> {
        self.start()
    }

    /// Host is exiting: like suspend, but the service never restarts
    pub fn on_terminate(&self) -> TelemetryResult<usize> {
        self.inner.terminated.store(true, Ordering::Release);
        self.inner.scheduler.lock().cancel();
        self.inner.persist_buffer("terminate")
    }

    /// View/scene transition. Tears the service down unless it persists across views.
    pub fn on_view_change(&self) -> TelemetryResult<usize> {
        if self.inner.config.persist_across_views {
            log::debug!("View changed, service persists");
            return Ok(0);
        }
        self.on_terminate()
    }

    // ------------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------------

    pub fn state(&self) -> ServiceState {
        *self.inner.state.lock()
    }

    pub fn config(&self) -> &TelemetryConfig {
        &self.inner.config
    }

    pub fn buffered_events(&self) -> Vec<Event> {
        self.inner.store.lock().buffer.snapshot()
    }

    pub fn cached_batches(&self) -> TelemetryResult<Vec<Vec<Event>>> {
        self.inner.store.lock().cache.read_all()
    }

    pub fn status(&self) -> ServiceStatus {
        let (buffered, cache_empty, cached_events) = {
            let store = self.inner.store.lock();
            (
                store.buffer.count(),
                store.cache.is_empty().unwrap_or(false),
                store.cache.event_count().unwrap_or(0),
            )
        };
        let stats = self.inner.stats.lock();

        ServiceStatus {
            state: self.state(),
            is_running: self.is_running(),
            buffered,
            cache_empty,
            cached_events,
            delivered_events: stats.delivered_events,
            failed_attempts: stats.failed_attempts,
            evicted_events: stats.evicted_events,
            discarded_events: stats.discarded_events,
            last_delivery: stats.last_delivery,
            last_error: stats.last_error.clone(),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::cache::{CacheConfig, KeyValueBackend, MemoryStore};
    use tempfile::TempDir;

    // nothing listens on port 1
    const DEAD_URL: &str = "http://127.0.0.1:1/events";

    fn memory_service(max_count: usize) -> (TelemetryService, MemoryStore) {
        let store = MemoryStore::new();
        let cache = PersistentCache::with_backend(Box::new(KeyValueBackend::new(store.clone(), "cache")));
        let config = TelemetryConfig::new(DEAD_URL).with_max_count(max_count);
        (TelemetryService::with_cache(config, cache).unwrap(), store)
    }

    #[test]
    fn test_empty_url_fails_construction() {
        let result = TelemetryService::new(TelemetryConfig::new("").with_cache(CacheConfig::Memory));
        assert!(matches!(result, Err(TelemetryError::Configuration(_))));

        let result = TelemetryService::launch(TelemetryConfig::new("").with_cache(CacheConfig::Memory));
        assert!(matches!(result, Err(TelemetryError::Configuration(_))));
    }

    #[test]
    fn test_track_preserves_order() {
        let (service, _) = memory_service(1000);
        let tracked: Vec<Event> = (0..500).map(|i| Event::new("k", format!("{}", i))).collect();

        for e in &tracked {
            service.track(e.clone());
        }

        assert_eq!(service.buffered_events(), tracked);
        assert!(service.cached_batches().unwrap().is_empty());
    }

    #[test]
    fn test_capacity_eviction_to_cache() {
        let (service, _) = memory_service(1000);

        for i in 0..1001 {
            service.track_event("k", format!("{}", i));
        }

        let batches = service.cached_batches().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 1000);
        assert_eq!(batches[0][999].payload(), "999");
        assert_eq!(service.buffered_events(), vec![Event::new("k", "1000")]);
        assert_eq!(service.status().evicted_events, 1000);
    }

    #[test]
    fn test_suspend_drains_buffer() {
        let (service, _) = memory_service(1000);
        for i in 0..5 {
            service.track_event("k", format!("{}", i));
        }

        assert_eq!(service.on_suspend().unwrap(), 5);

        let batches = service.cached_batches().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 5);
        assert!(service.buffered_events().is_empty());
        assert_eq!(service.state(), ServiceState::Idle);
        assert_eq!(service.status().cached_events, 5);
    }

    #[test]
    fn test_suspend_with_empty_buffer_writes_nothing() {
        let (service, _) = memory_service(1000);
        assert_eq!(service.on_suspend().unwrap(), 0);
        assert!(service.cached_batches().unwrap().is_empty());
    }

    #[test]
    fn test_view_change_respects_persistence() {
        let store = MemoryStore::new();
        let cache = PersistentCache::with_backend(Box::new(KeyValueBackend::new(store, "cache")));
        let config = TelemetryConfig::new(DEAD_URL).with_persist_across_views(true);
        let service = TelemetryService::with_cache(config, cache).unwrap();

        service.track_event("k", "v");
        assert_eq!(service.on_view_change().unwrap(), 0);
        assert_eq!(service.buffered_events().len(), 1);

        let (service, _) = memory_service(1000);
        service.track_event("k", "v");
        assert_eq!(service.on_view_change().unwrap(), 1);
        assert!(service.buffered_events().is_empty());
    }

    #[test]
    fn test_track_after_terminate_goes_to_cache() {
        let (service, _) = memory_service(1000);
        service.on_terminate().unwrap();

        service.track_event("late", "event");

        assert!(service.buffered_events().is_empty());
        assert_eq!(service.cached_batches().unwrap(), vec![vec![Event::new("late", "event")]]);
        assert!(service.start().is_err());
    }

    #[test]
    fn test_cache_survives_restart() {
        let dir = TempDir::new().unwrap();
        let cache_config = CacheConfig::File { path: dir.path().join("cache.jsonl") };

        {
            let service =
                TelemetryService::new(TelemetryConfig::new(DEAD_URL).with_cache(cache_config.clone())).unwrap();
            service.track_event("session", "first run");
            service.on_terminate().unwrap();
        }

        let service = TelemetryService::new(TelemetryConfig::new(DEAD_URL).with_cache(cache_config)).unwrap();
        assert_eq!(
            service.cached_batches().unwrap(),
            vec![vec![Event::new("session", "first run")]]
        );
    }

    #[tokio::test]
    async fn test_unreachable_leaves_buffer() {
        let (service, _) = memory_service(1000);
        service.track_event("k", "v");

        assert_eq!(service.flush().await, CycleOutcome::Unreachable);
        assert_eq!(service.buffered_events(), vec![Event::new("k", "v")]);
        assert_eq!(service.state(), ServiceState::Idle);
    }

    #[tokio::test]
    async fn test_nothing_to_send_skips_probe() {
        let (service, _) = memory_service(1000);
        assert_eq!(service.flush().await, CycleOutcome::NothingToSend);
    }

    #[tokio::test]
    async fn test_suspended_service_does_not_cycle() {
        let (service, _) = memory_service(1000);
        service.track_event("k", "v");
        service.on_suspend().unwrap();

        assert_eq!(service.flush().await, CycleOutcome::Stopped);
        assert!(!service.is_running());
    }

    #[tokio::test]
    async fn test_start_and_suspend_cancels_timers() {
        let (service, _) = memory_service(1000);
        service.start().unwrap();
        assert!(service.is_running());

        // idempotent
        service.start().unwrap();

        service.on_suspend().unwrap();
        assert!(!service.is_running());

        service.on_resume().unwrap();
        assert!(service.is_running());
    }

    #[test]
    fn test_oversized_cooldown_fails_construction() {
        let config = TelemetryConfig::new(DEAD_URL)
            .with_cooldown_secs(1e20)
            .with_cache(CacheConfig::Memory);
        assert!(matches!(TelemetryService::launch(config), Err(TelemetryError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_dropped_cycle_resets_state() {
        // Accepts connections and never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let silent = tokio::spawn(async move {
            let mut open = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                open.push(socket);
            }
        });

        let cache = PersistentCache::with_backend(Box::new(KeyValueBackend::new(MemoryStore::new(), "cache")));
        let service =
            TelemetryService::with_cache(TelemetryConfig::new(&format!("http://{}/", addr)), cache).unwrap();
        service.track_event("k", "v");

        let cycle = tokio::spawn({
            let service = service.clone();
            async move { service.flush().await }
        });

        for _ in 0..100_000 {
            if service.state() == ServiceState::Probing {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(service.state(), ServiceState::Probing);

        cycle.abort();
        assert!(cycle.await.is_err());

        assert_eq!(service.state(), ServiceState::Idle);
        assert!(!service.inner.in_flight.load(Ordering::Acquire));
        assert_eq!(service.buffered_events(), vec![Event::new("k", "v")]);

        silent.abort();
    }

    #[test]
    fn test_start_outside_runtime_fails() {
        let (service, _) = memory_service(1000);
        assert!(matches!(service.start(), Err(TelemetryError::Configuration(_))));
    }
}
