//! Bounded cache of open cell handlers.
//!
//! [`ElevationCellCache`] maps [`CellId`]s to shared handlers and keeps at most
//! `max_open_cells` of them open. Handlers live in a [`moka::sync::Cache`];
//! lookups of open handlers never take a lock. Creating a handler goes through
//! a single admission mutex that first closes the least recently used cells
//! until the new one fits, so the bound holds at every instant.
//!
//! Cells that fail to open are remembered in a second, TTL-bounded moka cache
//! so repeated queries into a missing or broken cell do not hit the
//! filesystem again until the TTL expires.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use moka::notification::RemovalCause;
use moka::ops::compute::Op;
use moka::policy::EvictionPolicy;
use moka::sync::Cache;

use crate::cell::CellHandler;
use crate::error::{ElevationError, ErrorCategory, Result};
use crate::geo::{CellId, GeoPoint};

/// Upper bound on remembered failures.
const MAX_NEGATIVE_ENTRIES: u64 = 16_384;

/// Lookups a query makes without the admission lock before it runs under it.
const LOCK_FREE_ATTEMPTS: usize = 2;

/// Format-specific knowledge the cache needs: which cell covers a point, and
/// how to open it.
pub trait CellFactory: Send + Sync {
    /// The cell covering `point`, or `None` if no cell can.
    fn cell_id(&self, point: &GeoPoint) -> Option<CellId>;

    /// Resolve, open and validate the cell `id`.
    fn create_cell(&self, id: CellId) -> Result<Arc<dyn CellHandler>>;
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of handlers currently in the cache.
    pub entry_count: u64,
    /// Lookups served by an already-open handler.
    pub hit_count: u64,
    /// Lookups that had to open a cell.
    pub miss_count: u64,
    /// Lookups answered from the failure cache without touching the disk.
    pub negative_hit_count: u64,
    /// Handlers closed because the cache was full.
    pub eviction_count: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0).
    ///
    /// Returns 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hit_count + self.miss_count;
        if total == 0 {
            0.0
        } else {
            self.hit_count as f64 / total as f64
        }
    }
}

type Handler = Arc<dyn CellHandler>;

/// A cached handler and the tick of its last use.
#[derive(Debug)]
struct CachedCell {
    handler: Handler,
    last_used: AtomicU64,
}

/// Thread-safe get-or-create cache of cell handlers.
pub struct ElevationCellCache<F> {
    factory: F,
    cells: Cache<CellId, Arc<CachedCell>>,
    failures: Option<Cache<CellId, ()>>,
    /// Serializes creation and eviction.
    admission: Mutex<()>,
    clock: AtomicU64,
    /// Cell of the most recent lookup, revalidated before reuse.
    last: RwLock<Option<(CellId, Arc<CachedCell>)>>,
    max_open_cells: u64,
    hit_count: AtomicU64,
    miss_count: AtomicU64,
    negative_hit_count: AtomicU64,
    eviction_count: Arc<AtomicU64>,
}

impl<F: CellFactory> ElevationCellCache<F> {
    /// Create a cache holding at most `max_open_cells` open handlers.
    ///
    /// `negative_ttl` controls how long a failed open is remembered; `None` or
    /// a zero duration disables negative caching.
    pub fn new(factory: F, max_open_cells: u64, negative_ttl: Option<Duration>) -> Self {
        let max_open_cells = max_open_cells.max(1);
        let eviction_count = Arc::new(AtomicU64::new(0));

        let evictions = Arc::clone(&eviction_count);
        let cells = Cache::builder()
            .max_capacity(max_open_cells)
            .eviction_policy(EvictionPolicy::lru())
            .eviction_listener(move |id: Arc<CellId>, cell: Arc<CachedCell>, cause| {
                if cause == RemovalCause::Size {
                    evictions.fetch_add(1, Ordering::Relaxed);
                }
                tracing::trace!(id = ?id, ?cause, "cell left the cache");
                cell.handler.close();
            })
            .build();

        let failures = negative_ttl.filter(|ttl| !ttl.is_zero()).map(|ttl| {
            Cache::builder()
                .max_capacity(MAX_NEGATIVE_ENTRIES)
                .time_to_live(ttl)
                .build()
        });

        Self {
            factory,
            cells,
            failures,
            admission: Mutex::new(()),
            clock: AtomicU64::new(0),
            last: RwLock::new(None),
            max_open_cells,
            hit_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
            negative_hit_count: AtomicU64::new(0),
            eviction_count,
        }
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub fn max_open_cells(&self) -> u64 {
        self.max_open_cells
    }

    /// The open handler covering `point`, creating it on first use.
    ///
    /// Returns `None` when no cell covers the point or the cell cannot be
    /// opened.
    pub fn get_or_create(&self, point: &GeoPoint) -> Option<Handler> {
        self.resolve(point).map(|(_, cell)| Arc::clone(&cell.handler))
    }

    /// Run `f` against the handler covering `point`.
    ///
    /// A handler closed by a concurrent eviction is looked up again. After two
    /// such losses the query runs under the admission lock, where nothing can
    /// be evicted, so it completes against either the old or the new state of
    /// the cell. Any other error is logged
    /// and yields `None`; a handler left invalid by it is dropped.
    pub fn query<T, Q>(&self, point: &GeoPoint, f: Q) -> Option<T>
    where
        Q: Fn(&dyn CellHandler) -> Result<T>,
    {
        for _ in 0..LOCK_FREE_ATTEMPTS {
            let (id, cell) = self.resolve(point)?;
            match f(cell.handler.as_ref()) {
                Ok(value) => return Some(value),
                Err(ElevationError::CellClosed { .. }) => {
                    tracing::debug!(id = ?id, "cell closed during query, retrying");
                }
                Err(e) => return self.fail(id, &cell.handler, &e),
            }
        }

        let _admission = self.admit();
        let id = self.factory.cell_id(point)?;
        let cell = self.lookup_admitted(id)?;
        self.remember(id, &cell);
        match f(cell.handler.as_ref()) {
            Ok(value) => Some(value),
            Err(e) => self.fail(id, &cell.handler, &e),
        }
    }

    /// Evict the handler for `id` (closing it) and forget any failure.
    pub fn remove(&self, id: CellId) {
        let _admission = self.admit();
        if let Some(cell) = self.cells.remove(&id) {
            cell.handler.close();
        }
        if let Some(failures) = &self.failures {
            failures.invalidate(&id);
        }
        let mut last = self.last.write().unwrap_or_else(PoisonError::into_inner);
        if matches!(&*last, Some((last_id, _)) if *last_id == id) {
            *last = None;
        }
    }

    /// Close and drop every handler and forget every failure.
    pub fn clear(&self) {
        let _admission = self.admit();
        *self.last.write().unwrap_or_else(PoisonError::into_inner) = None;
        for (_, cell) in self.cells.iter() {
            cell.handler.close();
        }
        self.cells.invalidate_all();
        self.cells.run_pending_tasks();
        if let Some(failures) = &self.failures {
            failures.invalidate_all();
        }
    }

    /// Number of cached handlers that are currently open.
    pub fn open_cell_count(&self) -> usize {
        self.cells
            .iter()
            .filter(|(_, cell)| cell.handler.is_open())
            .count()
    }

    /// Snapshot of the cache counters.
    pub fn stats(&self) -> CacheStats {
        self.cells.run_pending_tasks();
        CacheStats {
            entry_count: self.cells.entry_count(),
            hit_count: self.hit_count.load(Ordering::Relaxed),
            miss_count: self.miss_count.load(Ordering::Relaxed),
            negative_hit_count: self.negative_hit_count.load(Ordering::Relaxed),
            eviction_count: self.eviction_count.load(Ordering::Relaxed),
        }
    }

    fn admit(&self) -> MutexGuard<'_, ()> {
        self.admission.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn resolve(&self, point: &GeoPoint) -> Option<(CellId, Arc<CachedCell>)> {
        let id = self.factory.cell_id(point)?;

        if let Some(cell) = self.last_cell(id, point) {
            self.hit(&cell);
            return Some((id, cell));
        }

        let cell = self.lookup(id)?;
        self.remember(id, &cell);
        Some((id, cell))
    }

    fn last_cell(&self, id: CellId, point: &GeoPoint) -> Option<Arc<CachedCell>> {
        let last = self.last.read().unwrap_or_else(PoisonError::into_inner);
        match &*last {
            Some((last_id, cell))
                if *last_id == id
                    && cell.handler.is_open()
                    && cell.handler.bounds().contains(point) =>
            {
                Some(Arc::clone(cell))
            }
            _ => None,
        }
    }

    fn remember(&self, id: CellId, cell: &Arc<CachedCell>) {
        *self.last.write().unwrap_or_else(PoisonError::into_inner) = Some((id, Arc::clone(cell)));
    }

    fn lookup(&self, id: CellId) -> Option<Arc<CachedCell>> {
        if let Some(cell) = self.cells.get(&id) {
            if cell.handler.is_open() {
                self.hit(&cell);
                return Some(cell);
            }
        }
        if self.is_known_failure(id) {
            return None;
        }

        let _admission = self.admit();
        self.lookup_admitted(id)
    }

    /// Lookup or creation with the admission lock held.
    fn lookup_admitted(&self, id: CellId) -> Option<Arc<CachedCell>> {
        if let Some(cell) = self.cells.get(&id) {
            if cell.handler.is_open() {
                self.hit(&cell);
                return Some(cell);
            }
            tracing::debug!(id = ?id, "dropping unusable cell");
            self.discard(id, &cell.handler);
        }
        if self.is_known_failure(id) {
            return None;
        }

        self.make_room();
        self.miss_count.fetch_add(1, Ordering::Relaxed);
        match self.factory.create_cell(id) {
            Ok(handler) => {
                tracing::debug!(id = ?id, path = %handler.path().display(), "opened cell");
                let cell = Arc::new(CachedCell {
                    handler,
                    last_used: AtomicU64::new(self.tick()),
                });
                self.cells.insert(id, Arc::clone(&cell));
                Some(cell)
            }
            Err(e) => {
                if let Some(failures) = &self.failures {
                    failures.insert(id, ());
                }
                log_failure(id, &e);
                None
            }
        }
    }

    /// Close least recently used cells until one more fits.
    ///
    /// Called with the admission lock held. Victims are closed before they
    /// leave the map, so the open count never exceeds the bound.
    fn make_room(&self) {
        loop {
            let mut count = 0;
            let mut victim: Option<(CellId, Arc<CachedCell>)> = None;
            for (id, cell) in self.cells.iter() {
                count += 1;
                let older = victim.as_ref().map_or(true, |(_, v)| {
                    cell.last_used.load(Ordering::Relaxed) < v.last_used.load(Ordering::Relaxed)
                });
                if older {
                    victim = Some((*id, cell));
                }
            }

            let Some((id, cell)) = victim.filter(|_| count >= self.max_open_cells) else {
                return;
            };
            tracing::debug!(id = ?id, path = %cell.handler.path().display(), "evicting cell");
            cell.handler.close();
            self.cells.invalidate(&id);
            self.eviction_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn is_known_failure(&self, id: CellId) -> bool {
        let known = self
            .failures
            .as_ref()
            .is_some_and(|failures| failures.contains_key(&id));
        if known {
            self.negative_hit_count.fetch_add(1, Ordering::Relaxed);
        }
        known
    }

    fn hit(&self, cell: &CachedCell) {
        self.hit_count.fetch_add(1, Ordering::Relaxed);
        cell.last_used.store(self.tick(), Ordering::Relaxed);
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    fn fail<T>(&self, id: CellId, handler: &Handler, error: &ElevationError) -> Option<T> {
        if !handler.is_valid() {
            self.discard(id, handler);
        }
        log_failure(id, error);
        None
    }

    /// Close `handler` and drop it from the map, unless the entry for `id`
    /// already holds a different handler.
    fn discard(&self, id: CellId, handler: &Handler) {
        handler.close();
        self.cells.entry(id).and_compute_with(|entry| match entry {
            Some(entry) if Arc::ptr_eq(&entry.value().handler, handler) => Op::Remove,
            _ => Op::Nop,
        });
    }
}

fn log_failure(id: CellId, error: &ElevationError) {
    match error.category() {
        ErrorCategory::CoverageMiss => tracing::debug!(id = ?id, %error, "no cell data"),
        _ => tracing::warn!(id = ?id, %error, "cell unusable"),
    }
}

impl<F> std::fmt::Debug for ElevationCellCache<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElevationCellCache")
            .field("max_open_cells", &self.max_open_cells)
            .field("entry_count", &self.cells.entry_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{AccuracyInfo, CellFormat, CellStatus};
    use crate::geo::CellBounds;
    use std::collections::HashSet;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    /// Handlers currently open, and the most ever open at once.
    #[derive(Debug, Default)]
    struct OpenGauge {
        now: AtomicUsize,
        peak: AtomicUsize,
    }

    impl OpenGauge {
        fn opened(&self) {
            let now = self.now.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
        }

        fn closed(&self) {
            self.now.fetch_sub(1, Ordering::SeqCst);
        }

        fn peak(&self) -> usize {
            self.peak.load(Ordering::SeqCst)
        }
    }

    /// In-memory handler whose height is `lat + lon` of its tile corner.
    #[derive(Debug)]
    struct FakeCell {
        path: PathBuf,
        bounds: CellBounds,
        status: Mutex<CellStatus>,
        fail_reads: bool,
        gauge: Arc<OpenGauge>,
        /// Reads that find the cell closed under them, as if evicted mid-query.
        closes_on_read: Arc<AtomicUsize>,
    }

    impl FakeCell {
        fn set(&self, status: CellStatus) {
            let mut current = self.status.lock().unwrap();
            match (*current, status) {
                (CellStatus::Open, CellStatus::Open) => {}
                (CellStatus::Open, _) => self.gauge.closed(),
                (_, CellStatus::Open) => self.gauge.opened(),
                _ => {}
            }
            *current = status;
        }
    }

    impl CellHandler for FakeCell {
        fn format(&self) -> CellFormat {
            CellFormat::Srtm
        }
        fn path(&self) -> &Path {
            &self.path
        }
        fn open(&self) -> Result<()> {
            match self.status() {
                CellStatus::Invalid => Err(ElevationError::CellInvalid {
                    path: self.path.clone(),
                }),
                _ => {
                    self.set(CellStatus::Open);
                    Ok(())
                }
            }
        }
        fn close(&self) {
            if self.status() == CellStatus::Open {
                self.set(CellStatus::Closed);
            }
        }
        fn status(&self) -> CellStatus {
            *self.status.lock().unwrap()
        }
        fn bounds(&self) -> CellBounds {
            self.bounds
        }
        fn size_of_elev_cell(&self) -> (usize, usize) {
            (2, 2)
        }
        fn mean_spacing_meters(&self) -> f64 {
            1.0
        }
        fn post(&self, _row: usize, _col: usize) -> Result<Option<f64>> {
            Ok(Some(self.bounds.min_lat + self.bounds.min_lon))
        }
        fn height_above_msl(&self, _point: &GeoPoint) -> Result<f64> {
            let raced = self
                .closes_on_read
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if raced {
                self.close();
            }
            match self.status() {
                CellStatus::Open if self.fail_reads => {
                    self.set(CellStatus::Invalid);
                    Err(ElevationError::Io(std::io::Error::other("bad sector")))
                }
                CellStatus::Open => Ok(self.bounds.min_lat + self.bounds.min_lon),
                CellStatus::Closed => Err(ElevationError::CellClosed {
                    path: self.path.clone(),
                }),
                CellStatus::Invalid => Err(ElevationError::CellInvalid {
                    path: self.path.clone(),
                }),
            }
        }
        fn accuracy_info(&self, _point: &GeoPoint) -> Option<AccuracyInfo> {
            None
        }
    }

    /// Tiles exist for every id except the listed missing ones.
    #[derive(Default)]
    struct FakeFactory {
        missing: HashSet<CellId>,
        broken: HashSet<CellId>,
        creates: AtomicU64,
        gauge: Arc<OpenGauge>,
        closes_on_read: Arc<AtomicUsize>,
    }

    impl CellFactory for FakeFactory {
        fn cell_id(&self, point: &GeoPoint) -> Option<CellId> {
            point.is_valid().then(|| CellId::tile_for(point))
        }

        fn create_cell(&self, id: CellId) -> Result<Handler> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            let CellId::Tile { lat, lon } = id else {
                unreachable!("fake factory only makes tiles");
            };
            let path = PathBuf::from(format!("{lat}_{lon}"));
            if self.missing.contains(&id) {
                return Err(ElevationError::CellNotFound { path });
            }
            self.gauge.opened();
            Ok(Arc::new(FakeCell {
                path,
                bounds: CellBounds::for_tile(lat, lon),
                status: Mutex::new(CellStatus::Open),
                fail_reads: self.broken.contains(&id),
                gauge: Arc::clone(&self.gauge),
                closes_on_read: Arc::clone(&self.closes_on_read),
            }))
        }
    }

    fn height(cache: &ElevationCellCache<FakeFactory>, lat: f64, lon: f64) -> Option<f64> {
        cache.query(&GeoPoint::new(lat, lon), |cell| {
            cell.height_above_msl(&GeoPoint::new(lat, lon))
        })
    }

    #[test]
    fn test_cache_hit() {
        let cache = ElevationCellCache::new(FakeFactory::default(), 4, None);

        assert_eq!(height(&cache, 10.5, 20.5), Some(30.0));
        assert_eq!(height(&cache, 10.7, 20.1), Some(30.0));
        assert_eq!(height(&cache, 11.5, 20.5), Some(31.0));
        assert_eq!(height(&cache, 10.2, 20.2), Some(30.0));

        let stats = cache.stats();
        assert_eq!(stats.miss_count, 2);
        assert_eq!(stats.hit_count, 2);
        assert_eq!(stats.entry_count, 2);
        assert_eq!(cache.factory().creates.load(Ordering::SeqCst), 2);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_bound_and_eviction_closes() {
        let cache = ElevationCellCache::new(FakeFactory::default(), 2, None);

        let first = cache.get_or_create(&GeoPoint::new(0.5, 0.5)).unwrap();
        cache.get_or_create(&GeoPoint::new(1.5, 0.5)).unwrap();
        cache.get_or_create(&GeoPoint::new(2.5, 0.5)).unwrap();

        assert_eq!(cache.open_cell_count(), 2);
        assert!(!first.is_open());
        assert_eq!(cache.stats().eviction_count, 1);

        // Transparent reopen with the same value.
        assert_eq!(height(&cache, 0.5, 0.5), Some(0.0));
        assert_eq!(cache.open_cell_count(), 2);
        assert_eq!(cache.factory().gauge.peak(), 2);
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let cache = ElevationCellCache::new(FakeFactory::default(), 2, None);

        let a = cache.get_or_create(&GeoPoint::new(0.5, 0.5)).unwrap();
        let b = cache.get_or_create(&GeoPoint::new(1.5, 0.5)).unwrap();
        // Touch `a` again so `b` becomes the oldest.
        assert_eq!(height(&cache, 0.5, 0.5), Some(0.0));
        cache.get_or_create(&GeoPoint::new(2.5, 0.5)).unwrap();

        assert!(a.is_open());
        assert!(!b.is_open());
    }

    #[test]
    fn test_one_handler_per_id() {
        let cache = ElevationCellCache::new(FakeFactory::default(), 4, None);
        let a = cache.get_or_create(&GeoPoint::new(5.1, 5.1)).unwrap();
        let b = cache.get_or_create(&GeoPoint::new(5.9, 5.9)).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_uncoverable_point() {
        let cache = ElevationCellCache::new(FakeFactory::default(), 4, None);
        assert!(cache.get_or_create(&GeoPoint::new(f64::NAN, 0.0)).is_none());
        assert_eq!(cache.factory().creates.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_negative_cache() {
        let factory = FakeFactory {
            missing: [CellId::Tile { lat: 50, lon: 50 }].into_iter().collect(),
            ..FakeFactory::default()
        };
        let cache = ElevationCellCache::new(factory, 4, Some(Duration::from_secs(60)));

        for _ in 0..5 {
            assert_eq!(height(&cache, 50.5, 50.5), None);
        }
        assert_eq!(cache.factory().creates.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().negative_hit_count, 4);

        cache.clear();
        assert_eq!(height(&cache, 50.5, 50.5), None);
        assert_eq!(cache.factory().creates.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_negative_cache_disabled() {
        let factory = FakeFactory {
            missing: [CellId::Tile { lat: 50, lon: 50 }].into_iter().collect(),
            ..FakeFactory::default()
        };
        let cache = ElevationCellCache::new(factory, 4, Some(Duration::ZERO));

        for _ in 0..3 {
            assert_eq!(height(&cache, 50.5, 50.5), None);
        }
        assert_eq!(cache.factory().creates.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_negative_cache_expires() {
        let factory = FakeFactory {
            missing: [CellId::Tile { lat: 50, lon: 50 }].into_iter().collect(),
            ..FakeFactory::default()
        };
        let cache = ElevationCellCache::new(factory, 4, Some(Duration::from_millis(50)));

        assert_eq!(height(&cache, 50.5, 50.5), None);
        std::thread::sleep(Duration::from_millis(150));
        assert_eq!(height(&cache, 50.5, 50.5), None);
        assert_eq!(cache.factory().creates.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_invalid_handler_is_discarded() {
        let factory = FakeFactory {
            broken: [CellId::Tile { lat: 3, lon: 3 }].into_iter().collect(),
            ..FakeFactory::default()
        };
        let cache = ElevationCellCache::new(factory, 4, None);

        let first = cache.get_or_create(&GeoPoint::new(3.5, 3.5)).unwrap();
        assert_eq!(height(&cache, 3.5, 3.5), None);
        assert!(!first.is_valid());

        // Neighbours are unaffected.
        assert_eq!(height(&cache, 4.5, 3.5), Some(7.0));

        // A fresh handler replaces the invalid one.
        let second = cache.get_or_create(&GeoPoint::new(3.5, 3.5)).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_query_after_close() {
        let cache = ElevationCellCache::new(FakeFactory::default(), 4, None);
        let handler = cache.get_or_create(&GeoPoint::new(1.5, 1.5)).unwrap();

        // The handler the caller still holds is closed but still cached.
        handler.close();
        assert_eq!(height(&cache, 1.5, 1.5), Some(2.0));

        let fresh = cache.get_or_create(&GeoPoint::new(1.5, 1.5)).unwrap();
        assert!(!Arc::ptr_eq(&handler, &fresh));
        assert!(fresh.is_open());
        assert!(!handler.is_open());
    }

    #[test]
    fn test_query_outlasts_repeated_eviction() {
        let factory = FakeFactory::default();
        // Every lock-free attempt loses its cell mid-read.
        factory.closes_on_read.store(LOCK_FREE_ATTEMPTS, Ordering::SeqCst);
        let cache = ElevationCellCache::new(factory, 4, None);

        assert_eq!(height(&cache, 6.5, 1.5), Some(7.0));
        assert_eq!(cache.factory().closes_on_read.load(Ordering::SeqCst), 0);
        assert_eq!(cache.factory().creates.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_discard_keeps_replacement() {
        let cache = ElevationCellCache::new(FakeFactory::default(), 4, None);
        let id = CellId::Tile { lat: 8, lon: 8 };
        let point = GeoPoint::new(8.5, 8.5);

        let stale = cache.get_or_create(&point).unwrap();
        cache.remove(id);
        let replacement = cache.get_or_create(&point).unwrap();

        // Dropping the stale handler leaves the newer entry alone.
        cache.discard(id, &stale);
        assert!(replacement.is_open());
        let current = cache.get_or_create(&point).unwrap();
        assert!(Arc::ptr_eq(&current, &replacement));

        cache.discard(id, &replacement);
        assert!(!replacement.is_open());
        assert_eq!(cache.open_cell_count(), 0);
    }

    #[test]
    fn test_remove_and_clear() {
        let cache = ElevationCellCache::new(FakeFactory::default(), 4, None);
        let a = cache.get_or_create(&GeoPoint::new(1.5, 1.5)).unwrap();
        let b = cache.get_or_create(&GeoPoint::new(2.5, 2.5)).unwrap();

        cache.remove(CellId::Tile { lat: 1, lon: 1 });
        assert!(!a.is_open());
        assert!(b.is_open());

        cache.clear();
        assert!(!b.is_open());
        assert_eq!(cache.open_cell_count(), 0);
        assert_eq!(cache.stats().entry_count, 0);
    }

    #[test]
    fn test_concurrent_queries_hold_bound() {
        let cache = Arc::new(ElevationCellCache::new(FakeFactory::default(), 3, None));
        let done = Arc::new(AtomicBool::new(false));

        let monitor = {
            let cache = Arc::clone(&cache);
            let done = Arc::clone(&done);
            std::thread::spawn(move || {
                while !done.load(Ordering::SeqCst) {
                    assert!(cache.open_cell_count() <= 3);
                    std::thread::yield_now();
                }
            })
        };

        let threads: Vec<_> = (0..8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..500 {
                        let lat = ((t + i) % 6) as f64 + 0.5;
                        assert_eq!(height(&cache, lat, 0.5), Some(lat.floor()));
                    }
                })
            })
            .collect();

        for thread in threads {
            thread.join().unwrap();
        }
        done.store(true, Ordering::SeqCst);
        monitor.join().unwrap();

        // Every handler ever opened, in or out of the map.
        assert!(cache.factory().gauge.peak() <= 3);
        assert!(cache.stats().eviction_count > 0);
    }
}
