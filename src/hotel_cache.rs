// Hotel listings per country, memoized for the lifetime of the session
// Entries are write-once and never evicted: the first successful fetch for a country wins.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::{api::TourApi, types::HotelsMap};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct CacheStats {
    pub items_count: usize,
    pub hit_count: usize,
    pub miss_count: usize,
    pub fetch_count: usize,
    pub failed_fetch_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HotelsStatus {
    #[default]
    Idle,
    Loading,
    Success,
    Error,
}

#[derive(Debug, Clone, Default)]
pub struct HotelsState {
    pub country_id: Option<String>,
    pub status: HotelsStatus,
    pub hotels: Arc<HotelsMap>,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub enum ResolveOutcome {
    // No country selected, nothing to do
    Skipped,
    Cached(Arc<HotelsMap>),
    Fetched(Arc<HotelsMap>),
    Failed(String),
    // The selection moved on before this lookup finished
    Superseded,
}

impl ResolveOutcome {
    pub fn hotels(&self) -> Option<&Arc<HotelsMap>> {
        match self {
            ResolveOutcome::Cached(hotels) | ResolveOutcome::Fetched(hotels) => Some(hotels),
            _ => None,
        }
    }
}

pub struct HotelCache<A: TourApi> {
    api: Arc<A>,
    store: DashMap<String, Arc<HotelsMap>>,
    state: RwLock<HotelsState>,
    generation: AtomicU64,
    alive: AtomicBool,
    cache_stats: RwLock<CacheStats>,
}

impl<A: TourApi> HotelCache<A> {
    pub fn new(api: Arc<A>) -> Self {
        Self {
            api,
            store: DashMap::new(),
            state: RwLock::new(HotelsState::default()),
            generation: AtomicU64::new(0),
            alive: AtomicBool::new(true),
            cache_stats: RwLock::new(CacheStats::default()),
        }
    }

    pub fn snapshot(&self) -> HotelsState {
        self.state.read().clone()
    }

    pub fn status(&self) -> HotelsStatus {
        self.state.read().status
    }

    pub fn cached(&self, country_id: &str) -> Option<Arc<HotelsMap>> {
        self.store.get(country_id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            items_count: self.store.len(),
            ..self.cache_stats.read().clone()
        }
    }

    // Drops every cached country; used for tests and explicit session resets
    pub fn clear(&self) {
        self.store.clear();
    }

    pub fn detach(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    fn commit(&self, generation: u64, update: impl FnOnce(&mut HotelsState)) -> bool {
        let mut state = self.state.write();
        if !self.alive.load(Ordering::SeqCst) || self.generation.load(Ordering::SeqCst) != generation
        {
            return false;
        }
        update(&mut state);
        true
    }

    pub async fn resolve(&self, country_id: Option<&str>) -> ResolveOutcome {
        // Any change of selection, including clearing it, invalidates older lookups
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let Some(country_id) = country_id else {
            return ResolveOutcome::Skipped;
        };

        if let Some(hotels) = self.cached(country_id) {
            self.cache_stats.write().hit_count += 1;
            debug!(country_id, count = hotels.len(), "hotel cache hit");

            let committed = self.commit(generation, |state| {
                state.country_id = Some(country_id.to_string());
                state.hotels = Arc::clone(&hotels);
                state.error = None;
                state.status = HotelsStatus::Success;
            });
            return if committed {
                ResolveOutcome::Cached(hotels)
            } else {
                ResolveOutcome::Superseded
            };
        }

        self.cache_stats.write().miss_count += 1;
        let loading = self.commit(generation, |state| {
            state.country_id = Some(country_id.to_string());
            state.error = None;
            state.status = HotelsStatus::Loading;
        });
        if !loading {
            return ResolveOutcome::Superseded;
        }

        match self.api.hotels(country_id).await {
            Ok(hotels) => {
                self.cache_stats.write().fetch_count += 1;
                // Cached even if superseded: the data is still right for its key
                let hotels = Arc::clone(
                    self.store
                        .entry(country_id.to_string())
                        .or_insert_with(|| Arc::new(hotels))
                        .value(),
                );
                info!(country_id, count = hotels.len(), "hotels loaded");

                let committed = self.commit(generation, |state| {
                    state.hotels = Arc::clone(&hotels);
                    state.status = HotelsStatus::Success;
                });
                if committed {
                    ResolveOutcome::Fetched(hotels)
                } else {
                    ResolveOutcome::Superseded
                }
            }
            Err(err) => {
                self.cache_stats.write().failed_fetch_count += 1;
                warn!(country_id, error = %err, "failed to load hotels");

                let message = err.to_string();
                let committed = self.commit(generation, |state| {
                    state.error = Some(message.clone());
                    state.status = HotelsStatus::Error;
                });
                if committed {
                    ResolveOutcome::Failed(message)
                } else {
                    ResolveOutcome::Superseded
                }
            }
        }
    }
}
