//! In-memory recipe cache with single-flight request collapsing.
//!
//! Entries are keyed by ingredient [`Fingerprint`]. A miss spawns the compute
//! on the runtime and parks a shared handle to it in the in-flight table, so
//! concurrent callers for the same fingerprint await one upstream call. The
//! spawned task records the outcome itself: success for `success_ttl`, failure
//! for the shorter `failure_ttl` cooldown. Dropping a caller never cancels the
//! task.
//!
//! Only settled outcomes live in the LRU. In-flight handles are kept apart from
//! it so capacity pressure can never evict a running computation.

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use lru::LruCache;
use std::collections::HashMap;
use std::future::Future;
use std::num::NonZeroUsize;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

use crate::error::PipelineError;
use crate::ingredients::Fingerprint;
use crate::recipe_parser::Recipe;

pub type CacheResult = Result<Arc<Vec<Recipe>>, PipelineError>;

type SharedCompute = Shared<BoxFuture<'static, CacheResult>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub capacity: usize,
    pub success_ttl: Duration,
    pub failure_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            success_ttl: Duration::from_secs(10 * 60),
            failure_ttl: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Served from a resolved entry.
    pub hits: u64,
    /// Started a new upstream computation.
    pub misses: u64,
    /// Joined a computation already in flight.
    pub coalesced: u64,
    /// Answered with a cached failure during its cooldown.
    pub cooldown_hits: u64,
    pub entries: usize,
}

struct InFlight {
    generation: u64,
    future: SharedCompute,
}

enum Slot {
    Resolved {
        recipes: Arc<Vec<Recipe>>,
        expires_at: Instant,
    },
    Failed {
        error: PipelineError,
        expires_at: Instant,
    },
}

enum Lookup {
    Hit(Arc<Vec<Recipe>>),
    Cooldown(PipelineError),
    InFlight(SharedCompute),
    Miss,
}

struct Inner {
    entries: LruCache<Fingerprint, Slot>,
    in_flight: HashMap<Fingerprint, InFlight>,
    next_generation: u64,
    stats: CacheStats,
}

#[derive(Clone)]
pub struct RequestCache {
    inner: Arc<Mutex<Inner>>,
    config: CacheConfig,
}

impl std::fmt::Debug for RequestCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestCache")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl RequestCache {
    pub fn new(config: CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Arc::new(Mutex::new(Inner {
                entries: LruCache::new(capacity),
                in_flight: HashMap::new(),
                next_generation: 0,
                stats: CacheStats::default(),
            })),
            config,
        }
    }

    pub fn stats(&self) -> CacheStats {
        let inner = lock(&self.inner);
        CacheStats {
            entries: inner.len(),
            ..inner.stats.clone()
        }
    }

    /// Settled entries plus computations in flight.
    pub fn len(&self) -> usize {
        lock(&self.inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the cached recipes for `fingerprint`, join the computation already
    /// running for it, or start `compute` if neither exists.
    ///
    /// `compute` is only called on a miss. Its future runs on a spawned task.
    pub async fn get_or_compute<F, Fut>(&self, fingerprint: Fingerprint, compute: F) -> CacheResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<Recipe>, PipelineError>> + Send + 'static,
    {
        let future = {
            let mut inner = lock(&self.inner);
            let now = Instant::now();

            let running = inner
                .in_flight
                .get(&fingerprint)
                .map(|running| running.future.clone());
            let lookup = match running {
                Some(future) => Lookup::InFlight(future),
                None => match inner.entries.get(&fingerprint) {
                    Some(Slot::Resolved {
                        recipes,
                        expires_at,
                    }) if *expires_at > now => Lookup::Hit(Arc::clone(recipes)),
                    Some(Slot::Failed { error, expires_at }) if *expires_at > now => {
                        Lookup::Cooldown(error.clone())
                    }
                    _ => Lookup::Miss,
                },
            };

            match lookup {
                Lookup::Hit(recipes) => {
                    inner.stats.hits += 1;
                    tracing::debug!(fingerprint = %fingerprint, "Recipe cache hit");
                    return Ok(recipes);
                }
                Lookup::Cooldown(error) => {
                    inner.stats.cooldown_hits += 1;
                    tracing::debug!(fingerprint = %fingerprint, "Recipe request in failure cooldown");
                    return Err(error);
                }
                Lookup::InFlight(future) => {
                    inner.stats.coalesced += 1;
                    tracing::debug!(fingerprint = %fingerprint, "Joining in-flight recipe request");
                    future
                }
                Lookup::Miss => {
                    inner.entries.pop(&fingerprint);
                    inner.stats.misses += 1;
                    tracing::debug!(fingerprint = %fingerprint, "Recipe cache miss");
                    self.start(&mut inner, fingerprint, compute())
                }
            }
        };

        future.await
    }

    /// Spawn the computation and park it as in flight. Runs under the cache
    /// lock, which is what makes check-and-insert atomic per fingerprint.
    fn start<Fut>(&self, inner: &mut Inner, fingerprint: Fingerprint, compute: Fut) -> SharedCompute
    where
        Fut: Future<Output = Result<Vec<Recipe>, PipelineError>> + Send + 'static,
    {
        let generation = inner.next_generation;
        inner.next_generation += 1;

        let task_inner = Arc::clone(&self.inner);
        let config = self.config.clone();
        let task_fingerprint = fingerprint.clone();

        let handle = tokio::spawn(async move {
            let result = match AssertUnwindSafe(compute).catch_unwind().await {
                Ok(result) => result.map(Arc::new),
                Err(_) => Err(PipelineError::ComputeAborted(
                    "recipe computation panicked".to_string(),
                )),
            };
            settle(&task_inner, &config, task_fingerprint, generation, &result);
            result
        });

        let future = handle
            .map(|joined| match joined {
                Ok(result) => result,
                Err(e) => Err(PipelineError::ComputeAborted(e.to_string())),
            })
            .boxed()
            .shared();

        inner.in_flight.insert(
            fingerprint,
            InFlight {
                generation,
                future: future.clone(),
            },
        );

        future
    }
}

impl Inner {
    fn len(&self) -> usize {
        self.entries.len() + self.in_flight.len()
    }
}

/// Move a finished computation out of the in-flight table into the LRU,
/// unless a newer computation has taken its place.
fn settle(
    inner: &Mutex<Inner>,
    config: &CacheConfig,
    fingerprint: Fingerprint,
    generation: u64,
    result: &CacheResult,
) {
    let mut inner = lock(inner);

    let ours = inner
        .in_flight
        .get(&fingerprint)
        .is_some_and(|running| running.generation == generation);
    if !ours {
        return;
    }
    inner.in_flight.remove(&fingerprint);

    let now = Instant::now();
    let slot = match result {
        Ok(recipes) => Slot::Resolved {
            recipes: Arc::clone(recipes),
            expires_at: now + config.success_ttl,
        },
        Err(error) => {
            tracing::debug!(fingerprint = %fingerprint, error = %error, "Caching failure for cooldown");
            Slot::Failed {
                error: error.clone(),
                expires_at: now + config.failure_ttl,
            }
        }
    };
    if let Some((evicted, _)) = inner.entries.push(fingerprint.clone(), slot) {
        if evicted != fingerprint {
            tracing::debug!(evicted = %evicted, "Evicted least recently used recipe entry");
        }
    }
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayError;
    use crate::ingredients::normalize;
    use crate::recipe_parser::{Difficulty, Nutrition};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn recipe(title: &str) -> Recipe {
        Recipe {
            id: format!("recipe-0-{}", title.len()),
            title: title.to_string(),
            description: "d".to_string(),
            ingredients: vec!["egg".to_string()],
            instructions: vec!["cook".to_string()],
            prep_time: "5m".to_string(),
            cook_time: "5m".to_string(),
            servings: 1,
            difficulty: Difficulty::Easy,
            nutrition: Nutrition {
                calories: 100,
                protein: "1g".to_string(),
                carbs: "1g".to_string(),
                fat: "1g".to_string(),
            },
            image_prompt: "p".to_string(),
        }
    }

    fn fp(items: &[&str]) -> Fingerprint {
        normalize(items).fingerprint()
    }

    fn counting_compute(
        calls: &Arc<AtomicUsize>,
        result: Result<Vec<Recipe>, PipelineError>,
        delay: Duration,
    ) -> impl FnOnce() -> BoxFuture<'static, Result<Vec<Recipe>, PipelineError>> {
        let calls = Arc::clone(calls);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                tokio::time::sleep(delay).await;
                result
            }
            .boxed()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hit_after_resolve_skips_compute() {
        let cache = RequestCache::new(CacheConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));

        let first = cache
            .get_or_compute(fp(&["egg"]), counting_compute(&calls, Ok(vec![recipe("a")]), Duration::ZERO))
            .await
            .unwrap();
        let second = cache
            .get_or_compute(fp(&["egg"]), counting_compute(&calls, Ok(vec![recipe("b")]), Duration::ZERO))
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(first, second);
        assert_eq!(second[0].title, "a");
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_compute() {
        let cache = RequestCache::new(CacheConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let slow = Duration::from_secs(1);

        let (a, b, c) = tokio::join!(
            cache.get_or_compute(fp(&["egg", "milk"]), counting_compute(&calls, Ok(vec![recipe("a")]), slow)),
            cache.get_or_compute(fp(&["milk", "egg"]), counting_compute(&calls, Ok(vec![recipe("b")]), slow)),
            cache.get_or_compute(fp(&["Egg", "Milk"]), counting_compute(&calls, Ok(vec![recipe("c")]), slow)),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(a.unwrap()[0].title, "a");
        assert_eq!(b.unwrap()[0].title, "a");
        assert_eq!(c.unwrap()[0].title, "a");
        assert_eq!(cache.stats().coalesced, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_reaches_every_waiter_then_cools_down() {
        let cache = RequestCache::new(CacheConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let failure = PipelineError::UpstreamFailed(GatewayError::Permanent("nope".to_string()));

        let (a, b) = tokio::join!(
            cache.get_or_compute(fp(&["egg"]), counting_compute(&calls, Err(failure.clone()), Duration::from_millis(10))),
            cache.get_or_compute(fp(&["egg"]), counting_compute(&calls, Ok(vec![recipe("x")]), Duration::ZERO)),
        );
        assert_eq!(a.unwrap_err(), failure);
        assert_eq!(b.unwrap_err(), failure);

        // Within the cooldown the failure is replayed without recomputing.
        let again = cache
            .get_or_compute(fp(&["egg"]), counting_compute(&calls, Ok(vec![recipe("x")]), Duration::ZERO))
            .await;
        assert_eq!(again.unwrap_err(), failure);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(31)).await;
        let after = cache
            .get_or_compute(fp(&["egg"]), counting_compute(&calls, Ok(vec![recipe("x")]), Duration::ZERO))
            .await
            .unwrap();
        assert_eq!(after[0].title, "x");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_expires_after_ttl() {
        let cache = RequestCache::new(CacheConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));

        cache
            .get_or_compute(fp(&["egg"]), counting_compute(&calls, Ok(vec![recipe("a")]), Duration::ZERO))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(9 * 60)).await;
        cache
            .get_or_compute(fp(&["egg"]), counting_compute(&calls, Ok(vec![recipe("b")]), Duration::ZERO))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(2 * 60)).await;
        let refreshed = cache
            .get_or_compute(fp(&["egg"]), counting_compute(&calls, Ok(vec![recipe("b")]), Duration::ZERO))
            .await
            .unwrap();
        assert_eq!(refreshed[0].title, "b");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lru_eviction_at_capacity() {
        let cache = RequestCache::new(CacheConfig {
            capacity: 2,
            ..CacheConfig::default()
        });
        let calls = Arc::new(AtomicUsize::new(0));
        let ok = |t: &str| -> Result<Vec<Recipe>, PipelineError> { Ok(vec![recipe(t)]) };

        for name in ["a", "b"] {
            cache
                .get_or_compute(fp(&[name]), counting_compute(&calls, ok(name), Duration::ZERO))
                .await
                .unwrap();
        }
        // Touch "a" so "b" becomes least recently used.
        cache
            .get_or_compute(fp(&["a"]), counting_compute(&calls, ok("a"), Duration::ZERO))
            .await
            .unwrap();
        cache
            .get_or_compute(fp(&["c"]), counting_compute(&calls, ok("c"), Duration::ZERO))
            .await
            .unwrap();
        assert_eq!(cache.len(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        cache
            .get_or_compute(fp(&["a"]), counting_compute(&calls, ok("a"), Duration::ZERO))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        cache
            .get_or_compute(fp(&["b"]), counting_compute(&calls, ok("b"), Duration::ZERO))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_pressure_never_evicts_running_compute() {
        let cache = RequestCache::new(CacheConfig {
            capacity: 1,
            ..CacheConfig::default()
        });
        let calls = Arc::new(AtomicUsize::new(0));
        let slow = Duration::from_secs(1);

        let first_egg = tokio::spawn({
            let cache = cache.clone();
            let compute = counting_compute(&calls, Ok(vec![recipe("egg")]), slow);
            async move { cache.get_or_compute(fp(&["egg"]), compute).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        let milk = tokio::spawn({
            let cache = cache.clone();
            let compute = counting_compute(&calls, Ok(vec![recipe("milk")]), slow);
            async move { cache.get_or_compute(fp(&["milk"]), compute).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(cache.len(), 2);

        let second_egg = cache
            .get_or_compute(fp(&["egg"]), counting_compute(&calls, Ok(vec![recipe("other")]), slow))
            .await
            .unwrap();

        assert_eq!(second_egg[0].title, "egg");
        assert_eq!(first_egg.await.unwrap().unwrap()[0].title, "egg");
        assert_eq!(milk.await.unwrap().unwrap()[0].title, "milk");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.stats().coalesced, 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_caller_does_not_cancel_shared_compute() {
        let cache = RequestCache::new(CacheConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));

        let abandoned = tokio::time::timeout(
            Duration::from_millis(10),
            cache.get_or_compute(fp(&["egg"]), counting_compute(&calls, Ok(vec![recipe("a")]), Duration::from_secs(1))),
        )
        .await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_secs(2)).await;
        let later = cache
            .get_or_compute(fp(&["egg"]), counting_compute(&calls, Ok(vec![recipe("b")]), Duration::ZERO))
            .await
            .unwrap();
        assert_eq!(later[0].title, "a");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panicking_compute_is_reported() {
        let cache = RequestCache::new(CacheConfig::default());
        let result = cache
            .get_or_compute(fp(&["egg"]), || async {
                if true {
                    panic!("boom");
                }
                Ok::<Vec<Recipe>, PipelineError>(Vec::new())
            })
            .await;
        assert!(matches!(result, Err(PipelineError::ComputeAborted(_))));
    }
}
