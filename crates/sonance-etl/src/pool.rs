//! A bounded pool of reusable, expensive-to-build resources.
//!
//! At most `max_size` resources are ever checked out at once. Callers past
//! that limit queue on a [`Semaphore`]; once `max_waiting` callers are
//! queued further acquisitions fail fast with [`PoolError::QueueFull`].

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex as SlotLock, OwnedMutexGuard, OwnedSemaphorePermit, Semaphore};

use crate::error::PoolError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Resources built up front.
    pub min_size: usize,
    /// Resources checked out at once.
    pub max_size: usize,
    /// Callers allowed to queue for a resource.
    pub max_waiting: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        let cores = std::thread::available_parallelism().map_or(4, |n| n.get());
        Self {
            min_size: 1,
            max_size: cores,
            max_waiting: 256,
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.max_size == 0 {
            return Err(PoolError::InvalidConfig("max_size must be positive".into()));
        }
        if self.min_size > self.max_size {
            return Err(PoolError::InvalidConfig(format!(
                "min_size ({}) exceeds max_size ({})",
                self.min_size, self.max_size
            )));
        }
        if u32::try_from(self.max_size).is_err() {
            return Err(PoolError::InvalidConfig(format!(
                "max_size ({}) is too large",
                self.max_size
            )));
        }
        Ok(())
    }
}

type Factory<T> = dyn Fn() -> Result<T, PoolError> + Send + Sync;

/// A resource's home for its whole life. It is locked while checked out.
type Slot<T> = Arc<SlotLock<T>>;

struct Shared<T> {
    config: PoolConfig,
    permits: Arc<Semaphore>,
    idle: Mutex<Vec<Slot<T>>>,
    created: AtomicUsize,
    waiting: AtomicUsize,
    draining: AtomicBool,
    factory: Box<Factory<T>>,
}

impl<T> Shared<T> {
    fn idle(&self) -> std::sync::MutexGuard<'_, Vec<Slot<T>>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A pool handing out at most `max_size` resources of type `T`.
///
/// Cloning is cheap; clones share the same resources.
pub struct BoundedPool<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for BoundedPool<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for BoundedPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedPool")
            .field("config", &self.shared.config)
            .field("created", &self.shared.created.load(Ordering::Relaxed))
            .field("waiting", &self.shared.waiting.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl<T: Send + 'static> BoundedPool<T> {
    /// Build a pool and its first `min_size` resources.
    ///
    /// `factory` is called again whenever a caller finds no idle resource
    /// and fewer than `max_size` exist.
    pub fn new<F, E>(config: PoolConfig, factory: F) -> Result<Self, PoolError>
    where
        F: Fn() -> Result<T, E> + Send + Sync + 'static,
        E: fmt::Display,
    {
        config.validate()?;
        let factory: Box<Factory<T>> =
            Box::new(move || factory().map_err(|e| PoolError::Create(e.to_string())));

        let idle = (0..config.min_size)
            .map(|_| factory().map(|resource| Arc::new(SlotLock::new(resource))))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(
            "Pool ready with {} of at most {} resources",
            idle.len(),
            config.max_size
        );

        Ok(Self {
            shared: Arc::new(Shared {
                permits: Arc::new(Semaphore::new(config.max_size)),
                created: AtomicUsize::new(idle.len()),
                idle: Mutex::new(idle),
                waiting: AtomicUsize::new(0),
                draining: AtomicBool::new(false),
                factory,
                config,
            }),
        })
    }

    /// Check out a resource, waiting if all `max_size` are in use.
    pub async fn acquire(&self) -> Result<Pooled<T>, PoolError> {
        let shared = &self.shared;
        if shared.draining.load(Ordering::Acquire) {
            return Err(PoolError::Draining);
        }

        let permit = match Arc::clone(&shared.permits).try_acquire_owned() {
            Ok(permit) => permit,
            Err(tokio::sync::TryAcquireError::Closed) => return Err(PoolError::Draining),
            Err(tokio::sync::TryAcquireError::NoPermits) => {
                let _queued = WaitSlot::enter(&shared.waiting, shared.config.max_waiting)?;
                Arc::clone(&shared.permits)
                    .acquire_owned()
                    .await
                    .map_err(|_| PoolError::Draining)?
            }
        };

        if shared.draining.load(Ordering::Acquire) {
            return Err(PoolError::Draining);
        }

        let idle = shared.idle().pop();
        let slot = match idle {
            Some(slot) => slot,
            None => {
                let resource = (shared.factory)()?;
                let created = shared.created.fetch_add(1, Ordering::AcqRel) + 1;
                debug!("Pool grew to {} resources", created);
                Arc::new(SlotLock::new(resource))
            }
        };

        // A slot is pushed back just before its previous guard unlocks, so
        // this can briefly wait on a returning holder.
        Ok(Pooled {
            resource: slot.lock_owned().await,
            shared: Arc::clone(shared),
            _permit: permit,
        })
    }

    /// Stop handing out resources and wait for every checked-out one to
    /// come back. Later acquisitions fail with [`PoolError::Draining`].
    pub async fn drain(&self) {
        let shared = &self.shared;
        if shared.draining.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("Draining pool ({} in use)", self.in_use());

        let all = shared.config.max_size as u32;
        if let Ok(permits) = Arc::clone(&shared.permits).acquire_many_owned(all).await {
            shared.permits.close();
            drop(permits);
        }

        let released = std::mem::take(&mut *shared.idle()).len();
        debug!("Pool drained, released {} resources", released);
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Resources built so far.
    pub fn size(&self) -> usize {
        self.shared.created.load(Ordering::Acquire)
    }

    /// Resources currently checked out.
    pub fn in_use(&self) -> usize {
        self.shared
            .config
            .max_size
            .saturating_sub(self.shared.permits.available_permits())
    }

    /// Callers queued for a resource.
    pub fn waiting(&self) -> usize {
        self.shared.waiting.load(Ordering::Acquire)
    }

    pub fn is_draining(&self) -> bool {
        self.shared.draining.load(Ordering::Acquire)
    }
}

/// Counts one queued caller for as long as it lives.
struct WaitSlot<'a> {
    waiting: &'a AtomicUsize,
}

impl<'a> WaitSlot<'a> {
    fn enter(waiting: &'a AtomicUsize, max_waiting: usize) -> Result<Self, PoolError> {
        waiting
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max_waiting).then_some(n + 1)
            })
            .map_err(|n| PoolError::QueueFull { waiting: n })?;
        Ok(Self { waiting })
    }
}

impl Drop for WaitSlot<'_> {
    fn drop(&mut self) {
        self.waiting.fetch_sub(1, Ordering::AcqRel);
    }
}

/// A checked-out resource; it returns to the pool when dropped.
pub struct Pooled<T> {
    resource: OwnedMutexGuard<T>,
    shared: Arc<Shared<T>>,
    _permit: OwnedSemaphorePermit,
}

impl<T> fmt::Debug for Pooled<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pooled").finish_non_exhaustive()
    }
}

impl<T> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.resource
    }
}

impl<T> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.resource
    }
}

impl<T> Drop for Pooled<T> {
    fn drop(&mut self) {
        // The guard and then the permit are released after this returns.
        if !self.shared.draining.load(Ordering::Acquire) {
            let slot = Arc::clone(OwnedMutexGuard::mutex(&self.resource));
            self.shared.idle().push(slot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn counting_pool(config: PoolConfig) -> (BoundedPool<usize>, Arc<AtomicUsize>) {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        let pool = BoundedPool::new(config, move || {
            Ok::<_, PoolError>(counter.fetch_add(1, Ordering::SeqCst))
        })
        .unwrap();
        (pool, built)
    }

    fn config(min_size: usize, max_size: usize, max_waiting: usize) -> PoolConfig {
        PoolConfig {
            min_size,
            max_size,
            max_waiting,
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(config(0, 0, 1).validate().is_err());
        assert!(config(3, 2, 1).validate().is_err());
        assert!(config(0, 2, 0).validate().is_ok());
    }

    #[tokio::test]
    async fn test_min_size_built_up_front() {
        let (pool, built) = counting_pool(config(2, 4, 1));
        assert_eq!(built.load(Ordering::SeqCst), 2);
        assert_eq!(pool.size(), 2);
    }

    #[tokio::test]
    async fn test_resources_are_reused() {
        let (pool, built) = counting_pool(config(0, 2, 1));
        let first = *pool.acquire().await.unwrap();
        let second = *pool.acquire().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(built.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_grows_up_to_max_size() {
        let (pool, _) = counting_pool(config(0, 2, 1));
        let a = pool.acquire().await.unwrap();
        let b = pool.acquire().await.unwrap();
        assert_ne!(*a, *b);
        assert_eq!(pool.in_use(), 2);
        drop(a);
        drop(b);
        assert_eq!(pool.in_use(), 0);
        assert_eq!(pool.size(), 2);
    }

    #[tokio::test]
    async fn test_queue_full_fails_fast() {
        let (pool, _) = counting_pool(config(1, 1, 1));
        let held = pool.acquire().await.unwrap();

        let queued = {
            let pool = pool.clone();
            tokio::spawn(async move { *pool.acquire().await.unwrap() })
        };
        while pool.waiting() == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        assert_eq!(
            pool.acquire().await.unwrap_err(),
            PoolError::QueueFull { waiting: 1 }
        );

        drop(held);
        assert_eq!(queued.await.unwrap(), 0);
        assert_eq!(pool.waiting(), 0);
    }

    #[tokio::test]
    async fn test_drain_waits_for_in_flight() {
        let (pool, _) = counting_pool(config(1, 2, 4));
        let held = pool.acquire().await.unwrap();

        let draining = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.drain().await })
        };
        while !pool.is_draining() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(pool.acquire().await.unwrap_err(), PoolError::Draining);
        assert!(!draining.is_finished());

        drop(held);
        draining.await.unwrap();
        assert_eq!(pool.acquire().await.unwrap_err(), PoolError::Draining);
    }

    #[tokio::test]
    async fn test_factory_failure_is_reported() {
        let pool: BoundedPool<u8> =
            BoundedPool::new(config(0, 1, 1), || Err::<u8, _>("no luck")).unwrap();
        assert_eq!(
            pool.acquire().await.unwrap_err(),
            PoolError::Create("no luck".to_string())
        );
        // The permit came back with the failure.
        assert_eq!(pool.in_use(), 0);
    }

    #[tokio::test]
    async fn test_mutations_survive_return() {
        let pool: BoundedPool<Vec<u32>> =
            BoundedPool::new(config(1, 1, 1), || Ok::<_, PoolError>(Vec::new())).unwrap();
        {
            let mut scratch = pool.acquire().await.unwrap();
            scratch.push(7);
        }
        let mut scratch = pool.acquire().await.unwrap();
        scratch.push(8);
        assert_eq!(*scratch, vec![7, 8]);
        drop(scratch);
        assert_eq!(pool.size(), 1);
    }

    #[tokio::test]
    async fn test_returned_while_draining_is_released() {
        let pool: BoundedPool<Arc<()>> =
            BoundedPool::new(config(0, 1, 1), || Ok::<_, PoolError>(Arc::new(()))).unwrap();
        let held = pool.acquire().await.unwrap();
        let tracker = Arc::clone(&*held);
        assert_eq!(Arc::strong_count(&tracker), 2);

        let draining = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.drain().await })
        };
        while !pool.is_draining() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        drop(held);
        draining.await.unwrap();
        assert_eq!(Arc::strong_count(&tracker), 1);
    }
}
