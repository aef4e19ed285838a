use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use crate::catalog::CatalogSnapshot;
use crate::error::CatalogError;
use crate::source::CatalogSource;

#[derive(Debug)]
enum CacheState {
    Unbuilt,
    Building,
    Built(Arc<CatalogSnapshot>),
    /// Last failure, kept for diagnostics only. The next access rebuilds.
    Failed(String),
}

/// Holds the catalog for the lifetime of one driver.
///
/// The first access builds; concurrent callers wait for that build. A failed
/// build is not cached, so the next access starts over.
pub struct CatalogCache<S: CatalogSource> {
    source: S,
    state: Mutex<CacheState>,
    ready: Condvar,
}

impl<S: CatalogSource> CatalogCache<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            state: Mutex::new(CacheState::Unbuilt),
            ready: Condvar::new(),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn is_built(&self) -> bool {
        matches!(*self.lock(), CacheState::Built(_))
    }

    pub fn last_error(&self) -> Option<String> {
        match &*self.lock() {
            CacheState::Failed(message) => Some(message.clone()),
            _ => None,
        }
    }

    pub fn get(&self) -> Result<Arc<CatalogSnapshot>, CatalogError> {
        let mut state = self.lock();
        loop {
            if let CacheState::Built(snapshot) = &*state {
                return Ok(Arc::clone(snapshot));
            }
            if !matches!(*state, CacheState::Building) {
                break;
            }
            state = self
                .ready
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *state = CacheState::Building;
        drop(state);

        let _guard = BuildGuard { cache: self };
        tracing::info!("building catalog");
        let result = self.source.load();

        let mut state = self.lock();
        match result {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                *state = CacheState::Built(Arc::clone(&snapshot));
                Ok(snapshot)
            }
            Err(err) => {
                tracing::warn!(error = %err, "catalog build failed");
                *state = CacheState::Failed(err.to_string());
                Err(err)
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Wakes waiters once the build ends, and marks the build failed if the
/// source panicked before storing an outcome.
struct BuildGuard<'a, S: CatalogSource> {
    cache: &'a CatalogCache<S>,
}

impl<S: CatalogSource> Drop for BuildGuard<'_, S> {
    fn drop(&mut self) {
        let mut state = self.cache.lock();
        if matches!(*state, CacheState::Building) {
            tracing::warn!("catalog build did not finish");
            *state = CacheState::Failed("catalog build did not finish".to_string());
        }
        drop(state);
        self.cache.ready.notify_all();
    }
}
