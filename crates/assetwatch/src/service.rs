//! The state handed to all HTTP handlers.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use anyhow::Result;

use assetwatch_service::config::Config;
use assetwatch_service::services::SharedServices;
use assetwatch_service::types::ComponentId;

/// Shared handler state: the services plus per-gateway bookkeeping.
#[derive(Clone)]
pub struct GatewayService {
    inner: Arc<SharedServices>,
    /// Components with a matching request currently being processed.
    pending_matches: Arc<Mutex<HashSet<ComponentId>>>,
}

impl GatewayService {
    pub fn create(config: Config) -> Result<Self> {
        let inner = Arc::new(SharedServices::new(config)?);
        Ok(Self::with_services(inner))
    }

    pub fn with_services(inner: Arc<SharedServices>) -> Self {
        Self {
            inner,
            pending_matches: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn services(&self) -> &SharedServices {
        &self.inner
    }

    /// Registers a matching run for `component_id`.
    ///
    /// Returns `None` when one is already being processed; the caller should
    /// reject the request instead of starting a duplicate run. The returned
    /// guard unregisters the run when dropped, including on panic and
    /// cancellation.
    pub fn try_begin_match(&self, component_id: ComponentId) -> Option<MatchGuard> {
        let mut pending = self.pending_matches.lock().unwrap();
        if !pending.insert(component_id) {
            return None;
        }
        Some(MatchGuard {
            pending: Arc::clone(&self.pending_matches),
            component_id,
        })
    }
}

pub struct MatchGuard {
    pending: Arc<Mutex<HashSet<ComponentId>>>,
    component_id: ComponentId,
}

impl Drop for MatchGuard {
    fn drop(&mut self) {
        self.pending.lock().unwrap().remove(&self.component_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_guard() {
        let service = GatewayService {
            inner: Arc::new(
                SharedServices::new(Config::default()).unwrap(),
            ),
            pending_matches: Arc::new(Mutex::new(HashSet::new())),
        };

        let guard = service.try_begin_match(101).unwrap();
        assert!(service.try_begin_match(101).is_none());
        // a different component is unaffected
        let other = service.try_begin_match(102).unwrap();
        drop(other);

        drop(guard);
        assert!(service.try_begin_match(101).is_some());
    }
}
