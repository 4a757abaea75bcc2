//! Service scopes
//!
//! A scope caches the instances whose lifetime it owns and disposes them
//! when it is disposed. Every provider tree has one root scope, which holds
//! singletons, and any number of child scopes holding scoped instances.

use crate::definition::DefinitionId;
use crate::error::{DiError, Result};
use crate::factory::Disposer;
use crate::key::{AnyArc, TypeKey};
use crate::storage::InstanceCache;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[cfg(feature = "logging")]
use tracing::debug;

/// Unique scope identifier.
///
/// Each scope gets a unique ID for tracking and debugging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(u64);

impl ScopeId {
    /// Generate a new unique scope ID.
    #[inline]
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    #[inline]
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl Default for ScopeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ScopeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "scope-{}", self.0)
    }
}

/// Lifetime cache of one scope.
///
/// Active until [`dispose`](Self::dispose) is called, then permanently
/// disposed: lookups fail with [`DiError::ScopeDisposed`] while further
/// dispose calls do nothing.
pub struct ServiceScope {
    id: ScopeId,
    instances: InstanceCache,
    disposed: AtomicBool,
}

impl ServiceScope {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let id = ScopeId::new();

        #[cfg(feature = "logging")]
        debug!(
            target: "dependency_resolver",
            scope_id = id.id(),
            "Creating service scope"
        );

        Self {
            id,
            instances: InstanceCache::with_capacity(capacity),
            disposed: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn id(&self) -> ScopeId {
        self.id
    }

    #[inline]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Number of instances currently cached
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub(crate) fn ensure_active(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(DiError::ScopeDisposed {
                scope_id: self.id.id(),
            });
        }
        Ok(())
    }

    /// Return the cached instance for `(definition, args)`, or construct it once.
    pub(crate) fn get_or_store(
        &self,
        definition: DefinitionId,
        args: Option<&Arc<[TypeKey]>>,
        disposer: Option<Disposer>,
        factory: impl FnOnce() -> Result<AnyArc>,
    ) -> Result<AnyArc> {
        self.ensure_active()?;
        self.instances.get_or_init(definition, args, disposer, factory)
    }

    /// Dispose every cached instance, newest first.
    ///
    /// Idempotent: only the first call does any work.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        let stored = self.instances.drain();

        #[cfg(feature = "logging")]
        debug!(
            target: "dependency_resolver",
            scope_id = self.id.id(),
            instances = stored.len(),
            "Disposing service scope"
        );

        for instance in stored {
            if let Some(dispose) = &instance.disposer {
                dispose(&instance.value);
            }
        }
    }
}

impl Default for ServiceScope {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ServiceScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceScope")
            .field("id", &self.id)
            .field("instances", &self.len())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_scope_ids_are_unique() {
        let a = ScopeId::new();
        let b = ScopeId::new();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("scope-"));
    }

    #[test]
    fn test_dispose_runs_disposers_once() {
        let scope = ServiceScope::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for label in ["a", "b"] {
            let log = Arc::clone(&log);
            let disposer: Disposer = Arc::new(move |_: &AnyArc| log.lock().unwrap().push(label));
            scope
                .get_or_store(DefinitionId::next(), None, Some(disposer), || {
                    Ok(Arc::new(Arc::new(label)) as AnyArc)
                })
                .unwrap();
        }
        scope
            .get_or_store(DefinitionId::next(), None, None, || Ok(Arc::new(Arc::new(0u8)) as AnyArc))
            .unwrap();
        assert_eq!(scope.len(), 3);

        scope.dispose();
        scope.dispose();

        assert_eq!(*log.lock().unwrap(), vec!["b", "a"]);
        assert!(scope.is_empty());
    }

    #[test]
    fn test_use_after_dispose_fails() {
        let scope = ServiceScope::new();
        scope.dispose();

        let err = scope
            .get_or_store(DefinitionId::next(), None, None, || Ok(Arc::new(Arc::new(1u8)) as AnyArc))
            .unwrap_err();
        assert!(matches!(err, DiError::ScopeDisposed { scope_id } if scope_id == scope.id().id()));
    }
}
