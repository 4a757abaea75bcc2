//! Registration index
//!
//! The resolver answers "can this type be satisfied?" and "which definitions
//! satisfy it?" from an immutable snapshot of two maps: registration type to
//! definitions, and generic family to open-generic definitions. Every
//! repository change rebuilds a fresh snapshot and swaps it in, so in-flight
//! resolutions keep reading the snapshot they started with.
//!
//! Each rebuild also pre-scores the constructors of every closed definition
//! with no caller arguments, so plain resolution skips scoring entirely.

use crate::candidate::{ConstructorCandidate, select_best};
use crate::definition::{DefinitionId, ServiceDefinition};
use crate::error::{DiError, Result};
use crate::key::{ServiceKind, ServiceType, TypeKey};
use ahash::RandomState;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

#[cfg(feature = "logging")]
use tracing::{debug, warn};

type DefinitionMap = HashMap<TypeKey, Vec<Arc<ServiceDefinition>>, RandomState>;

/// One consistent view of the registrations.
pub(crate) struct ServiceIndex {
    services: DefinitionMap,
    generics: DefinitionMap,
    prepared: HashMap<DefinitionId, Arc<ConstructorCandidate>, RandomState>,
}

impl ServiceIndex {
    fn build(definitions: &[Arc<ServiceDefinition>]) -> Self {
        let mut index = Self {
            services: HashMap::with_hasher(RandomState::new()),
            generics: HashMap::with_hasher(RandomState::new()),
            prepared: HashMap::with_hasher(RandomState::new()),
        };

        for definition in definitions {
            let map = if definition.is_open_generic() {
                &mut index.generics
            } else {
                &mut index.services
            };
            for key in definition.registration_types() {
                map.entry(*key).or_default().push(Arc::clone(definition));
            }
        }

        let mut prepared = HashMap::with_hasher(RandomState::new());
        for definition in definitions {
            let Some(ctors) = definition.closed_form().and_then(|form| form.constructors()) else {
                continue;
            };
            match select_best(ctors, None, &|ty| index.can_satisfy(ty)) {
                Ok(Some(best)) => {
                    prepared.insert(definition.id(), Arc::new(best));
                }
                Ok(None) => {}
                Err(_error) => {
                    #[cfg(feature = "logging")]
                    warn!(
                        target: "dependency_resolver",
                        service = definition.implementation().name(),
                        error = %_error,
                        "Pre-resolution failed"
                    );
                }
            }
        }
        index.prepared = prepared;
        index
    }

    /// Definitions matching `ty`, in registration order
    pub(crate) fn matches(&self, ty: &ServiceType) -> Vec<Arc<ServiceDefinition>> {
        if let Some(found) = self.services.get(&ty.key()) {
            if !found.is_empty() {
                return found.clone();
            }
        }
        match ty.kind() {
            ServiceKind::Generic(args) => self
                .generics
                .get(&args.family())
                .map(|defs| defs.iter().filter(|d| d.satisfies(ty)).cloned().collect())
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    /// Last-registered definition matching `ty`
    pub(crate) fn resolve(&self, ty: &ServiceType) -> Option<Arc<ServiceDefinition>> {
        if let Some(last) = self.services.get(&ty.key()).and_then(|defs| defs.last()) {
            return Some(Arc::clone(last));
        }
        let args = ty.generic_args()?;
        self.generics
            .get(&args.family())?
            .iter()
            .rev()
            .find(|d| d.satisfies(ty))
            .cloned()
    }

    pub(crate) fn can_resolve(&self, ty: &ServiceType) -> bool {
        if self.services.get(&ty.key()).is_some_and(|defs| !defs.is_empty()) {
            return true;
        }
        match ty.generic_args() {
            Some(args) => self
                .generics
                .get(&args.family())
                .is_some_and(|defs| defs.iter().any(|d| d.satisfies(ty))),
            None => false,
        }
    }

    /// Resolvable directly, or a wrapper around something resolvable
    pub(crate) fn can_satisfy(&self, ty: &ServiceType) -> bool {
        self.can_resolve(ty) || ty.as_deferred().is_some_and(|d| self.can_resolve(d.inner()))
    }

    pub(crate) fn prepared(&self, id: DefinitionId) -> Option<Arc<ConstructorCandidate>> {
        self.prepared.get(&id).cloned()
    }
}

/// Observer of registration changes.
pub trait RepositoryObserver: Send + Sync {
    fn definitions_changed(&self, definitions: &[Arc<ServiceDefinition>]);
}

/// Lookup index over a repository's definitions.
pub struct ServiceResolver {
    index: RwLock<Arc<ServiceIndex>>,
    disposed: AtomicBool,
}

impl ServiceResolver {
    pub fn new(definitions: &[Arc<ServiceDefinition>]) -> Self {
        Self {
            index: RwLock::new(Arc::new(ServiceIndex::build(definitions))),
            disposed: AtomicBool::new(false),
        }
    }

    /// Replace the index with one built from `definitions`
    pub fn rebuild(&self, definitions: &[Arc<ServiceDefinition>]) {
        if self.is_disposed() {
            return;
        }
        let index = Arc::new(ServiceIndex::build(definitions));

        #[cfg(feature = "logging")]
        debug!(
            target: "dependency_resolver",
            definitions = definitions.len(),
            prepared = index.prepared.len(),
            "Rebuilt service index"
        );

        *self.index.write().unwrap_or_else(PoisonError::into_inner) = index;
    }

    /// Current snapshot
    pub(crate) fn snapshot(&self) -> Result<Arc<ServiceIndex>> {
        if self.is_disposed() {
            return Err(DiError::ResolverDisposed);
        }
        Ok(Arc::clone(&self.index.read().unwrap_or_else(PoisonError::into_inner)))
    }

    pub fn can_resolve(&self, ty: &ServiceType) -> Result<bool> {
        Ok(self.snapshot()?.can_resolve(ty))
    }

    /// The last registered definition for `ty`
    pub fn resolve(&self, ty: &ServiceType) -> Result<Option<Arc<ServiceDefinition>>> {
        Ok(self.snapshot()?.resolve(ty))
    }

    /// Every definition for `ty`, in registration order
    pub fn resolve_all(&self, ty: &ServiceType) -> Result<Vec<Arc<ServiceDefinition>>> {
        Ok(self.snapshot()?.matches(ty))
    }

    pub fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::AcqRel) {
            #[cfg(feature = "logging")]
            debug!(target: "dependency_resolver", "Disposing service resolver");
        }
    }

    #[inline]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

impl RepositoryObserver for ServiceResolver {
    fn definitions_changed(&self, definitions: &[Arc<ServiceDefinition>]) {
        self.rebuild(definitions);
    }
}

impl std::fmt::Debug for ServiceResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceResolver")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constructor::{Constructor, Param};
    use crate::definition::{Definition, GenericDefinition};
    use crate::factory::Binding;
    use crate::key::GenericFamily;
    use crate::service::Service;

    trait Speaker: Send + Sync {}

    struct Loud;
    impl Speaker for Loud {}

    struct Quiet;
    impl Speaker for Quiet {}

    impl Service for Loud {
        fn constructors() -> Vec<Constructor<Self>> {
            vec![Constructor::new([], |_| Loud)]
        }

        fn bindings() -> Vec<Binding<Self>> {
            vec![Binding::<Self>::to::<dyn Speaker>(|s| s)]
        }
    }

    impl Service for Quiet {
        fn constructors() -> Vec<Constructor<Self>> {
            vec![
                Constructor::new([], |_| Quiet),
                Constructor::new([Param::of::<dyn Speaker>("inner")], |_| Quiet),
            ]
        }

        fn bindings() -> Vec<Binding<Self>> {
            vec![Binding::<Self>::to::<dyn Speaker>(|s| s)]
        }
    }

    struct Cell<T>(Option<T>);

    impl<T: Send + Sync + 'static> Service for Cell<T> {
        fn constructors() -> Vec<Constructor<Self>> {
            vec![Constructor::new([], |_| Cell(None))]
        }
    }

    struct CellFamily;

    impl GenericFamily for CellFamily {
        type Of<A: Send + Sync + 'static> = Cell<A>;
    }

    fn defs() -> Vec<Arc<ServiceDefinition>> {
        vec![
            Arc::new(Definition::<Loud>::new().build().unwrap()),
            Arc::new(Definition::<Quiet>::new().build().unwrap()),
            Arc::new(GenericDefinition::<CellFamily>::new().close::<u8>().build().unwrap()),
        ]
    }

    #[test]
    fn test_last_registered_wins() {
        let resolver = ServiceResolver::new(&defs());
        let speaker = ServiceType::of::<dyn Speaker>();

        let last = resolver.resolve(&speaker).unwrap().unwrap();
        assert_eq!(last.implementation(), TypeKey::of::<Quiet>());

        let all = resolver.resolve_all(&speaker).unwrap();
        let order: Vec<_> = all.iter().map(|d| d.implementation()).collect();
        assert_eq!(order, vec![TypeKey::of::<Loud>(), TypeKey::of::<Quiet>()]);
    }

    #[test]
    fn test_generic_lookup_by_family() {
        let resolver = ServiceResolver::new(&defs());

        assert!(resolver.can_resolve(&ServiceType::generic::<CellFamily, u8>()).unwrap());
        assert!(!resolver.can_resolve(&ServiceType::generic::<CellFamily, u16>()).unwrap());
        assert_eq!(
            resolver.resolve_all(&ServiceType::generic::<CellFamily, u8>()).unwrap().len(),
            1
        );
    }

    #[test]
    fn test_wrappers_satisfiable_through_inner_type() {
        let resolver = ServiceResolver::new(&defs());
        let index = resolver.snapshot().unwrap();

        assert!(index.can_satisfy(&ServiceType::lazy::<dyn Speaker>()));
        assert!(!index.can_resolve(&ServiceType::lazy::<dyn Speaker>()));
        assert!(!index.can_satisfy(&ServiceType::collection::<String>()));
    }

    #[test]
    fn test_rebuild_prepares_best_constructor() {
        let definitions = defs();
        let resolver = ServiceResolver::new(&definitions);
        let index = resolver.snapshot().unwrap();

        let quiet = &definitions[1];
        let best = index.prepared(quiet.id()).unwrap();
        // dyn Speaker is registered, so the one-parameter constructor wins
        assert_eq!(best.constructor().params().len(), 1);
        assert!(index.prepared(definitions[2].id()).is_none());
    }

    #[test]
    fn test_rebuild_swaps_snapshot() {
        let definitions = defs();
        let resolver = ServiceResolver::new(&definitions[..1]);
        let before = resolver.snapshot().unwrap();

        resolver.definitions_changed(&definitions);

        assert!(!before.can_resolve(&ServiceType::of::<Quiet>()));
        assert!(resolver.can_resolve(&ServiceType::of::<Quiet>()).unwrap());
    }

    #[test]
    fn test_queries_fail_after_dispose() {
        let resolver = ServiceResolver::new(&defs());
        resolver.dispose();
        resolver.dispose();

        let err = resolver.can_resolve(&ServiceType::of::<Loud>()).unwrap_err();
        assert!(matches!(err, DiError::ResolverDisposed));
        assert!(resolver.resolve_all(&ServiceType::of::<Loud>()).is_err());
    }
}
