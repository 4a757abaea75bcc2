//! Service repository
//!
//! The repository holds the live set of registrations. Every mutation
//! notifies the subscribed observers (the resolvers of the providers created
//! from it) while the write lock is still held, so observers see changes in
//! the order they were made.

use crate::definition::{DefinitionId, IntoDefinition, ServiceDefinition};
use crate::error::Result;
use crate::key::{ServiceType, TypeKey};
use crate::provider::{ProviderOptions, ServiceProvider, WeakProvider};
use crate::resolver::{RepositoryObserver, ServiceResolver};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, Weak};

#[cfg(feature = "logging")]
use tracing::debug;

#[derive(Default)]
struct RepositoryState {
    definitions: Vec<Arc<ServiceDefinition>>,
    observers: Vec<Weak<dyn RepositoryObserver>>,
    roots: Vec<WeakProvider>,
}

impl RepositoryState {
    fn notify(&mut self) {
        self.observers.retain(|observer| observer.strong_count() > 0);
        for observer in &self.observers {
            if let Some(observer) = observer.upgrade() {
                observer.definitions_changed(&self.definitions);
            }
        }
    }

    fn overlaps(&self, definition: &ServiceDefinition) -> impl Iterator<Item = &Arc<ServiceDefinition>> {
        self.definitions.iter().filter(move |existing| {
            existing
                .registration_types()
                .iter()
                .any(|key| definition.registration_types().contains(key))
        })
    }
}

/// The set of registrations providers resolve from.
///
/// # Examples
///
/// ```rust
/// use dependency_resolver::{Constructor, Definition, Service, ServiceRepository, ServiceType};
///
/// struct Cache;
///
/// impl Service for Cache {
///     fn constructors() -> Vec<Constructor<Self>> {
///         vec![Constructor::new([], |_| Cache)]
///     }
/// }
///
/// let repo = ServiceRepository::new();
/// let id = repo.register(Definition::<Cache>::new()).unwrap();
/// assert!(repo.is_registered(&ServiceType::of::<Cache>()));
///
/// repo.unregister_definition(id);
/// assert!(!repo.is_registered(&ServiceType::of::<Cache>()));
/// ```
pub struct ServiceRepository {
    state: RwLock<RepositoryState>,
    options: ProviderOptions,
}

impl ServiceRepository {
    pub fn new() -> Self {
        Self::with_options(ProviderOptions::default())
    }

    /// Repository whose providers use `options`
    pub fn with_options(options: ProviderOptions) -> Self {
        Self {
            state: RwLock::new(RepositoryState::default()),
            options,
        }
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, RepositoryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, RepositoryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a registration; later registrations of a type win over earlier ones
    pub fn register(&self, definition: impl IntoDefinition) -> Result<DefinitionId> {
        let definition = Arc::new(definition.into_definition()?);
        let id = definition.id();

        #[cfg(feature = "logging")]
        debug!(
            target: "dependency_resolver",
            service = definition.implementation().name(),
            lifetime = definition.lifetime().as_str(),
            registration_types = definition.registration_types().len(),
            "Registering service"
        );

        let mut state = self.write();
        state.definitions.push(definition);
        state.notify();
        Ok(id)
    }

    /// Add a registration only if none of its types is registered yet
    pub fn try_register(&self, definition: impl IntoDefinition) -> Result<Option<DefinitionId>> {
        let definition = definition.into_definition()?;
        let mut state = self.write();
        if state.overlaps(&definition).next().is_some() {
            #[cfg(feature = "logging")]
            debug!(
                target: "dependency_resolver",
                service = definition.implementation().name(),
                "Skipping registration, type already registered"
            );
            return Ok(None);
        }

        let definition = Arc::new(definition);
        let id = definition.id();
        state.definitions.push(definition);
        state.notify();
        Ok(Some(id))
    }

    /// Remove every registration sharing a type with `definition`, then add it
    pub fn replace(&self, definition: impl IntoDefinition) -> Result<DefinitionId> {
        let definition = Arc::new(definition.into_definition()?);
        let id = definition.id();
        let mut state = self.write();

        #[cfg(feature = "logging")]
        let before = state.definitions.len();
        state.definitions.retain(|existing| {
            !existing
                .registration_types()
                .iter()
                .any(|key| definition.registration_types().contains(key))
        });

        #[cfg(feature = "logging")]
        debug!(
            target: "dependency_resolver",
            service = definition.implementation().name(),
            replaced = before - state.definitions.len(),
            "Replacing service registrations"
        );

        state.definitions.push(definition);
        state.notify();
        Ok(id)
    }

    /// Remove every registration requestable as `ty`; returns how many were removed
    pub fn unregister(&self, ty: &ServiceType) -> usize {
        let key = ty.key();
        let family: Option<TypeKey> = ty.generic_args().map(|args| args.family());
        self.remove_where(|definition| {
            definition.registration_types().contains(&key)
                || (definition.is_open_generic()
                    && family.is_some_and(|family| definition.registration_types().contains(&family)))
        })
    }

    /// Remove one registration; returns whether it was present
    pub fn unregister_definition(&self, id: DefinitionId) -> bool {
        self.remove_where(|definition| definition.id() == id) > 0
    }

    fn remove_where(&self, remove: impl Fn(&ServiceDefinition) -> bool) -> usize {
        let mut state = self.write();
        let before = state.definitions.len();
        state.definitions.retain(|definition| !remove(definition));
        let removed = before - state.definitions.len();

        if removed > 0 {
            #[cfg(feature = "logging")]
            debug!(
                target: "dependency_resolver",
                removed,
                remaining = state.definitions.len(),
                "Unregistered services"
            );
            state.notify();
        }
        removed
    }

    /// Snapshot of the registrations, in registration order
    pub fn definitions(&self) -> Vec<Arc<ServiceDefinition>> {
        self.read().definitions.clone()
    }

    pub fn len(&self) -> usize {
        self.read().definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether anything is registered as `ty`
    pub fn is_registered(&self, ty: &ServiceType) -> bool {
        self.read()
            .definitions
            .iter()
            .any(|definition| {
                definition.registration_types().contains(&ty.key())
                    || (definition.is_open_generic() && definition.satisfies(ty))
            })
    }

    /// Subscribe to registration changes; the observer is held weakly
    pub fn subscribe(&self, observer: &Arc<dyn RepositoryObserver>) {
        self.write().observers.push(Arc::downgrade(observer));
    }

    /// A root provider over the current and all future registrations
    pub fn create_provider(&self) -> ServiceProvider {
        self.create_provider_with(self.options)
    }

    pub fn create_provider_with(&self, options: ProviderOptions) -> ServiceProvider {
        let mut state = self.write();
        let resolver = Arc::new(ServiceResolver::new(&state.definitions));
        let observer: Arc<dyn RepositoryObserver> = resolver.clone();
        state.observers.push(Arc::downgrade(&observer));

        let provider = ServiceProvider::root(resolver, options);
        state.roots.retain(|root| root.upgrade().is_ok());
        state.roots.push(provider.downgrade());
        provider
    }

    /// Dispose every root provider created here, then drop all registrations
    pub fn dispose(&self) {
        let mut state = self.write();

        #[cfg(feature = "logging")]
        debug!(
            target: "dependency_resolver",
            providers = state.roots.len(),
            definitions = state.definitions.len(),
            "Disposing service repository"
        );

        for root in state.roots.drain(..) {
            if let Ok(provider) = root.upgrade() {
                provider.dispose();
            }
        }
        state.definitions.clear();
        state.observers.clear();
    }
}

impl Default for ServiceRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ServiceRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.read();
        f.debug_struct("ServiceRepository")
            .field("definitions", &state.definitions.len())
            .field("providers", &state.roots.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constructor::Constructor;
    use crate::definition::Definition;
    use crate::error::DiError;
    use crate::factory::Binding;
    use crate::service::Service;
    use std::sync::atomic::{AtomicUsize, Ordering};

    trait Sink: Send + Sync {
        fn label(&self) -> &'static str;
    }

    struct Console;
    struct File;

    impl Sink for Console {
        fn label(&self) -> &'static str {
            "console"
        }
    }

    impl Sink for File {
        fn label(&self) -> &'static str {
            "file"
        }
    }

    impl Service for Console {
        fn constructors() -> Vec<Constructor<Self>> {
            vec![Constructor::new([], |_| Console)]
        }

        fn bindings() -> Vec<Binding<Self>> {
            vec![Binding::<Self>::to::<dyn Sink>(|s| s)]
        }
    }

    impl Service for File {
        fn constructors() -> Vec<Constructor<Self>> {
            vec![Constructor::new([], |_| File)]
        }

        fn bindings() -> Vec<Binding<Self>> {
            vec![Binding::<Self>::to::<dyn Sink>(|s| s)]
        }
    }

    #[test]
    fn test_last_registered_wins_and_unregister_reverts() {
        let repo = ServiceRepository::new();
        repo.register(Definition::<Console>::new()).unwrap();
        let file = repo.register(Definition::<File>::new()).unwrap();
        let provider = repo.create_provider();

        assert_eq!(provider.require::<dyn Sink>().unwrap().label(), "file");

        assert!(repo.unregister_definition(file));
        assert!(!repo.unregister_definition(file));
        assert_eq!(provider.require::<dyn Sink>().unwrap().label(), "console");
    }

    #[test]
    fn test_try_register_skips_taken_types() {
        let repo = ServiceRepository::new();
        assert!(repo.try_register(Definition::<Console>::new()).unwrap().is_some());
        assert!(repo.try_register(Definition::<File>::new()).unwrap().is_none());
        assert!(
            repo.try_register(Definition::<File>::new().as_self())
                .unwrap()
                .is_some()
        );
        assert_eq!(repo.len(), 2);
    }

    #[test]
    fn test_replace_removes_overlapping() {
        let repo = ServiceRepository::new();
        repo.register(Definition::<Console>::new()).unwrap();
        repo.register(Definition::<Console>::new()).unwrap();
        repo.replace(Definition::<File>::new().as_binding::<dyn Sink>()).unwrap();

        let provider = repo.create_provider();
        let all = provider.all::<dyn Sink>().unwrap().unwrap().to_vec().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].label(), "file");
    }

    #[test]
    fn test_unregister_by_type() {
        let repo = ServiceRepository::new();
        repo.register(Definition::<Console>::new()).unwrap();
        repo.register(Definition::<File>::new()).unwrap();

        assert_eq!(repo.unregister(&ServiceType::of::<dyn Sink>()), 2);
        assert!(repo.is_empty());
        assert!(!repo.is_registered(&ServiceType::of::<dyn Sink>()));
    }

    struct Tally(AtomicUsize);

    impl RepositoryObserver for Tally {
        fn definitions_changed(&self, _definitions: &[Arc<ServiceDefinition>]) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_observers_notified_per_mutation() {
        let repo = ServiceRepository::new();
        let tally = Arc::new(Tally(AtomicUsize::new(0)));
        let observer: Arc<dyn RepositoryObserver> = tally.clone();
        repo.subscribe(&observer);

        let id = repo.register(Definition::<Console>::new()).unwrap();
        repo.try_register(Definition::<Console>::new()).unwrap();
        repo.unregister_definition(id);
        repo.unregister(&ServiceType::of::<File>());

        assert_eq!(tally.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_dispose_tears_down_providers() {
        let repo = ServiceRepository::new();
        repo.register(Definition::<Console>::new().singleton()).unwrap();
        let provider = repo.create_provider();
        provider.require::<Console>().unwrap();

        repo.dispose();

        assert!(repo.is_empty());
        assert!(provider.is_disposed());
        assert!(matches!(provider.get::<Console>(), Err(DiError::ScopeDisposed { .. })));
    }
}
