//! Service provider
//!
//! The provider turns a request into an instance: it asks the resolver for
//! the matching definition, picks the scope implied by the definition's
//! lifetime and, on a cache miss, builds the instance through its factory or
//! best constructor, injects its properties and runs its callbacks.
//!
//! A root provider owns the root scope, which holds every singleton. Child
//! providers from [`ServiceProvider::create_scope`] share the resolver and
//! the root scope but cache scoped instances in a scope of their own.

use crate::candidate::select_best;
use crate::definition::{Definition, DefinitionId, ServiceDefinition};
use crate::deferred::{Collection, Lazy, Live};
use crate::error::{DiError, Result};
use crate::factory::{Activation, Disposer, Form};
use crate::key::{AnyArc, GenericFamily, ServiceType, TypeKey};
use crate::parameter::Parameters;
use crate::property::PropertyCache;
use crate::resolver::{ServiceIndex, ServiceResolver};
use crate::scope::{ScopeId, ServiceScope};
use crate::service::{Lifetime, Service};
use ahash::RandomState;
use dashmap::DashMap;
use std::any::TypeId;
use std::cell::RefCell;
use std::fmt;
use std::sync::{Arc, Weak};

#[cfg(feature = "logging")]
use tracing::{debug, trace, warn};

/// Runtime options for the providers of one repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderOptions {
    /// Initial capacity of every scope's instance cache
    pub instance_capacity: usize,
}

impl Default for ProviderOptions {
    fn default() -> Self {
        Self {
            instance_capacity: 16,
        }
    }
}

// =============================================================================
// Cycle detection
// =============================================================================

type ConstructionKey = (DefinitionId, Option<Arc<[TypeKey]>>);

thread_local! {
    /// Definitions under construction on this thread, innermost last
    static CONSTRUCTING: RefCell<Vec<ConstructionKey>> = const { RefCell::new(Vec::new()) };
}

/// Marks a definition as under construction until dropped.
struct ConstructionGuard;

impl ConstructionGuard {
    fn enter(key: ConstructionKey, type_name: &'static str) -> Result<Self> {
        CONSTRUCTING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.contains(&key) {
                return Err(DiError::CircularDependency { type_name });
            }
            stack.push(key);
            Ok(ConstructionGuard)
        })
    }
}

impl Drop for ConstructionGuard {
    fn drop(&mut self) {
        CONSTRUCTING.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

// =============================================================================
// ServiceProvider
// =============================================================================

/// State shared by a root provider and all of its child scopes
struct Shared {
    options: ProviderOptions,
    /// Ad-hoc definitions built by `create`, per implementation type
    create_cache: DashMap<TypeId, Arc<ServiceDefinition>, RandomState>,
    properties: PropertyCache,
}

struct ProviderInner {
    resolver: Arc<ServiceResolver>,
    scope: Arc<ServiceScope>,
    /// The root provider; `None` on the root itself
    root: Option<Arc<ProviderInner>>,
    shared: Arc<Shared>,
}

impl ProviderInner {
    fn is_root(&self) -> bool {
        self.root.is_none()
    }
}

/// Resolves services from a repository's registrations.
///
/// Cloning is cheap; clones share the same scope.
///
/// # Examples
///
/// ```rust
/// use dependency_resolver::{Constructor, Definition, Service, ServiceRepository};
///
/// struct Config {
///     url: String,
/// }
///
/// impl Service for Config {
///     fn constructors() -> Vec<Constructor<Self>> {
///         vec![Constructor::new([], |_| Config { url: "db://local".into() })]
///     }
/// }
///
/// let repo = ServiceRepository::new();
/// repo.register(Definition::<Config>::new().singleton()).unwrap();
///
/// let provider = repo.create_provider();
/// let config = provider.require::<Config>().unwrap();
/// assert_eq!(config.url, "db://local");
/// ```
#[derive(Clone)]
pub struct ServiceProvider {
    inner: Arc<ProviderInner>,
}

/// Non-owning handle to a provider, held by deferred wrappers.
#[derive(Clone)]
pub struct WeakProvider {
    inner: Weak<ProviderInner>,
    scope_id: ScopeId,
}

impl WeakProvider {
    /// The provider, or `ScopeDisposed` once every handle to it is gone
    pub fn upgrade(&self) -> Result<ServiceProvider> {
        self.inner
            .upgrade()
            .map(|inner| ServiceProvider { inner })
            .ok_or(DiError::ScopeDisposed {
                scope_id: self.scope_id.id(),
            })
    }
}

impl fmt::Debug for WeakProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakProvider").field("scope_id", &self.scope_id).finish()
    }
}

impl ServiceProvider {
    /// Create a root provider over `resolver`
    pub(crate) fn root(resolver: Arc<ServiceResolver>, options: ProviderOptions) -> Self {
        let root = Arc::new(ServiceScope::with_capacity(options.instance_capacity));

        #[cfg(feature = "logging")]
        debug!(
            target: "dependency_resolver",
            scope_id = root.id().id(),
            "Creating root service provider"
        );

        Self {
            inner: Arc::new(ProviderInner {
                resolver,
                scope: root,
                root: None,
                shared: Arc::new(Shared {
                    options,
                    create_cache: DashMap::with_capacity_and_hasher_and_shard_amount(
                        0,
                        RandomState::new(),
                        8,
                    ),
                    properties: PropertyCache::new(),
                }),
            }),
        }
    }

    /// The root provider of this provider's tree
    pub(crate) fn root_provider(&self) -> ServiceProvider {
        match &self.inner.root {
            Some(root) => ServiceProvider {
                inner: Arc::clone(root),
            },
            None => self.clone(),
        }
    }

    pub fn downgrade(&self) -> WeakProvider {
        WeakProvider {
            inner: Arc::downgrade(&self.inner),
            scope_id: self.scope_id(),
        }
    }

    /// Id of the scope this provider caches scoped instances in
    #[inline]
    pub fn scope_id(&self) -> ScopeId {
        self.inner.scope.id()
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.inner.is_root()
    }

    #[inline]
    pub fn is_disposed(&self) -> bool {
        self.inner.scope.is_disposed()
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    /// Resolve `K`; `Ok(None)` when nothing is registered for it.
    #[inline]
    pub fn get<K: ?Sized + Send + Sync + 'static>(&self) -> Result<Option<Arc<K>>> {
        self.typed(&ServiceType::of::<K>(), None)
    }

    /// Resolve `K`, passing `params` to its constructor.
    ///
    /// `Ok(None)` also when no constructor accepts `params`.
    pub fn get_with<K: ?Sized + Send + Sync + 'static>(
        &self,
        params: &Parameters,
    ) -> Result<Option<Arc<K>>> {
        self.typed(&ServiceType::of::<K>(), Some(params))
    }

    /// Resolve the closed generic `F::Of<A>`
    pub fn get_generic<F: GenericFamily, A: Send + Sync + 'static>(
        &self,
    ) -> Result<Option<Arc<F::Of<A>>>> {
        self.typed(&ServiceType::generic::<F, A>(), None)
    }

    /// Resolve `K`, failing with [`DiError::NotFound`] when it is not registered
    pub fn require<K: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<K>> {
        self.get::<K>()?.ok_or_else(DiError::not_found::<K>)
    }

    /// A [`Lazy`] over `K`, if `K` is resolvable
    pub fn lazy<K: ?Sized + Send + Sync + 'static>(&self) -> Result<Option<Arc<Lazy<K>>>> {
        self.typed(&ServiceType::lazy::<K>(), None)
    }

    /// A [`Live`] over `K`, if `K` is resolvable
    pub fn live<K: ?Sized + Send + Sync + 'static>(&self) -> Result<Option<Arc<Live<K>>>> {
        self.typed(&ServiceType::live::<K>(), None)
    }

    /// Every registration of `K`, if there is at least one
    pub fn all<K: ?Sized + Send + Sync + 'static>(&self) -> Result<Option<Arc<Collection<K>>>> {
        self.typed(&ServiceType::collection::<K>(), None)
    }

    /// Resolve an erased request; the payload is an `Arc` of `ty`'s type.
    ///
    /// `Ok(None)` also when no constructor of `ty` accepts `params`. A
    /// dependency that can't be constructed is still an error.
    pub fn get_type(&self, ty: &ServiceType, params: Option<&Parameters>) -> Result<Option<AnyArc>> {
        if let Some(params) = params {
            if !self.accepts(ty, params)? {
                return Ok(None);
            }
        }
        self.resolve_payload(ty, params)
    }

    /// Whether the definition `ty` resolves to has a constructor taking `params`
    fn accepts(&self, ty: &ServiceType, params: &Parameters) -> Result<bool> {
        self.inner.scope.ensure_active()?;
        let index = self.inner.resolver.snapshot()?;
        if ty.is_deferred() {
            return Ok(true);
        }
        let Some(definition) = index.resolve(ty) else {
            return Ok(true);
        };
        let constructors = definition.form_for(ty).and_then(|form| form.constructors());
        match constructors {
            Some(constructors) => {
                Ok(select_best(constructors, Some(params), &|t| index.can_satisfy(t))?.is_some())
            }
            None => Ok(true),
        }
    }

    fn typed<K: ?Sized + Send + Sync + 'static>(
        &self,
        ty: &ServiceType,
        params: Option<&Parameters>,
    ) -> Result<Option<Arc<K>>> {
        Ok(self
            .get_type(ty, params)?
            .and_then(|payload| payload.downcast_ref::<Arc<K>>().cloned()))
    }

    #[inline]
    pub fn can_resolve<K: ?Sized + Send + Sync + 'static>(&self) -> Result<bool> {
        self.can_resolve_type(&ServiceType::of::<K>())
    }

    /// Whether `ty`, or the inner type of a deferred `ty`, is registered
    pub fn can_resolve_type(&self, ty: &ServiceType) -> Result<bool> {
        Ok(self.inner.resolver.snapshot()?.can_satisfy(ty))
    }

    // =========================================================================
    // Ad-hoc construction
    // =========================================================================

    /// Build a `T` from its own constructors, whether or not `T` is registered.
    ///
    /// Constructor parameters are still resolved from the registrations.
    pub fn create<T: Service>(&self) -> Result<Arc<T>> {
        self.create_inner::<T>(None)
    }

    /// Like [`create`](Self::create), passing `params` to the constructor.
    ///
    /// Fails with [`DiError::NoMatchingConstructor`] when no constructor
    /// accepts `params`.
    pub fn create_with<T: Service>(&self, params: &Parameters) -> Result<Arc<T>> {
        self.create_inner::<T>(Some(params))
    }

    fn create_inner<T: Service>(&self, params: Option<&Parameters>) -> Result<Arc<T>> {
        self.inner.scope.ensure_active()?;
        let index = self.inner.resolver.snapshot()?;

        let definition = match self.inner.shared.create_cache.get(&TypeId::of::<T>()) {
            Some(cached) => Arc::clone(cached.value()),
            None => {
                let built = Arc::new(Definition::<T>::new().build()?);
                Arc::clone(
                    self.inner
                        .shared
                        .create_cache
                        .entry(TypeId::of::<T>())
                        .or_insert(built)
                        .value(),
                )
            }
        };

        let ty = ServiceType::of::<T>();
        let form = definition
            .closed_form()
            .ok_or_else(|| DiError::creation_failed::<T>("no closed form"))?;
        let _guard = ConstructionGuard::enter((definition.id(), None), form.implementation.name())?;
        let instance = self.construct(&index, &definition, form, &ty, params)?;

        instance
            .downcast_ref::<Arc<T>>()
            .cloned()
            .ok_or_else(|| DiError::creation_failed::<T>("constructor produced another type"))
    }

    // =========================================================================
    // Scopes and lifecycle
    // =========================================================================

    /// A child provider with a fresh scope for scoped instances.
    ///
    /// Singletons keep resolving from the root scope.
    pub fn create_scope(&self) -> Result<ServiceProvider> {
        self.inner.scope.ensure_active()?;
        let scope = Arc::new(ServiceScope::with_capacity(
            self.inner.shared.options.instance_capacity,
        ));

        #[cfg(feature = "logging")]
        debug!(
            target: "dependency_resolver",
            parent_scope = self.scope_id().id(),
            scope_id = scope.id().id(),
            "Creating child scope"
        );

        Ok(Self {
            inner: Arc::new(ProviderInner {
                resolver: Arc::clone(&self.inner.resolver),
                scope,
                root: Some(Arc::clone(&self.root_provider().inner)),
                shared: Arc::clone(&self.inner.shared),
            }),
        })
    }

    /// Re-run property injection on an instance built elsewhere
    pub fn update_dependencies<T: Service>(&self, instance: &T) -> Result<()> {
        self.inner.scope.ensure_active()?;
        self.inject_properties(instance)
    }

    /// Dispose this provider's scope.
    ///
    /// Disposing the root provider also disposes every singleton and the
    /// resolver, so the child scopes fail from then on too.
    pub fn dispose(&self) {
        self.inner.scope.dispose();
        if self.is_root() {
            self.inner.resolver.dispose();
        }
    }

    // =========================================================================
    // Internals shared with wrappers, candidates and definitions
    // =========================================================================

    /// Resolve `ty` to its payload, `Ok(None)` when nothing matches
    pub(crate) fn resolve_payload(
        &self,
        ty: &ServiceType,
        params: Option<&Parameters>,
    ) -> Result<Option<AnyArc>> {
        self.inner.scope.ensure_active()?;
        let index = self.inner.resolver.snapshot()?;

        if let Some(deferred) = ty.as_deferred() {
            if index.can_resolve(deferred.inner()) {
                return Ok(Some(deferred.make(self)));
            }
        }

        match index.resolve(ty) {
            Some(definition) => self.resolve_with(&index, &definition, ty, params),
            None => {
                #[cfg(feature = "logging")]
                trace!(
                    target: "dependency_resolver",
                    service = ty.name(),
                    "Service not registered"
                );
                Ok(None)
            }
        }
    }

    /// Resolve `ty` through one particular definition
    pub(crate) fn resolve_definition(
        &self,
        definition: &Arc<ServiceDefinition>,
        ty: &ServiceType,
        params: Option<&Parameters>,
    ) -> Result<Option<AnyArc>> {
        self.inner.scope.ensure_active()?;
        let index = self.inner.resolver.snapshot()?;
        self.resolve_with(&index, definition, ty, params)
    }

    /// Definitions matching `ty`, in registration order
    pub(crate) fn definitions_for(&self, ty: &ServiceType) -> Result<Vec<Arc<ServiceDefinition>>> {
        self.inner.scope.ensure_active()?;
        self.inner.resolver.resolve_all(ty)
    }

    fn resolve_with(
        &self,
        index: &ServiceIndex,
        definition: &Arc<ServiceDefinition>,
        ty: &ServiceType,
        params: Option<&Parameters>,
    ) -> Result<Option<AnyArc>> {
        let Some(form) = definition.form_for(ty) else {
            return Ok(None);
        };

        // held across the resolve callbacks too, so re-entry from a callback
        // is reported instead of recursing; re-entering a slot being filled
        // would block, so this comes before the scope lookup
        let _guard = ConstructionGuard::enter(
            (definition.id(), definition.instance_args(ty).cloned()),
            form.implementation.name(),
        )?;

        let instance = match &form.activation {
            Activation::Instance(value) => {
                // pre-built instances are re-injected on every access
                if let Some(inject) = &form.inject {
                    inject(self, value)?;
                }
                Arc::clone(value)
            }
            _ => {
                let lifetime = definition.lifetime();

                #[cfg(feature = "logging")]
                trace!(
                    target: "dependency_resolver",
                    service = ty.name(),
                    implementation = form.implementation.name(),
                    lifetime = lifetime.as_str(),
                    scope_id = self.scope_id().id(),
                    "Resolving service"
                );

                match lifetime {
                    Lifetime::Transient => self.construct(index, definition, form, ty, params)?,
                    Lifetime::Scoped => self.inner.scope.get_or_store(
                        definition.id(),
                        definition.instance_args(ty),
                        disposer_for(definition, form),
                        || self.construct(index, definition, form, ty, params),
                    )?,
                    Lifetime::Singleton => {
                        // singletons outlive any child scope, so they and their
                        // deferred dependencies are bound to the root provider
                        let root = self.root_provider();
                        root.inner.scope.get_or_store(
                            definition.id(),
                            definition.instance_args(ty),
                            disposer_for(definition, form),
                            || root.construct(index, definition, form, ty, params),
                        )?
                    }
                }
            }
        };

        for callback in definition.on_resolve() {
            callback(&instance, self);
        }

        form.cast(&instance, &ty.key())
            .map(Some)
            .ok_or_else(|| DiError::CreationFailed {
                type_name: ty.name(),
                reason: format!("{} can't be converted to the requested type", form.implementation),
            })
    }

    /// Build a fresh instance of `form`, inject it and run its create callbacks
    fn construct(
        &self,
        index: &ServiceIndex,
        definition: &ServiceDefinition,
        form: &Form,
        ty: &ServiceType,
        params: Option<&Parameters>,
    ) -> Result<AnyArc> {
        let instance = match &form.activation {
            Activation::Instance(value) => Arc::clone(value),
            Activation::Factory(factory) => factory(self, ty)?,
            Activation::Constructors(constructors) => {
                let prepared = match params {
                    None => index.prepared(definition.id()),
                    Some(_) => None,
                };
                let candidate = match prepared {
                    Some(candidate) => candidate,
                    None => select_best(constructors, params, &|t| index.can_satisfy(t))?
                        .map(Arc::new)
                        .ok_or(DiError::NoMatchingConstructor {
                            type_name: form.implementation.name(),
                        })?,
                };

                #[cfg(feature = "logging")]
                debug!(
                    target: "dependency_resolver",
                    service = form.implementation.name(),
                    score = candidate.score(),
                    params = candidate.constructor().params().len(),
                    "Invoking constructor"
                );

                candidate.invoke(self)?
            }
        };

        if let Some(inject) = &form.inject {
            inject(self, &instance)?;
        }
        for callback in definition.on_create() {
            callback(&instance, self);
        }

        Ok(instance)
    }

    /// Set every declared property of `target` that can be resolved
    pub(crate) fn inject_properties<T: Service>(&self, target: &T) -> Result<()> {
        let properties = self.inner.shared.properties.get::<T>();
        for property in properties.iter() {
            match self.resolve_payload(property.service_type(), None)? {
                Some(payload) => {
                    if !property.apply(target, &payload) {
                        #[cfg(feature = "logging")]
                        warn!(
                            target: "dependency_resolver",
                            service = std::any::type_name::<T>(),
                            property = property.name(),
                            "Resolved property value has an unexpected type"
                        );
                    }
                }
                None if property.is_required() => {
                    return Err(DiError::MissingProperty {
                        type_name: std::any::type_name::<T>(),
                        property: property.name(),
                    });
                }
                None => {
                    #[cfg(feature = "logging")]
                    warn!(
                        target: "dependency_resolver",
                        service = std::any::type_name::<T>(),
                        property = property.name(),
                        "Optional property not resolvable, left unset"
                    );
                }
            }
        }
        Ok(())
    }
}

fn disposer_for(definition: &ServiceDefinition, form: &Form) -> Option<Disposer> {
    if definition.skips_dispose() {
        None
    } else {
        form.disposer.clone()
    }
}

impl fmt::Debug for ServiceProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceProvider")
            .field("scope", &self.inner.scope)
            .field("root", &self.is_root())
            .finish()
    }
}
