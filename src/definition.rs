//! Service definitions
//!
//! A [`ServiceDefinition`] is one registration: how to produce an
//! implementation, which types it can be requested as, its lifetime, its
//! lifecycle callbacks and whether its instances are disposed. Definitions
//! are built with the typed [`Definition`] and [`GenericDefinition`]
//! builders and are immutable once registered.

use crate::constructor::erase_all;
use crate::error::{DiError, Result};
use crate::factory::{Activation, Callback, Form, Injector, caster, erase, identity_caster};
use crate::key::{AnyArc, GenericFamily, ServiceType, TypeKey};
use crate::provider::ServiceProvider;
use crate::service::{Dispose, Lifetime, Service};
use ahash::RandomState;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identity of a registration.
///
/// Two registrations of the same type are two definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DefinitionId(u64);

impl DefinitionId {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for DefinitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "definition-{}", self.0)
    }
}

enum Shape {
    Closed(Form),
    Open {
        family: TypeKey,
        /// Keyed by the single type argument
        forms: HashMap<TypeKey, Form, RandomState>,
    },
}

/// One registration.
pub struct ServiceDefinition {
    id: DefinitionId,
    implementation: TypeKey,
    lifetime: Lifetime,
    shape: Shape,
    registration_types: Vec<TypeKey>,
    skip_dispose: bool,
    on_create: Vec<Callback>,
    on_resolve: Vec<Callback>,
}

impl ServiceDefinition {
    /// Builder for a service constructed from its declared constructors
    pub fn of<T: Service>() -> Definition<T> {
        Definition::new()
    }

    /// Builder for an open-generic service family
    pub fn open_generic<F: GenericFamily>() -> GenericDefinition<F> {
        GenericDefinition::new()
    }

    #[inline]
    pub fn id(&self) -> DefinitionId {
        self.id
    }

    /// Implementation type, or the generic family for open-generic definitions
    #[inline]
    pub fn implementation(&self) -> TypeKey {
        self.implementation
    }

    /// Effective lifetime; definitions holding an instance are always singletons
    pub fn lifetime(&self) -> Lifetime {
        if self.has_instance() {
            Lifetime::Singleton
        } else {
            self.lifetime
        }
    }

    /// Types this definition is indexed under
    #[inline]
    pub fn registration_types(&self) -> &[TypeKey] {
        &self.registration_types
    }

    #[inline]
    pub fn is_open_generic(&self) -> bool {
        matches!(self.shape, Shape::Open { .. })
    }

    pub fn has_instance(&self) -> bool {
        matches!(
            &self.shape,
            Shape::Closed(Form {
                activation: Activation::Instance(_),
                ..
            })
        )
    }

    #[inline]
    pub fn skips_dispose(&self) -> bool {
        self.skip_dispose
    }

    /// Index this definition under `key` as well.
    ///
    /// Only keys the implementation can be converted to are accepted.
    pub fn add_registration_type(&mut self, key: TypeKey) -> Result<()> {
        let convertible = match &self.shape {
            Shape::Closed(form) => form.can_cast_to(&key),
            Shape::Open { family, .. } => *family == key,
        };
        if !convertible {
            return Err(DiError::incompatible_binding(self.implementation.name(), key.name()));
        }
        if !self.registration_types.contains(&key) {
            self.registration_types.push(key);
        }
        Ok(())
    }

    /// Whether this definition can produce a value for `ty`
    pub fn satisfies(&self, ty: &ServiceType) -> bool {
        self.form_for(ty).is_some_and(|form| form.can_cast_to(&ty.key()))
    }

    pub(crate) fn form_for(&self, ty: &ServiceType) -> Option<&Form> {
        match &self.shape {
            Shape::Closed(form) => Some(form),
            Shape::Open { forms, .. } => {
                let args = ty.generic_args()?;
                if !self.registration_types.contains(&args.family()) {
                    return None;
                }
                forms.get(args.args().first()?)
            }
        }
    }

    /// The single form of a closed definition
    pub(crate) fn closed_form(&self) -> Option<&Form> {
        match &self.shape {
            Shape::Closed(form) => Some(form),
            Shape::Open { .. } => None,
        }
    }

    /// Scope cache arguments: the concrete type arguments for open generics
    pub(crate) fn instance_args<'a>(&self, ty: &'a ServiceType) -> Option<&'a Arc<[TypeKey]>> {
        if self.is_open_generic() {
            ty.generic_args().map(|args| args.args())
        } else {
            None
        }
    }

    #[inline]
    pub(crate) fn on_create(&self) -> &[Callback] {
        &self.on_create
    }

    #[inline]
    pub(crate) fn on_resolve(&self) -> &[Callback] {
        &self.on_resolve
    }
}

impl fmt::Debug for ServiceDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDefinition")
            .field("id", &self.id)
            .field("implementation", &self.implementation)
            .field("lifetime", &self.lifetime())
            .field("registration_types", &self.registration_types)
            .field("open_generic", &self.is_open_generic())
            .field("skip_dispose", &self.skip_dispose)
            .finish()
    }
}

/// Anything that can be registered in a repository.
pub trait IntoDefinition {
    fn into_definition(self) -> Result<ServiceDefinition>;
}

impl IntoDefinition for ServiceDefinition {
    fn into_definition(self) -> Result<ServiceDefinition> {
        Ok(self)
    }
}

fn injector<T: Service>() -> Injector {
    Arc::new(|provider: &ServiceProvider, instance: &AnyArc| {
        match instance.downcast_ref::<Arc<T>>() {
            Some(target) => provider.inject_properties::<T>(target),
            None => Ok(()),
        }
    })
}

fn disposer<P: ?Sized + Dispose + 'static>() -> crate::factory::Disposer {
    Arc::new(|instance: &AnyArc| {
        if let Some(value) = instance.downcast_ref::<Arc<P>>() {
            value.dispose();
        }
    })
}

fn callback<P: ?Sized + Send + Sync + 'static>(
    f: impl Fn(&Arc<P>, &ServiceProvider) + Send + Sync + 'static,
) -> Callback {
    Arc::new(move |instance: &AnyArc, provider: &ServiceProvider| {
        if let Some(value) = instance.downcast_ref::<Arc<P>>() {
            f(value, provider);
        }
    })
}

// =============================================================================
// Definition builder
// =============================================================================

/// Typed builder for a closed definition producing `Arc<P>`.
///
/// # Examples
///
/// ```rust
/// use dependency_resolver::{Constructor, Definition, Service, ServiceRepository};
/// use std::sync::Arc;
///
/// trait Mailer: Send + Sync {}
///
/// struct SmtpMailer;
/// impl Mailer for SmtpMailer {}
///
/// impl Service for SmtpMailer {
///     fn constructors() -> Vec<Constructor<Self>> {
///         vec![Constructor::new([], |_| SmtpMailer)]
///     }
/// }
///
/// let repo = ServiceRepository::new();
/// repo.register(
///     Definition::<SmtpMailer>::new()
///         .as_type::<dyn Mailer>(|m| m)
///         .singleton(),
/// )
/// .unwrap();
///
/// let provider = repo.create_provider();
/// assert!(provider.get::<dyn Mailer>().unwrap().is_some());
/// // explicit registration types replace the defaults
/// assert!(provider.get::<SmtpMailer>().unwrap().is_none());
/// ```
pub struct Definition<P: ?Sized> {
    lifetime: Lifetime,
    form: Form,
    /// Convertible keys in declaration order
    known: Vec<TypeKey>,
    explicit: Option<Vec<TypeKey>>,
    skip_dispose: bool,
    on_create: Vec<Callback>,
    on_resolve: Vec<Callback>,
    error: Option<DiError>,
    _marker: PhantomData<fn() -> Arc<P>>,
}

impl<T: Service> Definition<T> {
    /// Construct `T` from its declared constructors
    pub fn new() -> Self {
        Self::for_service(Activation::Constructors(erase_all(T::constructors())))
    }

    /// Register a pre-built instance
    pub fn instance(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    /// Register a pre-built shared instance
    pub fn from_arc(value: Arc<T>) -> Self {
        let mut def = Self::for_service(Activation::Instance(erase(value)));
        def.lifetime = Lifetime::Singleton;
        def.skip_dispose = true;
        def
    }

    fn for_service(activation: Activation) -> Self {
        let mut def = Self::bare(activation);
        def.form.inject = Some(injector::<T>());
        for binding in T::bindings() {
            if !def.known.contains(&binding.key) {
                def.known.push(binding.key);
            }
            def.form.casters.insert(binding.key, binding.cast);
        }
        def
    }
}

impl<T: Service> Default for Definition<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: ?Sized + Send + Sync + 'static> Definition<P> {
    fn bare(activation: Activation) -> Self {
        let key = TypeKey::of::<P>();
        let mut form = Form::new(key, activation);
        form.casters.insert(key, identity_caster::<P>());
        Self {
            lifetime: Lifetime::Transient,
            form,
            known: vec![key],
            explicit: None,
            skip_dispose: false,
            on_create: Vec::new(),
            on_resolve: Vec::new(),
            error: None,
            _marker: PhantomData,
        }
    }

    /// Produce instances with a custom factory `(provider, requested type) -> Arc<P>`
    pub fn factory(
        factory: impl Fn(&ServiceProvider, &ServiceType) -> Result<Arc<P>> + Send + Sync + 'static,
    ) -> Self {
        Self::bare(Activation::Factory(Arc::new(move |provider, ty| {
            factory(provider, ty).map(erase)
        })))
    }

    /// Register a pre-built shared value, including trait objects
    pub fn shared(value: Arc<P>) -> Self {
        let mut def = Self::bare(Activation::Instance(erase(value)));
        def.lifetime = Lifetime::Singleton;
        def.skip_dispose = true;
        def
    }

    fn push_explicit(&mut self, key: TypeKey) {
        let explicit = self.explicit.get_or_insert_with(Vec::new);
        if !explicit.contains(&key) {
            explicit.push(key);
        }
    }

    /// Make the definition requestable as `K`.
    ///
    /// The first explicit registration type replaces the default set.
    pub fn as_type<K: ?Sized + Send + Sync + 'static>(
        mut self,
        cast: impl Fn(Arc<P>) -> Arc<K> + Send + Sync + 'static,
    ) -> Self {
        let key = TypeKey::of::<K>();
        self.form.casters.insert(key, caster(cast));
        self.push_explicit(key);
        self
    }

    /// Make the definition requestable as the implementation type itself
    pub fn as_self(mut self) -> Self {
        self.push_explicit(TypeKey::of::<P>());
        self
    }

    /// Make the definition requestable as a type it already declares a binding for.
    ///
    /// Fails at registration when no such binding exists.
    pub fn as_binding<K: ?Sized + 'static>(mut self) -> Self {
        let key = TypeKey::of::<K>();
        if self.form.can_cast_to(&key) {
            self.push_explicit(key);
        } else if self.error.is_none() {
            self.error = Some(DiError::incompatible_binding(
                std::any::type_name::<P>(),
                key.name(),
            ));
        }
        self
    }

    pub fn with_lifetime(mut self, lifetime: Lifetime) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub fn transient(self) -> Self {
        self.with_lifetime(Lifetime::Transient)
    }

    pub fn scoped(self) -> Self {
        self.with_lifetime(Lifetime::Scoped)
    }

    pub fn singleton(self) -> Self {
        self.with_lifetime(Lifetime::Singleton)
    }

    /// Leave instances alone when their scope is disposed
    pub fn skip_dispose(mut self) -> Self {
        self.skip_dispose = true;
        self
    }

    /// Dispose cached instances with their scope
    pub fn disposable(mut self) -> Self
    where
        P: Dispose,
    {
        self.form.disposer = Some(disposer::<P>());
        self
    }

    /// Run after each construction, once properties are injected
    pub fn on_create(mut self, f: impl Fn(&Arc<P>, &ServiceProvider) + Send + Sync + 'static) -> Self {
        self.on_create.push(callback(f));
        self
    }

    /// Run on every resolution, cache hits included
    pub fn on_resolve(mut self, f: impl Fn(&Arc<P>, &ServiceProvider) + Send + Sync + 'static) -> Self {
        self.on_resolve.push(callback(f));
        self
    }

    pub fn build(self) -> Result<ServiceDefinition> {
        if let Some(error) = self.error {
            return Err(error);
        }
        Ok(ServiceDefinition {
            id: DefinitionId::next(),
            implementation: self.form.implementation,
            lifetime: self.lifetime,
            registration_types: self.explicit.unwrap_or(self.known),
            shape: Shape::Closed(self.form),
            skip_dispose: self.skip_dispose,
            on_create: self.on_create,
            on_resolve: self.on_resolve,
        })
    }
}

impl<P: ?Sized + Send + Sync + 'static> IntoDefinition for Definition<P> {
    fn into_definition(self) -> Result<ServiceDefinition> {
        self.build()
    }
}

// =============================================================================
// Open generics
// =============================================================================

/// Builder for an open-generic definition of family `F`.
///
/// Each closed form is listed explicitly; a request for `F::Of<A>` only
/// matches when a form for `A` was added.
pub struct GenericDefinition<F: GenericFamily> {
    lifetime: Lifetime,
    forms: HashMap<TypeKey, Form, RandomState>,
    families: Vec<TypeKey>,
    skip_dispose: bool,
    on_create: Vec<Callback>,
    on_resolve: Vec<Callback>,
    error: Option<DiError>,
    _marker: PhantomData<fn() -> F>,
}

impl<F: GenericFamily> GenericDefinition<F> {
    pub fn new() -> Self {
        Self {
            lifetime: Lifetime::Transient,
            forms: HashMap::with_hasher(RandomState::new()),
            families: vec![TypeKey::of::<F>()],
            skip_dispose: false,
            on_create: Vec::new(),
            on_resolve: Vec::new(),
            error: None,
            _marker: PhantomData,
        }
    }

    fn insert_form<A: Send + Sync + 'static>(&mut self, activation: Activation) -> &mut Form {
        let key = TypeKey::of::<F::Of<A>>();
        let mut form = Form::new(key, activation);
        form.casters.insert(key, identity_caster::<F::Of<A>>());
        match self.forms.entry(TypeKey::of::<A>()) {
            Entry::Occupied(mut slot) => {
                slot.insert(form);
                slot.into_mut()
            }
            Entry::Vacant(slot) => slot.insert(form),
        }
    }

    /// Add the closed form `F::Of<A>`, built from its declared constructors
    pub fn close<A: Send + Sync + 'static>(mut self) -> Self
    where
        F::Of<A>: Service,
    {
        let form = self.insert_form::<A>(Activation::Constructors(erase_all(
            <F::Of<A> as Service>::constructors(),
        )));
        form.inject = Some(injector::<F::Of<A>>());
        self
    }

    /// Add the closed form `F::Of<A>`, built by `factory`
    pub fn close_with<A: Send + Sync + 'static>(
        mut self,
        factory: impl Fn(&ServiceProvider) -> Result<Arc<F::Of<A>>> + Send + Sync + 'static,
    ) -> Self {
        self.insert_form::<A>(Activation::Factory(Arc::new(move |provider, _| {
            factory(provider).map(erase)
        })));
        self
    }

    /// Expose the closed form for `A` as `G::Of<A>` too, and index under family `G`
    pub fn expose<G: GenericFamily, A: Send + Sync + 'static>(
        mut self,
        cast: impl Fn(Arc<F::Of<A>>) -> Arc<G::Of<A>> + Send + Sync + 'static,
    ) -> Self {
        match self.forms.get_mut(&TypeKey::of::<A>()) {
            Some(form) => {
                form.casters.insert(TypeKey::of::<G::Of<A>>(), caster(cast));
                let family = TypeKey::of::<G>();
                if !self.families.contains(&family) {
                    self.families.push(family);
                }
            }
            None => {
                if self.error.is_none() {
                    self.error = Some(DiError::incompatible_binding(
                        std::any::type_name::<F::Of<A>>(),
                        std::any::type_name::<G::Of<A>>(),
                    ));
                }
            }
        }
        self
    }

    /// Dispose cached `F::Of<A>` instances with their scope
    pub fn disposable<A: Send + Sync + 'static>(mut self) -> Self
    where
        F::Of<A>: Dispose,
    {
        if let Some(form) = self.forms.get_mut(&TypeKey::of::<A>()) {
            form.disposer = Some(disposer::<F::Of<A>>());
        }
        self
    }

    pub fn with_lifetime(mut self, lifetime: Lifetime) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub fn transient(self) -> Self {
        self.with_lifetime(Lifetime::Transient)
    }

    pub fn scoped(self) -> Self {
        self.with_lifetime(Lifetime::Scoped)
    }

    pub fn singleton(self) -> Self {
        self.with_lifetime(Lifetime::Singleton)
    }

    pub fn skip_dispose(mut self) -> Self {
        self.skip_dispose = true;
        self
    }

    /// Run after each construction of `F::Of<A>`, once properties are injected
    pub fn on_create<A: Send + Sync + 'static>(
        mut self,
        f: impl Fn(&Arc<F::Of<A>>, &ServiceProvider) + Send + Sync + 'static,
    ) -> Self {
        self.on_create.push(callback(f));
        self
    }

    /// Run on every resolution of `F::Of<A>`, cache hits included
    pub fn on_resolve<A: Send + Sync + 'static>(
        mut self,
        f: impl Fn(&Arc<F::Of<A>>, &ServiceProvider) + Send + Sync + 'static,
    ) -> Self {
        self.on_resolve.push(callback(f));
        self
    }

    pub fn build(self) -> Result<ServiceDefinition> {
        if let Some(error) = self.error {
            return Err(error);
        }
        let family = TypeKey::of::<F>();
        Ok(ServiceDefinition {
            id: DefinitionId::next(),
            implementation: family,
            lifetime: self.lifetime,
            registration_types: self.families,
            shape: Shape::Open {
                family,
                forms: self.forms,
            },
            skip_dispose: self.skip_dispose,
            on_create: self.on_create,
            on_resolve: self.on_resolve,
        })
    }
}

impl<F: GenericFamily> Default for GenericDefinition<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: GenericFamily> IntoDefinition for GenericDefinition<F> {
    fn into_definition(self) -> Result<ServiceDefinition> {
        self.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constructor::Constructor;
    use crate::factory::Binding;

    trait Greeter: Send + Sync {}
    trait Other: Send + Sync {}

    struct English;
    impl Greeter for English {}

    impl Service for English {
        fn constructors() -> Vec<Constructor<Self>> {
            vec![Constructor::new([], |_| English)]
        }

        fn bindings() -> Vec<Binding<Self>> {
            vec![Binding::<Self>::to::<dyn Greeter>(|e| e)]
        }
    }

    struct Bag<T>(Vec<T>);

    impl<T: Send + Sync + 'static> Service for Bag<T> {
        fn constructors() -> Vec<Constructor<Self>> {
            vec![Constructor::new([], |_| Bag(Vec::new()))]
        }
    }

    struct BagFamily;

    impl GenericFamily for BagFamily {
        type Of<A: Send + Sync + 'static> = Bag<A>;
    }

    #[test]
    fn test_default_registration_types() {
        let def = Definition::<English>::new().build().unwrap();
        assert_eq!(
            def.registration_types(),
            &[TypeKey::of::<English>(), TypeKey::of::<dyn Greeter>()]
        );
        assert_eq!(def.lifetime(), Lifetime::Transient);
        assert!(def.satisfies(&ServiceType::of::<dyn Greeter>()));
    }

    #[test]
    fn test_explicit_types_replace_defaults() {
        let def = Definition::<English>::new()
            .as_binding::<dyn Greeter>()
            .build()
            .unwrap();
        assert_eq!(def.registration_types(), &[TypeKey::of::<dyn Greeter>()]);
    }

    #[test]
    fn test_unknown_binding_fails_at_build() {
        let err = Definition::<English>::new().as_binding::<dyn Other>().build().unwrap_err();
        assert!(matches!(err, DiError::IncompatibleBinding { .. }));

        let mut def = Definition::<English>::new().build().unwrap();
        assert!(def.add_registration_type(TypeKey::of::<dyn Other>()).is_err());
        assert!(def.add_registration_type(TypeKey::of::<dyn Greeter>()).is_ok());
    }

    #[test]
    fn test_instance_is_singleton_and_skips_dispose() {
        let def = Definition::instance(English).scoped().build().unwrap();
        assert!(def.has_instance());
        assert_eq!(def.lifetime(), Lifetime::Singleton);
        assert!(def.skips_dispose());
    }

    #[test]
    fn test_definitions_have_unique_ids() {
        let a = Definition::<English>::new().build().unwrap();
        let b = Definition::<English>::new().build().unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_open_generic_matches_closed_forms_only() {
        let def = GenericDefinition::<BagFamily>::new().close::<u32>().build().unwrap();

        assert!(def.is_open_generic());
        assert!(def.satisfies(&ServiceType::generic::<BagFamily, u32>()));
        assert!(!def.satisfies(&ServiceType::generic::<BagFamily, String>()));
        assert!(!def.satisfies(&ServiceType::of::<Bag<u32>>()));

        let ty = ServiceType::generic::<BagFamily, u32>();
        assert_eq!(&def.instance_args(&ty).unwrap()[..], &[TypeKey::of::<u32>()]);
    }

    #[test]
    fn test_expose_requires_closed_form() {
        struct ListFamily;
        impl GenericFamily for ListFamily {
            type Of<A: Send + Sync + 'static> = Bag<A>;
        }

        let err = GenericDefinition::<BagFamily>::new()
            .expose::<ListFamily, u8>(|b| b)
            .build()
            .unwrap_err();
        assert!(matches!(err, DiError::IncompatibleBinding { .. }));
    }
}
