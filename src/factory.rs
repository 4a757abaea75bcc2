//! How a definition produces and converts its instances
//!
//! A definition activates its implementation in one of three ways: a stored
//! instance, a custom factory function, or the best of its constructors.
//! The produced value is then converted into each registration type through
//! a caster that was built from a typed closure at registration time.

use crate::constructor::ErasedConstructor;
use crate::error::Result;
use crate::key::{AnyArc, GenericFamily, ServiceType, TypeKey};
use crate::provider::ServiceProvider;
use ahash::RandomState;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

/// Converts an erased `Arc<Impl>` into an erased `Arc<Service>`.
pub(crate) type Caster = Arc<dyn Fn(&AnyArc) -> Option<AnyArc> + Send + Sync>;

/// Custom factory: `(provider, requested type) -> instance`.
pub(crate) type FactoryFn =
    Arc<dyn Fn(&ServiceProvider, &ServiceType) -> Result<AnyArc> + Send + Sync>;

/// Lifecycle callback: `(instance, provider)`.
pub(crate) type Callback = Arc<dyn Fn(&AnyArc, &ServiceProvider) + Send + Sync>;

/// Property injection for one implementation type.
pub(crate) type Injector = Arc<dyn Fn(&ServiceProvider, &AnyArc) -> Result<()> + Send + Sync>;

/// Disposal of one cached instance.
pub(crate) type Disposer = Arc<dyn Fn(&AnyArc) + Send + Sync>;

pub(crate) fn caster<T, K, F>(cast: F) -> Caster
where
    T: ?Sized + Send + Sync + 'static,
    K: ?Sized + Send + Sync + 'static,
    F: Fn(Arc<T>) -> Arc<K> + Send + Sync + 'static,
{
    Arc::new(move |instance: &AnyArc| {
        instance
            .downcast_ref::<Arc<T>>()
            .map(|value| Arc::new(cast(Arc::clone(value))) as AnyArc)
    })
}

pub(crate) fn identity_caster<T: ?Sized + Send + Sync + 'static>() -> Caster {
    caster::<T, T, _>(|value| value)
}

pub(crate) fn erase<T: ?Sized + Send + Sync + 'static>(value: Arc<T>) -> AnyArc {
    Arc::new(value)
}

// =============================================================================
// Binding
// =============================================================================

/// A type `T` can be registered as.
///
/// Built from a conversion closure, so binding an implementation to an
/// interface it does not implement is rejected by the compiler. Name the
/// implementation explicitly, `Binding::<Self>::to::<dyn I>(|s| s)`: with
/// only the target named, `|s| s` would infer `T = dyn I`.
pub struct Binding<T: ?Sized> {
    pub(crate) key: TypeKey,
    pub(crate) cast: Caster,
    _marker: PhantomData<fn(Arc<T>)>,
}

impl<T: ?Sized + Send + Sync + 'static> Binding<T> {
    /// Bind `T` as `K`
    pub fn to<K>(cast: impl Fn(Arc<T>) -> Arc<K> + Send + Sync + 'static) -> Self
    where
        K: ?Sized + Send + Sync + 'static,
    {
        Self {
            key: TypeKey::of::<K>(),
            cast: caster(cast),
            _marker: PhantomData,
        }
    }

    /// Bind `T` as the closed generic `F::Of<A>`
    pub fn to_generic<F, A>(cast: impl Fn(Arc<T>) -> Arc<F::Of<A>> + Send + Sync + 'static) -> Self
    where
        F: GenericFamily,
        A: Send + Sync + 'static,
    {
        Self::to::<F::Of<A>>(cast)
    }

    /// Bind `T` as itself
    pub fn identity() -> Self {
        Self {
            key: TypeKey::of::<T>(),
            cast: identity_caster::<T>(),
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn key(&self) -> TypeKey {
        self.key
    }
}

// =============================================================================
// Activation
// =============================================================================

/// How a form produces its instance
#[derive(Clone)]
pub(crate) enum Activation {
    /// Pre-built instance, returned as is
    Instance(AnyArc),
    /// Custom factory function
    Factory(FactoryFn),
    /// Best-scoring constructor
    Constructors(Arc<[ErasedConstructor]>),
}

/// Everything needed to build and convert one concrete implementation type.
///
/// Closed definitions own exactly one form; open-generic definitions own one
/// per closed type argument.
#[derive(Clone)]
pub(crate) struct Form {
    pub(crate) implementation: TypeKey,
    pub(crate) activation: Activation,
    pub(crate) casters: HashMap<TypeKey, Caster, RandomState>,
    pub(crate) inject: Option<Injector>,
    pub(crate) disposer: Option<Disposer>,
}

impl Form {
    pub(crate) fn new(implementation: TypeKey, activation: Activation) -> Self {
        Self {
            implementation,
            activation,
            casters: HashMap::with_hasher(RandomState::new()),
            inject: None,
            disposer: None,
        }
    }

    /// Convert an instance of this form into the payload for `key`
    pub(crate) fn cast(&self, instance: &AnyArc, key: &TypeKey) -> Option<AnyArc> {
        self.casters.get(key).and_then(|cast| cast(instance))
    }

    #[inline]
    pub(crate) fn can_cast_to(&self, key: &TypeKey) -> bool {
        self.casters.contains_key(key)
    }

    pub(crate) fn constructors(&self) -> Option<&Arc<[ErasedConstructor]>> {
        match &self.activation {
            Activation::Constructors(ctors) => Some(ctors),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Named: Send + Sync {
        fn name(&self) -> &str;
    }

    struct Widget;

    impl Named for Widget {
        fn name(&self) -> &str {
            "widget"
        }
    }

    #[test]
    fn test_binding_casts_to_interface() {
        let binding = Binding::<Widget>::to::<dyn Named>(|w| w);
        assert_eq!(binding.key(), TypeKey::of::<dyn Named>());

        let instance = erase(Arc::new(Widget));
        let payload = (binding.cast)(&instance).unwrap();
        let named = payload.downcast_ref::<Arc<dyn Named>>().unwrap();
        assert_eq!(named.name(), "widget");
    }

    impl crate::service::Service for Widget {
        fn constructors() -> Vec<crate::constructor::Constructor<Self>> {
            vec![crate::constructor::Constructor::new([], |_| Widget)]
        }

        fn bindings() -> Vec<Binding<Self>> {
            vec![Binding::<Self>::to::<dyn Named>(|w| w)]
        }
    }

    #[test]
    fn test_service_bindings_keep_implementation_type() {
        use crate::service::Service;

        let bindings: Vec<Binding<Widget>> = Widget::bindings();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].key(), TypeKey::of::<dyn Named>());

        let payload = (bindings[0].cast)(&erase(Arc::new(Widget))).unwrap();
        assert!(payload.downcast_ref::<Arc<dyn Named>>().is_some());
    }

    #[test]
    fn test_caster_rejects_foreign_payload() {
        let cast = identity_caster::<Widget>();
        assert!(cast(&erase(Arc::new(5u32))).is_none());
    }

    #[test]
    fn test_form_cast_by_key() {
        let mut form = Form::new(TypeKey::of::<Widget>(), Activation::Instance(erase(Arc::new(Widget))));
        form.casters.insert(TypeKey::of::<Widget>(), identity_caster::<Widget>());

        let Activation::Instance(instance) = &form.activation else {
            panic!("expected instance activation");
        };
        assert!(form.cast(instance, &TypeKey::of::<Widget>()).is_some());
        assert!(form.cast(instance, &TypeKey::of::<dyn Named>()).is_none());
        assert!(form.constructors().is_none());
    }
}
