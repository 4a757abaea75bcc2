//! Property injection metadata
//!
//! Properties are set after construction through setters that take `&T`, so
//! the target holds them behind interior mutability (`RwLock`, `OnceCell`,
//! ...). The provider reads a type's property list once and caches it.

use crate::deferred::{Collection, Lazy, Live};
use crate::key::{AnyArc, GenericFamily, ServiceType};
use crate::service::Service;
use ahash::RandomState;
use dashmap::DashMap;
use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

type Setter<T> = Arc<dyn Fn(&T, &AnyArc) -> bool + Send + Sync>;

/// An injectable property of `T`.
pub struct Property<T> {
    name: &'static str,
    ty: ServiceType,
    required: bool,
    set: Setter<T>,
}

impl<T: Send + Sync + 'static> Property<T> {
    fn typed<X: ?Sized + Send + Sync + 'static>(
        name: &'static str,
        ty: ServiceType,
        set: impl Fn(&T, Arc<X>) + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            ty,
            required: false,
            set: Arc::new(move |target, payload| match payload.downcast_ref::<Arc<X>>() {
                Some(value) => {
                    set(target, Arc::clone(value));
                    true
                }
                None => false,
            }),
        }
    }

    /// Property holding a `K`
    pub fn of<K: ?Sized + Send + Sync + 'static>(
        name: &'static str,
        set: impl Fn(&T, Arc<K>) + Send + Sync + 'static,
    ) -> Self {
        Self::typed(name, ServiceType::of::<K>(), set)
    }

    /// Property holding a `Lazy<K>`
    pub fn lazy<K: ?Sized + Send + Sync + 'static>(
        name: &'static str,
        set: impl Fn(&T, Arc<Lazy<K>>) + Send + Sync + 'static,
    ) -> Self {
        Self::typed(name, ServiceType::lazy::<K>(), set)
    }

    /// Property holding a `Live<K>`
    pub fn live<K: ?Sized + Send + Sync + 'static>(
        name: &'static str,
        set: impl Fn(&T, Arc<Live<K>>) + Send + Sync + 'static,
    ) -> Self {
        Self::typed(name, ServiceType::live::<K>(), set)
    }

    /// Property holding every registered `K`
    pub fn all<K: ?Sized + Send + Sync + 'static>(
        name: &'static str,
        set: impl Fn(&T, Arc<Collection<K>>) + Send + Sync + 'static,
    ) -> Self {
        Self::typed(name, ServiceType::collection::<K>(), set)
    }

    /// Property holding the closed generic `F::Of<A>`
    pub fn generic<F: GenericFamily, A: Send + Sync + 'static>(
        name: &'static str,
        set: impl Fn(&T, Arc<F::Of<A>>) + Send + Sync + 'static,
    ) -> Self {
        Self::typed(name, ServiceType::generic::<F, A>(), set)
    }

    /// Fail resolution when this property cannot be satisfied
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn service_type(&self) -> &ServiceType {
        &self.ty
    }

    #[inline]
    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Assign `payload` (an `Arc` of the property type); false on type mismatch
    pub(crate) fn apply(&self, target: &T, payload: &AnyArc) -> bool {
        (self.set)(target, payload)
    }
}

impl<T> fmt::Debug for Property<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("name", &self.name)
            .field("type", &self.ty)
            .field("required", &self.required)
            .finish()
    }
}

/// Per-type cache of property lists.
pub(crate) struct PropertyCache {
    entries: DashMap<TypeId, AnyArc, RandomState>,
}

impl PropertyCache {
    pub(crate) fn new() -> Self {
        Self {
            entries: DashMap::with_capacity_and_hasher_and_shard_amount(0, RandomState::new(), 8),
        }
    }

    /// Properties of `T`, read from `T::properties()` on first use
    pub(crate) fn get<T: Service>(&self) -> Arc<Vec<Property<T>>> {
        let entry = self
            .entries
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Arc::new(T::properties()) as AnyArc)
            .value()
            .clone();

        // keyed by TypeId::of::<T>, so the downcast only fails if the entry was never ours
        Arc::downcast::<Vec<Property<T>>>(entry).unwrap_or_else(|_| Arc::new(T::properties()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constructor::Constructor;
    use std::sync::RwLock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Holder {
        label: RwLock<Option<Arc<String>>>,
    }

    impl Service for Holder {
        fn constructors() -> Vec<Constructor<Self>> {
            vec![Constructor::new([], |_| Holder::default())]
        }

        fn properties() -> Vec<Property<Self>> {
            vec![Property::of::<String>("label", |h: &Holder, v| {
                *h.label.write().unwrap() = Some(v);
            })
            .required()]
        }
    }

    #[test]
    fn test_setter_applies_matching_payload() {
        let props = Holder::properties();
        let holder = Holder::default();

        assert!(props[0].is_required());
        assert!(!props[0].apply(&holder, &(Arc::new(Arc::new(1u8)) as AnyArc)));
        assert!(props[0].apply(&holder, &(Arc::new(Arc::new("x".to_string())) as AnyArc)));
        assert_eq!(holder.label.read().unwrap().as_deref().map(String::as_str), Some("x"));
    }

    #[test]
    fn test_cache_reads_metadata_once() {
        static COUNTED_READS: AtomicUsize = AtomicUsize::new(0);

        struct Counted;

        impl Service for Counted {
            fn constructors() -> Vec<Constructor<Self>> {
                vec![Constructor::new([], |_| Counted)]
            }

            fn properties() -> Vec<Property<Self>> {
                COUNTED_READS.fetch_add(1, Ordering::SeqCst);
                Vec::new()
            }
        }

        let cache = PropertyCache::new();
        let first = cache.get::<Counted>();
        let second = cache.get::<Counted>();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(COUNTED_READS.load(Ordering::SeqCst), 1);
    }
}
