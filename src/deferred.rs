//! Deferred dependencies
//!
//! [`Lazy`], [`Live`] and [`Collection`] postpone resolution until their
//! value is read. They hold a weak reference to the provider that made
//! them, so a wrapper cached in a scope never keeps that scope alive.

use crate::definition::ServiceDefinition;
use crate::error::{DiError, Result};
use crate::key::{AnyArc, ServiceType};
use crate::provider::{ServiceProvider, WeakProvider};
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::Arc;

fn downcast<K: ?Sized + Send + Sync + 'static>(payload: AnyArc) -> Option<Arc<K>> {
    payload.downcast_ref::<Arc<K>>().cloned()
}

// =============================================================================
// Lazy
// =============================================================================

/// A dependency resolved on first read and cached afterwards.
pub struct Lazy<K: ?Sized> {
    provider: WeakProvider,
    ty: ServiceType,
    value: OnceCell<Arc<K>>,
}

impl<K: ?Sized + Send + Sync + 'static> Lazy<K> {
    pub(crate) fn new(provider: &ServiceProvider, ty: ServiceType) -> Self {
        Self {
            provider: provider.downgrade(),
            ty,
            value: OnceCell::new(),
        }
    }

    /// Resolve on first call; later calls return the same instance.
    ///
    /// `Ok(None)` when nothing is registered for `K` at the time of the read.
    /// A miss is not cached.
    pub fn value(&self) -> Result<Option<Arc<K>>> {
        if let Some(value) = self.value.get() {
            return Ok(Some(Arc::clone(value)));
        }
        let provider = self.provider.upgrade()?;
        let Some(resolved) = provider.resolve_payload(&self.ty, None)?.and_then(downcast::<K>) else {
            return Ok(None);
        };
        Ok(Some(Arc::clone(self.value.get_or_init(|| resolved))))
    }

    /// Whether the value has been resolved already
    pub fn is_value_created(&self) -> bool {
        self.value.get().is_some()
    }
}

impl<K: ?Sized> fmt::Debug for Lazy<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lazy")
            .field("type", &self.ty)
            .field("created", &self.value.get().is_some())
            .finish()
    }
}

// =============================================================================
// Live
// =============================================================================

/// A dependency re-resolved on every read.
///
/// Reads observe registrations made after the wrapper was handed out.
pub struct Live<K: ?Sized> {
    provider: WeakProvider,
    ty: ServiceType,
    _marker: std::marker::PhantomData<fn() -> Arc<K>>,
}

impl<K: ?Sized + Send + Sync + 'static> Live<K> {
    pub(crate) fn new(provider: &ServiceProvider, ty: ServiceType) -> Self {
        Self {
            provider: provider.downgrade(),
            ty,
            _marker: std::marker::PhantomData,
        }
    }

    pub fn value(&self) -> Result<Option<Arc<K>>> {
        let provider = self.provider.upgrade()?;
        Ok(provider.resolve_payload(&self.ty, None)?.and_then(downcast::<K>))
    }
}

impl<K: ?Sized> fmt::Debug for Live<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Live").field("type", &self.ty).finish()
    }
}

// =============================================================================
// Collection
// =============================================================================

/// Every registration of `K`, resolved one at a time while iterating.
pub struct Collection<K: ?Sized> {
    provider: WeakProvider,
    ty: ServiceType,
    _marker: std::marker::PhantomData<fn() -> Arc<K>>,
}

impl<K: ?Sized + Send + Sync + 'static> Collection<K> {
    pub(crate) fn new(provider: &ServiceProvider, ty: ServiceType) -> Self {
        Self {
            provider: provider.downgrade(),
            ty,
            _marker: std::marker::PhantomData,
        }
    }

    /// Iterate the registrations in registration order.
    ///
    /// Nothing is constructed until the iterator is advanced; each step
    /// resolves exactly one registration.
    pub fn iter(&self) -> Result<CollectionIter<K>> {
        let provider = self.provider.upgrade()?;
        let definitions = provider.definitions_for(&self.ty)?;
        Ok(CollectionIter {
            provider,
            ty: self.ty.clone(),
            definitions: definitions.into_iter(),
            _marker: std::marker::PhantomData,
        })
    }

    /// Number of matching registrations, without constructing any
    pub fn len(&self) -> Result<usize> {
        Ok(self.provider.upgrade()?.definitions_for(&self.ty)?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Resolve every element now
    pub fn to_vec(&self) -> Result<Vec<Arc<K>>> {
        self.iter()?.collect()
    }
}

impl<K: ?Sized> fmt::Debug for Collection<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection").field("type", &self.ty).finish()
    }
}

/// Iterator over the elements of a [`Collection`].
pub struct CollectionIter<K: ?Sized> {
    provider: ServiceProvider,
    ty: ServiceType,
    definitions: std::vec::IntoIter<Arc<ServiceDefinition>>,
    _marker: std::marker::PhantomData<fn() -> Arc<K>>,
}

impl<K: ?Sized + Send + Sync + 'static> Iterator for CollectionIter<K> {
    type Item = Result<Arc<K>>;

    fn next(&mut self) -> Option<Self::Item> {
        for definition in self.definitions.by_ref() {
            match self.provider.resolve_definition(&definition, &self.ty, None) {
                Ok(Some(payload)) => match downcast::<K>(payload) {
                    Some(value) => return Some(Ok(value)),
                    None => {
                        return Some(Err(DiError::CreationFailed {
                            type_name: self.ty.name(),
                            reason: format!("{} produced a value of another type", definition.implementation()),
                        }));
                    }
                },
                // registration without a usable constructor
                Ok(None) => continue,
                Err(error) => return Some(Err(error)),
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.definitions.len()))
    }
}

// =============================================================================
// Wrapper factories referenced by `ServiceType`
// =============================================================================

pub(crate) fn make_lazy<K: ?Sized + Send + Sync + 'static>(
    provider: &ServiceProvider,
    inner: &ServiceType,
) -> AnyArc {
    Arc::new(Arc::new(Lazy::<K>::new(provider, inner.clone())))
}

pub(crate) fn make_live<K: ?Sized + Send + Sync + 'static>(
    provider: &ServiceProvider,
    inner: &ServiceType,
) -> AnyArc {
    Arc::new(Arc::new(Live::<K>::new(provider, inner.clone())))
}

pub(crate) fn make_collection<K: ?Sized + Send + Sync + 'static>(
    provider: &ServiceProvider,
    inner: &ServiceType,
) -> AnyArc {
    Arc::new(Arc::new(Collection::<K>::new(provider, inner.clone())))
}
