//! Type identity for service requests
//!
//! Every request the provider answers is described by a [`ServiceType`]: the
//! [`TypeKey`] of the requested type plus its shape. The shape tells the
//! provider whether the request is for a plain service, a closed form of an
//! open-generic [`GenericFamily`], or one of the deferred wrappers
//! ([`Lazy`](crate::Lazy), [`Live`](crate::Live), [`Collection`](crate::Collection)).

use crate::deferred;
use crate::provider::ServiceProvider;
use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Type-erased shared value.
///
/// A value resolved for key `K` is always stored as an `Arc<K>` boxed inside
/// this alias, so `K` itself may be unsized (`dyn Trait`).
pub type AnyArc = Arc<dyn Any + Send + Sync>;

// =============================================================================
// TypeKey
// =============================================================================

/// Identity of a requestable type.
///
/// Equality and hashing only consider the `TypeId`; the name is carried for
/// diagnostics.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    /// Key of `K`
    #[inline]
    pub fn of<K: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<K>(),
            name: std::any::type_name::<K>(),
        }
    }

    #[inline]
    pub fn id(&self) -> TypeId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeKey {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

// =============================================================================
// Open generics
// =============================================================================

/// An unbound generic type shape such as `Repository<_>` or `dyn Store<_>`.
///
/// Implement this on a marker type; `Of<A>` names the closed type for the
/// argument `A`. Shapes with several parameters take a tuple as `A`.
///
/// ```rust
/// use dependency_resolver::GenericFamily;
///
/// struct Repository<T>(Vec<T>);
///
/// struct RepositoryFamily;
///
/// impl GenericFamily for RepositoryFamily {
///     type Of<A: Send + Sync + 'static> = Repository<A>;
/// }
/// ```
pub trait GenericFamily: 'static {
    type Of<A: Send + Sync + 'static>: ?Sized + Send + Sync + 'static;
}

/// The family and concrete argument list of a closed generic request.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct GenericArgs {
    family: TypeKey,
    args: Arc<[TypeKey]>,
}

impl GenericArgs {
    /// Arguments of `F::Of<A>`
    pub fn of<F: GenericFamily, A: Send + Sync + 'static>() -> Self {
        Self {
            family: TypeKey::of::<F>(),
            args: Arc::from([TypeKey::of::<A>()]),
        }
    }

    #[inline]
    pub fn family(&self) -> TypeKey {
        self.family
    }

    #[inline]
    pub fn args(&self) -> &Arc<[TypeKey]> {
        &self.args
    }

    /// Comma separated argument names
    pub fn describe(&self) -> String {
        self.args
            .iter()
            .map(|a| a.name())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Debug for GenericArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}<{}>", self.family, self.describe())
    }
}

// =============================================================================
// ServiceType
// =============================================================================

/// The three deferred wrapper shapes the provider recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Wrapper {
    /// Resolved once on first read, then cached
    Lazy,
    /// Re-resolved on every read
    Live,
    /// Every matching registration, resolved while iterating
    Collection,
}

pub(crate) type WrapperFactory = fn(&ServiceProvider, &ServiceType) -> AnyArc;

/// A deferred request: which wrapper, around which inner request.
pub struct Deferred {
    wrapper: Wrapper,
    inner: ServiceType,
    make: WrapperFactory,
}

impl Deferred {
    #[inline]
    pub fn wrapper(&self) -> Wrapper {
        self.wrapper
    }

    #[inline]
    pub fn inner(&self) -> &ServiceType {
        &self.inner
    }

    /// Build the wrapper value bound to `provider`
    #[inline]
    pub(crate) fn make(&self, provider: &ServiceProvider) -> AnyArc {
        (self.make)(provider, &self.inner)
    }
}

/// Shape of a request.
#[derive(Clone)]
pub enum ServiceKind {
    Plain,
    Generic(GenericArgs),
    Deferred(Arc<Deferred>),
}

/// A request descriptor: the requested type plus its shape.
#[derive(Clone)]
pub struct ServiceType {
    key: TypeKey,
    kind: ServiceKind,
}

impl ServiceType {
    /// A plain request for `K`
    #[inline]
    pub fn of<K: ?Sized + Send + Sync + 'static>() -> Self {
        Self {
            key: TypeKey::of::<K>(),
            kind: ServiceKind::Plain,
        }
    }

    /// A request for the closed generic `F::Of<A>`
    #[inline]
    pub fn generic<F: GenericFamily, A: Send + Sync + 'static>() -> Self {
        Self {
            key: TypeKey::of::<F::Of<A>>(),
            kind: ServiceKind::Generic(GenericArgs::of::<F, A>()),
        }
    }

    /// A request for `Lazy<K>`
    pub fn lazy<K: ?Sized + Send + Sync + 'static>() -> Self {
        Self::deferred(
            TypeKey::of::<crate::Lazy<K>>(),
            Wrapper::Lazy,
            Self::of::<K>(),
            deferred::make_lazy::<K>,
        )
    }

    /// A request for `Live<K>`
    pub fn live<K: ?Sized + Send + Sync + 'static>() -> Self {
        Self::deferred(
            TypeKey::of::<crate::Live<K>>(),
            Wrapper::Live,
            Self::of::<K>(),
            deferred::make_live::<K>,
        )
    }

    /// A request for `Collection<K>`
    pub fn collection<K: ?Sized + Send + Sync + 'static>() -> Self {
        Self::deferred(
            TypeKey::of::<crate::Collection<K>>(),
            Wrapper::Collection,
            Self::of::<K>(),
            deferred::make_collection::<K>,
        )
    }

    /// A request for `Collection<F::Of<A>>`
    pub fn generic_collection<F: GenericFamily, A: Send + Sync + 'static>() -> Self {
        Self::deferred(
            TypeKey::of::<crate::Collection<F::Of<A>>>(),
            Wrapper::Collection,
            Self::generic::<F, A>(),
            deferred::make_collection::<F::Of<A>>,
        )
    }

    fn deferred(key: TypeKey, wrapper: Wrapper, inner: ServiceType, make: WrapperFactory) -> Self {
        Self {
            key,
            kind: ServiceKind::Deferred(Arc::new(Deferred {
                wrapper,
                inner,
                make,
            })),
        }
    }

    #[inline]
    pub fn key(&self) -> TypeKey {
        self.key
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.key.name()
    }

    #[inline]
    pub fn kind(&self) -> &ServiceKind {
        &self.kind
    }

    #[inline]
    pub fn generic_args(&self) -> Option<&GenericArgs> {
        match &self.kind {
            ServiceKind::Generic(args) => Some(args),
            _ => None,
        }
    }

    #[inline]
    pub fn as_deferred(&self) -> Option<&Deferred> {
        match &self.kind {
            ServiceKind::Deferred(deferred) => Some(deferred),
            _ => None,
        }
    }

    #[inline]
    pub fn is_deferred(&self) -> bool {
        matches!(self.kind, ServiceKind::Deferred(_))
    }
}

impl PartialEq for ServiceType {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for ServiceType {}

impl fmt::Debug for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ServiceKind::Plain => write!(f, "{}", self.key),
            ServiceKind::Generic(args) => write!(f, "{} ({:?})", self.key, args),
            ServiceKind::Deferred(d) => write!(f, "{:?}<{:?}>", d.wrapper, d.inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Store<T>: Send + Sync {
        fn put(&self, item: T);
    }

    struct Repo<T>(T);

    struct RepoFamily;

    impl GenericFamily for RepoFamily {
        type Of<A: Send + Sync + 'static> = Repo<A>;
    }

    struct StoreFamily;

    impl GenericFamily for StoreFamily {
        type Of<A: Send + Sync + 'static> = dyn Store<A>;
    }

    #[test]
    fn test_type_key_identity() {
        assert_eq!(TypeKey::of::<u32>(), TypeKey::of::<u32>());
        assert_ne!(TypeKey::of::<u32>(), TypeKey::of::<u64>());
        assert_eq!(
            TypeKey::of::<dyn Store<u8>>().name(),
            std::any::type_name::<dyn Store<u8>>()
        );
    }

    #[test]
    fn test_generic_request_carries_arguments() {
        let ty = ServiceType::generic::<RepoFamily, u32>();
        assert_eq!(ty.key(), TypeKey::of::<Repo<u32>>());

        let args = ty.generic_args().unwrap();
        assert_eq!(args.family(), TypeKey::of::<RepoFamily>());
        assert_eq!(&args.args()[..], &[TypeKey::of::<u32>()]);
        assert_ne!(*args, GenericArgs::of::<RepoFamily, String>());
        assert_ne!(*args, GenericArgs::of::<StoreFamily, u32>());
    }

    #[test]
    fn test_deferred_request_shape() {
        let ty = ServiceType::lazy::<dyn Store<u8>>();
        let deferred = ty.as_deferred().unwrap();

        assert_eq!(deferred.wrapper(), Wrapper::Lazy);
        assert_eq!(deferred.inner(), &ServiceType::of::<dyn Store<u8>>());
        assert_ne!(ty, ServiceType::live::<dyn Store<u8>>());
        assert!(!ServiceType::of::<u8>().is_deferred());
    }
}
