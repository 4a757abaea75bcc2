//! Constructor descriptors
//!
//! A [`Constructor`] is a list of formal parameters plus the function that
//! builds the service from the bound argument values. The provider never
//! inspects the build function; it scores constructors by their [`Param`]s
//! alone.

use crate::error::{BoxError, DiError, Result};
use crate::key::{AnyArc, GenericFamily, ServiceType};
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

// =============================================================================
// Param
// =============================================================================

/// A formal constructor parameter.
#[derive(Clone)]
pub struct Param {
    name: Cow<'static, str>,
    ty: ServiceType,
    nullable: bool,
    caller_only: bool,
}

impl Param {
    pub fn new(name: impl Into<Cow<'static, str>>, ty: ServiceType) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: true,
            caller_only: false,
        }
    }

    /// Parameter of type `K`
    pub fn of<K: ?Sized + Send + Sync + 'static>(name: impl Into<Cow<'static, str>>) -> Self {
        Self::new(name, ServiceType::of::<K>())
    }

    /// Parameter of type `Lazy<K>`
    pub fn lazy<K: ?Sized + Send + Sync + 'static>(name: impl Into<Cow<'static, str>>) -> Self {
        Self::new(name, ServiceType::lazy::<K>())
    }

    /// Parameter of type `Live<K>`
    pub fn live<K: ?Sized + Send + Sync + 'static>(name: impl Into<Cow<'static, str>>) -> Self {
        Self::new(name, ServiceType::live::<K>())
    }

    /// Parameter of type `Collection<K>`
    pub fn all<K: ?Sized + Send + Sync + 'static>(name: impl Into<Cow<'static, str>>) -> Self {
        Self::new(name, ServiceType::collection::<K>())
    }

    /// Parameter of the closed generic type `F::Of<A>`
    pub fn generic<F: GenericFamily, A: Send + Sync + 'static>(
        name: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::new(name, ServiceType::generic::<F, A>())
    }

    /// Refuse explicit null arguments for this parameter
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Only fill this parameter from caller arguments, never from the registry
    pub fn caller_only(mut self) -> Self {
        self.caller_only = true;
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn service_type(&self) -> &ServiceType {
        &self.ty
    }

    #[inline]
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    #[inline]
    pub fn is_caller_only(&self) -> bool {
        self.caller_only
    }
}

impl fmt::Debug for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:?}", self.name, self.ty)
    }
}

// =============================================================================
// Args
// =============================================================================

/// Bound argument values handed to a constructor's build function.
///
/// Slots that were left unresolved, or explicitly filled with null, read as
/// `None`.
pub struct Args {
    values: Vec<Option<AnyArc>>,
}

impl Args {
    pub(crate) fn new(values: Vec<Option<AnyArc>>) -> Self {
        Self { values }
    }

    /// Shared value of the parameter at `index`
    pub fn get<K: ?Sized + Send + Sync + 'static>(&self, index: usize) -> Option<Arc<K>> {
        self.raw(index)?.downcast_ref::<Arc<K>>().cloned()
    }

    /// Cloned value of the parameter at `index`
    pub fn value<V: Clone + Send + Sync + 'static>(&self, index: usize) -> Option<V> {
        self.get::<V>(index).map(|v| V::clone(&v))
    }

    /// Erased payload of the parameter at `index`
    pub fn raw(&self, index: usize) -> Option<&AnyArc> {
        self.values.get(index)?.as_ref()
    }

    pub fn is_null(&self, index: usize) -> bool {
        self.raw(index).is_none()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// =============================================================================
// Constructor
// =============================================================================

type BuildFn<T> = Arc<dyn Fn(&Args) -> Result<T> + Send + Sync>;

/// One construction strategy for `T`.
pub struct Constructor<T> {
    params: Vec<Param>,
    build: BuildFn<T>,
}

impl<T: Send + Sync + 'static> Constructor<T> {
    /// Constructor with an infallible build function
    pub fn new<I>(params: I, build: impl Fn(&Args) -> T + Send + Sync + 'static) -> Self
    where
        I: IntoIterator<Item = Param>,
    {
        Self {
            params: params.into_iter().collect(),
            build: Arc::new(move |args| Ok(build(args))),
        }
    }

    /// Constructor whose build function can fail.
    ///
    /// The error reaches the caller as [`DiError::Construction`] with the
    /// original error as its source.
    pub fn try_new<I, E>(
        params: I,
        build: impl Fn(&Args) -> std::result::Result<T, E> + Send + Sync + 'static,
    ) -> Self
    where
        I: IntoIterator<Item = Param>,
        E: Into<BoxError>,
    {
        Self {
            params: params.into_iter().collect(),
            build: Arc::new(move |args| {
                build(args).map_err(|e| DiError::construction(std::any::type_name::<T>(), e))
            }),
        }
    }

    #[inline]
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub(crate) fn erase(self) -> ErasedConstructor {
        let build = self.build;
        ErasedConstructor {
            params: Arc::from(self.params),
            build: Arc::new(move |args| build(args).map(|value| Arc::new(Arc::new(value)) as AnyArc)),
            type_name: std::any::type_name::<T>(),
        }
    }
}

impl<T> fmt::Debug for Constructor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Constructor").field(&self.params).finish()
    }
}

/// Constructor with its output erased to `Arc<T>` inside an [`AnyArc`].
#[derive(Clone)]
pub(crate) struct ErasedConstructor {
    params: Arc<[Param]>,
    build: Arc<dyn Fn(&Args) -> Result<AnyArc> + Send + Sync>,
    type_name: &'static str,
}

impl ErasedConstructor {
    #[inline]
    pub(crate) fn params(&self) -> &[Param] {
        &self.params
    }

    #[inline]
    pub(crate) fn type_name(&self) -> &'static str {
        self.type_name
    }

    #[inline]
    pub(crate) fn invoke(&self, args: &Args) -> Result<AnyArc> {
        (self.build)(args)
    }
}

impl fmt::Debug for ErasedConstructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:?})", self.type_name, self.params)
    }
}

pub(crate) fn erase_all<T: Send + Sync + 'static>(
    constructors: Vec<Constructor<T>>,
) -> Arc<[ErasedConstructor]> {
    constructors.into_iter().map(Constructor::erase).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Point {
        x: Option<i32>,
        label: Option<String>,
    }

    fn args(values: Vec<Option<AnyArc>>) -> Args {
        Args::new(values)
    }

    #[test]
    fn test_args_typed_access() {
        let a = args(vec![
            Some(Arc::new(Arc::new(7i32)) as AnyArc),
            None,
            Some(Arc::new(Arc::new("hi".to_string())) as AnyArc),
        ]);

        assert_eq!(a.len(), 3);
        assert_eq!(a.value::<i32>(0), Some(7));
        assert!(a.is_null(1));
        assert_eq!(a.value::<String>(2).as_deref(), Some("hi"));
        // wrong type reads as missing
        assert_eq!(a.value::<u8>(0), None);
        assert!(a.get::<i32>(10).is_none());
    }

    #[test]
    fn test_erased_constructor_builds_shared_value() {
        let ctor = Constructor::new(
            [Param::of::<i32>("x"), Param::of::<String>("label").not_null()],
            |args| Point {
                x: args.value(0),
                label: args.value(1),
            },
        );
        assert_eq!(ctor.params().len(), 2);
        assert!(!ctor.params()[1].is_nullable());

        let erased = ctor.erase();
        let built = erased
            .invoke(&args(vec![Some(Arc::new(Arc::new(3i32)) as AnyArc), None]))
            .unwrap();
        let point = built.downcast_ref::<Arc<Point>>().unwrap();
        assert_eq!(**point, Point { x: Some(3), label: None });
    }

    #[test]
    fn test_try_new_wraps_error() {
        let ctor = Constructor::<Point>::try_new([], |_| Err("refused"));
        let err = ctor.erase().invoke(&args(vec![])).unwrap_err();
        assert!(matches!(err, DiError::Construction { .. }));
        assert!(err.to_string().ends_with("refused"));
    }
}
