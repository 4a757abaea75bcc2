//! Service traits
//!
//! These traits define what can be resolved and how a type describes its own
//! construction to the provider.

use crate::constructor::Constructor;
use crate::factory::Binding;
use crate::property::Property;

/// Marker trait for types that can be stored and shared by the provider.
///
/// This is automatically implemented for all types that are `Send + Sync + 'static`.
/// You never need to implement this manually.
pub trait Injectable: Send + Sync + 'static {}

// Blanket implementation - everything that's Send + Sync + 'static is Injectable
impl<T: Send + Sync + 'static> Injectable for T {}

/// How long a constructed instance is reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Lifetime {
    /// New instance created on every resolve
    #[default]
    Transient,

    /// One instance per scope
    Scoped,

    /// One instance for the whole provider tree, kept in the root scope
    Singleton,
}

impl Lifetime {
    pub fn as_str(&self) -> &'static str {
        match self {
            Lifetime::Transient => "transient",
            Lifetime::Scoped => "scoped",
            Lifetime::Singleton => "singleton",
        }
    }
}

/// A type the provider knows how to build.
///
/// Instead of discovering constructors at runtime, a service lists them
/// explicitly. Each [`Constructor`] names its parameters and supplies the
/// build function; the provider scores every constructor against what it can
/// currently resolve and against the caller's arguments, then invokes the
/// best one.
///
/// # Examples
///
/// ```rust
/// use dependency_resolver::{Binding, Constructor, Param, Service};
/// use std::sync::Arc;
///
/// trait Clock: Send + Sync {
///     fn now(&self) -> u64;
/// }
///
/// struct SystemClock;
///
/// impl Clock for SystemClock {
///     fn now(&self) -> u64 { 42 }
/// }
///
/// impl Service for SystemClock {
///     fn constructors() -> Vec<Constructor<Self>> {
///         vec![Constructor::new([], |_| SystemClock)]
///     }
///
///     fn bindings() -> Vec<Binding<Self>> {
///         vec![Binding::<Self>::to::<dyn Clock>(|c| c)]
///     }
/// }
///
/// struct Greeter {
///     clock: Option<Arc<dyn Clock>>,
///     name: Option<String>,
/// }
///
/// impl Service for Greeter {
///     fn constructors() -> Vec<Constructor<Self>> {
///         vec![
///             Constructor::new([Param::of::<dyn Clock>("clock")], |args| Greeter {
///                 clock: args.get(0),
///                 name: None,
///             }),
///             Constructor::new(
///                 [Param::of::<dyn Clock>("clock"), Param::of::<String>("name")],
///                 |args| Greeter { clock: args.get(0), name: args.value(1) },
///             ),
///         ]
///     }
/// }
/// ```
pub trait Service: Injectable + Sized {
    /// Construction strategies, in declaration order.
    fn constructors() -> Vec<Constructor<Self>>;

    /// Injectable properties, set after construction.
    fn properties() -> Vec<Property<Self>> {
        Vec::new()
    }

    /// Interfaces this type can be registered as, in addition to itself.
    fn bindings() -> Vec<Binding<Self>> {
        Vec::new()
    }
}

/// Disposal contract for instances cached in a scope.
///
/// Called once when the owning scope is disposed, unless the definition was
/// registered with `skip_dispose`.
pub trait Dispose: Send + Sync {
    fn dispose(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_lifetime_is_transient() {
        assert_eq!(Lifetime::default(), Lifetime::Transient);
        assert_eq!(Lifetime::Singleton.as_str(), "singleton");
    }
}
