//! # Dependency Resolver - Constructor-Scoring Dependency Injection
//!
//! A thread-safe service container that picks, for every service, the
//! constructor it can satisfy best, and caches instances per lifetime scope.
//!
//! ## Features
//!
//! - 🎯 **Constructor selection** - Each service lists its constructors; the
//!   one with the most satisfiable parameters wins
//! - 🔒 **Type-safe bindings** - Interface bindings are conversion closures,
//!   checked by the compiler
//! - 🔄 **Lifetimes** - Transient, scoped and singleton, with exactly-once
//!   construction under concurrent resolution
//! - ♻️ **Disposal** - Scopes dispose their instances newest first
//! - 💤 **Deferred dependencies** - `Lazy`, `Live` and `Collection` wrappers
//! - 🧬 **Open generics** - One registration serving `Repository<A>` for
//!   every listed `A`
//! - 📊 **Observable** - Optional tracing integration with JSON or pretty output
//!
//! ## Quick Start
//!
//! ```rust
//! use dependency_resolver::prelude::*;
//!
//! trait Store: Send + Sync {
//!     fn name(&self) -> &str;
//! }
//!
//! struct MemoryStore;
//!
//! impl Store for MemoryStore {
//!     fn name(&self) -> &str {
//!         "memory"
//!     }
//! }
//!
//! impl Service for MemoryStore {
//!     fn constructors() -> Vec<Constructor<Self>> {
//!         vec![Constructor::new([], |_| MemoryStore)]
//!     }
//!
//!     fn bindings() -> Vec<Binding<Self>> {
//!         vec![Binding::<Self>::to::<dyn Store>(|s| s)]
//!     }
//! }
//!
//! struct Users {
//!     store: Option<Arc<dyn Store>>,
//! }
//!
//! impl Service for Users {
//!     fn constructors() -> Vec<Constructor<Self>> {
//!         vec![
//!             Constructor::new([], |_| Users { store: None }),
//!             Constructor::new([Param::of::<dyn Store>("store")], |args| Users {
//!                 store: args.get::<dyn Store>(0),
//!             }),
//!         ]
//!     }
//! }
//!
//! let repo = ServiceRepository::new();
//! repo.register(Definition::<MemoryStore>::new().singleton()).unwrap();
//! repo.register(Definition::<Users>::new()).unwrap();
//!
//! let provider = repo.create_provider();
//! let users = provider.require::<Users>().unwrap();
//! assert_eq!(users.store.as_ref().unwrap().name(), "memory");
//! ```
//!
//! ## Scopes
//!
//! ```rust
//! use dependency_resolver::prelude::*;
//!
//! struct RequestContext;
//!
//! impl Service for RequestContext {
//!     fn constructors() -> Vec<Constructor<Self>> {
//!         vec![Constructor::new([], |_| RequestContext)]
//!     }
//! }
//!
//! let repo = ServiceRepository::new();
//! repo.register(Definition::<RequestContext>::new().scoped()).unwrap();
//! let root = repo.create_provider();
//!
//! let request = root.create_scope().unwrap();
//! let a = request.require::<RequestContext>().unwrap();
//! let b = request.require::<RequestContext>().unwrap();
//! assert!(Arc::ptr_eq(&a, &b));
//!
//! request.dispose();
//! assert!(request.get::<RequestContext>().is_err());
//! ```

// Lets the derive macro's generated paths resolve inside this crate
extern crate self as dependency_resolver;

mod candidate;
mod constructor;
mod definition;
mod deferred;
mod error;
mod factory;
mod key;
#[cfg(feature = "logging")]
pub mod logging;
mod parameter;
mod property;
mod provider;
mod repository;
mod resolver;
mod scope;
mod service;
mod storage;

pub use constructor::{Args, Constructor, Param};
pub use definition::{Definition, DefinitionId, GenericDefinition, IntoDefinition, ServiceDefinition};
pub use deferred::{Collection, CollectionIter, Lazy, Live};
pub use error::*;
pub use factory::Binding;
pub use key::{AnyArc, Deferred, GenericArgs, GenericFamily, ServiceKind, ServiceType, TypeKey, Wrapper};
pub use parameter::{Parameter, Parameters};
pub use property::Property;
pub use provider::{ProviderOptions, ServiceProvider, WeakProvider};
pub use repository::ServiceRepository;
pub use resolver::{RepositoryObserver, ServiceResolver};
pub use scope::{ScopeId, ServiceScope};
pub use service::{Dispose, Injectable, Lifetime, Service};

#[cfg(feature = "derive")]
pub use dependency_resolver_derive::Service;

// Re-export for convenience
pub use std::sync::Arc;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        Args, Binding, Collection, Constructor, Definition, DiError, Dispose, GenericDefinition,
        GenericFamily, Lazy, Lifetime, Live, Param, Parameter, Parameters, Property, Result,
        Service, ServiceProvider, ServiceRepository, ServiceType, params,
    };
    pub use std::sync::Arc;
}
