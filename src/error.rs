//! Error types for service resolution

use std::any::TypeId;
use std::error::Error as StdError;
use std::sync::Arc;
use thiserror::Error;

/// Boxed error produced by a user constructor or factory.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Errors that can occur while registering or resolving services
#[derive(Error, Debug, Clone)]
pub enum DiError {
    /// Service was not found (only raised by strict entry points such as `require`)
    #[error("Service not found: {type_name}")]
    NotFound {
        type_name: &'static str,
        type_id: TypeId,
    },

    /// The resolver was used after it had been disposed
    #[error("Service resolver has been disposed")]
    ResolverDisposed,

    /// The scope was used after it had been disposed
    #[error("Service scope {scope_id} has been disposed")]
    ScopeDisposed { scope_id: u64 },

    /// A named caller argument cannot be assigned to the parameter of the same name
    #[error("Parameter `{name}` of {type_name} expects {expected}, but {actual} was supplied")]
    ParameterTypeMismatch {
        type_name: &'static str,
        name: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// No constructor accepted the supplied caller arguments
    #[error("No matching constructor found for {type_name}")]
    NoMatchingConstructor { type_name: &'static str },

    /// A user constructor or factory returned an error
    #[error("Failed to construct {type_name}: {source}")]
    Construction {
        type_name: &'static str,
        #[source]
        source: Arc<dyn StdError + Send + Sync + 'static>,
    },

    /// Construction produced no usable value
    #[error("Failed to create service {type_name}: {reason}")]
    CreationFailed {
        type_name: &'static str,
        reason: String,
    },

    /// A registration type has no conversion from the implementation
    #[error("{implementation} can't be registered as {service}")]
    IncompatibleBinding {
        implementation: &'static str,
        service: &'static str,
    },

    /// A required property could not be satisfied
    #[error("Required property `{property}` of {type_name} could not be resolved")]
    MissingProperty {
        type_name: &'static str,
        property: &'static str,
    },

    /// Circular dependency detected during construction
    #[error("Circular dependency detected while resolving: {type_name}")]
    CircularDependency { type_name: &'static str },
}

impl DiError {
    /// Create a NotFound error for a type
    #[inline]
    pub fn not_found<T: ?Sized + 'static>() -> Self {
        Self::NotFound {
            type_name: std::any::type_name::<T>(),
            type_id: TypeId::of::<T>(),
        }
    }

    /// Create a CreationFailed error
    #[inline]
    pub fn creation_failed<T: ?Sized + 'static>(reason: impl Into<String>) -> Self {
        Self::CreationFailed {
            type_name: std::any::type_name::<T>(),
            reason: reason.into(),
        }
    }

    /// Create an IncompatibleBinding error
    #[inline]
    pub fn incompatible_binding(implementation: &'static str, service: &'static str) -> Self {
        Self::IncompatibleBinding {
            implementation,
            service,
        }
    }

    /// Wrap an error returned by user construction code
    #[inline]
    pub fn construction(type_name: &'static str, source: impl Into<BoxError>) -> Self {
        let source: BoxError = source.into();
        Self::Construction {
            type_name,
            source: Arc::from(source),
        }
    }

    /// Whether this error signals use of a disposed resolver or scope
    #[inline]
    pub fn is_disposed(&self) -> bool {
        matches!(self, Self::ResolverDisposed | Self::ScopeDisposed { .. })
    }
}

/// Result type alias for DI operations
pub type Result<T> = std::result::Result<T, DiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Boom;

    impl std::fmt::Display for Boom {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("boom")
        }
    }

    impl StdError for Boom {}

    #[test]
    fn test_construction_keeps_source() {
        let err = DiError::construction("Widget", Boom);
        assert_eq!(err.to_string(), "Failed to construct Widget: boom");
        assert_eq!(err.source().map(|s| s.to_string()), Some("boom".to_string()));

        let cloned = err.clone();
        assert!(matches!(cloned, DiError::Construction { type_name: "Widget", .. }));
    }

    #[test]
    fn test_disposed_classification() {
        assert!(DiError::ResolverDisposed.is_disposed());
        assert!(DiError::ScopeDisposed { scope_id: 3 }.is_disposed());
        assert!(!DiError::not_found::<u32>().is_disposed());
    }
}
