//! Caller-supplied arguments
//!
//! A [`Parameter`] is one `(name, value, type)` entry passed to
//! `get_with`/`create_with`. Values are typed; a value can also declare the
//! other types it may be assigned to (for example an implementation that may
//! fill a `dyn Trait` slot). [`Parameter::null`] is the typeless null.

use crate::key::{AnyArc, TypeKey};
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

#[derive(Clone)]
struct TypedValue {
    /// Declared type first, then every extra assignable type
    forms: Vec<(TypeKey, AnyArc)>,
}

/// One caller-supplied argument.
#[derive(Clone)]
pub struct Parameter {
    name: Option<Cow<'static, str>>,
    value: Option<TypedValue>,
}

impl Parameter {
    /// Owned value of type `V`
    pub fn value<V: Send + Sync + 'static>(value: V) -> Self {
        Self::shared(Arc::new(value))
    }

    /// Shared value of type `K`
    pub fn shared<K: ?Sized + Send + Sync + 'static>(value: Arc<K>) -> Self {
        Self {
            name: None,
            value: Some(TypedValue {
                forms: vec![(TypeKey::of::<K>(), Arc::new(value) as AnyArc)],
            }),
        }
    }

    /// Shared value of type `V` that may also fill a `K` parameter
    pub fn shared_as<V, K>(value: Arc<V>, cast: impl FnOnce(Arc<V>) -> Arc<K>) -> Self
    where
        V: ?Sized + Send + Sync + 'static,
        K: ?Sized + Send + Sync + 'static,
    {
        let mut param = Self::shared(Arc::clone(&value));
        if let Some(typed) = &mut param.value {
            typed
                .forms
                .push((TypeKey::of::<K>(), Arc::new(cast(value)) as AnyArc));
        }
        param
    }

    /// Typeless null
    pub fn null() -> Self {
        Self {
            name: None,
            value: None,
        }
    }

    /// Match this argument by parameter name instead of by position or type
    pub fn named(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[inline]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.value.is_none()
    }

    /// Declared type, `None` for null
    pub fn declared_type(&self) -> Option<TypeKey> {
        self.value.as_ref().map(|v| v.forms[0].0)
    }

    /// Payload for a parameter of type `key`, when assignable
    pub(crate) fn payload_for(&self, key: &TypeKey) -> Option<&AnyArc> {
        self.value
            .as_ref()?
            .forms
            .iter()
            .find(|(form, _)| form == key)
            .map(|(_, payload)| payload)
    }
}

impl fmt::Debug for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ty = self.declared_type().map(|t| t.name()).unwrap_or("null");
        match &self.name {
            Some(name) => write!(f, "{} = <{}>", name, ty),
            None => write!(f, "<{}>", ty),
        }
    }
}

/// Ordered list of caller-supplied arguments.
#[derive(Clone, Default, Debug)]
pub struct Parameters(Vec<Parameter>);

impl Parameters {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, parameter: Parameter) {
        self.0.push(parameter);
    }

    /// Builder form of [`push`](Self::push)
    pub fn with(mut self, parameter: Parameter) -> Self {
        self.0.push(parameter);
        self
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Parameter> {
        self.0.iter()
    }

    #[inline]
    pub fn as_slice(&self) -> &[Parameter] {
        &self.0
    }
}

impl From<Vec<Parameter>> for Parameters {
    fn from(parameters: Vec<Parameter>) -> Self {
        Self(parameters)
    }
}

impl FromIterator<Parameter> for Parameters {
    fn from_iter<I: IntoIterator<Item = Parameter>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Parameters {
    type Item = &'a Parameter;
    type IntoIter = std::slice::Iter<'a, Parameter>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Build [`Parameters`] inline.
///
/// Positional expressions become typed values, `name = expr` becomes a named
/// value and the bare keyword `null` becomes a typeless null.
///
/// ```rust
/// use dependency_resolver::params;
///
/// let params = params!["X".to_string(), retries = 3u32, null];
/// assert_eq!(params.len(), 3);
/// assert_eq!(params.as_slice()[1].name(), Some("retries"));
/// assert!(params.as_slice()[2].is_null());
/// ```
#[macro_export]
macro_rules! params {
    (@push $list:ident;) => {};
    (@push $list:ident; null $(, $($rest:tt)*)?) => {
        $list.push($crate::Parameter::null());
        $( $crate::params!(@push $list; $($rest)*); )?
    };
    (@push $list:ident; $name:ident = $value:expr $(, $($rest:tt)*)?) => {
        $list.push($crate::Parameter::value($value).named(stringify!($name)));
        $( $crate::params!(@push $list; $($rest)*); )?
    };
    (@push $list:ident; $value:expr $(, $($rest:tt)*)?) => {
        $list.push($crate::Parameter::value($value));
        $( $crate::params!(@push $list; $($rest)*); )?
    };
    () => {
        $crate::Parameters::new()
    };
    ($($args:tt)+) => {{
        let mut list = $crate::Parameters::new();
        $crate::params!(@push list; $($args)+);
        list
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Shape: Send + Sync {}

    struct Square;

    impl Shape for Square {}

    #[test]
    fn test_shared_as_is_assignable_to_both_types() {
        let p = Parameter::shared_as::<Square, dyn Shape>(Arc::new(Square), |s| s);

        assert_eq!(p.declared_type(), Some(TypeKey::of::<Square>()));
        assert!(p.payload_for(&TypeKey::of::<Square>()).is_some());

        let shape = p.payload_for(&TypeKey::of::<dyn Shape>()).unwrap();
        assert!(shape.downcast_ref::<Arc<dyn Shape>>().is_some());
        assert!(p.payload_for(&TypeKey::of::<u8>()).is_none());
    }

    #[test]
    fn test_null_has_no_type() {
        let p = Parameter::null().named("x");
        assert!(p.is_null());
        assert_eq!(p.name(), Some("x"));
        assert_eq!(p.declared_type(), None);
    }

    #[test]
    fn test_params_macro_mixed_forms() {
        let label = "X".to_string();
        let list = params![label.clone(), count = 2usize, null, 5i32];

        let entries = list.as_slice();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].declared_type(), Some(TypeKey::of::<String>()));
        assert_eq!(entries[1].name(), Some("count"));
        assert!(entries[2].is_null());
        assert_eq!(entries[3].declared_type(), Some(TypeKey::of::<i32>()));

        assert!(params![].is_empty());
    }
}
