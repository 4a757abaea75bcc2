//! Constructor scoring and selection
//!
//! Every constructor of an implementation is evaluated against the caller's
//! arguments and against what the resolver can currently satisfy. Evaluation
//! runs five assignment passes over the formal parameters:
//!
//! 1. reject outright when there are more arguments than parameters
//! 2. named arguments, matched by parameter name (a type mismatch is an error)
//! 3. registered services, for parameters the resolver can satisfy
//! 4. typed positional arguments, first fit in argument order
//! 5. typeless nulls, for nullable parameters
//!
//! Each caller argument must be consumed, otherwise the candidate is not
//! viable. A viable candidate scores `100 * (100 + resolved - n) + n`, so a
//! fully satisfied constructor always beats one with gaps, and among equally
//! satisfied constructors the longer one wins. Equal scores keep declaration
//! order: the first constructor with the highest score is selected.

use crate::constructor::{Args, ErasedConstructor};
use crate::error::{DiError, Result};
use crate::key::{AnyArc, ServiceType};
use crate::parameter::{Parameter, Parameters};
use crate::provider::ServiceProvider;

#[cfg(feature = "logging")]
use tracing::trace;

/// Score of a candidate that cannot be invoked
pub(crate) const NOT_VIABLE: i32 = -1;

/// Where a parameter's value comes from
#[derive(Clone)]
pub(crate) enum ParamSource {
    /// Nothing matched; passed as null
    Unassigned,
    /// Caller-supplied value
    Supplied(AnyArc),
    /// Resolved from the provider at invocation time
    Service(ServiceType),
    /// Explicit null consumed from the caller's arguments
    Null,
}

/// A constructor bound to its parameter sources, with its match score.
#[derive(Clone)]
pub(crate) struct ConstructorCandidate {
    constructor: ErasedConstructor,
    sources: Vec<ParamSource>,
    score: i32,
}

impl ConstructorCandidate {
    fn rejected(constructor: &ErasedConstructor) -> Self {
        Self {
            constructor: constructor.clone(),
            sources: Vec::new(),
            score: NOT_VIABLE,
        }
    }

    /// Score `constructor` against `arguments`.
    ///
    /// `can_satisfy` answers whether the provider could resolve a parameter
    /// type on its own.
    pub(crate) fn evaluate(
        constructor: &ErasedConstructor,
        arguments: Option<&Parameters>,
        can_satisfy: &dyn Fn(&ServiceType) -> bool,
    ) -> Result<Self> {
        let params = constructor.params();
        let supplied: &[Parameter] = arguments.map(Parameters::as_slice).unwrap_or(&[]);
        let n = params.len();

        if supplied.len() > n {
            return Ok(Self::rejected(constructor));
        }

        let mut sources = vec![ParamSource::Unassigned; n];
        let mut resolved_params = 0usize;
        let mut resolved_services = 0usize;

        let (named, unnamed): (Vec<&Parameter>, Vec<&Parameter>) =
            supplied.iter().partition(|p| p.name().is_some());

        for (slot, param) in params.iter().enumerate() {
            let Some(arg) = named.iter().find(|a| a.name() == Some(param.name())) else {
                continue;
            };
            let key = param.service_type().key();
            if arg.is_null() {
                if !param.is_nullable() {
                    return Err(mismatch(constructor, param.name(), key.name(), "null"));
                }
                sources[slot] = ParamSource::Null;
            } else {
                match arg.payload_for(&key) {
                    Some(value) => sources[slot] = ParamSource::Supplied(value.clone()),
                    None => {
                        let actual = arg.declared_type().map(|t| t.name()).unwrap_or("null");
                        return Err(mismatch(constructor, param.name(), key.name(), actual));
                    }
                }
            }
            resolved_params += 1;
        }

        for (slot, param) in params.iter().enumerate() {
            if !matches!(sources[slot], ParamSource::Unassigned) || param.is_caller_only() {
                continue;
            }
            if can_satisfy(param.service_type()) {
                sources[slot] = ParamSource::Service(param.service_type().clone());
                resolved_services += 1;
            }
        }

        let mut typed: Vec<&Parameter> = unnamed.iter().copied().filter(|p| !p.is_null()).collect();
        let mut nulls = unnamed.len() - typed.len();

        for (slot, param) in params.iter().enumerate() {
            if !matches!(sources[slot], ParamSource::Unassigned) {
                continue;
            }
            let key = param.service_type().key();
            if let Some(pos) = typed.iter().position(|a| a.payload_for(&key).is_some()) {
                let arg = typed.remove(pos);
                if let Some(value) = arg.payload_for(&key) {
                    sources[slot] = ParamSource::Supplied(value.clone());
                    resolved_params += 1;
                }
            }
        }

        for (slot, param) in params.iter().enumerate() {
            if nulls == 0 {
                break;
            }
            if matches!(sources[slot], ParamSource::Unassigned) && param.is_nullable() {
                sources[slot] = ParamSource::Null;
                nulls -= 1;
                resolved_params += 1;
            }
        }

        if resolved_params < supplied.len() {
            return Ok(Self::rejected(constructor));
        }

        Ok(Self {
            constructor: constructor.clone(),
            sources,
            score: score(resolved_params + resolved_services, n),
        })
    }

    #[inline]
    pub(crate) fn score(&self) -> i32 {
        self.score
    }

    #[inline]
    pub(crate) fn is_viable(&self) -> bool {
        self.score >= 0
    }

    #[inline]
    pub(crate) fn constructor(&self) -> &ErasedConstructor {
        &self.constructor
    }

    /// Bind every source to a value and run the constructor
    pub(crate) fn invoke(&self, provider: &ServiceProvider) -> Result<AnyArc> {
        let mut values = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            values.push(match source {
                ParamSource::Supplied(value) => Some(value.clone()),
                ParamSource::Service(ty) => provider.resolve_payload(ty, None)?,
                ParamSource::Unassigned | ParamSource::Null => None,
            });
        }
        self.constructor.invoke(&Args::new(values))
    }
}

fn score(resolved: usize, n: usize) -> i32 {
    let resolved = resolved as i32;
    let n = n as i32;
    100 * (100 + resolved - n) + n
}

fn mismatch(
    constructor: &ErasedConstructor,
    name: &str,
    expected: &'static str,
    actual: &'static str,
) -> DiError {
    DiError::ParameterTypeMismatch {
        type_name: constructor.type_name(),
        name: name.to_string(),
        expected,
        actual,
    }
}

/// Pick the highest scoring viable constructor, first declared on ties.
pub(crate) fn select_best(
    constructors: &[ErasedConstructor],
    arguments: Option<&Parameters>,
    can_satisfy: &dyn Fn(&ServiceType) -> bool,
) -> Result<Option<ConstructorCandidate>> {
    let mut best: Option<ConstructorCandidate> = None;

    for constructor in constructors {
        let candidate = ConstructorCandidate::evaluate(constructor, arguments, can_satisfy)?;

        #[cfg(feature = "logging")]
        trace!(
            target: "dependency_resolver",
            constructor = ?candidate.constructor(),
            score = candidate.score(),
            "Scored constructor candidate"
        );

        if !candidate.is_viable() {
            continue;
        }
        if best.as_ref().is_none_or(|b| candidate.score() > b.score()) {
            best = Some(candidate);
        }
    }

    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constructor::{Constructor, Param};
    use crate::key::TypeKey;
    use crate::parameter::Parameter;
    use crate::params;
    use std::sync::Arc;

    trait Service1: Send + Sync {}
    trait Service2: Send + Sync {}

    struct Impl1;
    impl Service1 for Impl1 {}

    /// Records which constructor was chosen
    struct Picked(&'static str);

    fn ctor(label: &'static str, params: Vec<Param>) -> ErasedConstructor {
        Constructor::new(params, move |_| Picked(label)).erase()
    }

    fn service_a() -> Vec<ErasedConstructor> {
        vec![
            ctor("()", vec![]),
            ctor("(int)", vec![Param::of::<i32>("i")]),
            ctor("(string)", vec![Param::of::<String>("s")]),
            ctor("(s1)", vec![Param::of::<dyn Service1>("s1")]),
            ctor("(s2)", vec![Param::of::<dyn Service2>("s2")]),
            ctor("(s1,string)", vec![Param::of::<dyn Service1>("s1"), Param::of::<String>("s")]),
            ctor("(s2,string)", vec![Param::of::<dyn Service2>("s2"), Param::of::<String>("s")]),
            ctor("(s1,s2)", vec![Param::of::<dyn Service1>("s1"), Param::of::<dyn Service2>("s2")]),
            ctor(
                "(s1,s2,int)",
                vec![
                    Param::of::<dyn Service1>("s1"),
                    Param::of::<dyn Service2>("s2"),
                    Param::of::<i32>("i"),
                ],
            ),
            ctor(
                "(s1,s2,string)",
                vec![
                    Param::of::<dyn Service1>("s1"),
                    Param::of::<dyn Service2>("s2"),
                    Param::of::<String>("s"),
                ],
            ),
            ctor("(int,int)", vec![Param::of::<i32>("a"), Param::of::<i32>("b")]),
        ]
    }

    fn registered(keys: Vec<TypeKey>) -> impl Fn(&ServiceType) -> bool {
        move |ty| keys.contains(&ty.key())
    }

    fn winner(
        ctors: &[ErasedConstructor],
        args: Option<&Parameters>,
        can: &dyn Fn(&ServiceType) -> bool,
    ) -> Option<&'static str> {
        let best = select_best(ctors, args, can).unwrap()?;
        let built = best.constructor().invoke(&Args::new(vec![])).unwrap();
        Some(built.downcast_ref::<Arc<Picked>>().unwrap().0)
    }

    #[test]
    fn test_selection_follows_registrations() {
        let ctors = service_a();
        let none = registered(vec![]);
        let s1 = registered(vec![TypeKey::of::<dyn Service1>()]);
        let both = registered(vec![TypeKey::of::<dyn Service1>(), TypeKey::of::<dyn Service2>()]);

        assert_eq!(winner(&ctors, None, &none), Some("()"));
        assert_eq!(winner(&ctors, None, &s1), Some("(s1)"));
        assert_eq!(winner(&ctors, None, &both), Some("(s1,s2)"));
    }

    #[test]
    fn test_caller_argument_prefers_longer_satisfied_constructor() {
        let ctors = service_a();
        let s1 = registered(vec![TypeKey::of::<dyn Service1>()]);
        let none = registered(vec![]);
        let args = params!["X".to_string()];

        assert_eq!(winner(&ctors, Some(&args), &s1), Some("(s1,string)"));
        assert_eq!(winner(&ctors, Some(&args), &none), Some("(string)"));
    }

    #[test]
    fn test_unconsumed_argument_rejects_every_candidate() {
        let ctors = service_a();
        let none = registered(vec![]);
        let args = params![1.5f64];

        assert_eq!(winner(&ctors, Some(&args), &none), None);
    }

    #[test]
    fn test_typed_first_fit_consumes_in_order() {
        let ctors = service_a();
        let none = registered(vec![]);
        let args = params![1i32, 2i32];

        let best = select_best(&ctors, Some(&args), &none).unwrap().unwrap();
        assert_eq!(best.score(), score(2, 2));
        match (&best.sources[0], &best.sources[1]) {
            (ParamSource::Supplied(a), ParamSource::Supplied(b)) => {
                assert_eq!(**a.downcast_ref::<Arc<i32>>().unwrap(), 1);
                assert_eq!(**b.downcast_ref::<Arc<i32>>().unwrap(), 2);
            }
            _ => panic!("expected both slots supplied"),
        }
    }

    #[test]
    fn test_named_argument_overrides_service_slot() {
        let ctors = service_a();
        let s1 = registered(vec![TypeKey::of::<dyn Service1>()]);
        let mine: Arc<dyn Service1> = Arc::new(Impl1);
        let args = Parameters::from(vec![Parameter::shared(mine).named("s1")]);

        let best = select_best(&ctors, Some(&args), &s1).unwrap().unwrap();
        assert_eq!(best.constructor().params().len(), 1);
        assert!(matches!(best.sources[0], ParamSource::Supplied(_)));
    }

    #[test]
    fn test_named_type_mismatch_is_error() {
        let ctors = service_a();
        let none = registered(vec![]);
        let args = params![s = 42i32];

        let err = select_best(&ctors, Some(&args), &none).err().unwrap();
        assert!(matches!(err, DiError::ParameterTypeMismatch { ref name, .. } if name == "s"));
    }

    #[test]
    fn test_null_fills_nullable_parameter_only() {
        let nullable = ctor("(string)", vec![Param::of::<String>("s")]);
        let strict = ctor("(string!)", vec![Param::of::<String>("s").not_null()]);
        let none = registered(vec![]);
        let args = params![null];

        let c = ConstructorCandidate::evaluate(&nullable, Some(&args), &none).unwrap();
        assert!(c.is_viable());
        assert!(matches!(c.sources[0], ParamSource::Null));

        let c = ConstructorCandidate::evaluate(&strict, Some(&args), &none).unwrap();
        assert!(!c.is_viable());
    }

    #[test]
    fn test_caller_only_parameter_skips_registry() {
        let only = ctor("(s1!)", vec![Param::of::<dyn Service1>("s1").caller_only()]);
        let s1 = registered(vec![TypeKey::of::<dyn Service1>()]);

        let c = ConstructorCandidate::evaluate(&only, None, &s1).unwrap();
        assert_eq!(c.score(), score(0, 1));
        assert!(matches!(c.sources[0], ParamSource::Unassigned));
    }

    #[test]
    fn test_too_many_arguments_short_circuits() {
        let c = ConstructorCandidate::evaluate(
            &ctor("()", vec![]),
            Some(&params![1i32]),
            &registered(vec![]),
        )
        .unwrap();
        assert_eq!(c.score(), NOT_VIABLE);
    }

    #[test]
    fn test_score_formula() {
        assert_eq!(score(0, 0), 10000);
        assert_eq!(score(1, 1), 10001);
        assert_eq!(score(2, 2), 10002);
        assert_eq!(score(1, 2), 9902);
        assert!(score(3, 3) > score(2, 3));
    }

    #[test]
    fn test_ties_keep_declaration_order() {
        let ctors = vec![
            ctor("first", vec![Param::of::<i32>("a")]),
            ctor("second", vec![Param::of::<i32>("b")]),
        ];
        assert_eq!(winner(&ctors, Some(&params![1i32]), &registered(vec![])), Some("first"));
    }
}
