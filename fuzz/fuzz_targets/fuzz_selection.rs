#![no_main]

//! Fuzz target for constructor selection
//!
//! Feeds arbitrary caller arguments to a service with overlapping
//! constructors and checks that selection never panics and honors its
//! basic guarantees.

use arbitrary::Arbitrary;
use dependency_resolver::{
    Constructor, DiError, Definition, Param, Parameter, Parameters, Service, ServiceRepository,
};
use libfuzzer_sys::fuzz_target;
use std::sync::Arc;

struct Clock;

impl Service for Clock {
    fn constructors() -> Vec<Constructor<Self>> {
        vec![Constructor::new([], |_| Clock)]
    }
}

#[allow(dead_code)]
struct Job {
    clock: Option<Arc<Clock>>,
    name: Option<String>,
    attempts: Option<u32>,
}

impl Service for Job {
    fn constructors() -> Vec<Constructor<Self>> {
        vec![
            Constructor::new([], |_| Job {
                clock: None,
                name: None,
                attempts: None,
            }),
            Constructor::new([Param::of::<Clock>("clock")], |args| Job {
                clock: args.get(0),
                name: None,
                attempts: None,
            }),
            Constructor::new(
                [Param::of::<String>("name"), Param::of::<u32>("attempts").not_null()],
                |args| Job {
                    clock: None,
                    name: args.value(0),
                    attempts: args.value(1),
                },
            ),
            Constructor::new(
                [
                    Param::of::<Clock>("clock"),
                    Param::of::<String>("name"),
                    Param::of::<u32>("attempts"),
                ],
                |args| Job {
                    clock: args.get(0),
                    name: args.value(1),
                    attempts: args.value(2),
                },
            ),
        ]
    }
}

/// Parameter names the fuzzer may use; only some exist on `Job`
const NAMES: [&str; 4] = ["clock", "name", "attempts", "missing"];

#[derive(Debug, Arbitrary)]
enum Arg {
    Text(String),
    Number(u32),
    Flag(bool),
    Null,
    NamedText(u8, String),
    NamedNumber(u8, u32),
    NamedNull(u8),
}

#[derive(Debug, Arbitrary)]
struct Scenario {
    register_clock: bool,
    args: Vec<Arg>,
}

fn name(index: u8) -> &'static str {
    NAMES[index as usize % NAMES.len()]
}

fuzz_target!(|scenario: Scenario| {
    let repo = ServiceRepository::new();
    if scenario.register_clock {
        repo.register(Definition::<Clock>::new().singleton()).unwrap();
    }
    repo.register(Definition::<Job>::new()).unwrap();
    let provider = repo.create_provider();

    let mut params = Parameters::new();
    for arg in scenario.args.into_iter().take(6) {
        params.push(match arg {
            Arg::Text(s) => Parameter::value(s),
            Arg::Number(n) => Parameter::value(n),
            Arg::Flag(b) => Parameter::value(b),
            Arg::Null => Parameter::null(),
            Arg::NamedText(i, s) => Parameter::value(s).named(name(i)),
            Arg::NamedNumber(i, n) => Parameter::value(n).named(name(i)),
            Arg::NamedNull(i) => Parameter::null().named(name(i)),
        });
    }
    let count = params.len();

    match provider.create_with::<Job>(&params) {
        Ok(job) => {
            // Every argument was consumed by the selected constructor
            assert!(count <= 3);
            if count == 0 && scenario.register_clock {
                assert!(job.clock.is_some());
            }
        }
        Err(DiError::NoMatchingConstructor { .. }) | Err(DiError::ParameterTypeMismatch { .. }) => {}
        Err(e) => panic!("unexpected error: {e}"),
    }

    // Permissive resolution never fails for a registered service
    assert!(provider.get::<Job>().unwrap().is_some());
});
