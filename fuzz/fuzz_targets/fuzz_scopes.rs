#![no_main]

//! Fuzz target for scope caching and disposal
//!
//! Resolves scoped and singleton services from several threads across
//! nested scopes and checks exactly-once construction and disposal.

use arbitrary::Arbitrary;
use dependency_resolver::{Constructor, Definition, Dispose, Service, ServiceRepository};
use libfuzzer_sys::fuzz_target;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

struct Counters {
    created: AtomicUsize,
    disposed: AtomicUsize,
}

static SCOPED: Counters = Counters {
    created: AtomicUsize::new(0),
    disposed: AtomicUsize::new(0),
};

struct Session;

impl Service for Session {
    fn constructors() -> Vec<Constructor<Self>> {
        vec![Constructor::new([], |_| {
            SCOPED.created.fetch_add(1, Ordering::SeqCst);
            Session
        })]
    }
}

impl Dispose for Session {
    fn dispose(&self) {
        SCOPED.disposed.fetch_add(1, Ordering::SeqCst);
    }
}

struct Settings;

impl Service for Settings {
    fn constructors() -> Vec<Constructor<Self>> {
        vec![Constructor::new([], |_| Settings)]
    }
}

#[derive(Debug, Clone, Arbitrary)]
enum ThreadOp {
    GetSession,
    GetSettings,
    CanResolve,
    NestedScope,
}

#[derive(Debug, Arbitrary)]
struct Scenario {
    scope_count: u8,
    thread_count: u8,
    ops: Vec<ThreadOp>,
}

fuzz_target!(|scenario: Scenario| {
    let repo = ServiceRepository::new();
    repo.register(Definition::<Session>::new().scoped().disposable())
        .unwrap();
    repo.register(Definition::<Settings>::new().singleton()).unwrap();
    let root = repo.create_provider();

    let scope_count = (scenario.scope_count % 4).max(1) as usize;
    let thread_count = (scenario.thread_count % 8).max(1) as usize;
    let ops: Vec<ThreadOp> = scenario.ops.into_iter().take(50).collect();

    for _ in 0..scope_count {
        let created_before = SCOPED.created.load(Ordering::SeqCst);
        let disposed_before = SCOPED.disposed.load(Ordering::SeqCst);
        let scope = root.create_scope().unwrap();

        let handles: Vec<_> = (0..thread_count)
            .map(|_| {
                let scope = scope.clone();
                let ops = ops.clone();
                thread::spawn(move || {
                    let mut seen = None;
                    for op in ops {
                        match op {
                            ThreadOp::GetSession => {
                                let session = scope.require::<Session>().unwrap();
                                if let Some(prev) = &seen {
                                    assert!(Arc::ptr_eq(prev, &session));
                                }
                                seen = Some(session);
                            }
                            ThreadOp::GetSettings => {
                                let _ = scope.require::<Settings>().unwrap();
                            }
                            ThreadOp::CanResolve => {
                                assert!(scope.can_resolve::<Session>().unwrap());
                            }
                            ThreadOp::NestedScope => {
                                let child = scope.create_scope().unwrap();
                                let _ = child.require::<Session>().unwrap();
                                child.dispose();
                            }
                        }
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        scope.dispose();

        // Everything this round constructed has been disposed exactly once
        let created = SCOPED.created.load(Ordering::SeqCst) - created_before;
        let disposed = SCOPED.disposed.load(Ordering::SeqCst) - disposed_before;
        assert_eq!(created, disposed);
    }

    root.dispose();
});
