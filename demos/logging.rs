//! Example demonstrating logging capabilities
//!
//! Run with JSON logging (production):
//! ```bash
//! cargo run --example logging --features logging-json
//! ```
//!
//! Run with pretty logging (development):
//! ```bash
//! cargo run --example logging --features logging-pretty
//! ```
//!
//! `RUST_LOG=dependency_resolver=trace` also shows constructor scoring.

use dependency_resolver::prelude::*;

#[allow(dead_code)]
struct Database {
    url: String,
}

impl Service for Database {
    fn constructors() -> Vec<Constructor<Self>> {
        vec![Constructor::new([], |_| Database {
            url: "postgres://localhost/mydb".into(),
        })]
    }
}

#[allow(dead_code)]
struct UserService {
    db: Option<Arc<Database>>,
    name: Option<String>,
}

impl Service for UserService {
    fn constructors() -> Vec<Constructor<Self>> {
        vec![
            Constructor::new([Param::of::<Database>("db")], |args| UserService {
                db: args.get(0),
                name: None,
            }),
            Constructor::new(
                [
                    Param::of::<Database>("db"),
                    Param::of::<String>("name").caller_only(),
                ],
                |args| UserService {
                    db: args.get(0),
                    name: args.value(1),
                },
            ),
        ]
    }
}

struct RequestContext;

impl Service for RequestContext {
    fn constructors() -> Vec<Constructor<Self>> {
        vec![Constructor::new([], |_| {
            println!("  [App] RequestContext being created...");
            RequestContext
        })]
    }
}

impl Dispose for RequestContext {
    fn dispose(&self) {
        println!("  [App] RequestContext disposed");
    }
}

fn main() {
    // Uses JSON if logging-json is enabled, pretty otherwise
    dependency_resolver::logging::builder()
        .trace()
        .resolver_only()
        .init();

    println!("=== Dependency Resolver Logging Demo ===\n");

    let repo = ServiceRepository::new();

    // Logs: "Registering service"
    repo.register(Definition::<Database>::new().singleton())
        .unwrap();
    repo.register(Definition::<UserService>::new()).unwrap();
    repo.register(
        Definition::<RequestContext>::new()
            .scoped()
            .disposable(),
    )
    .unwrap();

    // Logs: "Rebuilt service index", "Creating root service provider"
    let provider = repo.create_provider();

    // Logs: "Resolving service", "Scored constructor candidate", "Invoking constructor"
    let _users = provider.require::<UserService>().unwrap();
    let _named = provider
        .create_with::<UserService>(&params![name = "admin".to_string()])
        .unwrap();

    // Logs: "Service not registered"
    let missing = provider.get::<i32>().unwrap();
    assert!(missing.is_none());

    // Logs: "Creating child scope"
    let request_scope = provider.create_scope().unwrap();
    let _ctx = request_scope.require::<RequestContext>().unwrap();

    // Logs: "Disposing service scope"
    request_scope.dispose();

    // Logs: "Disposing service repository", "Disposing service resolver"
    repo.dispose();

    println!("\n=== Demo Complete ===");
    println!("Check the log output above to see structured logging in action!");
    println!("\nTip: Use --features logging-json for production (JSON output)");
    println!("     Use --features logging-pretty for development (colorful output)");
}
