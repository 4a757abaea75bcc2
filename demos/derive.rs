//! Example demonstrating the #[derive(Service)] macro
//!
//! Run with:
//!   cargo run --example derive --features derive

use dependency_resolver::{Definition, Service, ServiceRepository, params};
use std::sync::Arc;

// Dependencies
#[allow(dead_code)]
struct Database {
    url: String,
}

#[allow(dead_code)]
struct Cache {
    size: usize,
}

#[allow(dead_code)]
struct Logger {
    level: String,
}

// Service with injected dependencies
#[derive(Service)]
struct UserService {
    #[inject]
    db: Arc<Database>,
    #[inject]
    cache: Arc<Cache>,
    #[inject]
    logger: Option<Arc<Logger>>,
    #[param]
    tenant: Option<String>,
    // Non-injected field uses Default
    request_count: u64,
}

impl UserService {
    fn describe(&self) -> String {
        let logger_status = if self.logger.is_some() {
            "with logging"
        } else {
            "without logging"
        };
        format!(
            "UserService for {} connected to {} with cache size {} ({}, requests: {})",
            self.tenant.as_deref().unwrap_or("<default tenant>"),
            self.db.url,
            self.cache.size,
            logger_status,
            self.request_count
        )
    }
}

// Nested injection example
#[allow(dead_code)]
#[derive(Service)]
struct ApiController {
    #[inject]
    user_service: Arc<UserService>,
    #[inject]
    db: Arc<Database>,
}

fn main() {
    println!("=== Dependency Resolver Derive Macro Demo ===\n");

    // Register dependencies
    let repo = ServiceRepository::new();
    repo.register(Definition::shared(Arc::new(Database {
        url: "postgres://localhost:5432/myapp".into(),
    })))
    .expect("register Database");
    repo.register(Definition::shared(Arc::new(Cache { size: 1024 })))
        .expect("register Cache");
    repo.register(Definition::<UserService>::new())
        .expect("register UserService");
    repo.register(Definition::<ApiController>::new().scoped())
        .expect("register ApiController");
    // Note: Logger is NOT registered, so it will be None

    let provider = repo.create_provider();

    println!("Resolving UserService...");
    let user_service = provider
        .require::<UserService>()
        .expect("Failed to resolve UserService");
    println!("  {}", user_service.describe());
    println!();

    println!("Creating UserService for a tenant...");
    let tenant_service = provider
        .get_with::<UserService>(&params!["acme".to_string()])
        .expect("Failed to create UserService")
        .expect("UserService is registered");
    println!("  {}", tenant_service.describe());
    println!();

    // Registering Logger rebuilds the index; the live provider sees it
    repo.register(Definition::shared(Arc::new(Logger {
        level: "DEBUG".into(),
    })))
    .expect("register Logger");

    println!("Resolving UserService with Logger...");
    let user_service_with_log = provider
        .require::<UserService>()
        .expect("Failed to resolve UserService");
    println!("  {}", user_service_with_log.describe());
    println!();

    println!("Resolving ApiController in a request scope...");
    let scope = provider.create_scope().expect("Failed to create scope");
    let controller = scope
        .require::<ApiController>()
        .expect("Failed to resolve ApiController");
    println!("  {}", controller.user_service.describe());
    scope.dispose();

    println!("\n=== Demo Complete ===");
    println!("\nThe #[derive(Service)] macro generated a constructor that:");
    println!("  - Resolves #[inject] fields from the provider");
    println!("  - Leaves Option<Arc<T>> fields as None when T is not registered");
    println!("  - Takes #[param] fields only from caller arguments");
    println!("  - Uses Default::default() for every other field");
}
