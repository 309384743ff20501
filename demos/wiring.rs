//! Wiring a small application and watching the container's log output
//!
//! Run with pretty logging (development):
//! ```bash
//! cargo run --example wiring --features logging-pretty
//! ```
//!
//! Run with JSON logging (production):
//! ```bash
//! cargo run --example wiring --features logging-json
//! ```

use component_container::{
    ArgDef, BindingType, ClassDesc, ComponentDef, Container, DiError, Expression, InstanceScope,
    MapExternalContext, PropertyDef, Slot, Value,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

trait Store: Send + Sync {
    fn describe(&self) -> String;
}

struct PgStore {
    url: String,
}

impl Store for PgStore {
    fn describe(&self) -> String {
        format!("postgres at {}", self.url)
    }
}

#[derive(Default)]
struct UserService {
    store: Option<Arc<dyn Store>>,
    page_size: u32,
}

#[derive(Default)]
struct Cart {
    items: Vec<String>,
}

struct RequestId(u64);

#[derive(Default)]
struct Controller {
    users: Option<Arc<UserService>>,
    handled: u32,
}

fn main() -> Result<(), DiError> {
    #[cfg(feature = "logging")]
    {
        component_container::logging::builder()
            .debug()
            .container_only()
            .init();
    }

    println!("=== Component Container Wiring Demo ===\n");

    // Root container (logs: "Creating new root container")
    let root = Container::new();
    root.set_path("app.toml");
    root.set_external_context(MapExternalContext::new());

    // Constructor arguments from literals (logs: "Registered component")
    root.register(
        ComponentDef::builder()
            .class(
                ClassDesc::builder::<PgStore>()
                    .implements::<dyn Store>(|s| s)
                    .constructor([Slot::value::<String>()], |args| {
                        Ok(PgStore { url: args.next()? })
                    })
                    .build(),
            )
            .name("store")
            .arg(ArgDef::literal(String::from("localhost:5432")))
            .build()?,
    )?;

    // Auto-bound interface property plus a configured value
    root.register(
        ComponentDef::builder()
            .class(
                ClassDesc::builder::<UserService>()
                    .default_constructor(UserService::default)
                    .property::<dyn Store, _>("store", |u, s| u.store = Some(s))
                    .property_value::<u32, _>("pageSize", |u, n| u.page_size = n)
                    .annotate("store", BindingType::Must)
                    .build(),
            )
            .name("users")
            .property(PropertyDef::new("pageSize").value(50_u32))
            .build()?,
    )?;

    // Expression-built prototype
    let counter = Arc::new(AtomicU64::new(1));
    root.register(
        ComponentDef::builder()
            .component_type::<RequestId>()
            .name("requestId")
            .scope(InstanceScope::Prototype)
            .expression(Expression::new("next_request_id()", move |_| {
                Ok(Arc::new(RequestId(counter.fetch_add(1, Ordering::SeqCst))) as Value)
            }))
            .build()?,
    )?;

    // Session-scoped component stored in the external context
    root.register(
        ComponentDef::builder()
            .class(ClassDesc::builder::<Cart>().default_constructor(Cart::default).build())
            .name("cart")
            .scope(InstanceScope::Session)
            .build()?,
    )?;

    let users = root.get::<UserService>()?;
    println!(
        "  [App] users: {} (page size {})",
        users.store.as_ref().map(|s| s.describe()).unwrap_or_default(),
        users.page_size
    );

    let first = root.get_value("requestId")?;
    let second = root.get_value("requestId")?;
    if let (Some(a), Some(b)) = (first.downcast_ref::<RequestId>(), second.downcast_ref::<RequestId>()) {
        println!("  [App] request ids: {} then {}", a.0, b.0);
    }

    let cart = root.get::<Cart>()?;
    println!("  [App] session cart has {} item(s)", cart.items.len());

    // Namespaced child (logs: "Included child container")
    let web = root.create_child("web");
    web.register(
        ComponentDef::builder()
            .class(
                ClassDesc::builder::<Controller>()
                    .property::<UserService, _>("users", |c, u| c.users = Some(u))
                    .annotate("users", BindingType::Must)
                    .method_mut("count", |c| {
                        c.handled += 1;
                        Ok(())
                    })
                    .build(),
            )
            .name("controller")
            .scope(InstanceScope::Outer)
            .init_method("count")
            .build()?,
    )?;

    // Inject into an instance the container did not create
    let mut controller = Controller::default();
    let def = root.definition("web.controller")?;
    println!("  [App] found {} through the web namespace", def.describe());
    web.inject_dependency(&mut controller)?;
    println!(
        "  [App] controller wired: users={}, handled={}",
        controller.users.is_some(),
        controller.handled
    );

    // Ambiguity is reported only when asked for
    root.register(
        ComponentDef::builder()
            .class(
                ClassDesc::builder::<PgStore>()
                    .implements::<dyn Store>(|s| s)
                    .default_constructor(|| PgStore {
                        url: "replica:5432".into(),
                    })
                    .build(),
            )
            .name("replica")
            .build()?,
    )?;
    match root.get::<dyn Store>() {
        Err(err) => println!("  [App] expected failure: {}", err),
        Ok(_) => println!("  [App] unexpectedly resolved an ambiguous store"),
    }

    root.init()?;
    root.destroy()?;

    println!("\n=== Demo Complete ===");
    Ok(())
}
