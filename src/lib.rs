//! # Component Container
//!
//! A definition-driven component container: applications describe their
//! components as [`ComponentDef`]s (class, scope, constructor arguments,
//! properties, lifecycle methods) and the [`Container`] creates, wires and
//! tears them down.
//!
//! ## Features
//!
//! - **Scopes** - singleton, prototype, outer (inject into caller-owned
//!   instances) and externally stored session/application/request scopes
//! - **Auto-binding** - unconfigured constructor parameters and properties
//!   are resolved by name and type, governed by MUST/SHOULD/MAY/NONE policies
//! - **Container graphs** - parents, namespaced children, first-parent-wins
//!   delegation
//! - **Deferred ambiguity** - a key with several definitions only fails
//!   when it is requested, listing every candidate
//! - **Thread-safe** - at most one construction per singleton under
//!   concurrent first access; same-thread cycles are reported, not recursed
//! - **Observable** - optional `tracing` events under the
//!   `component_container` target
//!
//! ## Quick Start
//!
//! Rust has no runtime reflection, so each class is described once with a
//! [`ClassDesc`]: how to construct it, which members can be set and which
//! interfaces it can be viewed as.
//!
//! ```rust
//! use component_container::prelude::*;
//!
//! trait Mailer: Send + Sync {
//!     fn send(&self, to: &str) -> String;
//! }
//!
//! #[derive(Default)]
//! struct SmtpMailer;
//!
//! impl Mailer for SmtpMailer {
//!     fn send(&self, to: &str) -> String {
//!         format!("mail to {}", to)
//!     }
//! }
//!
//! #[derive(Default)]
//! struct Signup {
//!     mailer: Option<Arc<dyn Mailer>>,
//!     welcome: String,
//! }
//!
//! let container = Container::new();
//!
//! container
//!     .register(
//!         ComponentDef::builder()
//!             .class(
//!                 ClassDesc::builder::<SmtpMailer>()
//!                     .implements::<dyn Mailer>(|m| m)
//!                     .default_constructor(SmtpMailer::default)
//!                     .build(),
//!             )
//!             .name("mailer")
//!             .build()?,
//!     )?;
//!
//! container
//!     .register(
//!         ComponentDef::builder()
//!             .class(
//!                 ClassDesc::builder::<Signup>()
//!                     .default_constructor(Signup::default)
//!                     .property::<dyn Mailer, _>("mailer", |s, m| s.mailer = Some(m))
//!                     .property_value::<String, _>("welcome", |s, w| s.welcome = w)
//!                     .annotate("mailer", BindingType::Must)
//!                     .build(),
//!             )
//!             .property(PropertyDef::new("welcome").value(String::from("hi")))
//!             .build()?,
//!     )?;
//!
//! // `mailer` was bound by name and type, `welcome` was configured
//! let signup = container.get::<Signup>()?;
//! assert_eq!(signup.mailer.as_ref().unwrap().send("ann"), "mail to ann");
//! assert_eq!(signup.welcome, "hi");
//!
//! // Singletons are shared
//! assert!(Arc::ptr_eq(&signup, &container.get::<Signup>()?));
//! # Ok::<(), DiError>(())
//! ```
//!
//! ## Scopes
//!
//! | Scope         | `deploy()`                          | teardown                    |
//! |---------------|-------------------------------------|-----------------------------|
//! | `Singleton`   | created once, cached                | destroy methods run         |
//! | `Prototype`   | new instance every time             | caller owns the instance    |
//! | `Outer`       | unsupported; use `inject_dependency`| caller owns the instance    |
//! | `Session` etc | cached in the [`ExternalContext`]   | the external map owns it    |

mod assembler;
mod binding;
mod class;
mod config;
mod container;
mod definition;
mod deployer;
mod error;
pub mod global;
mod key;
#[cfg(feature = "logging")]
pub mod logging;
mod scope;
mod storage;

pub use binding::{AutoBindingKind, BindingType, ExternalBinder};
pub use class::{
    Access, Args, ClassBuilder, ClassDesc, ClassRegistry, ConstructorDesc, MethodDesc, Payload,
    PropertyDesc, Slot, SlotKind, Value,
};
pub use config::ContainerConfig;
pub use container::{Container, ContainerId};
pub use definition::{
    ArgDef, AspectDef, ComponentDef, ComponentDefBuilder, DeployState, EnhancedFactory, Expression,
    InterTypeDef, MethodDef, Pointcut, PropertyDef, ValueSource,
};
pub use error::{BoxError, Candidate, Candidates, DiError, Result};
pub use key::{ComponentKey, TypeKey};
pub use scope::{ExternalContext, InstanceScope, MapExternalContext};

// Re-export for convenience
pub use std::sync::Arc;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        ArgDef, AutoBindingKind, BindingType, ClassDesc, ComponentDef, ComponentKey, Container,
        ContainerConfig, DiError, Expression, InstanceScope, PropertyDef, Result, Slot, Value,
    };
    pub use std::sync::Arc;
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    // ===== Fixtures =====

    #[derive(Default)]
    struct SeaLogic {
        label: &'static str,
    }

    fn sea_logic(name: &str, label: &'static str) -> Arc<ComponentDef> {
        ComponentDef::builder()
            .class(
                ClassDesc::builder::<SeaLogic>()
                    .default_constructor(move || SeaLogic { label })
                    .build(),
            )
            .name(name)
            .build()
            .unwrap()
    }

    #[derive(Default)]
    struct Harbor;

    #[derive(Default)]
    struct Ocean {
        sea_logic: Option<Arc<SeaLogic>>,
        harbor: Option<Arc<Harbor>>,
    }

    fn ocean_class() -> Arc<ClassDesc> {
        ClassDesc::builder::<Ocean>()
            .default_constructor(Ocean::default)
            .property::<SeaLogic, _>("seaLogic", |o, s| o.sea_logic = Some(s))
            .property::<Harbor, _>("harbor", |o, h| o.harbor = Some(h))
            .build()
    }

    fn counted<T: Default + Send + Sync + 'static>(built: Arc<AtomicUsize>) -> Arc<ClassDesc> {
        ClassDesc::builder::<T>()
            .default_constructor(move || {
                built.fetch_add(1, Ordering::SeqCst);
                T::default()
            })
            .build()
    }

    // ===== Scopes =====

    #[test]
    fn test_singleton_identity() {
        let container = Container::new();
        container.register(sea_logic("seaLogic", "sea")).unwrap();

        let a = container.get::<SeaLogic>().unwrap();
        let b = container.get_named::<SeaLogic>("seaLogic").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_prototype_freshness() {
        let built = Arc::new(AtomicUsize::new(0));
        let container = Container::new();
        container
            .register(
                ComponentDef::builder()
                    .class(counted::<Harbor>(Arc::clone(&built)))
                    .scope(InstanceScope::Prototype)
                    .build()
                    .unwrap(),
            )
            .unwrap();

        let a = container.get::<Harbor>().unwrap();
        let b = container.get::<Harbor>().unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(built.load(Ordering::SeqCst), 2);
    }

    // ===== Cycles =====

    struct Chicken {
        _egg: Arc<Egg>,
    }

    struct Egg {
        _chicken: Arc<Chicken>,
    }

    #[test]
    fn test_constructor_cycle_is_reported() {
        let container = Container::new();
        let chicken = ComponentDef::builder()
            .class(
                ClassDesc::builder::<Chicken>()
                    .constructor([Slot::component::<Egg>()], |args| Ok(Chicken { _egg: args.next()? }))
                    .build(),
            )
            .build()
            .unwrap();
        container.register(Arc::clone(&chicken)).unwrap();
        container
            .register(
                ComponentDef::builder()
                    .class(
                        ClassDesc::builder::<Egg>()
                            .constructor([Slot::component::<Chicken>()], |args| {
                                Ok(Egg { _chicken: args.next()? })
                            })
                            .build(),
                    )
                    .build()
                    .unwrap(),
            )
            .unwrap();

        match container.get::<Chicken>() {
            Err(DiError::CyclicReference { type_name }) => assert!(type_name.ends_with("Chicken")),
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
        assert_eq!(chicken.state(), DeployState::Uninitialized);
        assert!(matches!(
            container.get::<Chicken>(),
            Err(DiError::CyclicReference { .. })
        ));
    }

    #[derive(Default)]
    struct Left {
        right: Option<Arc<Right>>,
    }

    #[derive(Default)]
    struct Right {
        left: Option<Arc<Left>>,
    }

    #[test]
    fn test_required_property_cycle_is_reported() {
        let container = Container::new();
        let left = ComponentDef::builder()
            .class(
                ClassDesc::builder::<Left>()
                    .default_constructor(Left::default)
                    .property::<Right, _>("right", |l, r| l.right = Some(r))
                    .annotate("right", BindingType::Must)
                    .build(),
            )
            .build()
            .unwrap();
        container.register(Arc::clone(&left)).unwrap();
        container
            .register(
                ComponentDef::builder()
                    .class(
                        ClassDesc::builder::<Right>()
                            .default_constructor(Right::default)
                            .property::<Left, _>("left", |r, l| r.left = Some(l))
                            .annotate("left", BindingType::Must)
                            .build(),
                    )
                    .build()
                    .unwrap(),
            )
            .unwrap();

        assert!(matches!(
            container.get::<Left>(),
            Err(DiError::CyclicReference { .. })
        ));
        assert_eq!(left.state(), DeployState::Uninitialized);
    }

    // ===== Ambiguity and binding =====

    #[test]
    fn test_ambiguity_lists_all_candidates() {
        let container = Container::new();
        container.set_path("logic.toml");
        container.register(sea_logic("fooLogic", "first")).unwrap();
        container.register(sea_logic("fooLogic", "second")).unwrap();

        match container.get_value("fooLogic") {
            Err(DiError::TooManyRegistration { key, candidates }) => {
                assert_eq!(key, ComponentKey::name("fooLogic"));
                assert_eq!(candidates.0.len(), 2);
                assert!(candidates.0.iter().all(|c| c.name.as_deref() == Some("fooLogic")));
                assert!(candidates.0.iter().all(|c| c.path.as_deref() == Some("logic.toml")));
            }
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
        let message = container.get_value("fooLogic").unwrap_err().to_string();
        assert!(message.contains("logic.toml"));
    }

    #[test]
    fn test_name_qualified_type_wins() {
        let container = Container::with_config(ContainerConfig::new().all_plain_properties());
        container.register(sea_logic("seaLogic", "sea")).unwrap();
        container.register(sea_logic("landSeaLogic", "land")).unwrap();
        container
            .register(ComponentDef::builder().class(ocean_class()).build().unwrap())
            .unwrap();

        assert!(matches!(
            container.get::<SeaLogic>(),
            Err(DiError::TooManyRegistration { .. })
        ));
        let ocean = container.get::<Ocean>().unwrap();
        assert_eq!(ocean.sea_logic.as_ref().unwrap().label, "sea");
    }

    #[test]
    fn test_must_fails_where_may_continues() {
        let build = |binding: BindingType| {
            let container = Container::new();
            container
                .register(
                    ComponentDef::builder()
                        .class(ocean_class())
                        .property(PropertyDef::new("harbor").binding(binding))
                        .build()
                        .unwrap(),
                )
                .unwrap();
            container.get::<Ocean>()
        };

        assert!(matches!(
            build(BindingType::Must),
            Err(DiError::IllegalProperty { property, .. }) if property == "harbor"
        ));
        let ocean = build(BindingType::May).unwrap();
        assert!(ocean.harbor.is_none());
    }

    #[derive(Default)]
    struct Audited {
        definition: Option<Arc<ComponentDef>>,
    }

    #[test]
    fn test_definition_self_injection() {
        let container = Container::new();
        let def = ComponentDef::builder()
            .class(
                ClassDesc::builder::<Audited>()
                    .default_constructor(Audited::default)
                    .property::<ComponentDef, _>("definition", |a, d| a.definition = Some(d))
                    .annotate("definition", BindingType::Must)
                    .build(),
            )
            .name("audited")
            .build()
            .unwrap();
        container.register(Arc::clone(&def)).unwrap();

        let audited = container.get::<Audited>().unwrap();
        assert_eq!(audited.definition.as_ref().unwrap().id(), def.id());
    }

    // ===== Outer injection =====

    #[derive(Default)]
    struct Visitor {
        greeted: u32,
        harbor: Option<Arc<Harbor>>,
    }

    #[test]
    fn test_outer_injection_runs_every_call() {
        let container = Container::new();
        container
            .register(ComponentDef::builder().class(counted::<Harbor>(Arc::default())).build().unwrap())
            .unwrap();
        container
            .register(
                ComponentDef::builder()
                    .class(
                        ClassDesc::builder::<Visitor>()
                            .property::<Harbor, _>("harbor", |v, h| v.harbor = Some(h))
                            .annotate("harbor", BindingType::Should)
                            .method_mut("greet", |v| {
                                v.greeted += 1;
                                Ok(())
                            })
                            .build(),
                    )
                    .scope(InstanceScope::Outer)
                    .init_method("greet")
                    .build()
                    .unwrap(),
            )
            .unwrap();

        let mut visitor = Visitor::default();
        container.inject_dependency(&mut visitor).unwrap();
        container.inject_dependency(&mut visitor).unwrap();
        assert_eq!(visitor.greeted, 2);
        assert!(visitor.harbor.is_some());
    }

    #[test]
    fn test_untyped_outer_binds_first_injected_type() {
        let container = Container::new();
        let def = ComponentDef::builder()
            .name("visitor")
            .scope(InstanceScope::Outer)
            .build()
            .unwrap();
        container.register(Arc::clone(&def)).unwrap();
        container.register_class(ClassDesc::builder::<Visitor>().build());

        let mut visitor = Visitor::default();
        container.inject_dependency_named("visitor", &mut visitor).unwrap();
        assert_eq!(def.component_type(), Some(TypeKey::of::<Visitor>()));
        assert!(container.has_definition(ComponentKey::of::<Visitor>()));

        let mut other = String::new();
        assert!(matches!(
            container.inject_dependency_named("visitor", &mut other),
            Err(DiError::ClassMismatch { .. })
        ));
    }

    // ===== Lifecycle =====

    #[derive(Default)]
    struct Pool;

    #[test]
    fn test_destroy_is_idempotent() {
        let closed = Arc::new(AtomicUsize::new(0));
        let container = Container::new();
        let counter = Arc::clone(&closed);
        let def = ComponentDef::builder()
            .class(
                ClassDesc::builder::<Pool>()
                    .default_constructor(Pool::default)
                    .method("close", move |_| {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .build(),
            )
            .destroy_method("close")
            .build()
            .unwrap();
        container.register(Arc::clone(&def)).unwrap();
        let _pool = container.get::<Pool>().unwrap();

        def.destroy().unwrap();
        def.destroy().unwrap();
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert_eq!(def.state(), DeployState::Destroyed);
    }

    #[test]
    fn test_container_lifecycle_order() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let container = Container::new();
        for name in ["first", "second"] {
            let opened = Arc::clone(&events);
            let closed = Arc::clone(&events);
            container
                .register(
                    ComponentDef::builder()
                        .class(
                            ClassDesc::builder::<Pool>()
                                .default_constructor(move || {
                                    opened.lock().push(format!("open {}", name));
                                    Pool
                                })
                                .method("close", move |_| {
                                    closed.lock().push(format!("close {}", name));
                                    Ok(())
                                })
                                .build(),
                        )
                        .name(name)
                        .destroy_method("close")
                        .build()
                        .unwrap(),
                )
                .unwrap();
        }

        container.init().unwrap();
        container.init().unwrap();
        container.destroy().unwrap();
        assert_eq!(
            *events.lock(),
            ["open first", "open second", "close second", "close first"]
        );
    }

    // ===== Container graph =====

    #[test]
    fn test_first_parent_wins() {
        let root = Container::new();
        let first = root.create_container(None);
        let second = root.create_container(None);
        first.register(sea_logic("logic", "first")).unwrap();
        second.register(sea_logic("logic", "second")).unwrap();

        let child = root.create_container(Some("child"));
        child.add_parent(&first).unwrap();
        child.add_parent(&second).unwrap();

        let resolved = child.get::<SeaLogic>().unwrap();
        assert_eq!(resolved.label, "first");
        assert!(Arc::ptr_eq(&resolved, &first.get::<SeaLogic>().unwrap()));
        assert_eq!(child.find_all::<SeaLogic>().unwrap().len(), 2);
    }

    // ===== Concurrency =====

    #[derive(Default)]
    struct Slow;

    #[test]
    fn test_concurrent_singleton_created_once() {
        const THREADS: usize = 8;

        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        let container = Container::new();
        container
            .register(
                ComponentDef::builder()
                    .class(
                        ClassDesc::builder::<Slow>()
                            .default_constructor(move || {
                                counter.fetch_add(1, Ordering::SeqCst);
                                thread::sleep(Duration::from_millis(20));
                                Slow
                            })
                            .build(),
                    )
                    .build()
                    .unwrap(),
            )
            .unwrap();

        let barrier = Arc::new(Barrier::new(THREADS));
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let container = container.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    container.get::<Slow>().unwrap()
                })
            })
            .collect();

        let instances: Vec<Arc<Slow>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(built.load(Ordering::SeqCst), 1);
        assert!(instances.iter().all(|i| Arc::ptr_eq(i, &instances[0])));
    }
}
