//! Init and destroy methods

use crate::{ClassDesc, ComponentDef, DiError, MethodDef, MethodDesc, Result, Value};
use std::any::Any;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::trace;

/// Run init methods against an instance the caller has exclusive access to.
pub(crate) fn init(def: &ComponentDef, class: Option<&ClassDesc>, target: &mut dyn Any) -> Result<()> {
    for method_def in def.init_methods() {
        let method = resolve(def, class, method_def)?;
        trace_invoke(def, method.name(), "init");
        method
            .invoke_mut(target)
            .map_err(|err| DiError::illegal_method(owner(def, class), method.name(), err))?;
    }
    Ok(())
}

/// Run init methods against a freshly created instance.
pub(crate) fn init_value(def: &ComponentDef, class: Option<&ClassDesc>, instance: &mut Value) -> Result<()> {
    run(def, class, def.init_methods(), "init", instance)
}

/// Run destroy methods against a cached instance.
///
/// Exclusive methods need the container to hold the last reference.
pub(crate) fn destroy(def: &ComponentDef, class: Option<&ClassDesc>, instance: &mut Value) -> Result<()> {
    run(def, class, def.destroy_methods(), "destroy", instance)
}

fn run(
    def: &ComponentDef,
    class: Option<&ClassDesc>,
    methods: &[MethodDef],
    phase: &'static str,
    instance: &mut Value,
) -> Result<()> {
    for method_def in methods {
        let method = resolve(def, class, method_def)?;
        trace_invoke(def, method.name(), phase);

        let outcome = match Arc::get_mut(instance) {
            Some(target) => method.invoke_mut(target),
            None => method
                .invoke_shared(&**instance)
                .unwrap_or_else(|| Err("instance is shared; exclusive method cannot run".into())),
        };
        outcome.map_err(|err| DiError::illegal_method(owner(def, class), method.name(), err))?;
    }
    Ok(())
}

fn resolve<'a>(
    def: &ComponentDef,
    class: Option<&'a ClassDesc>,
    method_def: &'a MethodDef,
) -> Result<&'a MethodDesc> {
    match method_def {
        MethodDef::Method(method) => Ok(method),
        MethodDef::Named(name) => class
            .and_then(|class| class.method(name))
            .ok_or_else(|| DiError::MethodNotFound {
                class: owner(def, class),
                method: name.clone(),
            }),
    }
}

fn owner(def: &ComponentDef, class: Option<&ClassDesc>) -> String {
    class
        .map(|class| class.type_name().to_owned())
        .unwrap_or_else(|| def.class_name())
}

#[inline]
fn trace_invoke(_def: &ComponentDef, _method: &str, _phase: &'static str) {
    #[cfg(feature = "logging")]
    trace!(
        target: "component_container",
        component = %_def.describe(),
        method = _method,
        phase = _phase,
        "Invoking lifecycle method"
    );
}

#[cfg(test)]
mod tests {
    use crate::{ClassDesc, ComponentDef, Container, DiError, MethodDesc};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Pool {
        open: bool,
        closed: Arc<AtomicUsize>,
    }

    fn pool_class(closed: Arc<AtomicUsize>) -> Arc<ClassDesc> {
        ClassDesc::builder::<Pool>()
            .default_constructor(move || Pool {
                open: false,
                closed: Arc::clone(&closed),
            })
            .method_mut("open", |pool| {
                pool.open = true;
                Ok(())
            })
            .method("close", |pool| {
                pool.closed.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .method("fail", |_| Err("disk full".into()))
            .build()
    }

    #[test]
    fn test_init_methods_run_in_order() {
        let closed = Arc::new(AtomicUsize::new(0));
        let container = Container::new();
        container
            .register(
                ComponentDef::builder()
                    .class(pool_class(Arc::clone(&closed)))
                    .init_method("open")
                    .init_method(MethodDesc::shared::<Pool, _>("check", |pool| {
                        if pool.open { Ok(()) } else { Err("not open".into()) }
                    }))
                    .destroy_method("close")
                    .build()
                    .unwrap(),
            )
            .unwrap();

        let pool = container.get::<Pool>().unwrap();
        assert!(pool.open);
        drop(pool);

        container.destroy().unwrap();
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unknown_method() {
        let container = Container::new();
        container
            .register(
                ComponentDef::builder()
                    .class(pool_class(Arc::default()))
                    .init_method("warmUp")
                    .build()
                    .unwrap(),
            )
            .unwrap();

        assert!(matches!(
            container.get::<Pool>(),
            Err(DiError::MethodNotFound { method, .. }) if method == "warmUp"
        ));
    }

    #[test]
    fn test_failing_method_names_class_and_method() {
        let container = Container::new();
        container
            .register(
                ComponentDef::builder()
                    .class(pool_class(Arc::default()))
                    .init_method("fail")
                    .build()
                    .unwrap(),
            )
            .unwrap();

        match container.get::<Pool>() {
            Err(DiError::IllegalMethod { class, method, reason }) => {
                assert!(class.ends_with("Pool"));
                assert_eq!(method, "fail");
                assert_eq!(reason, "disk full");
            }
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_exclusive_destroy_on_shared_instance() {
        let container = Container::new();
        container
            .register(
                ComponentDef::builder()
                    .class(pool_class(Arc::default()))
                    .destroy_method("open")
                    .build()
                    .unwrap(),
            )
            .unwrap();

        let held = container.get::<Pool>().unwrap();
        assert!(matches!(
            container.destroy(),
            Err(DiError::IllegalMethod { .. })
        ));
        drop(held);
    }
}
