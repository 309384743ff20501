//! Instance assembly
//!
//! Creating a component runs three independent steps in order: constructor
//! assembly, property assembly and init methods. The whole pipeline runs
//! under an [`AssemblyGuard`] so that a definition which needs itself before
//! it is complete is reported as a cycle instead of recursing.

pub(crate) mod constructor;
pub(crate) mod method;
pub(crate) mod property;

use crate::container::Container;
use crate::{ClassDesc, ComponentDef, DiError, Result, Value};
use std::any::Any;
use std::cell::RefCell;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::trace;

// =============================================================================
// Assembly guard
// =============================================================================

thread_local! {
    /// Definitions being assembled on this thread, innermost last.
    static ASSEMBLING: RefCell<Vec<u64>> = const { RefCell::new(Vec::new()) };
}

/// Marks a definition as being assembled on the current thread.
pub(crate) struct AssemblyGuard {
    id: u64,
}

impl AssemblyGuard {
    /// Enter assembly of `def`, failing if it is already in progress on this thread.
    pub(crate) fn enter(def: &ComponentDef) -> Result<Self> {
        let id = def.id();
        ASSEMBLING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.contains(&id) {
                return Err(DiError::cyclic(def.class_name()));
            }
            stack.push(id);
            Ok(Self { id })
        })
    }

    /// Whether `def` is being assembled further up this thread's call stack.
    pub(crate) fn is_active(def: &ComponentDef) -> bool {
        ASSEMBLING.with(|stack| stack.borrow().contains(&def.id()))
    }
}

impl Drop for AssemblyGuard {
    fn drop(&mut self) {
        ASSEMBLING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(pos) = stack.iter().rposition(|id| *id == self.id) {
                stack.remove(pos);
            }
        });
    }
}

// =============================================================================
// Pipeline
// =============================================================================

/// Create and fully assemble a new instance of `def`.
pub(crate) fn assemble(def: &ComponentDef) -> Result<Value> {
    let container = def.container()?;
    let _guard = AssemblyGuard::enter(def)?;

    #[cfg(feature = "logging")]
    trace!(
        target: "component_container",
        component = %def.describe(),
        "Assembling component"
    );

    let mut instance = constructor::assemble(def, &container)?;
    let class = class_of(def, &container, &instance)?;

    match Arc::get_mut(&mut instance) {
        Some(target) => {
            property::assemble(def, &container, class.as_deref(), target)?;
        }
        None => property::assemble_shared(def, class.as_deref())?,
    }
    method::init_value(def, class.as_deref(), &mut instance)?;

    Ok(instance)
}

/// Inject properties and run init methods on a caller-owned instance.
pub(crate) fn inject(
    def: &ComponentDef,
    container: &Container,
    class: Option<&ClassDesc>,
    target: &mut dyn Any,
) -> Result<()> {
    let _guard = AssemblyGuard::enter(def)?;
    property::assemble(def, container, class, target)?;
    method::init(def, class, target)
}

/// Class used for property and method assembly of `instance`.
fn class_of(def: &ComponentDef, container: &Container, instance: &Value) -> Result<Option<Arc<ClassDesc>>> {
    if def.expression().is_none() {
        if let Some(class) = def.concrete_class()? {
            return Ok(Some(class));
        }
    }
    Ok(container.classes().of_value(instance))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ClassDesc, InstanceScope};

    #[derive(Default)]
    struct Leaf;

    #[test]
    fn test_guard_detects_reentry() {
        let def = ComponentDef::builder()
            .class(ClassDesc::builder::<Leaf>().default_constructor(Leaf::default).build())
            .scope(InstanceScope::Prototype)
            .build()
            .unwrap();

        let outer = AssemblyGuard::enter(&def).unwrap();
        assert!(AssemblyGuard::is_active(&def));
        assert!(matches!(
            AssemblyGuard::enter(&def),
            Err(DiError::CyclicReference { .. })
        ));
        drop(outer);
        assert!(!AssemblyGuard::is_active(&def));
        assert!(AssemblyGuard::enter(&def).is_ok());
    }

    #[test]
    fn test_guard_is_per_thread() {
        let def = ComponentDef::builder()
            .class(ClassDesc::builder::<Leaf>().default_constructor(Leaf::default).build())
            .build()
            .unwrap();

        let _held = AssemblyGuard::enter(&def).unwrap();
        let def = Arc::clone(&def);
        std::thread::spawn(move || {
            assert!(!AssemblyGuard::is_active(&def));
        })
        .join()
        .unwrap();
    }
}
