//! Scope deployers
//!
//! Every definition owns one deployer, chosen by its instance scope. The
//! deployer decides whether `deploy()` creates, caches, or refuses.
//!
//! Dispatch is an enum rather than a trait object; the set of scopes is closed.

use crate::assembler::{self, AssemblyGuard};
use crate::{ComponentDef, DeployState, DiError, InstanceScope, Result, TypeKey, Value};
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::{debug, trace};

// =============================================================================
// Singleton
// =============================================================================

/// Cached single instance with per-definition creation lock.
///
/// The lock makes concurrent first access block until the instance exists.
/// Re-entry from the same thread (a dependency cycle) is detected before
/// taking the lock.
pub(crate) struct SingletonDeployer {
    instance: RwLock<Option<Value>>,
    creation: Mutex<()>,
    state: RwLock<DeployState>,
}

impl SingletonDeployer {
    fn new() -> Self {
        Self {
            instance: RwLock::new(None),
            creation: Mutex::new(()),
            state: RwLock::new(DeployState::Uninitialized),
        }
    }

    #[inline]
    fn cached(&self) -> Option<Value> {
        self.instance.read().as_ref().map(Arc::clone)
    }

    fn deploy(&self, def: &ComponentDef) -> Result<Value> {
        if let Some(instance) = self.cached() {
            #[cfg(feature = "logging")]
            trace!(
                target: "component_container",
                component = %def.describe(),
                "Returning cached singleton"
            );
            return Ok(instance);
        }

        if AssemblyGuard::is_active(def) {
            return Err(DiError::cyclic(def.class_name()));
        }

        let _creation = self.creation.lock();
        if let Some(instance) = self.cached() {
            return Ok(instance);
        }

        let previous = std::mem::replace(&mut *self.state.write(), DeployState::Instantiating);
        match assembler::assemble(def) {
            Ok(instance) => {
                *self.instance.write() = Some(Arc::clone(&instance));
                *self.state.write() = DeployState::Ready;

                #[cfg(feature = "logging")]
                debug!(
                    target: "component_container",
                    component = %def.describe(),
                    "Singleton created"
                );
                Ok(instance)
            }
            Err(err) => {
                *self.state.write() = previous;
                Err(err)
            }
        }
    }

    /// Detach the cached instance, then run destroy methods without holding
    /// the creation lock. Destroy methods that need this definition again
    /// fail with a cycle error.
    fn destroy(&self, def: &ComponentDef) -> Result<()> {
        let _teardown = AssemblyGuard::enter(def)?;
        let detached = {
            let _creation = self.creation.lock();
            let detached = self.instance.write().take();
            if detached.is_some() {
                *self.state.write() = DeployState::Destroyed;
            }
            detached
        };
        let Some(mut instance) = detached else {
            return Ok(());
        };

        #[cfg(feature = "logging")]
        debug!(
            target: "component_container",
            component = %def.describe(),
            "Destroying singleton"
        );

        let class = match def.concrete_class()? {
            Some(class) => Some(class),
            None => def.container().ok().and_then(|c| c.classes().of_value(&instance)),
        };
        assembler::method::destroy(def, class.as_deref(), &mut instance)
    }

    fn state(&self) -> DeployState {
        *self.state.read()
    }
}

// =============================================================================
// External scopes
// =============================================================================

/// Instances stored in the container's [`ExternalContext`](crate::ExternalContext).
pub(crate) struct ExternalDeployer {
    scope: InstanceScope,
    creation: Mutex<()>,
}

impl ExternalDeployer {
    fn deploy(&self, def: &ComponentDef) -> Result<Value> {
        let container = def.container()?;
        let context = container
            .external_context()
            .ok_or_else(|| DiError::ExternalContextMissing {
                scope: self.scope.name(),
                component: def.describe(),
            })?;
        let key = external_key(def);

        if let Some(instance) = context.get(self.scope, &key) {
            return Ok(instance);
        }
        if AssemblyGuard::is_active(def) {
            return Err(DiError::cyclic(def.class_name()));
        }

        let _creation = self.creation.lock();
        if let Some(instance) = context.get(self.scope, &key) {
            return Ok(instance);
        }
        let instance = assembler::assemble(def)?;
        context.put(self.scope, &key, Arc::clone(&instance));

        #[cfg(feature = "logging")]
        debug!(
            target: "component_container",
            component = %def.describe(),
            scope = self.scope.name(),
            "Stored instance in external scope"
        );
        Ok(instance)
    }
}

/// Entry name in the external context: component name, else type name.
fn external_key(def: &ComponentDef) -> String {
    def.name()
        .map(str::to_owned)
        .or_else(|| def.component_type().map(|ty| ty.name().to_owned()))
        .unwrap_or_else(|| def.describe())
}

// =============================================================================
// AnyDeployer
// =============================================================================

pub(crate) enum AnyDeployer {
    Singleton(SingletonDeployer),
    /// New instance on every deploy; the caller owns it
    Prototype,
    /// Injection into caller-supplied instances only
    Outer,
    External(ExternalDeployer),
}

impl AnyDeployer {
    pub(crate) fn for_scope(scope: InstanceScope) -> Self {
        match scope {
            InstanceScope::Singleton => AnyDeployer::Singleton(SingletonDeployer::new()),
            InstanceScope::Prototype => AnyDeployer::Prototype,
            InstanceScope::Outer => AnyDeployer::Outer,
            InstanceScope::Session | InstanceScope::Application | InstanceScope::Request => {
                AnyDeployer::External(ExternalDeployer {
                    scope,
                    creation: Mutex::new(()),
                })
            }
        }
    }

    pub(crate) fn deploy(&self, def: &ComponentDef) -> Result<Value> {
        match self {
            AnyDeployer::Singleton(singleton) => singleton.deploy(def),
            AnyDeployer::Prototype => {
                #[cfg(feature = "logging")]
                trace!(
                    target: "component_container",
                    component = %def.describe(),
                    "Creating prototype instance"
                );
                assembler::assemble(def)
            }
            AnyDeployer::Outer => Err(DiError::unsupported(
                "deploy",
                InstanceScope::Outer.name(),
                def.describe(),
            )),
            AnyDeployer::External(external) => external.deploy(def),
        }
    }

    pub(crate) fn init(&self, def: &ComponentDef) -> Result<()> {
        match self {
            AnyDeployer::Singleton(singleton) => singleton.deploy(def).map(|_| ()),
            _ => Ok(()),
        }
    }

    /// Teardown. Only singletons own instances; the others are no-ops.
    pub(crate) fn destroy(&self, def: &ComponentDef) -> Result<()> {
        match self {
            AnyDeployer::Singleton(singleton) => singleton.destroy(def),
            _ => Ok(()),
        }
    }

    pub(crate) fn inject(&self, def: &ComponentDef, target: &mut dyn Any, actual: TypeKey) -> Result<()> {
        let AnyDeployer::Outer = self else {
            return Err(DiError::unsupported(
                "inject_dependency",
                def.scope().name(),
                def.describe(),
            ));
        };

        let container = def.container()?;
        let classes = container.classes();
        match def.component_type() {
            Some(declared) => {
                let assignable = declared == actual
                    || classes
                        .get(&actual.id())
                        .is_some_and(|class| class.is_assignable_to(declared));
                if !assignable {
                    return Err(DiError::class_mismatch(declared, actual.name()));
                }
            }
            None => {
                if def.bind_type(actual) {
                    #[cfg(feature = "logging")]
                    debug!(
                        target: "component_container",
                        component = %def.describe(),
                        bound_type = actual.name(),
                        "Bound outer component type from first injection"
                    );
                    container.index_bound_type(def, actual);
                }
            }
        }

        let class = match def.concrete_class()? {
            Some(class) => Some(class),
            None => classes.get(&actual.id()),
        };

        #[cfg(feature = "logging")]
        trace!(
            target: "component_container",
            component = %def.describe(),
            "Injecting into outer instance"
        );

        assembler::inject(def, &container, class.as_deref(), target)
    }

    pub(crate) fn state(&self, def: &ComponentDef) -> DeployState {
        match self {
            AnyDeployer::Singleton(singleton) => singleton.state(),
            _ if def.is_registered() => DeployState::Ready,
            _ => DeployState::Uninitialized,
        }
    }
}
