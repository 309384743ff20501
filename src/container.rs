//! Component container
//!
//! A [`Container`] holds an ordered list of [`ComponentDef`]s, indexes them
//! by type and name, and deploys them on request. Containers form a graph:
//! a container may have several parents (consulted in order when a key is
//! missing locally) and several children (reachable through their namespace).
//!
//! Every container of one graph lives in a shared arena and is addressed by a
//! [`ContainerId`]. A `Container` value is a cheap handle (`Arc` + id); cloning
//! it never copies definitions.

use crate::scope::ExternalContext;
use crate::storage::{DefinitionStorage, Entry};
use crate::{
    Candidates, ClassDesc, ClassRegistry, ComponentDef, ComponentKey, ContainerConfig, DiError,
    InstanceScope, Result, TypeKey, Value,
};
use ahash::RandomState;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

#[cfg(feature = "logging")]
use tracing::{debug, trace};

// =============================================================================
// Resolution guard
// =============================================================================

thread_local! {
    /// Keys being resolved on this thread, innermost last.
    static RESOLVING: RefCell<Vec<(usize, ContainerId, ComponentKey)>> =
        const { RefCell::new(Vec::new()) };
}

/// Marks a key as being resolved by `get` on the current thread.
///
/// Asking the same container for the same key again before the first request
/// returns means the component needs itself.
struct ResolveGuard;

impl ResolveGuard {
    fn enter(container: &Container, key: &ComponentKey) -> Result<Self> {
        let frame = (container.arena_ptr(), container.id, key.clone());
        RESOLVING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.contains(&frame) {
                return Err(DiError::cyclic(match key {
                    ComponentKey::Type(ty) => ty.name().to_owned(),
                    ComponentKey::Name(name) => name.clone(),
                }));
            }
            stack.push(frame);
            Ok(ResolveGuard)
        })
    }
}

impl Drop for ResolveGuard {
    fn drop(&mut self) {
        RESOLVING.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

// =============================================================================
// Arena
// =============================================================================

/// Handle of a container inside its graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContainerId(usize);

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "container#{}", self.0)
    }
}

struct Node {
    namespace: Option<String>,
    path: RwLock<Option<String>>,
    storage: DefinitionStorage,
    parents: RwLock<Vec<ContainerId>>,
    children: RwLock<Vec<ContainerId>>,
    /// Containers registered by path; only used on roots
    descendants: DashMap<String, ContainerId, RandomState>,
    inited: AtomicBool,
}

impl Node {
    fn new(namespace: Option<String>) -> Self {
        Self {
            namespace,
            path: RwLock::new(None),
            storage: DefinitionStorage::new(),
            parents: RwLock::new(Vec::new()),
            children: RwLock::new(Vec::new()),
            descendants: DashMap::with_hasher(RandomState::new()),
            inited: AtomicBool::new(false),
        }
    }
}

/// State shared by every container of one graph.
struct Arena {
    nodes: RwLock<Vec<Arc<Node>>>,
    classes: ClassRegistry,
    external: RwLock<Option<Arc<dyn ExternalContext>>>,
    config: ContainerConfig,
}

impl Arena {
    fn push(&self, namespace: Option<String>) -> ContainerId {
        let mut nodes = self.nodes.write();
        nodes.push(Arc::new(Node::new(namespace)));
        ContainerId(nodes.len() - 1)
    }

    #[inline]
    fn node(&self, id: ContainerId) -> Arc<Node> {
        Arc::clone(&self.nodes.read()[id.0])
    }
}

/// Weak back-reference from a definition to its owning container.
#[derive(Clone)]
pub(crate) struct ContainerRef {
    arena: Weak<Arena>,
    id: ContainerId,
}

impl ContainerRef {
    pub(crate) fn upgrade(&self) -> Option<Container> {
        self.arena.upgrade().map(|arena| Container { arena, id: self.id })
    }
}

/// Candidate list for a [`DiError::TooManyRegistration`].
pub(crate) fn candidates_of(defs: &[Arc<ComponentDef>]) -> Candidates {
    Candidates(defs.iter().map(|def| def.candidate()).collect())
}

// =============================================================================
// Container
// =============================================================================

/// Component container.
///
/// # Examples
///
/// ```rust
/// use component_container::{ClassDesc, ComponentDef, Container, InstanceScope};
/// use std::sync::Arc;
///
/// #[derive(Default)]
/// struct Ticket { seat: u32 }
///
/// let root = Container::new();
/// root.register(
///     ComponentDef::builder()
///         .class(ClassDesc::builder::<Ticket>().default_constructor(Ticket::default).build())
///         .scope(InstanceScope::Prototype)
///         .build()
///         .unwrap(),
/// )
/// .unwrap();
///
/// // Children see their parent's definitions
/// let child = root.create_child("box_office");
/// let a = child.get::<Ticket>().unwrap();
/// let b = child.get::<Ticket>().unwrap();
/// assert!(!Arc::ptr_eq(&a, &b));
/// ```
#[derive(Clone)]
pub struct Container {
    arena: Arc<Arena>,
    id: ContainerId,
}

impl Container {
    /// Create a root container with the default configuration.
    #[inline]
    pub fn new() -> Self {
        Self::with_config(ContainerConfig::default())
    }

    /// Create a root container. The configuration is shared by every
    /// container later created in the same graph.
    pub fn with_config(config: ContainerConfig) -> Self {
        let arena = Arc::new(Arena {
            nodes: RwLock::new(Vec::new()),
            classes: ClassRegistry::new(),
            external: RwLock::new(None),
            config,
        });
        let id = arena.push(None);

        #[cfg(feature = "logging")]
        debug!(
            target: "component_container",
            container = %id,
            "Creating new root container"
        );

        Self { arena, id }
    }

    #[inline]
    fn node(&self) -> Arc<Node> {
        self.arena.node(self.id)
    }

    #[inline]
    fn arena_ptr(&self) -> usize {
        Arc::as_ptr(&self.arena) as usize
    }

    #[inline]
    fn handle(&self, id: ContainerId) -> Container {
        Container {
            arena: Arc::clone(&self.arena),
            id,
        }
    }

    fn reference(&self) -> ContainerRef {
        ContainerRef {
            arena: Arc::downgrade(&self.arena),
            id: self.id,
        }
    }

    fn same_graph(&self, other: &Container) -> Result<()> {
        if Arc::ptr_eq(&self.arena, &other.arena) {
            Ok(())
        } else {
            Err(DiError::ForeignContainer)
        }
    }

    // =========================================================================
    // Composition
    // =========================================================================

    /// Create a container in the same graph without any edges.
    pub fn create_container(&self, namespace: Option<&str>) -> Container {
        let id = self.arena.push(namespace.map(str::to_owned));

        #[cfg(feature = "logging")]
        debug!(
            target: "component_container",
            container = %id,
            namespace = namespace.unwrap_or("-"),
            "Creating container"
        );

        self.handle(id)
    }

    /// Create a namespaced child of this container.
    ///
    /// ```rust
    /// use component_container::Container;
    ///
    /// let root = Container::new();
    /// let dao = root.create_child("dao");
    /// assert_eq!(dao.namespace().as_deref(), Some("dao"));
    /// assert_eq!(dao.parents()[0].id(), root.id());
    /// ```
    pub fn create_child(&self, namespace: impl Into<String>) -> Container {
        let namespace = namespace.into();
        let child = self.create_container(Some(&namespace));
        self.link(&child);
        child
    }

    /// Make `child` a child of this container and this container its parent.
    ///
    /// If the child already has a path it is also registered as a descendant
    /// of the root.
    pub fn include(&self, child: &Container) -> Result<()> {
        self.same_graph(child)?;
        self.link(child);
        if let Some(path) = child.path() {
            self.register_descendant(path, child)?;
        }
        Ok(())
    }

    fn link(&self, child: &Container) {
        self.node().children.write().push(child.id);
        child.node().parents.write().push(self.id);

        #[cfg(feature = "logging")]
        debug!(
            target: "component_container",
            parent = %self.id,
            child = %child.id,
            namespace = child.node().namespace.as_deref().unwrap_or("-"),
            "Included child container"
        );
    }

    /// Append `parent` to the parents consulted for missing keys.
    ///
    /// The container graph is not checked for cycles; a cycle makes lookups
    /// of missing keys recurse without bound.
    pub fn add_parent(&self, parent: &Container) -> Result<()> {
        self.same_graph(parent)?;
        self.node().parents.write().push(parent.id);
        Ok(())
    }

    /// Record `container` under `path` on the root of this graph.
    pub fn register_descendant(&self, path: impl Into<String>, container: &Container) -> Result<()> {
        self.same_graph(container)?;
        let path = path.into();
        self.root().node().descendants.insert(path, container.id);
        Ok(())
    }

    pub fn find_descendant(&self, path: &str) -> Option<Container> {
        let id = *self.root().node().descendants.get(path)?;
        Some(self.handle(id))
    }

    /// Follow first parents up to a container without parents.
    pub fn root(&self) -> Container {
        let mut current = self.id;
        while let Some(parent) = self.arena.node(current).parents.read().first().copied() {
            current = parent;
        }
        self.handle(current)
    }

    pub fn parents(&self) -> Vec<Container> {
        self.node().parents.read().iter().map(|id| self.handle(*id)).collect()
    }

    pub fn children(&self) -> Vec<Container> {
        self.node().children.read().iter().map(|id| self.handle(*id)).collect()
    }

    #[inline]
    pub fn id(&self) -> ContainerId {
        self.id
    }

    pub fn namespace(&self) -> Option<String> {
        self.node().namespace.clone()
    }

    /// Where this container's definitions came from, e.g. a config file.
    pub fn path(&self) -> Option<String> {
        self.node().path.read().clone()
    }

    pub fn set_path(&self, path: impl Into<String>) {
        *self.node().path.write() = Some(path.into());
    }

    // =========================================================================
    // Shared state
    // =========================================================================

    #[inline]
    pub fn config(&self) -> &ContainerConfig {
        &self.arena.config
    }

    #[inline]
    pub fn classes(&self) -> &ClassRegistry {
        &self.arena.classes
    }

    /// Make a class known so that values of it can be cast to its interfaces,
    /// e.g. for expression results.
    pub fn register_class(&self, class: Arc<ClassDesc>) {
        self.arena.classes.register(class);
    }

    /// Storage for session, application and request scoped components.
    pub fn set_external_context(&self, context: impl ExternalContext + 'static) {
        *self.arena.external.write() = Some(Arc::new(context));
    }

    pub(crate) fn external_context(&self) -> Option<Arc<dyn ExternalContext>> {
        self.arena.external.read().as_ref().map(Arc::clone)
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Register a definition.
    ///
    /// The definition is indexed by its declared type, every type its class
    /// is assignable to, and its name. A key reached by several definitions
    /// is not an error until it is requested.
    pub fn register(&self, def: Arc<ComponentDef>) -> Result<()> {
        let concrete = def.concrete_class()?;
        def.attach(&self.reference())?;
        self.register_classes(&def);
        if let Some(class) = &concrete {
            self.arena.classes.register(Arc::clone(class));
        }

        let node = self.node();
        node.storage.push(Arc::clone(&def));

        let mut keys = Vec::new();
        if let Some(ty) = def.component_type() {
            keys.push(ComponentKey::Type(ty));
        }
        if let Some(class) = &concrete {
            keys.extend(class.assignable_types().iter().map(|ty| ComponentKey::Type(*ty)));
        }
        if let Some(name) = def.name() {
            keys.push(ComponentKey::name(name));
        }

        for key in keys {
            if node.storage.index(key.clone(), &def) {
                #[cfg(feature = "logging")]
                debug!(
                    target: "component_container",
                    container = %self.id,
                    key = %key,
                    "Key has several definitions; requesting it will fail"
                );
            }
        }

        #[cfg(feature = "logging")]
        debug!(
            target: "component_container",
            container = %self.id,
            component = %def.describe(),
            scope = def.scope().name(),
            definitions = node.storage.len(),
            "Registered component"
        );

        Ok(())
    }

    fn register_classes(&self, def: &ComponentDef) {
        if let Some(class) = def.class() {
            self.arena.classes.register(Arc::clone(class));
        }
        for child in def.children() {
            self.register_classes(child);
        }
    }

    /// Index `def` under a type bound after registration.
    pub(crate) fn index_bound_type(&self, def: &ComponentDef, ty: TypeKey) {
        if let Some(def) = def.self_arc() {
            self.node().storage.index(ComponentKey::Type(ty), &def);
        }
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Local index, then namespace, then parents in order (first hit wins).
    pub(crate) fn lookup(&self, key: &ComponentKey) -> Option<Entry> {
        let node = self.node();
        if let Some(entry) = node.storage.get(key) {
            return Some(entry);
        }

        if let Some((namespace, rest)) = key.split_namespace() {
            let rest = ComponentKey::name(rest);
            if node.namespace.as_deref() == Some(namespace) {
                if let Some(entry) = node.storage.get(&rest) {
                    return Some(entry);
                }
            }
            let children = node.children.read().clone();
            for child in children {
                let child = self.arena.node(child);
                if child.namespace.as_deref() == Some(namespace) {
                    if let Some(entry) = child.storage.get(&rest) {
                        return Some(entry);
                    }
                }
            }
        }

        let parents = node.parents.read().clone();
        parents
            .into_iter()
            .find_map(|parent| self.handle(parent).lookup(key))
    }

    /// Every definition the key resolves to, ambiguous or not.
    pub(crate) fn candidates(&self, key: &ComponentKey) -> Vec<Arc<ComponentDef>> {
        self.lookup(key).map(|entry| entry.definitions()).unwrap_or_default()
    }

    /// Local definitions under `key`, then those of every parent; no duplicates.
    pub(crate) fn find_all_definitions(&self, key: &ComponentKey) -> Vec<Arc<ComponentDef>> {
        let mut found = Vec::new();
        self.collect_all(key, &mut found);
        found
    }

    fn collect_all(&self, key: &ComponentKey, found: &mut Vec<Arc<ComponentDef>>) {
        let node = self.node();
        if let Some(entry) = node.storage.get(key) {
            for def in entry.definitions() {
                if !found.iter().any(|known| known.id() == def.id()) {
                    found.push(def);
                }
            }
        }
        let parents = node.parents.read().clone();
        for parent in parents {
            self.handle(parent).collect_all(key, found);
        }
    }

    /// The single definition behind `key`, without deploying it.
    pub fn definition(&self, key: impl Into<ComponentKey>) -> Result<Arc<ComponentDef>> {
        let key = key.into();
        match self.lookup(&key) {
            Some(Entry::One(def)) => Ok(def),
            Some(Entry::TooMany(defs)) => Err(DiError::TooManyRegistration {
                candidates: candidates_of(&defs),
                key,
            }),
            None => Err(DiError::not_found(key)),
        }
    }

    /// Local definitions in registration order.
    pub fn definitions(&self) -> Vec<Arc<ComponentDef>> {
        self.node().storage.definitions()
    }

    /// Whether `key` resolves to at least one definition, here or in a parent.
    pub fn has_definition(&self, key: impl Into<ComponentKey>) -> bool {
        self.lookup(&key.into()).is_some()
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    /// Resolve the component registered for `T`.
    ///
    /// `T` may be a concrete type or an interface (`dyn Trait`) the
    /// component's class implements.
    ///
    /// ```rust
    /// use component_container::{ClassDesc, ComponentDef, Container};
    ///
    /// trait Clock: Send + Sync { fn now(&self) -> u64; }
    ///
    /// #[derive(Default)]
    /// struct Fixed;
    /// impl Clock for Fixed { fn now(&self) -> u64 { 42 } }
    ///
    /// let container = Container::new();
    /// container.register(
    ///     ComponentDef::builder()
    ///         .class(
    ///             ClassDesc::builder::<Fixed>()
    ///                 .implements::<dyn Clock>(|c| c)
    ///                 .default_constructor(Fixed::default)
    ///                 .build(),
    ///         )
    ///         .build()
    ///         .unwrap(),
    /// )
    /// .unwrap();
    ///
    /// assert_eq!(container.get::<dyn Clock>().unwrap().now(), 42);
    /// ```
    pub fn get<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        let value = self.get_value(ComponentKey::of::<T>())?;
        self.downcast(&value)
    }

    /// Resolve the component named `name` as `T`.
    pub fn get_named<T: ?Sized + Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>> {
        let value = self.get_value(ComponentKey::name(name))?;
        self.downcast(&value)
    }

    /// Resolve `key` to its erased instance.
    pub fn get_value(&self, key: impl Into<ComponentKey>) -> Result<Value> {
        let key = key.into();
        let _guard = ResolveGuard::enter(self, &key)?;

        #[cfg(feature = "logging")]
        trace!(
            target: "component_container",
            container = %self.id,
            key = %key,
            "Resolving component"
        );

        self.definition(key)?.deploy()
    }

    fn downcast<T: ?Sized + Send + Sync + 'static>(&self, value: &Value) -> Result<Arc<T>> {
        let classes = self.classes();
        classes
            .downcast::<T>(value)
            .ok_or_else(|| DiError::class_mismatch(TypeKey::of::<T>(), classes.describe(value)))
    }

    /// Instances of every definition assignable to `T`, here and in all
    /// parents. Outer definitions are skipped.
    pub fn find_all<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Vec<Arc<T>>> {
        self.find_all_values(ComponentKey::of::<T>())?
            .iter()
            .map(|value| self.downcast(value))
            .collect()
    }

    pub fn find_all_values(&self, key: impl Into<ComponentKey>) -> Result<Vec<Value>> {
        deploy_each(self.find_all_definitions(&key.into()))
    }

    /// Like [`find_all`](Self::find_all) but for this container only.
    pub fn find_local<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Vec<Arc<T>>> {
        self.find_local_values(ComponentKey::of::<T>())?
            .iter()
            .map(|value| self.downcast(value))
            .collect()
    }

    pub fn find_local_values(&self, key: impl Into<ComponentKey>) -> Result<Vec<Value>> {
        let defs = self
            .node()
            .storage
            .get(&key.into())
            .map(|entry| entry.definitions())
            .unwrap_or_default();
        deploy_each(defs)
    }

    // =========================================================================
    // Outer injection
    // =========================================================================

    /// Inject into an instance the container did not create, using the
    /// outer-scoped definition registered for `T`.
    pub fn inject_dependency<T: Send + Sync + 'static>(&self, target: &mut T) -> Result<()> {
        let def = self.definition(ComponentKey::of::<T>())?;
        def.inject_dependency(target as &mut dyn Any, TypeKey::of::<T>())
    }

    /// Inject using the outer-scoped definition named `name`.
    pub fn inject_dependency_named<T: Send + Sync + 'static>(&self, name: &str, target: &mut T) -> Result<()> {
        let def = self.definition(ComponentKey::name(name))?;
        def.inject_dependency(target as &mut dyn Any, TypeKey::of::<T>())
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Deploy every singleton of this container, then of its children.
    ///
    /// Calling it again does nothing until [`destroy`](Self::destroy) runs.
    pub fn init(&self) -> Result<()> {
        let node = self.node();
        if node.inited.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        #[cfg(feature = "logging")]
        debug!(
            target: "component_container",
            container = %self.id,
            definitions = node.storage.len(),
            "Initializing container"
        );

        let result = node
            .storage
            .definitions()
            .iter()
            .try_for_each(|def| def.init())
            .and_then(|()| self.children().iter().try_for_each(Container::init));
        if result.is_err() {
            node.inited.store(false, Ordering::Release);
        }
        result
    }

    /// Tear down children, then this container's definitions in reverse
    /// registration order.
    ///
    /// Every definition is visited even if an earlier one fails; the first
    /// error is returned.
    pub fn destroy(&self) -> Result<()> {
        let node = self.node();

        #[cfg(feature = "logging")]
        debug!(
            target: "component_container",
            container = %self.id,
            definitions = node.storage.len(),
            "Destroying container"
        );

        let mut first_error = None;
        for child in self.children().iter().rev() {
            if let Err(err) = child.destroy() {
                first_error.get_or_insert(err);
            }
        }
        for def in node.storage.definitions().iter().rev() {
            if let Err(err) = def.destroy() {
                first_error.get_or_insert(err);
            }
        }
        node.inited.store(false, Ordering::Release);

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Number of definitions registered directly in this container.
    #[inline]
    pub fn len(&self) -> usize {
        self.node().storage.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn deploy_each(defs: Vec<Arc<ComponentDef>>) -> Result<Vec<Value>> {
    defs.iter()
        .filter(|def| def.scope() != InstanceScope::Outer)
        .map(|def| def.deploy())
        .collect()
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let node = self.node();
        f.debug_struct("Container")
            .field("id", &self.id)
            .field("namespace", &node.namespace)
            .field("storage", &node.storage)
            .field("parents", &node.parents.read().len())
            .field("children", &node.children.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ClassDesc, Expression, PropertyDef};

    #[derive(Default, Debug)]
    struct Dao {
        table: &'static str,
    }

    fn dao(name: &str, table: &'static str) -> Arc<ComponentDef> {
        ComponentDef::builder()
            .class(
                ClassDesc::builder::<Dao>()
                    .default_constructor(move || Dao { table })
                    .build(),
            )
            .name(name)
            .build()
            .unwrap()
    }

    #[test]
    fn test_not_found() {
        let container = Container::new();
        let err = container.get::<Dao>().unwrap_err();
        assert!(err.is_not_found());
        assert!(!container.has_definition(ComponentKey::of::<Dao>()));
    }

    #[test]
    fn test_register_twice_fails() {
        let container = Container::new();
        let def = dao("users", "users");
        container.register(Arc::clone(&def)).unwrap();
        assert!(matches!(
            container.register(def),
            Err(DiError::DefinitionAlreadyRegistered { .. })
        ));
        assert_eq!(container.len(), 1);
    }

    #[test]
    fn test_registered_child_leaves_parent_unattached() {
        let container = Container::new();
        let inner = dao("inner", "inner");
        container.register(Arc::clone(&inner)).unwrap();

        let outer = ComponentDef::builder()
            .component_type::<Dao>()
            .name("outer")
            .scope(InstanceScope::Outer)
            .property(PropertyDef::new("table").child(inner))
            .build()
            .unwrap();
        assert!(matches!(
            container.register(Arc::clone(&outer)),
            Err(DiError::DefinitionAlreadyRegistered { .. })
        ));
        assert!(!outer.is_registered());
        assert!(outer.container().is_err());
        assert_eq!(container.len(), 1);
    }

    #[test]
    fn test_too_many_only_on_request() {
        let container = Container::new();
        container.register(dao("users", "users")).unwrap();
        container.register(dao("orders", "orders")).unwrap();

        assert!(container.has_definition(ComponentKey::of::<Dao>()));
        match container.get::<Dao>() {
            Err(DiError::TooManyRegistration { candidates, .. }) => {
                let names: Vec<_> = candidates.0.iter().filter_map(|c| c.name.as_deref()).collect();
                assert_eq!(names, ["users", "orders"]);
            }
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
        assert_eq!(container.get_named::<Dao>("orders").unwrap().table, "orders");
    }

    #[test]
    fn test_child_overrides_parent() {
        let root = Container::new();
        root.register(dao("users", "root_users")).unwrap();
        let child = root.create_child("tenant");
        child.register(dao("users", "tenant_users")).unwrap();

        assert_eq!(root.get_named::<Dao>("users").unwrap().table, "root_users");
        assert_eq!(child.get_named::<Dao>("users").unwrap().table, "tenant_users");
    }

    #[test]
    fn test_namespace_lookup() {
        let root = Container::new();
        let child = root.create_child("dao");
        child.register(dao("userDao", "users")).unwrap();

        assert_eq!(root.get_named::<Dao>("dao.userDao").unwrap().table, "users");
        assert_eq!(child.get_named::<Dao>("dao.userDao").unwrap().table, "users");
        assert!(root.get_named::<Dao>("userDao").unwrap_err().is_not_found());
        assert!(root.get_named::<Dao>("web.userDao").unwrap_err().is_not_found());
    }

    #[test]
    fn test_find_all_spans_parents_without_duplicates() {
        let root = Container::new();
        root.register(dao("users", "users")).unwrap();
        let child = root.create_child("tenant");
        child.register(dao("orders", "orders")).unwrap();
        child.add_parent(&root).unwrap();

        let tables: Vec<_> = child.find_all::<Dao>().unwrap().iter().map(|d| d.table).collect();
        assert_eq!(tables, ["orders", "users"]);
        assert_eq!(child.find_local::<Dao>().unwrap().len(), 1);
        assert!(root.find_all::<String>().unwrap().is_empty());
    }

    #[test]
    fn test_graph_navigation() {
        let root = Container::new();
        let web = root.create_child("web");
        let admin = web.create_child("admin");
        assert_eq!(admin.root().id(), root.id());
        assert_eq!(root.children().len(), 1);

        let loose = root.create_container(Some("plugins"));
        loose.set_path("plugins.toml");
        admin.include(&loose).unwrap();
        assert_eq!(root.find_descendant("plugins.toml").unwrap().id(), loose.id());
        assert!(root.find_descendant("missing.toml").is_none());
    }

    #[test]
    fn test_containers_of_other_graphs_are_rejected() {
        let a = Container::new();
        let b = Container::new();
        assert!(matches!(a.include(&b), Err(DiError::ForeignContainer)));
        assert!(matches!(a.add_parent(&b), Err(DiError::ForeignContainer)));
    }

    #[test]
    fn test_self_resolving_expression_is_cyclic() {
        let container = Container::new();
        container
            .register(
                ComponentDef::builder()
                    .name("loop")
                    .expression(Expression::new("loop", |c: &Container| Ok(c.get_value("loop")?)))
                    .build()
                    .unwrap(),
            )
            .unwrap();

        assert!(matches!(
            container.get_value("loop"),
            Err(DiError::CyclicReference { .. })
        ));
        // the failed attempt left nothing behind on this thread
        assert!(matches!(
            container.get_value("loop"),
            Err(DiError::CyclicReference { .. })
        ));
    }

    #[test]
    fn test_definition_path_falls_back_to_container() {
        let container = Container::new();
        container.set_path("app.toml");
        let def = dao("users", "users");
        container.register(Arc::clone(&def)).unwrap();
        assert_eq!(def.path().as_deref(), Some("app.toml"));
        assert_eq!(def.container().unwrap().id(), container.id());
    }

    #[test]
    fn test_dropped_container() {
        let def = dao("users", "users");
        {
            let container = Container::new();
            container.register(Arc::clone(&def)).unwrap();
        }
        assert!(matches!(def.container(), Err(DiError::ContainerDropped)));
    }
}
