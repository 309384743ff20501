//! Class descriptors
//!
//! A [`ClassDesc`] is the runtime description of a concrete component type:
//! which types it can be viewed as, how it is constructed, which members can
//! be injected and which no-argument methods can serve as init or destroy
//! callbacks. Descriptors are built once with [`ClassBuilder`] and shared.
//!
//! Values travel through the container type-erased as [`Value`]. A slot
//! converts a value into the typed argument its writer expects.

use crate::{BindingType, BoxError, TypeKey};
use ahash::RandomState;
use dashmap::DashMap;
use std::any::{Any, TypeId};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Type-erased, shareable instance.
pub type Value = Arc<dyn Any + Send + Sync>;

/// Type-erased argument on its way into a constructor or writer.
pub type Payload = Box<dyn Any + Send>;

type Caster = Arc<dyn Fn(Value) -> Option<Payload> + Send + Sync>;
type Writer = Arc<dyn Fn(&mut dyn Any, Payload) -> Result<(), String> + Send + Sync>;
type Build = Arc<dyn Fn(&mut Args) -> Result<Value, BoxError> + Send + Sync>;
type SharedBody = Arc<dyn Fn(&dyn Any) -> Result<(), BoxError> + Send + Sync>;
type ExclusiveBody = Arc<dyn Fn(&mut dyn Any) -> Result<(), BoxError> + Send + Sync>;

/// Runtime type of an erased value.
#[inline]
pub(crate) fn runtime_type(value: &Value) -> TypeId {
    (**value).type_id()
}

// =============================================================================
// Slots
// =============================================================================

/// What a slot accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    /// A single component, delivered as `Arc<T>`
    Component,
    /// Every assignable component, delivered as `Vec<Arc<T>>`
    Many,
    /// A plain value, delivered as a clone of `V`
    Value,
}

/// Declared type of a constructor parameter or an injectable member.
#[derive(Clone)]
pub struct Slot {
    ty: TypeKey,
    kind: SlotKind,
    element: fn(&Value) -> Option<Payload>,
    list: fn(&Value) -> Option<Payload>,
    collect: fn(Vec<Payload>) -> Payload,
}

impl Slot {
    /// Slot receiving `Arc<T>`.
    pub fn component<T: ?Sized + Send + Sync + 'static>() -> Self {
        Self {
            ty: TypeKey::of::<T>(),
            kind: SlotKind::Component,
            element: handle::<T>,
            list: no_list,
            collect: collect_handles::<T>,
        }
    }

    /// Slot receiving `Vec<Arc<T>>`.
    pub fn many<T: ?Sized + Send + Sync + 'static>() -> Self {
        Self {
            ty: TypeKey::of::<T>(),
            kind: SlotKind::Many,
            element: handle::<T>,
            list: handle_list::<T>,
            collect: collect_handles::<T>,
        }
    }

    /// Slot receiving a clone of `V`.
    pub fn value<V: Clone + Send + Sync + 'static>() -> Self {
        Self {
            ty: TypeKey::of::<V>(),
            kind: SlotKind::Value,
            element: cloned::<V>,
            list: no_list,
            collect: collect_cloned::<V>,
        }
    }

    /// Declared type (the element type for [`SlotKind::Many`]).
    #[inline]
    pub fn type_key(&self) -> TypeKey {
        self.ty
    }

    #[inline]
    pub fn kind(&self) -> SlotKind {
        self.kind
    }

    /// True if the slot is filled with container-managed components.
    #[inline]
    pub fn is_component(&self) -> bool {
        !matches!(self.kind, SlotKind::Value)
    }

    /// Convert one value into this slot's argument.
    pub(crate) fn adapt(&self, value: &Value, classes: &ClassRegistry) -> Option<Payload> {
        match self.kind {
            SlotKind::Value => (self.element)(value),
            SlotKind::Component => self.adapt_element(value, classes),
            SlotKind::Many => (self.list)(value).or_else(|| {
                self.adapt_element(value, classes)
                    .map(|payload| (self.collect)(vec![payload]))
            }),
        }
    }

    /// Convert several component values into a `Vec<Arc<T>>` argument.
    pub(crate) fn adapt_all(&self, values: &[Value], classes: &ClassRegistry) -> Payload {
        let payloads = values
            .iter()
            .filter_map(|value| self.adapt_element(value, classes))
            .collect();
        (self.collect)(payloads)
    }

    fn adapt_element(&self, value: &Value, classes: &ClassRegistry) -> Option<Payload> {
        classes
            .cast(value, self.ty)
            .or_else(|| (self.element)(value))
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("type", &self.ty)
            .field("kind", &self.kind)
            .finish()
    }
}

fn handle<T: ?Sized + Send + Sync + 'static>(value: &Value) -> Option<Payload> {
    value
        .downcast_ref::<Arc<T>>()
        .map(|arc| Box::new(Arc::clone(arc)) as Payload)
}

fn handle_list<T: ?Sized + Send + Sync + 'static>(value: &Value) -> Option<Payload> {
    value
        .downcast_ref::<Vec<Arc<T>>>()
        .map(|list| Box::new(list.clone()) as Payload)
}

fn no_list(_: &Value) -> Option<Payload> {
    None
}

fn cloned<V: Clone + Send + Sync + 'static>(value: &Value) -> Option<Payload> {
    value
        .downcast_ref::<V>()
        .map(|v| Box::new(v.clone()) as Payload)
}

fn collect_handles<T: ?Sized + Send + Sync + 'static>(payloads: Vec<Payload>) -> Payload {
    let items: Vec<Arc<T>> = payloads
        .into_iter()
        .filter_map(|payload| payload.downcast::<Arc<T>>().ok())
        .map(|arc| *arc)
        .collect();
    Box::new(items)
}

fn collect_cloned<V: Clone + Send + Sync + 'static>(payloads: Vec<Payload>) -> Payload {
    let items: Vec<V> = payloads
        .into_iter()
        .filter_map(|payload| payload.downcast::<V>().ok())
        .map(|v| *v)
        .collect();
    Box::new(items)
}

// =============================================================================
// Constructors
// =============================================================================

/// Positional arguments handed to a constructor body.
pub struct Args {
    values: VecDeque<Payload>,
    position: usize,
}

impl Args {
    pub(crate) fn new(values: Vec<Payload>) -> Self {
        Self {
            values: values.into(),
            position: 0,
        }
    }

    /// Take the next argument as `V`.
    ///
    /// Component parameters arrive as `Arc<T>`, `Many` parameters as
    /// `Vec<Arc<T>>`, value parameters as the value itself.
    pub fn next<V: 'static>(&mut self) -> Result<V, BoxError> {
        let index = self.position;
        self.position += 1;
        let payload = self
            .values
            .pop_front()
            .ok_or_else(|| BoxError::from(format!("missing argument #{}", index)))?;
        payload.downcast::<V>().map(|v| *v).map_err(|_| {
            BoxError::from(format!(
                "argument #{} is not a {}",
                index,
                std::any::type_name::<V>()
            ))
        })
    }

    /// Number of arguments not yet taken.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.values.len()
    }
}

/// A constructor: parameter slots plus a body.
#[derive(Clone)]
pub struct ConstructorDesc {
    params: Vec<Slot>,
    build: Build,
}

impl ConstructorDesc {
    #[inline]
    pub fn params(&self) -> &[Slot] {
        &self.params
    }

    #[inline]
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub(crate) fn invoke(&self, args: Vec<Payload>) -> Result<Value, BoxError> {
        (self.build)(&mut Args::new(args))
    }
}

impl fmt::Debug for ConstructorDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstructorDesc")
            .field("params", &self.params)
            .finish()
    }
}

// =============================================================================
// Members
// =============================================================================

/// How a member is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Through a setter
    Setter,
    /// Directly into the field
    Field,
}

/// An injectable property or field.
#[derive(Clone)]
pub struct PropertyDesc {
    name: String,
    slot: Slot,
    access: Access,
    binding: Option<BindingType>,
    writer: Writer,
}

impl PropertyDesc {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn slot(&self) -> &Slot {
        &self.slot
    }

    #[inline]
    pub fn access(&self) -> Access {
        self.access
    }

    /// Binding type declared on the member itself.
    #[inline]
    pub fn binding_type(&self) -> Option<BindingType> {
        self.binding
    }

    /// True if the member carries an explicit binding type.
    #[inline]
    pub fn is_annotated(&self) -> bool {
        self.binding.is_some()
    }

    pub(crate) fn write(&self, target: &mut dyn Any, payload: Payload) -> Result<(), String> {
        (self.writer)(target, payload)
    }
}

impl fmt::Debug for PropertyDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyDesc")
            .field("name", &self.name)
            .field("slot", &self.slot)
            .field("access", &self.access)
            .field("binding", &self.binding)
            .finish()
    }
}

fn writer<C, P, F>(f: F) -> Writer
where
    C: 'static,
    P: 'static,
    F: Fn(&mut C, P) + Send + Sync + 'static,
{
    Arc::new(move |target: &mut dyn Any, payload: Payload| {
        let target = target
            .downcast_mut::<C>()
            .ok_or_else(|| format!("target is not a {}", std::any::type_name::<C>()))?;
        let value = payload
            .downcast::<P>()
            .map_err(|_| format!("value is not a {}", std::any::type_name::<P>()))?;
        f(target, *value);
        Ok(())
    })
}

// =============================================================================
// Methods
// =============================================================================

#[derive(Clone)]
enum MethodBody {
    Shared(SharedBody),
    Exclusive(ExclusiveBody),
}

/// A no-argument method usable as init or destroy callback.
#[derive(Clone)]
pub struct MethodDesc {
    name: String,
    body: MethodBody,
}

impl MethodDesc {
    /// Method taking `&C`.
    pub fn shared<C, F>(name: impl Into<String>, f: F) -> Self
    where
        C: 'static,
        F: Fn(&C) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            body: MethodBody::Shared(Arc::new(move |target: &dyn Any| {
                let target = target.downcast_ref::<C>().ok_or_else(|| {
                    BoxError::from(format!("receiver is not a {}", std::any::type_name::<C>()))
                })?;
                f(target)
            })),
        }
    }

    /// Method taking `&mut C`.
    pub fn exclusive<C, F>(name: impl Into<String>, f: F) -> Self
    where
        C: 'static,
        F: Fn(&mut C) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            body: MethodBody::Exclusive(Arc::new(move |target: &mut dyn Any| {
                let target = target.downcast_mut::<C>().ok_or_else(|| {
                    BoxError::from(format!("receiver is not a {}", std::any::type_name::<C>()))
                })?;
                f(target)
            })),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True if the method needs exclusive access to the instance.
    #[inline]
    pub fn is_exclusive(&self) -> bool {
        matches!(self.body, MethodBody::Exclusive(_))
    }

    pub(crate) fn invoke_mut(&self, target: &mut dyn Any) -> Result<(), BoxError> {
        match &self.body {
            MethodBody::Shared(body) => body(target),
            MethodBody::Exclusive(body) => body(target),
        }
    }

    /// Invoke through a shared reference; `None` for exclusive methods.
    pub(crate) fn invoke_shared(&self, target: &dyn Any) -> Option<Result<(), BoxError>> {
        match &self.body {
            MethodBody::Shared(body) => Some(body(target)),
            MethodBody::Exclusive(_) => None,
        }
    }
}

impl fmt::Debug for MethodDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDesc")
            .field("name", &self.name)
            .field("exclusive", &self.is_exclusive())
            .finish()
    }
}

// =============================================================================
// Class descriptor
// =============================================================================

/// Runtime description of a concrete component type.
pub struct ClassDesc {
    key: TypeKey,
    assignable: Vec<TypeKey>,
    casters: HashMap<TypeId, Caster, RandomState>,
    constructors: Vec<ConstructorDesc>,
    members: Vec<PropertyDesc>,
    methods: Vec<MethodDesc>,
}

impl ClassDesc {
    /// Start describing `C`.
    pub fn builder<C: Send + Sync + 'static>() -> ClassBuilder<C> {
        let key = TypeKey::of::<C>();
        let mut casters: HashMap<TypeId, Caster, RandomState> = HashMap::default();
        casters.insert(
            key.id(),
            Arc::new(|value: Value| {
                value
                    .downcast::<C>()
                    .ok()
                    .map(|concrete| Box::new(concrete) as Payload)
            }),
        );
        ClassBuilder {
            desc: ClassDesc {
                key,
                assignable: vec![key],
                casters,
                constructors: Vec::new(),
                members: Vec::new(),
                methods: Vec::new(),
            },
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn key(&self) -> TypeKey {
        self.key
    }

    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.key.name()
    }

    /// Module path the type is declared in.
    pub fn package(&self) -> &'static str {
        let name = self.key.name();
        let base = name.split('<').next().unwrap_or(name);
        base.rsplit_once("::").map(|(package, _)| package).unwrap_or("")
    }

    /// The type itself followed by every registered interface.
    #[inline]
    pub fn assignable_types(&self) -> &[TypeKey] {
        &self.assignable
    }

    #[inline]
    pub fn is_assignable_to(&self, target: TypeKey) -> bool {
        self.casters.contains_key(&target.id())
    }

    /// View an instance of this class as `Arc<target>` (boxed).
    pub fn cast(&self, value: Value, target: TypeKey) -> Option<Payload> {
        self.casters.get(&target.id()).and_then(|caster| caster(value))
    }

    #[inline]
    pub fn constructors(&self) -> &[ConstructorDesc] {
        &self.constructors
    }

    /// The zero-argument constructor, if any.
    pub fn default_constructor(&self) -> Option<&ConstructorDesc> {
        self.constructors.iter().find(|c| c.arity() == 0)
    }

    /// Member by name; a setter wins over a field of the same name.
    pub fn property(&self, name: &str) -> Option<&PropertyDesc> {
        let mut matching = self.members.iter().filter(|m| m.name == name);
        let first = matching.next()?;
        if first.access == Access::Setter {
            return Some(first);
        }
        matching.find(|m| m.access == Access::Setter).or(Some(first))
    }

    /// Every injectable member in declaration order.
    #[inline]
    pub fn properties(&self) -> &[PropertyDesc] {
        &self.members
    }

    pub fn method(&self, name: &str) -> Option<&MethodDesc> {
        self.methods.iter().find(|m| m.name == name)
    }

    #[inline]
    pub fn methods(&self) -> &[MethodDesc] {
        &self.methods
    }
}

impl fmt::Debug for ClassDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDesc")
            .field("type", &self.key)
            .field("assignable", &self.assignable)
            .field("constructors", &self.constructors.len())
            .field("members", &self.members)
            .field("methods", &self.methods)
            .finish()
    }
}

/// Builder for [`ClassDesc`].
///
/// # Examples
///
/// ```rust
/// use component_container::{ClassDesc, Slot};
/// use std::sync::Arc;
///
/// trait Repository: Send + Sync {}
///
/// #[derive(Default)]
/// struct SqlRepository;
/// impl Repository for SqlRepository {}
///
/// #[derive(Default)]
/// struct UserService {
///     repository: Option<Arc<dyn Repository>>,
///     retries: u32,
/// }
///
/// let repo = ClassDesc::builder::<SqlRepository>()
///     .implements::<dyn Repository>(|c| c)
///     .default_constructor(SqlRepository::default)
///     .build();
///
/// let service = ClassDesc::builder::<UserService>()
///     .default_constructor(UserService::default)
///     .property::<dyn Repository, _>("repository", |s, r| s.repository = Some(r))
///     .property_value::<u32, _>("retries", |s, n| s.retries = n)
///     .build();
///
/// assert!(repo.is_assignable_to(component_container::TypeKey::of::<dyn Repository>()));
/// assert_eq!(service.properties().len(), 2);
/// ```
pub struct ClassBuilder<C> {
    desc: ClassDesc,
    _marker: PhantomData<fn() -> C>,
}

impl<C: Send + Sync + 'static> ClassBuilder<C> {
    /// Declare that `C` can be viewed as `I` (usually a trait object).
    pub fn implements<I>(mut self, upcast: fn(Arc<C>) -> Arc<I>) -> Self
    where
        I: ?Sized + Send + Sync + 'static,
    {
        let key = TypeKey::of::<I>();
        if !self.desc.assignable.contains(&key) {
            self.desc.assignable.push(key);
        }
        self.desc.casters.insert(
            key.id(),
            Arc::new(move |value: Value| {
                value
                    .downcast::<C>()
                    .ok()
                    .map(|concrete| Box::new(upcast(concrete)) as Payload)
            }),
        );
        self
    }

    /// Zero-argument constructor.
    pub fn default_constructor<F>(self, f: F) -> Self
    where
        F: Fn() -> C + Send + Sync + 'static,
    {
        self.constructor(Vec::new(), move |_| Ok(f()))
    }

    /// Constructor with positional parameters.
    pub fn constructor<F>(mut self, params: impl IntoIterator<Item = Slot>, f: F) -> Self
    where
        F: Fn(&mut Args) -> Result<C, BoxError> + Send + Sync + 'static,
    {
        self.desc.constructors.push(ConstructorDesc {
            params: params.into_iter().collect(),
            build: Arc::new(move |args: &mut Args| f(args).map(|c| Arc::new(c) as Value)),
        });
        self
    }

    /// Component property written through a setter.
    pub fn property<T, F>(self, name: &str, setter: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&mut C, Arc<T>) + Send + Sync + 'static,
    {
        self.member(name, Slot::component::<T>(), Access::Setter, writer(setter))
    }

    /// Property receiving every component assignable to `T`.
    pub fn property_many<T, F>(self, name: &str, setter: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&mut C, Vec<Arc<T>>) + Send + Sync + 'static,
    {
        self.member(name, Slot::many::<T>(), Access::Setter, writer(setter))
    }

    /// Plain value property.
    pub fn property_value<V, F>(self, name: &str, setter: F) -> Self
    where
        V: Clone + Send + Sync + 'static,
        F: Fn(&mut C, V) + Send + Sync + 'static,
    {
        self.member(name, Slot::value::<V>(), Access::Setter, writer(setter))
    }

    /// Component field written directly.
    pub fn field<T, F>(self, name: &str, write: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&mut C, Arc<T>) + Send + Sync + 'static,
    {
        self.member(name, Slot::component::<T>(), Access::Field, writer(write))
    }

    /// Plain value field written directly.
    pub fn field_value<V, F>(self, name: &str, write: F) -> Self
    where
        V: Clone + Send + Sync + 'static,
        F: Fn(&mut C, V) + Send + Sync + 'static,
    {
        self.member(name, Slot::value::<V>(), Access::Field, writer(write))
    }

    /// Attach a binding type to every member named `name`.
    pub fn annotate(mut self, name: &str, binding: BindingType) -> Self {
        for member in self.desc.members.iter_mut().filter(|m| m.name == name) {
            member.binding = Some(binding);
        }
        self
    }

    /// Method taking `&C`.
    pub fn method<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(&C) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.desc.methods.push(MethodDesc::shared(name, f));
        self
    }

    /// Method taking `&mut C`.
    pub fn method_mut<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(&mut C) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.desc.methods.push(MethodDesc::exclusive(name, f));
        self
    }

    pub fn build(self) -> Arc<ClassDesc> {
        Arc::new(self.desc)
    }

    fn member(mut self, name: &str, slot: Slot, access: Access, writer: Writer) -> Self {
        self.desc.members.push(PropertyDesc {
            name: name.to_owned(),
            slot,
            access,
            binding: None,
            writer,
        });
        self
    }
}

// =============================================================================
// Class registry
// =============================================================================

/// Every class descriptor known to a container graph, by concrete type.
pub struct ClassRegistry {
    classes: DashMap<TypeId, Arc<ClassDesc>, RandomState>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self {
            classes: DashMap::with_hasher(RandomState::new()),
        }
    }

    pub fn register(&self, class: Arc<ClassDesc>) {
        self.classes.entry(class.key().id()).or_insert(class);
    }

    pub fn get(&self, id: &TypeId) -> Option<Arc<ClassDesc>> {
        self.classes.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Descriptor of a value's runtime type.
    pub fn of_value(&self, value: &Value) -> Option<Arc<ClassDesc>> {
        self.get(&runtime_type(value))
    }

    /// View `value` as `Arc<target>` using the descriptor of its runtime type.
    pub fn cast(&self, value: &Value, target: TypeKey) -> Option<Payload> {
        self.of_value(value)
            .and_then(|class| class.cast(Arc::clone(value), target))
    }

    /// Whether `value` can be viewed as `target`.
    pub fn is_assignable(&self, value: &Value, target: TypeKey) -> bool {
        let id = runtime_type(value);
        id == target.id()
            || target.handle_id() == Some(id)
            || self
                .get(&id)
                .is_some_and(|class| class.is_assignable_to(target))
    }

    /// View `value` as `Arc<T>`, either through its class or as a handle.
    pub fn downcast<T: ?Sized + Send + Sync + 'static>(&self, value: &Value) -> Option<Arc<T>> {
        self.cast(value, TypeKey::of::<T>())
            .or_else(|| handle::<T>(value))
            .and_then(|payload| payload.downcast::<Arc<T>>().ok())
            .map(|arc| *arc)
    }

    /// Type name of a value for diagnostics.
    pub fn describe(&self, value: &Value) -> &'static str {
        self.of_value(value)
            .map(|class| class.type_name())
            .unwrap_or("<unregistered type>")
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl Default for ClassRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ClassRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassRegistry")
            .field("count", &self.len())
            .finish()
    }
}
