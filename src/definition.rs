//! Component definitions
//!
//! A [`ComponentDef`] describes one component: its type, name, scope,
//! binding mode, constructor arguments, properties, lifecycle methods and
//! aspects. Definitions are produced by a definition source (configuration
//! reader, annotation scanner, or hand-written code), registered with a
//! [`Container`], and are immutable afterwards except for two one-shot
//! transitions: the owning container is set on registration, and a missing
//! component type is bound the first time an instance is observed.

use crate::container::{Container, ContainerRef};
use crate::deployer::AnyDeployer;
use crate::error::Candidate;
use crate::{
    AutoBindingKind, BoxError, ClassDesc, DiError, InstanceScope, MethodDesc, Result, TypeKey,
    Value,
};
use once_cell::sync::OnceCell;
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

type ExpressionFn = Arc<dyn Fn(&Container) -> std::result::Result<Value, BoxError> + Send + Sync>;
type PointcutFn = Arc<dyn Fn(&str) -> bool + Send + Sync>;

// =============================================================================
// Value sources
// =============================================================================

/// A lazily evaluated value, e.g. a factory call or a script.
///
/// The source text is only kept for diagnostics.
///
/// # Examples
///
/// ```rust
/// use component_container::{Container, Expression, Value};
/// use std::sync::Arc;
///
/// let expr = Expression::new("40 + 2", |_| Ok(Arc::new(42_i32) as Value));
/// let value = expr.evaluate(&Container::new()).unwrap();
/// assert_eq!(value.downcast_ref::<i32>(), Some(&42));
/// ```
#[derive(Clone)]
pub struct Expression {
    source: Arc<str>,
    eval: ExpressionFn,
}

impl Expression {
    pub fn new<F>(source: impl Into<Arc<str>>, eval: F) -> Self
    where
        F: Fn(&Container) -> std::result::Result<Value, BoxError> + Send + Sync + 'static,
    {
        Self {
            source: source.into(),
            eval: Arc::new(eval),
        }
    }

    #[inline]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate against `container`.
    ///
    /// Container errors raised inside the expression pass through unchanged;
    /// anything else becomes [`DiError::IllegalExpression`].
    pub fn evaluate(&self, container: &Container) -> Result<Value> {
        (self.eval)(container).map_err(|err| match err.downcast::<DiError>() {
            Ok(err) => *err,
            Err(other) => DiError::IllegalExpression {
                expression: self.source.to_string(),
                reason: other.to_string(),
            },
        })
    }
}

impl fmt::Debug for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Expression").field(&self.source).finish()
    }
}

/// Where a configured argument or property value comes from.
#[derive(Clone)]
pub enum ValueSource {
    /// A fixed value
    Literal(Value),
    /// An expression evaluated against the owning container
    Expression(Expression),
    /// An anonymous nested definition, deployed on use
    Child(Arc<ComponentDef>),
}

impl ValueSource {
    /// Literal holding `value`.
    pub fn literal<V: Send + Sync + 'static>(value: V) -> Self {
        ValueSource::Literal(Arc::new(value))
    }

    pub(crate) fn resolve(&self, container: &Container) -> Result<Value> {
        match self {
            ValueSource::Literal(value) => Ok(Arc::clone(value)),
            ValueSource::Expression(expr) => expr.evaluate(container),
            ValueSource::Child(def) => def.deploy(),
        }
    }

    fn child(&self) -> Option<&Arc<ComponentDef>> {
        match self {
            ValueSource::Child(def) => Some(def),
            _ => None,
        }
    }
}

impl fmt::Debug for ValueSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueSource::Literal(_) => f.write_str("Literal(..)"),
            ValueSource::Expression(expr) => write!(f, "Expression({})", expr.source()),
            ValueSource::Child(def) => write!(f, "Child({})", def.describe()),
        }
    }
}

/// Positional constructor argument.
#[derive(Debug, Clone)]
pub struct ArgDef {
    source: ValueSource,
}

impl ArgDef {
    pub fn new(source: ValueSource) -> Self {
        Self { source }
    }

    pub fn literal<V: Send + Sync + 'static>(value: V) -> Self {
        Self::new(ValueSource::literal(value))
    }

    pub fn expression(expr: Expression) -> Self {
        Self::new(ValueSource::Expression(expr))
    }

    pub fn child(def: Arc<ComponentDef>) -> Self {
        Self::new(ValueSource::Child(def))
    }

    #[inline]
    pub fn source(&self) -> &ValueSource {
        &self.source
    }
}

/// Configured property.
///
/// Without a value source the property is auto-bound (depending on the
/// definition's binding mode) using its binding type.
#[derive(Debug, Clone)]
pub struct PropertyDef {
    name: String,
    source: Option<ValueSource>,
    binding: Option<crate::BindingType>,
}

impl PropertyDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: None,
            binding: None,
        }
    }

    pub fn value<V: Send + Sync + 'static>(mut self, value: V) -> Self {
        self.source = Some(ValueSource::literal(value));
        self
    }

    pub fn expression(mut self, expr: Expression) -> Self {
        self.source = Some(ValueSource::Expression(expr));
        self
    }

    pub fn child(mut self, def: Arc<ComponentDef>) -> Self {
        self.source = Some(ValueSource::Child(def));
        self
    }

    pub fn source(mut self, source: ValueSource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn binding(mut self, binding: crate::BindingType) -> Self {
        self.binding = Some(binding);
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn value_source(&self) -> Option<&ValueSource> {
        self.source.as_ref()
    }

    #[inline]
    pub fn binding_type(&self) -> Option<crate::BindingType> {
        self.binding
    }

    /// True if a value is configured.
    #[inline]
    pub fn is_value_gettable(&self) -> bool {
        self.source.is_some()
    }
}

/// Init or destroy method.
#[derive(Debug, Clone)]
pub enum MethodDef {
    /// Looked up by name on the concrete class at assembly time
    Named(String),
    /// A method given directly
    Method(MethodDesc),
}

impl MethodDef {
    pub fn name(&self) -> &str {
        match self {
            MethodDef::Named(name) => name,
            MethodDef::Method(method) => method.name(),
        }
    }
}

impl From<&str> for MethodDef {
    fn from(name: &str) -> Self {
        MethodDef::Named(name.to_owned())
    }
}

impl From<String> for MethodDef {
    fn from(name: String) -> Self {
        MethodDef::Named(name)
    }
}

impl From<MethodDesc> for MethodDef {
    fn from(method: MethodDesc) -> Self {
        MethodDef::Method(method)
    }
}

// =============================================================================
// Aspects and enhancement
// =============================================================================

/// Methods an aspect applies to.
#[derive(Clone)]
pub enum Pointcut {
    /// Exactly these method names
    Methods(Vec<String>),
    /// Every method accepted by the predicate
    Matching(PointcutFn),
}

impl Pointcut {
    pub fn methods<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Pointcut::Methods(names.into_iter().map(Into::into).collect())
    }

    pub fn matching<F>(predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Pointcut::Matching(Arc::new(predicate))
    }

    pub fn applies_to(&self, method: &str) -> bool {
        match self {
            Pointcut::Methods(names) => names.iter().any(|name| name == method),
            Pointcut::Matching(predicate) => predicate(method),
        }
    }
}

impl fmt::Debug for Pointcut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pointcut::Methods(names) => f.debug_tuple("Methods").field(names).finish(),
            Pointcut::Matching(_) => f.write_str("Matching(..)"),
        }
    }
}

/// An interceptor bound to a pointcut. Carried, never executed, by the container.
#[derive(Debug, Clone)]
pub struct AspectDef {
    interceptor: Value,
    pointcut: Pointcut,
}

impl AspectDef {
    pub fn new(interceptor: Value, pointcut: Pointcut) -> Self {
        Self {
            interceptor,
            pointcut,
        }
    }

    #[inline]
    pub fn interceptor(&self) -> &Value {
        &self.interceptor
    }

    #[inline]
    pub fn pointcut(&self) -> &Pointcut {
        &self.pointcut
    }
}

/// Behaviour introduced into the concrete class by an enhancer.
#[derive(Debug, Clone)]
pub struct InterTypeDef(Value);

impl InterTypeDef {
    pub fn new(inter_type: Value) -> Self {
        Self(inter_type)
    }

    #[inline]
    pub fn value(&self) -> &Value {
        &self.0
    }
}

/// Produces the concrete class of a definition carrying aspects or inter-types.
pub trait EnhancedFactory: Send + Sync {
    fn enhance(
        &self,
        class: &Arc<ClassDesc>,
        aspects: &[AspectDef],
        inter_types: &[InterTypeDef],
    ) -> std::result::Result<Arc<ClassDesc>, BoxError>;
}

// =============================================================================
// Component definition
// =============================================================================

/// Lifecycle state of a definition's instance manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeployState {
    Uninitialized,
    Instantiating,
    Ready,
    Destroyed,
}

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Declarative description of a component.
///
/// # Examples
///
/// ```rust
/// use component_container::{ClassDesc, ComponentDef, Container, InstanceScope};
/// use std::sync::Arc;
///
/// #[derive(Default)]
/// struct Clock;
///
/// let def = ComponentDef::builder()
///     .class(ClassDesc::builder::<Clock>().default_constructor(Clock::default).build())
///     .name("clock")
///     .scope(InstanceScope::Prototype)
///     .build()
///     .unwrap();
///
/// let container = Container::new();
/// container.register(Arc::clone(&def)).unwrap();
///
/// let a = container.get::<Clock>().unwrap();
/// let b = container.get_named::<Clock>("clock").unwrap();
/// assert!(!Arc::ptr_eq(&a, &b));
/// ```
pub struct ComponentDef {
    id: u64,
    this: Weak<ComponentDef>,
    name: Option<String>,
    component_type: OnceCell<TypeKey>,
    class: Option<Arc<ClassDesc>>,
    concrete: OnceCell<Arc<ClassDesc>>,
    scope: InstanceScope,
    auto_binding: AutoBindingKind,
    external_binding: bool,
    expression: Option<Expression>,
    args: Vec<ArgDef>,
    properties: Vec<PropertyDef>,
    init_methods: Vec<MethodDef>,
    destroy_methods: Vec<MethodDef>,
    aspects: Vec<AspectDef>,
    inter_types: Vec<InterTypeDef>,
    enhancer: Option<Arc<dyn EnhancedFactory>>,
    path: Option<String>,
    container: OnceCell<ContainerRef>,
    deployer: AnyDeployer,
}

impl ComponentDef {
    pub fn builder() -> ComponentDefBuilder {
        ComponentDefBuilder::default()
    }

    /// Process-unique id.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Declared component type; `None` until bound for expression and outer definitions.
    #[inline]
    pub fn component_type(&self) -> Option<TypeKey> {
        self.component_type.get().copied()
    }

    /// Class given by the definition source.
    #[inline]
    pub fn class(&self) -> Option<&Arc<ClassDesc>> {
        self.class.as_ref()
    }

    /// Class actually instantiated: the enhanced class when aspects or
    /// inter-types are present, otherwise the declared class.
    pub fn concrete_class(&self) -> Result<Option<Arc<ClassDesc>>> {
        let Some(class) = &self.class else {
            return Ok(None);
        };
        let enhancer = match &self.enhancer {
            Some(enhancer) if !(self.aspects.is_empty() && self.inter_types.is_empty()) => enhancer,
            _ => return Ok(Some(Arc::clone(class))),
        };
        self.concrete
            .get_or_try_init(|| {
                enhancer
                    .enhance(class, &self.aspects, &self.inter_types)
                    .map_err(|err| DiError::IllegalDefinition {
                        reason: format!("enhancing {} failed: {}", class.type_name(), err),
                    })
            })
            .map(|concrete| Some(Arc::clone(concrete)))
    }

    #[inline]
    pub fn scope(&self) -> InstanceScope {
        self.scope
    }

    #[inline]
    pub fn auto_binding(&self) -> AutoBindingKind {
        self.auto_binding
    }

    #[inline]
    pub fn is_external_binding(&self) -> bool {
        self.external_binding
    }

    #[inline]
    pub fn expression(&self) -> Option<&Expression> {
        self.expression.as_ref()
    }

    #[inline]
    pub fn args(&self) -> &[ArgDef] {
        &self.args
    }

    #[inline]
    pub fn properties(&self) -> &[PropertyDef] {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&PropertyDef> {
        self.properties.iter().find(|p| p.name == name)
    }

    #[inline]
    pub fn init_methods(&self) -> &[MethodDef] {
        &self.init_methods
    }

    #[inline]
    pub fn destroy_methods(&self) -> &[MethodDef] {
        &self.destroy_methods
    }

    #[inline]
    pub fn aspects(&self) -> &[AspectDef] {
        &self.aspects
    }

    #[inline]
    pub fn inter_types(&self) -> &[InterTypeDef] {
        &self.inter_types
    }

    /// Where the definition came from, falling back to the owning container's path.
    pub fn path(&self) -> Option<String> {
        self.path.clone().or_else(|| {
            self.container
                .get()
                .and_then(ContainerRef::upgrade)
                .and_then(|container| container.path())
        })
    }

    /// Owning container.
    pub fn container(&self) -> Result<Container> {
        let reference = self.container.get().ok_or_else(|| DiError::IllegalDefinition {
            reason: format!("{} is not registered with a container", self.describe()),
        })?;
        reference.upgrade().ok_or(DiError::ContainerDropped)
    }

    #[inline]
    pub fn is_registered(&self) -> bool {
        self.container.get().is_some()
    }

    pub fn state(&self) -> DeployState {
        self.deployer.state(self)
    }

    /// Produce an instance according to the definition's scope.
    pub fn deploy(&self) -> Result<Value> {
        self.deployer.deploy(self)
    }

    /// Eager initialization; deploys singletons.
    pub fn init(&self) -> Result<()> {
        self.deployer.init(self)
    }

    /// Run destroy methods of a cached instance and drop it.
    pub fn destroy(&self) -> Result<()> {
        self.deployer.destroy(self)
    }

    /// Inject into a caller-supplied instance of runtime type `actual`.
    pub fn inject_dependency(&self, target: &mut dyn Any, actual: TypeKey) -> Result<()> {
        self.deployer.inject(self, target, actual)
    }

    /// Name, else type, else id; used in messages.
    pub fn describe(&self) -> String {
        match (&self.name, self.component_type()) {
            (Some(name), Some(ty)) => format!("{} ({})", name, ty),
            (Some(name), None) => name.clone(),
            (None, Some(ty)) => ty.name().to_owned(),
            (None, None) => format!("#{}", self.id),
        }
    }

    pub(crate) fn self_arc(&self) -> Option<Arc<ComponentDef>> {
        self.this.upgrade()
    }

    /// Bind the component type once; returns false if it was already bound.
    pub(crate) fn bind_type(&self, ty: TypeKey) -> bool {
        self.component_type.set(ty).is_ok()
    }

    /// `Some(answer)` when assignability to `ty` is known without an instance.
    pub(crate) fn assignable_to(&self, ty: TypeKey) -> Option<bool> {
        if let Ok(Some(class)) = self.concrete_class() {
            return Some(class.is_assignable_to(ty) || self.component_type() == Some(ty));
        }
        self.component_type().map(|declared| declared == ty)
    }

    pub(crate) fn candidate(&self) -> Candidate {
        Candidate {
            name: self.name.clone(),
            type_name: self.component_type().map(|ty| ty.name()),
            path: self.path(),
        }
    }

    /// Nested definitions used as argument or property values.
    pub(crate) fn children(&self) -> impl Iterator<Item = &Arc<ComponentDef>> {
        self.args
            .iter()
            .filter_map(|arg| arg.source.child())
            .chain(
                self.properties
                    .iter()
                    .filter_map(|p| p.source.as_ref().and_then(ValueSource::child)),
            )
    }

    /// Set the owning container on this definition and its nested definitions.
    ///
    /// Nothing is attached unless the whole tree is still unregistered.
    pub(crate) fn attach(&self, container: &ContainerRef) -> Result<()> {
        self.ensure_detached()?;
        self.attach_tree(container);
        Ok(())
    }

    fn ensure_detached(&self) -> Result<()> {
        if self.container.get().is_some() {
            return Err(DiError::DefinitionAlreadyRegistered {
                component: self.describe(),
            });
        }
        self.children().try_for_each(|child| child.ensure_detached())
    }

    fn attach_tree(&self, container: &ContainerRef) {
        // A nested definition reused within one tree is already attached here.
        let _ = self.container.set(container.clone());
        for child in self.children() {
            child.attach_tree(container);
        }
    }

    /// Class name for error messages.
    pub(crate) fn class_name(&self) -> String {
        self.class
            .as_ref()
            .map(|class| class.type_name().to_owned())
            .or_else(|| self.component_type().map(|ty| ty.name().to_owned()))
            .unwrap_or_else(|| self.describe())
    }
}

impl fmt::Debug for ComponentDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDef")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("type", &self.component_type())
            .field("scope", &self.scope)
            .field("auto_binding", &self.auto_binding)
            .field("args", &self.args.len())
            .field("properties", &self.properties)
            .field("state", &self.state())
            .finish()
    }
}

/// Builder for [`ComponentDef`].
#[derive(Default)]
pub struct ComponentDefBuilder {
    name: Option<String>,
    component_type: Option<TypeKey>,
    class: Option<Arc<ClassDesc>>,
    scope: InstanceScope,
    auto_binding: AutoBindingKind,
    external_binding: bool,
    expression: Option<Expression>,
    args: Vec<ArgDef>,
    properties: Vec<PropertyDef>,
    init_methods: Vec<MethodDef>,
    destroy_methods: Vec<MethodDef>,
    aspects: Vec<AspectDef>,
    inter_types: Vec<InterTypeDef>,
    enhancer: Option<Arc<dyn EnhancedFactory>>,
    path: Option<String>,
}

impl ComponentDefBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Declare the component type; defaults to the class's own type.
    pub fn component_type<T: ?Sized + 'static>(mut self) -> Self {
        self.component_type = Some(TypeKey::of::<T>());
        self
    }

    pub fn type_key(mut self, ty: TypeKey) -> Self {
        self.component_type = Some(ty);
        self
    }

    pub fn class(mut self, class: Arc<ClassDesc>) -> Self {
        self.class = Some(class);
        self
    }

    pub fn scope(mut self, scope: InstanceScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn auto_binding(mut self, mode: AutoBindingKind) -> Self {
        self.auto_binding = mode;
        self
    }

    pub fn external_binding(mut self, enabled: bool) -> Self {
        self.external_binding = enabled;
        self
    }

    pub fn expression(mut self, expr: Expression) -> Self {
        self.expression = Some(expr);
        self
    }

    pub fn arg(mut self, arg: ArgDef) -> Self {
        self.args.push(arg);
        self
    }

    pub fn property(mut self, property: PropertyDef) -> Self {
        self.properties.push(property);
        self
    }

    pub fn init_method(mut self, method: impl Into<MethodDef>) -> Self {
        self.init_methods.push(method.into());
        self
    }

    pub fn destroy_method(mut self, method: impl Into<MethodDef>) -> Self {
        self.destroy_methods.push(method.into());
        self
    }

    pub fn aspect(mut self, aspect: AspectDef) -> Self {
        self.aspects.push(aspect);
        self
    }

    pub fn inter_type(mut self, inter_type: InterTypeDef) -> Self {
        self.inter_types.push(inter_type);
        self
    }

    pub fn enhancer(mut self, enhancer: impl EnhancedFactory + 'static) -> Self {
        self.enhancer = Some(Arc::new(enhancer));
        self
    }

    /// Defining source, reported when the definition is ambiguous.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Validate and build.
    ///
    /// A definition without a type needs an expression or the outer scope.
    pub fn build(self) -> Result<Arc<ComponentDef>> {
        let component_type = self
            .component_type
            .or_else(|| self.class.as_ref().map(|class| class.key()));

        if component_type.is_none()
            && self.expression.is_none()
            && self.scope != InstanceScope::Outer
        {
            return Err(DiError::IllegalDefinition {
                reason: format!(
                    "component {} has neither a type, an expression nor outer scope",
                    self.name.as_deref().unwrap_or("<anonymous>")
                ),
            });
        }
        if self.class.is_none() && self.expression.is_none() && !self.args.is_empty() {
            return Err(DiError::IllegalDefinition {
                reason: format!(
                    "component {} has constructor arguments but no class",
                    self.name.as_deref().unwrap_or("<anonymous>")
                ),
            });
        }

        let cell = OnceCell::new();
        if let Some(ty) = component_type {
            let _ = cell.set(ty);
        }

        Ok(Arc::new_cyclic(|this| ComponentDef {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            this: this.clone(),
            name: self.name,
            component_type: cell,
            class: self.class,
            concrete: OnceCell::new(),
            deployer: AnyDeployer::for_scope(self.scope),
            scope: self.scope,
            auto_binding: self.auto_binding,
            external_binding: self.external_binding,
            expression: self.expression,
            args: self.args,
            properties: self.properties,
            init_methods: self.init_methods,
            destroy_methods: self.destroy_methods,
            aspects: self.aspects,
            inter_types: self.inter_types,
            enhancer: self.enhancer,
            path: self.path,
            container: OnceCell::new(),
        }))
    }
}

impl fmt::Debug for ComponentDefBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDefBuilder")
            .field("name", &self.name)
            .field("type", &self.component_type)
            .field("scope", &self.scope)
            .finish()
    }
}
