//! Auto-binding
//!
//! When a property has no configured value, the container tries to find one
//! by name and type. What happens when nothing suitable is found depends on
//! the property's [`BindingType`].
//!
//! Resolution order for a member named `n` with slot type `T`:
//!
//! 1. exactly one component assignable to `T` whose name equals `n`
//!    (ignoring case) or ends with `_n`;
//! 2. the component registered under the name `n`, if it is assignable to `T`;
//! 3. for bindable component types, the [`ComponentDef`] itself when `T` is
//!    `ComponentDef`, otherwise the single component assignable to `T`;
//! 4. for `Many` slots, every component assignable to the element type.
//!
//! Outer-scoped definitions never take part, they have no instance to offer.

use crate::class::{Payload, PropertyDesc, Slot, SlotKind};
use crate::container::Container;
use crate::storage::Entry;
use crate::{ClassDesc, ComponentDef, ComponentKey, DiError, InstanceScope, Result, TypeKey, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::{trace, warn};

// =============================================================================
// Policies
// =============================================================================

/// What to do when a member cannot be auto-bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BindingType {
    /// Fail the assembly of the owning component
    Must,
    /// Warn if the member is a bindable component, then continue
    #[default]
    Should,
    /// Continue silently
    May,
    /// Never auto-bind; only configured values are applied
    None,
}

impl BindingType {
    pub fn name(&self) -> &'static str {
        match self {
            BindingType::Must => "must",
            BindingType::Should => "should",
            BindingType::May => "may",
            BindingType::None => "none",
        }
    }

    /// Whether auto-binding is attempted at all.
    #[inline]
    pub fn attempts_binding(&self) -> bool {
        !matches!(self, BindingType::None)
    }

    /// Apply the policy to a member that could not be bound.
    pub(crate) fn on_unresolved(
        &self,
        container: &Container,
        class: &ClassDesc,
        member: &PropertyDesc,
        cause: Option<DiError>,
    ) -> Result<()> {
        match self {
            BindingType::Must => Err(cause.unwrap_or_else(|| {
                DiError::illegal_property(
                    class.type_name(),
                    member.name(),
                    "required member could not be bound",
                )
            })),
            BindingType::Should => {
                let slot = member.slot();
                if slot.is_component() && container.config().is_bindable(slot.type_key()) {
                    #[cfg(feature = "logging")]
                    warn!(
                        target: "component_container",
                        class = class.type_name(),
                        property = member.name(),
                        slot_type = slot.type_key().name(),
                        cause = cause.as_ref().map(|e| e.to_string()),
                        "Property could not be auto-bound"
                    );
                }
                Ok(())
            }
            BindingType::May | BindingType::None => {
                #[cfg(feature = "logging")]
                trace!(
                    target: "component_container",
                    class = class.type_name(),
                    property = member.name(),
                    binding = self.name(),
                    "Property left unbound"
                );
                Ok(())
            }
        }
    }
}

impl fmt::Display for BindingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BindingType {
    type Err = DiError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "must" => Ok(BindingType::Must),
            "should" => Ok(BindingType::Should),
            "may" => Ok(BindingType::May),
            "none" => Ok(BindingType::None),
            _ => Err(DiError::UnknownPolicy {
                kind: "binding type",
                value: s.to_owned(),
            }),
        }
    }
}

/// Auto-binding mode of a definition.
///
/// | mode          | constructor        | properties |
/// |---------------|--------------------|------------|
/// | `Auto`        | auto if needed     | auto       |
/// | `Constructor` | auto if needed     | manual     |
/// | `Property`    | default            | auto       |
/// | `SemiAuto`    | default            | semi-auto  |
/// | `None`        | default            | manual     |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AutoBindingKind {
    #[default]
    Auto,
    Constructor,
    Property,
    SemiAuto,
    None,
}

impl AutoBindingKind {
    pub fn name(&self) -> &'static str {
        match self {
            AutoBindingKind::Auto => "auto",
            AutoBindingKind::Constructor => "constructor",
            AutoBindingKind::Property => "property",
            AutoBindingKind::SemiAuto => "semiauto",
            AutoBindingKind::None => "none",
        }
    }

    /// Whether constructor parameters may be auto-bound.
    #[inline]
    pub fn binds_constructor(&self) -> bool {
        matches!(self, AutoBindingKind::Auto | AutoBindingKind::Constructor)
    }

    pub(crate) fn property_policy(&self) -> PropertyPolicy {
        match self {
            AutoBindingKind::Auto | AutoBindingKind::Property => PropertyPolicy::Auto,
            AutoBindingKind::SemiAuto => PropertyPolicy::SemiAuto,
            AutoBindingKind::Constructor | AutoBindingKind::None => PropertyPolicy::Manual,
        }
    }
}

impl fmt::Display for AutoBindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AutoBindingKind {
    type Err = DiError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(AutoBindingKind::Auto),
            "constructor" => Ok(AutoBindingKind::Constructor),
            "property" => Ok(AutoBindingKind::Property),
            "semiauto" | "semi-auto" => Ok(AutoBindingKind::SemiAuto),
            "none" => Ok(AutoBindingKind::None),
            _ => Err(DiError::UnknownPolicy {
                kind: "auto binding mode",
                value: s.to_owned(),
            }),
        }
    }
}

/// Strategy of the property assembler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PropertyPolicy {
    /// Configured values only
    Manual,
    /// Configured properties and annotated members
    SemiAuto,
    /// Everything above, plus external binding and plain properties
    Auto,
}

/// Supplies values for members not covered by configuration or annotations.
///
/// Consulted only for definitions with external binding enabled, typically
/// to pull request parameters or session attributes into a component.
pub trait ExternalBinder: Send + Sync {
    fn bind(&self, def: &ComponentDef, member: &PropertyDesc) -> Option<Value>;
}

impl<F> ExternalBinder for F
where
    F: Fn(&ComponentDef, &PropertyDesc) -> Option<Value> + Send + Sync,
{
    fn bind(&self, def: &ComponentDef, member: &PropertyDesc) -> Option<Value> {
        self(def, member)
    }
}

// =============================================================================
// Resolution
// =============================================================================

/// Outcome of an auto-binding attempt.
pub(crate) enum Binding {
    Bound(Payload),
    /// Nothing suitable; carries the ambiguity error if that was the reason
    Unbound(Option<DiError>),
}

/// Find a value for the member `name` of `def` with the given slot.
///
/// Errors raised while deploying a chosen candidate always propagate.
pub(crate) fn auto_bind(
    def: &ComponentDef,
    container: &Container,
    name: &str,
    slot: &Slot,
) -> Result<Binding> {
    let ty = slot.type_key();

    if slot.kind() == SlotKind::Many {
        let candidates = bindable(container.find_all_definitions(&ComponentKey::Type(ty)));
        if candidates.is_empty() {
            return Ok(Binding::Unbound(None));
        }
        let values = candidates
            .iter()
            .map(|candidate| candidate.deploy())
            .collect::<Result<Vec<_>>>()?;

        #[cfg(feature = "logging")]
        trace!(
            target: "component_container",
            property = name,
            element_type = ty.name(),
            count = values.len(),
            "Bound every assignable component"
        );

        return Ok(Binding::Bound(slot.adapt_all(&values, container.classes())));
    }

    let by_type = bindable(container.candidates(&ComponentKey::Type(ty)));

    let mut named = by_type.iter().filter(|candidate| name_matches(candidate, name));
    if let (Some(only), None) = (named.next(), named.next()) {
        if let Some(payload) = deploy_into(only, slot, container)? {
            trace_bound(name, "qualified type");
            return Ok(Binding::Bound(payload));
        }
    }

    if let Some(Entry::One(candidate)) = container.lookup(&ComponentKey::name(name)) {
        if candidate.scope() != InstanceScope::Outer && candidate.assignable_to(ty) != Some(false) {
            if let Some(payload) = deploy_into(&candidate, slot, container)? {
                trace_bound(name, "name");
                return Ok(Binding::Bound(payload));
            }
        }
    }

    if slot.is_component() && container.config().is_bindable(ty) {
        if ty == TypeKey::of::<ComponentDef>() {
            if let Some(this) = def.self_arc() {
                trace_bound(name, "definition");
                return Ok(Binding::Bound(Box::new(this)));
            }
        }
        match by_type.as_slice() {
            [] => {}
            [only] => {
                if let Some(payload) = deploy_into(only, slot, container)? {
                    trace_bound(name, "type");
                    return Ok(Binding::Bound(payload));
                }
            }
            many => {
                return Ok(Binding::Unbound(Some(DiError::TooManyRegistration {
                    key: ComponentKey::Type(ty),
                    candidates: crate::container::candidates_of(many),
                })));
            }
        }
    }

    Ok(Binding::Unbound(None))
}

/// Definitions that can supply an instance; outer ones cannot.
pub(crate) fn bindable(mut defs: Vec<Arc<ComponentDef>>) -> Vec<Arc<ComponentDef>> {
    defs.retain(|def| def.scope() != InstanceScope::Outer);
    defs
}

/// `seaLogic` matches `seaLogic`, `SEALOGIC` and `ocean_seaLogic`.
fn name_matches(def: &ComponentDef, name: &str) -> bool {
    let Some(component) = def.name() else {
        return false;
    };
    let component = component.to_lowercase();
    let name = name.to_lowercase();
    component == name || component.ends_with(&format!("_{}", name))
}

fn deploy_into(
    candidate: &ComponentDef,
    slot: &Slot,
    container: &Container,
) -> Result<Option<Payload>> {
    let value = candidate.deploy()?;
    Ok(slot.adapt(&value, container.classes()))
}

#[inline]
fn trace_bound(_name: &str, _rule: &'static str) {
    #[cfg(feature = "logging")]
    trace!(
        target: "component_container",
        property = _name,
        rule = _rule,
        "Property auto-bound"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binding_type_parse() {
        assert_eq!("MUST".parse::<BindingType>().unwrap(), BindingType::Must);
        assert_eq!("may".parse::<BindingType>().unwrap(), BindingType::May);
        assert_eq!(BindingType::default(), BindingType::Should);
        assert!(!BindingType::None.attempts_binding());
        assert!("sometimes".parse::<BindingType>().is_err());
    }

    #[test]
    fn test_auto_binding_modes() {
        assert_eq!("semi-auto".parse::<AutoBindingKind>().unwrap(), AutoBindingKind::SemiAuto);
        assert_eq!(AutoBindingKind::SemiAuto.to_string(), "semiauto");

        assert!(AutoBindingKind::Auto.binds_constructor());
        assert!(AutoBindingKind::Constructor.binds_constructor());
        assert!(!AutoBindingKind::Property.binds_constructor());

        assert_eq!(AutoBindingKind::Auto.property_policy(), PropertyPolicy::Auto);
        assert_eq!(AutoBindingKind::Property.property_policy(), PropertyPolicy::Auto);
        assert_eq!(AutoBindingKind::SemiAuto.property_policy(), PropertyPolicy::SemiAuto);
        assert_eq!(AutoBindingKind::Constructor.property_policy(), PropertyPolicy::Manual);
        assert_eq!(AutoBindingKind::None.property_policy(), PropertyPolicy::Manual);
    }

    trait Sensor: Send + Sync {
        fn id(&self) -> u32;
    }

    #[derive(Default)]
    struct Thermometer {
        id: u32,
    }

    impl Sensor for Thermometer {
        fn id(&self) -> u32 {
            self.id
        }
    }

    #[derive(Default)]
    struct Station {
        sensors: Vec<Arc<dyn Sensor>>,
    }

    fn thermometer(id: u32, scope: InstanceScope) -> Arc<ComponentDef> {
        ComponentDef::builder()
            .class(
                ClassDesc::builder::<Thermometer>()
                    .implements::<dyn Sensor>(|t| t)
                    .default_constructor(move || Thermometer { id })
                    .build(),
            )
            .name(format!("thermometer{}", id))
            .scope(scope)
            .build()
            .unwrap()
    }

    fn station() -> Arc<ComponentDef> {
        ComponentDef::builder()
            .class(
                ClassDesc::builder::<Station>()
                    .default_constructor(Station::default)
                    .property_many::<dyn Sensor, _>("sensors", |s, all| s.sensors = all)
                    .annotate("sensors", BindingType::Must)
                    .build(),
            )
            .name("station")
            .build()
            .unwrap()
    }

    #[test]
    fn test_many_collects_local_then_parents() {
        let root = Container::new();
        root.register(thermometer(3, InstanceScope::Singleton)).unwrap();
        let site = root.create_child("site");
        site.register(thermometer(1, InstanceScope::Singleton)).unwrap();
        site.register(thermometer(9, InstanceScope::Outer)).unwrap();
        site.register(thermometer(2, InstanceScope::Prototype)).unwrap();
        site.register(station()).unwrap();

        let station = site.get::<Station>().unwrap();
        let ids: Vec<_> = station.sensors.iter().map(|s| s.id()).collect();
        assert_eq!(ids, [1, 2, 3]);

        let shared = root.get::<dyn Sensor>().unwrap();
        assert!(station.sensors.iter().any(|s| Arc::ptr_eq(s, &shared)));
    }

    #[test]
    fn test_many_without_candidates_is_unbound() {
        let container = Container::new();
        container.register(thermometer(9, InstanceScope::Outer)).unwrap();
        container.register(station()).unwrap();

        assert!(matches!(
            container.get::<Station>(),
            Err(DiError::IllegalProperty { property, .. }) if property == "sensors"
        ));
    }

    #[test]
    fn test_name_matching() {
        let named = |name: &str| {
            ComponentDef::builder()
                .component_type::<String>()
                .name(name)
                .build()
                .unwrap()
        };
        assert!(name_matches(&named("seaLogic"), "sealogic"));
        assert!(name_matches(&named("ocean_seaLogic"), "seaLogic"));
        assert!(!name_matches(&named("landSeaLogic"), "seaLogic"));
        assert!(!name_matches(
            &ComponentDef::builder().component_type::<String>().build().unwrap(),
            "seaLogic"
        ));
    }
}
