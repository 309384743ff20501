//! Property and field assembly
//!
//! Three strategies, chosen by the definition's auto-binding mode:
//!
//! - **manual**: configured values only;
//! - **semi-auto**: configured properties and annotated members, auto-binding
//!   configured but unset ones with SHOULD unless the property states otherwise;
//! - **auto**: as semi-auto, then the external binder (if enabled), then every
//!   remaining member of a class under a plain-property package, with SHOULD.
//!
//! Fields and setters share the resolution algorithm; only the write differs.

use crate::binding::{self, Binding, PropertyPolicy};
use crate::class::{Payload, PropertyDesc};
use crate::container::Container;
use crate::{BindingType, ClassDesc, ComponentDef, DiError, Result, Value, ValueSource};
use ahash::RandomState;
use std::any::Any;
use std::collections::HashSet;

#[cfg(feature = "logging")]
use tracing::trace;

pub(crate) fn assemble(
    def: &ComponentDef,
    container: &Container,
    class: Option<&ClassDesc>,
    target: &mut dyn Any,
) -> Result<()> {
    let Some(class) = class else {
        return match def.properties().first() {
            Some(property) => Err(DiError::PropertyNotFound {
                class: def.class_name(),
                property: property.name().to_owned(),
            }),
            None => Ok(()),
        };
    };

    let policy = def.auto_binding().property_policy();
    let mut bound: HashSet<String, RandomState> = HashSet::default();

    for property in def.properties() {
        let member = class
            .property(property.name())
            .ok_or_else(|| DiError::PropertyNotFound {
                class: class.type_name().to_owned(),
                property: property.name().to_owned(),
            })?;
        bound.insert(member.name().to_owned());

        match property.value_source() {
            Some(source) => write_source(container, class, member, source, target)?,
            None if policy == PropertyPolicy::Manual => {
                #[cfg(feature = "logging")]
                trace!(
                    target: "component_container",
                    class = class.type_name(),
                    property = member.name(),
                    "No configured value and manual binding, skipping"
                );
            }
            None => {
                let declared = match policy {
                    PropertyPolicy::SemiAuto => None,
                    _ => member.binding_type(),
                };
                let binding_type = property.binding_type().or(declared).unwrap_or_default();
                bind(def, container, class, member, binding_type, target)?;
            }
        }
    }

    if policy == PropertyPolicy::Manual {
        return Ok(());
    }

    for member in class.properties() {
        let Some(binding_type) = member.binding_type() else {
            continue;
        };
        if bound.insert(member.name().to_owned()) {
            bind(def, container, class, preferred(class, member), binding_type, target)?;
        }
    }

    if policy == PropertyPolicy::SemiAuto {
        return Ok(());
    }

    if def.is_external_binding() {
        if let Some(binder) = container.config().binder() {
            for member in class.properties() {
                let member = preferred(class, member);
                if bound.contains(member.name()) {
                    continue;
                }
                if let Some(value) = binder.bind(def, member) {
                    bound.insert(member.name().to_owned());
                    write_value(container, class, member, &value, target)?;
                }
            }
        }
    }

    if container.config().is_plain_property_package(class.package()) {
        for member in class.properties() {
            if member.is_annotated() || !bound.insert(member.name().to_owned()) {
                continue;
            }
            bind(def, container, class, preferred(class, member), BindingType::Should, target)?;
        }
    }

    Ok(())
}

/// Property assembly for an instance the container cannot mutate, e.g. an
/// expression result that is shared elsewhere. Only valid when nothing is configured.
pub(crate) fn assemble_shared(def: &ComponentDef, class: Option<&ClassDesc>) -> Result<()> {
    match def.properties().first() {
        Some(property) => Err(DiError::illegal_property(
            class.map(|c| c.type_name().to_owned()).unwrap_or_else(|| def.class_name()),
            property.name(),
            "instance is shared and cannot be modified",
        )),
        None => {
            #[cfg(feature = "logging")]
            trace!(
                target: "component_container",
                component = %def.describe(),
                "Instance is shared, skipping property auto-binding"
            );
            Ok(())
        }
    }
}

/// Setter over field when both exist under one name.
fn preferred<'a>(class: &'a ClassDesc, member: &'a PropertyDesc) -> &'a PropertyDesc {
    class.property(member.name()).unwrap_or(member)
}

fn bind(
    def: &ComponentDef,
    container: &Container,
    class: &ClassDesc,
    member: &PropertyDesc,
    binding_type: BindingType,
    target: &mut dyn Any,
) -> Result<()> {
    if !binding_type.attempts_binding() {
        return Ok(());
    }
    match binding::auto_bind(def, container, member.name(), member.slot())? {
        Binding::Bound(payload) => write(class, member, payload, target),
        Binding::Unbound(cause) => binding_type.on_unresolved(container, class, member, cause),
    }
}

fn write_source(
    container: &Container,
    class: &ClassDesc,
    member: &PropertyDesc,
    source: &ValueSource,
    target: &mut dyn Any,
) -> Result<()> {
    let value = source.resolve(container)?;
    write_value(container, class, member, &value, target)
}

fn write_value(
    container: &Container,
    class: &ClassDesc,
    member: &PropertyDesc,
    value: &Value,
    target: &mut dyn Any,
) -> Result<()> {
    let classes = container.classes();
    let payload = member.slot().adapt(value, classes).ok_or_else(|| {
        DiError::illegal_property(
            class.type_name(),
            member.name(),
            format!(
                "{} cannot be assigned to {}",
                classes.describe(value),
                member.slot().type_key()
            ),
        )
    })?;
    write(class, member, payload, target)
}

fn write(class: &ClassDesc, member: &PropertyDesc, payload: Payload, target: &mut dyn Any) -> Result<()> {
    member
        .write(target, payload)
        .map_err(|reason| DiError::illegal_property(class.type_name(), member.name(), reason))
}
