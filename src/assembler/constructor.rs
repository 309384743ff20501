//! Constructor assembly
//!
//! Selection order: expression, explicit arguments, zero-argument
//! constructor, then (in `Auto` and `Constructor` modes) the widest
//! constructor whose parameters can all be auto-bound.

use crate::binding::bindable;
use crate::class::{ConstructorDesc, Payload, SlotKind, runtime_type};
use crate::container::Container;
use crate::{ClassDesc, ComponentDef, ComponentKey, DiError, Expression, Result, TypeKey, Value};

#[cfg(feature = "logging")]
use tracing::{debug, trace};

pub(crate) fn assemble(def: &ComponentDef, container: &Container) -> Result<Value> {
    if let Some(expr) = def.expression() {
        return from_expression(def, container, expr);
    }

    let class = def
        .concrete_class()?
        .ok_or_else(|| DiError::illegal_constructor(def.class_name(), "no class descriptor"))?;

    if !def.args().is_empty() {
        return with_args(def, container, &class);
    }
    if let Some(ctor) = class.default_constructor() {
        return invoke(&class, ctor, Vec::new());
    }
    if def.auto_binding().binds_constructor() {
        return auto(container, &class);
    }
    Err(DiError::illegal_constructor(
        class.type_name(),
        "no zero-argument constructor and constructor auto-binding is disabled",
    ))
}

fn from_expression(def: &ComponentDef, container: &Container, expr: &Expression) -> Result<Value> {
    let value = expr.evaluate(container)?;
    let classes = container.classes();

    match def.component_type() {
        Some(ty) => {
            if !classes.is_assignable(&value, ty) {
                return Err(DiError::class_mismatch(ty, classes.describe(&value)));
            }
        }
        None => {
            let ty = TypeKey::from_parts(runtime_type(&value), classes.describe(&value));
            if def.bind_type(ty) {
                #[cfg(feature = "logging")]
                debug!(
                    target: "component_container",
                    component = %def.describe(),
                    bound_type = ty.name(),
                    "Bound component type from expression result"
                );
                container.index_bound_type(def, ty);
            }
        }
    }
    Ok(value)
}

fn with_args(def: &ComponentDef, container: &Container, class: &ClassDesc) -> Result<Value> {
    let mut values = Vec::with_capacity(def.args().len());
    for (index, arg) in def.args().iter().enumerate() {
        let value = arg.source().resolve(container).map_err(|err| {
            if err.is_not_found() {
                DiError::illegal_constructor(class.type_name(), format!("argument #{}: {}", index, err))
            } else {
                err
            }
        })?;
        values.push(value);
    }

    let classes = container.classes();
    let mut matching = class
        .constructors()
        .iter()
        .filter(|ctor| ctor.arity() == values.len())
        .filter_map(|ctor| {
            ctor.params()
                .iter()
                .zip(&values)
                .map(|(slot, value)| slot.adapt(value, classes))
                .collect::<Option<Vec<Payload>>>()
                .map(|payloads| (ctor, payloads))
        });

    let (ctor, payloads) = matching.next().ok_or_else(|| {
        DiError::illegal_constructor(
            class.type_name(),
            format!("no constructor accepts the {} configured argument(s)", values.len()),
        )
    })?;
    if matching.next().is_some() {
        return Err(DiError::illegal_constructor(
            class.type_name(),
            format!("{} configured argument(s) match several constructors", values.len()),
        ));
    }
    invoke(class, ctor, payloads)
}

fn auto(container: &Container, class: &ClassDesc) -> Result<Value> {
    let mut ctors: Vec<&ConstructorDesc> = class.constructors().iter().collect();
    ctors.sort_by_key(|ctor| std::cmp::Reverse(ctor.arity()));

    let chosen = ctors.into_iter().find(|ctor| {
        ctor.params().iter().all(|slot| match slot.kind() {
            SlotKind::Component => {
                bindable(container.candidates(&ComponentKey::Type(slot.type_key()))).len() == 1
            }
            SlotKind::Many => true,
            SlotKind::Value => false,
        })
    });
    let Some(ctor) = chosen else {
        return Err(DiError::illegal_constructor(
            class.type_name(),
            "no constructor whose parameters can all be auto-bound",
        ));
    };

    #[cfg(feature = "logging")]
    trace!(
        target: "component_container",
        class = class.type_name(),
        arity = ctor.arity(),
        "Auto-binding constructor"
    );

    let classes = container.classes();
    let mut payloads = Vec::with_capacity(ctor.arity());
    for slot in ctor.params() {
        let key = ComponentKey::Type(slot.type_key());
        let payload = match slot.kind() {
            SlotKind::Many => {
                let values = bindable(container.find_all_definitions(&key))
                    .iter()
                    .map(|candidate| candidate.deploy())
                    .collect::<Result<Vec<_>>>()?;
                slot.adapt_all(&values, classes)
            }
            _ => {
                let candidate = bindable(container.candidates(&key))
                    .pop()
                    .ok_or_else(|| DiError::not_found(key))?;
                let value = candidate.deploy()?;
                slot.adapt(&value, classes).ok_or_else(|| {
                    DiError::illegal_constructor(
                        class.type_name(),
                        format!("{} is not a {}", classes.describe(&value), slot.type_key()),
                    )
                })?
            }
        };
        payloads.push(payload);
    }
    invoke(class, ctor, payloads)
}

fn invoke(class: &ClassDesc, ctor: &ConstructorDesc, payloads: Vec<Payload>) -> Result<Value> {
    ctor.invoke(payloads).map_err(|err| match err.downcast::<DiError>() {
        Ok(err) => *err,
        Err(other) => DiError::illegal_constructor(class.type_name(), other),
    })
}
