//! Error types for component resolution and assembly
//!
//! Every error is fatal for the call that produced it; the container never
//! retries a failed assembly.

use crate::{ComponentKey, TypeKey};
use std::fmt;
use thiserror::Error;

/// Error type accepted from user code (constructors, methods, expressions).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// One definition competing for an ambiguous key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Component name, if the definition has one
    pub name: Option<String>,
    /// Declared component type, if bound
    pub type_name: Option<&'static str>,
    /// Path of the container (or configuration source) that defined it
    pub path: Option<String>,
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[name={}, type={}, path={}]",
            self.name.as_deref().unwrap_or("-"),
            self.type_name.unwrap_or("-"),
            self.path.as_deref().unwrap_or("-")
        )
    }
}

/// Candidates listed in a [`DiError::TooManyRegistration`] message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidates(pub Vec<Candidate>);

impl fmt::Display for Candidates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, candidate) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", candidate)?;
        }
        Ok(())
    }
}

/// Errors that can occur while resolving, assembling or destroying components
#[derive(Error, Debug, Clone)]
pub enum DiError {
    /// No definition for the key anywhere in the container hierarchy
    #[error("Component not found: {key}")]
    ComponentNotFound { key: ComponentKey },

    /// The key resolves to two or more definitions
    #[error("Too many components registered for {key}: {candidates}")]
    TooManyRegistration {
        key: ComponentKey,
        candidates: Candidates,
    },

    /// A component transitively requires itself before it is fully assembled
    #[error("Cyclic reference detected while assembling: {type_name}")]
    CyclicReference { type_name: String },

    /// No constructor could be selected or invoked
    #[error("Illegal constructor for {class}: {reason}")]
    IllegalConstructor { class: String, reason: String },

    /// A property or field could not be written
    #[error("Illegal property {class}.{property}: {reason}")]
    IllegalProperty {
        class: String,
        property: String,
        reason: String,
    },

    /// A property definition names a member the class does not have
    #[error("Property not found: {class}.{property}")]
    PropertyNotFound { class: String, property: String },

    /// An init or destroy method failed
    #[error("Illegal method {class}.{method}(): {reason}")]
    IllegalMethod {
        class: String,
        method: String,
        reason: String,
    },

    /// A method definition names a method the class does not have
    #[error("Method not found: {class}.{method}()")]
    MethodNotFound { class: String, method: String },

    /// A runtime instance does not match the declared type
    #[error("Class mismatch: expected {expected}, found {actual}")]
    ClassMismatch {
        expected: &'static str,
        actual: String,
    },

    /// A definition violates a structural invariant
    #[error("Illegal component definition: {reason}")]
    IllegalDefinition { reason: String },

    /// An expression failed to evaluate
    #[error("Expression `{expression}` failed: {reason}")]
    IllegalExpression { expression: String, reason: String },

    /// The operation is not supported by the definition's scope
    #[error("Operation {operation} is not supported for {scope} components ({component})")]
    UnsupportedOperation {
        operation: &'static str,
        scope: &'static str,
        component: String,
    },

    /// The definition is already owned by a container
    #[error("Component definition already registered: {component}")]
    DefinitionAlreadyRegistered { component: String },

    /// Two containers from different container graphs were linked
    #[error("Containers belong to different container graphs")]
    ForeignContainer,

    /// The owning container was dropped while one of its definitions was in use
    #[error("Owning container has been dropped")]
    ContainerDropped,

    /// An externally-scoped component was requested without an external context
    #[error("No external context registered for {scope} component {component}")]
    ExternalContextMissing {
        scope: &'static str,
        component: String,
    },

    /// A policy name could not be parsed
    #[error("Unknown {kind}: {value}")]
    UnknownPolicy { kind: &'static str, value: String },
}

impl DiError {
    /// Create a ComponentNotFound error for a key
    #[inline]
    pub fn not_found(key: impl Into<ComponentKey>) -> Self {
        Self::ComponentNotFound { key: key.into() }
    }

    /// Create a CyclicReference error
    #[inline]
    pub fn cyclic(type_name: impl Into<String>) -> Self {
        Self::CyclicReference {
            type_name: type_name.into(),
        }
    }

    /// Create an IllegalConstructor error
    #[inline]
    pub fn illegal_constructor(class: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::IllegalConstructor {
            class: class.into(),
            reason: reason.to_string(),
        }
    }

    /// Create an IllegalProperty error
    #[inline]
    pub fn illegal_property(
        class: impl Into<String>,
        property: impl Into<String>,
        reason: impl fmt::Display,
    ) -> Self {
        Self::IllegalProperty {
            class: class.into(),
            property: property.into(),
            reason: reason.to_string(),
        }
    }

    /// Create an IllegalMethod error
    #[inline]
    pub fn illegal_method(
        class: impl Into<String>,
        method: impl Into<String>,
        reason: impl fmt::Display,
    ) -> Self {
        Self::IllegalMethod {
            class: class.into(),
            method: method.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a ClassMismatch error
    #[inline]
    pub fn class_mismatch(expected: TypeKey, actual: impl Into<String>) -> Self {
        Self::ClassMismatch {
            expected: expected.name(),
            actual: actual.into(),
        }
    }

    /// Create an UnsupportedOperation error
    #[inline]
    pub fn unsupported(
        operation: &'static str,
        scope: &'static str,
        component: impl Into<String>,
    ) -> Self {
        Self::UnsupportedOperation {
            operation,
            scope,
            component: component.into(),
        }
    }

    /// True for errors caused by a missing component.
    #[inline]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ComponentNotFound { .. })
    }
}

/// Result type alias for container operations
pub type Result<T> = std::result::Result<T, DiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_too_many_lists_every_candidate() {
        let err = DiError::TooManyRegistration {
            key: ComponentKey::from("fooLogic"),
            candidates: Candidates(vec![
                Candidate {
                    name: Some("fooLogic".into()),
                    type_name: Some("app::FooLogicImpl"),
                    path: Some("app.toml".into()),
                },
                Candidate {
                    name: Some("fooLogic".into()),
                    type_name: None,
                    path: None,
                },
            ]),
        };
        let message = err.to_string();
        assert!(message.contains("name \"fooLogic\""));
        assert!(message.contains("[name=fooLogic, type=app::FooLogicImpl, path=app.toml]"));
        assert!(message.contains("[name=fooLogic, type=-, path=-]"));
    }

    #[test]
    fn test_not_found_display() {
        let err = DiError::not_found("missing");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Component not found: name \"missing\"");
    }
}
