//! Instance scopes and external scope storage
//!
//! The scope of a definition decides how many instances exist and who owns
//! them. Session, application and request scoped instances live in an
//! [`ExternalContext`] rather than in the container itself.

use crate::{DiError, Value};
use ahash::RandomState;
use dashmap::DashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::trace;

/// Instance scope of a component definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum InstanceScope {
    /// One cached instance per definition
    #[default]
    Singleton,
    /// A new instance on every request
    Prototype,
    /// Never instantiated by the container; only injects into caller-supplied objects
    Outer,
    /// One instance per session, stored in the external context
    Session,
    /// One instance per application, stored in the external context
    Application,
    /// One instance per request, stored in the external context
    Request,
}

impl InstanceScope {
    /// Configuration name of the scope.
    pub fn name(&self) -> &'static str {
        match self {
            InstanceScope::Singleton => "singleton",
            InstanceScope::Prototype => "prototype",
            InstanceScope::Outer => "outer",
            InstanceScope::Session => "session",
            InstanceScope::Application => "application",
            InstanceScope::Request => "request",
        }
    }

    /// True for scopes whose instances live in an [`ExternalContext`].
    #[inline]
    pub fn is_external(&self) -> bool {
        matches!(
            self,
            InstanceScope::Session | InstanceScope::Application | InstanceScope::Request
        )
    }
}

impl fmt::Display for InstanceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for InstanceScope {
    type Err = DiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "singleton" => Ok(InstanceScope::Singleton),
            "prototype" => Ok(InstanceScope::Prototype),
            "outer" => Ok(InstanceScope::Outer),
            "session" => Ok(InstanceScope::Session),
            "application" => Ok(InstanceScope::Application),
            "request" => Ok(InstanceScope::Request),
            _ => Err(DiError::UnknownPolicy {
                kind: "instance scope",
                value: s.to_owned(),
            }),
        }
    }
}

// =============================================================================
// External context
// =============================================================================

/// Storage for externally scoped instances.
///
/// Implementations typically adapt a web framework's session or application
/// attributes. The container only reads and writes entries by component name.
pub trait ExternalContext: Send + Sync {
    /// Look up the instance stored for `name` in `scope`.
    fn get(&self, scope: InstanceScope, name: &str) -> Option<Value>;

    /// Store `value` under `name` in `scope`.
    fn put(&self, scope: InstanceScope, name: &str, value: Value);
}

impl<E: ExternalContext + ?Sized> ExternalContext for Arc<E> {
    fn get(&self, scope: InstanceScope, name: &str) -> Option<Value> {
        (**self).get(scope, name)
    }

    fn put(&self, scope: InstanceScope, name: &str, value: Value) {
        (**self).put(scope, name, value)
    }
}

/// In-memory [`ExternalContext`], one map per scope.
///
/// # Examples
///
/// ```rust
/// use component_container::{ExternalContext, InstanceScope, MapExternalContext};
/// use std::sync::Arc;
///
/// let context = MapExternalContext::new();
/// context.put(InstanceScope::Session, "cart", Arc::new(3_u32));
/// assert!(context.get(InstanceScope::Session, "cart").is_some());
///
/// // Ending the session drops its instances
/// context.clear(InstanceScope::Session);
/// assert!(context.get(InstanceScope::Session, "cart").is_none());
/// ```
#[derive(Default)]
pub struct MapExternalContext {
    entries: DashMap<(InstanceScope, String), Value, RandomState>,
}

impl MapExternalContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every instance stored for `scope`.
    pub fn clear(&self, scope: InstanceScope) {
        #[cfg(feature = "logging")]
        trace!(
            target: "component_container",
            scope = scope.name(),
            "Clearing external scope"
        );

        self.entries.retain(|(entry_scope, _), _| *entry_scope != scope);
    }

    /// Number of instances stored for `scope`.
    pub fn len(&self, scope: InstanceScope) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.key().0 == scope)
            .count()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ExternalContext for MapExternalContext {
    fn get(&self, scope: InstanceScope, name: &str) -> Option<Value> {
        self.entries
            .get(&(scope, name.to_owned()))
            .map(|entry| Arc::clone(entry.value()))
    }

    fn put(&self, scope: InstanceScope, name: &str, value: Value) {
        self.entries.insert((scope, name.to_owned()), value);
    }
}

impl fmt::Debug for MapExternalContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapExternalContext")
            .field("entries", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_names_round_trip() {
        for scope in [
            InstanceScope::Singleton,
            InstanceScope::Prototype,
            InstanceScope::Outer,
            InstanceScope::Session,
            InstanceScope::Application,
            InstanceScope::Request,
        ] {
            assert_eq!(scope.name().parse::<InstanceScope>().unwrap(), scope);
        }
        assert_eq!(" Prototype ".parse::<InstanceScope>().unwrap(), InstanceScope::Prototype);
    }

    #[test]
    fn test_unknown_scope() {
        let err = "thread".parse::<InstanceScope>().unwrap_err();
        assert!(matches!(err, DiError::UnknownPolicy { kind: "instance scope", .. }));
    }

    #[test]
    fn test_external_scopes() {
        assert!(InstanceScope::Session.is_external());
        assert!(InstanceScope::Request.is_external());
        assert!(!InstanceScope::Singleton.is_external());
        assert!(!InstanceScope::Outer.is_external());
    }

    #[test]
    fn test_map_context_keeps_scopes_apart() {
        let context = MapExternalContext::new();
        context.put(InstanceScope::Session, "user", Arc::new(1_u8));
        context.put(InstanceScope::Application, "user", Arc::new(2_u8));

        let session = context.get(InstanceScope::Session, "user").unwrap();
        assert_eq!(session.downcast_ref::<u8>(), Some(&1));
        assert_eq!(context.len(InstanceScope::Application), 1);

        context.clear(InstanceScope::Session);
        assert!(context.get(InstanceScope::Session, "user").is_none());
        assert!(context.get(InstanceScope::Application, "user").is_some());
    }
}
