//! Container configuration
//!
//! A [`ContainerConfig`] is fixed when the root container is created and is
//! shared by every container in the same graph.

use crate::{ExternalBinder, TypeKey};
use std::fmt;
use std::sync::Arc;

type BindablePredicate = Arc<dyn Fn(TypeKey) -> bool + Send + Sync>;

/// Settings consulted during property assembly.
///
/// # Examples
///
/// ```rust
/// use component_container::{Container, ContainerConfig};
///
/// let config = ContainerConfig::new()
///     .plain_property_prefix("app::model")
///     .bindable(|ty| !ty.name().starts_with("alloc::"));
///
/// assert!(config.is_plain_property_package("app::model::order"));
/// assert!(!config.is_plain_property_package("app::service"));
///
/// let container = Container::with_config(config);
/// assert!(container.config().is_plain_property_package("app::model"));
/// ```
#[derive(Clone)]
pub struct ContainerConfig {
    plain_property_prefixes: Vec<String>,
    bindable: BindablePredicate,
    external_binder: Option<Arc<dyn ExternalBinder>>,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            plain_property_prefixes: Vec::new(),
            bindable: Arc::new(|_| true),
            external_binder: None,
        }
    }
}

impl ContainerConfig {
    /// Configuration with no plain-property packages where every component
    /// type is bindable.
    pub fn new() -> Self {
        Self::default()
    }

    /// Auto-bind plain members of classes under `prefix`.
    ///
    /// May be called several times; a class matches if any prefix matches.
    pub fn plain_property_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.plain_property_prefixes.push(prefix.into());
        self
    }

    /// Treat every package as a plain-property package.
    pub fn all_plain_properties(self) -> Self {
        self.plain_property_prefix("")
    }

    /// Predicate deciding which slot types take part in by-type binding.
    pub fn bindable<F>(mut self, predicate: F) -> Self
    where
        F: Fn(TypeKey) -> bool + Send + Sync + 'static,
    {
        self.bindable = Arc::new(predicate);
        self
    }

    /// Collaborator used by definitions with external binding enabled.
    pub fn external_binder(mut self, binder: impl ExternalBinder + 'static) -> Self {
        self.external_binder = Some(Arc::new(binder));
        self
    }

    /// Whether members declared in `package` are bound by the plain-property pass.
    pub fn is_plain_property_package(&self, package: &str) -> bool {
        self.plain_property_prefixes
            .iter()
            .any(|prefix| package.starts_with(prefix.as_str()))
    }

    #[inline]
    pub fn is_bindable(&self, ty: TypeKey) -> bool {
        (self.bindable)(ty)
    }

    #[inline]
    pub fn binder(&self) -> Option<&Arc<dyn ExternalBinder>> {
        self.external_binder.as_ref()
    }
}

impl fmt::Debug for ContainerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerConfig")
            .field("plain_property_prefixes", &self.plain_property_prefixes)
            .field("external_binder", &self.external_binder.is_some())
            .finish()
    }
}
