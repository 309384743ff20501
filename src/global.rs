//! Process-wide container accessor
//!
//! For application boundaries only (framework glue, request filters) that
//! cannot receive a container handle through their constructor. Nothing in
//! this crate reads it.

use crate::Container;
use parking_lot::RwLock;

static CURRENT: RwLock<Option<Container>> = RwLock::new(None);

/// Install `container` as the current one, returning the previous.
pub fn install(container: Container) -> Option<Container> {
    #[cfg(feature = "logging")]
    tracing::debug!(
        target: "component_container",
        container = %container.id(),
        "Installing process-wide container"
    );
    CURRENT.write().replace(container)
}

/// The installed container, if any.
///
/// ```rust
/// use component_container::{global, Container};
///
/// let previous = global::install(Container::new());
/// assert!(global::current().is_some());
/// global::uninstall();
/// # if let Some(previous) = previous { global::install(previous); }
/// ```
pub fn current() -> Option<Container> {
    CURRENT.read().clone()
}

pub fn uninstall() -> Option<Container> {
    CURRENT.write().take()
}
