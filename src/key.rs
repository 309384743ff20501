//! Lookup keys
//!
//! Components are found either by type or by name. Types are identified by
//! [`TypeKey`], which works for trait objects as well as concrete types.

use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Runtime identity of a Rust type.
///
/// Equality and hashing only consider the `TypeId`; the name is kept for
/// diagnostics.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    handle: Option<TypeId>,
    name: &'static str,
}

impl TypeKey {
    /// Key of `T`. Unsized types such as `dyn Trait` are allowed.
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            handle: Some(TypeId::of::<std::sync::Arc<T>>()),
            name: std::any::type_name::<T>(),
        }
    }

    /// Key for a type only known by id, e.g. the runtime type of an expression result.
    #[inline]
    pub fn from_parts(id: TypeId, name: &'static str) -> Self {
        Self {
            id,
            handle: None,
            name,
        }
    }

    #[inline]
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Id of `Arc<T>`, the type of a value that carries a `T` as a handle.
    #[inline]
    pub(crate) fn handle_id(&self) -> Option<TypeId> {
        self.handle
    }

    /// Full type name as reported by `std::any::type_name`.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Type name without module path or generic arguments.
    pub fn simple_name(&self) -> &'static str {
        let base = self.name.split('<').next().unwrap_or(self.name);
        base.rsplit("::").next().unwrap_or(base)
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// A component lookup key: a type or a name.
///
/// Names may be namespace-qualified (`"ns.name"`); the container resolves
/// the namespace part against its own namespace and its children.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ComponentKey {
    /// Every definition assignable to the type.
    Type(TypeKey),
    /// The definition registered under this component name.
    Name(String),
}

impl ComponentKey {
    /// Type key for `T`.
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        ComponentKey::Type(TypeKey::of::<T>())
    }

    /// Name key.
    #[inline]
    pub fn name(name: impl Into<String>) -> Self {
        ComponentKey::Name(name.into())
    }

    /// Split a namespace-qualified name into `(namespace, rest)`.
    pub(crate) fn split_namespace(&self) -> Option<(&str, &str)> {
        match self {
            ComponentKey::Name(name) => name
                .split_once('.')
                .filter(|(ns, rest)| !ns.is_empty() && !rest.is_empty()),
            ComponentKey::Type(_) => None,
        }
    }
}

impl From<TypeKey> for ComponentKey {
    fn from(key: TypeKey) -> Self {
        ComponentKey::Type(key)
    }
}

impl From<&str> for ComponentKey {
    fn from(name: &str) -> Self {
        ComponentKey::Name(name.to_owned())
    }
}

impl From<String> for ComponentKey {
    fn from(name: String) -> Self {
        ComponentKey::Name(name)
    }
}

impl fmt::Display for ComponentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentKey::Type(key) => write!(f, "type {}", key),
            ComponentKey::Name(name) => write!(f, "name \"{}\"", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Greeter {}
    struct Plain;

    #[test]
    fn test_type_key_equality_ignores_name() {
        let a = TypeKey::of::<Plain>();
        let b = TypeKey::from_parts(TypeId::of::<Plain>(), "renamed");
        assert_eq!(a, b);
        assert_ne!(a, TypeKey::of::<dyn Greeter>());
    }

    #[test]
    fn test_simple_name() {
        assert_eq!(TypeKey::of::<Plain>().simple_name(), "Plain");
        assert_eq!(TypeKey::of::<Vec<Plain>>().simple_name(), "Vec");
    }

    #[test]
    fn test_split_namespace() {
        let key = ComponentKey::from("dao.userDao");
        assert_eq!(key.split_namespace(), Some(("dao", "userDao")));
        assert_eq!(ComponentKey::from("userDao").split_namespace(), None);
        assert_eq!(ComponentKey::from(".x").split_namespace(), None);
        assert_eq!(ComponentKey::of::<Plain>().split_namespace(), None);
    }
}
