//! Type registry
//!
//! Maps names to opaque [`Type`] handles and records, per type, the ancestor
//! chain, capability flags, sizes, hooks and interface map. Registration and
//! unregistration are serialised; every query below is a lock-free read.

mod builtin;
mod flags;
mod info;
mod query;
pub(crate) mod registry;

#[cfg(test)]
mod tests;

pub use builtin::Builtin;
pub use flags::TypeFlags;
pub use info::{ClassData, ClassFinalFn, ClassInitFn, InstanceInitFn, InterfaceEntry, TypeInfo};
pub use registry::{all, count, find, register, unregister};

use crate::error::{context, MetaError};
use registry::{descriptor, TypeDescriptor};
use std::fmt;
use std::num::NonZeroU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

const WORD: usize = std::mem::size_of::<usize>();

/// Bytes every class block reserves for its type word
pub const CLASS_HEADER_SIZE: usize = WORD;
/// Bytes every interface class reserves (type word plus back-offset)
pub const INTERFACE_HEADER_SIZE: usize = 2 * WORD;
/// Bytes every instance block reserves for its class pointer
pub const INSTANCE_HEADER_SIZE: usize = WORD;

/// Opaque handle to a registered type
///
/// Handles are never reused within a process, so a stale handle simply stops
/// resolving once its type is unregistered.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Type(NonZeroU64);

impl Type {
    pub(crate) const fn builtin(raw: u64) -> Type {
        Type(NonZeroU64::MIN.saturating_add(raw - 1))
    }

    /// Raw handle value
    #[inline]
    pub const fn raw(self) -> u64 {
        self.0.get()
    }

    /// Rebuild a handle from [`Type::raw`]; the result may not be registered
    pub fn from_raw(raw: u64) -> Option<Type> {
        NonZeroU64::new(raw).map(Type)
    }

    fn lookup(self) -> Option<Arc<TypeDescriptor>> {
        let desc = descriptor(self);
        if desc.is_none() {
            context::record(MetaError::invalid_argument(format!(
                "unknown type handle {}",
                self.raw()
            )));
        }
        desc
    }

    /// Still registered
    pub fn is_valid(self) -> bool {
        descriptor(self).is_some()
    }

    pub fn name(self) -> Option<Arc<str>> {
        self.lookup().map(|d| d.name.clone())
    }

    pub fn parent(self) -> Option<Type> {
        self.lookup()?.parent
    }

    /// Number of ancestors above this type (0 for a root)
    pub fn depth(self) -> Option<usize> {
        self.lookup().map(|d| d.depth())
    }

    /// Ancestor at `level`, counted from the root: `ancestor(0)` is the root
    /// and `ancestor(depth)` is `self`
    pub fn ancestor(self, level: usize) -> Option<Type> {
        let desc = self.lookup()?;
        let found = desc.bases.get(level).copied();
        if found.is_none() {
            context::record(MetaError::OutOfRange(format!(
                "ancestor {level} of '{}' (depth {})",
                desc.name,
                desc.depth()
            )));
        }
        found
    }

    pub fn root(self) -> Option<Type> {
        self.lookup()?.bases.first().copied()
    }

    pub fn flags(self) -> TypeFlags {
        self.lookup().map_or(TypeFlags::NONE, |d| d.flags)
    }

    pub fn has_flags(self, flags: TypeFlags) -> bool {
        self.flags().contains(flags)
    }

    /// Copy of the registration info, with inherited sizes filled in
    pub fn info(self) -> Option<TypeInfo> {
        self.lookup().map(|d| d.info.clone())
    }

    pub fn class_size(self) -> usize {
        self.lookup().map_or(0, |d| d.info.class_size)
    }

    pub fn instance_size(self) -> usize {
        self.lookup().map_or(0, |d| d.info.instance_size)
    }

    /// Class private bytes summed over every ancestor
    pub fn class_private_size(self) -> usize {
        self.lookup().map_or(0, |d| d.class_private_total)
    }

    /// Instance private bytes summed over every ancestor
    pub fn instance_private_size(self) -> usize {
        self.lookup().map_or(0, |d| d.instance_private_total)
    }

    pub fn class_ref_count(self) -> usize {
        self.lookup()
            .map_or(0, |d| d.class_refs.load(Ordering::Acquire))
    }

    pub fn instance_ref_count(self) -> usize {
        self.lookup()
            .map_or(0, |d| d.instance_refs.load(Ordering::Acquire))
    }

    /// `base` is a strict ancestor of `self`
    pub fn derives(self, base: Type) -> bool {
        query::derives(self, base)
    }

    /// `self` can be used wherever `other` is expected
    pub fn check(self, other: Type) -> bool {
        query::check(self, other)
    }

    /// `iface` is reachable only through interface maps
    pub fn maps(self, iface: Type) -> bool {
        query::maps(self, iface)
    }

    pub fn implements(self, other: Type) -> bool {
        query::implements(self, other)
    }

    /// Nearest type both `self` and `other` are compatible with
    pub fn common(self, other: Type) -> Option<Type> {
        query::common(self, other)
    }

    /// `self` lists `dependency` among its (transitive) dependencies
    pub fn depends(self, dependency: Type) -> bool {
        query::depends(self, dependency)
    }

    /// `self` satisfies the requirements of the dependent type `dependent`
    pub fn conforms(self, dependent: Type) -> bool {
        query::conforms(self, dependent)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match descriptor(*self) {
            Some(desc) => f.write_str(&desc.name),
            None => write!(f, "<invalid type #{}>", self.raw()),
        }
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match descriptor(*self) {
            Some(desc) => write!(f, "Type({}: {})", self.raw(), desc.name),
            None => write!(f, "Type({}: <invalid>)", self.raw()),
        }
    }
}
