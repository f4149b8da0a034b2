//! Class model
//!
//! A [`Class`] is the shared, per-type data block: virtual slots and static
//! data in a public block, plus one private block for every ancestor that
//! declares class private data. Classes come in four kinds:
//!
//! - the reference-counted **default** class, one per type, built on first use
//! - **floating** classes created explicitly as per-instance overrides
//! - **in-place floating** classes built over caller-owned [`ClassStorage`]
//! - **interface implementations** embedded in another class
//!
//! Hooks (`class_init`, `class_final`) are always called with no lock held, so
//! they may freely read and write slots or reference other classes.

mod cast;
mod lifecycle;


pub(crate) use lifecycle::teardown;

use crate::allocator::Block;
use crate::error::{context, fail, MetaError, Result};
use crate::interface::InterfaceRecord;
use crate::types::registry::descriptor;
use crate::types::Type;
use parking_lot::{Mutex, MutexGuard};
use smallvec::SmallVec;
use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

/// Lifecycle kind of a class
#[derive(Debug, Clone)]
pub(crate) enum Ownership {
    Default,
    Floating { owned: bool },
    FloatingInPlace { owned: bool },
    /// Embedded in the class behind `outer` at byte `offset`
    InterfaceImpl { outer: Weak<ClassInner>, offset: usize },
}

pub(crate) struct ClassState {
    pub(crate) alive: bool,
    pub(crate) ownership: Ownership,
    pub(crate) public: Block,
    /// One block per ancestor with class private data, root first
    pub(crate) privates: SmallVec<[(Type, Block); 4]>,
    /// Embedded interface classes, in ancestor then map order
    pub(crate) interfaces: Vec<InterfaceRecord>,
    /// Parent type's default class, held for this class's lifetime
    pub(crate) super_class: Option<Class>,
    /// Own type's default class, held by floating classes
    pub(crate) default_ref: Option<Class>,
}

pub(crate) struct ClassInner {
    pub(crate) ty: Type,
    pub(crate) state: Mutex<ClassState>,
}

/// Handle to a constructed class
///
/// Cloning the handle does not affect the class's reference count; equality is
/// identity of the underlying class.
#[derive(Clone)]
pub struct Class(pub(crate) Arc<ClassInner>);

/// Caller-owned storage for an in-place floating class
pub struct ClassStorage {
    pub(crate) block: Block,
}

impl ClassStorage {
    pub fn new(size: usize) -> Self {
        Self {
            block: Block::zeroed(size),
        }
    }

    pub fn size(&self) -> usize {
        self.block.size()
    }
}

impl fmt::Debug for ClassStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassStorage")
            .field("size", &self.block.size())
            .finish()
    }
}

impl Class {
    #[inline]
    pub(crate) fn state(&self) -> MutexGuard<'_, ClassState> {
        self.0.state.lock()
    }

    pub(crate) fn downgrade(&self) -> Weak<ClassInner> {
        Arc::downgrade(&self.0)
    }

    /// Type this class was constructed for
    #[inline]
    pub fn type_of(&self) -> Type {
        self.0.ty
    }

    /// False once the class has been destructed
    pub fn is_alive(&self) -> bool {
        self.state().alive
    }

    pub fn is_default(&self) -> bool {
        matches!(self.state().ownership, Ownership::Default)
    }

    pub fn is_floating(&self) -> bool {
        matches!(
            self.state().ownership,
            Ownership::Floating { .. } | Ownership::FloatingInPlace { .. }
        )
    }

    pub fn is_in_place(&self) -> bool {
        matches!(self.state().ownership, Ownership::FloatingInPlace { .. })
    }

    /// Floating class whose lifetime belongs to an instance
    pub fn is_owned(&self) -> bool {
        matches!(
            self.state().ownership,
            Ownership::Floating { owned: true } | Ownership::FloatingInPlace { owned: true }
        )
    }

    pub fn is_interface_impl(&self) -> bool {
        matches!(self.state().ownership, Ownership::InterfaceImpl { .. })
    }

    /// Reference count of a default class; 0 for every other kind
    pub fn ref_count(&self) -> usize {
        if !self.is_default() {
            return 0;
        }
        self.0.ty.class_ref_count()
    }

    /// The parent type's default class held by this one
    pub fn super_class(&self) -> Option<Class> {
        self.state().super_class.clone()
    }

    /// Live default class of this class's type, without referencing it
    pub fn default_class(&self) -> Option<Class> {
        Class::weak_ref_default(self.0.ty)
    }

    /// Live default class of `ty`, without referencing it
    pub fn weak_ref_default(ty: Type) -> Option<Class> {
        descriptor(ty)?.live_class()
    }

    /// `self` is usable as a class of `ty`
    pub fn check(&self, ty: Type) -> bool {
        self.0.ty.check(ty)
    }

    /// Bytes in the public block
    pub fn size(&self) -> usize {
        self.state().public.size()
    }

    /// Clone of the value stored at `offset` in the public block
    pub fn slot<T: Any + Clone>(&self, offset: usize) -> Option<T> {
        self.state().public.get::<T>(offset).cloned()
    }

    /// Store a value in the public block
    ///
    /// Header bytes and ranges occupied by embedded interfaces are rejected;
    /// write those through the interface class returned by [`Class::cast`].
    pub fn set_slot<T: Any + Send + Sync>(&self, offset: usize, value: T) -> Result<()> {
        let result = {
            let mut state = self.state();
            if !state.alive {
                Err(MetaError::invalid_operation(format!(
                    "write to destructed class of '{}'",
                    self.0.ty
                )))
            } else {
                state.public.set(offset, value)
            }
        };
        result.map_err(context::record)
    }

    /// Run `f` with exclusive access to the public block
    ///
    /// `f` must not call back into this class.
    pub fn with_public<R>(&self, f: impl FnOnce(&mut Block) -> R) -> R {
        f(&mut self.state().public)
    }

    /// Clone of a value in `level`'s private block
    pub fn private_slot<T: Any + Clone>(&self, level: Type, offset: usize) -> Option<T> {
        let state = self.state();
        state
            .privates
            .iter()
            .find(|(owner, _)| *owner == level)
            .and_then(|(_, block)| block.get::<T>(offset).cloned())
    }

    pub fn set_private_slot<T: Any + Send + Sync>(
        &self,
        level: Type,
        offset: usize,
        value: T,
    ) -> Result<()> {
        self.with_private(level, |block| block.set(offset, value))?
            .map_err(context::record)
    }

    /// Run `f` on `level`'s private block; InvalidArgument when `level`
    /// declares no class private data in this class's ancestry
    pub fn with_private<R>(&self, level: Type, f: impl FnOnce(&mut Block) -> R) -> Result<R> {
        let mut state = self.state();
        if let Some((_, block)) = state.privates.iter_mut().find(|(owner, _)| *owner == level) {
            return Ok(f(block));
        }
        drop(state);
        fail(MetaError::invalid_argument(format!(
            "'{level}' has no class private data in '{}'",
            self.0.ty
        )))
    }

    fn kind_name(&self) -> &'static str {
        match self.state().ownership {
            Ownership::Default => "default",
            Ownership::Floating { .. } => "floating",
            Ownership::FloatingInPlace { .. } => "in-place",
            Ownership::InterfaceImpl { .. } => "interface",
        }
    }
}

impl PartialEq for Class {
    fn eq(&self, other: &Class) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Class {}

impl Hash for Class {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.0).hash(state);
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (alive, slots, carved) = {
            let state = self.state();
            (state.alive, state.public.len(), state.public.carved().len())
        };
        f.debug_struct("Class")
            .field("type", &self.0.ty)
            .field("kind", &self.kind_name())
            .field("alive", &alive)
            .field("slots", &slots)
            .field("reserved_ranges", &carved)
            .finish()
    }
}
