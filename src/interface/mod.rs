//! Interface mapping
//!
//! A class embeds one interface class per entry in its ancestors' interface
//! maps. Each embedded class keeps a weak link and the byte distance back to
//! the class that owns it; the owner keeps the records in a side table.


use crate::class::{Class, Ownership};
use crate::error::{context, MetaError};
use crate::types::Type;

/// One embedded interface class
#[derive(Clone)]
pub struct InterfaceRecord {
    /// Ancestor whose interface map declared the entry
    pub(crate) level: Type,
    pub(crate) interface: Type,
    pub(crate) offset: usize,
    pub(crate) class: Class,
    /// Interface default class referenced for as long as the embedding lives
    pub(crate) held: Class,
}

impl InterfaceRecord {
    pub fn level(&self) -> Type {
        self.level
    }

    pub fn interface(&self) -> Type {
        self.interface
    }

    /// Byte offset in the owner's public block
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn class(&self) -> &Class {
        &self.class
    }
}

impl std::fmt::Debug for InterfaceRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterfaceRecord")
            .field("level", &self.level)
            .field("interface", &self.interface)
            .field("offset", &self.offset)
            .finish()
    }
}

impl Class {
    /// Owner of an embedded interface class, if it is still alive
    pub(crate) fn outer_link(&self) -> Option<Class> {
        match &self.state().ownership {
            Ownership::InterfaceImpl { outer, .. } => outer.upgrade().map(Class),
            _ => None,
        }
    }

    /// Class this interface class is embedded in; `self` when not embedded
    pub fn outer_class(&self) -> Class {
        if self.is_interface_impl() {
            if let Some(outer) = self.outer_link() {
                return outer;
            }
            context::record(MetaError::invalid_handle(format!(
                "owner of embedded '{}' is gone",
                self.type_of()
            )));
        }
        self.clone()
    }

    /// Follow owners until reaching a class that is not embedded
    pub fn outer_most_class(&self) -> Class {
        let mut current = self.clone();
        while let Some(outer) = current.outer_link() {
            current = outer;
        }
        current
    }

    /// Signed byte distance from this embedded class back to its owner
    pub fn outer_offset(&self) -> Option<isize> {
        match self.state().ownership {
            Ownership::InterfaceImpl { offset, .. } => Some(-(offset as isize)),
            _ => None,
        }
    }

    /// Embedded interface classes, ancestors' first, in map order
    pub fn interfaces(&self) -> Vec<InterfaceRecord> {
        self.state().interfaces.clone()
    }

    /// Embedded class for interface `iface`, searching nested embeddings
    pub fn interface(&self, iface: Type) -> Option<Class> {
        let direct: Vec<Class> = {
            let state = self.state();
            if let Some(record) = state.interfaces.iter().find(|r| r.interface == iface) {
                return Some(record.class.clone());
            }
            state.interfaces.iter().map(|r| r.class.clone()).collect()
        };
        direct.iter().find_map(|nested| nested.interface(iface))
    }
}
