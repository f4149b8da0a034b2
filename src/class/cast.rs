use super::Class;
use crate::error::{fail, MetaError, Result};
use crate::types::registry::descriptor;
use crate::types::{Type, TypeFlags};

impl Class {
    /// View of this class as `to`: itself for an ancestor type, the embedded
    /// class for an interface, the owner for an embedding type
    pub fn try_cast(&self, to: Type) -> Option<Class> {
        cast_from(self, to, false)
    }

    /// Like [`Class::try_cast`] but a failed cast is a `TypeMismatch`
    pub fn cast(&self, to: Type) -> Result<Class> {
        match self.try_cast(to) {
            Some(class) => Ok(class),
            None => fail(MetaError::mismatch(self.type_of().to_string(), to.to_string())),
        }
    }
}

fn cast_from(class: &Class, to: Type, recursing: bool) -> Option<Class> {
    if class.type_of() == to {
        return Some(class.clone());
    }

    let mut current = class.clone();
    if !recursing {
        while let Some(outer) = current.outer_link() {
            current = outer;
        }
        if current.type_of() == to {
            return Some(current);
        }
    }

    let desc = descriptor(current.type_of())?;
    let target = descriptor(to)?;
    let search_interfaces =
        target.has(TypeFlags::INTERFACED) && !target.has(TypeFlags::UNMAPPABLE);

    for level in desc.bases.iter().rev() {
        if *level == to {
            return Some(current);
        }
        if !search_interfaces {
            continue;
        }
        let embedded: Vec<Class> = current
            .state()
            .interfaces
            .iter()
            .filter(|record| record.level == *level)
            .map(|record| record.class.clone())
            .collect();
        for iface in &embedded {
            if let Some(found) = cast_from(iface, to, true) {
                return Some(found);
            }
        }
    }
    None
}
