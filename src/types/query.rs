//! Read-only walks over ancestor chains and interface maps
//!
//! None of these take the registry lock; descriptors are immutable once their
//! handle is observable.

use super::registry::descriptor;
use super::{Type, TypeFlags};

/// Core relationship walk from `derived` up to its root
///
/// Returns `class_checks` when `base` appears in the ancestor chain. With
/// `iface_checks`, also succeeds when `base` is reachable through the interface
/// maps of any ancestor level.
pub(crate) fn is_a(derived: Type, base: Type, class_checks: bool, iface_checks: bool) -> bool {
    let (Some(d), Some(b)) = (descriptor(derived), descriptor(base)) else {
        return false;
    };

    let iface_checks = iface_checks
        && b.has(TypeFlags::INTERFACED)
        && !b.has(TypeFlags::UNMAPPABLE);

    for level in d.bases.iter().rev() {
        if *level == base {
            return class_checks;
        }
        if !iface_checks {
            continue;
        }
        let Some(level_desc) = descriptor(*level) else {
            continue;
        };
        if level_desc
            .info
            .interfaces
            .iter()
            .any(|entry| is_a(entry.interface, base, true, true))
        {
            return true;
        }
    }
    false
}

pub(crate) fn check(ty: Type, other: Type) -> bool {
    is_a(ty, other, true, true)
}

pub(crate) fn derives(derived: Type, base: Type) -> bool {
    derived != base && is_a(derived, base, true, false)
}

pub(crate) fn maps(ty: Type, iface: Type) -> bool {
    is_a(ty, iface, false, true)
}

pub(crate) fn implements(ty: Type, other: Type) -> bool {
    ty == other || derives(ty, other) || maps(ty, other)
}

/// Nearest type both `ty` and `other` are compatible with
pub(crate) fn common(ty: Type, other: Type) -> Option<Type> {
    let o = descriptor(other)?;
    let interfaced = o.has(TypeFlags::INTERFACED);

    for level in o.bases.iter().rev() {
        let level_desc = descriptor(*level)?;
        if implements(ty, *level) {
            // Every interface shares the unmappable root; that is not a relation
            if interfaced && level_desc.has(TypeFlags::UNMAPPABLE) {
                return None;
            }
            return Some(*level);
        }
        if !level_desc.has(TypeFlags::UNMAPPABLE) {
            for entry in &level_desc.info.interfaces {
                if let Some(found) = common(ty, entry.interface) {
                    return Some(found);
                }
            }
        }
    }
    None
}

/// `dependent` (or an ancestor) lists `dependency`, directly or transitively
pub(crate) fn depends(dependent: Type, dependency: Type) -> bool {
    let Some(d) = descriptor(dependent) else {
        return false;
    };
    if !d.has(TypeFlags::DEPENDENT) {
        return false;
    }
    d.bases.iter().rev().any(|level| {
        descriptor(*level).map_or(false, |level_desc| {
            level_desc
                .info
                .dependencies
                .iter()
                .any(|dep| *dep == dependency || depends(*dep, dependency))
        })
    })
}

/// `ty` satisfies `dependent`'s class requirement and all of its dependencies
pub(crate) fn conforms(ty: Type, dependent: Type) -> bool {
    let Some(d) = descriptor(dependent) else {
        return false;
    };

    let class_conforms = !d.has(TypeFlags::CLASSED) || check(ty, dependent);
    if !class_conforms || !d.has(TypeFlags::DEPENDENT) {
        return class_conforms;
    }

    d.bases.iter().rev().all(|level| {
        descriptor(*level).map_or(false, |level_desc| {
            level_desc
                .info
                .dependencies
                .iter()
                .all(|dep| check(ty, *dep) || conforms(ty, *dep))
        })
    })
}
