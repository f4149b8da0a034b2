//! Construction and destruction of classes

use super::{Class, ClassInner, ClassState, ClassStorage, Ownership};
use crate::allocator::{self, Block};
use crate::error::{context, fail, MetaError, Result, ResultExt};
use crate::interface::InterfaceRecord;
use crate::logging::{log_class_constructed, log_class_destructed, log_class_refcount, perf};
use crate::types::registry::{descriptor, require, TypeDescriptor};
use crate::types::{Type, TypeFlags, CLASS_HEADER_SIZE, INTERFACE_HEADER_SIZE};
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::sync::atomic::Ordering;
use std::sync::Arc;

fn header_size(desc: &TypeDescriptor) -> usize {
    if desc.has(TypeFlags::INTERFACED) {
        INTERFACE_HEADER_SIZE
    } else {
        CLASS_HEADER_SIZE
    }
}

fn no_class(desc: &TypeDescriptor) -> MetaError {
    MetaError::Unimplemented(format!("'{}' has a zero-sized class", desc.name))
}

/// Reserve storage for an unconstructed class of `desc`
///
/// `storage` replaces the public block reservation for in-place classes.
fn allocate(desc: &TypeDescriptor, ownership: Ownership, storage: Option<Block>) -> Result<Class> {
    let label = &*desc.name;
    let in_place = storage.is_some();
    let mut public = match storage {
        Some(mut block) => {
            block.reset();
            block
        }
        None => allocator::reserve(desc.info.class_size, label)?,
    };
    public.carve(0..header_size(desc));

    let mut privates: SmallVec<[(Type, Block); 4]> = SmallVec::new();
    for level in &desc.bases {
        let Some(level_desc) = descriptor(*level) else {
            continue;
        };

        for entry in &level_desc.info.interfaces {
            let width = descriptor(entry.interface).map_or(0, |d| d.info.class_size);
            public.carve(entry.class_offset..entry.class_offset + width);
        }

        let size = level_desc.info.class_private_size;
        if size == 0 {
            continue;
        }
        match allocator::reserve(size, label) {
            Ok(block) => privates.push((*level, block)),
            Err(err) => {
                for (_, block) in privates {
                    allocator::release(block, label);
                }
                if !in_place {
                    allocator::release(public, label);
                }
                return Err(err);
            }
        }
    }

    Ok(Class(Arc::new(ClassInner {
        ty: desc.ty,
        state: Mutex::new(ClassState {
            alive: true,
            ownership,
            public,
            privates,
            interfaces: Vec::new(),
            super_class: None,
            default_ref: None,
        }),
    })))
}

/// Reference the parent default, then per level root to derived build the
/// embedded interfaces and run the class initializer
fn construct(class: &Class, desc: &TypeDescriptor) -> Result<()> {
    if let Some(parent) = desc.parent {
        if descriptor(parent).map_or(false, |p| p.info.class_size > 0) {
            let super_class = Class::reference_default(parent)?;
            class.state().super_class = Some(super_class);
        }
    }

    for level in desc.bases.iter().copied() {
        let level_desc = require(level)?;

        for entry in &level_desc.info.interfaces {
            let iface_desc = require(entry.interface)?;
            let held = Class::reference_default(entry.interface)?;
            let ownership = Ownership::InterfaceImpl {
                outer: class.downgrade(),
                offset: entry.class_offset,
            };
            let iface_class = match allocate(&iface_desc, ownership, None) {
                Ok(iface_class) => iface_class,
                Err(err) => {
                    let _ = held.unreference_default();
                    return Err(err);
                }
            };
            class.state().interfaces.push(InterfaceRecord {
                level,
                interface: entry.interface,
                offset: entry.class_offset,
                class: iface_class.clone(),
                held,
            });
            construct(&iface_class, &iface_desc)?;
        }

        if let Some(init) = level_desc.info.class_init {
            init(class, level_desc.info.class_data.as_deref())?;
        }
    }

    log_class_constructed(&desc.name, class.kind_name());
    Ok(())
}

/// Derived to root: finalizer, then embedded interfaces; then drop the held
/// default references. Every step runs; the first error is returned.
fn destruct(class: &Class, run_finals: bool) -> Result<()> {
    let desc = require(class.type_of())?;
    let mut first: Option<MetaError> = None;
    let mut keep = |result: Result<()>| {
        if let Err(err) = result {
            first.get_or_insert(err);
        }
    };

    for level in desc.bases.iter().rev() {
        let Some(level_desc) = descriptor(*level) else {
            continue;
        };

        if run_finals {
            if let Some(fini) = level_desc.info.class_final {
                keep(fini(class, level_desc.info.class_data.as_deref()));
            }
        }

        let records: Vec<InterfaceRecord> = {
            let mut state = class.state();
            let (mine, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut state.interfaces)
                .into_iter()
                .partition(|record| record.level == *level);
            state.interfaces = rest;
            mine
        };
        for record in records.into_iter().rev() {
            keep(destruct(&record.class, run_finals));
            release_blocks(&record.class);
            keep(record.held.unreference_default().map(drop));
        }
    }

    let (super_class, default_ref) = {
        let mut state = class.state();
        state.alive = false;
        (state.super_class.take(), state.default_ref.take())
    };
    if let Some(super_class) = super_class {
        keep(super_class.unreference_default().map(drop));
    }
    if let Some(default_ref) = default_ref {
        keep(default_ref.unreference_default().map(drop));
    }

    log_class_destructed(&desc.name, class.kind_name());
    first.map_or(Ok(()), Err)
}

fn take_blocks(class: &Class) -> (Block, SmallVec<[(Type, Block); 4]>) {
    let mut state = class.state();
    (
        std::mem::replace(&mut state.public, Block::zeroed(0)),
        std::mem::take(&mut state.privates),
    )
}

fn release_blocks(class: &Class) {
    let label = class.type_of().to_string();
    let (public, privates) = take_blocks(class);
    allocator::release(public, &label);
    for (_, block) in privates {
        allocator::release(block, &label);
    }
}

/// Destruct a heap class and hand its storage back to the allocator
pub(crate) fn teardown(class: &Class) -> Result<()> {
    let result = destruct(class, true);
    release_blocks(class);
    result
}

/// Undo a construction that failed part way
fn abandon(class: &Class) {
    let _ = destruct(class, false);
    if !class.is_in_place() {
        release_blocks(class);
    }
}

impl Class {
    /// Reference the default class of `ty`, constructing it on first use
    pub fn reference_default(ty: Type) -> Result<Class> {
        let desc = require(ty).recorded()?;
        if desc.info.class_size == 0 {
            return fail(no_class(&desc));
        }

        let class = {
            let mut slot = desc.default_class.write();
            if let Some(existing) = slot.as_ref() {
                let existing = existing.clone();
                drop(slot);
                let count = desc.class_refs.fetch_add(1, Ordering::AcqRel) + 1;
                log_class_refcount(&desc.name, count);
                return Ok(existing);
            }
            let class = allocate(&desc, Ownership::Default, None).recorded()?;
            // Published before the init chain so re-entrant references find it
            *slot = Some(class.clone());
            desc.class_refs.fetch_add(1, Ordering::AcqRel);
            class
        };

        let _frame = context::frame(format!("Class::reference_default({})", desc.name));
        let _perf = perf::track("class.construct");
        if let Err(err) = construct(&class, &desc) {
            let stale = {
                let mut slot = desc.default_class.write();
                let is_current = slot.as_ref() == Some(&class);
                if is_current {
                    slot.take()
                } else {
                    None
                }
            };
            drop(stale);
            // Only this call's reference; re-entrant holders keep theirs
            let _ = desc
                .class_refs
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
            abandon(&class);
            return Err(context::record(err));
        }

        log_class_refcount(&desc.name, desc.class_refs.load(Ordering::Acquire));
        Ok(class)
    }

    /// Release one reference to a default class, returning the remaining count
    ///
    /// At zero the class is destructed unless its type is class-pinned.
    pub fn unreference_default(&self) -> Result<usize> {
        let desc = require(self.type_of()).recorded()?;
        if !self.is_default() {
            return fail(MetaError::invalid_operation(format!(
                "unreference of non-default {} class of '{}'",
                self.kind_name(),
                desc.name
            )));
        }
        if !self.is_alive() {
            return fail(MetaError::invalid_operation(format!(
                "unreference of destructed default class of '{}'",
                desc.name
            )));
        }

        let remaining = match desc
            .class_refs
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        {
            Ok(previous) => previous - 1,
            Err(_) => {
                return fail(MetaError::invalid_operation(format!(
                    "default class of '{}' is not referenced",
                    desc.name
                )))
            }
        };
        log_class_refcount(&desc.name, remaining);

        if remaining == 0 && !desc.has(TypeFlags::CLASS_PINNED) {
            let taken = {
                let mut slot = desc.default_class.write();
                let is_current = slot.as_ref() == Some(self);
                if is_current {
                    slot.take()
                } else {
                    None
                }
            };
            if let Some(class) = taken {
                let _frame = context::frame(format!("Class::unreference_default({})", desc.name));
                teardown(&class).recorded()?;
            }
        }
        Ok(remaining)
    }

    /// New heap class of `ty` not shared with anything, for per-instance
    /// overrides. Holds a reference to the type's default class.
    pub fn create_floating(ty: Type) -> Result<Class> {
        let desc = require(ty).recorded()?;
        if desc.info.class_size == 0 {
            return fail(no_class(&desc));
        }
        let _frame = context::frame(format!("Class::create_floating({})", desc.name));

        let default_ref = Class::reference_default(ty)?;
        let class = match allocate(&desc, Ownership::Floating { owned: false }, None) {
            Ok(class) => class,
            Err(err) => {
                let _ = default_ref.unreference_default();
                return fail(err);
            }
        };
        class.state().default_ref = Some(default_ref);

        if let Err(err) = construct(&class, &desc) {
            abandon(&class);
            return fail(err);
        }
        Ok(class)
    }

    /// Floating class of `ty` built over caller storage
    ///
    /// Types with class private data anywhere in their ancestry cannot be
    /// built in place. The storage is consumed on failure.
    pub fn construct_floating(storage: ClassStorage, ty: Type) -> Result<Class> {
        let desc = require(ty).recorded()?;
        if desc.info.class_size == 0 {
            return fail(no_class(&desc));
        }
        if desc.class_private_total > 0 {
            return fail(MetaError::invalid_operation(format!(
                "'{}' has class private data and cannot be constructed in place",
                desc.name
            )));
        }
        if storage.size() < desc.info.class_size {
            return fail(MetaError::invalid_argument(format!(
                "storage of {} bytes is too small for the {} byte class of '{}'",
                storage.size(),
                desc.info.class_size,
                desc.name
            )));
        }
        let _frame = context::frame(format!("Class::construct_floating({})", desc.name));

        let default_ref = Class::reference_default(ty)?;
        let class = match allocate(
            &desc,
            Ownership::FloatingInPlace { owned: false },
            Some(storage.block),
        ) {
            Ok(class) => class,
            Err(err) => {
                let _ = default_ref.unreference_default();
                return fail(err);
            }
        };
        class.state().default_ref = Some(default_ref);

        if let Err(err) = construct(&class, &desc) {
            abandon(&class);
            return fail(err);
        }
        Ok(class)
    }

    /// Destroy an unowned heap floating class
    pub fn destroy_floating(&self) -> Result<()> {
        let misuse = match self.state().ownership {
            Ownership::Floating { owned: false } => None,
            Ownership::Floating { owned: true } => Some("is owned by an instance"),
            Ownership::FloatingInPlace { .. } => {
                Some("was constructed in place and must be destructed")
            }
            Ownership::Default => Some("is a default class and must be unreferenced"),
            Ownership::InterfaceImpl { .. } => {
                Some("is an embedded interface and dies with its owner")
            }
        };
        self.check_teardown("destroy_floating", misuse)?;
        teardown(self).recorded()
    }

    /// Destruct an unowned in-place floating class, returning its storage
    pub fn destruct_floating(&self) -> Result<ClassStorage> {
        let misuse = match self.state().ownership {
            Ownership::FloatingInPlace { owned: false } => None,
            Ownership::FloatingInPlace { owned: true } => Some("is owned by an instance"),
            Ownership::Floating { .. } => Some("is heap allocated and must be destroyed"),
            Ownership::Default => Some("is a default class and must be unreferenced"),
            Ownership::InterfaceImpl { .. } => {
                Some("is an embedded interface and dies with its owner")
            }
        };
        self.check_teardown("destruct_floating", misuse)?;
        self.destruct_in_place().recorded()
    }

    fn check_teardown(&self, operation: &str, misuse: Option<&str>) -> Result<()> {
        if let Some(reason) = misuse {
            return fail(MetaError::invalid_operation(format!(
                "{operation}: class of '{}' {reason}",
                self.type_of()
            )));
        }
        if !self.is_alive() {
            return fail(MetaError::invalid_operation(format!(
                "{operation}: class of '{}' was already torn down",
                self.type_of()
            )));
        }
        Ok(())
    }

    fn destruct_in_place(&self) -> Result<ClassStorage> {
        let result = destruct(self, true);
        let (mut block, _) = take_blocks(self);
        block.reset();
        result.map(|()| ClassStorage { block })
    }

    /// Hand a floating class's lifetime to an instance
    pub(crate) fn sink(&self) -> Result<()> {
        let sunk = {
            let mut state = self.state();
            match &mut state.ownership {
                Ownership::Floating { owned } | Ownership::FloatingInPlace { owned } if !*owned => {
                    *owned = true;
                    true
                }
                _ => false,
            }
        };
        if sunk {
            return Ok(());
        }
        Err(MetaError::invalid_operation(format!(
            "only an unowned floating class can be sunk, not {self:?}"
        )))
    }

    /// Take a floating class's lifetime back from its instance
    pub(crate) fn unsink(&self) -> Result<()> {
        let floated = {
            let mut state = self.state();
            match &mut state.ownership {
                Ownership::Floating { owned } | Ownership::FloatingInPlace { owned } if *owned => {
                    *owned = false;
                    true
                }
                _ => false,
            }
        };
        if floated {
            return Ok(());
        }
        Err(MetaError::invalid_operation(format!(
            "only an owned floating class can be floated, not {self:?}"
        )))
    }

    /// Tear down a floating class owned by an instance
    pub(crate) fn dispose_owned(&self) -> Result<()> {
        let in_place = match self.state().ownership {
            Ownership::Floating { owned: true } => false,
            Ownership::FloatingInPlace { owned: true } => true,
            _ => {
                return Err(MetaError::invalid_operation(format!(
                    "class of '{}' is not owned by an instance",
                    self.type_of()
                )))
            }
        };
        if in_place {
            self.destruct_in_place().map(drop)
        } else {
            teardown(self)
        }
    }
}
