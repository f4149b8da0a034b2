//! Global type table
//!
//! Descriptors are immutable once published apart from their reference counts
//! and the live default-class slot. Mutation (registration, unregistration,
//! teardown) is serialised by one mutex; lookups go straight to the concurrent
//! map and never take it.

use super::builtin::Builtin;
use super::query;
use super::{
    Type, TypeFlags, TypeInfo, CLASS_HEADER_SIZE, INSTANCE_HEADER_SIZE, INTERFACE_HEADER_SIZE,
};
use crate::class::{self, Class};
use crate::config;
use crate::error::{context, MetaError, Result, ResultExt};
use crate::intern::{self, Quark};
use crate::logging::{
    log_runtime_init, log_runtime_shutdown, log_runtime_warning, log_type_registered,
    log_type_unregistered, perf,
};
use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use smallvec::SmallVec;
use std::cmp::Reverse;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// First id handed to user registrations; lower ids are reserved for builtins
const FIRST_USER_ID: u64 = 64;

static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

/// Metadata record for one registered type
pub(crate) struct TypeDescriptor {
    pub(crate) ty: Type,
    pub(crate) name: Arc<str>,
    pub(crate) quark: Quark,
    pub(crate) parent: Option<Type>,
    /// Ancestor chain, root first, ending with this type
    pub(crate) bases: SmallVec<[Type; 8]>,
    /// Own flags plus the root's fundamental flags
    pub(crate) flags: TypeFlags,
    pub(crate) info: TypeInfo,
    /// Class private bytes of every ancestor including this one
    pub(crate) class_private_total: usize,
    /// Instance private bytes of every ancestor including this one
    pub(crate) instance_private_total: usize,
    pub(crate) class_refs: AtomicUsize,
    pub(crate) instance_refs: AtomicUsize,
    /// Registration holds one class reference for CLASS_PREINIT types
    pub(crate) preinit_held: AtomicBool,
    pub(crate) default_class: RwLock<Option<Class>>,
}

impl TypeDescriptor {
    #[inline]
    pub(crate) fn depth(&self) -> usize {
        self.bases.len() - 1
    }

    #[inline]
    pub(crate) fn has(&self, flags: TypeFlags) -> bool {
        self.flags.contains(flags)
    }

    /// Live default class without touching the reference count
    pub(crate) fn live_class(&self) -> Option<Class> {
        self.default_class.read().clone()
    }
}

struct Registry {
    types: DashMap<Type, Arc<TypeDescriptor>>,
    names: DashMap<Quark, Type>,
    write_lock: Mutex<()>,
    next_id: AtomicU64,
    initialized: AtomicBool,
}

impl Registry {
    fn new() -> Self {
        let capacity = config::active().registry.type_capacity;
        Self {
            types: DashMap::with_capacity(capacity),
            names: DashMap::with_capacity(capacity),
            write_lock: Mutex::new(()),
            next_id: AtomicU64::new(FIRST_USER_ID),
            initialized: AtomicBool::new(false),
        }
    }

    /// Build and publish a descriptor; caller holds `write_lock`
    fn insert_locked(
        &self,
        fixed: Option<Type>,
        name: &str,
        parent: Option<Type>,
        info: TypeInfo,
        flags: TypeFlags,
    ) -> Result<Arc<TypeDescriptor>> {
        if name.is_empty() {
            return Err(MetaError::invalid_argument("type name must not be empty"));
        }

        let quark = intern::intern(name);
        if self.names.contains_key(&quark) {
            return Err(MetaError::DuplicateRegistration(name.to_string()));
        }

        let parent_desc = match parent {
            Some(p) => Some(self.types.get(&p).map(|d| d.clone()).ok_or_else(|| {
                MetaError::InvalidParent {
                    name: name.to_string(),
                    reason: format!("unknown parent handle {}", p.raw()),
                }
            })?),
            None => None,
        };

        let (flags, info) = if fixed.is_some() {
            (implied_flags(false, &info, flags), info)
        } else {
            validate(name, parent_desc.as_deref(), info, flags)?
        };

        let (class_private_total, instance_private_total) =
            private_totals(name, parent_desc.as_deref(), &info)?;

        let ty = match fixed {
            Some(ty) => ty,
            None => Type::from_raw(self.next_id.fetch_add(1, Ordering::SeqCst))
                .ok_or_else(|| MetaError::OutOfRange("type handles exhausted".into()))?,
        };

        let mut bases: SmallVec<[Type; 8]> = parent_desc
            .as_ref()
            .map(|p| p.bases.clone())
            .unwrap_or_default();
        bases.push(ty);

        let desc = Arc::new(TypeDescriptor {
            ty,
            name: Arc::from(name),
            quark,
            parent,
            bases,
            flags,
            info,
            class_private_total,
            instance_private_total,
            class_refs: AtomicUsize::new(0),
            instance_refs: AtomicUsize::new(0),
            preinit_held: AtomicBool::new(false),
            default_class: RwLock::new(None),
        });

        // Publish the descriptor before the name makes the handle discoverable
        self.types.insert(ty, desc.clone());
        self.names.insert(quark, ty);

        log_type_registered(
            name,
            parent_desc.as_ref().map(|p| &*p.name),
            desc.depth(),
        );
        Ok(desc)
    }

    fn remove_locked(&self, desc: &TypeDescriptor) {
        self.names.remove(&desc.quark);
        self.types.remove(&desc.ty);
    }
}

/// Flags implied by sizes and other flags
pub(crate) fn implied_flags(derived: bool, info: &TypeInfo, mut flags: TypeFlags) -> TypeFlags {
    if !derived && !info.dependencies.is_empty() {
        flags |= TypeFlags::DEPENDENT;
    }
    if !derived && info.class_size != 0 {
        flags |= TypeFlags::CLASSED;
    }
    if !derived && info.instance_size != 0 {
        flags |= TypeFlags::INSTANTIABLE;
    }
    if flags.contains(TypeFlags::CLASS_PREINIT) {
        flags |= TypeFlags::CLASS_PINNED;
    }
    if flags.contains(TypeFlags::INTERFACED) {
        flags |= TypeFlags::CLASSED | TypeFlags::DEPENDENT;
    }
    if flags.contains(TypeFlags::INSTANTIABLE) {
        flags |= TypeFlags::CLASSED;
    }
    if flags.contains(TypeFlags::DEEP_DERIVABLE) {
        flags |= TypeFlags::DERIVABLE;
    }
    flags
}

/// Private data sizes accumulated over the ancestor chain
fn private_totals(
    name: &str,
    parent: Option<&TypeDescriptor>,
    info: &TypeInfo,
) -> Result<(usize, usize)> {
    let Some(p) = parent else {
        return Ok((info.class_private_size, info.instance_private_size));
    };
    let overflow = |what: &str| MetaError::InvalidTypeInfo {
        name: name.to_string(),
        reason: format!("{what} private size overflows the inherited total"),
    };
    let class = p
        .class_private_total
        .checked_add(info.class_private_size)
        .ok_or_else(|| overflow("class"))?;
    let instance = p
        .instance_private_total
        .checked_add(info.instance_private_size)
        .ok_or_else(|| overflow("instance"))?;
    Ok((class, instance))
}

fn validate(
    name: &str,
    parent: Option<&TypeDescriptor>,
    mut info: TypeInfo,
    flags: TypeFlags,
) -> Result<(TypeFlags, TypeInfo)> {
    let invalid = |reason: String| MetaError::InvalidTypeInfo {
        name: name.to_string(),
        reason,
    };
    let bad_parent = |reason: &str| MetaError::InvalidParent {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if parent.is_some() && !flags.fundamental().is_empty() {
        return Err(invalid(format!(
            "fundamental flags {:?} are only allowed on root types",
            flags.fundamental()
        )));
    }

    let own = implied_flags(parent.is_some(), &info, flags);
    let mut fund = own;

    if let Some(p) = parent {
        fund |= p.flags.fundamental();

        if !fund.contains(TypeFlags::DERIVABLE) {
            return Err(bad_parent("parent is not derivable"));
        }
        if p.depth() > 0 && !fund.contains(TypeFlags::DEEP_DERIVABLE) {
            return Err(bad_parent("parent's root is not deep-derivable"));
        }
        if p.has(TypeFlags::FINAL) {
            return Err(bad_parent("parent is final"));
        }

        if info.class_size == 0 {
            info.class_size = p.info.class_size;
        }
        if info.instance_size == 0 {
            info.instance_size = p.info.instance_size;
        }
        if info.class_size < p.info.class_size {
            return Err(invalid(format!(
                "class size {} is smaller than the parent's {}",
                info.class_size, p.info.class_size
            )));
        }
        if info.instance_size < p.info.instance_size {
            return Err(invalid(format!(
                "instance size {} is smaller than the parent's {}",
                info.instance_size, p.info.instance_size
            )));
        }
    }

    if fund.contains(TypeFlags::CLASS_PINNED) && !fund.contains(TypeFlags::CLASSED) {
        return Err(invalid("cannot pin the class of a non-classed type".into()));
    }

    if fund.contains(TypeFlags::CLASSED) {
        if info.class_size < CLASS_HEADER_SIZE {
            return Err(invalid(format!(
                "classed type needs a class size of at least {CLASS_HEADER_SIZE}"
            )));
        }
    } else if info.class_size != 0 || info.class_private_size != 0 {
        return Err(invalid("non-classed type declares class storage".into()));
    }

    if fund.contains(TypeFlags::INTERFACED) {
        if fund.contains(TypeFlags::INSTANTIABLE) {
            return Err(invalid("interfaced types cannot be instantiable".into()));
        }
        if info.class_size < INTERFACE_HEADER_SIZE {
            return Err(invalid(format!(
                "interfaced type needs a class size of at least {INTERFACE_HEADER_SIZE}"
            )));
        }
    }

    if fund.contains(TypeFlags::INSTANTIABLE) {
        if info.instance_size < INSTANCE_HEADER_SIZE {
            return Err(invalid(format!(
                "instantiable type needs an instance size of at least {INSTANCE_HEADER_SIZE}"
            )));
        }
    } else if info.instance_size != 0 || info.instance_private_size != 0 {
        return Err(invalid("non-instantiable type declares instance storage".into()));
    }

    if !info.dependencies.is_empty() {
        if !fund.contains(TypeFlags::DEPENDENT) {
            return Err(invalid("only dependent types may declare dependencies".into()));
        }
        let mut primary = 0;
        for dep in &info.dependencies {
            let dep_desc = registered(*dep)
                .ok_or_else(|| invalid(format!("unknown dependency handle {}", dep.raw())))?;
            if !dep_desc.has(TypeFlags::DEPENDENT) {
                primary += 1;
            }
        }
        if primary > 1 {
            return Err(invalid(format!(
                "{primary} non-dependent dependencies declared, at most one allowed"
            )));
        }
    }

    validate_interfaces(name, parent, &info, fund)?;

    let stored = match parent {
        Some(p) => own | p.flags.fundamental(),
        None => own,
    };
    Ok((stored, info))
}

fn validate_interfaces(
    name: &str,
    parent: Option<&TypeDescriptor>,
    info: &TypeInfo,
    fund: TypeFlags,
) -> Result<()> {
    if info.interfaces.is_empty() {
        return Ok(());
    }

    let invalid = |reason: String| MetaError::InvalidTypeInfo {
        name: name.to_string(),
        reason,
    };

    if !fund.contains(TypeFlags::CLASSED) {
        return Err(invalid("interface map on a non-classed type".into()));
    }

    let parent_ty = parent.map(|p| p.ty);
    let mut spans = Vec::with_capacity(info.interfaces.len());

    for (i, entry) in info.interfaces.iter().enumerate() {
        let iface = registered(entry.interface)
            .ok_or_else(|| invalid(format!("interface[{i}] is not a registered type")))?;

        if !iface.has(TypeFlags::INTERFACED) {
            return Err(invalid(format!("interface[{i}] '{}' is not interfaced", iface.name)));
        }

        if let Some(common) = parent_ty.and_then(|p| query::common(p, entry.interface)) {
            return Err(invalid(format!(
                "interface[{i}] '{}' is already reachable through '{}'",
                iface.name,
                common.name().as_deref().unwrap_or("?")
            )));
        }

        let end = entry
            .class_offset
            .checked_add(iface.info.class_size)
            .ok_or_else(|| {
                invalid(format!(
                    "interface[{i}] '{}' offset {} overflows",
                    iface.name, entry.class_offset
                ))
            })?;
        if end > info.class_size {
            return Err(invalid(format!(
                "interface[{i}] '{}' ends at {end}, beyond class size {}",
                iface.name, info.class_size
            )));
        }

        let floor = parent.map_or(CLASS_HEADER_SIZE, |p| p.info.class_size.max(CLASS_HEADER_SIZE));
        if entry.class_offset < floor {
            return Err(invalid(format!(
                "interface[{i}] '{}' offset {} maps inside the inherited class block (< {floor})",
                iface.name, entry.class_offset
            )));
        }

        spans.push((entry.class_offset, end, entry.interface, iface.name.clone()));
    }

    for (i, a) in spans.iter().enumerate() {
        for b in &spans[i + 1..] {
            if let Some(common) = query::common(a.2, b.2) {
                return Err(invalid(format!(
                    "interfaces '{}' and '{}' are ambiguous through '{}'",
                    a.3,
                    b.3,
                    common.name().as_deref().unwrap_or("?")
                )));
            }
            if a.0 < b.1 && b.0 < a.1 {
                return Err(invalid(format!(
                    "interfaces '{}' and '{}' overlap",
                    a.3, b.3
                )));
            }
        }
    }

    for (i, entry) in info.interfaces.iter().enumerate() {
        let Some(iface) = registered(entry.interface) else {
            continue;
        };
        for dep in &iface.info.dependencies {
            let by_parent = parent_ty.map_or(false, |p| query::conforms(p, *dep));
            let by_earlier = info.interfaces[..i]
                .iter()
                .any(|prev| query::check(prev.interface, *dep));
            if !by_parent && !by_earlier {
                return Err(invalid(format!(
                    "interface[{i}] '{}' depends on '{}', which is not satisfied",
                    iface.name,
                    dep.name().as_deref().unwrap_or("?")
                )));
            }
        }
    }

    Ok(())
}

/// Register builtins on first use
pub(crate) fn ensure_initialized() {
    let reg = &*REGISTRY;
    if reg.initialized.load(Ordering::Acquire) {
        return;
    }

    let _guard = reg.write_lock.lock();
    if reg.initialized.load(Ordering::Acquire) {
        return;
    }

    for builtin in Builtin::ALL {
        let (info, flags) = builtin.definition();
        if let Err(err) = reg.insert_locked(Some(builtin.ty()), builtin.name(), None, info, flags) {
            log_runtime_warning(&format!("builtin '{}' not registered: {err}", builtin.name()));
        }
    }

    reg.initialized.store(true, Ordering::Release);
    log_runtime_init(Builtin::ALL.len());
}

/// Descriptor lookup without the init check, for use while holding the lock
fn registered(ty: Type) -> Option<Arc<TypeDescriptor>> {
    REGISTRY.types.get(&ty).map(|d| d.clone())
}

/// Descriptor for a live handle
pub(crate) fn descriptor(ty: Type) -> Option<Arc<TypeDescriptor>> {
    ensure_initialized();
    registered(ty)
}

/// Descriptor for a live handle, recording `InvalidArgument` when unknown
pub(crate) fn require(ty: Type) -> Result<Arc<TypeDescriptor>> {
    descriptor(ty).ok_or_else(|| {
        MetaError::invalid_argument(format!("unknown type handle {}", ty.raw()))
    })
}

/// Register a new type
///
/// `parent` is `None` for a root (fundamental) type. See [`TypeFlags`] for the
/// flags accepted on roots versus derived types.
pub fn register(
    name: &str,
    parent: Option<Type>,
    info: TypeInfo,
    flags: TypeFlags,
) -> Result<Type> {
    let _frame = context::frame(format!("Type::register({name})"));
    let _perf = perf::track("type.register");
    ensure_initialized();

    let desc = {
        let _guard = REGISTRY.write_lock.lock();
        REGISTRY.insert_locked(None, name, parent, info, flags)
    }
    .recorded()?;

    if desc.has(TypeFlags::CLASS_PREINIT) {
        match Class::reference_default(desc.ty) {
            Ok(_) => desc.preinit_held.store(true, Ordering::Release),
            Err(err) => {
                let _guard = REGISTRY.write_lock.lock();
                REGISTRY.remove_locked(&desc);
                return Err(context::record(err));
            }
        }
    }

    Ok(desc.ty)
}

/// Remove a type whose classes and instances have all been released
pub fn unregister(ty: Type) -> Result<()> {
    let _frame = context::frame(format!("Type::unregister({ty})"));
    let desc = require(ty).recorded()?;

    if desc.has(TypeFlags::BUILTIN) {
        return crate::error::fail(MetaError::invalid_operation(format!(
            "builtin type '{}' cannot be unregistered",
            desc.name
        )));
    }

    let held = usize::from(desc.preinit_held.load(Ordering::Acquire));
    let class_refs = desc.class_refs.load(Ordering::Acquire);
    let instance_refs = desc.instance_refs.load(Ordering::Acquire);
    if class_refs > held || instance_refs > 0 {
        return crate::error::fail(MetaError::invalid_operation(format!(
            "type '{}' still has {} class and {instance_refs} instance references",
            desc.name,
            class_refs - held.min(class_refs)
        )));
    }

    let dependents: Vec<Arc<str>> = REGISTRY
        .types
        .iter()
        .filter(|entry| {
            let other = entry.value();
            other.ty != ty
                && (other.parent == Some(ty)
                    || other.info.interfaces.iter().any(|e| e.interface == ty)
                    || other.info.dependencies.contains(&ty))
        })
        .map(|entry| entry.value().name.clone())
        .collect();
    if !dependents.is_empty() {
        return crate::error::fail(MetaError::invalid_operation(format!(
            "type '{}' is still used by {:?}",
            desc.name, dependents
        )));
    }

    if desc.preinit_held.swap(false, Ordering::AcqRel) {
        if let Some(class) = desc.live_class() {
            class.unreference_default().recorded()?;
        }
    }

    let pinned = desc.default_class.write().take();
    if let Some(class) = pinned {
        class::teardown(&class).recorded()?;
    }

    crate::signal::remove_type(ty);

    {
        let _guard = REGISTRY.write_lock.lock();
        REGISTRY.remove_locked(&desc);
    }
    log_type_unregistered(&desc.name);
    Ok(())
}

/// Look a type up by name
pub fn find(name: &str) -> Option<Type> {
    ensure_initialized();
    let quark = intern::try_get(name)?;
    REGISTRY.names.get(&quark).map(|ty| *ty)
}

/// Number of registered types, builtins included
pub fn count() -> usize {
    ensure_initialized();
    REGISTRY.types.len()
}

/// Every registered type, in registration order
pub fn all() -> Vec<Type> {
    ensure_initialized();
    let mut types: Vec<Type> = REGISTRY.types.iter().map(|entry| *entry.key()).collect();
    types.sort();
    types
}

/// Destroy remaining default classes and forget every type
pub(crate) fn shutdown() {
    let reg = &*REGISTRY;
    if !reg.initialized.load(Ordering::Acquire) {
        return;
    }

    let mut descs: Vec<Arc<TypeDescriptor>> =
        reg.types.iter().map(|entry| entry.value().clone()).collect();
    // Derived types and implementers are registered after what they use
    descs.sort_by_key(|d| Reverse(d.ty));

    for desc in &descs {
        let live = desc.default_class.write().take();
        if let Some(class) = live {
            if let Err(err) = class::teardown(&class) {
                log_runtime_warning(&format!("teardown of '{}' failed: {err}", desc.name));
            }
        }
    }

    let _guard = reg.write_lock.lock();
    reg.types.clear();
    reg.names.clear();
    reg.initialized.store(false, Ordering::Release);
    log_runtime_shutdown(descs.len());
}
