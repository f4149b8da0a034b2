//! Signals, connections and emission
//!
//! A type installs named signals with a declared argument list. Any instance
//! whose type (or an ancestor, or a mapped interface) declares a signal can
//! emit it; any instance can receive it through a [`Closure`]. Every instance
//! that has been an emitter or receiver gets a connection table holding its
//! per-signal handler lists and the connections addressed to it. Tables live
//! in one process-wide map keyed by instance id and go away when empty.

mod closure;
mod connection;
mod emit;


pub use closure::{Callback, Closure, Marshal};
pub use connection::{
    block, block_all, connect, connect_class, connect_closure, connect_signal, connection_count,
    disconnect, is_blocked,
};
pub use emit::{current_signal, emit, emit_vec, emitter, receiver};

pub(crate) use connection::{remove_instance, remove_type};

use crate::config;
use crate::error::{fail, MetaError, Result};
use crate::intern::{self, Quark};
use crate::logging::{log_runtime_warning, log_signal_installed};
use crate::types::registry::{descriptor, require};
use crate::types::Type;
use connection::ConnectionTable;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

static STATE: Lazy<SignalState> = Lazy::new(SignalState::new);

struct SignalState {
    descriptors: DashMap<(Type, Quark), Arc<SignalDescriptor>>,
    tables: Mutex<HashMap<u64, ConnectionTable>>,
}

impl SignalState {
    fn new() -> Self {
        let capacity = config::active().signals.table_capacity;
        Self {
            descriptors: DashMap::new(),
            tables: Mutex::new(HashMap::with_capacity(capacity)),
        }
    }
}

/// A signal declared by a type
pub struct SignalDescriptor {
    owner: Type,
    name: Quark,
    dispatch: Option<Marshal>,
    arg_types: Vec<Type>,
}

impl SignalDescriptor {
    /// Type that installed the signal
    pub fn owner(&self) -> Type {
        self.owner
    }

    pub fn name(&self) -> Arc<str> {
        self.name.as_str()
    }

    pub fn dispatch(&self) -> Option<Marshal> {
        self.dispatch
    }

    /// Declared argument types, receiver excluded
    pub fn arg_types(&self) -> &[Type] {
        &self.arg_types
    }
}

impl fmt::Debug for SignalDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalDescriptor")
            .field("owner", &self.owner)
            .field("name", &self.name)
            .field("dispatch", &self.dispatch.is_some())
            .field("arg_types", &self.arg_types)
            .finish()
    }
}

/// Declare signal `name` on `ty`
///
/// `dispatch` becomes the marshal of every closure connected without one.
/// Installing the same name twice on one type is rejected.
pub fn install(ty: Type, name: &str, dispatch: Option<Marshal>, arg_types: &[Type]) -> Result<()> {
    let desc = match require(ty) {
        Ok(desc) => desc,
        Err(err) => return fail(err),
    };
    if name.is_empty() {
        return fail(MetaError::invalid_argument("signal name must not be empty"));
    }
    if let Some(bad) = arg_types.iter().find(|arg| descriptor(**arg).is_none()) {
        return fail(MetaError::invalid_argument(format!(
            "argument type handle {} of '{}::{name}' is not registered",
            bad.raw(),
            desc.name
        )));
    }

    let quark = intern::intern(name);
    match STATE.descriptors.entry((ty, quark)) {
        Entry::Occupied(_) => {
            return fail(MetaError::DuplicateRegistration(format!(
                "{}::{name}",
                desc.name
            )))
        }
        Entry::Vacant(slot) => {
            slot.insert(Arc::new(SignalDescriptor {
                owner: ty,
                name: quark,
                dispatch,
                arg_types: arg_types.to_vec(),
            }));
        }
    }

    log_signal_installed(&desc.name, name, arg_types.len());
    Ok(())
}

/// Remove signal `name` from `ty`, disconnecting everything bound to it
pub fn uninstall(ty: Type, name: &str) -> Result<()> {
    let removed = intern::try_get(name).and_then(|quark| STATE.descriptors.remove(&(ty, quark)));
    match removed {
        Some((_, signal)) => {
            connection::remove_signal(&signal);
            Ok(())
        }
        None => fail(MetaError::invalid_handle(format!(
            "no signal '{name}' installed on '{ty}'"
        ))),
    }
}

/// Signal `name` as seen from `ty`: its own, then its interfaces', then its
/// parent's
pub fn find(ty: Type, name: &str) -> Option<Arc<SignalDescriptor>> {
    find_quark(ty, intern::try_get(name)?)
}

pub(crate) fn find_quark(ty: Type, name: Quark) -> Option<Arc<SignalDescriptor>> {
    if let Some(found) = STATE.descriptors.get(&(ty, name)) {
        return Some(found.clone());
    }
    let desc = descriptor(ty)?;
    for entry in &desc.info.interfaces {
        if let Some(found) = find_quark(entry.interface, name) {
            return Some(found);
        }
    }
    desc.parent.and_then(|parent| find_quark(parent, name))
}

/// Drop every signal and connection
pub(crate) fn clear() {
    let tables = std::mem::take(&mut *STATE.tables.lock());
    if !tables.is_empty() {
        log_runtime_warning(&format!(
            "{} connection tables still live at shutdown",
            tables.len()
        ));
    }
    drop(tables);
    STATE.descriptors.clear();
}
