use super::closure::Closure;
use super::{find_quark, SignalDescriptor, STATE};
use crate::error::{context, fail, MetaError, Result};
use crate::instance::Instance;
use crate::intern::{self, Quark};
use crate::logging::{log_connection, log_disconnect};
use crate::types::Type;
use crate::variant::Variant;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One emitter/signal/receiver/closure binding, linked into the emitter's
/// handler list and the receiver's list
pub(crate) struct Connection {
    pub(crate) emitter: Instance,
    pub(crate) receiver: Instance,
    pub(crate) signal: Arc<SignalDescriptor>,
    pub(crate) name: Quark,
    pub(crate) closure: Closure,
    live: AtomicBool,
}

impl Connection {
    #[inline]
    pub(crate) fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    fn retire(&self) {
        self.live.store(false, Ordering::Release);
    }

    fn matches(
        &self,
        emitter: Option<&Instance>,
        name: Option<Quark>,
        closure: Option<&Closure>,
    ) -> bool {
        emitter.map_or(true, |e| self.emitter == *e)
            && name.map_or(true, |n| self.name == n)
            && closure.map_or(true, |c| self.closure == *c)
    }
}

#[derive(Default)]
pub(crate) struct Handler {
    pub(crate) blocked: bool,
    pub(crate) connections: Vec<Arc<Connection>>,
}

/// Per-instance signal state
#[derive(Default)]
pub(crate) struct ConnectionTable {
    pub(crate) block_all: bool,
    pub(crate) handlers: HashMap<Quark, Handler>,
    pub(crate) receiving: Vec<Arc<Connection>>,
}

impl ConnectionTable {
    fn is_empty(&self) -> bool {
        !self.block_all && self.handlers.is_empty() && self.receiving.is_empty()
    }

    /// Drop handlers that carry neither connections nor a block flag
    fn prune(&mut self) {
        self.handlers
            .retain(|_, handler| handler.blocked || !handler.connections.is_empty());
    }
}

/// Tables are only ever created for live instances
fn require_alive(instance: &Instance) -> Result<()> {
    if instance.is_alive() {
        Ok(())
    } else {
        Err(MetaError::invalid_argument(format!(
            "instance #{} was already destroyed",
            instance.id()
        )))
    }
}

fn attach(emitter: &Instance, name: &str, receiver: &Instance, closure: Closure) -> Result<()> {
    let _frame = context::frame(format!("signal::connect({name})"));
    for instance in [emitter, receiver] {
        if let Err(err) = require_alive(instance) {
            return fail(err);
        }
    }

    let emitter_type = emitter.type_of();
    let found = intern::try_get(name)
        .and_then(|quark| Some((quark, find_quark(emitter_type, quark)?)));
    let Some((quark, signal)) = found else {
        return fail(MetaError::invalid_handle(format!(
            "no signal '{name}' reachable from '{emitter_type}'"
        )));
    };

    closure.bind_marshal(signal.dispatch());
    let connection = Arc::new(Connection {
        emitter: emitter.clone(),
        receiver: receiver.clone(),
        signal,
        name: quark,
        closure,
        live: AtomicBool::new(true),
    });

    {
        let mut tables = STATE.tables.lock();
        tables
            .entry(emitter.id())
            .or_default()
            .handlers
            .entry(quark)
            .or_default()
            .connections
            .push(connection.clone());
        tables
            .entry(receiver.id())
            .or_default()
            .receiving
            .push(connection);
    }

    log_connection(name, emitter.id(), receiver.id());
    Ok(())
}

/// Call `callback` on `receiver` whenever `emitter` emits `name`
pub fn connect<F>(emitter: &Instance, name: &str, receiver: &Instance, callback: F) -> Result<()>
where
    F: Fn(&[Variant]) -> Result<()> + Send + Sync + 'static,
{
    attach(emitter, name, receiver, Closure::new(callback))
}

/// Call the [`Callback`](super::Callback) stored at `offset` of the
/// receiver's class viewed as `class_type`
pub fn connect_class(
    emitter: &Instance,
    name: &str,
    receiver: &Instance,
    class_type: Type,
    offset: usize,
) -> Result<()> {
    if !receiver.check(class_type) {
        return fail(MetaError::mismatch(
            receiver.type_of().to_string(),
            class_type.to_string(),
        ));
    }
    attach(emitter, name, receiver, Closure::class_method(class_type, offset))
}

/// Re-emit `name` as `dest_signal` on `dest`
pub fn connect_signal(
    emitter: &Instance,
    name: &str,
    dest: &Instance,
    dest_signal: &str,
) -> Result<()> {
    let dest_type = dest.type_of();
    if super::find(dest_type, dest_signal).is_none() {
        return fail(MetaError::invalid_handle(format!(
            "no signal '{dest_signal}' reachable from '{dest_type}'"
        )));
    }
    attach(emitter, name, dest, Closure::forward(dest_signal))
}

pub fn connect_closure(
    emitter: &Instance,
    name: &str,
    receiver: &Instance,
    closure: &Closure,
) -> Result<()> {
    attach(emitter, name, receiver, closure.clone())
}

/// Remove every connection matching the given filters, returning how many went
///
/// The receiver's list is scanned when a receiver is given, otherwise the
/// emitter's handlers. A name nobody ever used matches nothing.
pub fn disconnect(
    emitter: Option<&Instance>,
    name: Option<&str>,
    receiver: Option<&Instance>,
    closure: Option<&Closure>,
) -> Result<usize> {
    if emitter.is_none() && receiver.is_none() {
        return fail(MetaError::invalid_argument(
            "disconnect needs an emitter or a receiver",
        ));
    }
    let quark = match name {
        Some(name) => match intern::try_get(name) {
            Some(quark) => Some(quark),
            None => return Ok(0),
        },
        None => None,
    };

    let removed = {
        let mut tables = STATE.tables.lock();
        let candidates: Vec<Arc<Connection>> = match (receiver, emitter) {
            (Some(receiver), _) => tables
                .get(&receiver.id())
                .map(|table| {
                    table
                        .receiving
                        .iter()
                        .filter(|c| c.matches(emitter, quark, closure))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default(),
            (None, Some(emitter)) => tables
                .get(&emitter.id())
                .map(|table| {
                    table
                        .handlers
                        .iter()
                        .filter(|(key, _)| quark.map_or(true, |q| **key == q))
                        .flat_map(|(_, handler)| handler.connections.iter())
                        .filter(|c| c.matches(None, None, closure))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default(),
            (None, None) => Vec::new(),
        };
        unlink(&mut tables, &candidates);
        candidates
    };

    log_disconnect(removed.len());
    Ok(removed.len())
}

/// Take `doomed` out of both lists and drop tables left empty
fn unlink(tables: &mut HashMap<u64, ConnectionTable>, doomed: &[Arc<Connection>]) {
    for connection in doomed {
        connection.retire();
        let emitter_id = connection.emitter.id();
        if let Some(table) = tables.get_mut(&emitter_id) {
            if let Some(handler) = table.handlers.get_mut(&connection.name) {
                handler.connections.retain(|c| !Arc::ptr_eq(c, connection));
            }
            table.prune();
            if table.is_empty() {
                tables.remove(&emitter_id);
            }
        }
        let receiver_id = connection.receiver.id();
        if let Some(table) = tables.get_mut(&receiver_id) {
            table.receiving.retain(|c| !Arc::ptr_eq(c, connection));
            if table.is_empty() {
                tables.remove(&receiver_id);
            }
        }
    }
}

/// Suppress or resume `name` on `instance`, returning the previous setting
pub fn block(instance: &Instance, name: &str, blocked: bool) -> Result<bool> {
    if let Err(err) = require_alive(instance) {
        return fail(err);
    }
    let ty = instance.type_of();
    let Some(signal) = super::find(ty, name) else {
        return fail(MetaError::invalid_handle(format!(
            "no signal '{name}' reachable from '{ty}'"
        )));
    };
    let quark = signal.name;

    let mut tables = STATE.tables.lock();
    let table = tables.entry(instance.id()).or_default();
    let handler = table.handlers.entry(quark).or_default();
    let previous = std::mem::replace(&mut handler.blocked, blocked);
    table.prune();
    if table.is_empty() {
        tables.remove(&instance.id());
    }
    Ok(previous)
}

/// Suppress or resume every signal of `instance`, returning the previous setting
///
/// A destroyed instance records `InvalidArgument` and reports `false`.
pub fn block_all(instance: &Instance, blocked: bool) -> bool {
    if let Err(err) = require_alive(instance) {
        context::record(err);
        return false;
    }
    let mut tables = STATE.tables.lock();
    let table = tables.entry(instance.id()).or_default();
    let previous = std::mem::replace(&mut table.block_all, blocked);
    if table.is_empty() {
        tables.remove(&instance.id());
    }
    previous
}

/// Whether `name` (or, with `None`, everything) is blocked on `instance`
pub fn is_blocked(instance: &Instance, name: Option<&str>) -> bool {
    let tables = STATE.tables.lock();
    let Some(table) = tables.get(&instance.id()) else {
        return false;
    };
    match name {
        None => table.block_all,
        Some(name) => {
            table.block_all
                || intern::try_get(name)
                    .and_then(|quark| table.handlers.get(&quark))
                    .is_some_and(|handler| handler.blocked)
        }
    }
}

/// Connections `instance` emits through, on `name` or on every signal
pub fn connection_count(instance: &Instance, name: Option<&str>) -> usize {
    let tables = STATE.tables.lock();
    let Some(table) = tables.get(&instance.id()) else {
        return 0;
    };
    match name {
        None => table
            .handlers
            .values()
            .map(|handler| handler.connections.len())
            .sum(),
        Some(name) => intern::try_get(name)
            .and_then(|quark| table.handlers.get(&quark))
            .map_or(0, |handler| handler.connections.len()),
    }
}

/// Disconnect everything `instance` emits or receives and forget its table
pub(crate) fn remove_instance(instance: &Instance) {
    let removed = {
        let mut tables = STATE.tables.lock();
        let Some(table) = tables.remove(&instance.id()) else {
            return;
        };
        let doomed: Vec<Arc<Connection>> = table
            .handlers
            .into_values()
            .flat_map(|handler| handler.connections)
            .chain(table.receiving)
            .collect();
        unlink(&mut tables, &doomed);
        doomed
    };
    if !removed.is_empty() {
        log_disconnect(removed.len());
    }
}

/// Disconnect everything bound to `signal`
pub(crate) fn remove_signal(signal: &Arc<SignalDescriptor>) {
    let removed = {
        let mut tables = STATE.tables.lock();
        let doomed: Vec<Arc<Connection>> = tables
            .values()
            .flat_map(|table| table.handlers.values())
            .flat_map(|handler| handler.connections.iter())
            .filter(|c| Arc::ptr_eq(&c.signal, signal))
            .cloned()
            .collect();
        unlink(&mut tables, &doomed);
        doomed
    };
    log_disconnect(removed.len());
}

/// Forget every signal `ty` installed, with their connections
pub(crate) fn remove_type(ty: Type) {
    let owned: Vec<Arc<SignalDescriptor>> = STATE
        .descriptors
        .iter()
        .filter(|entry| entry.key().0 == ty)
        .map(|entry| entry.value().clone())
        .collect();
    for signal in owned {
        STATE.descriptors.remove(&(ty, signal.name));
        remove_signal(&signal);
    }
}
