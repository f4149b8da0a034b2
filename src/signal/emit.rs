use super::connection::Connection;
use super::STATE;
use crate::error::{context, fail, MetaError, Result, ResultExt};
use crate::instance::Instance;
use crate::intern;
use crate::logging::{log_emission, perf};
use crate::variant::Variant;
use std::cell::RefCell;
use std::sync::Arc;

thread_local! {
    static ACTIVE: RefCell<Option<Arc<Connection>>> = const { RefCell::new(None) };
}

/// Marks `connection` active for this thread until dropped, then restores
/// whatever was active before
struct ActiveGuard {
    previous: Option<Arc<Connection>>,
}

impl ActiveGuard {
    fn enter(connection: Arc<Connection>) -> ActiveGuard {
        let previous = ACTIVE.with(|active| active.replace(Some(connection)));
        ActiveGuard { previous }
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        ACTIVE.with(|active| *active.borrow_mut() = previous);
    }
}

pub(crate) fn active_connection() -> Option<Arc<Connection>> {
    ACTIVE.with(|active| active.borrow().clone())
}

/// Emitter of the connection being invoked on this thread
pub fn emitter() -> Option<Instance> {
    active_connection().map(|connection| connection.emitter.clone())
}

/// Receiver of the connection being invoked on this thread
pub fn receiver() -> Option<Instance> {
    active_connection().map(|connection| connection.receiver.clone())
}

/// Name of the signal being delivered on this thread
pub fn current_signal() -> Option<Arc<str>> {
    active_connection().map(|connection| connection.name.as_str())
}

/// Emit `name` from `emitter`, copying `args`
pub fn emit(emitter: &Instance, name: &str, args: &[Variant]) -> Result<()> {
    emit_vec(emitter, name, args.to_vec())
}

/// Emit `name` from `emitter`, taking ownership of `args`
///
/// Connections run in the order they were made. A blocked signal, a blocked
/// instance, or a signal nobody connected to is a no-op. The first failing
/// closure stops the emission and its error is returned.
pub fn emit_vec(emitter: &Instance, name: &str, args: Vec<Variant>) -> Result<()> {
    let Some(quark) = intern::try_get(name) else {
        return Ok(());
    };
    let connections: Vec<Arc<Connection>> = {
        let tables = STATE.tables.lock();
        let Some(table) = tables.get(&emitter.id()) else {
            return Ok(());
        };
        if table.block_all {
            return Ok(());
        }
        match table.handlers.get(&quark) {
            Some(handler) if !handler.blocked => handler.connections.clone(),
            _ => return Ok(()),
        }
    };
    let Some(first) = connections.first() else {
        return Ok(());
    };

    let _frame = context::frame(format!("signal::emit({name})"));
    let _perf = perf::track("signal.emit");
    let declared = first.signal.arg_types();
    if args.len() != declared.len() {
        return fail(MetaError::invalid_argument(format!(
            "'{name}' takes {} arguments, {} given",
            declared.len(),
            args.len()
        )));
    }
    for (position, (arg, expected)) in args.iter().zip(declared).enumerate() {
        let actual = arg.type_of();
        if !actual.check(*expected) {
            return fail(MetaError::TypeMismatch {
                from: format!("argument {position} of '{name}': {actual}"),
                to: expected.to_string(),
            });
        }
    }

    log_emission(name, emitter.id(), connections.len());

    let mut argv = Vec::with_capacity(args.len() + 1);
    argv.push(Variant::Nil);
    argv.extend(args);

    for connection in connections {
        if !connection.is_live() {
            continue;
        }
        argv[0] = Variant::Instance(connection.receiver.clone());
        let closure = connection.closure.clone();
        let _active = ActiveGuard::enter(connection);
        closure.dispatch(&argv).recorded()?;
    }
    Ok(())
}

/// Emit a signal with arguments converted through `Variant::from`
///
/// ```ignore
/// metatype::emit!(shape, "resized", 42)?;
/// ```
#[macro_export]
macro_rules! emit {
    ($emitter:expr, $name:expr $(, $arg:expr)* $(,)?) => {
        $crate::signal::emit_vec(
            &$emitter,
            $name,
            vec![$($crate::variant::Variant::from($arg)),*],
        )
    };
}
