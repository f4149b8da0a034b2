use super::emit::{active_connection, emit_vec};
use crate::class::Class;
use crate::error::{fail, MetaError, Result};
use crate::intern::{self, Quark};
use crate::types::Type;
use crate::variant::Variant;
use once_cell::sync::OnceCell;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Plain callback target; `args[0]` is the receiving instance
pub type Callback = Arc<dyn Fn(&[Variant]) -> Result<()> + Send + Sync>;

/// Dispatch function of a signal, applied to every closure it reaches
pub type Marshal = fn(&Closure, &[Variant]) -> Result<()>;

pub(crate) enum Target {
    Callback(Callback),
    /// Callback stored in the receiver's class, viewed as `class_type`
    ClassMethod { class_type: Type, offset: usize },
    /// Re-emit `signal` on the receiver with the remaining arguments
    Forward { signal: Quark },
}

struct ClosureInner {
    target: Target,
    marshal: OnceCell<Marshal>,
    user_data: Option<Arc<dyn Any + Send + Sync>>,
}

/// Reference-counted callable plus captured state, the target of a connection
#[derive(Clone)]
pub struct Closure(Arc<ClosureInner>);

impl Closure {
    fn with_target(target: Target) -> Closure {
        Closure(Arc::new(ClosureInner {
            target,
            marshal: OnceCell::new(),
            user_data: None,
        }))
    }

    pub fn new<F>(callback: F) -> Closure
    where
        F: Fn(&[Variant]) -> Result<()> + Send + Sync + 'static,
    {
        Self::with_target(Target::Callback(Arc::new(callback)))
    }

    pub fn from_callback(callback: Callback) -> Closure {
        Self::with_target(Target::Callback(callback))
    }

    /// Call the [`Callback`] stored at `offset` in the receiver's class
    pub fn class_method(class_type: Type, offset: usize) -> Closure {
        Self::with_target(Target::ClassMethod { class_type, offset })
    }

    /// Emit `signal` on the receiver, passing the arguments along
    pub fn forward(signal: &str) -> Closure {
        Self::with_target(Target::Forward {
            signal: intern::intern(signal),
        })
    }

    /// Attach user data; only valid before the closure is shared
    pub fn with_user_data<T: Any + Send + Sync>(self, data: T) -> Closure {
        let inner = match Arc::try_unwrap(self.0) {
            Ok(inner) => inner,
            Err(shared) => ClosureInner {
                target: shared.target.clone_target(),
                marshal: shared.marshal.clone(),
                user_data: shared.user_data.clone(),
            },
        };
        Closure(Arc::new(ClosureInner {
            user_data: Some(Arc::new(data)),
            ..inner
        }))
    }

    /// Use `marshal` instead of the signal's dispatch function
    ///
    /// The marshal is set once; `InvalidOperation` when this closure (or a
    /// clone already connected) has one.
    pub fn with_marshal(self, marshal: Marshal) -> Result<Closure> {
        if self.0.marshal.set(marshal).is_err() {
            return fail(MetaError::invalid_operation(
                "closure already has a marshal",
            ));
        }
        Ok(self)
    }

    pub fn user_data<T: Any>(&self) -> Option<&T> {
        self.0.user_data.as_ref()?.downcast_ref::<T>()
    }

    pub fn marshal(&self) -> Option<Marshal> {
        self.0.marshal.get().copied()
    }

    /// Adopt a signal's dispatch function unless one is already set
    pub(crate) fn bind_marshal(&self, marshal: Option<Marshal>) {
        if let Some(marshal) = marshal {
            let _ = self.0.marshal.set(marshal);
        }
    }

    /// Closure of the connection being invoked on this thread
    pub fn current() -> Option<Closure> {
        active_connection().map(|connection| connection.closure.clone())
    }

    /// Run through the marshal when one is set, otherwise call the target
    pub fn dispatch(&self, args: &[Variant]) -> Result<()> {
        match self.marshal() {
            Some(marshal) => marshal(self, args),
            None => self.invoke(args),
        }
    }

    /// Call the target directly
    pub fn invoke(&self, args: &[Variant]) -> Result<()> {
        match &self.0.target {
            Target::Callback(callback) => callback(args),
            Target::ClassMethod { class_type, offset } => {
                let callback = Self::class_callback(args, *class_type, *offset)?;
                callback(args)
            }
            Target::Forward { signal } => {
                let receiver = receiver_of(args)?;
                emit_vec(&receiver, &signal.as_str(), args[1..].to_vec())
            }
        }
    }

    fn class_callback(args: &[Variant], class_type: Type, offset: usize) -> Result<Callback> {
        let receiver = receiver_of(args)?;
        let class: Class = receiver.class_of().ok_or_else(|| {
            MetaError::invalid_operation(format!(
                "receiver #{} was already destroyed",
                receiver.id()
            ))
        })?;
        let view = class.cast(class_type)?;
        view.slot::<Callback>(offset).ok_or_else(|| {
            MetaError::Unimplemented(format!(
                "no method in slot {offset} of '{class_type}' for receiver #{}",
                receiver.id()
            ))
        })
    }
}

fn receiver_of(args: &[Variant]) -> Result<crate::instance::Instance> {
    args.first()
        .and_then(Variant::as_instance)
        .cloned()
        .ok_or_else(|| MetaError::invalid_argument("closure called without a receiver in slot 0"))
}

impl Target {
    fn clone_target(&self) -> Target {
        match self {
            Target::Callback(callback) => Target::Callback(callback.clone()),
            Target::ClassMethod { class_type, offset } => Target::ClassMethod {
                class_type: *class_type,
                offset: *offset,
            },
            Target::Forward { signal } => Target::Forward { signal: *signal },
        }
    }
}

impl PartialEq for Closure {
    fn eq(&self, other: &Closure) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Closure {}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let target = match &self.0.target {
            Target::Callback(_) => "callback".to_string(),
            Target::ClassMethod { class_type, offset } => format!("{class_type}@{offset}"),
            Target::Forward { signal } => format!("forward:{signal}"),
        };
        f.debug_struct("Closure")
            .field("target", &target)
            .field("marshal", &self.marshal().is_some())
            .field("user_data", &self.0.user_data.is_some())
            .finish()
    }
}
