//! Tagged argument values carried through signal emission
//!
//! Only what emission needs: copy is `Clone`, move is a Rust move, destruct is
//! `Drop`. Conversions between kinds are deliberately absent.

use crate::instance::Instance;
use crate::types::{Builtin, Type};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// One signal argument
#[derive(Clone, Default)]
pub enum Variant {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(Arc<str>),
    Type(Type),
    Instance(Instance),
    Pointer(Arc<dyn Any + Send + Sync>),
}

impl Variant {
    /// Wrap an arbitrary shared value
    pub fn pointer<T: Any + Send + Sync>(value: T) -> Variant {
        Variant::Pointer(Arc::new(value))
    }

    /// Type used to check this value against a signal's declared arguments
    pub fn type_of(&self) -> Type {
        match self {
            Variant::Nil => Builtin::Nil.ty(),
            Variant::Bool(_) => Builtin::Bool.ty(),
            Variant::Int(_) => Builtin::Int.ty(),
            Variant::UInt(_) => Builtin::UInt.ty(),
            Variant::Float(_) => Builtin::Float.ty(),
            Variant::Str(_) => Builtin::String.ty(),
            Variant::Type(_) => Builtin::Type.ty(),
            Variant::Instance(instance) => instance.type_of(),
            Variant::Pointer(_) => Builtin::Pointer.ty(),
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Variant::Nil)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Variant::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Variant::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_uint(&self) -> Option<u64> {
        match self {
            Variant::UInt(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Variant::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Variant::Str(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_type(&self) -> Option<Type> {
        match self {
            Variant::Type(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_instance(&self) -> Option<&Instance> {
        match self {
            Variant::Instance(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_pointer<T: Any>(&self) -> Option<&T> {
        match self {
            Variant::Pointer(value) => value.downcast_ref::<T>(),
            _ => None,
        }
    }
}

impl fmt::Debug for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Nil => f.write_str("Nil"),
            Variant::Bool(v) => write!(f, "Bool({v})"),
            Variant::Int(v) => write!(f, "Int({v})"),
            Variant::UInt(v) => write!(f, "UInt({v})"),
            Variant::Float(v) => write!(f, "Float({v})"),
            Variant::Str(v) => write!(f, "Str({v:?})"),
            Variant::Type(v) => write!(f, "Type({v})"),
            Variant::Instance(v) => write!(f, "Instance(#{})", v.id()),
            Variant::Pointer(v) => write!(f, "Pointer({:p})", Arc::as_ptr(v)),
        }
    }
}

impl PartialEq for Variant {
    fn eq(&self, other: &Variant) -> bool {
        match (self, other) {
            (Variant::Nil, Variant::Nil) => true,
            (Variant::Bool(a), Variant::Bool(b)) => a == b,
            (Variant::Int(a), Variant::Int(b)) => a == b,
            (Variant::UInt(a), Variant::UInt(b)) => a == b,
            (Variant::Float(a), Variant::Float(b)) => a == b,
            (Variant::Str(a), Variant::Str(b)) => a == b,
            (Variant::Type(a), Variant::Type(b)) => a == b,
            (Variant::Instance(a), Variant::Instance(b)) => a == b,
            (Variant::Pointer(a), Variant::Pointer(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

macro_rules! variant_from {
    ($($source:ty => $kind:ident as $target:ty),* $(,)?) => {
        $(
            impl From<$source> for Variant {
                fn from(value: $source) -> Variant {
                    Variant::$kind(<$target>::from(value))
                }
            }
        )*
    };
}

variant_from! {
    bool => Bool as bool,
    i8 => Int as i64,
    i16 => Int as i64,
    i32 => Int as i64,
    i64 => Int as i64,
    u8 => UInt as u64,
    u16 => UInt as u64,
    u32 => UInt as u64,
    u64 => UInt as u64,
    f32 => Float as f64,
    f64 => Float as f64,
    &str => Str as Arc<str>,
    String => Str as Arc<str>,
    Arc<str> => Str as Arc<str>,
    Type => Type as Type,
    Instance => Instance as Instance,
}

impl From<&Instance> for Variant {
    fn from(value: &Instance) -> Variant {
        Variant::Instance(value.clone())
    }
}

impl From<Builtin> for Variant {
    fn from(value: Builtin) -> Variant {
        Variant::Type(value.ty())
    }
}

impl From<()> for Variant {
    fn from(_: ()) -> Variant {
        Variant::Nil
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_of_builtin_kinds() {
        assert_eq!(Variant::Nil.type_of(), Builtin::Nil.ty());
        assert_eq!(Variant::from(true).type_of(), Builtin::Bool.ty());
        assert_eq!(Variant::from(42).type_of(), Builtin::Int.ty());
        assert_eq!(Variant::from(7u32).type_of(), Builtin::UInt.ty());
        assert_eq!(Variant::from(1.5).type_of(), Builtin::Float.ty());
        assert_eq!(Variant::from("text").type_of(), Builtin::String.ty());
        assert_eq!(Variant::from(Builtin::Int).type_of(), Builtin::Type.ty());
        assert_eq!(Variant::pointer(5u8).type_of(), Builtin::Pointer.ty());
    }

    #[test]
    fn test_accessors() {
        assert_eq!(Variant::from(-3i8).as_int(), Some(-3));
        assert_eq!(Variant::from(-3i8).as_uint(), None);
        assert_eq!(Variant::from("abc").as_str(), Some("abc"));
        assert_eq!(Variant::from(Builtin::Bool).as_type(), Some(Builtin::Bool.ty()));
        assert!(Variant::from(()).is_nil());

        let pointer = Variant::pointer(vec![1, 2, 3]);
        assert_eq!(pointer.as_pointer::<Vec<i32>>(), Some(&vec![1, 2, 3]));
        assert_eq!(pointer.as_pointer::<String>(), None);
    }

    #[test]
    fn test_equality() {
        assert_eq!(Variant::from(1), Variant::Int(1));
        assert_ne!(Variant::from(1), Variant::UInt(1));
        let pointer = Variant::pointer(1u8);
        assert_eq!(pointer.clone(), pointer);
        assert_ne!(Variant::pointer(1u8), Variant::pointer(1u8));
    }
}
