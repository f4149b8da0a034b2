//! Types registered with the runtime itself

use super::{Type, TypeFlags, TypeInfo, CLASS_HEADER_SIZE, INSTANCE_HEADER_SIZE, INTERFACE_HEADER_SIZE};

/// Builtin types, available as soon as the registry is touched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    /// Root for dependency-only protocols
    Protocol,
    /// Root for classed, non-instantiable types
    StaticClass,
    /// Root for every interface
    Interface,
    /// Root for instantiable object types
    Instance,
    Nil,
    Bool,
    Int,
    UInt,
    Float,
    String,
    Type,
    Pointer,
}

impl Builtin {
    pub const ALL: [Builtin; 12] = [
        Builtin::Protocol,
        Builtin::StaticClass,
        Builtin::Interface,
        Builtin::Instance,
        Builtin::Nil,
        Builtin::Bool,
        Builtin::Int,
        Builtin::UInt,
        Builtin::Float,
        Builtin::String,
        Builtin::Type,
        Builtin::Pointer,
    ];

    /// Fixed handle of this builtin
    pub const fn ty(self) -> Type {
        let raw = match self {
            Builtin::Protocol => 1,
            Builtin::StaticClass => 2,
            Builtin::Interface => 3,
            Builtin::Instance => 4,
            Builtin::Nil => 5,
            Builtin::Bool => 6,
            Builtin::Int => 7,
            Builtin::UInt => 8,
            Builtin::Float => 9,
            Builtin::String => 10,
            Builtin::Type => 11,
            Builtin::Pointer => 12,
        };
        Type::builtin(raw)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Builtin::Protocol => "Protocol",
            Builtin::StaticClass => "StaticClass",
            Builtin::Interface => "Interface",
            Builtin::Instance => "Instance",
            Builtin::Nil => "nil",
            Builtin::Bool => "bool",
            Builtin::Int => "int",
            Builtin::UInt => "uint",
            Builtin::Float => "float",
            Builtin::String => "string",
            Builtin::Type => "type",
            Builtin::Pointer => "pointer",
        }
    }

    pub(crate) fn definition(self) -> (TypeInfo, TypeFlags) {
        match self {
            Builtin::Protocol => (
                TypeInfo::new(),
                TypeFlags::DEPENDENT | TypeFlags::DERIVABLE | TypeFlags::ABSTRACT | TypeFlags::BUILTIN,
            ),
            Builtin::StaticClass => (
                TypeInfo::new().with_class_size(CLASS_HEADER_SIZE),
                TypeFlags::CLASSED | TypeFlags::DEEP_DERIVABLE | TypeFlags::BUILTIN,
            ),
            Builtin::Interface => (
                TypeInfo::new().with_class_size(INTERFACE_HEADER_SIZE),
                TypeFlags::INTERFACED
                    | TypeFlags::DEEP_DERIVABLE
                    | TypeFlags::ABSTRACT
                    | TypeFlags::UNMAPPABLE
                    | TypeFlags::BUILTIN,
            ),
            Builtin::Instance => (
                TypeInfo::new()
                    .with_class_size(CLASS_HEADER_SIZE)
                    .with_instance_size(INSTANCE_HEADER_SIZE),
                TypeFlags::INSTANTIABLE | TypeFlags::DEEP_DERIVABLE | TypeFlags::BUILTIN,
            ),
            _ => (TypeInfo::new(), TypeFlags::BUILTIN),
        }
    }

    /// Builtin with the given handle, if any
    pub fn from_type(ty: Type) -> Option<Builtin> {
        Self::ALL.into_iter().find(|b| b.ty() == ty)
    }
}

impl From<Builtin> for Type {
    fn from(builtin: Builtin) -> Type {
        builtin.ty()
    }
}
