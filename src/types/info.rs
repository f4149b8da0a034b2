use super::Type;
use crate::class::Class;
use crate::error::Result;
use crate::instance::Instance;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Opaque per-type data handed to class initializers and finalizers
pub type ClassData = dyn Any + Send + Sync;

/// Runs once per ancestor level while a class is constructed, root first
pub type ClassInitFn = fn(&Class, Option<&ClassData>) -> Result<()>;

/// Runs once per ancestor level while a class is destructed, derived first
pub type ClassFinalFn = fn(&Class, Option<&ClassData>) -> Result<()>;

/// Runs once per ancestor level on a new instance, root first
pub type InstanceInitFn = fn(&Instance) -> Result<()>;

/// Places an interface's class block inside the implementing type's class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceEntry {
    pub interface: Type,
    /// Byte offset of the interface block within the public class block
    pub class_offset: usize,
}

/// Sizes, hooks and composition of a type
///
/// Derived types that leave a size at zero inherit the parent's.
#[derive(Clone, Default)]
pub struct TypeInfo {
    pub class_init: Option<ClassInitFn>,
    pub class_final: Option<ClassFinalFn>,
    pub class_size: usize,
    pub class_private_size: usize,
    pub class_data: Option<Arc<ClassData>>,
    pub interfaces: Vec<InterfaceEntry>,
    pub dependencies: Vec<Type>,
    pub instance_init: Option<InstanceInitFn>,
    pub instance_size: usize,
    pub instance_private_size: usize,
}

impl TypeInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_class_size(mut self, size: usize) -> Self {
        self.class_size = size;
        self
    }

    pub fn with_class_private_size(mut self, size: usize) -> Self {
        self.class_private_size = size;
        self
    }

    pub fn with_class_init(mut self, init: ClassInitFn) -> Self {
        self.class_init = Some(init);
        self
    }

    pub fn with_class_final(mut self, fini: ClassFinalFn) -> Self {
        self.class_final = Some(fini);
        self
    }

    pub fn with_class_data<T: Any + Send + Sync>(mut self, data: T) -> Self {
        self.class_data = Some(Arc::new(data));
        self
    }

    pub fn with_interface(mut self, interface: Type, class_offset: usize) -> Self {
        self.interfaces.push(InterfaceEntry {
            interface,
            class_offset,
        });
        self
    }

    pub fn with_dependency(mut self, dependency: Type) -> Self {
        self.dependencies.push(dependency);
        self
    }

    pub fn with_instance_size(mut self, size: usize) -> Self {
        self.instance_size = size;
        self
    }

    pub fn with_instance_private_size(mut self, size: usize) -> Self {
        self.instance_private_size = size;
        self
    }

    pub fn with_instance_init(mut self, init: InstanceInitFn) -> Self {
        self.instance_init = Some(init);
        self
    }
}

impl fmt::Debug for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeInfo")
            .field("class_size", &self.class_size)
            .field("class_private_size", &self.class_private_size)
            .field("class_init", &self.class_init.is_some())
            .field("class_final", &self.class_final.is_some())
            .field("class_data", &self.class_data.is_some())
            .field("interfaces", &self.interfaces)
            .field("dependencies", &self.dependencies)
            .field("instance_size", &self.instance_size)
            .field("instance_private_size", &self.instance_private_size)
            .field("instance_init", &self.instance_init.is_some())
            .finish()
    }
}
