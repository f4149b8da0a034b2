//! metatype - runtime type system with classes, interfaces and signals
//!
//! Types are registered at runtime under unique names and form single
//! inheritance trees. Classed types get a reference-counted default class
//! (their vtable and static storage), may embed interface classes, and may be
//! instantiated. Instances emit named signals to connected closures.
//!
//! ```no_run
//! use metatype::{signal, Builtin, Instance, TypeFlags, TypeInfo, CLASS_HEADER_SIZE};
//!
//! metatype::init();
//! let shape = metatype::register(
//!     "Shape",
//!     Some(Builtin::Instance.ty()),
//!     TypeInfo::new().with_class_size(CLASS_HEADER_SIZE).with_instance_size(8),
//!     TypeFlags::NONE,
//! )?;
//! signal::install(shape, "resized", None, &[Builtin::Int.ty()])?;
//!
//! let a = Instance::create(shape)?;
//! let b = Instance::create(shape)?;
//! signal::connect(&a, "resized", &b, |args| {
//!     println!("resized to {:?}", args[1]);
//!     Ok(())
//! })?;
//! metatype::emit!(a, "resized", 42)?;
//! # Ok::<(), metatype::MetaError>(())
//! ```

pub mod allocator;
pub mod class;
pub mod config;
pub mod error;
pub mod instance;
pub mod interface;
pub mod intern;
pub mod logging;
pub mod signal;
pub mod types;
pub mod variant;

pub use class::{Class, ClassStorage};
pub use config::Config;
pub use error::{ErrorKind, MetaError, Result, ResultExt};
pub use instance::{Instance, InstanceStorage};
pub use interface::InterfaceRecord;
pub use intern::Quark;
pub use signal::{Callback, Closure, Marshal};
pub use types::{
    register, unregister, Builtin, ClassData, InterfaceEntry, Type, TypeFlags, TypeInfo,
    CLASS_HEADER_SIZE, INSTANCE_HEADER_SIZE, INTERFACE_HEADER_SIZE,
};
pub use variant::Variant;

/// Initialise with the configuration found by [`Config::discover`]
pub fn init() {
    init_with_config(Config::discover());
}

/// Initialise logging and the builtin types
///
/// The configuration only takes effect for state not created yet, so call
/// this before registering anything.
pub fn init_with_config(config: Config) {
    logging::init_with_config(config.logging.to_log_config().with_env_overrides());
    config::set_active(config);
    types::registry::ensure_initialized();
}

/// Drop every connection, signal, class and registered type
///
/// Outstanding handles stop resolving. The next registry access
/// re-registers the builtin types.
pub fn shutdown() {
    signal::clear();
    types::registry::shutdown();
}
