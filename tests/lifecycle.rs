//! Runs in its own process: `shutdown` clears global state other tests rely on

use metatype::signal;
use metatype::{Builtin, Class, Config, Instance, TypeFlags, TypeInfo};
use std::fs;

#[test]
fn test_init_and_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metatype.toml");
    fs::write(
        &path,
        "[signals]\ntable_capacity = 8\n\n[allocator]\nmax_block_size = 4096\n",
    )
    .unwrap();
    metatype::init_with_config(Config::load(&path).unwrap());
    assert_eq!(metatype::config::active().allocator.max_block_size, 4096);

    let builtins = metatype::types::count();
    assert_eq!(builtins, Builtin::ALL.len());

    let window = metatype::register(
        "Window",
        Some(Builtin::Instance.ty()),
        TypeInfo::new().with_class_size(32).with_instance_size(32),
        TypeFlags::NONE,
    )
    .unwrap();
    let too_big = metatype::register(
        "Huge",
        Some(Builtin::Instance.ty()),
        TypeInfo::new().with_class_size(32).with_instance_size(8192),
        TypeFlags::NONE,
    )
    .unwrap();
    assert_eq!(
        Instance::create(too_big).unwrap_err().kind(),
        metatype::ErrorKind::OutOfRange
    );

    signal::install(window, "closed", None, &[]).unwrap();
    let a = Instance::create(window).unwrap();
    let b = Instance::create(window).unwrap();
    signal::connect(&a, "closed", &b, |_| Ok(())).unwrap();
    let pinned = Class::reference_default(window).unwrap();
    assert_eq!(pinned.ref_count(), 3);

    metatype::shutdown();

    assert!(!window.is_valid());
    assert!(!pinned.is_alive());
    assert!(signal::find(window, "closed").is_none());
    assert_eq!(signal::connection_count(&a, None), 0);
    assert!(metatype::types::find("Window").is_none());

    // Builtins come back on the next access
    assert_eq!(metatype::types::count(), builtins);
    let again = metatype::register(
        "Window",
        Some(Builtin::Instance.ty()),
        TypeInfo::new().with_class_size(32).with_instance_size(32),
        TypeFlags::NONE,
    )
    .unwrap();
    assert_ne!(again, window);
    let c = Instance::create(again).unwrap();
    c.destroy().unwrap();
}
