//! Registry and query tests
//!
//! The registry is process-global and tests run in parallel, so every test
//! registers its own uniquely named types.

use super::*;
use crate::error::{context, ErrorKind};

fn object(name: &str) -> Type {
    register(
        name,
        Some(Builtin::Instance.ty()),
        TypeInfo::new()
            .with_class_size(CLASS_HEADER_SIZE + 16)
            .with_instance_size(INSTANCE_HEADER_SIZE + 8),
        TypeFlags::NONE,
    )
    .unwrap()
}

fn interface(name: &str, size: usize) -> Type {
    register(
        name,
        Some(Builtin::Interface.ty()),
        TypeInfo::new().with_class_size(size),
        TypeFlags::NONE,
    )
    .unwrap()
}

#[cfg(test)]
mod registration_tests {
    use super::*;

    #[test]
    fn test_builtins_present() {
        for builtin in Builtin::ALL {
            let ty = builtin.ty();
            assert!(ty.is_valid());
            assert_eq!(find(builtin.name()), Some(ty));
            assert!(ty.has_flags(TypeFlags::BUILTIN));
            assert_eq!(Builtin::from_type(ty), Some(builtin));
        }
        assert!(Builtin::Instance.ty().has_flags(TypeFlags::INSTANTIABLE | TypeFlags::CLASSED));
        assert!(Builtin::Interface.ty().has_flags(TypeFlags::UNMAPPABLE | TypeFlags::DEPENDENT));
    }

    #[test]
    fn test_register_and_find() {
        let ty = object("reg.Widget");
        assert_eq!(find("reg.Widget"), Some(ty));
        assert_eq!(ty.name().as_deref(), Some("reg.Widget"));
        assert_eq!(ty.parent(), Some(Builtin::Instance.ty()));
        assert_eq!(ty.to_string(), "reg.Widget");
        assert!(all().contains(&ty));
        assert!(count() >= Builtin::ALL.len() + 1);
        assert_eq!(find("reg.Missing"), None);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let first = object("reg.Dup");
        let err = register(
            "reg.Dup",
            Some(Builtin::Instance.ty()),
            TypeInfo::new(),
            TypeFlags::NONE,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateRegistration);
        assert_eq!(find("reg.Dup"), Some(first));
        assert_eq!(
            context::last_error().unwrap().error.kind(),
            ErrorKind::DuplicateRegistration
        );
    }

    #[test]
    fn test_empty_name_rejected() {
        let err = register("", None, TypeInfo::new(), TypeFlags::NONE).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_root_flags_implied_by_sizes() {
        let ty = register(
            "reg.RootObject",
            None,
            TypeInfo::new()
                .with_class_size(CLASS_HEADER_SIZE)
                .with_instance_size(INSTANCE_HEADER_SIZE),
            TypeFlags::CLASS_PREINIT,
        )
        .unwrap();
        assert!(ty.has_flags(
            TypeFlags::CLASSED | TypeFlags::INSTANTIABLE | TypeFlags::CLASS_PINNED
        ));
        // Preinit holds the default class from registration on
        assert_eq!(ty.class_ref_count(), 1);
    }

    #[test]
    fn test_derived_inherits_root_flags_and_sizes() {
        let base = object("reg.Base");
        let derived = register("reg.Derived", Some(base), TypeInfo::new(), TypeFlags::NONE).unwrap();
        assert!(derived.has_flags(TypeFlags::INSTANTIABLE | TypeFlags::DEEP_DERIVABLE));
        assert_eq!(derived.class_size(), base.class_size());
        assert_eq!(derived.instance_size(), base.instance_size());
    }

    #[test]
    fn test_invalid_parents() {
        let unknown = Type::from_raw(u64::MAX).unwrap();
        let err = register("reg.Orphan", Some(unknown), TypeInfo::new(), TypeFlags::NONE).unwrap_err();
        assert!(matches!(err, crate::error::MetaError::InvalidParent { .. }));

        let final_ty = register(
            "reg.Sealed",
            Some(Builtin::Instance.ty()),
            TypeInfo::new(),
            TypeFlags::FINAL,
        )
        .unwrap();
        let err = register("reg.FromSealed", Some(final_ty), TypeInfo::new(), TypeFlags::NONE).unwrap_err();
        assert!(matches!(err, crate::error::MetaError::InvalidParent { .. }));

        // Shallow-derivable root allows one level only
        let shallow = register(
            "reg.Shallow",
            None,
            TypeInfo::new().with_class_size(CLASS_HEADER_SIZE),
            TypeFlags::DERIVABLE,
        )
        .unwrap();
        let child = register("reg.ShallowChild", Some(shallow), TypeInfo::new(), TypeFlags::NONE).unwrap();
        let err = register("reg.ShallowGrandchild", Some(child), TypeInfo::new(), TypeFlags::NONE).unwrap_err();
        assert!(matches!(err, crate::error::MetaError::InvalidParent { .. }));

        let err = register("reg.FromNil", Some(Builtin::Nil.ty()), TypeInfo::new(), TypeFlags::NONE).unwrap_err();
        assert!(matches!(err, crate::error::MetaError::InvalidParent { .. }));
    }

    #[test]
    fn test_invalid_type_info() {
        let instance = Some(Builtin::Instance.ty());
        let cases = [
            ("reg.BadFund", instance, TypeInfo::new(), TypeFlags::CLASSED),
            (
                "reg.SmallClass",
                None,
                TypeInfo::new().with_class_size(1),
                TypeFlags::CLASSED,
            ),
            (
                "reg.PinnedPlain",
                None,
                TypeInfo::new(),
                TypeFlags::CLASS_PINNED,
            ),
            (
                "reg.IfaceInstance",
                None,
                TypeInfo::new()
                    .with_class_size(INTERFACE_HEADER_SIZE)
                    .with_instance_size(INSTANCE_HEADER_SIZE),
                TypeFlags::INTERFACED,
            ),
            (
                "reg.ShrunkClass",
                instance,
                TypeInfo::new().with_class_size(CLASS_HEADER_SIZE).with_instance_size(1),
                TypeFlags::NONE,
            ),
            (
                "reg.StaticWithInstance",
                Some(Builtin::StaticClass.ty()),
                TypeInfo::new().with_instance_size(INSTANCE_HEADER_SIZE),
                TypeFlags::NONE,
            ),
        ];

        for (name, parent, info, flags) in cases {
            let err = register(name, parent, info, flags).unwrap_err();
            assert!(
                matches!(err, crate::error::MetaError::InvalidTypeInfo { .. }),
                "{name}: {err}"
            );
            assert_eq!(find(name), None);
        }
    }

    #[test]
    fn test_private_size_overflow() {
        let base = register(
            "reg.PrivateBase",
            Some(Builtin::Instance.ty()),
            TypeInfo::new()
                .with_class_size(CLASS_HEADER_SIZE)
                .with_instance_size(INSTANCE_HEADER_SIZE)
                .with_class_private_size(8)
                .with_instance_private_size(8),
            TypeFlags::NONE,
        )
        .unwrap();
        assert_eq!(base.class_private_size(), 8);

        let cases = [
            ("reg.ClassPrivateOverflow", TypeInfo::new().with_class_private_size(usize::MAX)),
            (
                "reg.InstancePrivateOverflow",
                TypeInfo::new().with_instance_private_size(usize::MAX),
            ),
        ];
        for (name, info) in cases {
            let err = register(name, Some(base), info, TypeFlags::NONE).unwrap_err();
            assert!(
                matches!(err, crate::error::MetaError::InvalidTypeInfo { .. }),
                "{name}: {err}"
            );
            assert_eq!(find(name), None);
        }
    }

    #[test]
    fn test_fundamental_flags_split() {
        let flags = TypeFlags::CLASSED | TypeFlags::DEEP_DERIVABLE | TypeFlags::FINAL;
        assert_eq!(
            flags.fundamental(),
            TypeFlags::CLASSED | TypeFlags::DEEP_DERIVABLE
        );
        assert!(TypeFlags::NONE.fundamental().is_empty());
        assert!(TypeFlags::FUNDAMENTAL_MASK.contains(TypeFlags::DEPENDENT));
        assert!(!TypeFlags::FUNDAMENTAL_MASK.intersects(TypeFlags::UNMAPPABLE));
        assert_eq!(format!("{:?}", TypeFlags::FINAL), "TypeFlags(FINAL)");
    }

    #[test]
    fn test_unregister() {
        let ty = object("reg.Temporary");
        unregister(ty).unwrap();
        assert!(!ty.is_valid());
        assert_eq!(find("reg.Temporary"), None);
        assert_eq!(unregister(ty).unwrap_err().kind(), ErrorKind::InvalidArgument);

        // Handles are never reused
        let again = object("reg.Temporary");
        assert_ne!(again, ty);
    }

    #[test]
    fn test_unregister_refused_while_used() {
        let base = object("reg.UsedBase");
        let child = object_child(base, "reg.UsedChild");
        assert_eq!(unregister(base).unwrap_err().kind(), ErrorKind::InvalidOperation);
        unregister(child).unwrap();
        unregister(base).unwrap();

        assert_eq!(
            unregister(Builtin::Int.ty()).unwrap_err().kind(),
            ErrorKind::InvalidOperation
        );
    }

    fn object_child(parent: Type, name: &str) -> Type {
        register(name, Some(parent), TypeInfo::new(), TypeFlags::NONE).unwrap()
    }
}

#[cfg(test)]
mod interface_map_tests {
    use super::*;

    #[test]
    fn test_maps_and_check() {
        let drawable = interface("map.Drawable", INTERFACE_HEADER_SIZE + 8);
        let shape = register(
            "map.Shape",
            Some(Builtin::Instance.ty()),
            TypeInfo::new()
                .with_class_size(64)
                .with_instance_size(16)
                .with_interface(drawable, 32),
            TypeFlags::NONE,
        )
        .unwrap();

        assert!(shape.maps(drawable));
        assert!(shape.check(drawable));
        assert!(shape.implements(drawable));
        assert!(!shape.derives(drawable));
        assert!(!drawable.check(shape));

        // Interface root is unmappable
        assert!(!shape.maps(Builtin::Interface.ty()));
        assert!(!shape.check(Builtin::Interface.ty()));

        let circle = register("map.Circle", Some(shape), TypeInfo::new(), TypeFlags::NONE).unwrap();
        assert!(circle.maps(drawable));
        assert!(circle.check(drawable));
    }

    #[test]
    fn test_rejected_maps() {
        let a = interface("map.A", INTERFACE_HEADER_SIZE + 8);
        let b = interface("map.B", INTERFACE_HEADER_SIZE + 8);
        let instance = Some(Builtin::Instance.ty());
        let reg = |name: &str, info: TypeInfo| register(name, instance, info, TypeFlags::NONE);

        // Past the end
        assert!(reg("map.PastEnd", TypeInfo::new().with_class_size(32).with_interface(a, 24)).is_err());
        // Inside the parent's class block
        assert!(reg("map.InHeader", TypeInfo::new().with_class_size(64).with_interface(a, 0)).is_err());
        // Overlapping
        assert!(reg(
            "map.Overlap",
            TypeInfo::new().with_class_size(128).with_interface(a, 32).with_interface(b, 40)
        )
        .is_err());
        // Duplicate
        assert!(reg(
            "map.Twice",
            TypeInfo::new().with_class_size(128).with_interface(a, 32).with_interface(a, 64)
        )
        .is_err());
        // Not an interface
        assert!(reg(
            "map.NotIface",
            TypeInfo::new().with_class_size(64).with_interface(Builtin::Instance.ty(), 32)
        )
        .is_err());

        // Offset plus size wraps
        let err = reg(
            "map.Wrapped",
            TypeInfo::new().with_class_size(64).with_interface(a, usize::MAX - 4),
        )
        .unwrap_err();
        assert!(matches!(err, crate::error::MetaError::InvalidTypeInfo { .. }));
        assert_eq!(find("map.Wrapped"), None);

        // Already reachable through the parent
        let parent = reg("map.Parent", TypeInfo::new().with_class_size(64).with_interface(a, 32)).unwrap();
        let err = register(
            "map.Again",
            Some(parent),
            TypeInfo::new().with_class_size(128).with_interface(a, 64),
            TypeFlags::NONE,
        )
        .unwrap_err();
        assert!(matches!(err, crate::error::MetaError::InvalidTypeInfo { .. }));

        // Disjoint maps are fine
        assert!(reg(
            "map.Both",
            TypeInfo::new().with_class_size(128).with_interface(a, 32).with_interface(b, 64)
        )
        .is_ok());
    }

    #[test]
    fn test_interface_dependencies() {
        let base = object("dep.Base");
        let needs_base = register(
            "dep.NeedsBase",
            Some(Builtin::Interface.ty()),
            TypeInfo::new()
                .with_class_size(INTERFACE_HEADER_SIZE)
                .with_dependency(base),
            TypeFlags::NONE,
        )
        .unwrap();
        assert!(needs_base.depends(base));

        let derived = register(
            "dep.Derived",
            Some(base),
            TypeInfo::new().with_class_size(128).with_interface(needs_base, 64),
            TypeFlags::NONE,
        )
        .unwrap();
        assert!(derived.conforms(needs_base));

        let unrelated = register(
            "dep.Unrelated",
            Some(Builtin::Instance.ty()),
            TypeInfo::new().with_class_size(128).with_interface(needs_base, 64),
            TypeFlags::NONE,
        );
        assert!(unrelated.is_err());
    }
}

#[cfg(test)]
mod query_tests {
    use super::*;

    #[test]
    fn test_reflexive_check_strict_derives() {
        let ty = object("query.Self");
        assert!(ty.check(ty));
        assert!(!ty.derives(ty));
        assert!(ty.implements(ty));
        assert!(ty.derives(Builtin::Instance.ty()));
        assert!(!Builtin::Instance.ty().derives(ty));
    }

    #[test]
    fn test_ancestor_walk() {
        let a = object("query.A");
        let b = register("query.B", Some(a), TypeInfo::new(), TypeFlags::NONE).unwrap();
        let c = register("query.C", Some(b), TypeInfo::new(), TypeFlags::NONE).unwrap();

        let depth = c.depth().unwrap();
        assert_eq!(depth, 3);
        assert_eq!(c.ancestor(depth), Some(c));
        assert_eq!(c.ancestor(0), Some(Builtin::Instance.ty()));
        assert_eq!(c.root(), Some(Builtin::Instance.ty()));
        for k in 0..=depth {
            assert_eq!(c.ancestor(k).unwrap().depth(), Some(k));
        }
        assert_eq!(c.ancestor(depth + 1), None);
        assert_eq!(
            context::last_error().unwrap().error.kind(),
            ErrorKind::OutOfRange
        );
    }

    #[test]
    fn test_common_is_nearest() {
        let shape = object("common.Shape");
        let round = register("common.Round", Some(shape), TypeInfo::new(), TypeFlags::NONE).unwrap();
        let circle = register("common.Circle", Some(round), TypeInfo::new(), TypeFlags::NONE).unwrap();
        let oval = register("common.Oval", Some(round), TypeInfo::new(), TypeFlags::NONE).unwrap();
        let square = register("common.Square", Some(shape), TypeInfo::new(), TypeFlags::NONE).unwrap();

        assert_eq!(circle.common(oval), Some(round));
        assert_eq!(circle.common(square), Some(shape));
        assert_eq!(circle.common(circle), Some(circle));
        assert_eq!(circle.common(Builtin::Int.ty()), None);
    }

    #[test]
    fn test_invalid_handle_queries_degrade() {
        let bogus = Type::from_raw(u64::MAX - 1).unwrap();
        context::clear();
        assert_eq!(bogus.name(), None);
        assert_eq!(bogus.depth(), None);
        assert_eq!(bogus.flags(), TypeFlags::NONE);
        assert!(!bogus.check(Builtin::Instance.ty()));
        assert_eq!(
            context::last_error().unwrap().error.kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(format!("{bogus}"), format!("<invalid type #{}>", u64::MAX - 1));
    }
}

#[cfg(test)]
mod concurrency_tests {
    use super::*;
    use parking_lot::RwLock;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;

    const CHAIN: usize = 48;

    #[test]
    fn test_queries_while_registering() {
        let root = object("conc.Root");
        let published: Arc<RwLock<Vec<Type>>> = Arc::new(RwLock::new(vec![root]));
        let done = Arc::new(AtomicBool::new(false));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let published = published.clone();
                let done = done.clone();
                thread::spawn(move || {
                    let mut rounds = 0usize;
                    while !done.load(Ordering::Acquire) || rounds == 0 {
                        let chain = published.read().clone();
                        let base_depth = root.depth().unwrap();
                        for (k, ty) in chain.iter().enumerate() {
                            assert_eq!(ty.depth(), Some(base_depth + k));
                            assert_eq!(ty.ancestor(base_depth), Some(root));
                            assert!(ty.check(root));
                            assert_eq!(ty.derives(root), k > 0);
                            assert!(!root.derives(*ty));
                            assert_eq!(find(&ty.name().unwrap()), Some(*ty));
                            if k > 0 {
                                assert_eq!(ty.parent(), Some(chain[k - 1]));
                            }
                        }
                        rounds += 1;
                    }
                    rounds
                })
            })
            .collect();

        let mut parent = root;
        for level in 1..=CHAIN {
            let ty = register(
                &format!("conc.Level{level}"),
                Some(parent),
                TypeInfo::new(),
                TypeFlags::NONE,
            )
            .unwrap();
            published.write().push(ty);
            parent = ty;
        }
        done.store(true, Ordering::Release);

        for reader in readers {
            assert!(reader.join().unwrap() > 0);
        }
        assert_eq!(parent.depth(), Some(root.depth().unwrap() + CHAIN));
    }
}
