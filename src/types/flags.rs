bitflags::bitflags! {
    /// Capability and behaviour flags of a registered type
    ///
    /// The fundamental (root) flags are only accepted on root registrations and
    /// are inherited by every type derived from that root.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TypeFlags: u32 {
        // Fundamental
        const CLASSED = 1 << 0;
        const INTERFACED = 1 << 1;
        const INSTANTIABLE = 1 << 2;
        const DERIVABLE = 1 << 3;
        const DEEP_DERIVABLE = 1 << 4;
        const DEPENDENT = 1 << 5;

        // Per type
        const ABSTRACT = 1 << 8;
        const FINAL = 1 << 9;
        const BUILTIN = 1 << 10;
        const CLASS_PINNED = 1 << 11;
        const CLASS_PREINIT = 1 << 12;
        const UNMAPPABLE = 1 << 13;
    }
}

impl TypeFlags {
    pub const NONE: TypeFlags = TypeFlags::empty();

    pub const FUNDAMENTAL_MASK: TypeFlags = TypeFlags::CLASSED
        .union(TypeFlags::INTERFACED)
        .union(TypeFlags::INSTANTIABLE)
        .union(TypeFlags::DERIVABLE)
        .union(TypeFlags::DEEP_DERIVABLE)
        .union(TypeFlags::DEPENDENT);

    /// Flags only a root registration may declare
    #[inline]
    pub const fn fundamental(self) -> TypeFlags {
        self.intersection(Self::FUNDAMENTAL_MASK)
    }
}
