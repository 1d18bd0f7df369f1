//! Flag sets used when inspecting and rewriting members.

use bitflags::bitflags;

bitflags! {
    #[derive(PartialEq, Eq, Debug, Clone, Copy)]
    /// Method body header flags (ECMA-335 II.25.4.1)
    pub struct MethodBodyFlags: u16 {
        /// Tiny header, code size in the upper six bits of the single header byte
        const TINY_FORMAT = 0x2;
        /// Fat header of three dwords
        const FAT_FORMAT = 0x3;
        /// Data sections follow the code
        const MORE_SECTS = 0x8;
        /// Locals are zero-initialized on entry
        const INIT_LOCALS = 0x10;
    }
}

bitflags! {
    #[derive(PartialEq, Eq, Debug, Clone, Copy)]
    /// The subset of `MethodAttributes` the weaver inspects (ECMA-335 II.23.1.10)
    pub struct MethodModifiers: u32 {
        /// Defined on the type rather than per instance
        const STATIC = 0x0010;
        /// Has no body
        const ABSTRACT = 0x0400;
        /// Implemented through platform invoke
        const PINVOKE_IMPL = 0x2000;
    }
}

bitflags! {
    #[derive(PartialEq, Eq, Debug, Clone, Copy)]
    /// The subset of `FieldAttributes` the weaver inspects (ECMA-335 II.23.1.5)
    pub struct FieldModifiers: u32 {
        /// Defined on the type rather than per instance
        const STATIC = 0x0010;
        /// Compile-time constant
        const LITERAL = 0x0040;
    }
}

bitflags! {
    #[derive(PartialEq, Eq, Debug, Clone, Copy)]
    /// `MethodSemanticsAttributes` (ECMA-335 II.23.1.12)
    pub struct MethodSemanticsFlags: u32 {
        /// Property setter
        const SETTER = 0x0001;
        /// Property getter
        const GETTER = 0x0002;
        /// Other accessor
        const OTHER = 0x0004;
        /// Event add accessor
        const ADD_ON = 0x0008;
        /// Event remove accessor
        const REMOVE_ON = 0x0010;
        /// Event fire accessor
        const FIRE = 0x0020;
    }
}

bitflags! {
    #[derive(PartialEq, Eq, Debug, Clone, Copy)]
    /// `MethodImplAttributes` code type bits (ECMA-335 II.23.1.11)
    pub struct MethodImplCodeType: u32 {
        /// CIL
        const IL = 0x0000;
        /// Native code
        const NATIVE = 0x0001;
        /// Optimized CIL
        const OPTIL = 0x0002;
        /// Provided by the runtime
        const RUNTIME = 0x0003;
    }
}
