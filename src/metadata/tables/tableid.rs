use strum::{EnumCount, EnumIter, FromRepr};

/// Identifiers of the metadata tables of ECMA-335 II.22 and of the Portable PDB format.
///
/// The discriminant is the table number used in tokens and in the `Valid` bit vector of the
/// tables stream header. Tables `0x30` to `0x37` only appear in Portable PDB files.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord, EnumIter, EnumCount, FromRepr)]
#[repr(u8)]
pub enum TableId {
    /// `Module`, the single row describing this module
    Module = 0x00,
    /// `TypeRef`, references to types of other scopes
    TypeRef = 0x01,
    /// `TypeDef`, types declared by this module
    TypeDef = 0x02,
    /// `FieldPtr`, indirection used by unoptimized metadata
    FieldPtr = 0x03,
    /// `Field`
    Field = 0x04,
    /// `MethodPtr`, indirection used by unoptimized metadata
    MethodPtr = 0x05,
    /// `MethodDef`
    MethodDef = 0x06,
    /// `ParamPtr`, indirection used by unoptimized metadata
    ParamPtr = 0x07,
    /// `Param`
    Param = 0x08,
    /// `InterfaceImpl`
    InterfaceImpl = 0x09,
    /// `MemberRef`, references to fields and methods through a parent
    MemberRef = 0x0A,
    /// `Constant`
    Constant = 0x0B,
    /// `CustomAttribute`
    CustomAttribute = 0x0C,
    /// `FieldMarshal`
    FieldMarshal = 0x0D,
    /// `DeclSecurity`
    DeclSecurity = 0x0E,
    /// `ClassLayout`
    ClassLayout = 0x0F,
    /// `FieldLayout`
    FieldLayout = 0x10,
    /// `StandAloneSig`, local variable and call-site signatures
    StandAloneSig = 0x11,
    /// `EventMap`
    EventMap = 0x12,
    /// `EventPtr`, indirection used by unoptimized metadata
    EventPtr = 0x13,
    /// `Event`
    Event = 0x14,
    /// `PropertyMap`, owner type to property range
    PropertyMap = 0x15,
    /// `PropertyPtr`, indirection used by unoptimized metadata
    PropertyPtr = 0x16,
    /// `Property`
    Property = 0x17,
    /// `MethodSemantics`, accessor methods of properties and events
    MethodSemantics = 0x18,
    /// `MethodImpl`
    MethodImpl = 0x19,
    /// `ModuleRef`
    ModuleRef = 0x1A,
    /// `TypeSpec`, constructed types such as generic instantiations
    TypeSpec = 0x1B,
    /// `ImplMap`
    ImplMap = 0x1C,
    /// `FieldRVA`
    FieldRVA = 0x1D,
    /// `EncLog`
    EncLog = 0x1E,
    /// `EncMap`
    EncMap = 0x1F,
    /// `Assembly`
    Assembly = 0x20,
    /// `AssemblyProcessor`
    AssemblyProcessor = 0x21,
    /// `AssemblyOS`
    AssemblyOS = 0x22,
    /// `AssemblyRef`
    AssemblyRef = 0x23,
    /// `AssemblyRefProcessor`
    AssemblyRefProcessor = 0x24,
    /// `AssemblyRefOS`
    AssemblyRefOS = 0x25,
    /// `File`
    File = 0x26,
    /// `ExportedType`
    ExportedType = 0x27,
    /// `ManifestResource`
    ManifestResource = 0x28,
    /// `NestedClass`
    NestedClass = 0x29,
    /// `GenericParam`
    GenericParam = 0x2A,
    /// `MethodSpec`
    MethodSpec = 0x2B,
    /// `GenericParamConstraint`
    GenericParamConstraint = 0x2C,
    /// `Document` (Portable PDB)
    Document = 0x30,
    /// `MethodDebugInformation` (Portable PDB), one row per `MethodDef`
    MethodDebugInformation = 0x31,
    /// `LocalScope` (Portable PDB)
    LocalScope = 0x32,
    /// `LocalVariable` (Portable PDB)
    LocalVariable = 0x33,
    /// `LocalConstant` (Portable PDB)
    LocalConstant = 0x34,
    /// `ImportScope` (Portable PDB)
    ImportScope = 0x35,
    /// `StateMachineMethod` (Portable PDB)
    StateMachineMethod = 0x36,
    /// `CustomDebugInformation` (Portable PDB)
    CustomDebugInformation = 0x37,
}

impl TableId {
    /// `true` for tables that belong to the type system and may be referenced from a
    /// Portable PDB through its `#Pdb` row counts.
    #[must_use]
    pub fn is_type_system(self) -> bool {
        (self as u8) < 0x30
    }
}
