//! Column layouts of every metadata and Portable PDB table.
//!
//! Rows are stored generically as one `u32` per column; this module describes what each
//! column holds so [`crate::metadata::tables::TablesStream`] can size, read and write them.

use crate::metadata::tables::{CodedIndexType, TableId};

/// The storage class of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// A fixed 2-byte value
    U16,
    /// A fixed 4-byte value
    U32,
    /// An index into `#Strings`
    Strings,
    /// An index into `#GUID`
    Guid,
    /// An index into `#Blob`
    Blob,
    /// A simple index into another table
    Table(TableId),
    /// A coded index
    Coded(CodedIndexType),
}

/// A named column.
#[derive(Debug, Clone, Copy)]
pub struct Column {
    /// Column name as used in ECMA-335 II.22 and the Portable PDB documentation
    pub name: &'static str,
    /// Storage class
    pub kind: ColumnKind,
}

macro_rules! col {
    ($name:literal, $kind:expr) => {
        Column {
            name: $name,
            kind: $kind,
        }
    };
}

use ColumnKind::{Blob, Coded, Guid, Strings, Table, U16, U32};
use CodedIndexType as C;
use TableId as T;

/// Returns the columns of `table` in on-disk order.
#[must_use]
pub fn columns(table: TableId) -> &'static [Column] {
    match table {
        T::Module => &[
            col!("Generation", U16),
            col!("Name", Strings),
            col!("Mvid", Guid),
            col!("EncId", Guid),
            col!("EncBaseId", Guid),
        ],
        T::TypeRef => &[
            col!("ResolutionScope", Coded(C::ResolutionScope)),
            col!("TypeName", Strings),
            col!("TypeNamespace", Strings),
        ],
        T::TypeDef => &[
            col!("Flags", U32),
            col!("TypeName", Strings),
            col!("TypeNamespace", Strings),
            col!("Extends", Coded(C::TypeDefOrRef)),
            col!("FieldList", Table(T::Field)),
            col!("MethodList", Table(T::MethodDef)),
        ],
        T::FieldPtr => &[col!("Field", Table(T::Field))],
        T::Field => &[
            col!("Flags", U16),
            col!("Name", Strings),
            col!("Signature", Blob),
        ],
        T::MethodPtr => &[col!("Method", Table(T::MethodDef))],
        T::MethodDef => &[
            col!("RVA", U32),
            col!("ImplFlags", U16),
            col!("Flags", U16),
            col!("Name", Strings),
            col!("Signature", Blob),
            col!("ParamList", Table(T::Param)),
        ],
        T::ParamPtr => &[col!("Param", Table(T::Param))],
        T::Param => &[
            col!("Flags", U16),
            col!("Sequence", U16),
            col!("Name", Strings),
        ],
        T::InterfaceImpl => &[
            col!("Class", Table(T::TypeDef)),
            col!("Interface", Coded(C::TypeDefOrRef)),
        ],
        T::MemberRef => &[
            col!("Class", Coded(C::MemberRefParent)),
            col!("Name", Strings),
            col!("Signature", Blob),
        ],
        // Type is a single byte followed by a padding byte
        T::Constant => &[
            col!("Type", U16),
            col!("Parent", Coded(C::HasConstant)),
            col!("Value", Blob),
        ],
        T::CustomAttribute => &[
            col!("Parent", Coded(C::HasCustomAttribute)),
            col!("Type", Coded(C::CustomAttributeType)),
            col!("Value", Blob),
        ],
        T::FieldMarshal => &[
            col!("Parent", Coded(C::HasFieldMarshal)),
            col!("NativeType", Blob),
        ],
        T::DeclSecurity => &[
            col!("Action", U16),
            col!("Parent", Coded(C::HasDeclSecurity)),
            col!("PermissionSet", Blob),
        ],
        T::ClassLayout => &[
            col!("PackingSize", U16),
            col!("ClassSize", U32),
            col!("Parent", Table(T::TypeDef)),
        ],
        T::FieldLayout => &[col!("Offset", U32), col!("Field", Table(T::Field))],
        T::StandAloneSig => &[col!("Signature", Blob)],
        T::EventMap => &[
            col!("Parent", Table(T::TypeDef)),
            col!("EventList", Table(T::Event)),
        ],
        T::EventPtr => &[col!("Event", Table(T::Event))],
        T::Event => &[
            col!("EventFlags", U16),
            col!("Name", Strings),
            col!("EventType", Coded(C::TypeDefOrRef)),
        ],
        T::PropertyMap => &[
            col!("Parent", Table(T::TypeDef)),
            col!("PropertyList", Table(T::Property)),
        ],
        T::PropertyPtr => &[col!("Property", Table(T::Property))],
        T::Property => &[col!("Flags", U16), col!("Name", Strings), col!("Type", Blob)],
        T::MethodSemantics => &[
            col!("Semantics", U16),
            col!("Method", Table(T::MethodDef)),
            col!("Association", Coded(C::HasSemantics)),
        ],
        T::MethodImpl => &[
            col!("Class", Table(T::TypeDef)),
            col!("MethodBody", Coded(C::MethodDefOrRef)),
            col!("MethodDeclaration", Coded(C::MethodDefOrRef)),
        ],
        T::ModuleRef => &[col!("Name", Strings)],
        T::TypeSpec => &[col!("Signature", Blob)],
        T::ImplMap => &[
            col!("MappingFlags", U16),
            col!("MemberForwarded", Coded(C::MemberForwarded)),
            col!("ImportName", Strings),
            col!("ImportScope", Table(T::ModuleRef)),
        ],
        T::FieldRVA => &[col!("RVA", U32), col!("Field", Table(T::Field))],
        T::EncLog => &[col!("Token", U32), col!("FuncCode", U32)],
        T::EncMap => &[col!("Token", U32)],
        T::Assembly => &[
            col!("HashAlgId", U32),
            col!("MajorVersion", U16),
            col!("MinorVersion", U16),
            col!("BuildNumber", U16),
            col!("RevisionNumber", U16),
            col!("Flags", U32),
            col!("PublicKey", Blob),
            col!("Name", Strings),
            col!("Culture", Strings),
        ],
        T::AssemblyProcessor => &[col!("Processor", U32)],
        T::AssemblyOS => &[
            col!("OSPlatformID", U32),
            col!("OSMajorVersion", U32),
            col!("OSMinorVersion", U32),
        ],
        T::AssemblyRef => &[
            col!("MajorVersion", U16),
            col!("MinorVersion", U16),
            col!("BuildNumber", U16),
            col!("RevisionNumber", U16),
            col!("Flags", U32),
            col!("PublicKeyOrToken", Blob),
            col!("Name", Strings),
            col!("Culture", Strings),
            col!("HashValue", Blob),
        ],
        T::AssemblyRefProcessor => &[
            col!("Processor", U32),
            col!("AssemblyRef", Table(T::AssemblyRef)),
        ],
        T::AssemblyRefOS => &[
            col!("OSPlatformId", U32),
            col!("OSMajorVersion", U32),
            col!("OSMinorVersion", U32),
            col!("AssemblyRef", Table(T::AssemblyRef)),
        ],
        T::File => &[
            col!("Flags", U32),
            col!("Name", Strings),
            col!("HashValue", Blob),
        ],
        T::ExportedType => &[
            col!("Flags", U32),
            col!("TypeDefId", U32),
            col!("TypeName", Strings),
            col!("TypeNamespace", Strings),
            col!("Implementation", Coded(C::Implementation)),
        ],
        T::ManifestResource => &[
            col!("Offset", U32),
            col!("Flags", U32),
            col!("Name", Strings),
            col!("Implementation", Coded(C::Implementation)),
        ],
        T::NestedClass => &[
            col!("NestedClass", Table(T::TypeDef)),
            col!("EnclosingClass", Table(T::TypeDef)),
        ],
        T::GenericParam => &[
            col!("Number", U16),
            col!("Flags", U16),
            col!("Owner", Coded(C::TypeOrMethodDef)),
            col!("Name", Strings),
        ],
        T::MethodSpec => &[
            col!("Method", Coded(C::MethodDefOrRef)),
            col!("Instantiation", Blob),
        ],
        T::GenericParamConstraint => &[
            col!("Owner", Table(T::GenericParam)),
            col!("Constraint", Coded(C::TypeDefOrRef)),
        ],
        T::Document => &[
            col!("Name", Blob),
            col!("HashAlgorithm", Guid),
            col!("Hash", Blob),
            col!("Language", Guid),
        ],
        T::MethodDebugInformation => &[
            col!("Document", Table(T::Document)),
            col!("SequencePoints", Blob),
        ],
        T::LocalScope => &[
            col!("Method", Table(T::MethodDef)),
            col!("ImportScope", Table(T::ImportScope)),
            col!("VariableList", Table(T::LocalVariable)),
            col!("ConstantList", Table(T::LocalConstant)),
            col!("StartOffset", U32),
            col!("Length", U32),
        ],
        T::LocalVariable => &[
            col!("Attributes", U16),
            col!("Index", U16),
            col!("Name", Strings),
        ],
        T::LocalConstant => &[col!("Name", Strings), col!("Signature", Blob)],
        T::ImportScope => &[
            col!("Parent", Table(T::ImportScope)),
            col!("Imports", Blob),
        ],
        T::StateMachineMethod => &[
            col!("MoveNextMethod", Table(T::MethodDef)),
            col!("KickoffMethod", Table(T::MethodDef)),
        ],
        T::CustomDebugInformation => &[
            col!("Parent", Coded(C::HasCustomDebugInformation)),
            col!("Kind", Guid),
            col!("Value", Blob),
        ],
    }
}
