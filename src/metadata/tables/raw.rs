//! Typed views over generic table rows.
//!
//! Each view mirrors the column order of [`crate::metadata::tables::schema::columns`] and
//! carries the row id it was read from. Heap indices and coded indices stay raw; resolving
//! them is left to the caller, which has access to the heaps.

use crate::{metadata::tables::TableId, Result};

/// A typed row of a metadata table.
pub trait RawRow: Sized {
    /// The table this row type belongs to.
    const TABLE: TableId;

    /// Builds the view for row `rid` from its column values.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the column count does not match.
    fn from_row(rid: u32, row: &[u32]) -> Result<Self>;

    /// The column values in on-disk order.
    fn to_row(&self) -> Vec<u32>;

    /// The 1-based row id.
    fn rid(&self) -> u32;
}

macro_rules! raw_row {
    (
        $(#[$meta:meta])*
        $name:ident => $table:ident {
            $($(#[$field_meta:meta])* $field:ident),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
        pub struct $name {
            /// The 1-based row id
            pub rid: u32,
            $($(#[$field_meta])* pub $field: u32,)+
        }

        impl RawRow for $name {
            const TABLE: TableId = TableId::$table;

            fn from_row(rid: u32, row: &[u32]) -> Result<Self> {
                const NAMES: &[&str] = &[$(stringify!($field)),+];
                if row.len() != NAMES.len() {
                    return Err(malformed_error!(
                        "{:?} row {} has {} columns, expected {}",
                        TableId::$table,
                        rid,
                        row.len(),
                        NAMES.len()
                    ));
                }

                let mut values = row.iter().copied();
                Ok($name {
                    rid,
                    $($field: values.next().unwrap_or_default(),)+
                })
            }

            fn to_row(&self) -> Vec<u32> {
                vec![$(self.$field),+]
            }

            fn rid(&self) -> u32 {
                self.rid
            }
        }
    };
}

raw_row! {
    /// `Module` row
    ModuleRaw => Module {
        /// Reserved, zero
        generation,
        /// `#Strings` index
        name,
        /// `#GUID` index
        mvid,
        /// `#GUID` index
        enc_id,
        /// `#GUID` index
        enc_base_id,
    }
}

raw_row! {
    /// `TypeRef` row
    TypeRefRaw => TypeRef {
        /// `ResolutionScope` coded index
        resolution_scope,
        /// `#Strings` index
        type_name,
        /// `#Strings` index
        type_namespace,
    }
}

raw_row! {
    /// `TypeDef` row
    TypeDefRaw => TypeDef {
        /// `TypeAttributes`
        flags,
        /// `#Strings` index
        type_name,
        /// `#Strings` index
        type_namespace,
        /// `TypeDefOrRef` coded index
        extends,
        /// First `Field` row of the type
        field_list,
        /// First `MethodDef` row of the type
        method_list,
    }
}

raw_row! {
    /// `Field` row
    FieldRaw => Field {
        /// `FieldAttributes`
        flags,
        /// `#Strings` index
        name,
        /// `#Blob` index of the field signature
        signature,
    }
}

raw_row! {
    /// `MethodDef` row
    MethodDefRaw => MethodDef {
        /// RVA of the method body, zero for abstract and runtime methods
        rva,
        /// `MethodImplAttributes`
        impl_flags,
        /// `MethodAttributes`
        flags,
        /// `#Strings` index
        name,
        /// `#Blob` index of the method signature
        signature,
        /// First `Param` row of the method
        param_list,
    }
}

raw_row! {
    /// `MemberRef` row
    MemberRefRaw => MemberRef {
        /// `MemberRefParent` coded index
        class,
        /// `#Strings` index
        name,
        /// `#Blob` index of the member signature
        signature,
    }
}

raw_row! {
    /// `CustomAttribute` row
    CustomAttributeRaw => CustomAttribute {
        /// `HasCustomAttribute` coded index
        parent,
        /// `CustomAttributeType` coded index of the constructor
        constructor,
        /// `#Blob` index of the argument blob
        value,
    }
}

raw_row! {
    /// `StandAloneSig` row
    StandAloneSigRaw => StandAloneSig {
        /// `#Blob` index
        signature,
    }
}

raw_row! {
    /// `PropertyMap` row
    PropertyMapRaw => PropertyMap {
        /// Owning `TypeDef`
        parent,
        /// First `Property` row of the owner
        property_list,
    }
}

raw_row! {
    /// `Property` row
    PropertyRaw => Property {
        /// `PropertyAttributes`
        flags,
        /// `#Strings` index
        name,
        /// `#Blob` index of the property signature
        signature,
    }
}

raw_row! {
    /// `MethodSemantics` row
    MethodSemanticsRaw => MethodSemantics {
        /// `MethodSemanticsAttributes`
        semantics,
        /// Accessor `MethodDef`
        method,
        /// `HasSemantics` coded index of the property or event
        association,
    }
}

raw_row! {
    /// `TypeSpec` row
    TypeSpecRaw => TypeSpec {
        /// `#Blob` index
        signature,
    }
}

raw_row! {
    /// `AssemblyRef` row
    AssemblyRefRaw => AssemblyRef {
        /// Major version
        major_version,
        /// Minor version
        minor_version,
        /// Build number
        build_number,
        /// Revision number
        revision_number,
        /// `AssemblyFlags`
        flags,
        /// `#Blob` index
        public_key_or_token,
        /// `#Strings` index
        name,
        /// `#Strings` index
        culture,
        /// `#Blob` index
        hash_value,
    }
}

raw_row! {
    /// `NestedClass` row
    NestedClassRaw => NestedClass {
        /// The nested `TypeDef`
        nested_class,
        /// The enclosing `TypeDef`
        enclosing_class,
    }
}

raw_row! {
    /// `GenericParam` row
    GenericParamRaw => GenericParam {
        /// Ordinal
        number,
        /// `GenericParamAttributes`
        flags,
        /// `TypeOrMethodDef` coded index
        owner,
        /// `#Strings` index
        name,
    }
}

raw_row! {
    /// Portable PDB `Document` row
    DocumentRaw => Document {
        /// `#Blob` index of the encoded document name
        name,
        /// `#GUID` index of the hash algorithm
        hash_algorithm,
        /// `#Blob` index of the hash
        hash,
        /// `#GUID` index of the source language
        language,
    }
}

raw_row! {
    /// Portable PDB `MethodDebugInformation` row; row ids match `MethodDef` row ids
    MethodDebugInformationRaw => MethodDebugInformation {
        /// Single `Document` of the method, zero if the sequence points name it
        document,
        /// `#Blob` index of the sequence point blob
        sequence_points,
    }
}

raw_row! {
    /// Portable PDB `LocalScope` row
    LocalScopeRaw => LocalScope {
        /// `MethodDef` the scope belongs to
        method,
        /// `ImportScope` row
        import_scope,
        /// First `LocalVariable` row
        variable_list,
        /// First `LocalConstant` row
        constant_list,
        /// IL offset of the scope start
        start_offset,
        /// Length of the scope in bytes of IL
        length,
    }
}

raw_row! {
    /// Portable PDB `CustomDebugInformation` row
    CustomDebugInformationRaw => CustomDebugInformation {
        /// `HasCustomDebugInformation` coded index
        parent,
        /// `#GUID` index of the information kind
        kind,
        /// `#Blob` index
        value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::tables::schema::columns;

    fn assert_matches_schema<R: RawRow + Default>() {
        assert_eq!(
            R::default().to_row().len(),
            columns(R::TABLE).len(),
            "{:?}",
            R::TABLE
        );
    }

    #[test]
    fn views_match_schema() {
        assert_matches_schema::<ModuleRaw>();
        assert_matches_schema::<TypeRefRaw>();
        assert_matches_schema::<TypeDefRaw>();
        assert_matches_schema::<FieldRaw>();
        assert_matches_schema::<MethodDefRaw>();
        assert_matches_schema::<MemberRefRaw>();
        assert_matches_schema::<CustomAttributeRaw>();
        assert_matches_schema::<StandAloneSigRaw>();
        assert_matches_schema::<PropertyMapRaw>();
        assert_matches_schema::<PropertyRaw>();
        assert_matches_schema::<MethodSemanticsRaw>();
        assert_matches_schema::<TypeSpecRaw>();
        assert_matches_schema::<AssemblyRefRaw>();
        assert_matches_schema::<NestedClassRaw>();
        assert_matches_schema::<GenericParamRaw>();
        assert_matches_schema::<DocumentRaw>();
        assert_matches_schema::<MethodDebugInformationRaw>();
        assert_matches_schema::<LocalScopeRaw>();
        assert_matches_schema::<CustomDebugInformationRaw>();
    }

    #[test]
    fn column_count_is_checked() {
        let row = MemberRefRaw::from_row(3, &[1, 2, 3]).unwrap();
        assert_eq!(row.rid, 3);
        assert_eq!(row.signature, 3);
        assert!(MemberRefRaw::from_row(3, &[1, 2]).is_err());
    }
}
