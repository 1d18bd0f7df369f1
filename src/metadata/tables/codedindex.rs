//! Coded indices (ECMA-335 II.24.2.6).
//!
//! A coded index packs a reference to one of several tables into a single column: the low
//! bits hold a tag selecting the table, the remaining bits the row. The number of tag bits is
//! fixed per kind, the column width (2 or 4 bytes) depends on the largest referenced table
//! and is computed by [`crate::metadata::tables::TableInfo`].

use strum::{EnumCount, EnumIter};

use crate::{
    metadata::{tables::TableId, token::Token},
    Result,
};

/// The kinds of coded indices used by metadata and Portable PDB tables.
#[derive(Debug, Hash, Eq, PartialEq, Clone, Copy, EnumIter, EnumCount)]
pub enum CodedIndexType {
    /// `TypeDef`, `TypeRef` or `TypeSpec`
    TypeDefOrRef,
    /// `Field`, `Param` or `Property`
    HasConstant,
    /// Anything that can carry a custom attribute
    HasCustomAttribute,
    /// `Field` or `Param`
    HasFieldMarshal,
    /// `TypeDef`, `MethodDef` or `Assembly`
    HasDeclSecurity,
    /// Parent of a `MemberRef`
    MemberRefParent,
    /// `Event` or `Property`
    HasSemantics,
    /// `MethodDef` or `MemberRef`
    MethodDefOrRef,
    /// `Field` or `MethodDef`
    MemberForwarded,
    /// `File`, `AssemblyRef` or `ExportedType`
    Implementation,
    /// Constructor of a custom attribute, `MethodDef` (tag 2) or `MemberRef` (tag 3)
    CustomAttributeType,
    /// `Module`, `ModuleRef`, `AssemblyRef` or `TypeRef`
    ResolutionScope,
    /// `TypeDef` or `MethodDef`
    TypeOrMethodDef,
    /// Parent of a Portable PDB `CustomDebugInformation` row
    HasCustomDebugInformation,
}

impl CodedIndexType {
    /// The tables addressed by this kind, in tag order.
    ///
    /// `CustomAttributeType` reserves tags 0, 1 and 4; they are listed as `None`.
    #[must_use]
    pub fn tables(&self) -> &'static [Option<TableId>] {
        use TableId as T;
        match self {
            CodedIndexType::TypeDefOrRef => {
                &[Some(T::TypeDef), Some(T::TypeRef), Some(T::TypeSpec)]
            }
            CodedIndexType::HasConstant => &[Some(T::Field), Some(T::Param), Some(T::Property)],
            CodedIndexType::HasCustomAttribute => &[
                Some(T::MethodDef),
                Some(T::Field),
                Some(T::TypeRef),
                Some(T::TypeDef),
                Some(T::Param),
                Some(T::InterfaceImpl),
                Some(T::MemberRef),
                Some(T::Module),
                Some(T::DeclSecurity),
                Some(T::Property),
                Some(T::Event),
                Some(T::StandAloneSig),
                Some(T::ModuleRef),
                Some(T::TypeSpec),
                Some(T::Assembly),
                Some(T::AssemblyRef),
                Some(T::File),
                Some(T::ExportedType),
                Some(T::ManifestResource),
                Some(T::GenericParam),
                Some(T::GenericParamConstraint),
                Some(T::MethodSpec),
            ],
            CodedIndexType::HasFieldMarshal => &[Some(T::Field), Some(T::Param)],
            CodedIndexType::HasDeclSecurity => {
                &[Some(T::TypeDef), Some(T::MethodDef), Some(T::Assembly)]
            }
            CodedIndexType::MemberRefParent => &[
                Some(T::TypeDef),
                Some(T::TypeRef),
                Some(T::ModuleRef),
                Some(T::MethodDef),
                Some(T::TypeSpec),
            ],
            CodedIndexType::HasSemantics => &[Some(T::Event), Some(T::Property)],
            CodedIndexType::MethodDefOrRef => &[Some(T::MethodDef), Some(T::MemberRef)],
            CodedIndexType::MemberForwarded => &[Some(T::Field), Some(T::MethodDef)],
            CodedIndexType::Implementation => {
                &[Some(T::File), Some(T::AssemblyRef), Some(T::ExportedType)]
            }
            CodedIndexType::CustomAttributeType => {
                &[None, None, Some(T::MethodDef), Some(T::MemberRef), None]
            }
            CodedIndexType::ResolutionScope => &[
                Some(T::Module),
                Some(T::ModuleRef),
                Some(T::AssemblyRef),
                Some(T::TypeRef),
            ],
            CodedIndexType::TypeOrMethodDef => &[Some(T::TypeDef), Some(T::MethodDef)],
            CodedIndexType::HasCustomDebugInformation => &[
                Some(T::MethodDef),
                Some(T::Field),
                Some(T::TypeRef),
                Some(T::TypeDef),
                Some(T::Param),
                Some(T::InterfaceImpl),
                Some(T::MemberRef),
                Some(T::Module),
                Some(T::DeclSecurity),
                Some(T::Property),
                Some(T::Event),
                Some(T::StandAloneSig),
                Some(T::ModuleRef),
                Some(T::TypeSpec),
                Some(T::Assembly),
                Some(T::AssemblyRef),
                Some(T::File),
                Some(T::ExportedType),
                Some(T::ManifestResource),
                Some(T::GenericParam),
                Some(T::GenericParamConstraint),
                Some(T::MethodSpec),
                Some(T::Document),
                Some(T::LocalScope),
                Some(T::LocalVariable),
                Some(T::LocalConstant),
                Some(T::ImportScope),
            ],
        }
    }

    /// Number of low bits used for the tag.
    #[must_use]
    pub fn tag_bits(&self) -> u32 {
        let count = self.tables().len() as u32;
        u32::BITS - (count - 1).leading_zeros()
    }

    /// Splits a raw coded index into the referenced token. A zero row yields a null token
    /// of the tagged table.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for tags that address no table.
    pub fn decode(&self, value: u32) -> Result<Token> {
        let bits = self.tag_bits();
        let tag = (value & ((1 << bits) - 1)) as usize;
        match self.tables().get(tag) {
            Some(Some(table)) => Ok(Token::from_parts(*table, value >> bits)),
            _ => Err(malformed_error!(
                "Invalid tag {} for coded index {:?}",
                tag,
                self
            )),
        }
    }

    /// Encodes `token` as a raw coded index.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the token's table is not addressable by this
    /// kind.
    pub fn encode(&self, token: Token) -> Result<u32> {
        let Some(tag) = self
            .tables()
            .iter()
            .position(|table| table.is_some_and(|table| token.is_table(table)))
        else {
            return Err(malformed_error!(
                "Token {} can not be encoded as {:?}",
                token,
                self
            ));
        };

        Ok((token.row() << self.tag_bits()) | tag as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn tag_bits() {
        assert_eq!(CodedIndexType::TypeDefOrRef.tag_bits(), 2);
        assert_eq!(CodedIndexType::HasCustomAttribute.tag_bits(), 5);
        assert_eq!(CodedIndexType::CustomAttributeType.tag_bits(), 3);
        assert_eq!(CodedIndexType::HasSemantics.tag_bits(), 1);
        assert_eq!(CodedIndexType::ResolutionScope.tag_bits(), 2);
        assert_eq!(CodedIndexType::HasCustomDebugInformation.tag_bits(), 5);
        for kind in CodedIndexType::iter() {
            assert!(kind.tag_bits() >= 1);
        }
    }

    #[test]
    fn custom_attribute_type_uses_reserved_layout() {
        let ctor = Token::from_parts(TableId::MemberRef, 7);
        let encoded = CodedIndexType::CustomAttributeType.encode(ctor).unwrap();
        assert_eq!(encoded, (7 << 3) | 3);
        assert_eq!(
            CodedIndexType::CustomAttributeType.decode(encoded).unwrap(),
            ctor
        );

        let ctor = Token::from_parts(TableId::MethodDef, 2);
        assert_eq!(
            CodedIndexType::CustomAttributeType.encode(ctor).unwrap(),
            (2 << 3) | 2
        );
        assert!(CodedIndexType::CustomAttributeType.decode(1 << 3).is_err());
    }

    #[test]
    fn property_parent() {
        let property = Token::from_parts(TableId::Property, 1);
        let encoded = CodedIndexType::HasCustomAttribute.encode(property).unwrap();
        assert_eq!(encoded, (1 << 5) | 9);
        assert!(CodedIndexType::TypeDefOrRef.encode(property).is_err());
    }
}
