//! Type naming and find-or-create reference import.
//!
//! Woven code calls into the framework (`EqualityComparer<T>`, `PropertyChangedEventArgs`)
//! and into the module itself. Each reference is looked up among the existing rows first,
//! and only added when missing, so that weaving many properties of the same shape adds the
//! rows once.

use std::ops::Range;

use crate::{
    cilassembly::CilAssembly,
    metadata::{
        tables::{
            AssemblyRefRaw, CodedIndexType, MemberRefRaw, NestedClassRaw, StandAloneSigRaw,
            TableId, TypeDefRaw, TypeRefRaw, TypeSpecRaw,
        },
        token::Token,
    },
    Result,
};

/// Assembly names that host the core library, in order of preference.
const CORE_LIBRARIES: [&str; 4] = ["System.Runtime", "netstandard", "mscorlib", "System.Private.CoreLib"];

/// Joins a namespace and a type name.
fn qualify(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{namespace}.{name}")
    }
}

impl CilAssembly {
    /// The full name of a `TypeDef` or `TypeRef`, nested types joined with `/`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for other tokens and damaged rows.
    pub fn type_name(&self, token: Token) -> Result<String> {
        self.type_name_at_depth(token, 0)
    }

    fn type_name_at_depth(&self, token: Token, depth: usize) -> Result<String> {
        if depth > 64 {
            return Err(malformed_error!("Type nesting of {} is too deep", token));
        }

        let metadata = self.metadata();
        if token.is_table(TableId::TypeDef) {
            let row: TypeDefRaw = metadata.tables.get(token.row())?;
            let name = metadata.strings.get(row.type_name)?;
            return match self.enclosing_type(token.row())? {
                Some(outer) => Ok(format!(
                    "{}/{}",
                    self.type_name_at_depth(Token::from_parts(TableId::TypeDef, outer), depth + 1)?,
                    name
                )),
                None => Ok(qualify(metadata.strings.get(row.type_namespace)?, name)),
            };
        }

        if token.is_table(TableId::TypeRef) {
            let row: TypeRefRaw = metadata.tables.get(token.row())?;
            let name = metadata.strings.get(row.type_name)?;
            let scope = CodedIndexType::ResolutionScope.decode(row.resolution_scope)?;
            if scope.is_table(TableId::TypeRef) && scope.row() != 0 {
                return Ok(format!(
                    "{}/{}",
                    self.type_name_at_depth(scope, depth + 1)?,
                    name
                ));
            }
            return Ok(qualify(metadata.strings.get(row.type_namespace)?, name));
        }

        Err(malformed_error!("Token {} does not name a type", token))
    }

    /// The `TypeDef` enclosing `type_def`, if it is nested.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for damaged rows.
    pub fn enclosing_type(&self, type_def: u32) -> Result<Option<u32>> {
        for row in self.metadata().tables.iter::<NestedClassRaw>() {
            let row = row?;
            if row.nested_class == type_def {
                return Ok(Some(row.enclosing_class));
            }
        }
        Ok(None)
    }

    /// The `MethodDef` rows owned by `type_def`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for damaged rows.
    pub fn method_range(&self, type_def: u32) -> Result<Range<u32>> {
        let tables = &self.metadata().tables;
        let row: TypeDefRaw = tables.get(type_def)?;
        let end = if type_def < tables.row_count(TableId::TypeDef) {
            tables.get::<TypeDefRaw>(type_def + 1)?.method_list
        } else {
            tables.row_count(TableId::MethodDef) + 1
        };
        Ok(row.method_list..end.max(row.method_list))
    }

    /// The `Field` rows owned by `type_def`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for damaged rows.
    pub fn field_range(&self, type_def: u32) -> Result<Range<u32>> {
        let tables = &self.metadata().tables;
        let row: TypeDefRaw = tables.get(type_def)?;
        let end = if type_def < tables.row_count(TableId::TypeDef) {
            tables.get::<TypeDefRaw>(type_def + 1)?.field_list
        } else {
            tables.row_count(TableId::Field) + 1
        };
        Ok(row.field_list..end.max(row.field_list))
    }

    /// Finds a `TypeDef` by full name as produced by [`CilAssembly::type_name`].
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for damaged rows.
    pub fn find_type_def(&self, full_name: &str) -> Result<Option<u32>> {
        let count = self.metadata().tables.row_count(TableId::TypeDef);
        for rid in 1..=count {
            if self.type_name(Token::from_parts(TableId::TypeDef, rid))? == full_name {
                return Ok(Some(rid));
            }
        }
        Ok(None)
    }

    /// Finds a top-level `TypeRef` by namespace and name, in any scope.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for damaged rows.
    pub fn find_type_ref(&self, namespace: &str, name: &str) -> Result<Option<Token>> {
        let metadata = self.metadata();
        for row in metadata.tables.iter::<TypeRefRaw>() {
            let row = row?;
            let scope = CodedIndexType::ResolutionScope.decode(row.resolution_scope)?;
            if scope.is_table(TableId::TypeRef) {
                continue;
            }
            if metadata.strings.get(row.type_name)? == name
                && metadata.strings.get(row.type_namespace)? == namespace
            {
                return Ok(Some(Token::from_parts(TableId::TypeRef, row.rid)));
            }
        }
        Ok(None)
    }

    /// The resolution scope of a `TypeRef`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for damaged rows.
    pub fn type_ref_scope(&self, type_ref: Token) -> Result<Token> {
        let row: TypeRefRaw = self.metadata().tables.get(type_ref.row())?;
        CodedIndexType::ResolutionScope.decode(row.resolution_scope)
    }

    /// Finds an `AssemblyRef` by simple name.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for damaged rows.
    pub fn find_assembly_ref(&self, name: &str) -> Result<Option<Token>> {
        let metadata = self.metadata();
        for row in metadata.tables.iter::<AssemblyRefRaw>() {
            let row = row?;
            if metadata.strings.get(row.name)? == name {
                return Ok(Some(Token::from_parts(TableId::AssemblyRef, row.rid)));
            }
        }
        Ok(None)
    }

    /// Picks the scope for a framework collection type that the module does not reference
    /// yet: `System.Collections` if referenced, else the scope of `System.Object`, else any
    /// core library reference.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for damaged rows.
    pub fn collections_scope(&self) -> Result<Option<Token>> {
        if let Some(scope) = self.find_assembly_ref("System.Collections")? {
            return Ok(Some(scope));
        }

        if let Some(object) = self.find_type_ref("System", "Object")? {
            let scope = self.type_ref_scope(object)?;
            if scope.is_table(TableId::AssemblyRef) && scope.row() != 0 {
                return Ok(Some(scope));
            }
        }

        for name in CORE_LIBRARIES {
            if let Some(scope) = self.find_assembly_ref(name)? {
                return Ok(Some(scope));
            }
        }
        Ok(None)
    }

    /// Returns a `TypeRef` for `namespace.name` in `scope`, adding it if missing.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `scope` is not a resolution scope.
    pub fn import_type_ref(&mut self, scope: Token, namespace: &str, name: &str) -> Result<Token> {
        let resolution_scope = CodedIndexType::ResolutionScope.encode(scope)?;
        {
            let metadata = self.metadata();
            for row in metadata.tables.iter::<TypeRefRaw>() {
                let row = row?;
                if row.resolution_scope == resolution_scope
                    && metadata.strings.get(row.type_name)? == name
                    && metadata.strings.get(row.type_namespace)? == namespace
                {
                    return Ok(Token::from_parts(TableId::TypeRef, row.rid));
                }
            }
        }

        let metadata = self.metadata_mut();
        let row = TypeRefRaw {
            rid: 0,
            resolution_scope,
            type_name: metadata.strings.add(name),
            type_namespace: metadata.strings.add(namespace),
        };
        let rid = metadata.tables.push(&row);
        log::debug!("Imported type reference {}", qualify(namespace, name));
        Ok(Token::from_parts(TableId::TypeRef, rid))
    }

    /// Returns a `TypeSpec` with the given signature, adding it if missing.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the blob heap cannot take the signature.
    pub fn import_type_spec(&mut self, signature: &[u8]) -> Result<Token> {
        if let Some(blob) = self.metadata().blobs.find(signature) {
            for row in self.metadata().tables.iter::<TypeSpecRaw>() {
                let row = row?;
                if row.signature == blob {
                    return Ok(Token::from_parts(TableId::TypeSpec, row.rid));
                }
            }
        }

        let metadata = self.metadata_mut();
        let row = TypeSpecRaw {
            rid: 0,
            signature: metadata.blobs.add(signature)?,
        };
        Ok(Token::from_parts(TableId::TypeSpec, metadata.tables.push(&row)))
    }

    /// Returns a `MemberRef` named `name` with `signature` on `parent`, adding it if missing.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `parent` cannot own member references.
    pub fn import_member_ref(&mut self, parent: Token, name: &str, signature: &[u8]) -> Result<Token> {
        let class = CodedIndexType::MemberRefParent.encode(parent)?;
        if let Some(blob) = self.metadata().blobs.find(signature) {
            let metadata = self.metadata();
            for row in metadata.tables.iter::<MemberRefRaw>() {
                let row = row?;
                if row.class == class
                    && row.signature == blob
                    && metadata.strings.get(row.name)? == name
                {
                    return Ok(Token::from_parts(TableId::MemberRef, row.rid));
                }
            }
        }

        let metadata = self.metadata_mut();
        let row = MemberRefRaw {
            rid: 0,
            class,
            name: metadata.strings.add(name),
            signature: metadata.blobs.add(signature)?,
        };
        Ok(Token::from_parts(TableId::MemberRef, metadata.tables.push(&row)))
    }

    /// Returns a `StandAloneSig` with the given local variable signature, adding it if
    /// missing.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the blob heap cannot take the signature.
    pub fn import_local_signature(&mut self, signature: &[u8]) -> Result<Token> {
        if let Some(blob) = self.metadata().blobs.find(signature) {
            for row in self.metadata().tables.iter::<StandAloneSigRaw>() {
                let row = row?;
                if row.signature == blob {
                    return Ok(Token::from_parts(TableId::StandAloneSig, row.rid));
                }
            }
        }

        let metadata = self.metadata_mut();
        let row = StandAloneSigRaw {
            rid: 0,
            signature: metadata.blobs.add(signature)?,
        };
        Ok(Token::from_parts(TableId::StandAloneSig, metadata.tables.push(&row)))
    }

    /// Returns the `ldstr` token of `value`, adding it to `#US` if missing.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the heap outgrows `ldstr` tokens.
    pub fn import_user_string(&mut self, value: &str) -> Result<Token> {
        let offset = self.metadata_mut().user_strings.add(value)?;
        Ok(Token::user_string(offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::factories::AssemblyFactory;

    fn assembly() -> CilAssembly {
        let fixture = AssemblyFactory::new().nested_comparer(true).build();
        CilAssembly::from_mem(fixture.image, None).unwrap()
    }

    #[test]
    fn type_names() {
        let assembly = assembly();
        let model = assembly.find_type_def("Sample.Model").unwrap().unwrap();
        assert_eq!(
            assembly.type_name(Token::from_parts(TableId::TypeDef, model)).unwrap(),
            "Sample.Model"
        );

        let nested = assembly.find_type_def("Sample.Model/Comparer").unwrap();
        assert!(nested.is_some());

        let methods = assembly.method_range(model).unwrap();
        assert!(!methods.is_empty());
        let fields = assembly.field_range(model).unwrap();
        assert!(!fields.is_empty());
        assert!(assembly.find_type_def("Sample.Missing").unwrap().is_none());
        assert!(assembly.type_name(Token::new(0x0400_0001)).is_err());
    }

    #[test]
    fn framework_scope_lookup() {
        let assembly = assembly();
        let scope = assembly.collections_scope().unwrap().unwrap();
        assert!(scope.is_table(TableId::AssemblyRef));

        let object = assembly.find_type_ref("System", "Object").unwrap().unwrap();
        assert_eq!(assembly.type_name(object).unwrap(), "System.Object");
    }

    #[test]
    fn imports_are_deduplicated() {
        let mut assembly = assembly();
        let scope = assembly.collections_scope().unwrap().unwrap();
        let type_refs = assembly.metadata().tables.row_count(TableId::TypeRef);

        let first = assembly
            .import_type_ref(scope, "System.Collections.Generic", "EqualityComparer`1")
            .unwrap();
        let second = assembly
            .import_type_ref(scope, "System.Collections.Generic", "EqualityComparer`1")
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(assembly.metadata().tables.row_count(TableId::TypeRef), type_refs + 1);

        let spec = assembly.import_type_spec(&[0x15, 0x12, 0x05, 0x01, 0x08]).unwrap();
        assert_eq!(spec, assembly.import_type_spec(&[0x15, 0x12, 0x05, 0x01, 0x08]).unwrap());

        let member = assembly.import_member_ref(spec, "Equals", &[0x20, 0x02, 0x02, 0x13, 0x00, 0x13, 0x00]).unwrap();
        let again = assembly.import_member_ref(spec, "Equals", &[0x20, 0x02, 0x02, 0x13, 0x00, 0x13, 0x00]).unwrap();
        assert_eq!(member, again);
        let other = assembly.import_member_ref(spec, "get_Default", &[0x20, 0x02, 0x02, 0x13, 0x00, 0x13, 0x00]).unwrap();
        assert_ne!(member, other);

        let locals = assembly.import_local_signature(&[0x07, 0x01, 0x08]).unwrap();
        assert_eq!(locals, assembly.import_local_signature(&[0x07, 0x01, 0x08]).unwrap());

        let text = assembly.import_user_string("X").unwrap();
        assert_eq!(text.table(), 0x70);
        assert_eq!(assembly.metadata().user_strings.get(text.row()).unwrap(), "X");
        assert!(assembly.is_modified());
    }
}
