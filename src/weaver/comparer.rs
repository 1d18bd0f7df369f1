//! Equality comparer resolution.
//!
//! A setter compares the stored and the incoming value through a comparer instance that is
//! obtained from a static `get_Default` accessor and queried with an instance
//! `Equals(old, new)`. Without a marker argument this is
//! `System.Collections.Generic.EqualityComparer<T>` for the property type, imported through
//! a generic instantiation so the runtime picks the specialized comparer for value types,
//! reference types and `Nullable<T>` alike. A marker argument names a comparer type of the
//! module instead, whose members are looked up by name.

use crate::{
    cilassembly::CilAssembly,
    metadata::{
        customattributes::strip_assembly_qualification,
        signatures::{generic_instance, generic_var, method_shape, method_signature, ELEMENT_TYPE},
        tables::{MethodDefRaw, TableId},
        token::Token,
    },
    weaver::scanner::Candidate,
    Result,
};

const COMPARER_NAMESPACE: &str = "System.Collections.Generic";
const COMPARER_NAME: &str = "EqualityComparer`1";
const ACCESSOR_NAME: &str = "get_Default";
const EQUALS_NAME: &str = "Equals";

/// Where the comparer comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComparerStrategy {
    /// `EqualityComparer<T>.Default` for the property type
    Default,
    /// A comparer type declared in the module
    Custom {
        /// Full name of the comparer type
        type_name: String,
    },
}

/// The two members a woven setter calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedComparer {
    /// Static accessor returning the comparer instance, called with `call`
    pub accessor: Token,
    /// `Equals(old, new)` on the comparer instance, called with `callvirt`
    pub equals: Token,
    /// How the members were found
    pub strategy: ComparerStrategy,
}

/// Resolves the comparer for `candidate`, whose property has the encoded type
/// `property_type`.
///
/// # Errors
/// Returns [`crate::Error::Resolution`] if the named comparer type or its members are
/// missing, or if the module references no assembly that could provide
/// `EqualityComparer<T>`.
pub fn resolve(
    assembly: &mut CilAssembly,
    candidate: &Candidate,
    property_type: &[u8],
) -> Result<ResolvedComparer> {
    match candidate.marker.comparer.as_deref() {
        Some(comparer) => resolve_custom(assembly, candidate, comparer),
        None => resolve_default(assembly, candidate, property_type),
    }
}

fn resolve_default(
    assembly: &mut CilAssembly,
    candidate: &Candidate,
    property_type: &[u8],
) -> Result<ResolvedComparer> {
    let comparer = match assembly.find_type_ref(COMPARER_NAMESPACE, COMPARER_NAME)? {
        Some(existing) => existing,
        None => {
            let Some(scope) = assembly.collections_scope()? else {
                return Err(resolution_error!(
                    candidate.display_name(),
                    "no referenced assembly provides {}.{}",
                    COMPARER_NAMESPACE,
                    COMPARER_NAME
                ));
            };
            assembly.import_type_ref(scope, COMPARER_NAMESPACE, COMPARER_NAME)?
        }
    };

    let instance = generic_instance(comparer, false, &[property_type])?;
    let instance = assembly.import_type_spec(&instance)?;

    let var = generic_var(0)?;
    let open_comparer = generic_instance(comparer, false, &[&var])?;
    let accessor_signature = method_signature(false, &open_comparer, &[])?;
    let equals_signature = method_signature(true, &[ELEMENT_TYPE::BOOLEAN], &[&var, &var])?;

    let accessor = assembly.import_member_ref(instance, ACCESSOR_NAME, &accessor_signature)?;
    let equals = assembly.import_member_ref(instance, EQUALS_NAME, &equals_signature)?;
    log::debug!(
        "{} compares through EqualityComparer<T>.Default ({accessor}, {equals})",
        candidate.display_name()
    );

    Ok(ResolvedComparer {
        accessor,
        equals,
        strategy: ComparerStrategy::Default,
    })
}

fn resolve_custom(
    assembly: &CilAssembly,
    candidate: &Candidate,
    comparer: &str,
) -> Result<ResolvedComparer> {
    let type_name = strip_assembly_qualification(comparer).replace('+', "/");
    let Some(type_def) = assembly.find_type_def(&type_name)? else {
        return Err(resolution_error!(
            candidate.display_name(),
            "comparer type '{}' is not declared in this module",
            type_name
        ));
    };

    let metadata = assembly.metadata();
    let mut accessor = None;
    let mut equals = None;
    for rid in assembly.method_range(type_def)? {
        let method: MethodDefRaw = metadata.tables.get(rid)?;
        match metadata.strings.get(method.name)? {
            ACCESSOR_NAME if accessor.is_none() => {
                accessor = Some(Token::from_parts(TableId::MethodDef, rid));
            }
            EQUALS_NAME if equals.is_none() => {
                let shape = method_shape(metadata.blobs.get(method.signature)?)?;
                if shape.params.len() == 2 {
                    equals = Some(Token::from_parts(TableId::MethodDef, rid));
                }
            }
            _ => {}
        }
    }

    let Some(accessor) = accessor else {
        return Err(resolution_error!(
            candidate.display_name(),
            "comparer type '{}' has no {} accessor",
            type_name,
            ACCESSOR_NAME
        ));
    };
    let Some(equals) = equals else {
        return Err(resolution_error!(
            candidate.display_name(),
            "comparer type '{}' has no {} method with two parameters",
            type_name,
            EQUALS_NAME
        ));
    };

    log::debug!(
        "{} compares through {type_name} ({accessor}, {equals})",
        candidate.display_name()
    );
    Ok(ResolvedComparer {
        accessor,
        equals,
        strategy: ComparerStrategy::Custom { type_name },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::{
            signatures::ELEMENT_TYPE,
            tables::{MemberRefRaw, TypeSpecRaw},
        },
        test::factories::{AssemblyFactory, PropertySpec},
        weaver::scanner::CandidateSet,
        ErrorKind,
    };

    const MARKER: &str = "Engine.Wpf.NotifyPropertyChangedAttribute";

    fn first_candidate(assembly: &CilAssembly) -> Candidate {
        CandidateSet::scan(assembly, MARKER)
            .unwrap()
            .into_iter()
            .next()
            .unwrap()
    }

    #[test]
    fn default_comparer_is_instantiated_for_the_property_type() {
        let fixture = AssemblyFactory::new().build();
        let mut assembly = CilAssembly::from_mem(fixture.image, None).unwrap();
        let candidate = first_candidate(&assembly);

        let resolved = resolve(&mut assembly, &candidate, &[ELEMENT_TYPE::I4]).unwrap();
        assert_eq!(resolved.strategy, ComparerStrategy::Default);
        assert!(resolved.accessor.is_table(TableId::MemberRef));
        assert!(resolved.equals.is_table(TableId::MemberRef));

        let metadata = assembly.metadata();
        let equals: MemberRefRaw = metadata.tables.get(resolved.equals.row()).unwrap();
        assert_eq!(
            metadata.blobs.get(equals.signature).unwrap(),
            &[0x20, 0x02, 0x02, 0x13, 0x00, 0x13, 0x00]
        );

        let spec: TypeSpecRaw = metadata
            .tables
            .get(metadata.tables.row_count(TableId::TypeSpec))
            .unwrap();
        let blob = metadata.blobs.get(spec.signature).unwrap();
        assert_eq!(&blob[..2], &[0x15, 0x12]);
        assert_eq!(&blob[blob.len() - 2..], &[0x01, ELEMENT_TYPE::I4]);

        let again = resolve(&mut assembly, &candidate, &[ELEMENT_TYPE::I4]).unwrap();
        assert_eq!(again, resolved);
    }

    #[test]
    fn custom_comparer_members_are_found() {
        let fixture = AssemblyFactory::new()
            .property(PropertySpec::int32("X").compared_by("Sample.AlwaysEqual, Sample"))
            .comparer("AlwaysEqual")
            .build();
        let mut assembly = CilAssembly::from_mem(fixture.image, None).unwrap();
        let candidate = first_candidate(&assembly);

        let resolved = resolve(&mut assembly, &candidate, &[ELEMENT_TYPE::I4]).unwrap();
        assert_eq!(
            resolved.strategy,
            ComparerStrategy::Custom {
                type_name: "Sample.AlwaysEqual".to_string()
            }
        );
        assert!(resolved.accessor.is_table(TableId::MethodDef));
        assert!(resolved.equals.is_table(TableId::MethodDef));
        assert!(!assembly.is_modified());
    }

    #[test]
    fn nested_comparer_uses_reflection_name() {
        let fixture = AssemblyFactory::new()
            .property(PropertySpec::int32("X").compared_by("Sample.Model+Comparer"))
            .nested_comparer(true)
            .build();
        let mut assembly = CilAssembly::from_mem(fixture.image, None).unwrap();
        let candidate = first_candidate(&assembly);

        let resolved = resolve(&mut assembly, &candidate, &[ELEMENT_TYPE::I4]).unwrap();
        assert!(matches!(resolved.strategy, ComparerStrategy::Custom { .. }));
    }

    #[test]
    fn missing_comparer_is_a_resolution_error() {
        let fixture = AssemblyFactory::new()
            .property(PropertySpec::int32("X").compared_by("Sample.Missing"))
            .build();
        let mut assembly = CilAssembly::from_mem(fixture.image, None).unwrap();
        let candidate = first_candidate(&assembly);

        let error = resolve(&mut assembly, &candidate, &[ELEMENT_TYPE::I4]).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Resolution);
        assert!(error.to_string().contains("Sample.Missing"));
    }

    #[test]
    fn comparer_without_equals_is_a_resolution_error() {
        let fixture = AssemblyFactory::new()
            .property(PropertySpec::int32("X").compared_by("Sample.Incomplete"))
            .incomplete_comparer("Incomplete")
            .build();
        let mut assembly = CilAssembly::from_mem(fixture.image, None).unwrap();
        let candidate = first_candidate(&assembly);

        let error = resolve(&mut assembly, &candidate, &[ELEMENT_TYPE::I4]).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Resolution);
        assert!(error.to_string().contains("Equals"));
    }
}
