//! Marker removal.
//!
//! Once a setter is rewritten, its property loses every marker attribute so that another
//! run leaves it alone. Only `CustomAttribute` rows are removed; the marker type and its
//! constructor reference stay, since other code may still use them.

use crate::{
    cilassembly::CilAssembly,
    metadata::{
        tables::{CodedIndexType, CustomAttributeRaw, TableId},
        token::Token,
    },
    Result,
};

/// Removes the attributes of `property` whose constructor is one of `constructors` and
/// returns how many were removed.
///
/// # Errors
/// Returns format errors for damaged rows.
pub fn strip_markers(assembly: &mut CilAssembly, property: u32, constructors: &[Token]) -> Result<usize> {
    let parent =
        CodedIndexType::HasCustomAttribute.encode(Token::from_parts(TableId::Property, property))?;
    let mut encoded = Vec::with_capacity(constructors.len());
    for constructor in constructors {
        encoded.push(CodedIndexType::CustomAttributeType.encode(*constructor)?);
    }

    let removed = assembly
        .metadata_mut()
        .tables
        .retain::<CustomAttributeRaw>(|row| {
            row.parent != parent || !encoded.contains(&row.constructor)
        })?;
    log::debug!("Removed {removed} marker attributes from property {property}");
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        test::factories::{AssemblyFactory, PropertySpec},
        weaver::scanner::{marker_constructors, CandidateSet},
    };

    const MARKER: &str = "Engine.Wpf.NotifyPropertyChangedAttribute";

    #[test]
    fn strips_only_the_woven_property() {
        let fixture = AssemblyFactory::new()
            .property(PropertySpec::int32("A"))
            .property(PropertySpec::int32("B").with_other_attribute())
            .build();
        let mut assembly = CilAssembly::from_mem(fixture.image, None).unwrap();
        let attributes = assembly.metadata().tables.row_count(TableId::CustomAttribute);

        let constructors = marker_constructors(&assembly, MARKER).unwrap();
        let candidates: Vec<_> = CandidateSet::scan(&assembly, MARKER).unwrap().into_iter().collect();
        let b = candidates.iter().find(|candidate| candidate.name == "B").unwrap();

        assert_eq!(strip_markers(&mut assembly, b.property, &constructors).unwrap(), 1);
        assert_eq!(
            assembly.metadata().tables.row_count(TableId::CustomAttribute),
            attributes - 1
        );

        let remaining: Vec<_> = CandidateSet::scan(&assembly, MARKER).unwrap().into_iter().collect();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].name, "A");

        assert_eq!(strip_markers(&mut assembly, b.property, &constructors).unwrap(), 0);
    }

    #[test]
    fn strips_every_marker_of_a_property() {
        let fixture = AssemblyFactory::new()
            .property(PropertySpec::int32("X").marked_twice())
            .build();
        let mut assembly = CilAssembly::from_mem(fixture.image, None).unwrap();
        let attributes = assembly.metadata().tables.row_count(TableId::CustomAttribute);

        let constructors = marker_constructors(&assembly, MARKER).unwrap();
        let candidates: Vec<_> = CandidateSet::scan(&assembly, MARKER).unwrap().into_iter().collect();
        assert_eq!(candidates.len(), 1);

        assert_eq!(
            strip_markers(&mut assembly, candidates[0].property, &constructors).unwrap(),
            2
        );
        assert_eq!(
            assembly.metadata().tables.row_count(TableId::CustomAttribute),
            attributes - 2
        );
        assert_eq!(CandidateSet::scan(&assembly, MARKER).unwrap().into_iter().count(), 0);
    }
}
