//! Discovery of marked properties.
//!
//! Marker attributes are found through their constructors: every `CustomAttribute` row
//! names a `MethodDef` or `MemberRef` constructor, whose declaring type is compared against
//! the configured marker name. Rows attached to a `Property` produce a [`Candidate`]; the
//! candidates are ordered by declaring type, then by property.

use std::collections::{BTreeMap, HashMap};

use crate::{
    cilassembly::CilAssembly,
    metadata::{
        customattributes::parse_type_arguments,
        signatures::method_shape,
        tables::{
            CodedIndexType, CustomAttributeRaw, MemberRefRaw, MethodDefRaw, PropertyMapRaw,
            PropertyRaw, TableId, TypeDefRaw,
        },
        token::Token,
    },
    Result,
};

/// A marker attribute instance on a property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    /// The attribute's constructor, a `MethodDef` or `MemberRef` token
    pub constructor: Token,
    /// The comparer type named by the attribute, as written in the attribute blob
    pub comparer: Option<String>,
}

/// A property that requests weaving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// `Property` row
    pub property: u32,
    /// `TypeDef` row of the declaring type
    pub declaring_type: u32,
    /// Full name of the declaring type
    pub type_name: String,
    /// Property name
    pub name: String,
    /// The first marker on the property
    pub marker: Marker,
}

impl Candidate {
    /// `Type::Property`, the name used in reports and errors.
    #[must_use]
    pub fn display_name(&self) -> String {
        format!("{}::{}", self.type_name, self.name)
    }
}

/// The marked properties of a module, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    candidates: Vec<Candidate>,
}

impl CandidateSet {
    /// Scans `assembly` for properties carrying the attribute named `marker_attribute`.
    ///
    /// # Errors
    /// Returns format errors for damaged metadata and marker blobs that are not a list of
    /// `System.Type` arguments.
    pub fn scan(assembly: &CilAssembly, marker_attribute: &str) -> Result<CandidateSet> {
        let markers = find_markers(assembly, marker_attribute)?;
        if markers.is_empty() {
            return Ok(CandidateSet::default());
        }

        let metadata = assembly.metadata();
        let property_count = metadata.tables.row_count(TableId::Property);
        let mut maps: Vec<PropertyMapRaw> = metadata
            .tables
            .iter::<PropertyMapRaw>()
            .collect::<Result<_>>()?;
        let ends: Vec<u32> = maps
            .iter()
            .skip(1)
            .map(|map| map.property_list)
            .chain(std::iter::once(property_count + 1))
            .collect();
        let mut ranges: Vec<(u32, u32, u32)> = maps
            .drain(..)
            .zip(ends)
            .map(|(map, end)| (map.parent, map.property_list, end))
            .collect();
        ranges.sort_by_key(|(parent, _, _)| *parent);

        let mut candidates = Vec::with_capacity(markers.len());
        for (parent, start, end) in ranges {
            for property in start..end.min(property_count + 1) {
                let Some(marker) = markers.get(&property) else {
                    continue;
                };

                let row: PropertyRaw = metadata.tables.get(property)?;
                candidates.push(Candidate {
                    property,
                    declaring_type: parent,
                    type_name: assembly.type_name(Token::from_parts(TableId::TypeDef, parent))?,
                    name: metadata.strings.get(row.name)?.to_string(),
                    marker: marker.clone(),
                });
            }
        }

        log::debug!("Found {} marked properties", candidates.len());
        Ok(CandidateSet { candidates })
    }

    /// Number of candidates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// `true` if no property is marked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

impl IntoIterator for CandidateSet {
    type Item = Candidate;
    type IntoIter = std::vec::IntoIter<Candidate>;

    fn into_iter(self) -> Self::IntoIter {
        self.candidates.into_iter()
    }
}

/// Returns the marker constructors of the module: every constructor whose declaring type
/// is named `marker_attribute`.
///
/// # Errors
/// Returns format errors for damaged rows.
pub fn marker_constructors(assembly: &CilAssembly, marker_attribute: &str) -> Result<Vec<Token>> {
    let mut constructors = Vec::new();
    let mut seen = HashMap::new();
    for row in assembly.metadata().tables.iter::<CustomAttributeRaw>() {
        let row = row?;
        let constructor = CodedIndexType::CustomAttributeType.decode(row.constructor)?;
        if is_marker(assembly, constructor, marker_attribute, &mut seen)? && !constructors.contains(&constructor) {
            constructors.push(constructor);
        }
    }
    Ok(constructors)
}

fn find_markers(assembly: &CilAssembly, marker_attribute: &str) -> Result<BTreeMap<u32, Marker>> {
    let metadata = assembly.metadata();
    let mut seen = HashMap::new();
    let mut markers = BTreeMap::new();

    for row in metadata.tables.iter::<CustomAttributeRaw>() {
        let row = row?;
        let parent = CodedIndexType::HasCustomAttribute.decode(row.parent)?;
        let constructor = CodedIndexType::CustomAttributeType.decode(row.constructor)?;
        if !is_marker(assembly, constructor, marker_attribute, &mut seen)? {
            continue;
        }
        if !parent.is_table(TableId::Property) {
            log::debug!("Ignoring marker on {parent}, only properties are woven");
            continue;
        }
        if markers.contains_key(&parent.row()) {
            continue;
        }

        let param_count = constructor_params(assembly, constructor)?;
        let arguments = parse_type_arguments(metadata.blobs.get(row.value)?, param_count)?;
        markers.insert(
            parent.row(),
            Marker {
                constructor,
                comparer: arguments.first().map(str::to_string),
            },
        );
    }

    Ok(markers)
}

fn is_marker(
    assembly: &CilAssembly,
    constructor: Token,
    marker_attribute: &str,
    seen: &mut HashMap<Token, bool>,
) -> Result<bool> {
    if let Some(known) = seen.get(&constructor) {
        return Ok(*known);
    }

    let declaring = match constructor_owner(assembly, constructor)? {
        Some(owner) => assembly.type_name(owner)? == marker_attribute,
        None => false,
    };
    seen.insert(constructor, declaring);
    Ok(declaring)
}

/// The `TypeDef` or `TypeRef` declaring a constructor, `None` for other parents such as
/// `TypeSpec`.
fn constructor_owner(assembly: &CilAssembly, constructor: Token) -> Result<Option<Token>> {
    let metadata = assembly.metadata();
    if constructor.is_table(TableId::MemberRef) {
        let row: MemberRefRaw = metadata.tables.get(constructor.row())?;
        let class = CodedIndexType::MemberRefParent.decode(row.class)?;
        return Ok((class.is_table(TableId::TypeRef) || class.is_table(TableId::TypeDef))
            .then_some(class));
    }

    Ok(method_owner(assembly, constructor.row())?
        .map(|owner| Token::from_parts(TableId::TypeDef, owner)))
}

/// The `TypeDef` whose method list contains `method`.
///
/// # Errors
/// Returns format errors for damaged rows.
pub fn method_owner(assembly: &CilAssembly, method: u32) -> Result<Option<u32>> {
    let tables = &assembly.metadata().tables;
    let method_count = tables.row_count(TableId::MethodDef);
    let types: Vec<TypeDefRaw> = tables.iter::<TypeDefRaw>().collect::<Result<_>>()?;

    for (index, row) in types.iter().enumerate() {
        let end = types
            .get(index + 1)
            .map_or(method_count + 1, |next| next.method_list);
        if (row.method_list..end).contains(&method) {
            return Ok(Some(row.rid));
        }
    }
    Ok(None)
}

fn constructor_params(assembly: &CilAssembly, constructor: Token) -> Result<usize> {
    let metadata = assembly.metadata();
    let signature = if constructor.is_table(TableId::MemberRef) {
        let row: MemberRefRaw = metadata.tables.get(constructor.row())?;
        row.signature
    } else {
        let row: MethodDefRaw = metadata.tables.get(constructor.row())?;
        row.signature
    };
    Ok(method_shape(metadata.blobs.get(signature)?)?.params.len())
}
