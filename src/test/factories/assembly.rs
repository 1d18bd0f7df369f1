//! In-memory .NET libraries for tests.

use sha2::{Digest, Sha256};

use crate::{
    file::io::{align_up, pad_to, push_compressed_uint, push_le, write_le_to},
    metadata::{
        cor20header::CLI_HEADER_SIZE,
        image::MetadataImage,
        root::Root,
        signatures::{encode_type_def_or_ref, field_signature, ELEMENT_TYPE, SIGNATURE},
        tables::{
            AssemblyRefRaw, CodedIndexType, CustomAttributeRaw, FieldRaw, GenericParamRaw,
            MemberRefRaw, MethodDefRaw, MethodSemanticsRaw, ModuleRaw, NestedClassRaw,
            PropertyMapRaw, PropertyRaw, TableId, TypeDefRaw, TypeRefRaw,
        },
        token::Token,
    },
    test::factories::PdbFactory,
};

const DEFAULT_MARKER: &str = "Engine.Wpf.NotifyPropertyChangedAttribute";
const PE_OFFSET: usize = 0x80;
const HEADERS_SIZE: usize = 0x200;
const FILE_ALIGNMENT: usize = 0x200;
const SECTION_ALIGNMENT: usize = 0x2000;
const TEXT_RVA: usize = 0x2000;
const CERTIFICATE_SIZE: usize = 0x400;
const DEBUG_ENTRY_SIZE: usize = 28;
const PDB_ID: [u8; 20] = [
    0x9C, 0x41, 0x0B, 0x6E, 0x72, 0xD5, 0x4F, 0x18, 0xA3, 0x36, 0xE1, 0x0C, 0x58, 0x9B, 0x24,
    0x7A, 0x11, 0x22, 0x33, 0x44,
];

const FIELD_PRIVATE: u32 = 0x0001;
const FIELD_STATIC: u32 = 0x0010;
const METHOD_ACCESSOR: u32 = 0x0886;
const METHOD_PUBLIC: u32 = 0x0086;
const METHOD_CONSTRUCTOR: u32 = 0x1886;
const METHOD_STATIC: u32 = 0x0010;
const TYPE_PUBLIC: u32 = 0x0010_0001;
const TYPE_NESTED_PUBLIC: u32 = 0x0010_0002;

/// Shape of one property of `Sample.Model`.
#[derive(Debug, Clone)]
pub struct PropertySpec {
    name: String,
    property_type: Vec<u8>,
    backing_field: Option<String>,
    backing_field_type: Option<Vec<u8>>,
    markers: usize,
    comparer: Option<String>,
    has_setter: bool,
    indexed: bool,
    is_static: bool,
    duplicate_backing_field: bool,
    other_attribute: bool,
}

impl PropertySpec {
    fn new(name: &str, property_type: Vec<u8>) -> Self {
        PropertySpec {
            name: name.to_string(),
            property_type,
            backing_field: None,
            backing_field_type: None,
            markers: 1,
            comparer: None,
            has_setter: true,
            indexed: false,
            is_static: false,
            duplicate_backing_field: false,
            other_attribute: false,
        }
    }

    /// A marked `int` auto property.
    pub fn int32(name: &str) -> Self {
        Self::new(name, vec![ELEMENT_TYPE::I4])
    }

    /// A marked `string` auto property.
    pub fn string(name: &str) -> Self {
        Self::new(name, vec![ELEMENT_TYPE::STRING])
    }

    /// Drops the marker.
    pub fn unmarked(mut self) -> Self {
        self.markers = 0;
        self
    }

    /// Applies the marker twice.
    pub fn marked_twice(mut self) -> Self {
        self.markers = 2;
        self
    }

    /// Names a comparer type in the marker.
    pub fn compared_by(mut self, comparer: &str) -> Self {
        self.comparer = Some(comparer.to_string());
        self
    }

    /// Renames the backing field.
    pub fn backing_field(mut self, name: &str) -> Self {
        self.backing_field = Some(name.to_string());
        self
    }

    /// Gives the backing field a primitive type different from the property's.
    pub fn backing_field_type(mut self, element: u8) -> Self {
        self.backing_field_type = Some(vec![element]);
        self
    }

    /// Omits the setter.
    pub fn read_only(mut self) -> Self {
        self.has_setter = false;
        self
    }

    /// Adds an `int` index parameter.
    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    /// Makes the property, its accessors and its backing field static.
    pub fn static_property(mut self) -> Self {
        self.is_static = true;
        self
    }

    /// Declares the backing field twice.
    pub fn duplicate_backing_field(mut self) -> Self {
        self.duplicate_backing_field = true;
        self
    }

    /// Adds `[Browsable(false)]` next to the marker.
    pub fn with_other_attribute(mut self) -> Self {
        self.other_attribute = true;
        self
    }

    fn backing_name(&self) -> String {
        self.backing_field
            .clone()
            .unwrap_or_else(|| format!("<{}>k__BackingField", self.name))
    }

    /// `kind [count] return_type [index] [value]`, the shape shared by property and accessor
    /// signatures.
    fn signature(&self, kind: u8, return_type: &[u8], value: &[u8]) -> Vec<u8> {
        let index: &[u8] = if self.indexed { &[ELEMENT_TYPE::I4] } else { &[] };
        let mut signature = vec![if self.is_static {
            kind
        } else {
            kind | SIGNATURE::HASTHIS
        }];
        signature.push((index.len() + usize::from(!value.is_empty())) as u8);
        signature.extend_from_slice(return_type);
        signature.extend_from_slice(index);
        signature.extend_from_slice(value);
        signature
    }
}

/// An image built by [`AssemblyFactory`].
#[derive(Debug, Clone)]
pub struct Fixture {
    /// The PE image
    pub image: Vec<u8>,
    /// The Portable PDB, if symbols were requested
    pub pdb: Option<Vec<u8>>,
    setters: Vec<(String, u32)>,
}

impl Fixture {
    /// `MethodDef` row of the setter of `property`, zero if it has none.
    pub fn setter(&self, property: &str) -> u32 {
        self.setters
            .iter()
            .find(|(name, _)| name == property)
            .map_or(0, |(_, rid)| *rid)
    }
}

/// Builds `Sample.dll`.
#[derive(Debug, Clone)]
pub struct AssemblyFactory {
    properties: Vec<PropertySpec>,
    comparers: Vec<(String, bool)>,
    nested_comparer: bool,
    generic_model: bool,
    handler: Option<u8>,
    marker: String,
    symbols: bool,
    checksum: bool,
    certificate: bool,
    extra_sections: usize,
}

impl Default for AssemblyFactory {
    fn default() -> Self {
        Self::new()
    }
}

/// Method bodies waiting for their RVA.
#[derive(Default)]
struct Bodies {
    code: Vec<(u32, Vec<u8>)>,
}

impl Bodies {
    fn add(
        &mut self,
        metadata: &mut MetadataImage,
        flags: u32,
        name: &str,
        signature: &[u8],
        code: Vec<u8>,
    ) -> u32 {
        let method = MethodDefRaw {
            rid: 0,
            rva: 0,
            impl_flags: 0,
            flags,
            name: metadata.strings.add(name),
            signature: metadata.blobs.add(signature).unwrap(),
            param_list: 1,
        };
        let rid = metadata.tables.push(&method);
        self.code.push((rid, code));
        rid
    }
}

fn token_bytes(token: Token) -> [u8; 4] {
    token.value().to_le_bytes()
}

fn opcode_with_token(opcodes: &[u8], token: Token) -> Vec<u8> {
    let mut code = opcodes.to_vec();
    code.extend_from_slice(&token_bytes(token));
    code
}

impl AssemblyFactory {
    /// A library with a single marked `int X { get; set; }` on `Sample.Model`.
    pub fn new() -> Self {
        AssemblyFactory {
            properties: Vec::new(),
            comparers: Vec::new(),
            nested_comparer: false,
            generic_model: false,
            handler: Some(ELEMENT_TYPE::CLASS),
            marker: DEFAULT_MARKER.to_string(),
            symbols: false,
            checksum: false,
            certificate: false,
            extra_sections: 0,
        }
    }

    /// Adds a property; the default `X` is only generated when none is added.
    pub fn property(mut self, property: PropertySpec) -> Self {
        self.properties.push(property);
        self
    }

    /// Declares `Sample.<name>` with `get_Default` and an `Equals(int, int)` that always
    /// returns `true`.
    pub fn comparer(mut self, name: &str) -> Self {
        self.comparers.push((name.to_string(), true));
        self
    }

    /// Declares `Sample.<name>` with `get_Default` but no `Equals`.
    pub fn incomplete_comparer(mut self, name: &str) -> Self {
        self.comparers.push((name.to_string(), false));
        self
    }

    /// Declares the always-equal comparer `Sample.Model/Comparer`.
    pub fn nested_comparer(mut self, nested: bool) -> Self {
        self.nested_comparer = nested;
        self
    }

    /// Turns the model into ``Sample.Model`1<T>``.
    pub fn generic_model(mut self, generic: bool) -> Self {
        self.generic_model = generic;
        self
    }

    /// Type of the `PropertyChanged` field: `CLASS` for the delegate, another element type
    /// for a wrongly typed field, `None` for no field at all.
    pub fn handler(mut self, element: Option<u8>) -> Self {
        self.handler = element;
        self
    }

    /// Full name of the marker attribute type.
    pub fn marker(mut self, name: &str) -> Self {
        self.marker = name.to_string();
        self
    }

    /// Emits a Portable PDB plus `CodeView` and `PdbChecksum` debug entries.
    pub fn symbols(mut self, symbols: bool) -> Self {
        self.symbols = symbols;
        self
    }

    /// Stores a non-zero PE checksum.
    pub fn checksum(mut self, checksum: bool) -> Self {
        self.checksum = checksum;
        self
    }

    /// Appends an Authenticode certificate table.
    pub fn certificate(mut self, certificate: bool) -> Self {
        self.certificate = certificate;
        self
    }

    /// Adds `count` empty data sections after `.text`.
    pub fn extra_sections(mut self, count: usize) -> Self {
        self.extra_sections = count;
        self
    }

    /// Builds the image and, if requested, its symbols.
    pub fn build(self) -> Fixture {
        let properties = if self.properties.is_empty() {
            vec![PropertySpec::int32("X")]
        } else {
            self.properties.clone()
        };

        let mut metadata = MetadataImage::new("v4.0.30319");
        let module = ModuleRaw {
            rid: 0,
            generation: 0,
            name: metadata.strings.add("Sample.dll"),
            mvid: metadata
                .guids
                .add(uguid::guid!("5f0c6a8e-2b1d-4c3e-9a7f-0d1e2f3a4b5c")),
            enc_id: 0,
            enc_base_id: 0,
        };
        metadata.tables.push(&module);

        let runtime = assembly_ref(&mut metadata, "System.Runtime", 8, true);
        let object_model = assembly_ref(&mut metadata, "System.ObjectModel", 8, true);
        let marker_assembly = assembly_ref(&mut metadata, "Engine.Wpf", 1, false);

        let object = type_ref(&mut metadata, runtime, "System", "Object");
        let system_type = type_ref(&mut metadata, runtime, "System", "Type");
        let handler_type = type_ref(
            &mut metadata,
            object_model,
            "System.ComponentModel",
            "PropertyChangedEventHandler",
        );
        let (marker_namespace, marker_name) =
            self.marker.rsplit_once('.').unwrap_or(("", self.marker.as_str()));
        let marker_type = type_ref(&mut metadata, marker_assembly, marker_namespace, marker_name);

        let mut marker_signature = vec![SIGNATURE::HASTHIS, 0x01, ELEMENT_TYPE::VOID, ELEMENT_TYPE::CLASS];
        encode_type_def_or_ref(&mut marker_signature, system_type).unwrap();
        let marker_constructor = member_ref(&mut metadata, marker_type, ".ctor", &marker_signature);
        let object_constructor = member_ref(
            &mut metadata,
            object,
            ".ctor",
            &[SIGNATURE::HASTHIS, 0x00, ELEMENT_TYPE::VOID],
        );
        let browsable_constructor = if properties.iter().any(|spec| spec.other_attribute) {
            let browsable = type_ref(&mut metadata, runtime, "System.ComponentModel", "BrowsableAttribute");
            Some(member_ref(
                &mut metadata,
                browsable,
                ".ctor",
                &[SIGNATURE::HASTHIS, 0x01, ELEMENT_TYPE::VOID, ELEMENT_TYPE::BOOLEAN],
            ))
        } else {
            None
        };

        let object_extends = CodedIndexType::TypeDefOrRef.encode(object).unwrap();
        let module_type = TypeDefRaw {
            rid: 0,
            flags: 0,
            type_name: metadata.strings.add("<Module>"),
            type_namespace: 0,
            extends: 0,
            field_list: 1,
            method_list: 1,
        };
        metadata.tables.push(&module_type);
        let model = TypeDefRaw {
            rid: 0,
            flags: TYPE_PUBLIC,
            type_name: metadata
                .strings
                .add(if self.generic_model { "Model`1" } else { "Model" }),
            type_namespace: metadata.strings.add("Sample"),
            extends: object_extends,
            field_list: 1,
            method_list: 1,
        };
        let model = metadata.tables.push(&model);

        let mut backing_fields = Vec::with_capacity(properties.len());
        for spec in &properties {
            let field_type = spec
                .backing_field_type
                .clone()
                .unwrap_or_else(|| spec.property_type.clone());
            let field = FieldRaw {
                rid: 0,
                flags: FIELD_PRIVATE | if spec.is_static { FIELD_STATIC } else { 0 },
                name: metadata.strings.add(&spec.backing_name()),
                signature: metadata.blobs.add(&field_signature(&field_type)).unwrap(),
            };
            let rid = metadata.tables.push(&field);
            if spec.duplicate_backing_field {
                metadata.tables.push(&field);
            }
            backing_fields.push(Token::from_parts(TableId::Field, rid));
        }
        if let Some(element) = self.handler {
            let mut field_type = vec![element];
            if element == ELEMENT_TYPE::CLASS {
                encode_type_def_or_ref(&mut field_type, handler_type).unwrap();
            }
            let handler = FieldRaw {
                rid: 0,
                flags: FIELD_PRIVATE,
                name: metadata.strings.add("PropertyChanged"),
                signature: metadata.blobs.add(&field_signature(&field_type)).unwrap(),
            };
            metadata.tables.push(&handler);
        }

        let mut bodies = Bodies::default();
        bodies.add(
            &mut metadata,
            METHOD_CONSTRUCTOR,
            ".ctor",
            &[SIGNATURE::HASTHIS, 0x00, ELEMENT_TYPE::VOID],
            opcode_with_token(&[0x02, 0x28], object_constructor)
                .into_iter()
                .chain([0x2A])
                .collect(),
        );

        let mut accessors = Vec::with_capacity(properties.len());
        let mut setters = Vec::new();
        for (spec, field) in properties.iter().zip(&backing_fields) {
            let flags = METHOD_ACCESSOR | if spec.is_static { METHOD_STATIC } else { 0 };
            let load = if spec.is_static {
                opcode_with_token(&[0x7E], *field)
            } else {
                opcode_with_token(&[0x02, 0x7B], *field)
            };
            let getter = bodies.add(
                &mut metadata,
                flags,
                &format!("get_{}", spec.name),
                &spec.signature(SIGNATURE::DEFAULT, &spec.property_type, &[]),
                load.into_iter().chain([0x2A]).collect(),
            );

            let setter = if spec.has_setter {
                let value = if spec.indexed { 0x04 } else { 0x03 };
                let store = if spec.is_static {
                    opcode_with_token(&[0x02, 0x80], *field)
                } else {
                    opcode_with_token(&[0x02, value, 0x7D], *field)
                };
                let rid = bodies.add(
                    &mut metadata,
                    flags,
                    &format!("set_{}", spec.name),
                    &spec.signature(SIGNATURE::DEFAULT, &[ELEMENT_TYPE::VOID], &spec.property_type),
                    store.into_iter().chain([0x2A]).collect(),
                );
                setters.push((spec.name.clone(), rid));
                Some(rid)
            } else {
                None
            };
            accessors.push((getter, setter));
        }

        for (name, complete) in &self.comparers {
            push_comparer(
                &mut metadata,
                &mut bodies,
                "Sample",
                name,
                TYPE_PUBLIC,
                object_extends,
                *complete,
            );
        }
        if self.nested_comparer {
            let comparer = push_comparer(
                &mut metadata,
                &mut bodies,
                "",
                "Comparer",
                TYPE_NESTED_PUBLIC,
                object_extends,
                true,
            );
            metadata.tables.push(&NestedClassRaw {
                rid: 0,
                nested_class: comparer,
                enclosing_class: model,
            });
        }

        if self.generic_model {
            let owner = CodedIndexType::TypeOrMethodDef
                .encode(Token::from_parts(TableId::TypeDef, model))
                .unwrap();
            let parameter = GenericParamRaw {
                rid: 0,
                number: 0,
                flags: 0,
                owner,
                name: metadata.strings.add("T"),
            };
            metadata.tables.push(&parameter);
        }

        metadata.tables.push(&PropertyMapRaw {
            rid: 0,
            parent: model,
            property_list: 1,
        });
        let mut attributes = Vec::new();
        for (spec, (getter, setter)) in properties.iter().zip(&accessors) {
            let signature = spec.signature(SIGNATURE::PROPERTY, &spec.property_type, &[]);
            let property = PropertyRaw {
                rid: 0,
                flags: 0,
                name: metadata.strings.add(&spec.name),
                signature: metadata.blobs.add(&signature).unwrap(),
            };
            let property = Token::from_parts(TableId::Property, metadata.tables.push(&property));
            let association = CodedIndexType::HasSemantics.encode(property).unwrap();

            if let Some(setter) = setter {
                metadata.tables.push(&MethodSemanticsRaw {
                    rid: 0,
                    semantics: 0x0001,
                    method: *setter,
                    association,
                });
            }
            metadata.tables.push(&MethodSemanticsRaw {
                rid: 0,
                semantics: 0x0002,
                method: *getter,
                association,
            });

            let parent = CodedIndexType::HasCustomAttribute.encode(property).unwrap();
            for _ in 0..spec.markers {
                attributes.push(CustomAttributeRaw {
                    rid: 0,
                    parent,
                    constructor: CodedIndexType::CustomAttributeType
                        .encode(marker_constructor)
                        .unwrap(),
                    value: metadata
                        .blobs
                        .add(&marker_value(spec.comparer.as_deref()))
                        .unwrap(),
                });
            }
            if let (true, Some(browsable)) = (spec.other_attribute, browsable_constructor) {
                attributes.push(CustomAttributeRaw {
                    rid: 0,
                    parent,
                    constructor: CodedIndexType::CustomAttributeType.encode(browsable).unwrap(),
                    value: metadata.blobs.add(&[0x01, 0x00, 0x00, 0x00, 0x00]).unwrap(),
                });
            }
        }
        attributes.sort_by_key(|attribute| attribute.parent);
        for attribute in &attributes {
            metadata.tables.push(attribute);
        }

        // .text: CLI header, bodies, metadata, debug directory
        let mut text = vec![0_u8; CLI_HEADER_SIZE];
        for (rid, code) in &bodies.code {
            pad_to(&mut text, 4);
            let mut method: MethodDefRaw = metadata.tables.get(*rid).unwrap();
            method.rva = (TEXT_RVA + text.len()) as u32;
            metadata.tables.update(&method).unwrap();
            text.push(((code.len() as u8) << 2) | 0x02);
            text.extend_from_slice(code);
        }

        pad_to(&mut text, 4);
        let metadata_rva = TEXT_RVA + text.len();
        let metadata_bytes = metadata.write().unwrap();
        text.extend_from_slice(&metadata_bytes);

        let mut cli_header = Vec::with_capacity(CLI_HEADER_SIZE);
        push_le(&mut cli_header, CLI_HEADER_SIZE as u32);
        push_le(&mut cli_header, 2_u16);
        push_le(&mut cli_header, 5_u16);
        push_le(&mut cli_header, metadata_rva as u32);
        push_le(&mut cli_header, metadata_bytes.len() as u32);
        push_le(&mut cli_header, 0x0000_0001_u32);
        text[..cli_header.len()].copy_from_slice(&cli_header);

        let pdb = self.symbols.then(|| {
            let mut factory = PdbFactory::new()
                .id(PDB_ID)
                .type_system_rows(metadata.tables.row_counts());
            for (index, (getter, setter)) in accessors.iter().enumerate() {
                let line = 12 + 2 * index as u32;
                factory = factory.method(*getter, Some((line, 28, line, 32)));
                if let Some(setter) = setter {
                    let size = bodies
                        .code
                        .iter()
                        .find(|(rid, _)| rid == setter)
                        .map_or(0, |(_, code)| code.len() as u32);
                    factory = factory
                        .method(*setter, Some((line, 33, line, 37)))
                        .scope(*setter, 0, size);
                }
            }
            factory.build()
        });

        let mut debug_directory = None;
        if let Some(pdb) = &pdb {
            pad_to(&mut text, 4);
            let directory = text.len();
            text.resize(directory + 2 * DEBUG_ENTRY_SIZE, 0);

            let codeview = text.len();
            text.extend_from_slice(b"RSDS");
            text.extend_from_slice(&PDB_ID[..16]);
            push_le(&mut text, 1_u32);
            text.extend_from_slice(b"Sample.pdb\0");
            let codeview_size = text.len() - codeview;

            pad_to(&mut text, 4);
            let checksum = text.len();
            text.extend_from_slice(b"SHA256\0");
            text.extend_from_slice(&pdb_checksum(pdb));
            let checksum_size = text.len() - checksum;

            let stamp = u32::from_le_bytes([PDB_ID[16], PDB_ID[17], PDB_ID[18], PDB_ID[19]]);
            let entries = [
                (0x0100_u16, 0x504D_u16, 2_u32, codeview, codeview_size),
                (0x0001, 0x0000, 19, checksum, checksum_size),
            ];
            for (index, (major, minor, kind, start, size)) in entries.into_iter().enumerate() {
                let mut entry = Vec::with_capacity(DEBUG_ENTRY_SIZE);
                push_le(&mut entry, 0_u32);
                push_le(&mut entry, stamp);
                push_le(&mut entry, major);
                push_le(&mut entry, minor);
                push_le(&mut entry, kind);
                push_le(&mut entry, size as u32);
                push_le(&mut entry, (TEXT_RVA + start) as u32);
                push_le(&mut entry, (HEADERS_SIZE + start) as u32);
                let offset = directory + index * DEBUG_ENTRY_SIZE;
                text[offset..offset + DEBUG_ENTRY_SIZE].copy_from_slice(&entry);
            }
            debug_directory = Some(((TEXT_RVA + directory) as u32, (2 * DEBUG_ENTRY_SIZE) as u32));
        }

        // (name, virtual address, virtual size, raw data, characteristics)
        let mut sections = vec![(*b".text\0\0\0", TEXT_RVA, text.len(), text, 0x6000_0020_u32)];
        let extra_names = [*b".rsrc\0\0\0", *b".reloc\0\0", *b".sdata\0\0", *b".tls\0\0\0\0"];
        for index in 0..self.extra_sections {
            let (_, rva, size, _, _) = &sections[sections.len() - 1];
            let rva = align_up(rva + size, SECTION_ALIGNMENT);
            sections.push((
                extra_names[index % extra_names.len()],
                rva,
                0x10,
                vec![0xEE; 0x10],
                0x4000_0040,
            ));
        }

        let mut image = Vec::new();
        let mut section_headers = Vec::new();
        let mut raw_pointer = HEADERS_SIZE;
        let mut initialized_data = 0;
        for (name, rva, virtual_size, data, characteristics) in &sections {
            let raw_size = align_up(data.len(), FILE_ALIGNMENT);
            section_headers.extend_from_slice(name);
            push_le(&mut section_headers, *virtual_size as u32);
            push_le(&mut section_headers, *rva as u32);
            push_le(&mut section_headers, raw_size as u32);
            push_le(&mut section_headers, raw_pointer as u32);
            push_le(&mut section_headers, 0_u32);
            push_le(&mut section_headers, 0_u32);
            push_le(&mut section_headers, 0_u16);
            push_le(&mut section_headers, 0_u16);
            push_le(&mut section_headers, *characteristics);

            image.resize(raw_pointer, 0);
            image.extend_from_slice(data);
            raw_pointer += raw_size;
            image.resize(raw_pointer, 0);
            if *characteristics & 0x20 == 0 {
                initialized_data += raw_size;
            }
        }
        let code_size = align_up(sections[0].3.len(), FILE_ALIGNMENT);
        let image_size = sections
            .last()
            .map_or(SECTION_ALIGNMENT, |(_, rva, size, _, _)| align_up(rva + size, SECTION_ALIGNMENT));

        let mut directories = [(0_u32, 0_u32); 16];
        directories[14] = (TEXT_RVA as u32, CLI_HEADER_SIZE as u32);
        if let Some(debug) = debug_directory {
            directories[6] = debug;
        }
        if self.certificate {
            directories[4] = (image.len() as u32, CERTIFICATE_SIZE as u32);
            push_le(&mut image, CERTIFICATE_SIZE as u32);
            push_le(&mut image, 0x0200_u16);
            push_le(&mut image, 0x0002_u16);
            image.resize(image.len() + CERTIFICATE_SIZE - 8, 0x30);
        }

        let mut headers = vec![0_u8; PE_OFFSET];
        headers[..2].copy_from_slice(b"MZ");
        write_le_to(&mut headers, 0x3C, PE_OFFSET as u32).unwrap();
        headers.extend_from_slice(b"PE\0\0");

        push_le(&mut headers, 0x014C_u16);
        push_le(&mut headers, sections.len() as u16);
        push_le(&mut headers, 0x6520_F3A1_u32);
        push_le(&mut headers, 0_u32);
        push_le(&mut headers, 0_u32);
        push_le(&mut headers, 0x00E0_u16);
        push_le(&mut headers, 0x2102_u16);

        push_le(&mut headers, 0x010B_u16);
        push_le(&mut headers, 48_u8);
        push_le(&mut headers, 0_u8);
        push_le(&mut headers, code_size as u32);
        push_le(&mut headers, initialized_data as u32);
        push_le(&mut headers, 0_u32);
        push_le(&mut headers, 0_u32);
        push_le(&mut headers, TEXT_RVA as u32);
        push_le(&mut headers, 0_u32);
        push_le(&mut headers, 0x1000_0000_u32);
        push_le(&mut headers, SECTION_ALIGNMENT as u32);
        push_le(&mut headers, FILE_ALIGNMENT as u32);
        for version in [4_u16, 0, 0, 0, 4, 0] {
            push_le(&mut headers, version);
        }
        push_le(&mut headers, 0_u32);
        push_le(&mut headers, image_size as u32);
        push_le(&mut headers, HEADERS_SIZE as u32);
        push_le(&mut headers, if self.checksum { 0x0001_B7C5_u32 } else { 0 });
        push_le(&mut headers, 0x0003_u16);
        push_le(&mut headers, 0x8540_u16);
        for size in [0x0010_0000_u32, 0x1000, 0x0010_0000, 0x1000, 0] {
            push_le(&mut headers, size);
        }
        push_le(&mut headers, directories.len() as u32);
        for (rva, size) in directories {
            push_le(&mut headers, rva);
            push_le(&mut headers, size);
        }

        headers.extend_from_slice(&section_headers);
        assert!(headers.len() <= HEADERS_SIZE, "section table does not fit the headers");
        image[..headers.len()].copy_from_slice(&headers);

        Fixture {
            image,
            pdb,
            setters,
        }
    }
}

fn assembly_ref(metadata: &mut MetadataImage, name: &str, major: u32, framework: bool) -> Token {
    let public_key_token = if framework {
        metadata
            .blobs
            .add(&[0xB0, 0x3F, 0x5F, 0x7F, 0x11, 0xD5, 0x0A, 0x3A])
            .unwrap()
    } else {
        0
    };
    let row = AssemblyRefRaw {
        rid: 0,
        major_version: major,
        minor_version: 0,
        build_number: 0,
        revision_number: 0,
        flags: 0,
        public_key_or_token: public_key_token,
        name: metadata.strings.add(name),
        culture: 0,
        hash_value: 0,
    };
    Token::from_parts(TableId::AssemblyRef, metadata.tables.push(&row))
}

fn type_ref(metadata: &mut MetadataImage, scope: Token, namespace: &str, name: &str) -> Token {
    let row = TypeRefRaw {
        rid: 0,
        resolution_scope: CodedIndexType::ResolutionScope.encode(scope).unwrap(),
        type_name: metadata.strings.add(name),
        type_namespace: metadata.strings.add(namespace),
    };
    Token::from_parts(TableId::TypeRef, metadata.tables.push(&row))
}

fn member_ref(metadata: &mut MetadataImage, class: Token, name: &str, signature: &[u8]) -> Token {
    let row = MemberRefRaw {
        rid: 0,
        class: CodedIndexType::MemberRefParent.encode(class).unwrap(),
        name: metadata.strings.add(name),
        signature: metadata.blobs.add(signature).unwrap(),
    };
    Token::from_parts(TableId::MemberRef, metadata.tables.push(&row))
}

/// Declares a comparer type whose `Equals(int, int)` always returns `true`.
fn push_comparer(
    metadata: &mut MetadataImage,
    bodies: &mut Bodies,
    namespace: &str,
    name: &str,
    flags: u32,
    extends: u32,
    complete: bool,
) -> u32 {
    let row = TypeDefRaw {
        rid: 0,
        flags,
        type_name: metadata.strings.add(name),
        type_namespace: metadata.strings.add(namespace),
        extends,
        field_list: metadata.tables.row_count(TableId::Field) + 1,
        method_list: metadata.tables.row_count(TableId::MethodDef) + 1,
    };
    let rid = metadata.tables.push(&row);
    let comparer = Token::from_parts(TableId::TypeDef, rid);

    let constructor = bodies.add(
        metadata,
        METHOD_CONSTRUCTOR,
        ".ctor",
        &[SIGNATURE::HASTHIS, 0x00, ELEMENT_TYPE::VOID],
        vec![0x2A],
    );

    let mut accessor_signature = vec![SIGNATURE::DEFAULT, 0x00, ELEMENT_TYPE::CLASS];
    encode_type_def_or_ref(&mut accessor_signature, comparer).unwrap();
    bodies.add(
        metadata,
        METHOD_ACCESSOR | METHOD_STATIC,
        "get_Default",
        &accessor_signature,
        opcode_with_token(&[0x73], Token::from_parts(TableId::MethodDef, constructor))
            .into_iter()
            .chain([0x2A])
            .collect(),
    );

    if complete {
        bodies.add(
            metadata,
            METHOD_PUBLIC,
            "Equals",
            &[
                SIGNATURE::HASTHIS,
                0x02,
                ELEMENT_TYPE::BOOLEAN,
                ELEMENT_TYPE::I4,
                ELEMENT_TYPE::I4,
            ],
            vec![0x17, 0x2A],
        );
    }
    rid
}

/// `[Marker]` or `[Marker(typeof(comparer))]`.
fn marker_value(comparer: Option<&str>) -> Vec<u8> {
    let mut value = vec![0x01, 0x00];
    match comparer {
        Some(comparer) => {
            push_compressed_uint(&mut value, comparer.len() as u32).unwrap();
            value.extend_from_slice(comparer.as_bytes());
        }
        None => value.push(0xFF),
    }
    value.extend_from_slice(&[0x00, 0x00]);
    value
}

fn pdb_checksum(pdb: &[u8]) -> [u8; 32] {
    let root = Root::read(pdb).unwrap();
    let mut data = pdb.to_vec();
    if let Some(stream) = root.stream_headers.iter().find(|header| header.name == "#Pdb") {
        let start = stream.offset as usize;
        data[start..start + 20].fill(0);
    }
    Sha256::digest(&data).into()
}
