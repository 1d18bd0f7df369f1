//! Setter body synthesis.
//!
//! The new setter is described as a short list of typed basic blocks, each a run of
//! [`Op`]s closed by an [`Exit`], and lowered by a [`BlockEmitter`]. For
//! `Name { set; }` with backing field `f`, handler field `h` and comparer `c`:
//!
//! ```text
//! compare: c.get_Default(); ldarg.0; ldfld f; ldarg.1; callvirt c.Equals  -> brtrue  return
//! store:   ldarg.0; ldarg.1; stfld f; ldarg.0; ldfld h; stloc.0; ldloc.0   -> brfalse return
//! notify:  ldloc.0; ldarg.0; ldstr "Name"; newobj PropertyChangedEventArgs(string);
//!          callvirt PropertyChangedEventHandler.Invoke
//! return:  ret
//! ```
//!
//! The handler is copied into local 0 before the null check so the invocation uses the
//! value that was checked.

use crate::{
    assembly::{decode_stream, FlowType, InstructionEncoder, Operand},
    cilassembly::CilAssembly,
    file::parser::Parser,
    metadata::{
        method::{FieldModifiers, MethodModifiers, MethodSemanticsFlags},
        signatures::{
            class_token, class_type, field_type, generic_instance, generic_var, local_signature,
            method_shape, method_signature, property_signature, ELEMENT_TYPE,
        },
        tables::{
            CodedIndexType, FieldRaw, GenericParamRaw, MethodDefRaw, MethodSemanticsRaw,
            PropertyRaw, TableId, TypeDefRaw,
        },
        token::Token,
    },
    weaver::{
        comparer::{self, ResolvedComparer},
        scanner::Candidate,
        WeaverConfig,
    },
    Result,
};

const HANDLER_TYPE: &str = "System.ComponentModel.PropertyChangedEventHandler";
const ARGS_NAMESPACE: &str = "System.ComponentModel";
const ARGS_NAME: &str = "PropertyChangedEventArgs";

/// Index of a [`Block`] in a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub usize);

/// A straight-line operation of a setter template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// Push `this`
    LoadThis,
    /// Push the incoming value
    LoadValue,
    /// Replace the object on the stack with the value of an instance field
    LoadField(Token),
    /// Store a value into an instance field of an object, popping both
    StoreField(Token),
    /// Push a local
    LoadLocal(u16),
    /// Pop into a local
    StoreLocal(u16),
    /// Push a string literal, given as its `#US` token
    LoadString(Token),
    /// `call` of a static method
    CallStatic {
        /// Callee
        method: Token,
        /// Number of arguments
        args: u8,
        /// `true` if the callee returns a value
        returns: bool,
    },
    /// `callvirt` of an instance method
    CallVirtual {
        /// Callee
        method: Token,
        /// Number of arguments, including `this`
        args: u8,
        /// `true` if the callee returns a value
        returns: bool,
    },
    /// `newobj`
    NewObject {
        /// Constructor
        constructor: Token,
        /// Number of arguments, excluding the new object
        args: u8,
    },
}

/// How control leaves a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// Continue with the next block
    FallThrough,
    /// Pop a value and jump if it is true
    BranchIfTrue(BlockId),
    /// Pop a value and jump if it is false or null
    BranchIfFalse(BlockId),
    /// Return from the method
    Return,
}

/// A basic block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Identity used by branches
    pub id: BlockId,
    /// Operations in order
    pub ops: Vec<Op>,
    /// The terminating transfer of control
    pub exit: Exit,
}

/// Lowers basic blocks into a method body.
pub trait BlockEmitter {
    /// Result of lowering, e.g. encoded bytes
    type Output;

    /// Appends `block`.
    ///
    /// # Errors
    /// Implementation specific; typically stack errors.
    fn emit_block(&mut self, block: &Block) -> Result<()>;

    /// Completes the body.
    ///
    /// # Errors
    /// Implementation specific; typically unresolved branches.
    fn finish(self) -> Result<Self::Output>;
}

/// A [`BlockEmitter`] producing CIL bytes and the maximum stack depth.
#[derive(Debug, Default)]
pub struct CilEmitter {
    encoder: InstructionEncoder,
}

impl CilEmitter {
    /// Creates an empty emitter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn label(id: BlockId) -> String {
        format!("block_{}", id.0)
    }

    fn emit_op(&mut self, op: Op) -> Result<()> {
        let encoder = &mut self.encoder;
        match op {
            Op::LoadThis => encoder.emit_ldarg(0),
            Op::LoadValue => encoder.emit_ldarg(1),
            Op::LoadField(field) => encoder.emit_instruction("ldfld", Some(Operand::Token(field))),
            Op::StoreField(field) => encoder.emit_instruction("stfld", Some(Operand::Token(field))),
            Op::LoadLocal(index) => encoder.emit_ldloc(index),
            Op::StoreLocal(index) => encoder.emit_stloc(index),
            Op::LoadString(text) => encoder.emit_instruction("ldstr", Some(Operand::Token(text))),
            Op::CallStatic {
                method,
                args,
                returns,
            } => encoder.emit_call("call", Operand::Token(method), args, returns),
            Op::CallVirtual {
                method,
                args,
                returns,
            } => encoder.emit_call("callvirt", Operand::Token(method), args, returns),
            Op::NewObject { constructor, args } => {
                encoder.emit_call("newobj", Operand::Token(constructor), args, true)
            }
        }
    }
}

impl BlockEmitter for CilEmitter {
    type Output = (Vec<u8>, u16);

    fn emit_block(&mut self, block: &Block) -> Result<()> {
        self.encoder.define_label(&Self::label(block.id))?;
        for op in &block.ops {
            self.emit_op(*op)?;
        }

        match block.exit {
            Exit::FallThrough => Ok(()),
            Exit::BranchIfTrue(target) => self.encoder.emit_branch("brtrue.s", &Self::label(target)),
            Exit::BranchIfFalse(target) => {
                self.encoder.emit_branch("brfalse.s", &Self::label(target))
            }
            Exit::Return => self.encoder.emit_instruction("ret", None),
        }
    }

    fn finish(self) -> Result<Self::Output> {
        self.encoder.finalize()
    }
}

/// The tokens a notifying setter is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetterTemplate {
    /// The backing field, a `Field` or a `MemberRef` on the instantiated declaring type
    pub backing_field: Token,
    /// The `PropertyChanged` field, same forms as `backing_field`
    pub handler_field: Token,
    /// `PropertyChangedEventHandler::Invoke`
    pub handler_invoke: Token,
    /// `PropertyChangedEventArgs::.ctor(string)`
    pub args_constructor: Token,
    /// `#US` token of the property name
    pub property_name: Token,
    /// The comparer members
    pub comparer: ResolvedComparer,
}

impl SetterTemplate {
    /// The blocks of the setter body. Local 0 holds the handler.
    #[must_use]
    pub fn blocks(&self) -> Vec<Block> {
        let ret = BlockId(3);
        vec![
            Block {
                id: BlockId(0),
                ops: vec![
                    Op::CallStatic {
                        method: self.comparer.accessor,
                        args: 0,
                        returns: true,
                    },
                    Op::LoadThis,
                    Op::LoadField(self.backing_field),
                    Op::LoadValue,
                    Op::CallVirtual {
                        method: self.comparer.equals,
                        args: 3,
                        returns: true,
                    },
                ],
                exit: Exit::BranchIfTrue(ret),
            },
            Block {
                id: BlockId(1),
                ops: vec![
                    Op::LoadThis,
                    Op::LoadValue,
                    Op::StoreField(self.backing_field),
                    Op::LoadThis,
                    Op::LoadField(self.handler_field),
                    Op::StoreLocal(0),
                    Op::LoadLocal(0),
                ],
                exit: Exit::BranchIfFalse(ret),
            },
            Block {
                id: BlockId(2),
                ops: vec![
                    Op::LoadLocal(0),
                    Op::LoadThis,
                    Op::LoadString(self.property_name),
                    Op::NewObject {
                        constructor: self.args_constructor,
                        args: 1,
                    },
                    Op::CallVirtual {
                        method: self.handler_invoke,
                        args: 3,
                        returns: false,
                    },
                ],
                exit: Exit::FallThrough,
            },
            Block {
                id: ret,
                ops: Vec::new(),
                exit: Exit::Return,
            },
        ]
    }

    /// Lowers the template through `emitter`.
    ///
    /// # Errors
    /// Returns the emitter's errors.
    pub fn emit<E: BlockEmitter>(&self, mut emitter: E) -> Result<E::Output> {
        for block in self.blocks() {
            emitter.emit_block(&block)?;
        }
        emitter.finish()
    }
}

/// Checks an emitted body: it decodes completely, ends with its only `ret`, and every branch
/// jumps forward to an instruction start.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] describing the first violation.
pub fn verify(code: &[u8]) -> Result<()> {
    let instructions = decode_stream(&mut Parser::new(code))?;

    let returns = instructions
        .iter()
        .filter(|instruction| instruction.flow_type == FlowType::Return)
        .count();
    if returns != 1 {
        return Err(malformed_error!("Body has {} ret instructions", returns));
    }
    if instructions.last().map(|last| last.flow_type) != Some(FlowType::Return) {
        return Err(malformed_error!("Body does not end with ret"));
    }

    for instruction in &instructions {
        for target in &instruction.branch_targets {
            if *target <= instruction.offset {
                return Err(malformed_error!(
                    "Branch at IL_{:04x} jumps backwards",
                    instruction.offset
                ));
            }
            if !instructions.iter().any(|candidate| candidate.offset == *target) {
                return Err(malformed_error!(
                    "Branch at IL_{:04x} targets IL_{:04x}, inside an instruction",
                    instruction.offset,
                    target
                ));
            }
        }
    }
    Ok(())
}

/// Replaces the setter of `candidate` with a notifying setter.
///
/// # Errors
/// Returns [`crate::Error::Synthesis`] when the property does not have the expected shape
/// and [`crate::Error::Resolution`] when its comparer cannot be resolved.
pub fn synthesize(
    assembly: &mut CilAssembly,
    candidate: &Candidate,
    config: &WeaverConfig,
) -> Result<()> {
    let property = candidate.display_name();

    let row: PropertyRaw = assembly.metadata().tables.get(candidate.property)?;
    let signature = assembly.metadata().blobs.get(row.signature)?.to_vec();
    let signature = property_signature(&signature)?;
    if !signature.has_this {
        return Err(synthesis_error!(property, "static properties are not supported"));
    }
    if signature.param_count != 0 {
        return Err(synthesis_error!(property, "indexed properties are not supported"));
    }
    let property_type = signature.property_type.to_vec();

    let setter = find_setter(assembly, candidate)?;

    let backing_name = config.backing_field_name(&candidate.name);
    let backing = find_field(assembly, candidate, &backing_name)?;
    let backing_type = field_type(assembly.metadata().blobs.get(backing.signature)?)?;
    if backing_type != property_type.as_slice() {
        return Err(synthesis_error!(
            property,
            "backing field '{}' does not have the property's type",
            backing_name
        ));
    }

    let handler = find_field(assembly, candidate, &config.handler_field)?;
    let handler_type = field_type(assembly.metadata().blobs.get(handler.signature)?)?.to_vec();
    let handler_class = class_token(&handler_type).ok();
    let handler_class = match handler_class {
        Some(class) if assembly.type_name(class).ok().as_deref() == Some(HANDLER_TYPE) => class,
        _ => {
            return Err(synthesis_error!(
                property,
                "field '{}' is not a {}",
                config.handler_field,
                HANDLER_TYPE
            ))
        }
    };

    let comparer = comparer::resolve(assembly, candidate, &property_type)?;

    let backing_field = field_reference(assembly, candidate, &backing)?;
    let handler_field = field_reference(assembly, candidate, &handler)?;

    let args_type = match assembly.find_type_ref(ARGS_NAMESPACE, ARGS_NAME)? {
        Some(existing) => existing,
        None if handler_class.is_table(TableId::TypeRef) => {
            let scope = assembly.type_ref_scope(handler_class)?;
            assembly.import_type_ref(scope, ARGS_NAMESPACE, ARGS_NAME)?
        }
        None => {
            return Err(synthesis_error!(
                property,
                "{} is not referenced by the module",
                ARGS_NAME
            ))
        }
    };

    let args_class = class_type(args_type)?;
    let invoke_signature = method_signature(
        true,
        &[ELEMENT_TYPE::VOID],
        &[&[ELEMENT_TYPE::OBJECT], &args_class],
    )?;
    let handler_invoke = assembly.import_member_ref(handler_class, "Invoke", &invoke_signature)?;
    let constructor_signature =
        method_signature(true, &[ELEMENT_TYPE::VOID], &[&[ELEMENT_TYPE::STRING]])?;
    let args_constructor = assembly.import_member_ref(args_type, ".ctor", &constructor_signature)?;
    let property_name = assembly.import_user_string(&candidate.name)?;
    let locals = assembly.import_local_signature(&local_signature(&[&handler_type])?)?;

    let template = SetterTemplate {
        backing_field,
        handler_field,
        handler_invoke,
        args_constructor,
        property_name,
        comparer,
    };
    let (code, max_stack) = template
        .emit(CilEmitter::new())
        .map_err(|error| synthesis_error!(property, "emitting the setter failed: {}", error))?;
    verify(&code)
        .map_err(|error| synthesis_error!(property, "emitted setter is invalid: {}", error))?;

    assembly.set_method_body(setter, &code, max_stack, locals)?;
    log::debug!("{property}: setter {setter} replaced with {} bytes of IL", code.len());
    Ok(())
}

fn find_setter(assembly: &CilAssembly, candidate: &Candidate) -> Result<u32> {
    let property = candidate.display_name();
    let metadata = assembly.metadata();
    let association = CodedIndexType::HasSemantics
        .encode(Token::from_parts(TableId::Property, candidate.property))?;

    let mut setter = None;
    for row in metadata.tables.iter::<MethodSemanticsRaw>() {
        let row = row?;
        if row.association == association
            && MethodSemanticsFlags::from_bits_truncate(row.semantics)
                .contains(MethodSemanticsFlags::SETTER)
        {
            setter = Some(row.method);
            break;
        }
    }
    let Some(setter) = setter else {
        return Err(synthesis_error!(property, "property has no setter"));
    };

    let method: MethodDefRaw = metadata.tables.get(setter)?;
    if MethodModifiers::from_bits_truncate(method.flags).contains(MethodModifiers::STATIC) {
        return Err(synthesis_error!(property, "static setters are not supported"));
    }
    if method.rva == 0 {
        return Err(synthesis_error!(property, "setter has no body"));
    }
    let shape = method_shape(metadata.blobs.get(method.signature)?)?;
    if shape.params.len() != 1 {
        return Err(synthesis_error!(
            property,
            "setter takes {} parameters, expected one",
            shape.params.len()
        ));
    }
    Ok(setter)
}

fn find_field(assembly: &CilAssembly, candidate: &Candidate, name: &str) -> Result<FieldRaw> {
    let property = candidate.display_name();
    let metadata = assembly.metadata();

    let mut found: Option<FieldRaw> = None;
    for rid in assembly.field_range(candidate.declaring_type)? {
        let field: FieldRaw = metadata.tables.get(rid)?;
        if metadata.strings.get(field.name)? != name {
            continue;
        }
        if found.is_some() {
            return Err(synthesis_error!(property, "field '{}' is ambiguous", name));
        }
        found = Some(field);
    }

    let Some(field) = found else {
        return Err(synthesis_error!(property, "field '{}' not found", name));
    };
    if FieldModifiers::from_bits_truncate(field.flags).contains(FieldModifiers::STATIC) {
        return Err(synthesis_error!(property, "field '{}' is static", name));
    }
    Ok(field)
}

/// A token for `field` usable inside the declaring type's own methods. Fields of generic
/// types are referenced through the type instantiated over its own parameters.
fn field_reference(assembly: &mut CilAssembly, candidate: &Candidate, field: &FieldRaw) -> Result<Token> {
    let owner = Token::from_parts(TableId::TypeDef, candidate.declaring_type);
    let owner_index = CodedIndexType::TypeOrMethodDef.encode(owner)?;
    let generic_count = assembly
        .metadata()
        .tables
        .iter::<GenericParamRaw>()
        .filter(|row| row.as_ref().map_or(false, |row| row.owner == owner_index))
        .count();
    if generic_count == 0 {
        return Ok(Token::from_parts(TableId::Field, field.rid));
    }

    let type_def: TypeDefRaw = assembly.metadata().tables.get(candidate.declaring_type)?;
    let extends = CodedIndexType::TypeDefOrRef.decode(type_def.extends)?;
    let is_value_type = extends.row() != 0
        && matches!(
            assembly.type_name(extends).ok().as_deref(),
            Some("System.ValueType" | "System.Enum")
        );

    let mut args = Vec::with_capacity(generic_count);
    for number in 0..generic_count {
        args.push(generic_var(number as u32)?);
    }
    let args: Vec<&[u8]> = args.iter().map(Vec::as_slice).collect();
    let instance = generic_instance(owner, is_value_type, &args)?;
    let instance = assembly.import_type_spec(&instance)?;

    let name = assembly.metadata().strings.get(field.name)?.to_string();
    let signature = assembly.metadata().blobs.get(field.signature)?.to_vec();
    assembly.import_member_ref(instance, &name, &signature)
}
