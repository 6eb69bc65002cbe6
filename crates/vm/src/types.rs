//! Compiled types: the bytecode and tables the processor executes.
//!
//! A [`CompiledType`] is what the external compiler produces for a type
//! definition: a constant table shared by all of its methods, and one
//! [`CompiledMethod`] per message it responds to. Tables are immutable and
//! reference counted so that every execution context activated from a
//! method shares them.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tessera_foundation::{Name, Symbol, Value};

use crate::assembler::{assemble_with, parse_literal, AssembleError, OperandResolver};
use crate::instruction::Word;

/// Immutable instruction stream.
///
/// Serialized as opaque big-endian bytes; displayed as base16.
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "Vec<u8>", try_from = "Vec<u8>")]
pub struct Bytecode {
    words: Vec<Word>,
}

/// Bytecode bytes with an odd length cannot hold whole words.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("bytecode has {0} bytes, which is not a whole number of instructions")]
pub struct TruncatedBytecode(pub usize);

impl Bytecode {
    pub fn new(words: Vec<Word>) -> Self {
        Self { words }
    }

    pub fn words(&self) -> &[Word] {
        &self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Word at a 1-based address.
    pub fn get(&self, address: usize) -> Option<Word> {
        address
            .checked_sub(1)
            .and_then(|index| self.words.get(index))
            .copied()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.words.iter().flat_map(|w| w.to_be_bytes()).collect()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TruncatedBytecode> {
        if bytes.len() % 2 != 0 {
            return Err(TruncatedBytecode(bytes.len()));
        }
        Ok(Self {
            words: bytes
                .chunks_exact(2)
                .map(|pair| Word::from_be_bytes([pair[0], pair[1]]))
                .collect(),
        })
    }
}

impl From<Bytecode> for Vec<u8> {
    fn from(bytecode: Bytecode) -> Self {
        bytecode.to_bytes()
    }
}

impl TryFrom<Vec<u8>> for Bytecode {
    type Error = TruncatedBytecode;

    fn try_from(bytes: Vec<u8>) -> Result<Self, Self::Error> {
        Bytecode::from_bytes(&bytes)
    }
}

impl fmt::Display for Bytecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'")?;
        for word in &self.words {
            write!(f, "{:04X}", word)?;
        }
        write!(f, "'")
    }
}

impl fmt::Debug for Bytecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bytecode({})", self)
    }
}

/// Executable form of one message handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledMethod {
    /// Parameter names; argument 1 is always `$target`, these follow.
    pub parameters: Vec<Symbol>,
    /// Variable slots, in index order.
    pub variables: Vec<Symbol>,
    pub literals: Arc<[Value]>,
    /// Message names addressed by `SEND`.
    pub messages: Arc<[Symbol]>,
    pub bytecode: Arc<Bytecode>,
}

/// Executable form of a type definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledType {
    pub name: Name,
    pub constant_names: Vec<Symbol>,
    pub constants: Arc<[Value]>,
    pub methods: IndexMap<Symbol, Arc<CompiledMethod>>,
}

impl CompiledType {
    pub fn method(&self, message: &Symbol) -> Option<&Arc<CompiledMethod>> {
        self.methods.get(message)
    }
}

/// Builds a [`CompiledType`] from constants and assembly source.
///
/// ```
/// use tessera_foundation::Value;
/// use tessera_vm::types::TypeBuilder;
///
/// let compiled = TypeBuilder::new("/acme/types/Echo")
///     .constant("$greeting", Value::from("hello"))
///     .method("$echo", &["$value"], "PUSH ARGUMENT $value\nPULL RESULT")
///     .unwrap()
///     .build();
/// assert_eq!(compiled.methods.len(), 1);
/// ```
pub struct TypeBuilder {
    name: Name,
    constant_names: Vec<Symbol>,
    constants: Vec<Value>,
    methods: IndexMap<Symbol, Arc<CompiledMethod>>,
}

impl TypeBuilder {
    pub fn new(name: impl Into<Name>) -> Self {
        Self {
            name: name.into(),
            constant_names: Vec::new(),
            constants: Vec::new(),
            methods: IndexMap::new(),
        }
    }

    /// Define or replace a named constant.
    pub fn constant(mut self, name: impl Into<Symbol>, value: Value) -> Self {
        let name = name.into();
        match self.constant_names.iter().position(|n| *n == name) {
            Some(index) => self.constants[index] = value,
            None => {
                self.constant_names.push(name);
                self.constants.push(value);
            }
        }
        self
    }

    /// Assemble a method. Constants must be defined before the methods
    /// that reference them.
    pub fn method(
        mut self,
        message: impl Into<Symbol>,
        parameters: &[&str],
        source: &str,
    ) -> Result<Self, AssembleError> {
        let mut builder = MethodBuilder::new(&self.constant_names);
        for parameter in parameters {
            builder.add_parameter(Symbol::new(*parameter));
        }
        let method = builder.assemble(source)?;
        self.methods.insert(message.into(), Arc::new(method));
        Ok(self)
    }

    pub fn build(self) -> CompiledType {
        CompiledType {
            name: self.name,
            constant_names: self.constant_names,
            constants: self.constants.into(),
            methods: self.methods,
        }
    }
}

/// Interns the tables of one method while its source is assembled.
pub struct MethodBuilder<'a> {
    constants: &'a [Symbol],
    parameters: Vec<Symbol>,
    variables: Vec<Symbol>,
    literals: Vec<Value>,
    messages: Vec<Symbol>,
}

impl<'a> MethodBuilder<'a> {
    pub fn new(constants: &'a [Symbol]) -> Self {
        Self {
            constants,
            parameters: Vec::new(),
            variables: Vec::new(),
            literals: Vec::new(),
            messages: Vec::new(),
        }
    }

    pub fn add_parameter(&mut self, name: Symbol) -> u16 {
        if let Some(idx) = self.parameters.iter().position(|p| *p == name) {
            return idx as u16 + 2;
        }
        self.parameters.push(name);
        self.parameters.len() as u16 + 1
    }

    /// Add a literal value, returning its 1-based index
    pub fn add_literal(&mut self, value: Value) -> u16 {
        if let Some(idx) = self.literals.iter().position(|v| v == &value) {
            return idx as u16 + 1;
        }
        self.literals.push(value);
        self.literals.len() as u16
    }

    /// Add a variable slot, returning its 1-based index
    pub fn add_variable(&mut self, name: Symbol) -> u16 {
        if let Some(idx) = self.variables.iter().position(|v| *v == name) {
            return idx as u16 + 1;
        }
        self.variables.push(name);
        self.variables.len() as u16
    }

    /// Add a message name, returning its 1-based index
    pub fn add_message(&mut self, name: Symbol) -> u16 {
        if let Some(idx) = self.messages.iter().position(|m| *m == name) {
            return idx as u16 + 1;
        }
        self.messages.push(name);
        self.messages.len() as u16
    }

    pub fn assemble(mut self, source: &str) -> Result<CompiledMethod, AssembleError> {
        let words = assemble_with(source, &mut self)?;
        Ok(CompiledMethod {
            parameters: self.parameters,
            variables: self.variables,
            literals: self.literals.into(),
            messages: self.messages.into(),
            bytecode: Arc::new(Bytecode::new(words)),
        })
    }
}

impl OperandResolver for MethodBuilder<'_> {
    fn literal(&mut self, text: &str) -> Option<u16> {
        parse_literal(text).map(|value| self.add_literal(value))
    }

    fn constant(&mut self, name: &Symbol) -> Option<u16> {
        self.constants
            .iter()
            .position(|c| c == name)
            .map(|idx| idx as u16 + 1)
    }

    fn argument(&mut self, name: &Symbol) -> Option<u16> {
        if name.as_str() == "target" {
            return Some(1);
        }
        self.parameters
            .iter()
            .position(|p| p == name)
            .map(|idx| idx as u16 + 2)
    }

    fn variable(&mut self, name: &Symbol) -> Option<u16> {
        Some(self.add_variable(name.clone()))
    }

    fn message(&mut self, name: &Symbol) -> Option<u16> {
        Some(self.add_message(name.clone()))
    }
}
