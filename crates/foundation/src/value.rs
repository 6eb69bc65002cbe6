//! Values at the boundary of the virtual machine.
//!
//! The interpreter treats values as opaque and immutable. It only needs to
//! move them between stacks and slots, branch on booleans, resolve the type
//! of a send target, and build exception values. Everything else happens in
//! the intrinsics that `CALL` dispatches to.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::ids::{Name, Symbol};

/// Ordered key/value mapping. Iteration follows insertion order.
pub type Catalog = IndexMap<Symbol, Value>;

/// A runtime value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Value {
    /// The absent value.
    #[default]
    None,
    Boolean(bool),
    Number(f64),
    Text(String),
    Symbol(Symbol),
    /// Reference to a document, type or bag in the repository.
    Name(Name),
    List(Vec<Value>),
    Catalog(Catalog),
}

/// The closed set of value variants, used to key capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TypeTag {
    None,
    Boolean,
    Number,
    Text,
    Symbol,
    Name,
    List,
    Catalog,
}

impl TypeTag {
    pub const ALL: [TypeTag; 8] = [
        TypeTag::None,
        TypeTag::Boolean,
        TypeTag::Number,
        TypeTag::Text,
        TypeTag::Symbol,
        TypeTag::Name,
        TypeTag::List,
        TypeTag::Catalog,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TypeTag::None => "None",
            TypeTag::Boolean => "Boolean",
            TypeTag::Number => "Number",
            TypeTag::Text => "Text",
            TypeTag::Symbol => "Symbol",
            TypeTag::Name => "Name",
            TypeTag::List => "List",
            TypeTag::Catalog => "Catalog",
        }
    }

    /// Repository name of the builtin type for this variant,
    /// e.g. `/tessera/types/List`.
    pub fn type_name(self) -> Name {
        Name::from("/tessera/types").append(self.as_str())
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kinds of exception synthesized by the virtual machine itself.
///
/// User code may raise any value; these are the ones the processor builds
/// when a send, call or repository access fails at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExceptionKind {
    /// The task ran out of tokens.
    ResourceExhausted,
    /// A send target has no compiled type or the type lacks the message.
    UnresolvedTarget,
    /// No intrinsic accepts the receiver and argument count of a call.
    UnknownCapability,
    /// An intrinsic or instruction rejected an operand.
    InvalidArgument,
    /// A named document, draft or type is not in the repository.
    MissingDocument,
    /// The component or context stack exceeded its configured limit.
    StackOverflow,
}

impl ExceptionKind {
    pub fn symbol(self) -> Symbol {
        Symbol::new(match self {
            ExceptionKind::ResourceExhausted => "resourceExhausted",
            ExceptionKind::UnresolvedTarget => "unresolvedTarget",
            ExceptionKind::UnknownCapability => "unknownCapability",
            ExceptionKind::InvalidArgument => "invalidArgument",
            ExceptionKind::MissingDocument => "missingDocument",
            ExceptionKind::StackOverflow => "stackOverflow",
        })
    }
}

impl Value {
    pub fn tag(&self) -> TypeTag {
        match self {
            Value::None => TypeTag::None,
            Value::Boolean(_) => TypeTag::Boolean,
            Value::Number(_) => TypeTag::Number,
            Value::Text(_) => TypeTag::Text,
            Value::Symbol(_) => TypeTag::Symbol,
            Value::Name(_) => TypeTag::Name,
            Value::List(_) => TypeTag::List,
            Value::Catalog(_) => TypeTag::Catalog,
        }
    }

    /// Name of the compiled type that handles messages sent to this value.
    ///
    /// A catalog carrying a `$type` name is an instance of that type; every
    /// other value is an instance of its builtin primitive type.
    pub fn type_name(&self) -> Name {
        if let Value::Catalog(catalog) = self {
            if let Some(Value::Name(name)) = catalog.get(&Symbol::new("type")) {
                return name.clone();
            }
        }
        self.tag().type_name()
    }

    /// Build an exception value `[$exception: $kind, $text: "..."]`.
    pub fn exception(kind: ExceptionKind, text: impl Into<String>) -> Self {
        let mut catalog = Catalog::new();
        catalog.insert(Symbol::new("exception"), Value::Symbol(kind.symbol()));
        catalog.insert(Symbol::new("text"), Value::Text(text.into()));
        Value::Catalog(catalog)
    }

    /// The `$exception` symbol of an exception catalog, if this is one.
    pub fn exception_kind(&self) -> Option<&Symbol> {
        match self.get(&Symbol::new("exception")) {
            Some(Value::Symbol(kind)) => Some(kind),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<&Symbol> {
        match self {
            Value::Symbol(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&Name> {
        match self {
            Value::Name(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_catalog(&self) -> Option<&Catalog> {
        match self {
            Value::Catalog(c) => Some(c),
            _ => None,
        }
    }

    /// Look up a key in a catalog value. Non-catalogs have no entries.
    pub fn get(&self, key: &Symbol) -> Option<&Value> {
        self.as_catalog().and_then(|c| c.get(key))
    }

    /// Build a catalog from `(key, value)` pairs.
    pub fn catalog<K, I>(entries: I) -> Self
    where
        K: Into<Symbol>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Catalog(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<Symbol> for Value {
    fn from(s: Symbol) -> Self {
        Value::Symbol(s)
    }
}

impl From<Name> for Value {
    fn from(n: Name) -> Self {
        Value::Name(n)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "none"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(s) => write!(f, "{:?}", s),
            Value::Symbol(s) => write!(f, "{}", s),
            Value::Name(n) => write!(f, "{}", n),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Catalog(catalog) => {
                if catalog.is_empty() {
                    return write!(f, "[:]");
                }
                write!(f, "[")?;
                for (i, (key, value)) in catalog.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                write!(f, "]")
            }
        }
    }
}
