//! Intrinsic Capability Registry.
//!
//! `CALL $symbol WITH n ARGUMENTS` invokes a native capability instead of
//! pushing a new execution context. This crate owns the mapping from
//! `(symbol, receiver type, arity)` to the native implementation.
//!
//! # Architecture
//!
//! Two tables cooperate:
//!
//! 1. [`NAMES`] is the stable, sorted table of intrinsic names. The operand of
//!    a `CALL` instruction is a 1-based index into it, so it must only ever
//!    grow at the end of a sorted insertion point when bytecode is recompiled.
//! 2. [`INTRINSICS`] is a [`linkme::distributed_slice`] collecting one
//!    [`IntrinsicDescriptor`] per implementation. A name may have several
//!    implementations distinguished by receiver type, e.g. `$size` on lists,
//!    catalogs and text.
//!
//! [`Capabilities`] indexes the slice once for lookup by the processor.
//!
//! # Example Lookup
//!
//! ```
//! use tessera_foundation::Value;
//! use tessera_intrinsics::{index_of, Capabilities};
//!
//! let capabilities = Capabilities::standard();
//! let index = index_of("$list").unwrap();
//! let list = capabilities.invoke(index, &[]).unwrap();
//! assert_eq!(list, Value::List(vec![]));
//! ```

mod builtins;

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

pub use linkme;

use linkme::distributed_slice;
use tessera_foundation::{TypeTag, Value};

/// Signature for native capabilities. `args[0]` is the receiver when the
/// call has any operands.
pub type NativeFn = fn(&[Value]) -> Result<Value, IntrinsicError>;

/// Errors raised by capability lookup and invocation.
///
/// The processor turns these into exception values, so they surface to the
/// running task as ordinary user exceptions.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IntrinsicError {
    /// The index does not name an intrinsic.
    #[error("no intrinsic at index {0}")]
    UnknownIndex(u16),

    /// No implementation accepts this receiver type and operand count.
    #[error("{name} is not defined for {receiver} with {arity} operand(s)")]
    Unknown {
        name: &'static str,
        receiver: TypeTag,
        arity: usize,
    },

    /// The implementation rejected an operand.
    #[error("{name}: {reason}")]
    InvalidArgument { name: &'static str, reason: String },
}

/// Stable table of intrinsic names, sorted. `CALL` operands index into it
/// starting at 1.
pub const NAMES: [&str; 18] = [
    "$addItem",
    "$and",
    "$catalog",
    "$concatenation",
    "$difference",
    "$doesMatch",
    "$getItem",
    "$getValue",
    "$isEmpty",
    "$isEqual",
    "$list",
    "$negative",
    "$not",
    "$or",
    "$product",
    "$setValue",
    "$size",
    "$sum",
];

/// 1-based index of an intrinsic name. The `$` prefix is optional.
pub fn index_of(name: &str) -> Option<u16> {
    let wanted = name.strip_prefix('$').unwrap_or(name);
    NAMES
        .iter()
        .position(|n| &n[1..] == wanted)
        .map(|i| i as u16 + 1)
}

/// Intrinsic name at a 1-based index.
pub fn name_of(index: u16) -> Option<&'static str> {
    match index {
        0 => None,
        i => NAMES.get(i as usize - 1).copied(),
    }
}

/// Descriptor for a registered native implementation
pub struct IntrinsicDescriptor {
    /// Name including the `$` prefix, e.g. `$addItem`
    pub name: &'static str,
    /// Receiver type, or `None` for calls without operands and for
    /// implementations that accept any receiver
    pub receiver: Option<TypeTag>,
    /// Total operand count, receiver included
    pub arity: usize,
    /// Documentation string
    pub doc: &'static str,
    /// The implementation
    pub implementation: NativeFn,
}

/// Distributed slice collecting all native implementations.
#[distributed_slice]
pub static INTRINSICS: [IntrinsicDescriptor];

type CapabilityKey = (&'static str, Option<TypeTag>, usize);

/// Lookup table from `(name, receiver, arity)` to implementation.
pub struct Capabilities {
    table: HashMap<CapabilityKey, &'static IntrinsicDescriptor>,
}

impl Capabilities {
    /// Index every descriptor in [`INTRINSICS`].
    pub fn from_registry() -> Self {
        let mut table = HashMap::new();
        for descriptor in INTRINSICS.iter() {
            table.insert(
                (descriptor.name, descriptor.receiver, descriptor.arity),
                descriptor,
            );
        }
        Self { table }
    }

    /// The shared registry built from [`INTRINSICS`].
    pub fn standard() -> Arc<Capabilities> {
        static STANDARD: OnceLock<Arc<Capabilities>> = OnceLock::new();
        STANDARD
            .get_or_init(|| Arc::new(Capabilities::from_registry()))
            .clone()
    }

    /// Add or replace an implementation. Fails if the name is not in [`NAMES`],
    /// since bytecode could never reach it.
    pub fn register(&mut self, descriptor: &'static IntrinsicDescriptor) -> Result<(), IntrinsicError> {
        if index_of(descriptor.name).is_none() {
            return Err(IntrinsicError::InvalidArgument {
                name: descriptor.name,
                reason: "not a known intrinsic name".to_string(),
            });
        }
        self.table.insert(
            (descriptor.name, descriptor.receiver, descriptor.arity),
            descriptor,
        );
        Ok(())
    }

    /// Resolve the implementation for a call. A receiver-specific
    /// implementation wins over an any-receiver one.
    pub fn lookup(&self, name: &'static str, args: &[Value]) -> Option<&'static IntrinsicDescriptor> {
        let arity = args.len();
        let specific = args
            .first()
            .and_then(|receiver| self.table.get(&(name, Some(receiver.tag()), arity)));
        specific
            .or_else(|| self.table.get(&(name, None, arity)))
            .copied()
    }

    /// Invoke the intrinsic at `index` with the given operands.
    pub fn invoke(&self, index: u16, args: &[Value]) -> Result<Value, IntrinsicError> {
        let name = name_of(index).ok_or(IntrinsicError::UnknownIndex(index))?;
        let descriptor = self.lookup(name, args).ok_or_else(|| IntrinsicError::Unknown {
            name,
            receiver: args.first().map(Value::tag).unwrap_or(TypeTag::None),
            arity: args.len(),
        })?;
        (descriptor.implementation)(args)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
