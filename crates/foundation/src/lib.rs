//! Tessera Foundation
//!
//! The value model and identifiers shared by the Tessera virtual machine
//! crates. Provides stable hashing for deterministic task identifiers.

pub mod ids;
pub mod stable_hash;
pub mod value;

pub use ids::{process_nonce, AccountId, BagId, Name, Symbol, TaskId};
pub use stable_hash::{fnv1a64, fnv1a64_mix, fnv1a64_name, fnv1a64_str};
pub use value::{Catalog, ExceptionKind, TypeTag, Value};
