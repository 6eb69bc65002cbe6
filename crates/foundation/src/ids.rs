//! Identifiers for Tessera entities
//!
//! Symbols name messages, variables and catalog keys. Names address
//! documents, types and bags in the repository. Both are plain string
//! wrappers with consistent display and serialization.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::stable_hash::{fnv1a64_mix, fnv1a64_name, FNV1A_OFFSET_BASIS_64};

/// A symbolic name such as `$target` or `$addItem`.
///
/// The leading `$` is a display convention and is not stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Symbol(String);

impl Symbol {
    /// Creates a symbol, stripping a leading `$` if present.
    pub fn new(s: impl Into<String>) -> Self {
        let s = s.into();
        match s.strip_prefix('$') {
            Some(stripped) => Self(stripped.to_string()),
            None => Self(s),
        }
    }

    /// The symbol text without the `$` prefix.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl PartialEq<&str> for Symbol {
    fn eq(&self, other: &&str) -> bool {
        self.0 == other.strip_prefix('$').unwrap_or(other)
    }
}

/// Hierarchical document name, rendered as `/segment/segment`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Name {
    /// Ordered segments of the name.
    pub segments: Vec<String>,
}

impl Name {
    /// Creates a new Name from a list of segments.
    pub fn new(segments: Vec<String>) -> Self {
        Self { segments }
    }

    /// Parses a slash-separated name. Empty segments are ignored, so
    /// `/a//b/` and `a/b` both name `/a/b`.
    pub fn from_name_str(s: &str) -> Self {
        Self {
            segments: s
                .split('/')
                .filter(|segment| !segment.is_empty())
                .map(String::from)
                .collect(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Append a segment to create a new name.
    pub fn append(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self::new(segments)
    }

    /// Stable 64-bit hash of the rendered name.
    pub fn stable_hash(&self) -> u64 {
        let segments: Vec<&str> = self.segments.iter().map(String::as_str).collect();
        fnv1a64_name(&segments)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "/");
        }
        for segment in &self.segments {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}

impl From<&str> for Name {
    fn from(s: &str) -> Self {
        Self::from_name_str(s)
    }
}

impl From<String> for Name {
    fn from(s: String) -> Self {
        Self::from_name_str(&s)
    }
}

impl PartialEq<&str> for Name {
    fn eq(&self, other: &&str) -> bool {
        *self == Name::from_name_str(other)
    }
}

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub Name);

        impl $name {
            /// Creates a new identifier from a name.
            pub fn new(n: impl Into<Name>) -> Self {
                Self(n.into())
            }

            /// Returns a reference to the underlying name.
            pub fn name(&self) -> &Name {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(Name::from_name_str(s))
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(Name::from_name_str(&s))
            }
        }

        impl From<Name> for $name {
            fn from(n: Name) -> Self {
                Self(n)
            }
        }
    };
}

define_id!(
    /// Identity of the principal that owns a task and pays for its tokens
    AccountId
);

define_id!(
    /// Name of a message bag used to schedule tasks and deliver replies
    BagId
);

static TASK_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Nonce fixed for the lifetime of this process.
///
/// Mixes the process id with the start-up clock so that sequence numbers
/// restarting at 1 in another process or after a restart name different
/// tasks.
pub fn process_nonce() -> u64 {
    static NONCE: OnceLock<u64> = OnceLock::new();
    *NONCE.get_or_init(|| {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let mut h = FNV1A_OFFSET_BASIS_64;
        h = fnv1a64_mix(h, &std::process::id().to_le_bytes());
        fnv1a64_mix(h, &nanos.to_le_bytes())
    })
}

/// Identifier of a task.
///
/// A hash of the owning account, the invoked message, the process nonce
/// and a per-process sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub u64);

impl TaskId {
    /// A fresh identifier, never handed out before by this process.
    pub fn generate(account: &AccountId, message: &Symbol) -> Self {
        let sequence = TASK_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        Self::derive(account, message, process_nonce(), sequence)
    }

    pub fn derive(account: &AccountId, message: &Symbol, nonce: u64, sequence: u64) -> Self {
        let mut h = FNV1A_OFFSET_BASIS_64;
        h = fnv1a64_mix(h, &account.0.stable_hash().to_le_bytes());
        h = fnv1a64_mix(h, message.as_str().as_bytes());
        h = fnv1a64_mix(h, &nonce.to_le_bytes());
        h = fnv1a64_mix(h, &sequence.to_le_bytes());
        Self(h)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:016x}", self.0)
    }
}
