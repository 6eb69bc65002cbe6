//! Instruction set for the Tessera virtual machine.
//!
//! Every instruction is a fixed-width 16-bit word:
//!
//! ```text
//!  15 14 13 | 12 11    | 10 ..................... 0
//!  opcode   | modifier | operand (0..=2047)
//! ```
//!
//! Addresses and table indexes in the operand are 1-based; an operand of 0 is
//! only meaningful for `SKIP INSTRUCTION` and the `PULL` family.
//!
//! Decoding is a pure function of the word. The textual form produced by
//! [`Instruction`]'s `Display` is the canonical rendering used by the
//! assembler and by diagnostics, and [`Instruction::mnemonic`] gives the
//! stable two-token prefix of that rendering.

use std::fmt;

use serde::{Deserialize, Serialize};
use tessera_intrinsics::{name_of, NAMES};

/// A raw bytecode word.
pub type Word = u16;

/// Largest operand that fits in an instruction word.
pub const MAX_OPERAND: u16 = 0x07FF;

const OPCODE_SHIFT: u16 = 13;
const MODIFIER_SHIFT: u16 = 11;
const MODIFIER_MASK: u16 = 0x3;

/// Instruction family, the top three bits of a word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    Jump = 0,
    Push = 1,
    Pull = 2,
    Load = 3,
    Save = 4,
    Drop = 5,
    Call = 6,
    Send = 7,
}

/// Number of opcodes; sizes the dispatch table.
pub const OPCODE_COUNT: usize = 8;

impl Opcode {
    pub const ALL: [Opcode; OPCODE_COUNT] = [
        Opcode::Jump,
        Opcode::Push,
        Opcode::Pull,
        Opcode::Load,
        Opcode::Save,
        Opcode::Drop,
        Opcode::Call,
        Opcode::Send,
    ];

    fn from_bits(bits: u16) -> Opcode {
        Self::ALL[(bits & 0x7) as usize]
    }

    pub fn keyword(self) -> &'static str {
        match self {
            Opcode::Jump => "JUMP",
            Opcode::Push => "PUSH",
            Opcode::Pull => "PULL",
            Opcode::Load => "LOAD",
            Opcode::Save => "SAVE",
            Opcode::Drop => "DROP",
            Opcode::Call => "CALL",
            Opcode::Send => "SEND",
        }
    }
}

/// Condition attached to a `JUMP`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Condition {
    Always,
    OnNone,
    OnTrue,
    OnFalse,
}

/// Where a `PUSH` reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PushSource {
    /// Pushes a handler address onto the frame's handler stack.
    Handler,
    Literal,
    Constant,
    Argument,
}

/// What a `PULL` removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PullTarget {
    Handler,
    Component,
    Result,
    Exception,
}

/// Storage addressed by `LOAD`, `SAVE` and `DROP`. For everything but
/// `Variable`, the named variable holds the repository name to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Storage {
    Variable,
    Message,
    Draft,
    Document,
}

/// Target form of a `SEND`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SendTarget {
    Component,
    ComponentWithArguments,
    Document,
    DocumentWithArguments,
}

impl SendTarget {
    pub fn with_arguments(self) -> bool {
        matches!(
            self,
            SendTarget::ComponentWithArguments | SendTarget::DocumentWithArguments
        )
    }

    pub fn is_document(self) -> bool {
        matches!(self, SendTarget::Document | SendTarget::DocumentWithArguments)
    }
}

/// A decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Instruction {
    /// `SKIP INSTRUCTION`, the zero word. Lands forward jumps.
    Skip,
    Jump { address: u16, condition: Condition },
    Push { source: PushSource, operand: u16 },
    Pull(PullTarget),
    Load { storage: Storage, variable: u16 },
    Save { storage: Storage, variable: u16 },
    Drop { storage: Storage, variable: u16 },
    /// Native call; `arguments` counts every popped operand, receiver included.
    Call { intrinsic: u16, arguments: u8 },
    Send { message: u16, target: SendTarget },
}

/// Errors raised when a word is not a well-formed instruction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The operand must be a 1-based address or index.
    #[error("{opcode} instruction {word:#06x} has a zero operand")]
    ZeroOperand {
        /// The offending word.
        word: Word,
        /// Its opcode keyword.
        opcode: &'static str,
    },

    /// `PULL` takes no operand.
    #[error("PULL instruction {word:#06x} has a non-zero operand")]
    NonZeroOperand {
        /// The offending word.
        word: Word,
    },

    /// The `CALL` operand is past the end of the intrinsic table.
    #[error("CALL instruction {word:#06x} names unknown intrinsic {index}")]
    UnknownIntrinsic {
        /// The offending word.
        word: Word,
        /// The intrinsic index it carries.
        index: u16,
    },
}

/// Decode a bytecode word.
pub fn decode(word: Word) -> Result<Instruction, DecodeError> {
    let opcode = Opcode::from_bits(word >> OPCODE_SHIFT);
    let modifier = (word >> MODIFIER_SHIFT) & MODIFIER_MASK;
    let operand = word & MAX_OPERAND;

    let zero = || DecodeError::ZeroOperand {
        word,
        opcode: opcode.keyword(),
    };

    let instruction = match opcode {
        Opcode::Jump => {
            let condition = [
                Condition::Always,
                Condition::OnNone,
                Condition::OnTrue,
                Condition::OnFalse,
            ][modifier as usize];
            match (operand, condition) {
                (0, Condition::Always) => Instruction::Skip,
                (0, _) => return Err(zero()),
                (address, condition) => Instruction::Jump { address, condition },
            }
        }
        Opcode::Push => {
            if operand == 0 {
                return Err(zero());
            }
            let source = [
                PushSource::Handler,
                PushSource::Literal,
                PushSource::Constant,
                PushSource::Argument,
            ][modifier as usize];
            Instruction::Push { source, operand }
        }
        Opcode::Pull => {
            if operand != 0 {
                return Err(DecodeError::NonZeroOperand { word });
            }
            Instruction::Pull(
                [
                    PullTarget::Handler,
                    PullTarget::Component,
                    PullTarget::Result,
                    PullTarget::Exception,
                ][modifier as usize],
            )
        }
        Opcode::Load | Opcode::Save | Opcode::Drop => {
            if operand == 0 {
                return Err(zero());
            }
            let storage = [
                Storage::Variable,
                Storage::Message,
                Storage::Draft,
                Storage::Document,
            ][modifier as usize];
            match opcode {
                Opcode::Load => Instruction::Load {
                    storage,
                    variable: operand,
                },
                Opcode::Save => Instruction::Save {
                    storage,
                    variable: operand,
                },
                _ => Instruction::Drop {
                    storage,
                    variable: operand,
                },
            }
        }
        Opcode::Call => {
            if operand == 0 {
                return Err(zero());
            }
            if operand as usize > NAMES.len() {
                return Err(DecodeError::UnknownIntrinsic {
                    word,
                    index: operand,
                });
            }
            Instruction::Call {
                intrinsic: operand,
                arguments: modifier as u8,
            }
        }
        Opcode::Send => {
            if operand == 0 {
                return Err(zero());
            }
            let target = [
                SendTarget::Component,
                SendTarget::ComponentWithArguments,
                SendTarget::Document,
                SendTarget::DocumentWithArguments,
            ][modifier as usize];
            Instruction::Send {
                message: operand,
                target,
            }
        }
    };
    Ok(instruction)
}

impl Instruction {
    pub fn opcode(&self) -> Opcode {
        match self {
            Instruction::Skip | Instruction::Jump { .. } => Opcode::Jump,
            Instruction::Push { .. } => Opcode::Push,
            Instruction::Pull(_) => Opcode::Pull,
            Instruction::Load { .. } => Opcode::Load,
            Instruction::Save { .. } => Opcode::Save,
            Instruction::Drop { .. } => Opcode::Drop,
            Instruction::Call { .. } => Opcode::Call,
            Instruction::Send { .. } => Opcode::Send,
        }
    }

    fn modifier(&self) -> u16 {
        match *self {
            Instruction::Skip => 0,
            Instruction::Jump { condition, .. } => condition as u16,
            Instruction::Push { source, .. } => source as u16,
            Instruction::Pull(target) => target as u16,
            Instruction::Load { storage, .. }
            | Instruction::Save { storage, .. }
            | Instruction::Drop { storage, .. } => storage as u16,
            Instruction::Call { arguments, .. } => arguments as u16 & MODIFIER_MASK,
            Instruction::Send { target, .. } => target as u16,
        }
    }

    fn operand(&self) -> u16 {
        match *self {
            Instruction::Skip | Instruction::Pull(_) => 0,
            Instruction::Jump { address, .. } => address,
            Instruction::Push { operand, .. } => operand,
            Instruction::Load { variable, .. }
            | Instruction::Save { variable, .. }
            | Instruction::Drop { variable, .. } => variable,
            Instruction::Call { intrinsic, .. } => intrinsic,
            Instruction::Send { message, .. } => message,
        }
    }

    /// Encode back into a word. Operands wider than 11 bits are truncated,
    /// so callers building instructions by hand must keep them in range.
    pub fn encode(&self) -> Word {
        ((self.opcode() as u16) << OPCODE_SHIFT)
            | (self.modifier() << MODIFIER_SHIFT)
            | (self.operand() & MAX_OPERAND)
    }

    /// The first two tokens of the canonical text, e.g. `PUSH HANDLER`,
    /// `CALL $list`, `SEND 2`, `JUMP TO`.
    pub fn mnemonic(&self) -> String {
        let text = self.to_string();
        text.split(' ').take(2).collect::<Vec<_>>().join(" ")
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Instruction::Skip => write!(f, "SKIP INSTRUCTION"),
            Instruction::Jump { address, condition } => {
                write!(f, "JUMP TO {}", address)?;
                match condition {
                    Condition::Always => Ok(()),
                    Condition::OnNone => write!(f, " ON NONE"),
                    Condition::OnTrue => write!(f, " ON TRUE"),
                    Condition::OnFalse => write!(f, " ON FALSE"),
                }
            }
            Instruction::Push { source, operand } => {
                let keyword = match source {
                    PushSource::Handler => "HANDLER",
                    PushSource::Literal => "LITERAL",
                    PushSource::Constant => "CONSTANT",
                    PushSource::Argument => "ARGUMENT",
                };
                write!(f, "PUSH {} {}", keyword, operand)
            }
            Instruction::Pull(target) => {
                let keyword = match target {
                    PullTarget::Handler => "HANDLER",
                    PullTarget::Component => "COMPONENT",
                    PullTarget::Result => "RESULT",
                    PullTarget::Exception => "EXCEPTION",
                };
                write!(f, "PULL {}", keyword)
            }
            Instruction::Load { storage, variable }
            | Instruction::Save { storage, variable }
            | Instruction::Drop { storage, variable } => {
                let keyword = match storage {
                    Storage::Variable => "VARIABLE",
                    Storage::Message => "MESSAGE",
                    Storage::Draft => "DRAFT",
                    Storage::Document => "DOCUMENT",
                };
                write!(f, "{} {} {}", self.opcode().keyword(), keyword, variable)
            }
            Instruction::Call {
                intrinsic,
                arguments,
            } => {
                match name_of(intrinsic) {
                    Some(name) => write!(f, "CALL {}", name)?,
                    None => write!(f, "CALL {}", intrinsic)?,
                }
                match arguments {
                    0 => Ok(()),
                    1 => write!(f, " WITH 1 ARGUMENT"),
                    n => write!(f, " WITH {} ARGUMENTS", n),
                }
            }
            Instruction::Send { message, target } => {
                let suffix = match target {
                    SendTarget::Component => "TO COMPONENT",
                    SendTarget::ComponentWithArguments => "TO COMPONENT WITH ARGUMENTS",
                    SendTarget::Document => "TO DOCUMENT",
                    SendTarget::DocumentWithArguments => "TO DOCUMENT WITH ARGUMENTS",
                };
                write!(f, "SEND {} {}", message, suffix)
            }
        }
    }
}
