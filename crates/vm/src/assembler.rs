//! Text assembler and disassembler for bytecode.
//!
//! The assembler accepts the canonical instruction text produced by
//! [`Instruction`]'s `Display`, one instruction per line, plus:
//!
//! - `Label:` lines, which name the address of the next instruction,
//! - label references wherever an address is expected (`JUMP TO`, `PUSH HANDLER`),
//! - `$symbol` operands for arguments, constants, variables and messages,
//!   resolved through an [`OperandResolver`],
//! - literal values in backticks for `PUSH LITERAL`, e.g. `` `"good"` ``,
//! - `--` comments to the end of the line.
//!
//! ```text
//! PUSH HANDLER Handler
//! PUSH ARGUMENT $text
//! PULL EXCEPTION
//! Handler:
//! PULL RESULT
//! ```

use std::collections::HashMap;

use tessera_foundation::{Name, Symbol, Value};
use tessera_intrinsics::index_of;

use crate::instruction::{
    decode, Condition, DecodeError, Instruction, PullTarget, PushSource, SendTarget, Storage,
    Word, MAX_OPERAND,
};

/// Errors reported while assembling, each with its 1-based source line.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssembleError {
    #[error("line {line}: unknown instruction `{text}`")]
    UnknownInstruction { line: usize, text: String },

    #[error("line {line}: unknown label `{label}`")]
    UnknownLabel { line: usize, label: String },

    #[error("line {line}: label `{label}` is already defined")]
    DuplicateLabel { line: usize, label: String },

    #[error("line {line}: operand `{operand}` is out of range 1..={max}", max = MAX_OPERAND)]
    OperandOutOfRange { line: usize, operand: String },

    #[error("line {line}: cannot resolve operand `{operand}`")]
    UnresolvedOperand { line: usize, operand: String },

    #[error("line {line}: unknown intrinsic `{name}`")]
    UnknownIntrinsic { line: usize, name: String },
}

/// Turns symbolic operands into 1-based table indexes.
///
/// Every method defaults to `None`, so a resolver only implements the
/// operand kinds it knows about.
pub trait OperandResolver {
    /// Index of a literal given as the text between backticks.
    fn literal(&mut self, _text: &str) -> Option<u16> {
        None
    }

    fn constant(&mut self, _name: &Symbol) -> Option<u16> {
        None
    }

    fn argument(&mut self, _name: &Symbol) -> Option<u16> {
        None
    }

    fn variable(&mut self, _name: &Symbol) -> Option<u16> {
        None
    }

    fn message(&mut self, _name: &Symbol) -> Option<u16> {
        None
    }
}

/// Resolver for sources that only use numeric operands.
pub struct NumericOperands;

impl OperandResolver for NumericOperands {}

/// Assemble source that uses only numeric operands and labels.
pub fn assemble(source: &str) -> Result<Vec<Word>, AssembleError> {
    assemble_with(source, &mut NumericOperands)
}

/// Assemble source, resolving symbolic operands through `resolver`.
pub fn assemble_with(
    source: &str,
    resolver: &mut dyn OperandResolver,
) -> Result<Vec<Word>, AssembleError> {
    let mut labels: HashMap<String, u16> = HashMap::new();
    let mut lines: Vec<(usize, Vec<String>)> = Vec::new();

    for (index, raw) in source.lines().enumerate() {
        let line = index + 1;
        let tokens = tokenize(strip_comment(raw));
        match tokens.as_slice() {
            [] => {}
            [label] if label.ends_with(':') && !label.starts_with('`') => {
                let label = label.trim_end_matches(':').to_string();
                let address = lines.len() as u16 + 1;
                if labels.insert(label.clone(), address).is_some() {
                    return Err(AssembleError::DuplicateLabel { line, label });
                }
            }
            _ => lines.push((line, tokens.iter().map(|t| t.to_string()).collect())),
        }
    }

    let mut words = Vec::with_capacity(lines.len());
    for (line, tokens) in &lines {
        let parser = LineParser {
            line: *line,
            labels: &labels,
        };
        let tokens: Vec<&str> = tokens.iter().map(String::as_str).collect();
        words.push(parser.parse(&tokens, resolver)?.encode());
    }
    Ok(words)
}

/// Render words as canonical text, one `address: instruction` per line.
pub fn disassemble(words: &[Word]) -> Result<String, DecodeError> {
    let mut text = String::new();
    for (index, word) in words.iter().enumerate() {
        let instruction = decode(*word)?;
        text.push_str(&format!("{:>4}: {}\n", index + 1, instruction));
    }
    Ok(text)
}

/// Parse the text of a backtick literal into a value.
///
/// Recognizes `none`, `true`, `false`, numbers, `"text"`, `$symbol` and
/// `/document/name`.
pub fn parse_literal(text: &str) -> Option<Value> {
    let text = text.trim();
    match text {
        "none" => return Some(Value::None),
        "true" => return Some(Value::Boolean(true)),
        "false" => return Some(Value::Boolean(false)),
        _ => {}
    }
    if let Some(inner) = text.strip_prefix('"').and_then(|t| t.strip_suffix('"')) {
        return Some(Value::Text(inner.to_string()));
    }
    if text.len() > 1 && text.starts_with('$') {
        return Some(Value::Symbol(Symbol::new(text)));
    }
    if text.starts_with('/') {
        return Some(Value::Name(Name::from(text)));
    }
    text.parse::<f64>().ok().map(Value::Number)
}

fn strip_comment(line: &str) -> &str {
    let mut quoted = false;
    let bytes = line.as_bytes();
    for i in 0..bytes.len() {
        match bytes[i] {
            b'`' => quoted = !quoted,
            b'-' if !quoted && bytes.get(i + 1) == Some(&b'-') => return &line[..i],
            _ => {}
        }
    }
    line
}

fn tokenize(line: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut rest = line.trim();
    while !rest.is_empty() {
        let end = if rest.starts_with('`') {
            rest[1..].find('`').map_or(rest.len(), |close| close + 2)
        } else {
            rest.find(char::is_whitespace).unwrap_or(rest.len())
        };
        tokens.push(&rest[..end]);
        rest = rest[end..].trim_start();
    }
    tokens
}

struct LineParser<'a> {
    line: usize,
    labels: &'a HashMap<String, u16>,
}

impl LineParser<'_> {
    fn parse(
        &self,
        tokens: &[&str],
        resolver: &mut dyn OperandResolver,
    ) -> Result<Instruction, AssembleError> {
        let instruction = match tokens {
            ["SKIP", "INSTRUCTION"] => Instruction::Skip,
            ["JUMP", "TO", address] => Instruction::Jump {
                address: self.address(address)?,
                condition: Condition::Always,
            },
            ["JUMP", "TO", address, "ON", condition] => {
                let condition = match *condition {
                    "NONE" => Condition::OnNone,
                    "TRUE" => Condition::OnTrue,
                    "FALSE" => Condition::OnFalse,
                    _ => return Err(self.unknown(tokens)),
                };
                Instruction::Jump {
                    address: self.address(address)?,
                    condition,
                }
            }
            ["PUSH", "HANDLER", address] => Instruction::Push {
                source: PushSource::Handler,
                operand: self.address(address)?,
            },
            ["PUSH", "LITERAL", operand] => Instruction::Push {
                source: PushSource::Literal,
                operand: self.index(operand, |text| {
                    text.strip_prefix('`')
                        .and_then(|t| t.strip_suffix('`'))
                        .and_then(|t| resolver.literal(t))
                })?,
            },
            ["PUSH", "CONSTANT", operand] => Instruction::Push {
                source: PushSource::Constant,
                operand: self.index(operand, |text| resolver.constant(&Symbol::new(text)))?,
            },
            ["PUSH", "ARGUMENT", operand] => Instruction::Push {
                source: PushSource::Argument,
                operand: self.index(operand, |text| resolver.argument(&Symbol::new(text)))?,
            },
            ["PULL", target] => Instruction::Pull(match *target {
                "HANDLER" => PullTarget::Handler,
                "COMPONENT" => PullTarget::Component,
                "RESULT" => PullTarget::Result,
                "EXCEPTION" => PullTarget::Exception,
                _ => return Err(self.unknown(tokens)),
            }),
            [opcode @ ("LOAD" | "SAVE" | "DROP"), storage, operand] => {
                let storage = match *storage {
                    "VARIABLE" => Storage::Variable,
                    "MESSAGE" => Storage::Message,
                    "DRAFT" => Storage::Draft,
                    "DOCUMENT" => Storage::Document,
                    _ => return Err(self.unknown(tokens)),
                };
                let variable =
                    self.index(operand, |text| resolver.variable(&Symbol::new(text)))?;
                match *opcode {
                    "LOAD" => Instruction::Load { storage, variable },
                    "SAVE" => Instruction::Save { storage, variable },
                    _ => Instruction::Drop { storage, variable },
                }
            }
            ["CALL", name] => self.call(name, "0")?,
            ["CALL", name, "WITH", count, "ARGUMENT" | "ARGUMENTS"] => self.call(name, count)?,
            ["SEND", message, "TO", target] => {
                let target = match *target {
                    "COMPONENT" => SendTarget::Component,
                    "DOCUMENT" => SendTarget::Document,
                    _ => return Err(self.unknown(tokens)),
                };
                Instruction::Send {
                    message: self.index(message, |text| resolver.message(&Symbol::new(text)))?,
                    target,
                }
            }
            ["SEND", message, "TO", target, "WITH", "ARGUMENTS"] => {
                let target = match *target {
                    "COMPONENT" => SendTarget::ComponentWithArguments,
                    "DOCUMENT" => SendTarget::DocumentWithArguments,
                    _ => return Err(self.unknown(tokens)),
                };
                Instruction::Send {
                    message: self.index(message, |text| resolver.message(&Symbol::new(text)))?,
                    target,
                }
            }
            _ => return Err(self.unknown(tokens)),
        };
        Ok(instruction)
    }

    fn unknown(&self, tokens: &[&str]) -> AssembleError {
        AssembleError::UnknownInstruction {
            line: self.line,
            text: tokens.join(" "),
        }
    }

    fn number(&self, text: &str) -> Result<u16, AssembleError> {
        match text.parse::<u32>() {
            Ok(n) if (1..=MAX_OPERAND as u32).contains(&n) => Ok(n as u16),
            _ => Err(AssembleError::OperandOutOfRange {
                line: self.line,
                operand: text.to_string(),
            }),
        }
    }

    fn address(&self, text: &str) -> Result<u16, AssembleError> {
        if text.starts_with(|c: char| c.is_ascii_digit()) {
            return self.number(text);
        }
        self.labels
            .get(text)
            .copied()
            .ok_or_else(|| AssembleError::UnknownLabel {
                line: self.line,
                label: text.to_string(),
            })
    }

    /// A numeric index, or a symbolic one handed to `resolve`.
    fn index(
        &self,
        text: &str,
        resolve: impl FnOnce(&str) -> Option<u16>,
    ) -> Result<u16, AssembleError> {
        if text.starts_with(|c: char| c.is_ascii_digit()) {
            return self.number(text);
        }
        match resolve(text) {
            Some(index) if (1..=MAX_OPERAND).contains(&index) => Ok(index),
            Some(_) => Err(AssembleError::OperandOutOfRange {
                line: self.line,
                operand: text.to_string(),
            }),
            None => Err(AssembleError::UnresolvedOperand {
                line: self.line,
                operand: text.to_string(),
            }),
        }
    }

    fn call(&self, name: &str, count: &str) -> Result<Instruction, AssembleError> {
        let intrinsic = index_of(name).ok_or_else(|| AssembleError::UnknownIntrinsic {
            line: self.line,
            name: name.to_string(),
        })?;
        let arguments = match count.parse::<u8>() {
            Ok(n) if n <= 3 => n,
            _ => {
                return Err(AssembleError::OperandOutOfRange {
                    line: self.line,
                    operand: count.to_string(),
                })
            }
        };
        Ok(Instruction::Call {
            intrinsic,
            arguments,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Tables {
        literals: Vec<String>,
    }

    impl OperandResolver for Tables {
        fn literal(&mut self, text: &str) -> Option<u16> {
            self.literals.push(text.to_string());
            Some(self.literals.len() as u16)
        }

        fn argument(&mut self, name: &Symbol) -> Option<u16> {
            (name.as_str() == "target").then_some(1)
        }
    }

    #[test]
    fn labels_resolve_forward_and_backward() {
        let source = "
            Start:
            PUSH HANDLER Handler   -- forward reference
            JUMP TO Start
            Handler:
            PULL RESULT
        ";
        let words = assemble(source).unwrap();
        assert_eq!(words.len(), 3);
        assert_eq!(
            decode(words[0]).unwrap(),
            Instruction::Push {
                source: PushSource::Handler,
                operand: 3
            }
        );
        assert_eq!(
            decode(words[1]).unwrap(),
            Instruction::Jump {
                address: 1,
                condition: Condition::Always
            }
        );
    }

    #[test]
    fn canonical_text_reassembles() {
        let source = "\
SKIP INSTRUCTION
JUMP TO 12 ON FALSE
JUMP TO 3 ON NONE
PUSH LITERAL 2
PUSH CONSTANT 1
PUSH ARGUMENT 2
PULL COMPONENT
LOAD VARIABLE 1
SAVE MESSAGE 2
DROP DOCUMENT 3
LOAD DRAFT 1
CALL $list
CALL $not WITH 1 ARGUMENT
CALL $setValue WITH 3 ARGUMENTS
SEND 2 TO COMPONENT
SEND 1 TO DOCUMENT WITH ARGUMENTS
PULL EXCEPTION";
        let words = assemble(source).unwrap();
        let rendered: Vec<String> = words
            .iter()
            .map(|w| decode(*w).unwrap().to_string())
            .collect();
        assert_eq!(rendered.join("\n"), source);
    }

    #[test]
    fn symbolic_operands_use_the_resolver() {
        let mut tables = Tables::default();
        let words = assemble_with(
            "PUSH LITERAL `\"two words\"` -- comment\nPUSH ARGUMENT $target",
            &mut tables,
        )
        .unwrap();
        assert_eq!(tables.literals, vec!["\"two words\"".to_string()]);
        assert_eq!(decode(words[1]).unwrap().to_string(), "PUSH ARGUMENT 1");

        let err = assemble_with("PUSH ARGUMENT $missing", &mut tables).unwrap_err();
        assert_eq!(
            err,
            AssembleError::UnresolvedOperand {
                line: 1,
                operand: "$missing".to_string()
            }
        );
    }

    #[test]
    fn comment_markers_inside_literals_are_kept() {
        let mut tables = Tables::default();
        assemble_with("PUSH LITERAL `\"a -- b\"`", &mut tables).unwrap();
        assert_eq!(tables.literals, vec!["\"a -- b\"".to_string()]);
    }

    #[test]
    fn errors_carry_line_numbers() {
        assert_eq!(
            assemble("SKIP INSTRUCTION\nFROB 1"),
            Err(AssembleError::UnknownInstruction {
                line: 2,
                text: "FROB 1".to_string()
            })
        );
        assert_eq!(
            assemble("JUMP TO Nowhere"),
            Err(AssembleError::UnknownLabel {
                line: 1,
                label: "Nowhere".to_string()
            })
        );
        assert_eq!(
            assemble("A:\nSKIP INSTRUCTION\nA:\nSKIP INSTRUCTION"),
            Err(AssembleError::DuplicateLabel {
                line: 3,
                label: "A".to_string()
            })
        );
        assert!(matches!(
            assemble("PUSH LITERAL 2048"),
            Err(AssembleError::OperandOutOfRange { line: 1, .. })
        ));
        assert!(matches!(
            assemble("PUSH LITERAL 0"),
            Err(AssembleError::OperandOutOfRange { line: 1, .. })
        ));
        assert!(matches!(
            assemble("CALL $frobnicate"),
            Err(AssembleError::UnknownIntrinsic { line: 1, .. })
        ));
        assert!(matches!(
            assemble("CALL $list WITH 4 ARGUMENTS"),
            Err(AssembleError::OperandOutOfRange { line: 1, .. })
        ));
    }

    #[test]
    fn disassembly_lists_addresses() {
        let words = assemble("PUSH HANDLER 2\nPULL RESULT").unwrap();
        assert_eq!(
            disassemble(&words).unwrap(),
            "   1: PUSH HANDLER 2\n   2: PULL RESULT\n"
        );
        assert!(disassemble(&[0x4001]).is_err());
    }

    #[test]
    fn literal_parsing() {
        assert_eq!(parse_literal("none"), Some(Value::None));
        assert_eq!(parse_literal("\"good\""), Some(Value::from("good")));
        assert_eq!(parse_literal("$type"), Some(Value::Symbol(Symbol::new("type"))));
        assert_eq!(
            parse_literal("/tessera/types/Test"),
            Some(Value::Name(Name::from("/tessera/types/Test")))
        );
        assert_eq!(parse_literal("2.5"), Some(Value::Number(2.5)));
        assert_eq!(parse_literal("bogus"), None);
    }
}
