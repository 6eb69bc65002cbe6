//! Opcode registry linking opcodes to their handlers.

use std::sync::OnceLock;

use super::handlers::{
    handle_call, handle_drop, handle_jump, handle_load, handle_pull, handle_push, handle_save,
    handle_send, Handler,
};
use crate::instruction::{Opcode, OPCODE_COUNT};

/// Links one opcode family to the function that executes it.
#[derive(Debug, Clone)]
pub struct OpcodeSpec {
    pub opcode: Opcode,
    pub handler: Handler,
}

/// All registered opcode specifications, built on first use.
pub fn opcode_specs() -> &'static [OpcodeSpec] {
    static SPECS: OnceLock<Vec<OpcodeSpec>> = OnceLock::new();
    SPECS.get_or_init(build_specs)
}

/// Handler for an opcode in O(1). `None` only if the table is incomplete,
/// which the processor reports as a fatal error.
pub fn handler_for(opcode: Opcode) -> Option<Handler> {
    static HANDLERS: OnceLock<[Option<Handler>; OPCODE_COUNT]> = OnceLock::new();
    HANDLERS.get_or_init(|| {
        let mut table: [Option<Handler>; OPCODE_COUNT] = [None; OPCODE_COUNT];
        for spec in opcode_specs() {
            table[spec.opcode as usize] = Some(spec.handler);
        }
        table
    })[opcode as usize]
}

fn build_specs() -> Vec<OpcodeSpec> {
    macro_rules! op {
        ($opcode:ident, $handler:ident) => {
            OpcodeSpec {
                opcode: Opcode::$opcode,
                handler: $handler,
            }
        };
    }

    vec![
        op!(Jump, handle_jump),
        op!(Push, handle_push),
        op!(Pull, handle_pull),
        op!(Load, handle_load),
        op!(Save, handle_save),
        op!(Drop, handle_drop),
        op!(Call, handle_call),
        op!(Send, handle_send),
    ]
}
