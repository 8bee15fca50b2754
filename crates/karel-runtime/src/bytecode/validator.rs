//! Bytecode validator — static checks over a compiled program
//!
//! Performs three passes:
//! 1. **Decode** — every byte in the buffer decodes as a known opcode with
//!    its full operand bytes present
//! 2. **Targets** — every `Branch`/`Repeat` destination is in bounds and
//!    lands on an instruction start
//! 3. **Call sites** — every `BranchLinked` target is a symbol entry or the
//!    noop-func
//!
//! The validator is advisory; the interpreter trusts the compiler's output
//! and does not re-run these checks per instruction.

use super::{branch_target, decode_header, repeat_target, Bytecode, Opcode, NOOP_FUNC};
use std::collections::HashSet;

/// A validation error with the byte offset where it was detected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Byte offset of the offending instruction header.
    pub offset: usize,
    /// What went wrong.
    pub kind: ValidationErrorKind,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "offset {:#06x}: {}", self.offset, self.kind)
    }
}

/// Kinds of errors the validator can detect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// Header byte whose low nibble is not a known opcode.
    UnknownOpcode(u8),
    /// The buffer ended before the instruction's operand bytes.
    TruncatedInstruction { opcode: Opcode },
    /// A branch or loop target falls outside the buffer.
    TargetOutOfBounds { target: u32, len: usize },
    /// A branch or loop target does not land on an instruction start.
    TargetMisaligned { target: u32 },
    /// A call target that is neither a symbol entry nor the noop-func.
    CallTargetNotSymbol { target: u32 },
}

impl std::fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownOpcode(byte) => write!(f, "unknown opcode byte {byte:#04x}"),
            Self::TruncatedInstruction { opcode } => {
                write!(f, "{opcode:?} is truncated (missing operand bytes)")
            }
            Self::TargetOutOfBounds { target, len } => {
                write!(f, "target {target:#x} is out of bounds (len={len})")
            }
            Self::TargetMisaligned { target } => {
                write!(f, "target {target:#x} does not land on an instruction start")
            }
            Self::CallTargetNotSymbol { target } => {
                write!(f, "call target {target:#x} is not a symbol entry")
            }
        }
    }
}

/// Validate a compiled program, collecting every problem found.
///
/// Returns `Ok(())` when the program is well formed, otherwise all detected
/// errors. Does NOT short-circuit on the first error.
pub fn validate(bytecode: &Bytecode) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let starts = decode_pass(bytecode, &mut errors);
    target_pass(bytecode, &starts, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Pass 1: walk the buffer, recording instruction-start offsets.
fn decode_pass(bytecode: &Bytecode, errors: &mut Vec<ValidationError>) -> HashSet<usize> {
    let code = &bytecode.instructions;
    let mut starts = HashSet::new();
    let mut offset = 0usize;

    while offset < code.len() {
        let opcode = match decode_header(code[offset]) {
            Some((opcode, _, _)) => opcode,
            None => {
                errors.push(ValidationError {
                    offset,
                    kind: ValidationErrorKind::UnknownOpcode(code[offset]),
                });
                // Best effort: skip one byte and keep decoding.
                offset += 1;
                continue;
            }
        };
        if offset + opcode.len() > code.len() {
            errors.push(ValidationError {
                offset,
                kind: ValidationErrorKind::TruncatedInstruction { opcode },
            });
            break;
        }
        starts.insert(offset);
        offset += opcode.len();
    }

    starts
}

/// Passes 2+3: check every branch/repeat/call destination.
fn target_pass(bytecode: &Bytecode, starts: &HashSet<usize>, errors: &mut Vec<ValidationError>) {
    let code = &bytecode.instructions;
    let entries: HashSet<u32> = bytecode
        .symbols
        .values()
        .copied()
        .chain(std::iter::once(NOOP_FUNC))
        .collect();

    let check_target = |offset: usize, target: u32, errors: &mut Vec<ValidationError>| {
        if target as usize >= code.len() {
            errors.push(ValidationError {
                offset,
                kind: ValidationErrorKind::TargetOutOfBounds {
                    target,
                    len: code.len(),
                },
            });
        } else if !starts.contains(&(target as usize)) {
            errors.push(ValidationError {
                offset,
                kind: ValidationErrorKind::TargetMisaligned { target },
            });
        }
    };

    for &offset in starts {
        let instr = &code[offset..];
        match decode_header(instr[0]).map(|(opcode, _, _)| opcode) {
            Some(Opcode::Branch) => check_target(offset, branch_target(instr), errors),
            Some(Opcode::BranchLinked) => {
                let target = branch_target(instr);
                check_target(offset, target, errors);
                if !entries.contains(&target) {
                    errors.push(ValidationError {
                        offset,
                        kind: ValidationErrorKind::CallTargetNotSymbol { target },
                    });
                }
            }
            Some(Opcode::Repeat) => check_target(offset, repeat_target(instr), errors),
            _ => {}
        }
    }
}
