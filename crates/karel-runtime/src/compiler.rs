//! Karel-lang to bytecode compiler
//!
//! Single pass over the source lines, emitting into a flat buffer:
//! - Each top-level symbol compiles to its body followed by `Retn`
//! - Loops and conditionals compile to branches patched once the scope ends
//! - Calls to not-yet-defined symbols leave a 4-byte hole recorded in a
//!   fixup map and resolved after the last definition; names that never
//!   materialize resolve to the noop-func, so skeletal programs still run

use crate::bytecode::{Bytecode, Condition, Opcode, NOOP_FUNC};
use std::collections::HashMap;
use std::num::IntErrorKind;
use thiserror::Error;

/// Fatal compile error. No partial program survives any of these.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// Condition did not start with `IS ` or `ISNOT `
    #[error("line {line}: condition {token:?} must start with IS or ISNOT")]
    UnknownConditionPrefix { line: usize, token: String },
    /// Unrecognized sense predicate after the prefix
    #[error("line {line}: unknown condition {token:?}")]
    UnknownCondition { line: usize, token: String },
    /// Malformed `REPEAT` count
    #[error("line {line}: invalid repeat count {token:?}")]
    RepeatCountInvalid { line: usize, token: String },
    /// `REPEAT` count does not fit in 16 bits
    #[error("line {line}: repeat count {token:?} exceeds 65535")]
    RepeatCountTooBig { line: usize, token: String },
    /// Two definitions of the same symbol name
    #[error("line {line}: symbol {name:?} is already defined")]
    SymbolAlreadyDefined { line: usize, name: String },
    /// Source ended before the scope's `END`
    #[error("unexpected end of file inside {name:?}")]
    UnexpectedEndOfFile { name: String },
}

/// How a nested scope may terminate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Terminator {
    End,
    Else,
}

/// Line reader: strips comments and surrounding spaces, skips blanks, and
/// tracks the 1-based number of the line it most recently produced.
struct LineCursor<'src> {
    lines: std::iter::Enumerate<std::str::Lines<'src>>,
    line_no: usize,
}

impl<'src> LineCursor<'src> {
    fn new(source: &'src str) -> Self {
        Self {
            lines: source.lines().enumerate(),
            line_no: 0,
        }
    }

    /// Next non-blank line with comment and padding removed.
    fn next_content(&mut self) -> Option<&'src str> {
        for (index, raw) in self.lines.by_ref() {
            // Everything from the first `;` is comment.
            let code = match raw.find(';') {
                Some(at) => &raw[..at],
                None => raw,
            };
            let code = code.trim();
            if !code.is_empty() {
                self.line_no = index + 1;
                return Some(code);
            }
        }
        None
    }
}

/// Compiler state for one source unit
pub struct Compiler<'src> {
    cursor: LineCursor<'src>,
    bytecode: Bytecode,
    /// Call sites waiting for a symbol address: name → 4-byte slot offsets
    fixups: HashMap<String, Vec<u32>>,
}

impl<'src> Compiler<'src> {
    /// Compile a full source unit into a program.
    pub fn compile(source: &'src str) -> Result<Bytecode, CompileError> {
        let mut compiler = Self {
            cursor: LineCursor::new(source),
            bytecode: Bytecode::with_prelude(),
            fixups: HashMap::new(),
        };
        while let Some(name) = compiler.cursor.next_content() {
            compiler.compile_symbol(name)?;
        }
        compiler.resolve_fixups();
        Ok(compiler.bytecode)
    }

    /// Compile one `NAME … END` definition.
    fn compile_symbol(&mut self, name: &'src str) -> Result<(), CompileError> {
        if self.bytecode.symbols.contains_key(name) {
            return Err(CompileError::SymbolAlreadyDefined {
                line: self.cursor.line_no,
                name: name.to_owned(),
            });
        }
        let addr = self.bytecode.current_offset();
        // Recorded before the body so self-recursive calls resolve directly.
        self.bytecode.symbols.insert(name.to_owned(), addr);

        self.compile_scope(name, false)?;

        if self.bytecode.current_offset() == addr {
            // Empty body: the definition IS the noop-func.
            self.bytecode.symbols.insert(name.to_owned(), NOOP_FUNC);
        } else {
            self.bytecode.emit(Opcode::Retn);
        }
        Ok(())
    }

    /// Compile scope body lines until `END` (or `ELSE` when `allow_else`).
    fn compile_scope(
        &mut self,
        enclosing: &'src str,
        allow_else: bool,
    ) -> Result<Terminator, CompileError> {
        loop {
            let line = self
                .cursor
                .next_content()
                .ok_or_else(|| CompileError::UnexpectedEndOfFile {
                    name: enclosing.to_owned(),
                })?;
            match line {
                "END" => return Ok(Terminator::End),
                "ELSE" if allow_else => return Ok(Terminator::Else),
                "STEP" => self.bytecode.emit(Opcode::Step),
                "LEFT" => self.bytecode.emit(Opcode::Left),
                "PICK" => self.bytecode.emit(Opcode::PickUp),
                "PLACE" => self.bytecode.emit(Opcode::Place),
                "STOP" => self.bytecode.emit(Opcode::Stop),
                _ => {
                    if let Some(count) = line.strip_prefix("REPEAT ") {
                        self.compile_repeat(enclosing, count)?;
                    } else if let Some(cond) = line.strip_prefix("UNTIL ") {
                        self.compile_until(enclosing, cond)?;
                    } else if let Some(cond) = line.strip_prefix("IF ") {
                        self.compile_if(enclosing, cond)?;
                    } else {
                        self.compile_call(line);
                    }
                }
            }
        }
    }

    /// `REPEAT <N>-TIMES` body `END`
    ///
    /// The body compiles first; the `Repeat` instruction after it holds the
    /// count and the loop-top address, so the body always runs at least once
    /// before the counter is consulted.
    fn compile_repeat(&mut self, enclosing: &'src str, count: &str) -> Result<(), CompileError> {
        let count = self.parse_repeat_count(count)?;
        let loop_top = self.bytecode.current_offset();
        self.compile_scope(enclosing, false)?;
        self.bytecode.emit(Opcode::Repeat);
        self.bytecode.emit_u16(count);
        self.bytecode.emit_u32(loop_top);
        Ok(())
    }

    /// `UNTIL <cond>` body `END`
    ///
    /// Guard branch skips the body when the predicate already holds; the
    /// back-edge loops while it does not. Net effect: zero or more
    /// iterations, exiting when the predicate matches the UNTIL sense.
    fn compile_until(&mut self, enclosing: &'src str, cond: &str) -> Result<(), CompileError> {
        let (condition, invert) = self.parse_condition(cond)?;

        self.bytecode.emit_cond(Opcode::Branch, condition, invert);
        let guard_slot = self.bytecode.current_offset();
        self.bytecode.emit_u32(0);

        let loop_top = self.bytecode.current_offset();
        self.compile_scope(enclosing, false)?;

        self.bytecode.emit_cond(Opcode::Branch, condition, !invert);
        self.bytecode.emit_u32(loop_top);

        self.bytecode
            .patch_target(guard_slot, self.bytecode.current_offset());
        Ok(())
    }

    /// `IF <cond>` body [`ELSE` body] `END`
    fn compile_if(&mut self, enclosing: &'src str, cond: &str) -> Result<(), CompileError> {
        let (condition, invert) = self.parse_condition(cond)?;

        // Taken path goes to the else body.
        self.bytecode.emit_cond(Opcode::Branch, condition, !invert);
        let else_slot = self.bytecode.current_offset();
        self.bytecode.emit_u32(0);

        let terminator = self.compile_scope(enclosing, true)?;

        self.bytecode.emit(Opcode::Branch);
        let end_slot = self.bytecode.current_offset();
        self.bytecode.emit_u32(0);

        self.bytecode
            .patch_target(else_slot, self.bytecode.current_offset());
        if terminator == Terminator::Else {
            self.compile_scope(enclosing, false)?;
        }
        self.bytecode
            .patch_target(end_slot, self.bytecode.current_offset());
        Ok(())
    }

    /// Any other scope line is a call to the named symbol.
    fn compile_call(&mut self, name: &str) {
        self.bytecode.emit(Opcode::BranchLinked);
        let slot = self.bytecode.current_offset();
        match self.bytecode.symbol(name) {
            Some(addr) => self.bytecode.emit_u32(addr),
            None => {
                self.bytecode.emit_u32(0);
                self.fixups.entry(name.to_owned()).or_default().push(slot);
            }
        }
    }

    /// Patch every pending call site; names that never got a definition
    /// resolve to the noop-func.
    fn resolve_fixups(&mut self) {
        let fixups = std::mem::take(&mut self.fixups);
        for (name, slots) in fixups {
            let target = self.bytecode.symbol(&name).unwrap_or(NOOP_FUNC);
            for slot in slots {
                self.bytecode.patch_target(slot, target);
            }
        }
    }

    /// Parse the `<N>-TIMES` argument of `REPEAT`.
    ///
    /// `N` accepts base 10 and the standard `0x`/`0b` prefixes.
    fn parse_repeat_count(&self, token: &str) -> Result<u16, CompileError> {
        let line = self.cursor.line_no;
        let invalid = || CompileError::RepeatCountInvalid {
            line,
            token: token.to_owned(),
        };

        let Some(digits) = token.strip_suffix("-TIMES") else {
            return Err(invalid());
        };
        let parsed = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
            u16::from_str_radix(hex, 16)
        } else if let Some(bin) = digits.strip_prefix("0b").or_else(|| digits.strip_prefix("0B")) {
            u16::from_str_radix(bin, 2)
        } else {
            digits.parse::<u16>()
        };

        parsed.map_err(|err| {
            if matches!(err.kind(), IntErrorKind::PosOverflow) {
                CompileError::RepeatCountTooBig {
                    line,
                    token: token.to_owned(),
                }
            } else {
                invalid()
            }
        })
    }

    /// Parse `IS <pred>` / `ISNOT <pred>` into a condition code + inversion.
    fn parse_condition(&self, token: &str) -> Result<(Condition, bool), CompileError> {
        let line = self.cursor.line_no;
        let (invert, predicate) = if let Some(rest) = token.strip_prefix("IS ") {
            (false, rest)
        } else if let Some(rest) = token.strip_prefix("ISNOT ") {
            (true, rest)
        } else {
            return Err(CompileError::UnknownConditionPrefix {
                line,
                token: token.to_owned(),
            });
        };

        let condition = match predicate {
            "WALL" => Condition::IsWall,
            "FLAG" => Condition::IsFlag,
            "HOME" => Condition::IsHome,
            "NORTH" => Condition::IsNorth,
            "EAST" => Condition::IsEast,
            "SOUTH" => Condition::IsSouth,
            "WEST" => Condition::IsWest,
            _ => {
                return Err(CompileError::UnknownCondition {
                    line,
                    token: predicate.to_owned(),
                })
            }
        };
        Ok((condition, invert))
    }
}
