//! Bytecode disassembler
//!
//! Converts a compiled program back to a human-readable listing. Used for
//! debugging, tests, and `karel build --disasm` output.

use super::{branch_target, decode_header, repeat_count, repeat_target, Bytecode, Condition, Opcode};
use std::collections::HashMap;
use std::fmt::Write;

/// Disassemble a compiled program.
///
/// # Format
/// ```text
/// === Symbols ===
/// 0002 MAIN
///
/// === Instructions ===
/// MAIN:
/// 0002  STEP
/// 0003  BRANCH IS WALL -> 000f
/// ```
pub fn disassemble(bytecode: &Bytecode) -> String {
    let mut output = String::new();

    let mut symbols: Vec<(&str, u32)> = bytecode
        .symbols
        .iter()
        .map(|(name, &addr)| (name.as_str(), addr))
        .collect();
    symbols.sort_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(b.0)));

    if !symbols.is_empty() {
        writeln!(output, "=== Symbols ===").unwrap();
        for &(name, addr) in &symbols {
            writeln!(output, "{addr:04x} {name}").unwrap();
        }
        writeln!(output).unwrap();
    }

    let mut labels: HashMap<u32, Vec<&str>> = HashMap::new();
    for &(name, addr) in &symbols {
        labels.entry(addr).or_default().push(name);
    }

    writeln!(output, "=== Instructions ===").unwrap();
    let mut offset = 0usize;
    while offset < bytecode.instructions.len() {
        if let Some(names) = labels.get(&(offset as u32)) {
            for name in names {
                writeln!(output, "{name}:").unwrap();
            }
        }
        let line = disassemble_instruction(&bytecode.instructions, &mut offset);
        writeln!(output, "{line}").unwrap();
    }

    output
}

/// Disassemble the instruction at `offset`, advancing past it.
fn disassemble_instruction(code: &[u8], offset: &mut usize) -> String {
    let start = *offset;
    let byte = code[start];

    let (opcode, condition, invert) = match decode_header(byte) {
        Some(fields) => fields,
        None => {
            *offset += 1;
            return format!("{start:04x}  <invalid opcode: {byte:#04x}>");
        }
    };
    if start + opcode.len() > code.len() {
        *offset = code.len();
        return format!("{start:04x}  <truncated {}>", mnemonic(opcode));
    }
    let instr = &code[start..];
    *offset += opcode.len();

    let mut line = format!("{start:04x}  {}", mnemonic(opcode));
    if condition != Condition::None || invert {
        let prefix = if invert { "ISNOT" } else { "IS" };
        write!(line, " {prefix} {}", predicate(condition)).unwrap();
    }
    match opcode {
        Opcode::Branch | Opcode::BranchLinked => {
            write!(line, " -> {:04x}", branch_target(instr)).unwrap();
        }
        Opcode::Repeat => {
            write!(line, " {} -> {:04x}", repeat_count(instr), repeat_target(instr)).unwrap();
        }
        _ => {}
    }
    line
}

fn mnemonic(opcode: Opcode) -> &'static str {
    match opcode {
        Opcode::Step => "STEP",
        Opcode::Left => "LEFT",
        Opcode::PickUp => "PICK",
        Opcode::Place => "PLACE",
        Opcode::Retn => "RETN",
        Opcode::Stop => "STOP",
        Opcode::Branch => "BRANCH",
        Opcode::BranchLinked => "CALL",
        Opcode::Repeat => "REPEAT",
    }
}

fn predicate(condition: Condition) -> &'static str {
    match condition {
        Condition::None => "ALWAYS",
        Condition::IsWall => "WALL",
        Condition::IsFlag => "FLAG",
        Condition::IsHome => "HOME",
        Condition::IsNorth => "NORTH",
        Condition::IsEast => "EAST",
        Condition::IsSouth => "SOUTH",
        Condition::IsWest => "WEST",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disassemble_prelude() {
        let listing = disassemble(&Bytecode::with_prelude());
        assert!(listing.contains("0000  STOP"));
        assert!(listing.contains("0001  RETN"));
    }

    #[test]
    fn test_disassemble_branch_with_condition() {
        let mut bc = Bytecode::with_prelude();
        bc.emit_cond(Opcode::Branch, Condition::IsWall, true);
        bc.emit_u32(0x10);
        let listing = disassemble(&bc);
        assert!(listing.contains("0002  BRANCH ISNOT WALL -> 0010"));
    }

    #[test]
    fn test_disassemble_labels_symbols() {
        let mut bc = Bytecode::with_prelude();
        bc.symbols.insert("MAIN".to_owned(), 2);
        bc.emit(Opcode::Step);
        bc.emit(Opcode::Retn);
        let listing = disassemble(&bc);
        assert!(listing.contains("MAIN:\n0002  STEP"));
    }

    #[test]
    fn test_disassemble_repeat_operands() {
        let mut bc = Bytecode::with_prelude();
        bc.emit(Opcode::Step);
        bc.emit(Opcode::Repeat);
        bc.emit_u16(4);
        bc.emit_u32(2);
        let listing = disassemble(&bc);
        assert!(listing.contains("0003  REPEAT 4 -> 0002"));
    }
}
