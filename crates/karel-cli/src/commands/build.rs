//! Build command - compile and inspect the bytecode

use anyhow::{Context, Result};
use karel_runtime::bytecode::disassemble;
use karel_runtime::Compiler;
use std::fs;

/// Compile `file`; with `disasm` print the full listing, otherwise a summary.
pub fn run(file: &str, disasm: bool) -> Result<()> {
    let source =
        fs::read_to_string(file).with_context(|| format!("failed to read source file {file}"))?;
    let bytecode = Compiler::compile(&source).with_context(|| format!("failed to compile {file}"))?;

    if disasm {
        print!("{}", disassemble(&bytecode));
    } else {
        println!(
            "{file}: {} bytes of bytecode, {} symbols",
            bytecode.instructions.len(),
            bytecode.symbols.len()
        );
    }
    Ok(())
}
