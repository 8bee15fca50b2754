//! Check command - compile without running

use anyhow::{bail, Context, Result};
use karel_runtime::Compiler;
use std::fs;

/// Compile `file` and report the outcome.
pub fn run(file: &str) -> Result<()> {
    let source =
        fs::read_to_string(file).with_context(|| format!("failed to read source file {file}"))?;

    match Compiler::compile(&source) {
        Ok(bytecode) => {
            println!(
                "{file}: ok ({} bytes, {} symbols)",
                bytecode.instructions.len(),
                bytecode.symbols.len()
            );
            Ok(())
        }
        Err(err) => {
            eprintln!("{file}: error: {err}");
            bail!("compilation failed")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_check_valid_program() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "MAIN\n  STEP\nEND\n").unwrap();
        run(file.path().to_str().unwrap()).unwrap();
    }

    #[test]
    fn test_check_invalid_program_fails() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "MAIN\n  REPEAT x-TIMES\n  END\nEND\n").unwrap();
        assert!(run(file.path().to_str().unwrap()).is_err());
    }
}
