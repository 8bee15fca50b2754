//! Symbols command - dump the compiled symbol table

use anyhow::{Context, Result};
use karel_runtime::KarelVm;

/// Compile `file` and print its symbols in address order.
pub fn run(file: &str, json: bool) -> Result<()> {
    let mut vm = KarelVm::new();
    vm.load_file(file)
        .with_context(|| format!("failed to load {file}"))?;

    let dump = vm.dump_loaded();
    if json {
        println!("{}", serde_json::to_string_pretty(&dump)?);
    } else {
        for symbol in &dump {
            println!("{:#06x} {}", symbol.addr, symbol.name);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_symbols_lists_definitions() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "A\n  STEP\nEND\nB\n  LEFT\nEND\n").unwrap();
        run(file.path().to_str().unwrap(), false).unwrap();
        run(file.path().to_str().unwrap(), true).unwrap();
    }
}
