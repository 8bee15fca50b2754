//! Run command - execute a Karel program against a world

use crate::world_file;
use anyhow::{Context, Result};
use karel_runtime::world::CITY_AREA;
use karel_runtime::KarelVm;

/// Compile `file`, install the world, and execute `symbol`.
///
/// Prints the resulting world on success; on a runtime error prints the
/// partial world the run left behind and fails with the status code.
pub fn run(file: &str, symbol: &str, world: Option<&str>) -> Result<()> {
    let mut vm = KarelVm::new();
    vm.load_file(file)
        .with_context(|| format!("failed to load {file}"))?;

    let (city, karel) = match world {
        Some(path) => world_file::load(path)?,
        None => ([0u8; CITY_AREA], [0, 0, 0, 0, 0]),
    };
    vm.load_world(&city, &karel)
        .context("world rejected by the runtime")?;

    match vm.run_symbol(symbol) {
        Ok(stats) => {
            print!("{}", read_and_render(&vm));
            println!("done in {} instructions", stats.instructions);
            Ok(())
        }
        Err(err) => {
            eprintln!("runtime error: {err}");
            eprint!("{}", read_and_render(&vm));
            Err(anyhow::anyhow!(
                "program failed with status {:?}",
                vm.status()
            ))
        }
    }
}

fn read_and_render(vm: &KarelVm) -> String {
    let mut city = [0u8; CITY_AREA];
    let mut karel = [0u32; 5];
    match vm.read_world(&mut city, &mut karel) {
        Ok(()) => world_file::render(&city, &karel),
        Err(_) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn source_file(source: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{source}").unwrap();
        file
    }

    #[test]
    fn test_run_simple_program() {
        let file = source_file("MAIN\n  STEP\nEND\n");
        run(file.path().to_str().unwrap(), "MAIN", None).unwrap();
    }

    #[test]
    fn test_run_missing_symbol_fails() {
        let file = source_file("MAIN\n  STEP\nEND\n");
        assert!(run(file.path().to_str().unwrap(), "NOPE", None).is_err());
    }

    #[test]
    fn test_run_runtime_error_fails() {
        let file = source_file("MAIN\n  PICK\nEND\n");
        assert!(run(file.path().to_str().unwrap(), "MAIN", None).is_err());
    }
}
