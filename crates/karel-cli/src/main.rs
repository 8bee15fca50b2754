use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod world_file;

#[derive(Parser)]
#[command(name = "karel")]
#[command(about = "Karel the Robot compiler and virtual machine", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile and run a Karel program
    Run {
        /// Path to the Karel source file
        file: String,
        /// Entry-point symbol to execute
        #[arg(long, default_value = "MAIN")]
        symbol: String,
        /// World file (default: empty city, Karel at the origin facing north)
        #[arg(long)]
        world: Option<String>,
    },
    /// Compile a source file without running it
    Check {
        /// Path to the Karel source file
        file: String,
    },
    /// Compile a source file and report on the bytecode
    Build {
        /// Path to the Karel source file
        file: String,
        /// Print the full disassembly listing
        #[arg(long)]
        disasm: bool,
    },
    /// Compile a source file and dump its symbol table
    Symbols {
        /// Path to the Karel source file
        file: String,
        /// Emit the dump as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            symbol,
            world,
        } => {
            commands::run::run(&file, &symbol, world.as_deref())?;
        }
        Commands::Check { file } => {
            commands::check::run(&file)?;
        }
        Commands::Build { file, disasm } => {
            commands::build::run(&file, disasm)?;
        }
        Commands::Symbols { file, json } => {
            commands::symbols::run(&file, json)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_smoke() {
        let cli = Cli::parse_from(["karel", "check", "program.kl"]);
        match cli.command {
            Commands::Check { file } => assert_eq!(file, "program.kl"),
            _ => panic!("Expected Check command"),
        }
    }

    #[test]
    fn test_run_defaults_to_main_symbol() {
        let cli = Cli::parse_from(["karel", "run", "program.kl"]);
        match cli.command {
            Commands::Run { symbol, world, .. } => {
                assert_eq!(symbol, "MAIN");
                assert!(world.is_none());
            }
            _ => panic!("Expected Run command"),
        }
    }
}
