// ABOUTME: CLI entry point: reads a Pascal source file and executes it

use clap::Parser;
use pascal_interp::{execute, parse_program, scan};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "pascal-interp", about = "A tree-walking interpreter for a subset of Pascal")]
struct Cli {
    /// Path to a .pas source file
    source: PathBuf,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let source = match std::fs::read_to_string(&cli.source) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{}: {}", cli.source.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let tokens = match scan(&source) {
        Ok(tokens) => tokens,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    let program = match parse_program(tokens) {
        Ok(program) => program,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    match execute(&program, None) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}
