// ABOUTME: Library surface exposing the scanner, parser, evaluator, and unit loader

pub mod ast;
pub mod env;
pub mod error;
pub mod eval;
pub mod parser;
pub mod scanner;
pub mod token;
pub mod units;
pub mod value;

pub use error::InterpError;
pub use eval::{execute, Interpreter};
pub use parser::{parse_program, parse_unit};
pub use scanner::scan;
pub use units::{import_unit, UnitLoader, UnitRegistry};

/// Scans and parses Pascal source text, then executes it to completion.
/// `loader` resolves any units named in the program's `uses` clause.
pub fn run(source: &str, loader: Option<&dyn UnitLoader>) -> Result<(), InterpError> {
    let tokens = scan(source)?;
    let program = parse_program(tokens)?;
    execute(&program, loader)
}
