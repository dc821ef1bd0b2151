pub mod ast;
pub mod binary;
pub mod compiler;
pub mod error;
pub mod expr;
pub mod label;
pub mod lexer;
pub mod output;
pub mod parser;

pub use compiler::{compile, Compiler, CompilerConfig, CompilerState};
pub use error::{Diagnostic, Error};
pub use output::Binary;
pub use parser::parse;

/// Parse and compile `source` into a flat image.
pub fn assemble(source: &str, config: CompilerConfig) -> Result<Vec<u8>, Vec<Diagnostic>> {
    let nodes = parse(source)?;
    let binary = Compiler::new(config).compile(&nodes)?;
    Ok(binary.to_bytes())
}
