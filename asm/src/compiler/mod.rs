//! Two-pass binary resolution: pessimistic layout first, then relaxation
//! until labels, constants and sizes stop moving.

mod first_pass;
mod resolver;
mod second_pass;

pub use first_pass::{Entry, FirstPass};
pub use resolver::{EquTable, ExternalLinker, KnownConstants, Resolver, Symbols};
pub use second_pass::SecondPass;

use std::fmt;

use arch::{Mode, TargetCpu};
use tracing::debug;

use crate::ast::Node;
use crate::error::Diagnostic;
use crate::label::Scopes;
use crate::output::Binary;

/// Directive state threaded through the first pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompilerState {
    /// Set once by `org`
    pub origin: Option<i64>,
    pub mode: Mode,
    pub target: TargetCpu,
}

impl CompilerState {
    pub fn origin(&self) -> i64 {
        self.origin.unwrap_or(0)
    }
}

pub const DEFAULT_MAX_PASSES: usize = 7;

pub struct CompilerConfig {
    pub max_passes: usize,
    /// Address generator for `name@extern` symbols
    pub external_linker: Option<Box<ExternalLinker>>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            max_passes: DEFAULT_MAX_PASSES,
            external_linker: None,
        }
    }
}

impl fmt::Debug for CompilerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompilerConfig")
            .field("max_passes", &self.max_passes)
            .field("external_linker", &self.external_linker.is_some())
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct Compiler {
    config: CompilerConfig,
}

impl Compiler {
    pub fn new(config: CompilerConfig) -> Self {
        Compiler { config }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn compile<'a>(&self, nodes: &'a [Node]) -> Result<Binary<'a>, Vec<Diagnostic>> {
        self.run(nodes).map_err(|diag| vec![diag])
    }

    fn run<'a>(&self, nodes: &'a [Node]) -> Result<Binary<'a>, Diagnostic> {
        let scopes = Scopes::new(nodes);

        debug!(nodes = nodes.len(), "first pass");
        let first = FirstPass::new(CompilerState::default()).run(nodes, &scopes)?;
        debug!(
            entries = first.entries.len(),
            labels = first.labels.len(),
            constants = first.equ.len(),
            origin = first.state.origin(),
            "first pass done"
        );

        let symbols = Symbols {
            labels: first.labels,
            equ: first.equ,
            scopes,
            origin: first.state.origin(),
            external: self.config.external_linker.as_deref(),
        };
        SecondPass::new(first.entries, symbols, self.config.max_passes).run()
    }
}

/// Compile with the default configuration.
pub fn compile(nodes: &[Node]) -> Result<Binary<'_>, Vec<Diagnostic>> {
    Compiler::default().compile(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::parser::parse;

    fn bytes(source: &str) -> Vec<u8> {
        let nodes = parse(source).unwrap();
        compile(&nodes).unwrap().to_bytes()
    }

    #[test]
    fn short_jump_relaxes() {
        assert_eq!(bytes("jmp label\nnop\nlabel: nop"), vec![0xEB, 0x01, 0x90, 0x90]);
    }

    #[test]
    fn pass_budget() {
        let nodes = parse("jmp label\nnop\nlabel: nop").unwrap();
        let config = CompilerConfig {
            max_passes: 1,
            ..Default::default()
        };
        let diags = Compiler::new(config).compile(&nodes).unwrap_err();
        assert!(matches!(diags[0].error, Error::UnableToCompile(1)));

        let binary = compile(&nodes).unwrap();
        assert_eq!(binary.total_passes, 2);
    }

    #[test]
    fn config_debug_hides_closure() {
        let config = CompilerConfig {
            external_linker: Some(Box::new(|_: &str, _: i64| 0)),
            ..Default::default()
        };
        assert_eq!(
            format!("{config:?}"),
            "CompilerConfig { max_passes: 7, external_linker: true }"
        );
    }
}
