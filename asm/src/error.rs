use color_print::cprintln;
use thiserror::Error;

use crate::ast::Loc;

#[derive(Error, Debug)]
pub enum Error {
    // Lexer / parser
    #[error("Unexpected character: `{0}`")]
    UnexpectedChar(char),

    #[error("Unterminated string literal")]
    UnterminatedString,

    #[error("Cannot parse `{0}` as number")]
    InvalidNumber(String),

    #[error("Unexpected token: `{0}`")]
    UnexpectedToken(String),

    #[error("Unexpected end of line")]
    UnexpectedEol,

    #[error("Unknown instruction: `{0}`")]
    UnknownInstruction(String),

    #[error("`times` expects a repeat count and a statement")]
    IncorrectTimesArgsCount,

    #[error("Missing statement to repeat after `times`")]
    MissingTimesRepeatedInstruction,

    #[error("Unable to parse repeated statement: {0}")]
    UnableParseRepeatedInstruction(#[source] Box<Error>),

    // Directives
    #[error("Origin is already defined")]
    OriginRedefined,

    #[error("Unsupported bit width: {0}")]
    UnsupportedBits(i64),

    #[error("Unsupported target CPU: `{0}`")]
    UnsupportedTarget(String),

    // Symbols
    #[error("Reserved word used as a name: `{0}`")]
    UsedReservedName(String),

    #[error("Label already defined: `{0}`")]
    LabelAlreadyDefined(String),

    #[error("Constant already defined: `{0}`")]
    EquAlreadyDefined(String),

    #[error("Unknown label: `{0}`")]
    UnknownLabel(String),

    #[error("Constant `{0}` never resolves")]
    UnresolvedConstant(String),

    #[error("Local label `{0}` has no parent label")]
    MissingParentLabel(String),

    // Encoding
    #[error("No encoding of `{0}` matches its operands")]
    UnknownCompilerInstruction(String),

    #[error(transparent)]
    Encode(#[from] arch::Error),

    #[error("Value `{value}` exceeds the {size} byte(s) of the definition")]
    DefinedDataExceedsBounds { value: i64, size: usize },

    #[error("Floats cannot be stored in {0} byte(s)")]
    IncorrectFloatSize(usize),

    #[error("Incorrect times value: {0}")]
    IncorrectTimesValue(i64),

    #[error("Only instructions and data definitions can be repeated")]
    UnpermittedRepeatedNode,

    #[error("Division by zero")]
    DivisionByZero,

    // Convergence
    #[error("Unable to compile file: no fixed point after {0} pass(es)")]
    UnableToCompile(usize),

    // Internal
    #[error("Incorrect slave blobs: only constants can share an address")]
    IncorrectSlaveBlobs,

    // CLI
    #[error("Failed to open file: {0}")]
    FileOpen(String, #[source] std::io::Error),

    #[error("Failed to create file: {0}")]
    FileCreate(String, #[source] std::io::Error),

    #[error("Failed to write file: {0}")]
    FileWrite(String, #[source] std::io::Error),

    #[error("Failed to read symbol file: {0}")]
    SymbolFile(String, #[source] serde_yaml::Error),

    #[error("Failed to serialize symbol map")]
    SymbolMap(#[source] serde_yaml::Error),
}

impl Error {
    pub fn at(self, loc: Loc) -> Diagnostic {
        Diagnostic {
            error: self,
            loc: Some(loc),
        }
    }
}

/// An error with the source location it was raised at, if it has one.
#[derive(Error, Debug)]
#[error("{error}")]
pub struct Diagnostic {
    pub error: Error,
    pub loc: Option<Loc>,
}

impl From<Error> for Diagnostic {
    fn from(error: Error) -> Self {
        Diagnostic { error, loc: None }
    }
}

impl Diagnostic {
    /// Print error with diagnostic information showing file location and line content
    pub fn print_diag(&self, file: &str, source: &str) {
        cprintln!("<red,bold>error</>: {}", self.error);

        let Some(loc) = self.loc else {
            cprintln!("     <blue>--></> <underline>{}</>", file);
            return;
        };

        cprintln!(
            "     <blue>--></> <underline>{}:{}:{}</>",
            file,
            loc.line,
            loc.column
        );
        cprintln!("      <blue>|</>");

        let line_content = source.lines().nth(loc.line.saturating_sub(1)).unwrap_or("");

        cprintln!(" <blue>{:>4} |</> {}", loc.line, line_content);
        cprintln!(
            "      <blue>|</> {}<red,bold>^</>",
            " ".repeat(loc.column.saturating_sub(1))
        );
    }
}
