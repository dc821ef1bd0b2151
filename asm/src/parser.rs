use arch::{Mnemonic, Reg};

use crate::ast::{
    CompilerOption, DefArg, DefSize, Definition, Equ, Instruction, InstructionArg, Label, Loc,
    Node, NodeKind, Times,
};
use crate::error::{Diagnostic, Error};
use crate::expr::{BinaryOp, Expr, UnaryOp};
use crate::lexer::{LineLexer, Token, TokenKind, TokenKind::*};

/// Parse a whole source file. Every line is parsed even after an error so
/// that all diagnostics are reported at once.
pub fn parse(source: &str) -> Result<Vec<Node>, Vec<Diagnostic>> {
    let mut nodes = Vec::new();
    let mut errors = Vec::new();
    for (idx, line) in source.lines().enumerate() {
        match parse_line(idx + 1, line) {
            Ok(parsed) => nodes.extend(parsed),
            Err(diag) => errors.push(diag),
        }
    }
    if errors.is_empty() {
        Ok(nodes)
    } else {
        Err(errors)
    }
}

/// Parse a single line into zero or more nodes (a label and a statement).
pub fn parse_line(line: usize, text: &str) -> Result<Vec<Node>, Diagnostic> {
    let tokens = LineLexer::new(text)
        .parse()
        .map_err(|(error, column)| error.at(Loc { line, column }))?;
    let mut parser = LineParser::new(tokens, line, text.len() + 1);
    parser.parse().map_err(|error| {
        let column = parser.col();
        error.at(Loc { line, column })
    })
}

struct LineParser {
    tokens: Vec<Token>,
    pos: usize,
    line: usize,
    eol: usize,
}

macro_rules! check {
    ($parser:expr, $kind:pat) => {
        matches!($parser.peek().map(|t| &t.kind), Some($kind))
    };
}

macro_rules! expect {
    ($parser:expr, $kind:pat) => {
        $parser.expect_tobe(|kind| matches!(kind, $kind))
    };
}

// ----------------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------------

impl LineParser {
    fn new(tokens: Vec<Token>, line: usize, eol: usize) -> Self {
        LineParser {
            tokens,
            pos: 0,
            line,
            eol,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_nth(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.pos + n)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    /// Column of the next token, or end of line
    fn col(&self) -> usize {
        self.peek().map_or(self.eol, |t| t.col)
    }

    fn loc(&self) -> Loc {
        Loc {
            line: self.line,
            column: self.col(),
        }
    }

    fn unexpected(&self) -> Error {
        match self.peek() {
            Some(token) => Error::UnexpectedToken(token.kind.to_string()),
            None => Error::UnexpectedEol,
        }
    }

    fn expect_tobe<F: Fn(&TokenKind) -> bool>(&mut self, cond: F) -> Result<Token, Error> {
        if self.peek().is_some_and(|token| cond(&token.kind)) {
            self.next().ok_or(Error::UnexpectedEol)
        } else {
            Err(self.unexpected())
        }
    }

    fn expect_end(&self) -> Result<(), Error> {
        if self.at_end() {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn parse_ident(&mut self) -> Result<String, Error> {
        match self.next() {
            Some(Token {
                kind: Ident(name), ..
            }) => Ok(name),
            Some(token) => Err(Error::UnexpectedToken(token.kind.to_string())),
            None => Err(Error::UnexpectedEol),
        }
    }

    fn ident_at(&self, n: usize) -> Option<&str> {
        match self.peek_nth(n) {
            Some(Token {
                kind: Ident(name), ..
            }) => Some(name.as_str()),
            _ => None,
        }
    }
}

fn is_equ(name: &str) -> bool {
    name.eq_ignore_ascii_case("equ")
}

fn is_directive(name: &str) -> bool {
    ["org", "bits", "target"]
        .iter()
        .any(|d| d.eq_ignore_ascii_case(name))
}

/// Words that start a statement
fn is_statement_keyword(name: &str) -> bool {
    is_directive(name)
        || name.eq_ignore_ascii_case("times")
        || DefSize::parse(name).is_some()
        || Mnemonic::parse(name).is_some()
}

// ----------------------------------------------------------------------------
// Statements
// ----------------------------------------------------------------------------

impl LineParser {
    /// line = "[" directive "]"
    ///      | ident [":"] "equ" expr
    ///      | ident ":" [ statement ]
    ///      | ident def-size def-args
    ///      | [ statement ]
    fn parse(&mut self) -> Result<Vec<Node>, Error> {
        let mut nodes = Vec::new();

        if check!(self, LBracket) {
            expect!(self, LBracket)?;
            let node = self.parse_statement()?;
            if !matches!(node.kind, NodeKind::CompilerOption(_)) {
                return Err(Error::UnexpectedToken("[".to_string()));
            }
            expect!(self, RBracket)?;
            self.expect_end()?;
            nodes.push(node);
            return Ok(nodes);
        }

        if let Some(name) = self.ident_at(0).map(str::to_string) {
            let loc = self.loc();

            // name equ expr / name: equ expr
            let colon = matches!(self.peek_nth(1).map(|t| &t.kind), Some(Colon));
            let equ_at = if colon { 2 } else { 1 };
            if self.ident_at(equ_at).is_some_and(is_equ) {
                self.pos += equ_at + 1;
                let expr = self.parse_expr()?;
                self.expect_end()?;
                nodes.push(Node::new(NodeKind::Equ(Equ { name, expr }), loc));
                return Ok(nodes);
            }

            // name:
            if colon {
                self.pos += 2;
                nodes.push(Node::new(NodeKind::Label(Label { name }), loc));
            }
            // name db ...
            else if !is_statement_keyword(&name)
                && self.ident_at(1).and_then(DefSize::parse).is_some()
            {
                self.pos += 1;
                nodes.push(Node::new(NodeKind::Label(Label { name }), loc));
            }
        }

        if !self.at_end() {
            nodes.push(self.parse_statement()?);
            self.expect_end()?;
        }
        Ok(nodes)
    }

    /// statement = directive | "times" expr statement | def-size def-args | mnemonic args
    fn parse_statement(&mut self) -> Result<Node, Error> {
        let loc = self.loc();
        let name = self.parse_ident()?;
        let lower = name.to_ascii_lowercase();

        let kind = if is_directive(&lower) {
            NodeKind::CompilerOption(self.parse_directive(&lower)?)
        } else if lower == "times" {
            NodeKind::Times(self.parse_times()?)
        } else if let Some(size) = DefSize::parse(&lower) {
            NodeKind::Definition(self.parse_definition(size)?)
        } else if let Some(mnemonic) = Mnemonic::parse(&lower) {
            NodeKind::Instruction(self.parse_instruction(mnemonic)?)
        } else {
            return Err(Error::UnknownInstruction(name));
        };
        Ok(Node::new(kind, loc))
    }

    /// directive = "org" expr | "bits" expr | "target" ( ident | number )
    fn parse_directive(&mut self, name: &str) -> Result<CompilerOption, Error> {
        match name {
            "org" => Ok(CompilerOption::Org(self.parse_expr()?)),
            "bits" => Ok(CompilerOption::Bits(self.parse_expr()?)),
            _ => match self.next() {
                Some(Token {
                    kind: Ident(cpu), ..
                }) => Ok(CompilerOption::Target(cpu)),
                Some(Token {
                    kind: Number(cpu), ..
                }) => Ok(CompilerOption::Target(cpu.to_string())),
                Some(token) => Err(Error::UnexpectedToken(token.kind.to_string())),
                None => Err(Error::UnexpectedEol),
            },
        }
    }

    /// times = "times" expr statement
    fn parse_times(&mut self) -> Result<Times, Error> {
        if self.at_end() || check!(self, RBracket) {
            return Err(Error::IncorrectTimesArgsCount);
        }
        let count = self.parse_expr()?;
        if self.at_end() {
            return Err(Error::MissingTimesRepeatedInstruction);
        }
        let node = self
            .parse_statement()
            .map_err(|e| Error::UnableParseRepeatedInstruction(Box::new(e)))?;
        Ok(Times {
            count,
            node: Box::new(node),
        })
    }

    /// def-args = def-arg { "," def-arg }
    fn parse_definition(&mut self, size: DefSize) -> Result<Definition, Error> {
        let mut args = vec![self.parse_def_arg()?];
        while check!(self, Comma) {
            expect!(self, Comma)?;
            args.push(self.parse_def_arg()?);
        }
        Ok(Definition { size, args })
    }

    /// def-arg = text | [ "-" ] float | expr
    fn parse_def_arg(&mut self) -> Result<DefArg, Error> {
        let standalone = |t: Option<&Token>| t.map_or(true, |t| t.kind == Comma);
        match self.peek().map(|t| &t.kind) {
            Some(Text(text)) if standalone(self.peek_nth(1)) => {
                let text = text.clone();
                self.next();
                Ok(DefArg::Text(text))
            }
            Some(Float(x)) => {
                let x = *x;
                self.next();
                Ok(DefArg::Float(x))
            }
            Some(Minus) if matches!(self.peek_nth(1).map(|t| &t.kind), Some(Float(_))) => {
                self.next();
                match self.next().map(|t| t.kind) {
                    Some(Float(x)) => Ok(DefArg::Float(-x)),
                    _ => Err(Error::UnexpectedEol),
                }
            }
            _ => Ok(DefArg::Expr(self.parse_expr()?)),
        }
    }

    /// args = [ arg { "," arg } ]
    fn parse_instruction(&mut self, mnemonic: Mnemonic) -> Result<Instruction, Error> {
        let mut args = Vec::new();
        if !self.at_end() {
            args.push(self.parse_arg()?);
            while check!(self, Comma) {
                expect!(self, Comma)?;
                args.push(self.parse_arg()?);
            }
        }
        Ok(Instruction { mnemonic, args })
    }

    /// arg = reg | expr
    fn parse_arg(&mut self) -> Result<InstructionArg, Error> {
        let reg = self.ident_at(0).and_then(Reg::parse);
        let ends = matches!(self.peek_nth(1).map(|t| &t.kind), None | Some(Comma));
        match reg {
            Some(reg) if ends => {
                self.next();
                Ok(InstructionArg::Reg(reg))
            }
            _ => Ok(InstructionArg::Expr(self.parse_expr()?)),
        }
    }
}

// ----------------------------------------------------------------------------
// Expressions
// ----------------------------------------------------------------------------

impl LineParser {
    /// expr = or-expr
    pub fn parse_expr(&mut self) -> Result<Expr, Error> {
        self.parse_or_expr()
    }

    fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    /// or-expr = xor-expr { "|" xor-expr }
    fn parse_or_expr(&mut self) -> Result<Expr, Error> {
        let mut lhs = self.parse_xor_expr()?;
        while check!(self, Pipe) {
            expect!(self, Pipe)?;
            let rhs = self.parse_xor_expr()?;
            lhs = Self::binary(BinaryOp::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    /// xor-expr = and-expr { "^" and-expr }
    fn parse_xor_expr(&mut self) -> Result<Expr, Error> {
        let mut lhs = self.parse_and_expr()?;
        while check!(self, Caret) {
            expect!(self, Caret)?;
            let rhs = self.parse_and_expr()?;
            lhs = Self::binary(BinaryOp::Xor, lhs, rhs);
        }
        Ok(lhs)
    }

    /// and-expr = shift-expr { "&" shift-expr }
    fn parse_and_expr(&mut self) -> Result<Expr, Error> {
        let mut lhs = self.parse_shift_expr()?;
        while check!(self, Ampasand) {
            expect!(self, Ampasand)?;
            let rhs = self.parse_shift_expr()?;
            lhs = Self::binary(BinaryOp::And, lhs, rhs);
        }
        Ok(lhs)
    }

    /// shift-expr = add-expr { ( "<<" | ">>" ) add-expr }
    fn parse_shift_expr(&mut self) -> Result<Expr, Error> {
        let mut lhs = self.parse_add_expr()?;
        loop {
            let op = match self.peek().map(|t| &t.kind) {
                Some(LAngleLAngle) => BinaryOp::Shl,
                Some(RAngleRAngle) => BinaryOp::Shr,
                _ => return Ok(lhs),
            };
            self.next();
            let rhs = self.parse_add_expr()?;
            lhs = Self::binary(op, lhs, rhs);
        }
    }

    /// add-expr = mul-expr { ( "+" | "-" ) mul-expr }
    fn parse_add_expr(&mut self) -> Result<Expr, Error> {
        let mut lhs = self.parse_mul_expr()?;
        loop {
            let op = match self.peek().map(|t| &t.kind) {
                Some(Plus) => BinaryOp::Add,
                Some(Minus) => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.next();
            let rhs = self.parse_mul_expr()?;
            lhs = Self::binary(op, lhs, rhs);
        }
    }

    /// mul-expr = unary-expr { ( "*" | "/" | "%" ) unary-expr }
    fn parse_mul_expr(&mut self) -> Result<Expr, Error> {
        let mut lhs = self.parse_unary_expr()?;
        loop {
            let op = match self.peek().map(|t| &t.kind) {
                Some(Star) => BinaryOp::Mul,
                Some(Slash) => BinaryOp::Div,
                Some(Percent) => BinaryOp::Mod,
                _ => return Ok(lhs),
            };
            self.next();
            let rhs = self.parse_unary_expr()?;
            lhs = Self::binary(op, lhs, rhs);
        }
    }

    /// unary-expr = ( "+" | "-" | "~" ) unary-expr | prim-expr
    fn parse_unary_expr(&mut self) -> Result<Expr, Error> {
        let op = match self.peek().map(|t| &t.kind) {
            Some(Plus) => UnaryOp::Pos,
            Some(Minus) => UnaryOp::Neg,
            Some(Tilde) => UnaryOp::Not,
            _ => return self.parse_prim_expr(),
        };
        self.next();
        let expr = self.parse_unary_expr()?;
        Ok(Expr::Unary(op, Box::new(expr)))
    }

    /// prim-expr = number | char | ident | "$" | "$$" | "(" expr ")"
    fn parse_prim_expr(&mut self) -> Result<Expr, Error> {
        let Some(token) = self.peek().cloned() else {
            return Err(Error::UnexpectedEol);
        };
        match token.kind {
            Number(n) => {
                self.next();
                Ok(Expr::Num(n))
            }
            // 'ab' == 0x6261
            Text(text) if text.len() <= 8 => {
                self.next();
                let value = text
                    .bytes()
                    .rev()
                    .fold(0i64, |acc, b| (acc << 8) | b as i64);
                Ok(Expr::Num(value))
            }
            Ident(name) => {
                self.next();
                Ok(Expr::Symbol(name))
            }
            Dollar => {
                self.next();
                Ok(Expr::Symbol("$".to_string()))
            }
            DollarDollar => {
                self.next();
                Ok(Expr::Symbol("$$".to_string()))
            }
            LParen => {
                expect!(self, LParen)?;
                let expr = self.parse_expr()?;
                expect!(self, RParen)?;
                Ok(expr)
            }
            _ => Err(self.unexpected()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one(line: &str) -> NodeKind {
        let mut nodes = parse_line(1, line).unwrap();
        assert_eq!(nodes.len(), 1, "{line}");
        nodes.remove(0).kind
    }

    #[test]
    fn label_and_statement() {
        let nodes = parse_line(3, "start: mov ax, 0x10").unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(
            nodes[0],
            Node::new(
                NodeKind::Label(Label {
                    name: "start".into()
                }),
                Loc { line: 3, column: 1 }
            )
        );
        assert_eq!(
            nodes[1],
            Node::new(
                NodeKind::Instruction(Instruction {
                    mnemonic: Mnemonic::Mov,
                    args: vec![InstructionArg::Reg(Reg::AX), InstructionArg::Expr(Expr::Num(16))],
                }),
                Loc { line: 3, column: 8 }
            )
        );
    }

    #[test]
    fn equ_forms() {
        for line in ["a equ b+1", "a: equ b+1", "a EQU b+1"] {
            assert_eq!(
                one(line),
                NodeKind::Equ(Equ {
                    name: "a".into(),
                    expr: Expr::Binary(
                        BinaryOp::Add,
                        Box::new(Expr::Symbol("b".into())),
                        Box::new(Expr::Num(1))
                    ),
                })
            );
        }
    }

    #[test]
    fn named_definition() {
        let nodes = parse_line(1, "msg db 'hi', 0").unwrap();
        assert!(matches!(&nodes[0].kind, NodeKind::Label(Label { name }) if name == "msg"));
        assert_eq!(
            nodes[1].kind,
            NodeKind::Definition(Definition {
                size: DefSize::Db,
                args: vec![DefArg::Text("hi".into()), DefArg::Expr(Expr::Num(0))],
            })
        );
        assert_eq!(
            one("dd -1.5, 'a'+1"),
            NodeKind::Definition(Definition {
                size: DefSize::Dd,
                args: vec![
                    DefArg::Float(-1.5),
                    DefArg::Expr(Expr::Binary(
                        BinaryOp::Add,
                        Box::new(Expr::Num(0x61)),
                        Box::new(Expr::Num(1))
                    )),
                ],
            })
        );
    }

    #[test]
    fn directives() {
        assert_eq!(
            one("[org 0x7C00]"),
            NodeKind::CompilerOption(CompilerOption::Org(Expr::Num(0x7C00)))
        );
        assert_eq!(
            one("bits 32"),
            NodeKind::CompilerOption(CompilerOption::Bits(Expr::Num(32)))
        );
        assert_eq!(
            one("[target 386]"),
            NodeKind::CompilerOption(CompilerOption::Target("386".into()))
        );
    }

    #[test]
    fn times() {
        let NodeKind::Times(times) = one("times 510-($-$$) db 0") else {
            panic!("not times");
        };
        assert!(times.count.is_symbolic());
        assert!(matches!(times.node.kind, NodeKind::Definition(_)));
        assert_eq!(times.node.loc.column, 18);
    }

    #[test]
    fn precedence() {
        let NodeKind::Instruction(inst) = one("int 1 + 2 * 3 << 1 | 1") else {
            panic!("not an instruction");
        };
        let InstructionArg::Expr(expr) = &inst.args[0] else {
            panic!("not an expression");
        };
        assert_eq!(
            expr.eval(&crate::expr::NoSymbols).unwrap(),
            crate::expr::Eval::Value(((1 + 2 * 3) << 1) | 1)
        );
    }

    #[test]
    fn errors() {
        let err = |line: &str| parse_line(1, line).unwrap_err();
        assert!(matches!(err("times").error, Error::IncorrectTimesArgsCount));
        assert!(matches!(err("times 3").error, Error::MissingTimesRepeatedInstruction));
        assert!(matches!(
            err("times 3 hoge").error,
            Error::UnableParseRepeatedInstruction(_)
        ));
        assert!(matches!(err("hoge ax").error, Error::UnknownInstruction(_)));
        let diag = err("mov ax, )");
        assert!(matches!(diag.error, Error::UnexpectedToken(_)));
        assert_eq!(diag.loc, Some(Loc { line: 1, column: 9 }));
    }

    #[test]
    fn all_errors_are_collected() {
        let errors = parse("hoge\nnop\nmov ax,\n").unwrap_err();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[1].loc.map(|l| l.line), Some(3));
    }
}
