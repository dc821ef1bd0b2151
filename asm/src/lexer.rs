use std::iter::Peekable;
use std::str::CharIndices;

use crate::error::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Double character tokens
    LAngleLAngle, // '<<'
    RAngleRAngle, // '>>'
    DollarDollar, // '$$'

    // Single character tokens
    Dollar,    // '$'
    Plus,      // '+'
    Minus,     // '-'
    Star,      // '*'
    Slash,     // '/'
    Percent,   // '%'
    Ampasand,  // '&'
    Pipe,      // '|'
    Caret,     // '^'
    Tilde,     // '~'
    Colon,     // ':'
    Comma,     // ','
    LParen,    // '('
    RParen,    // ')'
    LBracket,  // '['
    RBracket,  // ']'

    // Identifier, including `.local` and `name@extern`
    Ident(String),

    // Literals
    Number(i64),
    Float(f64),
    Text(String),
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenKind::LAngleLAngle => write!(f, "<<"),
            TokenKind::RAngleRAngle => write!(f, ">>"),
            TokenKind::DollarDollar => write!(f, "$$"),
            TokenKind::Dollar => write!(f, "$"),
            TokenKind::Plus => write!(f, "+"),
            TokenKind::Minus => write!(f, "-"),
            TokenKind::Star => write!(f, "*"),
            TokenKind::Slash => write!(f, "/"),
            TokenKind::Percent => write!(f, "%"),
            TokenKind::Ampasand => write!(f, "&"),
            TokenKind::Pipe => write!(f, "|"),
            TokenKind::Caret => write!(f, "^"),
            TokenKind::Tilde => write!(f, "~"),
            TokenKind::Colon => write!(f, ":"),
            TokenKind::Comma => write!(f, ","),
            TokenKind::LParen => write!(f, "("),
            TokenKind::RParen => write!(f, ")"),
            TokenKind::LBracket => write!(f, "["),
            TokenKind::RBracket => write!(f, "]"),
            TokenKind::Ident(name) => write!(f, "{name}"),
            TokenKind::Number(n) => write!(f, "{n}"),
            TokenKind::Float(x) => write!(f, "{x}"),
            TokenKind::Text(text) => write!(f, "{text:?}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// 1-based column
    pub col: usize,
}

impl Token {
    pub fn new(kind: TokenKind, col: usize) -> Self {
        Token { kind, col }
    }
}

pub struct LineLexer<'a> {
    iter: Peekable<CharIndices<'a>>,
}

impl<'a> LineLexer<'a> {
    pub fn new(line: &'a str) -> Self {
        Self {
            iter: line.char_indices().peekable(),
        }
    }
}

// ----------------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------------

impl<'a> LineLexer<'a> {
    fn peek_nth(&self, n: usize) -> Option<(usize, char)> {
        self.iter.clone().nth(n)
    }
    fn consume(&mut self) -> Option<(usize, char)> {
        self.iter.next()
    }
}

fn double_char_token(ch0: char, ch1: char) -> Option<TokenKind> {
    match (ch0, ch1) {
        ('<', '<') => Some(TokenKind::LAngleLAngle),
        ('>', '>') => Some(TokenKind::RAngleRAngle),
        ('$', '$') => Some(TokenKind::DollarDollar),
        _ => None,
    }
}

fn single_char_token(ch: char) -> Option<TokenKind> {
    match ch {
        '$' => Some(TokenKind::Dollar),
        '+' => Some(TokenKind::Plus),
        '-' => Some(TokenKind::Minus),
        '*' => Some(TokenKind::Star),
        '/' => Some(TokenKind::Slash),
        '%' => Some(TokenKind::Percent),
        '&' => Some(TokenKind::Ampasand),
        '|' => Some(TokenKind::Pipe),
        '^' => Some(TokenKind::Caret),
        '~' => Some(TokenKind::Tilde),
        ':' => Some(TokenKind::Colon),
        ',' => Some(TokenKind::Comma),
        '(' => Some(TokenKind::LParen),
        ')' => Some(TokenKind::RParen),
        '[' => Some(TokenKind::LBracket),
        ']' => Some(TokenKind::RBracket),
        _ => None,
    }
}

fn is_ident_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || matches!(ch, '_' | '.' | '?')
}

fn is_ident_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '_' | '.' | '?' | '@' | '$' | '#')
}

// ----------------------------------------------------------------------------
// Lexer
// ----------------------------------------------------------------------------

impl<'a> LineLexer<'a> {
    /// Tokens of one line, or the first lexical error with its column.
    pub fn parse(mut self) -> Result<Vec<Token>, (Error, usize)> {
        let mut tokens = Vec::new();
        while let Some((idx, ch0)) = self.peek_nth(0) {
            // 0. Skip whitespaces
            if ch0.is_whitespace() {
                self.consume();
                continue;
            }

            let col = idx + 1;

            // 1. Comment
            if ch0 == ';' {
                break;
            }

            // 2. Double character token
            if let Some((_, ch1)) = self.peek_nth(1) {
                if let Some(kind) = double_char_token(ch0, ch1) {
                    self.consume();
                    self.consume();
                    tokens.push(Token::new(kind, col));
                    continue;
                }
            }

            // 3. Single character token
            if let Some(kind) = single_char_token(ch0) {
                self.consume();
                tokens.push(Token::new(kind, col));
                continue;
            }

            // 4. Number literal
            if ch0.is_ascii_digit() {
                let kind = self.parse_number().map_err(|e| (e, col))?;
                tokens.push(Token::new(kind, col));
                continue;
            }

            // 5. String / char literal
            if matches!(ch0, '"' | '\'' | '`') {
                let kind = self.parse_text(ch0).map_err(|e| (e, col))?;
                tokens.push(Token::new(kind, col));
                continue;
            }

            // 6. Identifier or keyword
            if is_ident_start(ch0) {
                tokens.push(Token::new(self.parse_ident(), col));
                continue;
            }

            return Err((Error::UnexpectedChar(ch0), col));
        }
        Ok(tokens)
    }

    fn parse_ident(&mut self) -> TokenKind {
        let mut lexeme = String::new();
        while let Some((_, ch)) = self.iter.next_if(|(_, ch)| is_ident_char(*ch)) {
            lexeme.push(ch);
        }
        TokenKind::Ident(lexeme)
    }

    // Text: "hoge\n", 'fuga', `piyo`
    fn parse_text(&mut self, quote: char) -> Result<TokenKind, Error> {
        self.consume();

        let mut lexeme = String::new();
        let mut escape = false;
        while let Some((_, ch)) = self.consume() {
            if escape {
                lexeme.push(match ch {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    '0' => '\0',
                    ch => ch,
                });
                escape = false;
            } else if ch == quote {
                return Ok(TokenKind::Text(lexeme));
            } else if ch == '\\' && quote == '`' {
                escape = true;
            } else {
                lexeme.push(ch);
            }
        }
        Err(Error::UnterminatedString)
    }

    fn parse_number(&mut self) -> Result<TokenKind, Error> {
        let mut lexeme = String::new();
        while let Some((_, ch)) = self
            .iter
            .next_if(|(_, ch)| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '.'))
        {
            lexeme.push(ch);
        }
        parse_number_literal(&lexeme)
    }
}

fn parse_number_literal(lexeme: &str) -> Result<TokenKind, Error> {
    let invalid = || Error::InvalidNumber(lexeme.to_string());
    let digits = lexeme.replace('_', "").to_ascii_lowercase();

    let is_hex_prefixed = digits.starts_with("0x");
    if digits.contains('.') && !is_hex_prefixed {
        return digits
            .parse::<f64>()
            .map(TokenKind::Float)
            .map_err(|_| invalid());
    }

    let (body, radix) = if let Some(body) = digits.strip_prefix("0x") {
        (body, 16)
    } else if let Some(body) = digits.strip_suffix('h') {
        (body, 16)
    } else if let Some(body) = digits.strip_prefix("0b") {
        (body, 2)
    } else if let Some(body) = digits.strip_prefix("0o") {
        (body, 8)
    } else if let Some(body) = digits.strip_suffix('b') {
        (body, 2)
    } else if let Some(body) = digits.strip_suffix(['o', 'q']) {
        (body, 8)
    } else {
        (digits.as_str(), 10)
    };

    u64::from_str_radix(body, radix)
        .map(|n| TokenKind::Number(n as i64))
        .map_err(|_| invalid())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(line: &str) -> Vec<TokenKind> {
        LineLexer::new(line)
            .parse()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn numbers() {
        use TokenKind::Number;
        assert_eq!(
            kinds("10 0x7C00 7Ch 0b101 101b 0o17 17q 1_000"),
            vec![
                Number(10),
                Number(0x7C00),
                Number(0x7C),
                Number(5),
                Number(5),
                Number(15),
                Number(15),
                Number(1000)
            ]
        );
        assert_eq!(kinds("1.5"), vec![TokenKind::Float(1.5)]);
        assert!(LineLexer::new("0xZZ").parse().is_err());
    }

    #[test]
    fn line_with_comment() {
        use TokenKind::*;
        let tokens = LineLexer::new("  .loop: times 510-($-$$) db 'ab' ; pad").parse().unwrap();
        assert_eq!(tokens[0].col, 3);
        assert_eq!(
            tokens.into_iter().map(|t| t.kind).collect::<Vec<_>>(),
            vec![
                Ident(".loop".into()),
                Colon,
                Ident("times".into()),
                Number(510),
                Minus,
                LParen,
                Dollar,
                Minus,
                DollarDollar,
                RParen,
                Ident("db".into()),
                Text("ab".into()),
            ]
        );
    }

    #[test]
    fn errors() {
        assert!(matches!(
            LineLexer::new("db \"abc").parse(),
            Err((Error::UnterminatedString, 4))
        ));
        assert!(matches!(
            LineLexer::new("mov ax, !").parse(),
            Err((Error::UnexpectedChar('!'), 9))
        ));
        assert_eq!(kinds("call puts@extern"), vec![
            TokenKind::Ident("call".into()),
            TokenKind::Ident("puts@extern".into())
        ]);
    }
}
