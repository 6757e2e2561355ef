//! JavaScript lexer/tokenizer
//!
//! Produces tokens for the language subset the engine runs: numbers,
//! strings, identifiers, keywords and the punctuators needed for calls,
//! spread, member access and arithmetic.

mod token;

pub use token::{Keyword, Token, TokenKind};

use crate::error::{Error, Result, SourceLocation};

/// A lexer for JavaScript source code
pub struct Lexer<'src> {
    /// Source code being lexed
    source: &'src str,
    /// Current position in bytes
    pos: usize,
    /// Current line number (1-indexed)
    line: u32,
    /// Current column number (1-indexed)
    column: u32,
}

impl<'src> Lexer<'src> {
    /// Create a new lexer for the given source code
    pub fn new(source: &'src str) -> Self {
        Self {
            source,
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    fn location(&self) -> SourceLocation {
        SourceLocation {
            line: self.line,
            column: self.column,
            offset: self.pos,
        }
    }

    fn error(&self, message: impl Into<String>, location: SourceLocation) -> Error {
        Error::lexer_error(message, location).with_source_context(self.source)
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.source.len()
    }

    fn peek(&self) -> Option<char> {
        self.source[self.pos..].chars().next()
    }

    fn peek_next(&self) -> Option<char> {
        let mut chars = self.source[self.pos..].chars();
        chars.next();
        chars.next()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    /// Consume the next character if it equals `expected`
    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Finish a punctuator whose first character is already consumed. The
    /// first matching continuation wins, so list longer ones first.
    fn longest(&mut self, continuations: &[(&str, TokenKind)], single: TokenKind) -> TokenKind {
        for (rest, kind) in continuations {
            if self.source[self.pos..].starts_with(rest) {
                for _ in 0..rest.len() {
                    self.advance();
                }
                return *kind;
            }
        }
        single
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<()> {
        loop {
            while let Some(c) = self.peek() {
                if c.is_whitespace() {
                    self.advance();
                } else {
                    break;
                }
            }

            if self.peek() == Some('/') {
                if self.peek_next() == Some('/') {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                    continue;
                } else if self.peek_next() == Some('*') {
                    let start_loc = self.location();
                    self.advance();
                    self.advance();
                    loop {
                        match self.peek() {
                            None => return Err(self.error("Unterminated comment", start_loc)),
                            Some('*') if self.peek_next() == Some('/') => {
                                self.advance();
                                self.advance();
                                break;
                            }
                            _ => {
                                self.advance();
                            }
                        }
                    }
                    continue;
                }
            }

            return Ok(());
        }
    }

    fn is_id_start(c: char) -> bool {
        c == '_' || c == '$' || unicode_xid::UnicodeXID::is_xid_start(c)
    }

    fn is_id_continue(c: char) -> bool {
        c == '_' || c == '$' || unicode_xid::UnicodeXID::is_xid_continue(c)
    }

    fn scan_identifier(&mut self) -> Token<'src> {
        let start = self.pos;
        let start_loc = self.location();

        while let Some(c) = self.peek() {
            if Self::is_id_continue(c) {
                self.advance();
            } else {
                break;
            }
        }

        let text = &self.source[start..self.pos];
        let kind = match Keyword::from_text(text) {
            Some(keyword) => TokenKind::Keyword(keyword),
            None => TokenKind::Identifier,
        };

        Token {
            kind,
            text,
            location: start_loc,
        }
    }

    fn scan_digits(&mut self, accept: impl Fn(char) -> bool) {
        while let Some(c) = self.peek() {
            if accept(c) || c == '_' {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn scan_number(&mut self) -> Result<Token<'src>> {
        let start = self.pos;
        let start_loc = self.location();

        if self.peek() == Some('0') && matches!(self.peek_next(), Some('x' | 'X' | 'b' | 'B' | 'o' | 'O')) {
            self.advance();
            let radix = match self.advance() {
                Some('x' | 'X') => 16,
                Some('b' | 'B') => 2,
                _ => 8,
            };
            self.scan_digits(|c| c.is_digit(radix));
        } else {
            self.scan_digits(|c| c.is_ascii_digit());
            if self.peek() == Some('.') {
                self.advance();
                self.scan_digits(|c| c.is_ascii_digit());
            }
            if matches!(self.peek(), Some('e' | 'E')) {
                self.advance();
                if matches!(self.peek(), Some('+' | '-')) {
                    self.advance();
                }
                self.scan_digits(|c| c.is_ascii_digit());
            }
        }

        if self.peek().is_some_and(Self::is_id_start) {
            return Err(self.error("Identifier starts immediately after numeric literal", self.location()));
        }

        Ok(Token {
            kind: TokenKind::NumberLiteral,
            text: &self.source[start..self.pos],
            location: start_loc,
        })
    }

    fn scan_string(&mut self, quote: char) -> Result<Token<'src>> {
        let start = self.pos;
        let start_loc = self.location();
        self.advance();

        loop {
            match self.peek() {
                None | Some('\n') | Some('\r') => {
                    return Err(self.error("Unterminated string literal", start_loc));
                }
                Some('\\') => {
                    self.advance();
                    self.advance();
                }
                Some(c) if c == quote => {
                    self.advance();
                    break;
                }
                _ => {
                    self.advance();
                }
            }
        }

        Ok(Token {
            kind: TokenKind::StringLiteral,
            text: &self.source[start..self.pos],
            location: start_loc,
        })
    }

    /// Get the next token
    pub fn next_token(&mut self) -> Result<Token<'src>> {
        self.skip_whitespace_and_comments()?;

        let start_loc = self.location();
        let c = match self.peek() {
            Some(c) => c,
            None => {
                return Ok(Token {
                    kind: TokenKind::Eof,
                    text: "",
                    location: start_loc,
                })
            }
        };

        if Self::is_id_start(c) {
            return Ok(self.scan_identifier());
        }

        if c.is_ascii_digit() || (c == '.' && self.peek_next().is_some_and(|n| n.is_ascii_digit())) {
            return self.scan_number();
        }

        if c == '"' || c == '\'' {
            return self.scan_string(c);
        }

        let start = self.pos;
        self.advance();

        let kind = match c {
            '(' => TokenKind::LeftParen,
            ')' => TokenKind::RightParen,
            '{' => TokenKind::LeftBrace,
            '}' => TokenKind::RightBrace,
            '[' => TokenKind::LeftBracket,
            ']' => TokenKind::RightBracket,
            ';' => TokenKind::Semicolon,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            '?' => TokenKind::Question,
            '.' => self.longest(&[("..", TokenKind::DotDotDot)], TokenKind::Dot),
            '+' => self.longest(
                &[("+", TokenKind::PlusPlus), ("=", TokenKind::PlusEquals)],
                TokenKind::Plus,
            ),
            '-' => self.longest(
                &[("-", TokenKind::MinusMinus), ("=", TokenKind::MinusEquals)],
                TokenKind::Minus,
            ),
            '*' => self.longest(&[("=", TokenKind::StarEquals)], TokenKind::Star),
            '/' => self.longest(&[("=", TokenKind::SlashEquals)], TokenKind::Slash),
            '%' => self.longest(&[("=", TokenKind::PercentEquals)], TokenKind::Percent),
            '<' => self.longest(&[("=", TokenKind::LessEquals)], TokenKind::Less),
            '>' => self.longest(&[("=", TokenKind::GreaterEquals)], TokenKind::Greater),
            '=' => self.longest(
                &[
                    ("==", TokenKind::EqualsEqualsEquals),
                    ("=", TokenKind::EqualsEquals),
                ],
                TokenKind::Equals,
            ),
            '!' => self.longest(
                &[
                    ("==", TokenKind::BangEqualsEquals),
                    ("=", TokenKind::BangEquals),
                ],
                TokenKind::Bang,
            ),
            '&' if self.eat('&') => TokenKind::AmpersandAmpersand,
            '|' if self.eat('|') => TokenKind::PipePipe,
            _ => {
                return Err(self.error(format!("Unexpected character '{}'", c), start_loc));
            }
        };

        Ok(Token {
            kind,
            text: &self.source[start..self.pos],
            location: start_loc,
        })
    }

    /// Tokenize the entire source into a vector of tokens ending in `Eof`
    pub fn tokenize(&mut self) -> Result<Vec<Token<'src>>> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                return Ok(tokens);
            }
        }
    }

    /// Whether the lexer has consumed all input
    pub fn is_done(&self) -> bool {
        self.is_eof()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_empty_source() {
        let mut lexer = Lexer::new("");
        let token = lexer.next_token().unwrap();
        assert_eq!(token.kind, TokenKind::Eof);
        assert!(lexer.is_done());
    }

    #[test]
    fn test_identifiers() {
        let mut lexer = Lexer::new("foo bar _private $jquery assertEq");
        assert_eq!(lexer.next_token().unwrap().text, "foo");
        assert_eq!(lexer.next_token().unwrap().text, "bar");
        assert_eq!(lexer.next_token().unwrap().text, "_private");
        assert_eq!(lexer.next_token().unwrap().text, "$jquery");
        assert_eq!(lexer.next_token().unwrap().text, "assertEq");
    }

    #[test]
    fn test_keywords() {
        assert_eq!(
            kinds("var function with if"),
            vec![
                TokenKind::Keyword(Keyword::Var),
                TokenKind::Keyword(Keyword::Function),
                TokenKind::Keyword(Keyword::With),
                TokenKind::Keyword(Keyword::If),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        let mut lexer = Lexer::new("42 3.14 0xFF 0b1010 0o777 1e10 .5");
        for expected in ["42", "3.14", "0xFF", "0b1010", "0o777", "1e10", ".5"] {
            let token = lexer.next_token().unwrap();
            assert_eq!(token.kind, TokenKind::NumberLiteral);
            assert_eq!(token.text, expected);
        }
    }

    #[test]
    fn test_strings() {
        let mut lexer = Lexer::new(r#""hello" 'world' "with \"escape""#);
        assert_eq!(lexer.next_token().unwrap().text, r#""hello""#);
        assert_eq!(lexer.next_token().unwrap().text, "'world'");
        assert_eq!(lexer.next_token().unwrap().text, r#""with \"escape""#);
    }

    #[test]
    fn test_unterminated_string() {
        let err = Lexer::new("'abc").tokenize().unwrap_err();
        assert!(err.to_string().contains("Unterminated string literal"));
    }

    #[test]
    fn test_spread_and_operators() {
        assert_eq!(
            kinds("f(...rest) === ++i ? a : b"),
            vec![
                TokenKind::Identifier,
                TokenKind::LeftParen,
                TokenKind::DotDotDot,
                TokenKind::Identifier,
                TokenKind::RightParen,
                TokenKind::EqualsEqualsEquals,
                TokenKind::PlusPlus,
                TokenKind::Identifier,
                TokenKind::Question,
                TokenKind::Identifier,
                TokenKind::Colon,
                TokenKind::Identifier,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_comments_and_locations() {
        let mut lexer = Lexer::new("foo // comment\nbar /* block */ baz");
        assert_eq!(lexer.next_token().unwrap().text, "foo");
        let bar = lexer.next_token().unwrap();
        assert_eq!(bar.text, "bar");
        assert_eq!(bar.location.line, 2);
        assert_eq!(bar.location.column, 1);
        assert_eq!(lexer.next_token().unwrap().text, "baz");
    }
}
