//! Tokens

use crate::error::SourceLocation;

/// A token borrowing its text from the source
#[derive(Debug, Clone, PartialEq)]
pub struct Token<'src> {
    pub kind: TokenKind,
    pub text: &'src str,
    pub location: SourceLocation,
}

/// Token kinds. Punctuators are named after their spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    NumberLiteral,
    /// Quotes and escapes are kept in `Token::text`; the parser decodes them
    StringLiteral,
    Identifier,
    Keyword(Keyword),

    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    Dot,
    /// `...` in spread arguments, array spread and rest parameters
    DotDotDot,
    Semicolon,
    Comma,
    Colon,
    Question,

    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    PlusPlus,
    MinusMinus,

    Less,
    Greater,
    LessEquals,
    GreaterEquals,
    EqualsEquals,
    EqualsEqualsEquals,
    BangEquals,
    BangEqualsEquals,

    Bang,
    AmpersandAmpersand,
    PipePipe,

    Equals,
    PlusEquals,
    MinusEquals,
    StarEquals,
    SlashEquals,
    PercentEquals,

    Eof,
}

macro_rules! keywords {
    ($($variant:ident => $text:literal,)*) => {
        /// Reserved words the parser gives meaning to. They are still accepted
        /// as property names after `.` and in object literals.
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum Keyword {
            $($variant,)*
        }

        impl Keyword {
            /// Every keyword, in source spelling
            pub const ALL: &'static [&'static str] = &[$($text,)*];

            pub fn from_text(text: &str) -> Option<Keyword> {
                match text {
                    $($text => Some(Keyword::$variant),)*
                    _ => None,
                }
            }

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Keyword::$variant => $text,)*
                }
            }
        }
    };
}

keywords! {
    Break => "break",
    Const => "const",
    Continue => "continue",
    Delete => "delete",
    Do => "do",
    Else => "else",
    False => "false",
    For => "for",
    Function => "function",
    If => "if",
    Let => "let",
    Null => "null",
    Return => "return",
    This => "this",
    True => "true",
    Typeof => "typeof",
    Var => "var",
    Void => "void",
    While => "while",
    With => "with",
}

impl std::fmt::Display for Keyword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TokenKind {
    pub fn is_assignment_operator(&self) -> bool {
        matches!(
            self,
            TokenKind::Equals
                | TokenKind::PlusEquals
                | TokenKind::MinusEquals
                | TokenKind::StarEquals
                | TokenKind::SlashEquals
                | TokenKind::PercentEquals
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_table_round_trips() {
        for text in Keyword::ALL {
            let keyword = Keyword::from_text(text).unwrap();
            assert_eq!(keyword.as_str(), *text);
        }
        assert_eq!(Keyword::from_text("of"), None);
    }
}
