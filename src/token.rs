//! トークン定義

use std::fmt;

use serde::Serialize;

use crate::location::LinearLoc;

/// トークン種別
///
/// 開き括弧の直後に対応する閉じ括弧が並ぶ（`close_of` が依存する）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum TokenKind {
    #[default]
    Invalid,
    LineComment,
    CStyleComment,
    Macro,
    MacroArgument,
    Directive,
    OpenCurly,          // {
    CloseCurly,         // }
    OpenParen,          // (
    CloseParen,         // )
    OpenAngle,          // <
    CloseAngle,         // >
    LessThanOrEqual,    // <=
    GreaterThanOrEqual, // >=
    OpenSquare,         // [
    CloseSquare,        // ]
    Semicolon,          // ;
    SingleColon,        // :
    DoubleColon,        // ::
    SingleEqual,        // =
    DoubleEqual,        // ==
    NotEqual,           // !=
    PlusEqual,          // +=
    MinusEqual,         // -=
    Arrow,              // ->
    StarEqual,          // *=
    SlashEqual,         // /=
    Comma,              // ,
    QuestionMark,       // ?
    ForwardSlash,       // /
    Star,               // *
    Percent,            // %
    SingleAmpersand,    // &
    DoubleAmpersand,    // &&
    SingleVerticalBar,  // |
    DoubleVerticalBar,  // ||
    SinglePlus,         // +
    DoublePlus,         // ++
    SingleMinus,        // -
    DoubleMinus,        // --
    LeftShift,          // <<
    RightShift,         // >>
    Dot,                // .
    Tilde,              // ~
    Caret,              // ^
    Bang,               // !
    Ellipsis,           // ...
    Identifier,
    StringLiteral,
    NumericLiteral,
    EndOfFile,
}

impl TokenKind {
    /// 開き括弧に対応する閉じ括弧
    pub fn close_of(self) -> Option<TokenKind> {
        match self {
            TokenKind::OpenCurly => Some(TokenKind::CloseCurly),
            TokenKind::OpenParen => Some(TokenKind::CloseParen),
            TokenKind::OpenAngle => Some(TokenKind::CloseAngle),
            TokenKind::OpenSquare => Some(TokenKind::CloseSquare),
            _ => None,
        }
    }

    /// 句読点の表記
    pub fn punctuation_str(self) -> &'static str {
        match self {
            TokenKind::OpenCurly => "{",
            TokenKind::CloseCurly => "}",
            TokenKind::OpenParen => "(",
            TokenKind::CloseParen => ")",
            TokenKind::OpenAngle => "<",
            TokenKind::CloseAngle => ">",
            TokenKind::OpenSquare => "[",
            TokenKind::CloseSquare => "]",
            TokenKind::Semicolon => ";",
            TokenKind::SingleColon => ":",
            TokenKind::DoubleColon => "::",
            TokenKind::SingleEqual => "=",
            TokenKind::DoubleEqual => "==",
            TokenKind::NotEqual => "!=",
            TokenKind::PlusEqual => "+=",
            TokenKind::MinusEqual => "-=",
            TokenKind::Comma => ",",
            TokenKind::QuestionMark => "?",
            TokenKind::ForwardSlash => "/",
            TokenKind::Star => "*",
            TokenKind::Percent => "%",
            TokenKind::SingleAmpersand => "&",
            TokenKind::DoubleAmpersand => "&&",
            TokenKind::SingleVerticalBar => "|",
            TokenKind::DoubleVerticalBar => "||",
            TokenKind::SinglePlus => "+",
            TokenKind::DoublePlus => "++",
            TokenKind::SingleMinus => "-",
            TokenKind::DoubleMinus => "--",
            TokenKind::LeftShift => "<<",
            TokenKind::RightShift => ">>",
            TokenKind::Dot => ".",
            TokenKind::Tilde => "~",
            TokenKind::Bang => "!",
            TokenKind::Ellipsis => "...",
            TokenKind::LineComment => "//",
            TokenKind::CStyleComment => "/*",
            TokenKind::LessThanOrEqual => "<=",
            TokenKind::GreaterThanOrEqual => ">=",
            TokenKind::Arrow => "->",
            TokenKind::StarEqual => "*=",
            TokenKind::SlashEqual => "/=",
            TokenKind::Caret => "^",
            _ => "???",
        }
    }

    /// パーサーに渡さずスーパーバイザーへ回すトークンか
    pub fn is_structural(self) -> bool {
        matches!(
            self,
            TokenKind::LineComment
                | TokenKind::CStyleComment
                | TokenKind::Directive
                | TokenKind::Macro
        )
    }
}

/// トークン
#[derive(Debug, Clone, Serialize)]
pub struct Token {
    pub linear_loc: LinearLoc,
    pub text: String,
    pub kind: TokenKind,
}

impl Default for Token {
    fn default() -> Self {
        Self {
            linear_loc: -1,
            text: String::new(),
            kind: TokenKind::Invalid,
        }
    }
}

impl Token {
    /// 新しいトークンを作成
    pub fn new(linear_loc: LinearLoc, kind: TokenKind, text: impl Into<String>) -> Self {
        Self {
            linear_loc,
            text: text.into(),
            kind,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.kind != TokenKind::Invalid
    }

    /// 識別子として `word` か
    pub fn is_ident(&self, word: &str) -> bool {
        self.kind == TokenKind::Identifier && self.text == word
    }
}

/// 識別子と数値リテラルは綴りも比較し、その他は種別のみ比較する
impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        if self.kind != other.kind {
            return false;
        }
        match self.kind {
            TokenKind::Identifier | TokenKind::NumericLiteral => self.text == other.text,
            _ => true,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::Identifier | TokenKind::StringLiteral | TokenKind::NumericLiteral => {
                f.write_str(&self.text)
            }
            TokenKind::EndOfFile => f.write_str("end-of-file"),
            kind => f.write_str(kind.punctuation_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_of() {
        assert_eq!(TokenKind::OpenCurly.close_of(), Some(TokenKind::CloseCurly));
        assert_eq!(TokenKind::OpenAngle.close_of(), Some(TokenKind::CloseAngle));
        assert_eq!(TokenKind::Comma.close_of(), None);
    }

    #[test]
    fn test_token_equality() {
        let a = Token::new(0, TokenKind::Identifier, "foo");
        let b = Token::new(10, TokenKind::Identifier, "foo");
        let c = Token::new(0, TokenKind::Identifier, "bar");
        assert_eq!(a, b);
        assert_ne!(a, c);

        let s1 = Token::new(0, TokenKind::StringLiteral, "\"x\"");
        let s2 = Token::new(0, TokenKind::StringLiteral, "\"y\"");
        assert_eq!(s1, s2);
    }

    #[test]
    fn test_token_display() {
        assert_eq!(Token::new(0, TokenKind::Identifier, "x").to_string(), "x");
        assert_eq!(Token::new(0, TokenKind::EndOfFile, "").to_string(), "end-of-file");
        assert_eq!(Token::new(0, TokenKind::RightShift, ">>").to_string(), ">>");
        assert!(!Token::default().is_valid());
    }
}
