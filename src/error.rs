//! エラー型と診断メッセージの整形

use std::fmt;

use crate::location::{LinearLoc, VisitedFiles};
use crate::token::{Token, TokenKind};

/// エラー表示用のロケーション（ファイル名解決付き）
pub struct DisplayLocation<'a> {
    pub linear_loc: LinearLoc,
    pub files: &'a VisitedFiles,
}

impl fmt::Display for DisplayLocation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.files.expand_file_location(self.linear_loc) {
            Some(loc) => write!(f, "{}", loc),
            None => write!(f, "<unknown>"),
        }
    }
}

/// プリプロセッサエラーの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PPErrorKind {
    InvalidDirective,
    EOFInMacro,
    EOFInComment,
    EOFInStringLiteral,
    EOFInRawStringDelimiter,
    InvalidCharInRawStringDelimiter,
    InvalidStringLiteralPrefix,
    DirectiveNotAtStartOfLine,
    GarbageCharacters,
}

impl PPErrorKind {
    fn message(self) -> &'static str {
        match self {
            PPErrorKind::InvalidDirective => "invalid preprocessing directive",
            PPErrorKind::EOFInMacro => {
                "unexpected end-of-file in preprocessor macro parameter list"
            }
            PPErrorKind::EOFInComment => "unexpected end-of-file in C-style comment",
            PPErrorKind::EOFInStringLiteral => "unexpected end-of-file in string literal",
            PPErrorKind::EOFInRawStringDelimiter => {
                "unexpected end-of-file in raw string delimiter"
            }
            PPErrorKind::InvalidCharInRawStringDelimiter => {
                "invalid character in raw string delimiter"
            }
            PPErrorKind::InvalidStringLiteralPrefix => "invalid string literal prefix",
            PPErrorKind::DirectiveNotAtStartOfLine => {
                "preprocessing directives must begin at start of line"
            }
            PPErrorKind::GarbageCharacters => "garbage characters encountered",
        }
    }

    /// 「ここから始まった」注記の文言
    fn note(self) -> Option<&'static str> {
        match self {
            PPErrorKind::EOFInMacro => Some("parameter list started here"),
            PPErrorKind::EOFInComment => Some("comment started here"),
            PPErrorKind::EOFInStringLiteral => Some("string literal started here"),
            PPErrorKind::EOFInRawStringDelimiter
            | PPErrorKind::InvalidCharInRawStringDelimiter => Some("delimiter started here"),
            _ => None,
        }
    }
}

impl fmt::Display for PPErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// プリプロセッサエラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreprocessorError {
    pub kind: PPErrorKind,
    pub linear_loc: LinearLoc,
    /// 注記用の位置（なければ -1）
    pub other_loc: LinearLoc,
}

impl PreprocessorError {
    pub fn new(kind: PPErrorKind, linear_loc: LinearLoc) -> Self {
        Self {
            kind,
            linear_loc,
            other_loc: -1,
        }
    }

    pub fn with_other(kind: PPErrorKind, linear_loc: LinearLoc, other_loc: LinearLoc) -> Self {
        Self {
            kind,
            linear_loc,
            other_loc,
        }
    }
}

/// 期待していたトークンの説明
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpectedToken {
    #[default]
    None,
    Identifier,
    NestedNamePrefix,
    OpenParen,
    OpenCurly,
    OpenAngle,
    OpenCurlyOrParen,
    CloseParen,
    CloseSquare,
    DestructorClassName,
    OperatorToken,
    Colon,
    Equal,
    QualifiedID,
    UnqualifiedID,
    Semicolon,
    Comma,
    CommaOrCloseParen,
    CommaOrCloseCurly,
    CommaOrOpenCurly,
    Declaration,
    EnumeratorOrCloseCurly,
    CommaOrCloseAngle,
    TrailingReturnType,
    BaseOrMember,
    ParameterType,
    TemplateParameterDecl,
    TypeSpecifier,
    ClassKeyword,
    Expression,
}

impl ExpectedToken {
    pub fn description(self) -> &'static str {
        match self {
            ExpectedToken::None => "(none)",
            ExpectedToken::Identifier => "identifier",
            ExpectedToken::NestedNamePrefix => "nested name prefix",
            ExpectedToken::OpenParen => "'('",
            ExpectedToken::OpenCurly => "'{'",
            ExpectedToken::OpenAngle => "'<'",
            ExpectedToken::OpenCurlyOrParen => "'{' or '('",
            ExpectedToken::CloseParen => "')'",
            ExpectedToken::CloseSquare => "']'",
            ExpectedToken::DestructorClassName => "destructor name",
            ExpectedToken::OperatorToken => "operator token",
            ExpectedToken::Colon => "':'",
            ExpectedToken::Equal => "'='",
            ExpectedToken::QualifiedID => "qualified-id",
            ExpectedToken::UnqualifiedID => "unqualified-id",
            ExpectedToken::Semicolon => "';'",
            ExpectedToken::Comma => "','",
            ExpectedToken::CommaOrCloseParen => "',' or ')'",
            ExpectedToken::CommaOrCloseCurly => "',' or '}'",
            ExpectedToken::CommaOrOpenCurly => "',' or '{'",
            ExpectedToken::Declaration => "declaration",
            ExpectedToken::EnumeratorOrCloseCurly => "enumerator or '}'",
            ExpectedToken::CommaOrCloseAngle => "',' or '>'",
            ExpectedToken::TrailingReturnType => "trailing return type",
            ExpectedToken::BaseOrMember => "class member or base class name",
            ExpectedToken::ParameterType => "parameter type",
            ExpectedToken::TemplateParameterDecl => "template parameter",
            ExpectedToken::TypeSpecifier => "type specifier",
            ExpectedToken::ClassKeyword => "class keyword",
            ExpectedToken::Expression => "expression",
        }
    }
}

/// パースエラーの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    Expected,
    UnexpectedEOF,
    UnclosedToken,
    MissingCommaAfterEnumerator,
    UnmatchedCloseToken,
    QualifierNotAllowedHere,
    TypeIDCannotHaveName,
    NestedNameNotAllowedHere,
    TooManyTypeSpecifiers,
    ExpectedFunctionBodyAfterMemberInitList,
    CantMixFunctionDefAndDecl,
    ScopedEnumRequiresName,
    MissingDeclaration,
    DuplicateVirtSpecifier,
}

/// パースエラー
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub error_token: Token,
    /// `Expected` のときのみ有効
    pub expected: ExpectedToken,
    /// `UnclosedToken` のときの開き括弧
    pub preceding_token: Token,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, error_token: Token) -> Self {
        Self {
            kind,
            error_token,
            expected: ExpectedToken::None,
            preceding_token: Token::default(),
        }
    }

    pub fn expected(expected: ExpectedToken, error_token: Token) -> Self {
        Self {
            kind: ParseErrorKind::Expected,
            error_token,
            expected,
            preceding_token: Token::default(),
        }
    }

    pub fn unclosed(error_token: Token, open_token: Token) -> Self {
        Self {
            kind: ParseErrorKind::UnclosedToken,
            error_token,
            expected: ExpectedToken::None,
            preceding_token: open_token,
        }
    }

    /// 直前のトークンを付ける
    pub fn after(mut self, preceding_token: Token) -> Self {
        self.preceding_token = preceding_token;
        self
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tok = &self.error_token;
        match self.kind {
            ParseErrorKind::UnexpectedEOF => write!(f, "unexpected end-of-file"),
            ParseErrorKind::Expected => write!(
                f,
                "expected {} before '{}'",
                self.expected.description(),
                tok
            ),
            ParseErrorKind::UnclosedToken => {
                let close = self
                    .preceding_token
                    .kind
                    .close_of()
                    .unwrap_or(TokenKind::Invalid);
                write!(f, "expected '{}'", close.punctuation_str())
            }
            ParseErrorKind::MissingCommaAfterEnumerator => {
                write!(f, "missing ',' between enumerators")
            }
            ParseErrorKind::UnmatchedCloseToken => write!(f, "unmatched '{}'", tok),
            ParseErrorKind::QualifierNotAllowedHere => {
                write!(f, "'{}' qualifier not allowed here", tok)
            }
            ParseErrorKind::TypeIDCannotHaveName => write!(f, "type-id cannot have a name"),
            ParseErrorKind::NestedNameNotAllowedHere => {
                write!(f, "'{}' cannot have a nested name prefix", tok)
            }
            ParseErrorKind::TooManyTypeSpecifiers => write!(f, "too many type specifiers"),
            ParseErrorKind::ExpectedFunctionBodyAfterMemberInitList => {
                write!(f, "expected function body after member initializer list")
            }
            ParseErrorKind::CantMixFunctionDefAndDecl => {
                write!(f, "can't mix function definitions with other declarations")
            }
            ParseErrorKind::ScopedEnumRequiresName => write!(f, "scoped enum requires a name"),
            ParseErrorKind::MissingDeclaration => {
                write!(f, "declaration does not declare anything")
            }
            ParseErrorKind::DuplicateVirtSpecifier => write!(f, "'{}' used more than once", tok),
        }
    }
}

/// 統合エラー型
#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
    /// プリプロセッサエラー
    Preprocess(PreprocessorError),
    /// パースエラー
    Parse(ParseError),
    /// ファイル読み込みエラー
    Io { path: String, message: String },
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::Preprocess(e) => write!(f, "{}: error: {}", e.linear_loc, e.kind),
            CompileError::Parse(e) => {
                write!(f, "{}: error: {}", e.error_token.linear_loc, e)
            }
            CompileError::Io { path, message } => write!(f, "{}: error: {}", path, message),
        }
    }
}

impl std::error::Error for CompileError {}

impl From<PreprocessorError> for CompileError {
    fn from(e: PreprocessorError) -> Self {
        CompileError::Preprocess(e)
    }
}

impl From<ParseError> for CompileError {
    fn from(e: ParseError) -> Self {
        CompileError::Parse(e)
    }
}

impl CompileError {
    /// エラーが発生したリニアロケーション
    pub fn linear_loc(&self) -> LinearLoc {
        match self {
            CompileError::Preprocess(e) => e.linear_loc,
            CompileError::Parse(e) => e.error_token.linear_loc,
            CompileError::Io { .. } => -1,
        }
    }

    /// ファイル名を解決してエラーメッセージをフォーマット
    ///
    /// 各行は改行で終わる。注記があれば2行目に出力する。
    pub fn format_with_files(&self, files: &VisitedFiles) -> String {
        let at = |linear_loc| DisplayLocation { linear_loc, files };
        match self {
            CompileError::Preprocess(e) => {
                let mut out = format!("{}: error: {}\n", at(e.linear_loc), e.kind);
                push_expansion_notes(&mut out, e.linear_loc, files);
                if let Some(note) = e.kind.note() {
                    out.push_str(&format!("{}: note: {}\n", at(e.other_loc), note));
                }
                out
            }
            CompileError::Parse(e) => {
                let mut out = format!("{}: error: {}\n", at(e.error_token.linear_loc), e);
                push_expansion_notes(&mut out, e.error_token.linear_loc, files);
                if e.kind == ParseErrorKind::UnclosedToken {
                    out.push_str(&format!(
                        "{}: note: to match this '{}'\n",
                        at(e.preceding_token.linear_loc),
                        e.preceding_token
                    ));
                }
                out
            }
            CompileError::Io { path, message } => format!("{}: error: {}\n", path, message),
        }
    }
}

/// マクロ展開の中の位置なら、展開ごとに注記を足す（内側から順）
fn push_expansion_notes(out: &mut String, linear_loc: LinearLoc, files: &VisitedFiles) {
    if linear_loc < 0 {
        return;
    }
    let at = DisplayLocation { linear_loc, files };
    for name in files.expansion_trace(linear_loc) {
        out.push_str(&format!("{}: note: in expansion of macro '{}'\n", at, name));
    }
}

/// Result型エイリアス
pub type Result<T> = std::result::Result<T, CompileError>;
