//! plycpp
//!
//! C++ の宣言を読むためのプリプロセッサ・トークナイザーと、
//! エラーから回復する再帰下降パーサー。
//! パースの進行はスーパーバイザー（ビジター）に通知され、
//! 構文木にはスコープごとに集めた宣言が入る。

pub mod api;
pub mod dump;
pub mod error;
pub mod grammar;
pub mod location;
mod parse_declarations;
mod parse_expressions;
mod parse_params;
mod parse_qualified_id;
mod parse_specifiers;
pub mod parser;
pub mod preprocessor;
pub mod source;
pub mod suite;
pub mod supervisor;
pub mod token;

// 主要な型を再エクスポート
pub use api::{
    parse, parse_file, parse_simple_declaration, parse_with_options, plywood_builtin_definitions,
    tokenize, ParseOptions, ParseOutput,
};
pub use error::{
    CompileError, DisplayLocation, ExpectedToken, PPErrorKind, ParseError, ParseErrorKind,
    PreprocessorError, Result,
};
pub use grammar::{Declaration, QualifiedID, Simple, TranslationUnit};
pub use location::{LinearLoc, VisitedFiles};
pub use parser::Parser;
pub use preprocessor::{PPConfig, Preprocessor, PreprocessorDefinition};
pub use source::{FileId, FileLocation, FileRegistry, SourceFile};
pub use supervisor::{
    apply_splices, CollectingSupervisor, NullSupervisor, ParseSupervisor, ScopeKind, ScopeRef,
    ScopeStack, Splice,
};
pub use token::{Token, TokenKind};
