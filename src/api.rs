//! パースの入口
//!
//! ソース文字列やファイルから翻訳単位を作る関数と、
//! フレームワークのソースを読むときの組み込みマクロ定義をまとめる。

use std::path::Path;

use tracing::{debug, info};

use crate::error::{CompileError, PreprocessorError, Result};
use crate::grammar::{Simple, TranslationUnit};
use crate::location::{LinearLoc, VisitedFiles};
use crate::parse_specifiers::SpecDcorMode;
use crate::parser::Parser;
use crate::preprocessor::{PPConfig, Preprocessor, PreprocessorDefinition};
use crate::supervisor::{CollectingSupervisor, NullSupervisor, ParseSupervisor, ScopeRef};
use crate::token::{Token, TokenKind};

/// パース結果
#[derive(Debug)]
pub struct ParseOutput {
    pub unit: TranslationUnit,
    /// 報告したパースエラーとプリプロセッサエラーの合計
    pub error_count: u32,
}

impl ParseOutput {
    pub fn is_ok(&self) -> bool {
        self.error_count == 0
    }
}

/// パースの設定
#[derive(Default)]
pub struct ParseOptions<'a> {
    pub config: PPConfig,
    /// `#include` ディレクティブの受け取り先。なければスーパーバイザーに渡る
    pub include_callback: Option<&'a mut dyn FnMut(&str)>,
}

impl<'a> ParseOptions<'a> {
    /// 事前定義マクロだけを指定した設定
    pub fn with_definitions(defs: &[PreprocessorDefinition]) -> Self {
        Self {
            config: PPConfig {
                predefined: defs.to_vec(),
                ..Default::default()
            },
            include_callback: None,
        }
    }
}

/// ソース文字列をパースする
///
/// エラーは `visor` の `handle_error` に渡り、パースは最後まで続く。
/// `visor` がなければ何もしないスーパーバイザーを使う。
pub fn parse(
    path: &str,
    source: &str,
    visited_files: &mut VisitedFiles,
    defs: &[PreprocessorDefinition],
    include_callback: Option<&mut dyn FnMut(&str)>,
    visor: Option<&mut dyn ParseSupervisor>,
) -> ParseOutput {
    let options = ParseOptions {
        config: PPConfig {
            predefined: defs.to_vec(),
            ..Default::default()
        },
        include_callback,
    };
    parse_with_options(path, source, visited_files, options, visor)
}

/// 設定を指定してソース文字列をパースする
pub fn parse_with_options(
    path: &str,
    source: &str,
    visited_files: &mut VisitedFiles,
    options: ParseOptions<'_>,
    visor: Option<&mut dyn ParseSupervisor>,
) -> ParseOutput {
    let mut null_visor = NullSupervisor;
    let visor: &mut dyn ParseSupervisor = match visor {
        Some(visor) => visor,
        None => &mut null_visor,
    };

    let mut pp = Preprocessor::new(visited_files, options.config);
    pp.push_source(path, source);
    let mut parser = Parser::new(pp, visor);
    if let Some(callback) = options.include_callback {
        parser = parser.with_include_callback(callback);
    }

    let unit = parser.parse_translation_unit();
    let error_count = parser.reported_error_count() + parser.pp_error_count();
    info!(
        path,
        declarations = unit.visor_decls.len(),
        error_count,
        "parsed translation unit"
    );
    ParseOutput { unit, error_count }
}

/// ファイルを読み込んでパースする
pub fn parse_file(
    path: &Path,
    visited_files: &mut VisitedFiles,
    options: ParseOptions<'_>,
    visor: Option<&mut dyn ParseSupervisor>,
) -> Result<ParseOutput> {
    let source = std::fs::read_to_string(path).map_err(|e| CompileError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    debug!(path = %path.display(), bytes = source.len(), "read source file");
    let name = path.to_string_lossy();
    Ok(parse_with_options(
        &name,
        &source,
        visited_files,
        options,
        visor,
    ))
}

/// 宣言を1つだけパースする
///
/// 指定子と宣言子を読み、続くトークンは無視する。
/// 位置は `linear_loc_ofs` から始まるものとして付けられる。
pub fn parse_simple_declaration(
    source: &str,
    linear_loc_ofs: LinearLoc,
) -> (Simple, Vec<CompileError>) {
    let mut visited_files = VisitedFiles::new();
    let mut visor = CollectingSupervisor::default();
    let mut simple = Simple::default();
    {
        let mut pp = Preprocessor::new(&mut visited_files, PPConfig::default());
        pp.push_source_at("(declaration)", source, linear_loc_ofs);
        let mut parser = Parser::new(pp, &mut visor);
        let tu = TranslationUnit::default();
        parser.visor.do_enter(ScopeRef::TranslationUnit(&tu));
        parser.parse_specifiers_and_declarators(&mut simple, &SpecDcorMode::GlobalOrMember(""));
        parser.visor.do_exit(ScopeRef::TranslationUnit(&tu));
    }
    (simple, visor.errors)
}

/// プリプロセッサのトークン列をそのまま取り出す
///
/// コメントやディレクティブ、マクロのトークンも含む。
/// 最後の `EndOfFile` は含まない。
pub fn tokenize(
    path: &str,
    source: &str,
    visited_files: &mut VisitedFiles,
    config: PPConfig,
) -> (Vec<Token>, Vec<PreprocessorError>) {
    let mut pp = Preprocessor::new(visited_files, config);
    pp.push_source(path, source);
    let mut tokens = Vec::new();
    let mut errors = Vec::new();
    loop {
        let token = pp.read_token();
        errors.extend(pp.take_errors());
        if token.kind == TokenKind::EndOfFile {
            break;
        }
        tokens.push(token);
    }
    (tokens, errors)
}

/// フレームワークのソースを読むときの組み込みマクロ
///
/// 注釈用のマクロは空に展開し、宣言の形を変えるものだけ中身を持つ。
pub fn plywood_builtin_definitions() -> Vec<PreprocessorDefinition> {
    const EMPTY_OBJECTS: &[&str] = &[
        "PLY_INLINE",
        "PLY_NO_INLINE",
        "PLY_NO_DISCARD",
        "PLY_DLL_ENTRY",
        "PLY_BUILD_ENTRY",
        "PYLON_ENTRY",
        "PLY_THREAD_STARTCALL",
        "WINAPI",
        "APIENTRY",
    ];
    const EMPTY_FUNCTIONS: &[&str] = &[
        "PLY_STATE_REFLECT",
        "PLY_REFLECT",
        "PLY_REFLECT_ENUM",
        "PLY_IMPLEMENT_IFACE",
        "PLY_STRUCT_BEGIN",
        "PLY_STRUCT_BEGIN_PRIM",
        "PLY_STRUCT_BEGIN_PRIM_NO_IMPORT",
        "PLY_STRUCT_END",
        "PLY_STRUCT_END_PRIM",
        "PLY_STRUCT_MEMBER",
        "PLY_ENUM_BEGIN",
        "PLY_ENUM_IDENTIFIER",
        "PLY_ENUM_END",
        "PLY_STATE",
        "PLY_IFACE_METHOD",
        "IMP_FUNC",
        "SLOG_CHANNEL",
        "SLOG_NO_CHANNEL",
        "SLOG_DECLARE_CHANNEL",
        "GL_FUNC",
        "PLY_MAKE_LIMITS",
        "PLY_DECL_ALIGNED",
        "PLY_MAKE_WELL_FORMEDNESS_CHECK_1",
        "PLY_MAKE_WELL_FORMEDNESS_CHECK_2",
        "PLY_BIND_METHOD",
        "PLY_DECLARE_TYPE_DESCRIPTOR",
        "PLY_METHOD_TABLES_ONLY",
        "SWITCH_FOOTER",
        "SWITCH_ACCESSOR",
        "PLY_DEFINE_RACE_DETECTOR",
    ];

    let mut defs: Vec<PreprocessorDefinition> = EMPTY_OBJECTS
        .iter()
        .map(|name| PreprocessorDefinition::new(name, ""))
        .collect();
    defs.push(PreprocessorDefinition::new("PLY_STATIC_ASSERT", "static_assert"));
    defs.push(PreprocessorDefinition::new("PLY_WORKSPACE_FOLDER", "\"\""));
    defs.push(PreprocessorDefinition::new("PLY_DEFINE_TYPE_DESCRIPTOR", "void foo"));
    defs.extend(
        EMPTY_FUNCTIONS
            .iter()
            .map(|name| PreprocessorDefinition::function_like(name, "")),
    );
    defs.push(PreprocessorDefinition::function_like("PLY_TEST_CASE", "void foo()"));
    defs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::{DeclSpecifier, Declaration};

    #[test]
    fn test_parse_counts_errors() {
        let mut files = VisitedFiles::new();
        let out = parse("a.h", "int x;\nint y", &mut files, &[], None, None);
        assert_eq!(out.unit.visor_decls.len(), 2);
        assert_eq!(out.error_count, 1);
        assert!(!out.is_ok());
    }

    #[test]
    fn test_include_callback() {
        let mut files = VisitedFiles::new();
        let mut seen = Vec::new();
        let mut callback = |directive: &str| seen.push(directive.to_string());
        let out = parse(
            "a.h",
            "#include \"b.h\"\nint x;\n",
            &mut files,
            &[],
            Some(&mut callback),
            None,
        );
        assert!(out.is_ok());
        assert_eq!(seen.len(), 1);
        assert!(seen[0].contains("b.h"));
    }

    #[test]
    fn test_builtin_definitions() {
        let defs = plywood_builtin_definitions();
        let mut files = VisitedFiles::new();
        let src = "struct PLY_DLL_ENTRY Foo {\n    PLY_REFLECT()\n    PLY_INLINE int x;\n};\n\
                   PLY_STATIC_ASSERT(sizeof(int) == 4, \"int\");\n";
        let mut visor = CollectingSupervisor::default();
        let out = parse("a.h", src, &mut files, &defs, None, Some(&mut visor));
        assert_eq!(out.error_count, 0, "{:?}", visor.errors);
        assert_eq!(out.unit.visor_decls.len(), 2);
        assert!(matches!(
            out.unit.visor_decls[1],
            Declaration::StaticAssert { .. }
        ));
        assert!(visor.macros.iter().any(|(name, _)| name == "PLY_REFLECT"));
    }

    #[test]
    fn test_parse_simple_declaration() {
        let (simple, errors) = parse_simple_declaration("const char* name", 100);
        assert!(errors.is_empty());
        assert_eq!(simple.decl_specifier_seq.len(), 2);
        assert!(matches!(simple.decl_specifier_seq[0], DeclSpecifier::Keyword(_)));
        let dcor = &simple.init_declarators[0].dcor;
        assert_eq!(dcor.qid.to_string(), "name");
        assert_eq!(dcor.qid.get_first_token().linear_loc, 112);
    }

    #[test]
    fn test_tokenize_keeps_comments() {
        let mut files = VisitedFiles::new();
        let (tokens, errors) = tokenize("a.h", "// hi\nint x;", &mut files, PPConfig::default());
        assert!(errors.is_empty());
        assert_eq!(tokens[0].kind, TokenKind::LineComment);
        assert!(tokens.iter().any(|t| t.is_ident("int")));
        assert_eq!(tokens.last().map(|t| t.kind), Some(TokenKind::Semicolon));
    }

    #[test]
    fn test_parse_file_missing() {
        let mut files = VisitedFiles::new();
        let err = parse_file(
            Path::new("/nonexistent/plycpp/none.h"),
            &mut files,
            ParseOptions::default(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, CompileError::Io { .. }));
    }
}
