//! Preprocessor integration tests

use plycpp::{
    CompileError, LinearLoc, PPConfig, PPErrorKind, Preprocessor, PreprocessorDefinition, Token,
    TokenKind, VisitedFiles, tokenize,
};

/// Helper to tokenize a source string with the default configuration
fn tokens(source: &str) -> Vec<Token> {
    let mut files = VisitedFiles::new();
    let (tokens, errors) = tokenize("test.h", source, &mut files, PPConfig::default());
    assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
    tokens
}

/// Helper to get the texts of the tokens the parser would see
fn parser_texts(source: &str, config: PPConfig) -> Vec<String> {
    let mut files = VisitedFiles::new();
    let (tokens, _) = tokenize("test.h", source, &mut files, config);
    tokens
        .into_iter()
        .filter(|t| !t.kind.is_structural())
        .map(|t| t.text)
        .collect()
}

/// Byte offset to (line, column), both 1-based
fn line_col(source: &str, offset: usize) -> (u32, u32) {
    let before = &source[..offset];
    let line = before.matches('\n').count() as u32 + 1;
    let col = match before.rfind('\n') {
        Some(nl) => offset - nl,
        None => offset + 1,
    } as u32;
    (line, col)
}

#[test]
fn test_location_round_trip() {
    let source = "int x;\n  float yy = 3.5f;\n\n/* c */ struct S { };\n";
    let mut files = VisitedFiles::new();
    let (tokens, errors) = tokenize("round.h", source, &mut files, PPConfig::default());
    assert!(errors.is_empty());
    assert!(!tokens.is_empty());
    for token in &tokens {
        let offset = token.linear_loc as usize;
        assert!(source[offset..].starts_with(&token.text), "{:?}", token);
        let loc = files.expand_file_location(token.linear_loc).unwrap();
        assert_eq!(
            (loc.loc.line, loc.loc.column),
            line_col(source, offset),
            "{:?}",
            token
        );
    }
}

#[test]
fn test_macro_expansion_maps_to_call_site() {
    let source = "#define FOO 42\nFOO";
    let mut files = VisitedFiles::new();
    let (tokens, errors) = tokenize("test.h", source, &mut files, PPConfig::default());
    assert!(errors.is_empty());
    let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
    assert_eq!(
        kinds,
        vec![TokenKind::Directive, TokenKind::Macro, TokenKind::NumericLiteral]
    );
    let literal = &tokens[2];
    assert_eq!(literal.text, "42");
    let loc = files.expand_file_location(literal.linear_loc).unwrap();
    assert_eq!(loc.to_string(), "test.h(2, 1)");
    assert_eq!(files.expansion_trace(literal.linear_loc), vec!["FOO"]);
}

#[test]
fn test_function_like_macro_substitutes_arguments() {
    let source = "#define ADD(a, b) a + b\nint x = ADD(1, (2, 3));";
    assert_eq!(
        parser_texts(source, PPConfig::default()),
        vec!["int", "x", "=", "1", "+", "(", "2", ",", "3", ")", ";"]
    );
}

#[test]
fn test_function_like_macro_without_parens_is_identifier() {
    let source = "#define F(x) x\nint F;";
    let toks = tokens(source);
    assert!(toks.iter().any(|t| t.is_ident("F")));
    assert!(!toks.iter().any(|t| t.kind == TokenKind::Macro));
}

#[test]
fn test_recursive_macro_is_not_reexpanded() {
    let source = "#define X X + 1\nX";
    assert_eq!(parser_texts(source, PPConfig::default()), vec!["X", "+", "1"]);
}

#[test]
fn test_undef_and_line_continuation() {
    let source = "#define A 1 + \\\n  2\nA\n#undef A\nA";
    assert_eq!(
        parser_texts(source, PPConfig::default()),
        vec!["1", "+", "2", "A"]
    );
}

#[test]
fn test_defines_can_be_ignored() {
    let config = PPConfig {
        register_defines: false,
        ..Default::default()
    };
    assert_eq!(parser_texts("#define A 1\nA", config), vec!["A"]);
}

#[test]
fn test_predefined_function_like_macro_args() {
    let config = PPConfig {
        predefined: vec![PreprocessorDefinition::function_like("PLY_REFLECT", "")],
        ..Default::default()
    };
    let mut files = VisitedFiles::new();
    let mut pp = Preprocessor::new(&mut files, config);
    pp.push_source("test.h", "PLY_REFLECT(a, f(b, c)) int");
    let token = pp.read_token();
    assert_eq!(token.kind, TokenKind::Macro);
    assert_eq!(token.text, "PLY_REFLECT");
    let args: Vec<&str> = pp.macro_args().iter().map(|a| a.text.as_str()).collect();
    assert_eq!(args, vec!["a", " f(b, c)"]);
    assert!(pp.read_token().is_ident("int"));
    assert_eq!(pp.read_token().kind, TokenKind::EndOfFile);
}

#[test]
fn test_close_angles_only() {
    let mut files = VisitedFiles::new();
    let mut pp = Preprocessor::new(&mut files, PPConfig::default());
    pp.push_source("test.h", ">> >> >=");
    assert_eq!(pp.read_token().kind, TokenKind::RightShift);
    pp.tokenize_close_angles_only = true;
    assert_eq!(pp.read_token().kind, TokenKind::CloseAngle);
    assert_eq!(pp.read_token().kind, TokenKind::CloseAngle);
    assert_eq!(pp.read_token().kind, TokenKind::CloseAngle);
    pp.tokenize_close_angles_only = false;
    assert_eq!(pp.read_token().kind, TokenKind::SingleEqual);
}

#[test]
fn test_include_directives_are_collected() {
    let mut files = VisitedFiles::new();
    let mut pp = Preprocessor::new(&mut files, PPConfig::default());
    pp.push_source("test.h", "#include <vector>\n#pragma once\nint x;");
    let first = pp.read_token();
    assert_eq!(first.kind, TokenKind::Directive);
    assert_eq!(pp.take_includes(), vec!["#include <vector>".to_string()]);
}

#[test]
fn test_unterminated_macro_arguments() {
    let mut files = VisitedFiles::new();
    let (_, errors) = tokenize(
        "test.h",
        "#define F(x) x\nF(1, 2",
        &mut files,
        PPConfig::default(),
    );
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, PPErrorKind::EOFInMacro);
}

#[test]
fn test_comments_are_tokens() {
    let toks = tokens("// line\n/* block */ x");
    assert_eq!(toks[0].kind, TokenKind::LineComment);
    assert_eq!(toks[1].kind, TokenKind::CStyleComment);
    assert_eq!(toks[1].text, "/* block */");
    assert!(toks[2].is_ident("x"));
}

/// Helper to get the first lexical error as (kind, location, note location)
fn first_error(source: &str) -> (PPErrorKind, LinearLoc, LinearLoc) {
    let mut files = VisitedFiles::new();
    let (_, errors) = tokenize("test.h", source, &mut files, PPConfig::default());
    assert!(!errors.is_empty(), "no error for {:?}", source);
    (errors[0].kind, errors[0].linear_loc, errors[0].other_loc)
}

#[test]
fn test_unterminated_string_literal() {
    assert_eq!(
        first_error("\"abc"),
        (PPErrorKind::EOFInStringLiteral, 4, 0)
    );

    let mut files = VisitedFiles::new();
    let (_, errors) = tokenize("test.h", "\"abc", &mut files, PPConfig::default());
    let message = CompileError::from(errors[0].clone()).format_with_files(&files);
    assert_eq!(
        message,
        "test.h(1, 5): error: unexpected end-of-file in string literal\n\
         test.h(1, 1): note: string literal started here\n"
    );
}

#[test]
fn test_raw_string_delimiter_errors() {
    assert_eq!(
        first_error("R\"a b(x)a b\""),
        (PPErrorKind::InvalidCharInRawStringDelimiter, 3, 0)
    );
    assert_eq!(
        first_error("R\"abc"),
        (PPErrorKind::EOFInRawStringDelimiter, 5, 0)
    );
}

#[test]
fn test_raw_string_literal_is_one_token() {
    let toks = tokens("R\"x(a \" b)x\" y");
    assert_eq!(toks[0].kind, TokenKind::StringLiteral);
    assert_eq!(toks[0].text, "R\"x(a \" b)x\"");
    assert!(toks[1].is_ident("y"));
}

#[test]
fn test_locations_increase_through_nested_expansion() {
    let source = "#define A 1\n#define F(x) (x + A)\nint y = F(A) + A;\nint z;";
    let toks = tokens(source);
    let locs: Vec<LinearLoc> = toks.iter().map(|t| t.linear_loc).collect();
    assert!(locs.windows(2).all(|w| w[0] <= w[1]), "{:?}", locs);

    let texts: Vec<&str> = toks
        .iter()
        .filter(|t| !t.kind.is_structural())
        .map(|t| t.text.as_str())
        .collect();
    assert_eq!(
        texts,
        vec![
            "int", "y", "=", "(", "1", "+", "1", ")", "+", "1", ";", "int", "z", ";"
        ]
    );

    let mut files = VisitedFiles::new();
    let (toks, _) = tokenize("test.h", source, &mut files, PPConfig::default());
    let z = toks.iter().find(|t| t.is_ident("z")).unwrap();
    assert_eq!(files.expand_file_location(z.linear_loc).unwrap().to_string(), "test.h(4, 5)");
    assert!(files.expansion_trace(z.linear_loc).is_empty());
}
