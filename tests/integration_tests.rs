//! End-to-end integration tests

use std::fs;
use std::io::Write;

use tempfile::{NamedTempFile, tempdir};

use plycpp::api::{self, ParseOptions};
use plycpp::dump;
use plycpp::suite::{self, CaseOutcome};
use plycpp::{
    CollectingSupervisor, CompileError, Declaration, PreprocessorDefinition, VisitedFiles,
};

/// Helper to write source into a temporary file
fn source_file(source: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(source.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_parse_file_from_disk() {
    let file = source_file("struct Point {\n    float x, y;\n};\nPoint origin;\n");
    let mut files = VisitedFiles::new();
    let mut visor = CollectingSupervisor::default();
    let output = api::parse_file(
        file.path(),
        &mut files,
        ParseOptions::default(),
        Some(&mut visor),
    )
    .unwrap();

    assert!(output.is_ok());
    assert_eq!(output.unit.visor_decls.len(), 2);
    assert_eq!(visor.entered_classes, vec!["Point"]);
}

#[test]
fn test_parse_file_diagnostics_use_file_path() {
    let file = source_file("int a\n");
    let mut files = VisitedFiles::new();
    let mut visor = CollectingSupervisor::default();
    let output = api::parse_file(
        file.path(),
        &mut files,
        ParseOptions::default(),
        Some(&mut visor),
    )
    .unwrap();

    assert_eq!(output.error_count, 1);
    let message = visor.errors[0].format_with_files(&files);
    let expected_prefix = format!("{}(2, 1): error:", file.path().display());
    assert!(message.starts_with(&expected_prefix), "{}", message);
}

#[test]
fn test_parse_file_with_definitions() {
    let file = source_file("API_EXPORT void run() REFLECT(run);\n");
    let defs = vec![
        PreprocessorDefinition::new("API_EXPORT", ""),
        PreprocessorDefinition::function_like("REFLECT", ""),
    ];
    let mut files = VisitedFiles::new();
    let output = api::parse_file(
        file.path(),
        &mut files,
        ParseOptions::with_definitions(&defs),
        None,
    )
    .unwrap();
    assert!(output.is_ok());
    assert_eq!(output.unit.visor_decls.len(), 1);
}

#[test]
fn test_parse_missing_file_is_io_error() {
    let dir = tempdir().unwrap();
    let mut files = VisitedFiles::new();
    let result = api::parse_file(
        &dir.path().join("absent.h"),
        &mut files,
        ParseOptions::default(),
        None,
    );
    assert!(matches!(result, Err(CompileError::Io { .. })));
}

#[test]
fn test_dump_shows_locations() {
    let mut files = VisitedFiles::new();
    let output = api::parse("test.h", "static int x;\n", &mut files, &[], None, None);
    let text = dump::dump_to_string(&output.unit, Some(&files));

    assert!(text.starts_with("TranslationUnit\n"), "{}", text);
    assert!(text.contains("Declaration::Simple"), "{}", text);
    assert!(text.contains("token: test.h(1, 1): \"static\"\n"), "{}", text);
    assert!(text.contains("qid: \"int\"\n"), "{}", text);
    assert!(text.contains("qid: \"x\"\n"), "{}", text);
    assert!(text.contains("semicolon: test.h(1, 13): \";\"\n"), "{}", text);
}

#[test]
fn test_json_output_is_valid() {
    let mut files = VisitedFiles::new();
    let output = api::parse(
        "test.h",
        "namespace n { enum E { A }; }\n",
        &mut files,
        &[],
        None,
        None,
    );
    assert!(matches!(output.unit.visor_decls[0], Declaration::Namespace(_)));
    let json = dump::to_json(&output.unit).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert!(value.get("visor_decls").is_some());
}

#[test]
fn test_suite_bless_then_pass() {
    let dir = tempdir().unwrap();
    let good = dir.path().join("good.txt");
    let bad = dir.path().join("missing_semicolon.txt");
    fs::write(&good, "int x;\n").unwrap();
    fs::write(&bad, "int x\n").unwrap();
    fs::write(dir.path().join("notes.md"), "ignored").unwrap();

    let report = suite::run_suite(dir.path(), false).unwrap();
    assert_eq!(report.passed, 0);
    assert_eq!(report.failed.len(), 2);
    assert!(!report.is_success());

    let report = suite::run_suite(dir.path(), true).unwrap();
    assert_eq!(report.blessed, 2);
    assert!(report.is_success());

    assert_eq!(fs::read_to_string(&good).unwrap(), "int x;\n-----\n");
    assert_eq!(
        fs::read_to_string(&bad).unwrap(),
        "int x\n-----\nmissing_semicolon.txt(2, 1): error: expected ';' before 'end-of-file'\n"
    );

    let report = suite::run_suite(dir.path(), false).unwrap();
    assert_eq!(report.passed, 2);
    assert!(report.is_success());
}

#[test]
fn test_suite_reports_mismatch() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("stale.txt");
    fs::write(&path, "int x;\n-----\nstale.txt(1, 1): error: bogus\n").unwrap();

    match suite::run_case(&path, false).unwrap() {
        CaseOutcome::Failed { expected, actual } => {
            assert!(expected.contains("bogus"));
            assert_eq!(actual, "int x;\n-----\n");
        }
        other => panic!("expected a failure, got {:?}", other),
    }
}
