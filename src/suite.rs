//! スナップショットテストスイート
//!
//! ディレクトリ内の `*.txt` はそれぞれ、ソースコード、`-----` で始まる行、
//! 期待する診断メッセージの順に並ぶ。区切り行がなければ全体がソースになる。
//! ソースをパースして得た診断を期待値と比べ、`bless` なら書き換える。

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::api::parse;
use crate::error::{CompileError, Result};
use crate::location::VisitedFiles;
use crate::supervisor::CollectingSupervisor;

/// 区切り行
const SEPARATOR: &str = "-----";

/// 1ケースの結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaseOutcome {
    Passed,
    /// 期待値と一致しなかった
    Failed { expected: String, actual: String },
    /// ファイルを書き換えた
    Blessed,
}

/// スイート全体の結果
#[derive(Debug, Default)]
pub struct SuiteReport {
    pub passed: usize,
    pub blessed: usize,
    pub failed: Vec<PathBuf>,
}

impl SuiteReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// テストファイルをソースと期待値に分ける
pub fn split_test_file(contents: &str) -> (&str, Option<&str>) {
    let mut line_start = 0;
    for line in contents.split_inclusive('\n') {
        if line.starts_with(SEPARATOR) {
            let expected_start = line_start + line.len();
            return (&contents[..line_start], Some(&contents[expected_start..]));
        }
        line_start += line.len();
    }
    (contents, None)
}

/// ソースをパースし、診断を並べた文字列を返す
pub fn diagnostics_for(name: &str, source: &str) -> String {
    let mut files = VisitedFiles::new();
    let mut visor = CollectingSupervisor::default();
    let output = parse(name, source, &mut files, &[], None, Some(&mut visor));
    debug!(name, error_count = output.error_count, "parsed test case");
    visor
        .errors
        .iter()
        .map(|err| err.format_with_files(&files))
        .collect()
}

/// テストファイルのあるべき内容
pub fn render_case(name: &str, source: &str) -> String {
    let mut out = String::from(source);
    if !source.is_empty() && !source.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(SEPARATOR);
    out.push('\n');
    out.push_str(&diagnostics_for(name, source));
    out
}

fn io_error(path: &Path, e: std::io::Error) -> CompileError {
    CompileError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    }
}

/// 1ファイルを実行する
pub fn run_case(path: &Path, bless: bool) -> Result<CaseOutcome> {
    let contents = fs::read_to_string(path).map_err(|e| io_error(path, e))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let (source, _) = split_test_file(&contents);
    let actual = render_case(&name, source);
    if actual == contents {
        return Ok(CaseOutcome::Passed);
    }
    if bless {
        fs::write(path, &actual).map_err(|e| io_error(path, e))?;
        return Ok(CaseOutcome::Blessed);
    }
    Ok(CaseOutcome::Failed {
        expected: contents,
        actual,
    })
}

/// ディレクトリ内の `*.txt` を名前順に実行する
pub fn run_suite(dir: &Path, bless: bool) -> Result<SuiteReport> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|e| io_error(dir, e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "txt"))
        .collect();
    paths.sort();

    let mut report = SuiteReport::default();
    for path in paths {
        match run_case(&path, bless)? {
            CaseOutcome::Passed => report.passed += 1,
            CaseOutcome::Blessed => {
                info!(path = %path.display(), "updated expected output");
                report.blessed += 1;
            }
            CaseOutcome::Failed { .. } => {
                warn!(path = %path.display(), "output differs");
                report.failed.push(path);
            }
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_test_file() {
        let (src, expected) = split_test_file("int x;\n-----\nerr\n");
        assert_eq!(src, "int x;\n");
        assert_eq!(expected, Some("err\n"));

        let (src, expected) = split_test_file("int x;\n");
        assert_eq!(src, "int x;\n");
        assert_eq!(expected, None);
    }

    #[test]
    fn test_render_case() {
        assert_eq!(render_case("t.txt", "int x;"), "int x;\n-----\n");
        assert_eq!(
            render_case("t.txt", "int x\n"),
            "int x\n-----\nt.txt(2, 1): error: expected ';' before 'end-of-file'\n"
        );
    }
}
