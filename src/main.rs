//! plycpp CLI
//!
//! C++ ソースをパースして診断を出力する。構文木のダンプ、
//! トークン列の表示、スナップショットテストの実行もできる。

use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use clap::{Parser as ClapParser, Subcommand};
use tracing_subscriber::EnvFilter;

use plycpp::{
    api::{self, ParseOptions},
    dump, suite, CollectingSupervisor, PPConfig, PreprocessorDefinition, VisitedFiles,
};

/// コマンドライン引数
#[derive(ClapParser)]
#[command(name = "plycpp")]
#[command(version, about = "C++ declaration parser with error recovery")]
struct Cli {
    /// ログを詳しくする（-v で info、-vv で debug、-vvv で trace）
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// ファイルをパースして診断を出力
    Parse {
        /// 入力ファイル
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// 構文木を字下げ形式で出力
        #[arg(long = "dump")]
        dump: bool,

        /// 構文木を JSON で出力
        #[arg(long = "json", conflicts_with = "dump")]
        json: bool,

        #[command(flatten)]
        defs: DefinitionArgs,
    },
    /// プリプロセッサのトークン列を表示
    Tokens {
        file: PathBuf,

        #[command(flatten)]
        defs: DefinitionArgs,
    },
    /// スナップショットテストを実行
    Suite {
        /// `*.txt` を含むディレクトリ
        dir: PathBuf,

        /// 期待値を現在の出力で書き換える
        #[arg(long = "bless")]
        bless: bool,
    },
}

/// マクロ定義の指定
#[derive(clap::Args)]
struct DefinitionArgs {
    /// オブジェクト形式マクロ (-D NAME[=VALUE])。値を省略すると空に展開
    #[arg(short = 'D', long = "define")]
    define: Vec<String>,

    /// 引数を捨てる関数形式マクロ (-F NAME[=VALUE])
    #[arg(short = 'F', long = "define-fn")]
    define_fn: Vec<String>,

    /// フレームワーク用の組み込みマクロを定義
    #[arg(long = "builtins")]
    builtins: bool,

    /// プリプロセッサデバッグ出力
    #[arg(long = "debug-pp")]
    debug_pp: bool,
}

impl DefinitionArgs {
    fn to_config(&self) -> PPConfig {
        let mut predefined = if self.builtins {
            api::plywood_builtin_definitions()
        } else {
            Vec::new()
        };
        for (name, value) in parse_defines(&self.define) {
            predefined.push(PreprocessorDefinition::new(&name, &value));
        }
        for (name, value) in parse_defines(&self.define_fn) {
            predefined.push(PreprocessorDefinition::function_like(&name, &value));
        }
        PPConfig {
            predefined,
            debug_pp: self.debug_pp,
            ..Default::default()
        }
    }
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let debug_pp = match &cli.command {
        Command::Parse { defs, .. } | Command::Tokens { defs, .. } => defs.debug_pp,
        Command::Suite { .. } => false,
    };
    init_logging(cli.verbose, debug_pp);

    match cli.command {
        Command::Parse {
            files,
            dump,
            json,
            defs,
        } => run_parse(&files, dump, json, &defs),
        Command::Tokens { file, defs } => run_tokens(&file, &defs),
        Command::Suite { dir, bless } => run_suite(&dir, bless),
    }
}

/// ログ出力を初期化する。`RUST_LOG` があればそちらを優先
fn init_logging(verbosity: u8, debug_pp: bool) {
    let level = match verbosity {
        0 if debug_pp => "debug",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("plycpp={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn run_parse(
    files: &[PathBuf],
    dump: bool,
    json: bool,
    defs: &DefinitionArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let mut total_errors = 0u32;

    for path in files {
        let mut visited_files = VisitedFiles::new();
        let mut visor = CollectingSupervisor::default();
        let options = ParseOptions {
            config: defs.to_config(),
            include_callback: None,
        };
        let output = api::parse_file(path, &mut visited_files, options, Some(&mut visor))?;

        for err in &visor.errors {
            eprint!("{}", err.format_with_files(&visited_files));
        }
        total_errors += output.error_count;

        if dump {
            dump::dump_parse_tree(&mut out, &output.unit, Some(&visited_files))?;
        } else if json {
            writeln!(out, "{}", dump::to_json(&output.unit)?)?;
        }
    }
    out.flush()?;

    if total_errors > 0 {
        return Err(format!("{} error(s)", total_errors).into());
    }
    Ok(())
}

fn run_tokens(file: &PathBuf, defs: &DefinitionArgs) -> Result<(), Box<dyn std::error::Error>> {
    let source = std::fs::read_to_string(file)?;
    let name = file.to_string_lossy();
    let mut visited_files = VisitedFiles::new();
    let (tokens, errors) = api::tokenize(&name, &source, &mut visited_files, defs.to_config());

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for token in &tokens {
        match visited_files.expand_file_location(token.linear_loc) {
            Some(loc) => write!(out, "{}: ", loc)?,
            None => write!(out, "{}: ", token.linear_loc)?,
        }
        writeln!(out, "{:?} {:?}", token.kind, token.text)?;
    }
    out.flush()?;

    for err in &errors {
        eprint!(
            "{}",
            plycpp::CompileError::from(err.clone()).format_with_files(&visited_files)
        );
    }
    if !errors.is_empty() {
        return Err(format!("{} error(s)", errors.len()).into());
    }
    Ok(())
}

fn run_suite(dir: &PathBuf, bless: bool) -> Result<(), Box<dyn std::error::Error>> {
    let report = suite::run_suite(dir, bless)?;
    println!(
        "{} passed, {} updated, {} failed",
        report.passed,
        report.blessed,
        report.failed.len()
    );
    for path in &report.failed {
        println!("FAILED: {}", path.display());
    }
    if !report.is_success() {
        return Err("test suite failed".into());
    }
    Ok(())
}

/// `NAME[=VALUE]` を分解する
fn parse_defines(defines: &[String]) -> Vec<(String, String)> {
    defines
        .iter()
        .map(|s| match s.split_once('=') {
            Some((name, value)) => (name.to_string(), value.to_string()),
            None => (s.clone(), String::new()),
        })
        .collect()
}
