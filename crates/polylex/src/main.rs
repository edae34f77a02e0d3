use std::fs;
use std::path::PathBuf;
use std::process;

use ariadne::{Color, Label, Report, ReportKind, Source};
use clap::Parser;

use polylex_analyzer::{AnalysisResult, Language, Pipeline};
use polylex_common::config::{self, ConfigError};
use polylex_common::{AnalysisError, PolylexConfig};

/// Polylex source analyzer.
///
/// Detects whether a file is HTML, Python or SQL and reports lexical,
/// structural and semantic problems.
#[derive(Parser)]
#[command(
    name = "polylex",
    version,
    about,
    long_about = "Polylex source analyzer.\n\nDetects whether a source file is HTML, Python or SQL, then runs the lexical,\nstructural and semantic analyzers for that language and reports diagnostics.\n\nExamples:\n  polylex page.html                 Analyze and print diagnostics\n  polylex query.txt -l sql          Skip detection and analyze as SQL\n  polylex script.py --emit-trace    Also print the execution trace\n  polylex script.py --json          Print the full result as JSON"
)]
struct Cli {
    /// Input source file.
    input: PathBuf,

    /// Analyze as this language instead of detecting it (html, python, sql).
    #[arg(short, long)]
    language: Option<Language>,

    /// Configuration file (default: nearest Polylex.toml above the input).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Emit token stream to stdout.
    #[arg(long = "emit-tokens")]
    emit_tokens: bool,

    /// Emit symbol table to stdout.
    #[arg(long = "emit-symbols")]
    emit_symbols: bool,

    /// Emit execution trace to stdout.
    #[arg(long = "emit-trace")]
    emit_trace: bool,

    /// Print the whole analysis result as JSON instead of rendered diagnostics.
    #[arg(long)]
    json: bool,

    /// Suppress warning output.
    #[arg(short, long)]
    quiet: bool,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let source = match fs::read_to_string(&cli.input) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: could not read '{}': {}", cli.input.display(), e);
            process::exit(1);
        }
    };

    let file_name = cli
        .input
        .file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();

    let config = match load_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    };
    if let Some(ref root) = config.root_dir {
        log::debug!("using configuration from {}", root.display());
    }

    let pipeline = match Pipeline::new(config.analysis) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.language {
        Some(language) => pipeline.run_as(&source, language),
        None => pipeline.run(&source),
    };

    if cli.json {
        match serde_json::to_string_pretty(&result) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("error: failed to serialize result: {}", e);
                process::exit(1);
            }
        }
        finish(&result);
    }

    if cli.emit_tokens {
        for token in &result.tokens {
            println!(
                "{:>4}:{:<3} {:?} {:?}",
                token.line(),
                token.column(),
                token.kind,
                token.value,
            );
        }
    }

    if cli.emit_symbols {
        for (key, symbol) in result.symbols.iter() {
            println!(
                "{:<28} {:<10} {:<12} {:>4}:{:<3} {}",
                key,
                symbol.kind.to_string(),
                symbol.data_type,
                symbol.declaration_line(),
                symbol.declaration_column(),
                symbol.value.as_deref().unwrap_or(""),
            );
        }
    }

    if cli.emit_trace {
        for line in &result.trace {
            println!("{}", line);
        }
    }

    for diag in result.diagnostics() {
        if diag.is_error() || !cli.quiet {
            print_diagnostic(diag, &source, &file_name);
        }
    }

    if !cli.quiet {
        eprintln!(
            "{}: {} ({} error(s), {} warning(s))",
            file_name,
            result.language,
            result.error_count(),
            result.warning_count()
        );
    }

    finish(&result);
}

fn setup_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("RUST_LOG", level))
        .format_timestamp(None)
        .format_module_path(verbose > 0)
        .init();
}

/// An explicit `--config` must exist; otherwise a missing Polylex.toml means
/// default options.
fn load_config(cli: &Cli) -> Result<PolylexConfig, ConfigError> {
    if let Some(ref path) = cli.config {
        return config::load_config(path);
    }
    let abs_input = fs::canonicalize(&cli.input).unwrap_or_else(|_| cli.input.clone());
    match config::find_and_load_config(&abs_input) {
        Ok(c) => Ok(c),
        Err(ConfigError::NotFound(dir)) => {
            log::debug!("no Polylex.toml found from {}; using defaults", dir);
            Ok(PolylexConfig::default())
        }
        Err(e) => Err(e),
    }
}

fn finish(result: &AnalysisResult) -> ! {
    process::exit(if result.success { 0 } else { 1 })
}

fn print_diagnostic(diag: &AnalysisError, source: &str, file_name: &str) {
    let kind = if diag.is_error() {
        ReportKind::Error
    } else {
        ReportKind::Warning
    };

    // Positions carry byte offsets; ariadne labels count characters.
    let start = source
        .get(..diag.position.offset)
        .map(|before| before.chars().count());

    match start {
        Some(start) if !diag.position.is_unknown() => {
            let end = start + diag.length.max(1);
            let color = if diag.is_error() {
                Color::Red
            } else {
                Color::Yellow
            };

            let report = Report::build(kind, file_name, start)
                .with_message(&diag.message)
                .with_label(
                    Label::new((file_name, start..end))
                        .with_message(format!("{} {}", diag.kind, kind_noun(diag)))
                        .with_color(color),
                )
                .finish();
            if let Err(e) = report.eprint((file_name, Source::from(source))) {
                log::warn!("failed to render diagnostic: {}", e);
            }
        }
        _ => {
            let prefix = if diag.is_error() { "error" } else { "warning" };
            eprintln!("{}[{}]: {}", prefix, diag.kind, diag.message);
            eprintln!();
        }
    }
}

fn kind_noun(diag: &AnalysisError) -> &'static str {
    if diag.is_error() {
        "error"
    } else {
        "warning"
    }
}
