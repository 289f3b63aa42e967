// SPDX-License-Identifier: PMPL-1.0-or-later
//!
//! steps: interactive notebook shell for Stepwise queries.
//!
//! Loads a dataset query and its metadata, shows the derived notebook steps,
//! and edits the query through them:
//! - Tab completion for meta-commands and step ids
//! - Multiline input (backslash continuation) for pasted JSON
//! - Table or JSON step listings
//! - Persistent command history and a `~/.stepsrc` start-up script

mod completer;
mod formatter;
mod session;

use std::path::{Path, PathBuf};

use clap::Parser;
use colored::Colorize;
use rustyline::config::Configurer;
use rustyline::error::ReadlineError;
use rustyline::hint::HistoryHinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::MatchingBracketValidator;
use rustyline_derive::{Completer, Helper, Highlighter, Hinter, Validator};
use stepwise_steps::{Notebook, NotebookConfig};
use tracing_subscriber::EnvFilter;

use formatter::{format_json, format_steps, OutputFormat};
use session::{parse_position, Session, SessionError};

const VERSION: &str = env!("CARGO_PKG_VERSION");

// ---------------------------------------------------------------------------
// CLI argument parsing
// ---------------------------------------------------------------------------

/// steps: notebook view of a structured query.
#[derive(Parser, Debug)]
#[command(name = "steps", version = VERSION, about = "Notebook step shell for Stepwise queries")]
struct Cli {
    /// Dataset query (JSON) to load at start-up.
    #[arg(long)]
    query: Option<PathBuf>,

    /// Database and table metadata (JSON).
    #[arg(long)]
    metadata: Option<PathBuf>,

    /// Default output format.
    #[arg(long, default_value = "table")]
    format: String,

    /// Do not open a follow-up stage after a breakout.
    #[arg(long)]
    no_auto_nest: bool,

    /// Maximum number of stages a query may have.
    #[arg(long, default_value_t = 64)]
    max_stages: usize,
}

// ---------------------------------------------------------------------------
// Rustyline helper
// ---------------------------------------------------------------------------

#[derive(Helper, Highlighter, Completer, Hinter, Validator)]
struct StepsHelper {
    #[rustyline(Completer)]
    completer: completer::StepsCompleter,
    #[rustyline(Hinter)]
    hinter: HistoryHinter,
    #[rustyline(Validator)]
    validator: MatchingBracketValidator,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let format: OutputFormat = cli.format.parse().unwrap_or_else(|e| {
        eprintln!("Warning: {e}. Defaulting to table format.");
        OutputFormat::Table
    });

    let config = NotebookConfig {
        auto_nest: !cli.no_auto_nest,
        max_stages: cli.max_stages,
    };
    let notebook = match Notebook::new(config) {
        Ok(notebook) => notebook,
        Err(e) => {
            eprintln!("{} {e}", "Error:".red().bold());
            std::process::exit(2);
        }
    };

    let mut session = Session::new(notebook, format);
    if let Some(path) = &cli.metadata {
        report(session.load_metadata(path));
    }
    if let Some(path) = &cli.query {
        report(session.load_query(path));
    }

    print_banner(&session);

    let helper = StepsHelper {
        completer: completer::StepsCompleter,
        hinter: HistoryHinter::new(),
        validator: MatchingBracketValidator::new(),
    };

    let mut editor = match rustyline::Editor::<StepsHelper, DefaultHistory>::new() {
        Ok(editor) => editor,
        Err(e) => {
            eprintln!("{} cannot start line editor: {e}", "Error:".red().bold());
            std::process::exit(1);
        }
    };
    editor.set_helper(Some(helper));
    editor.set_auto_add_history(true);

    let history_path = home_path(".steps_history");
    let _ = editor.load_history(&history_path);

    load_stepsrc(&mut session);

    let mut input_buf = String::new();

    loop {
        let prompt = if input_buf.is_empty() {
            format!("{} ", "steps>".bright_green().bold())
        } else {
            format!("{} ", "   ...".bright_green())
        };

        match editor.readline(&prompt) {
            Ok(line) => {
                let trimmed = line.trim();

                if trimmed.is_empty() {
                    if !input_buf.is_empty() {
                        let input = std::mem::take(&mut input_buf);
                        if handle_line(&mut session, input.trim()) {
                            break;
                        }
                    }
                    continue;
                }

                if let Some(without_continuation) = trimmed.strip_suffix('\\') {
                    if !input_buf.is_empty() {
                        input_buf.push(' ');
                    }
                    input_buf.push_str(without_continuation);
                    continue;
                }

                if !input_buf.is_empty() {
                    input_buf.push(' ');
                    input_buf.push_str(trimmed);
                    let input = std::mem::take(&mut input_buf);
                    if handle_line(&mut session, input.trim()) {
                        break;
                    }
                    continue;
                }

                if handle_line(&mut session, trimmed) {
                    break;
                }
            }
            Err(ReadlineError::Interrupted) => {
                if !input_buf.is_empty() {
                    input_buf.clear();
                    println!("Input cancelled.");
                } else {
                    println!("Use \\quit or Ctrl-D to exit.");
                }
            }
            Err(ReadlineError::Eof) => {
                println!("Goodbye.");
                break;
            }
            Err(err) => {
                eprintln!("Readline error: {err}");
                break;
            }
        }
    }

    let _ = editor.save_history(&history_path);
}

/// Meta-command, or a pasted dataset query. Returns `true` on `\quit`.
fn handle_line(session: &mut Session, line: &str) -> bool {
    if line.starts_with('\\') {
        return handle_meta_command(session, line);
    }
    match session.set_query_json(line) {
        Ok(()) => show_steps(session),
        Err(e) => print_error(&e),
    }
    false
}

// ---------------------------------------------------------------------------
// Meta-command handling
// ---------------------------------------------------------------------------

/// Handle a meta-command (line starting with '\').
///
/// Returns `true` if the REPL should exit.
fn handle_meta_command(session: &mut Session, line: &str) -> bool {
    let (cmd, arg) = match line.split_once(char::is_whitespace) {
        Some((cmd, arg)) => (cmd, arg.trim()),
        None => (line, ""),
    };

    let result = match cmd {
        "\\quit" | "\\q" => {
            println!("Goodbye.");
            return true;
        }
        "\\help" | "\\h" | "\\?" => {
            print_help();
            Ok(())
        }
        "\\load" => require(arg, "\\load <file>")
            .and_then(|path| session.load_query(Path::new(path)))
            .map(|()| show_steps(session)),
        "\\metadata" => require(arg, "\\metadata <file>")
            .and_then(|path| session.load_metadata(Path::new(path)))
            .map(|()| println!("Metadata loaded.")),
        "\\steps" => {
            show_steps(session);
            Ok(())
        }
        "\\open" => require(arg, "\\open <step-id>").map(|id| {
            session.open_steps.open(id);
            show_steps(session);
        }),
        "\\close" => require(arg, "\\close <step-id>").map(|id| {
            session.open_steps.close(id);
            show_steps(session);
        }),
        "\\preview" => require(arg, "\\preview <n>").and_then(|arg| preview(session, arg)),
        "\\revert" => require(arg, "\\revert <n>")
            .and_then(parse_position)
            .and_then(|position| session.revert(position))
            .map(|()| show_steps(session)),
        "\\update" => require(arg, "\\update <n> <dataset-json>")
            .and_then(|arg| {
                let (position, json) = arg.split_once(char::is_whitespace).ok_or_else(|| {
                    SessionError::Usage("Usage: \\update <n> <dataset-json>".to_string())
                })?;
                session.update(parse_position(position)?, json.trim())
            })
            .map(|()| show_steps(session)),
        "\\query" => session
            .dataset()
            .and_then(|dataset| dataset.to_json_pretty().map_err(SessionError::from))
            .map(|json| println!("{json}")),
        "\\save" => require(arg, "\\save <file>")
            .and_then(|path| session.save_query(Path::new(path)))
            .map(|()| println!("Saved to {arg}")),
        "\\format" => {
            if arg.is_empty() {
                println!("Current format: {}", session.format);
                println!("Usage: \\format <table|json>");
                Ok(())
            } else {
                arg.parse::<OutputFormat>()
                    .map(|format| {
                        session.format = format;
                        println!("Output format: {}", session.format);
                    })
                    .map_err(SessionError::Usage)
            }
        }
        _ => Err(SessionError::Usage(format!(
            "Unknown command: {cmd}. Type \\help for available commands."
        ))),
    };

    if let Err(e) = result {
        print_error(&e);
    }
    false
}

fn require<'a>(arg: &'a str, usage: &str) -> Result<&'a str, SessionError> {
    if arg.is_empty() {
        Err(SessionError::Usage(format!("Usage: {usage}")))
    } else {
        Ok(arg)
    }
}

fn show_steps(session: &Session) {
    match session.steps() {
        Ok(steps) => println!("{}", format_steps(&steps, session.format)),
        Err(e) => print_error(&e),
    }
}

fn preview(session: &Session, arg: &str) -> Result<(), SessionError> {
    let position = parse_position(arg)?;
    let steps = session.steps()?;
    let step = steps.get(position).ok_or(stepwise_steps::StepError::StepOutOfRange {
        position,
        len: steps.len(),
    })?;
    match &step.preview_query {
        Some(query) => {
            let value = serde_json::to_value(query.dataset_query())
                .map_err(stepwise_query::QueryError::from)?;
            println!("{}", format_json(&value));
        }
        None => println!("{}", format!("{} has no preview (inactive)", step.id).dimmed()),
    }
    Ok(())
}

fn report(result: Result<(), SessionError>) {
    if let Err(e) = result {
        print_error(&e);
    }
}

fn print_error(e: &SessionError) {
    eprintln!("{} {e}", "Error:".red().bold());
}

// ---------------------------------------------------------------------------
// .stepsrc loading
// ---------------------------------------------------------------------------

/// Run meta-commands from `~/.stepsrc` if the file exists.
fn load_stepsrc(session: &mut Session) {
    let Ok(contents) = std::fs::read_to_string(home_path(".stepsrc")) else {
        return;
    };

    for line in contents.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if trimmed.starts_with('\\') {
            handle_meta_command(session, trimmed);
        }
    }
}

fn home_path(name: &str) -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(name)
}

// ---------------------------------------------------------------------------
// Help and banner
// ---------------------------------------------------------------------------

fn print_banner(session: &Session) {
    println!();
    println!("{}", "  Stepwise notebook shell".bright_cyan().bold());
    println!("  {} {}", "Version:".dimmed(), VERSION);
    println!("  {} {}", "Format: ".dimmed(), session.format);
    println!(
        "  {} {}",
        "Query:  ".dimmed(),
        if session.dataset.is_some() {
            "loaded"
        } else {
            "none"
        }
    );
    println!();
    println!(
        "  Type {} for help, {} to exit.",
        "\\help".bright_yellow(),
        "\\quit".bright_yellow()
    );
    println!();
}

fn print_help() {
    const COMMANDS: &[(&str, &str)] = &[
        ("\\load <file>         ", "Load a dataset query (JSON)"),
        ("\\metadata <file>     ", "Load database and table metadata (JSON)"),
        ("\\steps               ", "List the notebook steps"),
        ("\\open <id>           ", "Force a step open (e.g. 0:filter)"),
        ("\\close <id>          ", "Drop a force-open override"),
        ("\\preview <n>         ", "Show step n's preview query"),
        ("\\revert <n>          ", "Remove step n and clean later steps"),
        ("\\update <n> <json>   ", "Replace step n's stage query and cascade"),
        ("\\query               ", "Show the current dataset query"),
        ("\\save <file>         ", "Write the current dataset query"),
        ("\\format <fmt>        ", "Set output format (table|json)"),
        ("\\help                ", "Show this help message"),
        ("\\quit / \\q           ", "Exit the shell"),
    ];

    println!();
    println!("{}", "  Meta-Commands".bright_cyan().bold());
    println!();
    for (usage, description) in COMMANDS {
        println!("  {}  {}", usage.bright_yellow(), description);
    }
    println!();
    println!("{}", "  Query Input".bright_cyan().bold());
    println!();
    println!("  Paste a dataset query (JSON) to make it current.");
    println!("  Use \\ at end of line for multiline continuation.");
    println!();
}
