//! REPL – Read-Eval-Print Loop for the Aegis governance shell.
//!
//! Supported slash-commands:
//!   /decide <goal> [-- <json>] – govern one decision (optional JSON context)
//!   /status                    – maturity, mental health, affect, counters
//!   /history [n]               – last `n` persisted traces (default 10)
//!   /maturity <0-10>           – change the authorized maturity level
//!   /health <0.0-1.0>          – change the mental-health score
//!   /rotate                    – rotate the trace log now
//!   /schema                    – print the JSON Schema of a decision trace
//!   /help                      – show this list
//!   /quit | /exit              – stop the governor and exit

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use aegis_runtime::{DecisionReport, Governor};
use aegis_types::{DecisionTrace, JsonMap};
use colored::Colorize;
use tokio::sync::{Notify, mpsc};
use tracing::warn;

const DEFAULT_HISTORY: usize = 10;

/// One parsed line of input.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Decide { goal: String, context: JsonMap },
    Status,
    History(usize),
    Maturity(u8),
    Health(f64),
    Rotate,
    Schema,
    Help,
    Quit,
    Empty,
    /// A known command with bad arguments; carries the usage hint.
    Invalid(String),
    Unknown(String),
}

/// Parse one input line into a [`Command`].
pub fn parse(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::Empty;
    }
    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };

    match head {
        "/decide" => parse_decide(rest),
        "/status" => Command::Status,
        "/history" if rest.is_empty() => Command::History(DEFAULT_HISTORY),
        "/history" => match rest.parse::<usize>() {
            Ok(n) if n > 0 => Command::History(n),
            _ => Command::Invalid("usage: /history [n]  (n ≥ 1)".to_string()),
        },
        "/maturity" => match rest.parse::<u8>() {
            Ok(level) if level <= aegis_types::MAX_MATURITY_LEVEL => Command::Maturity(level),
            _ => Command::Invalid("usage: /maturity <0-10>".to_string()),
        },
        "/health" => match rest.parse::<f64>() {
            Ok(score) if (0.0..=1.0).contains(&score) => Command::Health(score),
            _ => Command::Invalid("usage: /health <0.0-1.0>".to_string()),
        },
        "/rotate" => Command::Rotate,
        "/schema" => Command::Schema,
        "/help" => Command::Help,
        "/quit" | "/exit" => Command::Quit,
        _ => Command::Unknown(line.to_string()),
    }
}

fn parse_decide(rest: &str) -> Command {
    let (goal, raw_context) = match rest.split_once("--") {
        Some((goal, context)) => (goal.trim(), Some(context.trim())),
        None => (rest, None),
    };
    if goal.is_empty() {
        return Command::Invalid("usage: /decide <goal> [-- <json object>]".to_string());
    }
    let context = match raw_context {
        None | Some("") => JsonMap::new(),
        Some(raw) => match serde_json::from_str::<JsonMap>(raw) {
            Ok(map) => map,
            Err(e) => return Command::Invalid(format!("context must be a JSON object: {e}")),
        },
    };
    Command::Decide {
        goal: goal.to_string(),
        context,
    }
}

/// Entry point for the interactive REPL.
///
/// Starts the governor, reads commands until `/quit`, EOF or `interrupt`
/// fires, then stops the governor (draining the trace logger and rotating
/// the trace log).
pub async fn run(governor: &mut Governor, interrupt: Arc<Notify>) {
    if let Err(e) = governor.start().await {
        println!("{}: {}", "Failed to start governor".red(), e);
        return;
    }

    let mut lines = spawn_stdin_reader();

    loop {
        print!("{} ", "aegis>".bold().cyan());
        io::stdout().flush().ok();

        let line = tokio::select! {
            line = lines.recv() => line,
            _ = interrupt.notified() => break,
        };
        let Some(line) = line else {
            println!();
            break; // EOF
        };

        match parse(&line) {
            Command::Empty => {}
            Command::Decide { goal, context } => cmd_decide(governor, &goal, context),
            Command::Status => cmd_status(governor),
            Command::History(n) => cmd_history(governor, n),
            Command::Maturity(level) => match governor.set_maturity_level(level) {
                Ok(()) => println!("{} {}", "✓ Maturity level set to".green(), level.to_string().bold()),
                Err(e) => println!("{}: {}", "Error".red(), e),
            },
            Command::Health(score) => match governor.set_mental_health(score) {
                Ok(()) => println!("{} {}", "✓ Mental health set to".green(), format!("{score:.2}").bold()),
                Err(e) => println!("{}: {}", "Error".red(), e),
            },
            Command::Rotate => cmd_rotate(governor),
            Command::Schema => cmd_schema(),
            Command::Help => cmd_help(),
            Command::Quit => {
                println!("{}", "Goodbye.".green());
                break;
            }
            Command::Invalid(usage) => println!("{}", usage.yellow()),
            Command::Unknown(other) => {
                println!(
                    "{} '{}'. Type {} for available commands.",
                    "Unknown command:".red(),
                    other.yellow(),
                    "/help".bold()
                );
            }
        }
    }

    match governor.stop().await {
        Ok(Some(archive)) => println!(
            "  {} Trace log archived to {}",
            "✓".green(),
            archive.display().to_string().bold()
        ),
        Ok(None) => println!("  {} Trace log flushed.", "✓".green()),
        Err(e) => println!("{}: {}", "Error stopping governor".red(), e),
    }
}

/// Blocking stdin reads live on their own thread so the loop can also wait
/// on the interrupt signal.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "stdin read failed");
                    break;
                }
            }
        }
    });
    rx
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_help() {
    println!();
    println!("{}", "Aegis Commands".bold().underline());
    println!("  {}  – govern a decision", "/decide <goal> [-- {json}]".bold().cyan());
    println!("  {}                     – show governor state", "/status".bold().cyan());
    println!("  {}                – last n persisted traces", "/history [n]".bold().cyan());
    println!("  {}            – set maturity level", "/maturity <0-10>".bold().cyan());
    println!("  {}           – set mental-health score", "/health <0.0-1.0>".bold().cyan());
    println!("  {}                     – rotate the trace log", "/rotate".bold().cyan());
    println!("  {}                     – JSON Schema of a decision trace", "/schema".bold().cyan());
    println!("  {}                – stop and exit", "/quit  /exit".bold().cyan());
    println!();
}

fn cmd_decide(governor: &mut Governor, goal: &str, context: JsonMap) {
    match governor.make_decision(goal, context) {
        Ok(report) => print_report(&report),
        Err(e) => println!("{}: {}", "Decision failed".red(), e),
    }
}

fn print_report(report: &DecisionReport) {
    let status = if report.is_approved() {
        "APPROVED".green().bold()
    } else {
        "BLOCKED".red().bold()
    };
    println!("  {} [{}] {}", status, report.policy_action.as_str().yellow(), report.trace_id.dimmed());
    println!("  {}", report.message);
    if let Some(decision) = &report.decision {
        let confidence = report.confidence.unwrap_or_default();
        println!("  Decision   : {} ({:.0}% confidence)", decision.bold(), confidence * 100.0);
    }
    if let Some(reasoning) = &report.reasoning {
        println!("  Reasoning  : {}", reasoning.dimmed());
    }
    if !report.flags.is_empty() {
        let flags: Vec<String> = report.flags.iter().map(|f| format!("{f:?}")).collect();
        println!("  Flags      : {}", flags.join(", ").yellow());
    }
    if let Some(conditions) = &report.conditions {
        println!("  Conditions : {}", serde_json::Value::Object(conditions.clone()));
    }
}

fn cmd_status(governor: &Governor) {
    let status = governor.system_status();
    println!("{}", "Governor Status".bold().underline());
    println!("  Maturity level : {}", status.maturity_level.to_string().yellow());
    println!("  Mental health  : {}", format!("{:.2}", status.mental_health).yellow());
    println!("  Decisions      : {}", status.decision_count);
    println!("  Event bus      : {}", running(status.bus_running));
    println!("  Trace logger   : {}", running(status.logger_running));
    println!("  Affect:");
    for (emotion, intensity) in &status.pmx_affect {
        println!("    • {:<9} {:.2}", emotion, intensity);
    }
    if !status.identity.constraints.is_empty() {
        println!("  Constraints    : {}", status.identity.constraints.join(", "));
    }
}

fn running(flag: bool) -> colored::ColoredString {
    if flag { "running".green() } else { "stopped".red() }
}

fn cmd_history(governor: &Governor, limit: usize) {
    match governor.history(limit) {
        Ok(traces) if traces.is_empty() => println!("  {}", "No persisted traces yet.".dimmed()),
        Ok(traces) => {
            for trace in &traces {
                print_trace_line(trace);
            }
        }
        Err(e) => println!("{}: {}", "Error reading trace log".red(), e),
    }
}

fn print_trace_line(trace: &DecisionTrace) {
    let outcome = match &trace.selected {
        Some(option) => option.green(),
        None => "blocked".red(),
    };
    println!(
        "  {} {} {} → {}",
        trace.started_at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
        short_id(&trace.trace_id).dimmed(),
        trace.goal,
        outcome
    );
}

fn short_id(trace_id: &str) -> &str {
    trace_id.get(..8).unwrap_or(trace_id)
}

fn cmd_rotate(governor: &Governor) {
    match governor.rotate_traces() {
        Ok(Some(archive)) => println!("{} {}", "✓ Archived to".green(), archive.display().to_string().bold()),
        Ok(None) => println!("  Trace log below the rotation threshold; nothing to do."),
        Err(e) => println!("{}: {}", "Error rotating trace log".red(), e),
    }
}

fn cmd_schema() {
    let schema = schemars::schema_for!(DecisionTrace);
    match serde_json::to_string_pretty(&schema) {
        Ok(text) => println!("{text}"),
        Err(e) => println!("{}: {}", "Error rendering schema".red(), e),
    }
}
