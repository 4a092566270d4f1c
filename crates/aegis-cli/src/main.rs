//! `aegis-cli` – Aegis Governance Shell
//!
//! This binary is the interactive front end of the governance stack.  It:
//!
//! 1. Checks for `~/.aegis/config.toml`; runs a **First-Run Wizard** when the
//!    file is absent.
//! 2. Builds a [`Governor`] over the configured state directory with the
//!    built-in collaborators.
//! 3. Drops the user into an **interactive REPL** with slash-commands
//!    (`/decide`, `/status`, `/history`, `/rotate`, `/help`, …).
//! 4. Intercepts **Ctrl-C** so the trace logger is drained and the trace log
//!    rotated before exit.

mod collaborators;
mod config;
mod repl;

use std::sync::Arc;

use aegis_runtime::{Governor, init_tracing};
use colored::Colorize;
use tokio::sync::Notify;
use tracing::{error, warn};

use crate::collaborators::{InMemoryIdentity, KeywordDecisionEngine, StimulusAffect};

fn main() {
    // ── Structured logging ────────────────────────────────────────────────
    // RUST_LOG filters (default "info"); AEGIS_LOG_FORMAT=json switches to
    // newline-delimited JSON.  User-facing output still uses println!.
    let _telemetry = init_tracing("aegis");

    print_banner();

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let interrupt = Arc::new(Notify::new());
    let interrupt_handler = interrupt.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – draining trace log and shutting down …".yellow().bold());
        interrupt_handler.notify_one();
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
    }

    // ── First-Run Wizard ──────────────────────────────────────────────────
    let cfg = match config::load() {
        Ok(None) => run_first_run_wizard(),
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    };

    // ── Governor ──────────────────────────────────────────────────────────
    let mut governor = match Governor::new(
        cfg.governor_config(),
        Box::new(StimulusAffect::default()),
        Box::new(InMemoryIdentity::default()),
        Box::new(KeywordDecisionEngine),
    ) {
        Ok(governor) => governor,
        Err(e) => {
            error!(error = %e, "governor initialisation failed");
            println!("{}: {}", "Cannot start Aegis".red().bold(), e);
            std::process::exit(1);
        }
    };

    println!(
        "  State directory: {}   maturity {}   mental health {}",
        cfg.state_path.display().to_string().dimmed(),
        cfg.maturity_level.to_string().yellow(),
        format!("{:.2}", cfg.mental_health).yellow()
    );
    println!();
    println!(
        "  Type {} for a list of commands.\n",
        "/help".bold().cyan()
    );

    // ── Interactive REPL ──────────────────────────────────────────────────
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            println!("{}: {}", "Failed to build async runtime".red(), e);
            std::process::exit(1);
        }
    };
    runtime.block_on(repl::run(&mut governor, interrupt));
}

// ─────────────────────────────────────────────────────────────────────────────
// First-Run Wizard
// ─────────────────────────────────────────────────────────────────────────────

fn run_first_run_wizard() -> config::Config {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║        Aegis First-Run Wizard        ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();
    println!("  No configuration found.  Let's set up Aegis.\n");

    let mut cfg = config::Config::default();

    let path = prompt_line(
        &format!("  State directory [{}]: ", cfg.state_path.display()),
        &cfg.state_path.display().to_string(),
    );
    cfg.state_path = path.into();

    let level = prompt_line(
        &format!("  Starting maturity level 0-10 [{}]: ", cfg.maturity_level),
        &cfg.maturity_level.to_string(),
    );
    match level.parse::<u8>() {
        Ok(l) if l <= aegis_types::MAX_MATURITY_LEVEL => cfg.maturity_level = l,
        _ => println!("  {} keeping {}", "Invalid level;".yellow(), cfg.maturity_level),
    }

    let health = prompt_line(
        &format!("  Starting mental health 0.0-1.0 [{}]: ", cfg.mental_health),
        &cfg.mental_health.to_string(),
    );
    match health.parse::<f64>() {
        Ok(h) if (0.0..=1.0).contains(&h) => cfg.mental_health = h,
        _ => println!("  {} keeping {}", "Invalid score;".yellow(), cfg.mental_health),
    }

    match config::save(&cfg) {
        Ok(()) => println!(
            "\n  {} Config saved to {}\n",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }

    config::apply_env_overrides(&mut cfg);
    cfg
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"    ___              _     "#.bold().cyan());
    println!("{}", r#"   /   | ___  ____ _(_)____"#.bold().cyan());
    println!("{}", r#"  / /| |/ _ \/ __ `/ / ___/"#.bold().cyan());
    println!("{}", r#" / ___ /  __/ /_/ / (__  ) "#.bold().cyan());
    println!("{}", r#"/_/  |_\___/\__, /_/____/  "#.bold().cyan());
    println!("{}", r#"           /____/          "#.bold().cyan());
    println!();
    println!("  {} {}",
        "Aegis".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Self-Governing Decision Kernel");
    println!();
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn prompt_line(msg: &str, default: &str) -> String {
    use std::io::{BufRead, Write};
    print!("{}", msg);
    std::io::stdout().flush().ok();
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(_) => {
            let t = line.trim().to_string();
            if t.is_empty() { default.to_string() } else { t }
        }
        Err(_) => default.to_string(),
    }
}
