//! AdSweep CLI
//!
//! Pattern list checks, offline page scrubbing and a file-backed
//! coordinator for poking at the shared state.

use std::fs;
use std::path::PathBuf;
use std::rc::Rc;

use clap::{Parser, Subcommand};
use log::LevelFilter;

use sw_core::config::BadgeColors;
use sw_core::coordinator::{Badge, Coordinator};
use sw_core::html::{HtmlDocument, StaticScheduler};
use sw_core::page::{Document, ElementView};
use sw_core::patterns::PatternSet;
use sw_core::suppressor::PageSuppressor;
use sw_core::surface::{ControlSurface, PopupView};

mod file_store;
mod state;

use file_store::FileStore;
use state::{LoggedBadge, LoggedRules};

#[derive(Parser)]
#[command(name = "sw-cli")]
#[command(about = "AdSweep pattern and state tools")]
struct Cli {
    /// Verbose logging (repeat for more)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect pattern lists
    Patterns {
        #[command(subcommand)]
        command: PatternCommands,
    },

    /// Run one activation over a saved page
    Scrub {
        /// HTML page to scrub
        #[arg(short, long)]
        input: PathBuf,

        /// Pattern list (defaults to the bundled one)
        #[arg(short, long)]
        patterns: Option<PathBuf>,

        /// Write the scrubbed page here
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Page globals to define as truthy before scrubbing
        #[arg(short, long = "global")]
        globals: Vec<String>,
    },

    /// Drive the coordinator against a JSON store file
    State {
        /// Store file
        #[arg(short, long, default_value = "adsweep-store.json")]
        store: PathBuf,

        #[command(subcommand)]
        command: StateCommands,
    },
}

#[derive(Subcommand)]
enum PatternCommands {
    /// Check a pattern list loads and every selector parses
    Validate {
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Print the stylesheet injected into active pages
    Stylesheet {
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum StateCommands {
    /// First install: seed defaults
    Install,
    /// Browser startup: reload and re-apply
    Startup,
    /// What the popup would show
    Status,
    /// Flip protection
    Toggle,
    /// Zero the blocked counter
    Reset,
    /// Count blocked requests
    Record {
        #[arg(short = 'n', long, default_value_t = 1)]
        count: u64,
    },
    /// Dump the raw store
    Show,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new().filter_level(level).init();

    let result = match cli.command {
        Commands::Patterns { command } => match command {
            PatternCommands::Validate { input } => cmd_validate(&input),
            PatternCommands::Stylesheet { input } => cmd_stylesheet(input.as_ref()),
        },
        Commands::Scrub {
            input,
            patterns,
            output,
            globals,
        } => cmd_scrub(&input, patterns.as_ref(), output.as_ref(), &globals),
        Commands::State { store, command } => cmd_state(store, command).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn load_patterns(path: Option<&PathBuf>) -> Result<PatternSet, String> {
    let Some(path) = path else {
        return Ok(PatternSet::builtin().clone());
    };
    let text = fs::read_to_string(path).map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;
    PatternSet::from_json(&text).map_err(|e| format!("Invalid pattern list '{}': {}", path.display(), e))
}

/// Every selector in `patterns` that does not parse, with the reason.
fn invalid_selectors(patterns: &PatternSet) -> Vec<(String, String)> {
    let mut probe = HtmlDocument::parse("");
    let mut invalid = Vec::new();
    let lists = [
        &patterns.ad_selectors,
        &patterns.hide_selectors,
        &patterns.consent_selectors,
    ];
    for selector in lists.into_iter().flatten() {
        if let Err(e) = probe.remove_where(selector, &|_: &dyn ElementView| false) {
            invalid.push((selector.clone(), e.to_string()));
        }
    }
    invalid
}

fn cmd_validate(input: &PathBuf) -> Result<(), String> {
    let patterns = load_patterns(Some(input))?;
    let invalid = invalid_selectors(&patterns);

    println!("Pattern list '{}'", input.display());
    println!("  Version:           {}", patterns.version);
    println!("  Ad selectors:      {}", patterns.ad_selectors.len());
    println!("  Hide selectors:    {}", patterns.hide_selectors.len());
    println!("  Tracking hosts:    {}", patterns.tracking_script_hosts.len());
    println!("  Consent selectors: {}", patterns.consent_selectors.len());
    println!("  Anti-adblock:      {}", patterns.anti_adblock_globals.len());

    if invalid.is_empty() {
        println!("\n✓ All selectors parse");
        return Ok(());
    }

    println!();
    for (selector, reason) in &invalid {
        println!("  ✗ {}  ({})", selector, reason);
    }
    Err(format!("{} selector(s) failed to parse", invalid.len()))
}

fn cmd_stylesheet(input: Option<&PathBuf>) -> Result<(), String> {
    let patterns = load_patterns(input)?;
    let css = patterns.stylesheet();
    if css.is_empty() {
        return Err("Pattern list has no hide selectors".to_string());
    }
    println!("{}", css);
    Ok(())
}

fn cmd_scrub(
    input: &PathBuf,
    patterns: Option<&PathBuf>,
    output: Option<&PathBuf>,
    globals: &[String],
) -> Result<(), String> {
    let markup = fs::read_to_string(input).map_err(|e| format!("Failed to read '{}': {}", input.display(), e))?;
    let patterns = Rc::new(load_patterns(patterns)?);

    let mut document = HtmlDocument::parse(&markup);
    for name in globals {
        document.set_global(name, true);
    }

    let mut suppressor = PageSuppressor::new(document, StaticScheduler::new(), patterns);
    let stats = suppressor.activate();
    suppressor.deactivate();
    let document = suppressor.into_document();

    println!("Scrubbed '{}'", input.display());
    println!("  Removed:     {}", stats.removed);
    println!("  Scripts:     {}", stats.scripts_removed);
    println!("  Hidden:      {}", stats.hidden);
    println!("  Neutralized: {}", stats.neutralized);
    if stats.skipped_selectors > 0 {
        println!("  Skipped:     {} invalid selector(s)", stats.skipped_selectors);
    }

    if let Some(output) = output {
        fs::write(output, document.to_html())
            .map_err(|e| format!("Failed to write '{}': {}", output.display(), e))?;
        println!("\nWrote '{}'", output.display());
    }
    Ok(())
}

fn print_view(view: &PopupView) {
    println!("Protection: {}", view.status_text());
    println!("Blocked:    {}", view.count_text);
}

async fn cmd_state(path: PathBuf, command: StateCommands) -> Result<(), String> {
    let coordinator = Coordinator::new(FileStore::new(path), LoggedRules, LoggedBadge);

    if let StateCommands::Show = command {
        let record = coordinator.store().load().map_err(|e| e.to_string())?;
        let text = serde_json::to_string_pretty(&record).map_err(|e| e.to_string())?;
        println!("{}", text);
        return Ok(());
    }

    if let StateCommands::Install = command {
        coordinator.initialize().await;
    } else {
        coordinator.resynchronize().await;
    }

    let surface = ControlSurface::new(&coordinator, coordinator.store());
    let view = match command {
        StateCommands::Install | StateCommands::Startup | StateCommands::Status => surface.refresh().await,
        StateCommands::Toggle => surface.toggle().await,
        StateCommands::Reset => surface.reset().await,
        StateCommands::Record { count } => {
            for _ in 0..count {
                coordinator.record_suppression_event().await;
            }
            surface.refresh().await
        }
        StateCommands::Show => None,
    };

    match view {
        Some(view) => print_view(&view),
        None => return Err("Coordinator did not answer".to_string()),
    }

    let badge = Badge::derive(coordinator.status(), &BadgeColors::default());
    println!("Badge:      {:?} on {}", badge.text, badge.color);
    Ok(())
}
