//! Vanity Rotor console
//!
//! Restores the saved base terms, starts rotating batches through the worker
//! and takes operator commands from stdin until `quit` or Ctrl-C.

use anyhow::{Context, Result};
use std::io::BufRead;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use vanity_rotor::config::ConfigManager;
use vanity_rotor::orchestrator::{ControlSurface, TracingSink};
use vanity_rotor::shell::{ShellCommand, HELP};
use vanity_rotor::targets::{AddOutcome, FileTermStore};

// ──────────────────────────────────────────────────────────────────────────────
// MAIN ENTRY POINT
// ──────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    let config_manager = ConfigManager::new(ConfigManager::default_path());
    let mut config = config_manager.load().await?;
    config.apply_env_overrides()?;

    let _log_guard = vanity_rotor::utils::init_logging(config.log_dir.as_deref())?;

    println!("\n{}", "═".repeat(60));
    println!("⛏️  Vanity Rotor v{}", env!("CARGO_PKG_VERSION"));
    println!("{}", "═".repeat(60));
    println!(
        "Config: {} | Targets: {} | Batch: {} every {}s",
        config_manager.path().display(),
        config.targets_file.display(),
        config.batch_size,
        config.rotate_interval_secs
    );
    println!("{}\n", "═".repeat(60));

    let store = Arc::new(FileTermStore::new(config.targets_file.clone()));
    let control = ControlSurface::new(&config, store, Arc::new(TracingSink))
        .context("Failed to build the rotation engine")?;

    let restored = control.restore(&config.default_terms).await;
    info!("Term store: {:?}", restored);
    control.start();

    println!("💡 {}\n", HELP);

    let mut lines = spawn_stdin_reader();
    loop {
        let line = tokio::select! {
            line = lines.recv() => line,
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        };
        // stdin closed
        let Some(line) = line else { break };

        let command = match ShellCommand::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("❌ {}. {}", e, HELP);
                continue;
            }
        };

        match command {
            ShellCommand::Add(term) => report_add(control.add_term(&term, true).await, &term),
            ShellCommand::Exact(term) => report_add(control.add_term(&term, false).await, &term),
            ShellCommand::Remove(term) => {
                control.remove_term(&term).await;
            }
            ShellCommand::Clear => control.clear_all().await,
            ShellCommand::Pause => control.set_paused(true).await,
            ShellCommand::Resume => control.set_paused(false).await,
            ShellCommand::Status => println!("📊 {}", control.stats().await),
            ShellCommand::List => {
                for term in control.targets().base_terms().await {
                    println!("  {}", term);
                }
            }
            ShellCommand::Help => println!("💡 {}", HELP),
            ShellCommand::Quit => break,
        }
    }

    control.shutdown().await;
    println!("\n👋 Goodbye!\n");
    Ok(())
}

/// Blocking stdin reads live on their own thread so a pending read never
/// holds up runtime shutdown.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Console input failed: {}", e);
                    break;
                }
            }
        }
    });
    rx
}

/// Rejections are already logged by the target manager.
fn report_add(outcome: AddOutcome, term: &str) {
    if let AddOutcome::Added { preview, .. } = outcome {
        println!("✅ Added '{}' ({}...)", term, preview.join(", "));
    }
}
