//! marksman-bridge - standalone supervisor.
//!
//! Resolves (or downloads) the Marksman server, starts it and keeps a
//! status line in sync with what the server reports. Commands on stdin:
//!
//!   restart    stop and start a fresh session
//!   output     print the server log path
//!   quit       stop the server and exit
//!
//! Usage: marksman-bridge [OPTIONS]
//!
//! Options:
//!   --version, -v      Show version
//!   --storage <DIR>    Override the storage root
//!   --download-only    Provision the server binary and exit

use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::AsyncBufReadExt;

use marksman_bridge::host::{ProgressHandle, ProgressView, StatusIndicator};
use marksman_bridge::{
    CMD_RESTART_SERVER, CMD_SHOW_OUTPUT, CommandRegistry, Fetcher, Platform, Settings, activate,
    config, logging,
};

/// Current version of the bridge.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Status indicator printed to the terminal.
struct TerminalIndicator;

impl StatusIndicator for TerminalIndicator {
    fn set_text(&self, text: &str) {
        println!("[status] {}", text);
    }

    fn show(&self) {}

    fn hide(&self) {
        println!("[status] hidden");
    }
}

/// Download progress rendered on stderr.
struct StderrProgress;

impl ProgressView for StderrProgress {
    fn begin(&self, title: &str) -> Box<dyn ProgressHandle> {
        eprintln!("{}", title);
        Box::new(StderrProgressHandle)
    }
}

struct StderrProgressHandle;

impl ProgressHandle for StderrProgressHandle {
    fn report(&mut self, percent: u32, _increment: u32) {
        eprint!("\r{}%", percent);
        if percent >= 100 {
            eprintln!();
        }
    }
}

/// Records registered command ids.
#[derive(Default)]
struct ListRegistry(Vec<String>);

impl CommandRegistry for ListRegistry {
    fn register(&mut self, command_id: &str) {
        self.0.push(command_id.to_string());
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--version" || a == "-v") {
        println!("marksman-bridge v{}", VERSION);
        return Ok(());
    }

    let storage_root = args
        .iter()
        .position(|a| a == "--storage")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
        .unwrap_or_else(config::default_storage_root);

    let settings = Settings::load(&storage_root)?;
    let log_path = logging::init(&storage_root, &settings.log_level)?;
    eprintln!("logging to {}", log_path.display());

    if args.iter().any(|a| a == "--download-only") {
        let fetcher = Fetcher::new(storage_root);
        let platform = Platform::current()?;
        match fetcher.ensure_server(platform, &StderrProgress).await? {
            Some(path) => println!("server binary at {}", path.display()),
            None => {
                eprintln!("failed to provision the server binary");
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    let indicator: Arc<dyn StatusIndicator> = Arc::new(TerminalIndicator);
    let mut registry = ListRegistry::default();
    let extension = activate(
        settings,
        storage_root,
        indicator,
        Arc::new(StderrProgress),
        &mut registry,
    )
    .await?;
    let Some(mut extension) = extension else {
        println!("marksman-bridge is disabled by configuration");
        return Ok(());
    };

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    while let Ok(Some(line)) = lines.next_line().await {
        match line.trim() {
            "restart" => extension.dispatch(CMD_RESTART_SERVER).await,
            "output" => extension.dispatch(CMD_SHOW_OUTPUT).await,
            "quit" | "exit" => break,
            "" => {}
            other => eprintln!("unknown command: {}", other),
        }
    }

    extension.deactivate().await;
    Ok(())
}
