// Draft coach entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to file, not terminal)
// 2. Load config
// 3. Build the authority client and replay transport
// 4. Create mpsc channels
// 5. Spawn the app event loop
// 6. Spawn the console printer
// 7. Read commands from stdin until quit
// 8. Cleanup on exit

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info};

use draftcoach::app::{self, AppState, UserCommand};
use draftcoach::console;
use draftcoach_client::{HttpAuthority, WsTransport};
use draftcoach_core::config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing (log to file, not terminal)
    let log_path = init_tracing()?;
    info!("Draft coach starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: authority={}, think delay {:?}",
        config.authority.base_url,
        config.negotiation.think_delay()
    );

    // 3. Authority client and replay transport
    let authority =
        Arc::new(HttpAuthority::from_config(&config).context("failed to build authority client")?);
    let transport = Arc::new(WsTransport::new());
    if config.insight_api_key().is_some() {
        info!("Insight API key configured");
    } else {
        info!("No insight API key; commentary requests go out without one");
    }

    // 4. Channels
    let (negotiation_tx, negotiation_rx) = mpsc::channel(256);
    let (stream_tx, stream_rx) = mpsc::channel(256);
    let (cmd_tx, cmd_rx) = mpsc::channel(64);
    let (ui_tx, mut ui_rx) = mpsc::channel(256);

    let state = AppState::new(&config, authority, transport, negotiation_tx, stream_tx);

    // 5. App event loop
    let app_handle = tokio::spawn(async move {
        if let Err(e) = app::run(negotiation_rx, stream_rx, cmd_rx, ui_tx, state).await {
            error!("Application loop error: {}", e);
        }
    });

    // 6. Console printer
    let printer = tokio::spawn(async move {
        while let Some(update) = ui_rx.recv().await {
            println!("{}", console::render(&update));
        }
    });

    // 7. Command input
    println!("draft-coach ready (logging to {})", log_path.display());
    println!("{}", console::HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        match console::parse_command(&line) {
            Ok(Some(cmd)) => {
                let quit = cmd == UserCommand::Quit;
                if cmd_tx.send(cmd).await.is_err() {
                    break;
                }
                if quit {
                    break;
                }
            }
            Ok(None) => {}
            Err(message) => println!("! {message}"),
        }
    }

    // 8. Cleanup: closing the command channel stops the loop.
    drop(cmd_tx);
    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), async {
        let _ = app_handle.await;
        let _ = printer.await;
    })
    .await;

    info!("Draft coach shut down cleanly");
    Ok(())
}

/// Initialize tracing to log to a file (the terminal is the console).
/// Returns the log file path.
fn init_tracing() -> anyhow::Result<PathBuf> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = match directories::ProjectDirs::from("", "", "draft-coach") {
        Some(dirs) => dirs.data_dir().join("logs"),
        None => std::env::current_dir()?.join("logs"),
    };
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create log directory {}", log_dir.display()))?;

    let log_path = log_dir.join("draft-coach.log");
    let log_file = std::fs::File::create(&log_path)?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("draftcoach=info,draft_coach=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(log_path)
}
