mod api;
mod app;
mod catalog;
mod command;
mod config;
mod session;
mod state;
mod tui;
mod upload;

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use api::{BackendClient, ChatBackend};
use app::App;
use config::Config;
use state::Action;
use tui::Tui;
use upload::FileUpload;

#[derive(Parser, Debug)]
#[command(author, version, about = "Terminal client for the medical assistant backend", long_about = None)]
struct Cli {
    #[arg(short, long, help = "Enable debug logging")]
    debug: bool,

    #[arg(long, value_name = "URL", help = "Backend base URL (overrides config and MEDCHAT_API_URL)")]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Option<CliCommand>,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// Send one message and print the assistant's reply
    Ask {
        #[arg(required = true)]
        message: Vec<String>,
        /// Trusted source URL to send as a preferred link (repeatable)
        #[arg(short, long = "source", value_name = "URL")]
        sources: Vec<String>,
    },
    /// Upload an image to the backend and print its hosted URL
    Upload { path: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load();
    if let Some(url) = &cli.api_url {
        config.api.get_or_insert_with(Default::default).base_url = Some(url.clone());
    }

    let debug_enabled = cli.debug || config.debug.unwrap_or(false);
    init_logging(debug_enabled, cli.command.is_none());

    log::info!("medchat starting...");
    log::debug!("CLI args: {:?}", cli);
    log::debug!("Loaded configuration: {:?}", config);

    let backend = BackendClient::new(config.api_url());
    log::info!("Using backend at {}", backend.base_url());

    match cli.command {
        Some(CliCommand::Ask { message, sources }) => ask(&config, backend, message.join(" "), sources).await,
        Some(CliCommand::Upload { path }) => upload(&backend, &path).await,
        None => {
            let mut app = App::new(&config, backend);
            let mut tui = Tui::new()?;
            tui.run_loop(&mut app).await?;
            log::info!("Application finished.");
            Ok(())
        }
    }
}

/// Logs to stderr for one-shot commands and to a file while the TUI owns the terminal.
fn init_logging(debug: bool, interactive: bool) {
    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if debug { "debug" } else { "info" }),
    );
    if interactive {
        match open_log_file() {
            Ok(file) => {
                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
            Err(e) => {
                eprintln!("medchat: logging disabled ({e:#})");
                builder.filter_level(log::LevelFilter::Off);
            }
        }
    }
    builder.init();
}

fn open_log_file() -> Result<std::fs::File> {
    let dir = dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("medchat");
    std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
    let path = dir.join("medchat.log");
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("opening {}", path.display()))
}

async fn ask(config: &Config, backend: BackendClient, message: String, sources: Vec<String>) -> Result<()> {
    let mut app = App::new(config, backend);
    for url in sources {
        app.dispatch(Action::AddSource { url, description: None });
    }
    app.dispatch(Action::SubmitText(message));
    app.settle().await;

    let reply = app
        .state
        .messages
        .last()
        .filter(|m| m.role == session::Role::Assistant && !m.is_thinking())
        .context("no reply received")?;
    println!("{}", reply.content);
    for tool in reply.tools.iter().flatten() {
        println!("\nSuggested tool: {} ({})\n  {}", tool.name, tool.input_type, tool.description);
    }
    for source in reply.sources.iter().flatten() {
        println!("\n[{}] {}\n  {}", source.title, source.info, source.url);
    }
    if reply.content == state::APOLOGY {
        anyhow::bail!("backend request failed; run with --debug for details");
    }
    Ok(())
}

async fn upload(backend: &BackendClient, path: &Path) -> Result<()> {
    let file = FileUpload::from_path(path)?;
    if upload::major_type(&file.mime) != "image" {
        anyhow::bail!("{} is not an image ({})", path.display(), file.mime);
    }
    let url = backend.upload_image(file.base64()).await?;
    println!("{url}");
    Ok(())
}
