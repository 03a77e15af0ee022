mod app;
mod cache;
mod commands;
mod config;
mod event;
mod query;
mod school;
mod server;
mod storage;
mod ui;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "rollcall=info,tower_http=info";

#[derive(Parser, Debug)]
#[command(name = "rollcall")]
#[command(about = "School attendance administration: API proxy and terminal dashboards")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./rollcall.yaml, then $XDG_CONFIG_HOME/rollcall/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Run the API proxy in front of the school backend
  Serve {
    /// Address to listen on, e.g. 0.0.0.0:3000
    #[arg(short, long)]
    bind: Option<String>,
  },
  /// Open the terminal dashboards against a running proxy
  Tui {
    /// Session token, sent as the `token` cookie
    #[arg(short, long, env = "ROLLCALL_TOKEN")]
    token: Option<String>,
  },
}

fn env_filter() -> EnvFilter {
  EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let mut config = config::Config::load(args.config.as_deref())?;

  match args.command {
    Command::Serve { bind } => {
      tracing_subscriber::fmt().with_env_filter(env_filter()).init();

      if let Some(bind) = bind {
        config.server.bind = bind;
      }
      server::serve(config).await
    }
    Command::Tui { token } => {
      // The terminal belongs to the UI, so logs go to a file
      let log_dir = dirs::data_dir()
        .ok_or_else(|| eyre!("Could not determine the data directory for logs"))?
        .join("rollcall");
      let appender = tracing_appender::rolling::daily(log_dir, "rollcall.log");
      let (writer, _guard) = tracing_appender::non_blocking(appender);
      tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(writer)
        .with_ansi(false)
        .init();

      let mut app = app::App::new(&config, token)?;
      app.run().await
    }
  }
}
