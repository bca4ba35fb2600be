use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

mod config;
mod control;
mod error;
mod renderer;
mod session;
mod sources;

use config::{Config, Overrides};
use error::{print_error_and_exit, CliError};
use outboard_core::Viewer;
use session::Session;

#[derive(Parser)]
#[command(name = "mpl_outboard")]
#[command(about = "MPL outboard plot viewer")]
#[command(version)]
#[command(long_about = "
Receives plot records from a producer's standard output (or a shared
socket), keeps a navigable history of them, and can re-run the producer
with new axis limits when a region is zoomed.

Examples:
  sddsplot -col=x,y data.sdds -dev=motif | mpl_outboard --keep 10
  mpl_outboard --input plots.mpl --control /tmp/mpl.ctl
  mpl_outboard --share beam --command 'sddsplot -col=x,y data.sdds' --replot-on-zoom
  mpl_outboard config --example > mpl_outboard.toml
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Producer command line, needed for replot
    #[arg(long = "command", value_name = "TEXT")]
    pub producer: Option<String>,

    /// Retain only the most recent N plots, showing each as it arrives
    #[arg(long)]
    pub keep: Option<usize>,

    /// Show each plot as soon as it arrives
    #[arg(long)]
    pub movie: bool,

    /// Movie frame interval in seconds (0-60)
    #[arg(long)]
    pub interval: Option<f64>,

    /// Share one viewer between producers using this name
    #[arg(long)]
    pub share: Option<String>,

    /// Exit after this many hours (0-8760, 0 disables)
    #[arg(long)]
    pub timeout_hours: Option<f64>,

    /// Read the plot stream from a file instead of stdin
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Unix socket accepting navigation commands
    #[arg(long)]
    pub control: Option<PathBuf>,

    /// Byte order of the plot stream (little, big, native)
    #[arg(long)]
    pub byte_order: Option<String>,

    /// Viewport width in pixels
    #[arg(long)]
    pub width: Option<u32>,

    /// Viewport height in pixels
    #[arg(long)]
    pub height: Option<u32>,

    /// Re-run the producer with new limits when zooming
    #[arg(long)]
    pub replot_on_zoom: bool,

    /// Verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Configuration management
    Config {
        /// Print an example configuration file
        #[arg(long)]
        example: bool,

        /// Write the effective configuration to a file
        #[arg(long)]
        save: Option<PathBuf>,
    },
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            command: self.producer.clone(),
            keep: self.keep,
            movie: self.movie,
            interval: self.interval,
            share: self.share.clone(),
            timeout_hours: self.timeout_hours,
            input: self.input.clone(),
            control: self.control.clone(),
            byte_order: self.byte_order.clone(),
            width: self.width,
            height: self.height,
            replot_on_zoom: self.replot_on_zoom,
        }
    }
}

fn setup_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        "warn"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let mut config = Config::load(cli.config.as_deref())?;
    config.apply(cli.overrides());
    if let Err(e) = config.validate() {
        print_error_and_exit(&e);
    }

    if let Some(Commands::Config { example, save }) = &cli.command {
        if *example {
            match Config::example_toml() {
                Ok(text) => print!("{}", text),
                Err(e) => print_error_and_exit(&e),
            }
        }
        if let Some(path) = save {
            config.save_to_file(path)?;
            log::info!("Configuration written to {}", path.display());
        }
        return Ok(());
    }

    if let Some(input) = &config.stream.input {
        if !input.exists() {
            print_error_and_exit(&CliError::file_not_found(input.clone()));
        }
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    let result = runtime.block_on(run(config));
    // stdin reads run on blocking threads that never return before EOF
    runtime.shutdown_timeout(Duration::from_millis(100));

    match result {
        Ok(()) => Ok(()),
        Err(e) => match e.downcast::<CliError>() {
            Ok(cli_error) => print_error_and_exit(&cli_error),
            Err(e) => Err(e),
        },
    }
}

async fn run(config: Config) -> Result<()> {
    let options = config.to_viewer_options()?;
    let chunk = config.stream.read_chunk;
    let mut linger = config.session.control.is_some();

    #[cfg(unix)]
    let mut _sockets = Vec::new();

    #[cfg(unix)]
    let producers = match &config.session.share {
        Some(name) => match sources::claim_share(name).await? {
            sources::ShareRole::Client(stream) => {
                sources::forward_stdin(stream)
                    .await
                    .with_context(|| format!("Failed to forward stdin to shared viewer '{}'", name))?;
                return Ok(());
            }
            sources::ShareRole::Server(listener, guard) => {
                linger = true;
                _sockets.push(guard);
                Some(listener)
            }
        },
        None => None,
    };

    #[cfg(not(unix))]
    if config.session.share.is_some() || config.session.control.is_some() {
        return Err(CliError::config("--share and --control need unix domain sockets").into());
    }

    let viewer = Viewer::new(options).context("Failed to create viewer")?;
    let session = Session::new(viewer, config.session_timeout(), linger);
    let events = session.sender();

    #[cfg(unix)]
    {
        if let Some(listener) = producers {
            tokio::spawn(sources::accept_producers(listener, chunk, events.clone()));
        }
        if let Some(path) = &config.session.control {
            let (listener, guard) = sources::bind(path)
                .with_context(|| format!("Failed to bind control socket {}", path.display()))?;
            log::info!("Control socket listening on {}", guard.path().display());
            _sockets.push(guard);
            tokio::spawn(sources::serve_control(listener, events.clone()));
        }
    }

    match &config.stream.input {
        Some(path) => sources::spawn_file(path, chunk, events.clone())
            .await
            .with_context(|| format!("Failed to open plot stream {}", path.display()))?,
        None => sources::spawn_stdin(chunk, events.clone()),
    }
    drop(events);

    let viewer = session.run().await?;
    log::debug!(
        "session ended with {} record(s) retained",
        viewer.display_list().len()
    );
    Ok(())
}
