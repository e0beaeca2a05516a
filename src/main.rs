use burrow::config::{Config, DEFAULT_CONFIG};
use burrow::logging::{LogSink, subscriber};
use burrow::server::bootstrap::bootstrap;
use clap::{ArgAction, Parser};
use std::path::PathBuf;
use tracing::Level;

#[derive(Debug, Parser)]
#[command(name = "burrow", version, about = "A small gopher daemon")]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// Detach from the terminal
    #[arg(short, long)]
    daemon: bool,

    /// More logging, repeat for more
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let args = Args::parse();

    let level = match args.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    // The error log is named in the configuration, so loading it logs to the terminal.
    let loaded = tracing::subscriber::with_default(subscriber(level, LogSink::Terminal), || {
        Config::load(&args.config)
    });
    let cfg = match loaded {
        Ok(cfg) => cfg,
        Err(e) => fail(level, e),
    };

    let sink = match LogSink::open(&cfg.error_log) {
        Ok(sink) => sink,
        Err(e) => fail(
            level,
            anyhow::Error::new(e).context(format!("opening {}", cfg.error_log.display())),
        ),
    };
    let keep_stdio = sink.is_terminal();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber(level, sink)) {
        fail(level, e.into());
    }

    if let Err(e) = run(&args, &cfg, keep_stdio) {
        tracing::error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args, cfg: &Config, keep_stdio: bool) -> anyhow::Result<()> {
    if args.daemon {
        nix::unistd::daemon(true, keep_stdio)?;
        if keep_stdio {
            tracing::debug!("No error_log configured, diagnostics stay on the inherited stdout");
        }
    }

    let mut dispatcher = bootstrap(cfg)?;
    dispatcher.run()?;

    tracing::info!("Shutdown complete");
    Ok(())
}

fn fail(level: Level, e: anyhow::Error) -> ! {
    tracing::subscriber::with_default(subscriber(level, LogSink::Terminal), || {
        tracing::error!("{:#}", e);
    });
    std::process::exit(1);
}
