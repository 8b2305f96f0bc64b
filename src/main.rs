mod resolve;
mod supervisor;
mod watch;

use std::time::Duration;

use clap::{CommandFactory, Parser};

use supervisor::{SessionConfig, Supervisor};
use watch::fsnotify::NotifyWatcher;
use watch::poll::PollWatcher;

const DEFAULT_INTERVAL_MS: u64 = 250;

/// Supervises one executable: launches it with inherited standard
/// streams, watches its file on disk, and relaunches it when the file
/// changes (or, with --autorestart, whenever it exits).
#[derive(Parser, Debug)]
#[command(name = "autoreloader", version, about)]
struct Cli {
    /// Relaunch the executable whenever it exits, regardless of exit code
    #[arg(long)]
    autorestart: bool,

    /// Poll the file on an interval instead of using kernel notification
    #[arg(long)]
    poll: bool,

    /// Debounce and poll interval in milliseconds
    #[arg(long, value_name = "MS", default_value_t = DEFAULT_INTERVAL_MS)]
    interval: u64,

    /// Executable to supervise, resolved via PATH
    #[arg(value_name = "COMMAND")]
    command: Option<String>,

    /// Arguments passed through to the executable
    #[arg(value_name = "ARGS", trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(false)
        .init();

    // An empty command is a usage error, not something to supervise.
    let Some(command) = cli.command.clone() else {
        let _ = Cli::command().print_help();
        std::process::exit(1);
    };

    let code = match run(cli, &command).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e}");
            1
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli, command: &str) -> Result<i32, Box<dyn std::error::Error>> {
    let program = resolve::executable(command)?;
    let interval = Duration::from_millis(match cli.interval {
        0 => DEFAULT_INTERVAL_MS,
        ms => ms,
    });

    let (mut watcher, signals) = if cli.poll {
        PollWatcher::create(interval)
    } else {
        NotifyWatcher::create()?
    };
    watcher.watch(&program)?;

    let session = Supervisor::new(
        SessionConfig {
            program,
            args: cli.args,
            autorestart: cli.autorestart,
            debounce: interval,
        },
        watcher,
        signals,
    );
    Ok(session.run().await?)
}
