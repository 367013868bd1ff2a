mod console;
mod debug_task;
mod debug_types;
mod settings;

use std::env;
use std::fs::OpenOptions;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use mobdbg_config::{default_config_dir, load_config, load_config_file, Config};
use mobdbg_core::logging;
use mobdbg_protocol::DebugAdapter;

use crate::console::{parse_line, ConsoleInput, Printer, HELP};
use crate::debug_task::debug_task;
use crate::debug_types::{DebugCommand, DebugEvent};

const USAGE: &str = "\
usage: mobdbg [options]

  --config <file>    use this config file instead of the global/project lookup
  --project <dir>    project directory (default: current directory)
  --port <port>      listen port (0 picks a free one)
  --json             print events as JSON lines
  -h, --help         show this help";

/// Command-line options.
#[derive(Debug, Default, PartialEq)]
struct Args {
    config: Option<PathBuf>,
    project: Option<PathBuf>,
    port: Option<u16>,
    json: bool,
    help: bool,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Args> {
    let mut parsed = Args::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => parsed.config = Some(value(&arg, args.next())?.into()),
            "--project" => parsed.project = Some(value(&arg, args.next())?.into()),
            "--port" => {
                let port = value(&arg, args.next())?;
                parsed.port = Some(port.parse().with_context(|| format!("invalid port: {port}"))?);
            }
            "--json" => parsed.json = true,
            "-h" | "--help" => parsed.help = true,
            other => bail!("unexpected argument: {other}"),
        }
    }
    Ok(parsed)
}

fn value(flag: &str, next: Option<String>) -> Result<String> {
    next.with_context(|| format!("{flag} needs a value"))
}

fn load_settings(args: &Args, project_dir: &std::path::Path) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => load_config_file(path)
            .with_context(|| format!("failed to load config: {}", path.display()))?,
        None => load_config(&default_config_dir(), Some(project_dir)).unwrap_or_else(|e| {
            eprintln!("mobdbg: config load failed, using defaults: {e}");
            Config::default()
        }),
    };
    if let Some(port) = args.port {
        config.server.port = port;
    }
    Ok(config)
}

/// Send tracing output to a log file so it never mixes with the console.
fn init_logging(config: &Config) -> Result<PathBuf> {
    let log_path = config
        .log
        .file
        .clone()
        .unwrap_or_else(logging::default_log_file_path);
    logging::ensure_log_dir(&log_path)
        .with_context(|| format!("failed to create log directory for {}", log_path.display()))?;
    if let Err(e) = logging::rotate_log_files(
        &log_path,
        logging::DEFAULT_MAX_LOG_SIZE,
        logging::DEFAULT_MAX_LOG_FILES,
    ) {
        eprintln!("mobdbg: log rotation failed: {e}");
    }
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("failed to open log file: {}", log_path.display()))?;

    let filter = EnvFilter::try_from_env("MOBDBG_LOG").unwrap_or_else(|_| {
        EnvFilter::new(logging::filter_directives(
            config.log.level.as_str(),
            config.log.protocol_trace,
        ))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(log_file))
        .with_ansi(false)
        .init();
    Ok(log_path)
}

fn run_debugger(args: Args) -> Result<()> {
    let cwd = env::current_dir().context("failed to read current directory")?;
    let project_dir = match &args.project {
        Some(dir) => cwd.join(dir),
        None => cwd,
    };
    let config = load_settings(&args, &project_dir)?;
    let log_path = init_logging(&config)?;
    info!(log = %log_path.display(), project = %project_dir.display(), "mobdbg starting");

    let resolver = settings::path_resolver(&config, &project_dir);
    let project_root = resolver.project_root().to_path_buf();
    let adapter = DebugAdapter::new(settings::adapter_options(&config), resolver);

    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    let addr = runtime
        .block_on(adapter.start())
        .context("failed to start debug server")?;

    let (cmd_tx, cmd_rx) = tokio::sync::mpsc::channel::<DebugCommand>(32);
    let (evt_tx, evt_rx) = std::sync::mpsc::channel::<DebugEvent>();
    let task = runtime.spawn(debug_task(adapter, cmd_rx, evt_tx.clone()));

    let json = args.json;
    let printer = std::thread::spawn(move || {
        let mut printer = Printer::new(io::stdout(), json);
        for event in evt_rx {
            if let Err(e) = printer.print(&event) {
                error!("stdout closed: {}", e);
                break;
            }
        }
    });

    let _ = evt_tx.send(DebugEvent::info(format!(
        "listening on {addr}, project {} (type `help` for commands)",
        project_root.display()
    )));

    for line in io::stdin().lock().lines() {
        let line = line.context("failed to read console input")?;
        match parse_line(&line, &project_root) {
            Ok(ConsoleInput::Empty) => {}
            Ok(ConsoleInput::Help) => {
                let _ = evt_tx.send(DebugEvent::info(HELP));
            }
            Ok(ConsoleInput::Quit) => break,
            Ok(ConsoleInput::Command(cmd)) => {
                if cmd_tx.blocking_send(cmd).is_err() {
                    warn!("debug task ended early");
                    break;
                }
            }
            Err(message) => {
                let _ = evt_tx.send(DebugEvent::error(message));
            }
        }
    }

    let _ = cmd_tx.blocking_send(DebugCommand::Shutdown);
    if let Err(e) = runtime.block_on(task) {
        error!("debug task failed: {}", e);
    }
    runtime.shutdown_timeout(Duration::from_millis(500));
    drop(evt_tx);
    if printer.join().is_err() {
        error!("printer thread panicked");
    }
    info!("mobdbg stopped");
    Ok(())
}

fn main() {
    let args = match parse_args(env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("mobdbg: {:#}\n\n{}", e, USAGE);
            std::process::exit(2);
        }
    };
    if args.help {
        println!("{USAGE}");
        return;
    }

    if let Err(e) = run_debugger(args) {
        eprintln!("mobdbg: {:#}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Result<Args> {
        parse_args(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn no_arguments_gives_defaults() {
        assert_eq!(args(&[]).unwrap(), Args::default());
    }

    #[test]
    fn all_flags() {
        let parsed = args(&["--config", "c.toml", "--project", "game", "--port", "0", "--json"]).unwrap();
        assert_eq!(parsed.config, Some(PathBuf::from("c.toml")));
        assert_eq!(parsed.project, Some(PathBuf::from("game")));
        assert_eq!(parsed.port, Some(0));
        assert!(parsed.json);
    }

    #[test]
    fn bad_arguments() {
        assert!(args(&["--port"]).is_err());
        assert!(args(&["--port", "99999"]).is_err());
        assert!(args(&["game.lua"]).is_err());
    }

    #[test]
    fn explicit_config_and_port_override() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("mobdbg.toml");
        std::fs::write(&path, "[server]\nport = 9000\n").unwrap();

        let parsed = Args {
            config: Some(path),
            port: Some(9100),
            ..Args::default()
        };
        let config = load_settings(&parsed, dir.path()).unwrap();
        assert_eq!(config.server.port, 9100);
    }

    #[test]
    fn missing_explicit_config_fails() {
        let parsed = Args {
            config: Some(PathBuf::from("/definitely/not/here.toml")),
            ..Args::default()
        };
        assert!(load_settings(&parsed, std::path::Path::new("/")).is_err());
    }
}
