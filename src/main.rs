use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use sshx::config::{DEFAULT_CONFIG_PATH, expand_home, load_config, parse_duration};
use sshx::logging::init_logging;
use sshx::{Overrides, Session};
use std::process::ExitCode;
use std::time::Duration;
use tracing::error;

#[derive(Parser, Debug)]
#[command(
    name = "sshx",
    about = "Log in to a server over ssh with automatic password entry, expect rules and keepalive",
    after_help = "Examples:\n  sshx [OPTIONS] user@host    log in by user and host\n  sshx [OPTIONS] alias        log in by an alias from the config file"
)]
struct Args {
    /// Port to connect to on the remote host
    #[arg(short, long)]
    port: Option<u16>,

    /// File to append logs to, default stderr
    #[arg(short, long)]
    log: Option<String>,

    /// YAML config file [default: ~/.ssh/sshx.yaml]
    #[arg(short, long, env = "SSHX_CONFIG")]
    config: Option<String>,

    /// Send the idle string after this long without traffic (e.g. 30s, 2m)
    #[arg(short, long = "idle-time", value_parser = parse_duration)]
    idle_time: Option<Duration>,

    /// String to send when the session is idle
    #[arg(short = 's', long = "idle-string")]
    idle_string: Option<String>,

    /// Print all aliases
    #[arg(short = 'a', long = "alias")]
    print_aliases: bool,

    /// Print version
    #[arg(short = 'v', long = "version")]
    print_version: bool,

    /// `user@host` or an alias from the config file
    destination: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if args.print_version {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    let log_file = args.log.as_deref().map(expand_home);
    if let Err(e) = init_logging(log_file.as_deref()) {
        eprintln!("{e:#}");
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<ExitCode> {
    let config_path = args.config.as_deref().unwrap_or(DEFAULT_CONFIG_PATH);
    let config = load_config(expand_home(config_path))
        .with_context(|| format!("Failed to load config file: {config_path}"))?;

    if args.print_aliases {
        let lines = config.alias_lines();
        if lines.is_empty() {
            println!("no alias configured");
        } else {
            println!("{}", lines.join("\n"));
        }
        return Ok(ExitCode::SUCCESS);
    }

    let Some(destination) = args.destination.as_deref() else {
        eprintln!("{}", Args::command().render_help());
        return Ok(ExitCode::FAILURE);
    };

    let mut server = match config.find_server(destination) {
        Ok(server) => server,
        Err(e) => {
            eprintln!("{e:#}\n\n{}", Args::command().render_help());
            return Ok(ExitCode::FAILURE);
        }
    };
    // Command line values take precedence over the config file.
    server.apply_overrides(&Overrides {
        port: args.port,
        idle_time: args.idle_time,
        idle_string: args.idle_string,
    });

    Session::new(server).run().await?;
    Ok(ExitCode::SUCCESS)
}
