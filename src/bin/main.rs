use std::error::Error;

use tracing_subscriber::EnvFilter;

use tunnelg::{
    cli::{Cli, Commands, parse_args},
    manager::{StopOutcome, TunnelManager},
    runtime,
};

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let args = parse_args();
    init_logging(&args);

    let manager = TunnelManager::new(runtime::base_dir());

    match args.command {
        Commands::Start {
            name,
            port,
            protocol,
        } => {
            let id = manager.start_tunnel(&name, port, protocol)?;
            println!("Started tunnel '{id}'");
        }
        Commands::Stop { id } => match manager.stop_tunnel(&id)? {
            StopOutcome::Stopped => println!("Stopped tunnel '{id}'"),
            StopOutcome::AlreadyStopped => {
                println!("Tunnel '{id}' was not running; cleaned up its records")
            }
            StopOutcome::NotFound => println!("Tunnel '{id}' not found"),
        },
        Commands::StopAll => {
            let stopped = manager.stop_all();
            println!("Stopped {stopped} tunnels");
        }
        Commands::List { json } => {
            let tunnels = manager.list_tunnels();
            if json {
                println!("{}", serde_json::to_string_pretty(&tunnels)?);
            } else if tunnels.is_empty() {
                println!("No tunnels running");
            } else {
                for tunnel in tunnels {
                    let url = tunnel.public_url.as_deref().unwrap_or("initializing...");
                    println!(
                        "{}  {}://localhost:{}  pid {}  {}",
                        tunnel.id, tunnel.protocol, tunnel.port, tunnel.pid, url
                    );
                }
            }
        }
        Commands::Logs { id, lines } => {
            println!("{}", manager.read_recent_log(&id, lines));
        }
    }

    Ok(())
}

fn init_logging(args: &Cli) {
    let filter = if let Some(level) = args.log_level {
        EnvFilter::new(level.as_str())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
