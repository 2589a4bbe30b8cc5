// CLI entry point for the Colonia game server.
//
// Loads a scenario (or the built-in sample world), starts the server and
// runs until the process is killed. Logging goes through `tracing`; set
// `RUST_LOG` (e.g. `RUST_LOG=colonia_server=debug`) to adjust verbosity.
//
// Usage:
//   colonia-server [OPTIONS]
//     --port <PORT>           Listen port (default: 7878)
//     --name <NAME>           Session name (default: colonia)
//     --scenario <FILE>       Scenario JSON (default: built-in sample)
//     --max-players <N>       Max connected players (default: 8)

use std::path::PathBuf;
use std::sync::Arc;

use colonia_server::server::{ServerConfig, start_server};
use colonia_sim::scenario::Scenario;
use colonia_sim::world::World;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

struct Args {
    config: ServerConfig,
    scenario: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = parse_args();

    let scenario = match &args.scenario {
        Some(path) => match Scenario::load(path) {
            Ok(scenario) => scenario,
            Err(e) => {
                error!(path = %path.display(), error = %e, "failed to load scenario");
                std::process::exit(1);
            }
        },
        None => Scenario::sample(),
    };
    let world = match World::from_scenario(scenario) {
        Ok(world) => Arc::new(world),
        Err(e) => {
            error!(error = %e, "invalid scenario");
            std::process::exit(1);
        }
    };

    let (_handle, addr) = match start_server(args.config, world) {
        Ok(result) => result,
        Err(e) => {
            error!(error = %e, "failed to start server");
            std::process::exit(1);
        }
    };

    info!(%addr, "press Ctrl+C to stop");

    // The process exits on SIGINT/SIGTERM; server threads go with it.
    loop {
        std::thread::park();
    }
}

/// Parse command-line arguments. Uses simple `std::env::args()` matching.
fn parse_args() -> Args {
    let mut args = Args {
        config: ServerConfig::default(),
        scenario: None,
    };
    let argv: Vec<String> = std::env::args().collect();
    let mut i = 1;

    while i < argv.len() {
        match argv[i].as_str() {
            "--port" => {
                i += 1;
                args.config.port = argv.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                    eprintln!("--port requires a valid port number");
                    std::process::exit(1);
                });
            }
            "--name" => {
                i += 1;
                args.config.session_name = argv.get(i).cloned().unwrap_or_else(|| {
                    eprintln!("--name requires a value");
                    std::process::exit(1);
                });
            }
            "--scenario" => {
                i += 1;
                args.scenario = Some(argv.get(i).map(PathBuf::from).unwrap_or_else(|| {
                    eprintln!("--scenario requires a file path");
                    std::process::exit(1);
                }));
            }
            "--max-players" => {
                i += 1;
                args.config.max_players =
                    argv.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                        eprintln!("--max-players requires a valid number");
                        std::process::exit(1);
                    });
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    args
}

fn print_usage() {
    println!("Usage: colonia-server [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --port <PORT>           Listen port (default: 7878)");
    println!("  --name <NAME>           Session name (default: colonia)");
    println!("  --scenario <FILE>       Scenario JSON (default: built-in sample)");
    println!("  --max-players <N>       Max connected players (default: 8)");
    println!("  --help, -h              Show this help");
}
