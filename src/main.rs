//! The embercache server binary.
//!
//! Binds the listener, wires the cache to its purge worker, and runs until
//! Ctrl-C.

use embercache::cache::{Cache, CacheConfig, PurgeWorker};
use embercache::server::{Server, ServerConfig};
use tokio::signal;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Server configuration assembled from the command line.
struct Config {
    port: u16,
    verbosity: u8,
    delay: bool,
    fast: bool,
    max_records: Option<usize>,
    max_size_mb: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: embercache::DEFAULT_PORT,
            verbosity: 0,
            delay: false,
            fast: false,
            max_records: None,
            max_size_mb: None,
        }
    }
}

impl Config {
    /// Parse configuration from command-line arguments.
    fn from_args() -> Self {
        let mut config = Config::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "-p" => {
                    config.port = take_value(&args, &mut i, "-p").parse().unwrap_or_else(|_| {
                        eprintln!("Error: invalid port number");
                        std::process::exit(1);
                    });
                }
                "--max-records" => {
                    config.max_records =
                        Some(take_value(&args, &mut i, "--max-records").parse().unwrap_or_else(
                            |_| {
                                eprintln!("Error: invalid record limit");
                                std::process::exit(1);
                            },
                        ));
                }
                "--max-size-mb" => {
                    config.max_size_mb =
                        Some(take_value(&args, &mut i, "--max-size-mb").parse().unwrap_or_else(
                            |_| {
                                eprintln!("Error: invalid size limit");
                                std::process::exit(1);
                            },
                        ));
                }
                "-v" => config.verbosity = 1,
                "-vv" => config.verbosity = 2,
                "-vvv" => config.verbosity = 3,
                "--delay" => config.delay = true,
                "--fast" => config.fast = true,
                "-h" | "--help" => {
                    print_help();
                    std::process::exit(1);
                }
                other => {
                    eprintln!("Unknown argument: {}", other);
                    print_help();
                    std::process::exit(1);
                }
            }
            i += 1;
        }

        config
    }

    fn log_level(&self) -> Level {
        match self.verbosity {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }

    fn cache_config(&self) -> CacheConfig {
        match (self.max_records, self.max_size_mb) {
            (Some(max), _) => CacheConfig::ByMaxRecords(max),
            (None, Some(mb)) => CacheConfig::ByMaxSizeMb(mb),
            (None, None) => CacheConfig::Unbounded,
        }
    }
}

fn take_value<'a>(args: &'a [String], i: &mut usize, flag: &str) -> &'a str {
    *i += 1;
    match args.get(*i) {
        Some(value) => value,
        None => {
            eprintln!("Error: {} requires a value", flag);
            std::process::exit(1);
        }
    }
}

fn print_help() {
    println!(
        r#"embercache - a memcached-wire-compatible in-memory cache server

USAGE:
    embercache [OPTIONS]

OPTIONS:
    -p <PORT>              Port to listen on (default: 11211)
    -v, -vv, -vvv          Log verbosity (info, debug, trace)
    --delay                Leave Nagle's algorithm enabled
    --fast                 Reply ERROR to every query without parsing
    --max-records <N>      Evict once the cache holds N records
    --max-size-mb <N>      Evict once resident memory reaches N megabytes
    -h, --help             Print this help message

CONNECTING:
    Any memcached client works:
    $ printf 'set greeting 0 0 5\r\nhello\r\nget greeting\r\n' | nc localhost 11211
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_args();

    FmtSubscriber::builder()
        .with_max_level(config.log_level())
        .with_target(false)
        .init();

    let cache = Cache::new(config.cache_config());
    let _purger = PurgeWorker::start(cache.clone());

    let server_config = ServerConfig {
        host: "0.0.0.0".to_string(),
        port: config.port,
        delay: config.delay,
        fast: config.fast,
    };
    let server = Server::start(server_config, cache).await?;
    info!(addr = %server.local_addr(), version = embercache::VERSION, "embercache running");

    signal::ctrl_c().await?;
    info!("shutdown signal received, stopping server");
    server.stop().await;

    Ok(())
}
