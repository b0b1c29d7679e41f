mod logging;
mod serve;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use pactbroker_core::{BrokerConfig, PactMetadata};

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Pact broker: contract publication, verification results and deployment tracking.
#[derive(Parser)]
#[command(
    name = "pactbroker",
    version,
    about = "Pact broker: contract publication, verification results and deployment tracking"
)]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the broker HTTP API server
    Serve {
        /// Port to listen on
        #[arg(long, default_value = "9292")]
        port: u16,
        /// Path to a TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Persist broker state to this JSON file (overrides the config file)
        #[arg(long)]
        data_file: Option<PathBuf>,
        /// Path to TLS certificate PEM file (requires --tls-key)
        #[arg(long)]
        tls_cert: Option<PathBuf>,
        /// Path to TLS private key PEM file (requires --tls-cert)
        #[arg(long)]
        tls_key: Option<PathBuf>,
    },

    /// Encode key=value pairs as a pact metadata token
    EncodeMetadata {
        /// Entries such as consumer_version_number=2 or wip=true
        #[arg(required = true)]
        pairs: Vec<String>,
    },

    /// Decode a pact metadata token
    DecodeMetadata {
        /// The token from a verification-results URL
        token: String,
    },

    /// Load and validate a configuration file
    CheckConfig {
        /// Path to the TOML configuration file
        path: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            port,
            config,
            data_file,
            tls_cert,
            tls_key,
        } => {
            // Validate TLS flags: both must be provided or neither
            if tls_cert.is_some() != tls_key.is_some() {
                eprintln!("error: --tls-cert and --tls-key must both be provided");
                process::exit(1);
            }
            logging::init(&cli.log_level);
            let config = match load_config(config.as_deref()) {
                Ok(mut config) => {
                    if data_file.is_some() {
                        config.data_file = data_file;
                    }
                    config
                }
                Err(e) => {
                    eprintln!("error: {}", e);
                    process::exit(1);
                }
            };
            let rt = match tokio::runtime::Runtime::new() {
                Ok(rt) => rt,
                Err(e) => {
                    eprintln!("error: failed to create tokio runtime: {}", e);
                    process::exit(1);
                }
            };
            let options = serve::ServeOptions {
                port,
                config,
                tls_cert,
                tls_key,
            };
            if let Err(e) = rt.block_on(serve::start_server(options)) {
                eprintln!("Server error: {}", e);
                process::exit(1);
            }
        }
        Commands::EncodeMetadata { pairs } => cmd_encode_metadata(&pairs, cli.output),
        Commands::DecodeMetadata { token } => cmd_decode_metadata(&token, cli.output),
        Commands::CheckConfig { path } => cmd_check_config(&path, cli.output),
    }
}

/// Configuration from an optional file, then `PACTBROKER_*` overrides.
fn load_config(path: Option<&Path>) -> Result<BrokerConfig, pactbroker_core::ConfigError> {
    let config = match path {
        Some(path) => BrokerConfig::load(path)?,
        None => BrokerConfig::default(),
    };
    config.with_env_overrides()
}

fn cmd_encode_metadata(pairs: &[String], output: OutputFormat) {
    let mut metadata = PactMetadata::new();
    for pair in pairs {
        match pair.split_once('=') {
            Some((key, value)) if !key.is_empty() => metadata.insert(key, value),
            _ => {
                eprintln!("error: expected key=value, got '{}'", pair);
                process::exit(1);
            }
        }
    }
    let token = metadata.encode();
    match output {
        OutputFormat::Text => println!("{}", token),
        OutputFormat::Json => println!("{}", serde_json::json!({ "token": token })),
    }
}

fn cmd_decode_metadata(token: &str, output: OutputFormat) {
    let metadata = PactMetadata::decode(token);
    match output {
        OutputFormat::Text => {
            for (key, value) in metadata.iter() {
                println!("{}={}", key, value);
            }
        }
        OutputFormat::Json => {
            let map: serde_json::Map<String, serde_json::Value> = metadata
                .iter()
                .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
                .collect();
            println!("{}", serde_json::Value::Object(map));
        }
    }
}

fn cmd_check_config(path: &Path, output: OutputFormat) {
    match BrokerConfig::load(path) {
        Ok(config) => match output {
            OutputFormat::Text => {
                println!("valid");
                println!(
                    "base_url: {}",
                    config.base_url().unwrap_or("(from Host header)")
                );
                println!("webhooks: {}", config.webhooks.len());
            }
            OutputFormat::Json => {
                let summary = serde_json::json!({
                    "valid": true,
                    "base_url": config.base_url(),
                    "webhooks": config.webhooks.len(),
                });
                println!("{}", summary);
            }
        },
        Err(e) => {
            match output {
                OutputFormat::Text => eprintln!("invalid: {}", e),
                OutputFormat::Json => {
                    println!("{}", serde_json::json!({ "valid": false, "error": e.to_string() }))
                }
            }
            process::exit(1);
        }
    }
}
