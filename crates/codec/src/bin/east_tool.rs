//! East codec CLI
//!
//! Command-line utility for moving typed values between the JSON and
//! Beast2 binary encodings, and for validating IR trees against the
//! tooling schema.

use clap::{Parser as ClapParser, Subcommand};
use east_codec::{BinaryCodec, JsonCodec};
use east_runtime::platform::PlatformTable;
use std::path::{Path, PathBuf};
use std::process;

#[derive(ClapParser)]
#[command(name = "east-tool")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "East value tooling - convert between JSON and Beast2", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode a JSON value to Beast2 bytes
    Encode {
        /// Path to the type, in the JSON type schema
        #[arg(long = "type", value_name = "PATH")]
        type_path: PathBuf,

        /// Path to the value, in the JSON value schema
        #[arg(long = "value", value_name = "PATH")]
        value_path: PathBuf,

        /// Output path for the Beast2 bytes (defaults to stdout as hex)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Decode Beast2 bytes to a JSON value
    Decode {
        /// Path to the type, in the JSON type schema
        #[arg(long = "type", value_name = "PATH")]
        type_path: PathBuf,

        /// Path to the Beast2 bytes
        #[arg(long = "input", value_name = "PATH")]
        input_path: PathBuf,
    },

    /// Check an IR tree against the tooling schema
    ValidateIr {
        /// Path to the IR, in the JSON IR schema
        #[arg(value_name = "PATH")]
        input_path: PathBuf,
    },

    /// Print the canonical hash of a type
    HashType {
        /// Path to the type, in the JSON type schema
        #[arg(value_name = "PATH")]
        type_path: PathBuf,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    if let Err(message) = run(cli) {
        eprintln!("error: {}", message);
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), String> {
    match cli.command {
        Commands::Encode {
            type_path,
            value_path,
            output,
        } => {
            let ty = read_type(&type_path)?;
            let value_json = read_json(&value_path)?;
            let platform = PlatformTable::new();
            let value = JsonCodec::new(ty.clone())
                .decode(&value_json, &platform)
                .map_err(|e| e.to_string())?;
            let bytes = BinaryCodec::new(ty)
                .encode(&value)
                .map_err(|e| e.to_string())?;
            match output {
                Some(path) => std::fs::write(&path, &bytes)
                    .map_err(|e| format!("cannot write {}: {}", path.display(), e))?,
                None => println!("{}", hex::encode(&bytes)),
            }
            Ok(())
        }
        Commands::Decode {
            type_path,
            input_path,
        } => {
            let ty = read_type(&type_path)?;
            let bytes = std::fs::read(&input_path)
                .map_err(|e| format!("cannot read {}: {}", input_path.display(), e))?;
            let platform = PlatformTable::new();
            let value = BinaryCodec::new(ty.clone())
                .decode(&bytes, &platform)
                .map_err(|e| e.to_string())?;
            let json = JsonCodec::new(ty)
                .encode(&value)
                .map_err(|e| e.to_string())?;
            println!(
                "{}",
                serde_json::to_string_pretty(&json).map_err(|e| e.to_string())?
            );
            Ok(())
        }
        Commands::ValidateIr { input_path } => {
            let json = read_json(&input_path)?;
            let platform = PlatformTable::new();
            let expr =
                east_codec::expr_from_json(&json, &platform).map_err(|e| e.to_string())?;
            println!("ok: {} node of type {}", expr.kind_name(), expr.ty);
            Ok(())
        }
        Commands::HashType { type_path } => {
            let ty = read_type(&type_path)?;
            println!("{}", hex::encode(ty.canonical_hash()));
            Ok(())
        }
    }
}

fn read_json(path: &Path) -> Result<serde_json::Value, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    serde_json::from_str(&text).map_err(|e| format!("{}: malformed JSON: {}", path.display(), e))
}

fn read_type(path: &Path) -> Result<east_core::types::Type, String> {
    let json = read_json(path)?;
    east_codec::type_from_json(&json).map_err(|e| e.to_string())
}
