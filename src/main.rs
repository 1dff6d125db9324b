use std::path::PathBuf;
use std::process::ExitCode;

use blue_marshal::{Decoder, MarshalConfig, PassThrough, StringTable};
use clap::Parser;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

/// Decode a blue marshal stream and print it as JSON.
#[derive(Parser, Debug)]
#[command(name = "marshal-dump")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Marshal stream to decode
    path: PathBuf,

    /// Newline-separated string table for STRINGR tokens
    #[arg(short, long)]
    strings: Option<PathBuf>,

    /// Skip checksum verification
    #[arg(long)]
    no_checksum: bool,

    /// Replace shared references with copies of their targets
    #[arg(short, long)]
    materialize: bool,

    /// Dump non-marshal input as raw bytes instead of failing
    #[arg(long)]
    passthrough: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to install log subscriber: {e}");
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let buffer = std::fs::read(&args.path)?;
    info!(path = %args.path.display(), size = buffer.len(), "read stream");

    let config = MarshalConfig {
        verify_checksum: !args.no_checksum,
        ..MarshalConfig::default()
    };
    let mut builder = Decoder::builder().config(config);
    if let Some(path) = &args.strings {
        builder = builder.string_table(StringTable::load_file(path)?);
    }
    if args.passthrough {
        builder = builder.legacy_decoder(PassThrough);
    }
    let decoder = builder.build();

    let graph = decoder.decode(&buffer)?;
    let json = if args.materialize {
        serde_json::to_string_pretty(&graph.materialize()?)?
    } else {
        serde_json::to_string_pretty(&graph)?
    };
    println!("{json}");
    Ok(())
}
