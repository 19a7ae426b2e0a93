//! vision-cli
//!
//! JSON-in/JSON-out driver for the preprocessing and post-processing
//! operations. Requests are read from a file or stdin; responses and errors
//! are written to stdout as JSON.
//!
//! # Usage
//!
//! ```bash
//! vision-cli run nms --input detections.json
//! echo '{"boxes": [[0,0,10,10]], "from": "xyxy", "to": "cxcywh"}' | vision-cli run convert-boxes
//! vision-cli batch --input frames.json --concurrency 8
//! ```

mod ops;

use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::info;
use vision_utils::api::{self, ErrorResponse, PixelDataRequest};
use vision_utils::core::{BatchPolicy, DEFAULT_BATCH_CONCURRENCY};
use vision_utils::{VisionError, VisionResult};

use crate::ops::Operation;

#[derive(Parser)]
#[command(name = "vision-cli")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Tensor preprocessing and box post-processing from JSON requests", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info", env = "VISION_LOG_LEVEL")]
    log_level: String,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single operation on a JSON request
    Run {
        /// Operation to run
        #[arg(value_enum)]
        operation: Operation,

        /// Request file; reads stdin when omitted
        #[arg(long, short)]
        input: Option<PathBuf>,
    },
    /// Run the pixel-data pipeline over a JSON array of frames
    Batch {
        /// Request file; reads stdin when omitted
        #[arg(long, short)]
        input: Option<PathBuf>,

        /// Maximum number of frames processed at once
        #[arg(long, default_value_t = DEFAULT_BATCH_CONCURRENCY, env = "VISION_CONCURRENCY")]
        concurrency: usize,
    },
    /// List the operations accepted by `run`
    Operations,
}

fn read_input(path: Option<&Path>) -> VisionResult<String> {
    let mut input = String::new();
    let read = match path {
        Some(path) => std::fs::File::open(path).and_then(|mut f| f.read_to_string(&mut input)),
        None => std::io::stdin().read_to_string(&mut input),
    };
    read.map_err(|e| VisionError::invalid_input(format!("failed to read request: {e}")))?;
    Ok(input)
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<(), serde_json::Error> {
    let text = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{text}");
    Ok(())
}

fn execute(command: Commands, pretty: bool) -> VisionResult<()> {
    match command {
        Commands::Run { operation, input } => {
            let body = read_input(input.as_deref())?;
            let start = Instant::now();
            let response = ops::dispatch(operation, &body)?;
            info!(
                "{:?} completed in {:.2}ms",
                operation,
                start.elapsed().as_secs_f64() * 1000.0
            );
            print_json(&response, pretty)
                .map_err(|e| VisionError::invalid_input(format!("failed to write response: {e}")))
        }
        Commands::Batch { input, concurrency } => {
            let body = read_input(input.as_deref())?;
            let items: Vec<PixelDataRequest> = ops::parse(&body)?;
            info!("Processing {} frames with concurrency {}", items.len(), concurrency);
            let policy = BatchPolicy::new().with_concurrency(concurrency);
            let result = api::batch_get_pixel_data(&items, &policy, None)?;
            print_json(&result, pretty)
                .map_err(|e| VisionError::invalid_input(format!("failed to write response: {e}")))
        }
        Commands::Operations => {
            for operation in Operation::value_variants() {
                if let Some(name) = operation.to_possible_value() {
                    println!("{}", name.get_name());
                }
            }
            Ok(())
        }
    }
}

fn main() {
    let cli = Cli::parse();
    vision_utils::utils::init_tracing_with(&cli.log_level);

    if let Err(err) = execute(cli.command, cli.pretty) {
        let response = ErrorResponse::from(&err);
        if print_json(&response, cli.pretty).is_err() {
            eprintln!("Error: {}", response.message);
        }
        std::process::exit(1);
    }
}
