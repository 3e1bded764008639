//! Inspect signature layers and the DSS of a PDF
//!
//! Prints a JSON report with every signature and document timestamp layer
//! and the contents of the document security store.
//!
//! Usage:
//!   cargo run --release --bin inspect_ltv -- signed.pdf
//!   cargo run --release --bin inspect_ltv -- signed.pdf --compact

use pdf_pades::container::IncrementalDocument;
use pdf_pades::signatures::SignatureInspector;
use std::path::PathBuf;
use std::process::ExitCode;

struct InspectConfig {
    path: Option<PathBuf>,
    compact: bool,
}

impl InspectConfig {
    fn from_args() -> Self {
        let mut path = None;
        let mut compact = false;
        for arg in std::env::args().skip(1) {
            match arg.as_str() {
                "--compact" | "-c" => compact = true,
                _ => path = Some(PathBuf::from(arg)),
            }
        }
        Self { path, compact }
    }
}

fn run(config: &InspectConfig) -> Result<String, Box<dyn std::error::Error>> {
    let path = config
        .path
        .as_ref()
        .ok_or("usage: inspect_ltv <file.pdf> [--compact]")?;
    let bytes = std::fs::read(path)?;
    log::info!("Inspecting {} ({} bytes)", path.display(), bytes.len());

    let document = IncrementalDocument::open(bytes)?;
    let report = SignatureInspector::new().inspect(&document)?;
    let json = if config.compact {
        serde_json::to_string(&report)?
    } else {
        serde_json::to_string_pretty(&report)?
    };
    Ok(json)
}

fn main() -> ExitCode {
    env_logger::init();

    match run(&InspectConfig::from_args()) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        },
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        },
    }
}
