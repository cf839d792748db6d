//! Restyle CLI - Boundary interface for the transform pipeline
//!
//! Commands: styles, upload, process
//! Outputs JSON to stdout, logs to stderr
//! Returns 2 on pipeline failure, 1 on usage/configuration failure

use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use restyle_core::{
    upload_input, BlobStore, ConfigError, PipelineError, Settings, StyleCatalog,
    TransformPipeline, TransformRequest,
};

#[derive(Parser)]
#[command(name = "restyle-cli")]
#[command(about = "Restyle CLI - style-guided image transformation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Object storage base URL (overrides STORAGE_BASE_URL / S3_BUCKET)
    #[arg(long, global = true)]
    storage_base_url: Option<String>,

    /// JSON style catalog to use instead of the built-in styles
    #[arg(long, global = true)]
    styles_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List available styles (display name -> key)
    Styles,

    /// Upload a local image to the input area
    Upload {
        /// Image file to upload
        #[arg(short, long)]
        file: PathBuf,

        /// Content type to record (sniffed from the bytes when omitted)
        #[arg(long)]
        content_type: Option<String>,
    },

    /// Restyle a subject image against a background
    Process {
        /// Storage URL of the subject image
        #[arg(long)]
        subject_url: String,

        /// Storage URL of the background image
        #[arg(long)]
        background_url: String,

        /// Style display name or key
        #[arg(short, long)]
        style: String,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_catalog(path: Option<&Path>) -> Result<StyleCatalog, String> {
    match path {
        Some(path) => StyleCatalog::load_from_file(path)
            .map_err(|e| format!("Failed to load styles from {}: {}", path.display(), e)),
        None => Ok(StyleCatalog::builtin()),
    }
}

fn load_settings(cli: &Cli) -> Result<Settings, ConfigError> {
    let storage_override = cli.storage_base_url.clone();
    Settings::from_lookup(|name| match name {
        "STORAGE_BASE_URL" => storage_override
            .clone()
            .or_else(|| std::env::var(name).ok()),
        _ => std::env::var(name).ok(),
    })
}

fn failure(err: &PipelineError) -> ExitCode {
    let output = json!({
        "success": false,
        "error": err.to_string(),
        "kind": err.kind(),
        "status": err.status_code(),
    });
    println!("{}", output);
    match err {
        PipelineError::Configuration(_) => ExitCode::FAILURE,
        _ => ExitCode::from(2),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();

    if let Commands::Styles = cli.command {
        let styles_file = cli
            .styles_file
            .clone()
            .or_else(|| std::env::var_os("STYLES_FILE").map(PathBuf::from));
        return match load_catalog(styles_file.as_deref()) {
            Ok(catalog) => {
                let styles: serde_json::Map<_, _> = catalog
                    .options()
                    .into_iter()
                    .map(|(name, key)| (name.to_string(), json!(key)))
                    .collect();
                println!("{:#}", serde_json::Value::Object(styles));
                ExitCode::SUCCESS
            }
            Err(e) => {
                println!("{}", json!({"success": false, "error": e}));
                ExitCode::FAILURE
            }
        };
    }

    let settings = match load_settings(&cli) {
        Ok(s) => s,
        Err(e) => return failure(&PipelineError::Configuration(e)),
    };

    match cli.command {
        Commands::Styles => ExitCode::SUCCESS,

        Commands::Upload { file, content_type } => {
            let store = match BlobStore::from_settings(&settings) {
                Ok(store) => store,
                Err(e) => return failure(&e.into()),
            };
            let bytes = match tokio::fs::read(&file).await {
                Ok(b) => b,
                Err(e) => {
                    println!(
                        "{}",
                        json!({"success": false, "error": format!("Failed to read {}: {}", file.display(), e)})
                    );
                    return ExitCode::FAILURE;
                }
            };
            let filename = file.file_name().and_then(|n| n.to_str()).unwrap_or_default();

            match upload_input(&store, filename, bytes, content_type.as_deref()).await {
                Ok(url) => {
                    let output = json!({
                        "success": true,
                        "message": "File uploaded successfully",
                        "url": url,
                    });
                    println!("{:#}", output);
                    ExitCode::SUCCESS
                }
                Err(e) => failure(&e),
            }
        }

        Commands::Process { subject_url, background_url, style } => {
            let styles_file = cli.styles_file.clone().or_else(|| settings.styles_file.clone());
            let catalog = match load_catalog(styles_file.as_deref()) {
                Ok(c) => Arc::new(c),
                Err(e) => {
                    println!("{}", json!({"success": false, "error": e}));
                    return ExitCode::FAILURE;
                }
            };

            let pipeline = match TransformPipeline::from_settings(&settings, catalog) {
                Ok(p) => p,
                Err(e) => return failure(&e),
            };
            let request = TransformRequest { subject_url, background_url, style };

            match pipeline.run(&request).await {
                Ok(result) => {
                    let output = json!({
                        "success": true,
                        "result": result,
                    });
                    println!("{:#}", output);
                    ExitCode::SUCCESS
                }
                Err(e) => failure(&e),
            }
        }
    }
}
