use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use dotenvy::dotenv;
use tracing::info;
use url::Url;

mod batch;
mod config;
mod credits;
mod llm;
mod prompt;
mod state;
mod utils;

use batch::runner::BatchRunner;
use batch::types::{AspectRatio, BatchRequest, ReferenceImage, ReferenceManifest, ReferenceSet};
use config::CONFIG;
use credits::{PaymentProvider, SimulatedCheckout};
use llm::gemini::GeminiBackend;
use llm::media::{detect_mime_type, download_reference};
use prompt::builder::build_prompt;
use state::AppState;
use utils::logging::init_logging;

fn usage() -> &'static str {
    "Usage:\n  headshot_studio run-batch --file <request.json> --out <dir> [--aspect <ratio>]\n  headshot_studio compile-prompt --file <request.json> [--index <n>] [--aspect <ratio>]"
}

#[derive(Debug)]
enum CliCommand {
    RunBatch {
        file: PathBuf,
        out: PathBuf,
        aspect: Option<AspectRatio>,
    },
    CompilePrompt {
        file: PathBuf,
        index: Option<usize>,
        aspect: Option<AspectRatio>,
    },
}

fn parse_args(args: &[String]) -> Result<CliCommand> {
    let subcommand = args
        .get(1)
        .map(|value| value.as_str())
        .ok_or_else(|| anyhow!("Missing subcommand.\n{}", usage()))?;

    let mut file: Option<PathBuf> = None;
    let mut out: Option<PathBuf> = None;
    let mut index: Option<usize> = None;
    let mut aspect: Option<AspectRatio> = None;

    let mut position = 2;
    while position < args.len() {
        match args[position].as_str() {
            "--file" => {
                position += 1;
                let value = args
                    .get(position)
                    .ok_or_else(|| anyhow!("Missing value for --file"))?;
                file = Some(PathBuf::from(value));
            }
            "--out" => {
                position += 1;
                let value = args
                    .get(position)
                    .ok_or_else(|| anyhow!("Missing value for --out"))?;
                out = Some(PathBuf::from(value));
            }
            "--index" => {
                position += 1;
                let value = args
                    .get(position)
                    .ok_or_else(|| anyhow!("Missing value for --index"))?;
                index = Some(
                    value
                        .parse::<usize>()
                        .map_err(|_| anyhow!("Invalid --index value: {value}"))?,
                );
            }
            "--aspect" => {
                position += 1;
                let value = args
                    .get(position)
                    .ok_or_else(|| anyhow!("Missing value for --aspect"))?;
                aspect = Some(
                    AspectRatio::parse(value)
                        .ok_or_else(|| anyhow!("Unsupported aspect ratio: {value}"))?,
                );
            }
            other => {
                return Err(anyhow!("Unknown argument: {other}\n{}", usage()));
            }
        }
        position += 1;
    }

    let file = file.ok_or_else(|| anyhow!("--file is required.\n{}", usage()))?;
    match subcommand {
        "run-batch" => Ok(CliCommand::RunBatch {
            file,
            out: out.unwrap_or_else(|| PathBuf::from("output")),
            aspect,
        }),
        "compile-prompt" => Ok(CliCommand::CompilePrompt {
            file,
            index,
            aspect,
        }),
        other => Err(anyhow!("Unknown subcommand: {other}\n{}", usage())),
    }
}

fn read_request(path: &Path) -> Result<BatchRequest> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read request file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse request file {}", path.display()))
}

/// References may be local paths or HTTP(S) URLs.
async fn load_reference_source(source: &str) -> Result<ReferenceImage> {
    let is_remote = Url::parse(source)
        .map(|url| matches!(url.scheme(), "http" | "https"))
        .unwrap_or(false);

    let bytes = if is_remote {
        download_reference(source)
            .await
            .ok_or_else(|| anyhow!("Failed to download reference image from {source}"))?
    } else {
        tokio::fs::read(source)
            .await
            .with_context(|| format!("Failed to read reference image {source}"))?
    };

    let mime_type = detect_mime_type(&bytes).unwrap_or_else(|| "image/jpeg".to_string());
    Ok(ReferenceImage::new(bytes, mime_type))
}

async fn load_references(manifest: &ReferenceManifest) -> Result<ReferenceSet> {
    let mut refs = ReferenceSet::default();
    if let Some(source) = &manifest.main {
        refs.main = Some(load_reference_source(source).await?);
    }
    if let Some(source) = &manifest.side_left {
        refs.side_left = Some(load_reference_source(source).await?);
    }
    if let Some(source) = &manifest.side_right {
        refs.side_right = Some(load_reference_source(source).await?);
    }
    if let Some(source) = &manifest.full_body {
        refs.full_body = Some(load_reference_source(source).await?);
    }
    if let Some(source) = &manifest.background {
        refs.background = Some(load_reference_source(source).await?);
    }
    Ok(refs)
}

async fn run_batch_command(file: &Path, out: &Path, aspect: Option<AspectRatio>) -> Result<()> {
    let mut request = read_request(file)?;
    if let Some(ratio) = aspect {
        request.config.aspect_ratio = ratio;
    }
    if request.looks.is_empty() {
        return Err(anyhow!("The request contains no looks"));
    }

    let refs = load_references(&request.references).await?;
    refs.validate().map_err(|err| anyhow!(err.to_string()))?;

    let state = AppState::new();
    let granted = SimulatedCheckout.purchase(request.total_shots());
    state.credits.lock().grant(granted);
    info!(
        "Starting batch: {} look(s), {} shot(s), {} credit(s) available",
        request.looks.len(),
        request.total_shots(),
        state.credits.lock().balance()
    );

    let runner = BatchRunner::new(
        GeminiBackend::from_config(),
        state.credits.clone(),
        Duration::from_millis(CONFIG.shot_pause_ms),
    );
    let images = runner
        .run_batch(&request.looks, &request.config, &refs)
        .await?;

    std::fs::create_dir_all(out)
        .with_context(|| format!("Failed to create output directory {}", out.display()))?;
    for image in &images {
        let path = out.join(format!("{}.png", image.id));
        std::fs::write(&path, &image.bytes)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!(
            "Wrote {} ({}, refined={})",
            path.display(),
            image.display_name,
            image.was_refined
        );
    }
    println!("Generated {} image(s) into {}", images.len(), out.display());
    Ok(())
}

/// Prints the compiled prompt for every shot (or one global index) without
/// touching the network. Debugging aid for prompt regressions.
fn compile_prompt_command(
    file: &Path,
    only_index: Option<usize>,
    aspect: Option<AspectRatio>,
) -> Result<()> {
    let mut request = read_request(file)?;
    if let Some(ratio) = aspect {
        request.config.aspect_ratio = ratio;
    }
    let mut global_index = 0usize;
    for look in &request.looks {
        let config = batch::types::merged_config(&request.config, look);
        for unit in 0..look.image_count {
            if only_index.is_none() || only_index == Some(global_index) {
                println!(
                    "--- look '{}' shot {} (global index {}) ---",
                    look.name,
                    unit + 1,
                    global_index
                );
                println!("{}\n", build_prompt(&config.scene, &config, global_index));
            }
            global_index += 1;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let args: Vec<String> = env::args().collect();

    match parse_args(&args)? {
        CliCommand::CompilePrompt {
            file,
            index,
            aspect,
        } => compile_prompt_command(&file, index, aspect),
        CliCommand::RunBatch { file, out, aspect } => {
            let _logging_guards = init_logging();
            run_batch_command(&file, &out, aspect).await
        }
    }
}
