use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use clap::{Parser, Subcommand};
use pagepaint_contracts::{tool, GenerateImageInput, GeneratedImage, MediaType, TargetAnchor};
use pagepaint_engine::compose::BlockComposer;
use pagepaint_engine::config::{PipelineConfig, PublisherKind};
use pagepaint_engine::pipeline::validate_input;
use pagepaint_engine::publish::publisher_for;
use pagepaint_engine::transport::{HttpTransport, ReqwestTransport};
use pagepaint_engine::{NotionClient, Pipeline};
use serde_json::json;
use tracing_subscriber::EnvFilter;

/// 1x1 grey PNG used to exercise the publishing path without a generation call.
const SMOKE_PNG_BASE64: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVR42mNkYAAAAAYAAjCB0C8AAAAASUVORK5CYII=";

#[derive(Debug, Parser)]
#[command(
    name = "pagepaint",
    version,
    about = "Generate an image from a short description and insert it into a Notion page"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the full pipeline and print the result message.
    Generate(GenerateArgs),
    /// Run the pipeline from a JSON tool input (file or stdin).
    Invoke(InvokeArgs),
    /// Only expand a short description into a detailed prompt.
    Expand(ExpandArgs),
    /// Expand and synthesize, writing the image locally.
    Synthesize(SynthesizeArgs),
    /// Publish a built-in 1x1 PNG with the configured publisher.
    UploadSmoke(UploadSmokeArgs),
    /// Print the tool registration payload.
    Schema,
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    #[arg(long)]
    description: String,
    #[arg(long)]
    page_id: String,
    #[arg(long)]
    target_block_id: Option<String>,
    #[arg(long)]
    aspect_ratio: Option<String>,
    #[arg(long)]
    image_size: Option<String>,
    /// `notion` or `public_host`; overrides PAGEPAINT_PUBLISHER.
    #[arg(long)]
    publisher: Option<String>,
    #[arg(long)]
    events: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct InvokeArgs {
    #[arg(long)]
    input: Option<PathBuf>,
    #[arg(long)]
    events: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct ExpandArgs {
    #[arg(long)]
    description: String,
}

#[derive(Debug, Parser)]
struct SynthesizeArgs {
    #[arg(long)]
    description: String,
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    aspect_ratio: Option<String>,
    #[arg(long)]
    image_size: Option<String>,
}

#[derive(Debug, Parser)]
struct UploadSmokeArgs {
    /// Also append the image block under this page.
    #[arg(long)]
    page_id: Option<String>,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("pagepaint error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Generate(args) => run_generate(args),
        Command::Invoke(args) => run_invoke(args),
        Command::Expand(args) => run_expand(args),
        Command::Synthesize(args) => run_synthesize(args),
        Command::UploadSmoke(args) => run_upload_smoke(args),
        Command::Schema => {
            println!("{}", serde_json::to_string_pretty(&tool::tool_definition())?);
            Ok(0)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn load_config(events: Option<PathBuf>) -> Result<PipelineConfig> {
    let mut config = PipelineConfig::from_env().context("invalid configuration")?;
    if events.is_some() {
        config.events_path = events;
    }
    Ok(config)
}

fn run_pipeline(input: &GenerateImageInput, config: &PipelineConfig) -> Result<i32> {
    let pipeline = Pipeline::from_config(config)?;
    let result = pipeline.run(input);
    println!("{}", result.message);
    Ok(if result.success { 0 } else { 1 })
}

fn run_generate(args: GenerateArgs) -> Result<i32> {
    let input = GenerateImageInput {
        short_description: args.description,
        page_id: args.page_id,
        target_block_id: args.target_block_id,
        aspect_ratio: args.aspect_ratio,
        image_size: args.image_size,
    };
    let mut config = load_config(args.events)?;
    if let Some(raw) = args.publisher.as_deref() {
        config.publisher = raw.parse::<PublisherKind>().map_err(anyhow::Error::msg)?;
    }
    run_pipeline(&input, &config)
}

fn run_invoke(args: InvokeArgs) -> Result<i32> {
    let raw = match args.input.as_ref() {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut raw = String::new();
            io::stdin()
                .read_to_string(&mut raw)
                .context("failed to read tool input from stdin")?;
            raw
        }
    };
    let input: GenerateImageInput =
        serde_json::from_str(&raw).context("tool input does not match the schema")?;
    run_pipeline(&input, &load_config(args.events)?)
}

fn run_expand(args: ExpandArgs) -> Result<i32> {
    let config = load_config(None)?;
    let pipeline = Pipeline::from_config(&config)?;
    let prompt = pipeline.expander().expand(&args.description)?;
    println!("{prompt}");
    Ok(0)
}

fn run_synthesize(args: SynthesizeArgs) -> Result<i32> {
    let config = load_config(None)?;
    let pipeline = Pipeline::from_config(&config)?;
    let mut input = GenerateImageInput::new(args.description, "local");
    input.aspect_ratio = args.aspect_ratio;
    input.image_size = args.image_size;
    let request = validate_input(&input, pipeline.synthesizer().defaults())?;

    let prompt = pipeline.expander().expand(&request.short_description)?;
    tracing::info!(%prompt, "expanded prompt");
    let image = pipeline
        .synthesizer()
        .synthesize(&prompt, Some(request.options))?;
    fs::write(&args.out, image.bytes())
        .with_context(|| format!("failed to write {}", args.out.display()))?;

    let encoded = BASE64.encode(image.bytes());
    let preview: String = encoded.chars().take(48).collect();
    println!(
        "wrote {} bytes ({}) to {}",
        image.len(),
        image.mime_type(),
        args.out.display()
    );
    println!("data:{};base64,{preview}...", image.mime_type());
    Ok(0)
}

fn run_upload_smoke(args: UploadSmokeArgs) -> Result<i32> {
    let config = load_config(None)?;
    let transport: Arc<dyn HttpTransport> =
        Arc::new(ReqwestTransport::new(config.request_timeout)?);
    let bytes = BASE64
        .decode(SMOKE_PNG_BASE64)
        .context("built-in PNG is not valid base64")?;
    let Some(image) = GeneratedImage::new(bytes, MediaType::Png) else {
        bail!("built-in PNG is empty");
    };

    let publisher = publisher_for(&config, Arc::clone(&transport));
    let asset = publisher.publish(&image)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "publisher": publisher.name(),
            "asset": asset,
        }))?
    );

    if let Some(page_id) = args.page_id {
        let composer = BlockComposer::new(NotionClient::new(transport, &config.notion));
        if !composer.is_configured() {
            bail!("NOTION_API_KEY is not configured.");
        }
        let anchor = TargetAnchor::new(page_id, None);
        composer.compose(&anchor, &asset, "upload smoke test")?;
        println!("appended image under {}", anchor.append_target());
    }
    Ok(0)
}
