// AgriPatrol command line interface

use agri_eye::models::Sampling;
use agri_eye::{AgriConfig, Decision, InferenceClient, OpenAiCompatibleBackend, Simulation};
use clap::{Parser, Subcommand};
use image::{DynamicImage, Rgb, RgbImage};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "agri")]
#[command(about = "AgriPatrol - crop inspection robot demo", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Render an annotated patrol video offline
    Simulate {
        /// Input video
        #[arg(long)]
        video: Option<PathBuf>,

        /// Output video
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Frames between two inferences
        #[arg(long, default_value = "30")]
        interval: u64,
    },

    /// Ask the model about a single image
    Probe {
        /// Image file; a solid red 224x224 test image when omitted
        image: Option<PathBuf>,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)))
        .with_target(false)
        .init();

    let mut config = AgriConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Simulate { video, output, interval } => {
            if let Some(video) = video {
                config.video_path = video;
            }
            if let Some(output) = output {
                config.output_path = output;
            }
            config.think_interval = interval;
            config.validate().map_err(anyhow::Error::msg)?;
            simulate(config).await?;
        }
        Commands::Probe { image } => {
            probe(&config, image).await?;
        }
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

fn build_client(config: &AgriConfig) -> anyhow::Result<Arc<InferenceClient>> {
    let backend = OpenAiCompatibleBackend::new(&config.model)?;
    let sampling = Sampling {
        enabled: true,
        temperature: config.model.temperature,
        max_tokens: config.model.max_tokens,
    };
    Ok(Arc::new(InferenceClient::with_sampling(Arc::new(backend), sampling)))
}

async fn simulate(config: AgriConfig) -> anyhow::Result<()> {
    println!("🤖 System Booting...");
    let client = build_client(&config)?;
    client.load().await?;

    let output = config.output_path.clone();
    let handle = Handle::current();
    let report = tokio::task::spawn_blocking(move || {
        let simulation = Simulation::from_config(&config, client)?;
        println!("🚀 Simulation Started!");
        simulation.run(&handle)
    })
    .await??;

    info!("{} frames rendered, {} inferences", report.frames, report.inferences);
    println!("✅ 完成！请查看 {:?} 中的中文仪表盘效果。", output);
    Ok(())
}

async fn probe(config: &AgriConfig, path: Option<PathBuf>) -> anyhow::Result<()> {
    let client = build_client(config)?;
    client.load().await?;

    let image = match path {
        Some(path) => image::open(&path)?,
        None => DynamicImage::ImageRgb8(RgbImage::from_pixel(224, 224, Rgb([255, 0, 0]))),
    };

    println!("Testing prediction...");
    let answer = client.predict(&image).await;
    let decision = Decision::from_label(&answer);

    println!("Result: {}", answer);
    println!(
        "Decision: {} -> {} ({:.1} m/s)",
        decision.outcome.label_bilingual(),
        decision.command,
        decision.target_speed
    );
    Ok(())
}
