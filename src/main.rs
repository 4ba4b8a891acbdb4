use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tagload::{
    config::Config,
    font::{FontFaceData, FontFaceManager, FontSource},
    host::{Document, HeadlessDocument, Parent},
    measure::TextMeasurer,
    Loaders,
};

#[derive(Parser, Debug)]
#[command(version, about, long_about=None)]
struct CLIArguments {
    #[arg(short, long, default_value = "./tagload.toml")]
    config: PathBuf,

    /// Directory that local references are resolved against.
    #[arg(short, long, default_value = ".")]
    root: PathBuf,

    /// Override the font detection timeout.
    #[arg(long)]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load scripts in order, stopping at the first failure.
    Script { urls: Vec<String> },

    /// Load stylesheets in order, stopping at the first failure.
    Css { urls: Vec<String> },

    /// Declare font faces and wait until the families render.
    Fonts {
        /// `FAMILY=URL`, may be repeated.
        #[arg(long = "face", value_parser = parse_face)]
        faces: Vec<FontFaceData>,

        families: Vec<String>,
    },

    /// Measure a line of text.
    Measure {
        text: String,

        #[arg(long, default_value = "serif")]
        font_family: String,

        #[arg(long, default_value = "16px")]
        font_size: String,
    },
}

fn parse_face(value: &str) -> Result<FontFaceData, String> {
    let (family, url) = value
        .split_once('=')
        .ok_or_else(|| format!("Expected FAMILY=URL, got `{value}`"))?;

    Ok(FontFaceData {
        family: family.trim().to_string(),
        sources: vec![FontSource {
            url: url.trim().to_string(),
            format: None,
        }],
        weight: None,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let CLIArguments {
        config,
        root,
        timeout_ms,
        command,
    } = CLIArguments::parse();

    let mut config = Config::read(&config).await?;
    if let Some(timeout_ms) = timeout_ms {
        config.font.timeout_ms = timeout_ms;
    }

    info!("Resolving local references against `{}`.", root.display());

    let headless = HeadlessDocument::new(root);
    let document: Arc<dyn Document> = Arc::new(headless.clone());
    let loaders = Loaders::new(Arc::clone(&document), config.font.clone());

    use Command::*;
    match command {
        Script { urls } => {
            loaders
                .scripts
                .load_all(&urls)
                .await
                .context("Script batch failed")?;
            info!("Loaded {} script(s).", urls.len());
        }

        Css { urls } => {
            loaders
                .styles
                .load_all(&urls)
                .await
                .context("Stylesheet batch failed")?;
            info!("Loaded {} stylesheet(s).", urls.len());
        }

        Fonts { faces, families } => {
            let mut manager = FontFaceManager::new(Arc::clone(&document), loaders.fonts.clone())?;

            let mut declared = config.faces.clone();
            declared.extend(faces);
            manager.declare(declared)?;

            let families = if families.is_empty() {
                manager.families()
            } else {
                families
            };
            loaders
                .load_fonts(&families)
                .await
                .context("Not every font became available")?;
            info!("Fonts ready: {}", families.join(", "));
        }

        Measure {
            text,
            font_family,
            font_size,
        } => {
            let measurer = TextMeasurer::new(Arc::clone(&document), config.measure.cache_capacity);
            let size = measurer.measure(
                &text,
                &[
                    ("font-family", font_family.as_str()),
                    ("font-size", font_size.as_str()),
                ],
                None,
            );
            info!("`{}` measures {}x{}px.", text, size.width, size.height);
        }
    }

    info!(
        "Document head holds {} element(s).",
        headless.children(Parent::Head).len()
    );

    Ok(())
}
