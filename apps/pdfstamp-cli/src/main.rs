//! pdfstamp command-line tool
//!
//! Layered text annotation, merging and page selection for PDF files.

mod commands;
mod config;
mod edit;

use anyhow::Context;
use clap::{Parser, Subcommand};
use commands::PageMode;
use config::Config;
use pdfstamp_core::{DocumentSession, PageRasterizer};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "pdfstamp")]
#[command(version, about = "Place text on PDF pages, merge documents and pick pages")]
struct Args {
    /// TOML file with the font table and session settings
    #[arg(long, global = true, env = "PDFSTAMP_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply a JSON text history to a PDF
    Annotate {
        input: PathBuf,
        /// History file as written by `history` in the editor
        #[arg(long)]
        history: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Drop unused objects and compress streams
        #[arg(long)]
        compact: bool,
    },
    /// Render one page, with an optional history applied, to PNG
    Preview {
        input: PathBuf,
        #[arg(long)]
        history: Option<PathBuf>,
        /// Page number, starting at 1
        #[arg(long, default_value = "1")]
        page: usize,
        #[arg(long)]
        dpi: Option<f32>,
        #[arg(short, long, default_value = "preview.png")]
        output: PathBuf,
    },
    /// Concatenate PDFs in the given order
    Merge {
        #[arg(required = true, num_args = 2..)]
        inputs: Vec<PathBuf>,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        compact: bool,
    },
    /// Keep or delete a selection of pages, e.g. "1, 3-5"
    Pages {
        input: PathBuf,
        #[arg(long)]
        select: String,
        #[arg(long, value_enum, default_value = "keep")]
        mode: PageMode,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        compact: bool,
    },
    /// List configured fonts and whether they load
    Fonts,
    /// Edit a PDF interactively
    Edit { input: PathBuf },
}

#[cfg(feature = "pdfium")]
fn rasterizer() -> anyhow::Result<Box<dyn PageRasterizer>> {
    Ok(Box::new(pdfstamp_core::PdfiumRasterizer::new()?))
}

#[cfg(not(feature = "pdfium"))]
fn rasterizer() -> anyhow::Result<Box<dyn PageRasterizer>> {
    anyhow::bail!("Previews are not available. Rebuild with --features pdfium")
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // stdout carries command output; logs go to stderr
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::load(args.config.as_deref())?;
    tracing::debug!(?config, "Loaded configuration");

    match args.command {
        Command::Annotate {
            input,
            history,
            output,
            compact,
        } => commands::annotate(&config, &input, &history, output.as_deref(), compact),
        Command::Preview {
            input,
            history,
            page,
            dpi,
            output,
        } => {
            let rasterizer = rasterizer()?;
            commands::preview(
                &config,
                &input,
                history.as_deref(),
                page,
                dpi,
                &output,
                rasterizer.as_ref(),
            )
        }
        Command::Merge {
            inputs,
            output,
            compact,
        } => commands::merge(&config, &inputs, output.as_deref(), compact),
        Command::Pages {
            input,
            select,
            mode,
            output,
            compact,
        } => commands::pages(&config, &input, &select, mode, output.as_deref(), compact),
        Command::Fonts => commands::fonts(&config),
        Command::Edit { input } => {
            let bytes = commands::read_pdf(&input)?;
            let name = input
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| input.display().to_string());
            let mut session =
                DocumentSession::new(&name, bytes, config.font_catalog(), config.session)
                    .with_context(|| format!("Failed to open {}", input.display()))?;

            let rasterizer = match rasterizer() {
                Ok(r) => Some(r),
                Err(e) => {
                    tracing::warn!("{:#}", e);
                    None
                }
            };
            let stdin = std::io::stdin();
            let mut stdout = std::io::stdout();
            edit::run(
                &mut session,
                rasterizer.as_deref(),
                stdin.lock(),
                &mut stdout,
            )
        }
    }
}
