//! One-shot subcommands

use crate::config::Config;
use anyhow::Context;
use pdfstamp_core::fonts::ResolvedFont;
use pdfstamp_core::{
    get_page_count, human_readable, merge_documents, parse_selection, select_drop, select_keep,
    AnnotationHistory, ExportArtifact, ExportKind, FontReference, PageRasterizer, RenderEngine,
    SaveOptions,
};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum PageMode {
    /// Keep only the selected pages
    Keep,
    /// Delete the selected pages
    Drop,
}

pub fn read_pdf(path: &Path) -> anyhow::Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn read_history(path: &Path) -> anyhow::Result<AnnotationHistory> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read history {}", path.display()))?;
    AnnotationHistory::from_json(&json)
        .with_context(|| format!("Invalid history file {}", path.display()))
}

/// Write an artifact to `output`, or to its conventional file name
pub fn write_artifact(artifact: &ExportArtifact, output: Option<&Path>) -> anyhow::Result<PathBuf> {
    let path = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(artifact.file_name()));
    fs::write(&path, artifact.bytes())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

fn save_options(config: &Config, compact: bool) -> SaveOptions {
    SaveOptions {
        compact: compact || config.session.compact_exports,
    }
}

pub fn annotate(
    config: &Config,
    input: &Path,
    history: &Path,
    output: Option<&Path>,
    compact: bool,
) -> anyhow::Result<()> {
    let base = read_pdf(input)?;
    let history = read_history(history)?;
    let fonts = config.font_catalog();

    let bytes = RenderEngine::new(&fonts)
        .apply(&base, history.snapshot(), None)?
        .save(save_options(config, compact))?;
    let artifact = ExportArtifact::new(
        ExportKind::Annotated,
        bytes,
        get_page_count(&base)?,
    );
    let path = write_artifact(&artifact, output)?;
    println!(
        "Applied {} text entries, wrote {}",
        history.len(),
        path.display()
    );
    Ok(())
}

pub fn preview(
    config: &Config,
    input: &Path,
    history: Option<&Path>,
    page: usize,
    dpi: Option<f32>,
    output: &Path,
    rasterizer: &dyn PageRasterizer,
) -> anyhow::Result<()> {
    let base = read_pdf(input)?;
    let history = match history {
        Some(path) => read_history(path)?,
        None => AnnotationHistory::new(),
    };
    let page_index = page
        .checked_sub(1)
        .context("Page numbers start at 1")?;
    let fonts = config.font_catalog();

    let rendered = RenderEngine::new(&fonts)
        .apply(&base, history.snapshot(), None)?
        .rasterize(
            page_index,
            dpi.unwrap_or(config.session.preview_dpi),
            rasterizer,
        )?;
    fs::write(output, &rendered.png)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!(
        "Page {} rendered at {} dpi ({}x{}) to {}",
        page,
        rendered.dpi,
        rendered.width,
        rendered.height,
        output.display()
    );
    Ok(())
}

pub fn merge(
    config: &Config,
    inputs: &[PathBuf],
    output: Option<&Path>,
    compact: bool,
) -> anyhow::Result<()> {
    let documents = inputs
        .iter()
        .map(|path| read_pdf(path))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let artifact = merge_documents(&documents, save_options(config, compact))?;
    let path = write_artifact(&artifact, output)?;
    println!(
        "Merged {} documents ({} pages) into {}",
        inputs.len(),
        artifact.page_count(),
        path.display()
    );
    Ok(())
}

pub fn pages(
    config: &Config,
    input: &Path,
    selection: &str,
    mode: PageMode,
    output: Option<&Path>,
    compact: bool,
) -> anyhow::Result<()> {
    let base = read_pdf(input)?;
    let page_count = get_page_count(&base)?;
    println!("Document has {} pages", page_count);

    let indices = parse_selection(selection, page_count);
    if indices.is_empty() {
        anyhow::bail!("No valid pages in selection '{}'", selection);
    }
    println!("Selected pages: {:?}", human_readable(&indices));

    let options = save_options(config, compact);
    let artifact = match mode {
        PageMode::Keep => select_keep(&base, &indices, options)?,
        PageMode::Drop => select_drop(&base, &indices, options)?,
    };
    let path = write_artifact(&artifact, output)?;
    println!(
        "{} pages remain, wrote {}",
        artifact.page_count(),
        path.display()
    );
    Ok(())
}

pub fn fonts(config: &Config) -> anyhow::Result<()> {
    let catalog = config.font_catalog();
    for name in catalog.names() {
        let status = match catalog.resolve(&FontReference::named(name)) {
            Ok(ResolvedFont::Embedded(font)) => format!("available ({})", font.postscript_name()),
            Ok(ResolvedFont::Standard(_)) => "available".to_string(),
            Err(e) => format!("unavailable ({})", e),
        };
        println!("{}: {}", name, status);
    }
    println!("Default: {}", catalog.default_reference().display_name());
    Ok(())
}
