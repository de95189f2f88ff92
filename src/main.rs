use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use vordetect::types::{Author, CitationFields, DeclaredMetadata, DeclaredVersion};
use vordetect::{Config, VersionDetector, layout, pdf, zones};

#[derive(Parser)]
#[command(name = "vordetect", about = "Detect the manuscript version of a PDF or DOCX file")]
struct Cli {
    /// PDF or DOCX file to check
    #[arg(required_unless_present = "debug_layout")]
    file: Option<PathBuf>,

    /// Declared title of the work
    #[arg(long)]
    title: Option<String>,

    /// Declared version, e.g. "accepted version" or "published version"
    #[arg(long, required_unless_present = "debug_layout")]
    declared_version: Option<String>,

    /// Author as NAME or NAME;ORCID (repeatable)
    #[arg(long = "author")]
    authors: Vec<String>,

    #[arg(long)]
    doi: Option<String>,

    #[arg(long)]
    acceptance_date: Option<String>,

    #[arg(long)]
    publication_date: Option<String>,

    /// Config file (default: ~/.config/vordetect/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override pdfium library path
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_path: Option<String>,

    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,

    /// Log every test at debug level
    #[arg(short, long)]
    verbose: bool,

    /// Print zone statistics for a TrueViz file instead of detecting (debug)
    #[arg(long, value_name = "FILE.cermstr")]
    debug_layout: Option<PathBuf>,

    /// With --debug-layout, print a TikZ picture of this page instead
    /// (numbered from 1, as in the zone listing)
    #[arg(long, value_name = "PAGE", requires = "debug_layout")]
    tikz: Option<usize>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load config")?;
    if let Some(path) = &cli.pdfium_path {
        config.pdf.pdfium_path = Some(path.clone());
    }

    if let Some(structure) = &cli.debug_layout {
        return print_debug_layout(structure, &config, cli.tikz);
    }

    let (Some(file), Some(version)) = (&cli.file, &cli.declared_version) else {
        anyhow::bail!("an input file and --declared-version are required");
    };
    let declared = declared_metadata(&cli, version);
    let pdfium = pdf::bind_pdfium(config.pdf.pdfium_path.as_deref());
    let mut detector = VersionDetector::new(config);
    match pdfium {
        Ok(pdfium) => detector = detector.with_pdfium(pdfium),
        Err(e) => tracing::warn!("{e}; PDF text falls back to lopdf"),
    }

    let outcome = detector.detect(file, &declared);
    let json = if cli.pretty {
        serde_json::to_string_pretty(&outcome)?
    } else {
        serde_json::to_string(&outcome)?
    };
    println!("{json}");
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn declared_metadata(cli: &Cli, version: &str) -> DeclaredMetadata {
    DeclaredMetadata {
        title: cli.title.clone(),
        version: DeclaredVersion::parse(version),
        authors: cli.authors.iter().map(|a| Author::parse(a)).collect(),
        citation: CitationFields {
            doi: cli.doi.clone(),
            acceptance_date: cli.acceptance_date.clone(),
            publication_date: cli.publication_date.clone(),
        },
    }
}

fn print_debug_layout(path: &Path, config: &Config, tikz: Option<usize>) -> Result<()> {
    let doc = zones::parse_file(path)
        .with_context(|| format!("Failed to read structure file: {}", path.display()))?;
    if let Some(page) = tikz {
        let page = doc
            .page(page)
            .with_context(|| format!("No page {page} in {} pages", doc.pages.len()))?;
        print!("{}", layout::tikz_page(page));
        return Ok(());
    }
    for line in layout::describe_zones(&doc, &config.layout) {
        println!("{line}");
    }
    let stats = layout::analyze(&doc, &config.layout);
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
