use anyhow::{Context as AnyhowContext, Result};
use clap::Parser;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::AuditConfig;
use crate::error::{HandlerError, ScanError};
use crate::handlers::HandlerRegistry;
use crate::pipeline;
use crate::report::{LocationReport, ReportLine, ReportWriter};
use crate::session::ScanSession;
use crate::walker::ScanItem;

#[derive(Parser, Debug)]
#[command(name = "pkgaudit")]
#[command(about = "Resolve package URIs into fingerprinted scan locations", long_about = None)]
pub struct Args {
    /// URI to scan (`file://`, `mirror://`, or a plain path)
    #[arg(value_name = "URI", required_unless_present = "list_handlers")]
    pub uri: Option<String>,

    /// Second URI; pairs the roots of both instead of walking
    #[arg(long, value_name = "URI")]
    pub diff: Option<String>,

    /// Configuration file (JSON or YAML)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Maximum nesting depth before a location is halted
    #[arg(long, value_name = "N")]
    pub max_depth: Option<u64>,

    /// Root directory for temporary extraction
    #[arg(long, value_name = "DIR")]
    pub temp_dir: Option<PathBuf>,

    /// Root of a local package mirror
    #[arg(long, value_name = "DIR")]
    pub mirror_root: Option<PathBuf>,

    /// Output file path (prints to stdout if not specified)
    #[arg(short = 'O', long, value_name = "FILE")]
    pub output_file: Option<PathBuf>,

    /// List loaded and disabled handlers, then exit
    #[arg(long)]
    pub list_handlers: bool,

    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    pub fn validate(&self) -> Result<()> {
        if let Some(ref config_path) = self.config {
            if !config_path.is_file() {
                anyhow::bail!("Config file does not exist: {}", config_path.display());
            }
        }
        if let Some(ref temp_dir) = self.temp_dir {
            validate_dir(temp_dir)?;
        }
        Ok(())
    }
}

pub fn validate_dir(path: &Path) -> Result<()> {
    if !path.is_dir() {
        anyhow::bail!("Directory does not exist: {}", path.display());
    }
    std::fs::read_dir(path)
        .with_context(|| format!("Cannot read directory: {}", path.display()))?;
    Ok(())
}

/// Layers command line overrides on top of the config file.
pub fn build_config(args: &Args) -> Result<AuditConfig> {
    let mut config = match &args.config {
        Some(path) => AuditConfig::load(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => AuditConfig::default(),
    };

    if let Some(max_depth) = args.max_depth {
        config = config.with_max_depth(max_depth);
    }
    if let Some(temp_dir) = &args.temp_dir {
        config = config.with_temp_dir(temp_dir);
    }
    if let Some(mirror_root) = &args.mirror_root {
        config = config.with_mirror_root(mirror_root);
    }

    config.validate()?;
    Ok(config)
}

pub fn run(args: &Args) -> Result<()> {
    let config = build_config(args)?;
    let session = ScanSession::new(config);
    let _cleanup = session.cleanup_guard();
    let registry = HandlerRegistry::new(session);

    if args.list_handlers {
        return list_handlers(&registry);
    }

    let uri = args.uri.as_deref().context("No URI given")?;
    let out: Box<dyn Write> = match &args.output_file {
        Some(path) => Box::new(std::io::BufWriter::new(
            std::fs::File::create(path)
                .with_context(|| format!("Cannot create output file: {}", path.display()))?,
        )),
        None => Box::new(std::io::stdout().lock()),
    };
    let mut writer = ReportWriter::new(out);

    match &args.diff {
        Some(other) => write_diff(&registry, uri, other, &mut writer)?,
        None => write_scan(&registry, uri, &mut writer)?,
    }

    info!(lines = writer.lines(), "report written");
    writer.finish()?;
    Ok(())
}

fn write_scan<W: Write>(
    registry: &HandlerRegistry,
    uri: &str,
    writer: &mut ReportWriter<W>,
) -> Result<()> {
    pipeline::walk_uri(registry, uri, None, |item| {
        let line = match item {
            ScanItem::Location(location) => {
                ReportLine::Location(LocationReport::from_location(&location))
            }
            ScanItem::Detection(detection) => ReportLine::Detection(detection),
        };
        writer.write_line(&line)?;
        Ok(())
    })?;
    Ok(())
}

fn write_diff<W: Write>(
    registry: &HandlerRegistry,
    uri_a: &str,
    uri_b: &str,
    writer: &mut ReportWriter<W>,
) -> Result<()> {
    let pairs = match pipeline::diff_uri(registry, uri_a, uri_b) {
        Ok(pairs) => pairs,
        Err(ScanError::Handler(e @ HandlerError::UnsupportedDiff { .. })) => {
            warn!(error = %e, "skipping diff");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    for (left, right) in &pairs {
        writer.write_line(&ReportLine::Diff {
            left: LocationReport::from_location(left),
            right: LocationReport::from_location(right),
        })?;
    }
    Ok(())
}

fn list_handlers(registry: &HandlerRegistry) -> Result<()> {
    let default = registry.default_scheme();
    for scheme in registry.schemes() {
        let marker = if Some(scheme) == default { " (default)" } else { "" };
        println!("{scheme}{marker}");
    }
    for (name, disabled) in registry.disabled() {
        println!("{name}: disabled ({})", disabled.reason);
    }
    Ok(())
}
