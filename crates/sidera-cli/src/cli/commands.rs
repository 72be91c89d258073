use super::synthetic::{SyntheticSet, SYNTH_SUB_INSTRUMENT};
use anyhow::Context;
use sidera_core::{GridShape, TemplateBuilder, TemplateConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, clap::Args)]
pub struct SynthArgs {
    /// Number of synthetic observations to combine
    #[arg(long, default_value_t = 6)]
    pub observations: usize,
    /// Worker threads interpolating orders in parallel
    #[arg(long, default_value_t = 2)]
    pub workers: usize,
    /// Spectral orders in the synthetic grid
    #[arg(long, default_value_t = 4)]
    pub orders: usize,
    /// Pixels per order
    #[arg(long, default_value_t = 512)]
    pub pixels: usize,
    /// Release observation data right after each barrier completes
    #[arg(long)]
    pub memory_save: bool,
    /// Where to write the JSON template
    #[arg(long, value_name = "FILE")]
    pub output: PathBuf,
}

pub fn run_synth(args: SynthArgs) -> anyhow::Result<i32> {
    let shape = GridShape {
        orders: args.orders,
        pixels: args.pixels,
    };
    let source = Arc::new(SyntheticSet::generate(args.observations, shape));
    let config = TemplateConfig {
        workers: args.workers,
        memory_save: args.memory_save,
        ..TemplateConfig::default()
    };

    let template = TemplateBuilder::new(config)
        .build(source, SYNTH_SUB_INSTRUMENT, None)
        .context("stellar template build failed")?;

    let masked = template.mask.iter().filter(|&&flag| flag).count();
    let total = template.mask.len();
    info!(
        used = template.used.len(),
        masked_fraction = masked as f64 / total as f64,
        "template built"
    );

    let json =
        serde_json::to_string_pretty(&template).context("template serialization failed")?;
    std::fs::write(&args.output, json)
        .with_context(|| format!("failed to write template to '{}'", args.output.display()))?;
    println!("template written to {}", args.output.display());

    Ok(0)
}
