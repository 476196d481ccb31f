use anyhow::{bail, Context, Result};
use hawkql::{Pipeline, PipelineConfig, PipelineInputs};
use std::path::PathBuf;

const USAGE: &str =
    "usage: hawkql <raw_file_path> <calibration_file_path> <output_folder_path> [calibration_header_path]";

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 3 || args.len() > 4 {
        bail!("expected 3 or 4 arguments, got {}\n{}", args.len(), USAGE);
    }

    let inputs = PipelineInputs::new(
        &args[0],
        &args[1],
        &args[2],
        args.get(3).map(PathBuf::from),
    )
    .context("Failed to locate calibration files")?;

    let pipeline = Pipeline::new(PipelineConfig::default()).context("Invalid configuration")?;
    let report = pipeline
        .run(&inputs)
        .with_context(|| format!("Failed to process {}", inputs.raw.display()))?;

    report.log_summary();
    if !report.all_succeeded() {
        let failed: Vec<String> = report.failures().map(|o| o.kind.to_string()).collect();
        bail!("export failed: {}", failed.join(", "));
    }

    Ok(())
}
