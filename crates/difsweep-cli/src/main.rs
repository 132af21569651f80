use std::cell::RefCell;
use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::rc::Rc;

use chrono::{SecondsFormat, Utc};
use clap::Parser;
use difsweep_core::{
    run_sweep, stable_hash_string, ConfigSource, RunReport, StageOutcome, StageReport, SweepError,
    SweepStage, TableWriter,
};
use difsweep_pipeline::{IndexStage, PipelineState, Project, SpotStage};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(
    name = "difsweep",
    about = "Parameter-sweep harness for diffraction spot detection and orientation indexing"
)]
struct Cli {
    /// Project directory holding the peak table and sweep configuration.
    project: PathBuf,
    /// Basename of a defaults config file merged under the named one.
    #[arg(long)]
    defaults: Option<String>,
    /// Basename for the sweep config, result table, and artifacts.
    #[arg(long, default_value = "sweep")]
    name: String,
    /// Sweep the spot-detection stage.
    #[arg(long)]
    spots: bool,
    /// Sweep the orientation-indexing stage.
    #[arg(long)]
    index: bool,
    /// Print the run plan without executing anything.
    #[arg(long)]
    dry_run: bool,
}

/// Provenance record written next to the result table before the sweep
/// starts.
#[derive(Debug, Serialize)]
struct SweepManifest {
    created_at: String,
    project: String,
    test_name: String,
    stages: Vec<StagePlan>,
    total_runs: u64,
    plan_hash: String,
}

#[derive(Debug, Serialize)]
struct StagePlan {
    stage: String,
    params: Vec<String>,
    combinations: u64,
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    run(&cli)
}

fn run(cli: &Cli) -> Result<(), Box<dyn Error>> {
    let project = Rc::new(Project::load(&cli.project)?);
    let cfg = load_config(&project, cli)?;
    let state = Rc::new(RefCell::new(PipelineState::seeded(&project)));
    let artifact_dir = project.artifact_dir(&cli.name);

    let mut stages: Vec<Box<dyn SweepStage>> = Vec::new();
    if cli.spots {
        stages.push(Box::new(
            SpotStage::from_config(&cfg, Rc::clone(&project), Rc::clone(&state))?
                .with_export_dir(&artifact_dir),
        ));
    }
    if cli.index {
        stages.push(Box::new(
            IndexStage::from_config(&cfg, Rc::clone(&project), Rc::clone(&state))?
                .with_export_dir(&artifact_dir),
        ));
    }

    let plans: Vec<StagePlan> = stages
        .iter()
        .map(|stage| StagePlan {
            stage: stage.stage_id().to_string(),
            params: stage
                .param_names()
                .iter()
                .map(|name| name.to_string())
                .collect(),
            combinations: stage.combo_count() as u64,
        })
        .collect();
    let total_runs = if plans.is_empty() {
        0
    } else {
        plans.iter().map(|plan| plan.combinations).product()
    };

    if cli.dry_run {
        for plan in &plans {
            println!(
                "stage {}: {} combinations over [{}]",
                plan.stage,
                plan.combinations,
                plan.params.join(", ")
            );
        }
        println!("total runs: {total_runs}");
        return Ok(());
    }

    if stages.is_empty() {
        println!("no stages selected; writing header-only table");
    } else {
        fs::create_dir_all(&artifact_dir)?;
    }

    let manifest = SweepManifest {
        created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        project: project.root.display().to_string(),
        test_name: cli.name.clone(),
        plan_hash: stable_hash_string(&(&cli.name, &plans))?,
        stages: plans,
        total_runs,
    };
    write_manifest(&project.manifest_path(&cli.name), &manifest)?;

    let table_path = project.table_path(&cli.name);
    let mut writer = TableWriter::create(&table_path)?;
    let stats = run_sweep(&mut stages, &mut writer, print_run)?;

    println!(
        "sweep complete: {} runs, {} fully completed, table {}",
        stats.runs,
        stats.completed,
        table_path.display()
    );
    for (stage, failures) in &stats.stage_failures {
        println!("  {stage}: {failures} failed runs");
    }
    Ok(())
}

fn load_config(project: &Project, cli: &Cli) -> Result<ConfigSource, SweepError> {
    let named = ConfigSource::load(&project.config_path(&cli.name))?;
    match &cli.defaults {
        Some(basename) => {
            let defaults = ConfigSource::load(&project.config_path(basename))?;
            Ok(named.merged_over(defaults))
        }
        None => Ok(named),
    }
}

fn write_manifest(path: &std::path::Path, manifest: &SweepManifest) -> Result<(), SweepError> {
    let json = serde_json::to_string_pretty(manifest).map_err(|err| {
        SweepError::Io(
            difsweep_core::ErrorInfo::new("manifest-serialize", "failed to encode sweep manifest")
                .with_context("path", path.display().to_string())
                .with_hint(err.to_string()),
        )
    })?;
    fs::write(path, json).map_err(|err| {
        SweepError::Io(
            difsweep_core::ErrorInfo::new("manifest-write", "failed to write sweep manifest")
                .with_context("path", path.display().to_string())
                .with_hint(err.to_string()),
        )
    })
}

fn print_run(report: &RunReport) {
    let mut line = format!("run {:04}", report.run_id);
    for (stage_id, disposition) in &report.stages {
        match disposition {
            StageReport::Ran(StageOutcome::Success { timings, .. }) => {
                let total: f64 = timings.iter().map(|timing| timing.seconds).sum();
                line.push_str(&format!("  {stage_id}: ok {total:.3}s"));
            }
            StageReport::Ran(StageOutcome::Failure { error, .. }) => {
                line.push_str(&format!("  {stage_id}: FAILED"));
                eprintln!("run {:04} {stage_id} failed: {error}", report.run_id);
            }
            StageReport::Skipped => {
                line.push_str(&format!("  {stage_id}: skipped"));
            }
        }
    }
    println!("{line}");
}
