use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::Command;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Warden workspace automation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the lifecycle benchmarks and write a comparison report
    Bench {
        /// Run quickly (lower sample size/time)
        #[arg(long, default_value_t = false)]
        quick: bool,

        /// Generate report only (skip running benchmarks)
        #[arg(long, default_value_t = false)]
        report_only: bool,

        /// Criterion baseline to save this run under
        #[arg(long, default_value = "current")]
        baseline: String,

        /// Baseline the report compares every other baseline against
        #[arg(long, default_value = "main")]
        reference: String,
    },
}

const BENCH: &str = "lifecycle_benchmark";

/// workload -> baseline -> ops/s
type Results = BTreeMap<String, BTreeMap<String, f64>>;

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Bench {
            quick,
            report_only,
            baseline,
            reference,
        } => {
            if !report_only {
                run_benchmarks(quick, &baseline)?;
            }
            generate_report(&reference)?;
        }
    }

    Ok(())
}

fn run_benchmarks(quick: bool, baseline: &str) -> Result<()> {
    println!("Compiling benchmarks...");
    let status = Command::new("cargo")
        .args(["build", "--bench", BENCH, "--release"])
        .status()?;
    if !status.success() {
        anyhow::bail!("Failed to compile benchmarks");
    }

    println!("\n>>> Benchmarking into baseline: {baseline}");
    let start = Instant::now();

    let mut cmd = Command::new("cargo");
    cmd.env("CARGO_INCREMENTAL", "0")
        .env("RUSTFLAGS", "-C opt-level=3 -C codegen-units=1");
    cmd.args(["bench", "--bench", BENCH]);

    // Args for the test runner (Criterion) go after --
    cmd.arg("--");
    cmd.arg("--save-baseline").arg(baseline);

    if quick {
        cmd.arg("--measurement-time").arg("0.1");
        cmd.arg("--noplot");
        cmd.arg("--sample-size").arg("10");
    }

    let status = cmd
        .status()
        .with_context(|| format!("Failed to run {BENCH}"))?;
    if status.success() {
        println!("Finished in {:.2?}", start.elapsed());
    } else {
        eprintln!("Warning: {BENCH} failed");
    }

    Ok(())
}

fn generate_report(reference: &str) -> Result<()> {
    println!("\n>>> Generating Report...");

    let criterion_dir = Path::new("target/criterion");
    if !criterion_dir.exists() {
        eprintln!("No criterion output found at {}", criterion_dir.display());
        return Ok(());
    }

    let mut results = Results::new();
    collect_results(criterion_dir, &mut results);

    let baselines: BTreeSet<&String> = results.values().flat_map(BTreeMap::keys).collect();

    let report_path = Path::new("benchmark_results/report.md");
    if let Some(parent) = report_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = fs::File::create(report_path)?;

    writeln!(file, "# Lifecycle Benchmark Report")?;
    writeln!(file)?;

    write!(file, "| Workload |")?;
    for baseline in &baselines {
        write!(file, " {baseline} (Ops/s) | vs {reference} |")?;
    }
    writeln!(file)?;

    write!(file, "|---|")?;
    for _ in &baselines {
        write!(file, "---|---|")?;
    }
    writeln!(file)?;

    for (workload, by_baseline) in &results {
        write!(file, "| {workload} |")?;
        let reference_ops = by_baseline.get(reference).copied().unwrap_or(0.0);

        for baseline in &baselines {
            match by_baseline.get(*baseline) {
                Some(ops) => {
                    let rel = if reference_ops > 0.0 {
                        ops / reference_ops
                    } else {
                        0.0
                    };
                    write!(file, " {} | **{rel:.2}x** |", format_ops(*ops))?;
                }
                None => write!(file, " N/A | - |")?,
            }
        }
        writeln!(file)?;
    }

    println!("Report written to {}", report_path.display());
    Ok(())
}

fn format_ops(ops: f64) -> String {
    if ops > 1_000_000.0 {
        format!("{:.2}M", ops / 1_000_000.0)
    } else if ops > 1_000.0 {
        format!("{:.2}K", ops / 1_000.0)
    } else {
        format!("{ops:.0}")
    }
}

fn dir_name(path: &Path) -> Option<String> {
    path.file_name()?.to_str().map(str::to_owned)
}

fn read_json(path: &Path) -> Option<serde_json::Value> {
    let content = fs::read_to_string(path).ok()?;
    serde_json::from_str(&content).ok()
}

fn collect_results(dir: &Path, results: &mut Results) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_results(&path, results);
            continue;
        }
        if dir_name(&path).as_deref() != Some("estimates.json") {
            continue;
        }

        // Structure: .../group/function/baseline/estimates.json
        let Some(baseline_dir) = path.parent() else {
            continue;
        };
        let Some(function_dir) = baseline_dir.parent() else {
            continue;
        };
        let (Some(baseline), Some(function)) = (dir_name(baseline_dir), dir_name(function_dir))
        else {
            continue;
        };
        if baseline == "report" || baseline == "new" || baseline == "base" {
            continue;
        }
        let workload = match function_dir.parent().and_then(dir_name) {
            Some(group) if group != "criterion" => format!("{group}/{function}"),
            _ => function,
        };

        // Throughput, when the benchmark declares one
        let elements = read_json(&baseline_dir.join("benchmark.json"))
            .and_then(|json| json.get("throughput")?.get("Elements")?.as_f64());

        let Some(time_ns) = read_json(&path)
            .and_then(|json| json.get("mean")?.get("point_estimate")?.as_f64())
        else {
            continue;
        };
        if time_ns <= 0.0 {
            continue;
        }

        let metric = elements.unwrap_or(1.0) * 1e9 / time_ns;
        results.entry(workload).or_default().insert(baseline, metric);
    }
}
