use std::env;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use tracing_subscriber::{EnvFilter, fmt};

use scoreline::backtest::{BacktestOptions, walk_forward};
use scoreline::league_params::compute_league_params;
use scoreline::metrics::calibration_bins;
use scoreline::{Contest, EngineConfig, Outcome};

#[derive(Debug, Deserialize)]
struct HistoryFile {
    history: Vec<Contest>,
}

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = env::args().skip(1).collect::<Vec<_>>();
    let path = positional_arg(&args, &["--config", "--warmup"])
        .unwrap_or_else(|| PathBuf::from("tests/fixtures/sample_case.json"));

    let mut cfg = match parse_path_arg(&args, "--config")
        .or_else(|| env::var("SCORELINE_CONFIG").ok().map(PathBuf::from))
    {
        Some(p) => EngineConfig::load(&p)?,
        None => EngineConfig::default(),
    };

    let raw = fs::read_to_string(&path)
        .with_context(|| format!("read history {}", path.display()))?;
    let file: HistoryFile = serde_json::from_str(&raw).context("parse history json")?;
    if file.history.is_empty() {
        return Err(anyhow!("no contests in {}", path.display()));
    }

    // Fitting league params on the full history leaks future results into early predictions.
    if has_flag(&args, "--fit-league") {
        compute_league_params(&file.history).apply_to(&mut cfg.blend);
    }

    let opts = BacktestOptions {
        warmup: parse_usize_arg(&args, "--warmup").unwrap_or(0),
        derive_signals: !has_flag(&args, "--no-derive"),
    };
    let report = walk_forward(&file.history, &cfg, opts)?;

    println!("Walk-forward pre-match backtest");
    println!("History: {}", path.display());
    println!(
        "samples={} skipped={} warmup={}",
        report.evaluated, report.skipped, opts.warmup
    );
    println!(
        "model     ll={:.4} brier={:.4} acc={:.3} ece={:.4}",
        report.model.log_loss, report.model.brier, report.model.accuracy, report.ece
    );
    println!(
        "base_rate ll={:.4} brier={:.4} acc={:.3}",
        report.base_rate.log_loss, report.base_rate.brier, report.base_rate.accuracy
    );
    println!("ll_gain={:+.6}", report.log_loss_gain());

    if has_flag(&args, "--bins") {
        for (label, class) in [
            ("home", Outcome::Home),
            ("draw", Outcome::Draw),
            ("away", Outcome::Away),
        ] {
            println!();
            println!("{label}: bucket count avg_pred actual");
            for b in calibration_bins(&report.predictions, &report.outcomes, class, 10) {
                if b.count == 0 {
                    continue;
                }
                println!(
                    "  {:.1}-{:.1} {:>5} {:.3} {:.3}",
                    b.bucket_start, b.bucket_end, b.count, b.avg_pred, b.actual_rate
                );
            }
        }
    }

    Ok(())
}

fn parse_usize_arg(args: &[String], name: &str) -> Option<usize> {
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&format!("{name}="))
            && let Ok(v) = raw.trim().parse::<usize>()
        {
            return Some(v);
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && let Ok(v) = next.trim().parse::<usize>()
        {
            return Some(v);
        }
    }
    None
}

fn parse_path_arg(args: &[String], name: &str) -> Option<PathBuf> {
    for (idx, arg) in args.iter().enumerate() {
        if let Some(path) = arg.strip_prefix(&format!("{name}=")) {
            let trimmed = path.trim();
            if !trimmed.is_empty() {
                return Some(PathBuf::from(trimmed));
            }
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(PathBuf::from(next));
        }
    }
    None
}

// First argument that is neither a flag nor the value of one of `valued` flags.
fn positional_arg(args: &[String], valued: &[&str]) -> Option<PathBuf> {
    let mut skip_next = false;
    for arg in args {
        if skip_next {
            skip_next = false;
            continue;
        }
        if valued.contains(&arg.as_str()) {
            skip_next = true;
            continue;
        }
        if !arg.starts_with("--") {
            return Some(PathBuf::from(arg));
        }
    }
    None
}

fn has_flag(args: &[String], name: &str) -> bool {
    args.iter().any(|arg| arg == name)
}
