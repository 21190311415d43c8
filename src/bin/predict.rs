use std::env;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

use scoreline::elo::RatingUpdater;
use scoreline::league_params::compute_league_params;
use scoreline::prediction::{Fixture, PredictionRecord, predict_as_of};
use scoreline::rating_store::save_snapshot;
use scoreline::signals::SignalSet;
use scoreline::{Contest, EngineConfig};

#[derive(Debug, Deserialize)]
struct PredictCase {
    #[serde(default)]
    history: Vec<Contest>,
    #[serde(default)]
    fixtures: Vec<Fixture>,
}

#[derive(Debug, Serialize)]
struct FixtureOutput<'a> {
    home: &'a str,
    away: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    prediction: Option<PredictionRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
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
    let case_path = positional_arg(&args, &["--config", "--save-ratings"])
        .unwrap_or_else(|| PathBuf::from("tests/fixtures/sample_case.json"));

    let mut cfg = match parse_path_arg(&args, "--config")
        .or_else(|| env::var("SCORELINE_CONFIG").ok().map(PathBuf::from))
    {
        Some(path) => EngineConfig::load(&path)?,
        None => EngineConfig::default(),
    };

    let raw = fs::read_to_string(&case_path)
        .with_context(|| format!("read case {}", case_path.display()))?;
    let PredictCase {
        history,
        mut fixtures,
    } = serde_json::from_str(&raw).context("parse case json")?;
    if fixtures.is_empty() {
        return Err(anyhow!("case {} has no fixtures", case_path.display()));
    }

    if has_flag(&args, "--fit-league") {
        let params = compute_league_params(&history);
        params.apply_to(&mut cfg.blend);
        info!(
            samples = params.sample_matches,
            goals = cfg.blend.goals_total_base,
            offset = cfg.blend.home_advantage_offset,
            "league params applied"
        );
    }

    if let Some(path) = parse_path_arg(&args, "--save-ratings") {
        let report = RatingUpdater::new(cfg.elo).replay(&history);
        save_snapshot(&report.store, &path)?;
        info!(path = %path.display(), "rating snapshot saved");
    }

    if !has_flag(&args, "--no-derive") {
        for f in &mut fixtures {
            let derived = SignalSet::from_history(
                &history,
                &f.home.id,
                &f.away.id,
                f.kickoff,
                cfg.form_window,
            );
            f.signals.fill_missing(derived);
        }
    }

    // Dated fixtures are rated from the contests before their kickoff only.
    let results = predict_as_of(&history, &fixtures, &cfg)?;

    let out: Vec<FixtureOutput<'_>> = fixtures
        .iter()
        .zip(results)
        .map(|(f, res)| match res {
            Ok(record) => FixtureOutput {
                home: f.home.display_name(),
                away: f.away.display_name(),
                prediction: Some(record),
                error: None,
            },
            Err(e) => FixtureOutput {
                home: f.home.display_name(),
                away: f.away.display_name(),
                prediction: None,
                error: Some(e.to_string()),
            },
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
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
