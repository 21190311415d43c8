use std::path::PathBuf;

use chrono::{TimeZone, Utc};

use scoreline::calibration::{CalibrationPolicy, calibrate};
use scoreline::elo::RatingUpdater;
use scoreline::market::DecimalOdds;
use scoreline::prediction::{Fixture, PredictionWarning, Side, predict_as_of};
use scoreline::rating_store::RatingStore;
use scoreline::score_matrix::ScoreMatrix;
use scoreline::signals::{HeadToHead, MarketSignal, SignalSet, StrengthPair, TeamStrength};
use scoreline::{
    Contest, EngineConfig, EngineError, Entity, EntityId, Outcome, PredictionAssembler,
};

fn id(s: &str) -> EntityId {
    EntityId::from(s)
}

fn level_store(ids: &[&str]) -> RatingStore {
    let mut store = RatingStore::default();
    for i in ids {
        store.set(&id(i), 1500.0);
    }
    store
}

fn fixture(home: &str, away: &str) -> Fixture {
    Fixture {
        home: Entity::new(home, ""),
        away: Entity::new(away, ""),
        kickoff: None,
        signals: SignalSet::default(),
    }
}

#[test]
fn home_offset_tilts_equal_ratings_toward_home() {
    let store = level_store(&["a", "b"]);
    let mut cfg = EngineConfig::default();
    cfg.blend.home_advantage_offset = 100.0;
    let record = PredictionAssembler::new(&store, &cfg)
        .unwrap()
        .predict(&id("a"), &id("b"), &SignalSet::default())
        .unwrap();
    assert!(record.match_result.home > record.match_result.away);
    assert_eq!(record.match_result.pick, Outcome::Home);

    cfg.blend.home_advantage_offset = 0.0;
    let neutral = PredictionAssembler::new(&store, &cfg)
        .unwrap()
        .predict(&id("a"), &id("b"), &SignalSet::default())
        .unwrap();
    assert!((neutral.match_result.home - neutral.match_result.away).abs() < 1e-12);
}

#[test]
fn score_cell_is_the_renormalized_poisson_product() {
    let m = ScoreMatrix::build(1.5, 1.2, 5).unwrap();
    let pois = |l: f64, k: i32, fact: f64| l.powi(k) * (-l).exp() / fact;
    let facts = [1.0, 1.0, 2.0, 6.0, 24.0, 120.0];
    let mut sum = 0.0;
    for i in 0..6 {
        for j in 0..6 {
            sum += pois(1.5, i, facts[i as usize]) * pois(1.2, j, facts[j as usize]);
        }
    }
    let expected = pois(1.5, 1, 1.0) * pois(1.2, 1, 1.0) / sum;

    assert!((m.get(1, 1) - expected).abs() < 1e-6);
    assert!((m.get(1, 1) - 0.121694).abs() < 1e-6);
    assert!((m.tail_mass() - (1.0 - sum)).abs() < 1e-12);
}

#[test]
fn disabled_calibration_changes_nothing() {
    let store = level_store(&["a", "b"]);
    let mut cfg = EngineConfig::default();
    cfg.markets.include_matrix = true;
    let record = PredictionAssembler::new(&store, &cfg)
        .unwrap()
        .predict(&id("a"), &id("b"), &SignalSet::default())
        .unwrap();

    let raw = ScoreMatrix::build(
        record.expected_goals.home,
        record.expected_goals.away,
        cfg.matrix.max_goals,
    )
    .unwrap();
    assert_eq!(calibrate(&raw, &CalibrationPolicy::disabled()).unwrap(), raw);
    assert_eq!(record.matrix, Some(raw.rows()));
    assert_eq!(record.calibration, None);
}

#[test]
fn enabled_calibration_is_labelled_and_normalized() {
    let store = level_store(&["a", "b"]);
    let mut cfg = EngineConfig::default();
    cfg.markets.include_matrix = true;
    cfg.calibration = CalibrationPolicy::source_style();
    let record = PredictionAssembler::new(&store, &cfg)
        .unwrap()
        .predict(&id("a"), &id("b"), &SignalSet::default())
        .unwrap();

    assert_eq!(record.calibration.as_deref(), Some("source-style-boost"));
    let total: f64 = record.matrix.unwrap().iter().flatten().sum();
    assert!((total - 1.0).abs() < 1e-9);
}

#[test]
fn derived_markets_complement_and_weights_are_convex() {
    let store = level_store(&["a", "b"]);
    let cfg = EngineConfig::default();
    let signals = SignalSet {
        market: Some(MarketSignal::from_odds(DecimalOdds {
            home: 2.4,
            draw: 3.3,
            away: 3.1,
        })),
        ..SignalSet::default()
    };
    let r = PredictionAssembler::new(&store, &cfg)
        .unwrap()
        .predict(&id("a"), &id("b"), &signals)
        .unwrap();

    let m = r.match_result;
    assert!((m.home + m.draw + m.away - 1.0).abs() < 1e-9);
    assert!((r.total_goals.over + r.total_goals.under - 1.0).abs() < 1e-9);
    assert!((r.both_score.yes + r.both_score.no - 1.0).abs() < 1e-9);

    let w = r.weights;
    for v in [w.baseline, w.head_to_head, w.form, w.model, w.market] {
        assert!((0.0..=1.0).contains(&v));
    }
    assert!((w.baseline + w.head_to_head + w.form - 1.0).abs() < 1e-9);
    assert!((w.model + w.market - 1.0).abs() < 1e-9);
    assert_eq!(w.market, cfg.blend.market_weight);
    assert_eq!(r.value_bets.len(), 3);
}

#[test]
fn market_signal_pulls_the_outcome_split() {
    let store = level_store(&["a", "b"]);
    let cfg = EngineConfig::default();
    let assembler = PredictionAssembler::new(&store, &cfg).unwrap();
    let plain = assembler
        .predict(&id("a"), &id("b"), &SignalSet::default())
        .unwrap();
    let away_fav = SignalSet {
        market: Some(MarketSignal::from_odds(DecimalOdds {
            home: 6.0,
            draw: 4.2,
            away: 1.55,
        })),
        ..SignalSet::default()
    };
    let pulled = assembler.predict(&id("a"), &id("b"), &away_fav).unwrap();

    assert!(pulled.match_result.away > plain.match_result.away);
    // Goal rates come from the goal-side blend only.
    assert_eq!(pulled.expected_goals, plain.expected_goals);
}

#[test]
fn repeated_predictions_serialize_identically() {
    let report = RatingUpdater::default().replay(&sample_history());
    let cfg = EngineConfig::default();
    let assembler = PredictionAssembler::new(&report.store, &cfg).unwrap();
    let signals = SignalSet::from_history(&sample_history(), &id("ars"), &id("liv"), None, 5);

    let first = assembler.predict(&id("ars"), &id("liv"), &signals).unwrap();
    let second = assembler.predict(&id("ars"), &id("liv"), &signals).unwrap();
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[test]
fn batch_keeps_input_order_and_isolates_failures() {
    let names: Vec<String> = (0..40).map(|i| format!("t{i}")).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let store = level_store(&refs);
    let cfg = EngineConfig::default();

    let mut fixtures: Vec<Fixture> = (0..40)
        .map(|i| fixture(&names[i], &names[(i + 7) % 40]))
        .collect();
    fixtures[13] = fixture("t13", "t13");

    let assembler = PredictionAssembler::new(&store, &cfg).unwrap();
    let results = assembler.predict_batch(&fixtures);
    assert_eq!(results.len(), fixtures.len());
    for (i, (f, res)) in fixtures.iter().zip(&results).enumerate() {
        if i == 13 {
            assert!(matches!(res, Err(EngineError::InvalidFixture(_))));
            continue;
        }
        let record = res.as_ref().unwrap();
        assert_eq!(record.home, f.home.id);
        assert_eq!(record.away, f.away.id);
        assert_eq!(*record, assembler.predict_fixture(f).unwrap());
    }
}

#[test]
fn unknown_entity_errors_without_fallback() {
    let store = level_store(&["a"]);
    let mut cfg = EngineConfig::default();
    cfg.fallback_to_baseline = false;
    let err = PredictionAssembler::new(&store, &cfg)
        .unwrap()
        .predict(&id("a"), &id("ghost"), &SignalSet::default())
        .unwrap_err();
    assert_eq!(err, EngineError::UnknownEntity(id("ghost")));
}

#[test]
fn unknown_entity_falls_back_to_baseline_with_warning() {
    let store = level_store(&["a"]);
    let cfg = EngineConfig::default();
    let record = PredictionAssembler::new(&store, &cfg)
        .unwrap()
        .predict(&id("a"), &id("ghost"), &SignalSet::default())
        .unwrap();
    assert_eq!(record.ratings.away, store.baseline());
    assert_eq!(
        record.warnings,
        vec![PredictionWarning::UnknownEntity {
            entity: id("ghost")
        }]
    );
    assert!(record.is_degraded());
}

#[test]
fn extreme_rates_raise_tail_and_floor_warnings() {
    let store = level_store(&["a", "b"]);
    let mut cfg = EngineConfig::default();
    cfg.blend.goals_total_base = 9.0;
    let lopsided = SignalSet {
        strength: Some(StrengthPair {
            home: TeamStrength {
                scored_per_match: 0.0,
                conceded_per_match: 4.0,
            },
            away: TeamStrength {
                scored_per_match: 4.0,
                conceded_per_match: 0.0,
            },
        }),
        ..SignalSet::default()
    };
    let record = PredictionAssembler::new(&store, &cfg)
        .unwrap()
        .predict(&id("a"), &id("b"), &lopsided)
        .unwrap();

    assert_eq!(record.expected_goals.home, cfg.blend.min_rate);
    assert!(record.warnings.contains(&PredictionWarning::RateFloored {
        side: Side::Home,
        floor: cfg.blend.min_rate,
    }));
    let truncated = record.warnings.iter().any(|w| {
        matches!(w, PredictionWarning::TruncatedTail { tail_mass, .. } if *tail_mass > 0.01)
    });
    assert!(truncated);
}

#[test]
fn runaway_head_to_head_average_is_capped_not_fatal() {
    let store = level_store(&["a", "b"]);
    let cfg = EngineConfig::default();
    let signals = SignalSet {
        head_to_head: Some(HeadToHead {
            meetings: 3,
            home_wins: 2,
            draws: 1,
            away_wins: 0,
            goals_avg: 4000.0,
        }),
        ..SignalSet::default()
    };
    let record = PredictionAssembler::new(&store, &cfg)
        .unwrap()
        .predict(&id("a"), &id("b"), &signals)
        .unwrap();

    assert_eq!(record.expected_goals.home, cfg.blend.max_rate);
    assert_eq!(record.expected_goals.away, cfg.blend.max_rate);
    for side in [Side::Home, Side::Away] {
        assert!(record.warnings.contains(&PredictionWarning::RateCapped {
            side,
            cap: cfg.blend.max_rate,
        }));
    }
    let m = record.match_result;
    assert!((m.home + m.draw + m.away - 1.0).abs() < 1e-9);
}

#[test]
fn dated_fixture_is_rated_only_from_earlier_results() {
    let at = |day: u32| Utc.with_ymd_and_hms(2024, 9, day, 15, 0, 0).unwrap();
    let history = vec![
        Contest::new(Entity::new("a", ""), Entity::new("b", ""), 2, 0, at(1)),
        Contest::new(Entity::new("a", ""), Entity::new("b", ""), 3, 0, at(10)),
    ];
    let dated = Fixture {
        kickoff: Some(at(10)),
        ..fixture("a", "b")
    };
    let undated = fixture("a", "b");
    let cfg = EngineConfig::default();

    let results = predict_as_of(&history, &[undated.clone(), dated], &cfg).unwrap();
    let records: Vec<_> = results.into_iter().map(Result::unwrap).collect();

    // The day-10 fixture must not see its own result.
    assert_eq!(records[1].ratings.home, 1516.0);
    assert_eq!(records[1].ratings.away, 1484.0);
    let full = RatingUpdater::default().replay(&history).store;
    assert_eq!(records[0].ratings.home, full.get(&id("a")));
    assert!(records[0].ratings.home > records[1].ratings.home);
}

#[derive(serde::Deserialize)]
struct Case {
    history: Vec<Contest>,
    fixtures: Vec<Fixture>,
}

fn sample_case() -> Case {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/sample_case.json");
    let raw = std::fs::read_to_string(path).unwrap();
    serde_json::from_str(&raw).unwrap()
}

fn sample_history() -> Vec<Contest> {
    sample_case().history
}

#[test]
fn sample_case_end_to_end() {
    let case = sample_case();
    let report = RatingUpdater::default().replay(&case.history);
    assert_eq!(report.skipped.len(), 2);
    assert_eq!(report.store.len(), 4);

    let cfg = EngineConfig::default();
    let results = PredictionAssembler::new(&report.store, &cfg)
        .unwrap()
        .predict_batch(&case.fixtures);
    let records: Vec<_> = results.into_iter().map(Result::unwrap).collect();

    assert_eq!(records.len(), 3);
    assert!(!records[0].value_bets.is_empty());
    assert!(records[1].value_bets.is_empty());
    assert_eq!(
        records[2].warnings,
        vec![PredictionWarning::UnknownEntity { entity: id("new") }]
    );
    assert_eq!(records[0].top_scores.len(), cfg.markets.top_scores);
    assert_eq!(records[0].exact_score.score, records[0].top_scores[0].score);
}
