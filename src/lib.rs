//! Elo ratings, signal blending and Poisson scoreline distributions for
//! pre-match outcome prediction.

pub mod backtest;
pub mod blend;
pub mod calibration;
pub mod config;
pub mod contest;
pub mod elo;
pub mod error;
pub mod league_params;
pub mod market;
pub mod metrics;
pub mod prediction;
pub mod rating_store;
pub mod score_matrix;
pub mod signals;

pub use config::EngineConfig;
pub use contest::{Contest, Entity, EntityId, Outcome};
pub use error::{ContestError, EngineError, EngineResult};
pub use prediction::{Fixture, PredictionAssembler, PredictionRecord, PredictionWarning};
pub use rating_store::RatingStore;
