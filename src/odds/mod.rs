// src/odds/mod.rs
pub mod models;
pub mod normalize;

pub use models::{parse_events, OddsEvent};
pub use normalize::{decimal_to_american, normalize_odds};
