// src/identity/mod.rs
pub mod player;
pub mod teams;

pub use player::{is_player_profile_href, player_id_from_href};
pub use teams::{MatchPolicy, TeamResolver};
