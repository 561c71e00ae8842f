// src/fetch/mod.rs
pub mod client;

pub use client::{stamp_scraped_at, Fetcher};
