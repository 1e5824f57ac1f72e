// Place Scraper - Core
//
// This crate turns a submitted geographic search into a durable set of place
// records. A queue worker drives the scrape against the mapping provider and
// persists results; the CLI submits jobs and reads their status.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;

pub use config::*;
