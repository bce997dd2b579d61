#[macro_use]
pub mod metrics;

pub mod aggregates;
pub mod caching;
pub mod components;
pub mod config;
pub mod logging;
pub mod matching;
pub mod prefetch;
pub mod services;
pub mod types;
pub mod upstream;
pub mod utils;
