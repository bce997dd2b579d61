//! Assetwatch.
//!
//! Assetwatch is the caching gateway of the vulnerability dashboard. It sits
//! in front of the inventory/CPE backend and serves device, component, and
//! statistics listings out of in-memory caches with stale-while-revalidate
//! freshness, and orchestrates the CPE matching workflow with optimistic
//! cache updates.

mod cli;
mod endpoints;
mod logging;
mod server;
mod service;

fn main() {
    match cli::execute() {
        Ok(()) => std::process::exit(0),
        Err(error) => {
            logging::ensure_log_error(&error);
            std::process::exit(1);
        }
    }
}
