//! Integration tests for snapcache.
//!
//! Run with: `cargo test --package integration-tests`

#[cfg(test)]
mod load_tests;
#[cfg(test)]
mod refresh_tests;
#[cfg(test)]
mod registration_tests;
#[cfg(test)]
mod scheduler_tests;
