//! Environment-driven knobs for CI runs.

pub mod run_profile;
