// src/cli/handlers/mod.rs

// One module per CLI verb.

pub mod commons;
pub mod configure;
pub mod install;
pub mod query;
pub mod update;
pub mod validate;
