// src/core/mod.rs

pub mod checks;
pub mod context;
pub mod deployment_steps;
pub mod events;
pub mod messages;
pub mod paths;
pub mod prompt_catalog;
pub mod prompts;
pub mod properties;
pub mod scheduler;
pub mod template;
pub mod validation;
pub mod validators;
