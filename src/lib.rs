//! StoryForge: Quality-Gated Story and Illustration Jobs
//!
//! An asynchronous job engine that claims queued generation jobs, routes
//! each one through its typed pipeline, and gates every generated panel and
//! page behind consistency scoring with bounded regeneration.

pub mod cli;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod job;
pub mod logging;
pub mod pipeline;
pub mod provider;
pub mod types;
pub mod validation;
