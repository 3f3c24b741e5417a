//! Pitch Deck Lead Intake API Library
//!
//! This library provides the core functionality of the lead intake and
//! qualification service: questionnaire scoring, material submissions,
//! background analysis through an external analysis software, and lead
//! administration over HTTP.
//!
//! # Modules
//!
//! - `api`: API definitions.
//! - `core`: Scoring, intake and analysis orchestration.
//! - `data`: Data access layer.
//! - `integrations`: External service integrations.
//! - `analysis`: Analysis orchestrator and status query.
//! - `analysis_client`: Analysis software client.
//! - `circuit_breaker`: Circuit breaker implementation.
//! - `config`: Configuration management.
//! - `db`: Database connection, pool management and schema.
//! - `db_storage`: Lead storage trait and PostgreSQL implementation.
//! - `errors`: Error handling types.
//! - `handlers`: HTTP request handlers.
//! - `intake`: Questionnaire and submission intake.
//! - `material_store`: Uploaded material storage and content sniffing.
//! - `memory_store`: In-memory lead storage.
//! - `models`: Core data models.
//! - `notifier`: Lead notifications.
//! - `scoring`: Lead scoring engine.

pub mod api;
pub mod core;
pub mod data;
pub mod integrations;

// Re-export primary modules for shared use in tests and other binaries
pub mod analysis;
pub mod analysis_client;
pub mod circuit_breaker;
pub mod config;
pub mod db;
pub mod db_storage;
pub mod errors;
pub mod handlers;
pub mod intake;
pub mod material_store;
pub mod memory_store;
pub mod models;
pub mod notifier;
pub mod scoring;
