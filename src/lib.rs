/// Basic application code
pub mod app;
/// Application authorization
pub mod auth;
/// Controllers for REST endpoints
pub mod controller;
/// Domain objects
pub mod domain;
/// Error enums
pub mod error;
/// Repositories
pub mod repo;
/// Waitlist business logic
pub mod service;
/// Application settings
pub mod settings;
/// Database schema verification
pub mod setup;
/// Application telemetry for tracing and logging
pub mod telemetry;
