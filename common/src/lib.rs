// Common library for shared code across the API server and background tasks

pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod executor;
pub mod import_export;
pub mod models;
pub mod orchestrator;
pub mod scheduler;
pub mod ssh;
pub mod storage;
pub mod telemetry;
