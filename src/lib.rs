pub mod app_state;
pub mod cache;
pub mod config;
pub mod documents;
pub mod entities;
pub mod error;
pub mod extractor;
pub mod fetcher;
pub mod health;
pub mod jobs;
pub mod pipeline;
pub mod progress;
pub mod repositories;
pub mod routes;
pub mod runs;
pub mod summarizer;
pub mod tasks;
pub mod telemetry;
