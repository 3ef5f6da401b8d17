pub mod agents;
pub mod analytics;
pub mod app;
pub mod config;
pub mod error;
pub mod flows;
pub mod integrations;
pub mod matching;
pub mod pg_store;
pub mod prompting;
pub mod store;
pub mod tools;
pub mod types;
