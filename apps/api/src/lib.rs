pub mod blob;
pub mod config;
pub mod documents;
pub mod edits;
pub mod engine;
pub mod errors;
pub mod llm_client;
pub mod privacy;
pub mod research;
pub mod review;
pub mod routes;
pub mod state;
pub mod store;
