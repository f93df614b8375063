pub mod aggregate;
pub mod classify;
pub mod config;
pub mod errors;
pub mod graph;
pub mod jobs;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod server;
pub mod source;
pub mod text;
pub mod tracker;
