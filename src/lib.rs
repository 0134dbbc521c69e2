pub mod analysis;
pub mod batch;
pub mod chunker;
pub mod config;
pub mod errors;
pub mod extract;
pub mod invoker;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod prompt;
pub mod tokenizer;
pub mod ui;
pub mod usage;
