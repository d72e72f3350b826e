pub mod batch_plan;
pub mod checkpoint;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod engine;
pub mod input;
pub mod pipeline;
pub mod policy;
pub mod prompt;
pub mod report;
pub mod text;
pub mod util;
pub mod writer;
