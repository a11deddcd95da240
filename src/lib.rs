pub mod aggregate;
pub mod cli;
pub mod config;
pub mod export;
pub mod pipeline;
pub mod source;
pub mod storage;
