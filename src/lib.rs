pub mod cli;
pub mod config;
pub mod index;
pub mod pipeline;
pub mod source;
