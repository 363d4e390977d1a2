pub mod config;
pub mod error;
pub mod gitcmd;
pub mod parse;
pub mod process;
pub mod runner;
pub mod shutdown;
pub mod task;
