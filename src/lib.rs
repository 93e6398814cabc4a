//! osslite - Signed-request client for OSS-style object storage

pub mod cli;
pub mod config;
pub mod oss;

pub use config::Config;
pub use oss::{Client, OssError};
