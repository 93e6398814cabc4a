//! Command line front end
//!
//! ```bash
//! # Write a template config
//! osslite init oss.yaml
//!
//! # Preview, then upload a build directory
//! osslite --config oss.yaml upload public -n
//! osslite --config oss.yaml upload public --exclude-ext map --progress
//!
//! # Delete a prefix but keep one subtree
//! osslite --config oss.yaml rm /assets --except /assets/fonts
//! ```

pub mod args;
pub mod commands;

pub use args::{Cli, Commands};
pub use commands::{content_type_for_extension, UploadOptions};
