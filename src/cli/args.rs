use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// osslite - Upload directories to and prune prefixes of an OSS bucket
#[derive(Parser, Debug)]
#[command(name = "osslite")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path (falls back to OSS_* environment variables)
    #[arg(short, long, global = true, env = "OSSLITE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a template config file
    Init {
        /// Where to write the file
        #[arg(value_name = "PATH", default_value = "oss.yaml")]
        path: PathBuf,
    },

    /// Upload every regular file under a directory
    Upload {
        /// Local directory; keys are paths relative to it
        #[arg(value_name = "DIR")]
        dir: PathBuf,

        /// Only print the target URLs, don't upload
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Do not send a Content-MD5 fingerprint
        #[arg(long)]
        no_md5: bool,

        /// File extensions to skip (repeatable, e.g. --exclude-ext html)
        #[arg(long = "exclude-ext", value_name = "EXT")]
        exclude_ext: Vec<String>,

        /// Concurrent uploads (defaults to available parallelism)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Show progress bar
        #[arg(long)]
        progress: bool,
    },

    /// Delete every file under a prefix
    Rm {
        /// Remote prefix
        #[arg(value_name = "PREFIX")]
        prefix: String,

        /// Keep keys starting with this prefix (repeatable)
        #[arg(long, value_name = "PREFIX")]
        except: Vec<String>,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
