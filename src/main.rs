use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use osslite::cli::commands::{self, default_workers, UploadOptions};
use osslite::cli::{Cli, Commands};
use osslite::config;

fn main() -> Result<()> {
    let cli = Cli::parse_args();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    if let Commands::Init { path } = &cli.command {
        return commands::cmd_init(path);
    }

    let config = config::load_config(cli.config.as_deref())?;
    let client = config.client()?;

    match cli.command {
        Commands::Init { .. } => {}
        Commands::Upload {
            dir,
            dry_run,
            no_md5,
            exclude_ext,
            workers,
            progress,
        } => {
            let opts = UploadOptions {
                dry_run,
                no_md5,
                exclude_ext,
                workers: workers.unwrap_or_else(default_workers),
                progress,
            };
            commands::cmd_upload(&client, &dir, &opts).await?;
        }
        Commands::Rm { prefix, except } => {
            commands::cmd_rm(&client, &prefix, &except).await?;
        }
    }

    Ok(())
}
