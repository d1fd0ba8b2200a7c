use clap::{Parser, Subcommand};
use label_catalog::bitable::LarkClient;
use label_catalog::*;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "label-catalog", about = "Publish labeling images and catalog them in Bitable")]
struct Cli {
    /// Configuration file; `LABEL_CATALOG__<SECTION>__<KEY>` variables override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload every image of a directory to the configured bucket
    Upload {
        dir: PathBuf,
        /// Maximum number of simultaneous uploads
        #[arg(short = 'n', long)]
        parallelism: Option<usize>,
    },
    /// Create catalog tables for the images `upload` published from a directory
    Catalog {
        dir: PathBuf,
        /// Catalog every image even without an upload manifest
        #[arg(long)]
        assume_uploaded: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let result = match Settings::load(cli.config.as_deref()) {
        Ok(settings) => run(cli.command, settings).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command, mut settings: Settings) -> Result<(), Error> {
    match command {
        Command::Upload { dir, parallelism } => {
            if let Some(n) = parallelism {
                settings.upload.parallelism = n;
            }
            settings.validate_for_upload()?;
            upload(&dir, settings).await
        }
        Command::Catalog {
            dir,
            assume_uploaded,
        } => {
            settings.validate_for_catalog()?;
            let manifest = UploadManifest::read(&dir).await?;
            if manifest.is_none() && !assume_uploaded {
                return Err(Error::MissingManifest {
                    dir: dir.display().to_string(),
                });
            }
            let client = LarkClient::new(&settings.lark)?;
            let writer = CatalogWriter::new(
                client,
                settings.lark.app_token.clone(),
                settings.storage,
                settings.catalog,
            );
            let report = writer.process_assets(&dir, manifest.as_ref()).await?;
            for batch in &report.batches {
                println!(
                    "{}\t{}\t{} records",
                    batch.table_name, batch.table.table_id, batch.records
                );
            }
            for file_name in &report.skipped {
                eprintln!("{}: not uploaded, not cataloged", file_name);
            }
            if !report.skipped.is_empty() {
                return Err(Error::AnyError {
                    source: format!("{} files were not cataloged", report.skipped.len()).into(),
                });
            }
            Ok(())
        }
    }
}

async fn upload(dir: &std::path::Path, settings: Settings) -> Result<(), Error> {
    let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(aws_config::Region::new(settings.storage.region.clone()))
        .load()
        .await;
    let s3 = aws_sdk_s3::Client::new(&sdk_config);

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupted, cancelling remaining uploads");
                cancel.cancel();
            }
        }
    });

    let sources = files_in_dir(dir, &settings.storage)?;
    let total = sources.len();
    let uploader =
        Uploader::new(s3, settings.storage, settings.upload).with_cancellation(cancel);
    let outcomes = uploader
        .upload_files(sources, move |report| async move {
            info!(
                "{}/{} uploaded ({} bytes in {:.2}s)",
                report.seq + 1,
                total,
                report.size,
                report.success_time.as_secs_f64()
            );
        })
        .await;
    let manifest = UploadManifest::from_outcomes(&outcomes).write(dir).await?;
    info!(manifest = %manifest.display(), "wrote upload manifest");

    let mut failed = 0;
    for outcome in &outcomes {
        match &outcome.result {
            Ok(url) => println!("{}", url),
            Err(e) => {
                failed += 1;
                eprintln!("{}: {}", outcome.source.destination_name(), e);
            }
        }
    }
    if failed > 0 {
        return Err(Error::AnyError {
            source: format!("{} of {} uploads failed", failed, total).into(),
        });
    }
    Ok(())
}
