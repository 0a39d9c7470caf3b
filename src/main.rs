use activity_refiner::{
    config::{PublishBackend, RefinerConfig},
    crypto::AesGcmEncryptor,
    publish::{LocalPublisher, PinataPublisher, Publisher},
    sink::ParquetSink,
    Refiner,
};
use anyhow::{Context, Result};
use clap::Parser;
use std::{fs, io::Write, path::PathBuf};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

/// Refine a viewing-activity export into an encrypted, published Parquet file.
#[derive(Parser, Debug)]
struct Args {
    /// Directory holding the export archive (overrides INPUT_DIR)
    #[arg(long)]
    input_dir: Option<PathBuf>,

    /// Directory for the sink file, schema and run summary (overrides OUTPUT_DIR)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Directory the archive is expanded into (overrides WORK_DIR)
    #[arg(long)]
    work_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    // ─── 1) .env first, so RUST_LOG from it reaches the filter ───────
    let dotenv = dotenvy::dotenv();

    // ─── 2) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();
    info!("startup");

    // ─── 3) configuration: defaults → .env / environment → flags ─────
    if let Err(e) = dotenv {
        if !e.not_found() {
            return Err(e).context("loading .env");
        }
    }
    let args = Args::parse();
    let mut config = RefinerConfig::from_env()?;
    if let Some(dir) = args.input_dir {
        config.input_dir = dir;
    }
    if let Some(dir) = args.output_dir {
        config.output_dir = dir;
    }
    if let Some(dir) = args.work_dir {
        config.work_dir = Some(dir);
    }
    config.validate()?;
    info!(
        input = %config.input_dir.display(),
        output = %config.output_dir.display(),
        work = %config.work_dir().display(),
        "configuration"
    );

    fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("creating output directory {:?}", config.output_dir))?;

    // ─── 4) collaborators ────────────────────────────────────────────
    let publisher: Box<dyn Publisher> = match &config.publish {
        PublishBackend::Pinata { api_url, jwt } => {
            info!(%api_url, "publishing via pinata");
            Box::new(PinataPublisher::new(api_url.as_str(), jwt.as_str())?)
        }
        PublishBackend::Local { .. } => {
            let dir = config
                .local_publish_dir()
                .unwrap_or_else(|| config.output_dir.join("published"));
            info!(dir = %dir.display(), "publishing to local store");
            Box::new(LocalPublisher::new(dir)?)
        }
    };
    let sink = ParquetSink::new(config.sink_path())?;

    // ─── 5) run ──────────────────────────────────────────────────────
    let mut refiner = Refiner::new(&config, sink, AesGcmEncryptor, publisher);
    let result = match refiner.run() {
        Ok(result) => result,
        Err(err) => {
            error!(stage = %err.stage, "refinement failed: {}", err.source);
            return Err(err.into());
        }
    };

    // ─── 6) run summary ──────────────────────────────────────────────
    let output_path = config.output_path();
    let mut out = fs::File::create(&output_path)
        .with_context(|| format!("creating {:?}", output_path))?;
    serde_json::to_writer_pretty(&mut out, &result).context("serializing run summary")?;
    out.write_all(b"\n")?;
    info!(path = %output_path.display(), "wrote run summary");

    Ok(())
}
