//! Runs one news extraction job described by a RON settings file and prints
//! the records as JSON lines on stdout.
mod logging;
mod output;
mod settings;

use std::io;
use std::path::PathBuf;
use std::sync::{mpsc, Arc};
use std::thread;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use engine_logging::{engine_error, engine_info};
use news_engine::{
    CancellationToken, ChannelRecordSink, Engine, HttpArchiveFetcher, MetaTagExtractor,
};

use crate::settings::AppSettings;

/// Extracts news articles from web archives and prints them as JSON lines.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// RON settings file describing the job, its input and logging
    settings: PathBuf,

    /// Overrides the log level from the settings file
    #[arg(long)]
    log_level: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = AppSettings::load(&cli.settings)?;
    if let Some(level) = cli.log_level {
        settings.log_level = level;
    }
    logging::initialize(settings.log_level()?, settings.log_destination());
    engine_info!("Loaded settings from {:?}", cli.settings);

    let result = run(&settings);
    if let Err(err) = &result {
        engine_error!("Run failed: {:#}", err);
    }
    result
}

fn run(settings: &AppSettings) -> Result<()> {
    let work = settings.input()?.load()?;
    let fetcher = HttpArchiveFetcher::new(settings.fetch.to_settings())
        .context("building object storage client")?;
    let engine = Engine::from_parts(Arc::new(fetcher), Arc::new(MetaTagExtractor))?;

    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::channel();
    let writer = {
        let cancel = cancel.clone();
        thread::Builder::new()
            .name("output".into())
            .spawn(move || {
                let written = output::write_records(rx, io::stdout().lock());
                if written.is_err() {
                    // Nobody is reading the output any more.
                    cancel.cancel();
                }
                written
            })?
    };

    let sink = ChannelRecordSink::new(tx);
    let counters = engine.run_streaming(work, &settings.job, &sink, &cancel);
    drop(sink);

    let written = writer
        .join()
        .map_err(|_| anyhow!("output thread panicked"))?
        .context("writing records")?;
    let counters = counters?;
    engine_info!("Wrote {} records; {}", written, counters);
    Ok(())
}
