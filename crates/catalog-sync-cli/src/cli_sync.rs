use std::io::Write;

use catalog_sync::{SyncConfig, SyncEngine};
use clap::{Arg, ArgMatches};
use futures::StreamExt;

pub struct SyncCommand;

impl SyncCommand {
    pub fn new_cmd() -> clap::Command {
        clap::Command::new("sync")
            .about("Runs a full sync and writes every service as a JSON line")
            .arg(crate::cli::page_size_arg())
            .arg(Arg::new("output").long("output").help("File to write to, stdout when absent"))
    }

    pub async fn exec(arg_matches: &ArgMatches) -> eyre::Result<()> {
        let mut cfg = SyncConfig::from_env()?;
        if let Some(page_size) = arg_matches.get_one::<u32>("page-size") {
            cfg.page_size = *page_size;
        }

        let engine = SyncEngine::connect(cfg)?;

        let mut out: Box<dyn Write> = match arg_matches.get_one::<String>("output") {
            Some(output) => Box::new(std::io::BufWriter::new(std::fs::File::create(output)?)),
            None => Box::new(std::io::stdout().lock()),
        };

        let mut entities = 0usize;
        let mut stream = Box::pin(engine.sync_all(None));
        while let Some(entity) = stream.next().await {
            match entity {
                Ok(entity) => {
                    serde_json::to_writer(&mut out, &entity)?;
                    out.write_all(b"\n")?;
                    entities += 1;
                }
                Err(e) => {
                    out.flush()?;
                    tracing::error!(entities, "sync stopped before the last page");
                    return Err(e.into());
                }
            }
        }
        out.flush()?;

        tracing::info!(entities, "sync complete");

        Ok(())
    }
}
