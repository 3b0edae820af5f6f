use catalog_sync::{SyncConfig, SyncEngine};
use clap::{Arg, ArgMatches};

pub struct SearchCommand;

impl SearchCommand {
    pub fn new_cmd() -> clap::Command {
        clap::Command::new("search")
            .about("Fetches one page of services matching a search term")
            .arg(Arg::new("term").required(true))
            .arg(crate::cli::page_size_arg())
            .arg(Arg::new("after").long("after").help("Cursor returned by a previous search"))
    }

    pub async fn exec(arg_matches: &ArgMatches) -> eyre::Result<()> {
        let cfg = SyncConfig::from_env()?;
        let page_size = arg_matches
            .get_one::<u32>("page-size")
            .copied()
            .unwrap_or(cfg.page_size);
        let term = arg_matches
            .get_one::<String>("term")
            .ok_or_else(|| eyre::eyre!("search term missing"))?;
        let after = arg_matches.get_one::<String>("after").cloned();

        let engine = SyncEngine::connect(cfg)?;
        let page = engine.search(term, page_size, after).await?;

        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "services": page.entities,
                "endCursor": page.end_cursor,
                "hasNextPage": page.has_next_page,
                "totalCount": page.total_count,
            }))?
        );

        Ok(())
    }
}
