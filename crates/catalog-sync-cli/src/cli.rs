use crate::{cli_search, cli_sync};

pub struct Cli {
    cmd: clap::Command,
}

impl Cli {
    pub fn new() -> eyre::Result<Self> {
        Ok(Self {
            cmd: clap::Command::new("catalog-sync")
                .about("Pulls the service catalog from the upstream GraphQL API")
                .subcommand_required(true)
                .subcommand(cli_sync::SyncCommand::new_cmd())
                .subcommand(cli_search::SearchCommand::new_cmd()),
        })
    }

    pub async fn execute(self, args: &[&str]) -> eyre::Result<()> {
        let matches = self.cmd.try_get_matches_from(args)?;

        match matches.subcommand() {
            Some(("sync", args)) => cli_sync::SyncCommand::exec(args).await?,
            Some(("search", args)) => cli_search::SearchCommand::exec(args).await?,
            _ => eyre::bail!("command missing"),
        }

        Ok(())
    }
}

pub(crate) fn page_size_arg() -> clap::Arg {
    clap::Arg::new("page-size")
        .long("page-size")
        .value_parser(clap::value_parser!(u32))
        .help("Services requested per page")
}
