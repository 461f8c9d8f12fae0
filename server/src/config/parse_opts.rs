use super::{subcmd_run::Run, ClapSubCommand};
use crate::{error::*, state::AppState};
use clap::command;

pub async fn parse_opts() -> Result<Option<AppState>> {
  let _ = include_str!("../../Cargo.toml");

  let options = command!().subcommand(Run::subcmd()).subcommand_required(true);

  let matches = options.get_matches();

  match matches.subcommand() {
    Some(("run", sub_m)) => {
      let res = Run::exec_matches(sub_m).await?;
      Ok(res)
    }
    _ => {
      bail!("Unknown subcommand");
    }
  }
}
