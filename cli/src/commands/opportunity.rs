use anyhow::Result;

use crate::{cli::{Cli, RankArgs}, commands::load_config};

pub fn run(cli: &Cli, args: &RankArgs) -> Result<()> {
    let config = load_config(cli, Some(args))?;
    let summary = zebmatch::opportunity(&config)?;
    println!("{summary}");
    Ok(())
}
