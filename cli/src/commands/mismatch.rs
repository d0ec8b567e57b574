use anyhow::Result;

use crate::{cli::Cli, commands::load_config};

pub fn run(cli: &Cli) -> Result<()> {
    let config = load_config(cli, None)?;
    let summary = zebmatch::mismatch(&config)?;
    println!("{summary}");
    Ok(())
}
