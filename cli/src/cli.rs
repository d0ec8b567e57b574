use std::path::PathBuf;

/// ZEB opportunity and innovation mismatch pipeline (argument schema only)
#[derive(clap::Parser, Debug)]
#[command(name = "zebmatch", version, about, propagate_version = true)]
pub struct Cli {
    /// Increase output verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// JSON pipeline config; flags below override its values
    #[arg(short, long, global = true, value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub paths: PathArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Args, Debug, Default)]
pub struct PathArgs {
    /// Raw data root (category subdirectories of zip archives)
    #[arg(long, global = true, value_hint = clap::ValueHint::DirPath)]
    pub raw_dir: Option<PathBuf>,

    /// Normalized layer containers
    #[arg(long, global = true, value_hint = clap::ValueHint::DirPath)]
    pub processed_dir: Option<PathBuf>,

    /// CSV tables
    #[arg(long, global = true, value_hint = clap::ValueHint::DirPath)]
    pub reports_dir: Option<PathBuf>,

    /// SVG maps
    #[arg(long, global = true, value_hint = clap::ValueHint::DirPath)]
    pub figures_dir: Option<PathBuf>,

    /// Skip drawing maps
    #[arg(long, global = true)]
    pub no_figures: bool,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Normalize raw layers into the processed containers
    Preprocess,

    /// Compute indicator ratios and the TOPSIS opportunity index
    Opportunity(RankArgs),

    /// Fuse the opportunity index with the supply table
    Mismatch,

    /// Run all stages in order
    Run(RankArgs),
}

#[derive(clap::Args, Debug)]
pub struct RankArgs {
    /// TOPSIS weights for supply, demand, environment, e.g. 0.4,0.4,0.2
    #[arg(long, value_delimiter = ',')]
    pub weights: Option<Vec<f64>>,
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};

    use super::*;

    #[test]
    fn schema_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn weights_and_global_flags() {
        let cli = Cli::try_parse_from([
            "zebmatch", "-vv", "opportunity", "--weights", "0.5,0.3,0.2", "--reports-dir", "out", "--no-figures",
        ]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(cli.paths.no_figures);
        assert_eq!(cli.paths.reports_dir, Some(PathBuf::from("out")));
        match cli.command {
            Commands::Opportunity(args) => assert_eq!(args.weights, Some(vec![0.5, 0.3, 0.2])),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn weights_split_on_commas() {
        let cli = Cli::try_parse_from(["zebmatch", "run", "--weights", "0.4,0.4,0.2"]).unwrap();
        match cli.command {
            Commands::Run(args) => assert_eq!(args.weights, Some(vec![0.4, 0.4, 0.2])),
            other => panic!("unexpected command {other:?}"),
        }
        assert!(Cli::try_parse_from(["zebmatch", "run", "--weights", "0.4,heavy"]).is_err());
    }
}
