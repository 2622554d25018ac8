use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "maiopinion", version, about = "MaiOpinion diagnostic client")]
pub struct Cli {
    #[arg(long, global = true, help = "Output machine-readable JSON")]
    pub json: bool,
    #[arg(
        long,
        global = true,
        help = "Pipeline base URL (overrides MAIOPINION_API_URL)"
    )]
    pub api_url: Option<String>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Upload an image and follow the five diagnostic stages.
    Diagnose {
        #[arg(long)]
        image: PathBuf,
        #[arg(long)]
        condition: String,
        #[arg(long, help = "Also email the report to this address")]
        email: Option<String>,
        #[arg(long, value_name = "DIR", help = "Write the final report as JSON into DIR")]
        save_report: Option<PathBuf>,
    },
    /// Check that the pipeline service is up.
    Health,
}
