//! Command-line interface

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "stylelens-server")]
#[command(about = "StyleLens fashion style prediction server", long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "stylelens.yaml")]
    pub config: String,

    /// Listen address [default: 0.0.0.0]
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Listen port [default: 8000]
    #[arg(short = 'P', long)]
    pub port: Option<u16>,

    /// Weights file for the male classifier head
    #[arg(long, env = "STYLELENS_MALE_WEIGHTS")]
    pub male_weights: Option<PathBuf>,

    /// Weights file for the female classifier head
    #[arg(long, env = "STYLELENS_FEMALE_WEIGHTS")]
    pub female_weights: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}
