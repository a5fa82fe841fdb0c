use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use tender_core::{SearchMode, SearchRequest, SortOrder};

#[derive(Debug, Parser)]
#[command(name = "tender", version, about = "Search public tender notices across regions")]
pub struct Cli {
    /// RON config file; defaults to ./tender.ron when present.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Search service base URL.
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Bearer token sent with every request.
    #[arg(long, global = true)]
    pub token: Option<String>,

    /// Directory holding the persisted session state.
    #[arg(long, global = true)]
    pub state_dir: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a new search.
    Search(SearchArgs),
    /// Run the last submitted search again.
    Repeat(RunArgs),
    /// Print the results restored from the last session.
    Show,
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// When cached results come back, wait for and show the live ones.
    #[arg(long)]
    pub live: bool,

    /// Ask the server to skip its cache.
    #[arg(long)]
    pub force_fresh: bool,
}

#[derive(Debug, Clone, Args)]
pub struct SearchArgs {
    /// Region codes, comma separated or repeated.
    #[arg(short, long = "region", required = true, value_delimiter = ',')]
    pub regions: Vec<String>,

    /// First publication date (YYYY-MM-DD).
    #[arg(long)]
    pub from: NaiveDate,

    /// Last publication date (YYYY-MM-DD), inclusive.
    #[arg(long)]
    pub to: NaiveDate,

    #[arg(long, value_enum, default_value_t = ModeArg::Sector)]
    pub mode: ModeArg,

    /// Sector code or free keywords, depending on --mode.
    #[arg(long, default_value = "")]
    pub terms: String,

    #[arg(long)]
    pub status: Option<String>,

    #[arg(long = "modality", value_delimiter = ',')]
    pub modality_codes: Vec<u32>,

    #[arg(long)]
    pub value_min: Option<u64>,

    #[arg(long)]
    pub value_max: Option<u64>,

    #[arg(long = "jurisdiction", value_delimiter = ',')]
    pub jurisdiction_levels: Vec<String>,

    #[arg(long = "municipality", value_delimiter = ',')]
    pub municipality_codes: Vec<String>,

    #[arg(long, value_enum, default_value_t = SortArg::Relevance)]
    pub sort: SortArg,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Sector,
    Keywords,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SortArg {
    Relevance,
    NewestFirst,
    ClosingSoon,
    HighestValue,
}

impl SearchArgs {
    pub fn to_request(&self) -> SearchRequest {
        let mut request = SearchRequest::new(self.regions.clone(), self.from, self.to);
        request.mode = match self.mode {
            ModeArg::Sector => SearchMode::Sector,
            ModeArg::Keywords => SearchMode::Keywords,
        };
        request.sector_or_keywords = self.terms.clone();
        request.status = self.status.clone();
        request.modality_codes = self.modality_codes.clone();
        request.value_min = self.value_min;
        request.value_max = self.value_max;
        request.jurisdiction_levels = self.jurisdiction_levels.clone();
        request.municipality_codes = self.municipality_codes.clone();
        request.sort = match self.sort {
            SortArg::Relevance => SortOrder::Relevance,
            SortArg::NewestFirst => SortOrder::NewestFirst,
            SortArg::ClosingSoon => SortOrder::ClosingSoon,
            SortArg::HighestValue => SortOrder::HighestValue,
        };
        request
    }
}
