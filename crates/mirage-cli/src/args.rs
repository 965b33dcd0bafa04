use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "mirage",
    about = "Synthesize a test database that reproduces the cardinalities of real query plans",
    version,
    after_help = "Examples:\n  mirage prepare --schema schema.json --chains chains.json\n  mirage generate --schema schema.json --chains chains.json --output ./data\n  mirage generate --from-state --batch-size 10000 --seed 7\n  mirage graph --schema schema.json --format dot"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Place filter parameters and persist the prepared state
    Prepare(PrepareArgs),

    /// Generate table data batch by batch
    Generate(GenerateArgs),

    /// Visualize the table reference graph
    Graph(GraphArgs),
}

#[derive(Parser, Debug)]
pub struct InputArgs {
    /// Table and column metadata (schema.json)
    #[arg(long, env = "MIRAGE_SCHEMA", default_value = "schema.json")]
    pub schema: PathBuf,

    /// Constraint chains per query (chains.json)
    #[arg(long, env = "MIRAGE_CHAINS", default_value = "chains.json")]
    pub chains: PathBuf,

    /// Prepared state file
    #[arg(long, env = "MIRAGE_STATE")]
    pub state: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct PrepareArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Base seed; multivariate thresholds are sampled with it
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Parser, Debug)]
pub struct GenerateArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Output directory for the table files
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Rows per batch
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Random seed for deterministic generation
    #[arg(long)]
    pub seed: Option<u64>,

    /// Worker threads, 0 = available cores
    #[arg(long)]
    pub threads: Option<usize>,

    /// Require an existing prepared state instead of preparing again
    #[arg(long)]
    pub from_state: bool,

    /// Prepare again even if the state was built from different inputs
    #[arg(long)]
    pub force: bool,
}

#[derive(Parser, Debug)]
pub struct GraphArgs {
    /// Table and column metadata (schema.json)
    #[arg(long, env = "MIRAGE_SCHEMA", default_value = "schema.json")]
    pub schema: PathBuf,

    /// Output format for the reference graph
    #[arg(long, default_value = "mermaid")]
    pub format: GraphFormat,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum GraphFormat {
    Mermaid,
    Dot,
}

impl InputArgs {
    pub fn state_path(&self) -> PathBuf {
        self.state
            .clone()
            .unwrap_or_else(|| PathBuf::from(mirage_core::state::STATE_FILE_NAME))
    }

    /// `params.json` sits next to the state file.
    pub fn params_path(&self) -> PathBuf {
        self.state_path()
            .with_file_name(mirage_core::state::PARAMS_FILE_NAME)
    }
}
