use clap::{Parser, Subcommand};
use log::debug;

use meshlines::meshlines::comm::{Comm, World};
use meshlines::meshlines::config::RuntimeConfig;
use meshlines::meshlines::error::{MeshError, MeshResult};
use meshlines::meshlines::json::JsonValue;
use meshlines::meshlines::lines::handle::DatasetHandle;
use meshlines::meshlines::merge::{self, MergeArgs, MergeEvent};
use meshlines::meshlines::ops;

#[derive(Parser)]
#[command(name = "meshlines")]
#[command(about = "Distributed JSON-lines frames - merge, count, and update datasets across ranks")]
#[command(version)]
struct Cli {
    /// Number of ranks in the in-process world (default: MESHLINES_RANKS or 1)
    #[arg(long, global = true)]
    ranks: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inner equi-join of two datasets into an output dataset
    Merge {
        /// Output dataset handle (JSON, or a bare directory path)
        #[arg(long)]
        output: String,

        /// Left dataset handle
        #[arg(long)]
        left: String,

        /// Right dataset handle
        #[arg(long)]
        right: String,

        /// Join columns for both sides (comma separated)
        #[arg(long, value_delimiter = ',')]
        on: Vec<String>,

        /// Left join columns, overriding --on
        #[arg(long, value_delimiter = ',')]
        left_on: Vec<String>,

        /// Right join columns, overriding --on
        #[arg(long, value_delimiter = ',')]
        right_on: Vec<String>,

        /// Projection from the left dataset (empty keeps all columns)
        #[arg(long, value_delimiter = ',')]
        left_columns: Vec<String>,

        /// Projection from the right dataset (empty keeps all columns)
        #[arg(long, value_delimiter = ',')]
        right_columns: Vec<String>,
    },
    /// Count the selected rows of a dataset
    Count {
        /// Dataset handle
        #[arg(long)]
        dataset: String,
    },
    /// Set a column of every selected row to a literal value
    Set {
        /// Dataset handle
        #[arg(long)]
        dataset: String,

        /// Column to assign
        #[arg(long)]
        column: String,

        /// JSON literal to assign
        #[arg(long)]
        value: String,
    },
}

#[tokio::main]
async fn main() {
    pretty_env_logger::init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(message) => println!("{}", message),
        Err(error) => {
            eprintln!("{}", error);
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> MeshResult<String> {
    let config = match cli.ranks {
        Some(ranks) => RuntimeConfig::with_ranks(ranks)?,
        None => RuntimeConfig::from_env(),
    };

    match cli.command {
        Commands::Merge {
            output,
            left,
            right,
            on,
            left_on,
            right_on,
            left_columns,
            right_columns,
        } => {
            let output = parse_handle(&output)?;
            let left = parse_handle(&left)?;
            let right = parse_handle(&right)?;
            let args = MergeArgs {
                on,
                left_on,
                right_on,
                left_columns,
                right_columns,
            };

            let results = World::run(config.ranks, move |mut comm: Comm<MergeEvent>| {
                let output = output.clone();
                let left = left.clone();
                let right = right.clone();
                let args = args.clone();
                async move { merge::merge(&mut comm, &output, &left, &right, &args).await }
            })
            .await;
            collapse(results)
        }
        Commands::Count { dataset } => {
            let handle = parse_handle(&dataset)?;
            let results = World::run(config.ranks, move |comm: Comm<MergeEvent>| {
                let handle = handle.clone();
                async move { ops::count(&comm, &handle).await }
            })
            .await;
            collapse(results).map(|count| format!("{} rows selected.", count))
        }
        Commands::Set {
            dataset,
            column,
            value,
        } => {
            let handle = parse_handle(&dataset)?;
            let value = JsonValue::parse(&value).map_err(|error| {
                MeshError::configuration(format!("invalid JSON literal for --value: {}", error))
            })?;

            let results = World::run(config.ranks, move |comm: Comm<MergeEvent>| {
                let handle = handle.clone();
                let column = column.clone();
                let value = value.clone();
                async move { ops::set_field(&comm, &handle, &column, &value).await }
            })
            .await;
            collapse(results).map(|updated| format!("updated {} rows.", updated))
        }
    }
}

/// Accept a full JSON handle or shorthand it to a bare directory path
fn parse_handle(text: &str) -> MeshResult<DatasetHandle> {
    if text.trim_start().starts_with('{') {
        DatasetHandle::parse(text)
    } else {
        Ok(DatasetHandle::at(text))
    }
}

/// Rank 0 speaks for the world; other ranks fail silently
fn collapse<T>(results: Vec<MeshResult<Option<T>>>) -> MeshResult<T> {
    let mut ranks = results.into_iter();
    let rank0 = ranks
        .next()
        .ok_or_else(|| MeshError::internal("world produced no ranks"))?;

    for (peer, result) in ranks.enumerate() {
        if let Err(error) = result {
            debug!("rank {} failed: {}", peer + 1, error);
        }
    }

    match rank0 {
        Ok(Some(value)) => Ok(value),
        Ok(None) => Err(MeshError::internal("rank 0 produced no result")),
        Err(error) => Err(error),
    }
}
