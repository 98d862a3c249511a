//main.rs
use anyhow::{anyhow, Context};
use clap::Parser;
use lloyd_kmeans::{parse_seeds, read_table, Algorithm, RunStatus};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs::File;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(version = "0.3.0", author = "Stefan L. <stefan.lang@med.lu.se>")]
struct Opts {
    /// delimited numeric table, one point per line
    #[clap(short, long)]
    file: String,

    /// number of clusters
    #[clap(short, long)]
    k: usize,

    /// cluster label per input line is written here
    #[clap(short, long)]
    outfile: String,

    /// stop after this many partition / update steps
    #[clap(short, long, default_value_t = 50)]
    max_steps: usize,

    /// comma separated row indices used as initial centroids
    #[clap(short, long)]
    seeds: Option<String>,

    /// seed for the random centroid pick
    #[clap(long)]
    rng_seed: Option<u64>,

    /// only cluster on the first N columns
    #[clap(long)]
    columns: Option<usize>,

    /// field separator of the input table
    #[clap(short, long, default_value_t = '\t')]
    delimiter: char,

    /// the input has no header line
    #[clap(long)]
    no_header: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let opts = Opts::parse();

    if !opts.delimiter.is_ascii() {
        return Err(anyhow!("delimiter must be a single ASCII character"));
    }
    let file = File::open(&opts.file).with_context(|| format!("Failed to open {:?}", opts.file))?;
    let table = read_table(file, opts.delimiter as u8, !opts.no_header)
        .with_context(|| format!("Failed to read {:?}", opts.file))?;

    let ds = match opts.columns {
        Some(n) => table.dataset.numeric_view(n)?,
        None => table.dataset,
    };
    tracing::info!(rows = ds.size(), cols = ds.dimension(), "loaded {}", opts.file);

    let mut km = match (&opts.seeds, opts.rng_seed) {
        (Some(text), _) => {
            let seeds = parse_seeds(text, ds.size())?;
            Algorithm::new(&ds, opts.k, Some(&seeds))?
        }
        (None, Some(seed)) => Algorithm::with_rng(&ds, opts.k, &mut StdRng::seed_from_u64(seed))?,
        (None, None) => Algorithm::new(&ds, opts.k, None)?,
    };

    match km.run(opts.max_steps) {
        RunStatus::Converged { steps } => tracing::info!("converged after {} steps", steps),
        RunStatus::Exhausted { steps } => tracing::warn!("no convergence within {} steps", steps),
    }
    for (ci, cluster) in km.clusters().iter().enumerate() {
        tracing::info!(cluster = ci, members = cluster.len(), radius = cluster.radius(), "{}", cluster);
    }

    let labels = km
        .assignments()
        .ok_or_else(|| anyhow!("no partition was computed (max-steps is 0)"))?;
    std::fs::write(
        &opts.outfile,
        labels.iter().map(|c| c.to_string()).collect::<Vec<_>>().join("\n"),
    )
    .with_context(|| format!("Failed to write {:?}", opts.outfile))?;
    tracing::info!("Assigned {} points into {} clusters", labels.len(), opts.k);

    Ok(())
}
