use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, ValueEnum};
use mif::{
    Deflate, DiscoEuclidean, Identity, KlsDivergence, Metric, Mif, MifDb, MifParams, ObjectStore,
};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Index DISCO input files and store the index in a database.
#[derive(Parser)]
#[command(author, version, about, long_about = None, allow_negative_numbers = true)]
struct Cli {
    /// Number of reference objects, -1 for the default 2·√(number of objects).
    numref: i64,

    /// Number of reference objects used for indexing, -1 for the default numref/4.
    ki: i64,

    /// Path of the index database to create.
    dbname: PathBuf,

    /// DISCO input files to index.
    #[arg(required = true)]
    input: Vec<PathBuf>,

    /// Distance to index under.
    #[arg(long, value_enum, default_value_t = MetricKind::Kls)]
    metric: MetricKind,

    /// Deflate the stored posting-list blobs.
    #[arg(long)]
    compress: bool,

    /// Seed of the reference-object sampling.
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
enum MetricKind {
    /// Symmetrised Kullback-Leibler divergence over mean+covariance frames.
    Kls,
    /// Euclidean distance over whole rows.
    Euclidean,
}

fn main() -> mif::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.metric {
        MetricKind::Kls => run(&cli, KlsDivergence::default()),
        MetricKind::Euclidean => run(&cli, DiscoEuclidean),
    }
}

fn run<D: Metric>(cli: &Cli, metric: D) -> mif::Result<()> {
    let store = ObjectStore::from_files(&cli.input)?;
    let ntotal = store.num_objects_total();

    for base in 0..store.num_blocks() as u32 {
        eprintln!(
            "mapped database file '{}': ndata {} ndim {} descr {}",
            store.filename(base),
            store.num_objects(base),
            store.dim(),
            store.descrid()
        );
    }

    let defaults = MifParams::defaults_for(ntotal);
    let params = MifParams {
        numref: if cli.numref > 0 { cli.numref as usize } else { defaults.numref },
        ki: if cli.ki > 0 { cli.ki as usize } else { defaults.ki },
    };

    let mut index = Mif::new(&store, metric, params)?;
    let mut rng = StdRng::seed_from_u64(cli.seed);

    let start = Instant::now();
    index.build(&mut rng);
    let buildtime = start.elapsed().as_secs_f64();

    eprintln!("{index}");
    eprintln!("{}", index.profile());
    eprintln!(
        "time for building of index = {buildtime:.6} s, {:.6} s / obj",
        buildtime / ntotal.max(1) as f64
    );

    let db = MifDb::open(&cli.dbname)?;
    let name = cli.dbname.display().to_string();

    let start = Instant::now();
    if cli.compress {
        index.dump(&db, &name, Deflate)?;
    } else {
        index.dump(&db, &name, Identity)?;
    }
    let dumptime = start.elapsed().as_secs_f64();

    eprintln!(
        "time for dumping index = {dumptime:.6} s, {:.6} s / obj",
        dumptime / ntotal.max(1) as f64
    );

    Ok(())
}
