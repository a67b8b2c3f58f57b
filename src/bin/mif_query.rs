use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, ValueEnum};
use mif::{
    DiscoEuclidean, DiscoFile, KlsDivergence, Metric, Mif, MifDb, ObjectId, ObjectStore,
    PostingList,
};

const BLOCKSIZE: usize = 4096;

/// Query the first vectors of a DISCO query file against a stored
/// index, writing one result line per query.
#[derive(Parser)]
#[command(author, version, about, long_about = None, allow_negative_numbers = true)]
struct Cli {
    /// Number of reference objects consulted per query, -1 for the default numref/4.
    ks: i64,

    /// Maximum position difference for posting-list lookup, -1 for the default 5.
    mpd: i64,

    /// Path of the index database.
    dbname: PathBuf,

    /// DISCO query file.
    query: PathBuf,

    /// Number of query vectors, -1 for all.
    #[arg(default_value_t = -1)]
    nquery: i64,

    /// Number of neighbours per query.
    #[arg(default_value_t = 5)]
    k: usize,

    /// Result file; stdout when absent.
    out: Option<PathBuf>,

    /// Distance the index was built under.
    #[arg(long, value_enum, default_value_t = MetricKind::Kls)]
    metric: MetricKind,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
enum MetricKind {
    Kls,
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
    let db = MifDb::open(&cli.dbname)?;

    // the database records which files the index covers
    let (filenames, query_header) = {
        let reader = db.reader()?;
        eprintln!("opened index database '{}'", cli.dbname.display());

        let filenames: Vec<String> =
            reader.files()?.into_iter().map(|(_, name, _)| name).collect();
        (filenames, DiscoFile::open(&cli.query)?.header())
    };

    let start = Instant::now();
    let mut store = ObjectStore::from_files(&filenames)?;
    let nfiles = store.num_blocks() as u32;

    // the query file joins the store as the last block; dimension and
    // descriptor compatibility is checked on the way in
    store.map_file(&cli.query)?;
    eprintln!(
        "mapped query file '{}': ndata {} ndim {} descr {}",
        cli.query.display(),
        query_header.ndata,
        query_header.ndim,
        query_header.descrid
    );

    let mut index = Mif::load(&store, metric, &db)?;
    let loadtime = start.elapsed().as_secs_f64();
    eprintln!(
        "time for loading index = {loadtime:.6} s, {:.6} s / obj",
        loadtime / index.num_objects().max(1) as f64
    );

    let ks = if cli.ks > 0 { cli.ks as usize } else { index.numref() / 4 };
    let mpd = if cli.mpd > 0 { cli.mpd as usize } else { 5 };
    index.set_search_params(ks.min(index.ki()), mpd.min(index.ki()))?;

    eprintln!("{index}");

    let mut out: Box<dyn Write> = match &cli.out {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(io::stdout().lock()),
    };

    let nquery = match cli.nquery {
        n if n >= 0 => (n as usize).min(query_header.ndata as usize),
        _ => query_header.ndata as usize,
    };

    let start = Instant::now();
    for i in 0..nquery as u32 {
        let query = ObjectId::new(nfiles, i);
        let found = index.search_knn(query, cli.k);

        write!(out, "{query} {}", cli.k)?;
        for (obj, dist) in &found {
            write!(out, " {obj} {dist}")?;
        }
        writeln!(out)?;
    }
    out.flush()?;
    let querytime = start.elapsed().as_secs_f64();

    let profile = index.profile();
    eprintln!("{profile}");
    eprintln!(
        "#accesses predicted: {}",
        index.ks() * (index.mpd() * 2 + 1) * index.num_objects() / index.numref().max(1)
    );

    let bytesaccpl = profile.placcess * std::mem::size_of::<PostingList>();
    let bytesaccessed = bytesaccpl + profile.indexaccess * std::mem::size_of::<ObjectId>();
    let bytesaccopt = bytesaccpl + profile.indexaccess * 4;
    let bytesacczip = bytesaccpl + profile.indexaccess_bytes;
    for (what, bytes) in [
        ("index", bytesaccessed),
        ("optimal index", bytesaccopt),
        ("zipped index", bytesacczip),
    ] {
        eprintln!(
            "#bytes accessed in {what}: {:.6} MB = {} blocks of {BLOCKSIZE}",
            bytes as f64 / 1e6,
            bytes.div_ceil(BLOCKSIZE)
        );
    }
    eprintln!(
        "time for {nquery} queries = {querytime:.6} s, {:.6} s / queryobj",
        querytime / nquery.max(1) as f64
    );

    Ok(())
}
