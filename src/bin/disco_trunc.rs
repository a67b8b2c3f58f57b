use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use clap::Parser;
use mif::DiscoFile;

/// Write the first vectors of a DISCO file behind an adjusted header.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Number of vectors to keep.
    nvec: usize,

    /// DISCO input file.
    input: PathBuf,

    /// Output file; stdout when absent.
    out: Option<PathBuf>,
}

fn main() -> mif::Result<()> {
    let cli = Cli::parse();

    let file = DiscoFile::open(&cli.input)?;
    eprintln!(
        "mapped database file '{}': ndata {} ndim {} descr {}",
        cli.input.display(),
        file.ndata(),
        file.ndim(),
        file.header().descrid
    );

    let mut out: Box<dyn Write> = match &cli.out {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(io::stdout().lock()),
    };
    let written = file.write_truncated(cli.nvec, &mut out)?;
    out.flush()?;

    eprintln!("wrote {written} bytes");
    Ok(())
}
