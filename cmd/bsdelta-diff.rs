#![forbid(unsafe_code)]
use std::fs;
use std::io;
use std::io::prelude::*;
use std::process;

use bsdelta::{Bsdiff, Compression, ParallelScheme};
use clap::Parser;
use log::info;

#[derive(Parser, Debug)]
#[command(
    name = "bsdelta-diff",
    version,
    about = "bsdiff 4.x compatible delta compressor",
    long_about = None,
)]
struct BsdiffArgs {
    /// source file, `-` for stdin
    #[arg(value_name = "SOURCE")]
    source_path: String,

    /// target file, `-` for stdin
    #[arg(value_name = "TARGET")]
    target_path: String,

    /// patch file, `-` for stdout
    #[arg(value_name = "PATCH")]
    patch_path: String,

    /// bzip2 compression level
    #[arg(short = 'l', value_name = "LEVEL", default_value_t = 9,
          value_parser = clap::value_parser!(u32).range(1..=9))]
    level: u32,

    /// number of parallel jobs, 0 to choose automatically
    #[arg(short = 'j', value_name = "JOBS")]
    jobs: Option<usize>,

    /// buffer size
    #[arg(short = 'b', value_name = "BUFFER")]
    buffer_size: Option<usize>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp(None)
        .init();

    let args = BsdiffArgs::parse();
    if let Err(e) = execute(args) {
        eprintln!("error: {}", e);
        process::exit(1);
    }
}

fn execute(args: BsdiffArgs) -> bsdelta::Result<()> {
    if args.source_path == "-" && args.target_path == "-" {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "source and target could not be stdin at the same time",
        )
        .into());
    }

    // setup input/output
    let source = read_input(&args.source_path)?;
    let target = read_input(&args.target_path)?;
    let patch: Box<dyn Write> = if args.patch_path == "-" {
        Box::new(io::stdout())
    } else {
        Box::new(io::BufWriter::new(fs::File::create(&args.patch_path)?))
    };

    // setup delta compressor
    let mut bsdiff = Bsdiff::new(&source[..], &target[..])
        .compression_level(Compression::new(args.level));
    if let Some(jobs) = args.jobs {
        bsdiff = bsdiff.parallel_scheme(ParallelScheme::NumJobs(jobs));
    }
    if let Some(buffer_size) = args.buffer_size {
        bsdiff = bsdiff.buffer_size(buffer_size);
    }

    // execute delta compressor
    let size = bsdiff.compare(patch)?;
    info!(
        "{} -> {}: {} bytes patch for {} bytes target",
        args.source_path,
        args.target_path,
        size,
        target.len()
    );
    Ok(())
}

fn read_input(path: &str) -> io::Result<Vec<u8>> {
    let mut data;
    if path == "-" {
        data = Vec::new();
        io::stdin().read_to_end(&mut data)?;
    } else {
        data = fs::read(path)?;
    }
    data.shrink_to_fit();
    Ok(data)
}
