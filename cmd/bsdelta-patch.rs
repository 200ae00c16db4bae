#![forbid(unsafe_code)]
use std::fs;
use std::io;
use std::io::prelude::*;
use std::process;

use bsdelta::Bspatch;
use clap::Parser;
use log::info;

#[derive(Parser, Debug)]
#[command(
    name = "bsdelta-patch",
    version,
    about = "bsdiff 4.x compatible patcher",
    long_about = None,
)]
struct BspatchArgs {
    /// source file, `-` for stdin
    #[arg(value_name = "SOURCE")]
    source_path: String,

    /// target file, `-` for stdout
    #[arg(value_name = "TARGET")]
    target_path: String,

    /// patch file
    #[arg(value_name = "PATCH")]
    patch_path: String,

    /// buffer size
    #[arg(short = 'b', value_name = "BUFFER")]
    buffer_size: Option<usize>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp(None)
        .init();

    let args = BspatchArgs::parse();
    if let Err(e) = execute(args) {
        eprintln!("error: {}", e);
        process::exit(1);
    }
}

fn execute(args: BspatchArgs) -> bsdelta::Result<()> {
    // setup input
    let mut source;
    if args.source_path == "-" {
        source = Vec::new();
        io::stdin().read_to_end(&mut source)?;
    } else {
        source = fs::read(&args.source_path)?;
    }
    source.shrink_to_fit();
    let patch = fs::read(&args.patch_path)?;

    // setup patcher
    let mut bspatch = Bspatch::new(&patch[..])?;
    if let Some(buffer_size) = args.buffer_size {
        bspatch = bspatch.buffer_size(buffer_size);
    }

    // the target file is only created once the patch is known to apply
    let mut target = Vec::new();
    let size = bspatch.apply(&source[..], &mut target)?;
    if args.target_path == "-" {
        io::stdout().write_all(&target[..])?;
    } else {
        fs::write(&args.target_path, &target[..])?;
    }
    info!("{}: wrote {} bytes", args.target_path, size);
    Ok(())
}
