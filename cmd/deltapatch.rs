#![forbid(unsafe_code)]
use std::fs;
use std::path::PathBuf;
use std::process;

use clap::{ArgAction, CommandFactory, Parser, ValueEnum};
use deltachain::{digest, BsdiffEngine, DeltaEngine, Error, Patcher};
#[cfg(windows)]
use deltachain::MsDeltaEngine;
use log::{debug, LevelFilter};

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum EngineKind {
    /// Windows delta compression API
    #[cfg(windows)]
    Msdelta,
    /// portable engine for bsdiff 4.x payloads
    Bsdiff,
}

#[cfg(windows)]
const DEFAULT_ENGINE: EngineKind = EngineKind::Msdelta;
#[cfg(not(windows))]
const DEFAULT_ENGINE: EngineKind = EngineKind::Bsdiff;

#[derive(Parser, Debug)]
#[command(
    name = "deltapatch",
    version,
    about = "apply a chain of delta patches to a file",
    long_about = None,
)]
struct DeltapatchArgs {
    /// file to patch
    #[arg(short = 'i', long = "input-file", value_name = "INPUT")]
    input_path: PathBuf,

    /// destination to write the patched file to
    #[arg(short = 'o', long = "output-file", value_name = "OUTPUT")]
    output_path: Option<PathBuf>,

    /// don't write the result, only check the chain applies and print its hash
    #[arg(short = 'd', long)]
    dry_run: bool,

    /// let the engine accept the legacy PA19 format
    #[arg(short = 'l', long)]
    legacy: bool,

    /// delta engine
    #[arg(short = 'e', long, value_enum, default_value_t = DEFAULT_ENGINE)]
    engine: EngineKind,

    /// more logging (repeatable)
    #[arg(short = 'v', long, action = ArgAction::Count)]
    verbose: u8,

    /// only log errors
    #[arg(short = 'q', long, conflicts_with = "verbose")]
    quiet: bool,

    /// patches to apply, in order
    #[arg(value_name = "PATCH", required = true)]
    patch_paths: Vec<PathBuf>,
}

fn main() {
    let args = DeltapatchArgs::parse();
    init_logger(&args);

    if !args.dry_run && args.output_path.is_none() {
        eprintln!("Either specify -d or -o");
        DeltapatchArgs::command().print_help().ok();
        process::exit(1);
    }

    if let Err(e) = execute(args) {
        eprintln!("error: {}", e);
        process::exit(1);
    }
}

fn init_logger(args: &DeltapatchArgs) {
    let level = match (args.verbose, args.quiet) {
        (0, true) => LevelFilter::Error,
        (0, false) => LevelFilter::Warn,
        (1, _) => LevelFilter::Info,
        (2, _) => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    // RUST_LOG, when set, takes precedence over -v/-q
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn execute(args: DeltapatchArgs) -> Result<(), Error> {
    // load input and patches
    let source = fs::read(&args.input_path)?;
    debug!("{:?}: {} bytes", args.input_path, source.len());
    let mut patches = Vec::with_capacity(args.patch_paths.len());
    for path in args.patch_paths.iter() {
        let patch = fs::read(path)?;
        debug!("{:?}: {} bytes", path, patch.len());
        patches.push(patch);
    }

    match args.engine {
        #[cfg(windows)]
        EngineKind::Msdelta => run(&MsDeltaEngine::new(), &args, &source[..], &patches[..]),
        EngineKind::Bsdiff => run(&BsdiffEngine::new(), &args, &source[..], &patches[..]),
    }
}

fn run<E: DeltaEngine>(
    engine: &E,
    args: &DeltapatchArgs,
    source: &[u8],
    patches: &[Vec<u8>],
) -> Result<(), Error> {
    let patched = Patcher::new(engine)
        .legacy(args.legacy)
        .apply_chain(source, patches)?;

    if !args.dry_run {
        if let Some(ref output_path) = args.output_path {
            fs::write(output_path, &patched[..])?;
        }
    }

    let n = patches.len();
    println!(
        "Applied {} patch{} successfully",
        n,
        if n > 1 { "es" } else { "" }
    );
    println!("Final hash: {}", digest(&patched[..]));
    Ok(())
}
