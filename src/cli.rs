//! Command-line surface: `sdtpatch [-v] <obj> [<obj> ...]`.

use clap::Parser;
use std::path::PathBuf;

/// Neutralize DTrace probe call sites in relocatable ELF objects.
#[derive(Parser, Debug)]
#[command(name = "sdtpatch", version, about)]
pub struct Args {
    /// Enable verbose diagnostic logging (section creation, each patch,
    /// each probe match).
    #[arg(short, long)]
    pub verbose: bool,

    /// Relocatable object files to patch in place.
    #[arg(required = true, num_args = 1..)]
    pub objects: Vec<PathBuf>,
}
