use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "oplogdb",
    about = "Embedded oplog-backed object store",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Storage directory. Defaults to ./data when that directory exists.
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Generate a collection of fake user records
    Seed(SeedArgs),
    /// List collections and their live object counts
    Ls(LsArgs),
    /// Print one object as pretty JSON
    Show(ShowArgs),
    /// Print every object in a collection, one JSON line each
    Dump(DumpArgs),
}

#[derive(Args)]
pub struct SeedArgs {
    /// Collection to write into
    #[arg(long, default_value = "users")]
    pub collection: String,
    /// Number of records to create
    #[arg(short = 'n', long, default_value = "10000")]
    pub count: usize,
}

#[derive(Args)]
pub struct LsArgs {}

#[derive(Args)]
pub struct ShowArgs {
    pub collection: String,
    pub id: String,
}

#[derive(Args)]
pub struct DumpArgs {
    pub collection: String,
}
