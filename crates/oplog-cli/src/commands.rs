use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use colored::Colorize;
use oplog_store::{Database, RecordKind};
use oplog_types::ObjectId;
use rand::Rng;
use serde_json::{Map, Value};
use tracing::debug;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let data_dir = resolve_data_dir(cli.data_dir)?;
    match cli.command {
        Command::Seed(args) => cmd_seed(&data_dir, args),
        Command::Ls(_) => cmd_ls(&data_dir),
        Command::Show(args) => cmd_show(&data_dir, args),
        Command::Dump(args) => cmd_dump(&data_dir, args),
    }
}

/// Directory discovery is a CLI concern: probe the conventional `./data`
/// directory, otherwise require an explicit path. The core only ever sees
/// a validated path.
fn resolve_data_dir(explicit: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    if let Some(dir) = explicit {
        return Ok(dir);
    }
    let candidate = PathBuf::from("data");
    if candidate.is_dir() {
        return Ok(candidate);
    }
    bail!("no ./data directory here; pass --data-dir");
}

fn cmd_seed(data_dir: &Path, args: SeedArgs) -> anyhow::Result<()> {
    let mut db = Database::open(data_dir)?;
    db.ensure_collection(&args.collection, RecordKind::new("user"))?;
    db.load()?;

    debug!(count = args.count, collection = %args.collection, "seeding fake users");
    let mut rng = rand::thread_rng();
    let collection = db
        .collection_mut(&args.collection)
        .context("collection vanished after load")?;
    for _ in 0..args.count {
        collection.create(fake_user(&mut rng))?;
    }

    // Wait for the flush barrier before claiming the data is on disk.
    db.close()?;
    println!(
        "{} wrote {} records to {}",
        "✓".green().bold(),
        args.count.to_string().bold(),
        db.collection(&args.collection)
            .context("collection vanished after close")?
            .oplog_path()
            .display()
    );
    Ok(())
}

fn fake_user(rng: &mut impl Rng) -> Map<String, Value> {
    let mut payload = Map::new();
    payload.insert(
        "username".into(),
        Value::String(ObjectId::generate().to_string()),
    );
    payload.insert(
        "email".into(),
        Value::String(format!(
            "{}@{}.com",
            ObjectId::generate(),
            ObjectId::generate()
        )),
    );
    payload.insert(
        "mobile".into(),
        Value::String(rng.gen_range(0..99_999u32).to_string()),
    );
    payload.insert(
        "about_me".into(),
        Value::String("I am a lovely\nsnowflake.".into()),
    );
    payload
}

fn cmd_ls(data_dir: &Path) -> anyhow::Result<()> {
    let mut db = Database::open(data_dir)?;
    let names = discover_collections(&mut db, data_dir)?;
    if names.is_empty() {
        println!("No collections in {}.", data_dir.display());
        return Ok(());
    }
    db.load()?;

    for name in names {
        let collection = db.collection(&name).context("discovered collection vanished")?;
        println!(
            "{}  {} objects  {}",
            name.yellow().bold(),
            collection.len().to_string().bold(),
            collection.oplog_path().display().to_string().dimmed()
        );
    }
    Ok(())
}

fn cmd_show(data_dir: &Path, args: ShowArgs) -> anyhow::Result<()> {
    let mut db = Database::open(data_dir)?;
    db.ensure_collection(&args.collection, RecordKind::new("record"))?;
    db.load()?;

    let id = ObjectId::parse(args.id.as_str())?;
    let collection = db
        .collection(&args.collection)
        .context("collection vanished after load")?;
    match collection.get(&id) {
        Some(object) => {
            println!("{}", serde_json::to_string_pretty(object.payload())?);
            Ok(())
        }
        None => bail!(
            "object {} not found in collection {}",
            id,
            args.collection
        ),
    }
}

fn cmd_dump(data_dir: &Path, args: DumpArgs) -> anyhow::Result<()> {
    let mut db = Database::open(data_dir)?;
    db.ensure_collection(&args.collection, RecordKind::new("record"))?;
    db.load()?;

    let collection = db
        .collection(&args.collection)
        .context("collection vanished after load")?;
    for (_, object) in collection.iter() {
        println!("{}", object.to_json());
    }
    Ok(())
}

/// Register every `<name>.oplog` file in the data directory. A thin
/// inspection heuristic; the core itself never discovers collections.
fn discover_collections(db: &mut Database, data_dir: &Path) -> anyhow::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(data_dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("oplog") {
            continue;
        }
        if let Some(name) = path.file_stem().and_then(|s| s.to_str()) {
            db.ensure_collection(name, RecordKind::new("record"))?;
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}
