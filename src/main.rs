use clap::{Parser, Subcommand};
use flatfs::image::{CommitOptions, Image};
use flatfs::ops::{self, Upload};
use flatfs::{FsError, Record, RecordState};
use serde::Serialize;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fs-util", about = "Flat record container utilities for SD cards and disk images")]
struct Cli {
    /// Block device or image file holding the container
    #[arg(short, long, env = "FS_UTIL_DEV")]
    dev: PathBuf,
    /// After a rewrite, zero the stale bytes left behind by a longer image
    #[arg(long, global = true)]
    zero_fill: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List records
    List {
        #[arg(long)]
        json: bool,
    },
    /// Show record counts and image size
    Stat {
        #[arg(long)]
        json: bool,
    },
    /// Check name hashes and look for duplicate records
    Verify {
        /// Rewrite mismatched hashes
        #[arg(long)]
        fix: bool,
    },
    /// Upload a host file
    Upload {
        file: PathBuf,
        /// Overwrite an existing record of the same name
        #[arg(short, long)]
        force: bool,
    },
    /// Download a record to a host file
    Download {
        name: String,
        /// Destination path (default: ./<name>)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Mark a record deleted
    Delete {
        name: String,
    },
    /// Replace the whole image with the files of a host directory
    Rebuild {
        dir: PathBuf,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Drop deleted records
    Compact,
}

/// One line of `list --json`.
#[derive(Serialize)]
struct ListEntry<'a> {
    state:         RecordState,
    name:          &'a str,
    size:          u32,
    stored_hash:   u32,
    computed_hash: u32,
    good:          bool,
}

impl<'a> From<&'a Record> for ListEntry<'a> {
    fn from(r: &'a Record) -> Self {
        ListEntry {
            state:         r.state,
            name:          &r.name,
            size:          r.content_size(),
            stored_hash:   r.name_hash,
            computed_hash: r.computed_hash(),
            good:          r.hash_matches(),
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let commit_opts = CommitOptions { zero_fill: cli.zero_fill };

    let mut image = Image::open(&cli.dev)?;
    let scan = image.scan()?;
    let mut records = scan.records;

    let dirty = match cli.command {

        // ── List ─────────────────────────────────────────────────────────────
        Commands::List { json } => {
            if json {
                let entries: Vec<ListEntry> = records.iter().map(ListEntry::from).collect();
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                for r in &records {
                    let status = if r.hash_matches() { "good" } else { "bad" };
                    println!("{r}  {status}");
                }
            }
            false
        }

        // ── Stat ─────────────────────────────────────────────────────────────
        Commands::Stat { json } => {
            let s = ops::stat(&records, scan.end_offset, &scan.end);
            if json {
                println!("{}", serde_json::to_string_pretty(&s)?);
            } else {
                println!("  Device      {}", cli.dev.display());
                println!("  Records     {}", s.record_count);
                println!("  Active      {}", s.active_count);
                println!("  Deleted     {}", s.deleted_count);
                println!("  Image size  {} B", s.image_size);
                println!("  Scan end    {}", s.end);
            }
            false
        }

        // ── Verify ───────────────────────────────────────────────────────────
        Commands::Verify { fix } => {
            let report = ops::verify(&mut records, fix);
            for m in &report.mismatches {
                println!(
                    "  bad   #{:<4} {:<32} present={:#010x} computed={:#010x}{}",
                    m.index,
                    m.name,
                    m.stored,
                    m.computed,
                    if m.fixed { "  (fixed)" } else { "" }
                );
            }
            for d in &report.duplicates {
                println!("  dup   #{:<4} {:<32} same as #{}", d.index, records[d.index].name, d.first);
            }
            println!("{} problem(s)", report.problems());
            report.fixed() > 0
        }

        // ── Upload ───────────────────────────────────────────────────────────
        Commands::Upload { file, force } => {
            let data = std::fs::read(&file)?;
            match ops::upload(&mut records, &file, data, force)? {
                Upload::Appended { index } => println!("  added     #{index} {}", records[index].name),
                Upload::Replaced { index } => println!("  replaced  #{index} {}", records[index].name),
            }
            true
        }

        // ── Download ─────────────────────────────────────────────────────────
        Commands::Download { name, output } => {
            let data = ops::download(&records, &name)?;
            let output = output.unwrap_or_else(|| PathBuf::from(&name));
            std::fs::write(&output, data)?;
            println!("  {} -> {} ({} B)", name, output.display(), data.len());
            false
        }

        // ── Delete ───────────────────────────────────────────────────────────
        Commands::Delete { name } => {
            let index = ops::delete(&mut records, &name)?;
            println!("  deleted   #{index} {name}");
            true
        }

        // ── Rebuild ──────────────────────────────────────────────────────────
        Commands::Rebuild { dir, yes } => {
            let files = read_host_dir(&dir)?;
            if !yes && !confirm(&format!(
                "Replace all {} record(s) on {} with {} file(s) from {}?",
                records.len(),
                cli.dev.display(),
                files.len(),
                dir.display()
            ))? {
                return Err(FsError::Aborted.into());
            }
            records = ops::rebuild(files)?;
            for r in &records {
                println!("  packed  {}", r.name);
            }
            true
        }

        // ── Compact ──────────────────────────────────────────────────────────
        Commands::Compact => {
            let removed = ops::compact(&mut records);
            println!("  removed {removed} deleted record(s), {} kept", records.len());
            true
        }
    };

    if dirty {
        let summary = image.commit(&records, &commit_opts)?;
        println!("Wrote {} record(s), {} B", summary.records, summary.image_size);
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

/// Regular files directly inside `dir`, sorted by file name.
fn read_host_dir(dir: &Path) -> io::Result<Vec<(PathBuf, Vec<u8>)>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            paths.push(entry.path());
        }
    }
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    paths
        .into_iter()
        .map(|p| {
            let data = std::fs::read(&p)?;
            Ok((p, data))
        })
        .collect()
}

fn confirm(question: &str) -> io::Result<bool> {
    print!("{question} [y/N] ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
