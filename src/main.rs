mod reusablebufread;

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Error};
use clap::{ArgEnum, Parser};
use rayon::prelude::*;

use internpool::arena::DEFAULT_CHUNK_CAPACITY;
use internpool::hash_set::DEFAULT_TABLE_SIZE;
use internpool::hashers::{blake3_32, compare_bytes, djb2, fnv1a_32};
use internpool::{ByteHashFn, InternPool, PoolOptions, Synchronized};

use crate::reusablebufread::ReusableBufRead;

/// Intern every line of a set of files and report what was stored.
#[derive(Parser)]
#[clap(version)]
struct Cli {
    /// Hash function used to place values in the table.
    #[clap(long, arg_enum, default_value = "fnv1a")]
    hash: HashKind,

    /// Worker threads. Defaults to one per core.
    #[clap(short, long)]
    jobs: Option<usize>,

    /// Initial hash table size.
    #[clap(long, default_value_t = DEFAULT_TABLE_SIZE)]
    table_size: u32,

    /// Smallest arena chunk in bytes.
    #[clap(long, default_value_t = DEFAULT_CHUNK_CAPACITY)]
    chunk_size: u32,

    /// Fail once the arena would hold more than this many bytes.
    #[clap(long)]
    memory_limit: Option<usize>,

    /// Look a value up again under the write lock before copying it.
    #[clap(long)]
    recheck: bool,

    /// Print the distinct lines in the order they were first seen.
    #[clap(long)]
    unique: bool,

    /// Files or directories to read.
    #[clap(parse(from_os_str), required = true)]
    paths: Vec<PathBuf>,
}

#[derive(ArgEnum, Clone, Copy, Debug)]
enum HashKind {
    Fnv1a,
    Djb2,
    Blake3,
}

impl HashKind {
    fn function(self) -> ByteHashFn {
        match self {
            HashKind::Fnv1a => fnv1a_32,
            HashKind::Djb2 => djb2,
            HashKind::Blake3 => blake3_32,
        }
    }
}

fn main() -> Result<(), Error> {
    env_logger::init();
    let cli = Cli::parse();

    if let Some(jobs) = cli.jobs {
        rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .build_global()
            .context("failed to start worker threads")?;
    }

    let files = collect_files(&cli.paths)?;
    log::debug!("interning lines of {} files", files.len());

    let pool = InternPool::<Synchronized>::with_options(
        PoolOptions {
            table_size: cli.table_size,
            chunk_capacity: cli.chunk_size,
            memory_limit: cli.memory_limit,
            recheck_before_append: cli.recheck,
        },
        cli.hash.function(),
        compare_bytes,
    );

    let lines_read = files
        .par_iter()
        .map_init(ReusableBufRead::new, |reader, path| {
            intern_file(&pool, reader, path)
        })
        .try_reduce(|| 0, |a, b| Ok(a + b))?;

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    if cli.unique {
        for value in pool.snapshot() {
            out.write_all(&value)?;
            out.write_all(b"\n")?;
        }
    } else {
        writeln!(out, "lines read: {}", lines_read)?;
        writeln!(out, "{}", pool.stats())?;
    }

    out.flush()?;
    Ok(())
}

fn collect_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>, Error> {
    let mut files = Vec::new();

    for path in paths {
        let metadata =
            fs::metadata(path).with_context(|| format!("failed to read {}", path.display()))?;
        if metadata.is_file() {
            files.push(path.clone());
            continue;
        }

        for entry in jwalk::WalkDir::new(path).sort(true) {
            let entry = entry.with_context(|| format!("failed to walk {}", path.display()))?;
            if entry.file_type().is_file() {
                files.push(entry.path());
            }
        }
    }

    Ok(files)
}

fn intern_file(
    pool: &InternPool<Synchronized>,
    reader: &mut ReusableBufRead<File>,
    path: &Path,
) -> Result<usize, Error> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut lease = reader.lease(file);

    lease
        .for_each_line(|line| {
            pool.intern(line)?;
            Ok::<_, Error>(())
        })
        .with_context(|| format!("failed to intern lines of {}", path.display()))
}
