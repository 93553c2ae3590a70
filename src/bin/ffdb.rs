//! ffdb CLI
//!
//! Command-line tools for manipulating ffindex/ffdata databases.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use ffdb::error::EXIT_OK;
use ffdb::fasta::{claim_checksum_id, DocumentChunker, FastaParser};
use ffdb::{Database, DataStore, FfError, IndexRow, PartitionTemplate, Result, TailPolicy};

// =============================================================================
// Argument Definitions
// =============================================================================

/// ffdb CLI
#[derive(Parser, Debug)]
#[command(name = "ffdb")]
#[command(about = "Tools for ffindex/ffdata flat-file document databases")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Split a database into n-record partitions
    Split(SplitArgs),

    /// Collect many databases into a single one
    Combine(CombineArgs),

    /// Create a database from multifasta files, many sequences per document
    Fasta(FastaArgs),

    /// Stream all documents into a single file, one per line-run
    Collect(CollectArgs),

    /// Rematerialize a database in size-sorted or explicit record order
    Order(OrderArgs),

    /// Filter records by include/exclude id lists
    Select(SelectArgs),

    /// Merge records sharing a name across databases into joined documents
    JoinConcat(JoinConcatArgs),
}

#[derive(Args, Debug)]
struct SplitArgs {
    /// The number of records for each partition to have
    #[arg(short = 'n', long, default_value = "100000")]
    size: usize,

    /// Output partition names; {name}, {index}, and {ext} are substituted
    #[arg(short, long, default_value = PartitionTemplate::DEFAULT_PATTERN)]
    basename: String,

    /// Write contiguous blocks instead of balancing chunks across the file
    #[arg(short, long)]
    unbalanced: bool,

    /// Drop a trailing single-record chunk instead of writing it
    /// (historical unbalanced-split behavior)
    #[arg(long)]
    drop_single_tail: bool,

    /// File of newline-separated ids giving the output order
    #[arg(long)]
    order: Option<PathBuf>,

    /// Memory-map the input ffdata file before reading chunks
    #[arg(long)]
    mmap: bool,

    /// The ffindex .ffdata file
    ffdata: PathBuf,

    /// The ffindex .ffindex file
    ffindex: PathBuf,
}

#[derive(Args, Debug)]
struct CombineArgs {
    /// The path to write the ffdata file to
    #[arg(short, long)]
    data: PathBuf,

    /// The path to write the ffindex file to
    #[arg(short, long)]
    index: PathBuf,

    /// The input .ffdata files followed by their .ffindex files
    #[arg(required = true, num_args = 2..)]
    files: Vec<PathBuf>,
}

#[derive(Args, Debug)]
struct FastaArgs {
    /// The path to write the ffdata file to
    #[arg(short, long)]
    data: PathBuf,

    /// The path to write the ffindex file to
    #[arg(short, long)]
    index: PathBuf,

    /// Deduplicate sequences by checksum and write an id->checksum mapping
    /// to this file
    #[arg(short, long)]
    checksum: Option<PathBuf>,

    /// File of ids (or checksums, with -c) to leave out of the database
    #[arg(short, long)]
    filter: Option<PathBuf>,

    /// The number of fasta records to use per document
    #[arg(short = 'n', long, default_value = "1")]
    size: usize,

    /// The fasta files to pull in
    #[arg(required = true, num_args = 1..)]
    fasta: Vec<PathBuf>,
}

#[derive(Args, Debug)]
struct CollectArgs {
    /// Trim this many lines from the start of each document
    #[arg(short, long)]
    trim: Option<usize>,

    /// Write to this file instead of stdout
    #[arg(short, long)]
    outfile: Option<PathBuf>,

    /// The input .ffdata files followed by their .ffindex files
    #[arg(required = true, num_args = 2..)]
    files: Vec<PathBuf>,
}

#[derive(Args, Debug)]
struct OrderArgs {
    /// The path to write the ffdata file to
    #[arg(short, long)]
    data: PathBuf,

    /// The path to write the ffindex file to
    #[arg(short, long)]
    index: PathBuf,

    /// File of newline-separated ids giving the output order; the default
    /// is descending document size
    #[arg(long)]
    order: Option<PathBuf>,

    /// Memory-map the input ffdata file before reading chunks
    #[arg(long)]
    mmap: bool,

    /// The ffindex .ffdata file
    ffdata: PathBuf,

    /// The ffindex .ffindex file
    ffindex: PathBuf,
}

#[derive(Args, Debug)]
struct SelectArgs {
    /// The path to write the ffdata file to
    #[arg(short, long)]
    data: PathBuf,

    /// The path to write the ffindex file to
    #[arg(short, long)]
    index: PathBuf,

    /// Only include ids from this file (newline-delimited)
    #[arg(short = 'n', long)]
    include: Option<PathBuf>,

    /// Exclude any ids from this file (newline-delimited)
    #[arg(short, long)]
    exclude: Option<PathBuf>,

    /// Memory-map the input ffdata file before reading chunks
    #[arg(long)]
    mmap: bool,

    /// The ffindex .ffdata file
    ffdata: PathBuf,

    /// The ffindex .ffindex file
    ffindex: PathBuf,
}

#[derive(Args, Debug)]
struct JoinConcatArgs {
    /// The path to write the ffdata file to
    #[arg(short, long)]
    data: PathBuf,

    /// The path to write the ffindex file to
    #[arg(short, long)]
    index: PathBuf,

    /// The input .ffdata files followed by their .ffindex files
    #[arg(required = true, num_args = 2..)]
    files: Vec<PathBuf>,
}

// =============================================================================
// Entry Point
// =============================================================================

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,ffdb=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    tracing::debug!("ffdb v{}", ffdb::VERSION);

    let code = match run(cli) {
        Ok(()) => EXIT_OK,
        // Downstream pipes closing early is normal, not a failure.
        Err(FfError::Io(ref e)) if e.kind() == io::ErrorKind::BrokenPipe => EXIT_OK,
        Err(e) => {
            tracing::error!("{}", e);
            e.exit_code()
        }
    };

    std::process::exit(code);
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Split(args) => cmd_split(args),
        Command::Combine(args) => cmd_combine(args),
        Command::Fasta(args) => cmd_fasta(args),
        Command::Collect(args) => cmd_collect(args),
        Command::Order(args) => cmd_order(args),
        Command::Select(args) => cmd_select(args),
        Command::JoinConcat(args) => cmd_join_concat(args),
    }
}

// =============================================================================
// Subcommands
// =============================================================================

fn cmd_split(args: SplitArgs) -> Result<()> {
    let mut db = open_database(&args.ffdata, &args.ffindex, args.mmap)?;

    let name = simple_name(&args.ffdata);
    let template = PartitionTemplate::new(args.basename.as_str());

    if args.unbalanced && args.order.is_none() {
        let tail = if args.drop_single_tail {
            TailPolicy::DropSingle
        } else {
            TailPolicy::Flush
        };
        let chunks = db.quick_partition(&name, &template, args.size, tail)?;
        tracing::info!("wrote {} contiguous partitions", chunks);
    } else {
        let order = args
            .order
            .as_deref()
            .map(|path| read_order(path, &db))
            .transpose()?;
        let chunks = db.partition(&name, &template, args.size, order)?;
        tracing::info!("wrote {} balanced partitions", chunks);
    }

    Ok(())
}

fn cmd_combine(args: CombineArgs) -> Result<()> {
    let mut inputs = open_paired_databases(&args.files)?;

    let mut out = Database::new(DataStore::from_file(create_output(&args.data)?));
    out.concat(&mut inputs)?;

    write_index(&out, &args.index)?;
    tracing::info!("combined {} databases, {} records", inputs.len(), out.len());
    Ok(())
}

fn cmd_fasta(args: FastaArgs) -> Result<()> {
    let mut out = Database::new(DataStore::from_file(create_output(&args.data)?));

    let mut mapping = args
        .checksum
        .as_deref()
        .map(|path| create_output(path).map(BufWriter::new))
        .transpose()?;

    let filter: HashSet<String> = match args.filter.as_deref() {
        Some(path) => read_id_lines(path)?
            .into_iter()
            .map(|id| String::from_utf8_lossy(&id).into_owned())
            .collect(),
        None => HashSet::new(),
    };

    let mut seen = HashSet::new();
    let mut chunker = DocumentChunker::new(args.size);

    for path in &args.fasta {
        let reader = BufReader::new(File::open(path)?);
        for record in FastaParser::new(reader) {
            let mut record = record?;

            if let Some(mapping) = mapping.as_mut() {
                // Checksum mode: content-addressed ids with dedup.
                let checksum = record.checksum();
                if filter.contains(&checksum) {
                    continue;
                }
                writeln!(mapping, "{}\t{}", record.id, checksum)?;
                if !claim_checksum_id(&mut record, checksum, &mut seen) {
                    continue;
                }
            } else if !filter.is_empty() && filter.contains(&record.id) {
                continue;
            }

            if let Some((name, document)) = chunker.push(&record) {
                out.append_raw(name.into_bytes(), &document)?;
            }
        }
    }

    if let Some((name, document)) = chunker.finish() {
        out.append_raw(name.into_bytes(), &document)?;
    }

    if let Some(mut mapping) = mapping {
        mapping.flush()?;
    }

    write_index(&out, &args.index)?;
    tracing::info!("ingested {} documents", out.len());
    Ok(())
}

fn cmd_collect(args: CollectArgs) -> Result<()> {
    let pairs = pair_files(&args.files)?;

    let mut sink: Box<dyn Write> = match args.outfile.as_deref() {
        Some(path) => Box::new(BufWriter::new(create_output(path)?)),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    for (data_path, index_path) in pairs {
        let mut db = open_database(&data_path, &index_path, false)?;
        db.collect_into(&mut sink, args.trim)?;
    }

    sink.flush()?;
    Ok(())
}

fn cmd_order(args: OrderArgs) -> Result<()> {
    let mut db = open_database(&args.ffdata, &args.ffindex, args.mmap)?;

    let order = args
        .order
        .as_deref()
        .map(|path| read_order(path, &db))
        .transpose()?;

    let store = DataStore::from_file(create_output(&args.data)?);
    let out = Database::reorder_from(&mut db, store, order)?;

    write_index(&out, &args.index)
}

fn cmd_select(args: SelectArgs) -> Result<()> {
    if args.include.is_none() && args.exclude.is_none() {
        return Err(FfError::Usage(
            "either --include or --exclude must be specified for 'select'".to_string(),
        ));
    }

    let include = read_optional_id_set(args.include.as_deref())?;
    let exclude = read_optional_id_set(args.exclude.as_deref())?;

    let mut db = open_database(&args.ffdata, &args.ffindex, args.mmap)?;

    let store = DataStore::from_file(create_output(&args.data)?);
    let out = db.select(&include, &exclude, store)?;

    write_index(&out, &args.index)?;
    tracing::info!("selected {} of {} records", out.len(), db.len());
    Ok(())
}

fn cmd_join_concat(args: JoinConcatArgs) -> Result<()> {
    let mut inputs = open_paired_databases(&args.files)?;

    let store = DataStore::from_file(create_output(&args.data)?);
    let out = Database::join_concat(&mut inputs, store)?;

    write_index(&out, &args.index)?;
    tracing::info!("joined into {} merged records", out.len());
    Ok(())
}

// =============================================================================
// Helpers
// =============================================================================

fn create_output(path: &Path) -> Result<File> {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)?;
    Ok(file)
}

fn open_database(data_path: &Path, index_path: &Path, mmap: bool) -> Result<Database> {
    let data_file = File::open(data_path)?;
    let store = if mmap {
        DataStore::map_file(&data_file)?
    } else {
        DataStore::from_file(data_file)
    };
    let index_reader = BufReader::new(File::open(index_path)?);
    Database::open(store, index_reader)
}

/// Split `ffdata... ffindex...` positionals into (data, index) pairs.
///
/// The lists are given back to back, so an odd count cannot pair up.
fn pair_files(files: &[PathBuf]) -> Result<Vec<(PathBuf, PathBuf)>> {
    if files.len() % 2 != 0 {
        return Err(FfError::Usage(
            "there should be the same number of ffdata and ffindex files".to_string(),
        ));
    }

    let half = files.len() / 2;
    Ok(files[..half]
        .iter()
        .cloned()
        .zip(files[half..].iter().cloned())
        .collect())
}

fn open_paired_databases(files: &[PathBuf]) -> Result<Vec<Database>> {
    let mut databases = Vec::new();
    for (data_path, index_path) in pair_files(files)? {
        databases.push(open_database(&data_path, &index_path, false)?);
    }
    Ok(databases)
}

/// Read newline-delimited ids, skipping blank lines.
fn read_id_lines(path: &Path) -> Result<Vec<Vec<u8>>> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut ids = Vec::new();
    let mut line = Vec::new();

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        while line.last().is_some_and(|b| b.is_ascii_whitespace()) {
            line.pop();
        }
        if line.is_empty() {
            continue;
        }
        ids.push(line.clone());
    }

    Ok(ids)
}

fn read_optional_id_set(path: Option<&Path>) -> Result<HashSet<Bytes>> {
    match path {
        Some(path) => Ok(read_id_lines(path)?
            .into_iter()
            .map(Bytes::from)
            .collect()),
        None => Ok(HashSet::new()),
    }
}

/// Resolve an order file's ids against the database index.
fn read_order(path: &Path, db: &Database) -> Result<Vec<IndexRow>> {
    let mut rows = Vec::new();
    for id in read_id_lines(path)? {
        rows.push(db.index().lookup_by_name(&id)?.clone());
    }
    Ok(rows)
}

fn write_index(db: &Database, path: &Path) -> Result<()> {
    let mut writer = BufWriter::new(create_output(path)?);
    db.index().write_to(&mut writer)?;
    writer.flush()?;
    Ok(())
}

/// Input basename with the extension stripped.
fn simple_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "db".to_string())
}
