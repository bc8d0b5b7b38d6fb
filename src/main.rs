//! flatmsg CLI
//!
//! - `dump`: decode format apa pun, print seperti PrintToStream
//! - `convert`: decode format apa pun, tulis ulang sebagai native
//! - `bench`: ukur latency add / find / flatten / unflatten

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::{Parser, Subcommand};
use flatmsg::protocol::detect_format;
use flatmsg::{MessageFile, MessageStore, Result, StoreConfig, TypeCode};

#[derive(Parser, Debug)]
#[command(name = "flatmsg", about = "Inspect and convert flattened messages", version)]
struct Cli {
    /// Log level debug (default: RUST_LOG atau warn)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Bucket count untuk name hash table
    #[arg(long, global = true, default_value_t = flatmsg::config::DEFAULT_HASH_TABLE_SIZE)]
    hash_buckets: usize,

    /// Cap preallocation data arena (bytes)
    #[arg(long, global = true, default_value_t = flatmsg::config::MAX_DATA_PREALLOCATION)]
    max_prealloc: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print isi flattened message
    Dump { path: PathBuf },

    /// Tulis ulang message (format apa pun) sebagai native
    Convert { input: PathBuf, output: PathBuf },

    /// Micro-benchmark operasi store dan codec
    Bench {
        #[arg(long, default_value_t = 100_000)]
        iterations: usize,

        #[arg(long, default_value_t = 16)]
        fields: usize,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let config = StoreConfig::default()
        .with_hash_table_size(cli.hash_buckets)
        .with_max_data_prealloc(cli.max_prealloc);

    let result = match cli.command {
        Command::Dump { path } => dump(&path, config),
        Command::Convert { input, output } => convert(&input, &output, config),
        Command::Bench { iterations, fields } => bench(iterations.max(1), fields.max(1), config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{}", err);
            eprintln!("flatmsg: {}", err);
            ExitCode::FAILURE
        }
    }
}

fn dump(path: &Path, config: StoreConfig) -> Result<()> {
    let file = MessageFile::open(path)?;
    let format = detect_format(file.bytes())?;
    let msg = MessageStore::unflatten_with_config(file.bytes(), config)?;

    println!("# {} ({} bytes, {} format)", path.display(), file.len(), format.name);
    print!("{}", msg);
    Ok(())
}

fn convert(input: &Path, output: &Path, config: StoreConfig) -> Result<()> {
    let bytes = fs::read(input)?;
    let msg = MessageStore::unflatten_with_config(&bytes, config)?;
    let file = MessageFile::create(output, &msg)?;

    println!(
        "{} -> {}: {} fields, {} bytes",
        input.display(),
        output.display(),
        msg.count_names(TypeCode::ANY),
        file.len()
    );
    Ok(())
}

fn report(label: &str, ops: usize, started: Instant) {
    let elapsed = started.elapsed();
    let ns = elapsed.as_nanos() as f64 / ops as f64;
    println!(
        "  {:<10} {:>10.2} ns/op ({:.3} μs/op), {:.2} M ops/sec",
        label,
        ns,
        ns / 1000.0,
        ops as f64 / elapsed.as_secs_f64().max(f64::EPSILON) / 1_000_000.0
    );
}

fn bench(iterations: usize, fields: usize, config: StoreConfig) -> Result<()> {
    println!("📊 MessageStore Benchmark");
    println!("-------------------------");
    println!("  Iterations: {}, fields: {}\n", iterations, fields);

    let names: Vec<String> = (0..fields).map(|i| format!("field_{}", i)).collect();

    // Add: satu item per field, store di-reset setiap putaran
    let mut msg = MessageStore::with_config(0, config)?;
    let started = Instant::now();
    for i in 0..iterations {
        if i % fields == 0 {
            msg.make_empty();
        }
        msg.add_value(&names[i % fields], i as i64)?;
    }
    report("add", iterations, started);

    // Find atas store penuh
    msg.make_empty();
    for (i, name) in names.iter().enumerate() {
        msg.add_value(name, i as i64)?;
        msg.add_string(name.as_str().trim_start_matches("field_"), name)?;
    }
    let started = Instant::now();
    let mut checksum = 0i64;
    for i in 0..iterations {
        checksum = checksum.wrapping_add(msg.find_value::<i64>(&names[i % fields], 0)?);
    }
    report("find", iterations, started);

    let started = Instant::now();
    let mut total = 0usize;
    for _ in 0..iterations {
        total += msg.flatten()?.len();
    }
    report("flatten", iterations, started);

    let bytes = msg.flatten()?;
    let started = Instant::now();
    for _ in 0..iterations {
        total += MessageStore::unflatten_with_config(&bytes, config)?.count_names(TypeCode::ANY);
    }
    report("unflatten", iterations, started);

    log::debug!("bench sink: checksum={} total={}", checksum, total);
    println!("\n✅ Flattened size: {} bytes", bytes.len());
    Ok(())
}
