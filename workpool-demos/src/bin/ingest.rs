// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

// ingest: reads a stream of JSON records, groups them with a Batch, summarises
// every group on a Dispatcher and writes the summaries through a MutexFunction.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use clap::Parser;
use log::{error, info};
use serde::Deserialize;
use workpool::{Batch, BatchConfig, Dispatcher, DispatcherConfig, Job, LogSink, MutexFunction};
use workpool_demos::reader::{records_from_value, Record, RecordReader, Token};
use workpool_demos::timing::Stopwatch;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// File with concatenated or newline-delimited JSON values
    #[arg(long, value_name = "FILE")]
    input: PathBuf,

    /// Where to write the summaries (default: stdout)
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// JSON file with `dispatcher` and `batch` sections. Flags take precedence.
    #[arg(long, value_name = "JSON")]
    config: Option<PathBuf>,

    /// Number of summarising workers
    #[arg(long)]
    workers: Option<usize>,

    /// Number of groups that may wait for a worker
    #[arg(long = "queue-capacity")]
    queue_capacity: Option<usize>,

    /// Number of records per group
    #[arg(long = "batch-size")]
    batch_size: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct IngestConfig {
    dispatcher: DispatcherConfig,
    batch: BatchConfig,
}

fn validate_args(args: &Args) -> Result<(), String> {
    if args.workers == Some(0) {
        return Err("--workers must be at least 1".into());
    }
    if args.queue_capacity == Some(0) {
        return Err("--queue-capacity must be at least 1".into());
    }
    Ok(())
}

fn load_config(args: &Args) -> anyhow::Result<IngestConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str(&json)
                .with_context(|| format!("failed to parse {}", path.display()))?
        }
        None => IngestConfig::default(),
    };
    if let Some(workers) = args.workers {
        config.dispatcher.worker_count = workers;
    }
    if let Some(queue_capacity) = args.queue_capacity {
        config.dispatcher.queue_capacity = queue_capacity;
    }
    if let Some(batch_size) = args.batch_size {
        config.batch.size = batch_size;
    }
    Ok(config)
}

/// Number of records per type in one group.
fn summarise(group: &[Record]) -> BTreeMap<&str, usize> {
    let mut counts = BTreeMap::new();
    for record in group {
        *counts.entry(record.type_name.as_str()).or_insert(0) += 1;
    }
    counts
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if let Err(e) = validate_args(&args) {
        eprintln!("Error: {e}");
        std::process::exit(2);
    }
    let config = load_config(&args)?;
    let mut stopwatch = Stopwatch::start("ingest");
    let mut reader = RecordReader::open(&args.input)?;

    let output: Box<dyn Write + Send> = match &args.output {
        Some(path) => Box::new(
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?,
        ),
        None => Box::new(io::stdout()),
    };
    let output = Arc::new(Mutex::new(BufWriter::new(output)));

    // one writer, so lines never interleave
    let out = output.clone();
    let writer = Arc::new(MutexFunction::new(
        config.dispatcher.queue_capacity,
        move |job: Job<String>| {
            let mut out = out.lock().map_err(|_| anyhow::anyhow!("output lock poisoned"))?;
            writeln!(out, "{}", job.context())?;
            Ok(())
        },
        LogSink,
    )?);

    let groups = Arc::new(AtomicUsize::new(0));
    let records = Arc::new(AtomicUsize::new(0));
    let (w, g, r) = (writer.clone(), groups.clone(), records.clone());
    let summariser = Arc::new(Dispatcher::from_config(
        &config.dispatcher,
        move |job: Job<Vec<Record>>| {
            if job.is_end_of_stream() {
                let totals = serde_json::json!({
                    "groups": g.load(Ordering::SeqCst),
                    "records": r.load(Ordering::SeqCst),
                });
                w.call(totals.to_string())?;
                return Ok(());
            }
            let group = job.into_context();
            let group_index = g.fetch_add(1, Ordering::SeqCst);
            r.fetch_add(group.len(), Ordering::SeqCst);
            let line = serde_json::json!({
                "group": group_index,
                "size": group.len(),
                "types": summarise(&group),
            });
            w.call(line.to_string())?;
            Ok(())
        },
        LogSink,
    )?);
    summariser.run()?;

    let s = summariser.clone();
    let batch = Batch::from_config(&config.batch, move |group: Vec<Record>| {
        s.enqueue_job_allow_wait(Job::new(group))?;
        Ok(())
    });

    let mut read_error = None;
    loop {
        match reader.build_records_from_token(records_from_value) {
            Ok(Token::Records(token_records)) => {
                for record in token_records {
                    batch.push(record)?;
                }
            }
            Ok(Token::EndOfStream) => break,
            Err(e) => {
                error!("Stopping at token {}: {:#}", reader.tokens_read() + 1, e);
                read_error = Some(e);
                break;
            }
        }
    }
    batch.flush()?;
    stopwatch.lap("read");

    summariser.wait_until_idle();
    // the totals line only marks a complete input
    if read_error.is_none() {
        summariser.enqueue_job_allow_wait(Job::end_of_stream(Vec::new()))?;
    }
    summariser.wait_until_finished();
    writer.wait_until_finished();
    stopwatch.lap("drain");

    output
        .lock()
        .map_err(|_| anyhow::anyhow!("output lock poisoned"))?
        .flush()?;

    info!(
        "Read {} tokens, wrote {} groups",
        reader.tokens_read(),
        groups.load(Ordering::SeqCst)
    );
    stopwatch.report();
    match read_error {
        Some(e) => Err(e.context(format!("{} is malformed", args.input.display()))),
        None => Ok(()),
    }
}
