//! relaykv Binlog Dump
//!
//! Prints every record of one binlog file.

use std::path::PathBuf;

use clap::Parser;
use relaykv::binlog::{LogFile, LogRecord};
use tracing_subscriber::{fmt, EnvFilter};

/// Dump a relaykv binlog file
#[derive(Parser, Debug)]
#[command(name = "relaykv-dumplog")]
#[command(version)]
struct Args {
    /// Binlog file, e.g. binlog/binlog-00001
    file: PathBuf,

    /// Print values as well as keys
    #[arg(short, long)]
    values: bool,
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let args = Args::parse();

    let mut file = match LogFile::open(&args.file, true) {
        Ok(f) => f,
        Err(e) => {
            tracing::error!("Failed to open {}: {}", args.file.display(), e);
            std::process::exit(1);
        }
    };

    let mut count = 0usize;
    let mut frames = file.frames(0);
    for frame in frames.by_ref() {
        let (offset, payload) = match frame {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!("Bad frame after {} records: {}", count, e);
                std::process::exit(1);
            }
        };
        let record = match LogRecord::decode(&payload) {
            Ok(record) => record,
            Err(e) => {
                tracing::error!("Bad record at offset {}: {}", offset, e);
                std::process::exit(1);
            }
        };

        count += 1;
        let key = String::from_utf8_lossy(&record.key);
        if args.values {
            println!(
                "{}\t{}\t{}\torigin={}\tts={}\t{}\t{}",
                count,
                offset,
                record.operation.as_str(),
                record.origin_id,
                record.timestamp,
                key,
                String::from_utf8_lossy(&record.value)
            );
        } else {
            println!(
                "{}\t{}\t{}\torigin={}\tts={}\t{}",
                count,
                offset,
                record.operation.as_str(),
                record.origin_id,
                record.timestamp,
                key
            );
        }
    }

    if frames.hit_torn_tail() {
        tracing::warn!("Torn frame at offset {}", frames.offset());
    }
    eprintln!("{} records", count);
}
