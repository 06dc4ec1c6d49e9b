use clap::{Parser, Subcommand};
use osdio::{
    get_header, read, write, Channel, FormatVersion, GenericDevice, ReadOptions, WriteOptions,
};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "osdio", about = "The OSD measurement container CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the file header without touching sample data
    Header {
        input: PathBuf,
        /// Emit the header as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the record sets and their layout
    List {
        input: PathBuf,
    },
    /// Print decoded sample rows of one record set
    Dump {
        input: PathBuf,
        /// Record set name; the best-fit set when omitted
        #[arg(short, long)]
        record_set: Option<String>,
        /// Maximum rows to print
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Rewrite a container, optionally changing version or envelope
    Copy {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Target format version 1-4 (default 4)
        #[arg(short, long, default_value = "4")]
        version: u32,
        /// Wrap the output in a zip envelope
        #[arg(short, long)]
        zip: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().init();

    match Cli::parse().command {

        // ── Header ───────────────────────────────────────────────────────────
        Commands::Header { input, json } => {
            let header = get_header(&input)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&header)?);
            } else {
                for (key, value) in &header {
                    println!("{:<32} {}", key, value);
                }
            }
        }

        // ── List ─────────────────────────────────────────────────────────────
        Commands::List { input } => {
            // preferred channel 0 never matches, so no body is decoded
            let opts = ReadOptions { preferred_channel: 0, ..Default::default() };
            let outcome = read(&input, opts)?;
            println!("Container: {}", input.display());
            println!(
                "Device {}  version {}  {} record set(s)",
                outcome.container.device_name,
                outcome.container.version,
                outcome.container.record_set_count
            );
            println!("{:<40} {:>3} {:>8} {:>10} {:>12}  Time step",
                     "Name", "Ch", "Records", "Samples", "Pointer");
            for set in &outcome.record_sets {
                let file_ref = set.file_ref.expect("listing decodes no bodies");
                let step = set
                    .time_step_ms()
                    .map(|ms| format!("{ms} ms"))
                    .unwrap_or_else(|| "variable".into());
                println!("{:<40} {:>3} {:>8} {:>10} {:>12}  {}",
                    set.name, set.channel_number, set.records.len(),
                    file_ref.sample_count, file_ref.data_pointer, step);
            }
        }

        // ── Dump ─────────────────────────────────────────────────────────────
        Commands::Dump { input, record_set, limit } => {
            let opts = ReadOptions {
                target_record_set: record_set,
                first_choice: true,
                ..Default::default()
            };
            let outcome = read(&input, opts)?;
            let set = outcome
                .active_record_set()
                .ok_or("no record set matched")?;

            let names: Vec<&str> =
                set.active_records().map(|r| r.name.as_str()).collect();
            println!("Record set: {} ({} samples)", set.name, set.sample_count());
            println!("{:>12}  {}", "t [ms]", names.join("  "));
            let step = set.time_step_ms();
            for row in 0..set.sample_count().min(limit) {
                let time = match step {
                    Some(ms) => (row as f64 * ms) as i64,
                    None => i64::from(set.timestamps_ms[row]),
                };
                let values: Vec<String> = set
                    .active_records()
                    .map(|r| format!("{:.3}", r.points[row] as f64 / 1000.0))
                    .collect();
                println!("{:>12}  {}", time, values.join("  "));
            }
        }

        // ── Copy ─────────────────────────────────────────────────────────────
        Commands::Copy { input, output, version, zip } => {
            let outcome = read(&input, ReadOptions { preferred_channel: 0, ..Default::default() })?;
            let mut channel = Channel::new(
                1,
                outcome.container.device_name.clone(),
                outcome.container.channel_config_type,
            );
            channel.file_comment = outcome.container.file_comment.clone();
            channel.object_key = outcome.container.object_key.clone();
            channel.origin_path = Some(input.clone());
            channel.record_sets = outcome.record_sets;

            let device = GenericDevice::new(outcome.container.device_name.clone());
            let opts = WriteOptions {
                version: FormatVersion::from_digit(version)?,
                zip,
                created: Some(outcome.container.created.clone()),
                ..Default::default()
            };
            replace_file(&output, |tmp| Ok(write(tmp, &mut channel, &device, opts)?))?;
            println!("Copied → {}", output.display());
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

/// Write to a sibling temp file, keep any previous target as `.bak`,
/// then move the temp file into place.
fn replace_file(
    target: &Path,
    produce: impl FnOnce(&Path) -> Result<(), Box<dyn std::error::Error>>,
) -> Result<(), Box<dyn std::error::Error>> {
    let tmp = target.with_extension("tmp");
    produce(&tmp)?;
    if target.exists() {
        std::fs::rename(target, target.with_extension("bak"))?;
    }
    std::fs::rename(&tmp, target)?;
    Ok(())
}
