use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use facetransfer_core::core_api::{
    Engine, FieldEntry, FieldValue, FileLayout, GenderSource, MergeOptions, PlayerReport, Session,
    Summary, TransferOptions, transfer_face_into,
};
use log::{info, warn};
use serde_json::{Map as JsonMap, Value as JsonValue};

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum GenderArg {
    Target,
    Source,
}

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Cli {
    /// Raise log verbosity (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show what a save picker shows for one save
    Summary {
        #[arg(value_name = "SAVE")]
        path: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Copy the face of SOURCE's player onto TARGET's player
    Transfer {
        #[arg(value_name = "SOURCE")]
        source: PathBuf,
        #[arg(value_name = "TARGET")]
        target: PathBuf,
        /// Write the result here instead of replacing TARGET
        #[arg(long, value_name = "PATH")]
        output: Option<PathBuf>,
        /// Replace TARGET without keeping a .facebak copy
        #[arg(long = "no-backup")]
        no_backup: bool,
        #[arg(long = "gender-from", value_enum, default_value_t = GenderArg::Target)]
        gender_from: GenderArg,
        /// Allow saves whose game, sex or race differ
        #[arg(long = "skip-compat-check")]
        skip_compat_check: bool,
        #[arg(long)]
        json: bool,
    },
    /// Print the byte range of every section of a save
    Layout {
        #[arg(value_name = "SAVE")]
        path: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Dump the decoded player record
    Player {
        #[arg(value_name = "SAVE")]
        path: PathBuf,
        #[arg(long)]
        json: bool,
    },
}

struct TransferRequest {
    source: PathBuf,
    target: PathBuf,
    output: Option<PathBuf>,
    options: TransferOptions,
    json: bool,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Summary { path, json } => {
            let session = open_or_exit(&path);
            let summary = session.summary();
            if json {
                print_json(&summary_to_json(&summary));
            } else {
                print_summary(&summary);
            }
        }
        Command::Transfer {
            source,
            target,
            output,
            no_backup,
            gender_from,
            skip_compat_check,
            json,
        } => {
            if no_backup && output.is_some() {
                eprintln!("--no-backup has no effect with --output; the target is left untouched");
                process::exit(2);
            }
            run_transfer(TransferRequest {
                source,
                target,
                output,
                options: TransferOptions {
                    merge: MergeOptions {
                        gender_from: to_gender_source(gender_from),
                    },
                    check_compatibility: !skip_compat_check,
                    keep_backup: !no_backup,
                },
                json,
            });
        }
        Command::Layout { path, json } => {
            let session = open_or_exit(&path);
            if json {
                print_json(&layout_to_json(session.layout()));
            } else {
                print_layout(session.layout());
            }
        }
        Command::Player { path, json } => {
            let session = open_or_exit(&path);
            let report = session.player_report().unwrap_or_else(|e| {
                eprintln!("Error decoding player record: {}", path.display());
                eprintln!("  {e}");
                process::exit(1);
            });
            if json {
                let value = serde_json::to_value(&report).unwrap_or_else(|e| {
                    eprintln!("Error rendering JSON output: {e}");
                    process::exit(1);
                });
                print_json(&value);
            } else {
                print_player(&report);
            }
        }
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();
}

fn read_or_exit(path: &Path) -> Vec<u8> {
    fs::read(path).unwrap_or_else(|e| {
        eprintln!("Error reading {}: {e}", path.display());
        process::exit(1);
    })
}

fn open_or_exit(path: &Path) -> Session {
    let bytes = read_or_exit(path);
    Engine::new().open_bytes(bytes, None).unwrap_or_else(|e| {
        eprintln!("Error parsing save file: {}", path.display());
        eprintln!("  {e}");
        process::exit(1);
    })
}

fn run_transfer(req: TransferRequest) {
    match Engine::new()
        .open_path(&req.source, None)
        .and_then(|s| s.player_report())
    {
        Ok(report) if !report.required_plugins.is_empty() => info!(
            "source face uses plugins: {}",
            report.required_plugins.join(", ")
        ),
        Ok(_) => {}
        Err(e) => warn!("could not inspect source player: {e}"),
    }

    let output = req.output.as_deref();
    let outcome = transfer_face_into(&req.source, &req.target, output, &req.options)
        .unwrap_or_else(|e| {
            eprintln!("Error transferring face: {e}");
            process::exit(1);
        });

    if req.json {
        let mut out = JsonMap::new();
        out.insert("source".into(), path_json(&req.source));
        out.insert("target".into(), path_json(&outcome.target));
        out.insert("written_to".into(), path_json(&outcome.written_to));
        out.insert(
            "backup".into(),
            outcome.backup.as_deref().map_or(JsonValue::Null, path_json),
        );
        out.insert("bytes_written".into(), JsonValue::from(outcome.bytes_written));
        print_json(&JsonValue::Object(out));
        return;
    }

    println!(
        "Wrote {} bytes to {}",
        outcome.bytes_written,
        outcome.written_to.display()
    );
    if let Some(backup) = outcome.backup {
        println!("Original kept as {}", backup.display());
    }
}

fn to_gender_source(arg: GenderArg) -> GenderSource {
    match arg {
        GenderArg::Target => GenderSource::Target,
        GenderArg::Source => GenderSource::Source,
    }
}

fn print_json(value: &JsonValue) {
    let rendered = serde_json::to_string_pretty(value).unwrap_or_else(|e| {
        eprintln!("Error rendering JSON output: {e}");
        process::exit(1);
    });
    println!("{rendered}");
}

fn path_json(path: &Path) -> JsonValue {
    JsonValue::String(path.display().to_string())
}

fn summary_to_json(summary: &Summary) -> JsonValue {
    serde_json::to_value(summary).unwrap_or_else(|e| {
        eprintln!("Error rendering JSON output: {e}");
        process::exit(1);
    })
}

fn layout_to_json(layout: &FileLayout) -> JsonValue {
    let sections = layout
        .sections
        .iter()
        .map(|s| {
            let mut m = JsonMap::new();
            m.insert("section".into(), JsonValue::String(s.id.to_string()));
            m.insert("start".into(), JsonValue::from(s.range.start));
            m.insert("end".into(), JsonValue::from(s.range.end));
            m.insert("len".into(), JsonValue::from(s.range.len()));
            JsonValue::Object(m)
        })
        .collect();

    let mut out = JsonMap::new();
    out.insert("file_len".into(), JsonValue::from(layout.file_len));
    out.insert("sections".into(), JsonValue::Array(sections));
    JsonValue::Object(out)
}

fn print_summary(summary: &Summary) {
    println!("Game:       {}", summary.game);
    println!("Save:       #{}", summary.save_number);
    println!("Name:       {}", summary.player_name);
    println!("Level:      {}", summary.level);
    println!("Location:   {}", summary.location);
    println!("Race:       {}", summary.race);
    println!("Sex:        {}", summary.sex);
    println!("Play time:  {}", summary.play_time);
    println!(
        "Screenshot: {}x{} ({} bytes/pixel)",
        summary.screenshot.width, summary.screenshot.height, summary.screenshot.bytes_per_pixel
    );
}

fn print_layout(layout: &FileLayout) {
    println!("{:<22}{:>12}{:>12}{:>12}", "SECTION", "START", "END", "LEN");
    for s in &layout.sections {
        println!(
            "{:<22}{:>12}{:>12}{:>12}",
            s.id.to_string(),
            s.range.start,
            s.range.end,
            s.range.len()
        );
    }
    println!("{:<22}{:>36}", "file", layout.file_len);
}

fn print_player(report: &PlayerReport) {
    println!(
        "Player record ({}, form type {}, version {}, {})",
        report.game,
        report.form_type,
        report.version,
        if report.compressed {
            "compressed"
        } else {
            "uncompressed"
        }
    );
    println!(
        "  offset {} in changeform region, {} bytes",
        report.region_offset, report.record_len
    );
    let bits: Vec<String> = report.flag_bits.iter().map(u8::to_string).collect();
    println!("  flags {:#010x} [{}]", report.flags, bits.join(","));
    if let Some(sex) = report.sex {
        println!("  sex {sex}");
    }
    if !report.required_plugins.is_empty() {
        println!("  face plugins: {}", report.required_plugins.join(", "));
    }
    println!();

    for entry in &report.fields {
        println!(
            "  {:<16}{:<8}{}",
            entry.key.name(),
            format_gate(entry),
            format_value(&entry.value)
        );
    }
    if report.tail_len > 0 {
        println!("  {:<16}{:<8}{} bytes", "tail", "", report.tail_len);
    }
}

fn format_gate(entry: &FieldEntry) -> String {
    match entry.bit {
        Some(bit) => format!("bit {bit}"),
        None => "always".to_string(),
    }
}

fn format_value(value: &FieldValue) -> String {
    match value {
        FieldValue::Byte(b) => b.to_string(),
        FieldValue::Bytes(bytes) => format_hex(bytes),
        FieldValue::Text(text) => format!("{text:?}"),
        FieldValue::Ref(r) => r.to_string(),
        FieldValue::Refs(refs) | FieldValue::PackedRefs { refs, .. } => {
            let parts: Vec<String> = refs.iter().map(ToString::to_string).collect();
            format!("[{}]", parts.join(", "))
        }
        FieldValue::Factions(entries) => {
            let parts: Vec<String> = entries
                .iter()
                .map(|e| format!("{} rank {}", e.faction.resolved, e.rank))
                .collect();
            format!("[{}]", parts.join(", "))
        }
        FieldValue::Counted { data, .. } => format!("{} bytes of entries", data.len()),
    }
}

fn format_hex(bytes: &[u8]) -> String {
    const PREVIEW: usize = 12;
    let shown: Vec<String> = bytes
        .iter()
        .take(PREVIEW)
        .map(|b| format!("{b:02x}"))
        .collect();
    if bytes.len() > PREVIEW {
        format!("{} ... ({} bytes)", shown.join(" "), bytes.len())
    } else {
        shown.join(" ")
    }
}
