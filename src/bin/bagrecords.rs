use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use bagrecords::{MsgRegistry, Reader, ReaderConfig, RecordFilter};
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "bagrecords", version, about = "Read records from ROS 2 bags")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct OpenArgs {
    /// Bag directory or .db3 file.
    bag: PathBuf,
    #[arg(long = "storage", default_value = "sqlite3")]
    storage: String,
    #[arg(long = "serialization", default_value = "cdr")]
    serialization: String,
    /// Extra directory searched for .msg definitions (repeatable).
    #[arg(long = "msg-path")]
    msg_paths: Vec<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List topic names and types.
    Topics {
        #[command(flatten)]
        open: OpenArgs,
    },
    /// Summarize the container.
    Info {
        #[command(flatten)]
        open: OpenArgs,
    },
    /// Print records as JSON lines.
    Records {
        #[command(flatten)]
        open: OpenArgs,
        #[arg(long = "topic")]
        topics: Vec<String>,
        #[arg(long = "start-ns", allow_negative_numbers = true)]
        start_ns: Option<i64>,
        #[arg(long = "end-ns", allow_negative_numbers = true)]
        end_ns: Option<i64>,
        #[arg(long = "limit")]
        limit: Option<usize>,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let mut out = io::BufWriter::new(io::stdout().lock());
    match cli.command {
        Commands::Topics { open } => cmd_topics(&open, &mut out)?,
        Commands::Info { open } => cmd_info(&open, &mut out)?,
        Commands::Records {
            open,
            topics,
            start_ns,
            end_ns,
            limit,
        } => {
            let mut filter = RecordFilter::new();
            if !topics.is_empty() {
                filter = filter.topics(topics);
            }
            if let Some(start) = start_ns {
                filter = filter.start_ns(start);
            }
            if let Some(end) = end_ns {
                filter = filter.end_ns(end);
            }
            cmd_records(&open, filter, limit, &mut out)?;
        }
    }
    out.flush()?;
    Ok(())
}

fn open_reader(args: &OpenArgs) -> Result<Reader> {
    let mut registry = MsgRegistry::from_env();
    for path in &args.msg_paths {
        registry.add_search_path(path);
    }
    let config = ReaderConfig::from_ids(&args.storage, &args.serialization)?;
    Reader::open_with_config(&args.bag, config, registry)
        .with_context(|| format!("opening {}", args.bag.display()))
}

fn cmd_topics(args: &OpenArgs, out: &mut dyn Write) -> Result<()> {
    let reader = open_reader(args)?;
    for (topic, type_name) in reader.type_map() {
        writeln!(out, "{topic}\t{type_name}")?;
    }
    reader.close()?;
    Ok(())
}

fn cmd_info(args: &OpenArgs, out: &mut dyn Write) -> Result<()> {
    let reader = open_reader(args)?;
    let config = reader.config();
    writeln!(out, "path:          {}", reader.path().display())?;
    writeln!(out, "storage:       {}", config.storage)?;
    writeln!(out, "serialization: {}", config.serialization)?;
    writeln!(out, "messages:      {}", reader.message_count())?;
    writeln!(out, "topics:        {}", reader.catalog().len())?;
    for topic in reader.catalog().descriptors() {
        writeln!(
            out,
            "  {}  {}  count={}",
            topic.name, topic.type_name, topic.message_count
        )?;
    }
    reader.close()?;
    Ok(())
}

fn cmd_records(
    args: &OpenArgs,
    filter: RecordFilter,
    limit: Option<usize>,
    out: &mut dyn Write,
) -> Result<()> {
    let reader = open_reader(args)?;
    let records = reader.records_filtered(filter)?;
    for (index, record) in records.take(limit.unwrap_or(usize::MAX)).enumerate() {
        let record = record.with_context(|| format!("reading record {index}"))?;
        serde_json::to_writer(&mut *out, &record)?;
        writeln!(out)?;
    }
    reader.close()?;
    Ok(())
}
