use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use wastage_report::analytics::View;
use wastage_report::{
    AnalyticsBuilder, NewItem, ReportStore, ReportWriter, StoreArgs, Submission, csv_io,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Food waste reporting", long_about = None)]
struct Args {
    #[command(flatten)]
    store: StoreArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an empty report if none exists yet.
    Init,
    /// Append a batch of wasted items.
    Submit {
        #[arg(short, long)]
        name: String,

        #[arg(short, long)]
        department: String,

        #[arg(short, long)]
        outlet: String,

        /// `PRODUCT=AMOUNT` or `PRODUCT=AMOUNT;NOTES`, repeatable.
        #[arg(short, long = "item", value_parser = parse_item)]
        items: Vec<NewItem>,

        /// CSV with `Product Name,Amount Wasted[,Notes]` columns.
        #[arg(long)]
        items_csv: Option<PathBuf>,

        /// Resubmit this many times if another submission got there first.
        #[arg(long, default_value_t = 0)]
        retries: u32,
    },
    /// Print the analytics views.
    Summary,
    /// Write the `Wastage Data` table to a CSV file.
    Export {
        #[arg(short, long, default_value = "wastage_data.csv")]
        output: PathBuf,
    },
}

fn parse_item(s: &str) -> Result<NewItem, String> {
    let (product, rest) = s
        .split_once('=')
        .ok_or_else(|| format!("expected PRODUCT=AMOUNT, got `{s}`"))?;
    let item = match rest.split_once(';') {
        Some((amount, notes)) => NewItem::new(product, amount).with_notes(notes),
        None => NewItem::new(product, rest),
    };
    Ok(item)
}

fn submit<S: ReportStore>(
    writer: &ReportWriter<S>,
    submission: &Submission,
    retries: u32,
) -> Result<usize> {
    let mut attempt = 0;
    loop {
        match writer.submit(submission) {
            Err(e) if e.is_conflict() && attempt < retries => {
                attempt += 1;
                warn!(attempt, "report changed while submitting, retrying");
            }
            result => return Ok(result?),
        }
    }
}

fn print_summary<S: ReportStore>(writer: &ReportWriter<S>) -> Result<()> {
    let report = writer.load()?;
    let analytics = AnalyticsBuilder::build(&report.records);
    println!("{} record(s) in {}\n", report.len(), writer.store().key());
    for (name, view) in analytics.views() {
        println!("{}", name.sheet_name());
        println!("{}", name.headers().join(" | "));
        match view {
            View::Groups(groups) => {
                for g in groups {
                    println!("{} | {} | {}", g.key, g.incidents, g.total_wastage);
                }
            }
            View::Daily(days) => {
                for d in days {
                    println!("{} | {}", d.date.format("%Y-%m-%d"), d.amount_wasted);
                }
            }
        }
        println!();
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = args.store.store_config();
    let writer = ReportWriter::new(config.open()?)
        .with_taxonomy(args.store.taxonomy()?)
        .with_concurrency(args.store.concurrency());

    match args.command {
        Command::Init => {
            if writer.init()? {
                println!("Created empty report: {}", config.key);
            } else {
                println!("Report already exists: {}", config.key);
            }
        }
        Command::Submit {
            name,
            department,
            outlet,
            mut items,
            items_csv,
            retries,
        } => {
            if let Some(path) = items_csv {
                let loaded = csv_io::load_items(&path)
                    .with_context(|| format!("failed to read items from {}", path.display()))?;
                items.extend(loaded);
            }
            if items.is_empty() {
                bail!("no items given; use --item or --items-csv");
            }
            let submission = Submission::new(name, department, outlet, items);
            let count = submit(&writer, &submission, retries)?;
            println!("Saved {count} item(s) to {}", config.key);
        }
        Command::Summary => print_summary(&writer)?,
        Command::Export { output } => {
            let report = writer.load()?;
            let written = csv_io::export_records(&report, &output)?;
            println!("Exported {} record(s) to {}", report.len(), written.display());
        }
    }
    Ok(())
}
