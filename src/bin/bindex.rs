//! `bindex <mailbox-path>`: incrementally (re)builds the `.idx` sibling of a
//! mailbox (spec.md §6 "Indexer"). Exits 0 on success, 1 on any error — no
//! other flags, per spec.md's CLI surface.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use blists::config::Config;
use blists::index::{index_path_for, record_count_from_len, Header, IndexWriter};
use blists::mailbox;
use blists::thread;

#[derive(Parser)]
#[command(name = "bindex", about = "Index an mbox mailing-list archive")]
struct Args {
    /// Path to the mbox file to index.
    mailbox: PathBuf,
}

fn run() -> Result<()> {
    let args = Args::parse();
    let config = Config::default();

    let list_name = args
        .mailbox
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();

    let mut writer = IndexWriter::open_or_create(&args.mailbox)
        .with_context(|| format!("opening index for {}", args.mailbox.display()))?;

    let existing_header = writer.try_read_header(&config);
    let resume_offset = existing_header.map(|h| h.next_offset).unwrap_or(0);
    info!("resuming {} from offset {}", args.mailbox.display(), resume_offset);

    let mut records = if existing_header.is_some() {
        let idx_path = index_path_for(&args.mailbox);
        let idx_len = std::fs::metadata(&idx_path)
            .with_context(|| format!("statting {}", idx_path.display()))?
            .len();
        let count = record_count_from_len(&config, idx_len);
        writer
            .read_records(&config, count)
            .context("reading existing records")?
    } else {
        Vec::new()
    };

    let (mut new_records, next_offset) =
        mailbox::index_from(&args.mailbox, &config, list_name, resume_offset)
            .context("parsing mbox")?;
    info!("parsed {} new record(s)", new_records.len());

    if records.len() + new_records.len() > config.max_mailbox_messages {
        anyhow::bail!(
            "too many messages in mailbox (limit is {})",
            config.max_mailbox_messages
        );
    }

    records.append(&mut new_records);
    mailbox::sort_records(&mut records);
    thread::link(&mut records, &config);

    let slots = mailbox::build_slots(&records, &config);
    writer.write_slots(&slots).context("writing slot array")?;
    writer
        .write_records(&config, &records)
        .context("writing record table")?;
    writer
        .write_header(Header::new(&config, next_offset))
        .context("writing header")?;

    info!(
        "wrote {} total record(s), next_offset={}",
        records.len(),
        next_offset
    );
    Ok(())
}

fn main() {
    env_logger::init();
    if let Err(e) = run() {
        eprintln!("bindex: {e:#}");
        std::process::exit(1);
    }
}
