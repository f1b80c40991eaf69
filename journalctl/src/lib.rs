//! Command line front end for reading journal files without the journal
//! daemon.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use journal_core::{
    JournalFile, OutputMode, PagedReader, PagedReaderOptions, Record, ScanOptions, TimeRange,
};
use std::io::{self, Write};
use std::num::{NonZeroU64, NonZeroUsize};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "journalctl")]
#[command(about = "A tool to read systemd journal files", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the entries of a journal file as JSON, one record per line
    Cat(CatArgs),
    /// Print the header of a journal file
    Info(InfoArgs),
}

#[derive(Args, Debug)]
pub struct CatArgs {
    /// Path to the journal file
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Print every field as a string in a single flat object
    #[arg(long)]
    pub raw: bool,

    /// Keep running and print entries as they are appended
    #[arg(short, long)]
    pub follow: bool,

    /// Skip entries before this time (RFC 3339)
    #[arg(long, value_name = "TIME")]
    pub start: Option<String>,

    /// Skip entries after this time (RFC 3339)
    #[arg(long, value_name = "TIME")]
    pub end: Option<String>,

    /// Indent the JSON output
    #[arg(long)]
    pub pretty: bool,

    /// Size of the pages read from the file, in bytes
    #[arg(long, default_value = "1024")]
    pub page_size: NonZeroU64,

    /// Number of pages kept in memory
    #[arg(long, default_value = "10000")]
    pub cache_pages: NonZeroUsize,
}

#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Path to the journal file
    #[arg(value_name = "FILE")]
    pub file: PathBuf,
}

impl CatArgs {
    pub fn reader_options(&self) -> PagedReaderOptions {
        PagedReaderOptions::default()
            .with_page_size(self.page_size)
            .with_max_pages(self.cache_pages)
    }

    /// Fails on malformed time bounds.
    pub fn scan_options(&self) -> Result<ScanOptions> {
        let time_range = TimeRange::parse(self.start.as_deref(), self.end.as_deref())
            .context("Invalid time range")?;

        let output = if self.raw {
            OutputMode::Raw
        } else {
            OutputMode::Structured
        };

        Ok(ScanOptions::default()
            .with_time_range(time_range)
            .with_output(output))
    }
}

fn open_file(path: &Path, options: PagedReaderOptions) -> Result<JournalFile<PagedReader>> {
    JournalFile::open_path(path, options)
        .with_context(|| format!("Failed to open journal file: {}", path.display()))
}

/// Write one record followed by a newline.
pub fn write_record<W: Write>(out: &mut W, record: &Record, pretty: bool) -> io::Result<()> {
    if pretty {
        serde_json::to_writer_pretty(&mut *out, record)?;
    } else {
        serde_json::to_writer(&mut *out, record)?;
    }

    out.write_all(b"\n")
}

/// Print every matching entry of the file.
pub fn cat<W: Write>(args: &CatArgs, out: &mut W) -> Result<()> {
    let options = args.scan_options()?;

    let mut file = open_file(&args.file, args.reader_options())?;
    file.set_options(options);

    let mut logs = file.logs();
    for record in logs.by_ref() {
        let record = record.with_context(|| format!("Failed to read {}", args.file.display()))?;
        write_record(out, &record, args.pretty).context("Failed to write record")?;
    }

    debug!("Scan of {} finished: {:?}", args.file.display(), logs.stats());

    out.flush().context("Failed to flush output")?;
    Ok(())
}

/// Print entries appended to the file from now on, until `shutdown` is
/// cancelled.
pub async fn follow<W: Write>(
    args: &CatArgs,
    out: &mut W,
    shutdown: CancellationToken,
) -> Result<()> {
    let options = args.scan_options()?;

    let mut file = open_file(&args.file, args.reader_options())?;
    file.set_options(options);

    let pretty = args.pretty;
    let mut follower = file.follow()?;
    follower
        .run(shutdown, |record| {
            write_record(&mut *out, &record, pretty)?;
            out.flush()?;
            Ok(())
        })
        .await
        .with_context(|| format!("Failed to follow {}", args.file.display()))
}

pub fn info<W: Write>(args: &InfoArgs, out: &mut W) -> Result<()> {
    let file = open_file(&args.file, PagedReaderOptions::default())?;

    writeln!(out, "{}", file.debug_summary()).context("Failed to write header summary")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> CatArgs {
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Command::Cat(args) => args,
            Command::Info(_) => panic!("expected cat"),
        }
    }

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn cat_defaults() {
        let args = parse(&["journalctl", "cat", "system.journal"]);

        assert_eq!(args.file, PathBuf::from("system.journal"));
        assert!(!args.raw && !args.follow && !args.pretty);
        assert_eq!(args.page_size.get(), 1024);
        assert_eq!(args.cache_pages.get(), 10000);

        let options = args.scan_options().unwrap();
        assert_eq!(options.output, OutputMode::Structured);
        assert!(options.time_range.is_unbounded());
        assert_eq!(options.min_seqnum, 0);
    }

    #[test]
    fn cat_flags() {
        let args = parse(&[
            "journalctl",
            "cat",
            "--raw",
            "-f",
            "--start",
            "2024-01-01T00:00:00Z",
            "--page-size",
            "4096",
            "system.journal",
        ]);

        assert!(args.follow);
        assert_eq!(args.reader_options().page_size(), 4096);

        let options = args.scan_options().unwrap();
        assert_eq!(options.output, OutputMode::Raw);
        assert!(options.time_range.start.is_some());
        assert!(options.time_range.end.is_none());
    }

    #[test]
    fn huge_page_size_is_clamped() {
        let args = parse(&[
            "journalctl",
            "cat",
            "--page-size",
            "18446744073709551615",
            "system.journal",
        ]);

        assert_eq!(args.page_size.get(), u64::MAX);
        assert_eq!(args.reader_options().page_size(), journal_core::MAX_PAGE_SIZE);
    }

    #[test]
    fn malformed_time_is_rejected() {
        let args = parse(&["journalctl", "cat", "--end", "tomorrow", "system.journal"]);
        assert!(args.scan_options().is_err());
    }

    #[test]
    fn zero_page_size_is_rejected() {
        let result = Cli::try_parse_from(["journalctl", "cat", "--page-size", "0", "x"]);
        assert!(result.is_err());
    }

    #[test]
    fn missing_file_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.journal");
        let args = parse(&["journalctl", "cat", path.to_str().unwrap()]);

        let mut out = Vec::new();
        let err = cat(&args, &mut out).unwrap_err();
        assert!(err.to_string().contains("Failed to open journal file"));
        assert!(out.is_empty());
    }

    #[test]
    fn garbage_file_is_not_a_journal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.journal");
        std::fs::write(&path, vec![0xAB; 512]).unwrap();

        let args = InfoArgs { file: path };
        let err = info(&args, &mut Vec::new()).unwrap_err();
        let source = err.downcast_ref::<journal_core::JournalError>();
        assert!(matches!(
            source,
            Some(journal_core::JournalError::InvalidMagicNumber)
        ));
    }
}
