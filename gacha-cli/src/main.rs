mod commands;
mod reports;
mod seeds;
mod simulation;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use gacha_engine::UserId;
use std::fs::File;
use std::io::{BufWriter, Stdout, Write, stdout};
use std::path::{Path, PathBuf};

use commands::{Outcome, Session};
use seeds::resolve_seed;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ReportFormat {
    /// Human-readable, coloured when writing to a terminal
    Console,
    /// Tagged JSON document
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "gacha-cli", version)]
#[command(about = "Summons, trait rolls and banner management over a local state file")]
struct Args {
    /// State file holding pity records, trait totals and the banner
    #[arg(long, global = true, default_value = "gacha-state.json")]
    state: PathBuf,

    /// Engine configuration (JSON); built-in tables when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Seed for reproducible results; numbers or any phrase
    #[arg(long, global = true)]
    seed: Option<String>,

    /// User the command acts for
    #[arg(long, global = true, default_value = "local")]
    user: String,

    /// Output report format
    #[arg(long, global = true, value_enum, default_value_t = ReportFormat::Console)]
    report: ReportFormat,

    /// Optional path to write the report output instead of stdout
    #[arg(long, global = true)]
    output: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Summon 1-100 units
    Summon {
        amount: u32,
        /// Use the doubled shiny chance
        #[arg(long)]
        hunter: bool,
    },
    /// Show summons left until each pity guarantee
    Pity,
    /// Roll 1-10000 traits
    TraitRoll { amount: u32 },
    /// Show the most-rolled lifetime trait
    AverageTrait,
    /// Clear lifetime trait totals and trait pity
    ClearTraits,
    /// Set the banner from three mythic names or an OCR text dump
    Banner {
        names: Vec<String>,
        #[arg(long, conflicts_with = "names")]
        ocr_text: Option<PathBuf>,
    },
    /// Show the current banner
    ShowBanner,
    /// Concurrent soak run against an in-memory store
    Simulate {
        #[arg(long, default_value_t = 50)]
        users: usize,
        /// Trait rolls per user, split into random batches
        #[arg(long, default_value_t = 10_000)]
        rolls: u32,
        /// Summons per user
        #[arg(long, default_value_t = 100)]
        draws: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let session = Session {
        state: args.state.clone(),
        config: args.config.clone(),
        seed: args.seed.as_deref().map(resolve_seed).transpose()?,
        user: UserId::new(args.user.clone()),
    };
    log::debug!("running {:?} as {}", args.command, session.user);

    let outcome = run(&session, &args.command).await?;
    write_report(&args, &outcome)?;

    if !outcome.succeeded() {
        std::process::exit(1);
    }
    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .init();
}

async fn run(session: &Session, command: &Command) -> Result<Outcome> {
    match command {
        Command::Summon { amount, hunter } => commands::summon(session, *amount, *hunter).await,
        Command::Pity => commands::pity(session).await,
        Command::TraitRoll { amount } => commands::trait_roll(session, *amount).await,
        Command::AverageTrait => commands::average_trait(session).await,
        Command::ClearTraits => commands::clear_traits(session).await,
        Command::Banner { names, ocr_text } => {
            commands::banner(session, names, ocr_text.as_deref())
        }
        Command::ShowBanner => commands::show_banner(session),
        Command::Simulate {
            users,
            rolls,
            draws,
        } => commands::simulate(session, *users, *rolls, *draws).await,
    }
}

fn write_report(args: &Args, outcome: &Outcome) -> Result<()> {
    let mut sink = ReportSink::open(args.output.as_deref())?;
    if sink.is_file() {
        colored::control::set_override(false);
    }
    match args.report {
        ReportFormat::Json => reports::generate_json_report(&mut sink, outcome)?,
        ReportFormat::Console => reports::generate_console_report(&mut sink, outcome)?,
    }
    sink.finish()
}

/// Where the rendered report goes: stdout, or a file named by `--output`.
enum ReportSink {
    Terminal(BufWriter<Stdout>),
    File {
        path: PathBuf,
        writer: BufWriter<File>,
    },
}

impl ReportSink {
    fn open(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::Terminal(BufWriter::new(stdout())));
        };
        let file =
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
        Ok(Self::File {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        })
    }

    const fn is_file(&self) -> bool {
        matches!(self, Self::File { .. })
    }

    fn inner(&mut self) -> &mut dyn Write {
        match self {
            Self::Terminal(writer) => writer,
            Self::File { writer, .. } => writer,
        }
    }

    fn finish(mut self) -> Result<()> {
        let flushed = self.inner().flush();
        match &self {
            Self::Terminal(_) => flushed.context("failed to write report to stdout"),
            Self::File { path, .. } => {
                flushed.with_context(|| format!("failed to write {}", path.display()))
            }
        }
    }
}

impl Write for ReportSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner().flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_options_after_subcommand() {
        let args = Args::try_parse_from([
            "gacha-cli",
            "summon",
            "10",
            "--hunter",
            "--user",
            "alice",
            "--report",
            "json",
        ])
        .unwrap();
        assert_eq!(args.user, "alice");
        assert!(matches!(args.report, ReportFormat::Json));
        assert!(matches!(
            args.command,
            Command::Summon {
                amount: 10,
                hunter: true
            }
        ));
    }

    #[test]
    fn banner_names_and_ocr_text_conflict() {
        let err = Args::try_parse_from([
            "gacha-cli",
            "banner",
            "Saber",
            "--ocr-text",
            "dump.txt",
        ]);
        assert!(err.is_err());
    }

    #[test]
    fn report_sink_writes_to_file() {
        let path = std::env::temp_dir().join(format!("gacha-cli-out-{}", std::process::id()));
        let mut sink = ReportSink::open(Some(&path)).unwrap();
        assert!(sink.is_file());
        writeln!(sink, "hello").unwrap();
        sink.finish().unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello\n");
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn report_sink_names_the_file_it_cannot_create() {
        let path = std::env::temp_dir()
            .join(format!("gacha-cli-missing-{}", std::process::id()))
            .join("nested")
            .join("report.txt");
        let err = ReportSink::open(Some(&path)).err().unwrap();
        assert!(err.to_string().contains("report.txt"));
    }
}
