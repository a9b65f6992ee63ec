//! foldervault CLI
//!
//! Command-line interface for encrypting and decrypting folders in place
//! and for finding and deleting duplicate files.

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, fmt};

use foldervault::config::{LOG_ENV, VaultConfig};
use foldervault::dedupe::{self, Threshold};
use foldervault::lock::FolderLock;
use foldervault::password::{
    ArgumentPasswordReader, PasswordReader, StdinPasswordReader, TerminalPasswordReader,
};
use foldervault::scan;
use foldervault::{
    BatchReport, ErrorCategory, FileOutcome, KdfParams, Result, VaultError, VaultManager,
};

/// Unrecoverable failure; nothing or only a consistent prefix was changed.
const EXIT_FAILURE: u8 = 1;

/// Some items failed; a per-item summary was printed.
const EXIT_PARTIAL: u8 = 2;

#[derive(Parser)]
#[command(name = "foldervault")]
#[command(version)]
#[command(about = "Password-protected folder encryption and duplicate cleanup.", long_about = None)]
struct Cli {
    /// Read password from stdin instead of from terminal
    #[arg(long, global = true)]
    password_stdin: bool,

    /// Log debug output to stderr (FOLDERVAULT_LOG takes precedence)
    #[arg(long, global = true)]
    debug: bool,

    /// scrypt cost (log2 N) for newly created vaults
    #[arg(long, global = true, env = "FOLDERVAULT_SCRYPT_LOG_N", hide = true)]
    scrypt_log_n: Option<u8>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt every file in a folder in place
    #[command(alias = "e")]
    Encrypt {
        /// Folder whose files are to be encrypted
        folder: PathBuf,

        /// Password; prompted for when omitted
        password: Option<String>,
    },

    /// Decrypt every file in a previously encrypted folder
    #[command(alias = "d")]
    Decrypt {
        /// Folder whose files are to be decrypted
        folder: PathBuf,

        /// Password; prompted for when omitted
        password: Option<String>,
    },

    /// Find duplicate files and images and offer to delete the copies
    Dedupe {
        /// Folder to scan
        folder: PathBuf,

        /// Similarity in percent two images need to count as duplicates
        #[arg(long, default_value_t = 100)]
        threshold: u32,

        /// Delete duplicates without asking
        #[arg(long)]
        yes: bool,
    },
}

enum Outcome {
    Complete,
    Partial,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.debug);

    match run(cli) {
        Ok(Outcome::Complete) => ExitCode::SUCCESS,
        Ok(Outcome::Partial) => ExitCode::from(EXIT_PARTIAL),
        Err(e) => {
            eprintln!("Error: {}", e.chain_message());
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

fn init_logging(debug: bool) {
    let default = if debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<Outcome> {
    let mut kdf = KdfParams::default();
    if let Some(log_n) = cli.scrypt_log_n {
        kdf.log_n = log_n;
    }
    let config = VaultConfig::default().with_kdf(kdf);

    match cli.command {
        Commands::Encrypt { folder, password } => {
            let mut reader = get_password_reader(password, cli.password_stdin, true)?;
            let password = reader.read_password()?;
            let report = VaultManager::new(config).encrypt_folder(&folder, &password)?;
            Ok(print_report(&folder, "encrypted", &report))
        }
        Commands::Decrypt { folder, password } => {
            let mut reader = get_password_reader(password, cli.password_stdin, false)?;
            let password = reader.read_password()?;
            let report = VaultManager::new(config).decrypt_folder(&folder, &password)?;
            Ok(print_report(&folder, "decrypted", &report))
        }
        Commands::Dedupe {
            folder,
            threshold,
            yes,
        } => {
            let config = config.with_threshold(Threshold::new(threshold)?);
            run_dedupe(&folder, &config, yes)
        }
    }
}

fn get_password_reader(
    argument: Option<String>,
    use_stdin: bool,
    confirm: bool,
) -> Result<Box<dyn PasswordReader>> {
    match (argument, use_stdin) {
        (Some(_), true) => Err(VaultError::new(
            ErrorCategory::User,
            "give either a password argument or --password-stdin, not both",
        )),
        (Some(password), false) => Ok(Box::new(ArgumentPasswordReader::new(password))),
        (None, true) => Ok(Box::new(StdinPasswordReader::stdin())),
        (None, false) => Ok(Box::new(TerminalPasswordReader::new(confirm))),
    }
}

fn print_report(folder: &Path, verb: &str, report: &BatchReport) -> Outcome {
    for file in &report.files {
        match &file.outcome {
            FileOutcome::Succeeded => {}
            FileOutcome::Skipped(reason) => {
                println!("  SKIPPED {}: {}", file.path.display(), reason)
            }
            FileOutcome::Failed(e) => {
                println!("  FAILED  {}: {}", file.path.display(), e.chain_message())
            }
        }
    }

    if report.is_success() {
        println!(
            "Folder '{}' {} successfully! ({} files)",
            folder.display(),
            verb,
            report.succeeded()
        );
        Outcome::Complete
    } else {
        eprintln!(
            "Folder '{}' only partially {}: {} succeeded, {} failed, {} not attempted",
            folder.display(),
            verb,
            report.succeeded(),
            report.failed(),
            report.skipped()
        );
        Outcome::Partial
    }
}

fn run_dedupe(folder: &Path, config: &VaultConfig, yes: bool) -> Result<Outcome> {
    let _lock = FolderLock::acquire(folder)?;
    let mut scan = scan::scan(folder)?;

    let bar = progress_bar(scan.len() as u64, "Scanning files");
    let mut records = Vec::new();
    let mut unreadable = Vec::new();
    for item in scan.by_ref() {
        bar.inc(1);
        match item {
            Ok(record) => records.push(record),
            Err(e) => unreadable.push(e),
        }
    }
    bar.finish_and_clear();

    for (path, _) in scan.skipped() {
        println!("Skipping invalid image file: {}", path.display());
    }
    for e in &unreadable {
        println!("  FAILED  {}", e.chain_message());
    }

    let groups = dedupe::find_duplicates(records, config.threshold);
    let plan = dedupe::plan_deletion(&groups);
    let scanned_cleanly = unreadable.is_empty();

    if plan.is_empty() {
        println!("No duplicate files found.");
        return Ok(outcome(scanned_cleanly));
    }

    println!("\nFound the following duplicate files:");
    for (i, entry) in plan.paths_to_delete.iter().enumerate() {
        println!(
            "{}. {} (Duplicate of {})",
            i + 1,
            entry.path.display(),
            entry.duplicate_of.display()
        );
    }
    println!(
        "\nTotal storage that can be saved: {} bytes",
        plan.bytes_reclaimed
    );

    if !yes {
        if !io::stdin().is_terminal() {
            println!("Not deleting anything: stdin is not a terminal. Pass --yes to delete.");
            return Ok(outcome(scanned_cleanly));
        }
        let stdin = io::stdin();
        if !confirm("\nDelete duplicate files? (y/n): ", &mut stdin.lock())? {
            println!("Deletion cancelled.");
            return Ok(outcome(scanned_cleanly));
        }
    }

    let report = dedupe::execute_deletion(&plan)?;
    for (path, e) in &report.failures {
        println!("  FAILED  {}: {}", path.display(), e.chain_message());
    }
    println!(
        "{} duplicate files deleted. {} bytes freed up!",
        report.deleted, report.bytes_freed
    );
    Ok(outcome(scanned_cleanly && report.is_complete()))
}

fn outcome(complete: bool) -> Outcome {
    if complete {
        Outcome::Complete
    } else {
        Outcome::Partial
    }
}

fn progress_bar(len: u64, message: &'static str) -> ProgressBar {
    let bar = ProgressBar::new(len);
    bar.set_style(
        ProgressStyle::with_template("{msg} [{bar:40.cyan/blue}] {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    bar.set_message(message);
    bar
}

/// Ask a yes/no question, reading answers from `input`. End of input
/// counts as "no".
fn confirm(question: &str, input: &mut impl BufRead) -> Result<bool> {
    let mut lines = input.lines();
    loop {
        print!("{}", question);
        io::stdout()
            .flush()
            .map_err(|e| VaultError::io(ErrorCategory::Internal, "failed to flush prompt", e))?;

        let Some(line) = lines.next() else {
            println!();
            return Ok(false);
        };
        let line = line
            .map_err(|e| VaultError::io(ErrorCategory::Internal, "failed to read answer", e))?;
        match line.trim().to_lowercase().as_str() {
            "y" => return Ok(true),
            "n" => return Ok(false),
            _ => println!("Invalid input. Please enter 'y' or 'n'."),
        }
    }
}
