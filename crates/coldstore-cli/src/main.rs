//! coldstore: archive files into cold-storage vaults
//!
//! Commands:
//!   upload <vault> <paths...>        - upload files (or `-` for stdin), one archive each
//!   download <vault> <job>           - fetch a finished job's output and verify its tree hash
//!   retrieve / inventory             - start archive-retrieval or inventory-retrieval jobs
//!   jobs, job describe               - inspect retrieval jobs
//!   vaults, vault create|describe|delete
//!   archive delete, abort            - remove archives and abandoned multipart uploads
//!   config show                      - display the active configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use coldstore_client::upload::check_description;
use coldstore_client::{Client, HashCheck, JobParameters, ProgressFn};
use coldstore_core::{ArchiveId, ColdstoreConfig, JobId, PartSize, UploadId};

const DEFAULT_CONFIG: &str = "~/.config/coldstore/config.toml";

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "coldstore",
    version,
    about = "Cold-storage archive client",
    long_about = "coldstore: upload, retrieve and manage archives in cold-storage vaults"
)]
struct Cli {
    /// Path to config.toml
    #[arg(long, short = 'c', env = "COLDSTORE_CONFIG", default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// Log filter (overrides log.level; RUST_LOG overrides both)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log output format (overrides log.format)
    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Upload files as archives, one archive per path
    Upload {
        vault: String,
        /// Files to upload; `-` reads standard input
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Archive description (default: the file name)
        #[arg(long, short = 'd')]
        description: Option<String>,
        /// Part size in MiB for multipart uploads (power of two, 1..=4096)
        #[arg(long)]
        part_size_mib: Option<u64>,
    },

    /// Download the output of a completed job
    Download {
        vault: String,
        job: String,
        /// Output file (default: standard output)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Start an archive-retrieval job
    Retrieve {
        vault: String,
        archive: String,
        #[arg(long, short = 'd')]
        description: Option<String>,
    },

    /// Start an inventory-retrieval job
    Inventory {
        vault: String,
        #[arg(long, value_enum, default_value_t = InventoryFormat::Json)]
        format: InventoryFormat,
    },

    /// List the jobs of a vault
    Jobs { vault: String },

    /// Job management
    Job {
        #[command(subcommand)]
        action: JobAction,
    },

    /// List all vaults
    Vaults,

    /// Vault management
    Vault {
        #[command(subcommand)]
        action: VaultAction,
    },

    /// Archive management
    Archive {
        #[command(subcommand)]
        action: ArchiveAction,
    },

    /// Abort an unfinished multipart upload
    Abort { vault: String, upload_id: String },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum JobAction {
    /// Show one job
    Describe { vault: String, job: String },
}

#[derive(Subcommand, Debug)]
enum VaultAction {
    Create { vault: String },
    Describe { vault: String },
    /// Delete an empty vault
    Delete { vault: String },
}

#[derive(Subcommand, Debug)]
enum ArchiveAction {
    Delete { vault: String, archive: String },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum LogFormat {
    Text,
    Json,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum InventoryFormat {
    Json,
    Csv,
}

impl InventoryFormat {
    fn as_param(self) -> &'static str {
        match self {
            InventoryFormat::Json => "JSON",
            InventoryFormat::Csv => "CSV",
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = expand_tilde(&cli.config);
    let config = load_config(&config_path)?;

    let level = cli.log_level.as_deref().unwrap_or(&config.log.level);
    let format = match cli.log_format {
        Some(f) => f,
        None => LogFormat::from_str(&config.log.format, true)
            .map_err(|e| anyhow::anyhow!("log.format: {e}"))?,
    };
    init_logging(level, format);
    tracing::debug!(
        config = %config_path.display(),
        endpoint = %config.client.endpoint_url(),
        "configuration loaded"
    );

    if let Commands::Config { action: ConfigAction::Show } = cli.command {
        return cmd_config_show(&config, &config_path);
    }

    let client = build_client(&config)?;
    match cli.command {
        Commands::Upload {
            vault,
            paths,
            description,
            part_size_mib,
        } => cmd_upload(client, &vault, &paths, description.as_deref(), part_size_mib),
        Commands::Download { vault, job, output } => {
            cmd_download(&client, &vault, &JobId::new(job), output.as_deref())
        }
        Commands::Retrieve {
            vault,
            archive,
            description,
        } => {
            let params = JobParameters::archive_retrieval(ArchiveId::new(archive), description);
            cmd_initiate_job(&client, &vault, &params)
        }
        Commands::Inventory { vault, format } => {
            let params = JobParameters::inventory_retrieval(Some(format.as_param().into()), None);
            cmd_initiate_job(&client, &vault, &params)
        }
        Commands::Jobs { vault } => cmd_jobs(&client, &vault),
        Commands::Job {
            action: JobAction::Describe { vault, job },
        } => {
            let job = client
                .describe_job(&vault, &JobId::new(job))
                .context("describing job")?;
            print_json(&job)
        }
        Commands::Vaults => cmd_vaults(&client),
        Commands::Vault { action } => cmd_vault(&client, action),
        Commands::Archive {
            action: ArchiveAction::Delete { vault, archive },
        } => {
            let archive = ArchiveId::new(archive);
            client
                .delete_archive(&vault, &archive)
                .with_context(|| format!("deleting archive {archive}"))?;
            println!("deleted archive {archive}");
            Ok(())
        }
        Commands::Abort { vault, upload_id } => {
            let upload = UploadId::new(upload_id);
            client
                .abort_multipart_upload(&vault, &upload)
                .with_context(|| format!("aborting upload {upload}"))?;
            println!("aborted upload {upload}");
            Ok(())
        }
        Commands::Config { .. } => Ok(()),
    }
}

// ── Config, logging, client ───────────────────────────────────────────────────

fn load_config(path: &Path) -> Result<ColdstoreConfig> {
    if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let config: ColdstoreConfig = toml::from_str(&content)
            .with_context(|| format!("parsing config: {}", path.display()))?;
        config
            .client
            .validate()
            .with_context(|| format!("validating config: {}", path.display()))?;
        Ok(config)
    } else {
        Ok(ColdstoreConfig::default())
    }
}

/// Expand `~` in path to the user's home directory
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    match s.strip_prefix("~/") {
        Some(rest) => {
            let home = std::env::var("HOME").unwrap_or_default();
            PathBuf::from(home).join(rest)
        }
        None => path.to_path_buf(),
    }
}

fn init_logging(level: &str, format: LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(io::stderr))
                .init();
        }
    }
}

fn build_client(config: &ColdstoreConfig) -> Result<Client> {
    let credentials = coldstore_secrets::load(config).context("loading credentials")?;
    Client::from_config(&config.client, credentials).context("building client")
}

// ── Progress bar helpers ──────────────────────────────────────────────────────

fn make_progress_bar(total: u64, prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::with_template(
            "{prefix:.bold} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-"),
    );
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn make_spinner(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{prefix:.bold} {spinner} {bytes} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn part_progress(pb: &ProgressBar) -> ProgressFn {
    let pb = pb.clone();
    Box::new(move |done, part| {
        pb.set_position(done);
        pb.set_message(format!("part {}", part + 1));
    })
}

// ── `coldstore upload` ────────────────────────────────────────────────────────

/// Default description: the file name, when the service would accept it
fn default_description(path: &Path) -> Option<String> {
    if path == Path::new("-") {
        return None;
    }
    let name = path.file_name()?.to_str()?;
    check_description(name).ok().map(|_| name.to_string())
}

fn open_input(path: &Path) -> Result<(Box<dyn Read>, Option<u64>)> {
    if path == Path::new("-") {
        return Ok((Box::new(io::stdin().lock()), None));
    }
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let len = file
        .metadata()
        .with_context(|| format!("reading metadata: {}", path.display()))?
        .len();
    Ok((Box::new(file), Some(len)))
}

fn cmd_upload(
    client: Client,
    vault: &str,
    paths: &[PathBuf],
    description: Option<&str>,
    part_size_mib: Option<u64>,
) -> Result<()> {
    let client = match part_size_mib {
        Some(mib) => client.with_part_size(PartSize::from_mib(mib).context("--part-size-mib")?),
        None => client,
    };
    if let Some(d) = description {
        check_description(d).context("--description")?;
    }

    for path in paths {
        let (reader, len) = open_input(path)?;
        let description = description
            .map(str::to_string)
            .or_else(|| default_description(path));

        let pb = match len {
            Some(total) => make_progress_bar(total, "upload"),
            None => make_spinner("upload"),
        };
        let progress = part_progress(&pb);

        let receipt = client
            .upload(vault, description.as_deref(), reader, Some(&progress))
            .with_context(|| format!("uploading {}", path.display()))?;
        pb.finish_and_clear();

        println!("{}", path.display());
        println!("  archive id: {}", receipt.archive_id);
        println!("  tree hash:  {}", receipt.tree_hash);
        println!("  size:       {}", fmt_bytes(receipt.size));
        println!("  parts:      {}", receipt.parts);
    }
    Ok(())
}

// ── `coldstore download` ──────────────────────────────────────────────────────

fn cmd_download(client: &Client, vault: &str, job: &JobId, output: Option<&Path>) -> Result<()> {
    let to_stdout = output.map_or(true, |p| p == Path::new("-"));
    let mut sink: Box<dyn Write> = match output {
        Some(path) if !to_stdout => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        )),
        _ => Box::new(BufWriter::new(io::stdout().lock())),
    };

    let pb = make_spinner("download");
    if to_stdout {
        pb.set_draw_target(indicatif::ProgressDrawTarget::hidden());
    }
    let progress: ProgressFn = {
        let pb = pb.clone();
        Box::new(move |done, _| pb.set_position(done))
    };

    let report = client
        .download(vault, job, &mut sink, Some(&progress))
        .with_context(|| format!("downloading output of job {job}"))?;
    pb.finish_and_clear();
    drop(sink);

    match report.check {
        HashCheck::Match => eprintln!(
            "downloaded {} (tree hash {} verified)",
            fmt_bytes(report.bytes),
            report.tree_hash
        ),
        HashCheck::Mismatch { expected, actual } => eprintln!(
            "warning: tree hash mismatch after {}: service says {expected}, received {actual}",
            fmt_bytes(report.bytes)
        ),
        HashCheck::Unavailable => eprintln!(
            "downloaded {} (no tree hash to verify against)",
            fmt_bytes(report.bytes)
        ),
    }
    Ok(())
}

// ── Jobs and vaults ───────────────────────────────────────────────────────────

fn cmd_initiate_job(client: &Client, vault: &str, params: &JobParameters) -> Result<()> {
    let job = client
        .initiate_job(vault, params)
        .with_context(|| format!("starting job on vault {vault}"))?;
    println!("{job}");
    Ok(())
}

fn cmd_jobs(client: &Client, vault: &str) -> Result<()> {
    let jobs = client
        .list_jobs(vault)
        .with_context(|| format!("listing jobs of {vault}"))?;
    if jobs.is_empty() {
        println!("no jobs");
        return Ok(());
    }
    for job in jobs {
        println!(
            "{}  {:<20} {:<11} {}",
            job.job_id,
            job.action,
            job.status_code,
            job.creation_date
        );
    }
    Ok(())
}

fn cmd_vaults(client: &Client) -> Result<()> {
    let vaults = client.list_vaults().context("listing vaults")?;
    if vaults.is_empty() {
        println!("no vaults");
        return Ok(());
    }
    for v in vaults {
        println!(
            "{:<32} {:>8} archives {:>12}  created {}",
            v.vault_name,
            v.number_of_archives,
            fmt_bytes(v.size_in_bytes),
            v.creation_date
        );
    }
    Ok(())
}

fn cmd_vault(client: &Client, action: VaultAction) -> Result<()> {
    match action {
        VaultAction::Create { vault } => {
            client
                .create_vault(&vault)
                .with_context(|| format!("creating vault {vault}"))?;
            println!("created vault {vault}");
        }
        VaultAction::Describe { vault } => {
            let description = client
                .describe_vault(&vault)
                .with_context(|| format!("describing vault {vault}"))?;
            print_json(&description)?;
        }
        VaultAction::Delete { vault } => {
            client
                .delete_vault(&vault)
                .with_context(|| format!("deleting vault {vault}"))?;
            println!("deleted vault {vault}");
        }
    }
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("rendering JSON")?;
    println!("{rendered}");
    Ok(())
}

// ── `coldstore config show` ───────────────────────────────────────────────────

fn cmd_config_show(config: &ColdstoreConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!("# Endpoint: {}", config.client.endpoint_url());
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

fn fmt_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
