use clap::{Parser, Subcommand};
use minibk::archive::{self, PackOptions};
use minibk::codec::CompressionMode;
use minibk::crypto::CipherMode;
use minibk::filter::FilterOptions;
use minibk::record::FileType;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "minibk", version, about = "Single-file backup containers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Back up a file or directory tree into a container
    Pack {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Cipher: none (default), xor, rc4.  Needs a password to take effect.
        #[arg(long, default_value = "none")]
        cipher: CipherMode,
        #[arg(short, long)]
        password: Option<String>,
        /// Compression: none (default), rle
        #[arg(long = "compress", default_value = "none")]
        compression: CompressionMode,
        #[command(flatten)]
        filter: FilterArgs,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Restore a container
    Unpack {
        input: PathBuf,
        #[arg(short = 'C', long, default_value = ".")]
        output_dir: PathBuf,
        #[arg(short, long)]
        password: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// List container contents
    List {
        input: PathBuf,
        #[arg(short, long)]
        password: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Check every payload CRC; exits non-zero on any mismatch
    Verify {
        input: PathBuf,
        #[arg(short, long)]
        password: Option<String>,
    },
}

/// Filter flags.  Each one given overrides the same field from `--filter-file`.
#[derive(clap::Args)]
struct FilterArgs {
    /// Keep entries whose name contains this substring
    #[arg(long)]
    name: Option<String>,
    /// Keep entries whose relative path contains this substring
    #[arg(long)]
    path_contains: Option<String>,
    /// Keep only this type: file, dir, symlink
    #[arg(long = "type", value_parser = parse_file_type)]
    file_type: Option<FileType>,
    /// Minimum size in bytes (regular files only)
    #[arg(long)]
    min_size: Option<u64>,
    /// Maximum size in bytes (regular files only)
    #[arg(long)]
    max_size: Option<u64>,
    /// Keep files and symlinks modified within the last N days
    #[arg(long)]
    newer_than_days: Option<u32>,
    /// Keep files and symlinks owned by this uid
    #[arg(long)]
    uid: Option<u32>,
    /// Load filter options from a JSON file
    #[arg(long)]
    filter_file: Option<PathBuf>,
}

impl FilterArgs {
    fn into_filter(self) -> Result<FilterOptions, Box<dyn std::error::Error>> {
        let mut filter: FilterOptions = match &self.filter_file {
            Some(path) => serde_json::from_slice(&std::fs::read(path)?)?,
            None       => FilterOptions::default(),
        };
        if self.name.is_some()          { filter.name_contains = self.name; }
        if self.path_contains.is_some() { filter.path_contains = self.path_contains; }
        if self.file_type.is_some()     { filter.file_type     = self.file_type; }
        if self.min_size.is_some()      { filter.min_size      = self.min_size; }
        if self.max_size.is_some()      { filter.max_size      = self.max_size; }
        if self.uid.is_some()           { filter.uid           = self.uid; }
        if let Some(days) = self.newer_than_days {
            let floor = chrono::Utc::now() - chrono::Duration::days(i64::from(days));
            filter.modified_after = Some(floor.timestamp());
        }
        Ok(filter)
    }
}

fn parse_file_type(s: &str) -> Result<FileType, String> {
    FileType::from_name(s).ok_or_else(|| format!("unknown type '{s}' (expected file, dir or symlink)"))
}

fn init_tracing() {
    use tracing::Level;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{EnvFilter, Layer};

    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    let stderr_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(std::io::stderr)
        .with_filter(env_filter);

    tracing_subscriber::registry().with(stderr_layer).init();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    match Cli::parse().command {

        // ── Pack ─────────────────────────────────────────────────────────────
        Commands::Pack { input, output, cipher, password, compression, filter, json } => {
            let opts = PackOptions {
                cipher,
                compression,
                password,
                filter: filter.into_filter()?,
            };
            let summary = archive::pack(&input, &output, &opts)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                for w in &summary.warnings {
                    println!("  warning {w}");
                }
                println!("Created: {}", output.display());
                println!("  Cipher       {}", summary.cipher);
                println!("  Compression  {}", summary.compression);
                println!("  Files        {}", summary.files);
                println!("  Directories  {}", summary.directories);
                println!("  Symlinks     {}", summary.symlinks);
                println!("  Bytes in     {}", summary.bytes_in);
                println!("  Bytes out    {}", summary.bytes_out);
            }
        }

        // ── Unpack ───────────────────────────────────────────────────────────
        Commands::Unpack { input, output_dir, password, json } => {
            let summary = archive::unpack(&input, &output_dir, password.as_deref().unwrap_or(""))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                for w in &summary.warnings {
                    println!("  warning {w}");
                }
                println!("Unpacked {} entries to: {}", summary.restored(), output_dir.display());
                if summary.metadata_failures > 0 {
                    println!("  Attributes not fully restored on {} entries", summary.metadata_failures);
                }
            }
        }

        // ── List ─────────────────────────────────────────────────────────────
        Commands::List { input, password, json } => {
            let entries = archive::list(&input, password.as_deref().unwrap_or(""))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                println!("Archive: {}", input.display());
                println!("{:<8} {:>7} {:>12} {:>12} {:>9}  Path",
                         "Type", "Mode", "Size", "Stored", "CRC32");
                for e in &entries {
                    let crc = if e.crc_ok { format!("{:08X}", e.crc32) } else { "BAD".into() };
                    println!("{:<8} {:>7o} {:>12} {:>12} {:>9}  {}",
                             e.file_type.name(), e.attrs.mode, e.size, e.stored_size, crc, e.path);
                }
            }
        }

        // ── Verify ───────────────────────────────────────────────────────────
        Commands::Verify { input, password } => {
            let report = archive::verify(&input, password.as_deref().unwrap_or(""))?;
            for w in &report.warnings {
                println!("  {w}");
            }
            if !report.is_clean() {
                println!("{}: {} of {} entries failed", input.display(), report.warnings.len(), report.entries);
                std::process::exit(1);
            }
            println!("{}: {} entries OK", input.display(), report.entries);
        }
    }
    Ok(())
}
