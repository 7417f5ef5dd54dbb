//! keepsafe CLI - Command line interface for vault operations.
//!
//! Every command opens the vault, performs one operation and exits. The
//! password comes from `KEEPSAFE_PASSWORD` or an interactive prompt.

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use zeroize::Zeroizing;

use keepsafe_common::VaultPath;
use keepsafe_crypto::KdfParams;
use keepsafe_vault::{
    Directory, EntryKind, FileContent, InitState, Node, ReadMode, Vault, VaultInitializer,
};

const PASSWORD_ENV: &str = "KEEPSAFE_PASSWORD";
const NEW_PASSWORD_ENV: &str = "KEEPSAFE_NEW_PASSWORD";

#[derive(Parser)]
#[command(name = "keepsafe")]
#[command(about = "keepsafe - Password-protected encrypted vault")]
#[command(version)]
struct Cli {
    /// Vault directory (default: the platform data directory).
    #[arg(long, global = true, env = "KEEPSAFE_VAULT")]
    vault: Option<PathBuf>,

    /// Directory inside the vault that relative paths start from.
    #[arg(long, global = true, default_value = "/")]
    cwd: String,

    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a vault, or finish a partially created one.
    Init {
        /// KDF strength: "interactive", "moderate", or "sensitive".
        #[arg(short, long, default_value = "interactive")]
        kdf: String,
    },

    /// Show initialization state and vault information.
    Status,

    /// List a directory.
    Ls {
        /// Directory to list (default: the current directory).
        path: Option<String>,

        /// Print the whole subtree.
        #[arg(long)]
        tree: bool,

        /// Print entries as JSON.
        #[arg(long, conflicts_with = "tree")]
        json: bool,
    },

    /// Add a file, replacing any file already at the destination.
    Add {
        /// Source file on disk.
        source: PathBuf,

        /// Destination path in the vault.
        dest: String,
    },

    /// Print or extract a file.
    Cat {
        /// Path in the vault.
        path: String,

        /// Decode as text; binary content is printed as base64.
        #[arg(long)]
        text: bool,

        /// Write to this file instead of standard output.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Delete a file.
    Rm { path: String },

    /// Create a directory and any missing parents.
    Mkdir { path: String },

    /// Delete a directory and everything in it.
    Rmdir { path: String },

    /// Rename or move a directory.
    Mvdir { old: String, new: String },

    /// Move a file, or move it into an existing directory.
    Mv { source: String, dest: String },

    /// Exit successfully if the directory exists.
    Exists { path: String },

    /// Re-encrypt the vault under fresh keys and a new password.
    Rotate,

    /// Print the vault public key and its fingerprint.
    ExportKey,

    /// Delete encrypted objects no index entry refers to.
    Prune,

    /// Generate shell completions.
    Completions { shell: Shell },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "keepsafe", &mut std::io::stdout());
        return Ok(());
    }

    let base = vault_dir(cli.vault)?;
    let cwd = VaultPath::parse(&cli.cwd).context("Invalid --cwd")?;
    let resolve = |p: &str| -> Result<VaultPath> {
        cwd.resolve(p)
            .with_context(|| format!("Invalid vault path: {}", p))
    };

    match cli.command {
        Commands::Init { kdf } => cmd_init(&base, &kdf),
        Commands::Status => cmd_status(&base),
        Commands::Ls { path, tree, json } => {
            let dir = match path {
                Some(p) => resolve(&p)?,
                None => cwd.clone(),
            };
            cmd_ls(&base, &dir, tree, json)
        }
        Commands::Add { source, dest } => cmd_add(&base, &source, &resolve(&dest)?),
        Commands::Cat { path, text, out } => cmd_cat(&base, &resolve(&path)?, text, out),
        Commands::Rm { path } => {
            let path = resolve(&path)?;
            open(&base)?.delete_file(&path).context("Failed to remove file")?;
            println!("Removed {}", path);
            Ok(())
        }
        Commands::Mkdir { path } => {
            let path = resolve(&path)?;
            open(&base)?
                .create_directory(&path)
                .context("Failed to create directory")?;
            println!("Created {}", path);
            Ok(())
        }
        Commands::Rmdir { path } => {
            let path = resolve(&path)?;
            let removed = open(&base)?
                .delete_directory(&path)
                .context("Failed to remove directory")?;
            println!("Removed {} ({} files)", path, removed);
            Ok(())
        }
        Commands::Mvdir { old, new } => {
            let (old, new) = (resolve(&old)?, resolve(&new)?);
            open(&base)?
                .rename_directory(&old, &new)
                .context("Failed to rename directory")?;
            println!("{} -> {}", old, new);
            Ok(())
        }
        Commands::Mv { source, dest } => {
            let source = resolve(&source)?;
            let target = open(&base)?
                .move_file(&source, &resolve(&dest)?)
                .context("Failed to move file")?;
            println!("{} -> {}", source, target);
            Ok(())
        }
        Commands::Exists { path } => {
            let path = resolve(&path)?;
            if open(&base)?.directory_exists(&path) {
                println!("{} exists", path);
                Ok(())
            } else {
                bail!("{} is not a directory in the vault", path)
            }
        }
        Commands::Rotate => cmd_rotate(&base),
        Commands::ExportKey => {
            let vault = open(&base)?;
            print!("{}", vault.export_public_key()?);
            println!("Fingerprint: {}", vault.fingerprint()?);
            Ok(())
        }
        Commands::Prune => {
            let pruned = open(&base)?.prune_orphans().context("Failed to prune")?;
            for name in &pruned {
                println!("Deleted {}", name);
            }
            println!("{} orphaned objects removed", pruned.len());
            Ok(())
        }
        Commands::Completions { .. } => Ok(()),
    }
}

fn vault_dir(explicit: Option<PathBuf>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path),
        None => dirs::data_local_dir()
            .map(|dir| dir.join("keepsafe"))
            .context("No data directory on this platform; pass --vault"),
    }
}

/// Read a password from `env` or prompt for it.
fn password(env: &str, prompt: &str) -> Result<Zeroizing<Vec<u8>>> {
    if let Ok(value) = std::env::var(env) {
        return Ok(Zeroizing::new(value.into_bytes()));
    }
    let password = rpassword::prompt_password(prompt).context("Failed to read password")?;
    Ok(Zeroizing::new(password.into_bytes()))
}

/// Read a new password, asking twice when prompting.
fn new_password(env: &str, prompt: &str) -> Result<Zeroizing<Vec<u8>>> {
    if let Ok(value) = std::env::var(env) {
        return Ok(Zeroizing::new(value.into_bytes()));
    }
    let first = password(env, prompt)?;
    let confirm = password(env, "Confirm password: ")?;
    if first != confirm {
        bail!("Passwords do not match");
    }
    if first.is_empty() {
        bail!("Password cannot be empty");
    }
    Ok(first)
}

fn open(base: &Path) -> Result<Vault> {
    let password = password(PASSWORD_ENV, "Enter password: ")?;
    Vault::open(base, &password)
        .with_context(|| format!("Failed to open vault at {}", base.display()))
}

fn cmd_init(base: &Path, kdf: &str) -> Result<()> {
    let params = KdfParams::from_preset(kdf)?;
    let initializer = VaultInitializer::new().with_kdf_params(params);

    if initializer.state(base)? == InitState::Ready {
        println!("Vault at {} is already initialized", base.display());
        return Ok(());
    }

    let password = new_password(PASSWORD_ENV, "New vault password: ")?;
    info!(path = %base.display(), "Initializing vault");
    initializer
        .initialize(base, &password)
        .context("Failed to initialize vault")?;

    println!("Vault initialized at {}", base.display());
    Ok(())
}

fn cmd_status(base: &Path) -> Result<()> {
    let state = VaultInitializer::new().state(base)?;
    println!("Location: {}", base.display());
    println!("State: {:?}", state);
    if state != InitState::Ready {
        return Ok(());
    }

    let vault = open(base)?;
    let config = vault.config();
    let root = vault.list_files();

    println!("Version: {}.{}", config.version.major, config.version.minor);
    println!("Created: {}", config.created_at);
    println!("Modified: {}", config.modified_at);
    println!("Key size: {} bits", config.key_bits);
    println!("KDF Parameters:");
    println!("  Memory: {} KiB", config.kdf_params.memory_cost);
    println!("  Time: {} iterations", config.kdf_params.time_cost);
    println!("  Parallelism: {}", config.kdf_params.parallelism);
    println!("Files: {} ({} bytes)", root.file_count(), root.total_size());
    println!("Fingerprint: {}", vault.fingerprint()?);
    Ok(())
}

fn cmd_ls(base: &Path, dir: &VaultPath, tree: bool, json: bool) -> Result<()> {
    let vault = open(base)?;

    if tree {
        let node = vault.tree().directory(dir).context("Failed to list directory")?;
        println!("{}", dir);
        print_tree(node, 1);
        return Ok(());
    }

    let entries = vault
        .list_directory(dir)
        .context("Failed to list directory")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else if entries.is_empty() {
        println!("Directory is empty.");
    } else {
        for entry in entries {
            match entry.kind {
                EntryKind::Directory => println!("  [DIR]  {}/", entry.name),
                EntryKind::File => println!(
                    "  [FILE] {} ({} bytes)",
                    entry.name,
                    entry.size.unwrap_or_default()
                ),
            }
        }
    }
    Ok(())
}

fn print_tree(dir: &Directory, depth: usize) {
    let indent = "  ".repeat(depth);
    for node in dir.children.values() {
        match node {
            Node::Directory(child) => {
                println!("{}{}/", indent, child.name);
                print_tree(child, depth + 1);
            }
            Node::File(file) => println!("{}{} ({} bytes)", indent, file.name, file.size),
        }
    }
}

fn cmd_add(base: &Path, source: &Path, dest: &VaultPath) -> Result<()> {
    let content = Zeroizing::new(
        std::fs::read(source)
            .with_context(|| format!("Failed to read {}", source.display()))?,
    );

    let mut vault = open(base)?;
    vault
        .add_file(&content, dest)
        .context("Failed to add file")?;

    println!("Added {} ({} bytes)", dest, content.len());
    Ok(())
}

fn cmd_cat(base: &Path, path: &VaultPath, text: bool, out: Option<PathBuf>) -> Result<()> {
    let vault = open(base)?;
    let mode = if text { ReadMode::Text } else { ReadMode::Raw };
    let content = vault
        .read_file(path, mode)
        .context("Failed to read file from vault")?;

    if let FileContent::Base64(_) = content {
        eprintln!("{} is not UTF-8 text; printing base64", path);
    }
    let bytes = Zeroizing::new(content.into_bytes());

    match out {
        Some(out) => {
            std::fs::write(&out, &*bytes)
                .with_context(|| format!("Failed to write {}", out.display()))?;
            println!("Extracted {} to {} ({} bytes)", path, out.display(), bytes.len());
        }
        None => {
            use std::io::Write;
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&bytes)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

fn cmd_rotate(base: &Path) -> Result<()> {
    let mut vault = open(base)?;

    let plan = vault.begin_rotation().context("Failed to decrypt vault")?;
    println!(
        "Re-encrypting {} files ({} bytes)",
        plan.file_count(),
        plan.total_size()
    );

    let new_password = new_password(NEW_PASSWORD_ENV, "New password: ")?;
    vault
        .commit_rotation(plan, &new_password)
        .context("Key rotation failed")?;

    println!("Keys rotated. New fingerprint: {}", vault.fingerprint()?);
    Ok(())
}
