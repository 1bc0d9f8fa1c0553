use std::path::PathBuf;

use clap::{Parser, Subcommand};

use repodex::cache::{CachePaths, CacheStore, file_age, is_stale};
use repodex::config::{self, BASE_ENV_VAR, Config};
use repodex::refresh::{ProcessSpawner, RebuildOutcome, lower_priority};
use repodex::{Indexer, Scanner};

#[derive(Parser)]
#[command(
    name = "repodex",
    version,
    about = "Find the git repositories under your base directories"
)]
struct Cli {
    /// Base directory to index (repeatable); overrides REPODEX_BASE and ~/.repodexBase
    #[arg(long = "base", value_name = "DIR", global = true)]
    bases: Vec<PathBuf>,

    /// Directory holding the cache and lock files [default: home directory]
    #[arg(long, value_name = "DIR", global = true)]
    cache_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List indexed repositories (default)
    List,

    /// Print the path of a repository
    Path {
        /// Repository name
        name: String,
    },

    /// Show the configured base directories
    Bases,

    /// Show cache and scanner status
    Status,

    /// Rescan all base directories now
    Reindex,

    /// Rebuild the cache unless a rebuild is already running
    #[command(hide = true)]
    Rebuild,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let config = build_config(&cli);

    let result = match cli.command.unwrap_or(Commands::List) {
        Commands::List => cmd_list(config),
        Commands::Path { name } => cmd_path(config, &name),
        Commands::Bases => cmd_bases(&config),
        Commands::Status => cmd_status(&config),
        Commands::Reindex => cmd_reindex(config),
        Commands::Rebuild => cmd_rebuild(config),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn build_config(cli: &Cli) -> Config {
    let home = config::home_dir();

    let base_dirs = if cli.bases.is_empty() {
        config::resolve_base_dirs(std::env::var_os(BASE_ENV_VAR), &home)
    } else {
        cli.bases
            .iter()
            .map(|base| std::path::absolute(base).unwrap_or_else(|_| base.clone()))
            .collect()
    };

    let root = cli.cache_root.clone().unwrap_or(home);
    Config::new(base_dirs, CachePaths::new(root))
}

fn indexer(config: Config) -> Result<Indexer, Box<dyn std::error::Error>> {
    let spawner = ProcessSpawner::current_exe()?;
    Ok(Indexer::new(config, Scanner::detect(), spawner))
}

fn cmd_list(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let index = indexer(config)?.index();

    if index.is_empty() {
        println!("No repositories found");
        return Ok(());
    }

    for repo in index.repos() {
        println!("{:<30} {}", repo.name(), repo.path().display());
    }

    Ok(())
}

fn cmd_path(config: Config, name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let index = indexer(config)?.index();
    let repo = index
        .find_by_name(name)
        .ok_or_else(|| format!("no repository named '{}'", name))?;

    println!("{}", repo.path().display());
    Ok(())
}

fn cmd_bases(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    for base in &config.base_dirs {
        println!("{}", base.display());
    }
    Ok(())
}

fn cmd_status(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("repodex {}\n", config.version);

    let scanner = Scanner::detect();
    println!(
        "[{}] Scanner: {}",
        if scanner.strategy() == "find" { "OK" } else { "WARN" },
        if scanner.strategy() == "find" {
            "find"
        } else {
            "recursive walk (install 'find' for faster indexing)"
        }
    );

    let store = CacheStore::new(config.paths.clone());
    let cache_file = config.paths.cache_file();
    match store.load() {
        Some(index) if index.is_valid_for(&config.version, &config.base_dirs) => println!(
            "[OK] Cache: {} ({} repositories)",
            cache_file.display(),
            index.len()
        ),
        Some(index) => println!(
            "[INFO] Cache: {} is out of date (built by {})",
            cache_file.display(),
            index.created_with_version()
        ),
        None => println!("[INFO] Cache: {} missing or unreadable", cache_file.display()),
    }

    let lock_file = config.paths.lock_file();
    if !lock_file.exists() {
        println!("[OK] Rebuild: idle");
    } else if is_stale(&lock_file, config.stale_lock_after) {
        println!(
            "[WARN] Rebuild: stale lock {} will be reclaimed",
            lock_file.display()
        );
    } else {
        let age = file_age(&lock_file).unwrap_or_default();
        println!(
            "[INFO] Rebuild: running for {}s ({})",
            age.as_secs(),
            lock_file.display()
        );
    }

    println!("\nBase directories:");
    for base in &config.base_dirs {
        println!("  {}", base.display());
    }

    Ok(())
}

fn cmd_reindex(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let index = indexer(config)?.reindex();
    println!(
        "Indexed {} repositories under {} base directories",
        index.len(),
        index.base_dirs().len()
    );
    Ok(())
}

fn cmd_rebuild(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    lower_priority();

    let job = repodex::RebuildJob::new(config, Scanner::detect());
    match job.run_locked() {
        RebuildOutcome::Rebuilt | RebuildOutcome::Skipped => Ok(()),
        RebuildOutcome::Failed => Err("background rebuild failed".into()),
    }
}
