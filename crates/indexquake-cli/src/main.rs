mod commands;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use commands::{EXIT_CONFIG_ERROR, EXIT_FAILURE, EXIT_STORE_ERROR};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "indexquake",
    version,
    about = "Chaos and load harness for JSON document stores with search indexes"
)]
struct Cli {
    /// Path to a TOML run configuration.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Store URL (redis://, rediss:// or memory://); overrides the config file.
    #[arg(long, global = true)]
    url: Option<String>,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Flags shared by `run` and `swarm`; each overrides the config file.
#[derive(Debug, Args)]
struct CommonOverrides {
    /// Flush the whole store before starting.
    #[arg(long, default_value_t = false)]
    flush: bool,
    /// Seed for reproducible chaos command sequences.
    #[arg(long)]
    seed: Option<u64>,
    /// Index name.
    #[arg(long)]
    index: Option<String>,
    /// Key namespace the index covers.
    #[arg(long)]
    namespace: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Write documents while verifying the canary and firing chaos commands.
    Run {
        #[command(flatten)]
        common: CommonOverrides,
        /// Number of documents to write.
        #[arg(short = 'n', long)]
        documents: Option<u64>,
        /// Document ids are drawn from [1, ID_RANGE].
        #[arg(long)]
        id_range: Option<u64>,
        /// Maximum pooled connections.
        #[arg(long)]
        pool_size: Option<usize>,
        /// Run the chaos fuzzer alongside the writer.
        #[arg(long, default_value_t = false)]
        chaos: bool,
        /// Do not seed or verify the canary document.
        #[arg(long, default_value_t = false)]
        no_verify: bool,
        /// Exit with status 4 if any canary verification failed.
        #[arg(long, default_value_t = false)]
        strict: bool,
    },
    /// Hammer the index with many short-lived chaos workers.
    Swarm {
        #[command(flatten)]
        common: CommonOverrides,
        /// Number of concurrent workers.
        #[arg(short, long)]
        workers: Option<usize>,
        /// Maximum pooled connections.
        #[arg(long)]
        connections: Option<usize>,
        /// Run time in seconds.
        #[arg(short, long)]
        duration: Option<u64>,
    },
    /// Create the search index if it does not exist.
    EnsureIndex,
    /// Show the live definition of the search index.
    IndexInfo,
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
    /// Generate man pages in the specified directory.
    ManPages {
        /// Output directory for man pages.
        #[arg(default_value = "man")]
        dir: PathBuf,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("INDEXQUAKE_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let json_output = cli.json;
    let load = || commands::load_config(cli.config.as_deref(), cli.url.as_deref());

    let result = match cli.command {
        Commands::Run {
            common,
            documents,
            id_range,
            pool_size,
            chaos,
            no_verify,
            strict,
        } => load().and_then(|mut config| {
            common.apply(&mut config);
            if let Some(n) = documents {
                config.run.documents = n;
            }
            if let Some(n) = id_range {
                config.run.id_range = n;
            }
            if let Some(n) = pool_size {
                config.store.pool_size = n;
            }
            config.chaos.enabled |= chaos;
            config.run.verify &= !no_verify;
            commands::run::run(config, strict, json_output)
        }),
        Commands::Swarm {
            common,
            workers,
            connections,
            duration,
        } => load().and_then(|mut config| {
            common.apply(&mut config);
            if let Some(n) = workers {
                config.swarm.workers = n;
            }
            if let Some(n) = connections {
                config.swarm.connections = n;
            }
            if let Some(secs) = duration {
                config.swarm.duration_secs = secs;
            }
            commands::swarm::run(config, json_output)
        }),
        Commands::EnsureIndex => {
            load().and_then(|config| commands::ensure_index::run(&config, json_output))
        }
        Commands::IndexInfo => {
            load().and_then(|config| commands::index_info::run(&config, json_output))
        }
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
        Commands::ManPages { dir } => commands::man_pages::run::<Cli>(&dir),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with("config error:") {
                EXIT_CONFIG_ERROR
            } else if msg.starts_with("store error:") {
                EXIT_STORE_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}

impl CommonOverrides {
    fn apply(&self, config: &mut indexquake_core::RunConfig) {
        config.run.flush |= self.flush;
        if let Some(seed) = self.seed {
            config.chaos.seed = Some(seed);
        }
        if let Some(index) = &self.index {
            config.index.name.clone_from(index);
        }
        if let Some(namespace) = &self.namespace {
            config.index.namespace.clone_from(namespace);
        }
    }
}
