//! Organum CLI - The `organum` command.
//!
//! Wires the modular crates into a running organ controller:
//!
//! - **organum-core**: Catalog, routing, state, MIDI transport, input worker
//! - **organum-http**: REST API over the action facade

mod shell;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use organum_core::{
    Actions, Catalog, InputMap, InputWorker, LogSink, MidiInputManager, MidiOutputs, NoteSink,
    Organ, OrganConfig,
};
use signal_hook::consts::{SIGINT, SIGTERM};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// Organum - MIDI pipe organ stop router
#[derive(Parser, Debug)]
#[command(name = "organum")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Routes manuals and stop board to the ranks of a MIDI pipe organ", long_about = None)]
struct Args {
    /// Log debug output (routed notes, raw MIDI input)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Write logs to a file instead of stderr
    #[arg(long, value_name = "PATH", global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the organ: MIDI input, HTTP API and interactive shell
    Run {
        /// Configuration file (defaults to the platform config dir)
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Do not open MIDI ports; outgoing notes are only logged
        #[arg(long)]
        no_midi: bool,
    },

    /// Write an example configuration file
    Init {
        /// Destination (defaults to the platform config dir)
        #[arg(value_name = "FILE")]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Print the default configuration path
    ConfigPath,

    /// Validate a configuration file and print a summary
    Check {
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },

    /// List available MIDI input and output ports
    ListPorts,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logger(args.verbose, args.log_file.as_deref())?;

    match args.command {
        Commands::Run { config, no_midi } => run(config, no_midi),
        Commands::Init { path, force } => init(path, force),
        Commands::ConfigPath => {
            println!("{}", OrganConfig::config_path()?.display());
            Ok(())
        }
        Commands::Check { config } => check(config),
        Commands::ListPorts => list_ports(),
    }
}

/// Info by default, `RUST_LOG` overrides, `--verbose` forces debug.
fn init_logger(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    if let Some(path) = log_file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open log file: {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.init();
    Ok(())
}

fn load_config(path: Option<PathBuf>) -> Result<OrganConfig> {
    match path {
        Some(path) => OrganConfig::load(&path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => OrganConfig::load_default()
            .context("Failed to load configuration (run `organum init` to create one)"),
    }
}

fn init(path: Option<PathBuf>, force: bool) -> Result<()> {
    let path = match path {
        Some(path) => path,
        None => OrganConfig::config_path()?,
    };
    if path.exists() && !force {
        anyhow::bail!(
            "Configuration already exists at {} (use --force to overwrite)",
            path.display()
        );
    }
    let path = OrganConfig::create_example_file(&path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Wrote example configuration to {}", path.display());
    Ok(())
}

fn check(path: Option<PathBuf>) -> Result<()> {
    let config = load_config(path)?;
    let catalog = Catalog::from_config(&config).context("Invalid organ catalog")?;
    let input_map = InputMap::from_config(&config.input, &catalog).context("Invalid input map")?;

    println!(
        "OK: {} ranks, {} stops, {} outputs",
        catalog.rank_count(),
        catalog.stops().len(),
        catalog.outputs().len()
    );
    for stop in catalog.stops() {
        println!("  {:<28} {}", stop.id.to_string(), stop.display_name);
    }
    if input_map.is_empty() {
        println!("No input channels mapped");
    }
    Ok(())
}

fn list_ports() -> Result<()> {
    let client = "organum";
    println!("MIDI inputs:");
    for port in organum_core::list_input_ports(client)? {
        println!("  [{}] {}", port.port_index, port.name);
    }
    println!("MIDI outputs:");
    for port in organum_core::list_output_ports(client)? {
        println!("  [{}] {}", port.port_index, port.name);
    }
    Ok(())
}

fn run(config_path: Option<PathBuf>, no_midi: bool) -> Result<()> {
    // 1. Configuration and catalog
    let config = load_config(config_path)?;
    let catalog = Arc::new(Catalog::from_config(&config).context("Invalid organ catalog")?);
    let input_map = InputMap::from_config(&config.input, &catalog).context("Invalid input map")?;
    log::info!(
        "Catalog ready: {} ranks, {} stops",
        catalog.rank_count(),
        catalog.stops().len()
    );

    // 2. Outputs
    let outputs = if no_midi {
        log::info!("MIDI disabled; outgoing notes are logged only");
        None
    } else {
        let outputs = MidiOutputs::open(
            &config.midi.client_name,
            &config.outputs,
            config.midi.queue_capacity,
        )
        .context("Failed to open MIDI outputs")?;
        Some(Arc::new(outputs))
    };
    let sink: Arc<dyn NoteSink> = match &outputs {
        Some(outputs) => outputs.clone(),
        None => Arc::new(LogSink),
    };

    // 3. Engine
    let organ = Organ::new(catalog, sink, &config.routing);
    let running = Arc::new(AtomicBool::new(true));
    let actions = Actions::with_running_flag(organ.clone(), running);

    let shutdown = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(SIGINT, Arc::clone(&shutdown))
        .context("Failed to install SIGINT handler")?;
    signal_hook::flag::register(SIGTERM, Arc::clone(&shutdown))
        .context("Failed to install SIGTERM handler")?;

    // 4. Input worker
    let mut input = None;
    let worker = match (&config.midi.input_port, no_midi) {
        (Some(port), false) => {
            let (mut manager, messages) = MidiInputManager::new(&config.midi.client_name);
            manager
                .open_by_name(port)
                .with_context(|| format!("Failed to open MIDI input '{}'", port))?;
            let worker = InputWorker::spawn(organ.clone(), input_map, messages, shutdown.clone())
                .context("Failed to start input worker")?;
            input = Some(manager);
            Some(worker)
        }
        _ => {
            log::info!("No MIDI input; use the shell or HTTP API to play");
            None
        }
    };

    // 5. HTTP API
    if config.http.enabled {
        let actions = actions.clone();
        let host = config.http.host.clone();
        let port = config.http.port;
        thread::Builder::new()
            .name("organum-http".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_multi_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        log::error!("Failed to create HTTP runtime: {}", e);
                        return;
                    }
                };
                if let Err(e) = runtime.block_on(organum_http::start_server(actions, &host, port)) {
                    log::error!("HTTP server error: {}", e);
                }
            })
            .context("Failed to start HTTP server thread")?;
    }

    // 6. Shell until quit or signal
    shell::run(&actions, &shutdown);

    // 7. Shutdown: stop every event source, then silence, then drain outputs
    log::info!("Shutting down...");
    shutdown.store(true, Ordering::SeqCst);
    actions.set_running(false);
    if let Some(mut manager) = input {
        manager.close_all();
    }
    if let Some(worker) = worker {
        worker.stop();
    }
    // Closes the organ, so a request that slipped past the facade routes nothing.
    organ.shutdown();
    if let Some(outputs) = outputs {
        outputs.shutdown();
    }
    log::info!("Goodbye");
    Ok(())
}
