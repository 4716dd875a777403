use clap::{Parser, Subcommand};
use picslim::config::{self, ProcessingConfig, SettingsStore};
use picslim::events::LifecycleEvent;
use picslim::types::OversizePolicy;
use picslim::{engine, output, process};
use std::path::PathBuf;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "picslim")]
#[command(about = "Batch image compression for JPEG, PNG and GIF")]
#[command(long_about = "\
Batch image compression for JPEG, PNG and GIF

Files are identified by content, re-encoded at the chosen quality, and
written to one output directory. Existing files there are never replaced;
name clashes get numbered suffixes (photo.png, photo-1.png, ...).

Quality (0-100) by format:
  JPEG  mozjpeg quality, progressive, metadata stripped
  PNG   100 = lossless; lower values reduce the palette
  GIF   lower values dither less and merge similar pixels more

Settings are read from <config dir>/picslim/settings.toml.
Run 'picslim gen-config' to print a documented settings file.

Set RUST_LOG=debug for per-file diagnostics on stderr.")]
#[command(version)]
struct Cli {
    /// Settings file to use instead of the default location
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Print events and results as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args)]
struct CompressArgs {
    /// Files or directories to compress
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Quality 0-100 (overrides settings)
    #[arg(short, long)]
    quality: Option<u32>,

    /// Output directory (overrides settings)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Number of parallel workers (capped at the CPU count)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Write the original bytes when re-encoding would make a file larger
    #[arg(long)]
    keep_original_if_larger: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Describe images without compressing them
    Load {
        /// Files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Compress images into the output directory
    Compress(CompressArgs),
    /// Print an 800px preview of an image as a data URI
    Preview { path: PathBuf },
    /// Print the default output directory
    DefaultOutputDir,
    /// Open a folder in the system file browser
    Open { path: PathBuf },
    /// Show or change stored settings
    #[command(subcommand)]
    Settings(SettingsCommand),
    /// Print a stock settings.toml with all options documented
    GenConfig,
}

#[derive(Subcommand)]
enum SettingsCommand {
    /// Print the effective settings
    Show,
    /// Store a new default quality (0-100)
    SetQuality { quality: u32 },
    /// Store a new default output directory
    SetOutputDir { dir: PathBuf },
    /// Restore the stock defaults
    Reset,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    let cli = Cli::parse();
    let store = match cli.settings {
        Some(path) => SettingsStore::new(path),
        None => SettingsStore::new(
            SettingsStore::default_location().ok_or("no config directory on this platform")?,
        ),
    };

    match cli.command {
        Command::Load { paths } => {
            let images = engine::load_images(&paths);
            if cli.json {
                for image in &images {
                    println!("{}", serde_json::to_string(image)?);
                }
            } else {
                output::print_load_output(&images);
            }
        }
        Command::Compress(args) => compress(&store, args, cli.json)?,
        Command::Preview { path } => {
            println!("{}", engine::get_image_preview(&path)?);
        }
        Command::DefaultOutputDir => {
            println!("{}", engine::get_default_output_dir().display());
        }
        Command::Open { path } => {
            engine::open_output_folder(&path)?;
        }
        Command::Settings(command) => {
            let settings = match command {
                SettingsCommand::Show => store.load(),
                SettingsCommand::SetQuality { quality } => {
                    store.update(|s| s.quality = quality)?
                }
                SettingsCommand::SetOutputDir { dir } => {
                    store.update(|s| s.output_dir = Some(dir))?
                }
                SettingsCommand::Reset => store.reset()?,
            };
            print!("{}", config::render_settings(&settings)?);
            println!("# output directory: {}", settings.resolved_output_dir().display());
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Log to stderr so stdout carries only results. `RUST_LOG` overrides the
/// default `warn` level.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn compress(
    store: &SettingsStore,
    args: CompressArgs,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let settings = store.load();
    let mut batch = settings.compression_settings();
    if let Some(quality) = args.quality {
        batch.quality = quality;
    }
    if let Some(dir) = args.output {
        batch.output_dir = dir;
    }
    if args.keep_original_if_larger {
        batch.oversize_policy = OversizePolicy::KeepOriginal;
    }
    let processing = ProcessingConfig {
        max_workers: args.jobs.or(settings.processing.max_workers),
    };

    let images = engine::load_images(&args.paths);
    let runner = process::Runner::from_config(&processing)?;

    let labels = output::label_map(&images);
    let (tx, rx) = std::sync::mpsc::channel::<LifecycleEvent>();
    let printer = std::thread::spawn(move || {
        for event in rx {
            if json {
                match output::format_event_json(&event) {
                    Ok(line) => println!("{}", line),
                    Err(e) => warn!(error = %e, "cannot serialize event"),
                }
            } else {
                let label = labels.get(&event.id).map(String::as_str);
                for line in output::format_event(&event, label) {
                    println!("{}", line);
                }
            }
        }
    });
    let outcome = runner.run(&images, &batch, &tx);
    drop(tx);
    printer.join().map_err(|_| "progress printer panicked")?;
    let results = outcome?;

    if json {
        for result in &results {
            println!("{}", serde_json::to_string(result)?);
        }
    } else {
        println!();
        output::print_batch_summary(&results);
        println!("Output: {}", batch.output_dir.display());
    }
    Ok(())
}
