use clap::{Parser, Subcommand};
use simple_pano::config::{self, PanoConfig};
use simple_pano::context::{BuildContext, BuildEvent};
use simple_pano::pipeline::{BatchSummary, BuildOptions, Publisher};
use simple_pano::protect::{self, DEFAULT_VIEWER_NAME};
use simple_pano::tool::ProcessRunner;
use simple_pano::{mirror, output};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::thread::JoinHandle;

#[derive(Parser)]
#[command(name = "simple-pano")]
#[command(about = "Publish interactive krpano panorama viewers")]
#[command(long_about = "\
Publish interactive krpano panorama viewers

Each panorama is described by a small YAML file:

  pname: harbour                 # names every output file
  input: 2024/harbour.tif        # literal path, or under [directories] panoramas
  panotype: cylinder
  hfov: 360
  vfov: 60                       # optional
  hlookat: 30                    # optional <view> overrides: hlookat, vlookat, fov
  preview: 2024/harbour_small.jpg
  twittercard: 2024/harbour_tc.jpg
  hotspots:
    - { ath: 10, atv: -5, description: Lighthouse }

Output bundle (in --output):

  harbour.xml             scene document
  harbour.tiles/          tiles, preview.jpg, thumb.jpg, mobile_*.jpg
  harbour_small.jpg       preview copy
  harbour_tc.jpg          twitter-card copy
  harbour_hotspots.xml    hotspot fragment (only with hotspots)
  harbour.html            page (only with --html)
  plugins/                staged plugin fragments

The scene is regenerated only when the input image or the descriptor is
newer than harbour.xml.

Run 'simple-pano gen-config' to generate a documented ~/.simple-pano.toml.")]
#[command(version)]
struct Cli {
    /// Config file, layered over ~/.simple-pano.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output directory
    #[arg(short, long, default_value = "panoramas", global = true)]
    output: PathBuf,

    /// Show tool commands, tool output and staged assets
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build viewer bundles for the given descriptors
    Build {
        /// Add debug tooling (view trace, helper tool, plugin toolbox)
        #[arg(short, long)]
        debug: bool,
        /// Write <pname>.html embedding the viewer
        #[arg(short = 'H', long)]
        html: bool,
        /// Ask makepano for its own HTML page instead
        #[arg(long)]
        tool_html: bool,
        /// Print the build report as JSON
        #[arg(long)]
        json: bool,
        #[arg(required = true)]
        descriptors: Vec<PathBuf>,
    },
    /// Regenerate hotspot fragments only
    Hotspots {
        #[arg(required = true)]
        descriptors: Vec<PathBuf>,
    },
    /// Validate descriptors without building
    Check {
        #[arg(required = true)]
        descriptors: Vec<PathBuf>,
    },
    /// Write a viewer script locked to the given domains
    Protect {
        /// Allowed domain; repeat for several
        #[arg(short = 'D', long = "domain", required = true)]
        domains: Vec<String>,
        /// File name of the viewer script inside the output directory
        #[arg(long, default_value = DEFAULT_VIEWER_NAME)]
        js_name: String,
    },
    /// Copy new and changed files from SOURCE into DEST
    Mirror {
        source: PathBuf,
        dest: PathBuf,
        /// Leave out files with this extension (adds to [mirror] exclude_extensions)
        #[arg(long = "exclude-ext")]
        exclude_ext: Vec<String>,
    },
    /// Print a stock config file with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let verbose = cli.verbose;

    match cli.command {
        Command::Build {
            debug,
            html,
            tool_html,
            json,
            descriptors,
        } => {
            let cfg = setup(cli.config.as_deref())?;
            let publisher = publisher(&cfg, &cli.output);
            let options = BuildOptions {
                debug,
                html,
                tool_html,
            };
            if json {
                // Progress lines would corrupt the JSON on stdout.
                let ctx = BuildContext::new().with_tool_timeout(cfg.tool_timeout());
                let summary = publisher.build_all(&descriptors, options, &ctx);
                println!("{}", serde_json::to_string_pretty(&summary)?);
                exit_on_failure(&summary);
                return Ok(());
            }
            let summary = with_printer(&cfg, verbose, |ctx| {
                publisher.build_all(&descriptors, options, ctx)
            });
            output::print_summary(&summary);
            exit_on_failure(&summary);
        }
        Command::Hotspots { descriptors } => {
            let cfg = setup(cli.config.as_deref())?;
            let publisher = publisher(&cfg, &cli.output);
            let summary = with_printer(&cfg, verbose, |ctx| {
                publisher.hotspots_all(&descriptors, ctx)
            });
            output::print_summary(&summary);
            exit_on_failure(&summary);
        }
        Command::Check { descriptors } => {
            let cfg = setup(cli.config.as_deref())?;
            let publisher = publisher(&cfg, &cli.output);
            let summary = with_printer(&cfg, verbose, |ctx| {
                publisher.check_all(&descriptors, ctx)
            });
            output::print_summary(&summary);
            exit_on_failure(&summary);
        }
        Command::Protect { domains, js_name } => {
            let cfg = setup(cli.config.as_deref())?;
            let runner = ProcessRunner::new(&cfg.krpano.tools);
            let viewer = cli.output.join(js_name);
            with_printer(&cfg, verbose, |ctx| {
                protect::protect(&runner, &viewer, &domains, ctx)
            })?;
        }
        Command::Mirror {
            source,
            dest,
            exclude_ext,
        } => {
            let cfg = setup(cli.config.as_deref())?;
            let mut excluded = cfg.mirror.exclude_extensions.clone();
            excluded.extend(exclude_ext);
            let summary = with_printer(&cfg, verbose, |ctx| {
                mirror::mirror_tree(&source, &dest, cfg.staleness.mirror, &excluded, ctx)
            })?;
            println!("{}", output::format_mirror_summary(&source, &dest, &summary));
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Load the config and size the thread pool from it.
fn setup(explicit: Option<&Path>) -> Result<PanoConfig, config::ConfigError> {
    let cfg = config::load_config(explicit)?;
    init_thread_pool(&cfg.processing);
    Ok(cfg)
}

fn publisher(cfg: &PanoConfig, outdir: &Path) -> Publisher<ProcessRunner> {
    Publisher::new(
        ProcessRunner::new(&cfg.krpano.tools),
        cfg.tiling_settings(),
        &cfg.directories.panoramas,
        outdir,
    )
}

/// Run `f` with a context whose events are printed by a background thread.
fn with_printer<T>(cfg: &PanoConfig, verbose: bool, f: impl FnOnce(&BuildContext) -> T) -> T {
    let (tx, printer) = spawn_printer(verbose);
    let ctx = BuildContext::new()
        .with_events(tx)
        .with_tool_timeout(cfg.tool_timeout());
    let result = f(&ctx);
    drop(ctx);
    printer.join().ok();
    result
}

fn spawn_printer(verbose: bool) -> (Sender<BuildEvent>, JoinHandle<()>) {
    let (tx, rx) = std::sync::mpsc::channel();
    let printer = std::thread::spawn(move || {
        for event in rx {
            for line in output::format_build_event(&event, verbose) {
                println!("{}", line);
            }
        }
    });
    (tx, printer)
}

fn exit_on_failure(summary: &BatchSummary) {
    if !summary.is_success() {
        std::process::exit(1);
    }
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores; the config can only lower it.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
