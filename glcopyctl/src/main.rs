use anyhow::{anyhow, Context};
use chrono::Local;
use clap::{Parser, Subcommand};
use glcopy_common::{ContentType, LaunchRequest};
use glcopy_renderer::{BlitProgram, Egl, KhronosEgl, RendererConfig, RenderingContext};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt as subscriber_fmt;
use tracing_subscriber::{prelude::*, EnvFilter, Registry};

#[derive(Parser)]
#[command(
    name = "glcopyctl",
    version,
    about = "glcopy control utility - probe and configure the decoder-to-display copy pipeline",
    long_about = r#"
glcopy Control Utility (glcopyctl)
══════════════════════════════════

Checks that this machine can run the GLES2 frame copy pipeline and validates
player launch requests and renderer configuration.

EXAMPLES:
  glcopyctl probe                                   Build the blit program on the GPU
  glcopyctl launch https://host/v.mpd -t dash       Print a launch request as JSON
  glcopyctl launch file:///a.mp4 -t 3 -c movie-1    Numeric content types work too
  glcopyctl check-config                            Validate the config file

CONFIG:
  ~/.config/glcopy/config.toml   ([renderer] section)
"#,
    after_help = "Use 'glcopyctl <command> --help' for more info on a specific command."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ~/.config/glcopy/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log verbosity 1-4 (warn..trace); also writes a log file under the config directory
    #[arg(long, global = true, value_parser = clap::value_parser!(u8).range(1..=4))]
    log: Option<u8>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a context and off-screen surface, build the blit program and print its bindings
    Probe,

    /// Validate a player launch request and print it as JSON
    Launch {
        /// Content URI
        uri: String,

        /// Content type: name (dash, ss, hls, mp4, ...) or launch code (0-9)
        #[arg(short = 't', long = "type")]
        content_type: ContentType,

        /// Content identifier passed along with the request
        #[arg(short, long)]
        content_id: Option<String>,
    },

    /// Validate configuration file
    #[command(name = "check-config", visible_alias = "cc")]
    CheckConfig,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    renderer: RendererConfig,
}

struct CustomTimer;

impl tracing_subscriber::fmt::time::FormatTime for CustomTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%d %H:%M:%S%.3f"))
    }
}

type LogGuards = (
    Option<tracing_appender::non_blocking::WorkerGuard>,
    Option<tracing_appender::non_blocking::WorkerGuard>,
);

fn init_logging(log_level: Option<u8>) -> anyhow::Result<LogGuards> {
    let filter = match log_level {
        Some(1) => LevelFilter::WARN,
        Some(3) => LevelFilter::DEBUG,
        Some(4) => LevelFilter::TRACE,
        _ => LevelFilter::INFO,
    };
    let env_filter = EnvFilter::builder()
        .with_default_directive(filter.into())
        .from_env_lossy();

    let Some(level) = log_level else {
        let stdout_layer = subscriber_fmt::layer()
            .with_writer(std::io::stderr)
            .with_timer(CustomTimer);
        Registry::default().with(env_filter).with(stdout_layer).init();
        return Ok((None, None));
    };

    let log_dir = dirs::config_dir()
        .context("Could not find config directory")?
        .join("glcopy")
        .join("logs");
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory: {:?}", log_dir))?;

    let timestamp = Local::now().format("%Y-%m-%d_%H-%M-%S");
    let log_path = log_dir.join(format!("glcopyctl-{}.log", timestamp));
    let file = std::fs::File::create(&log_path)
        .with_context(|| format!("Failed to create log file: {:?}", log_path))?;
    eprintln!("Logging to file: {}", log_path.display());
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file);
    let (non_blocking_stderr, stderr_guard) = tracing_appender::non_blocking(std::io::stderr());

    let file_layer = subscriber_fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .with_timer(CustomTimer);
    let stderr_layer = subscriber_fmt::layer()
        .with_writer(non_blocking_stderr)
        .with_timer(CustomTimer);

    Registry::default()
        .with(env_filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();
    info!("glcopyctl starting (Level {}, File: {})", level, log_path.display());
    Ok((Some(file_guard), Some(stderr_guard)))
}

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|p| p.join("glcopy").join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("config.toml"))
}

fn read_config(path: &Path) -> anyhow::Result<RendererConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;
    let file: ConfigFile =
        toml::from_str(&content).with_context(|| "Failed to parse config TOML")?;
    file.renderer
        .validate()
        .with_context(|| format!("Invalid [renderer] section in {:?}", path))?;
    Ok(file.renderer)
}

/// Loads the renderer config, falling back to defaults when the file is missing or broken.
fn load_config(path: &Path) -> RendererConfig {
    if !path.exists() {
        debug!("No config file at {:?}, using defaults", path);
        return RendererConfig::default();
    }
    match read_config(path) {
        Ok(config) => config,
        Err(e) => {
            warn!("Failed to load configuration: {:#}. Using defaults.", e);
            RendererConfig::default()
        }
    }
}

fn probe(config: &RendererConfig) -> anyhow::Result<()> {
    let egl = KhronosEgl::load().context("Failed to load libEGL")?;
    let context =
        RenderingContext::create(&egl, config).context("Failed to create rendering context")?;
    let result = probe_program(&egl, &context, config);
    context
        .destroy(&egl)
        .context("Failed to destroy rendering context")?;
    result
}

fn probe_program(
    egl: &KhronosEgl,
    context: &RenderingContext<KhronosEgl>,
    config: &RendererConfig,
) -> anyhow::Result<()> {
    egl.make_current(context.display, Some(context.surface), Some(context.context))
        .map_err(|code| anyhow!("eglMakeCurrent on pbuffer failed: 0x{:x}", code))?;
    // The context created above is current on this thread.
    let gl = unsafe { egl.load_gl() };
    context.focus_offscreen(egl, &gl, config)?;

    let mut program = BlitProgram::new(&gl, config).context("Failed to build blit program")?;
    println!("✓ Blit program {} linked", program.program());
    for attribute in [program.position(), program.texcoord()] {
        println!(
            "  attribute {:<14} location {} ({} floats per vertex)",
            attribute.name,
            attribute.location,
            attribute.size()
        );
    }
    let sampler = program.sampler();
    println!(
        "  uniform   {:<14} location {} ({:?}, unit {})",
        sampler.name,
        sampler.location,
        sampler.kind(),
        config.sampler_unit
    );
    program.delete(&gl);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guards = init_logging(cli.log)?;
    let config_path = cli.config.unwrap_or_else(default_config_path);

    match cli.command {
        Commands::Probe => {
            let config = load_config(&config_path);
            probe(&config)
        }
        Commands::Launch {
            uri,
            content_type,
            content_id,
        } => {
            if uri.trim().is_empty() {
                return Err(anyhow!("Launch URI is empty"));
            }
            let mut request = LaunchRequest::new(uri, content_type);
            if let Some(id) = content_id {
                request = request.with_content_id(id);
            }
            if content_type.is_adaptive() {
                debug!("{} content needs an adaptive renderer builder", content_type);
            }
            println!("{}", request.to_json()?);
            Ok(())
        }
        Commands::CheckConfig => {
            if !config_path.exists() {
                println!("✓ No config file found at {:?} (using defaults)", config_path);
                return Ok(());
            }
            match read_config(&config_path) {
                Ok(config) => {
                    println!("✓ Configuration valid: {:?}", config_path);
                    println!(
                        "  GLES {}, pbuffer {}x{}, sampler unit {}, flip {}",
                        config.gles_version,
                        config.pbuffer_width,
                        config.pbuffer_height,
                        config.sampler_unit,
                        config.flip_vertical
                    );
                    Ok(())
                }
                Err(e) => {
                    eprintln!("✗ Configuration error: {:#}", e);
                    std::process::exit(1);
                }
            }
        }
    }
}
