use std::env;
use std::process::ExitCode;

use dirsync_server::config::loader::{DEFAULT_CONFIG_PATH, load_config};
use dirsync_server::observability::{apply_logging_level, init_tracing};
use dirsync_server::{App, shutdown_tracing};

const USAGE: &str = "usage: dirsync-server [--config <path>] [--print-config]";

/// Exit status for configuration and startup errors.
const EXIT_CONFIG: u8 = 2;

/// Where the configuration path came from.
#[derive(Debug, Clone, Copy)]
enum ConfigSource {
    Flag,
    Env,
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Flag => write!(f, "--config"),
            Self::Env => write!(f, "DIRSYNC_CONFIG"),
            Self::Default => write!(f, "default"),
        }
    }
}

#[derive(Debug)]
struct Args {
    config_path: String,
    source: ConfigSource,
    print_config: bool,
}

impl Args {
    /// `--config` beats `DIRSYNC_CONFIG`, which beats `dirsync.toml`.
    fn parse(mut argv: impl Iterator<Item = String>) -> Result<Self, String> {
        let mut config_flag = None;
        let mut print_config = false;
        while let Some(arg) = argv.next() {
            match arg.as_str() {
                "--config" => {
                    config_flag = Some(argv.next().ok_or("--config needs a path")?);
                }
                "--print-config" => print_config = true,
                other => return Err(format!("unexpected argument `{other}`")),
            }
        }

        let (config_path, source) = match (config_flag, env::var("DIRSYNC_CONFIG")) {
            (Some(path), _) => (path, ConfigSource::Flag),
            (None, Ok(path)) if !path.is_empty() => (path, ConfigSource::Env),
            _ => (DEFAULT_CONFIG_PATH.to_string(), ConfigSource::Default),
        };
        Ok(Self {
            config_path,
            source,
            print_config,
        })
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // .env may set DIRSYNC_CONFIG and DIRSYNC__* overrides, so it goes first
    if let Err(e) = dotenvy::dotenv()
        && !e.not_found()
    {
        eprintln!("Warning: failed to load .env: {e}");
    }

    init_tracing();

    let args = match Args::parse(env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e}\n{USAGE}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let cfg = match load_config(Some(&args.config_path)) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    tracing::info!(
        path = %args.config_path,
        source = %args.source,
        storage = ?cfg.storage.backend,
        "Configuration loaded"
    );

    if args.print_config {
        return match toml::to_string_pretty(&cfg) {
            Ok(rendered) => {
                println!("{rendered}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Failed to render configuration: {e}");
                ExitCode::from(EXIT_CONFIG)
            }
        };
    }

    apply_logging_level(&cfg.logging.level);

    let app = match App::build(cfg).await {
        Ok(app) => app,
        Err(e) => {
            eprintln!("Startup failed: {e:#}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let code = match app.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "dirsync exited with an error");
            ExitCode::FAILURE
        }
    };
    shutdown_tracing();
    code
}
