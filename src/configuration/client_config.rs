use clap::Parser;
use log::warn;
use std::env;
use std::path::PathBuf;

/// Environment variable naming the directory holding the client's files.
pub const HOME_ENV: &str = "VOXLINK_HOME";

/// Command-line arguments of the client binary.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "voxlink-client")]
#[command(version)]
#[command(about = "Interactive client for the voxlink toy server")]
pub struct ClientArgs {
    /// JSON file holding the known servers
    #[arg(long)]
    pub servers_file: Option<PathBuf>,

    /// JSON file holding the event cache
    #[arg(long)]
    pub cache_file: Option<PathBuf>,

    /// Directory holding one JSON file per user profile
    #[arg(long)]
    pub users_dir: Option<PathBuf>,

    /// Server to select at start-up
    #[arg(long)]
    pub server: Option<String>,
}

/// Where the client keeps its files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientPaths {
    pub servers_file: PathBuf,
    pub cache_file: PathBuf,
    pub users_dir: PathBuf,
}

impl ClientPaths {
    /// Every file under `base`.
    pub fn under(base: PathBuf) -> Self {
        Self {
            servers_file: base.join("servers_config.json"),
            cache_file: base.join("shared").join("event_cache.json"),
            users_dir: base.join("users"),
        }
    }

    /// Explicit arguments win; the rest lives under `$VOXLINK_HOME`, or the current directory.
    pub fn resolve(args: &ClientArgs) -> Self {
        let base = match env::var_os(HOME_ENV) {
            Some(home) if !home.is_empty() => PathBuf::from(home),
            _ => env::current_dir().unwrap_or_else(|e| {
                warn!("Unable to read the current directory ({}), using '.'", e);
                PathBuf::from(".")
            }),
        };
        let defaults = Self::under(base);

        Self {
            servers_file: args.servers_file.clone().unwrap_or(defaults.servers_file),
            cache_file: args.cache_file.clone().unwrap_or(defaults.cache_file),
            users_dir: args.users_dir.clone().unwrap_or(defaults.users_dir),
        }
    }
}
