//! Runtime configuration from flags and `DOCVIEW_*` environment variables.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::headless::RenderBudget;

/// Upload limit used when none is configured (20 MB).
pub const DEFAULT_MAX_UPLOAD: usize = 20 * 1024 * 1024;

#[derive(Clone, Debug, Parser)]
#[command(name = "docview", version, about = "Document viewer and same-origin proxy")]
pub struct Config {
    /// Address to listen on
    #[arg(long, env = "DOCVIEW_ADDR", default_value = "127.0.0.1:3000")]
    pub addr: SocketAddr,

    /// Chromium-compatible binary used for headless rendering
    #[arg(long, env = "DOCVIEW_CHROME", default_value = "chromium")]
    pub chrome: PathBuf,

    /// Maximum number of concurrent headless renders
    #[arg(long, env = "DOCVIEW_MAX_RENDERS", default_value_t = 4)]
    pub max_renders: usize,

    /// Seconds to wait for a browser slot and launch
    #[arg(long, env = "DOCVIEW_LAUNCH_TIMEOUT", default_value_t = 30)]
    pub launch_timeout: u64,

    /// Seconds allowed for page navigation
    #[arg(long, env = "DOCVIEW_NAVIGATION_TIMEOUT", default_value_t = 30)]
    pub navigation_timeout: u64,

    /// Seconds allowed for scripts to settle after load
    #[arg(long, env = "DOCVIEW_LOAD_TIMEOUT", default_value_t = 10)]
    pub load_timeout: u64,

    /// Seconds allowed for an upstream fetch
    #[arg(long, env = "DOCVIEW_FETCH_TIMEOUT", default_value_t = 30)]
    pub fetch_timeout: u64,

    /// Maximum upload size in bytes
    #[arg(long, env = "DOCVIEW_MAX_UPLOAD", default_value_t = DEFAULT_MAX_UPLOAD)]
    pub max_upload: usize,

    /// Origins allowed by CORS, comma separated; any origin when empty
    #[arg(long, env = "DOCVIEW_ALLOWED_ORIGINS", value_delimiter = ',')]
    pub allowed_origins: Vec<String>,

    /// Seconds an object URL not owned by a view is kept
    #[arg(long, env = "DOCVIEW_BLOB_TTL", default_value_t = 3600)]
    pub blob_ttl: u64,

    /// Seconds a view may sit idle before it is closed
    #[arg(long, env = "DOCVIEW_VIEW_TTL", default_value_t = 1800)]
    pub view_ttl: u64,

    /// Maximum number of live views; the least recently used is closed first
    #[arg(long, env = "DOCVIEW_MAX_VIEWS", default_value_t = 1024)]
    pub max_views: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            chrome: PathBuf::from("chromium"),
            max_renders: 4,
            launch_timeout: 30,
            navigation_timeout: 30,
            load_timeout: 10,
            fetch_timeout: 30,
            max_upload: DEFAULT_MAX_UPLOAD,
            allowed_origins: Vec::new(),
            blob_ttl: 3600,
            view_ttl: 1800,
            max_views: 1024,
        }
    }
}

impl Config {
    pub fn render_budget(&self) -> RenderBudget {
        RenderBudget {
            launch: Duration::from_secs(self.launch_timeout),
            navigation: Duration::from_secs(self.navigation_timeout),
            load: Duration::from_secs(self.load_timeout),
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout)
    }

    pub fn blob_ttl(&self) -> Duration {
        Duration::from_secs(self.blob_ttl)
    }

    pub fn view_ttl(&self) -> Duration {
        Duration::from_secs(self.view_ttl)
    }
}
