use crate::ratelimit::RateLimitSpec;
use crate::registry::SourceSelection;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_ENUMERATION_MINS: u64 = 10;

/// Everything the runner needs, as filled in by the command line.
#[derive(Debug, Clone)]
pub struct Options {
    // -- Input
    pub domains: Vec<String>,
    pub stdin: bool,

    // -- Sources
    pub sources: Vec<String>,
    pub exclude_sources: Vec<String>,
    pub all: bool,

    // -- Rate limits
    /// Global requests per second, `0` for unlimited.
    pub rate_limit: u32,
    pub rate_limits: Vec<RateLimitSpec>,

    // -- Output
    pub output_file: Option<PathBuf>,
    pub output_directory: Option<PathBuf>,
    pub json: bool,
    pub capture_sources: bool,
    pub statistics: bool,

    // -- Logs
    /// Only results reach the terminal.
    pub silent: bool,
    pub verbose: bool,
    pub no_color: bool,

    // -- Network
    pub proxy: Option<String>,
    /// Seconds to wait for a single request.
    pub timeout: u64,
    /// Minutes to wait for a whole enumeration.
    pub max_enumeration_time: u64,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            domains: Vec::new(),
            stdin: false,
            sources: Vec::new(),
            exclude_sources: Vec::new(),
            all: false,
            rate_limit: 0,
            rate_limits: default_rate_limits(),
            output_file: None,
            output_directory: None,
            json: false,
            capture_sources: false,
            statistics: false,
            silent: false,
            verbose: false,
            no_color: false,
            proxy: None,
            timeout: DEFAULT_TIMEOUT_SECS,
            max_enumeration_time: DEFAULT_MAX_ENUMERATION_MINS,
        }
    }
}

impl Options {
    pub fn selection(&self) -> SourceSelection {
        SourceSelection {
            include: self.sources.clone(),
            exclude: self.exclude_sources.clone(),
            all: self.all,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn max_enumeration_time(&self) -> Duration {
        Duration::from_secs(self.max_enumeration_time.saturating_mul(60))
    }

    /// Default log filter when `RUST_LOG` is not set.
    pub fn log_filter(&self) -> &'static str {
        if self.silent {
            "error"
        } else if self.verbose {
            "debug"
        } else {
            "info"
        }
    }
}

pub fn default_rate_limits() -> Vec<RateLimitSpec> {
    vec![RateLimitSpec::new("aad", 10, Duration::from_secs(60))]
}
