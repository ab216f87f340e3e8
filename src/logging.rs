//! Diagnostics setup. Logs always go to stderr: stdout carries the
//! JSON-lines report.

use anyhow::{anyhow, Result};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Targets the `-v`/`-q` flags apply to. Dependencies stay at their defaults.
const CRATE_TARGETS: &[&str] = &["pkgaudit", "pkgaudit_core"];

/// One step per repeated `-v`, starting from the default.
const VERBOSITY_LADDER: [LevelFilter; 4] = [
    LevelFilter::WARN,
    LevelFilter::INFO,
    LevelFilter::DEBUG,
    LevelFilter::TRACE,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Verbosity(LevelFilter);

impl Verbosity {
    pub const QUIET: Self = Self(LevelFilter::ERROR);

    pub fn from_flags(verbose: u8, quiet: bool) -> Self {
        if quiet {
            return Self::QUIET;
        }
        let step = usize::from(verbose).min(VERBOSITY_LADDER.len() - 1);
        Self(VERBOSITY_LADDER[step])
    }

    pub fn level(self) -> LevelFilter {
        self.0
    }

    fn directives(self) -> String {
        CRATE_TARGETS
            .iter()
            .map(|target| format!("{target}={}", self.0))
            .collect::<Vec<_>>()
            .join(",")
    }

    fn env_filter(self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.directives()))
    }
}

/// Installs the global subscriber. `RUST_LOG` wins over the flags.
pub fn init(verbosity: Verbosity) -> Result<()> {
    let detailed = verbosity.level() >= LevelFilter::DEBUG;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(verbosity.env_filter())
        .with_writer(std::io::stderr)
        .with_target(detailed)
        .with_file(detailed)
        .with_line_number(detailed)
        .compact();

    let installed = if verbosity.level() <= LevelFilter::WARN {
        builder.without_time().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| anyhow!("failed to install log subscriber: {e}"))
}
