//! CLI argument parsing and runtime configuration.
//!
//! Mirrors the flag table in the spec's external-interfaces section and the
//! environment-variable overrides `original_source/src/cli/main.cpp` honors.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// `--version` reports the engine backend alongside the crate version,
/// mirroring `original_source`'s `getVersion()`/`getJSEngine()` pair.
const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (boa)");

#[derive(Parser, Debug)]
#[command(name = "mystral", version = VERSION, about = "A native runtime for JS/TS games on WebGPU")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a script (or a compiled bundle) in the runtime.
    Run {
        /// Entry script to load, relative to the current directory.
        script: PathBuf,

        #[arg(long, default_value_t = 800)]
        width: u32,

        #[arg(long, default_value_t = 600)]
        height: u32,

        #[arg(long, default_value = "Mystral Game")]
        title: String,

        /// Create the window hidden.
        #[arg(long)]
        headless: bool,

        /// Run without a window; render to an offscreen target.
        #[arg(long = "no-sdl")]
        no_sdl: bool,

        /// Reload the entry script when it changes on disk.
        #[arg(long, short = 'w')]
        watch: bool,

        /// Capture a screenshot after `--frames` frames and exit.
        #[arg(long)]
        screenshot: Option<PathBuf>,

        #[arg(long, default_value_t = 60)]
        frames: u32,

        /// Suppress non-error output.
        #[arg(long, short = 'q')]
        quiet: bool,
    },

    /// Walk the module graph from an entry point and emit a bundle.
    Compile {
        entry: PathBuf,

        /// Asset directory to include verbatim (repeatable).
        #[arg(long = "include")]
        include: Vec<PathBuf>,

        #[arg(long, default_value = "game.bundle")]
        output: PathBuf,

        /// Root directory bundle paths are computed relative to.
        #[arg(long)]
        root: Option<PathBuf>,

        /// Emit a standalone bundle file with no runtime executable prefix.
        #[arg(long = "bundle-only")]
        bundle_only: bool,

        #[arg(long, short = 'q')]
        quiet: bool,
    },
}

/// Resolved runtime configuration, independent of how it was produced
/// (CLI flags, environment variables, or programmatic construction).
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
    pub headless: bool,
    pub no_sdl: bool,
    pub watch: bool,
    pub screenshot: Option<PathBuf>,
    pub frames: u32,
    pub quiet: bool,
    pub debug: bool,
    pub show_crash_dialog: bool,
    pub bundle_override: Option<PathBuf>,
}

impl RuntimeConfig {
    /// Build a config from parsed CLI flags plus environment variable
    /// overrides, matching spec §6's env var table.
    pub fn from_run_args(
        headless: bool,
        no_sdl: bool,
        watch: bool,
        screenshot: Option<PathBuf>,
        frames: u32,
        quiet: bool,
        width: u32,
        height: u32,
        title: String,
    ) -> Self {
        let env_headless = std::env::var("HEADLESS").map(|v| v == "1").unwrap_or(false);
        let debug = std::env::var("DEBUG").map(|v| v == "1").unwrap_or(false);
        let show_crash_dialog = std::env::var("SHOW_CRASH_DIALOG")
            .map(|v| v == "1")
            .unwrap_or(false);
        let bundle_override = std::env::var("BUNDLE").ok().map(PathBuf::from);

        Self {
            width,
            height,
            title,
            headless: headless || env_headless,
            no_sdl,
            watch,
            screenshot,
            frames,
            quiet,
            debug,
            show_crash_dialog,
            bundle_override,
        }
    }

    pub fn log_filter(&self) -> &'static str {
        if self.debug {
            "debug"
        } else if self.quiet {
            "warn"
        } else {
            "info"
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            title: "Mystral Game".to_string(),
            headless: false,
            no_sdl: false,
            watch: false,
            screenshot: None,
            frames: 60,
            quiet: false,
            debug: false,
            show_crash_dialog: false,
            bundle_override: None,
        }
    }
}
