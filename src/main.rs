//! CLI entry point: parses `run`/`compile`, initializes logging, installs
//! the crash signal handler, and dispatches to `runtime::Runtime` or
//! `compile::compile`.
//!
//! Grounded on `jhead-bevy-react`'s `js/engine.rs` logging discipline
//! (`log::error!`/`log::info!` throughout, no custom logger) and on the
//! `denoland-deno` example's `print_err_and_exit` + `std::process::exit(1)`
//! shape for fatal-error reporting (spec §7's exit-code policy).

use clap::Parser;
use mystral_runtime::compile::{compile, CompileOptions};
use mystral_runtime::config::{Cli, Command, RuntimeConfig};
use mystral_runtime::runtime::{headless_window, run_screenshot_mode, NoScreenshotSink, Runtime};
use mystral_runtime::signals;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Command::Run { script, width, height, title, headless, no_sdl, watch, screenshot, frames, quiet } => {
            let config = RuntimeConfig::from_run_args(headless, no_sdl, watch, screenshot.clone(), frames, quiet, width, height, title);
            init_logging(&config);
            signals::install(config.show_crash_dialog);

            match run(&config, &script, screenshot.as_deref(), frames) {
                Ok(()) => ExitCode::SUCCESS,
                Err(message) => {
                    log::error!("{message}");
                    ExitCode::FAILURE
                }
            }
        }
        Command::Compile { entry, include, output, root, bundle_only, quiet } => {
            let mut config = RuntimeConfig::default();
            config.quiet = quiet;
            init_logging(&config);

            let root = root.unwrap_or_else(|| entry.parent().map(std::path::Path::to_path_buf).unwrap_or_else(|| std::path::PathBuf::from(".")));
            let options = CompileOptions { entry, include, root, bundle_only };

            match compile(&options).and_then(|bytes| std::fs::write(&output, bytes).map_err(Into::into)) {
                Ok(()) => {
                    log::info!("wrote {}", output.display());
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    log::error!("compile failed: {e}");
                    ExitCode::FAILURE
                }
            }
        }
    }
}

fn run(config: &RuntimeConfig, script: &std::path::Path, screenshot: Option<&std::path::Path>, frames: u32) -> Result<(), String> {
    let mut runtime = Runtime::launch(config, script, headless_window()).map_err(|e| e.to_string())?;

    match screenshot {
        Some(output) => {
            let mut sink = NoScreenshotSink;
            run_screenshot_mode(&mut runtime, frames, output, &mut sink).map_err(|e| e.to_string())
        }
        None => {
            runtime.run(config.no_sdl);
            Ok(())
        }
    }
}

fn init_logging(config: &RuntimeConfig) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.log_filter())).init();
}
