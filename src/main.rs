use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use color_eyre::eyre::WrapErr;

mod container;
mod engine;
mod manager;
mod probe;

use engine::docker::DockerEngine;
use probe::RetryPolicy;

fn setup_logger() {
    tracing_subscriber::FmtSubscriber::builder()
        .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE)
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_file(true)
        .with_line_number(true)
        .init();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Create, start, stop and remove once
    Smoke,
    /// Keep the debugger running until Ctrl-C
    Serve,
}

/// Runs the Cython debugger server in a docker container bound to a project directory
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[arg(value_enum, default_value_t = Mode::Smoke)]
    mode: Mode,

    /// Project directory mounted at /project_folder, defaults to the current directory
    #[arg(env = "DEBUGGER_HOST_DIR")]
    host_dir: Option<PathBuf>,
}

impl Cli {
    /// Resolves the host directory against `current_dir`, which is only consulted when needed.
    fn host_working_directory(
        &self,
        current_dir: impl FnOnce() -> std::io::Result<PathBuf>,
    ) -> color_eyre::Result<PathBuf> {
        match self.host_dir.as_deref() {
            Some(dir) if dir.is_absolute() => Ok(dir.to_path_buf()),
            Some(dir) => Ok(current_dir()
                .wrap_err("failed to resolve the current directory")?
                .join(dir)),
            None => current_dir().wrap_err("failed to resolve the current directory"),
        }
    }
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    setup_logger();

    let cli = Cli::parse();
    let host_working_directory = cli.host_working_directory(std::env::current_dir)?;
    tracing::info!(
        mode = ?cli.mode,
        dir = %host_working_directory.display(),
        "starting debugger container manager"
    );

    let engine = Arc::new(DockerEngine::connect().wrap_err("failed to connect to the docker daemon")?);

    match cli.mode {
        Mode::Smoke => manager::run(engine, host_working_directory)
            .await
            .wrap_err("container lifecycle failed")?,
        Mode::Serve => manager::serve(
            engine,
            host_working_directory,
            container::published_addr(),
            &RetryPolicy::default(),
            tokio::signal::ctrl_c(),
        )
        .await
        .wrap_err("debugger container failed")?,
    }

    Ok(())
}
