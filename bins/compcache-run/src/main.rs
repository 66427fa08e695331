use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::ffi::OsString;
use std::fs::File;
use std::path::PathBuf;
use tracing::{debug, error};

use compcache_exec::{
    execute, execute_noreturn, find_executable, ExecConfig, ExecContext, ExecError, Redirect,
    EXEC_FAILURE_STATUS,
};

/// Run a compiler found on the search path, never resolving back to ourselves
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path (YAML)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Write the compiler's stdout here
    #[arg(long, value_name = "FILE", requires = "stderr")]
    stdout: Option<PathBuf>,

    /// Write the compiler's stderr here
    #[arg(long, value_name = "FILE", requires = "stdout")]
    stderr: Option<PathBuf>,

    /// Replace this process with the compiler instead of waiting for it
    #[arg(long, conflicts_with_all = ["stdout", "stderr"])]
    exec: bool,

    /// Compiler name or path, followed by its arguments
    #[arg(
        value_name = "COMPILER",
        trailing_var_arg = true,
        allow_hyphen_values = true,
        num_args = 1..,
        required = true
    )]
    command: Vec<OsString>,
}

impl Args {
    /// The compiler name and the arguments forwarded to it.
    fn compiler(&self) -> Result<(&str, &[OsString])> {
        let (name, args) = self
            .command
            .split_first()
            .ok_or_else(|| anyhow!("No compiler given"))?;
        let name = name
            .to_str()
            .ok_or_else(|| anyhow!("Compiler name is not valid UTF-8: {}", name.to_string_lossy()))?;
        Ok((name, args))
    }
}

/// Exit status for a launch that never produced a compiler status.
fn failure_status(err: &ExecError) -> i32 {
    if err.is_fatal() {
        EXEC_FAILURE_STATUS
    } else {
        1
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    initialize_logging(args.debug)?;

    let mut config = match &args.config {
        Some(path) => ExecConfig::load_from_file(path)?,
        None => ExecConfig::default(),
    };
    config.apply_env_overrides(|key| std::env::var_os(key));
    debug!("Configuration: {:?}", config);

    let ctx = ExecContext::new(config);

    let (name, compiler_args) = args.compiler()?;
    let self_path = std::env::current_exe().ok();
    let compiler = find_executable(&ctx, name, self_path.as_deref())
        .ok_or_else(|| anyhow!("Could not find compiler \"{}\" in PATH", name))?;

    let mut argv = Vec::with_capacity(compiler_args.len() + 1);
    argv.push(compiler.into_os_string());
    argv.extend_from_slice(compiler_args);

    if args.exec {
        execute_noreturn(&ctx.config, &argv);
    }

    let redirect = match (&args.stdout, &args.stderr) {
        (Some(out), Some(err)) => Redirect::files(
            File::create(out).with_context(|| format!("Failed to create {}", out.display()))?,
            File::create(err).with_context(|| format!("Failed to create {}", err.display()))?,
        ),
        _ => Redirect::Inherit,
    };

    match execute(&ctx, &argv, redirect) {
        Ok(outcome) => {
            debug!("Compiler finished with {}", outcome);
            std::process::exit(outcome.status_code());
        }
        Err(e) => {
            error!("Failed to run compiler: {}", e);
            std::process::exit(failure_status(&e));
        }
    }
}

fn initialize_logging(debug: bool) -> Result<()> {
    let level = if debug { "debug" } else { "warn" };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}
