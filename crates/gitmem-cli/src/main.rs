use std::io::{stdin, stdout};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use gitmem_engine::{model_check, run_threads, write_graph, GlobalContext};
use tracing_subscriber::EnvFilter;

/// gitmem: an interpreter and bounded model checker for a toy concurrent
/// language with version-controlled memory.
#[derive(Parser)]
#[command(name = "gitmem", version, about)]
struct Cli {
    /// Path to the input program.
    input: PathBuf,

    /// Path for the execution graph. Defaults to the input stem with a
    /// `.dot` extension; `.md`/`.mmd` select Mermaid output.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Enable diagnostic tracing of every engine step.
    #[arg(short, long)]
    verbose: bool,

    /// Step threads interactively instead of running to completion.
    #[arg(short, long, conflicts_with = "explore")]
    interactive: bool,

    /// Exhaustively explore schedules and report distinct terminal states.
    #[arg(short, long)]
    explore: bool,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("gitmem_engine=debug,gitmem_core=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if !cli.input.exists() {
        eprintln!("Input file does not exist: {}", cli.input.display());
        return Ok(ExitCode::FAILURE);
    }
    let source = std::fs::read_to_string(&cli.input)
        .with_context(|| format!("failed to read {}", cli.input.display()))?;

    let block = match gitmem_core::compile(&source) {
        Ok(block) => block,
        Err(diagnostics) => {
            let path = cli.input.display().to_string();
            for diagnostic in &diagnostics {
                diagnostic.eprint(&path, &source);
            }
            return Ok(ExitCode::FAILURE);
        }
    };

    let output = cli
        .output
        .unwrap_or_else(|| cli.input.with_extension("dot"));

    let code = if cli.interactive {
        gitmem_engine::interpret_interactive(
            &block,
            &output,
            &mut stdin().lock(),
            &mut stdout(),
        )?
    } else if cli.explore {
        model_check(&block, &output, &mut stdout())?
    } else {
        let mut gctx = GlobalContext::new(block);
        let code = run_threads(&mut gctx);
        write_graph(&gctx.graph, &output)
            .with_context(|| format!("failed to write {}", output.display()))?;
        code
    };

    Ok(if code == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
