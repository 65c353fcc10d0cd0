mod classifier;
mod config;
mod error;
mod output;
mod registers;
mod runner;
mod session;
mod tui;
mod validator;

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use error::Error;
use runner::Toolchain;
use session::{Session, Status};

#[derive(Parser, Debug)]
#[command(
    name = "z16ide",
    version,
    about = "Editor shell for Z16 assembly",
    long_about = "Edit Z16 assembly, run it through the external assembler and simulator, \
                  and watch the final register state.\n\nExamples:\n  \
                  z16ide edit prog.s\n  z16ide check prog.s\n  z16ide run prog.s\n  z16ide run --binary prog.bin"
)]
struct Cli {
    /// Assembler executable, invoked as `<assembler> <source> -o <binary>`.
    #[arg(long, global = true, env = "Z16_ASSEMBLER", default_value = config::DEFAULT_ASSEMBLER)]
    assembler: PathBuf,

    /// Simulator executable, invoked as `<simulator> <binary>`.
    #[arg(long, global = true, env = "Z16_SIMULATOR", default_value = config::DEFAULT_SIMULATOR)]
    simulator: PathBuf,

    /// Write tracing output to this file (filtered by RUST_LOG).
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Open the editor (default).
    Edit {
        /// Assembly source to open.
        file: Option<PathBuf>,

        /// Simulate this binary on startup instead of assembling.
        #[arg(long)]
        binary: Option<PathBuf>,
    },

    /// Check a source file for unknown mnemonics and directives.
    Check { file: PathBuf },

    /// Assemble and simulate without the editor, printing all output.
    Run {
        file: Option<PathBuf>,

        /// Simulate this binary directly, skipping the assembler.
        #[arg(long, conflicts_with = "file")]
        binary: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Edit {
        file: None,
        binary: None,
    });
    let interactive = matches!(command, Commands::Edit { .. });

    if let Err(e) = init_tracing(cli.log_file.as_deref(), interactive) {
        eprintln!("could not open log file: {e}");
        return ExitCode::FAILURE;
    }

    let toolchain = Toolchain {
        assembler: cli.assembler,
        simulator: cli.simulator,
    };

    let result = match command {
        Commands::Edit { file, binary } => cmd_edit(toolchain, file, binary),
        Commands::Check { file } => cmd_check(&file),
        Commands::Run { file, binary } => cmd_run(toolchain, file, binary),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

/// Logs to the given file, or to stderr when not drawing the editor.
fn init_tracing(log_file: Option<&Path>, interactive: bool) -> std::io::Result<()> {
    let builder = tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env());
    match log_file {
        Some(path) => {
            let file = File::create(path)?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None if !interactive => builder.with_writer(std::io::stderr).init(),
        None => {}
    }
    Ok(())
}

fn read_source(path: &Path) -> Result<String, Error> {
    std::fs::read_to_string(path).map_err(|source| Error::ReadSource {
        path: path.to_path_buf(),
        source,
    })
}

fn cmd_edit(toolchain: Toolchain, file: Option<PathBuf>, binary: Option<PathBuf>) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let source = match &file {
        Some(path) => read_source(path)?,
        None => String::new(),
    };
    let session = Session::new(toolchain)?;
    tui::run(tui::App::new(session, &source, binary))?;
    Ok(ExitCode::SUCCESS)
}

fn cmd_check(file: &Path) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let source = read_source(file)?;
    let diagnostics = validator::validate(&source);
    if diagnostics.is_empty() {
        println!("{}: no syntax errors", file.display());
        return Ok(ExitCode::SUCCESS);
    }
    println!("Syntax Errors Found:");
    for diagnostic in &diagnostics {
        println!("{diagnostic}");
    }
    Ok(ExitCode::FAILURE)
}

fn cmd_run(toolchain: Toolchain, file: Option<PathBuf>, binary: Option<PathBuf>) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let mut session = Session::new(toolchain)?;
    match (file, binary) {
        (_, Some(binary)) => session.load_binary(&binary),
        (Some(file), None) => {
            let source = read_source(&file)?;
            if let Err(diagnostics) = session.run_source(&source) {
                println!("Syntax Errors Found:");
                for diagnostic in &diagnostics {
                    println!("{diagnostic}");
                }
                return Ok(ExitCode::FAILURE);
            }
        }
        (None, None) => return Err("run needs a source file or --binary".into()),
    }

    session.wait(|line| println!("{line}"));

    println!();
    for entry in session.registers().snapshot() {
        println!("{:>3}: {}", entry.name, entry.value);
    }
    println!("{}", session.status());

    match session.status() {
        Status::Complete => Ok(ExitCode::SUCCESS),
        _ => Ok(ExitCode::FAILURE),
    }
}
