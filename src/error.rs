//! Errors raised while driving the external toolchain.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::runner::Stage;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The run workspace could not be created.
    #[error("could not create run workspace: {0}")]
    Workspace(#[source] io::Error),

    /// The editor buffer could not be written to the workspace.
    #[error("error creating assembly file {}: {source}", path.display())]
    WriteSource { path: PathBuf, source: io::Error },

    /// An input file given on the command line could not be read.
    #[error("error opening {}: {source}", path.display())]
    ReadSource { path: PathBuf, source: io::Error },

    /// The assembler or simulator executable could not be started.
    #[error("error running {stage} ({}): {source}", program.display())]
    Launch {
        stage: Stage,
        program: PathBuf,
        source: io::Error,
    },

    #[error("could not create output pipe for {stage}: {source}")]
    Pipe { stage: Stage, source: io::Error },

    #[error("error reading {stage} output: {source}")]
    Read { stage: Stage, source: io::Error },

    #[error("error waiting for {stage}: {source}")]
    Wait { stage: Stage, source: io::Error },
}
