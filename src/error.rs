use thiserror::Error;

#[derive(Error, Debug)]
pub enum TraincueError {
    #[error("invalid segment: {0}")]
    InvalidSegment(String),

    #[error("unknown audio format '{0}'. Use 'wav', 'm4a' or 'mp3'")]
    UnknownFormat(String),

    #[error("cyclic dependency: {parent} to {child}")]
    CyclicDependency { parent: String, child: String },

    #[error("node {0} is orphaned")]
    OrphanedNode(String),

    #[error("err: {program} {args}\n{detail}")]
    ToolFailure {
        program: String,
        args: String,
        detail: String,
    },

    #[error("no parseable float in output of {program}:\n{output}")]
    ToolOutputUnparsable { program: String, output: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, TraincueError>;
