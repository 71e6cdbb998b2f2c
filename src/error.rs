use std::any::Any;
use std::fmt;
use thiserror::Error;
use tokio::task::JoinError;

/// Pipeline stage a spawned task belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// A task forwarding one attached input source.
    Feeder,
    /// A mapper pool worker.
    Mapper,
    /// The task that joins the feeders and closes the input channel.
    InputSupervisor,
    /// The task that joins the mapper pool and closes the output channel.
    OutputCloser,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Feeder => "feeder",
            Stage::Mapper => "mapper",
            Stage::InputSupervisor => "input supervisor",
            Stage::OutputCloser => "output closer",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Map stage already started on this pipeline")]
    MapAlreadyStarted,

    #[error("Map stage has not been started")]
    MapNotStarted,

    #[error("Input is closed: feeders must be attached before the map stage starts")]
    InputClosed,

    #[error("{stage} task {index} panicked: {message}")]
    TaskPanicked {
        stage: Stage,
        index: usize,
        message: String,
    },

    #[error("{stage} task {index} was cancelled")]
    TaskCancelled { stage: Stage, index: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl PipelineError {
    /// Convert a failed join of a stage task into a typed error.
    pub(crate) fn from_join(stage: Stage, index: usize, err: JoinError) -> Self {
        if err.is_panic() {
            let payload = err.into_panic();
            PipelineError::TaskPanicked {
                stage,
                index,
                message: panic_message(payload.as_ref()).to_string(),
            }
        } else {
            PipelineError::TaskCancelled { stage, index }
        }
    }

    /// Whether this error reports a call made out of order on the controller.
    pub fn is_sequencing(&self) -> bool {
        matches!(
            self,
            PipelineError::MapAlreadyStarted
                | PipelineError::MapNotStarted
                | PipelineError::InputClosed
        )
    }
}

/// Recover the message from a panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        return msg;
    }
    if let Some(msg) = payload.downcast_ref::<String>() {
        return msg.as_str();
    }
    "<unrecoverable panic message>"
}

pub type Result<T> = std::result::Result<T, PipelineError>;
