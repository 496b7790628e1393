//! Crate-wide error taxonomy.
//!
//! Every error carries the pipeline stage it originated in, so a caller draining
//! `Engine::get_stats()` or reading a log line can tell `Eval` errors (one row/column
//! skipped) apart from `ChannelClosed`/`EngineStopped` (pipeline shutting down).

use std::fmt;

/// Pipeline stage tag attached to most error variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Parse,
    Plan,
    Eval,
    Window,
    Agg,
    Sink,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Parse => "parse",
            Stage::Plan => "plan",
            Stage::Eval => "eval",
            Stage::Window => "window",
            Stage::Agg => "agg",
            Stage::Sink => "sink",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StreamSqlError {
    #[error("[{stage}] syntax error: {message}")]
    Syntax { stage: Stage, message: String },

    #[error("[{stage}] unknown identifier: {name}")]
    UnknownIdentifier { stage: Stage, name: String },

    #[error("[{stage}] unknown function: {name}")]
    UnknownFunction { stage: Stage, name: String },

    #[error("[{stage}] argument count mismatch for {name}: expected {min}..{max}, got {got}")]
    ArgCountMismatch {
        stage: Stage,
        name: String,
        min: usize,
        max: i64,
        got: usize,
    },

    #[error("[{stage}] unsupported window: {message}")]
    UnsupportedWindow { stage: Stage, message: String },

    #[error("[{stage}] evaluation error: {message}")]
    Eval { stage: Stage, message: String },

    #[error("[{stage}] type mismatch: {message}")]
    TypeMismatch { stage: Stage, message: String },

    #[error("[{stage}] arithmetic error: {message}")]
    Arithmetic { stage: Stage, message: String },

    #[error("[{stage}] function error: {message}")]
    Function { stage: Stage, message: String },

    #[error("[{stage}] aggregator error: {message}")]
    Aggregator { stage: Stage, message: String },

    #[error("channel closed")]
    ChannelClosed,

    #[error("engine stopped")]
    EngineStopped,

    #[error("duplicate registration: {0}")]
    DuplicateName(String),

    #[error("fatal: {0}")]
    Fatal(String),
}

impl StreamSqlError {
    pub fn syntax(stage: Stage, message: impl Into<String>) -> Self {
        StreamSqlError::Syntax { stage, message: message.into() }
    }

    pub fn eval(message: impl Into<String>) -> Self {
        StreamSqlError::Eval { stage: Stage::Eval, message: message.into() }
    }

    pub fn type_mismatch(message: impl Into<String>) -> Self {
        StreamSqlError::TypeMismatch { stage: Stage::Eval, message: message.into() }
    }

    pub fn arithmetic(message: impl Into<String>) -> Self {
        StreamSqlError::Arithmetic { stage: Stage::Eval, message: message.into() }
    }

    pub fn unknown_identifier(name: impl Into<String>) -> Self {
        StreamSqlError::UnknownIdentifier { stage: Stage::Eval, name: name.into() }
    }

    /// True for the "runtime soft" taxonomy (§7): caught locally, counted, never bubbled.
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            StreamSqlError::Eval { .. }
                | StreamSqlError::TypeMismatch { .. }
                | StreamSqlError::Arithmetic { .. }
                | StreamSqlError::Function { .. }
                | StreamSqlError::Aggregator { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, StreamSqlError>;
