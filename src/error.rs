use thiserror::Error;

use crate::graph::NodeId;

/// Contract violations raised by the query engine.
///
/// None of these are expected during normal operation: ids are validated when
/// the graph is loaded, so an error here points at a caller bug.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("extract-min on an empty queue")]
    EmptyQueue,

    #[error("node id {id} out of range (graph has {count} nodes)")]
    UnknownId { id: NodeId, count: usize },

    #[error("node {id} given twice")]
    DuplicateNode { id: NodeId },

    #[error("node {id} declared but never given")]
    MissingNode { id: NodeId },

    #[error("node {id} is already queued")]
    AlreadyQueued { id: NodeId },

    #[error("node {id} is not queued")]
    NotQueued { id: NodeId },

    #[error("decrease-key on node {id} would raise its key from {current} to {requested}")]
    KeyIncreased {
        id: NodeId,
        current: u64,
        requested: u64,
    },

    #[error("engine still holds results for source {origin}; call reset() first")]
    StaleState { origin: NodeId },
}

/// Errors raised while reading a graph description.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("bad header (line {line}): {reason}")]
    BadHeader { line: usize, reason: String },

    #[error("bad node (line {line}): {reason}")]
    BadNode { line: usize, reason: String },

    #[error("bad edge (line {line}): {reason}")]
    BadEdge { line: usize, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors raised while serving a request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("bad request (line {line}): {reason}")]
    BadRequest { line: usize, reason: String },

    #[error("unknown operation '{0}'")]
    UnknownOperation(String),

    #[error("no operation given")]
    MissingOperation,

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
