//! Error types for the runtime system

/// Error type for topology operations on a [`FlowGraph`](super::graph::FlowGraph)
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("Block '{0}' not found")]
    BlockNotFound(String),

    #[error("Block with name '{0}' already exists")]
    DuplicateBlock(String),

    #[error("{direction} port {port} out of range for block '{block}' (max {max})")]
    PortOutOfRange {
        block: String,
        direction: &'static str,
        port: usize,
        max: usize,
    },

    #[error("Input port {port} on block '{block}' is already connected")]
    PortOccupied { block: String, port: usize },

    #[error(
        "Item size mismatch: {src_block}:{src_port} produces {src_size}-byte items, \
         {dst_block}:{dst_port} expects {dst_size}-byte items"
    )]
    ItemSizeMismatch {
        src_block: String,
        src_port: usize,
        src_size: usize,
        dst_block: String,
        dst_port: usize,
        dst_size: usize,
    },

    #[error("No edge from {src_block}:{src_port} to {dst_block}:{dst_port}")]
    EdgeNotFound {
        src_block: String,
        src_port: usize,
        dst_block: String,
        dst_port: usize,
    },

    #[error("{direction} port {port} on block '{block}' is not connected but a higher port is")]
    DanglingPort {
        block: String,
        direction: &'static str,
        port: usize,
    },

    #[error(
        "Block '{block}' has {used} connected {direction} ports, signature requires {min}..={max}"
    )]
    ArityViolation {
        block: String,
        direction: &'static str,
        used: usize,
        min: usize,
        max: usize,
    },

    #[error("Cycle detected through block '{0}'")]
    Cycle(String),

    #[error("Message port '{port}' not found on block '{block}'")]
    MessagePortNotFound { block: String, port: String },
}

/// Error a block's `work` may report.
///
/// Any of these is fatal to the whole run. Clean termination is signalled
/// with [`WorkReturn::Done`](super::block::WorkReturn::Done), never an error.
#[derive(Debug, thiserror::Error)]
pub enum WorkError {
    #[error("Block error: {0}")]
    Block(String),

    #[error("forecast of {need} items can never fit a buffer holding {capacity}")]
    ForecastOverCapacity { need: usize, capacity: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for work functions
pub type WorkResult<T = ()> = Result<T, WorkError>;

/// Top-level error for building and running a flowgraph
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("Buffer allocation failed: {0}")]
    Allocation(String),

    #[error("Block '{block}' failed: {source}")]
    Work {
        block: String,
        #[source]
        source: WorkError,
    },
}
