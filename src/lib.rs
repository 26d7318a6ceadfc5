//! Streaming dataflow runtime for block-based signal processing
//!
//! This library runs pipelines of processing blocks connected by shared
//! circular sample buffers, thread-per-block:
//!
//! - **FlowGraph**: Topology of blocks, stream edges, and message edges
//! - **Buffers**: Single-writer multi-reader rings with wraparound-free
//!   views, absolute stream offsets, and tag tracking
//! - **Executor**: Drives each block through forecast → availability →
//!   work → bookkeeping, handling multi-rate blocks and done propagation
//! - **Scheduler**: Thread-per-block runtime with backpressure, stall
//!   watchdog, and per-block performance counters
//!
//! # Example
//!
//! ```
//! use sigflow::blocks::{Copy, VectorSink, VectorSource};
//! use sigflow::runtime::{run, FlowGraph, RuntimeConfig};
//!
//! let mut fg = FlowGraph::new();
//! let sink = VectorSink::<f32>::new();
//! let store = sink.store();
//!
//! let src = fg.add_block("src", VectorSource::new(vec![1.0f32, 2.0, 3.0]))?;
//! let cpy = fg.add_block("copy", Copy::new(4))?;
//! let snk = fg.add_block("sink", sink)?;
//! fg.connect(src, 0, cpy, 0)?;
//! fg.connect(cpy, 0, snk, 0)?;
//!
//! run(fg, RuntimeConfig::default())?;
//! assert_eq!(store.snapshot(), vec![1.0, 2.0, 3.0]);
//! # Ok::<(), sigflow::runtime::FlowError>(())
//! ```

pub mod blocks;
pub mod runtime;

// Re-export the types every pipeline touches
pub use runtime::{Block, FlowGraph, IoSignature, RuntimeConfig, Scheduler};
pub use runtime::{FlowError, WorkResult, WorkReturn};
pub use runtime::{InputSpan, MessageHub, OutputSpan, Tag, TagValue};
