//! Runtime support for streaming block graphs

pub mod block;
pub mod buffer;
pub mod errors;
pub mod executor;
pub mod graph;
pub mod message;
pub mod perf;
pub mod scheduler;
pub mod span;
pub mod storage;
pub mod tag;
pub mod watchdog;

pub use block::{Block, IoSignature, Ports, WorkReturn};
pub use buffer::{Buffer, BufferReader, BufferWriter};
pub use errors::{FlowError, GraphError, WorkError, WorkResult};
pub use executor::{BlockExec, Turn};
pub use graph::{BlockId, Edge, Endpoint, FlowGraph, MessageEdge};
pub use message::{MessageHub, MessageInbox, MessagePayload};
pub use perf::PerfCounters;
pub use scheduler::{run, RuntimeConfig, Scheduler};
pub use span::{InputSpan, OutputSpan};
pub use storage::{MirroredSlab, RingStorage};
pub use tag::{Tag, TagValue};
pub use watchdog::Watchdog;
