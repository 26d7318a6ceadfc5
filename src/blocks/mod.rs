//! Standard block library
//!
//! Small reusable blocks covering the common pipeline roles:
//! - **Sources**: [`VectorSource`] replays a fixed vector
//! - **Sinks**: [`VectorSink`] collects into shared storage, [`NullSink`]
//!   discards
//! - **Pass-through**: [`Copy`] forwards items and their tags, [`Head`]
//!   truncates a stream after a fixed count
//! - **Rate changers**: [`Decimate`] keeps every n-th item
//! - **Combiners**: [`Combine`] merges two typed streams element-wise
//!
//! All of them report consumption and production through their spans and
//! terminate via `WorkReturn::Done`, so they double as reference
//! implementations of the block protocol.

mod combine;
mod copy;
mod decimate;
mod head;
mod null_sink;
mod vector_sink;
mod vector_source;

pub use combine::Combine;
pub use copy::Copy;
pub use decimate::Decimate;
pub use head::Head;
pub use null_sink::NullSink;
pub use vector_sink::{VectorSink, VectorStore};
pub use vector_source::VectorSource;
