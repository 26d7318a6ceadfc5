//! Discarding sink

use crate::runtime::{Block, IoSignature, MessageHub, WorkResult, WorkReturn};
use crate::runtime::{InputSpan, OutputSpan};

/// Consumes and discards everything. Useful to terminate outputs whose
/// data is not needed, and as the cheapest possible backpressure-free
/// endpoint in benchmarks.
pub struct NullSink {
    item_size: usize,
}

impl NullSink {
    pub fn new(item_size: usize) -> Self {
        assert!(item_size > 0, "item size must be > 0");
        Self { item_size }
    }
}

impl Block for NullSink {
    fn name(&self) -> &str {
        "null_sink"
    }

    fn io_signature(&self) -> IoSignature {
        IoSignature::sink(1, self.item_size)
    }

    fn work(
        &mut self,
        inputs: &mut [InputSpan],
        _outputs: &mut [OutputSpan],
        _msgs: &mut MessageHub,
    ) -> WorkResult<WorkReturn> {
        let n = inputs[0].items();
        inputs[0].consume(n);
        Ok(WorkReturn::Produced(0))
    }
}
