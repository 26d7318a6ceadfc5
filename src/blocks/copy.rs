//! Pass-through block

use crate::runtime::{Block, IoSignature, MessageHub, WorkResult, WorkReturn};
use crate::runtime::{InputSpan, OutputSpan};

/// Forwards items unchanged, item-size agnostic. Tags riding on forwarded
/// items are re-attached at the same stream position on the output.
pub struct Copy {
    item_size: usize,
}

impl Copy {
    pub fn new(item_size: usize) -> Self {
        assert!(item_size > 0, "item size must be > 0");
        Self { item_size }
    }
}

impl Block for Copy {
    fn name(&self) -> &str {
        "copy"
    }

    fn io_signature(&self) -> IoSignature {
        IoSignature::fixed(1, self.item_size, 1, self.item_size)
    }

    fn work(
        &mut self,
        inputs: &mut [InputSpan],
        outputs: &mut [OutputSpan],
        _msgs: &mut MessageHub,
    ) -> WorkResult<WorkReturn> {
        let n = inputs[0].items().min(outputs[0].items());
        if n > 0 {
            let bytes = n * self.item_size;
            outputs[0].bytes_mut()[..bytes].copy_from_slice(&inputs[0].bytes()[..bytes]);

            let base = inputs[0].offset();
            for tag in inputs[0].tags() {
                let rel = (tag.offset - base) as usize;
                if rel < n {
                    outputs[0].add_tag(rel, tag.key, tag.value);
                }
            }
            inputs[0].consume(n);
        }
        Ok(WorkReturn::Produced(n))
    }
}
