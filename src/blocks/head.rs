//! Stream truncation block

use crate::runtime::{Block, IoSignature, MessageHub, WorkResult, WorkReturn};
use crate::runtime::{InputSpan, OutputSpan};

/// Passes the first `count` items through, then reports done. Upstream
/// keeps producing into a dead buffer until the shutdown propagates, which
/// is the normal way to bound an otherwise infinite pipeline.
pub struct Head {
    item_size: usize,
    remaining: u64,
}

impl Head {
    pub fn new(item_size: usize, count: u64) -> Self {
        assert!(item_size > 0, "item size must be > 0");
        Self {
            item_size,
            remaining: count,
        }
    }
}

impl Block for Head {
    fn name(&self) -> &str {
        "head"
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
        if self.remaining == 0 {
            return Ok(WorkReturn::Done);
        }
        let n = inputs[0]
            .items()
            .min(outputs[0].items())
            .min(self.remaining as usize);
        if n > 0 {
            let bytes = n * self.item_size;
            outputs[0].bytes_mut()[..bytes].copy_from_slice(&inputs[0].bytes()[..bytes]);
            inputs[0].consume(n);
            outputs[0].produce(n);
            self.remaining -= n as u64;
        }
        if self.remaining == 0 {
            return Ok(WorkReturn::Done);
        }
        Ok(WorkReturn::Produced(n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{BlockExec, Buffer, MessageInbox, Turn};
    use std::time::Duration;

    #[test]
    fn test_truncates_after_count() {
        let mut src = Buffer::new(1024, 4);
        let src_reader = src.add_reader();
        let dst = Buffer::new(1024, 4);
        let dst_reader = dst.add_reader();
        let mut ex = BlockExec::new(
            "head",
            Box::new(Head::new(4, 5)),
            vec![src_reader],
            vec![dst],
            MessageInbox::empty(),
            MessageHub::empty(),
            Duration::from_millis(5),
            0.1,
        );

        src.produce(&[0u8; 80]); // 20 items, more than the cap
        assert_eq!(ex.turn().unwrap(), Turn::Finished);
        assert_eq!(dst_reader.items_available(), 5);
        assert!(dst_reader.producer_done());
        // The head's reader let go of the source buffer
        assert_eq!(src.num_readers(), 0);
    }
}
