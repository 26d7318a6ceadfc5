//! Fixed-factor decimation

use crate::runtime::{Block, IoSignature, MessageHub, WorkResult, WorkReturn};
use crate::runtime::{InputSpan, OutputSpan};

/// Keeps one item out of every `factor`, dropping the rest. The declared
/// relative rate lets the executor forecast input needs.
pub struct Decimate {
    item_size: usize,
    factor: usize,
}

impl Decimate {
    pub fn new(item_size: usize, factor: usize) -> Self {
        assert!(item_size > 0, "item size must be > 0");
        assert!(factor > 0, "decimation factor must be > 0");
        Self { item_size, factor }
    }
}

impl Block for Decimate {
    fn name(&self) -> &str {
        "decimate"
    }

    fn io_signature(&self) -> IoSignature {
        IoSignature::fixed(1, self.item_size, 1, self.item_size)
    }

    fn relative_rate(&self) -> f64 {
        1.0 / self.factor as f64
    }

    fn work(
        &mut self,
        inputs: &mut [InputSpan],
        outputs: &mut [OutputSpan],
        _msgs: &mut MessageHub,
    ) -> WorkResult<WorkReturn> {
        let n = (inputs[0].items() / self.factor).min(outputs[0].items());
        if n > 0 {
            let size = self.item_size;
            let src = inputs[0].bytes();
            let dst = outputs[0].bytes_mut();
            for i in 0..n {
                let from = i * self.factor * size;
                dst[i * size..(i + 1) * size].copy_from_slice(&src[from..from + size]);
            }
            inputs[0].consume(n * self.factor);
        }
        Ok(WorkReturn::Produced(n))
    }
}
