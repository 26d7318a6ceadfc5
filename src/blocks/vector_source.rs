//! Source block replaying a fixed vector

use std::mem;

use crate::runtime::{Block, IoSignature, MessageHub, WorkResult, WorkReturn};
use crate::runtime::{InputSpan, OutputSpan};

/// Emits the items of a vector in order, optionally repeating forever,
/// and reports done when (and if) the vector is exhausted.
pub struct VectorSource<T> {
    data: Vec<T>,
    pos: usize,
    repeat: bool,
}

impl<T: Copy + Send + 'static> VectorSource<T> {
    pub fn new(data: Vec<T>) -> Self {
        Self {
            data,
            pos: 0,
            repeat: false,
        }
    }

    /// Restart from the beginning instead of finishing.
    pub fn repeating(data: Vec<T>) -> Self {
        assert!(!data.is_empty(), "repeating source needs items");
        Self {
            data,
            pos: 0,
            repeat: true,
        }
    }
}

impl<T: Copy + Send + 'static> Block for VectorSource<T> {
    fn name(&self) -> &str {
        "vector_source"
    }

    fn io_signature(&self) -> IoSignature {
        IoSignature::source(1, mem::size_of::<T>())
    }

    fn work(
        &mut self,
        _inputs: &mut [InputSpan],
        outputs: &mut [OutputSpan],
        _msgs: &mut MessageHub,
    ) -> WorkResult<WorkReturn> {
        let out = outputs[0].as_mut_slice::<T>();
        let mut written = 0;
        while written < out.len() {
            if self.pos == self.data.len() {
                if !self.repeat {
                    break;
                }
                self.pos = 0;
            }
            let take = (out.len() - written).min(self.data.len() - self.pos);
            out[written..written + take].copy_from_slice(&self.data[self.pos..self.pos + take]);
            self.pos += take;
            written += take;
        }
        if written == 0 && !self.repeat {
            return Ok(WorkReturn::Done);
        }
        outputs[0].produce(written);
        if !self.repeat && self.pos == self.data.len() {
            return Ok(WorkReturn::Done);
        }
        Ok(WorkReturn::Produced(written))
    }
}
