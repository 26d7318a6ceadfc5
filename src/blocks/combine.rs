//! Element-wise combination of two streams

use std::mem;

use crate::runtime::{Block, IoSignature, MessageHub, WorkResult, WorkReturn};
use crate::runtime::{InputSpan, OutputSpan};

/// Merges two typed input streams element-wise with a closure, e.g. adding
/// or multiplying sample pairs. Processes as many pairs as both inputs and
/// the output allow; the executor ends the block once either input is
/// exhausted and drained.
pub struct Combine<T, F> {
    combine: F,
    _marker: std::marker::PhantomData<T>,
}

impl<T, F> Combine<T, F>
where
    T: Copy + Send + 'static,
    F: FnMut(&T, &T) -> T + Send,
{
    pub fn new(combine: F) -> Self {
        Self {
            combine,
            _marker: std::marker::PhantomData,
        }
    }
}

impl<T, F> Block for Combine<T, F>
where
    T: Copy + Send + 'static,
    F: FnMut(&T, &T) -> T + Send,
{
    fn name(&self) -> &str {
        "combine"
    }

    fn io_signature(&self) -> IoSignature {
        IoSignature::fixed(2, mem::size_of::<T>(), 1, mem::size_of::<T>())
    }

    fn work(
        &mut self,
        inputs: &mut [InputSpan],
        outputs: &mut [OutputSpan],
        _msgs: &mut MessageHub,
    ) -> WorkResult<WorkReturn> {
        let n = inputs[0]
            .items()
            .min(inputs[1].items())
            .min(outputs[0].items());
        if n > 0 {
            {
                let a: Vec<T> = inputs[0].as_slice::<T>()[..n].to_vec();
                let b = inputs[1].as_slice::<T>();
                let out = outputs[0].as_mut_slice::<T>();
                for i in 0..n {
                    out[i] = (self.combine)(&a[i], &b[i]);
                }
            }
            inputs[0].consume(n);
            inputs[1].consume(n);
        }
        Ok(WorkReturn::Produced(n))
    }
}
