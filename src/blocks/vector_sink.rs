//! Sink block collecting items into shared storage

use std::mem;
use std::sync::{Arc, Mutex};

use crate::runtime::{Block, IoSignature, MessageHub, WorkResult, WorkReturn};
use crate::runtime::{InputSpan, OutputSpan};

/// Shared handle to a [`VectorSink`]'s collected items. The sink itself is
/// consumed by the scheduler, so results are read through this handle
/// after the run completes.
pub struct VectorStore<T> {
    items: Arc<Mutex<Vec<T>>>,
}

impl<T> Clone for VectorStore<T> {
    fn clone(&self) -> Self {
        Self {
            items: Arc::clone(&self.items),
        }
    }
}

impl<T: Clone> VectorStore<T> {
    pub fn snapshot(&self) -> Vec<T> {
        self.items.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.items.lock().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Appends every received item to a vector retrievable through
/// [`VectorStore`].
pub struct VectorSink<T> {
    items: Arc<Mutex<Vec<T>>>,
}

impl<T: Copy + Send + 'static> VectorSink<T> {
    pub fn new() -> Self {
        Self {
            items: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn store(&self) -> VectorStore<T> {
        VectorStore {
            items: Arc::clone(&self.items),
        }
    }
}

impl<T: Copy + Send + 'static> Default for VectorSink<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy + Send + 'static> Block for VectorSink<T> {
    fn name(&self) -> &str {
        "vector_sink"
    }

    fn io_signature(&self) -> IoSignature {
        IoSignature::sink(1, mem::size_of::<T>())
    }

    fn work(
        &mut self,
        inputs: &mut [InputSpan],
        _outputs: &mut [OutputSpan],
        _msgs: &mut MessageHub,
    ) -> WorkResult<WorkReturn> {
        let n = inputs[0].items();
        if n > 0 {
            if let Ok(mut items) = self.items.lock() {
                items.extend_from_slice(inputs[0].as_slice::<T>());
            }
            inputs[0].consume(n);
        }
        Ok(WorkReturn::Produced(0))
    }
}
