//! Block trait for streaming processing
//!
//! A [`Block`] is a processing unit with typed stream ports:
//! - Sources have 0 inputs and N outputs
//! - Sinks have N inputs and 0 outputs
//! - Processors have N inputs and M outputs
//!
//! The executor drives each block through the forecast → availability →
//! work → bookkeeping protocol; blocks self-report consumption and
//! production through the spans handed to `work`.

use super::errors::WorkResult;
use super::message::{MessageHub, MessagePayload};
use super::span::{InputSpan, OutputSpan};

/// Port declaration for one direction of a block's io signature.
///
/// `item_sizes[i]` is the item size of port `i`; the last entry repeats for
/// higher-numbered ports, so variable-arity blocks list one size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ports {
    pub min: usize,
    pub max: usize,
    item_sizes: Vec<usize>,
}

impl Ports {
    /// No ports in this direction.
    pub fn none() -> Self {
        Self {
            min: 0,
            max: 0,
            item_sizes: Vec::new(),
        }
    }

    /// Exactly `n` ports of `item_size`-byte items.
    pub fn fixed(n: usize, item_size: usize) -> Self {
        Self::ranged(n, n, item_size)
    }

    /// Between `min` and `max` ports of uniform item size.
    pub fn ranged(min: usize, max: usize, item_size: usize) -> Self {
        assert!(min <= max, "min ports must not exceed max");
        assert!(max == 0 || item_size > 0, "item size must be > 0");
        Self {
            min,
            max,
            item_sizes: if max == 0 { Vec::new() } else { vec![item_size] },
        }
    }

    /// Per-port item sizes; the last entry repeats for higher ports.
    pub fn with_sizes(min: usize, max: usize, item_sizes: Vec<usize>) -> Self {
        assert!(min <= max, "min ports must not exceed max");
        assert!(max == 0 || !item_sizes.is_empty(), "item sizes required");
        assert!(item_sizes.iter().all(|&s| s > 0), "item size must be > 0");
        Self {
            min,
            max,
            item_sizes,
        }
    }

    /// Item size of port `port`.
    pub fn item_size(&self, port: usize) -> usize {
        debug_assert!(port < self.max);
        *self
            .item_sizes
            .get(port)
            .or_else(|| self.item_sizes.last())
            .expect("no item sizes declared")
    }
}

/// A block's stream port declaration: arity bounds and item sizes for both
/// directions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IoSignature {
    pub inputs: Ports,
    pub outputs: Ports,
}

impl IoSignature {
    pub fn new(inputs: Ports, outputs: Ports) -> Self {
        Self { inputs, outputs }
    }

    /// `nin` inputs of `in_size` bytes, `nout` outputs of `out_size` bytes.
    pub fn fixed(nin: usize, in_size: usize, nout: usize, out_size: usize) -> Self {
        Self {
            inputs: if nin == 0 {
                Ports::none()
            } else {
                Ports::fixed(nin, in_size)
            },
            outputs: if nout == 0 {
                Ports::none()
            } else {
                Ports::fixed(nout, out_size)
            },
        }
    }

    /// A source: no inputs, `nout` outputs.
    pub fn source(nout: usize, item_size: usize) -> Self {
        Self::fixed(0, 0, nout, item_size)
    }

    /// A sink: `nin` inputs, no outputs.
    pub fn sink(nin: usize, item_size: usize) -> Self {
        Self::fixed(nin, item_size, 0, 0)
    }
}

/// What a `work` invocation reports back to the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkReturn {
    /// Items produced this turn; fills in any output span that did not call
    /// [`OutputSpan::produce`] explicitly. `Produced(0)` means "nothing this
    /// turn, call me again" — it is *not* a termination signal.
    Produced(usize),
    /// Permanent completion: the block will never produce again. Propagates
    /// done to all downstream buffers.
    Done,
}

/// A processing block that transforms data.
pub trait Block: Send {
    /// Debug name for this block
    fn name(&self) -> &str;

    /// Stream port declaration; fixed for the lifetime of the block.
    fn io_signature(&self) -> IoSignature;

    /// Output-to-input item ratio. A decimator by 4 reports 0.25.
    fn relative_rate(&self) -> f64 {
        1.0
    }

    /// Extra trailing input items the block needs to see again on the next
    /// invocation (lookahead). The executor folds this into the default
    /// forecast; the block realizes it by under-consuming.
    fn history(&self) -> usize {
        0
    }

    /// Names of asynchronous message input ports.
    fn message_inputs(&self) -> Vec<String> {
        Vec::new()
    }

    /// Names of asynchronous message output ports.
    fn message_outputs(&self) -> Vec<String> {
        Vec::new()
    }

    /// Map a desired output count to the required item count per input
    /// port. The default assumes the declared relative rate plus history;
    /// blocks with irregular rates override this.
    fn forecast(&self, noutput: usize, ninputs: usize) -> Vec<usize> {
        let per_input = (noutput as f64 / self.relative_rate()).ceil() as usize + self.history();
        vec![per_input; ninputs]
    }

    /// Deliver one inbound message. Called by the executor before each
    /// streaming invocation, in per-channel FIFO order.
    fn handle_message(&mut self, _port: usize, _msg: MessagePayload) {}

    /// Process one batch: read from `inputs`, write to `outputs`, report
    /// consumption/production on the spans, and return how many items were
    /// produced — or [`WorkReturn::Done`] to terminate cleanly. Called
    /// exactly once per scheduling turn.
    fn work(
        &mut self,
        inputs: &mut [InputSpan],
        outputs: &mut [OutputSpan],
        msgs: &mut MessageHub,
    ) -> WorkResult<WorkReturn>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ports_item_size_repeats_last() {
        let ports = Ports::with_sizes(1, 4, vec![8, 4]);
        assert_eq!(ports.item_size(0), 8);
        assert_eq!(ports.item_size(1), 4);
        assert_eq!(ports.item_size(3), 4);
    }

    #[test]
    fn test_signature_helpers() {
        let sig = IoSignature::source(1, 4);
        assert_eq!(sig.inputs.max, 0);
        assert_eq!(sig.outputs.max, 1);
        assert_eq!(sig.outputs.item_size(0), 4);

        let sig = IoSignature::sink(2, 8);
        assert_eq!(sig.inputs.min, 2);
        assert_eq!(sig.inputs.item_size(1), 8);
    }

    struct Decim;
    impl Block for Decim {
        fn name(&self) -> &str {
            "decim"
        }
        fn io_signature(&self) -> IoSignature {
            IoSignature::fixed(1, 4, 1, 4)
        }
        fn relative_rate(&self) -> f64 {
            0.25
        }
        fn history(&self) -> usize {
            3
        }
        fn work(
            &mut self,
            _i: &mut [InputSpan],
            _o: &mut [OutputSpan],
            _m: &mut MessageHub,
        ) -> WorkResult<WorkReturn> {
            Ok(WorkReturn::Produced(0))
        }
    }

    #[test]
    fn test_default_forecast_uses_rate_and_history() {
        let b = Decim;
        // 10 outputs at rate 1/4 needs 40 inputs, plus 3 history items
        assert_eq!(b.forecast(10, 1), vec![43]);
    }
}
