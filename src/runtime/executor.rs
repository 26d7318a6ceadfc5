//! Per-block execution engine
//!
//! A [`BlockExec`] binds one block to its stream buffers and message
//! channels and drives it one scheduling turn at a time: deliver pending
//! messages, check output space and forecast input needs, invoke `work`
//! once with full spans, then apply the self-reported consumption and
//! production. The scheduler runs one `BlockExec` per thread, but a turn
//! itself is synchronous, which keeps the protocol testable without
//! threads.

use std::time::{Duration, Instant};

use crossbeam_channel::TryRecvError;
use tracing::{debug, trace};

use super::block::{Block, WorkReturn};
use super::buffer::{BufferReader, BufferWriter};
use super::errors::{WorkError, WorkResult};
use super::message::{MessageHub, MessageInbox};
use super::perf::PerfCounters;
use super::span::{InputSpan, OutputSpan};

/// Outcome of one scheduling turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Turn {
    /// `work` ran; the count is items produced (for sinks, consumed).
    Worked(usize),
    /// Preconditions not met within the wait tick; try again.
    Waiting,
    /// The block is permanently done and its buffers are released.
    Finished,
}

/// One block bound to its runtime resources.
pub struct BlockExec {
    name: String,
    block: Box<dyn Block>,
    inputs: Vec<BufferReader>,
    outputs: Vec<BufferWriter>,
    inbox: MessageInbox,
    inbox_closed: Vec<bool>,
    hub: MessageHub,
    perf: PerfCounters,
    wait_tick: Duration,
    finished: bool,
}

impl BlockExec {
    pub fn new(
        name: impl Into<String>,
        block: Box<dyn Block>,
        inputs: Vec<BufferReader>,
        outputs: Vec<BufferWriter>,
        inbox: MessageInbox,
        hub: MessageHub,
        wait_tick: Duration,
        perf_alpha: f64,
    ) -> Self {
        let nports = inbox.ports.len();
        Self {
            name: name.into(),
            block,
            inputs,
            outputs,
            inbox,
            inbox_closed: vec![false; nports],
            hub,
            perf: PerfCounters::new(perf_alpha),
            wait_tick,
            finished: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn perf(&self) -> &PerfCounters {
        &self.perf
    }

    /// Drain every message input channel and deliver in per-channel FIFO
    /// order. Returns the number of messages delivered.
    fn deliver_messages(&mut self) -> usize {
        let mut delivered = 0;
        for (idx, (_, rx)) in self.inbox.ports.iter().enumerate() {
            loop {
                match rx.try_recv() {
                    Ok(msg) => {
                        self.block.handle_message(idx, msg);
                        delivered += 1;
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        self.inbox_closed[idx] = true;
                        break;
                    }
                }
            }
        }
        delivered
    }

    /// Turn for a block with no stream ports: it runs on messages alone.
    /// Receivers finish when every sender side has hung up; producers run
    /// until their own `work` reports done.
    fn message_turn(&mut self, delivered: usize) -> WorkResult<Turn> {
        if !self.inbox.is_empty() && self.inbox_closed.iter().all(|&c| c) {
            self.finish();
            return Ok(Turn::Finished);
        }

        let started = Instant::now();
        let ret = self.block.work(&mut [], &mut [], &mut self.hub)?;
        self.perf.record_work(0, started.elapsed(), 0.0, 0.0);

        if self.inbox.is_empty() && self.hub.num_ports() == 0 {
            // No ports at all: nothing will ever drive this block again
            self.finish();
            return Ok(Turn::Finished);
        }
        match ret {
            WorkReturn::Done => {
                self.finish();
                Ok(Turn::Finished)
            }
            WorkReturn::Produced(_) if delivered > 0 => Ok(Turn::Worked(0)),
            WorkReturn::Produced(_) => {
                if !self.inbox.is_empty() {
                    // Park until a message arrives or the tick elapses. A
                    // disconnected channel reads as permanently ready, so
                    // only live ports go into the select.
                    let mut sel = crossbeam_channel::Select::new();
                    let mut live = 0;
                    for ((_, rx), &closed) in self.inbox.ports.iter().zip(&self.inbox_closed) {
                        if !closed {
                            sel.recv(rx);
                            live += 1;
                        }
                    }
                    if live > 0 {
                        let _ = sel.ready_timeout(self.wait_tick);
                    } else {
                        std::thread::sleep(self.wait_tick);
                    }
                }
                Ok(Turn::Waiting)
            }
        }
    }

    /// Release all buffer endpoints: downstream sees done, upstream sees
    /// this block's readers deregister.
    fn finish(&mut self) {
        debug!(block = %self.name, "finished");
        self.inputs.clear();
        for writer in &mut self.outputs {
            writer.finish();
        }
        self.outputs.clear();
        self.finished = true;
    }

    /// Run one scheduling turn.
    pub fn turn(&mut self) -> WorkResult<Turn> {
        if self.finished {
            return Ok(Turn::Finished);
        }

        let delivered = self.deliver_messages();
        if self.inputs.is_empty() && self.outputs.is_empty() {
            return self.message_turn(delivered);
        }

        // No one left to read any output: running is pointless, and
        // finishing propagates the shutdown upstream.
        if !self.outputs.is_empty() && self.outputs.iter().all(|w| w.num_readers() == 0) {
            self.finish();
            return Ok(Turn::Finished);
        }

        // Output space gate
        let mut space = usize::MAX;
        for writer in &self.outputs {
            let mut free = writer.space_available();
            if free == 0 && writer.num_readers() > 0 {
                free = writer.wait_for_space(1, self.wait_tick);
            }
            if writer.num_readers() > 0 {
                space = space.min(free);
            }
        }
        if !self.outputs.is_empty() && space == 0 {
            trace!(block = %self.name, "waiting for output space");
            return Ok(Turn::Waiting);
        }

        // Input availability gate: enough input to produce at least one
        // output item (work self-limits against the full spans it gets).
        // An exhausted upstream relaxes the forecast to "whatever is
        // left"; a drained one ends the block.
        let mut flushing = false;
        if !self.inputs.is_empty() {
            let needed = self.block.forecast(1, self.inputs.len());
            debug_assert_eq!(needed.len(), self.inputs.len());
            for (reader, &need) in self.inputs.iter().zip(&needed) {
                // A need the ring can never hold would wait forever.
                let holdable = reader.buffer().capacity() - 1;
                if need > holdable {
                    return Err(WorkError::ForecastOverCapacity {
                        need,
                        capacity: holdable,
                    });
                }
                let need = need.max(1);
                let mut avail = reader.items_available();
                let mut done = reader.producer_done();
                if avail < need && !done {
                    let (a, d) = reader.wait_for_items(need, self.wait_tick);
                    avail = a;
                    done = d;
                }
                if avail < need {
                    if !done {
                        trace!(block = %self.name, need, avail, "waiting for input");
                        return Ok(Turn::Waiting);
                    }
                    if avail == 0 {
                        self.finish();
                        return Ok(Turn::Finished);
                    }
                    flushing = true;
                }
            }
        }

        let (input_fullness, output_fullness) = self.fullness();

        // One work invocation over full spans
        let mut in_spans: Vec<InputSpan> = self.inputs.iter().map(InputSpan::new).collect();
        let mut out_spans: Vec<OutputSpan> = self.outputs.iter_mut().map(OutputSpan::new).collect();

        let started = Instant::now();
        let ret = self
            .block
            .work(&mut in_spans, &mut out_spans, &mut self.hub)?;
        let elapsed = started.elapsed();

        let consumed: Vec<usize> = in_spans.iter().map(|s| s.consumed()).collect();
        let reports: Vec<_> = out_spans.into_iter().map(OutputSpan::into_report).collect();
        drop(in_spans);

        // Bookkeeping: cursors first, then tags, then the commit that
        // publishes both items and tags to readers.
        for (reader, n) in self.inputs.iter_mut().zip(&consumed) {
            if *n > 0 {
                reader.consume(*n);
            }
        }
        let default_produced = match ret {
            WorkReturn::Produced(n) => n,
            WorkReturn::Done => 0,
        };
        let mut produced_total = 0;
        for (writer, (explicit, tags)) in self.outputs.iter_mut().zip(reports) {
            let n = explicit.unwrap_or(default_produced);
            for tag in tags {
                writer.add_tag(tag);
            }
            if n > 0 {
                writer.commit(n);
            }
            produced_total += n;
        }
        let consumed_total: usize = consumed.iter().sum();

        self.perf.record_work(
            produced_total,
            elapsed,
            input_fullness,
            output_fullness,
        );

        if matches!(ret, WorkReturn::Done) {
            self.finish();
            return Ok(Turn::Finished);
        }

        // A flush turn that moved nothing will never move anything:
        // the remaining items are items the block cannot use.
        if flushing && consumed_total == 0 && produced_total == 0 {
            self.finish();
            return Ok(Turn::Finished);
        }

        Ok(Turn::Worked(if self.outputs.is_empty() {
            consumed_total
        } else {
            produced_total
        }))
    }

    /// Mean occupancy of input and output rings, for the perf counters.
    fn fullness(&self) -> (f64, f64) {
        let input = if self.inputs.is_empty() {
            0.0
        } else {
            self.inputs
                .iter()
                .map(|r| r.items_available() as f64 / (r.buffer().capacity() - 1) as f64)
                .sum::<f64>()
                / self.inputs.len() as f64
        };
        let output = if self.outputs.is_empty() {
            0.0
        } else {
            self.outputs
                .iter()
                .map(|w| 1.0 - w.space_available() as f64 / (w.capacity() - 1) as f64)
                .sum::<f64>()
                / self.outputs.len() as f64
        };
        (input, output)
    }
}
