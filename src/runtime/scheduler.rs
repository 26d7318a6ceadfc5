//! Thread-per-block scheduler
//!
//! [`Scheduler::start`] consumes a validated [`FlowGraph`], materializes
//! one ring buffer per connected output port and one message channel per
//! connected message input port, and spawns one OS thread per block. Each
//! thread loops the block's [`BlockExec::turn`] until the block finishes,
//! errors, or an external stop is requested. Buffer waits are bounded by
//! the configured tick so every thread re-checks the stop flag regularly.
//!
//! Completion is signalled back over a channel carrying the block's final
//! performance counters; [`Scheduler::wait`] joins everything and returns
//! either the metrics table or the first error any block hit.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver};
use tracing::{debug, error, info};

use super::buffer::{Buffer, BufferReader, BufferWriter};
use super::errors::FlowError;
use super::executor::{BlockExec, Turn};
use super::graph::FlowGraph;
use super::message::{MessageHub, MessageInbox, MessagePayload};
use super::perf::PerfCounters;
use super::watchdog::Watchdog;

/// Knobs for one flowgraph run.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Requested ring capacity per edge, in items (rounded up to the
    /// allocation granularity).
    pub buffer_items: usize,
    /// Upper bound on any single blocking buffer wait; also the stop-flag
    /// polling interval.
    pub wait_tick: Duration,
    /// EWMA smoothing factor for the per-block performance counters.
    pub perf_alpha: f64,
    /// How long a block may move nothing before the watchdog logs it.
    pub stall_warning: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            buffer_items: 8192,
            wait_tick: Duration::from_millis(100),
            perf_alpha: 0.1,
            stall_warning: Duration::from_secs(5),
        }
    }
}

/// A running flowgraph.
pub struct Scheduler {
    stop: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
    done_rx: Receiver<(String, PerfCounters)>,
    first_error: Arc<Mutex<Option<FlowError>>>,
    watchdog: Watchdog,
}

impl Scheduler {
    /// Validate the graph, materialize buffers and channels, and spawn the
    /// block threads.
    pub fn start(graph: FlowGraph, config: RuntimeConfig) -> Result<Self, FlowError> {
        graph.validate()?;
        let domains = graph.partition()?;
        info!(
            blocks = graph.num_blocks(),
            edges = graph.edges().len(),
            domains = domains.len(),
            "starting flowgraph"
        );

        let (blocks, edges, message_edges) = graph.into_parts();

        // One ring per connected output port, shared by all its edges
        let mut writers: HashMap<(usize, usize), BufferWriter> = HashMap::new();
        for edge in &edges {
            let key = (edge.src.block.as_usize(), edge.src.port);
            if !writers.contains_key(&key) {
                let item_size = blocks[key.0].signature.outputs.item_size(key.1);
                writers.insert(key, Buffer::new(config.buffer_items, item_size));
            }
        }

        // One reader per edge, slotted at the destination port
        let mut inputs: Vec<Vec<Option<BufferReader>>> =
            blocks.iter().map(|_| Vec::new()).collect();
        for edge in &edges {
            let writer = &writers[&(edge.src.block.as_usize(), edge.src.port)];
            let slots = &mut inputs[edge.dst.block.as_usize()];
            if slots.len() <= edge.dst.port {
                slots.resize_with(edge.dst.port + 1, || None);
            }
            slots[edge.dst.port] = Some(writer.add_reader());
        }

        // One channel per declared message input port; senders are cloned
        // into the hubs of connected upstream blocks, and the originals are
        // dropped so unconnected ports read as hung up.
        let mut msg_tx = HashMap::new();
        let mut inboxes: Vec<MessageInbox> = Vec::with_capacity(blocks.len());
        for (idx, entry) in blocks.iter().enumerate() {
            let mut ports = Vec::with_capacity(entry.message_inputs.len());
            for (j, name) in entry.message_inputs.iter().enumerate() {
                let (tx, rx) = unbounded::<MessagePayload>();
                msg_tx.insert((idx, j), tx);
                ports.push((name.clone(), rx));
            }
            inboxes.push(MessageInbox::new(ports));
        }
        let mut hubs: Vec<MessageHub> = blocks
            .iter()
            .enumerate()
            .map(|(idx, entry)| {
                let ports = entry
                    .message_outputs
                    .iter()
                    .enumerate()
                    .map(|(k, name)| {
                        let destinations = message_edges
                            .iter()
                            .filter(|e| e.src.as_usize() == idx && e.src_index == k)
                            .map(|e| msg_tx[&(e.dst.as_usize(), e.dst_index)].clone())
                            .collect();
                        (name.clone(), destinations)
                    })
                    .collect();
                MessageHub::new(ports)
            })
            .collect();
        drop(msg_tx);

        // Hand each block its endpoints, in dependency order
        let mut writer_map: HashMap<usize, Vec<(usize, BufferWriter)>> = HashMap::new();
        for ((block, port), writer) in writers {
            writer_map.entry(block).or_default().push((port, writer));
        }

        let stop = Arc::new(AtomicBool::new(false));
        let first_error: Arc<Mutex<Option<FlowError>>> = Arc::new(Mutex::new(None));
        let watchdog = Watchdog::start(config.stall_warning);
        let (done_tx, done_rx) = unbounded();

        let mut execs: Vec<Option<BlockExec>> = blocks
            .into_iter()
            .enumerate()
            .map(|(idx, entry)| {
                let block_inputs: Vec<BufferReader> =
                    std::mem::take(&mut inputs[idx]).into_iter().flatten().collect();
                let mut outs = writer_map.remove(&idx).unwrap_or_default();
                outs.sort_by_key(|(port, _)| *port);
                let block_outputs: Vec<BufferWriter> =
                    outs.into_iter().map(|(_, w)| w).collect();
                let inbox = std::mem::replace(&mut inboxes[idx], MessageInbox::empty());
                let hub = std::mem::replace(&mut hubs[idx], MessageHub::empty());
                Some(BlockExec::new(
                    entry.name,
                    entry.block,
                    block_inputs,
                    block_outputs,
                    inbox,
                    hub,
                    config.wait_tick,
                    config.perf_alpha,
                ))
            })
            .collect();

        let mut threads = Vec::new();
        for id in domains.iter().flatten() {
            let Some(mut exec) = execs[id.as_usize()].take() else {
                continue;
            };
            let name = exec.name().to_string();
            let stop = Arc::clone(&stop);
            let first_error = Arc::clone(&first_error);
            let done_tx = done_tx.clone();
            let watch = watchdog.register(name.as_str());

            let handle = thread::Builder::new()
                .name(name.clone())
                .spawn(move || {
                    debug!(block = %name, "thread started");
                    while !stop.load(Ordering::Relaxed) {
                        match exec.turn() {
                            Ok(Turn::Finished) => break,
                            Ok(Turn::Worked(n)) => {
                                if n > 0 {
                                    watch.progress();
                                }
                            }
                            Ok(Turn::Waiting) => {}
                            Err(source) => {
                                error!(block = %name, %source, "work failed");
                                if let Ok(mut slot) = first_error.lock() {
                                    slot.get_or_insert(FlowError::Work {
                                        block: name.clone(),
                                        source,
                                    });
                                }
                                stop.store(true, Ordering::Relaxed);
                                break;
                            }
                        }
                    }
                    debug!(block = %name, "thread exiting");
                    let _ = done_tx.send((name, exec.perf().clone()));
                })
                .map_err(|e| FlowError::Allocation(format!("spawn failed: {e}")))?;
            threads.push(handle);
        }
        drop(done_tx);

        Ok(Self {
            stop,
            threads,
            done_rx,
            first_error,
            watchdog,
        })
    }

    /// Ask every block thread to wind down at its next turn boundary.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Join all block threads. Returns the per-block performance counters,
    /// or the first error any block reported.
    pub fn wait(mut self) -> Result<HashMap<String, PerfCounters>, FlowError> {
        let mut metrics = HashMap::new();
        while let Ok((name, perf)) = self.done_rx.recv() {
            debug!(block = %name, calls = perf.work_calls, "block completed");
            metrics.insert(name, perf);
        }
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
        self.watchdog.stop();

        let slot = self
            .first_error
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        match slot {
            Some(err) => Err(err),
            None => Ok(metrics),
        }
    }
}

/// Run a flowgraph to completion and return the per-block metrics.
pub fn run(graph: FlowGraph, config: RuntimeConfig) -> Result<HashMap<String, PerfCounters>, FlowError> {
    Scheduler::start(graph, config)?.wait()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{Copy, VectorSink, VectorSource};
    use crate::runtime::block::{Block, IoSignature, WorkReturn};
    use crate::runtime::errors::{GraphError, WorkError, WorkResult};
    use crate::runtime::span::{InputSpan, OutputSpan};

    fn test_config() -> RuntimeConfig {
        // RUST_LOG=sigflow=trace surfaces the per-turn diagnostics
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
        RuntimeConfig {
            buffer_items: 1024,
            wait_tick: Duration::from_millis(5),
            ..RuntimeConfig::default()
        }
    }

    #[test]
    fn test_linear_pipeline_runs_to_completion() {
        let mut fg = FlowGraph::new();
        let data: Vec<u32> = (0..5000).collect();
        let sink = VectorSink::<u32>::new();
        let store = sink.store();

        let src = fg.add_block("src", VectorSource::new(data.clone())).unwrap();
        let cpy = fg.add_block("copy", Copy::new(4)).unwrap();
        let snk = fg.add_block("sink", sink).unwrap();
        fg.connect(src, 0, cpy, 0).unwrap();
        fg.connect(cpy, 0, snk, 0).unwrap();

        let metrics = run(fg, test_config()).unwrap();
        assert_eq!(store.snapshot(), data);
        assert!(metrics.contains_key("src"));
        assert!(metrics.contains_key("copy"));
        assert!(metrics["src"].total_items >= 5000);
    }

    #[test]
    fn test_fanout_delivers_to_both_sinks() {
        let mut fg = FlowGraph::new();
        let data: Vec<f32> = (0..1000).map(|v| v as f32).collect();
        let sink_a = VectorSink::<f32>::new();
        let sink_b = VectorSink::<f32>::new();
        let store_a = sink_a.store();
        let store_b = sink_b.store();

        let src = fg.add_block("src", VectorSource::new(data.clone())).unwrap();
        let a = fg.add_block("a", sink_a).unwrap();
        let b = fg.add_block("b", sink_b).unwrap();
        fg.connect(src, 0, a, 0).unwrap();
        fg.connect(src, 0, b, 0).unwrap();

        run(fg, test_config()).unwrap();
        assert_eq!(store_a.snapshot(), data);
        assert_eq!(store_b.snapshot(), data);
    }

    struct Faulty;

    impl Block for Faulty {
        fn name(&self) -> &str {
            "faulty"
        }
        fn io_signature(&self) -> IoSignature {
            IoSignature::source(1, 4)
        }
        fn work(
            &mut self,
            _inputs: &mut [InputSpan],
            _outputs: &mut [OutputSpan],
            _msgs: &mut MessageHub,
        ) -> WorkResult<WorkReturn> {
            Err(WorkError::Block("broken oscillator".to_string()))
        }
    }

    #[test]
    fn test_block_error_stops_the_run() {
        let mut fg = FlowGraph::new();
        let src = fg.add_block("bad", Faulty).unwrap();
        let snk = fg.add_block("sink", VectorSink::<u32>::new()).unwrap();
        fg.connect(src, 0, snk, 0).unwrap();

        let err = run(fg, test_config()).unwrap_err();
        match err {
            FlowError::Work { block, .. } => assert_eq!(block, "bad"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_graph_rejected_before_spawn() {
        let mut fg = FlowGraph::new();
        // Requires one input, never connected
        fg.add_block("sink", VectorSink::<u32>::new()).unwrap();

        let err = run(fg, test_config()).unwrap_err();
        assert!(matches!(
            err,
            FlowError::Graph(GraphError::ArityViolation { .. })
        ));
    }

    #[test]
    fn test_head_bounds_an_endless_source() {
        let mut fg = FlowGraph::new();
        let data: Vec<u32> = (0..64).collect();
        let sink = VectorSink::<u32>::new();
        let store = sink.store();

        let src = fg
            .add_block("src", VectorSource::repeating(data))
            .unwrap();
        let head = fg
            .add_block("head", crate::blocks::Head::new(4, 100))
            .unwrap();
        let snk = fg.add_block("sink", sink).unwrap();
        fg.connect(src, 0, head, 0).unwrap();
        fg.connect(head, 0, snk, 0).unwrap();

        run(fg, test_config()).unwrap();
        let got = store.snapshot();
        assert_eq!(got.len(), 100);
        for (i, v) in got.iter().enumerate() {
            assert_eq!(*v, (i % 64) as u32);
        }
    }

    #[test]
    fn test_decimated_chain() {
        let mut fg = FlowGraph::new();
        let data: Vec<u32> = (0..1000).collect();
        let sink = VectorSink::<u32>::new();
        let store = sink.store();

        let src = fg.add_block("src", VectorSource::new(data)).unwrap();
        let dec = fg
            .add_block("dec", crate::blocks::Decimate::new(4, 10))
            .unwrap();
        let snk = fg.add_block("sink", sink).unwrap();
        fg.connect(src, 0, dec, 0).unwrap();
        fg.connect(dec, 0, snk, 0).unwrap();

        run(fg, test_config()).unwrap();
        assert_eq!(
            store.snapshot(),
            (0..1000).step_by(10).collect::<Vec<u32>>()
        );
    }

    /// Source that tags the first item of the stream, to watch a tag ride
    /// a chain of copies.
    struct MarkedSource {
        sent: bool,
    }

    impl Block for MarkedSource {
        fn name(&self) -> &str {
            "marked"
        }
        fn io_signature(&self) -> IoSignature {
            IoSignature::source(1, 4)
        }
        fn work(
            &mut self,
            _inputs: &mut [InputSpan],
            outputs: &mut [OutputSpan],
            _msgs: &mut MessageHub,
        ) -> WorkResult<WorkReturn> {
            if self.sent {
                return Ok(WorkReturn::Done);
            }
            let out = outputs[0].as_mut_slice::<u32>();
            let n = out.len().min(16);
            for (i, slot) in out[..n].iter_mut().enumerate() {
                *slot = i as u32;
            }
            outputs[0].add_tag(7, "burst_start", crate::runtime::TagValue::Integer(7));
            self.sent = true;
            Ok(WorkReturn::Produced(n))
        }
    }

    /// Sink recording every tag it observes.
    struct TagRecorder {
        tags: Arc<Mutex<Vec<crate::runtime::Tag>>>,
    }

    impl Block for TagRecorder {
        fn name(&self) -> &str {
            "tag_recorder"
        }
        fn io_signature(&self) -> IoSignature {
            IoSignature::sink(1, 4)
        }
        fn work(
            &mut self,
            inputs: &mut [InputSpan],
            _outputs: &mut [OutputSpan],
            _msgs: &mut MessageHub,
        ) -> WorkResult<WorkReturn> {
            if let Ok(mut tags) = self.tags.lock() {
                tags.extend(inputs[0].tags());
            }
            let n = inputs[0].items();
            inputs[0].consume(n);
            Ok(WorkReturn::Produced(0))
        }
    }

    #[test]
    fn test_tag_survives_a_chain_of_copies() {
        let mut fg = FlowGraph::new();
        let tags = Arc::new(Mutex::new(Vec::new()));

        let src = fg.add_block("src", MarkedSource { sent: false }).unwrap();
        let c1 = fg.add_block("c1", Copy::new(4)).unwrap();
        let c2 = fg.add_block("c2", Copy::new(4)).unwrap();
        let rec = fg
            .add_block(
                "rec",
                TagRecorder {
                    tags: Arc::clone(&tags),
                },
            )
            .unwrap();
        fg.connect(src, 0, c1, 0).unwrap();
        fg.connect(c1, 0, c2, 0).unwrap();
        fg.connect(c2, 0, rec, 0).unwrap();

        run(fg, test_config()).unwrap();
        let seen = tags.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].offset, 7);
        assert_eq!(&*seen[0].key, "burst_start");
    }

    /// Message-only producer: posts a few payloads, then reports done.
    struct Pinger {
        left: u32,
    }

    impl Block for Pinger {
        fn name(&self) -> &str {
            "pinger"
        }
        fn io_signature(&self) -> IoSignature {
            IoSignature::fixed(0, 0, 0, 0)
        }
        fn message_outputs(&self) -> Vec<String> {
            vec!["out".to_string()]
        }
        fn work(
            &mut self,
            _inputs: &mut [InputSpan],
            _outputs: &mut [OutputSpan],
            msgs: &mut MessageHub,
        ) -> WorkResult<WorkReturn> {
            if self.left == 0 {
                return Ok(WorkReturn::Done);
            }
            msgs.post_to("out", Arc::new(self.left));
            self.left -= 1;
            Ok(WorkReturn::Produced(0))
        }
    }

    /// Message-only consumer recording received payloads.
    struct Recorder {
        heard: Arc<Mutex<Vec<u32>>>,
    }

    impl Block for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }
        fn io_signature(&self) -> IoSignature {
            IoSignature::fixed(0, 0, 0, 0)
        }
        fn message_inputs(&self) -> Vec<String> {
            vec!["in".to_string()]
        }
        fn handle_message(&mut self, _port: usize, msg: crate::runtime::MessagePayload) {
            if let Ok(v) = msg.downcast::<u32>() {
                if let Ok(mut heard) = self.heard.lock() {
                    heard.push(*v);
                }
            }
        }
        fn work(
            &mut self,
            _inputs: &mut [InputSpan],
            _outputs: &mut [OutputSpan],
            _msgs: &mut MessageHub,
        ) -> WorkResult<WorkReturn> {
            Ok(WorkReturn::Produced(0))
        }
    }

    #[test]
    fn test_message_pipeline_delivers_in_order() {
        let mut fg = FlowGraph::new();
        let heard = Arc::new(Mutex::new(Vec::new()));

        let ping = fg.add_block("ping", Pinger { left: 5 }).unwrap();
        let rec = fg
            .add_block(
                "rec",
                Recorder {
                    heard: Arc::clone(&heard),
                },
            )
            .unwrap();
        fg.connect_message(ping, "out", rec, "in").unwrap();

        run(fg, test_config()).unwrap();
        assert_eq!(*heard.lock().unwrap(), vec![5, 4, 3, 2, 1]);
    }

    #[test]
    fn test_external_stop_winds_down() {
        let mut fg = FlowGraph::new();
        let data: Vec<u32> = (0..100).collect();
        let src = fg
            .add_block("src", VectorSource::repeating(data))
            .unwrap();
        let snk = fg.add_block("sink", crate::blocks::NullSink::new(4)).unwrap();
        fg.connect(src, 0, snk, 0).unwrap();

        let sched = Scheduler::start(fg, test_config()).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        sched.stop();
        let metrics = sched.wait().unwrap();
        assert!(metrics["src"].total_items > 0);
    }
}
