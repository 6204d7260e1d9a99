use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::registry::WorkerContext;
use crate::sampler::HttpSampler;
use crate::types::{SampleResult, SamplerError};

/// Fixed polling interval of the checkpoint busy-wait.
pub const CHECKPOINT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Any test element that produces its result synchronously. From the
/// controller's point of view these are synchronization barriers.
pub trait SyncSampler: Send {
    fn label(&self) -> &str;
    fn sample(&mut self, ctx: &mut WorkerContext) -> Option<SampleResult>;
}

/// One child of the controller: an HTTP/2-capable sampler that can run
/// asynchronously, or any other element.
pub enum TestElement {
    Http2(HttpSampler),
    Sync(Box<dyn SyncSampler>),
}

impl TestElement {
    pub fn label(&self) -> &str {
        match self {
            TestElement::Http2(sampler) => sampler.label(),
            TestElement::Sync(sampler) => sampler.label(),
        }
    }

    pub fn run(&mut self, ctx: &mut WorkerContext) -> Option<SampleResult> {
        match self {
            TestElement::Http2(sampler) => sampler.sample(ctx),
            TestElement::Sync(sampler) => sampler.sample(ctx),
        }
    }

    fn is_async_capable(&self) -> bool {
        matches!(self, TestElement::Http2(_))
    }

    fn pending_done(&self) -> bool {
        match self {
            TestElement::Http2(sampler) => sampler.pending_done(),
            TestElement::Sync(_) => true,
        }
    }
}

/// Cooperative interruption of a worker blocked in a checkpoint.
#[derive(Clone)]
pub struct InterruptHandle {
    flag: Arc<AtomicBool>,
}

impl InterruptHandle {
    pub fn interrupt(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_interrupted(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Rewrites a linear child list into "fire async, then checkpoint"
/// execution. HTTP/2-capable children are forced into asynchronous mode
/// and enqueued; any other child, or the end of the list, blocks until the
/// oldest pending child completes and re-inserts it at the current
/// position so its deferred resolve call runs next. The pending queue is
/// strict FIFO: only the head is ever awaited.
pub struct Http2Controller {
    children: Vec<TestElement>,
    /// Working execution order, indices into `children`.
    order: Vec<usize>,
    /// Original order, restored at the start of every pass to undo the
    /// checkpoint substitutions of the previous one.
    backup: Option<Vec<usize>>,
    pending: VecDeque<usize>,
    position: usize,
    poll_interval: Duration,
    interrupt: Arc<AtomicBool>,
}

impl Http2Controller {
    pub fn new(children: Vec<TestElement>) -> Self {
        let order = (0..children.len()).collect();
        Self {
            children,
            order,
            backup: None,
            pending: VecDeque::new(),
            position: 0,
            poll_interval: CHECKPOINT_POLL_INTERVAL,
            interrupt: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn interrupt_handle(&self) -> InterruptHandle {
        InterruptHandle {
            flag: self.interrupt.clone(),
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Next element to run, or `None` when the pass is finished. Called
    /// once per "give me the next element" request.
    pub fn next(&mut self) -> Result<Option<&mut TestElement>, SamplerError> {
        if self.position == 0 {
            self.start_pass();
        }

        if self.order.is_empty() {
            return Ok(None);
        }

        if self.position < self.order.len() {
            let id = self.order[self.position];
            if self.children[id].is_async_capable() {
                if let TestElement::Http2(sampler) = &mut self.children[id] {
                    sampler.set_async_mode(true);
                }
                self.pending.push_back(id);
                self.position += 1;
                return Ok(Some(&mut self.children[id]));
            }
            // Synchronization barrier: drain the oldest pending child
            // first, if any.
            if let Some(resolved) = self.checkpoint()? {
                return Ok(Some(&mut self.children[resolved]));
            }
            self.position += 1;
            return Ok(Some(&mut self.children[id]));
        }

        // End of the list: drain the queue before the pass finishes.
        if let Some(resolved) = self.checkpoint()? {
            return Ok(Some(&mut self.children[resolved]));
        }
        self.position = 0;
        Ok(None)
    }

    /// Run one full pass, collecting the results the elements produce.
    pub fn run_pass(
        &mut self,
        ctx: &mut WorkerContext,
    ) -> Result<Vec<SampleResult>, SamplerError> {
        let mut results = Vec::new();
        loop {
            match self.next()? {
                Some(element) => {
                    if let Some(result) = element.run(ctx) {
                        results.push(result);
                    }
                }
                None => break,
            }
        }
        Ok(results)
    }

    fn start_pass(&mut self) {
        match &self.backup {
            Some(backup) => self.order = backup.clone(),
            None => self.backup = Some(self.order.clone()),
        }
        for child in &mut self.children {
            if let TestElement::Http2(sampler) = child {
                sampler.iteration_start();
            }
        }
    }

    /// Pop the head of the pending queue and wait until it is done or
    /// cancelled, then substitute it into the working order at the current
    /// position so its resolve call executes next. Returns `None` when the
    /// queue was empty.
    fn checkpoint(&mut self) -> Result<Option<usize>, SamplerError> {
        let head = match self.pending.pop_front() {
            Some(head) => head,
            None => return Ok(None),
        };

        // Check once before any wait so already-finished requests never
        // cost a poll interval.
        while !self.children[head].pending_done() {
            if self.interrupt.load(Ordering::Acquire) {
                debug!("interrupted during checkpoint, clearing pending queue");
                // Terminal for this pass only: consume the interrupt and
                // rewind so the next pass starts clean.
                self.pending.clear();
                self.interrupt.store(false, Ordering::Release);
                self.position = 0;
                return Err(SamplerError::Interrupted);
            }
            std::thread::sleep(self.poll_interval);
        }

        self.order.insert(self.position, head);
        self.position += 1;
        Ok(Some(head))
    }
}
