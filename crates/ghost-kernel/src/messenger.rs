//! Messenger — queues between shells and the ghost
//!
//! Inputs travel through an unbounded mpsc channel so the synchronous kernel
//! can enqueue follow-up inputs without a runtime. Async outputs fan out to
//! every subscribed shell through a broadcast channel.

use crate::ghost::Ghost;
use dashmap::DashMap;
use ghost_core::{Error, Input, Output, Result};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

const OUTPUT_CAPACITY: usize = 256;
const ACK_CAPACITY: usize = 1024;

pub struct MessageQueue {
    input_tx: mpsc::UnboundedSender<Input>,
    input_rx: Mutex<mpsc::UnboundedReceiver<Input>>,
    output_tx: broadcast::Sender<Output>,
    /// mid -> whether the input was handled successfully
    acks: DashMap<String, bool>,
    /// Ack insertion order; the oldest unread acks are evicted past capacity.
    ack_order: std::sync::Mutex<VecDeque<String>>,
    ack_capacity: usize,
}

impl Default for MessageQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageQueue {
    pub fn new() -> Self {
        Self::with_ack_capacity(ACK_CAPACITY)
    }

    /// Queue keeping at most `capacity` unread acknowledgements.
    pub fn with_ack_capacity(capacity: usize) -> Self {
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (output_tx, _) = broadcast::channel(OUTPUT_CAPACITY);
        Self {
            input_tx,
            input_rx: Mutex::new(input_rx),
            output_tx,
            acks: DashMap::new(),
            ack_order: std::sync::Mutex::new(VecDeque::new()),
            ack_capacity: capacity.max(1),
        }
    }

    pub fn push_input(&self, input: Input) -> Result<()> {
        debug!(mid = %input.mid, pid = %input.trace.process_id(), "input queued");
        self.input_tx
            .send(input)
            .map_err(|_| Error::unexpected("input queue closed"))
    }

    /// Wait for the next input.
    pub async fn pop_input(&self) -> Option<Input> {
        self.input_rx.lock().await.recv().await
    }

    /// Next input if one is ready and no other consumer holds the queue.
    pub fn try_pop_input(&self) -> Option<Input> {
        self.input_rx.try_lock().ok()?.try_recv().ok()
    }

    /// Broadcast an output. Returns how many subscribers received it.
    pub fn push_output(&self, output: Output) -> usize {
        self.output_tx.send(output).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Output> {
        self.output_tx.subscribe()
    }

    pub fn ack(&self, mid: &str, success: bool) {
        let mut order = self.ack_order.lock().unwrap_or_else(|e| e.into_inner());
        if self.acks.insert(mid.to_string(), success).is_none() {
            order.push_back(mid.to_string());
        }
        while order.len() > self.ack_capacity {
            if let Some(oldest) = order.pop_front() {
                self.acks.remove(&oldest);
            }
        }
    }

    /// Acknowledgement of `mid`, consumed on read.
    pub fn take_ack(&self, mid: &str) -> Option<bool> {
        let mut order = self.ack_order.lock().unwrap_or_else(|e| e.into_inner());
        let ack = self.acks.remove(mid).map(|(_, ok)| ok);
        if ack.is_some() {
            order.retain(|m| m != mid);
        }
        ack
    }

    /// Acknowledgements recorded and not yet taken.
    pub fn pending_acks(&self) -> usize {
        self.acks.len()
    }
}

fn succeeded(outputs: &[Output]) -> bool {
    outputs.iter().all(|o| o.error().is_none())
}

/// Runs turns inline for the caller. Outputs flagged async go to the queue.
pub struct SyncMessenger {
    ghost: Arc<Ghost>,
}

impl SyncMessenger {
    pub fn new(ghost: Arc<Ghost>) -> Self {
        Self { ghost }
    }

    pub fn queue(&self) -> &Arc<MessageQueue> {
        self.ghost.queue()
    }

    /// Respond to `input`; returns the synchronous outputs.
    pub fn send(&self, input: Input) -> Vec<Output> {
        let mid = input.mid.clone();
        let outputs = self.ghost.respond(input);
        let queue = self.ghost.queue();
        queue.ack(&mid, succeeded(&outputs));
        let (async_outputs, sync_outputs): (Vec<Output>, Vec<Output>) =
            outputs.into_iter().partition(|o| o.is_async);
        for output in async_outputs {
            queue.push_output(output);
        }
        sync_outputs
    }

    /// Run queued inputs until the queue is empty; returns everything they produced.
    pub fn drain(&self) -> Vec<Output> {
        let mut outputs = Vec::new();
        while let Some(input) = self.queue().try_pop_input() {
            let mid = input.mid.clone();
            let produced = self.ghost.respond(input);
            self.queue().ack(&mid, succeeded(&produced));
            outputs.extend(produced);
        }
        outputs
    }
}

/// Worker that consumes the input queue and broadcasts every output.
pub struct AsyncMessenger {
    ghost: Arc<Ghost>,
    cancel: CancellationToken,
}

impl AsyncMessenger {
    pub fn new(ghost: Arc<Ghost>) -> Self {
        Self {
            ghost,
            cancel: CancellationToken::new(),
        }
    }

    pub fn queue(&self) -> &Arc<MessageQueue> {
        self.ghost.queue()
    }

    /// Token that stops the worker loop when cancelled.
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    pub async fn run(&self) {
        info!("async messenger started");
        loop {
            let input = tokio::select! {
                _ = self.cancel.cancelled() => break,
                input = self.queue().pop_input() => match input {
                    Some(input) => input,
                    None => break,
                },
            };
            let mid = input.mid.clone();
            let ghost = self.ghost.clone();
            // kernel turns are synchronous and may block in stage code
            match tokio::task::spawn_blocking(move || ghost.respond(input)).await {
                Ok(outputs) => {
                    self.queue().ack(&mid, succeeded(&outputs));
                    for output in outputs {
                        self.queue().push_output(output);
                    }
                }
                Err(e) => {
                    error!(mid = %mid, error = %e, "turn panicked");
                    self.queue().ack(&mid, false);
                }
            }
        }
        info!("async messenger stopped");
    }
}
