//! A wrapper that coalesces concurrent evaluation requests into batches.
//!
//! Per-call overhead (array-backend launches, session locking) is amortized
//! by funneling every request through a single collector thread that owns
//! the inner model. A batch is flushed to the inner model when either
//! `max_batchsize` requests have queued or `max_wait` has elapsed since the
//! first queued request. Results are answered strictly in enqueue order.

use std::marker::PhantomData;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::sync::Mutex;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use game_core::Game;
use tracing::{debug, trace};

use crate::error::ModelError;
use crate::model::{Backend, Evaluation, FeatureDescriptor, Model};

struct Request<G> {
    game: G,
    slot: SyncSender<Result<Evaluation, ModelError>>,
}

/// Batching decorator over an inner model.
///
/// `evaluate` blocks the calling thread until the collector has flushed the
/// batch containing its request. A caller that gives up simply drops its
/// receiving end; the collector computes the result anyway (cheap, it is
/// part of the batch) and discards it. When the inner model fails, the
/// error is replicated to every request of that batch and the collector
/// keeps serving subsequent batches.
///
/// `ntasks()` advertises `max_batchsize` so the search keeps that many
/// traversals in flight.
pub struct BatchedModel<G: Game, M: Model<G> + 'static> {
    queue: Mutex<Option<mpsc::Sender<Request<G>>>>,
    collector: Option<JoinHandle<()>>,
    max_batchsize: usize,
    features: Vec<FeatureDescriptor>,
    backend: Backend,
    _inner: PhantomData<fn() -> M>,
}

impl<G: Game, M: Model<G> + 'static> BatchedModel<G, M> {
    pub fn new(inner: M, max_batchsize: usize, max_wait: Duration) -> Self {
        let max_batchsize = max_batchsize.max(1);
        let features = inner.features();
        let backend = inner.backend();

        let (tx, rx) = mpsc::channel();
        let collector = thread::spawn(move || collect(inner, rx, max_batchsize, max_wait));

        Self {
            queue: Mutex::new(Some(tx)),
            collector: Some(collector),
            max_batchsize,
            features,
            backend,
            _inner: PhantomData,
        }
    }

    fn enqueue(&self, game: &G) -> Result<Receiver<Result<Evaluation, ModelError>>, ModelError> {
        let (slot, result) = mpsc::sync_channel(1);
        let request = Request {
            game: game.clone(),
            slot,
        };

        let queue = self
            .queue
            .lock()
            .map_err(|_| ModelError::Evaluation("batch queue poisoned".into()))?;
        queue
            .as_ref()
            .ok_or(ModelError::Cancelled)?
            .send(request)
            .map_err(|_| ModelError::Cancelled)?;
        Ok(result)
    }
}

impl<G: Game, M: Model<G> + 'static> Model<G> for BatchedModel<G, M> {
    fn evaluate(&self, game: &G) -> Result<Evaluation, ModelError> {
        let result = self.enqueue(game)?;
        result.recv().map_err(|_| ModelError::Cancelled)?
    }

    /// Enqueue every position first, then collect in order. Up to
    /// `max_batchsize` positions end up in a single inner call.
    fn evaluate_batch(&self, games: &[G]) -> Result<Vec<Evaluation>, ModelError> {
        let slots = games
            .iter()
            .map(|game| self.enqueue(game))
            .collect::<Result<Vec<_>, _>>()?;

        let mut evals = Vec::with_capacity(slots.len());
        for slot in slots {
            evals.push(slot.recv().map_err(|_| ModelError::Cancelled)??);
        }
        Ok(evals)
    }

    fn ntasks(&self) -> usize {
        self.max_batchsize
    }

    fn features(&self) -> Vec<FeatureDescriptor> {
        self.features.clone()
    }

    fn backend(&self) -> Backend {
        self.backend
    }
}

impl<G: Game, M: Model<G> + 'static> Drop for BatchedModel<G, M> {
    fn drop(&mut self) {
        // Closing the queue lets the collector drain and exit.
        if let Ok(mut queue) = self.queue.lock() {
            queue.take();
        }
        if let Some(collector) = self.collector.take() {
            let _ = collector.join();
        }
    }
}

/// Collector loop: one batch per iteration, until the queue closes.
fn collect<G: Game, M: Model<G>>(
    inner: M,
    queue: Receiver<Request<G>>,
    max_batchsize: usize,
    max_wait: Duration,
) {
    loop {
        // Block until a batch opens.
        let first = match queue.recv() {
            Ok(request) => request,
            Err(_) => return,
        };

        let mut batch = vec![first];
        let deadline = Instant::now() + max_wait;

        while batch.len() < max_batchsize {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            match queue.recv_timeout(deadline - now) {
                Ok(request) => batch.push(request),
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        trace!(size = batch.len(), "flushing evaluation batch");
        let games: Vec<G> = batch.iter().map(|request| request.game.clone()).collect();

        match inner.evaluate_batch(&games) {
            Ok(evals) => {
                for (request, eval) in batch.into_iter().zip(evals) {
                    // A closed slot means the caller cancelled; drop the result.
                    let _ = request.slot.send(Ok(eval));
                }
            }
            Err(err) => {
                debug!(error = %err, "batched evaluation failed; replicating to all slots");
                for request in batch {
                    let _ = request.slot.send(Err(err.clone()));
                }
            }
        }
    }
}
