//! Background frame worker
//!
//! Runs inference plus the pipeline on a dedicated thread so the caller's
//! capture loop never waits on the model. Frames are processed strictly in
//! submission order; each result is delivered either to a [`FrameTicket`] or
//! to a completion callback.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use tracing::{debug, info, warn};

use crate::backend::{InferenceBackend, ModelInput};
use crate::error::{PipelineError, Result};
use crate::pipeline::{FrameOutput, Pipeline};
use crate::types::ScalingContext;

/// How the submission queue behaves once it is full
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueuePolicy {
    /// Never full; memory grows with the backlog
    Unbounded,
    /// `submit` blocks until a slot frees up
    Block { capacity: usize },
    /// `submit` fails with [`PipelineError::QueueFull`] and the frame is dropped
    DropNewest { capacity: usize },
}

impl Default for QueuePolicy {
    fn default() -> Self {
        QueuePolicy::Block { capacity: 2 }
    }
}

/// One frame of work
#[derive(Debug, Clone)]
pub struct FrameRequest {
    pub input: ModelInput,
    pub context: ScalingContext,
    /// `None` stamps the frame when it is encoded
    pub timestamp_ms: Option<i64>,
}

type Completion = Box<dyn FnOnce(Result<FrameOutput>) + Send>;

struct Job {
    request: FrameRequest,
    done: Completion,
}

/// Pending result of a submitted frame
#[derive(Debug)]
pub struct FrameTicket {
    rx: Receiver<Result<FrameOutput>>,
}

impl FrameTicket {
    /// Block until the worker has processed the frame
    pub fn wait(self) -> Result<FrameOutput> {
        self.rx.recv().map_err(|_| PipelineError::WorkerStopped)?
    }
}

pub struct FrameWorker {
    tx: Option<Sender<Job>>,
    handle: Option<JoinHandle<()>>,
    policy: QueuePolicy,
}

impl std::fmt::Debug for FrameWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameWorker")
            .field("policy", &self.policy)
            .field("running", &self.handle.is_some())
            .finish()
    }
}

impl FrameWorker {
    /// Start the worker thread. The backend moves onto that thread.
    pub fn spawn<B>(pipeline: Arc<Pipeline>, backend: B, policy: QueuePolicy) -> Result<Self>
    where
        B: InferenceBackend + 'static,
    {
        let (tx, rx) = match policy {
            QueuePolicy::Unbounded => unbounded(),
            QueuePolicy::Block { capacity } | QueuePolicy::DropNewest { capacity } => {
                bounded(capacity.max(1))
            }
        };

        let handle = thread::Builder::new()
            .name("segwire-worker".to_string())
            .spawn(move || run(pipeline, backend, rx))?;

        info!(?policy, "frame worker started");
        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
            policy,
        })
    }

    pub fn policy(&self) -> QueuePolicy {
        self.policy
    }

    /// Queue a frame and get a ticket for its result
    pub fn submit(&self, request: FrameRequest) -> Result<FrameTicket> {
        let (result_tx, rx) = bounded(1);
        self.enqueue(
            request,
            Box::new(move |result| {
                let _ = result_tx.send(result);
            }),
        )?;
        Ok(FrameTicket { rx })
    }

    /// Queue a frame; `callback` runs on the worker thread with its result
    pub fn submit_with<F>(&self, request: FrameRequest, callback: F) -> Result<()>
    where
        F: FnOnce(Result<FrameOutput>) + Send + 'static,
    {
        self.enqueue(request, Box::new(callback))
    }

    fn enqueue(&self, request: FrameRequest, done: Completion) -> Result<()> {
        let tx = self.tx.as_ref().ok_or(PipelineError::WorkerStopped)?;
        let job = Job { request, done };

        match self.policy {
            QueuePolicy::DropNewest { .. } => match tx.try_send(job) {
                Ok(()) => Ok(()),
                Err(TrySendError::Full(_)) => {
                    debug!("queue full, dropping frame");
                    Err(PipelineError::QueueFull)
                }
                Err(TrySendError::Disconnected(_)) => Err(PipelineError::WorkerStopped),
            },
            _ => tx.send(job).map_err(|_| PipelineError::WorkerStopped),
        }
    }

    /// Stop accepting frames, finish the queued ones and join the thread
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        drop(self.tx.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("frame worker panicked");
            }
        }
    }
}

impl Drop for FrameWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run<B: InferenceBackend>(pipeline: Arc<Pipeline>, mut backend: B, rx: Receiver<Job>) {
    let mut frames = 0u64;
    for job in rx {
        let Job { request, done } = job;
        done(process_one(&pipeline, &mut backend, &request));
        frames += 1;
    }
    info!(frames, "frame worker stopped");
}

fn process_one<B: InferenceBackend>(
    pipeline: &Pipeline,
    backend: &mut B,
    request: &FrameRequest,
) -> Result<FrameOutput> {
    let start = Instant::now();
    let outputs = backend.infer(&request.input)?;
    let inference_us = start.elapsed().as_micros() as u64;

    let mut output = pipeline.process(&outputs, &request.context, request.timestamp_ms)?;
    output.stats.inference_us = inference_us;
    output.stats.total_us += inference_us;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::raw::{RawOutputs, RawTensor};
    use std::sync::Mutex;

    /// Emits one box whose class id is the frame number
    struct CountingBackend {
        frame: i64,
    }

    impl InferenceBackend for CountingBackend {
        fn infer(&mut self, _input: &ModelInput) -> Result<RawOutputs<'static>> {
            let id = self.frame;
            self.frame += 1;
            Ok(RawOutputs::new(vec![
                RawTensor::from_i64("labels", vec![1, 1], &[id]),
                RawTensor::from_f32("dets", vec![1, 1, 5], &[0.0, 0.0, 10.0, 10.0, 0.9]),
            ]))
        }
    }

    struct FailingBackend;

    impl InferenceBackend for FailingBackend {
        fn infer(&mut self, _input: &ModelInput) -> Result<RawOutputs<'static>> {
            Err(PipelineError::Backend("device lost".into()))
        }
    }

    fn pipeline() -> Arc<Pipeline> {
        let config = PipelineConfig {
            masks_enabled: false,
            ..Default::default()
        };
        Arc::new(Pipeline::new(config).unwrap())
    }

    fn request(ts: i64) -> FrameRequest {
        FrameRequest {
            input: ModelInput::zeros(4),
            context: ScalingContext::new(640, 640),
            timestamp_ms: Some(ts),
        }
    }

    #[test]
    fn test_default_policy() {
        assert_eq!(QueuePolicy::default(), QueuePolicy::Block { capacity: 2 });
    }

    #[test]
    fn test_results_in_submission_order() {
        let worker =
            FrameWorker::spawn(pipeline(), CountingBackend { frame: 0 }, QueuePolicy::Unbounded)
                .unwrap();
        let tickets: Vec<FrameTicket> = (0..5).map(|i| worker.submit(request(i)).unwrap()).collect();

        for (i, ticket) in tickets.into_iter().enumerate() {
            let out = ticket.wait().unwrap();
            assert_eq!(out.wire.class_indices, vec![i as i32]);
            assert_eq!(out.wire.timestamp_ms, i as i64);
        }
        worker.shutdown();
    }

    #[test]
    fn test_callback_delivery_and_shutdown_drains() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let worker = FrameWorker::spawn(
            pipeline(),
            CountingBackend { frame: 0 },
            QueuePolicy::Block { capacity: 1 },
        )
        .unwrap();

        for i in 0..4 {
            let seen = Arc::clone(&seen);
            worker
                .submit_with(request(i), move |result| {
                    seen.lock().unwrap().push(result.unwrap().wire.timestamp_ms);
                })
                .unwrap();
        }
        worker.shutdown();

        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_backend_error_reaches_ticket() {
        let worker = FrameWorker::spawn(pipeline(), FailingBackend, QueuePolicy::default()).unwrap();
        let err = worker.submit(request(0)).unwrap().wait().unwrap_err();
        assert!(matches!(err, PipelineError::Backend(_)));
    }

    #[test]
    fn test_drop_newest_rejects_when_full() {
        let (gate_tx, gate_rx) = bounded::<()>(0);
        let worker = FrameWorker::spawn(
            pipeline(),
            CountingBackend { frame: 0 },
            QueuePolicy::DropNewest { capacity: 1 },
        )
        .unwrap();

        // First job blocks the worker until the gate opens
        worker
            .submit_with(request(0), move |_| {
                let _ = gate_rx.recv();
            })
            .unwrap();

        // Keep filling until the single slot is taken and a submit bounces
        let mut rejected = false;
        for i in 1..50 {
            match worker.submit_with(request(i), |_| {}) {
                Err(PipelineError::QueueFull) => {
                    rejected = true;
                    break;
                }
                Ok(()) => continue,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert!(rejected);

        drop(gate_tx);
        worker.shutdown();
    }
}
