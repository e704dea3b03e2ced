//! Inference thread
//!
//! Models are loaded and run on a dedicated OS thread. Requests travel over a
//! bounded crossbeam channel, each with a oneshot reply the caller awaits.
//! If the caller stops waiting (an abandoned tick), the result is dropped on
//! the floor when the thread tries to reply.

use crossbeam_channel::{Sender, TrySendError};
use tokio::sync::oneshot;

use super::DetectorError;

type Reply<O> = oneshot::Sender<Result<O, DetectorError>>;

/// Handle to a model running on its own thread
pub struct InferenceWorker<I, O> {
    name: String,
    job_sender: Option<Sender<(I, Reply<O>)>>,
    thread_handle: Option<std::thread::JoinHandle<()>>,
}

impl<I: Send + 'static, O: Send + 'static> InferenceWorker<I, O> {
    /// Start a thread that builds its model with `load` and then answers
    /// requests with `run`. Resolves once the model is loaded.
    pub async fn spawn<M, L, R>(name: &str, load: L, mut run: R) -> Result<Self, DetectorError>
    where
        M: 'static,
        L: FnOnce() -> Result<M, DetectorError> + Send + 'static,
        R: FnMut(&mut M, I) -> Result<O, DetectorError> + Send + 'static,
    {
        let (job_sender, job_receiver) = crossbeam_channel::bounded::<(I, Reply<O>)>(1);
        let (ready_tx, ready_rx) = oneshot::channel();
        let thread_name = name.to_string();

        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let mut model = match load() {
                    Ok(model) => {
                        let _ = ready_tx.send(Ok(()));
                        model
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                tracing::info!("{} thread started", thread_name);

                while let Ok((input, reply)) = job_receiver.recv() {
                    let result = run(&mut model, input);
                    if reply.send(result).is_err() {
                        tracing::trace!("{}: result abandoned", thread_name);
                    }
                }

                tracing::info!("{} thread stopped", thread_name);
            })
            .map_err(|e| DetectorError::ModelLoad(format!("Failed to spawn {} thread: {}", name, e)))?;

        let ready = ready_rx.await.unwrap_or(Err(DetectorError::WorkerStopped));
        if let Err(e) = ready {
            let _ = handle.join();
            return Err(e);
        }

        Ok(Self {
            name: name.to_string(),
            job_sender: Some(job_sender),
            thread_handle: Some(handle),
        })
    }

    /// Run one request. Fails with `Busy` instead of queueing behind an
    /// abandoned request that is still being processed.
    pub async fn submit(&self, input: I) -> Result<O, DetectorError> {
        let sender = self.job_sender.as_ref().ok_or(DetectorError::NotRunning)?;
        let (reply_tx, reply_rx) = oneshot::channel();

        sender.try_send((input, reply_tx)).map_err(|e| match e {
            TrySendError::Full(_) => DetectorError::Busy,
            TrySendError::Disconnected(_) => DetectorError::WorkerStopped,
        })?;

        reply_rx.await.map_err(|_| DetectorError::WorkerStopped)?
    }

    pub fn is_running(&self) -> bool {
        self.job_sender.is_some()
    }

    /// Stop the thread after its current request
    pub fn stop(&mut self) {
        // Dropping the sender ends the thread's receive loop
        self.job_sender = None;

        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                tracing::warn!("{} thread panicked", self.name);
            }
        }
    }
}

impl<I, O> Drop for InferenceWorker<I, O> {
    fn drop(&mut self) {
        self.job_sender = None;
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}
