//! Single-thread executor for automation calls
//!
//! Some platform automation APIs require every call to come from the one
//! thread that initialized them. [`AutomationWorker::spawn`] starts that thread,
//! builds the backend on it, and serves requests from a queue. Callers await a
//! oneshot reply under a hard timeout, so a hung call stalls the thread but
//! never the scheduler.

use std::thread;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::WorkerError;

const QUEUE_DEPTH: usize = 16;

/// Backend that must run on a single dedicated thread
pub trait AutomationBackend {
    type Request: Send + 'static;
    type Response: Send + 'static;

    fn handle(&mut self, request: Self::Request) -> Result<Self::Response, String>;
}

struct Job<Req, Resp> {
    request: Req,
    reply: oneshot::Sender<Result<Resp, String>>,
}

/// Cloneable sender side of the automation thread. The thread exits once
/// every handle is dropped.
pub struct AutomationWorker<Req, Resp> {
    jobs: mpsc::Sender<Job<Req, Resp>>,
    call_timeout: Duration,
}

impl<Req, Resp> Clone for AutomationWorker<Req, Resp> {
    fn clone(&self) -> Self {
        Self {
            jobs: self.jobs.clone(),
            call_timeout: self.call_timeout,
        }
    }
}

impl<Req, Resp> AutomationWorker<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    /// Start the thread. `factory` runs on the new thread, so the backend
    /// itself need not be `Send`.
    pub fn spawn<B, F>(name: &str, call_timeout: Duration, factory: F) -> Result<Self, WorkerError>
    where
        B: AutomationBackend<Request = Req, Response = Resp>,
        F: FnOnce() -> B + Send + 'static,
    {
        let (jobs, mut queue) = mpsc::channel::<Job<Req, Resp>>(QUEUE_DEPTH);
        let thread_name = name.to_string();

        thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                let mut backend = factory();
                debug!("Automation thread {} ready", thread_name);

                while let Some(job) = queue.blocking_recv() {
                    let result = backend.handle(job.request);
                    // Caller may have timed out and dropped the receiver
                    let _ = job.reply.send(result);
                }

                debug!("Automation thread {} exiting", thread_name);
            })?;

        Ok(Self { jobs, call_timeout })
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Run one request on the automation thread
    pub async fn call(&self, request: Req) -> Result<Resp, WorkerError> {
        let (reply, response) = oneshot::channel();

        let round_trip = async {
            self.jobs
                .send(Job { request, reply })
                .await
                .map_err(|_| WorkerError::AutomationUnavailable)?;
            response.await.map_err(|_| WorkerError::AutomationUnavailable)
        };

        match tokio::time::timeout(self.call_timeout, round_trip).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(message))) => Err(WorkerError::Automation(message)),
            Ok(Err(e)) => Err(e),
            Err(_) => {
                warn!("Automation call exceeded {:?}", self.call_timeout);
                Err(WorkerError::Timeout {
                    operation: "automation call",
                    limit: self.call_timeout,
                })
            }
        }
    }
}
