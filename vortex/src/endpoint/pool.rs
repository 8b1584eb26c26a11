//! Resizable pool of named worker threads fed by a crossbeam channel.

use std::thread::{ self, JoinHandle };

use crossbeam::channel::{ self, Receiver, Sender };
use tracing::{ debug, trace };

use crate::error::{ Result, VortexError };

type Job = Box<dyn FnOnce() + Send + 'static>;

enum Message {
    Run(Job),
    Terminate,
}

struct PoolInner {
    sender: Sender<Message>,
    receiver: Receiver<Message>,
    workers: Vec<JoinHandle<()>>,
    size: usize,
}

/// Fixed-size pool whose size can be changed in place, keeping warm
/// threads when it grows or shrinks.
pub struct WorkerPool {
    name: String,
    next_worker: usize,
    inner: Option<PoolInner>,
}

impl WorkerPool {
    /// Pool threads are created lazily by the first `resize`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            next_worker: 0,
            inner: None,
        }
    }

    pub fn size(&self) -> usize {
        self.inner.as_ref().map_or(0, |inner| inner.size)
    }

    pub fn is_running(&self) -> bool {
        self.inner.is_some()
    }

    /// Grow or shrink to `size` threads. Zero shuts the pool down.
    pub fn resize(&mut self, size: usize) -> Result<()> {
        if size == 0 {
            self.shutdown();
            return Ok(());
        }

        if self.inner.is_none() {
            let (sender, receiver) = channel::unbounded();
            self.inner = Some(PoolInner {
                sender,
                receiver,
                workers: Vec::new(),
                size: 0,
            });
        }

        let current = self.size();
        if size > current {
            for _ in current..size {
                self.spawn_worker()?;
            }
        } else if let Some(inner) = self.inner.as_mut() {
            for _ in size..current {
                // Idle workers pick these up before any job submitted afterwards
                inner.sender
                    .send(Message::Terminate)
                    .map_err(|_| VortexError::illegal_state("Worker pool channel closed"))?;
            }
            inner.size = size;
            inner.workers.retain(|worker| !worker.is_finished());
        }

        debug!(pool = %self.name, from = current, to = size, "Resized worker pool");
        Ok(())
    }

    fn spawn_worker(&mut self) -> Result<()> {
        let id = self.next_worker;
        let name = format!("{}-{}", self.name, id);
        let Some(inner) = self.inner.as_mut() else {
            return Err(VortexError::illegal_state("Worker pool is not running"));
        };

        let receiver = inner.receiver.clone();
        let handle = thread::Builder
            ::new()
            .name(name)
            .spawn(move || {
                for message in receiver.iter() {
                    match message {
                        Message::Run(job) => job(),
                        Message::Terminate => {
                            break;
                        }
                    }
                }
                trace!("Worker exiting");
            })
            .map_err(|e| VortexError::illegal_state(format!("Failed to spawn worker: {e}")))?;

        inner.workers.push(handle);
        inner.size += 1;
        self.next_worker += 1;
        Ok(())
    }

    pub fn execute(&self, job: impl FnOnce() + Send + 'static) -> Result<()> {
        let Some(inner) = self.inner.as_ref() else {
            return Err(VortexError::illegal_state("Worker pool is not running"));
        };
        inner.sender
            .send(Message::Run(Box::new(job)))
            .map_err(|_| VortexError::illegal_state("Worker pool channel closed"))
    }

    /// Stop every worker once it finishes its current job.
    ///
    /// Joins workers that have already exited; busy ones are detached.
    /// A later `resize` creates a new pool.
    pub fn shutdown(&mut self) {
        let Some(inner) = self.inner.take() else {
            return;
        };
        for _ in 0..inner.size {
            let _ = inner.sender.send(Message::Terminate);
        }
        for worker in inner.workers {
            if worker.is_finished() {
                let _ = worker.join();
            }
        }
        debug!(pool = %self.name, "Worker pool shut down");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
