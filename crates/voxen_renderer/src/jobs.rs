//! Counting barrier between the render manager and its workers.
//!
//! The manager publishes a frame of `num_jobs` tiles and blocks until all
//! of them are reported done. Workers block in [`JobQueue::next_job`] until a
//! frame is published, then pull ids until the frame runs out.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// What every tile of the current frame should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Pass {
    /// One quick-traced ray per pixel. The first pass after a refresh only
    /// traces every other pixel.
    Preview { first: bool },
    /// `samples` path-traced rays per pixel, accumulated into the running
    /// mean. Pixels are tone mapped only if `finalize` is set.
    PathTrace { samples: u32, finalize: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Job {
    pub id: usize,
    pub pass: Pass,
}

#[derive(Debug)]
struct Frame {
    num_jobs: usize,
    next_job: usize,
    finished: usize,
    pass: Pass,
    shutdown: bool,
}

#[derive(Debug)]
pub(crate) struct JobQueue {
    frame: Mutex<Frame>,
    job_ready: Condvar,
    frame_done: Condvar,
}

impl JobQueue {
    pub fn new() -> Self {
        Self {
            frame: Mutex::new(Frame {
                num_jobs: 0,
                next_job: 0,
                finished: 0,
                pass: Pass::Preview { first: true },
                shutdown: false,
            }),
            job_ready: Condvar::new(),
            frame_done: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Frame> {
        self.frame.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a new frame and wake every worker.
    pub fn publish(&self, num_jobs: usize, pass: Pass) {
        let mut frame = self.lock();
        frame.num_jobs = num_jobs;
        frame.next_job = 0;
        frame.finished = 0;
        frame.pass = pass;
        self.job_ready.notify_all();
    }

    /// Block until every job of the current frame is done.
    ///
    /// Returns `false` if the queue was shut down first.
    pub fn wait_done(&self) -> bool {
        let mut frame = self.lock();
        while frame.finished < frame.num_jobs && !frame.shutdown {
            frame = self.frame_done.wait(frame).unwrap_or_else(PoisonError::into_inner);
        }
        frame.finished >= frame.num_jobs
    }

    /// Claim the next job, blocking while the current frame has none left.
    ///
    /// Returns `None` once the queue is shut down.
    pub fn next_job(&self) -> Option<Job> {
        let mut frame = self.lock();
        loop {
            if frame.shutdown {
                return None;
            }
            if frame.next_job < frame.num_jobs {
                let id = frame.next_job;
                frame.next_job += 1;
                return Some(Job { id, pass: frame.pass });
            }
            frame = self.job_ready.wait(frame).unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub fn job_done(&self) {
        let mut frame = self.lock();
        frame.finished += 1;
        if frame.finished >= frame.num_jobs {
            self.frame_done.notify_all();
        }
    }

    /// Release every blocked worker and manager.
    pub fn shutdown(&self) {
        let mut frame = self.lock();
        frame.shutdown = true;
        self.job_ready.notify_all();
        self.frame_done.notify_all();
    }
}
