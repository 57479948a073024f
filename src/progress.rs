use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Stage of a batch job reported to the progress callback.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Phase {
    OpeningFile,
    ReadingFile,
    RawParsing,
    CreatingBook,
    Finished,
}

/// A progress report.
///
/// `done` and `total` count chunks of the file being parsed. File fields
/// are `0`, `1` and `None` for jobs that are not driven by
/// [`extract_move_lists()`](crate::batch::extract_move_lists).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProgressEvent {
    pub phase: Phase,
    pub file_index: usize,
    pub file_count: usize,
    pub file_name: Option<String>,
    pub done: u64,
    pub total: u64,
}

impl ProgressEvent {
    pub fn new(phase: Phase, done: u64, total: u64) -> ProgressEvent {
        ProgressEvent {
            phase,
            file_index: 0,
            file_count: 1,
            file_name: None,
            done,
            total,
        }
    }

    #[must_use]
    pub(crate) fn in_file(mut self, index: usize, count: usize, name: &str) -> ProgressEvent {
        self.file_index = index;
        self.file_count = count;
        self.file_name = Some(name.to_owned());
        self
    }
}

/// Callback receiving progress reports. It may be called from any thread
/// that drives a job.
pub type Progress<'a> = &'a mut dyn FnMut(&ProgressEvent);

/// Reports a chunk index when it changes to a multiple of 100.
#[derive(Debug, Default)]
pub(crate) struct ChunkThrottle {
    last: usize,
}

impl ChunkThrottle {
    pub fn poll(&mut self, chunk: usize) -> bool {
        if chunk == self.last {
            return false;
        }
        self.last = chunk;
        chunk % 100 == 0
    }
}

/// Cooperative cancellation shared by the caller and a running job.
///
/// Jobs poll the token at game boundaries. Games already being resolved
/// are finished.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Clears the flag before reusing the token for another job.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::Relaxed);
    }
}
