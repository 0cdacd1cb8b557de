use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Counters shared by the two pumps of one session.
#[derive(Debug, Default)]
pub(crate) struct SessionCounters {
    audio_frames_appended: AtomicU64,
    audio_chunks_delivered: AtomicU64,
    transcripts_delivered: AtomicU64,
}

impl SessionCounters {
    pub(crate) fn frame_appended(&self) {
        self.audio_frames_appended.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn audio_delivered(&self) {
        self.audio_chunks_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn transcript_delivered(&self) {
        self.transcripts_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, duration: Duration) -> SessionStats {
        SessionStats {
            audio_frames_appended: self.audio_frames_appended.load(Ordering::Relaxed),
            audio_chunks_delivered: self.audio_chunks_delivered.load(Ordering::Relaxed),
            transcripts_delivered: self.transcripts_delivered.load(Ordering::Relaxed),
            duration,
        }
    }
}

/// Statistics about a finished relay session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Client audio frames sent upstream as `input_audio_buffer.append`.
    pub audio_frames_appended: u64,

    /// Decoded audio chunks written to the client.
    pub audio_chunks_delivered: u64,

    /// Completed transcripts written to the client.
    pub transcripts_delivered: u64,

    /// Wall time from upstream open to teardown.
    pub duration: Duration,
}
