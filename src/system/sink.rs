// src/system/sink.rs

//! The shared output buffer every captured process and every `print` writes to.
//!
//! A single mutex serializes writers at the granularity of one [`Chunk`]: a chunk is
//! either entirely visible to readers or not at all. Subscribers receive events in the
//! exact order the buffer applied them because events are sent while the lock is held.

use crate::models::{Chunk, OutputStyle};
use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A change applied to the sink, as seen by subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    /// A chunk was added at the end of the buffer.
    Appended(Chunk),
    /// The buffer was emptied.
    Cleared,
}

#[derive(Debug, Default)]
struct SinkState {
    chunks: VecDeque<Chunk>,
    line_count: usize,
    total_written: u64,
    history_size: Option<usize>,
    subscribers: Vec<Sender<SinkEvent>>,
}

impl SinkState {
    fn broadcast(&mut self, event: &SinkEvent) {
        // Receivers that hung up are dropped on the next event.
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Drops whole chunks from the front until the retained line count fits.
    /// The newest chunk is always kept, even when it alone exceeds the limit.
    fn enforce_history(&mut self) {
        let Some(limit) = self.history_size else {
            return;
        };
        while self.line_count > limit && self.chunks.len() > 1 {
            if let Some(dropped) = self.chunks.pop_front() {
                self.line_count = self.line_count.saturating_sub(dropped.line_breaks());
            }
        }
    }
}

/// Append-only text buffer with atomic chunk writes.
#[derive(Debug, Default)]
pub struct OutputSink {
    state: Mutex<SinkState>,
}

impl OutputSink {
    /// Creates an unbounded sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a sink that keeps roughly `history_size` lines. `0` means unbounded.
    pub fn with_history_size(history_size: usize) -> Self {
        let sink = Self::default();
        sink.set_history_size(history_size);
        sink
    }

    fn lock(&self) -> MutexGuard<'_, SinkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Limits the retained output to about `history_size` lines, dropping whole
    /// chunks from the front. `0` keeps everything.
    pub fn set_history_size(&self, history_size: usize) {
        let mut state = self.lock();
        state.history_size = (history_size > 0).then_some(history_size);
        state.enforce_history();
    }

    /// Appends `text` as one atomic chunk.
    pub fn write(&self, text: &str) {
        self.write_styled(text, OutputStyle::Normal);
    }

    /// Appends `text` as one atomic chunk with the given style. Empty writes are ignored.
    pub fn write_styled(&self, text: &str, style: OutputStyle) {
        if text.is_empty() {
            return;
        }
        let chunk = Chunk::new(text, style);
        let mut state = self.lock();
        state.line_count += chunk.line_breaks();
        state.total_written += chunk.text.len() as u64;
        state.chunks.push_back(chunk.clone());
        state.enforce_history();
        state.broadcast(&SinkEvent::Appended(chunk));
    }

    /// Appends raw process output. Bytes that are not valid UTF-8 become `?`.
    pub fn write_bytes(&self, bytes: &[u8], style: OutputStyle) {
        self.write_styled(&sanitize_utf8(bytes), style);
    }

    /// Truncates the buffer to empty.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.chunks.clear();
        state.line_count = 0;
        state.broadcast(&SinkEvent::Cleared);
    }

    /// The retained text, concatenated.
    pub fn contents(&self) -> String {
        let state = self.lock();
        state.chunks.iter().map(|c| c.text.as_str()).collect()
    }

    /// A snapshot of the retained chunks in write order.
    pub fn chunks(&self) -> Vec<Chunk> {
        self.lock().chunks.iter().cloned().collect()
    }

    /// Number of retained chunks.
    pub fn len(&self) -> usize {
        self.lock().chunks.len()
    }

    /// Whether no chunk is retained.
    pub fn is_empty(&self) -> bool {
        self.lock().chunks.is_empty()
    }

    /// Number of line breaks across the retained chunks.
    pub fn line_count(&self) -> usize {
        self.lock().line_count
    }

    /// Bytes written since creation, including chunks later cleared or trimmed.
    pub fn total_written(&self) -> u64 {
        self.lock().total_written
    }

    /// Registers a new event stream. Only events after this call are delivered.
    pub fn subscribe(&self) -> Receiver<SinkEvent> {
        let (tx, rx) = mpsc::channel();
        self.lock().subscribers.push(tx);
        rx
    }

    /// Drops every subscriber sender so their receivers observe the end of the stream.
    pub fn disconnect_subscribers(&self) {
        self.lock().subscribers.clear();
    }
}

/// Lossy UTF-8 decoding that replaces each invalid byte with `?`.
pub fn sanitize_utf8(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        out.push_str(chunk.valid());
        for _ in chunk.invalid() {
            out.push('?');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_write_and_clear() {
        let sink = OutputSink::new();
        sink.write("hello\n");
        sink.write("");
        sink.write("world\n");

        assert_eq!(sink.contents(), "hello\nworld\n");
        assert_eq!(sink.len(), 2);
        assert_eq!(sink.line_count(), 2);

        sink.clear();
        assert!(sink.is_empty());
        assert_eq!(sink.contents(), "");
        assert_eq!(sink.total_written(), 12);
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let sink = OutputSink::new();
        sink.write_bytes(b"ok \xff\xfe done\n", OutputStyle::Bold);

        let chunks = sink.chunks();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "ok ?? done\n");
        assert_eq!(chunks[0].style, OutputStyle::Bold);
    }

    #[test]
    fn test_history_drops_oldest_whole_chunks() {
        // --- Setup ---
        let sink = OutputSink::with_history_size(3);

        // --- Execute ---
        for i in 0..5 {
            sink.write(&format!("line {}\n", i));
        }

        // --- Assert ---
        assert_eq!(sink.contents(), "line 2\nline 3\nline 4\n");
        assert_eq!(sink.line_count(), 3);
    }

    #[test]
    fn test_history_keeps_newest_oversized_chunk() {
        let sink = OutputSink::with_history_size(1);
        sink.write("a\n");
        sink.write("b\nc\nd\n");
        assert_eq!(sink.contents(), "b\nc\nd\n");
    }

    #[test]
    fn test_concurrent_writers_never_split_a_chunk() {
        // --- Setup ---
        let sink = Arc::new(OutputSink::new());
        let writers: Vec<_> = (0..4)
            .map(|w| {
                let sink = Arc::clone(&sink);
                thread::spawn(move || {
                    for i in 0..200 {
                        sink.write(&format!("writer-{}-line-{}\n", w, i));
                    }
                })
            })
            .collect();

        // --- Execute ---
        for writer in writers {
            writer.join().unwrap();
        }

        // --- Assert ---
        let chunks = sink.chunks();
        assert_eq!(chunks.len(), 800);
        for chunk in &chunks {
            assert!(chunk.text.starts_with("writer-"));
            assert!(chunk.text.ends_with('\n'));
            assert_eq!(chunk.line_breaks(), 1);
        }
        for w in 0..4 {
            let prefix = format!("writer-{}-", w);
            let own: Vec<_> = chunks.iter().filter(|c| c.text.starts_with(&prefix)).collect();
            for (i, chunk) in own.iter().enumerate() {
                assert_eq!(chunk.text, format!("writer-{}-line-{}\n", w, i));
            }
        }
    }

    #[test]
    fn test_subscribers_see_events_in_order() {
        let sink = OutputSink::new();
        sink.write("before\n");
        let events = sink.subscribe();

        sink.write("one\n");
        sink.clear();
        sink.write_styled("two\n", OutputStyle::Bold);
        sink.disconnect_subscribers();

        let received: Vec<_> = events.iter().collect();
        assert_eq!(
            received,
            vec![
                SinkEvent::Appended(Chunk::new("one\n", OutputStyle::Normal)),
                SinkEvent::Cleared,
                SinkEvent::Appended(Chunk::new("two\n", OutputStyle::Bold)),
            ]
        );
    }
}
