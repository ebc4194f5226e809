// ABOUTME: Stream demultiplexer that turns a child's output pipes into prefixed log lines.
// ABOUTME: Reads every stream concurrently, warns on stalls, and stops at the command deadline.

use super::sink::OutputSink;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::Level;

/// Silence longer than this produces a "still waiting" warning.
pub const STALL_WINDOW: Duration = Duration::from_secs(20);

/// Maximum bytes taken from a stream per read.
pub const CHUNK_SIZE: usize = 4096;

/// Which of the child's output streams a reader is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Stdout,
    Stderr,
}

impl Channel {
    fn level(self) -> Level {
        match self {
            Channel::Stdout => Level::INFO,
            Channel::Stderr => Level::ERROR,
        }
    }
}

/// What happens to a stream's bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Log each line with the host prefix; nothing is returned.
    #[default]
    Print,
    /// Buffer the bytes and return them to the caller; nothing is logged.
    Capture,
}

/// Text collected by a [`Demultiplexer`] run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DemuxOutput {
    pub stdout: String,
    pub stderr: String,
    /// The deadline passed before every stream reached EOF.
    pub timed_out: bool,
}

/// Splits a byte stream into complete lines, holding back a trailing partial line.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Append bytes and return every line completed by them, without newlines.
    pub(crate) fn push(&mut self, data: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(data);
        let Some(last_newline) = self.pending.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };
        let rest = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, rest);
        complete[..complete.len() - 1]
            .split(|&b| b == b'\n')
            .map(|line| String::from_utf8_lossy(line).into_owned())
            .collect()
    }

    /// Drain whatever is left once the stream is closed.
    pub(crate) fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}

struct Stream {
    reader: Box<dyn AsyncRead + Send + Unpin>,
    channel: Channel,
    mode: OutputMode,
}

struct StreamState {
    channel: Channel,
    mode: OutputMode,
    lines: LineBuffer,
    captured: Vec<u8>,
}

/// A chunk read from stream `index`; an empty chunk marks EOF.
struct Chunk {
    index: usize,
    data: Vec<u8>,
}

/// Multiplexes up to one reader per stream into a shared [`OutputSink`].
///
/// Each stream gets its own reader task, so a chatty stderr never waits on a
/// silent stdout. Lines are delivered to the sink as soon as they complete.
pub struct Demultiplexer {
    prefix: String,
    displayed_cmd: String,
    sink: Arc<dyn OutputSink>,
    stall_window: Duration,
    timeout: Option<Duration>,
    started_at: Option<Instant>,
    streams: Vec<Stream>,
}

impl std::fmt::Debug for Demultiplexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Demultiplexer")
            .field("prefix", &self.prefix)
            .field("displayed_cmd", &self.displayed_cmd)
            .field("stall_window", &self.stall_window)
            .field("timeout", &self.timeout)
            .field("streams", &self.streams.len())
            .finish()
    }
}

impl Demultiplexer {
    pub fn new(
        prefix: impl Into<String>,
        displayed_cmd: impl Into<String>,
        sink: Arc<dyn OutputSink>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            displayed_cmd: displayed_cmd.into(),
            sink,
            stall_window: STALL_WINDOW,
            timeout: None,
            started_at: None,
            streams: Vec::new(),
        }
    }

    pub fn stall_window(mut self, window: Duration) -> Self {
        self.stall_window = window;
        self
    }

    /// Overall deadline, measured from [`Self::started_at`] (or from `run`).
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn started_at(mut self, start: Instant) -> Self {
        self.started_at = Some(start);
        self
    }

    pub fn stream<R>(mut self, reader: R, channel: Channel, mode: OutputMode) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        self.streams.push(Stream {
            reader: Box::new(reader),
            channel,
            mode,
        });
        self
    }

    /// Read until every stream is closed or the deadline passes.
    pub async fn run(self) -> DemuxOutput {
        let Demultiplexer {
            prefix,
            displayed_cmd,
            sink,
            stall_window,
            timeout,
            started_at,
            streams,
        } = self;
        let emitter = Emitter {
            sink: sink.as_ref(),
            prefix: &prefix,
        };

        let start = started_at.unwrap_or_else(Instant::now);
        let (tx, mut rx) = mpsc::channel(64);

        let mut states = Vec::with_capacity(streams.len());
        for (index, stream) in streams.into_iter().enumerate() {
            states.push(StreamState {
                channel: stream.channel,
                mode: stream.mode,
                lines: LineBuffer::default(),
                captured: Vec::new(),
            });
            tokio::spawn(pump(stream.reader, index, tx.clone()));
        }
        drop(tx);

        let mut open = states.len();
        let mut last_output = Instant::now();
        let mut last_warning: Option<Instant> = None;
        let mut timed_out = false;

        while open > 0 {
            let mut wait = stall_window;
            if let Some(timeout) = timeout {
                wait = wait.min(timeout.saturating_sub(start.elapsed()));
            }

            match tokio::time::timeout(wait, rx.recv()).await {
                Ok(Some(chunk)) => {
                    last_output = Instant::now();
                    let state = &mut states[chunk.index];
                    if chunk.data.is_empty() {
                        open -= 1;
                        emitter.finish(state);
                    } else {
                        emitter.deliver(state, &chunk.data);
                    }
                }
                // Every reader is gone; nothing more can arrive.
                Ok(None) => break,
                Err(_) => {}
            }

            let now = Instant::now();
            if now - last_output >= stall_window
                && last_warning.is_none_or(|warned| now - warned >= stall_window)
            {
                emitter.sink.line(
                    emitter.prefix,
                    Level::WARN,
                    &format!(
                        "still waiting for '{}' to finish... ({} elapsed)",
                        displayed_cmd,
                        format_elapsed(now - start)
                    ),
                );
                last_warning = Some(now);
            }

            if let Some(timeout) = timeout
                && now - start >= timeout
            {
                timed_out = open > 0;
                break;
            }
        }

        for state in &mut states {
            emitter.finish(state);
        }

        let mut output = DemuxOutput {
            timed_out,
            ..DemuxOutput::default()
        };
        for state in states {
            if state.mode != OutputMode::Capture {
                continue;
            }
            let text = String::from_utf8_lossy(&state.captured);
            match state.channel {
                Channel::Stdout => output.stdout.push_str(&text),
                Channel::Stderr => output.stderr.push_str(&text),
            }
        }
        output
    }
}

/// Routes a stream's lines to the sink under the host prefix.
struct Emitter<'a> {
    sink: &'a dyn OutputSink,
    prefix: &'a str,
}

impl Emitter<'_> {
    fn deliver(&self, state: &mut StreamState, data: &[u8]) {
        match state.mode {
            OutputMode::Capture => state.captured.extend_from_slice(data),
            OutputMode::Print => {
                for line in state.lines.push(data) {
                    self.sink.line(self.prefix, state.channel.level(), &line);
                }
            }
        }
    }

    fn finish(&self, state: &mut StreamState) {
        if let Some(rest) = state.lines.finish() {
            self.sink.line(self.prefix, state.channel.level(), &rest);
        }
    }
}

async fn pump(
    mut reader: Box<dyn AsyncRead + Send + Unpin>,
    index: usize,
    tx: mpsc::Sender<Chunk>,
) {
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let chunk = Chunk {
                    index,
                    data: buf[..n].to_vec(),
                };
                if tx.send(chunk).await.is_err() {
                    return;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::debug!("stream {} read failed, treating as EOF: {}", index, e);
                break;
            }
        }
    }
    let _ = tx
        .send(Chunk {
            index,
            data: Vec::new(),
        })
        .await;
}

/// Render a duration as `HH:MM:SS`.
pub(crate) fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::sink::MemorySink;

    #[test]
    fn line_buffer_holds_partial_lines() {
        let mut buf = LineBuffer::default();
        assert!(buf.push(b"hel").is_empty());
        assert_eq!(buf.push(b"lo\nwor"), vec!["hello"]);
        assert_eq!(buf.push(b"ld\n\nlast"), vec!["world", ""]);
        assert_eq!(buf.finish(), Some("last".to_string()));
        assert_eq!(buf.finish(), None);
    }

    #[test]
    fn line_buffer_reassembles_split_utf8() {
        let mut buf = LineBuffer::default();
        let bytes = "grüße\n".as_bytes();
        assert!(buf.push(&bytes[..3]).is_empty());
        assert_eq!(buf.push(&bytes[3..]), vec!["grüße"]);
    }

    #[test]
    fn elapsed_is_formatted_as_clock() {
        assert_eq!(format_elapsed(Duration::from_secs(0)), "00:00:00");
        assert_eq!(format_elapsed(Duration::from_secs(3723)), "01:02:03");
    }

    #[tokio::test]
    async fn print_streams_go_to_sink_with_levels() {
        let sink = Arc::new(MemorySink::new());
        let output = Demultiplexer::new("web1", "echo", sink.clone())
            .stream(&b"one\ntwo\n"[..], Channel::Stdout, OutputMode::Print)
            .stream(&b"bad\npartial"[..], Channel::Stderr, OutputMode::Print)
            .run()
            .await;

        assert_eq!(output, DemuxOutput::default());
        assert_eq!(sink.messages("web1", Level::INFO), vec!["one", "two"]);
        assert_eq!(sink.messages("web1", Level::ERROR), vec!["bad", "partial"]);
    }

    #[tokio::test]
    async fn captured_streams_are_returned_not_logged() {
        let sink = Arc::new(MemorySink::new());
        let output = Demultiplexer::new("web1", "cat", sink.clone())
            .stream(&b"data\nmore"[..], Channel::Stdout, OutputMode::Capture)
            .stream(&b"warn\n"[..], Channel::Stderr, OutputMode::Print)
            .run()
            .await;

        assert_eq!(output.stdout, "data\nmore");
        assert_eq!(output.stderr, "");
        assert!(!output.timed_out);
        assert_eq!(sink.messages("web1", Level::ERROR), vec!["warn"]);
        assert!(sink.messages("web1", Level::INFO).is_empty());
    }

    #[tokio::test]
    async fn no_streams_returns_immediately() {
        let sink = Arc::new(MemorySink::new());
        let output = Demultiplexer::new("web1", "true", sink.clone()).run().await;
        assert_eq!(output, DemuxOutput::default());
        assert!(sink.lines().is_empty());
    }
}
