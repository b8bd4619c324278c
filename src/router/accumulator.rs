//! Streaming delta accumulation for one in-flight response.
//!
//! Each modality (text, audio, transcript) is an append-only stream:
//! `Idle` until its first delta, `Open` while deltas arrive, `Sealed` once
//! its done event lands. Seal hands out the artifact exactly once. Audio
//! chunks keep arrival order; concatenating them reconstructs the PCM
//! stream.

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum StreamState {
    #[default]
    Idle,
    Open,
    Sealed,
}

#[derive(Debug, Default)]
struct TextStream {
    buf: String,
    state: StreamState,
}

impl TextStream {
    fn push(&mut self, fragment: &str, modality: &'static str) -> Result<()> {
        if self.state == StreamState::Sealed {
            return Err(Error::StreamSealed(modality));
        }
        self.state = StreamState::Open;
        self.buf.push_str(fragment);
        Ok(())
    }

    fn seal(&mut self, modality: &'static str) -> Result<String> {
        if self.state == StreamState::Sealed {
            return Err(Error::StreamSealed(modality));
        }
        self.state = StreamState::Sealed;
        Ok(std::mem::take(&mut self.buf))
    }
}

#[derive(Debug, Default)]
struct AudioStream {
    chunks: Vec<Vec<u8>>,
    state: StreamState,
}

impl AudioStream {
    fn push(&mut self, chunk: Vec<u8>) -> Result<()> {
        if self.state == StreamState::Sealed {
            return Err(Error::StreamSealed("audio"));
        }
        self.state = StreamState::Open;
        self.chunks.push(chunk);
        Ok(())
    }

    fn seal(&mut self) -> Result<Vec<Vec<u8>>> {
        if self.state == StreamState::Sealed {
            return Err(Error::StreamSealed("audio"));
        }
        self.state = StreamState::Sealed;
        Ok(std::mem::take(&mut self.chunks))
    }
}

/// A sealed artifact produced by force-sealing a stream that never saw its
/// done event.
#[derive(Debug, PartialEq, Eq)]
pub enum SealedStream {
    Text(String),
    Audio(Vec<Vec<u8>>),
    Transcript(String),
}

impl SealedStream {
    #[must_use]
    pub const fn modality(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Audio(_) => "audio",
            Self::Transcript(_) => "transcript",
        }
    }
}

/// Accumulator for one response (turn). Created on `response.created`,
/// retired on `response.done`.
#[derive(Debug, Default)]
pub struct ResponseAccumulator {
    response_id: Option<String>,
    text: TextStream,
    audio: AudioStream,
    transcript: TextStream,
}

impl ResponseAccumulator {
    #[must_use]
    pub fn new(response_id: Option<String>) -> Self {
        Self {
            response_id,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn response_id(&self) -> Option<&str> {
        self.response_id.as_deref()
    }

    /// # Errors
    /// Returns `StreamSealed` if the text stream already saw its done event.
    pub fn push_text(&mut self, fragment: &str) -> Result<()> {
        self.text.push(fragment, "text")
    }

    /// Seal the text stream, yielding the concatenation of all deltas in
    /// arrival order.
    ///
    /// # Errors
    /// Returns `StreamSealed` on a duplicate done event.
    pub fn seal_text(&mut self) -> Result<String> {
        self.text.seal("text")
    }

    /// # Errors
    /// Returns `StreamSealed` if the audio stream already saw its done event.
    pub fn push_audio(&mut self, chunk: Vec<u8>) -> Result<()> {
        self.audio.push(chunk)
    }

    /// Seal the audio stream, yielding the chunk list in arrival order.
    ///
    /// # Errors
    /// Returns `StreamSealed` on a duplicate done event.
    pub fn seal_audio(&mut self) -> Result<Vec<Vec<u8>>> {
        self.audio.seal()
    }

    /// # Errors
    /// Returns `StreamSealed` if the transcript already saw its done event.
    pub fn push_transcript(&mut self, fragment: &str) -> Result<()> {
        self.transcript.push(fragment, "transcript")
    }

    /// # Errors
    /// Returns `StreamSealed` on a duplicate done event.
    pub fn seal_transcript(&mut self) -> Result<String> {
        self.transcript.seal("transcript")
    }

    /// True when no stream is mid-flight (every stream is `Idle` or
    /// `Sealed`). `response.done` asserts this.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.text.state != StreamState::Open
            && self.audio.state != StreamState::Open
            && self.transcript.state != StreamState::Open
    }

    /// Seal every stream still `Open` and return the artifacts, in
    /// text/audio/transcript order. Used when `response.done` arrives
    /// before a modality's done event.
    pub fn force_seal_open(&mut self) -> Vec<SealedStream> {
        let mut sealed = Vec::new();
        if self.text.state == StreamState::Open {
            if let Ok(text) = self.text.seal("text") {
                sealed.push(SealedStream::Text(text));
            }
        }
        if self.audio.state == StreamState::Open {
            if let Ok(chunks) = self.audio.seal() {
                sealed.push(SealedStream::Audio(chunks));
            }
        }
        if self.transcript.state == StreamState::Open {
            if let Ok(transcript) = self.transcript.seal("transcript") {
                sealed.push(SealedStream::Transcript(transcript));
            }
        }
        sealed
    }
}
