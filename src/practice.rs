//! Per-learner page state: the visible tab, the open vocabulary entry and the
//! self-recording lifecycle.
//!
//! Audio capture itself happens in the host (browser or OS); the session only
//! tracks who owns the microphone and what the learner sees.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

use crate::{Lesson, VocabularyEntry};

const MIN_SCORE: u8 = 80;
const MAX_SCORE: u8 = 100;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tab {
    #[default]
    Text,
    Translation,
    Vocabulary,
}

impl fmt::Display for Tab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tab::Text => write!(f, "text"),
            Tab::Translation => write!(f, "translation"),
            Tab::Vocabulary => write!(f, "vocabulary"),
        }
    }
}

/// Simulated pronunciation score. There is no speech analysis behind it.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PronunciationScore(u8);

impl PronunciationScore {
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self(rng.gen_range(MIN_SCORE..=MAX_SCORE))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl fmt::Display for PronunciationScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub enum RecordingState {
    #[default]
    Idle,
    /// Waiting for the host to grant microphone access.
    Requesting,
    Recording,
    Scored(PronunciationScore),
}

impl RecordingState {
    /// True while the microphone is requested or held.
    pub fn holds_microphone(self) -> bool {
        matches!(self, RecordingState::Requesting | RecordingState::Recording)
    }
}

#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum PracticeError {
    #[error("open a vocabulary entry before recording")]
    NoEntryOpen,
    #[error("a recording is already in progress")]
    AlreadyRecording,
    #[error("no microphone request is pending")]
    NoPendingRequest,
    #[error("could not access microphone")]
    MicrophoneDenied,
}

#[derive(Debug, Clone, Default)]
pub struct PracticeSession {
    tab: Tab,
    open_entry: Option<u32>,
    recording: RecordingState,
    // State to fall back to when a microphone request is denied.
    before_request: RecordingState,
}

impl PracticeSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tab(&self) -> Tab {
        self.tab
    }

    pub fn select_tab(&mut self, tab: Tab) {
        self.tab = tab;
    }

    pub fn open_entry_id(&self) -> Option<u32> {
        self.open_entry
    }

    pub fn recording(&self) -> RecordingState {
        self.recording
    }

    /// Opens the entry for `id`, releasing any recording in progress.
    /// Unknown IDs leave the session untouched.
    pub fn open_entry<'l>(&mut self, lesson: &'l Lesson, id: u32) -> Option<&'l VocabularyEntry> {
        let Some(entry) = lesson.entry(id) else {
            debug!(id, "ignoring lookup of unknown vocabulary id");
            return None;
        };
        self.release_recording();
        self.open_entry = Some(id);
        Some(entry)
    }

    pub fn close_entry(&mut self) {
        self.release_recording();
        self.open_entry = None;
    }

    pub fn request_recording(&mut self) -> Result<(), PracticeError> {
        if self.open_entry.is_none() {
            return Err(PracticeError::NoEntryOpen);
        }
        if self.recording.holds_microphone() {
            return Err(PracticeError::AlreadyRecording);
        }
        self.before_request = self.recording;
        self.recording = RecordingState::Requesting;
        Ok(())
    }

    pub fn microphone_granted(&mut self) -> Result<(), PracticeError> {
        if self.recording != RecordingState::Requesting {
            return Err(PracticeError::NoPendingRequest);
        }
        self.recording = RecordingState::Recording;
        debug!(entry = ?self.open_entry, "recording started");
        Ok(())
    }

    /// Restores the pre-request state and reports the denial.
    pub fn microphone_denied(&mut self) -> PracticeError {
        if self.recording == RecordingState::Requesting {
            self.recording = self.before_request;
        }
        PracticeError::MicrophoneDenied
    }

    /// Stops an active recording and scores it. A no-op when nothing is recording.
    pub fn stop_recording<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<PronunciationScore> {
        if self.recording != RecordingState::Recording {
            return None;
        }
        let score = PronunciationScore::random(rng);
        self.recording = RecordingState::Scored(score);
        info!(entry = ?self.open_entry, %score, "recording scored");
        Some(score)
    }

    fn release_recording(&mut self) {
        if self.recording.holds_microphone() {
            debug!(entry = ?self.open_entry, "releasing microphone");
        }
        self.recording = RecordingState::Idle;
        self.before_request = RecordingState::Idle;
    }
}
