//! Speech playback controller.
//!
//! Drives a [`NarrationEngine`] from a single toggle and keeps an accurate
//! [`PlaybackState`]. State only moves when the engine confirms it:
//! `Speaking` on the start callback, `Idle` on end or error (or on an
//! explicit `reset`/`dispose`). Every utterance gets a fresh id, and
//! callbacks carrying any other id are ignored, so a late callback from a
//! cancelled utterance cannot move the state of the current one.

use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use super::engine::{NarrationEngine, Utterance, UtteranceCallbacks, UtteranceId, VoiceSubscription};
use super::notify::{Notification, Notifier};
use super::voices::{select_voice, VoiceCatalog, VoiceDescriptor, VoiceMatch};
use crate::config::SpeechConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Idle,
    Speaking,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpeechError {
    #[error("Text-to-speech is not supported on this host.")]
    UnsupportedCapability,
    #[error("No text available to speak.")]
    NoContent,
    #[error("An error occurred during speech: {0}")]
    EngineFailure(String),
    #[error("Speech stopped: {0}")]
    ExpectedInterruption(String),
    #[error("Speech controller has been disposed")]
    Disposed,
}

impl SpeechError {
    /// Classify an engine error reason. "interrupted" and "canceled" are
    /// what engines report for a requested stop; anything else is a failure.
    pub fn from_engine_reason(reason: Option<String>) -> Self {
        match reason {
            Some(r) if r == "interrupted" || r == "canceled" => SpeechError::ExpectedInterruption(r),
            Some(r) if !r.trim().is_empty() => SpeechError::EngineFailure(r),
            _ => SpeechError::EngineFailure("Unknown speech error.".to_string()),
        }
    }

    pub fn is_expected(&self) -> bool {
        matches!(self, SpeechError::ExpectedInterruption(_))
    }
}

impl From<SpeechError> for String {
    fn from(e: SpeechError) -> String {
        e.to_string()
    }
}

/// What a successful `toggle` asked the engine to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleAction {
    StartRequested,
    StopRequested,
}

#[derive(Debug, Clone)]
pub struct SpeechSettings {
    pub rate: f32,
    pub pitch: f32,
    pub preferred_region: String,
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self::from(&SpeechConfig::default())
    }
}

impl From<&SpeechConfig> for SpeechSettings {
    fn from(config: &SpeechConfig) -> Self {
        Self {
            rate: config.rate,
            pitch: config.pitch,
            preferred_region: config.preferred_region.clone(),
        }
    }
}

struct PlaybackSlot {
    state: PlaybackState,
    /// Utterance handed to the engine whose end/error has not arrived.
    active: Option<UtteranceId>,
    next_id: UtteranceId,
    disposed: bool,
}

impl PlaybackSlot {
    fn owns(&self, id: UtteranceId) -> bool {
        !self.disposed && self.active == Some(id)
    }

    /// Drop the current utterance. Returns whether anything was in flight.
    fn clear(&mut self) -> bool {
        let had = self.active.take().is_some() || self.state == PlaybackState::Speaking;
        self.state = PlaybackState::Idle;
        had
    }
}

struct Shared {
    engine: Arc<dyn NarrationEngine>,
    notifier: Arc<dyn Notifier>,
    catalog: VoiceCatalog,
    settings: SpeechSettings,
    slot: Mutex<PlaybackSlot>,
}

impl Shared {
    fn slot(&self) -> MutexGuard<'_, PlaybackSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn on_start(&self, id: UtteranceId) {
        let mut slot = self.slot();
        if !slot.owns(id) {
            tracing::debug!("[TTS] Ignoring start of stale utterance {}", id);
            return;
        }
        slot.state = PlaybackState::Speaking;
        tracing::debug!("[TTS] Utterance {} started", id);
    }

    fn on_end(&self, id: UtteranceId) {
        let mut slot = self.slot();
        if !slot.owns(id) {
            tracing::debug!("[TTS] Ignoring end of stale utterance {}", id);
            return;
        }
        slot.clear();
        tracing::debug!("[TTS] Utterance {} ended", id);
    }

    fn on_error(&self, id: UtteranceId, reason: Option<String>) {
        {
            let mut slot = self.slot();
            if !slot.owns(id) {
                tracing::debug!("[TTS] Ignoring error of stale utterance {}: {:?}", id, reason);
                return;
            }
            slot.clear();
        }

        let err = SpeechError::from_engine_reason(reason);
        // dispose() may have run since the slot was released.
        if self.slot().disposed {
            tracing::debug!("[TTS] Utterance {} errored after dispose: {}", id, err);
            return;
        }
        if err.is_expected() {
            tracing::info!(
                "[TTS] Utterance {}: {}. Expected during stop or navigation.",
                id,
                err
            );
        } else {
            tracing::error!("[TTS] Utterance {} failed: {}", id, err);
            self.notifier
                .notify(Notification::error("Speech Error", err.to_string()));
        }
    }
}

pub struct SpeechController {
    shared: Arc<Shared>,
    subscription: Mutex<Option<VoiceSubscription>>,
}

impl SpeechController {
    pub fn new(
        engine: Arc<dyn NarrationEngine>,
        notifier: Arc<dyn Notifier>,
        settings: SpeechSettings,
    ) -> Self {
        let shared = Arc::new(Shared {
            engine,
            notifier,
            catalog: VoiceCatalog::new(),
            settings,
            slot: Mutex::new(PlaybackSlot {
                state: PlaybackState::Idle,
                active: None,
                next_id: 0,
                disposed: false,
            }),
        });

        if !shared.engine.is_supported() {
            tracing::warn!("[TTS] Narration engine unavailable on this host");
            shared.notifier.notify(Notification::error(
                "Speech Unsupported",
                SpeechError::UnsupportedCapability.to_string(),
            ));
            return Self {
                shared,
                subscription: Mutex::new(None),
            };
        }

        // Subscribe before the first read so a push landing in between is not lost.
        let weak: Weak<Shared> = Arc::downgrade(&shared);
        let subscription = shared
            .engine
            .subscribe_voices_changed(Arc::new(move |voices: Vec<VoiceDescriptor>| {
                if let Some(shared) = weak.upgrade() {
                    if shared.slot().disposed {
                        return;
                    }
                    tracing::debug!("[TTS] Voice catalog changed: {} voices", voices.len());
                    shared.catalog.replace(voices);
                }
            }));
        shared.catalog.replace(shared.engine.voices());
        tracing::info!("[TTS] Loaded {} voices", shared.catalog.len());

        Self {
            shared,
            subscription: Mutex::new(Some(subscription)),
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.shared.slot().state
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.slot().disposed
    }

    /// Whether an utterance was handed to the engine and has not finished.
    pub fn has_pending_utterance(&self) -> bool {
        self.shared.slot().active.is_some()
    }

    pub fn voices(&self) -> Vec<VoiceDescriptor> {
        self.shared.catalog.snapshot()
    }

    /// Start narrating `text`, or stop the current narration.
    ///
    /// Returns as soon as the engine has been asked; the state changes when
    /// the engine calls back. Failures are also reported to the notifier.
    pub fn toggle(&self, text: &str, language: &str) -> Result<ToggleAction, SpeechError> {
        let shared = &self.shared;
        if shared.slot().disposed {
            return Err(SpeechError::Disposed);
        }
        if text.trim().is_empty() {
            return Err(self.report(SpeechError::NoContent));
        }
        if !shared.engine.is_supported() {
            return Err(self.report(SpeechError::UnsupportedCapability));
        }

        let (id, superseded) = {
            let mut slot = shared.slot();
            // The checks above ran unlocked; dispose() may have won the race.
            if slot.disposed {
                return Err(SpeechError::Disposed);
            }
            if slot.state == PlaybackState::Speaking {
                drop(slot);
                tracing::info!("[TTS] Stop requested");
                shared.engine.cancel();
                return Ok(ToggleAction::StopRequested);
            }
            // An utterance that was requested but never confirmed its start
            // is abandoned; its callbacks become stale.
            let superseded = slot.active.take();
            slot.next_id += 1;
            slot.active = Some(slot.next_id);
            (slot.next_id, superseded)
        };

        if superseded.is_some() || shared.engine.is_speaking() {
            tracing::debug!(
                "[TTS] Cancelling outstanding utterance {:?} before {}",
                superseded,
                id
            );
            shared.engine.cancel();
        }

        let voices = shared.catalog.snapshot();
        let selection = select_voice(&voices, language, &shared.settings.preferred_region);
        match &selection {
            VoiceMatch::EngineDefault if !voices.is_empty() => {
                tracing::warn!(
                    "[TTS] No specific voice found for lang '{}'. Using engine default.",
                    language
                );
                shared.notifier.notify(Notification::info(
                    "Voice Information",
                    "A specific voice for the selected language was not found on your system. \
                     Attempting to use the default voice. Quality may vary.",
                ));
            }
            VoiceMatch::EngineDefault => {
                tracing::warn!(
                    "[TTS] Voices not yet loaded or none available. Speaking with lang '{}'.",
                    language
                );
            }
            matched => {
                if let Some(voice) = matched.voice() {
                    tracing::debug!("[TTS] Using voice '{}' ({})", voice.name, voice.lang);
                }
            }
        }

        let utterance = Utterance {
            id,
            text: text.to_string(),
            lang: language.to_string(),
            voice: selection.voice().cloned(),
            rate: shared.settings.rate,
            pitch: shared.settings.pitch,
        };

        tracing::info!(
            "[TTS] Speaking utterance {} ({} chars, lang {})",
            id,
            utterance.text.chars().count(),
            language
        );
        shared.engine.speak(utterance, self.callbacks_for(id));
        if shared.slot().disposed {
            // Disposed while speak() was being issued; nothing else will stop it.
            shared.engine.cancel();
            return Err(SpeechError::Disposed);
        }
        Ok(ToggleAction::StartRequested)
    }

    /// Stop whatever is playing and force `Idle`. Used when the result or
    /// language behind the narration changes.
    pub fn reset(&self) {
        let had_active = {
            let mut slot = self.shared.slot();
            if slot.disposed {
                return;
            }
            slot.clear()
        };

        let engine = &self.shared.engine;
        if engine.is_supported() && (had_active || engine.is_speaking()) {
            tracing::debug!("[TTS] Reset: cancelling narration");
            engine.cancel();
        }
    }

    /// Tear down: cancel narration, release the catalog subscription and
    /// ignore every callback that arrives afterwards.
    pub fn dispose(&self) {
        let had_active = {
            let mut slot = self.shared.slot();
            if slot.disposed {
                return;
            }
            slot.disposed = true;
            slot.clear()
        };

        if let Some(subscription) = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            subscription.release();
        }

        let engine = &self.shared.engine;
        if engine.is_supported() && (had_active || engine.is_speaking()) {
            engine.cancel();
        }
        tracing::debug!("[TTS] Speech controller disposed");
    }

    fn callbacks_for(&self, id: UtteranceId) -> UtteranceCallbacks {
        let on_start = Arc::downgrade(&self.shared);
        let on_end = on_start.clone();
        let on_error = on_start.clone();
        UtteranceCallbacks::new(
            move || {
                if let Some(shared) = on_start.upgrade() {
                    shared.on_start(id);
                }
            },
            move || {
                if let Some(shared) = on_end.upgrade() {
                    shared.on_end(id);
                }
            },
            move |reason| {
                if let Some(shared) = on_error.upgrade() {
                    shared.on_error(id, reason);
                }
            },
        )
    }

    fn report(&self, err: SpeechError) -> SpeechError {
        tracing::warn!("[TTS] {}", err);
        let title = match err {
            SpeechError::UnsupportedCapability => "Speech Unsupported",
            _ => "Speech Error",
        };
        self.shared
            .notifier
            .notify(Notification::error(title, err.to_string()));
        err
    }
}

impl Drop for SpeechController {
    fn drop(&mut self) {
        self.dispose();
    }
}
