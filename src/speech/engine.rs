//! Narration engine contract.
//!
//! The engine is a shared single-slot resource: at most one utterance is
//! active at a time, and completion is reported only through the callbacks
//! handed to [`NarrationEngine::speak`]. Callbacks may fire on any thread,
//! including synchronously from inside `speak` or `cancel`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use super::voices::VoiceDescriptor;

pub type UtteranceId = u64;

/// One text-to-speech request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Utterance {
    pub id: UtteranceId,
    pub text: String,
    /// Language tag the engine should speak in, also when `voice` is unset.
    pub lang: String,
    pub voice: Option<VoiceDescriptor>,
    pub rate: f32,
    pub pitch: f32,
}

type Callback = Box<dyn Fn() + Send + Sync>;
type ErrorCallback = Box<dyn Fn(Option<String>) + Send + Sync>;

/// The start / end / error triple for one utterance.
pub struct UtteranceCallbacks {
    on_start: Callback,
    on_end: Callback,
    on_error: ErrorCallback,
}

impl UtteranceCallbacks {
    pub fn new(
        on_start: impl Fn() + Send + Sync + 'static,
        on_end: impl Fn() + Send + Sync + 'static,
        on_error: impl Fn(Option<String>) + Send + Sync + 'static,
    ) -> Self {
        Self {
            on_start: Box::new(on_start),
            on_end: Box::new(on_end),
            on_error: Box::new(on_error),
        }
    }

    pub fn start(&self) {
        (self.on_start)()
    }

    pub fn end(&self) {
        (self.on_end)()
    }

    /// `reason` is the engine's error code, e.g. "canceled" or "synthesis-failed".
    pub fn error(&self, reason: Option<String>) {
        (self.on_error)(reason)
    }
}

impl fmt::Debug for UtteranceCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("UtteranceCallbacks")
    }
}

pub type VoicesChangedListener = Arc<dyn Fn(Vec<VoiceDescriptor>) + Send + Sync>;

pub trait NarrationEngine: Send + Sync {
    /// Whether the host can synthesize speech at all.
    fn is_supported(&self) -> bool;

    /// Current voice list. May be empty until the host finishes loading.
    fn voices(&self) -> Vec<VoiceDescriptor>;

    /// Queue `utterance`. Never call while another utterance is active
    /// without cancelling it first.
    fn speak(&self, utterance: Utterance, callbacks: UtteranceCallbacks);

    /// Request that the active utterance stop. Completion arrives through
    /// that utterance's end or error callback.
    fn cancel(&self);

    fn is_speaking(&self) -> bool;

    /// Register for voice list changes. The listener stays registered until
    /// the returned guard is released or dropped.
    fn subscribe_voices_changed(&self, listener: VoicesChangedListener) -> VoiceSubscription;
}

// ── Subscriptions ──────────────────────────────────────

/// Registration guard for a voices-changed listener.
#[must_use = "dropping the subscription deregisters the listener"]
pub struct VoiceSubscription {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl VoiceSubscription {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    pub fn release(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for VoiceSubscription {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl fmt::Debug for VoiceSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoiceSubscription")
            .field("active", &self.release.is_some())
            .finish()
    }
}

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: HashMap<u64, VoicesChangedListener>,
}

/// Listener bookkeeping shared by engine implementations.
#[derive(Clone, Default)]
pub struct ListenerSet {
    inner: Arc<Mutex<Listeners>>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: VoicesChangedListener) -> VoiceSubscription {
        let id = {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            inner.next_id += 1;
            let id = inner.next_id;
            inner.entries.insert(id, listener);
            id
        };

        let weak: Weak<Mutex<Listeners>> = Arc::downgrade(&self.inner);
        VoiceSubscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .entries
                    .remove(&id);
            }
        })
    }

    /// Call every registered listener. Listeners run without the lock held.
    pub fn emit(&self, voices: &[VoiceDescriptor]) {
        let listeners: Vec<VoicesChangedListener> = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .values()
            .cloned()
            .collect();

        for listener in listeners {
            listener(voices.to_vec());
        }
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
