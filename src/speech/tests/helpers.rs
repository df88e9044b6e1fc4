use crate::speech::engine::{
    ListenerSet, NarrationEngine, Utterance, UtteranceCallbacks, UtteranceId, VoiceSubscription,
    VoicesChangedListener,
};
use crate::speech::notify::{Notification, Notifier, Severity};
use crate::speech::voices::VoiceDescriptor;
use crate::speech::{SpeechController, SpeechSettings};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

// ── Engine calls ────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    Speak(UtteranceId),
    Cancel,
}

#[derive(Default)]
struct Script {
    voices: Vec<VoiceDescriptor>,
    calls: Vec<EngineCall>,
    spoken: Vec<Utterance>,
    callbacks: HashMap<UtteranceId, Arc<UtteranceCallbacks>>,
    /// Utterances spoken and neither ended nor cancelled.
    queued: Vec<UtteranceId>,
    /// `speak` calls made while something was still queued.
    overlapping_speaks: usize,
}

/// Engine whose callbacks only fire when a test says so.
pub struct ScriptedEngine {
    supported: AtomicBool,
    /// Runs once, inside the next `is_supported` call.
    support_hook: Mutex<Option<Box<dyn FnOnce() + Send>>>,
    script: Mutex<Script>,
    listeners: ListenerSet,
}

#[allow(dead_code)]
impl ScriptedEngine {
    pub fn new(voices: Vec<VoiceDescriptor>) -> Arc<Self> {
        Arc::new(Self {
            supported: AtomicBool::new(true),
            support_hook: Mutex::new(None),
            script: Mutex::new(Script {
                voices,
                ..Script::default()
            }),
            listeners: ListenerSet::new(),
        })
    }

    pub fn unsupported() -> Arc<Self> {
        let engine = Self::new(Vec::new());
        engine.supported.store(false, Ordering::SeqCst);
        engine
    }

    /// Run `hook` from inside the next capability check, e.g. to tear the
    /// controller down while a toggle is in progress.
    pub fn on_next_support_check(&self, hook: impl FnOnce() + Send + 'static) {
        *self.support_hook.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.script.lock().unwrap().calls.clone()
    }

    pub fn speak_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, EngineCall::Speak(_)))
            .count()
    }

    pub fn cancel_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, EngineCall::Cancel))
            .count()
    }

    pub fn overlapping_speaks(&self) -> usize {
        self.script.lock().unwrap().overlapping_speaks
    }

    pub fn last_utterance(&self) -> Utterance {
        self.script
            .lock()
            .unwrap()
            .spoken
            .last()
            .cloned()
            .expect("nothing was spoken")
    }

    fn callbacks(&self, id: UtteranceId) -> Arc<UtteranceCallbacks> {
        self.script
            .lock()
            .unwrap()
            .callbacks
            .get(&id)
            .cloned()
            .unwrap_or_else(|| panic!("no callbacks for utterance {}", id))
    }

    pub fn fire_start(&self, id: UtteranceId) {
        let cb = self.callbacks(id);
        cb.start();
    }

    pub fn fire_end(&self, id: UtteranceId) {
        let cb = self.callbacks(id);
        self.script.lock().unwrap().queued.retain(|q| *q != id);
        cb.end();
    }

    pub fn fire_error(&self, id: UtteranceId, reason: Option<&str>) {
        let cb = self.callbacks(id);
        self.script.lock().unwrap().queued.retain(|q| *q != id);
        cb.error(reason.map(str::to_string));
    }

    /// Replace the catalog and push it to subscribers, like a host
    /// finishing its asynchronous voice load.
    pub fn push_voices(&self, voices: Vec<VoiceDescriptor>) {
        self.script.lock().unwrap().voices = voices.clone();
        self.listeners.emit(&voices);
    }

    pub fn subscriber_count(&self) -> usize {
        self.listeners.len()
    }
}

impl NarrationEngine for ScriptedEngine {
    fn is_supported(&self) -> bool {
        let hook = self.support_hook.lock().unwrap().take();
        if let Some(hook) = hook {
            hook();
        }
        self.supported.load(Ordering::SeqCst)
    }

    fn voices(&self) -> Vec<VoiceDescriptor> {
        self.script.lock().unwrap().voices.clone()
    }

    fn speak(&self, utterance: Utterance, callbacks: UtteranceCallbacks) {
        let mut script = self.script.lock().unwrap();
        if !script.queued.is_empty() {
            script.overlapping_speaks += 1;
        }
        script.calls.push(EngineCall::Speak(utterance.id));
        script.queued.push(utterance.id);
        script.callbacks.insert(utterance.id, Arc::new(callbacks));
        script.spoken.push(utterance);
    }

    fn cancel(&self) {
        let mut script = self.script.lock().unwrap();
        script.calls.push(EngineCall::Cancel);
        script.queued.clear();
    }

    fn is_speaking(&self) -> bool {
        !self.script.lock().unwrap().queued.is_empty()
    }

    fn subscribe_voices_changed(&self, listener: VoicesChangedListener) -> VoiceSubscription {
        self.listeners.subscribe(listener)
    }
}

// ── Notifications ───────────────────────────────────────────

#[derive(Default)]
pub struct RecordingNotifier {
    seen: Mutex<Vec<Notification>>,
}

#[allow(dead_code)]
impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn all(&self) -> Vec<Notification> {
        self.seen.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn errors(&self) -> Vec<Notification> {
        self.all()
            .into_iter()
            .filter(|n| n.severity == Severity::Error)
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.seen.lock().unwrap().push(notification);
    }
}

// ── Fixtures ────────────────────────────────────────────────

pub fn voices(langs: &[&str]) -> Vec<VoiceDescriptor> {
    langs
        .iter()
        .map(|l| VoiceDescriptor::new(format!("Voice {}", l), *l))
        .collect()
}

/// Controller over a scripted engine with the given catalog.
pub fn setup(
    langs: &[&str],
) -> (SpeechController, Arc<ScriptedEngine>, Arc<RecordingNotifier>) {
    let engine = ScriptedEngine::new(voices(langs));
    let notifier = RecordingNotifier::new();
    let controller = SpeechController::new(
        engine.clone(),
        notifier.clone(),
        SpeechSettings::default(),
    );
    (controller, engine, notifier)
}

pub const USES: &str = "Used for pain relief and fever.";
