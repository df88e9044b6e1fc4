pub mod bridge;
pub mod controller;
pub mod engine;
pub mod notify;
pub mod voices;

#[cfg(test)]
pub(crate) mod tests;

pub use bridge::{BridgeEngine, HostCommand, HostEvent};
pub use controller::{PlaybackState, SpeechController, SpeechError, SpeechSettings, ToggleAction};
pub use engine::{
    ListenerSet, NarrationEngine, Utterance, UtteranceCallbacks, UtteranceId, VoiceSubscription,
    VoicesChangedListener,
};
pub use notify::{ChannelNotifier, Notification, Notifier, Severity, TracingNotifier};
pub use voices::{select_voice, VoiceCatalog, VoiceDescriptor, VoiceMatch};
