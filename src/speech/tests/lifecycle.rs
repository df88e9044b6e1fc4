use super::helpers::*;
use crate::speech::{PlaybackState, SpeechController, SpeechError, SpeechSettings};
use std::sync::Arc;

// ── reset() ─────────────────────────────────────────────────

#[test]
fn test_reset_while_idle_is_noop() {
    let (controller, engine, notifier) = setup(&["en-IN"]);

    controller.reset();
    controller.reset();

    assert_eq!(controller.state(), PlaybackState::Idle);
    assert!(engine.calls().is_empty(), "no engine calls when nothing plays");
    assert_eq!(notifier.count(), 0);
}

#[test]
fn test_reset_while_speaking_forces_idle() {
    let (controller, engine, notifier) = setup(&["en-IN"]);
    controller.toggle(USES, "en").unwrap();
    engine.fire_start(1);

    controller.reset();
    assert_eq!(controller.state(), PlaybackState::Idle, "reset does not wait");
    assert_eq!(engine.cancel_count(), 1);

    // The cancellation callback lands later and changes nothing.
    engine.fire_error(1, Some("canceled"));
    assert_eq!(controller.state(), PlaybackState::Idle);
    assert_eq!(notifier.count(), 0);
}

#[test]
fn test_reset_cancels_unconfirmed_utterance() {
    let (controller, engine, _notifier) = setup(&["en-IN"]);
    controller.toggle(USES, "en").unwrap();

    controller.reset();
    assert_eq!(engine.cancel_count(), 1);
    assert!(!controller.has_pending_utterance());

    // A start that was already in flight is ignored.
    engine.fire_start(1);
    assert_eq!(controller.state(), PlaybackState::Idle);
}

#[test]
fn test_new_data_then_speak_again() {
    let (controller, engine, _notifier) = setup(&["en-IN", "hi-IN"]);
    controller.toggle(USES, "en").unwrap();
    engine.fire_start(1);

    // New result arrives in another language.
    controller.reset();
    controller.toggle("बुखार और दर्द में उपयोगी।", "hi").unwrap();

    assert_eq!(
        engine.calls(),
        vec![EngineCall::Speak(1), EngineCall::Cancel, EngineCall::Speak(2)]
    );
    assert_eq!(engine.overlapping_speaks(), 0);
    assert_eq!(engine.last_utterance().voice.unwrap().lang, "hi-IN");

    engine.fire_error(1, Some("interrupted"));
    engine.fire_start(2);
    assert_eq!(controller.state(), PlaybackState::Speaking);
}

// ── dispose() ───────────────────────────────────────────────

#[test]
fn test_dispose_during_speech() {
    let (controller, engine, notifier) = setup(&["en-IN"]);
    controller.toggle(USES, "en").unwrap();
    engine.fire_start(1);

    controller.dispose();
    assert!(controller.is_disposed());
    assert_eq!(engine.cancel_count(), 1);
    assert_eq!(engine.subscriber_count(), 0);

    // Late callbacks after teardown: no state change, no notification.
    engine.fire_error(1, Some("audio-busy"));
    engine.fire_end(1);
    assert_eq!(controller.state(), PlaybackState::Idle);
    assert_eq!(notifier.count(), 0);
}

#[test]
fn test_dispose_is_idempotent_and_final() {
    let (controller, engine, notifier) = setup(&["en-IN"]);

    controller.dispose();
    controller.dispose();
    controller.reset();
    assert_eq!(controller.toggle(USES, "en"), Err(SpeechError::Disposed));

    assert!(engine.calls().is_empty());
    assert_eq!(notifier.count(), 0);
}

#[test]
fn test_dispose_during_toggle_never_reaches_engine() {
    let engine = ScriptedEngine::new(voices(&["en-IN"]));
    let notifier = RecordingNotifier::new();
    let controller = Arc::new(SpeechController::new(
        engine.clone(),
        notifier.clone(),
        SpeechSettings::default(),
    ));

    // Teardown lands between toggle's first disposed check and the speak.
    let weak = Arc::downgrade(&controller);
    engine.on_next_support_check(move || {
        if let Some(controller) = weak.upgrade() {
            controller.dispose();
        }
    });

    assert_eq!(controller.toggle(USES, "en"), Err(SpeechError::Disposed));
    assert!(controller.is_disposed());
    assert_eq!(engine.speak_count(), 0, "no speak after teardown");
    assert!(!controller.has_pending_utterance());
    assert_eq!(notifier.count(), 0);
}

#[test]
fn test_drop_releases_subscription_and_cancels() {
    let (controller, engine, _notifier) = setup(&["en-IN"]);
    controller.toggle(USES, "en").unwrap();
    assert_eq!(engine.subscriber_count(), 1);

    drop(controller);
    assert_eq!(engine.subscriber_count(), 0);
    assert_eq!(engine.cancel_count(), 1);

    // Controller memory is gone; callbacks must still be safe to call.
    engine.fire_start(1);
    engine.fire_end(1);
}

// ── Voice catalog push ──────────────────────────────────────

#[test]
fn test_catalog_loaded_after_construction() {
    let (controller, engine, notifier) = setup(&[]);
    assert!(controller.voices().is_empty());

    engine.push_voices(voices(&["ta-IN", "en-IN"]));
    assert_eq!(controller.voices().len(), 2);

    controller.toggle(USES, "en").unwrap();
    assert_eq!(engine.last_utterance().voice.unwrap().lang, "en-IN");
    assert_eq!(notifier.count(), 0);
}

#[test]
fn test_catalog_push_after_dispose_is_ignored() {
    let (controller, engine, _notifier) = setup(&["en-IN"]);
    controller.dispose();

    engine.push_voices(voices(&["ta-IN", "te-IN", "kn-IN"]));
    assert_eq!(controller.voices().len(), 1);
}
