//! Degraded-input scenarios: noise only, fade, and transport disconnect.

use wwvlock_core::events::SyncState;
use wwvlock_core::synth::{NoiseGenerator, WwvSignalConfig, WwvSignalGenerator};
use wwvlock_core::Tunables;

use super::fixtures::*;

#[test]
fn test_noise_only_stays_unlocked() {
    let mut pipeline = test_pipeline();
    let mut generator = NoiseGenerator::new(0.05, 7);
    let mut collected = Collected::default();

    feed_noise(&mut pipeline, &mut generator, 30.0, &mut collected);

    assert!(collected.marks.is_empty(), "markers in noise: {:?}", collected.marks);
    assert!(collected.bcd_symbols.is_empty());

    let context = pipeline.sync_context();
    assert_eq!(context.state, SyncState::None);
    assert!(context.confidence <= 0.1, "confidence {}", context.confidence);

    // The matched-filter gate keeps noise excursions from classifying as
    // ticks once the floors have settled.
    let late_ticks = collected
        .ticks
        .iter()
        .filter(|(t, _)| t.leading_edge_ms > 10_000.0)
        .count();
    assert!(late_ticks <= 3, "{late_ticks} ticks in settled noise");
}

/// Faster sync decay so the degradation scenarios run in test time.
fn impatient_tunables() -> Tunables {
    let mut tunables = Tunables::default();
    tunables.sync_detector.staleness_ms = 20_000.0;
    tunables.sync_detector.decay_normal = 0.002;
    tunables.sync_detector.decay_recovering = 0.01;
    tunables
}

#[test]
fn test_gradual_fade_degrades_through_recovering() {
    let mut pipeline = test_pipeline();
    pipeline.apply_tunables(impatient_tunables());

    let mut generator = WwvSignalGenerator::new(WwvSignalConfig {
        sample_rate_hz: TEST_RATE_HZ,
        noise_std: 0.005,
        ..Default::default()
    });
    let mut collected = Collected::default();

    // Clean portion long enough to lock on the second minute's marker and
    // build confidence headroom.
    feed_signal(&mut pipeline, &mut generator, 130.0, &mut collected);
    assert_eq!(
        pipeline.sync_context().state,
        SyncState::Locked,
        "pre-fade context: {:?}",
        pipeline.sync_context()
    );

    // Linear fade to -60 dB over 20 s, in 100 ms steps.
    for step in 0..200 {
        generator.gain = (1.0 - step as f64 / 200.0).max(0.001);
        feed_signal(&mut pipeline, &mut generator, 0.1, &mut collected);
    }
    generator.gain = 0.001;

    // Dead carrier long past the staleness bound.
    feed_signal(&mut pipeline, &mut generator, 40.0, &mut collected);

    let context = pipeline.sync_context();
    assert_ne!(context.state, SyncState::Locked, "context {context:?}");
    assert!(
        context.confidence < 0.7,
        "confidence {}",
        context.confidence
    );

    // The walk down went through RECOVERING, never straight out of LOCKED.
    let exits: Vec<_> = collected
        .syncs
        .iter()
        .filter(|t| t.old_state == SyncState::Locked)
        .collect();
    assert!(!exits.is_empty());
    assert!(exits.iter().all(|t| t.new_state == SyncState::Recovering));
}

#[test]
fn test_disconnect_and_reconnect() {
    let mut pipeline = test_pipeline();
    let mut generator = WwvSignalGenerator::new(WwvSignalConfig {
        sample_rate_hz: TEST_RATE_HZ,
        ..Default::default()
    });
    let mut collected = Collected::default();

    feed_signal(&mut pipeline, &mut generator, 80.0, &mut collected);
    assert_eq!(pipeline.sync_context().state, SyncState::Locked);
    assert_eq!(pipeline.reset_count(), 0);

    // Transport outage: the broadcast continues without us for 5 s.
    let lost = (5.0 * TEST_RATE_HZ as f64) as usize;
    let _ = generator.next_block(lost);

    // Reconnect delivers reset=true exactly once, clearing DSP state.
    let (i, q) = generator.next_block(BLOCK);
    pipeline.on_samples(&i, &q, true).expect("on_samples");
    collected.absorb(pipeline.drain_telemetry());
    assert_eq!(pipeline.reset_count(), 1);

    let context = pipeline.sync_context();
    assert!(
        matches!(context.state, SyncState::Recovering | SyncState::Tentative | SyncState::None),
        "post-reset context {context:?}"
    );

    // Fresh clean minutes re-anchor and recover the lock.
    feed_signal(&mut pipeline, &mut generator, 130.0, &mut collected);
    assert_eq!(
        pipeline.sync_context().state,
        SyncState::Locked,
        "post-recovery context: {:?}",
        pipeline.sync_context()
    );
    assert_eq!(pipeline.reset_count(), 1);
}
