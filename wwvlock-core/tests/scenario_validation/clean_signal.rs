//! Clean synthetic broadcast: detection counts, lock acquisition, dual-path
//! agreement, and BCD demodulation.

use wwvlock_core::calib::FILTER_DELAY_MS;
use wwvlock_core::events::{BcdSymbol, MarkerConfidence, SyncState};
use wwvlock_core::synth::{WwvSignalConfig, WwvSignalGenerator};

use super::fixtures::*;

fn clean_config() -> WwvSignalConfig {
    WwvSignalConfig {
        sample_rate_hz: TEST_RATE_HZ,
        bcd_depth: 0.5,
        subcarrier_depth: 0.2,
        ..Default::default()
    }
}

#[test]
fn test_full_cycle_detection_and_lock() {
    let mut pipeline = test_pipeline();
    let mut generator = WwvSignalGenerator::new(clean_config());
    let mut collected = Collected::default();

    // Two full minutes plus spill-over.
    feed_signal(&mut pipeline, &mut generator, 130.0, &mut collected);

    // Ticks flow at roughly one per second outside hole seconds. The first
    // ~60 s include warm-up and the initial mis-anchored minute.
    assert!(
        collected.ticks.len() >= 100,
        "tick count {}",
        collected.ticks.len()
    );

    // Holes: seconds 29 and 59 are silent, and second 0 carries the long
    // marker pulse instead of a tick.
    assert_eq!(collected.ticks_in_second_of_minute(29), 0);
    assert_eq!(collected.ticks_in_second_of_minute(59), 0);
    assert_eq!(collected.ticks_in_second_of_minute(0), 0);

    // Leading-edge reconstruction holds exactly, by construction.
    for (tick, _) in &collected.ticks {
        let reconstructed = tick.leading_edge_ms + tick.duration_ms + FILTER_DELAY_MS;
        assert!(
            (reconstructed - tick.trailing_edge_ms).abs() < 1e-9,
            "edge invariant violated: {tick:?}"
        );
    }

    // Successive ticks keep their minimum spacing.
    for pair in collected.ticks.windows(2) {
        let interval = pair[1].0.leading_edge_ms - pair[0].0.leading_edge_ms;
        assert!(interval >= 800.0, "interval {interval}");
    }

    // At least the second-minute marker confirms through the fast path.
    assert!(!collected.marks.is_empty(), "no fast markers");

    // The lock is held at the end with solid confidence.
    let context = pipeline.sync_context();
    assert_eq!(context.state, SyncState::Locked, "context {context:?}");
    assert!(context.confidence >= 0.7, "confidence {}", context.confidence);
    assert!(context.confirmed_marker_count >= 1);

    // NONE -> TENTATIVE happened on the first confirmed marker, and LOCKED
    // was reached through TENTATIVE.
    let first = collected.syncs.first().expect("no sync transitions");
    assert_eq!(first.old_state, SyncState::None);
    assert_eq!(first.new_state, SyncState::Tentative);
    assert!(collected
        .syncs
        .iter()
        .any(|t| t.new_state == SyncState::Locked));

    // BCD symbols flow only after the gate opened, and decode cleanly.
    assert!(
        collected.bcd_symbols.len() >= 20,
        "bcd symbols {}",
        collected.bcd_symbols.len()
    );
    let unknown = collected
        .bcd_symbols
        .iter()
        .filter(|s| s.symbol == BcdSymbol::Unknown)
        .count();
    assert!(
        unknown * 5 <= collected.bcd_symbols.len(),
        "{unknown} UNKNOWN of {}",
        collected.bcd_symbols.len()
    );

    // Channel quality saw the carrier.
    assert!(collected.chan.iter().any(|c| c.snr_db > 15.0));

    // Subcarrier monitor reported and saw a tone.
    assert!(!collected.subc.is_empty());
    assert!(collected.subc.iter().all(|s| s.detected));
}

#[test]
fn test_dual_path_agreement_on_marker() {
    let mut pipeline = test_pipeline();
    let mut generator = WwvSignalGenerator::new(WwvSignalConfig {
        sample_rate_hz: TEST_RATE_HZ,
        ..Default::default()
    });
    let mut collected = Collected::default();

    let confirmed = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
    {
        let confirmed = std::sync::Arc::clone(&confirmed);
        pipeline.buses.marker.subscribe(move |ev| {
            confirmed.lock().unwrap().push(ev.clone());
        });
    }

    // Warm everything through minute 0, then observe the clean marker at
    // the start of minute 1.
    feed_signal(&mut pipeline, &mut generator, 70.0, &mut collected);

    let events = confirmed.lock().unwrap();
    let highs = events
        .iter()
        .filter(|e| {
            e.confidence == MarkerConfidence::High
                && (e.timestamp_ms - 60_000.0).abs() < 1500.0
        })
        .count();
    let orphans_near_minute = events
        .iter()
        .filter(|e| {
            e.confidence == MarkerConfidence::Low
                && (e.timestamp_ms - 60_000.0).abs() < 1500.0
        })
        .count();

    assert_eq!(highs, 1, "events: {events:?}");
    assert_eq!(orphans_near_minute, 0, "events: {events:?}");
}

#[test]
fn test_no_bcd_symbols_without_subcarrier() {
    let mut pipeline = test_pipeline();
    let mut generator = WwvSignalGenerator::new(WwvSignalConfig {
        sample_rate_hz: TEST_RATE_HZ,
        bcd_depth: 0.0,
        ..Default::default()
    });
    let mut collected = Collected::default();

    feed_signal(&mut pipeline, &mut generator, 80.0, &mut collected);

    assert!(
        collected.bcd_symbols.is_empty(),
        "symbols without subcarrier: {:?}",
        collected.bcd_symbols
    );
}
