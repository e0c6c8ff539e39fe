//! Control command round trips and INI persistence.

use wwvlock_core::Tunables;

use super::fixtures::test_pipeline;

#[test]
fn test_set_command_round_trip_with_ini() {
    let dir = std::env::temp_dir().join("wwvlock-control-plane-test");
    std::fs::create_dir_all(&dir).unwrap();
    let ini_path = dir.join("roundtrip.ini");

    let mut pipeline = test_pipeline();

    let outcome = pipeline.handle_command("SET_TICK_THRESHOLD 3.5");
    assert_eq!(outcome.response, "OK threshold_multiplier=3.500");
    assert!(outcome.params_updated);

    // Host-side write-back on success.
    pipeline.tunables().save(&ini_path).unwrap();
    let (loaded, warnings) = Tunables::load(&ini_path).unwrap();
    assert!(warnings.is_empty());
    assert_eq!(loaded.tick_detector.threshold_multiplier, 3.5);

    // Rejection: response carries the range, table and INI stay put.
    let outcome = pipeline.handle_command("SET_TICK_THRESHOLD 10.0");
    assert_eq!(
        outcome.response,
        "ERR 400 Invalid threshold_multiplier=10.000 (range 1.0-5.0)"
    );
    assert!(!outcome.params_updated);
    assert_eq!(pipeline.tunables().tick_detector.threshold_multiplier, 3.5);

    let (reloaded, _) = Tunables::load(&ini_path).unwrap();
    assert_eq!(reloaded.tick_detector.threshold_multiplier, 3.5);

    std::fs::remove_file(&ini_path).ok();
}

#[test]
fn test_sync_weight_commands() {
    let mut pipeline = test_pipeline();

    for (cmd, key) in [
        ("SET_SYNC_WEIGHT_TICK 0.08", "weight_tick"),
        ("SET_SYNC_WEIGHT_MARKER 0.25", "weight_marker"),
        ("SET_SYNC_WEIGHT_P_MARKER 0.12", "weight_p_marker"),
        ("SET_SYNC_WEIGHT_TICK_HOLE 0.04", "weight_tick_hole"),
        ("SET_SYNC_WEIGHT_COMBINED 0.15", "weight_combined"),
    ] {
        let outcome = pipeline.handle_command(cmd);
        assert!(
            outcome.response.starts_with(&format!("OK {key}=")),
            "{cmd} -> {}",
            outcome.response
        );
    }

    assert_eq!(pipeline.tunables().sync_detector.weight_marker, 0.25);
}

#[test]
fn test_telemetry_mask_commands() {
    let mut pipeline = test_pipeline();

    let outcome = pipeline.handle_command("DISABLE_TELEM BCDS");
    assert_eq!(outcome.response, "OK telem_bcds=0");
    let outcome = pipeline.handle_command("ENABLE_TELEM BCDS");
    assert_eq!(outcome.response, "OK telem_bcds=1");
}
