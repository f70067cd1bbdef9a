use super::*;

#[test]
fn default_config_is_valid() {
    let c = MemDbConfig::default();
    assert_eq!(c.time_window, 60);
    assert_eq!(c.flush_threshold, 64 * 1024 * 1024);
    assert!(c.validate().is_ok());
}

#[test]
fn zero_time_window_is_rejected() {
    let c = MemDbConfig::with_time_window(0);
    let err = c.validate().unwrap_err();
    assert!(err.to_string().contains("time window"));
}

#[test]
fn oversized_time_window_is_rejected() {
    let c = MemDbConfig::with_time_window(u16::MAX as u32 + 1);
    assert!(c.validate().is_err());
}

#[test]
fn zero_flush_threshold_is_rejected() {
    let c = MemDbConfig {
        flush_threshold: 0,
        ..MemDbConfig::default()
    };
    assert!(c.validate().is_err());
}

#[test]
fn env_or_falls_back_to_default() {
    assert_eq!(env_or("RIPTIDE_SURELY_UNSET_VARIABLE", "fallback"), "fallback");
}
