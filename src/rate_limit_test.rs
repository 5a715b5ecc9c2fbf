use std::net::Ipv4Addr;

use super::*;

fn ip(last: u8) -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
}

fn limiter(per_client_limit: usize, global_limit: usize) -> RateLimiter {
    RateLimiter::new(RateLimitConfig { per_client_limit, global_limit, window: Duration::from_secs(60) })
}

#[test]
fn per_client_allows_up_to_limit() {
    let rl = limiter(3, 100);
    let now = Instant::now();

    for i in 0..3 {
        assert!(rl.check_and_record_at(ip(1), now).is_ok(), "submission {i} should pass");
    }
    assert_eq!(
        rl.check_and_record_at(ip(1), now),
        Err(RateLimitError::PerClientExceeded { limit: 3, window_secs: 60 })
    );
    // Another client is unaffected.
    assert!(rl.check_and_record_at(ip(2), now).is_ok());
}

#[test]
fn global_allows_up_to_limit() {
    let rl = limiter(10, 4);
    let now = Instant::now();

    for i in 0..4 {
        assert!(rl.check_and_record_at(ip(i), now).is_ok());
    }
    assert_eq!(
        rl.check_and_record_at(ip(99), now),
        Err(RateLimitError::GlobalExceeded { limit: 4, window_secs: 60 })
    );
}

#[test]
fn window_expiry_allows_new_submissions() {
    let rl = limiter(2, 100);
    let start = Instant::now();

    rl.check_and_record_at(ip(1), start).unwrap();
    rl.check_and_record_at(ip(1), start).unwrap();
    assert!(rl.check_and_record_at(ip(1), start).is_err());

    let later = start + Duration::from_secs(61);
    assert!(rl.check_and_record_at(ip(1), later).is_ok());
}

#[test]
fn rejected_attempts_are_not_recorded() {
    let rl = limiter(1, 100);
    let start = Instant::now();

    rl.check_and_record_at(ip(1), start).unwrap();
    for _ in 0..10 {
        assert!(rl.check_and_record_at(ip(1), start + Duration::from_secs(30)).is_err());
    }
    assert!(rl.check_and_record_at(ip(1), start + Duration::from_secs(61)).is_ok());
}

#[test]
fn prune_idle_forgets_quiet_clients() {
    let rl = limiter(5, 100);
    let start = Instant::now();
    rl.check_and_record_at(ip(1), start).unwrap();
    rl.check_and_record_at(ip(2), start + Duration::from_secs(50)).unwrap();

    rl.prune_idle_at(start + Duration::from_secs(70));
    assert_eq!(rl.tracked_clients(), 1);
}

#[test]
fn errors_are_retryable_with_codes() {
    let err = RateLimitError::PerClientExceeded { limit: 1, window_secs: 60 };
    assert!(err.retryable());
    assert_eq!(err.error_code(), "E_RATE_LIMIT_CLIENT");
}

#[test]
fn default_config_matches_constants() {
    let cfg = RateLimitConfig::default();
    assert_eq!(cfg.per_client_limit, DEFAULT_PER_CLIENT_LIMIT);
    assert_eq!(cfg.global_limit, DEFAULT_GLOBAL_LIMIT);
    assert_eq!(cfg.window, Duration::from_secs(DEFAULT_WINDOW_SECS));
}
