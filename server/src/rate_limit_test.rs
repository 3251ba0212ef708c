use super::*;

fn limiter(per_client: usize, global: usize) -> RateLimiter {
    RateLimiter::new(RateLimitConfig {
        per_client_limit: per_client,
        per_client_window: Duration::from_secs(10),
        global_limit: global,
        global_window: Duration::from_secs(10),
    })
}

#[test]
fn per_client_allows_up_to_limit() {
    let rl = limiter(3, 100);
    let client = Uuid::new_v4();
    let now = Instant::now();

    for i in 0..3 {
        assert!(rl.check_and_record_at(client, now).is_ok(), "broadcast {i} should pass");
    }
    assert_eq!(
        rl.check_and_record_at(client, now),
        Err(RateLimitError::PerClientExceeded { limit: 3, window_secs: 10 })
    );
}

#[test]
fn global_limit_spans_clients() {
    let rl = limiter(100, 4);
    let now = Instant::now();

    for _ in 0..4 {
        assert!(rl.check_and_record_at(Uuid::new_v4(), now).is_ok());
    }
    assert!(matches!(
        rl.check_and_record_at(Uuid::new_v4(), now),
        Err(RateLimitError::GlobalExceeded { limit: 4, .. })
    ));
}

#[test]
fn window_expiry_allows_new_broadcasts() {
    let rl = limiter(2, 100);
    let client = Uuid::new_v4();
    let start = Instant::now();

    rl.check_and_record_at(client, start).expect("first");
    rl.check_and_record_at(client, start).expect("second");
    assert!(rl.check_and_record_at(client, start).is_err());

    let after_window = start + Duration::from_secs(10) + Duration::from_millis(1);
    assert!(rl.check_and_record_at(client, after_window).is_ok());
}

#[test]
fn refused_broadcast_is_not_recorded() {
    let rl = limiter(1, 2);
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let now = Instant::now();

    rl.check_and_record_at(a, now).expect("a");
    assert!(rl.check_and_record_at(a, now).is_err());
    // a's refusal did not consume a global slot.
    assert!(rl.check_and_record_at(b, now).is_ok());
}

#[test]
fn distinct_clients_do_not_interfere() {
    let rl = limiter(1, 100);
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let now = Instant::now();

    rl.check_and_record_at(a, now).expect("a");
    assert!(rl.check_and_record_at(a, now).is_err());
    assert!(rl.check_and_record_at(b, now).is_ok());
}

#[test]
fn forget_clears_client_window() {
    let rl = limiter(1, 100);
    let client = Uuid::new_v4();
    let now = Instant::now();

    rl.check_and_record_at(client, now).expect("first");
    rl.forget(client);
    assert_eq!(rl.tracked_clients(), 0);
    assert!(rl.check_and_record_at(client, now).is_ok());
}

#[test]
fn errors_are_retryable_with_codes() {
    let err = RateLimitError::PerClientExceeded { limit: 1, window_secs: 10 };
    assert_eq!(err.error_code(), "E_RATE_LIMIT_CLIENT");
    assert!(err.retryable());
    assert_eq!(RateLimitError::GlobalExceeded { limit: 1, window_secs: 10 }.error_code(), "E_RATE_LIMIT_GLOBAL");
}

#[test]
fn hit_exactly_one_span_old_still_counts() {
    let mut window = Window::new(1, Duration::from_secs(10));
    let start = Instant::now();
    window.record(start);
    assert!(!window.has_room(start + Duration::from_secs(10)));
    assert!(window.has_room(start + Duration::from_secs(10) + Duration::from_nanos(1)));
    assert!(window.hits.is_empty());
}
