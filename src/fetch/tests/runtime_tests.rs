use super::*;
use std::time::Instant;

#[test]
fn test_returns_the_future_output() {
    assert_eq!(run(async { 40 + 2 }, SHUTDOWN_GRACE).unwrap(), 42);
}

#[test]
fn test_shutdown_does_not_wait_for_stuck_blocking_work() {
    let started = Instant::now();
    let output = run(
        async {
            // Detached like a fetch whose timeout already fired.
            let _stuck = tokio::task::spawn_blocking(|| std::thread::sleep(Duration::from_secs(5)));
            "done"
        },
        Duration::from_millis(100),
    )
    .unwrap();

    assert_eq!(output, "done");
    assert!(started.elapsed() < Duration::from_secs(2));
}
