use burrow::config::Config;
use burrow::gopher::resolver::Resolver;
use burrow::hitlog::HitLog;
use burrow::server::Services;
use burrow::server::dispatcher::Dispatcher;
use burrow::server::listener::Listener;
use burrow::server::signals::SignalFlags;
use signal_hook::consts::{SIGTERM, SIGUSR1};
use signal_hook::low_level::raise;
use std::fs;
use std::thread;
use std::time::Duration;

fn wait_for(mut done: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(50));
    }
    false
}

// Handlers are process wide, so everything signal related lives in this one test.
#[test]
fn test_signals_wake_an_idle_dispatcher() {
    let root = tempfile::tempdir().unwrap();
    let logs = tempfile::tempdir().unwrap();
    let log = logs.path().join("hits.log");
    let rotated = logs.path().join("hits.log.1");

    let cfg = Config {
        listen_addr: "127.0.0.1:0".to_string(),
        hostname: "localhost".to_string(),
        max_requests: 4,
        cache_entries: 8,
        ..Config::default()
    };
    let listener = Listener::bind(cfg.socket_addr().unwrap()).unwrap();
    let hitlog = HitLog::open(&log, false, false).unwrap();
    let services = Services::new(&cfg, Resolver::new(root.path(), false), hitlog);

    let signals = SignalFlags::new();
    let wake = signals.install().unwrap();
    let mut dispatcher = Dispatcher::new(listener, services, &cfg)
        .unwrap()
        .with_signals(signals, wake)
        .unwrap();
    let server = thread::spawn(move || dispatcher.run().unwrap());

    // No connections, so the loop is parked in a wait without a timeout.
    thread::sleep(Duration::from_millis(200));

    fs::rename(&log, &rotated).unwrap();
    raise(SIGUSR1).unwrap();
    assert!(wait_for(|| log.exists()), "hit log was not reopened");

    raise(SIGTERM).unwrap();
    assert!(wait_for(|| server.is_finished()), "dispatcher ignored SIGTERM");
    server.join().unwrap();
}
