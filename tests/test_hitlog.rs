use burrow::hitlog::{Hit, HitLog, HitRequest, format_hit, is_local};
use chrono::{Local, TimeZone};
use std::net::{IpAddr, SocketAddr};

fn when() -> chrono::DateTime<Local> {
    Local.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap()
}

fn peer(ip: &str) -> Option<SocketAddr> {
    Some(SocketAddr::new(ip.parse().unwrap(), 40000))
}

#[test]
fn test_gopher_hit_line() {
    let hit = Hit {
        peer: peer("10.1.2.3"),
        request: HitRequest::Gopher {
            selector: Some(b"0/readme.txt".as_slice()),
        },
        status: 200,
        bytes: 123,
    };
    let line = format_hit(&hit, when(), false);
    assert!(line.starts_with("10.1.2.3 - - [05/Mar/2024:14:07:09 "));
    assert!(line.ends_with("] \"GET 0/readme.txt\" 200 123\n"));
}

#[test]
fn test_gopher_hit_names_empty_requests() {
    let root = Hit {
        peer: peer("10.1.2.3"),
        request: HitRequest::Gopher { selector: Some(b"".as_slice()) },
        status: 200,
        bytes: 10,
    };
    assert!(format_hit(&root, when(), false).contains("\"GET /\" 200 10"));

    let nothing = Hit {
        peer: peer("10.1.2.3"),
        request: HitRequest::Gopher { selector: None },
        status: 408,
        bytes: 0,
    };
    assert!(format_hit(&nothing, when(), false).contains("\"GET [Empty]\" 408 0"));
}

#[test]
fn test_http_hit_line() {
    let hit = Hit {
        peer: peer("10.1.2.3"),
        request: HitRequest::Http {
            method: "HEAD",
            target: "/0/readme.txt",
            referer: None,
            user_agent: Some("lynx"),
        },
        status: 200,
        bytes: 80,
    };
    let common = format_hit(&hit, when(), false);
    assert!(common.ends_with("] \"HEAD /0/readme.txt\" 200 80\n"));

    let combined = format_hit(&hit, when(), true);
    assert!(combined.ends_with("] \"HEAD /0/readme.txt\" 200 80 \"-\" \"lynx\"\n"));
}

#[test]
fn test_local_addresses() {
    assert!(is_local("127.0.0.1".parse::<IpAddr>().unwrap()));
    assert!(is_local("::1".parse::<IpAddr>().unwrap()));
    assert!(is_local("192.168.7.1".parse::<IpAddr>().unwrap()));
    assert!(!is_local("192.169.0.1".parse::<IpAddr>().unwrap()));
    assert!(!is_local("10.0.0.1".parse::<IpAddr>().unwrap()));
}

#[test]
fn test_local_hits_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hits.log");
    let mut log = HitLog::open(&path, true, false).unwrap();
    assert!(log.is_enabled());

    for ip in ["127.0.0.1", "203.0.113.9"] {
        log.record(&Hit {
            peer: peer(ip),
            request: HitRequest::Gopher { selector: Some(b"0/x".as_slice()) },
            status: 200,
            bytes: 1,
        });
    }
    log.close();

    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(text.lines().count(), 1);
    assert!(text.starts_with("203.0.113.9 "));
}

#[test]
fn test_reopen_follows_a_rotated_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hits.log");
    let rotated = dir.path().join("hits.log.1");
    let mut log = HitLog::open(&path, false, false).unwrap();

    let hit = Hit {
        peer: peer("127.0.0.1"),
        request: HitRequest::Gopher { selector: Some(b"0/x".as_slice()) },
        status: 200,
        bytes: 1,
    };
    log.record(&hit);
    std::fs::rename(&path, &rotated).unwrap();
    log.reopen().unwrap();
    log.record(&hit);
    log.close();

    assert_eq!(std::fs::read_to_string(&rotated).unwrap().lines().count(), 1);
    assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 1);
}

#[test]
fn test_disabled_log_records_nothing() {
    let mut log = HitLog::disabled();
    assert!(!log.is_enabled());
    assert!(log.reopen().is_ok());
}

#[test]
fn test_closed_log_stops_recording() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hits.log");
    let mut log = HitLog::open(&path, false, false).unwrap();
    let hit = Hit {
        peer: peer("203.0.113.9"),
        request: HitRequest::Gopher { selector: Some(b"0/x".as_slice()) },
        status: 200,
        bytes: 1,
    };

    log.record(&hit);
    log.close();
    assert!(!log.is_enabled());
    log.record(&hit);
    log.close();

    assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 1);
}
