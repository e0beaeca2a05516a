use burrow::server::bootstrap::create_pidfile;
use std::fs;

#[test]
fn test_pidfile_is_created() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("burrow.pid");

    create_pidfile(&path).unwrap();
    let text = fs::read_to_string(&path).unwrap();
    assert_eq!(text, format!("{}\n", std::process::id()));
}

#[test]
fn test_live_pid_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("burrow.pid");
    fs::write(&path, format!("{}\n", std::process::id())).unwrap();

    let err = create_pidfile(&path).unwrap_err();
    assert!(err.to_string().contains("already running"));
}

#[test]
fn test_garbled_pidfile_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("burrow.pid");
    fs::write(&path, "not a pid\n").unwrap();

    assert!(create_pidfile(&path).is_err());
    assert_eq!(fs::read_to_string(&path).unwrap(), "not a pid\n");
}

#[test]
fn test_stale_pid_is_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("burrow.pid");
    // Above the kernel's pid_max, so no process can hold it.
    fs::write(&path, "2147483646\n").unwrap();

    create_pidfile(&path).unwrap();
    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        format!("{}\n", std::process::id())
    );
}
