use burrow::gopher::resolver::{ResolveError, Resolver};
use burrow::gopher::selector::Selector;
use nix::errno::Errno;
use std::fs;
use std::ffi::OsStr;
use std::io::{Read, Write};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn served_root() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    fs::write(
        root.join(".cache"),
        "0Readme\t0/readme.txt\tlocalhost\t70\r\n1Docs\t1/docs\tlocalhost\t70\r\n",
    )
    .unwrap();
    fs::write(root.join("readme.txt"), "Welcome\n").unwrap();
    fs::write(root.join("unlisted.txt"), "hidden\n").unwrap();
    fs::create_dir(root.join("docs")).unwrap();
    fs::write(
        root.join("docs/.cache"),
        "0Guide\t0/docs/guide.txt\tlocalhost\t70\r\n",
    )
    .unwrap();
    fs::write(root.join("docs/guide.txt"), "Guide\n").unwrap();
    dir
}

#[test]
fn test_empty_selector_is_root_listing() {
    let root = served_root();
    let resolved = Resolver::new(root.path(), false).resolve("").unwrap();
    assert_eq!(resolved.selector, Selector::Directory);
    assert_eq!(resolved.path, PathBuf::from(".cache"));
}

#[test]
fn test_explicit_document() {
    let root = served_root();
    let resolver = Resolver::new(root.path(), false);
    for line in ["0/readme.txt", "/0/readme.txt"] {
        let mut resolved = resolver.resolve(line).unwrap();
        assert_eq!(resolved.selector, Selector::Document);
        let mut text = String::new();
        resolved.file.read_to_string(&mut text).unwrap();
        assert_eq!(text, "Welcome\n");
    }
}

#[test]
fn test_opened_files_are_read_only() {
    let root = served_root();
    let mut resolved = Resolver::new(root.path(), false).resolve("0/readme.txt").unwrap();
    assert!(resolved.file.write_all(b"overwrite").is_err());
}

#[test]
fn test_directory_serves_its_listing() {
    let root = served_root();
    let resolved = Resolver::new(root.path(), false).resolve("1/docs").unwrap();
    assert_eq!(resolved.selector, Selector::Directory);
    assert_eq!(resolved.path, Path::new("docs").join(".cache"));
}

#[test]
fn test_traversal_is_rejected() {
    let root = served_root();
    let resolver = Resolver::new(root.path(), false);
    for line in ["0/../etc/passwd", "0/docs/../../x", "1/docs/..", "0///etc/passwd"] {
        let err = resolver.resolve(line).unwrap_err();
        assert!(matches!(err, ResolveError::Traversal(_)), "{line}: {err}");
        assert_eq!(err.errno(), Errno::EACCES);
    }
}

#[test]
fn test_unknown_selector_type() {
    let root = served_root();
    let err = Resolver::new(root.path(), false).resolve("z/readme.txt").unwrap_err();
    assert!(matches!(err, ResolveError::InvalidSelector('z')));
    assert_eq!(err.errno(), Errno::EINVAL);
}

#[test]
fn test_missing_file_keeps_the_os_error() {
    let root = served_root();
    let err = Resolver::new(root.path(), false).resolve("0/missing.txt").unwrap_err();
    assert_eq!(err.errno(), Errno::ENOENT);
}

#[test]
fn test_document_selector_on_a_directory() {
    let root = served_root();
    let err = Resolver::new(root.path(), false).resolve("0/docs").unwrap_err();
    assert_eq!(err.errno(), Errno::EISDIR);
}

#[test]
fn test_implicit_selectors_come_from_the_listing() {
    let root = served_root();
    let resolver = Resolver::new(root.path(), false);

    assert_eq!(resolver.resolve("readme.txt").unwrap().selector, Selector::Document);
    assert_eq!(resolver.resolve("docs").unwrap().selector, Selector::Directory);
    assert_eq!(resolver.resolve("docs/guide.txt").unwrap().selector, Selector::Document);

    let err = resolver.resolve("unlisted.txt").unwrap_err();
    assert!(matches!(err, ResolveError::Unlisted(_)));
}

#[test]
fn test_strict_mode_needs_explicit_selectors() {
    let root = served_root();
    let resolver = Resolver::new(root.path(), true);
    assert!(matches!(
        resolver.resolve("readme.txt"),
        Err(ResolveError::InvalidSelector(_))
    ));
    assert!(resolver.resolve("0/readme.txt").is_ok());
}

#[test]
fn test_open_typed_matches_resolve() {
    let root = served_root();
    let resolved = Resolver::new(root.path(), false)
        .open_typed(Selector::Document, "/docs/guide.txt")
        .unwrap();
    assert_eq!(resolved.path, PathBuf::from("docs/guide.txt"));
}

#[test]
fn test_names_are_matched_as_bytes() {
    let root = served_root();
    fs::write(root.path().join(OsStr::from_bytes(b"caf\xe9.txt")), "latin-1\n").unwrap();
    fs::write(root.path().join("caf\u{e9}.txt"), "utf-8\n").unwrap();
    let resolver = Resolver::new(root.path(), false);

    let mut text = String::new();
    resolver
        .resolve(b"0/caf\xe9.txt")
        .unwrap()
        .file
        .read_to_string(&mut text)
        .unwrap();
    assert_eq!(text, "latin-1\n");

    text.clear();
    resolver
        .resolve("0/caf\u{e9}.txt")
        .unwrap()
        .file
        .read_to_string(&mut text)
        .unwrap();
    assert_eq!(text, "utf-8\n");

    let err = resolver.resolve(b"0/caf\xe8.txt").unwrap_err();
    assert_eq!(err.errno(), Errno::ENOENT);
}
