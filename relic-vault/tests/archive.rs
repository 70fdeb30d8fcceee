#![allow(clippy::unwrap_used)]

mod common;

use common::{archive_exe, read_all};
use pretty_assertions::assert_eq;
use relic_vault::{
    ArchiveContainer, Container, Kind, OpenArchiveError, OpenError, SilentProgress,
    content_digest_header, open_container, verify,
};
use sha2::{Digest, Sha256};

#[test]
fn hello_entry() {
    let tmp = tempfile::tempdir().unwrap();
    let exe = tmp.path().join("game.exe");
    archive_exe(&exe, &[("a.txt", b"hello")]);

    let archive = ArchiveContainer::open(&exe).unwrap();
    let digest: [u8; 32] = Sha256::digest(b"hello").into();

    assert_eq!(archive.exe_eof(), 0x600);
    assert!(archive.exists("/a.txt"));
    assert!(!archive.exists("a.txt"));
    assert!(!archive.exists("/b.txt"));
    assert_eq!(archive.size("/a.txt").unwrap(), 5);

    // Known without reading anything.
    assert_eq!(archive.checksum("/a.txt").unwrap(), Some(digest));
    assert_eq!(
        content_digest_header(&digest),
        "sha-256=:LPJNul+wow4m6DsqxbninhsWHlwfp0JecwQzYpOLmCQ=:"
    );

    let chunks: Vec<_> = archive.stream("/a.txt").unwrap().collect();
    assert_eq!(chunks.len(), 1);
    assert_eq!(&*chunks[0], b"hello");

    assert!(archive.checksum("/b.txt").is_err());
}

#[test]
fn entries_and_paths() {
    let tmp = tempfile::tempdir().unwrap();
    let exe = tmp.path().join("game.exe");
    let movie = vec![0x46u8; 20_000];
    archive_exe(
        &exe,
        &[("main.swf", &movie), ("data/level1.xml", b"<level/>"), ("last", b"")],
    );

    let archive = open_container(Kind::Swfkit, &exe).unwrap();

    assert_eq!(archive.paths(), vec!["/data/level1.xml", "/last", "/main.swf"]);
    assert_eq!(read_all(&*archive, "/main.swf"), movie);
    assert_eq!(archive.size("/last").unwrap(), 0);
    assert_eq!(read_all(&*archive, "/last"), b"");

    let verified = verify(&*archive, &SilentProgress).unwrap();

    assert_eq!(verified.len(), 3);
    assert_eq!(verified[2].path, "/main.swf");
    assert_eq!(verified[2].size, 20_000);
    assert_eq!(verified[2].digest, <[u8; 32]>::from(Sha256::digest(&movie)));
}

#[test]
fn open_errors() {
    let tmp = tempfile::tempdir().unwrap();

    assert!(matches!(
        ArchiveContainer::open(tmp.path()),
        Err(OpenArchiveError::NotAFile { .. })
    ));

    let plain = tmp.path().join("plain.exe");
    std::fs::write(&plain, b"not an executable").unwrap();

    assert!(matches!(
        ArchiveContainer::open(&plain),
        Err(OpenArchiveError::ParseArchiveFailed { .. })
    ));
    assert!(matches!(
        open_container(Kind::Swfkit, &plain),
        Err(OpenError::OpenArchiveFailed { .. })
    ));
}
