#![allow(clippy::unwrap_used)]

mod common;

use common::{disc_dir, read_all};
use pretty_assertions::assert_eq;
use relic_iso::builder::ImageBuilder;
use relic_iso::facade::FacadeKind;
use relic_vault::defect::DefectRange;
use relic_vault::disc::CHUNK_SIZE;
use relic_vault::{Container, DiscImage, LookupError, OpenDiscError};
use sha2::{Digest, Sha256};

fn pinned() -> ImageBuilder {
    ImageBuilder::new()
        .file_at("foo/bar.txt", 1, b"0123456789")
        .joliet(true)
}

#[test]
fn pinned_file_is_addressable() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = disc_dir(tmp.path(), "disc", pinned(), None);
    let disc = DiscImage::open(&dir).unwrap();

    assert_eq!(disc.facade(), FacadeKind::Joliet);
    assert!(disc.exists("/foo/bar.txt"));
    assert!(!disc.exists("/nope"));
    assert!(!disc.exists("/foo"));
    assert_eq!(disc.size("/foo/bar.txt").unwrap(), 10);
    assert_eq!(disc.entry("/foo/bar.txt").unwrap().range(), 2048..2058);
    assert_eq!(read_all(&disc, "/foo/bar.txt"), b"0123456789");
    assert_eq!(disc.paths(), vec!["/foo/bar.txt"]);
    assert!(disc.defects().is_empty());
    assert!(disc.errored_paths().is_empty());

    assert!(matches!(
        disc.size("/nope"),
        Err(LookupError::PathNotFound { path }) if path == "/nope"
    ));
    assert!(disc.stream("/foo").is_err());
}

#[test]
fn chunks_add_up_to_size() {
    let big: Vec<u8> = (0..3 * CHUNK_SIZE + 123).map(|i| (i % 251) as u8).collect();
    let tmp = tempfile::tempdir().unwrap();
    let dir = disc_dir(
        tmp.path(),
        "disc",
        ImageBuilder::new()
            .file("big.bin", &big)
            .file("empty.bin", b"")
            .joliet(true),
        None,
    );
    let disc = DiscImage::open(&dir).unwrap();

    let sizes: Vec<usize> = disc.stream("/big.bin").unwrap().map(|c| c.len()).collect();
    assert_eq!(sizes, vec![CHUNK_SIZE, CHUNK_SIZE, CHUNK_SIZE, 123]);
    assert_eq!(read_all(&disc, "/big.bin"), big);

    assert_eq!(disc.size("/empty.bin").unwrap(), 0);
    assert_eq!(disc.stream("/empty.bin").unwrap().count(), 0);
    assert_eq!(
        disc.checksum("/empty.bin").unwrap(),
        Some(Sha256::digest(b"").into())
    );
}

#[test]
fn checksum_is_lazy() {
    let content = vec![0xA5u8; 2 * CHUNK_SIZE + 1];
    let expected: [u8; 32] = Sha256::digest(&content).into();
    let tmp = tempfile::tempdir().unwrap();
    let dir = disc_dir(
        tmp.path(),
        "disc",
        ImageBuilder::new().file("data.bin", &content).joliet(true),
        None,
    );
    let disc = DiscImage::open(&dir).unwrap();

    assert_eq!(disc.checksum("/data.bin").unwrap(), None);

    // An abandoned stream commits nothing.
    let first = disc.stream("/data.bin").unwrap().next().unwrap();
    assert_eq!(first.len(), CHUNK_SIZE);
    assert_eq!(disc.checksum("/data.bin").unwrap(), None);

    read_all(&disc, "/data.bin");
    assert_eq!(disc.checksum("/data.bin").unwrap(), Some(expected));

    read_all(&disc, "/data.bin");
    assert_eq!(disc.checksum("/data.bin").unwrap(), Some(expected));

    disc.clear_checksums();
    assert_eq!(disc.checksum("/data.bin").unwrap(), None);

    read_all(&disc, "/data.bin");
    assert_eq!(disc.checksum("/data.bin").unwrap(), Some(expected));
}

#[test]
fn concurrent_streams_agree() {
    let content: Vec<u8> = (0..5 * CHUNK_SIZE).map(|i| (i * 7 % 256) as u8).collect();
    let tmp = tempfile::tempdir().unwrap();
    let dir = disc_dir(
        tmp.path(),
        "disc",
        ImageBuilder::new().file("x.bin", &content),
        None,
    );
    let disc = DiscImage::open(&dir).unwrap();

    std::thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| assert_eq!(read_all(&disc, "/X.BIN"), content));
        }
    });

    assert_eq!(
        disc.checksum("/X.BIN").unwrap(),
        Some(Sha256::digest(&content).into())
    );
}

#[test]
fn facade_priority() {
    let tmp = tempfile::tempdir().unwrap();
    let image = || ImageBuilder::new().file("Dir/Name.txt", b"n");

    let cases = [
        ("plain", image(), FacadeKind::Iso9660, "/DIR/NAME.TXT"),
        ("udf", image().udf(true), FacadeKind::Udf, "/Dir/Name.txt"),
        (
            "rr_udf",
            image().rock_ridge(true).udf(true),
            FacadeKind::RockRidge,
            "/Dir/Name.txt",
        ),
        (
            "all",
            image().joliet(true).rock_ridge(true).udf(true),
            FacadeKind::Joliet,
            "/Dir/Name.txt",
        ),
    ];

    for (name, builder, facade, path) in cases {
        let dir = disc_dir(tmp.path(), name, builder, None);
        let disc = DiscImage::open(&dir).unwrap();

        assert_eq!(disc.facade(), facade, "{name}");
        assert_eq!(disc.paths(), vec![path], "{name}");
        assert_eq!(read_all(&disc, path), b"n", "{name}");
    }
}

#[test]
fn defect_boundaries() {
    let tmp = tempfile::tempdir().unwrap();
    let cases = [
        // Defect starts on the file's last byte + 1.
        ("touching_end", "2058 100 -\n", true),
        ("past_end", "2059 100 -\n", false),
        // Defect ends exactly on the file's first byte.
        ("touching_start", "0 2048 -\n", true),
        ("before_start", "0 2047 -\n", false),
        ("good_range", "2048 10 +\n", false),
        ("inside", "0x0000 0x2000 -\n", true),
    ];

    for (name, mapfile, errored) in cases {
        let dir = disc_dir(tmp.path(), name, pinned(), Some(mapfile));
        let disc = DiscImage::open(&dir).unwrap();

        assert_eq!(disc.errored_paths().len(), usize::from(errored), "{name}");

        // Reads are never affected.
        assert_eq!(read_all(&disc, "/foo/bar.txt"), b"0123456789", "{name}");
    }
}

#[test]
fn mapfile_is_parsed() {
    let mapfile = "\
# Mapfile. Created by GNU ddrescue version 1.27
# current_pos  current_status  current_pass
0x00000800     +               1
#      pos        size  status
0x00000000  0x00000800  +
0x00000800  0x00000004  -
0x00000804  0x00100000  +
";
    let tmp = tempfile::tempdir().unwrap();
    let dir = disc_dir(
        tmp.path(),
        "disc",
        pinned().file("other.txt", b"untouched"),
        Some(mapfile),
    );
    let disc = DiscImage::open(&dir).unwrap();

    assert_eq!(disc.defects(), &[DefectRange::new(0x800, 0x804)]);
    assert_eq!(disc.errored_paths(), &["/foo/bar.txt".to_owned()]);
}

#[test]
fn invalid_mapfile_is_an_open_error() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = disc_dir(tmp.path(), "disc", pinned(), Some("0x800 zz -\n"));

    assert!(matches!(
        DiscImage::open(&dir),
        Err(OpenDiscError::ParseMapfileFailed { .. })
    ));
}

#[test]
fn open_errors() {
    let tmp = tempfile::tempdir().unwrap();

    assert!(matches!(
        DiscImage::open(&tmp.path().join("missing")),
        Err(OpenDiscError::NotADirectory { .. })
    ));

    let empty = tmp.path().join("empty");
    std::fs::create_dir(&empty).unwrap();

    assert!(matches!(
        DiscImage::open(&empty),
        Err(OpenDiscError::MissingImage { .. })
    ));

    let junk = tmp.path().join("junk");
    std::fs::create_dir(&junk).unwrap();
    std::fs::write(junk.join("cdimage"), vec![0u8; 64 * 2048]).unwrap();

    assert!(matches!(
        DiscImage::open(&junk),
        Err(OpenDiscError::ParseImageFailed { .. })
    ));
}

/// Points the root's child directory `name` at the root's own extent.
fn loop_back(image: &mut [u8], name: &[u8]) {
    let root_record = 16 * 2048 + 156;
    let root_extent: [u8; 16] = image[root_record + 2..root_record + 18].try_into().unwrap();
    let root_lba = u32::from_le_bytes(root_extent[0..4].try_into().unwrap()) as usize;
    let root_len = u32::from_le_bytes(root_extent[8..12].try_into().unwrap()) as usize;

    let dir = root_lba * 2048;
    let mut pos = 0;

    while pos < root_len && image[dir + pos] != 0 {
        let len = image[dir + pos] as usize;
        let id_len = image[dir + pos + 32] as usize;

        if &image[dir + pos + 33..dir + pos + 33 + id_len] == name {
            image[dir + pos + 2..dir + pos + 18].copy_from_slice(&root_extent);
            return;
        }

        pos += len;
    }

    panic!("no record named {name:?}");
}

#[test]
fn directory_loop_is_an_open_error() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = disc_dir(tmp.path(), "disc", ImageBuilder::new().dir("a/b"), None);
    let image = dir.join("cdimage");

    let mut data = std::fs::read(&image).unwrap();
    loop_back(&mut data, b"A");
    std::fs::write(&image, data).unwrap();

    assert!(matches!(
        DiscImage::open(&dir),
        Err(OpenDiscError::DirectoryLoop { path }) if path == "/A"
    ));
}
