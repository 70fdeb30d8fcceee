use pretty_assertions::assert_eq;
use relic_iso::builder::ImageBuilder;
use relic_iso::facade::{Facade, FacadeKind};

/// Walks a facade into `(path, offset, len)` triples of files, sorted by path.
fn walk(facade: &dyn Facade) -> Vec<(String, u64, u64)> {
    let mut out = Vec::new();
    let mut stack = vec![(String::new(), facade.root().unwrap())];

    while let Some((path, dir)) = stack.pop() {
        for node in facade.list_children(&dir).unwrap() {
            if node.is_dot() || node.is_dotdot() {
                continue;
            }

            let child = format!("{path}/{}", node.name());

            if node.is_dir() {
                stack.push((child, node));
            } else {
                out.push((child, node.offset(), node.len()));
            }
        }
    }

    out.sort();
    out
}

fn names(facade: &dyn Facade) -> Vec<String> {
    walk(facade).into_iter().map(|(p, _, _)| p).collect()
}

#[test]
fn plain_hierarchy_keeps_identifiers() {
    let data = ImageBuilder::new()
        .file("readme.txt", b"hi")
        .file("foo/bar.txt", b"0123456789")
        .build();
    let iso = relic_iso::open_slice(&data).unwrap();

    assert!(!iso.has_joliet());
    assert!(!iso.has_rock_ridge());
    assert!(!iso.has_udf());
    assert_eq!(iso.volume_id(), "RELIC");

    let facade = iso.facade(FacadeKind::Iso9660).unwrap();

    assert_eq!(facade.kind(), FacadeKind::Iso9660);
    assert_eq!(names(&*facade), vec!["/FOO/BAR.TXT;1", "/README.TXT;1"]);
}

#[test]
fn pinned_extent_is_reported() {
    let data = ImageBuilder::new()
        .file_at("foo/bar.txt", 1, b"0123456789")
        .build();
    let iso = relic_iso::open_slice(&data).unwrap();
    let facade = iso.facade(FacadeKind::Iso9660).unwrap();

    assert_eq!(
        walk(&*facade),
        vec![("/FOO/BAR.TXT;1".to_owned(), 2048, 10)]
    );
    assert_eq!(&data[2048..2058], b"0123456789");
}

#[test]
fn joliet_names() {
    let data = ImageBuilder::new()
        .file("Docs/Übersicht.txt", b"x")
        .joliet(true)
        .build();
    let iso = relic_iso::open_slice(&data).unwrap();
    let facade = iso.facade(FacadeKind::Joliet).unwrap();

    assert_eq!(names(&*facade), vec!["/Docs/Übersicht.txt;1"]);
}

#[test]
fn rock_ridge_names() {
    let data = ImageBuilder::new()
        .file("src/main.rs", b"fn main() {}")
        .dir("empty")
        .rock_ridge(true)
        .build();
    let iso = relic_iso::open_slice(&data).unwrap();

    assert!(iso.has_rock_ridge());

    let facade = iso.facade(FacadeKind::RockRidge).unwrap();
    let root = facade.root().unwrap();
    let top: Vec<_> = facade
        .list_children(&root)
        .unwrap()
        .into_iter()
        .filter(|n| !n.is_dot() && !n.is_dotdot())
        .map(|n| (n.name().to_owned(), n.is_dir()))
        .collect();

    assert_eq!(
        top,
        vec![("empty".to_owned(), true), ("src".to_owned(), true)]
    );
    assert_eq!(names(&*facade), vec!["/src/main.rs"]);
}

#[test]
fn udf_file_set() {
    let data = ImageBuilder::new()
        .file("a/b/c.bin", &[7u8; 5000])
        .file("top.txt", b"top")
        .udf(true)
        .build();
    let iso = relic_iso::open_slice(&data).unwrap();

    assert!(iso.has_udf());

    let facade = iso.facade(FacadeKind::Udf).unwrap();
    let files = walk(&*facade);

    assert_eq!(files.len(), 2);
    assert_eq!(files[0].0, "/a/b/c.bin");
    assert_eq!(files[0].2, 5000);
    assert_eq!(files[1].0, "/top.txt");

    let (_, offset, len) = &files[1];
    assert_eq!(&data[*offset as usize..(*offset + *len) as usize], b"top");
}

#[test]
fn all_layers_share_file_data() {
    let data = ImageBuilder::new()
        .file("dir/file.dat", b"shared")
        .joliet(true)
        .rock_ridge(true)
        .udf(true)
        .build();
    let iso = relic_iso::open_slice(&data).unwrap();

    let kinds: Vec<_> = iso.facades().collect();
    assert_eq!(
        kinds,
        vec![
            FacadeKind::Joliet,
            FacadeKind::RockRidge,
            FacadeKind::Udf,
            FacadeKind::Iso9660
        ]
    );

    let extents: Vec<_> = kinds
        .iter()
        .map(|&k| {
            let facade = iso.facade(k).unwrap();
            let files = walk(&*facade);
            (files[0].1, files[0].2)
        })
        .collect();

    assert!(extents.windows(2).all(|w| w[0] == w[1]));
}

#[test]
fn missing_layers_have_no_facade() {
    let data = ImageBuilder::new().file("x", b"").build();
    let iso = relic_iso::open_slice(&data).unwrap();

    assert!(iso.facade(FacadeKind::Joliet).is_none());
    assert!(iso.facade(FacadeKind::RockRidge).is_none());
    assert!(iso.facade(FacadeKind::Udf).is_none());
    assert_eq!(iso.facades().collect::<Vec<_>>(), vec![FacadeKind::Iso9660]);
}

#[test]
fn not_an_image() {
    let data = vec![0u8; 64 * relic_iso::SECTOR_SIZE];

    assert!(matches!(
        relic_iso::open_slice(&data),
        Err(relic_iso::OpenError::NoPrimaryDescriptor)
    ));
}
