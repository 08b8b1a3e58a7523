use snap::cache::{hash_file, hash_path, CacheEntry, CacheTree};
use temp_dir::TempDir;

fn webroot_with(files: &[(&str, &[u8])]) -> (TempDir, String) {
    let dir = TempDir::new().unwrap();
    for (name, contents) in files {
        let path = dir.path().join("webpages").join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }
    let webroot = dir.path().to_string_lossy().into_owned();
    (dir, webroot)
}

#[test]
fn content_hash_is_byte_sum() {
    let (dir, _webroot) = webroot_with(&[("a.txt", b"abc")]);
    let path = dir.path().join("webpages").join("a.txt");
    // 5381 + 'a' + 'b' + 'c'
    assert_eq!(5381 + 97 + 98 + 99, hash_file(&path).unwrap());
}

#[test]
fn entry_fingerprint() {
    let (dir, _webroot) = webroot_with(&[("a.txt", b"abc")]);
    let path = dir.path().join("webpages").join("a.txt");
    let entry = CacheEntry::new(&path).unwrap();
    assert_eq!(hash_path(&path.to_string_lossy()), entry.path_hash);
    assert_eq!(5381 + 97 + 98 + 99, entry.file_hash);
    assert!(entry.last_modified.unwrap().ends_with(" GMT"));
}

#[test]
fn build_indexes_resolved_paths() {
    let (_dir, webroot) = webroot_with(&[
        ("landing.html", b"hello".as_slice()),
        ("css/site.css", b"body{}".as_slice()),
    ]);
    let tree = CacheTree::build(&webroot).unwrap();
    assert_eq!(2, tree.len());
    // The lookup key is the same string the handler resolves.
    let entry = tree.lookup(&format!("{webroot}/webpages/landing.html")).unwrap();
    assert_eq!(5381 + 104 + 101 + 108 + 108 + 111, entry.file_hash);
    assert!(tree.lookup(&format!("{webroot}/webpages/css/site.css")).is_some());
    assert!(tree.lookup(&format!("{webroot}/webpages/missing.html")).is_none());
}

#[test]
fn videos_are_not_indexed() {
    let (_dir, webroot) = webroot_with(&[
        ("landing.html", b"hello".as_slice()),
        ("videos/clip.mp4", b"frames".as_slice()),
        ("videos/nested/clip2.mp4", b"frames".as_slice()),
    ]);
    let tree = CacheTree::build(&webroot).unwrap();
    assert_eq!(1, tree.len());
    assert!(tree
        .lookup(&format!("{webroot}/webpages/videos/clip.mp4"))
        .is_none());
}

#[test]
fn build_fails_without_webpages_dir() {
    let dir = TempDir::new().unwrap();
    let webroot = dir.path().to_string_lossy().into_owned();
    assert!(CacheTree::build(&webroot).is_err());
}

#[test]
fn rebuild_observes_changed_contents() {
    let (dir, webroot) = webroot_with(&[("a.txt", b"abc")]);
    let old_tree = CacheTree::build(&webroot).unwrap();
    let path = dir.path().join("webpages").join("a.txt");
    let key = path.to_string_lossy().into_owned();
    std::fs::write(&path, b"abcd").unwrap();
    let new_tree = CacheTree::build(&webroot).unwrap();
    // The old snapshot is untouched; the replacement sees the new bytes.
    assert_eq!(5381 + 97 + 98 + 99, old_tree.lookup(&key).unwrap().file_hash);
    assert_eq!(
        5381 + 97 + 98 + 99 + 100,
        new_tree.lookup(&key).unwrap().file_hash
    );
}
