use minibk::archive::{self, PackOptions};
use minibk::{
    ArchiveError, CipherMode, CompressionMode, FileAttributes, FileRecord, FileType, FilterOptions,
    NoopMetadataSink, Warning,
};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tempfile::TempDir;

const MTIME: u64 = 1_577_836_800; // 2020-01-01T00:00:00Z

fn set_mtime(path: &Path, secs: u64) {
    File::open(path).unwrap().set_modified(UNIX_EPOCH + Duration::from_secs(secs)).unwrap();
}

fn mtime_of(path: &Path) -> u64 {
    fs::metadata(path).unwrap().modified().unwrap().duration_since(UNIX_EPOCH).unwrap().as_secs()
}

/// src/
///   a.txt          "hello"
///   empty.bin      ""
///   nested/
///     deep/
///       big.dat    1000 x 'A'
///   link -> a.txt  (unix)
fn build_tree() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("src");
    fs::create_dir_all(src.join("nested/deep")).unwrap();
    fs::write(src.join("a.txt"), b"hello").unwrap();
    fs::write(src.join("empty.bin"), b"").unwrap();
    fs::write(src.join("nested/deep/big.dat"), vec![b'A'; 1000]).unwrap();
    #[cfg(unix)]
    std::os::unix::fs::symlink("a.txt", src.join("link")).unwrap();
    (tmp, src)
}

fn opts(cipher: CipherMode, password: &str, compression: CompressionMode) -> PackOptions {
    PackOptions {
        cipher,
        compression,
        password: Some(password.to_owned()),
        ..PackOptions::default()
    }
}

#[test]
fn test_tree_roundtrip_every_mode() {
    for cipher in [CipherMode::None, CipherMode::Xor, CipherMode::Rc4] {
        for compression in [CompressionMode::None, CompressionMode::Rle] {
            let (tmp, src) = build_tree();
            let archive_path = tmp.path().join("backup.mbk");
            let dest = tmp.path().join("restore");

            let packed = archive::pack(&src, &archive_path, &opts(cipher, "s3cret", compression)).unwrap();
            assert_eq!(packed.files, 3);
            assert_eq!(packed.directories, 2);
            assert!(packed.warnings.is_empty());
            assert_eq!(packed.bytes_out, fs::metadata(&archive_path).unwrap().len());

            let restored = archive::unpack(&archive_path, &dest, "s3cret").unwrap();
            assert!(restored.warnings.is_empty(), "{cipher}/{compression}: {:?}", restored.warnings);
            assert_eq!(restored.files, 3);
            assert_eq!(restored.directories, 2);

            assert_eq!(fs::read(dest.join("a.txt")).unwrap(), b"hello");
            assert_eq!(fs::read(dest.join("empty.bin")).unwrap(), b"");
            assert_eq!(fs::read(dest.join("nested/deep/big.dat")).unwrap(), vec![b'A'; 1000]);

            #[cfg(unix)]
            {
                assert_eq!(packed.symlinks, 1);
                assert_eq!(restored.symlinks, 1);
                let link = dest.join("link");
                assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
                assert_eq!(fs::read_link(&link).unwrap(), PathBuf::from("a.txt"));
            }
        }
    }
}

#[test]
fn test_list_matches_scan_order() {
    let (tmp, src) = build_tree();
    let archive_path = tmp.path().join("backup.mbk");
    archive::pack(&src, &archive_path, &PackOptions::default()).unwrap();

    let entries = archive::list(&archive_path, "").unwrap();
    let paths: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
    let mut expected = vec!["a.txt", "empty.bin"];
    #[cfg(unix)]
    expected.push("link");
    expected.extend(["nested", "nested/deep", "nested/deep/big.dat"]);
    assert_eq!(paths, expected);
    assert!(entries.iter().all(|e| e.crc_ok));

    let big = entries.iter().find(|e| e.path == "nested/deep/big.dat").unwrap();
    assert_eq!(big.file_type, FileType::Regular);
    assert_eq!(big.size, 1000);
    assert_eq!(big.stored_size, 1000);
}

#[test]
fn test_rle_shrinks_runs() {
    let (tmp, src) = build_tree();
    let archive_path = tmp.path().join("backup.mbk");
    archive::pack(&src, &archive_path, &opts(CipherMode::None, "", CompressionMode::Rle)).unwrap();

    let entries = archive::list(&archive_path, "").unwrap();
    let big = entries.iter().find(|e| e.path == "nested/deep/big.dat").unwrap();
    assert_eq!(big.size, 1000);
    // ceil(1000 / 255) = 4 pairs
    assert_eq!(big.stored_size, 8);
    assert!(fs::metadata(&archive_path).unwrap().len() < 500);
}

#[test]
fn test_empty_password_writes_plain_archive() {
    let (tmp, src) = build_tree();
    let archive_path = tmp.path().join("backup.mbk");
    let summary = archive::pack(&src, &archive_path, &opts(CipherMode::Rc4, "", CompressionMode::None)).unwrap();
    assert_eq!(summary.cipher, CipherMode::None);

    let bytes = fs::read(&archive_path).unwrap();
    assert_eq!(&bytes[..9], b"MINIBK10\x00");
}

#[test]
fn test_tamper_yields_one_integrity_warning() {
    let (tmp, src) = build_tree();
    let archive_path = tmp.path().join("backup.mbk");
    archive::pack(&src, &archive_path, &opts(CipherMode::Xor, "key", CompressionMode::None)).unwrap();

    // Last frame is nested/deep/big.dat; its payload ends the archive.
    let mut bytes = fs::read(&archive_path).unwrap();
    let last = bytes.len() - 10;
    bytes[last] ^= 0x40;
    fs::write(&archive_path, &bytes).unwrap();

    let report = archive::verify(&archive_path, "key").unwrap();
    assert_eq!(report.warnings.len(), 1);
    assert!(matches!(&report.warnings[0], Warning::Integrity { path, .. } if path == "nested/deep/big.dat"));

    let dest = tmp.path().join("restore");
    let summary = archive::unpack(&archive_path, &dest, "key").unwrap();
    assert_eq!(summary.integrity_failures(), 1);
    // Corrupt entries are still restored.
    assert_eq!(fs::read(dest.join("nested/deep/big.dat")).unwrap().len(), 1000);
    assert_eq!(fs::read(dest.join("a.txt")).unwrap(), b"hello");
}

#[test]
fn test_unknown_magic_creates_nothing() {
    let tmp = TempDir::new().unwrap();
    let archive_path = tmp.path().join("junk.mbk");
    fs::write(&archive_path, b"NOTMINIBK-and-some-more-bytes").unwrap();
    let dest = tmp.path().join("restore");

    let err = archive::unpack(&archive_path, &dest, "").unwrap_err();
    assert!(matches!(err, ArchiveError::UnknownFormat { magic } if &magic == b"NOTMINIB"));
    assert!(!dest.exists());
}

#[test]
fn test_unknown_compression_flag() {
    let tmp = TempDir::new().unwrap();
    let archive_path = tmp.path().join("flag.mbk");
    fs::write(&archive_path, b"MINIBK10\x07").unwrap();

    let err = archive::list(&archive_path, "").unwrap_err();
    assert!(matches!(err, ArchiveError::UnknownCompression(7)));
}

#[test]
fn test_password_required_creates_nothing() {
    let (tmp, src) = build_tree();
    let archive_path = tmp.path().join("backup.mbk");
    archive::pack(&src, &archive_path, &opts(CipherMode::Rc4, "pw", CompressionMode::None)).unwrap();

    let dest = tmp.path().join("restore");
    let err = archive::unpack(&archive_path, &dest, "").unwrap_err();
    assert!(matches!(err, ArchiveError::PasswordRequired(CipherMode::Rc4)));
    assert!(!dest.exists());
}

#[test]
fn test_truncated_archive_is_fatal() {
    let (tmp, src) = build_tree();
    let archive_path = tmp.path().join("backup.mbk");
    archive::pack(&src, &archive_path, &PackOptions::default()).unwrap();

    let bytes = fs::read(&archive_path).unwrap();
    fs::write(&archive_path, &bytes[..bytes.len() - 3]).unwrap();

    let err = archive::verify(&archive_path, "").unwrap_err();
    assert!(matches!(err, ArchiveError::Truncated { .. }));
}

#[test]
fn test_missing_source_gives_empty_archive() {
    let tmp = TempDir::new().unwrap();
    let archive_path = tmp.path().join("empty.mbk");
    let summary = archive::pack(&tmp.path().join("nope"), &archive_path, &PackOptions::default()).unwrap();
    assert_eq!(summary.frames(), 0);
    assert_eq!(fs::read(&archive_path).unwrap(), b"MINIBK10\x00");
    assert!(archive::list(&archive_path, "").unwrap().is_empty());
}

#[test]
fn test_single_file_source() {
    let (tmp, src) = build_tree();
    let archive_path = tmp.path().join("one.mbk");
    archive::pack(&src.join("a.txt"), &archive_path, &PackOptions::default()).unwrap();

    let entries = archive::list(&archive_path, "").unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].path, "a.txt");
}

#[test]
fn test_unwritable_output() {
    let (tmp, src) = build_tree();
    let err = archive::pack(&src, &tmp.path().join("missing/dir/out.mbk"), &PackOptions::default()).unwrap_err();
    assert!(matches!(err, ArchiveError::CreateOutput { .. }));
}

#[test]
fn test_filter_by_name() {
    let (tmp, src) = build_tree();
    let archive_path = tmp.path().join("txt.mbk");
    let options = PackOptions {
        filter: FilterOptions { name_contains: Some(".txt".into()), ..FilterOptions::default() },
        ..PackOptions::default()
    };
    archive::pack(&src, &archive_path, &options).unwrap();

    let paths: Vec<String> = archive::list(&archive_path, "").unwrap().into_iter().map(|e| e.path).collect();
    assert_eq!(paths, ["a.txt"]);
}

#[test]
fn test_size_filter_keeps_directories() {
    let (tmp, src) = build_tree();
    let archive_path = tmp.path().join("big.mbk");
    let options = PackOptions {
        filter: FilterOptions { min_size: Some(100), ..FilterOptions::default() },
        ..PackOptions::default()
    };
    archive::pack(&src, &archive_path, &options).unwrap();

    let paths: Vec<String> = archive::list(&archive_path, "").unwrap().into_iter().map(|e| e.path).collect();
    // Size bounds apply to regular files only.
    let mut expected = Vec::new();
    #[cfg(unix)]
    expected.push("link");
    expected.extend(["nested", "nested/deep", "nested/deep/big.dat"]);
    assert_eq!(paths, expected);
}

#[test]
fn test_unreadable_source_still_framed() {
    let tmp = TempDir::new().unwrap();
    let archive_path = tmp.path().join("gone.mbk");
    let record = FileRecord {
        rel_path:    "vanished.txt".into(),
        source_path: tmp.path().join("vanished.txt"),
        file_type:   FileType::Regular,
        size:        42,
        link_target: None,
        attrs:       FileAttributes { mode: 0o600, uid: 0, gid: 0, mtime: MTIME as i64 },
    };

    let summary = archive::pack_records(&[record], &archive_path, &PackOptions::default()).unwrap();
    assert_eq!(summary.files, 1);
    assert!(matches!(&summary.warnings[..], [Warning::SourceUnreadable { path, .. }] if path == "vanished.txt"));

    let entries = archive::list(&archive_path, "").unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].size, 0);
    assert_eq!(entries[0].crc32, 0);
    assert!(entries[0].crc_ok);
}

#[test]
fn test_mtime_restored() {
    let (tmp, src) = build_tree();
    set_mtime(&src.join("a.txt"), MTIME);
    set_mtime(&src.join("nested/deep/big.dat"), MTIME + 60);
    set_mtime(&src.join("nested"), MTIME + 120);

    let archive_path = tmp.path().join("backup.mbk");
    archive::pack(&src, &archive_path, &PackOptions::default()).unwrap();
    let dest = tmp.path().join("restore");
    archive::unpack(&archive_path, &dest, "").unwrap();

    assert_eq!(mtime_of(&dest.join("a.txt")), MTIME);
    assert_eq!(mtime_of(&dest.join("nested/deep/big.dat")), MTIME + 60);
    // Directory attributes survive the writes of their children.
    assert_eq!(mtime_of(&dest.join("nested")), MTIME + 120);
}

#[test]
fn test_noop_sink_leaves_attributes() {
    let (tmp, src) = build_tree();
    set_mtime(&src.join("a.txt"), MTIME);
    let archive_path = tmp.path().join("backup.mbk");
    archive::pack(&src, &archive_path, &PackOptions::default()).unwrap();

    let before = SystemTime::now() - Duration::from_secs(60);
    let dest = tmp.path().join("restore");
    let summary = archive::unpack_with_sink(&archive_path, &dest, "", &NoopMetadataSink).unwrap();
    assert_eq!(summary.metadata_failures, 0);
    assert!(fs::metadata(dest.join("a.txt")).unwrap().modified().unwrap() > before);
}

#[test]
fn test_unsafe_paths_are_skipped() {
    let tmp = TempDir::new().unwrap();
    let archive_path = tmp.path().join("evil.mbk");
    let file = File::create(&archive_path).unwrap();
    let mut writer = minibk::ArchiveWriter::new(file, CipherMode::None, b"", CompressionMode::None).unwrap();
    let attrs = FileAttributes::default();
    writer.add_entry(FileType::Regular, "../escape.txt", b"x", attrs).unwrap();
    writer.add_entry(FileType::Regular, "/abs.txt", b"x", attrs).unwrap();
    writer.add_entry(FileType::Regular, "ok.txt", b"fine", attrs).unwrap();
    writer.finish().unwrap();

    let dest = tmp.path().join("restore");
    let summary = archive::unpack_with_sink(&archive_path, &dest, "", &NoopMetadataSink).unwrap();
    assert_eq!(summary.files, 1);
    assert_eq!(summary.warnings.len(), 2);
    assert!(summary.warnings.iter().all(|w| matches!(w, Warning::UnsafePath { .. })));
    assert!(!tmp.path().join("escape.txt").exists());
    assert_eq!(fs::read(dest.join("ok.txt")).unwrap(), b"fine");
}

#[cfg(unix)]
#[test]
fn test_entries_below_symlink_are_refused() {
    let tmp = TempDir::new().unwrap();
    let outside = tmp.path().join("outside");
    fs::create_dir(&outside).unwrap();

    let archive_path = tmp.path().join("evil.mbk");
    let file = File::create(&archive_path).unwrap();
    let mut writer = minibk::ArchiveWriter::new(file, CipherMode::None, b"", CompressionMode::None).unwrap();
    let attrs = FileAttributes::default();
    writer.add_entry(FileType::Symlink, "hop", outside.to_str().unwrap().as_bytes(), attrs).unwrap();
    writer.add_entry(FileType::Regular, "hop/planted.txt", b"x", attrs).unwrap();
    writer.finish().unwrap();

    let dest = tmp.path().join("restore");
    let summary = archive::unpack_with_sink(&archive_path, &dest, "", &NoopMetadataSink).unwrap();
    assert_eq!(summary.symlinks, 1);
    assert!(matches!(&summary.warnings[..], [Warning::Materialize { path, .. }] if path == "hop/planted.txt"));
    assert!(!outside.join("planted.txt").exists());
}

#[test]
fn test_unpack_over_existing_tree() {
    let (tmp, src) = build_tree();
    let archive_path = tmp.path().join("backup.mbk");
    archive::pack(&src, &archive_path, &PackOptions::default()).unwrap();

    let dest = tmp.path().join("restore");
    archive::unpack(&archive_path, &dest, "").unwrap();
    fs::write(dest.join("a.txt"), b"changed").unwrap();
    let again = archive::unpack(&archive_path, &dest, "").unwrap();
    assert!(again.warnings.is_empty());
    assert_eq!(fs::read(dest.join("a.txt")).unwrap(), b"hello");
}

#[cfg(unix)]
#[test]
fn test_symlink_replaces_populated_directory() {
    let tmp = TempDir::new().unwrap();
    let archive_path = tmp.path().join("link.mbk");
    let file = File::create(&archive_path).unwrap();
    let mut writer = minibk::ArchiveWriter::new(file, CipherMode::None, b"", CompressionMode::None).unwrap();
    writer.add_entry(FileType::Symlink, "node", b"elsewhere", FileAttributes::default()).unwrap();
    writer.finish().unwrap();

    let dest = tmp.path().join("restore");
    fs::create_dir_all(dest.join("node/child")).unwrap();
    fs::write(dest.join("node/child/file.txt"), b"old").unwrap();

    let summary = archive::unpack_with_sink(&archive_path, &dest, "", &NoopMetadataSink).unwrap();
    assert!(summary.warnings.is_empty(), "{:?}", summary.warnings);
    assert_eq!(summary.symlinks, 1);
    let node = dest.join("node");
    assert!(fs::symlink_metadata(&node).unwrap().file_type().is_symlink());
    assert_eq!(fs::read_link(&node).unwrap(), PathBuf::from("elsewhere"));
}
