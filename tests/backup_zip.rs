#[path = "../src/db.rs"]
mod db;
#[path = "../src/backup.rs"]
mod backup;

use std::fs::File;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

#[test]
fn zip_export_and_import_roundtrip() {
    let workspace = temp_dir("campus-backup-src");
    let workspace2 = temp_dir("campus-backup-dst");
    let out_dir = temp_dir("campus-backup-out");

    let bytes = b"sqlite-test-payload";
    std::fs::write(workspace.join(db::DB_FILE_NAME), bytes).expect("write source db");

    let bundle = out_dir.join("workspace.campusbackup.zip");
    let export = backup::export_workspace_bundle(&workspace, &bundle).expect("export bundle");
    assert_eq!(export.bundle_format, backup::BUNDLE_FORMAT_V1);
    assert_eq!(export.db_sha256.len(), 64);

    let mut archive = zip::ZipArchive::new(File::open(&bundle).expect("open bundle"))
        .expect("read zip");
    let mut manifest = String::new();
    archive
        .by_name("manifest.json")
        .expect("manifest entry")
        .read_to_string(&mut manifest)
        .expect("read manifest");
    let manifest: serde_json::Value = serde_json::from_str(&manifest).expect("manifest json");
    assert_eq!(manifest["format"], serde_json::json!("campus-workspace-v1"));
    assert_eq!(
        manifest["dbSha256"].as_str(),
        Some(export.db_sha256.as_str())
    );

    let import = backup::import_workspace_bundle(&bundle, &workspace2).expect("import bundle");
    assert_eq!(import.db_sha256, export.db_sha256);
    let restored = std::fs::read(workspace2.join(db::DB_FILE_NAME)).expect("read restored db");
    assert_eq!(restored, bytes);
    assert!(!workspace2
        .join(format!("{}.importing", db::DB_FILE_NAME))
        .exists());

    let _ = std::fs::remove_dir_all(workspace);
    let _ = std::fs::remove_dir_all(workspace2);
    let _ = std::fs::remove_dir_all(out_dir);
}

#[test]
fn tampered_bundle_leaves_workspace_untouched() {
    let out_dir = temp_dir("campus-backup-tamper");
    let workspace = temp_dir("campus-backup-tamper-dst");
    let original = b"keep-me";
    std::fs::write(workspace.join(db::DB_FILE_NAME), original).expect("write existing db");

    let bundle = out_dir.join("tampered.zip");
    {
        let mut zip = zip::ZipWriter::new(File::create(&bundle).expect("create bundle"));
        let opts = zip::write::FileOptions::default();
        zip.start_file("manifest.json", opts).expect("manifest");
        zip.write_all(
            serde_json::json!({ "format": "campus-workspace-v1", "dbSha256": "00" })
                .to_string()
                .as_bytes(),
        )
        .expect("write manifest");
        zip.start_file("db/campus.sqlite3", opts).expect("db entry");
        zip.write_all(b"evil").expect("write db");
        zip.finish().expect("finish zip");
    }

    let e = backup::import_workspace_bundle(&bundle, &workspace).expect_err("checksum");
    assert!(format!("{e:#}").contains("checksum mismatch"));
    let kept = std::fs::read(workspace.join(db::DB_FILE_NAME)).expect("read db");
    assert_eq!(kept, original);

    let missing = backup::export_workspace_bundle(&out_dir, &out_dir.join("x.zip"))
        .expect_err("no database");
    assert!(missing.to_string().contains("workspace database not found"));

    let _ = std::fs::remove_dir_all(out_dir);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn unknown_bundle_format_is_rejected() {
    let out_dir = temp_dir("campus-backup-format");
    let bundle = out_dir.join("other.zip");
    {
        let mut zip = zip::ZipWriter::new(File::create(&bundle).expect("create bundle"));
        zip.start_file("manifest.json", zip::write::FileOptions::default())
            .expect("manifest");
        zip.write_all(br#"{"format":"something-else","dbSha256":"00"}"#)
            .expect("write manifest");
        zip.finish().expect("finish zip");
    }
    let e = backup::import_workspace_bundle(&bundle, &out_dir.join("ws")).expect_err("format");
    assert!(e.to_string().contains("unsupported bundle format"));
    let _ = std::fs::remove_dir_all(out_dir);
}
