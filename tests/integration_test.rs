use assert_cmd::Command;
use assert_cmd::cargo;
use mockito::Server;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::tempdir;
use zip::ZipArchive;

fn ipavault(root: &Path) -> Command {
    let mut cmd = Command::new(cargo::cargo_bin!("ipavault"));
    cmd.arg("--root").arg(root).env_remove("IPAVAULT_PROBE_TIMEOUT");
    cmd
}

/// Id of the first saved link, read back through `links list`.
fn first_link_id(root: &Path) -> String {
    let output = ipavault(root).args(["links", "list"]).output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    stdout
        .split_whitespace()
        .next()
        .expect("a listed link")
        .to_string()
}

#[test]
fn test_end_to_end_add_and_download() {
    let mut server = Server::new();
    let url = format!("{}/builds/AppX.ipa", server.url());
    let body = vec![7u8; 1_048_576];

    let _head = server
        .mock("HEAD", "/builds/AppX.ipa")
        .with_status(200)
        .create();
    let _get = server
        .mock("GET", "/builds/AppX.ipa")
        .with_status(200)
        .with_body(&body)
        .create();

    let root_dir = tempdir().unwrap();
    let root = root_dir.path();

    ipavault(root)
        .args(["links", "add", &url, "--name", "AppX"])
        .assert()
        .success()
        .stdout(predicate::str::contains("AppX"))
        .stdout(predicate::str::contains("[online]"));

    // The collection is persisted in the app-group store
    assert!(root.join("AppGroup/LCSavedIPALinks.blob").exists());

    ipavault(root)
        .args(["links", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains(url.as_str()));

    let id = first_link_id(root);
    ipavault(root)
        .args(["download", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains("Downloaded AppX"));

    let downloaded = root.join("Documents/DownloadedIPAs/AppX.ipa");
    assert_eq!(fs::metadata(&downloaded).unwrap().len(), 1_048_576);

    // Downloading again replaces the file instead of adding a second one
    ipavault(root).args(["download", &id]).assert().success();
    assert_eq!(
        fs::read_dir(root.join("Documents/DownloadedIPAs"))
            .unwrap()
            .count(),
        1
    );

    ipavault(root)
        .args(["downloads", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("AppX.ipa"));

    ipavault(root)
        .args(["downloads", "clear", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed 1 archive(s)."));
    assert!(!downloaded.exists());
}

#[test]
fn test_unreachable_link_is_marked_offline() {
    let mut server = Server::new();
    let url = format!("{}/missing.ipa", server.url());
    let _head = server.mock("HEAD", "/missing.ipa").with_status(404).create();

    let root_dir = tempdir().unwrap();
    ipavault(root_dir.path())
        .args(["links", "add", &url])
        .assert()
        .success()
        .stdout(predicate::str::contains("missing"))
        .stdout(predicate::str::contains("[offline]"));
}

#[test]
fn test_invalid_url_is_rejected() {
    let root_dir = tempdir().unwrap();
    ipavault(root_dir.path())
        .args(["links", "add", "not a url"])
        .assert()
        .failure();

    ipavault(root_dir.path())
        .args(["links", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No saved links."));
}

#[test]
fn test_remove_links() {
    let mut server = Server::new();
    let url = format!("{}/a.ipa", server.url());
    let _head = server.mock("HEAD", "/a.ipa").with_status(200).create();

    let root_dir = tempdir().unwrap();
    let root = root_dir.path();
    ipavault(root).args(["links", "add", &url]).assert().success();
    let id = first_link_id(root);

    // Removing twice is harmless
    for _ in 0..2 {
        ipavault(root)
            .args(["links", "remove", &id])
            .assert()
            .success();
    }
    ipavault(root)
        .args(["links", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No saved links."));
}

#[test]
fn test_download_failure_leaves_no_file() {
    let mut server = Server::new();
    let url = format!("{}/broken.ipa", server.url());
    let _head = server.mock("HEAD", "/broken.ipa").with_status(200).create();
    let _get = server.mock("GET", "/broken.ipa").with_status(500).create();

    let root_dir = tempdir().unwrap();
    let root = root_dir.path();
    ipavault(root)
        .args(["links", "add", &url, "--name", "Broken"])
        .assert()
        .success();
    let id = first_link_id(root);

    ipavault(root)
        .args(["download", &id])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Download failed"));
    assert!(!root.join("Documents/DownloadedIPAs/Broken.ipa").exists());
    assert_eq!(fs::read_dir(root.join("tmp")).unwrap().count(), 0);
}

#[test]
fn test_end_to_end_export() {
    let work = tempdir().unwrap();
    let bundle = work.path().join("AppX.app");
    fs::create_dir_all(&bundle).unwrap();
    fs::write(bundle.join("AppX"), "binary").unwrap();
    let container = work.path().join("container");
    fs::create_dir_all(container.join("Documents")).unwrap();
    fs::write(container.join("Documents/save.dat"), "state").unwrap();
    let output = work.path().join("out");

    let root_dir = tempdir().unwrap();
    ipavault(root_dir.path())
        .arg("export")
        .arg(&bundle)
        .arg("--bundle-id")
        .arg("com.example.appx")
        .arg("--container")
        .arg(&container)
        .arg("--output")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("Exported AppX"));

    let archives: Vec<_> = fs::read_dir(&output)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(archives.len(), 1);

    let archive = ZipArchive::new(fs::File::open(&archives[0]).unwrap()).unwrap();
    let names: Vec<&str> = archive.file_names().collect();
    assert!(names.contains(&"Payload/AppX.app/AppX"));
    assert!(names.contains(&"ContainerData/Documents/save.dat"));
    assert!(names.contains(&"LCExportMetadata.json"));
    assert!(!names.iter().any(|n| n.starts_with("ContainerData/Library")));

    // No staging workspace survives the run
    assert_eq!(
        fs::read_dir(root_dir.path().join("tmp")).unwrap().count(),
        0
    );
}

#[test]
fn test_export_missing_bundle_fails() {
    let root_dir = tempdir().unwrap();
    ipavault(root_dir.path())
        .arg("export")
        .arg(root_dir.path().join("Nope.app"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to copy app bundle"));
}
