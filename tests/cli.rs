use assert_cmd::prelude::*;
use assert_fs::prelude::*;
use predicates::prelude::*;
use std::io::Read;
use assert_cmd::Command;

/// A source tree with `src/a.txt` and `src/sub/b.txt`.
fn source_tree(dir: &assert_fs::TempDir) -> Result<(), Box<dyn std::error::Error>> {
    dir.child("src/a.txt").write_str("hello")?;
    dir.child("src/sub/b.txt").write_str("yo!")?;
    Ok(())
}

fn job_file(
    dir: &assert_fs::TempDir,
    archive: &std::path::Path,
) -> Result<assert_fs::fixture::ChildPath, Box<dyn std::error::Error>> {
    let jobs = serde_json::json!([{
        "name": "data",
        "path": archive,
        "contents": [dir.child("src").path()],
    }]);
    let file = dir.child("jobs.json");
    file.write_str(&jobs.to_string())?;
    Ok(file)
}

#[test]
fn run_json_declaration() -> Result<(), Box<dyn std::error::Error>> {
    let dir = assert_fs::TempDir::new()?;
    source_tree(&dir)?;
    let archive = dir.child("data.zip");
    let jobs = job_file(&dir, archive.path())?;

    Command::cargo_bin("archivist")?
        .arg(jobs.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("Adding directory tree src"));

    archive.assert(predicate::path::is_file());
    let mut zip = zip::ZipArchive::new(std::fs::File::open(archive.path())?)?;
    let mut body = String::new();
    zip.by_name("src/sub/b.txt")?.read_to_string(&mut body)?;
    assert_eq!(body, "yo!");
    Ok(())
}

#[test]
fn run_toml_from_stdin() -> Result<(), Box<dyn std::error::Error>> {
    let dir = assert_fs::TempDir::new()?;
    source_tree(&dir)?;
    let archive = dir.child("data.tar");
    let text = format!(
        "[[job]]\nname = \"data\"\npath = {:?}\nformat = \"tar\"\ncontents = [{:?}]\n",
        archive.path().display().to_string(),
        dir.child("src/a.txt").path().display().to_string(),
    );

    Command::cargo_bin("archivist")?
        .write_stdin(text)
        .assert()
        .success()
        .stderr(predicate::str::contains("Adding file a.txt"));

    let mut tar = tar::Archive::new(std::fs::File::open(archive.path())?);
    let names: Vec<String> = tar
        .entries()?
        .map(|e| Ok(e?.path()?.display().to_string()))
        .collect::<Result<_, std::io::Error>>()?;
    assert_eq!(names, vec!["a.txt"]);
    Ok(())
}

#[test]
fn dry_run_creates_nothing() -> Result<(), Box<dyn std::error::Error>> {
    let dir = assert_fs::TempDir::new()?;
    source_tree(&dir)?;
    let archive = dir.child("data.tar");
    let jobs = job_file(&dir, archive.path())?;

    Command::cargo_bin("archivist")?
        .arg("--dry-run")
        .arg(jobs.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("Adding directory tree src"));

    archive.assert(predicate::path::missing());
    Ok(())
}

#[test]
fn missing_declaration_file() -> Result<(), Box<dyn std::error::Error>> {
    Command::cargo_bin("archivist")?
        .arg("/no/such/dir/jobs.json")
        .assert()
        .code(66)
        .stderr(predicate::str::contains("jobs.json"));
    Ok(())
}

#[test]
fn malformed_declaration() -> Result<(), Box<dyn std::error::Error>> {
    let dir = assert_fs::TempDir::new()?;
    let jobs = dir.child("jobs.json");
    jobs.write_str("[{\"name\": 1}]")?;

    Command::cargo_bin("archivist")?
        .arg(jobs.path())
        .assert()
        .code(65)
        .stderr(predicate::str::contains("error parsing JSON"));
    Ok(())
}

#[test]
fn unknown_job_name() -> Result<(), Box<dyn std::error::Error>> {
    let dir = assert_fs::TempDir::new()?;
    source_tree(&dir)?;
    let archive = dir.child("data.tar");
    let jobs = job_file(&dir, archive.path())?;

    Command::cargo_bin("archivist")?
        .args(["--job", "nope"])
        .arg(jobs.path())
        .assert()
        .code(64)
        .stderr(predicate::str::contains("\"nope\" not found"));

    archive.assert(predicate::path::missing());
    Ok(())
}

#[test]
fn unwritable_destination_fails_job() -> Result<(), Box<dyn std::error::Error>> {
    let dir = assert_fs::TempDir::new()?;
    source_tree(&dir)?;
    let archive = dir.child("missing/dir/data.tar");
    let jobs = job_file(&dir, archive.path())?;

    Command::cargo_bin("archivist")?
        .arg(jobs.path())
        .assert()
        .code(73)
        .stderr(predicate::str::contains("Backup data failed"));
    Ok(())
}

#[test]
fn log_file_receives_output() -> Result<(), Box<dyn std::error::Error>> {
    let dir = assert_fs::TempDir::new()?;
    source_tree(&dir)?;
    let archive = dir.child("data.tar");
    let jobs = job_file(&dir, archive.path())?;
    let log = dir.child("run.log");

    Command::cargo_bin("archivist")?
        .arg("-v")
        .arg("--log-file")
        .arg(log.path())
        .arg(jobs.path())
        .assert()
        .success();

    log.assert(predicate::str::contains("Adding directory tree src"));
    log.assert(predicate::str::contains("Inspecting"));
    Ok(())
}

fn two_jobs(
    dir: &assert_fs::TempDir,
    first: &std::path::Path,
    second: &std::path::Path,
) -> Result<assert_fs::fixture::ChildPath, Box<dyn std::error::Error>> {
    let jobs = serde_json::json!([
        {"name": "first", "path": first, "contents": [dir.child("src/a.txt").path()]},
        {"name": "second", "path": second, "contents": [dir.child("src/sub").path()]},
    ]);
    let file = dir.child("jobs.json");
    file.write_str(&jobs.to_string())?;
    Ok(file)
}

#[test]
fn failed_job_does_not_stop_the_batch() -> Result<(), Box<dyn std::error::Error>> {
    let dir = assert_fs::TempDir::new()?;
    source_tree(&dir)?;
    let bad = dir.child("missing/dir/first.tar");
    let good = dir.child("second.zip");
    let jobs = two_jobs(&dir, bad.path(), good.path())?;

    Command::cargo_bin("archivist")?
        .arg(jobs.path())
        .assert()
        .code(73)
        .stderr(predicate::str::contains("Backup first failed"))
        .stderr(predicate::str::contains("Adding directory tree sub"));

    bad.assert(predicate::path::missing());
    good.assert(predicate::path::is_file());
    let mut zip = zip::ZipArchive::new(std::fs::File::open(good.path())?)?;
    let mut body = String::new();
    zip.by_name("sub/b.txt")?.read_to_string(&mut body)?;
    assert_eq!(body, "yo!");
    Ok(())
}

#[test]
fn parallel_jobs_write_their_own_archives() -> Result<(), Box<dyn std::error::Error>> {
    let dir = assert_fs::TempDir::new()?;
    source_tree(&dir)?;
    let first = dir.child("first.tar");
    let second = dir.child("second.zip");
    let jobs = two_jobs(&dir, first.path(), second.path())?;

    Command::cargo_bin("archivist")?
        .arg("--parallel")
        .arg(jobs.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("Adding file a.txt"))
        .stderr(predicate::str::contains("Adding directory tree sub"));

    let mut tar = tar::Archive::new(std::fs::File::open(first.path())?);
    let names: Vec<String> = tar
        .entries()?
        .map(|e| Ok(e?.path()?.display().to_string()))
        .collect::<Result<_, std::io::Error>>()?;
    assert_eq!(names, vec!["a.txt"]);
    let zip = zip::ZipArchive::new(std::fs::File::open(second.path())?)?;
    let names: Vec<&str> = zip.file_names().collect();
    assert_eq!(names.len(), 2);
    assert!(names.contains(&"sub/"));
    assert!(names.contains(&"sub/b.txt"));
    Ok(())
}

#[test]
fn parallel_jobs_need_distinct_destinations() -> Result<(), Box<dyn std::error::Error>> {
    let dir = assert_fs::TempDir::new()?;
    source_tree(&dir)?;
    let shared = dir.child("shared.tar");
    let jobs = two_jobs(&dir, shared.path(), shared.path())?;

    Command::cargo_bin("archivist")?
        .arg("-p")
        .arg(jobs.path())
        .assert()
        .code(64)
        .stderr(predicate::str::contains("More than one job writes"));

    shared.assert(predicate::path::missing());
    Ok(())
}

#[test]
fn yaml_declaration() -> Result<(), Box<dyn std::error::Error>> {
    let dir = assert_fs::TempDir::new()?;
    source_tree(&dir)?;
    let archive = dir.child("data.zip");
    let jobs = dir.child("jobs.yaml");
    jobs.write_str(&format!(
        "- name: data\n  path: {:?}\n  contents:\n    - {:?}\n",
        archive.path().display().to_string(),
        dir.child("src").path().display().to_string(),
    ))?;

    Command::cargo_bin("archivist")?
        .arg(jobs.path())
        .assert()
        .success();

    let zip = zip::ZipArchive::new(std::fs::File::open(archive.path())?)?;
    assert_eq!(zip.len(), 4);
    Ok(())
}
