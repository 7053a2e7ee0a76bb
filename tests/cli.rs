//! CLI smoke tests: spawn the compiled binary against temp files.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

fn datalyst_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("datalyst");
    path
}

fn run_datalyst(args: &[&str], cwd: &Path) -> (String, String, bool) {
    let binary = datalyst_binary();
    let output = Command::new(&binary)
        .args(args)
        .current_dir(cwd)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run datalyst binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn inspect_prints_shape_and_context() {
    let tmp = TempDir::new().unwrap();
    let file = tmp.path().join("sales.csv");
    fs::write(&file, "date,sales\n2024-01-01,10\n2024-01-02,\n2024-01-03,20\n").unwrap();

    let (stdout, stderr, success) =
        run_datalyst(&["inspect", file.to_str().unwrap()], tmp.path());
    assert!(success, "inspect failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("format:  csv"));
    assert!(stdout.contains("3 rows"));
    assert!(stdout.contains("sales (numeric, 1 missing)"));
}

#[test]
fn inspect_unsupported_file_fails_with_kind() {
    let tmp = TempDir::new().unwrap();
    let file = tmp.path().join("blob.parquet");
    fs::write(&file, [0x00u8, 0x01, 0x02, 0x03]).unwrap();

    let (stdout, stderr, success) =
        run_datalyst(&["inspect", file.to_str().unwrap()], tmp.path());
    assert!(!success, "inspect unexpectedly succeeded: {}", stdout);
    assert!(stderr.contains("unsupported_format"), "stderr={}", stderr);
}

#[test]
fn inspect_missing_file_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_datalyst(&["inspect", "nope.csv"], tmp.path());
    assert!(!success);
    assert!(stderr.contains("Failed to read file"), "stderr={}", stderr);
}

#[test]
fn inspect_docx_reports_text_counts() {
    use std::io::Write;
    let tmp = TempDir::new().unwrap();
    let file = tmp.path().join("memo.docx");

    let mut buf = Vec::new();
    {
        let mut zw = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        zw.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        zw.write_all(br#"<?xml version="1.0"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body><w:p><w:r><w:t>budget memo for review</w:t></w:r></w:p></w:body></w:document>"#)
            .unwrap();
        zw.finish().unwrap();
    }
    fs::write(&file, &buf).unwrap();

    let (stdout, stderr, success) =
        run_datalyst(&["inspect", file.to_str().unwrap()], tmp.path());
    assert!(success, "inspect failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("format:  docx"));
    assert!(stdout.contains("word_count: 4"));
    assert!(stdout.contains("budget memo for review"));
}
