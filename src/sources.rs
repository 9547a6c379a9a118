//! Source discovery.
//!
//! Resolves a project's declared source patterns to a concrete file set
//! under its root directory, validates file kinds, derives the header-only
//! property, and stages the file set for archive upload.

use std::collections::BTreeSet;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use regex::Regex;

use crate::error::{Error, Result};
use crate::manifest::Project;

const HEADER_EXTENSIONS: [&str; 6] = [".h", ".hh", ".hpp", ".hxx", ".h++", ".HPP"];
const SOURCE_EXTENSIONS: [&str; 6] = [".c", ".cc", ".cpp", ".cxx", ".c++", ".CPP"];
const OTHER_SOURCE_EXTENSIONS: [&str; 4] = [".s", ".S", ".asm", ".ipp"];

const MAX_LICENSE_SIZE: u64 = 512 * 1024;
const TEXT_PROBE_SIZE: usize = 8 * 1024;

/// File extension including the dot, case preserved.
fn extension_of(p: &Path) -> Option<String> {
    let name = p.file_name()?.to_str()?;
    let dot = name.rfind('.')?;
    if dot == 0 {
        return None;
    }
    Some(name[dot..].to_string())
}

/// True for files whose extension is in the compilable source set; headers
/// and assembly do not count.
pub fn is_valid_source(p: &Path) -> bool {
    extension_of(p).is_some_and(|e| SOURCE_EXTENSIONS.contains(&e.as_str()))
}

fn is_allowed_file_extension(p: &Path) -> bool {
    extension_of(p).is_some_and(|e| {
        HEADER_EXTENSIONS.contains(&e.as_str())
            || SOURCE_EXTENSIONS.contains(&e.as_str())
            || OTHER_SOURCE_EXTENSIONS.contains(&e.as_str())
    })
}

fn check_filename(s: &str) -> bool {
    s.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '/' | '+'))
}

/// In-process stand-in for `file -ib`: the first chunk must be NUL-free
/// valid UTF-8 to pass as text.
fn looks_like_text(path: &Path) -> bool {
    let Ok(mut file) = fs::File::open(path) else {
        return false;
    };
    let mut buf = vec![0u8; TEXT_PROBE_SIZE];
    let Ok(n) = file.read(&mut buf) else {
        return false;
    };
    buf.truncate(n);
    if buf.contains(&0) {
        return false;
    }
    match std::str::from_utf8(&buf) {
        Ok(_) => true,
        // A multi-byte character cut off at the probe boundary is fine.
        Err(e) => e.error_len().is_none(),
    }
}

/// Compile a source pattern. Plain globs (`*`/`?` with no other regex
/// metacharacters) are translated; everything else is taken as a regex.
/// Either way the match is anchored to the whole relative path.
fn compile_pattern(pattern: &str) -> Result<Regex> {
    let is_glob = pattern.chars().any(|c| c == '*' || c == '?')
        && !pattern
            .chars()
            .any(|c| matches!(c, '(' | ')' | '[' | ']' | '{' | '}' | '+' | '|' | '^' | '$' | '\\'));
    let body = if is_glob {
        let mut re = String::new();
        for c in pattern.chars() {
            match c {
                '*' => re.push_str(".*"),
                '?' => re.push('.'),
                c => re.push_str(&regex::escape(&c.to_string())),
            }
        }
        re
    } else {
        pattern.to_string()
    };
    Regex::new(&format!("\\A(?:{})\\z", body))
        .map_err(|e| Error::Sources(format!("invalid source pattern '{}': {}", pattern, e)))
}

fn walk(dir: &Path, base: &Path, out: &mut Vec<String>) -> Result<()> {
    let entries = fs::read_dir(dir).map_err(|e| Error::io("read", dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| Error::io("read", dir, e))?;
        let path = entry.path();
        if path.is_dir() {
            walk(&path, base, out)?;
        } else if path.is_file() {
            let rel = path
                .strip_prefix(base)
                .unwrap_or(&path)
                .to_string_lossy()
                .replace('\\', "/");
            out.push(rel);
        }
    }
    Ok(())
}

/// Resolve `project.sources` to `project.files` under `dir/root_directory`.
pub fn find_sources(project: &mut Project, dir: &Path) -> Result<()> {
    let root = dir.join(&project.root_directory);

    // Patterns naming an existing file are literal matches.
    let literal: Vec<String> = project
        .sources
        .iter()
        .filter(|s| root.join(s).is_file())
        .cloned()
        .collect();
    for s in literal {
        project.sources.remove(&s);
        project.files.insert(PathBuf::from(s));
    }

    if project.sources.is_empty() && project.files.is_empty() && !project.empty {
        return Err(Error::Sources("'files' must be populated".to_string()));
    }

    if !project.sources.is_empty() {
        let mut regexes = Vec::new();
        for pattern in &project.sources {
            regexes.push(compile_pattern(pattern)?);
        }

        let mut found = Vec::new();
        walk(&root, &root, &mut found)?;
        for rel in found {
            if regexes.iter().any(|r| r.is_match(&rel)) {
                project.files.insert(PathBuf::from(rel));
            }
        }
    }

    if project.files.is_empty() && !project.empty {
        return Err(Error::Sources("no files found".to_string()));
    }

    check_file_types(&project.files, &root)?;

    project.header_only = !project.files.iter().any(|f| is_valid_source(f));

    if !project.license.is_empty() {
        let license = root.join(&project.license);
        if !license.is_file() {
            return Err(Error::Sources(format!(
                "license file '{}' does not exist",
                license.display()
            )));
        }
        let size = fs::metadata(&license)
            .map_err(|e| Error::io("read", &license, e))?
            .len();
        if size > MAX_LICENSE_SIZE {
            return Err(Error::Sources(format!(
                "license file '{}' is too large (should be text under 512 KiB)",
                license.display()
            )));
        }
        project.files.insert(PathBuf::from(&project.license));
    }

    // The manifest travels with the sources.
    if !project.root_directory.as_os_str().is_empty() {
        let from = dir.join(&project.cppan_filename);
        let to = root.join(&project.cppan_filename);
        fs::copy(&from, &to).map_err(|e| Error::io("copy", &from, e))?;
    }
    project.files.insert(PathBuf::from(&project.cppan_filename));

    Ok(())
}

fn check_file_types(files: &BTreeSet<PathBuf>, root: &Path) -> Result<()> {
    let mut errors = String::new();
    for file in files {
        let rel = file.to_string_lossy().replace('\\', "/");
        if !check_filename(&rel) {
            errors.push_str(&format!("file '{}' has prohibited symbols\n", rel));
        }
    }
    if !errors.is_empty() {
        return Err(Error::Sources(format!(
            "project sources did not pass file checks:\n{}",
            errors
        )));
    }

    for file in files {
        if is_allowed_file_extension(file) || looks_like_text(&root.join(file)) {
            continue;
        }
        errors.push_str(&format!("file kind not supported: {}\n", file.display()));
    }
    if !errors.is_empty() {
        return Err(Error::Sources(format!(
            "project did not pass file checks:\n{}",
            errors
        )));
    }
    Ok(())
}

/// Stage the discovered file set as a gzip tar archive whose entries are
/// regular files with mode 0644 and package-relative forward-slash paths.
/// Returns false when some staged file vanished before packing.
pub fn write_archive(project: &Project, dir: &Path, out: &Path) -> Result<bool> {
    let root = dir.join(&project.root_directory);
    let file = fs::File::create(out).map_err(|e| Error::io("create", out, e))?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);

    let mut complete = true;
    for f in &project.files {
        let real = root.join(f);
        if !real.is_file() {
            complete = false;
            continue;
        }
        let data = fs::read(&real).map_err(|e| Error::io("read", &real, e))?;
        let name = f.to_string_lossy().replace('\\', "/");

        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(tar::EntryType::Regular);
        builder
            .append_data(&mut header, Path::new(&name), data.as_slice())
            .map_err(|e| Error::io("write", out, e))?;
    }

    let encoder = builder
        .into_inner()
        .map_err(|e| Error::io("write", out, e))?;
    encoder
        .finish()
        .map_err(|e| Error::io("write", out, e))?;
    Ok(complete)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::CPPAN_FILENAME;

    fn fixture(files: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (path, content) in files {
            let p = dir.path().join(path);
            fs::create_dir_all(p.parent().unwrap()).unwrap();
            fs::write(p, content).unwrap();
        }
        dir
    }

    fn project_with_sources(patterns: &[&str]) -> Project {
        Project {
            cppan_filename: CPPAN_FILENAME.to_string(),
            sources: patterns.iter().map(|s| s.to_string()).collect(),
            ..Project::default()
        }
    }

    #[test]
    fn test_glob_pattern_discovers_sources() {
        let dir = fixture(&[
            (CPPAN_FILENAME, "files: src/*.cpp\n"),
            ("src/a.cpp", "int main() { return 0; }\n"),
            ("src/notes.txt", "notes\n"),
        ]);
        let mut p = project_with_sources(&["src/*.cpp"]);
        find_sources(&mut p, dir.path()).unwrap();

        assert!(p.files.contains(Path::new("src/a.cpp")));
        assert!(p.files.contains(Path::new(CPPAN_FILENAME)));
        assert!(!p.files.contains(Path::new("src/notes.txt")));
        assert!(!p.header_only);
    }

    #[test]
    fn test_regex_pattern_and_literal_match() {
        let dir = fixture(&[
            (CPPAN_FILENAME, "files: include/.*\n"),
            ("include/x.hpp", "#pragma once\n"),
            ("include/y.hpp", "#pragma once\n"),
            ("README.md", "readme\n"),
        ]);
        let mut p = project_with_sources(&["include/.*\\.hpp", "README.md"]);
        find_sources(&mut p, dir.path()).unwrap();

        // "README.md" names an existing file, so it is a literal match.
        assert!(p.files.contains(Path::new("README.md")));
        assert!(p.files.contains(Path::new("include/x.hpp")));
        assert!(p.files.contains(Path::new("include/y.hpp")));
    }

    #[test]
    fn test_header_only_classification() {
        let dir = fixture(&[
            (CPPAN_FILENAME, "files: include/*.hpp\n"),
            ("include/x.hpp", "#pragma once\n"),
        ]);
        let mut p = project_with_sources(&["include/*.hpp"]);
        find_sources(&mut p, dir.path()).unwrap();
        assert!(p.header_only);

        let dir = fixture(&[
            (CPPAN_FILENAME, "files: '.*'\n"),
            ("x.hpp", "#pragma once\n"),
            ("x.cpp", "int f() { return 1; }\n"),
        ]);
        let mut p = project_with_sources(&[".*\\.[hc]pp"]);
        find_sources(&mut p, dir.path()).unwrap();
        assert!(!p.header_only);
    }

    #[test]
    fn test_empty_file_set_fails_unless_empty_project() {
        let dir = fixture(&[(CPPAN_FILENAME, "files: src/*.cpp\n")]);
        let err = find_sources(&mut project_with_sources(&[]), dir.path()).unwrap_err();
        assert!(err.to_string().contains("'files' must be populated"));

        let dir = fixture(&[
            (CPPAN_FILENAME, "files: src/*.cpp\n"),
            ("src/other.txt", "x\n"),
        ]);
        let err =
            find_sources(&mut project_with_sources(&["src/.*\\.cpp"]), dir.path()).unwrap_err();
        assert!(err.to_string().contains("no files found"));

        let mut p = project_with_sources(&[]);
        p.empty = true;
        let dir = fixture(&[(CPPAN_FILENAME, "empty:\n")]);
        find_sources(&mut p, dir.path()).unwrap();
    }

    #[test]
    fn test_prohibited_filename_rejected() {
        let dir = fixture(&[
            (CPPAN_FILENAME, "files: .*\n"),
            ("src/bad name.cpp", "int x;\n"),
        ]);
        let err =
            find_sources(&mut project_with_sources(&["src/.*"]), dir.path()).unwrap_err();
        assert!(err.to_string().contains("prohibited symbols"));
    }

    #[test]
    fn test_unknown_binary_kind_rejected_text_accepted() {
        let dir = fixture(&[(CPPAN_FILENAME, "files: .*\n"), ("data.xyz", "plain text\n")]);
        // Unrecognized extension but text content passes the probe.
        find_sources(&mut project_with_sources(&["data.xyz"]), dir.path()).unwrap();

        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CPPAN_FILENAME), "files: .*\n").unwrap();
        fs::write(dir.path().join("blob.bin"), [0u8, 159, 146, 150]).unwrap();
        let err =
            find_sources(&mut project_with_sources(&["blob.bin"]), dir.path()).unwrap_err();
        assert!(err.to_string().contains("file kind not supported"));
    }

    #[test]
    fn test_license_checked_and_added() {
        let dir = fixture(&[
            (CPPAN_FILENAME, "files: src/*.cpp\n"),
            ("src/a.cpp", "int x;\n"),
        ]);
        let mut p = project_with_sources(&["src/*.cpp"]);
        p.license = "LICENSE".to_string();
        let err = find_sources(&mut p, dir.path()).unwrap_err();
        assert!(err.to_string().contains("does not exist"));

        let dir = fixture(&[
            (CPPAN_FILENAME, "files: src/*.cpp\n"),
            ("src/a.cpp", "int x;\n"),
            ("LICENSE", "MIT\n"),
        ]);
        let mut p = project_with_sources(&["src/*.cpp"]);
        p.license = "LICENSE".to_string();
        find_sources(&mut p, dir.path()).unwrap();
        assert!(p.files.contains(Path::new("LICENSE")));
    }

    #[test]
    fn test_manifest_copied_into_root_directory() {
        let dir = fixture(&[
            (CPPAN_FILENAME, "root_directory: lib\nfiles: src/*.cpp\n"),
            ("lib/src/a.cpp", "int x;\n"),
        ]);
        let mut p = project_with_sources(&["src/*.cpp"]);
        p.root_directory = PathBuf::from("lib");
        find_sources(&mut p, dir.path()).unwrap();

        assert!(dir.path().join("lib").join(CPPAN_FILENAME).is_file());
        assert!(p.files.contains(Path::new(CPPAN_FILENAME)));
    }

    #[test]
    fn test_write_archive_round_trip() {
        let dir = fixture(&[
            (CPPAN_FILENAME, "files: src/*.cpp\n"),
            ("src/a.cpp", "int main() { return 0; }\n"),
        ]);
        let mut p = project_with_sources(&["src/*.cpp"]);
        find_sources(&mut p, dir.path()).unwrap();

        let out = dir.path().join("archive.tar.gz");
        assert!(write_archive(&p, dir.path(), &out).unwrap());

        let file = fs::File::open(&out).unwrap();
        let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(file));
        let mut names = Vec::new();
        for entry in archive.entries().unwrap() {
            let entry = entry.unwrap();
            assert_eq!(entry.header().mode().unwrap() & 0o777, 0o644);
            names.push(entry.path().unwrap().to_string_lossy().to_string());
        }
        names.sort();
        assert_eq!(names, vec![CPPAN_FILENAME.to_string(), "src/a.cpp".to_string()]);
    }
}
