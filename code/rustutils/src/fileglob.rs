/// Matcher and expander for file name patterns, used to name a set of experiment logs with a single
/// argument (`results/latency-500k-*.txt`).
///
/// Only the last component of the path may carry wildcards.  `*` matches any run of characters and
/// `?` matches a single character; neither matches `/`, and neither matches a leading `.` in a
/// name, so hidden files are picked up only if the pattern asks for them.  Every other character
/// is literal.

use anyhow::{bail, Result};
use regex::Regex;
use std::path;

/// Return true iff `p` contains a wildcard character.

pub fn is_pattern(p: &str) -> bool {
    p.contains(['*', '?'])
}

/// A `FileGlobber` matches a single file name (no directory part) against a pattern.

pub struct FileGlobber {
    // Matcher + source pattern, for posterity.
    matcher: (Regex, String),

    // True if the pattern itself starts with '.'.
    matches_hidden: bool,
}

impl FileGlobber {
    pub fn new(pattern: &str) -> Result<FileGlobber> {
        if pattern.contains('/') {
            bail!("A file name pattern can't contain '/'");
        }
        Ok(FileGlobber {
            matcher: compile_globber(pattern)?,
            matches_hidden: pattern.starts_with('.'),
        })
    }

    /// Match s against the pattern and return true iff it matches.

    pub fn match_filename(&self, s: &str) -> bool {
        if s.starts_with('.') && !self.matches_hidden {
            return false;
        }
        self.matcher.0.is_match(s)
    }
}

fn compile_globber(p: &str) -> Result<(Regex, String)> {
    let mut r = "^".to_string();
    for c in p.chars() {
        match c {
            '*' => r += "[^/]*",
            '?' => r += "[^/]",
            _ => r += &regex::escape(&c.to_string()),
        }
    }
    r += "$";
    Ok((Regex::new(&r)?, r))
}

/// Expand a path whose last component may be a pattern into the names of the regular files that
/// match it, sorted lexicographically.  A path without wildcards is returned as-is whether it
/// exists or not; it's up to the caller to open it.
///
/// This returns an error if the directory part carries wildcards or if the directory can't be
/// read.  An empty result is not an error.
///
/// File names that are not representable as UTF8 are ignored.

pub fn expand_file_pattern(pattern: &str) -> Result<Vec<String>> {
    if !is_pattern(pattern) {
        return Ok(vec![pattern.to_string()]);
    }

    let (dir_name, file_pattern) = match pattern.rsplit_once('/') {
        Some((dir, file)) => (Some(if dir.is_empty() { "/" } else { dir }), file),
        None => (None, pattern),
    };
    if let Some(dir) = dir_name {
        if is_pattern(dir) {
            bail!("Wildcards are only supported in the file name");
        }
    }
    let globber = FileGlobber::new(file_pattern)?;

    let dir_path = path::Path::new(dir_name.unwrap_or("."));
    let mut filenames = vec![];
    for entry in dir_path.read_dir()? {
        // Bad directory entries are ignored, as are names that are not UTF8, which can't match a
        // UTF8 pattern.
        let Ok(entry) = entry else { continue };
        let Some(name) = entry.file_name().to_str().map(|s| s.to_string()) else {
            continue;
        };
        if !globber.match_filename(&name) || !entry.path().is_file() {
            continue;
        }
        filenames.push(match dir_name {
            Some("/") => format!("/{name}"),
            Some(dir) => format!("{dir}/{name}"),
            None => name,
        });
    }
    filenames.sort();
    Ok(filenames)
}

#[test]
fn test_fileglob_match() {
    let g = FileGlobber::new("latency-*.txt").unwrap();
    assert!(g.match_filename("latency-1.txt"));
    assert!(g.match_filename("latency-.txt"));
    assert!(!g.match_filename("latency-1.txt.bak"));
    assert!(!g.match_filename("xlatency-1.txt"));

    let g = FileGlobber::new("run?.log").unwrap();
    assert!(g.match_filename("run1.log"));
    assert!(!g.match_filename("run12.log"));

    // Regex metacharacters are literal
    let g = FileGlobber::new("a+(b).*").unwrap();
    assert!(g.match_filename("a+(b).txt"));
    assert!(!g.match_filename("aa(b).txt"));
}

#[test]
fn test_fileglob_hidden() {
    let g = FileGlobber::new("*").unwrap();
    assert!(g.match_filename("data.txt"));
    assert!(!g.match_filename(".data.txt"));

    let g = FileGlobber::new(".*").unwrap();
    assert!(g.match_filename(".data.txt"));
}

#[test]
fn test_fileglob_errors() {
    assert!(FileGlobber::new("a/b*").is_err());
    assert!(expand_file_pattern("../tests/*/x.txt").is_err());
}

#[test]
fn test_expand_file_pattern() {
    let files = expand_file_pattern("../tests/explog/merge-*.txt").unwrap();
    assert!(files.len() == 2);
    assert!(files[0] == "../tests/explog/merge-1.txt");
    assert!(files[1] == "../tests/explog/merge-2.txt");

    let files = expand_file_pattern("../tests/explog/nothing-*.txt").unwrap();
    assert!(files.is_empty());

    let files = expand_file_pattern("../tests/explog/nonexistent.txt").unwrap();
    assert!(files.len() == 1);
}
