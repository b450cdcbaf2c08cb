/// Read experiment log files.
///
/// A log file consists of metadata lines, which start with `;`, and data lines, which are parsed
/// by record.rs.  The load generator writes the experiment parameters as metadata first and the
/// server roster last, as a comma-separated list of `host:port`, so the last metadata line is the
/// roster.
///
/// A long experiment may be split across several files, in which case only the first file carries
/// the metadata and the argument to `load` is a pattern naming all the files.

use crate::errors::{LogError, Result};
use crate::record::Request;

use rustutils::{expand_file_pattern, is_pattern};
use std::fs;
use tracing::debug;

pub const METADATA_MARKER: char = ';';

#[derive(Debug, Default, Clone)]
pub struct LogData {
    /// The files that were read, in order.
    pub files: Vec<String>,

    /// Metadata lines with their marker, from the first file.
    pub metadata: Vec<String>,

    /// Data lines from all the files, in file order.
    pub data: Vec<String>,
}

impl LogData {
    /// The server roster from the last metadata line.

    pub fn roster(&self) -> Result<Vec<String>> {
        let line = self.metadata.last().ok_or(LogError::MissingServerMetadata)?;
        let servers = line
            .strip_prefix(METADATA_MARKER)
            .unwrap_or(line)
            .split(',')
            .map(|s| s.trim().to_string())
            .collect::<Vec<String>>();
        if servers.iter().all(|s| s.is_empty()) {
            return Err(LogError::MissingServerMetadata);
        }
        Ok(servers)
    }

    pub fn server_count(&self) -> Result<usize> {
        Ok(self.roster()?.len())
    }

    /// Parse all the data lines.  The first malformed line aborts the parse, the error carries its
    /// (1-based) position among the data lines.

    pub fn requests(&self) -> Result<Vec<Request>> {
        self.data
            .iter()
            .enumerate()
            .map(|(i, line)| {
                Request::parse(line).map_err(|e| LogError::DataLine {
                    line: i + 1,
                    source: Box::new(e),
                })
            })
            .collect()
    }
}

/// Load a file, or all the files matching a pattern.  The files matching a pattern are read in
/// name order.

pub fn load(path_or_pattern: &str) -> Result<LogData> {
    let files = if is_pattern(path_or_pattern) {
        let files = expand_file_pattern(path_or_pattern)
            .map_err(|e| pattern_error(path_or_pattern, e))?;
        debug!(pattern = path_or_pattern, ?files, "expanded file pattern");
        if files.is_empty() {
            return Err(LogError::NoFilesFound(path_or_pattern.to_string()));
        }
        files
    } else {
        vec![path_or_pattern.to_string()]
    };

    let mut log = LogData::default();
    for (i, file) in files.iter().enumerate() {
        let (metadata, mut data) = read_logfile(file)?;
        debug!(file = file.as_str(), metadata = metadata.len(), data = data.len(), "read log file");
        if i == 0 {
            log.metadata = metadata;
        }
        log.data.append(&mut data);
    }
    log.files = files;
    Ok(log)
}

/// Read one file and split it into metadata lines and data lines.  Empty lines are dropped.

pub fn read_logfile(file_name: &str) -> Result<(Vec<String>, Vec<String>)> {
    let text = fs::read_to_string(file_name).map_err(|source| LogError::Io {
        path: file_name.to_string(),
        source,
    })?;
    Ok(split_lines(&text))
}

fn split_lines(text: &str) -> (Vec<String>, Vec<String>) {
    let mut metadata = vec![];
    let mut data = vec![];
    for line in text.lines() {
        if line.starts_with(METADATA_MARKER) {
            metadata.push(line.to_string());
        } else if !line.trim().is_empty() {
            data.push(line.to_string());
        }
    }
    (metadata, data)
}

fn pattern_error(pattern: &str, e: anyhow::Error) -> LogError {
    match e.downcast::<std::io::Error>() {
        Ok(source) => LogError::Io {
            path: pattern.to_string(),
            source,
        },
        Err(e) => LogError::UnsupportedPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        },
    }
}

#[test]
fn test_load_single() {
    let log = load("../tests/explog/single.txt").unwrap();
    assert!(log.files == vec!["../tests/explog/single.txt".to_string()]);
    assert!(log.metadata.len() == 3);
    assert!(log.data.len() == 8);
    let roster = log.roster().unwrap();
    assert!(roster == vec!["10.0.0.1:11211", "10.0.0.2:11211", "10.0.0.3:11211"]);
    assert!(log.server_count().unwrap() == 3);
    let requests = log.requests().unwrap();
    assert!(requests.len() == 8);
    assert!(requests[0].key().as_str() == "alpha");
    assert!(requests[7].key().as_str() == "gamma");
}

#[test]
fn test_load_merged() {
    let log = load("../tests/explog/merge-*.txt").unwrap();
    assert!(log.files.len() == 2);
    // Metadata only from the first file, which is the only one that has any
    assert!(log.metadata.len() == 2);
    assert!(log.server_count().unwrap() == 2);
    let requests = log.requests().unwrap();
    assert!(requests.len() == 5);
    // File order, then line order
    let keys = requests.iter().map(|r| r.key().to_string()).collect::<Vec<String>>();
    assert!(keys == vec!["k1", "k2", "k3", "k4", "k5"]);
}

#[test]
fn test_load_errors() {
    assert!(matches!(
        load("../tests/explog/nothing-*.txt"),
        Err(LogError::NoFilesFound(_))
    ));
    assert!(matches!(
        load("../tests/explog/no-such-file.txt"),
        Err(LogError::Io { .. })
    ));
    assert!(matches!(
        load("../tests/*/merge-1.txt"),
        Err(LogError::UnsupportedPattern { .. })
    ));

    let log = load("../tests/explog/merge-2.txt").unwrap();
    assert!(matches!(log.roster(), Err(LogError::MissingServerMetadata)));

    let log = load("../tests/explog/malformed.txt").unwrap();
    match log.requests() {
        Err(LogError::DataLine { line: 3, source }) => {
            assert!(matches!(*source, LogError::MalformedRecord { .. }));
        }
        _ => panic!("Expected an error on the third data line"),
    }
}

#[test]
fn test_split_lines() {
    let (m, d) = split_lines(";a\r\n1:1:1:1,k,0.1\r\n\r\n;b,c\n  \n1:1:1:2,k,0.2");
    assert!(m == vec![";a", ";b,c"]);
    assert!(d == vec!["1:1:1:1,k,0.1", "1:1:1:2,k,0.2"]);

    let log = LogData {
        metadata: m.iter().map(|s| s.to_string()).collect(),
        ..Default::default()
    };
    assert!(log.roster().unwrap() == vec!["b", "c"]);

    let log = LogData {
        metadata: vec![";".to_string()],
        ..Default::default()
    };
    assert!(matches!(log.roster(), Err(LogError::MissingServerMetadata)));
}
