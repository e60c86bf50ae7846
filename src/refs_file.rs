//! The two-column refs file: one `iid,head_sha` line per merge request, no
//! header and no quoting.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::{RefsError, Result};
use crate::providers::gitlab::MergeRequestRef;

/// One line of a refs file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefRecord {
    pub iid: u64,
    pub head_sha: String,
}

impl From<&MergeRequestRef> for RefRecord {
    fn from(mr_ref: &MergeRequestRef) -> Self {
        Self {
            iid: mr_ref.iid,
            head_sha: mr_ref.head_sha.clone(),
        }
    }
}

impl From<MergeRequestRef> for RefRecord {
    fn from(mr_ref: MergeRequestRef) -> Self {
        Self {
            iid: mr_ref.iid,
            head_sha: mr_ref.head_sha,
        }
    }
}

pub fn encode_record(record: &RefRecord, output: &mut dyn Write) -> io::Result<()> {
    writeln!(output, "{},{}", record.iid, record.head_sha)
}

/// Decodes a whole refs file.
///
/// Any bad line rejects the entire input: callers rely on getting either
/// every record or none. Trailing blank lines are ignored.
pub fn decode(input: impl BufRead) -> Result<Vec<RefRecord>> {
    let mut lines = input.lines().collect::<io::Result<Vec<_>>>()?;
    while lines.last().is_some_and(|line| line.trim().is_empty()) {
        lines.pop();
    }

    lines
        .iter()
        .enumerate()
        .map(|(index, line)| parse_line(line.trim_end_matches('\r'), index + 1))
        .collect()
}

fn parse_line(line: &str, line_number: usize) -> Result<RefRecord> {
    let malformed = |reason: String| RefsError::MalformedRecord {
        line: line_number,
        reason,
    };

    let fields: Vec<&str> = line.split(',').collect();
    let [iid, head_sha] = fields.as_slice() else {
        return Err(malformed(format!(
            "expected 2 fields, found {}",
            fields.len()
        )));
    };

    let iid = iid
        .trim()
        .parse::<u64>()
        .ok()
        .filter(|&iid| iid > 0)
        .ok_or_else(|| malformed(format!("invalid merge request number {iid:?}")))?;

    let head_sha = head_sha.trim();
    if head_sha.is_empty() || !head_sha.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(malformed(format!("invalid commit SHA {head_sha:?}")));
    }

    Ok(RefRecord {
        iid,
        head_sha: head_sha.to_string(),
    })
}

pub fn read_refs_file(path: &Path) -> Result<Vec<RefRecord>> {
    let file = File::open(path)?;
    let records = decode(BufReader::new(file))?;
    debug!("Read {} refs from {}", records.len(), path.display());
    Ok(records)
}

/// Derives an output filename from a repository argument
/// (`https://gitlab.com/group/sub/repo.git` -> `group-sub-repo.csv`).
pub fn generate_filename(repo: &str) -> String {
    let mut name = repo;
    if name.contains("://") {
        // scheme, empty, host, then the project path
        name = name.splitn(4, '/').nth(3).unwrap_or_default();
    }
    let name = name.trim_matches('/');
    let name = name.strip_suffix(".git").unwrap_or(name);

    format!("{}.csv", name.replace('/', "-"))
}

/// File sink for the fetch pipeline.
///
/// The file is created on the first record, so a run that yields nothing
/// leaves nothing behind. Each record is flushed before `write` returns.
pub struct RefsFileSink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    written: usize,
}

impl RefsFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: None,
            written: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn write(&mut self, mr_ref: &MergeRequestRef) -> io::Result<()> {
        let writer = match self.writer.take() {
            Some(writer) => writer,
            None => {
                debug!("Creating {}", self.path.display());
                BufWriter::new(File::create(&self.path)?)
            }
        };
        let writer = self.writer.insert(writer);

        encode_record(&RefRecord::from(mr_ref), writer)?;
        writer.flush()?;
        self.written += 1;
        Ok(())
    }
}
