//! Flat-file output: naming, the results TSV, and server-list files.

pub mod server_list;

use std::fs::File;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;

use crate::probes::Verdict;

/// Placeholder for an address that was never looked up.
pub const NO_ADDRESS: &str = "n/a";

/// Trailing header cells shared by every provider's results file.
const TRAILING_HEADERS: [&str; 2] = ["External IP", "Result"];

/// Date stamp used in file names (`YYYYMMDD`).
pub fn date_stamp(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// Default server-list and results paths for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileNames {
    pub server_list: PathBuf,
    pub results: PathBuf,
}

impl FileNames {
    /// `NordVPN_UK_20250301.txt` and `BBCiPlayer_Results_NordVPN_UK_20250301.txt`,
    /// with a `_<City>` part when the run is narrowed to one city.
    pub fn defaults(
        provider_tag: &str,
        service_tag: &str,
        region_tag: &str,
        city: Option<&str>,
        date: NaiveDate,
    ) -> Self {
        let mut scope = format!("{}_{}", provider_tag, region_tag);
        if let Some(city) = city.map(city_tag).filter(|c| !c.is_empty()) {
            scope.push('_');
            scope.push_str(&city);
        }
        let stamp = date_stamp(date);
        Self {
            server_list: PathBuf::from(format!("{}_{}.txt", scope, stamp)),
            results: PathBuf::from(format!("{}_Results_{}_{}.txt", service_tag, scope, stamp)),
        }
    }
}

/// `new york` → `NewYork`: title-cased words, alphanumerics only.
fn city_tag(city: &str) -> String {
    city.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

/// Ask for a file name on `output`, keeping `default` on empty input.
pub fn prompt_path<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    label: &str,
    default: &Path,
) -> Result<PathBuf> {
    write!(output, "File name for the {} (default: {}): ", label, default.display())?;
    output.flush()?;

    let mut line = String::new();
    input.read_line(&mut line).context("failed to read file name")?;
    let answer = line.trim();
    Ok(if answer.is_empty() {
        default.to_path_buf()
    } else {
        PathBuf::from(answer)
    })
}

/// One line of the results file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultRow {
    /// Provider-specific identifying columns (see `ProviderMeta::key_headers`).
    pub key: Vec<String>,
    pub external_ip: String,
    pub verdict: Verdict,
}

impl ResultRow {
    pub fn to_line(&self) -> String {
        let mut cells: Vec<String> = self.key.iter().map(|k| sanitize_cell(k)).collect();
        cells.push(sanitize_cell(&self.external_ip));
        cells.push(self.verdict.to_string());
        cells.join("\t")
    }
}

fn sanitize_cell(s: &str) -> String {
    s.replace(['\t', '\n', '\r'], " ")
}

/// Append-only results file. Every row is flushed before `append` returns.
#[derive(Debug)]
pub struct ResultsFile {
    path: PathBuf,
    file: File,
    rows: usize,
}

impl ResultsFile {
    /// Create (truncate) `path` and write the header row.
    pub fn create(path: &Path, key_headers: &[&str]) -> Result<Self> {
        let mut file = File::create(path)
            .with_context(|| format!("failed to create results file: {}", path.display()))?;

        let mut header: Vec<&str> = key_headers.to_vec();
        header.extend_from_slice(&TRAILING_HEADERS);
        writeln!(file, "{}", header.join("\t"))
            .with_context(|| format!("failed to write header to {}", path.display()))?;
        file.flush()?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            rows: 0,
        })
    }

    pub fn append(&mut self, row: &ResultRow) -> Result<()> {
        writeln!(self.file, "{}", row.to_line())
            .and_then(|_| self.file.flush())
            .with_context(|| format!("failed to append to {}", self.path.display()))?;
        self.rows += 1;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows appended through this handle.
    pub fn rows(&self) -> usize {
        self.rows
    }
}
