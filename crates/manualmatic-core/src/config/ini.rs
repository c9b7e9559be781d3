//! Controller ini file reader
//!
//! Format: `[SECTION]` headers followed by `KEY = VALUE` lines, with `#` and
//! `;` comment lines. Keys are looked up by section and name; when a key is
//! repeated within a section the first occurrence wins.

use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while reading an ini file
#[derive(Error, Debug)]
pub enum IniError {
    /// The file could not be read
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// A line is neither a section, a key, nor a comment
    #[error("Parse error at line {line}: {message}")]
    ParseError {
        /// One-based line number
        line: usize,
        /// What was wrong with the line
        message: String,
    },
}

/// A parsed ini file
#[derive(Debug, Clone, Default)]
pub struct IniFile {
    sections: HashMap<String, HashMap<String, String>>,
}

impl IniFile {
    /// Parse ini content
    pub fn parse(content: &str) -> Result<Self, IniError> {
        let mut ini = IniFile::default();
        let mut current: Option<String> = None;

        for (idx, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if let Some(rest) = line.strip_prefix('[') {
                let name = rest.strip_suffix(']').ok_or_else(|| IniError::ParseError {
                    line: idx + 1,
                    message: format!("unterminated section header '{}'", line),
                })?;
                let name = name.trim().to_string();
                ini.sections.entry(name.clone()).or_default();
                current = Some(name);
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(IniError::ParseError {
                    line: idx + 1,
                    message: format!("expected KEY = VALUE, got '{}'", line),
                });
            };
            // Entries before the first header are ignored, as the controller does
            let Some(section) = &current else {
                continue;
            };
            ini.sections
                .entry(section.clone())
                .or_default()
                .entry(key.trim().to_string())
                .or_insert_with(|| value.trim().to_string());
        }

        Ok(ini)
    }

    /// Read and parse an ini file; bytes that are not UTF-8 are replaced
    pub fn from_path(path: &Path) -> Result<Self, IniError> {
        let bytes = std::fs::read(path)?;
        Self::parse(&String::from_utf8_lossy(&bytes))
    }

    /// Look up a value. Empty values count as absent.
    pub fn find(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .get(section)?
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Look up a numeric value, accepting `,` as the decimal separator
    pub fn find_f64(&self, section: &str, key: &str) -> Option<f64> {
        self.find(section, key).and_then(parse_number)
    }

    /// Whether the file defined any sections
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

/// Parse a number, accepting `,` as the decimal separator
pub fn parse_number(s: &str) -> Option<f64> {
    s.trim().replace(',', ".").parse().ok()
}

/// Parse a number that may carry a trailing `%` (which divides it by 100)
pub fn parse_percent(s: &str) -> Option<f64> {
    let s = s.trim();
    match s.strip_suffix('%') {
        Some(pct) => parse_number(pct).map(|v| v / 100.0),
        None => parse_number(s),
    }
}
