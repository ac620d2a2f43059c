//! Step directives
//!
//! A run line starting with `--` is a directive handled by the engine
//! itself instead of being handed to a shell. Directive arguments are split
//! with quote awareness so paths with spaces work.

use crate::engine::tokenizer::split_quoted;
use crate::error::EngineError;
use sha2::{Digest, Sha256, Sha512};
use std::fs::File;
use std::path::Path;

pub const PRINT_INFO_PREFIX: &str = "--print:info";
pub const PRINT_ERROR_PREFIX: &str = "--print:error";
pub const SHA_CHECKSUM_PREFIX: &str = "--sha-checksum";
pub const EXTENSION_PREFIX: &str = "--extension";
pub const PIPELINE_PREFIX: &str = "--pipeline";

/// A parsed directive line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Print a message to standard output
    PrintInfo(String),
    /// Print a message to standard error
    PrintError(String),
    /// Verify a file against an expected checksum
    ShaChecksum { file: String, expected: String },
    /// Download-free extension: extract an archive and run its `run.sh`
    Extension {
        file: String,
        expected_checksum: Option<String>,
    },
    /// Execute another pipeline definition in place
    Pipeline { file: String },
}

impl Directive {
    /// Whether a run line is a directive at all
    pub fn is_directive(line: &str) -> bool {
        line.trim_start().starts_with("--")
    }

    /// Parse a directive line; call only when [`Self::is_directive`] is true
    pub fn parse(line: &str) -> Result<Directive, EngineError> {
        let line = line.trim();

        if let Some(message) = strip_directive(line, PRINT_INFO_PREFIX) {
            return Ok(Directive::PrintInfo(message.to_string()));
        }
        if let Some(message) = strip_directive(line, PRINT_ERROR_PREFIX) {
            return Ok(Directive::PrintError(message.to_string()));
        }

        if let Some(args) = strip_directive(line, SHA_CHECKSUM_PREFIX) {
            let args = split_quoted(args);
            if args.len() != 2 {
                return Err(EngineError::InvalidDirective {
                    prefix: SHA_CHECKSUM_PREFIX,
                    line: line.to_string(),
                });
            }
            return Ok(Directive::ShaChecksum {
                file: args[0].clone(),
                expected: args[1].clone(),
            });
        }

        if let Some(args) = strip_directive(line, EXTENSION_PREFIX) {
            let args = split_quoted(args);
            if args.is_empty() || args.len() > 2 {
                return Err(EngineError::InvalidDirective {
                    prefix: EXTENSION_PREFIX,
                    line: line.to_string(),
                });
            }
            return Ok(Directive::Extension {
                file: args[0].clone(),
                expected_checksum: args.get(1).cloned(),
            });
        }

        if let Some(args) = strip_directive(line, PIPELINE_PREFIX) {
            let args = split_quoted(args);
            if args.len() != 1 {
                return Err(EngineError::InvalidDirective {
                    prefix: PIPELINE_PREFIX,
                    line: line.to_string(),
                });
            }
            return Ok(Directive::Pipeline {
                file: args[0].clone(),
            });
        }

        Err(EngineError::InvalidDirective {
            prefix: "--",
            line: line.to_string(),
        })
    }
}

/// Match `line` against a directive word followed by whitespace or nothing
fn strip_directive<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(prefix)?;
    if rest.is_empty() {
        Some("")
    } else if rest.starts_with(char::is_whitespace) {
        Some(rest.trim_start())
    } else {
        None
    }
}

/// Checksum algorithm, inferred from the length of the expected hex digest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    Sha256,
    Sha512,
}

impl ChecksumAlgorithm {
    pub fn infer(expected_hex: &str) -> Option<ChecksumAlgorithm> {
        match expected_hex.len() {
            64 => Some(ChecksumAlgorithm::Sha256),
            128 => Some(ChecksumAlgorithm::Sha512),
            _ => None,
        }
    }
}

/// Compute the hex digest of a file, streaming
pub fn checksum_file(path: &Path, algorithm: ChecksumAlgorithm) -> Result<String, EngineError> {
    let mut file = File::open(path)?;
    let digest = match algorithm {
        ChecksumAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();
            std::io::copy(&mut file, &mut hasher)?;
            format!("{:x}", hasher.finalize())
        }
        ChecksumAlgorithm::Sha512 => {
            let mut hasher = Sha512::new();
            std::io::copy(&mut file, &mut hasher)?;
            format!("{:x}", hasher.finalize())
        }
    };
    Ok(digest)
}

/// Verify a file against an expected hex digest, case-insensitively
pub fn verify_checksum(path: &Path, expected: &str) -> Result<(), EngineError> {
    let algorithm =
        ChecksumAlgorithm::infer(expected).ok_or_else(|| EngineError::InvalidDirective {
            prefix: SHA_CHECKSUM_PREFIX,
            line: expected.to_string(),
        })?;
    let actual = checksum_file(path, algorithm)?;
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(EngineError::ChecksumMismatch {
            file: path.display().to_string(),
            expected: expected.to_lowercase(),
            actual,
        })
    }
}

/// The shell command that unpacks `archive` into `dest`, chosen by suffix;
/// anything unrecognized is treated as a zip archive
pub fn extraction_command(archive: &str, dest: &str) -> String {
    let lower = archive.to_lowercase();
    if lower.ends_with(".tar.xz") {
        format!("tar -xJf '{archive}' -C '{dest}'")
    } else if lower.ends_with(".tar.bz2") {
        format!("tar -xjf '{archive}' -C '{dest}'")
    } else if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
        format!("tar -xzf '{archive}' -C '{dest}'")
    } else if lower.ends_with(".tar") {
        format!("tar -xf '{archive}' -C '{dest}'")
    } else {
        format!("unzip -q '{archive}' -d '{dest}'")
    }
}
