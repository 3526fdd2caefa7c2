use crate::core::models::target::ChainSequence;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FastaError {
    #[error("Sequence data on line {line} appears before any '>' header")]
    OrphanSequence { line: usize },

    #[error("Header on line {line} has no usable tag")]
    EmptyTag { line: usize },

    #[error("Record '{tag}' starting on line {line} has no sequence")]
    EmptySequence { tag: String, line: usize },
}

/// Extracts the record tag from a header: its first token, cut at the first non-word character.
fn header_tag(header: &str) -> &str {
    let header = header.trim_start();
    let end = header
        .find(|c: char| !(c.is_alphanumeric() || c == '_'))
        .unwrap_or(header.len());
    &header[..end]
}

/// Parses FASTA text into chain sequences, in file order.
///
/// Sequence lines are concatenated with all whitespace removed. Blank lines are ignored.
pub fn parse_fasta(data: &str) -> Result<Vec<ChainSequence>, FastaError> {
    let mut records: Vec<(ChainSequence, usize)> = Vec::new();

    for (line_num, line) in data.lines().enumerate() {
        let line_num = line_num + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some(header) = trimmed.strip_prefix('>') {
            let tag = header_tag(header);
            if tag.is_empty() {
                return Err(FastaError::EmptyTag { line: line_num });
            }
            records.push((ChainSequence::new(tag, String::new()), line_num));
            continue;
        }

        match records.last_mut() {
            Some((record, _)) => record
                .sequence
                .extend(trimmed.chars().filter(|c| !c.is_whitespace())),
            None => return Err(FastaError::OrphanSequence { line: line_num }),
        }
    }

    records
        .into_iter()
        .map(|(record, line)| {
            if record.is_empty() {
                Err(FastaError::EmptySequence {
                    tag: record.tag,
                    line,
                })
            } else {
                Ok(record)
            }
        })
        .collect()
}

/// Formats chain sequences as FASTA text, one header and one sequence line per record.
pub fn format_fasta(records: &[ChainSequence]) -> String {
    records
        .iter()
        .map(|r| format!(">{}\n{}", r.tag, r.sequence))
        .collect::<Vec<_>>()
        .join("\n")
}
