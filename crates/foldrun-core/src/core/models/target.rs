use std::fmt;

/// Separator placed between chain tags to form a target's composite tag.
pub const TAG_DELIMITER: &str = "-";

/// A single named chain sequence, as read from one FASTA record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainSequence {
    pub tag: String,      // Tag taken from the FASTA header (e.g., "T1050")
    pub sequence: String, // One-letter residue codes
}

impl ChainSequence {
    pub fn new(tag: impl Into<String>, sequence: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            sequence: sequence.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.sequence.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }
}

/// One unit of work: a composite identity plus the chains to be predicted jointly.
///
/// Targets are created once by the catalog scan and never change afterwards. The
/// composite tag keys the in-memory feature cache and the on-disk alignment cache,
/// while the file stem names the output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    tag: String,
    chains: Vec<ChainSequence>,
    file_stem: String,
}

impl Target {
    pub fn new(chains: Vec<ChainSequence>, file_stem: impl Into<String>) -> Self {
        let tag = chains
            .iter()
            .map(|chain| chain.tag.as_str())
            .collect::<Vec<_>>()
            .join(TAG_DELIMITER);
        Self {
            tag,
            chains,
            file_stem: file_stem.into(),
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn chains(&self) -> &[ChainSequence] {
        &self.chains
    }

    pub fn file_stem(&self) -> &str {
        &self.file_stem
    }

    pub fn chain_count(&self) -> usize {
        self.chains.len()
    }

    pub fn chain_lengths(&self) -> Vec<usize> {
        self.chains.iter().map(ChainSequence::len).collect()
    }

    /// Total residue count across all chains; the catalog sorts on this.
    pub fn total_length(&self) -> usize {
        self.chains.iter().map(ChainSequence::len).sum()
    }

    /// True when the target has exactly two chains with identical sequences.
    pub fn is_homodimer(&self) -> bool {
        matches!(self.chains.as_slice(), [a, b] if a.sequence == b.sequence)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} chain(s), {} residues)",
            self.file_stem,
            self.chains.len(),
            self.total_length()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_tag_joins_chain_tags_in_order() {
        let target = Target::new(
            vec![
                ChainSequence::new("A", "MKV"),
                ChainSequence::new("B", "GGSW"),
            ],
            "complex",
        );

        assert_eq!(target.tag(), "A-B");
        assert_eq!(target.total_length(), 7);
        assert_eq!(target.chain_lengths(), vec![3, 4]);
        assert_eq!(target.file_stem(), "complex");
    }

    #[test]
    fn homodimer_requires_two_identical_chains() {
        let homo = Target::new(
            vec![ChainSequence::new("A", "MKV"), ChainSequence::new("B", "MKV")],
            "homo",
        );
        let hetero = Target::new(
            vec![ChainSequence::new("A", "MKV"), ChainSequence::new("B", "MKW")],
            "hetero",
        );
        let single = Target::new(vec![ChainSequence::new("A", "MKV")], "single");

        assert!(homo.is_homodimer());
        assert!(!hetero.is_homodimer());
        assert!(!single.is_homodimer());
    }
}
