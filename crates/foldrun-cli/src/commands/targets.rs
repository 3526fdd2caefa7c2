use crate::cli::TargetsArgs;
use crate::error::Result;
use foldrun::engine::catalog::TargetCatalog;
use foldrun::engine::config::{ChainMode, ModelConfig};
use std::io::{self, Write};
use tracing::info;

pub async fn run(args: TargetsArgs) -> Result<()> {
    super::require_dir(&args.fasta_dir, "FASTA directory")?;
    // Rejects unknown presets the same way `predict` would.
    ModelConfig::for_preset(&args.config_preset, false, false)?;
    let chain_mode = ChainMode::from_preset(&args.config_preset);
    info!(dir = %args.fasta_dir.display(), ?chain_mode, "Listing targets.");

    let catalog = TargetCatalog::discover(&args.fasta_dir, chain_mode)?;
    write_worklist(&catalog, &mut io::stdout().lock())?;
    Ok(())
}

fn write_worklist(catalog: &TargetCatalog, out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "{:>4}  {:<24} {:>8} {:>6}  TAG", "#", "TARGET", "RESIDUES", "CHAINS")?;
    for (i, target) in catalog.targets().iter().enumerate() {
        writeln!(
            out,
            "{:>4}  {:<24} {:>8} {:>6}  {}",
            i + 1,
            target.file_stem(),
            target.total_length(),
            target.chain_count(),
            target.tag()
        )?;
    }
    if !catalog.skipped().is_empty() {
        writeln!(out)?;
        writeln!(out, "Skipped {} file(s):", catalog.skipped().len())?;
        for skipped in catalog.skipped() {
            writeln!(out, "  {}: {}", skipped.path.display(), skipped.reason)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn worklist_is_printed_shortest_first_with_skips() {
        let catalog = TargetCatalog::from_sources(
            vec![
                (PathBuf::from("long.fasta"), ">L\nMKVLAAGIV\n".to_string()),
                (PathBuf::from("short.fa"), ">S\nMKV\n".to_string()),
                (PathBuf::from("pair.fasta"), ">A\nMK\n>B\nMK\n".to_string()),
            ],
            ChainMode::Monomer,
        );

        let mut out = Vec::new();
        write_worklist(&catalog, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert!(lines[1].contains("short") && lines[1].trim_end().ends_with('S'));
        assert!(lines[2].contains("long"));
        assert_eq!(lines[4], "Skipped 1 file(s):");
        assert!(lines[5].contains("pair.fasta"));
    }
}
