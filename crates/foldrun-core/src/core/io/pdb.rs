use super::traits::StructureFile;
use crate::core::models::protein::{PredictedResidue, Protein, StructureError};
use crate::core::residue_constants::{
    ATOM_TYPES, PDB_CHAIN_IDS, element_of, pdb_chain_id, restype_name,
};
use std::io::Write;

const LINE_WIDTH: usize = 80;

/// Encoder for the fixed-column PDB format.
///
/// Chains are labelled `A`, `B`, ... in order of their chain index; each chain
/// is closed with a `TER` record and the file with `END`. Every line is padded
/// to 80 columns.
pub struct PdbFile;

fn write_line(writer: &mut impl Write, line: &str) -> std::io::Result<()> {
    writeln!(writer, "{:<width$}", line, width = LINE_WIDTH)
}

fn chain_tag(chain_index: usize) -> Result<char, StructureError> {
    pdb_chain_id(chain_index).ok_or(StructureError::TooManyChains {
        count: chain_index + 1,
        max: PDB_CHAIN_IDS.len(),
    })
}

fn atom_name_field(name: &str) -> String {
    if name.len() == 4 {
        name.to_string()
    } else {
        format!(" {}", name)
    }
}

fn parent_line(parents: &[String]) -> String {
    if parents.is_empty() {
        "PARENT N/A".to_string()
    } else {
        format!("PARENT {}", parents.join(" "))
    }
}

fn termination_line(serial: usize, residue: &PredictedResidue) -> Result<String, StructureError> {
    Ok(format!(
        "{:<6}{:>5}      {:>3} {:>1}{:>4}",
        "TER",
        serial,
        restype_name(residue.restype),
        chain_tag(residue.chain_index)?,
        residue.residue_index
    ))
}

impl StructureFile for PdbFile {
    type Error = StructureError;

    const EXTENSION: &'static str = "pdb";

    fn write_to(protein: &Protein, writer: &mut impl Write) -> Result<(), Self::Error> {
        let chain_count = protein.chain_count();
        if chain_count > PDB_CHAIN_IDS.len() {
            return Err(StructureError::TooManyChains {
                count: chain_count,
                max: PDB_CHAIN_IDS.len(),
            });
        }

        if let Some(remark) = &protein.remark {
            write_line(writer, &format!("REMARK {}", remark))?;
        }
        write_line(writer, &parent_line(&protein.parents))?;

        let mut serial = 1;
        let mut previous: Option<&PredictedResidue> = None;
        for residue in &protein.residues {
            if let Some(prev) = previous.filter(|p| p.chain_index != residue.chain_index) {
                write_line(writer, &termination_line(serial, prev)?)?;
                serial += 1;
                write_line(writer, &parent_line(&protein.parents))?;
            }

            let res_name = restype_name(residue.restype);
            let chain = chain_tag(residue.chain_index)?;
            for atom in &residue.atoms {
                let name = ATOM_TYPES.get(atom.atom_type).copied().unwrap_or("X");
                let line = format!(
                    "{:<6}{:>5} {:<4}{:>1}{:>3} {:>1}{:>4}{:>1}   {:>8.3}{:>8.3}{:>8.3}{:>6.2}{:>6.2}          {:>2}{:>2}",
                    "ATOM",
                    serial,
                    atom_name_field(name),
                    "",
                    res_name,
                    chain,
                    residue.residue_index,
                    "",
                    atom.position.x,
                    atom.position.y,
                    atom.position.z,
                    1.00,
                    atom.b_factor,
                    element_of(name),
                    ""
                );
                write_line(writer, &line)?;
                serial += 1;
            }
            previous = Some(residue);
        }

        if let Some(last) = previous {
            write_line(writer, &termination_line(serial, last)?)?;
        }
        write_line(writer, "END")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::protein::tests::two_chain_protein;

    #[test]
    fn writes_fixed_column_atom_records() {
        let text = PdbFile::encode(&two_chain_protein()).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert!(lines.iter().all(|l| l.len() == LINE_WIDTH));
        assert_eq!(
            lines[0].trim_end(),
            "REMARK no_recycling=3, max_templates=4, config_preset=model_1"
        );
        assert_eq!(lines[1].trim_end(), "PARENT N/A");
        assert_eq!(
            lines[2].trim_end(),
            "ATOM      1  N   MET A   1       0.000  -1.250  10.000  1.00 91.50           N"
        );
        assert_eq!(&lines[3][12..16], " CA ");
    }

    #[test]
    fn chains_are_separated_by_ter_records() {
        let text = PdbFile::encode(&two_chain_protein()).unwrap();
        let trimmed: Vec<&str> = text.lines().map(str::trim_end).collect();

        // 6 atoms on chain A, then TER with serial 7.
        assert_eq!(trimmed[8], "TER       7      GLY A   2");
        assert_eq!(trimmed[9], "PARENT N/A");
        assert!(trimmed[10].starts_with("ATOM      8  N   ALA B   1"));
        assert_eq!(trimmed[13], "TER      11      ALA B   1");
        assert_eq!(trimmed.last(), Some(&"END"));
    }

    #[test]
    fn too_many_chains_is_rejected() {
        let mut protein = two_chain_protein();
        protein.residues[2].chain_index = 70;
        assert!(matches!(
            PdbFile::encode(&protein),
            Err(StructureError::TooManyChains { count: 71, .. })
        ));
    }
}
