use super::traits::StructureFile;
use crate::core::models::protein::{Protein, StructureError};
use crate::core::residue_constants::{ATOM_TYPES, element_of, restype_name};
use std::io::Write;

/// Encoder for a ModelCIF-flavoured mmCIF file.
///
/// The file carries a single `_atom_site` loop with per-atom confidences in
/// `B_iso_or_equiv`, and a global pLDDT entry in `_ma_qa_metric_global`.
/// Unlike PDB, mmCIF places no limit on the number of chains.
pub struct ModelCifFile;

/// Chain label for a zero-based chain index: `A`..`Z`, then `AA`, `AB`, ...
pub fn cif_chain_id(chain_index: usize) -> String {
    let mut index = chain_index;
    let mut label = Vec::new();
    loop {
        label.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    label.reverse();
    String::from_utf8_lossy(&label).into_owned()
}

fn block_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect();
    if cleaned.is_empty() {
        "model".to_string()
    } else {
        cleaned
    }
}

fn quoted(value: &str) -> String {
    if value.contains('\'') {
        format!("\"{}\"", value)
    } else {
        format!("'{}'", value)
    }
}

impl StructureFile for ModelCifFile {
    type Error = StructureError;

    const EXTENSION: &'static str = "cif";

    fn write_to(protein: &Protein, writer: &mut impl Write) -> Result<(), Self::Error> {
        let name = block_name(&protein.name);
        writeln!(writer, "data_{}", name)?;
        writeln!(writer, "#")?;
        writeln!(writer, "_entry.id {}", name)?;
        if let Some(remark) = &protein.remark {
            writeln!(writer, "_struct.title {}", quoted(remark))?;
        }
        writeln!(writer, "#")?;

        if let Some(plddt) = protein.mean_b_factor() {
            writeln!(writer, "loop_")?;
            writeln!(writer, "_ma_qa_metric_global.id")?;
            writeln!(writer, "_ma_qa_metric_global.metric_name")?;
            writeln!(writer, "_ma_qa_metric_global.metric_value")?;
            writeln!(writer, "1 pLDDT {:.2}", plddt)?;
            writeln!(writer, "#")?;
        }

        writeln!(writer, "loop_")?;
        for field in [
            "group_PDB",
            "id",
            "type_symbol",
            "label_atom_id",
            "label_comp_id",
            "label_asym_id",
            "label_seq_id",
            "Cartn_x",
            "Cartn_y",
            "Cartn_z",
            "occupancy",
            "B_iso_or_equiv",
            "pdbx_PDB_model_num",
        ] {
            writeln!(writer, "_atom_site.{}", field)?;
        }

        let mut serial = 1;
        for residue in &protein.residues {
            let res_name = restype_name(residue.restype);
            let chain = cif_chain_id(residue.chain_index);
            for atom in &residue.atoms {
                let atom_name = ATOM_TYPES.get(atom.atom_type).copied().unwrap_or("X");
                writeln!(
                    writer,
                    "ATOM {} {} {} {} {} {} {:.3} {:.3} {:.3} 1.00 {:.2} 1",
                    serial,
                    element_of(atom_name),
                    atom_name,
                    res_name,
                    chain,
                    residue.residue_index,
                    atom.position.x,
                    atom.position.y,
                    atom.position.z,
                    atom.b_factor,
                )?;
                serial += 1;
            }
        }
        writeln!(writer, "#")?;
        Ok(())
    }
}
