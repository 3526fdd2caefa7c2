//! Residue and atom naming tables shared by the structure builders and encoders.
//!
//! Residue types are indexed in the canonical one-letter order `ARNDCQEGHILKMFPSTWYV`,
//! with index 20 reserved for unknown residues. Atom positions use the fixed
//! 37-slot "atom37" layout produced by structure-prediction models.

use phf::{Map, phf_map};

/// Canonical one-letter residue codes, in model index order.
pub const RESTYPES: [char; 20] = [
    'A', 'R', 'N', 'D', 'C', 'Q', 'E', 'G', 'H', 'I', 'L', 'K', 'M', 'F', 'P', 'S', 'T', 'W', 'Y',
    'V',
];

/// Index used for any residue outside the twenty canonical types.
pub const UNKNOWN_RESTYPE: usize = 20;

/// Number of residue classes including the unknown type.
pub const RESTYPE_NUM_WITH_X: usize = 21;

/// Atom names of the atom37 layout, in slot order.
pub const ATOM_TYPES: [&str; 37] = [
    "N", "CA", "C", "CB", "O", "CG", "CG1", "CG2", "OG", "OG1", "SG", "CD", "CD1", "CD2", "ND1",
    "ND2", "OD1", "OD2", "SD", "CE", "CE1", "CE2", "CE3", "NE", "NE1", "NE2", "OE1", "OE2", "CH2",
    "NH1", "NH2", "OH", "CZ", "CZ2", "CZ3", "NZ", "OXT",
];

pub const ATOM_TYPE_NUM: usize = ATOM_TYPES.len();

/// Chain identifiers available to the PDB encoder, in assignment order.
pub const PDB_CHAIN_IDS: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

static RESTYPE_1TO3: Map<char, &'static str> = phf_map! {
    'A' => "ALA",
    'R' => "ARG",
    'N' => "ASN",
    'D' => "ASP",
    'C' => "CYS",
    'Q' => "GLN",
    'E' => "GLU",
    'G' => "GLY",
    'H' => "HIS",
    'I' => "ILE",
    'L' => "LEU",
    'K' => "LYS",
    'M' => "MET",
    'F' => "PHE",
    'P' => "PRO",
    'S' => "SER",
    'T' => "THR",
    'W' => "TRP",
    'Y' => "TYR",
    'V' => "VAL",
};

/// Three-letter residue name for a residue-type index, `UNK` for anything unrecognised.
pub fn restype_name(index: usize) -> &'static str {
    RESTYPES
        .get(index)
        .and_then(|code| RESTYPE_1TO3.get(code))
        .copied()
        .unwrap_or("UNK")
}

/// Residue-type index of a one-letter code.
pub fn restype_index(code: char) -> usize {
    RESTYPES
        .iter()
        .position(|&c| c == code.to_ascii_uppercase())
        .unwrap_or(UNKNOWN_RESTYPE)
}

/// Element symbol of an atom37 atom name (first character of the name).
pub fn element_of(atom_name: &str) -> &str {
    atom_name.get(..1).unwrap_or("")
}

/// Chain identifier for a zero-based chain index, if the PDB alphabet has one.
pub fn pdb_chain_id(chain_index: usize) -> Option<char> {
    PDB_CHAIN_IDS.chars().nth(chain_index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restype_names_round_trip_through_indices() {
        assert_eq!(restype_name(restype_index('m')), "MET");
        assert_eq!(restype_name(restype_index('W')), "TRP");
        assert_eq!(restype_index('B'), UNKNOWN_RESTYPE);
        assert_eq!(restype_name(UNKNOWN_RESTYPE), "UNK");
    }

    #[test]
    fn atom37_layout_starts_with_backbone() {
        assert_eq!(ATOM_TYPE_NUM, 37);
        assert_eq!(&ATOM_TYPES[..3], &["N", "CA", "C"]);
        assert_eq!(element_of("OXT"), "O");
    }

    #[test]
    fn chain_ids_cover_sixty_two_chains() {
        assert_eq!(pdb_chain_id(0), Some('A'));
        assert_eq!(pdb_chain_id(26), Some('a'));
        assert_eq!(pdb_chain_id(61), Some('9'));
        assert_eq!(pdb_chain_id(62), None);
    }
}
