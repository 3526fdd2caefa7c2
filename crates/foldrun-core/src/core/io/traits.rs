use crate::core::models::protein::Protein;
use std::error::Error;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Defines the interface for encoding predicted structures into a file format.
///
/// Implementors handle format-specific serialization of a [`Protein`]. Only
/// writing is required: predicted structures leave the system, they never
/// come back in.
pub trait StructureFile {
    /// The error type for encoding operations.
    type Error: Error + From<io::Error>;

    /// Conventional file extension for the format, without the leading dot.
    const EXTENSION: &'static str;

    /// Writes a protein to a writer.
    ///
    /// # Arguments
    ///
    /// * `protein` - The predicted structure to encode.
    /// * `writer` - The writer to output to.
    ///
    /// # Errors
    ///
    /// Returns an error if the structure cannot be represented in the format or
    /// writing fails.
    fn write_to(protein: &Protein, writer: &mut impl Write) -> Result<(), Self::Error>;

    /// Writes a protein to a file path, creating or truncating the file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or writing fails.
    fn write_to_path<P: AsRef<Path>>(protein: &Protein, path: P) -> Result<(), Self::Error> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        Self::write_to(protein, &mut writer)?;
        writer.flush()?;
        Ok(())
    }

    /// Encodes a protein into an in-memory string.
    fn encode(protein: &Protein) -> Result<String, Self::Error> {
        let mut buffer = Vec::new();
        Self::write_to(protein, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
