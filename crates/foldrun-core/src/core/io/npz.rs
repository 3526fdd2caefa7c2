use crate::core::models::tensor::{Tensor, TensorMap};
use ndarray::ArrayD;
use ndarray_npy::{NpzReader, NpzWriter, ReadNpyError, ReadNpzError, WriteNpzError};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, Write};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum NpzError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read archive: {0}")]
    Read(#[from] ReadNpzError),

    #[error("Failed to write archive: {0}")]
    Write(#[from] WriteNpzError),

    #[error("Array '{name}' has an unsupported element type (expected int32/int64/float32/float64/bool)")]
    UnsupportedDtype { name: String },

    #[error("Array '{name}' holds an integer outside the int32 range")]
    IntegerOverflow { name: String },
}

/// Writes every tensor of the map into an uncompressed `.npz` archive.
pub fn write_npz(tensors: &TensorMap, writer: impl Write + Seek) -> Result<(), NpzError> {
    let mut npz = NpzWriter::new(writer);
    for (name, tensor) in tensors {
        match tensor {
            Tensor::Int(array) => npz.add_array(name.as_str(), array)?,
            Tensor::Float(array) => npz.add_array(name.as_str(), array)?,
        }
    }
    npz.finish()?;
    Ok(())
}

pub fn write_npz_path(tensors: &TensorMap, path: impl AsRef<Path>) -> Result<(), NpzError> {
    let file = File::create(path.as_ref())?;
    write_npz(tensors, BufWriter::new(file))?;
    debug!(path = %path.as_ref().display(), count = tensors.len(), "Wrote tensor archive.");
    Ok(())
}

fn is_wrong_dtype(error: &ReadNpzError) -> bool {
    matches!(error, ReadNpzError::Npy(ReadNpyError::WrongDescriptor(..)))
}

fn read_entry<R: Read + Seek>(npz: &mut NpzReader<R>, name: &str) -> Result<Tensor, NpzError> {
    match npz.by_name::<_, ndarray::IxDyn>(name) {
        Ok(array) => return Ok(Tensor::Int(array)),
        Err(e) if !is_wrong_dtype(&e) => return Err(e.into()),
        Err(_) => {}
    }
    match npz.by_name::<_, ndarray::IxDyn>(name) {
        Ok(array) => return Ok(Tensor::Float(array)),
        Err(e) if !is_wrong_dtype(&e) => return Err(e.into()),
        Err(_) => {}
    }
    match npz.by_name::<ndarray::OwnedRepr<i64>, ndarray::IxDyn>(name) {
        Ok(array) => {
            return array
                .iter()
                .map(|&v| i32::try_from(v))
                .collect::<Result<Vec<i32>, _>>()
                .map_err(|_| NpzError::IntegerOverflow {
                    name: name.to_string(),
                })
                .and_then(|values| {
                    ArrayD::from_shape_vec(array.raw_dim(), values).map_err(|_| {
                        NpzError::UnsupportedDtype {
                            name: name.to_string(),
                        }
                    })
                })
                .map(Tensor::Int);
        }
        Err(e) if !is_wrong_dtype(&e) => return Err(e.into()),
        Err(_) => {}
    }
    match npz.by_name::<ndarray::OwnedRepr<f64>, ndarray::IxDyn>(name) {
        Ok(array) => return Ok(Tensor::Float(array.mapv(|v| v as f32))),
        Err(e) if !is_wrong_dtype(&e) => return Err(e.into()),
        Err(_) => {}
    }
    match npz.by_name::<ndarray::OwnedRepr<bool>, ndarray::IxDyn>(name) {
        Ok(array) => Ok(Tensor::Int(array.mapv(i32::from))),
        Err(e) if !is_wrong_dtype(&e) => Err(e.into()),
        Err(_) => Err(NpzError::UnsupportedDtype {
            name: name.to_string(),
        }),
    }
}

/// Reads every array of an `.npz` archive into a tensor map.
///
/// Integer arrays become [`Tensor::Int`] and floating-point arrays [`Tensor::Float`];
/// 64-bit arrays are narrowed, booleans are read as 0/1 integers.
pub fn read_npz(reader: impl Read + Seek) -> Result<TensorMap, NpzError> {
    let mut npz = NpzReader::new(reader)?;
    let names = npz.names()?;
    let mut tensors = TensorMap::new();
    for raw_name in names {
        let name = raw_name.strip_suffix(".npy").unwrap_or(&raw_name).to_string();
        let tensor = read_entry(&mut npz, &raw_name)?;
        tensors.insert(name, tensor);
    }
    Ok(tensors)
}

pub fn read_npz_path(path: impl AsRef<Path>) -> Result<TensorMap, NpzError> {
    let file = File::open(path.as_ref())?;
    let tensors = read_npz(BufReader::new(file))?;
    debug!(path = %path.as_ref().display(), count = tensors.len(), "Read tensor archive.");
    Ok(tensors)
}
