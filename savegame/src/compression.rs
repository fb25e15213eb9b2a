use std::io::{Cursor, Read};

use byteorder::{ReadBytesExt, WriteBytesExt, LE};

use crate::{Error, Result};

/// Lossless transform applied to the whole save buffer.
pub trait Compressor: Send + Sync {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;
    fn decompress(&self, data: &[u8], uncompressed_size: usize) -> Result<Vec<u8>>;
}

/// LZ4 block format.
#[derive(Debug, Default, Clone, Copy)]
pub struct Lz4Compressor;

impl Compressor for Lz4Compressor {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(lz4_flex::block::compress(data))
    }
    fn decompress(&self, data: &[u8], uncompressed_size: usize) -> Result<Vec<u8>> {
        lz4_flex::block::decompress(data, uncompressed_size).map_err(|e| Error::Decompress(e.to_string()))
    }
}

/// `u64 uncompressed size` followed by the compressed bytes.
pub fn compress_blob(compressor: &dyn Compressor, data: &[u8]) -> Result<Vec<u8>> {
    let compressed = compressor.compress(data)?;
    let mut blob = Vec::with_capacity(8 + compressed.len());
    blob.write_u64::<LE>(data.len() as u64)?;
    blob.extend_from_slice(&compressed);
    Ok(blob)
}

pub fn decompress_blob(compressor: &dyn Compressor, blob: &[u8]) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(blob);
    let size = cursor.read_u64::<LE>()?;
    let size = usize::try_from(size).map_err(|_| Error::Decompress(format!("size {size} too large")))?;
    let mut compressed = vec![];
    cursor.read_to_end(&mut compressed)?;
    let data = compressor.decompress(&compressed, size)?;
    if data.len() != size {
        return Err(Error::Decompress(format!(
            "expected {size} bytes, got {}",
            data.len()
        )));
    }
    Ok(data)
}
