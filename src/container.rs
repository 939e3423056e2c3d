//! Tile stream container: a magic, the bincode-encoded slice configuration
//! and one length + CRC32 framed segment per tile.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::engine::{EncodedTile, SliceConfig};
use crate::error::{RescodeError, RescodeResult};

pub const STREAM_MAGIC: &[u8; 4] = b"RSQ1";

const MAX_HEADER_LEN: usize = 1 << 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileStream {
    pub config: SliceConfig,
    pub tiles: Vec<Vec<u8>>,
}

impl TileStream {
    pub fn new(config: SliceConfig, tiles: Vec<Vec<u8>>) -> Self {
        Self { config, tiles }
    }

    pub fn from_encoded(config: SliceConfig, tiles: Vec<EncodedTile>) -> Self {
        Self {
            config,
            tiles: tiles.into_iter().map(|t| t.bytes).collect(),
        }
    }

    pub fn payload_bytes(&self) -> usize {
        self.tiles.iter().map(Vec::len).sum()
    }
}

fn tile_crc(data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

pub fn write_stream<W: Write>(mut writer: W, stream: &TileStream) -> RescodeResult<W> {
    let header = bincode::serialize(&stream.config)?;
    writer.write_all(STREAM_MAGIC)?;
    writer.write_u32::<LittleEndian>(header.len() as u32)?;
    writer.write_all(&header)?;

    writer.write_u32::<LittleEndian>(stream.tiles.len() as u32)?;
    for tile in &stream.tiles {
        writer.write_u32::<LittleEndian>(tile.len() as u32)?;
        writer.write_u32::<LittleEndian>(tile_crc(tile))?;
        writer.write_all(tile)?;
    }
    writer.flush()?;
    Ok(writer)
}

pub fn read_stream<R: Read>(mut reader: R) -> RescodeResult<TileStream> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if &magic != STREAM_MAGIC {
        return Err(RescodeError::InvalidFormat(
            "Invalid magic number. Not a residual tile stream.".into(),
        ));
    }

    let header_len = reader.read_u32::<LittleEndian>()? as usize;
    if header_len > MAX_HEADER_LEN {
        return Err(RescodeError::InvalidFormat(format!(
            "header length {} is implausible",
            header_len
        )));
    }
    let mut header = vec![0u8; header_len];
    reader.read_exact(&mut header)?;
    let config: SliceConfig = bincode::deserialize(&header)?;
    config.validate()?;

    let count = reader.read_u32::<LittleEndian>()? as usize;
    let mut tiles = Vec::new();
    for tile in 0..count {
        let len = reader.read_u32::<LittleEndian>()? as usize;
        let expected = reader.read_u32::<LittleEndian>()?;
        let mut data = Vec::new();
        reader.by_ref().take(len as u64).read_to_end(&mut data)?;
        if data.len() != len {
            return Err(RescodeError::InvalidFormat(format!(
                "tile {} truncated: {} of {} bytes",
                tile,
                data.len(),
                len
            )));
        }
        let actual = tile_crc(&data);
        if actual != expected {
            return Err(RescodeError::CrcMismatch {
                tile,
                expected,
                actual,
            });
        }
        tiles.push(data);
    }

    Ok(TileStream { config, tiles })
}
