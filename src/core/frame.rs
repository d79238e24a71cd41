//! Private long-name frame carried inside every save package payload
//!
//! Device names are limited to twelve characters, so the caller-visible name
//! travels inside the payload:
//!
//! ```text
//! [save_offset: u32 LE][long name bytes][0x00][save bytes ...]
//!  ^ offset of the save bytes from the start of the frame
//! ```

use crate::core::error::{Result, SaveError};

/// Size of the leading offset field
pub const OFFSET_FIELD: usize = 4;

/// Bytes the frame adds in front of the save data for `long_name`
pub fn frame_overhead(long_name: &str) -> usize {
    OFFSET_FIELD + long_name.len() + 1
}

/// Reject names the frame cannot carry
pub fn validate_long_name(long_name: &str) -> Result<()> {
    if long_name.is_empty() {
        return Err(SaveError::InvalidName("long name cannot be empty".to_string()));
    }
    if long_name.as_bytes().contains(&0) {
        return Err(SaveError::InvalidName(format!(
            "long name {:?} contains a NUL byte",
            long_name
        )));
    }
    Ok(())
}

/// Write the frame prefix for `long_name` into `out`, returning the save offset
pub fn write_prefix(long_name: &str, out: &mut Vec<u8>) -> Result<usize> {
    validate_long_name(long_name)?;
    let save_offset = frame_overhead(long_name);
    let field = u32::try_from(save_offset)
        .map_err(|_| SaveError::InvalidName("long name too long".to_string()))?;

    out.extend_from_slice(&field.to_le_bytes());
    out.extend_from_slice(long_name.as_bytes());
    out.push(0);
    Ok(save_offset)
}

/// Frame `save_bytes` under `long_name`
///
/// Returns the framed payload together with the offset of the save bytes.
pub fn write_frame(long_name: &str, save_bytes: &[u8]) -> Result<(Vec<u8>, usize)> {
    let mut framed = Vec::with_capacity(frame_overhead(long_name) + save_bytes.len());
    let save_offset = write_prefix(long_name, &mut framed)?;
    framed.extend_from_slice(save_bytes);
    Ok((framed, save_offset))
}

/// A decoded frame borrowing from the package payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame<'a> {
    pub long_name: String,
    pub save_offset: usize,
    pub save: &'a [u8],
}

/// Split a framed payload into its long name and save bytes
pub fn read_frame(framed: &[u8]) -> Result<Frame<'_>> {
    if framed.len() < OFFSET_FIELD {
        return Err(SaveError::Decode(format!(
            "frame is {} bytes, too short for the offset field",
            framed.len()
        )));
    }

    let save_offset =
        u32::from_le_bytes([framed[0], framed[1], framed[2], framed[3]]) as usize;
    if save_offset <= OFFSET_FIELD || save_offset > framed.len() {
        return Err(SaveError::Decode(format!(
            "save offset {} out of bounds for a {}-byte frame",
            save_offset,
            framed.len()
        )));
    }

    let name_area = &framed[OFFSET_FIELD..save_offset];
    let nul = name_area
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| SaveError::Decode("long name is not NUL-terminated".to_string()))?;
    if nul == 0 {
        return Err(SaveError::Decode("long name is empty".to_string()));
    }
    let long_name = std::str::from_utf8(&name_area[..nul])
        .map_err(|e| SaveError::Decode(format!("long name is not UTF-8: {}", e)))?
        .to_string();

    Ok(Frame {
        long_name,
        save_offset,
        save: &framed[save_offset..],
    })
}
