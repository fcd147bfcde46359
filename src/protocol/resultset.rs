//! Text-protocol result set decoding
//!
//! The checker only ever needs the first column of the first row, so this
//! module decodes just enough of a COM_QUERY response to get there.

/// Result set decoding errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("empty payload")]
    Empty,
    #[error("invalid length encoding")]
    InvalidLength,
    #[error("truncated value")]
    Truncated,
    #[error("invalid UTF-8 in column value")]
    InvalidUtf8,
}

/// Marker byte for a NULL column value in a text-protocol row
const NULL_MARKER: u8 = 0xFB;

/// Parse a length-encoded integer, returning (value, bytes consumed)
pub fn read_lenenc_int(data: &[u8]) -> Result<(u64, usize), DecodeError> {
    let first = *data.first().ok_or(DecodeError::Empty)?;
    match first {
        0..=0xFA => Ok((first as u64, 1)),
        0xFC if data.len() >= 3 => Ok((u16::from_le_bytes([data[1], data[2]]) as u64, 3)),
        0xFD if data.len() >= 4 => Ok((
            u32::from_le_bytes([data[1], data[2], data[3], 0]) as u64,
            4,
        )),
        0xFE if data.len() >= 9 => {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&data[1..9]);
            Ok((u64::from_le_bytes(raw), 9))
        }
        0xFC..=0xFE => Err(DecodeError::Truncated),
        _ => Err(DecodeError::InvalidLength),
    }
}

/// Parse a length-encoded string column value.
///
/// Returns `None` for SQL NULL, plus the number of bytes consumed.
pub fn read_lenenc_str(data: &[u8]) -> Result<(Option<String>, usize), DecodeError> {
    if data.first() == Some(&NULL_MARKER) {
        return Ok((None, 1));
    }

    let (len, header) = read_lenenc_int(data)?;
    let len = usize::try_from(len).map_err(|_| DecodeError::InvalidLength)?;
    let end = header.checked_add(len).ok_or(DecodeError::InvalidLength)?;
    if data.len() < end {
        return Err(DecodeError::Truncated);
    }

    let value = std::str::from_utf8(&data[header..end])
        .map_err(|_| DecodeError::InvalidUtf8)?
        .to_string();
    Ok((Some(value), end))
}

/// Decode the first column of a text-protocol row
pub fn first_column(row: &[u8]) -> Result<Option<String>, DecodeError> {
    read_lenenc_str(row).map(|(value, _)| value)
}

#[cfg(test)]
pub(crate) fn put_lenenc_int(buf: &mut bytes::BytesMut, value: u64) {
    use bytes::BufMut;

    if value < 251 {
        buf.put_u8(value as u8);
    } else if value < 65536 {
        buf.put_u8(0xFC);
        buf.put_u16_le(value as u16);
    } else if value < 16777216 {
        buf.put_u8(0xFD);
        buf.put_u8((value & 0xFF) as u8);
        buf.put_u8(((value >> 8) & 0xFF) as u8);
        buf.put_u8(((value >> 16) & 0xFF) as u8);
    } else {
        buf.put_u8(0xFE);
        buf.put_u64_le(value);
    }
}
