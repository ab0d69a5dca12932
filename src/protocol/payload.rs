use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Datatype {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    Bit,
}

impl Datatype {
    /// Number of payload bytes the value occupies (a bit still needs its byte).
    pub fn width(&self) -> usize {
        match self {
            Self::U8 | Self::I8 | Self::Bit => 1,
            Self::U16 | Self::I16 => 2,
            Self::U32 | Self::I32 | Self::F32 => 4,
            Self::U64 | Self::I64 | Self::F64 => 8,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::U8 => "uint8",
            Self::U16 => "uint16",
            Self::U32 => "uint32",
            Self::U64 => "uint64",
            Self::I8 => "int8",
            Self::I16 => "int16",
            Self::I32 => "int32",
            Self::I64 => "int64",
            Self::F32 => "float32",
            Self::F64 => "float64",
            Self::Bit => "bit",
        }
    }
}

impl fmt::Display for Datatype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Datatype {
    type Err = PayloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let datatype = match s {
            "uint8" | "u8" => Self::U8,
            "uint16" | "u16" => Self::U16,
            "uint32" | "u32" => Self::U32,
            "uint64" | "u64" => Self::U64,
            "int8" | "i8" => Self::I8,
            "int16" | "i16" => Self::I16,
            "int32" | "i32" => Self::I32,
            "int64" | "i64" => Self::I64,
            "float32" | "f32" => Self::F32,
            "float64" | "f64" => Self::F64,
            "bit" => Self::Bit,
            other => return Err(PayloadError::UnknownDatatype(other.to_string())),
        };
        Ok(datatype)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum PayloadError {
    #[error("unknown datatype '{0}'")]
    UnknownDatatype(String),

    #[error("{datatype} at offset {offset} does not fit in a {len}-byte payload")]
    OutOfRange {
        datatype: Datatype,
        offset: usize,
        len: usize,
    },

    #[error("{datatype} at offset {offset} decoded to a non-finite value")]
    NotFinite { datatype: Datatype, offset: usize },
}

/// Decode one value out of a frame payload.
pub fn decode_value(datatype: Datatype, payload: &[u8], offset: usize) -> Result<f64, PayloadError> {
    let byte_offset = match datatype {
        Datatype::Bit => offset / 8,
        _ => offset,
    };
    let out_of_range = || PayloadError::OutOfRange {
        datatype,
        offset,
        len: payload.len(),
    };
    let end = byte_offset.checked_add(datatype.width()).ok_or_else(out_of_range)?;
    let bytes = payload.get(byte_offset..end).ok_or_else(out_of_range)?;

    let value = match datatype {
        Datatype::U8 => bytes[0] as f64,
        Datatype::I8 => bytes[0] as i8 as f64,
        Datatype::U16 => u16::from_le_bytes([bytes[0], bytes[1]]) as f64,
        Datatype::I16 => i16::from_le_bytes([bytes[0], bytes[1]]) as f64,
        Datatype::U32 => u32::from_le_bytes(array(bytes)) as f64,
        Datatype::I32 => i32::from_le_bytes(array(bytes)) as f64,
        Datatype::F32 => f32::from_le_bytes(array(bytes)) as f64,
        Datatype::U64 => u64::from_le_bytes(array(bytes)) as f64,
        Datatype::I64 => i64::from_le_bytes(array(bytes)) as f64,
        Datatype::F64 => f64::from_le_bytes(array(bytes)),
        Datatype::Bit => {
            let bit = offset % 8;
            if bytes[0] & (1 << bit) != 0 {
                1.0
            } else {
                0.0
            }
        }
    };

    if !value.is_finite() {
        return Err(PayloadError::NotFinite { datatype, offset });
    }
    Ok(value)
}

// Callers slice exactly `N` bytes beforehand.
fn array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}
