use sluice_core::{
    FieldMut, FieldRef, ParamBind, ParamBuffer, ResultBind, ResultBuffer, WireError,
    WireResult, WireTime,
};
use std::fmt::{self, Display, Formatter};

pub mod codes {
    pub const ACCESS_DENIED: u32 = 1045;
    pub const PARSE_ERROR: u32 = 1064;
    pub const UNKNOWN_STATEMENT: u32 = 1243;
    pub const OUT_OF_RANGE: u32 = 1264;
    pub const CANNOT_CONNECT: u32 = 2003;
    pub const MALFORMED_PACKET: u32 = 2027;
    pub const MISSING_PARAMETERS: u32 = 2031;
    pub const UNSUPPORTED_BUFFER: u32 = 2036;
    pub const NO_ROW: u32 = 2051;
}

/// A value stored by the server, one per column.
#[derive(Debug, Clone, PartialEq)]
pub enum WireValue {
    Null,
    Int(i64),
    UInt(u64),
    Double(f64),
    Bytes(Vec<u8>),
    Time(WireTime),
}

impl WireValue {
    pub fn is_null(&self) -> bool {
        matches!(self, WireValue::Null)
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            WireValue::Bytes(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            WireValue::Int(v) => Some(v),
            WireValue::UInt(v) => i64::try_from(v).ok(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            WireValue::Int(v) => u64::try_from(v).ok(),
            WireValue::UInt(v) => Some(v),
            _ => None,
        }
    }

    pub(crate) fn from_param(bind: &ParamBind<'_>) -> WireResult<Self> {
        if bind.binding.is_null {
            return Ok(WireValue::Null);
        }
        Ok(match &bind.buffer {
            ParamBuffer::Empty => WireValue::Null,
            ParamBuffer::Field(field) => match *field {
                FieldRef::Null(..) => WireValue::Null,
                FieldRef::Bool(v) => WireValue::Int(*v as i64),
                FieldRef::I8(v) => WireValue::Int(*v as i64),
                FieldRef::I16(v) => WireValue::Int(*v as i64),
                FieldRef::I32(v) => WireValue::Int(*v as i64),
                FieldRef::I64(v) => WireValue::Int(*v),
                FieldRef::U8(v) => WireValue::UInt(*v as u64),
                FieldRef::U16(v) => WireValue::UInt(*v as u64),
                FieldRef::U32(v) => WireValue::UInt(*v as u64),
                FieldRef::U64(v) => WireValue::UInt(*v),
                FieldRef::F32(v) => WireValue::Double(*v as f64),
                FieldRef::F64(v) => WireValue::Double(*v),
                FieldRef::Blob(v) => WireValue::Bytes(v.to_vec()),
                FieldRef::Text(v) => WireValue::Bytes(v.as_bytes().to_vec()),
                other => {
                    return Err(WireError::new(
                        codes::UNSUPPORTED_BUFFER,
                        format!("Using unsupported buffer type: {}", other.kind()),
                    ));
                }
            },
            ParamBuffer::Bytes(v) => WireValue::Bytes(v.to_vec()),
            ParamBuffer::Time(v) => WireValue::Time(**v),
        })
    }

    fn out_of_range(&self, target: impl Display) -> WireError {
        WireError::new(
            codes::OUT_OF_RANGE,
            format!("Out of range value {} for a {} buffer", self, target),
        )
    }

    fn unsupported(&self, target: impl Display) -> WireError {
        WireError::new(
            codes::UNSUPPORTED_BUFFER,
            format!("Cannot store {} into a {} buffer", self, target),
        )
    }

    fn integer<T: TryFrom<i64> + TryFrom<u64>>(&self, target: &str) -> WireResult<T> {
        match *self {
            WireValue::Int(v) => {
                <T as TryFrom<i64>>::try_from(v).map_err(|_| self.out_of_range(target))
            }
            WireValue::UInt(v) => {
                <T as TryFrom<u64>>::try_from(v).map_err(|_| self.out_of_range(target))
            }
            _ => Err(self.unsupported(target)),
        }
    }

    fn double(&self, target: &str) -> WireResult<f64> {
        match *self {
            WireValue::Int(v) => Ok(v as f64),
            WireValue::UInt(v) => Ok(v as f64),
            WireValue::Double(v) => Ok(v),
            _ => Err(self.unsupported(target)),
        }
    }

    /// Store the value in the bound buffer the way the binding protocol does: byte
    /// payloads are copied up to the buffer size and the full length is reported.
    /// Returns whether the value was truncated.
    pub(crate) fn write(&self, bind: &mut ResultBind<'_>) -> WireResult<bool> {
        let binding = &mut *bind.binding;
        binding.is_null = self.is_null();
        binding.length = 0;
        binding.truncated = false;
        if self.is_null() {
            return Ok(false);
        }
        match &mut bind.buffer {
            ResultBuffer::Field(field) => match field {
                FieldMut::Bool(v) => **v = self.integer::<i64>("bool")? != 0,
                FieldMut::I8(v) => **v = self.integer("i8")?,
                FieldMut::I16(v) => **v = self.integer("i16")?,
                FieldMut::I32(v) => **v = self.integer("i32")?,
                FieldMut::I64(v) => **v = self.integer("i64")?,
                FieldMut::U8(v) => **v = self.integer("u8")?,
                FieldMut::U16(v) => **v = self.integer("u16")?,
                FieldMut::U32(v) => **v = self.integer("u32")?,
                FieldMut::U64(v) => **v = self.integer("u64")?,
                FieldMut::F32(v) => **v = self.double("f32")? as f32,
                FieldMut::F64(v) => **v = self.double("f64")?,
                other => return Err(self.unsupported(other.kind())),
            },
            ResultBuffer::Bytes(buffer) => {
                let WireValue::Bytes(bytes) = self else {
                    return Err(self.unsupported("bytes"));
                };
                let copied = bytes.len().min(buffer.len());
                buffer[..copied].copy_from_slice(&bytes[..copied]);
                binding.length = bytes.len();
                binding.truncated = bytes.len() > buffer.len();
            }
            ResultBuffer::Time(wire) => {
                let WireValue::Time(value) = self else {
                    return Err(self.unsupported("time"));
                };
                **wire = *value;
            }
            ResultBuffer::Empty => return Err(self.unsupported("empty")),
        }
        Ok(binding.truncated)
    }

    /// Copy the payload again starting at `offset`, used after a truncated fetch.
    pub(crate) fn write_from(&self, bind: &mut ResultBind<'_>, offset: usize) -> WireResult<()> {
        let (WireValue::Bytes(bytes), ResultBuffer::Bytes(buffer)) = (self, &mut bind.buffer)
        else {
            return Err(self.unsupported("partial"));
        };
        let source = bytes.get(offset..).unwrap_or_default();
        let copied = source.len().min(buffer.len());
        buffer[..copied].copy_from_slice(&source[..copied]);
        bind.binding.length = bytes.len();
        bind.binding.truncated = source.len() > buffer.len();
        Ok(())
    }
}

impl Display for WireValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            WireValue::Null => f.write_str("NULL"),
            WireValue::Int(v) => write!(f, "{}", v),
            WireValue::UInt(v) => write!(f, "{}", v),
            WireValue::Double(v) => write!(f, "{}", v),
            WireValue::Bytes(v) => write!(f, "{} bytes", v.len()),
            WireValue::Time(v) => write!(
                f,
                "{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:06}",
                v.year, v.month, v.day, v.hour, v.minute, v.second, v.microsecond
            ),
        }
    }
}

impl From<i64> for WireValue {
    fn from(value: i64) -> Self {
        WireValue::Int(value)
    }
}

impl From<u64> for WireValue {
    fn from(value: u64) -> Self {
        WireValue::UInt(value)
    }
}

impl From<f64> for WireValue {
    fn from(value: f64) -> Self {
        WireValue::Double(value)
    }
}

impl From<&str> for WireValue {
    fn from(value: &str) -> Self {
        WireValue::Bytes(value.as_bytes().to_vec())
    }
}

impl From<Vec<u8>> for WireValue {
    fn from(value: Vec<u8>) -> Self {
        WireValue::Bytes(value)
    }
}

impl From<WireTime> for WireValue {
    fn from(value: WireTime) -> Self {
        WireValue::Time(value)
    }
}

impl<T: Into<WireValue>> From<Option<T>> for WireValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(WireValue::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_core::Binding;

    #[test]
    fn integer_ranges() {
        let mut binding = Binding::default();
        let mut target = 0u8;
        let mut bind = ResultBind {
            binding: &mut binding,
            buffer: ResultBuffer::Field(FieldMut::U8(&mut target)),
        };
        assert_eq!(WireValue::Int(200).write(&mut bind), Ok(false));
        assert_eq!(
            WireValue::Int(300).write(&mut bind).unwrap_err().code,
            codes::OUT_OF_RANGE
        );
        assert_eq!(
            WireValue::Int(-1).write(&mut bind).unwrap_err().code,
            codes::OUT_OF_RANGE
        );
        drop(bind);
        assert_eq!(target, 200);
    }

    #[test]
    fn truncated_bytes() {
        let payload = WireValue::from("hello world");
        let mut binding = Binding::default();
        let mut buffer = vec![0u8; 5];
        let mut bind = ResultBind {
            binding: &mut binding,
            buffer: ResultBuffer::Bytes(&mut buffer),
        };
        assert_eq!(payload.write(&mut bind), Ok(true));
        assert_eq!(bind.binding.length, 11);
        payload.write_from(&mut bind, 5).unwrap();
        assert!(bind.binding.truncated);
        drop(bind);
        assert_eq!(buffer, b" worl");
    }

    #[test]
    fn null() {
        let mut binding = Binding::default();
        let mut bind = ResultBind {
            binding: &mut binding,
            buffer: ResultBuffer::Empty,
        };
        assert_eq!(WireValue::from(None::<i64>).write(&mut bind), Ok(false));
        assert!(binding.is_null);
    }
}
