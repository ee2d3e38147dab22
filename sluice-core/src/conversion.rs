use crate::{
    Binding, DbError, FieldKind, FieldMut, FieldRef, ParamBuffer, Result, ResultBuffer, WireTime,
    WireType,
};
use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use std::mem;
use time::{Date, Month, PrimitiveDateTime, Time};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemporalKind {
    Date,
    Time,
    Datetime,
}

/// How a field travels on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Conversion {
    /// Fixed size, the binding points straight at the field.
    Direct,
    /// Byte payload fetched in two phases: length first, then the bytes.
    VariableLength,
    /// Calendar and clock values, converted component by component.
    Temporal(TemporalKind),
    /// Unicode text transcoded to the connection character set.
    TranscodedText,
}

impl Conversion {
    pub fn dispatch(kind: FieldKind) -> Self {
        match kind {
            FieldKind::Bool
            | FieldKind::I8
            | FieldKind::U8
            | FieldKind::I16
            | FieldKind::U16
            | FieldKind::I32
            | FieldKind::U32
            | FieldKind::I64
            | FieldKind::U64
            | FieldKind::F32
            | FieldKind::F64 => Conversion::Direct,
            FieldKind::Blob => Conversion::VariableLength,
            FieldKind::Text => Conversion::TranscodedText,
            FieldKind::Date => Conversion::Temporal(TemporalKind::Date),
            FieldKind::Time => Conversion::Temporal(TemporalKind::Time),
            FieldKind::Datetime => Conversion::Temporal(TemporalKind::Datetime),
        }
    }
}

/// Wire type tag and signedness for a field kind.
pub fn wire_type(kind: FieldKind) -> (WireType, bool) {
    match kind {
        FieldKind::Bool => (WireType::Tiny, false),
        FieldKind::I8 => (WireType::Tiny, false),
        FieldKind::U8 => (WireType::Tiny, true),
        FieldKind::I16 => (WireType::Short, false),
        FieldKind::U16 => (WireType::Short, true),
        FieldKind::I32 => (WireType::Long, false),
        FieldKind::U32 => (WireType::Long, true),
        FieldKind::I64 => (WireType::LongLong, false),
        FieldKind::U64 => (WireType::LongLong, true),
        FieldKind::F32 => (WireType::Float, false),
        FieldKind::F64 => (WireType::Double, false),
        FieldKind::Blob => (WireType::Blob, false),
        FieldKind::Text => (WireType::String, false),
        FieldKind::Date => (WireType::Date, false),
        FieldKind::Time => (WireType::Time, false),
        FieldKind::Datetime => (WireType::Datetime, false),
    }
}

/// Encoding used to transcode text for a connection character set name.
pub fn charset_encoding(charset: &str) -> Option<&'static Encoding> {
    match charset.to_ascii_lowercase().as_str() {
        "utf8" | "utf8mb3" | "utf8mb4" => Some(UTF_8),
        "latin1" | "ascii" => Some(WINDOWS_1252),
        // Labels such as utf-16 or replacement encode as UTF-8, text would not round trip
        label => Encoding::for_label(label.as_bytes()).filter(|e| e.output_encoding() == *e),
    }
}

fn field_mismatch(expected: &str, found: FieldKind) -> anyhow::Error {
    DbError::conversion(format!(
        "Converter for {} fields cannot handle a {} field",
        expected, found
    ))
    .into()
}

#[derive(Debug, Default)]
pub struct VariableLength {
    buffer: Vec<u8>,
    length: usize,
}

impl VariableLength {
    fn first_phase(&mut self) -> ResultBuffer<'_> {
        self.buffer.clear();
        self.length = 0;
        ResultBuffer::Bytes(&mut self.buffer)
    }

    fn grow(&mut self, length: usize) -> ResultBuffer<'_> {
        self.buffer.resize(length, 0);
        ResultBuffer::Bytes(&mut self.buffer)
    }

    fn received(&mut self, binding: &Binding) -> Result<&[u8]> {
        if binding.length > self.buffer.len() {
            return Err(DbError::conversion(format!(
                "Only {} of {} bytes of the column were fetched",
                self.buffer.len(),
                binding.length
            ))
            .into());
        }
        self.length = binding.length;
        Ok(&self.buffer[..self.length])
    }

    fn take(&mut self, binding: &Binding) -> Result<Vec<u8>> {
        self.received(binding)?;
        self.buffer.truncate(self.length);
        Ok(mem::take(&mut self.buffer))
    }
}

#[derive(Debug)]
pub struct Temporal {
    kind: TemporalKind,
    internal: WireTime,
}

impl Temporal {
    fn encode_date(wire: &mut WireTime, date: &Date) -> Result<()> {
        wire.year = u32::try_from(date.year()).map_err(|_| {
            DbError::conversion(format!("Date {} has a negative year", date))
        })?;
        wire.month = u8::from(date.month()) as u32;
        wire.day = date.day() as u32;
        Ok(())
    }

    fn encode_time(wire: &mut WireTime, time: &Time) {
        wire.hour = time.hour() as u32;
        wire.minute = time.minute() as u32;
        wire.second = time.second() as u32;
        wire.microsecond = time.microsecond();
        wire.negative = false;
    }

    fn decode_date(wire: &WireTime) -> Result<Date> {
        let invalid = || {
            DbError::conversion(format!(
                "{:04}-{:02}-{:02} is not a valid date",
                wire.year, wire.month, wire.day
            ))
        };
        let year = i32::try_from(wire.year).map_err(|_| invalid())?;
        let month = u8::try_from(wire.month)
            .ok()
            .and_then(|v| Month::try_from(v).ok())
            .ok_or_else(invalid)?;
        let day = u8::try_from(wire.day).map_err(|_| invalid())?;
        Ok(Date::from_calendar_date(year, month, day).map_err(|_| invalid())?)
    }

    fn decode_time(wire: &WireTime) -> Result<Time> {
        let invalid = || {
            DbError::conversion(format!(
                "{}{:02}:{:02}:{:02}.{:06} is not a time of day",
                if wire.negative { "-" } else { "" },
                wire.hour,
                wire.minute,
                wire.second,
                wire.microsecond
            ))
        };
        if wire.negative {
            return Err(invalid().into());
        }
        let hour = u8::try_from(wire.hour).map_err(|_| invalid())?;
        let minute = u8::try_from(wire.minute).map_err(|_| invalid())?;
        let second = u8::try_from(wire.second).map_err(|_| invalid())?;
        Ok(Time::from_hms_micro(hour, minute, second, wire.microsecond).map_err(|_| invalid())?)
    }

    fn to_wire(&mut self, field: FieldRef<'_>) -> Result<()> {
        let mut wire = WireTime::default();
        match (self.kind, field) {
            (TemporalKind::Date, FieldRef::Date(v)) => Self::encode_date(&mut wire, v)?,
            (TemporalKind::Time, FieldRef::Time(v)) => Self::encode_time(&mut wire, v),
            (TemporalKind::Datetime, FieldRef::Datetime(v)) => {
                Self::encode_date(&mut wire, &v.date())?;
                Self::encode_time(&mut wire, &v.time());
            }
            (kind, field) => return Err(field_mismatch(&format!("{:?}", kind), field.kind())),
        }
        self.internal = wire;
        Ok(())
    }

    fn from_wire(&mut self, field: FieldMut<'_>) -> Result<()> {
        match (self.kind, field) {
            (TemporalKind::Date, FieldMut::Date(v)) => *v = Self::decode_date(&self.internal)?,
            (TemporalKind::Time, FieldMut::Time(v)) => *v = Self::decode_time(&self.internal)?,
            (TemporalKind::Datetime, FieldMut::Datetime(v)) => {
                *v = PrimitiveDateTime::new(
                    Self::decode_date(&self.internal)?,
                    Self::decode_time(&self.internal)?,
                )
            }
            (kind, field) => return Err(field_mismatch(&format!("{:?}", kind), field.kind())),
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct TranscodedText {
    bytes: VariableLength,
    encoding: &'static Encoding,
}

impl TranscodedText {
    fn to_wire(&mut self, field: FieldRef<'_>) -> Result<()> {
        let FieldRef::Text(text) = field else {
            return Err(field_mismatch("Text", field.kind()));
        };
        let (encoded, _, unmappable) = self.encoding.encode(text);
        if unmappable {
            return Err(DbError::conversion(format!(
                "Text contains characters that cannot be represented in {}",
                self.encoding.name()
            ))
            .into());
        }
        self.bytes.buffer.clear();
        self.bytes.buffer.extend_from_slice(&encoded);
        self.bytes.length = self.bytes.buffer.len();
        Ok(())
    }

    fn from_wire(&mut self, binding: &Binding, field: FieldMut<'_>) -> Result<()> {
        let kind = field.kind();
        let FieldMut::Text(target) = field else {
            return Err(field_mismatch("Text", kind));
        };
        let encoding = self.encoding;
        let (decoded, malformed) =
            encoding.decode_without_bom_handling(self.bytes.received(binding)?);
        if malformed {
            return Err(DbError::conversion(format!(
                "Column is not valid {} text",
                encoding.name()
            ))
            .into());
        }
        target.clear();
        target.push_str(&decoded);
        Ok(())
    }
}

/// Stateful conversion for one field whose wire and application representations differ.
/// The same instance serves the parameter and the result direction.
#[derive(Debug)]
pub enum Converter {
    VariableLength(VariableLength),
    Temporal(Temporal),
    TranscodedText(TranscodedText),
}

impl Converter {
    /// `None` for direct fields, they need no converter.
    pub fn new(conversion: Conversion, encoding: &'static Encoding) -> Option<Self> {
        match conversion {
            Conversion::Direct => None,
            Conversion::VariableLength => Some(Converter::VariableLength(Default::default())),
            Conversion::Temporal(kind) => Some(Converter::Temporal(Temporal {
                kind,
                internal: Default::default(),
            })),
            Conversion::TranscodedText => Some(Converter::TranscodedText(TranscodedText {
                bytes: Default::default(),
                encoding,
            })),
        }
    }

    pub fn is_variable_length(&self) -> bool {
        matches!(
            self,
            Converter::VariableLength(..) | Converter::TranscodedText(..)
        )
    }

    /// Application to wire, before the parameters are sent.
    pub fn to_wire(&mut self, field: FieldRef<'_>) -> Result<()> {
        match self {
            Converter::VariableLength(v) => {
                let FieldRef::Blob(bytes) = field else {
                    return Err(field_mismatch("Blob", field.kind()));
                };
                v.length = bytes.len();
                Ok(())
            }
            Converter::Temporal(v) => v.to_wire(field),
            Converter::TranscodedText(v) => v.to_wire(field),
        }
    }

    /// Wire to application, after the row was fetched (and, for variable length
    /// payloads, after the second phase).
    pub fn from_wire(&mut self, binding: &Binding, field: FieldMut<'_>) -> Result<()> {
        match self {
            Converter::VariableLength(v) => {
                let kind = field.kind();
                let FieldMut::Blob(target) = field else {
                    return Err(field_mismatch("Blob", kind));
                };
                *target = v.take(binding)?;
                Ok(())
            }
            Converter::Temporal(v) => v.from_wire(field),
            Converter::TranscodedText(v) => v.from_wire(binding, field),
        }
    }

    /// Buffer the parameter binding reads from. Byte payloads are sent from the field's
    /// own storage, everything else from the converter.
    pub fn param_buffer<'a>(&'a self, field: FieldRef<'a>) -> ParamBuffer<'a> {
        match (self, field) {
            (_, FieldRef::Null(..)) => ParamBuffer::Empty,
            (Converter::VariableLength(..), FieldRef::Blob(bytes)) => ParamBuffer::Bytes(bytes),
            (Converter::VariableLength(..), _) => ParamBuffer::Empty,
            (Converter::Temporal(v), _) => ParamBuffer::Time(&v.internal),
            (Converter::TranscodedText(v), _) => {
                ParamBuffer::Bytes(&v.bytes.buffer[..v.bytes.length])
            }
        }
    }

    /// Number of bytes the parameter occupies on the wire.
    pub fn param_length(&self) -> usize {
        match self {
            Converter::VariableLength(v) => v.length,
            Converter::Temporal(..) => mem::size_of::<WireTime>(),
            Converter::TranscodedText(v) => v.bytes.length,
        }
    }

    /// Buffer the result binding writes to while fetching a row. Variable length
    /// payloads start empty so the session only reports their length.
    pub fn result_buffer(&mut self) -> ResultBuffer<'_> {
        match self {
            Converter::VariableLength(v) => v.first_phase(),
            Converter::Temporal(v) => ResultBuffer::Time(&mut v.internal),
            Converter::TranscodedText(v) => v.bytes.first_phase(),
        }
    }

    /// Bytes the result buffer can currently hold.
    pub fn capacity(&self) -> usize {
        match self {
            Converter::VariableLength(v) => v.buffer.len(),
            Converter::Temporal(..) => mem::size_of::<WireTime>(),
            Converter::TranscodedText(v) => v.bytes.buffer.len(),
        }
    }

    /// Grow the buffer to `length` bytes for the second fetch phase.
    pub fn grow(&mut self, length: usize) -> ResultBuffer<'_> {
        match self {
            Converter::VariableLength(v) => v.grow(length),
            Converter::Temporal(v) => ResultBuffer::Time(&mut v.internal),
            Converter::TranscodedText(v) => v.bytes.grow(length),
        }
    }
}
