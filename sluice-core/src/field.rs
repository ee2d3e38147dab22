use crate::{DbError, Result, codes};
use std::fmt::{self, Display, Formatter};
use time::{Date, PrimitiveDateTime, Time, macros::date};

/// Semantic type of a record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Bool,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    /// Variable length byte sequence.
    Blob,
    /// Unicode text, transcoded to the connection character set on the wire.
    Text,
    /// Calendar date, years before 0 cannot be sent to the server.
    Date,
    Time,
    /// Date and time of day, with the same year range as [`FieldKind::Date`].
    Datetime,
}

impl Display for FieldKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Type of one field in a record descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldType {
    pub kind: FieldKind,
    pub nullable: bool,
}

impl FieldType {
    pub const fn new(kind: FieldKind) -> Self {
        Self {
            kind,
            nullable: false,
        }
    }
    pub const fn nullable(self) -> Self {
        Self {
            nullable: true,
            ..self
        }
    }
}

/// Shared view of a field, this is what parameters are bound from.
#[derive(Debug, Clone, Copy)]
pub enum FieldRef<'a> {
    /// Absent optional value.
    Null(FieldKind),
    Bool(&'a bool),
    I8(&'a i8),
    U8(&'a u8),
    I16(&'a i16),
    U16(&'a u16),
    I32(&'a i32),
    U32(&'a u32),
    I64(&'a i64),
    U64(&'a u64),
    F32(&'a f32),
    F64(&'a f64),
    Blob(&'a [u8]),
    Text(&'a str),
    Date(&'a Date),
    Time(&'a Time),
    Datetime(&'a PrimitiveDateTime),
}

/// Exclusive view of a field, this is what result columns are decoded into.
#[derive(Debug)]
pub enum FieldMut<'a> {
    Bool(&'a mut bool),
    I8(&'a mut i8),
    U8(&'a mut u8),
    I16(&'a mut i16),
    U16(&'a mut u16),
    I32(&'a mut i32),
    U32(&'a mut u32),
    I64(&'a mut i64),
    U64(&'a mut u64),
    F32(&'a mut f32),
    F64(&'a mut f64),
    Blob(&'a mut Vec<u8>),
    Text(&'a mut String),
    Date(&'a mut Date),
    Time(&'a mut Time),
    Datetime(&'a mut PrimitiveDateTime),
}

impl FieldRef<'_> {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldRef::Null(kind) => *kind,
            FieldRef::Bool(..) => FieldKind::Bool,
            FieldRef::I8(..) => FieldKind::I8,
            FieldRef::U8(..) => FieldKind::U8,
            FieldRef::I16(..) => FieldKind::I16,
            FieldRef::U16(..) => FieldKind::U16,
            FieldRef::I32(..) => FieldKind::I32,
            FieldRef::U32(..) => FieldKind::U32,
            FieldRef::I64(..) => FieldKind::I64,
            FieldRef::U64(..) => FieldKind::U64,
            FieldRef::F32(..) => FieldKind::F32,
            FieldRef::F64(..) => FieldKind::F64,
            FieldRef::Blob(..) => FieldKind::Blob,
            FieldRef::Text(..) => FieldKind::Text,
            FieldRef::Date(..) => FieldKind::Date,
            FieldRef::Time(..) => FieldKind::Time,
            FieldRef::Datetime(..) => FieldKind::Datetime,
        }
    }
    pub fn is_null(&self) -> bool {
        matches!(self, FieldRef::Null(..))
    }
}

impl FieldMut<'_> {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldMut::Bool(..) => FieldKind::Bool,
            FieldMut::I8(..) => FieldKind::I8,
            FieldMut::U8(..) => FieldKind::U8,
            FieldMut::I16(..) => FieldKind::I16,
            FieldMut::U16(..) => FieldKind::U16,
            FieldMut::I32(..) => FieldKind::I32,
            FieldMut::U32(..) => FieldKind::U32,
            FieldMut::I64(..) => FieldKind::I64,
            FieldMut::U64(..) => FieldKind::U64,
            FieldMut::F32(..) => FieldKind::F32,
            FieldMut::F64(..) => FieldKind::F64,
            FieldMut::Blob(..) => FieldKind::Blob,
            FieldMut::Text(..) => FieldKind::Text,
            FieldMut::Date(..) => FieldKind::Date,
            FieldMut::Time(..) => FieldKind::Time,
            FieldMut::Datetime(..) => FieldKind::Datetime,
        }
    }
}

/// A Rust type usable as a record field.
pub trait Field: Send + Sync + 'static {
    const KIND: FieldKind;
    const NULLABLE: bool = false;

    fn field_type() -> FieldType {
        FieldType {
            kind: Self::KIND,
            nullable: Self::NULLABLE,
        }
    }
    /// Value a freshly fetched row starts from.
    fn empty() -> Self;
    fn field_ref(&self) -> FieldRef<'_>;
    /// Storage the result column is written into. Optional fields become `Some` so they
    /// can be written, [`Field::set_null`] reverts them when the column turns out NULL.
    fn field_mut(&mut self) -> FieldMut<'_>;
    fn set_null(&mut self) -> Result<()> {
        Err(DbError::new(
            crate::ErrorKind::Conversion,
            codes::UNEXPECTED_NULL,
            format!(
                "Column is NULL but the field is a non nullable {}",
                Self::KIND
            ),
        )
        .into())
    }
}

macro_rules! impl_field {
    ($ty:ty, $kind:ident, $empty:expr) => {
        impl Field for $ty {
            const KIND: FieldKind = FieldKind::$kind;
            fn empty() -> Self {
                $empty
            }
            fn field_ref(&self) -> FieldRef<'_> {
                FieldRef::$kind(self)
            }
            fn field_mut(&mut self) -> FieldMut<'_> {
                FieldMut::$kind(self)
            }
        }
    };
}

impl_field!(bool, Bool, false);
impl_field!(i8, I8, 0);
impl_field!(u8, U8, 0);
impl_field!(i16, I16, 0);
impl_field!(u16, U16, 0);
impl_field!(i32, I32, 0);
impl_field!(u32, U32, 0);
impl_field!(i64, I64, 0);
impl_field!(u64, U64, 0);
impl_field!(f32, F32, 0.0);
impl_field!(f64, F64, 0.0);
impl_field!(Vec<u8>, Blob, Vec::new());
impl_field!(String, Text, String::new());
impl_field!(Date, Date, date!(1970 - 01 - 01));
impl_field!(Time, Time, Time::MIDNIGHT);
impl_field!(
    PrimitiveDateTime,
    Datetime,
    PrimitiveDateTime::new(date!(1970 - 01 - 01), Time::MIDNIGHT)
);

impl<T: Field> Field for Option<T> {
    const KIND: FieldKind = T::KIND;
    const NULLABLE: bool = true;

    fn empty() -> Self {
        None
    }
    fn field_ref(&self) -> FieldRef<'_> {
        match self {
            Some(v) => v.field_ref(),
            None => FieldRef::Null(T::KIND),
        }
    }
    fn field_mut(&mut self) -> FieldMut<'_> {
        self.get_or_insert_with(T::empty).field_mut()
    }
    fn set_null(&mut self) -> Result<()> {
        *self = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_field() {
        let mut value: Option<i32> = None;
        assert_eq!(
            <Option<i32>>::field_type(),
            FieldType::new(FieldKind::I32).nullable()
        );
        assert!(value.field_ref().is_null());
        assert_eq!(value.field_ref().kind(), FieldKind::I32);
        if let FieldMut::I32(v) = value.field_mut() {
            *v = 42;
        } else {
            panic!("Expected an i32 field");
        }
        assert_eq!(value, Some(42));
        value.set_null().expect("Optional fields accept NULL");
        assert_eq!(value, None);
    }

    #[test]
    fn required_field_rejects_null() {
        let mut value = String::from("alice");
        assert_eq!(value.field_ref().kind(), FieldKind::Text);
        let error = value.set_null().unwrap_err();
        let error = error.downcast_ref::<DbError>().expect("Expected a DbError");
        assert_eq!(error.code(), codes::UNEXPECTED_NULL);
    }
}
