use crate::{
    Binding, Context, Conversion, Converter, DbError, FieldRef, FieldType, ParamBind,
    ParamBuffer, Record, Result, ResultBind, ResultBuffer, wire_type,
};
use encoding_rs::Encoding;

/// Binding layout of one side (parameters or results) of a statement.
///
/// Built once from the record descriptor, then rebound to the storage of the current
/// record on every execution. Fields that need a conversion own a [`Converter`] for the
/// whole lifetime of the statement.
#[derive(Debug)]
pub struct BindingTable {
    types: Vec<FieldType>,
    bindings: Vec<Binding>,
    conversions: Vec<Conversion>,
    converters: Vec<Option<Converter>>,
}

impl BindingTable {
    pub fn new(types: Vec<FieldType>, encoding: &'static Encoding) -> Self {
        let bindings = types
            .iter()
            .map(|t| {
                let (wire_type, unsigned) = wire_type(t.kind);
                Binding {
                    wire_type,
                    unsigned,
                    ..Default::default()
                }
            })
            .collect();
        let conversions: Vec<_> = types.iter().map(|t| Conversion::dispatch(t.kind)).collect();
        let converters = conversions
            .iter()
            .map(|c| Converter::new(*c, encoding))
            .collect();
        Self {
            types,
            bindings,
            conversions,
            converters,
        }
    }

    pub fn of<R: Record>(encoding: &'static Encoding) -> Self {
        Self::new(R::field_types(), encoding)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn types(&self) -> &[FieldType] {
        &self.types
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    pub fn conversions(&self) -> &[Conversion] {
        &self.conversions
    }

    /// Run the application to wire conversions and point every parameter binding at its
    /// buffer: the field itself for direct fields, the converter otherwise.
    pub fn bind_parameters<'a>(
        &'a mut self,
        fields: Vec<FieldRef<'a>>,
    ) -> Result<Vec<ParamBind<'a>>> {
        if fields.len() != self.bindings.len() {
            return Err(DbError::count_mismatch(format!(
                "The record has {} fields but {} parameters are bound",
                fields.len(),
                self.bindings.len()
            ))
            .into());
        }
        for (i, field) in fields.iter().enumerate() {
            if field.kind() != self.types[i].kind {
                return Err(DbError::conversion(format!(
                    "Parameter {} is bound as {} but the field is {}",
                    i,
                    self.types[i].kind,
                    field.kind()
                ))
                .into());
            }
            let binding = &mut self.bindings[i];
            binding.is_null = field.is_null();
            binding.truncated = false;
            binding.length = 0;
            if let (Some(converter), false) = (&mut self.converters[i], field.is_null()) {
                converter
                    .to_wire(*field)
                    .with_context(|| format!("While converting parameter {}", i))?;
                binding.length = converter.param_length();
                binding.capacity = binding.length;
            }
        }
        let this: &'a Self = self;
        Ok(this
            .bindings
            .iter()
            .zip(&this.converters)
            .zip(fields)
            .map(|((binding, converter), field)| ParamBind {
                binding,
                buffer: match (converter, field) {
                    (_, FieldRef::Null(..)) => ParamBuffer::Empty,
                    (Some(converter), field) => converter.param_buffer(field),
                    (None, field) => ParamBuffer::Field(field),
                },
            })
            .collect())
    }

    /// Point every result binding at the storage of `row`. Variable length columns get
    /// an empty buffer, a non empty value is reported as truncated.
    pub fn bind_results<'a, R: Record>(&'a mut self, row: &'a mut R) -> Vec<ResultBind<'a>> {
        self.bindings
            .iter_mut()
            .zip(self.converters.iter_mut())
            .zip(row.fields_mut())
            .map(|((binding, converter), field)| {
                binding.length = 0;
                binding.is_null = false;
                binding.truncated = false;
                let buffer = match converter {
                    Some(converter) => {
                        binding.capacity = converter.capacity();
                        converter.result_buffer()
                    }
                    None => {
                        binding.capacity = 0;
                        ResultBuffer::Field(field)
                    }
                };
                ResultBind { binding, buffer }
            })
            .collect()
    }

    /// Columns of the fetched row whose value did not fit the bound buffer.
    pub fn truncated(&self) -> Vec<usize> {
        self.bindings
            .iter()
            .zip(&self.converters)
            .enumerate()
            .filter_map(|(i, (binding, converter))| match converter {
                Some(c)
                    if !binding.is_null
                        && c.is_variable_length()
                        && binding.length > c.capacity() =>
                {
                    Some(i)
                }
                _ => None,
            })
            .collect()
    }

    /// Grow the buffer of `column` to the length reported by the session, ready to fetch
    /// the column again.
    pub fn rebind_column(&mut self, column: usize) -> Result<ResultBind<'_>> {
        let (Some(binding), Some(Some(converter))) = (
            self.bindings.get_mut(column),
            self.converters.get_mut(column),
        ) else {
            return Err(DbError::conversion(format!(
                "Column {} has no variable length buffer",
                column
            ))
            .into());
        };
        binding.capacity = binding.length;
        binding.truncated = false;
        let buffer = converter.grow(binding.length);
        Ok(ResultBind { binding, buffer })
    }

    /// Run the wire to application conversions for the fetched row, then mark the NULL
    /// columns. Fails on the first field that cannot be converted.
    pub fn decode_row<R: Record>(&mut self, row: &mut R) -> Result<()> {
        for (i, ((binding, converter), field)) in self
            .bindings
            .iter()
            .zip(self.converters.iter_mut())
            .zip(row.fields_mut())
            .enumerate()
        {
            if binding.is_null {
                continue;
            }
            if let Some(converter) = converter {
                converter
                    .from_wire(binding, field)
                    .with_context(|| format!("While converting column {}", i))?;
            }
        }
        for (i, binding) in self.bindings.iter().enumerate() {
            if binding.is_null {
                row.set_null(i)
                    .with_context(|| format!("While reading column {}", i))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ErrorKind, FieldKind, FieldMut, WireTime, WireType, codes};
    use encoding_rs::UTF_8;
    use time::{PrimitiveDateTime, macros::datetime};

    type Row = (u64, Option<String>, Vec<u8>, PrimitiveDateTime);

    #[test]
    fn layout() {
        let table = BindingTable::of::<Row>(UTF_8);
        assert_eq!(table.len(), 4);
        assert_eq!(
            table
                .bindings()
                .iter()
                .map(|b| (b.wire_type, b.unsigned))
                .collect::<Vec<_>>(),
            vec![
                (WireType::LongLong, true),
                (WireType::String, false),
                (WireType::Blob, false),
                (WireType::Datetime, false),
            ]
        );
        assert_eq!(table.conversions()[0], Conversion::Direct);
        assert_eq!(table.types()[1].kind, FieldKind::Text);
        assert!(table.types()[1].nullable);
        assert!(BindingTable::of::<()>(UTF_8).is_empty());
    }

    #[test]
    fn parameters() {
        let mut table = BindingTable::of::<Row>(UTF_8);
        let row: Row = (
            7,
            None,
            vec![1, 2, 3],
            datetime!(2020-01-02 03:04:05),
        );
        let binds = table
            .bind_parameters(row.fields())
            .expect("Parameters must bind");
        assert!(matches!(binds[0].buffer, ParamBuffer::Field(FieldRef::U64(&7))));
        assert!(binds[1].binding.is_null);
        assert!(matches!(binds[1].buffer, ParamBuffer::Empty));
        let ParamBuffer::Bytes(bytes) = binds[2].buffer else {
            panic!("Expected a bytes buffer");
        };
        assert!(std::ptr::eq(bytes, row.2.as_slice()));
        assert_eq!(binds[2].binding.length, 3);
        let ParamBuffer::Time(wire) = binds[3].buffer else {
            panic!("Expected a time buffer");
        };
        assert_eq!((wire.year, wire.day, wire.second), (2020, 2, 5));
    }

    #[test]
    fn parameter_kind_mismatch() {
        let mut table = BindingTable::of::<(u64,)>(UTF_8);
        let error = table.bind_parameters(vec![FieldRef::I32(&1)]).unwrap_err();
        assert_eq!(
            error.downcast_ref::<DbError>().unwrap().kind(),
            ErrorKind::Conversion
        );
        let error = table.bind_parameters(Vec::new()).unwrap_err();
        assert_eq!(
            error.downcast_ref::<DbError>().unwrap().code(),
            codes::COUNT_MISMATCH
        );
    }

    /// Fills the bound buffers the way a session does for one row.
    fn fill(binds: &mut [ResultBind<'_>], name: Option<&str>, blob: &[u8]) {
        for (i, bind) in binds.iter_mut().enumerate() {
            match (i, &mut bind.buffer) {
                (0, ResultBuffer::Field(FieldMut::U64(v))) => **v = 42,
                (1, ResultBuffer::Bytes(buffer)) => match name {
                    Some(name) => {
                        bind.binding.length = name.len();
                        let n = name.len().min(buffer.len());
                        buffer[..n].copy_from_slice(&name.as_bytes()[..n]);
                        bind.binding.truncated = name.len() > buffer.len();
                    }
                    None => bind.binding.is_null = true,
                },
                (2, ResultBuffer::Bytes(buffer)) => {
                    bind.binding.length = blob.len();
                    bind.binding.truncated = blob.len() > buffer.len();
                }
                (3, ResultBuffer::Time(wire)) => {
                    **wire = WireTime {
                        year: 1999,
                        month: 12,
                        day: 31,
                        hour: 23,
                        minute: 59,
                        second: 59,
                        ..Default::default()
                    }
                }
                (i, buffer) => panic!("Unexpected buffer {:?} for column {}", buffer, i),
            }
        }
    }

    #[test]
    fn results_two_phases() {
        let mut table = BindingTable::of::<Row>(UTF_8);
        let mut row = Row::empty();
        let blob = vec![9u8; 1000];
        {
            let mut binds = table.bind_results(&mut row);
            fill(&mut binds, Some("alice"), &blob);
        }
        assert_eq!(table.truncated(), vec![1, 2]);
        for column in table.truncated() {
            let mut bind = table.rebind_column(column).unwrap();
            let ResultBuffer::Bytes(buffer) = &mut bind.buffer else {
                panic!("Expected a bytes buffer");
            };
            match column {
                1 => buffer.copy_from_slice(b"alice"),
                _ => buffer.copy_from_slice(&blob),
            }
        }
        table.decode_row(&mut row).expect("Row must decode");
        assert_eq!(row.0, 42);
        assert_eq!(row.1.as_deref(), Some("alice"));
        assert_eq!(row.2, blob);
        assert_eq!(row.3, datetime!(1999-12-31 23:59:59));
    }

    #[test]
    fn results_null() {
        let mut table = BindingTable::of::<Row>(UTF_8);
        let mut row = Row::empty();
        {
            let mut binds = table.bind_results(&mut row);
            fill(&mut binds, None, &[]);
        }
        assert!(table.truncated().is_empty());
        table.decode_row(&mut row).expect("Row must decode");
        assert_eq!(row.1, None);
        assert!(row.2.is_empty());

        let mut table = BindingTable::of::<(String,)>(UTF_8);
        let mut row = <(String,)>::empty();
        {
            let mut binds = table.bind_results(&mut row);
            binds[0].binding.is_null = true;
        }
        let error = table.decode_row(&mut row).unwrap_err();
        assert_eq!(
            DbError::from_error(&error).code(),
            codes::UNEXPECTED_NULL
        );
    }

    #[test]
    fn rebind_direct_column() {
        let mut table = BindingTable::of::<(u64,)>(UTF_8);
        assert!(table.rebind_column(0).is_err());
        assert!(table.rebind_column(5).is_err());
    }
}
