use crate::{DbError, Field, FieldMut, FieldRef, FieldType, Result};

/// Row shape descriptor: an ordered sequence of typed fields.
///
/// Statements consume it as a read-only schema oracle, once when they are built (to
/// compute the binding layout) and on every execution (to reach the storage of the
/// current record). Usually implemented with `#[derive(Record)]`.
///
/// ```rust,ignore
/// #[derive(Record)]
/// struct User {
///     id: u64,
///     name: String,
///     born: Option<time::Date>,
/// }
/// ```
///
/// `()` is the absent descriptor: statements without parameters or without result rows.
pub trait Record: Send + Sync + 'static {
    /// Semantic type of each field, in wire order.
    fn field_types() -> Vec<FieldType>;
    /// Number of placeholders (for parameters) or columns (for results) this record
    /// accounts for.
    fn sql_elements() -> usize {
        Self::field_types().len()
    }
    /// A record ready to receive a fetched row.
    fn empty() -> Self;
    fn fields(&self) -> Vec<FieldRef<'_>>;
    fn fields_mut(&mut self) -> Vec<FieldMut<'_>>;
    /// Mark the field at `index` as NULL.
    fn set_null(&mut self, index: usize) -> Result<()>;
}

pub(crate) fn field_out_of_range(index: usize, len: usize) -> anyhow::Error {
    DbError::conversion(format!(
        "Field index {} is out of range, the record has {} fields",
        index, len
    ))
    .into()
}

impl Record for () {
    fn field_types() -> Vec<FieldType> {
        Vec::new()
    }
    fn empty() -> Self {}
    fn fields(&self) -> Vec<FieldRef<'_>> {
        Vec::new()
    }
    fn fields_mut(&mut self) -> Vec<FieldMut<'_>> {
        Vec::new()
    }
    fn set_null(&mut self, index: usize) -> Result<()> {
        Err(field_out_of_range(index, 0))
    }
}

macro_rules! impl_record_tuple {
    ($len:literal; $($ty:ident $idx:tt),+) => {
        impl<$($ty: Field),+> Record for ($($ty,)+) {
            fn field_types() -> Vec<FieldType> {
                vec![$($ty::field_type()),+]
            }
            fn empty() -> Self {
                ($($ty::empty(),)+)
            }
            fn fields(&self) -> Vec<FieldRef<'_>> {
                vec![$(self.$idx.field_ref()),+]
            }
            fn fields_mut(&mut self) -> Vec<FieldMut<'_>> {
                vec![$(self.$idx.field_mut()),+]
            }
            fn set_null(&mut self, index: usize) -> Result<()> {
                match index {
                    $($idx => self.$idx.set_null(),)+
                    _ => Err(field_out_of_range(index, $len)),
                }
            }
        }
    };
}

impl_record_tuple!(1; A 0);
impl_record_tuple!(2; A 0, B 1);
impl_record_tuple!(3; A 0, B 1, C 2);
impl_record_tuple!(4; A 0, B 1, C 2, D 3);
impl_record_tuple!(5; A 0, B 1, C 2, D 3, E 4);
impl_record_tuple!(6; A 0, B 1, C 2, D 3, E 4, F 5);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FieldKind;

    #[test]
    fn tuple_descriptor() {
        assert_eq!(
            <(u64, Option<String>)>::field_types(),
            vec![
                FieldType::new(FieldKind::U64),
                FieldType::new(FieldKind::Text).nullable()
            ]
        );
        assert_eq!(<(u64, Option<String>)>::sql_elements(), 2);
        assert_eq!(<()>::sql_elements(), 0);

        let mut row = <(u64, Option<String>)>::empty();
        assert_eq!(row, (0, None));
        for field in row.fields_mut() {
            match field {
                FieldMut::U64(v) => *v = 7,
                FieldMut::Text(v) => v.push_str("seven"),
                _ => panic!("Unexpected field"),
            }
        }
        assert_eq!(row, (7, Some("seven".into())));
        row.set_null(1).expect("Second field is nullable");
        assert_eq!(row, (7, None));
        assert!(row.set_null(0).is_err());
        assert!(row.set_null(2).is_err());
    }
}
