#[cfg(test)]
mod tests {
    use sluice::{
        DbError, ErrorKind, FieldKind, FieldMut, FieldRef, FieldType, Record, codes,
    };
    use std::collections::HashMap;
    use time::{Date, PrimitiveDateTime, macros::date};

    #[test]
    fn named_struct() {
        #[derive(Record, Debug, PartialEq)]
        struct Customer {
            id: u64,
            name: String,
            vip: bool,
            balance: f64,
            photo: Option<Vec<u8>>,
            joined: Option<Date>,
            last_seen: PrimitiveDateTime,
        }

        assert_eq!(
            Customer::field_types(),
            [
                FieldType::new(FieldKind::U64),
                FieldType::new(FieldKind::Text),
                FieldType::new(FieldKind::Bool),
                FieldType::new(FieldKind::F64),
                FieldType::new(FieldKind::Blob).nullable(),
                FieldType::new(FieldKind::Date).nullable(),
                FieldType::new(FieldKind::Datetime),
            ]
        );
        assert_eq!(Customer::sql_elements(), 7);

        let mut customer = Customer::empty();
        assert_eq!(customer.id, 0);
        assert!(customer.name.is_empty());
        assert_eq!(customer.photo, None);
        assert_eq!(customer.joined, None);

        customer.name.push_str("Ada");
        customer.joined = Some(date!(2021 - 03 - 04));
        let fields = customer.fields();
        assert!(matches!(fields[0], FieldRef::U64(&0)));
        assert!(matches!(fields[1], FieldRef::Text("Ada")));
        assert!(matches!(fields[4], FieldRef::Null(FieldKind::Blob)));
        assert!(matches!(fields[5], FieldRef::Date(..)));
        drop(fields);

        for field in customer.fields_mut() {
            match field {
                FieldMut::U64(v) => *v = 42,
                FieldMut::Blob(v) => v.extend_from_slice(b"\x89PNG"),
                _ => {}
            }
        }
        assert_eq!(customer.id, 42);
        assert_eq!(customer.photo.as_deref(), Some(&b"\x89PNG"[..]));

        customer.set_null(4).expect("The photo is optional");
        assert_eq!(customer.photo, None);
        let error = customer.set_null(1).expect_err("The name is required");
        let error = DbError::from_error(&error);
        assert_eq!(error.kind(), ErrorKind::Conversion);
        assert_eq!(error.code(), codes::UNEXPECTED_NULL);
    }

    #[test]
    fn tuple_struct() {
        #[derive(Record, Debug, PartialEq)]
        struct Pair(i32, Option<String>);

        assert_eq!(
            Pair::field_types(),
            [
                FieldType::new(FieldKind::I32),
                FieldType::new(FieldKind::Text).nullable(),
            ]
        );
        let mut pair = Pair::empty();
        assert_eq!(pair, Pair(0, None));
        for field in pair.fields_mut() {
            match field {
                FieldMut::I32(v) => *v = -3,
                FieldMut::Text(v) => v.push_str("three"),
                _ => panic!("Unexpected field"),
            }
        }
        assert_eq!(pair, Pair(-3, Some("three".into())));
    }

    #[test]
    fn skipped_fields() {
        #[derive(Record, Debug)]
        struct Cached {
            key: String,
            #[record(skip)]
            memo: HashMap<String, u32>,
            hits: u32,
        }

        assert_eq!(Cached::sql_elements(), 2);
        let mut cached = Cached::empty();
        assert!(cached.memo.is_empty());
        cached.memo.insert("warm".into(), 1);
        assert!(matches!(cached.fields()[1], FieldRef::U32(&0)));
        cached.hits = 5;
        cached.set_null(1).expect_err("The hits are required");
        assert_eq!(cached.key, "");
    }

    #[test]
    fn out_of_range() {
        #[derive(Record)]
        struct Single {
            value: Option<u8>,
        }

        let mut single = Single { value: Some(1) };
        single.set_null(0).expect("The value is optional");
        assert_eq!(single.value, None);
        let error = single.set_null(1).expect_err("There is one field");
        let error = error
            .downcast_ref::<DbError>()
            .expect("Out of range is a database error");
        assert_eq!(error.kind(), ErrorKind::Conversion);
        assert!(error.message().contains("Single"));
    }

    #[test]
    fn unit_struct() {
        #[derive(Record)]
        struct Nothing;

        assert!(Nothing::field_types().is_empty());
        let mut nothing = Nothing::empty();
        assert!(nothing.fields().is_empty());
        assert!(nothing.fields_mut().is_empty());
        assert!(nothing.set_null(0).is_err());
    }
}
