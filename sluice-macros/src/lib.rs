mod decode_fields;

use decode_fields::{construct, decode_fields};
use proc_macro::TokenStream;
use quote::quote;
use syn::{ItemStruct, parse_macro_input};

/// Implements `sluice::Record` for a struct, every field (except the ones marked
/// `#[record(skip)]`) is one placeholder or column, in declaration order.
#[proc_macro_derive(Record, attributes(record))]
pub fn derive_record(input: TokenStream) -> TokenStream {
    let item: ItemStruct = parse_macro_input!(input as ItemStruct);
    let fields = match decode_fields(&item) {
        Ok(fields) => fields,
        Err(e) => return e.to_compile_error().into(),
    };
    let name = &item.ident;
    let (impl_generics, ty_generics, where_clause) = item.generics.split_for_impl();
    let construct = construct(&item, &fields);
    let row: Vec<_> = fields.iter().filter(|f| !f.skip).collect();
    let types = row.iter().map(|f| &f.ty);
    let access = row.iter().map(|f| &f.access).collect::<Vec<_>>();
    let indexes = 0..row.len();
    let count = row.len();
    quote! {
        impl #impl_generics ::sluice::Record for #name #ty_generics #where_clause {
            fn field_types() -> ::std::vec::Vec<::sluice::FieldType> {
                ::std::vec![#(<#types as ::sluice::Field>::field_type()),*]
            }
            fn empty() -> Self {
                #construct
            }
            fn fields(&self) -> ::std::vec::Vec<::sluice::FieldRef<'_>> {
                ::std::vec![#(::sluice::Field::field_ref(&self.#access)),*]
            }
            fn fields_mut(&mut self) -> ::std::vec::Vec<::sluice::FieldMut<'_>> {
                ::std::vec![#(::sluice::Field::field_mut(&mut self.#access)),*]
            }
            fn set_null(&mut self, index: usize) -> ::sluice::Result<()> {
                match index {
                    #(#indexes => ::sluice::Field::set_null(&mut self.#access),)*
                    _ => ::std::result::Result::Err(::sluice::DbError::conversion(::std::format!(
                        "Field index {} is out of range, {} has {} fields",
                        index,
                        ::std::stringify!(#name),
                        #count
                    ))
                    .into()),
                }
            }
        }
    }
    .into()
}
