use proc_macro2::TokenStream;
use quote::{ToTokens, quote};
use syn::{Fields, Ident, Index, ItemStruct, Type, spanned::Spanned};

/// How the generated code reaches one field: `self.name` or `self.0`.
pub(crate) enum Access {
    Named(Ident),
    Unnamed(Index),
}

impl ToTokens for Access {
    fn to_tokens(&self, tokens: &mut TokenStream) {
        match self {
            Access::Named(ident) => ident.to_tokens(tokens),
            Access::Unnamed(index) => index.to_tokens(tokens),
        }
    }
}

pub(crate) struct FieldMetadata {
    pub(crate) access: Access,
    pub(crate) ty: Type,
    /// Not part of the row, initialized with `Default::default()`.
    pub(crate) skip: bool,
}

fn is_skipped(field: &syn::Field) -> syn::Result<bool> {
    let mut skip = false;
    for attr in field.attrs.iter().filter(|a| a.path().is_ident("record")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("skip") {
                skip = true;
                Ok(())
            } else {
                Err(meta.error("Unknown record attribute, expected `skip`"))
            }
        })?;
    }
    Ok(skip)
}

pub(crate) fn decode_fields(item: &ItemStruct) -> syn::Result<Vec<FieldMetadata>> {
    item.fields
        .iter()
        .enumerate()
        .map(|(i, field)| {
            let access = match &field.ident {
                Some(ident) => Access::Named(ident.clone()),
                None => Access::Unnamed(Index {
                    index: i as u32,
                    span: field.span(),
                }),
            };
            Ok(FieldMetadata {
                access,
                ty: field.ty.clone(),
                skip: is_skipped(field)?,
            })
        })
        .collect()
}

/// Expression building the whole struct, row fields start empty.
pub(crate) fn construct(item: &ItemStruct, fields: &[FieldMetadata]) -> TokenStream {
    let values = fields.iter().map(|f| {
        let ty = &f.ty;
        if f.skip {
            quote!(::std::default::Default::default())
        } else {
            quote!(<#ty as ::sluice::Field>::empty())
        }
    });
    match &item.fields {
        Fields::Named(..) => {
            let names = fields.iter().map(|f| &f.access);
            quote!(Self { #(#names: #values),* })
        }
        Fields::Unnamed(..) => quote!(Self(#(#values),*)),
        Fields::Unit => quote!(Self),
    }
}
