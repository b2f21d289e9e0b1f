//! Procedural macros for the docgate project.
//!
//! `#[derive(UpdateFields)]` records, at compile time, the shape and serde attributes
//! of every field of a struct so the mutation guard can inspect partial updates built
//! from it.

#[allow(unused_extern_crates)]
extern crate self as docgate_macros;

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Data, DeriveInput, Fields, LitStr, Token, parse_macro_input, parse_quote};

/// Serde attributes relevant to the mutation guard.
#[derive(Default)]
struct SerdeField {
    skipped: bool,
    omit_empty: bool,
    rename: Option<String>,
}

impl SerdeField {
    fn from_attrs(attrs: &[syn::Attribute]) -> syn::Result<Self> {
        let mut field = Self::default();

        for attr in attrs.iter().filter(|attr| attr.path().is_ident("serde")) {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("skip") || meta.path.is_ident("skip_serializing") {
                    field.skipped = true;
                } else if meta.path.is_ident("skip_serializing_if") {
                    meta.value()?.parse::<LitStr>()?;
                    field.omit_empty = true;
                } else if meta.path.is_ident("rename") {
                    if meta.input.peek(Token![=]) {
                        field.rename = Some(meta.value()?.parse::<LitStr>()?.value());
                    } else {
                        meta.parse_nested_meta(|inner| {
                            let value = inner.value()?.parse::<LitStr>()?;
                            if inner.path.is_ident("serialize") {
                                field.rename = Some(value.value());
                            }
                            Ok(())
                        })?;
                    }
                } else if meta.input.peek(Token![=]) {
                    meta.value()?.parse::<syn::Expr>()?;
                } else if meta.input.peek(syn::token::Paren) {
                    let content;
                    syn::parenthesized!(content in meta.input);
                    content.parse::<TokenStream2>()?;
                }

                Ok(())
            })?;
        }

        Ok(field)
    }
}

/// Derives `docgate::update::UpdateFields` and `docgate::update::FieldType`.
///
/// Only structs with named fields are supported. Field shapes come from the
/// `FieldType` implementation of each field's type; fields marked
/// `#[serde(skip)]` or `#[serde(skip_serializing)]` are recorded as skipped and their
/// types are not inspected.
#[proc_macro_derive(UpdateFields, attributes(serde))]
pub fn derive_update_fields(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    expand(input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn expand(input: DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    name,
                    "UpdateFields can only be derived for structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                name,
                "UpdateFields can only be derived for structs",
            ));
        }
    };

    let mut specs = Vec::with_capacity(fields.len());
    let mut inspected_types = Vec::new();

    for field in fields {
        let Some(ident) = &field.ident else {
            continue;
        };
        let serde = SerdeField::from_attrs(&field.attrs)?;

        let ident_name = ident.to_string();
        let ident_name = ident_name.strip_prefix("r#").unwrap_or(&ident_name).to_string();
        let serialized = serde.rename.clone().unwrap_or_else(|| ident_name.clone());
        let skipped = serde.skipped;
        let omit_empty = serde.omit_empty;

        let shape = if skipped {
            quote! {
                ::docgate::update::FieldShape::Value(::docgate::update::ValueKind::Dynamic)
            }
        } else {
            let ty = &field.ty;
            inspected_types.push(ty.clone());
            quote! { <#ty as ::docgate::update::FieldType>::SHAPE }
        };

        specs.push(quote! {
            ::docgate::update::FieldSpec {
                ident: #ident_name,
                name: #serialized,
                shape: #shape,
                skipped: #skipped,
                omit_empty: #omit_empty,
            }
        });
    }

    let mut generics = input.generics.clone();
    if !generics.params.is_empty() {
        let where_clause = generics.make_where_clause();
        for ty in &inspected_types {
            where_clause
                .predicates
                .push(parse_quote!(#ty: ::docgate::update::FieldType));
        }
    }
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    // Associated data of generic structs cannot live in a `const`.
    let body = if input.generics.params.is_empty() {
        quote! {
            const FIELDS: &[::docgate::update::FieldSpec] = &[#(#specs),*];
            ::std::borrow::Cow::Borrowed(FIELDS)
        }
    } else {
        quote! {
            ::std::borrow::Cow::Owned(::std::vec![#(#specs),*])
        }
    };

    Ok(quote! {
        impl #impl_generics ::docgate::update::UpdateFields for #name #ty_generics #where_clause {
            fn update_fields() -> ::std::borrow::Cow<'static, [::docgate::update::FieldSpec]> {
                #body
            }
        }

        impl #impl_generics ::docgate::update::FieldType for #name #ty_generics #where_clause {
            const SHAPE: ::docgate::update::FieldShape =
                ::docgate::update::FieldShape::Value(::docgate::update::ValueKind::Record);
        }
    })
}
