//! Procedural macros for the docpager project.
//!
//! This crate provides `#[derive(Model)]`, which implements `docpager::document::Model` for
//! a struct with named fields.

#[allow(unused_extern_crates)]
extern crate self as docpager_macros;

use proc_macro::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Error, Fields, Ident, LitStr, parse_macro_input};

/// Derives `docpager::document::Model` for a struct.
///
/// # Attributes
///
/// - `#[model(collection = "name")]` on the struct (required) - the collection the model lives in
/// - `#[model(id)]` on a field - the identifier field; defaults to a field named `id`
///
/// The identifier field must have type `docpager::identifier::Identifier`.
///
/// # Example
///
/// ```ignore
/// use docpager::{Identifier, Model};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize, Model)]
/// #[model(collection = "posts")]
/// pub struct Post {
///     #[model(id)]
///     #[serde(rename = "_id")]
///     pub key: Identifier,
///     pub title: String,
/// }
/// ```
#[proc_macro_derive(Model, attributes(model))]
pub fn derive_model(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_model(input)
        .unwrap_or_else(Error::into_compile_error)
        .into()
}

fn expand_model(input: DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;

    let mut collection: Option<LitStr> = None;
    for attr in &input.attrs {
        if !attr.path().is_ident("model") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("collection") {
                collection = Some(meta.value()?.parse()?);
                Ok(())
            } else {
                Err(meta.error("unsupported model attribute, expected `collection = \"...\"`"))
            }
        })?;
    }
    let collection = collection
        .ok_or_else(|| Error::new_spanned(name, "missing #[model(collection = \"...\")] attribute"))?;

    let Data::Struct(data) = &input.data else {
        return Err(Error::new_spanned(name, "Model can only be derived for structs"));
    };
    let Fields::Named(fields) = &data.fields else {
        return Err(Error::new_spanned(name, "Model requires a struct with named fields"));
    };

    let mut id_field: Option<Ident> = None;
    for field in &fields.named {
        for attr in &field.attrs {
            if !attr.path().is_ident("model") {
                continue;
            }
            attr.parse_nested_meta(|meta| {
                if !meta.path.is_ident("id") {
                    return Err(meta.error("unsupported field attribute, expected `id`"));
                }
                if id_field.is_some() {
                    return Err(meta.error("only one field can be marked #[model(id)]"));
                }
                id_field = field.ident.clone();
                Ok(())
            })?;
        }
    }

    let id_field = match id_field {
        Some(ident) => ident,
        None => fields
            .named
            .iter()
            .filter_map(|field| field.ident.as_ref())
            .find(|ident| *ident == "id")
            .cloned()
            .ok_or_else(|| Error::new_spanned(name, "no field named `id` and no field marked #[model(id)]"))?,
    };

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::docpager::document::Model for #name #ty_generics #where_clause {
            fn id(&self) -> &::docpager::identifier::Identifier {
                &self.#id_field
            }

            fn collection_name() -> &'static str {
                #collection
            }
        }
    })
}
