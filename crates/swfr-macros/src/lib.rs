//! Procedural macros for the swfr decider.
//!
//! # Versioned Derive Macro
//!
//! Implements `Versioned` for workflow and activity types, binding them to
//! the `{name, version}` pair they are registered under.
//!
//! ## Usage
//!
//! ```ignore
//! #[derive(Versioned)]
//! #[versioned(name = "reproject", version = "2.1")]
//! struct Reproject {
//!     gdal: GdalHandle,
//! }
//! ```

use proc_macro::TokenStream;
use quote::quote;
use syn::{Attribute, DeriveInput, LitStr, parse_macro_input, spanned::Spanned};

/// Derives `Versioned` for a struct or enum.
///
/// Requires `#[versioned(name = "...", version = "...")]` on the type.
#[proc_macro_derive(Versioned, attributes(versioned))]
pub fn derive_versioned(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match derive_versioned_impl(input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn derive_versioned_impl(input: DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let ident = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let Some(attr) = input.attrs.iter().find(|a| a.path().is_ident("versioned")) else {
        return Err(syn::Error::new(
            input.span(),
            format!(
                "`{ident}` has no #[versioned(name = \"...\", version = \"...\")] attribute. \
                 Versioned needs the registered type name and version."
            ),
        ));
    };

    let (name, version) = parse_versioned_attr(attr)?;

    Ok(quote! {
        impl #impl_generics ::swfr::Versioned for #ident #ty_generics #where_clause {
            const NAME: &'static str = #name;
            const VERSION: &'static str = #version;
        }
    })
}

/// Parse `#[versioned(name = "...", version = "...")]`.
fn parse_versioned_attr(attr: &Attribute) -> syn::Result<(LitStr, LitStr)> {
    let mut name: Option<LitStr> = None;
    let mut version: Option<LitStr> = None;

    attr.parse_nested_meta(|meta| {
        if meta.path.is_ident("name") {
            name = Some(meta.value()?.parse()?);
            Ok(())
        } else if meta.path.is_ident("version") {
            version = Some(meta.value()?.parse()?);
            Ok(())
        } else {
            Err(meta.error("expected `name` or `version`"))
        }
    })?;

    let name = name.ok_or_else(|| syn::Error::new(attr.span(), "missing `name = \"...\"`"))?;
    let version =
        version.ok_or_else(|| syn::Error::new(attr.span(), "missing `version = \"...\"`"))?;

    if name.value().is_empty() {
        return Err(syn::Error::new(name.span(), "`name` must not be empty"));
    }

    Ok((name, version))
}
