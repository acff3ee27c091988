//! `#[derive(Error)]` expansion.
//!
//! Generates `std::fmt::Display` and `std::error::Error` for an enum whose
//! variants each declare a display message via `#[error("...")]`.

use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::{parse_macro_input, Data, DeriveInput, Fields, Lit, Meta, Variant};

pub fn derive_error(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;

    let Data::Enum(data) = &input.data else {
        return Err(syn::Error::new_spanned(
            input,
            "Error derive supports enums only",
        ));
    };

    let arms = data
        .variants
        .iter()
        .map(display_arm)
        .collect::<syn::Result<Vec<_>>>()?;

    Ok(quote! {
        impl ::std::fmt::Display for #name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                match self {
                    #(#arms)*
                }
            }
        }

        impl ::std::error::Error for #name {}
    })
}

/// Builds one `Display` match arm for a variant.
///
/// Tuple fields are bound as `f0..fN` and passed positionally so the message
/// may use `{0}`-style references; named fields are bound by name and picked
/// up by implicit format-argument capture.
fn display_arm(variant: &Variant) -> syn::Result<proc_macro2::TokenStream> {
    let ident = &variant.ident;
    let message = error_message(variant)?;

    Ok(match &variant.fields {
        Fields::Unit => quote! {
            Self::#ident => write!(f, #message),
        },
        Fields::Unnamed(fields) => {
            let bindings: Vec<_> = (0..fields.unnamed.len())
                .map(|i| format_ident!("f{}", i))
                .collect();
            quote! {
                Self::#ident(#(#bindings),*) => write!(f, #message, #(#bindings),*),
            }
        }
        Fields::Named(fields) => {
            let bindings: Vec<_> = fields.named.iter().map(|f| &f.ident).collect();
            quote! {
                Self::#ident { #(#bindings),* } => write!(f, #message),
            }
        }
    })
}

/// Pulls the string literal out of a variant's `#[error("...")]` attribute.
fn error_message(variant: &Variant) -> syn::Result<String> {
    for attr in &variant.attrs {
        if !attr.path().is_ident("error") {
            continue;
        }

        let Meta::List(list) = &attr.meta else {
            return Err(syn::Error::new_spanned(
                &attr.meta,
                "expected #[error(\"message\")]",
            ));
        };

        let lit = syn::parse2::<Lit>(list.tokens.clone())?;
        if let Lit::Str(lit) = lit {
            return Ok(lit.value());
        }

        return Err(syn::Error::new_spanned(
            &attr.meta,
            "#[error] message must be a string literal",
        ));
    }

    Err(syn::Error::new_spanned(
        variant,
        format!("variant `{}` is missing #[error(\"...\")]", variant.ident),
    ))
}
