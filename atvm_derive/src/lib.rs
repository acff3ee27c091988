//! Derive macros for the atvm crate.
//!
//! Provides `#[derive(Error)]`, which generates `Display` and
//! `std::error::Error` implementations from `#[error("...")]` attributes.

mod error;

use proc_macro::TokenStream;

/// Implements `Display` and `Error` for an error enum.
///
/// Every variant must carry an `#[error("...")]` attribute. Tuple fields are
/// referenced positionally (`{0}`, `{1}`) and named fields by name
/// (`{expected}`).
#[proc_macro_derive(Error, attributes(error))]
pub fn derive_error(input: TokenStream) -> TokenStream {
    error::derive_error(input)
}
