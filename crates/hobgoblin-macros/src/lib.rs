//! `#[derive(Autodiff)]`: generates a `hobgoblin_sync::AutodiffFields` impl
//! from a plain struct of `WireValue` fields (spec.md §4.8 "a value-type T
//! declares fields via a set of macros").
//!
//! Grounded on `t51core_proc`'s split between the `#[proc_macro]` entry
//! point and its codegen (kept in `expand.rs` here, `parse.rs`/`system.rs`
//! there), but built on `syn` 2 / `quote` 1 instead of the teacher's
//! nightly-only `proc_macro_diagnostic` setup.

mod expand;

use proc_macro::TokenStream;
use syn::{parse_macro_input, DeriveInput};

#[proc_macro_derive(Autodiff)]
pub fn derive_autodiff(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand::derive_autodiff(input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}
