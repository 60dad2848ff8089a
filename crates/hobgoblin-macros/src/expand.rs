//! Codegen for `#[derive(Autodiff)]`, split out from the macro entry point
//! the way the teacher separates parsing/codegen from the `#[proc_macro]`
//! surface in `t51core_proc` (`parse.rs`/`system.rs` feeding `lib.rs`).
//!
//! Modernized to `syn` 2 / `quote` 1's stable, token-based API rather than
//! the teacher's nightly `proc_macro_diagnostic`/`proc_macro_span`
//! features — those never stabilized, so a crate meant to compile on
//! current stable Rust can't reuse them; see DESIGN.md.

use proc_macro2::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Fields, Ident};

/// Smallest unsigned integer wide enough to hold one bit per field.
fn mask_type(field_count: usize) -> syn::Result<Ident> {
    let name = match field_count {
        0..=8 => "u8",
        9..=16 => "u16",
        17..=32 => "u32",
        33..=64 => "u64",
        _ => {
            return Err(syn::Error::new(
                proc_macro2::Span::call_site(),
                "Autodiff supports at most 64 fields",
            ))
        }
    };
    Ok(Ident::new(name, proc_macro2::Span::call_site()))
}

pub fn derive_autodiff(input: DeriveInput) -> syn::Result<TokenStream> {
    let struct_name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => &named.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    &input,
                    "Autodiff requires a struct with named fields",
                ))
            }
        },
        _ => return Err(syn::Error::new_spanned(&input, "Autodiff can only be derived for structs")),
    };

    let field_idents: Vec<&Ident> = fields.iter().map(|f| f.ident.as_ref().unwrap()).collect();
    let mask_ty = mask_type(field_idents.len())?;

    let pack_checks = field_idents.iter().enumerate().map(|(i, ident)| {
        let bit = i as u32;
        quote! {
            if self.#ident != mirror.#ident {
                mask |= 1 << #bit;
            }
        }
    });

    let pack_writes = field_idents.iter().enumerate().map(|(i, ident)| {
        let bit = i as u32;
        quote! {
            if mask & (1 << #bit) != 0 {
                out.append(self.#ident.clone());
            }
        }
    });

    let unpack_reads = field_idents.iter().enumerate().map(|(i, ident)| {
        let bit = i as u32;
        quote! {
            if mask & (1 << #bit) != 0 {
                self.#ident = input.extract();
            }
        }
    });

    let pack_all_writes = field_idents.iter().map(|ident| {
        quote! {
            out.append(self.#ident.clone());
        }
    });

    let unpack_all_reads = field_idents.iter().map(|ident| {
        quote! {
            self.#ident = input.extract();
        }
    });

    let expanded = quote! {
        impl #impl_generics hobgoblin_sync::AutodiffFields for #struct_name #ty_generics #where_clause {
            fn pack_diff(&self, mirror: &Self, out: &mut hobgoblin_codec::Packet) {
                let mut mask: #mask_ty = 0;
                #(#pack_checks)*
                if mask == 0 {
                    return;
                }
                out.append(mask);
                #(#pack_writes)*
            }

            fn unpack_diff(&mut self, input: &mut hobgoblin_codec::Packet) {
                let mask: #mask_ty = input.extract();
                #(#unpack_reads)*
            }

            fn pack_all(&self, out: &mut hobgoblin_codec::Packet) {
                #(#pack_all_writes)*
            }

            fn unpack_all(&mut self, input: &mut hobgoblin_codec::Packet) {
                #(#unpack_all_reads)*
            }
        }
    };

    Ok(expanded)
}
