//! `#[derive(OwnedState)]` implementation.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, Attribute, Data, DeriveInput, Fields, Ident, Index, Member};

#[derive(Default)]
struct StructHooks {
    teardown: Option<Ident>,
    unmanaged: Option<Ident>,
}

enum FieldRole {
    Owned,
    NotOwned,
    Base,
}

fn parse_struct_hooks(attrs: &[Attribute]) -> syn::Result<StructHooks> {
    let mut hooks = StructHooks::default();
    for attr in attrs.iter().filter(|a| a.path().is_ident("release")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("teardown") {
                hooks.teardown = Some(meta.value()?.parse()?);
                Ok(())
            } else if meta.path.is_ident("unmanaged") {
                hooks.unmanaged = Some(meta.value()?.parse()?);
                Ok(())
            } else {
                Err(meta.error("expected `teardown = method` or `unmanaged = method`"))
            }
        })?;
    }
    Ok(hooks)
}

fn parse_field_role(attrs: &[Attribute]) -> syn::Result<FieldRole> {
    let mut role = FieldRole::Owned;
    for attr in attrs.iter().filter(|a| a.path().is_ident("release")) {
        attr.parse_nested_meta(|meta| {
            let next = if meta.path.is_ident("not_owned") {
                FieldRole::NotOwned
            } else if meta.path.is_ident("base") {
                FieldRole::Base
            } else {
                return Err(meta.error("expected `not_owned` or `base`"));
            };
            if !matches!(role, FieldRole::Owned) {
                return Err(meta.error("a field takes at most one `release` role"));
            }
            role = next;
            Ok(())
        })?;
    }
    Ok(role)
}

/// Entry point for the `#[derive(OwnedState)]` macro.
pub fn derive_owned_state(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new_spanned(
            &input.ident,
            "OwnedState can only be derived for structs",
        ));
    };

    let hooks = parse_struct_hooks(&input.attrs)?;

    let members: Vec<(String, Member, &syn::Field)> = match &data.fields {
        Fields::Named(named) => named
            .named
            .iter()
            .filter_map(|f| {
                let ident = f.ident.clone()?;
                Some((ident.to_string(), Member::Named(ident), f))
            })
            .collect(),
        Fields::Unnamed(unnamed) => unnamed
            .unnamed
            .iter()
            .enumerate()
            .map(|(i, f)| (i.to_string(), Member::Unnamed(Index::from(i)), f))
            .collect(),
        Fields::Unit => Vec::new(),
    };

    let mut visits = Vec::new();
    let mut bases = Vec::new();
    for (name, member, field) in &members {
        match parse_field_role(&field.attrs)? {
            FieldRole::Owned => visits.push(quote! {
                walker.record(
                    #name,
                    (&&&&::warden::lifecycle::dispatch::Field(&self.#member)).release_field(
                        |key| (&&&::warden::lifecycle::dispatch::FieldSide(key)).release_side(),
                        |value| (&&&::warden::lifecycle::dispatch::FieldSide(value)).release_side(),
                    ),
                );
            }),
            FieldRole::NotOwned => visits.push(quote! {
                walker.not_owned(#name);
            }),
            FieldRole::Base => bases.push(member.clone()),
        }
    }

    // Own hook first, then each base layer; every step runs.
    let teardowns: Vec<TokenStream2> = hooks
        .teardown
        .iter()
        .map(|method| quote! { self.#method() })
        .chain(bases.iter().map(|base| {
            quote! { ::warden::lifecycle::OwnedState::teardown(&self.#base) }
        }))
        .collect();
    let own_unmanaged = hooks.unmanaged.as_ref().map(|method| quote! { self.#method(); });

    let ident = &input.ident;
    let layer = ident.to_string();
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::warden::lifecycle::OwnedState for #ident #ty_generics #where_clause {
            #[allow(clippy::needless_borrow, clippy::borrow_deref_ref)]
            fn release_owned(&self, walker: &mut ::warden::lifecycle::Walker) {
                #[allow(unused_imports)]
                use ::warden::lifecycle::dispatch::{
                    ViaKeyed as _, ViaReclaim as _, ViaRelease as _, ViaSide as _,
                    ViaSideRelease as _, ViaSideSkip as _, ViaSkip as _,
                };

                walker.enter_layer(#layer);
                #(#visits)*
                #(::warden::lifecycle::OwnedState::release_owned(&self.#bases, walker);)*
            }

            #[allow(unused_mut)]
            fn teardown(&self) -> ::core::result::Result<(), ::warden::ReleaseError> {
                let mut first: ::core::option::Option<::warden::ReleaseError> =
                    ::core::option::Option::None;
                #(
                    if let ::core::result::Result::Err(err) = #teardowns {
                        first.get_or_insert(err);
                    }
                )*
                first.map_or(::core::result::Result::Ok(()), ::core::result::Result::Err)
            }

            fn release_unmanaged(&self) {
                #own_unmanaged
                #(::warden::lifecycle::OwnedState::release_unmanaged(&self.#bases);)*
            }
        }
    })
}
