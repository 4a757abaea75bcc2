//! Derive macro for dependency-resolver
//!
//! `#[derive(Service)]` generates a `Service` impl with a single constructor
//! built from the struct's fields:
//!
//! - `#[inject]` fields are resolved from the provider. `Arc<T>` fields are
//!   required, `Option<Arc<T>>` fields are left `None` when `T` is not
//!   registered.
//! - `#[param]` fields only take caller-supplied parameters. `V` fields are
//!   required, `Option<V>` fields are optional.
//! - Every other field uses `Default`.
//!
//! # Example
//!
//! ```rust,ignore
//! use dependency_resolver::{Definition, Service, ServiceRepository, params};
//! use std::sync::Arc;
//!
//! #[derive(Service)]
//! struct UserService {
//!     #[inject]
//!     db: Arc<Database>,
//!     #[inject]
//!     cache: Option<Arc<dyn Cache>>,
//!     #[param]
//!     tenant: Option<String>,
//!     // Non-injected fields use Default
//!     request_count: u64,
//! }
//!
//! let repo = ServiceRepository::new();
//! repo.register(Definition::<UserService>::new()).unwrap();
//! let provider = repo.create_provider();
//! let users = provider.get_with::<UserService>(&params!["acme".to_string()]).unwrap();
//! ```

use proc_macro::TokenStream;
use quote::quote;
use syn::{Attribute, Data, DeriveInput, Fields, Type, parse_macro_input};

/// Derive `Service` with one constructor taking the annotated fields.
///
/// # Attributes
///
/// - `#[inject]` - Resolve the field from the provider. The field type must
///   be `Arc<T>` (required) or `Option<Arc<T>>` (optional).
/// - `#[param]` - Fill the field from caller parameters only. `Option<V>` is
///   optional, any other type is required and must be `Clone`.
///
/// A missing required value fails construction with `DiError::NotFound`
/// as the source.
#[proc_macro_derive(Service, attributes(inject, param))]
pub fn derive_service(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return syn::Error::new_spanned(
                    &input,
                    "Service can only be derived for structs with named fields",
                )
                .to_compile_error()
                .into();
            }
        },
        _ => {
            return syn::Error::new_spanned(&input, "Service can only be derived for structs")
                .to_compile_error()
                .into();
        }
    };

    let mut params = Vec::new();
    let mut field_inits = Vec::new();

    for field in fields.iter() {
        let Some(field_name) = field.ident.as_ref() else {
            continue;
        };
        let field_type = &field.ty;
        let label = field_name.to_string();
        let index = params.len();

        match find_field_attr(&field.attrs) {
            Some(FieldAttr::Inject) => {
                if let Some(inner) = extract_option_arc_inner_type(field_type) {
                    params.push(quote! {
                        ::dependency_resolver::Param::of::<#inner>(#label)
                    });
                    field_inits.push(quote! {
                        #field_name: args.get::<#inner>(#index)
                    });
                } else if let Some(inner) = extract_arc_inner_type(field_type) {
                    params.push(quote! {
                        ::dependency_resolver::Param::of::<#inner>(#label).not_null()
                    });
                    field_inits.push(quote! {
                        #field_name: args
                            .get::<#inner>(#index)
                            .ok_or_else(::dependency_resolver::DiError::not_found::<#inner>)?
                    });
                } else {
                    return syn::Error::new_spanned(
                        field_type,
                        "Fields marked with #[inject] must have type Arc<T> or Option<Arc<T>>",
                    )
                    .to_compile_error()
                    .into();
                }
            }
            Some(FieldAttr::Param) => {
                if let Some(inner) = extract_option_inner_type(field_type) {
                    params.push(quote! {
                        ::dependency_resolver::Param::of::<#inner>(#label).caller_only()
                    });
                    field_inits.push(quote! {
                        #field_name: args.value::<#inner>(#index)
                    });
                } else {
                    params.push(quote! {
                        ::dependency_resolver::Param::of::<#field_type>(#label)
                            .not_null()
                            .caller_only()
                    });
                    field_inits.push(quote! {
                        #field_name: args
                            .value::<#field_type>(#index)
                            .ok_or_else(::dependency_resolver::DiError::not_found::<#field_type>)?
                    });
                }
            }
            None => {
                field_inits.push(quote! {
                    #field_name: ::std::default::Default::default()
                });
            }
        }
    }

    let expanded = quote! {
        impl #impl_generics ::dependency_resolver::Service for #name #ty_generics #where_clause {
            fn constructors() -> ::std::vec::Vec<::dependency_resolver::Constructor<Self>> {
                ::std::vec![::dependency_resolver::Constructor::try_new(
                    [#(#params),*],
                    |args: &::dependency_resolver::Args| -> ::std::result::Result<Self, ::dependency_resolver::DiError> {
                        ::std::result::Result::Ok(Self {
                            #(#field_inits),*
                        })
                    },
                )]
            }
        }
    };

    TokenStream::from(expanded)
}

/// Field annotations understood by the derive
enum FieldAttr {
    Inject,
    Param,
}

fn find_field_attr(attrs: &[Attribute]) -> Option<FieldAttr> {
    attrs.iter().find_map(|attr| {
        if attr.path().is_ident("inject") {
            Some(FieldAttr::Inject)
        } else if attr.path().is_ident("param") {
            Some(FieldAttr::Param)
        } else {
            None
        }
    })
}

/// The single type argument of `Wrapper<T>` when the last path segment is `wrapper`
fn single_type_argument<'a>(ty: &'a Type, wrapper: &str) -> Option<&'a Type> {
    let Type::Path(type_path) = ty else {
        return None;
    };
    let segment = type_path.path.segments.last()?;
    if segment.ident != wrapper {
        return None;
    }
    match &segment.arguments {
        syn::PathArguments::AngleBracketed(args) => match args.args.first() {
            Some(syn::GenericArgument::Type(inner)) => Some(inner),
            _ => None,
        },
        _ => None,
    }
}

/// Extract T from Arc<T>
fn extract_arc_inner_type(ty: &Type) -> Option<&Type> {
    single_type_argument(ty, "Arc")
}

/// Extract T from Option<T>
fn extract_option_inner_type(ty: &Type) -> Option<&Type> {
    single_type_argument(ty, "Option")
}

/// Extract T from Option<Arc<T>>
fn extract_option_arc_inner_type(ty: &Type) -> Option<&Type> {
    extract_option_inner_type(ty).and_then(extract_arc_inner_type)
}
