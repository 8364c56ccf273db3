//! Procedural macros for graph-resolver
//!
//! - `#[derive(DatabaseEntity)]` - Generate table metadata for the SQLite adapter
//!
//! # Usage
//!
//! ```ignore
//! #[derive(DatabaseEntity, Serialize)]
//! #[database_entity(table = "post")]
//! pub struct Post {
//!     #[primary_key]
//!     pub id: Option<i64>,
//!     pub text: String,
//!     #[skip]
//!     pub cached: bool,
//! }
//! ```
//!
//! The table name defaults to the snake_case struct name and the primary key
//! to `id`.

use convert_case::{Case, Casing};
use proc_macro::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Fields, LitStr, parse_macro_input};

#[proc_macro_derive(DatabaseEntity, attributes(database_entity, primary_key, skip))]
pub fn derive_database_entity(input: TokenStream) -> TokenStream {
    let ast = parse_macro_input!(input as DeriveInput);
    match expand_database_entity(&ast) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand_database_entity(ast: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &ast.ident;
    let (impl_generics, ty_generics, where_clause) = ast.generics.split_for_impl();

    let mut table = name.to_string().to_case(Case::Snake);
    for attr in &ast.attrs {
        if !attr.path().is_ident("database_entity") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                let value: LitStr = meta.value()?.parse()?;
                table = value.value();
                Ok(())
            } else {
                Err(meta.error("unsupported database_entity attribute"))
            }
        })?;
    }

    let fields = match &ast.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    name,
                    "DatabaseEntity requires a struct with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                name,
                "DatabaseEntity can only be derived for structs",
            ));
        }
    };

    let mut columns = Vec::new();
    let mut primary_key = None;
    for field in fields {
        if field.attrs.iter().any(|a| a.path().is_ident("skip")) {
            continue;
        }
        let Some(ident) = &field.ident else {
            continue;
        };
        let column = ident.to_string().trim_start_matches("r#").to_string();
        if field.attrs.iter().any(|a| a.path().is_ident("primary_key")) {
            if primary_key.is_some() {
                return Err(syn::Error::new_spanned(
                    ident,
                    "only one field may be marked #[primary_key]",
                ));
            }
            primary_key = Some(column.clone());
        }
        columns.push(column);
    }
    let primary_key = primary_key.unwrap_or_else(|| "id".to_string());

    Ok(quote! {
        impl #impl_generics ::graph_resolver::sqlite::DatabaseEntity for #name #ty_generics #where_clause {
            const TABLE_NAME: &'static str = #table;
            const PRIMARY_KEY: &'static str = #primary_key;

            fn column_names() -> &'static [&'static str] {
                &[#(#columns),*]
            }
        }
    })
}
