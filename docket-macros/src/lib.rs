#[warn(clippy::pedantic)]
mod derive_model;
mod prelude;
mod utils;

fn expand<F: FnOnce(proc_macro2::TokenStream) -> syn::Result<proc_macro2::TokenStream>>(
    fun: F,
    input: proc_macro::TokenStream,
) -> proc_macro::TokenStream {
    fun(input.into())
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

/// Implements `docket::Model` for a struct with named fields.
///
/// * The collection name is the snake_case struct name, or
///   `#[model(collection = "...")]`.
/// * The field stored as `_id` provides the identifier.
/// * A field stored as `updated_at` is stamped on every update.
/// * `#[model(indexes = "path::to::fn")]` names a `fn() -> Vec<IndexModel>`.
#[proc_macro_derive(Model, attributes(model))]
pub fn model(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    expand(derive_model::derive_model, input)
}
