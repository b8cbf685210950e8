pub(crate) use crate::utils::{extract, krate};
pub use darling::FromAttributes;
pub use heck::{
    ToKebabCase, ToLowerCamelCase, ToShoutyKebabCase, ToShoutySnakeCase, ToSnakeCase,
    ToUpperCamelCase,
};
pub use proc_macro2::{Span, TokenStream};
pub use quote::quote;
pub use syn::{
    Attribute, Data, DeriveInput, Error, Expr, Field, Fields, FieldsNamed, Generics, Ident, LitStr, Path,
    Result, Token, ext::IdentExt, parse2, spanned::Spanned,
};
