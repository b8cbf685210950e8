use crate::prelude::*;
use proc_macro_crate::{FoundCrate, crate_name};
use syn::meta::ParseNestedMeta;

macro_rules! extract {
    ($val:expr, $pat:pat, $error_message: expr) => {
        let $pat = $val else {
            return Err(Error::new_spanned($val, $error_message));
        };
    };
}

pub(crate) use extract;

pub fn extract_named_fields(span: Span, data: Data) -> Result<FieldsNamed> {
    let Data::Struct(data_struct) = data else {
        return Err(Error::new(span, "expected struct"));
    };

    extract!(
        data_struct.fields,
        Fields::Named(named_fields),
        "expected named fields"
    );

    Ok(named_fields)
}

/// The name serde stores `field` under, if `#[serde(rename = "...")]` or
/// `#[serde(rename(serialize = "..."))]` sets one.
pub fn extract_serde_rename(field: &Field) -> Result<Option<String>> {
    Ok(extract_serde_name(&field.attrs, "rename")?.map(|lit| lit.value()))
}

/// Reads `key = "..."` or the `serialize` half of `key(...)` from `#[serde]`
/// attributes. Other serde options are skipped.
fn extract_serde_name(attrs: &[Attribute], key: &str) -> Result<Option<LitStr>> {
    let mut name = None;

    for attr in attrs.iter().filter(|attr| attr.path().is_ident("serde")) {
        attr.parse_nested_meta(|meta| {
            if !meta.path.is_ident(key) {
                return skip_meta(&meta);
            }

            if meta.input.peek(Token![=]) {
                name = Some(meta.value()?.parse::<LitStr>()?);
            } else if meta.input.peek(syn::token::Paren) {
                meta.parse_nested_meta(|nested| {
                    if nested.path.is_ident("serialize") {
                        name = Some(nested.value()?.parse::<LitStr>()?);
                        Ok(())
                    } else {
                        skip_meta(&nested)
                    }
                })?;
            }

            Ok(())
        })?;
    }

    Ok(name)
}

/// A container-level `#[serde(rename_all = "...")]` rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenameRule {
    Lower,
    Upper,
    Pascal,
    Camel,
    Snake,
    ScreamingSnake,
    Kebab,
    ScreamingKebab,
}

impl RenameRule {
    pub fn from_attrs(attrs: &[Attribute]) -> Result<Option<Self>> {
        let Some(lit) = extract_serde_name(attrs, "rename_all")? else {
            return Ok(None);
        };

        let rule = match lit.value().as_str() {
            "lowercase" => Self::Lower,
            "UPPERCASE" => Self::Upper,
            "PascalCase" => Self::Pascal,
            "camelCase" => Self::Camel,
            "snake_case" => Self::Snake,
            "SCREAMING_SNAKE_CASE" => Self::ScreamingSnake,
            "kebab-case" => Self::Kebab,
            "SCREAMING-KEBAB-CASE" => Self::ScreamingKebab,
            other => {
                return Err(Error::new_spanned(
                    &lit,
                    format!("unknown serde rename rule `{other}`"),
                ));
            }
        };

        Ok(Some(rule))
    }

    /// Stored name of a snake_case field under this rule.
    pub fn apply_to_field(self, field: &str) -> String {
        match self {
            Self::Lower | Self::Snake => field.to_owned(),
            Self::Upper => field.to_ascii_uppercase(),
            Self::Pascal => field.to_upper_camel_case(),
            Self::Camel => field.to_lower_camel_case(),
            Self::ScreamingSnake => field.to_shouty_snake_case(),
            Self::Kebab => field.to_kebab_case(),
            Self::ScreamingKebab => field.to_shouty_kebab_case(),
        }
    }
}

fn skip_meta(meta: &ParseNestedMeta) -> Result<()> {
    if meta.input.peek(Token![=]) {
        meta.value()?.parse::<Expr>()?;
    } else if meta.input.peek(syn::token::Paren) {
        meta.parse_nested_meta(|nested| skip_meta(&nested))?;
    }

    Ok(())
}

fn found_crate() -> Result<FoundCrate> {
    crate_name("docket").map_err(|err| Error::new(Span::call_site(), err))
}

pub fn krate() -> TokenStream {
    match found_crate() {
        Ok(FoundCrate::Itself) => quote! { crate },
        Ok(FoundCrate::Name(name)) => {
            let name = Ident::new(&name, Span::call_site());
            quote! { ::#name }
        }
        Err(err) => err.into_compile_error(),
    }
}

pub fn mongodb() -> TokenStream {
    match found_crate() {
        Ok(FoundCrate::Itself) => quote! { ::mongodb },
        Ok(FoundCrate::Name(name)) => {
            let name = Ident::new(&name, Span::call_site());
            quote! { ::#name::mongodb }
        }
        Err(err) => err.into_compile_error(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    fn rule(attrs: &[Attribute]) -> Option<RenameRule> {
        RenameRule::from_attrs(attrs).unwrap()
    }

    #[test]
    fn test_rename_rule_read_from_container() {
        let attrs: Vec<Attribute> = vec![
            parse_quote!(#[derive(Debug)]),
            parse_quote!(#[serde(deny_unknown_fields, rename_all = "camelCase")]),
        ];

        assert_eq!(rule(&attrs), Some(RenameRule::Camel));
    }

    #[test]
    fn test_rename_rule_prefers_serialize_half() {
        let attrs: Vec<Attribute> =
            vec![parse_quote!(#[serde(rename_all(deserialize = "snake_case", serialize = "kebab-case"))])];

        assert_eq!(rule(&attrs), Some(RenameRule::Kebab));
    }

    #[test]
    fn test_unknown_rename_rule_is_rejected() {
        let attrs: Vec<Attribute> = vec![parse_quote!(#[serde(rename_all = "Title Case")])];

        assert!(RenameRule::from_attrs(&attrs).is_err());
    }

    #[test]
    fn test_rename_rules_applied_to_fields() {
        assert_eq!(RenameRule::Camel.apply_to_field("updated_at"), "updatedAt");
        assert_eq!(RenameRule::Pascal.apply_to_field("updated_at"), "UpdatedAt");
        assert_eq!(RenameRule::Kebab.apply_to_field("updated_at"), "updated-at");
        assert_eq!(RenameRule::ScreamingSnake.apply_to_field("updated_at"), "UPDATED_AT");
        assert_eq!(RenameRule::ScreamingKebab.apply_to_field("updated_at"), "UPDATED-AT");
        assert_eq!(RenameRule::Upper.apply_to_field("updated_at"), "UPDATED_AT");
        assert_eq!(RenameRule::Snake.apply_to_field("updated_at"), "updated_at");
    }

    #[test]
    fn test_field_rename_reads_serialize_half() {
        let field: Field = parse_quote! {
            #[serde(default, rename(serialize = "updated_at", deserialize = "touched"))]
            touched: i64
        };

        assert_eq!(extract_serde_rename(&field).unwrap().as_deref(), Some("updated_at"));
    }
}
