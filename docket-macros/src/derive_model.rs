use crate::{
    prelude::*,
    utils::{RenameRule, extract_named_fields, extract_serde_rename, mongodb},
};

const ID_FIELD: &str = "_id";
const UPDATED_AT_FIELD: &str = "updated_at";

#[derive(FromAttributes)]
#[darling(attributes(model))]
struct Attributes {
    collection: Option<LitStr>,
    indexes: Option<Path>,
}

pub fn derive_model(item: TokenStream) -> Result<TokenStream> {
    let input = parse2::<DeriveInput>(item)?;

    let attributes = Attributes::from_attributes(&input.attrs)?;
    let rename_rule = RenameRule::from_attrs(&input.attrs)?;

    let fields_named = extract_named_fields(input.span(), input.data)?;

    let mut id_field = None;
    let mut tracks_updated_at = false;

    for field in &fields_named.named {
        extract!(&field.ident, Some(field_ident), "expected named field");

        let stored_name = match extract_serde_rename(field)? {
            Some(rename) => rename,
            None => {
                let name = field_ident.unraw().to_string();
                match rename_rule {
                    Some(rule) => rule.apply_to_field(&name),
                    None => name,
                }
            }
        };

        if stored_name == ID_FIELD {
            if id_field.is_some() {
                return Err(Error::new_spanned(field, "more than one field is stored as `_id`"));
            }
            id_field = Some(field_ident.clone());
        } else if stored_name == UPDATED_AT_FIELD {
            tracks_updated_at = true;
        }
    }

    let collection_name = attributes.collection.unwrap_or_else(|| {
        LitStr::new(&input.ident.to_string().to_snake_case(), input.ident.span())
    });

    if collection_name.value().is_empty() {
        return Err(Error::new_spanned(
            &collection_name,
            "collection name must not be empty",
        ));
    }

    let config = ModelConfig {
        ident: input.ident,
        generics: input.generics,
        collection_name,
        id_field,
        tracks_updated_at,
        indexes: attributes.indexes,
    };

    Ok(build(&config))
}

struct ModelConfig {
    ident: Ident,
    generics: Generics,
    collection_name: LitStr,
    id_field: Option<Ident>,
    tracks_updated_at: bool,
    indexes: Option<Path>,
}

fn build(config: &ModelConfig) -> TokenStream {
    let krate = krate();
    let mongodb = mongodb();

    let ModelConfig {
        ident,
        generics,
        collection_name,
        tracks_updated_at,
        ..
    } = config;

    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let identifier_fn = config.id_field.as_ref().map(|id_field| {
        quote! {
            fn identifier(&self) -> ::std::option::Option<#mongodb::bson::Bson> {
                match #mongodb::bson::to_bson(&self.#id_field) {
                    ::std::result::Result::Ok(#mongodb::bson::Bson::Null)
                    | ::std::result::Result::Err(_) => ::std::option::Option::None,
                    ::std::result::Result::Ok(id) => ::std::option::Option::Some(id),
                }
            }
        }
    });

    let indexes_fn = config.indexes.as_ref().map(|indexes| {
        quote! {
            fn indexes() -> ::std::vec::Vec<#mongodb::IndexModel> {
                #indexes()
            }
        }
    });

    // Generic models have no single concrete type to register.
    let registration = generics.params.is_empty().then(|| {
        quote! {
            #krate::register_model!(#ident);
        }
    });

    quote! {
        impl #impl_generics #krate::Model for #ident #ty_generics #where_clause {
            const COLLECTION_NAME: &'static str = #collection_name;

            const TRACKS_UPDATED_AT: bool = #tracks_updated_at;

            #identifier_fn

            #indexes_fn
        }

        #registration
    }
}
