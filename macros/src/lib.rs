#![allow(rustdoc::broken_intra_doc_links)]

use proc_macro::TokenStream;
use proc_macro2::Span;
use proc_macro2_diagnostics::{Diagnostic, Level, SpanDiagnosticExt};
use quote::{quote, quote_spanned};

use syn::parse::Parser;
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::{
    parse, Attribute, Expr, ExprCast, ExprLit, Ident, ItemEnum, ItemStruct, Lit, Meta, MetaNameValue,
    Path, Token, Type, TypePath, Visibility,
};

struct Field<'a> {
    name: &'a Ident,
    ty: &'a Type,
    function_name: String,
    netlink_type: Path,
    vis: &'a Visibility,
    attrs: Vec<&'a Attribute>,
}

#[derive(Default)]
struct FieldArgs {
    netlink_type: Option<Path>,
    override_function_name: Option<String>,
}

fn meta_key(namevalue: &MetaNameValue) -> Result<String, Diagnostic> {
    namevalue
        .path
        .get_ident()
        .map(|x| x.to_string())
        .ok_or_else(|| namevalue.path.span().error("Expected an identifier"))
}

fn meta_bool(namevalue: &MetaNameValue) -> Result<bool, Diagnostic> {
    if let Expr::Lit(ExprLit {
        lit: Lit::Bool(boolean),
        ..
    }) = &namevalue.value
    {
        Ok(boolean.value)
    } else {
        Err(namevalue.value.span().error("Expected a boolean"))
    }
}

fn parse_field_args(input: proc_macro2::TokenStream) -> Result<FieldArgs, Diagnostic> {
    let mut args = FieldArgs::default();
    let parser = Punctuated::<Meta, Token![,]>::parse_terminated;
    let attribute_args = parser
        .parse2(input)
        .map_err(|e| Diagnostic::new(Level::Error, e.to_string()))?;
    for arg in attribute_args.iter() {
        match arg {
            Meta::Path(path) => {
                if args.netlink_type.is_none() {
                    args.netlink_type = Some(path.clone());
                } else {
                    return Err(arg
                        .span()
                        .error("Only a single netlink value can exist for a given field"));
                }
            }
            Meta::NameValue(namevalue) => match meta_key(namevalue)?.as_str() {
                "name_in_functions" => {
                    if let Expr::Lit(ExprLit {
                        lit: Lit::Str(val), ..
                    }) = &namevalue.value
                    {
                        args.override_function_name = Some(val.value());
                    } else {
                        return Err(namevalue.value.span().error("Expected a string literal"));
                    }
                }
                _ => return Err(arg.span().error("Unsupported macro parameter")),
            },
            _ => return Err(arg.span().error("Unrecognized argument")),
        }
    }
    Ok(args)
}

struct StructArgs {
    nested: bool,
    derive_decoder: bool,
    derive_deserialize: bool,
}

impl Default for StructArgs {
    fn default() -> Self {
        Self {
            nested: false,
            derive_decoder: true,
            derive_deserialize: true,
        }
    }
}

fn parse_struct_args(input: TokenStream) -> Result<StructArgs, Diagnostic> {
    let mut args = StructArgs::default();
    let parser = Punctuated::<Meta, Token![,]>::parse_terminated;
    let attribute_args = parser
        .parse(input)
        .map_err(|e| Diagnostic::new(Level::Error, e.to_string()))?;
    for arg in attribute_args.iter() {
        if let Meta::NameValue(namevalue) = arg {
            let value = meta_bool(namevalue)?;
            match meta_key(namevalue)?.as_str() {
                "derive_decoder" => args.derive_decoder = value,
                "nested" => args.nested = value,
                "derive_deserialize" => args.derive_deserialize = value,
                _ => return Err(arg.span().error("Unsupported macro parameter")),
            }
        } else {
            return Err(arg.span().error("Unrecognized argument"));
        }
    }
    Ok(args)
}

fn collect_fields(ast: &ItemStruct) -> Result<(Vec<Field<'_>>, Vec<&syn::Field>), Diagnostic> {
    let mut fields = Vec::with_capacity(ast.fields.len());
    let mut identical_fields = Vec::new();

    'out: for field in ast.fields.iter() {
        for attr in field.attrs.iter() {
            if !attr.path().is_ident("field") {
                continue;
            }
            let tokens = match &attr.meta {
                Meta::List(l) => l.tokens.clone(),
                _ => return Err(attr.span().error("Invalid attributes")),
            };
            let field_args = parse_field_args(tokens)
                .map_err(|_| attr.span().error("Could not parse the field attributes"))?;
            let name = field
                .ident
                .as_ref()
                .ok_or_else(|| field.span().error("Only named fields are supported"))?;
            let netlink_type = field_args
                .netlink_type
                .ok_or_else(|| attr.span().error("Missing Netlink Type in field"))?;
            fields.push(Field {
                name,
                ty: &field.ty,
                function_name: field_args
                    .override_function_name
                    .unwrap_or_else(|| name.to_string()),
                netlink_type,
                vis: &field.vis,
                // drop the "field" attribute
                attrs: field
                    .attrs
                    .iter()
                    .filter(|x| !x.path().is_ident("field"))
                    .collect(),
            });
            continue 'out;
        }
        identical_fields.push(field);
    }
    Ok((fields, identical_fields))
}

fn nfnetlink_struct_inner(
    attrs: TokenStream,
    item: TokenStream,
) -> Result<TokenStream, Diagnostic> {
    let ast: ItemStruct =
        parse(item).map_err(|e| Diagnostic::new(Level::Error, e.to_string()))?;
    let name = &ast.ident;

    let args = parse_struct_args(attrs)?;
    let (fields, identical_fields) = collect_fields(&ast)?;

    let getters_and_setters = fields.iter().map(|field| {
        let field_name = field.name;
        let field_str = field.function_name.as_str();
        let field_type = field.ty;

        let getter_name = Ident::new(&format!("get_{}", field_str), field.name.span());
        let muttable_getter_name = Ident::new(&format!("get_mut_{}", field_str), field.name.span());
        let setter_name = Ident::new(&format!("set_{}", field_str), field.name.span());
        let in_place_edit_name = Ident::new(&format!("with_{}", field_str), field.name.span());
        quote!(
            #[allow(dead_code)]
            impl #name {
            pub fn #getter_name(&self) -> Option<&#field_type> {
                self.#field_name.as_ref()
            }

            pub fn #muttable_getter_name(&mut self) -> Option<&mut #field_type> {
                self.#field_name.as_mut()
            }

            pub fn #setter_name(&mut self, val: impl Into<#field_type>) {
                self.#field_name = Some(val.into());
            }

            pub fn #in_place_edit_name(mut self, val: impl Into<#field_type>) -> Self {
                self.#field_name = Some(val.into());
                self
            }
        })
    });

    let decoder = if args.derive_decoder {
        let match_entries = fields.iter().map(|field| {
            let field_name = field.name;
            let field_type = field.ty;
            let netlink_value = &field.netlink_type;
            quote!(
                x if x == #netlink_value => {
                    ::log::trace!("Calling {}::deserialize()", ::std::any::type_name::<#field_type>());
                    let (val, remaining) = <#field_type as crate::nlmsg::NfNetlinkDeserializable>::deserialize(buf)?;
                    if !remaining.is_empty() {
                        return Err(crate::error::DecodeError::InvalidDataSize);
                    }
                    self.#field_name = Some(val);
                    Ok(())
                }
            )
        });
        quote!(
            impl crate::nlmsg::AttributeDecoder for #name {
                #[allow(dead_code)]
                fn decode_attribute(&mut self, attr_type: u16, buf: &[u8]) -> Result<(), crate::error::DecodeError> {
                    ::log::trace!("Decoding attribute {} in type {}", attr_type, ::std::any::type_name::<#name>());
                    match attr_type {
                        #(#match_entries),*
                        _ => Err(crate::error::DecodeError::UnsupportedAttributeType(attr_type)),
                    }
                }
            }
        )
    } else {
        proc_macro2::TokenStream::new()
    };

    let nfnetlinkattribute_impl = {
        let size_entries = fields.iter().map(|field| {
            let field_name = field.name;
            quote!(
                if let Some(val) = &self.#field_name {
                    // Attribute header + attribute value
                    size += crate::nlmsg::pad_netlink_object::<crate::sys::nlattr>()
                        + crate::nlmsg::pad_netlink_object_with_variable_size(
                            crate::nlmsg::NfNetlinkAttribute::get_size(val),
                        );
                }
            )
        });
        let write_entries = fields.iter().map(|field| {
            let field_name = field.name;
            let field_str = field_name.to_string();
            let netlink_value = &field.netlink_type;
            quote!(
                if let Some(val) = &self.#field_name {
                    ::log::trace!("writing attribute {} - {:?}", #field_str, val);

                    crate::parser::write_attribute(#netlink_value, val, addr);

                    #[allow(unused)]
                    {
                        let size = crate::nlmsg::pad_netlink_object::<crate::sys::nlattr>()
                            + crate::nlmsg::pad_netlink_object_with_variable_size(
                                crate::nlmsg::NfNetlinkAttribute::get_size(val),
                            );
                        addr = &mut addr[size..];
                    }
                }
            )
        });
        let nested = args.nested;
        quote!(
            impl crate::nlmsg::NfNetlinkAttribute for #name {
                fn is_nested(&self) -> bool {
                    #nested
                }

                fn get_size(&self) -> usize {
                    let mut size = 0;
                    #(#size_entries) *
                    size
                }

                #[allow(unused_mut)]
                fn write_payload(&self, mut addr: &mut [u8]) {
                    #(#write_entries) *
                }
            }
        )
    };

    let vis = &ast.vis;
    let attrs = &ast.attrs;
    let new_fields = fields.iter().map(|field| {
        let name = field.name;
        let ty = field.ty;
        let attrs = &field.attrs;
        let vis = &field.vis;
        quote_spanned!(name.span() => #(#attrs) * #vis #name: Option<#ty>, )
    });
    let nfnetlinkdeserialize_impl = if args.derive_deserialize {
        quote!(
            impl crate::nlmsg::NfNetlinkDeserializable for #name {
                fn deserialize(buf: &[u8]) -> Result<(Self, &[u8]), crate::error::DecodeError> {
                    Ok((crate::parser::read_attributes(buf)?, &[]))
                }
            }
        )
    } else {
        proc_macro2::TokenStream::new()
    };
    let res = quote! {
        #(#attrs) * #vis struct #name {
            #(#new_fields)*
            #(#identical_fields),*
        }

        #(#getters_and_setters) *

        #decoder

        #nfnetlinkattribute_impl

        #nfnetlinkdeserialize_impl
    };

    Ok(res.into())
}

/// `nfnetlink_struct` wraps structures that describe nftables objects, and generates their
/// conversion to and from the corresponding nfnetlink attributes.
///
/// It also generates getter and setter functions for each netlink property.
///
/// # Parameters
/// - `nested` (defaults to `false`): the structure is nested (in the netlink sense)
///   inside its parent structure. This is the case of every structure below the
///   top-level objects (tables, chains and rules).
/// - `derive_decoder` (defaults to `true`): derive a [`crate::nlmsg::AttributeDecoder`]
///   implementation for the structure
/// - `derive_deserialize` (defaults to `true`): derive a [`crate::nlmsg::NfNetlinkDeserializable`]
///   implementation for the structure
///
/// # Example use
/// ```ignore
/// #[nfnetlink_struct(derive_deserialize = false)]
/// #[derive(PartialEq, Eq, Default, Debug)]
/// pub struct Chain {
///     family: ProtocolFamily,
///     #[field(NFTA_CHAIN_TABLE)]
///     table: String,
///     #[field(NFTA_CHAIN_TYPE, name_in_functions = "type")]
///     chain_type: ChainType,
/// }
/// ```
///
/// Fields without a `#[field]` attribute (`family`) are kept as-is and never serialized.
/// Annotated fields become `Option`s, get `get_<name>`, `get_mut_<name>`, `set_<name>` and
/// `with_<name>` methods, and are written as the given netlink attribute type.
/// `name_in_functions` overrides the `<name>` part of these methods.
#[proc_macro_attribute]
pub fn nfnetlink_struct(attrs: TokenStream, item: TokenStream) -> TokenStream {
    match nfnetlink_struct_inner(attrs, item) {
        Ok(tokens) => tokens,
        Err(diag) => diag.emit_as_item_tokens().into(),
    }
}

struct Variant<'a> {
    inner: &'a syn::Variant,
    name: &'a Ident,
    value: &'a Path,
}

fn parse_enum_args(input: TokenStream) -> Result<Path, Diagnostic> {
    let parser = Punctuated::<Meta, Token![,]>::parse_terminated;
    let attribute_args = parser
        .parse(input)
        .map_err(|e| Diagnostic::new(Level::Error, e.to_string()))?;
    let mut ty = None;
    for arg in attribute_args.iter() {
        match arg {
            Meta::Path(path) if ty.is_none() => ty = Some(path.clone()),
            Meta::Path(_) => {
                return Err(arg
                    .span()
                    .error("A value can only have a single representation"))
            }
            _ => return Err(arg.span().error("Unrecognized argument")),
        }
    }
    ty.ok_or_else(|| Span::call_site().error("The target type representation is unspecified"))
}

fn nfnetlink_enum_inner(attrs: TokenStream, item: TokenStream) -> Result<TokenStream, Diagnostic> {
    let ast: ItemEnum = parse(item).map_err(|e| Diagnostic::new(Level::Error, e.to_string()))?;
    let name = &ast.ident;

    let repr_type = parse_enum_args(attrs)?;

    let mut variants = Vec::with_capacity(ast.variants.len());
    for variant in ast.variants.iter() {
        match &variant.discriminant {
            Some((_, syn::Expr::Path(path))) => variants.push(Variant {
                inner: variant,
                name: &variant.ident,
                value: &path.path,
            }),
            Some((_, other)) => return Err(other.span().error("Expected a path")),
            None => return Err(variant.ident.span().error("Missing value")),
        }
    }

    let match_entries = variants.iter().map(|variant| {
        let variant_name = variant.name;
        let variant_value = &variant.value;
        quote!( x if x == (#variant_value as #repr_type) => Ok(Self::#variant_name), )
    });
    let unknown_type_ident = Ident::new(&format!("Unknown{}", name), name.span());
    let tryfrom_impl = quote!(
        impl ::core::convert::TryFrom<#repr_type> for #name {
            type Error = crate::error::DecodeError;

            fn try_from(val: #repr_type) -> Result<Self, Self::Error> {
                    match val {
                        #(#match_entries) *
                        value => Err(crate::error::DecodeError::#unknown_type_ident(value))
                    }
            }
        }
    );
    let nfnetlinkdeserialize_impl = quote!(
        impl crate::nlmsg::NfNetlinkDeserializable for #name {
            fn deserialize(buf: &[u8]) -> Result<(Self, &[u8]), crate::error::DecodeError> {
                let (v, remaining_data) =
                    <#repr_type as crate::nlmsg::NfNetlinkDeserializable>::deserialize(buf)?;
                <#name>::try_from(v).map(|x| (x, remaining_data))
            }
        }
    );
    let vis = &ast.vis;
    let attrs = &ast.attrs;
    let original_variants = variants.iter().map(|x| {
        let mut inner = x.inner.clone();
        if let Some((_, discriminant)) = inner.discriminant.as_mut() {
            *discriminant = Expr::Cast(ExprCast {
                attrs: vec![],
                expr: Box::new(discriminant.clone()),
                as_token: Token![as](name.span()),
                ty: Box::new(Type::Path(TypePath {
                    qself: None,
                    path: repr_type.clone(),
                })),
            });
        }
        inner
    });
    let res = quote! {
        #[repr(#repr_type)]
        #(#attrs) * #vis enum #name {
            #(#original_variants),*
        }

        impl crate::nlmsg::NfNetlinkAttribute for #name {
            fn get_size(&self) -> usize {
                crate::nlmsg::NfNetlinkAttribute::get_size(&(*self as #repr_type))
            }

            fn write_payload(&self, addr: &mut [u8]) {
                crate::nlmsg::NfNetlinkAttribute::write_payload(&(*self as #repr_type), addr);
            }
        }

        #tryfrom_impl

        #nfnetlinkdeserialize_impl
    };

    Ok(res.into())
}

/// `nfnetlink_enum` maps a fieldless enum onto the integer representation given as parameter
/// (e.g. `#[nfnetlink_enum(u32)]`), and generates its nfnetlink (de)serialization.
///
/// Every variant must be assigned a constant path. Decoding an unknown value produces
/// `DecodeError::Unknown<EnumName>(value)`.
#[proc_macro_attribute]
pub fn nfnetlink_enum(attrs: TokenStream, item: TokenStream) -> TokenStream {
    match nfnetlink_enum_inner(attrs, item) {
        Ok(tokens) => tokens,
        Err(diag) => diag.emit_as_item_tokens().into(),
    }
}
