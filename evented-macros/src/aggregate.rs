use proc_macro::TokenStream;
use quote::quote;
use std::collections::HashSet;
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::{
    Expr, FnArg, Ident, ImplItem, ItemImpl, LitStr, Result, Token, Type, parse::Parse,
    parse::ParseStream, parse_macro_input,
};

/// #[aggregate] 宏实现
/// - 收集 `#[command]` 方法并移除该属性
/// - 生成 `::evented::aggregate::Aggregate`（TYPE/commands）
pub(crate) fn expand(attr: TokenStream, item: TokenStream) -> TokenStream {
    let cfg = parse_macro_input!(attr as AggregateAttrConfig);
    let mut imp = parse_macro_input!(item as ItemImpl);

    if let Some((_, path, _)) = &imp.trait_ {
        return syn::Error::new(path.span(), "#[aggregate] only on inherent impl blocks")
            .to_compile_error()
            .into();
    }

    let type_name = match cfg.name {
        Some(lit) => lit,
        None => match default_type_name(&imp.self_ty) {
            Some(lit) => lit,
            None => {
                return syn::Error::new(
                    imp.self_ty.span(),
                    "cannot infer aggregate name; use #[aggregate(name = \"...\")]",
                )
                .to_compile_error()
                .into();
            }
        },
    };

    let mut commands: Vec<(LitStr, Ident)> = Vec::new();
    let mut seen = HashSet::new();
    for item in imp.items.iter_mut() {
        let ImplItem::Fn(method) = item else {
            continue;
        };

        // 取出 #[command] 属性，其余原样保留
        let mut retained = Vec::new();
        let mut command: Option<LitStr> = None;
        let mut tagged = false;
        for attr in method.attrs.drain(..) {
            if !attr.path().is_ident("command") {
                retained.push(attr);
                continue;
            }
            if tagged {
                return syn::Error::new(attr.span(), "duplicate #[command] on this method")
                    .to_compile_error()
                    .into();
            }
            tagged = true;
            match parse_command_attr(&attr) {
                Ok(name) => command = name,
                Err(err) => return err.to_compile_error().into(),
            }
        }
        method.attrs = retained;

        if !tagged {
            continue;
        }

        if let Err(err) = check_signature(&method.sig) {
            return err.to_compile_error().into();
        }

        let ident = method.sig.ident.clone();
        let name = command.unwrap_or_else(|| LitStr::new(&ident.to_string(), ident.span()));
        if !seen.insert(name.value()) {
            return syn::Error::new(name.span(), "duplicate command name")
                .to_compile_error()
                .into();
        }
        commands.push((name, ident));
    }

    if commands.is_empty() {
        return syn::Error::new(
            imp.self_ty.span(),
            "#[aggregate] requires at least one #[command] method",
        )
        .to_compile_error()
        .into();
    }

    let self_ty = &imp.self_ty;
    let (impl_generics, _, where_clause) = imp.generics.split_for_impl();
    let registrations = commands
        .iter()
        .map(|(name, ident)| quote! { .on(#name, Self::#ident) });

    let expanded = quote! {
        #imp

        impl #impl_generics ::evented::aggregate::Aggregate for #self_ty #where_clause {
            const TYPE: &'static str = #type_name;

            fn commands() -> ::evented::aggregate::CommandTable<Self> {
                ::evented::aggregate::CommandTable::new()
                    #( #registrations )*
            }
        }
    };

    TokenStream::from(expanded)
}

// 类型名的小写形式，例如 `Order` -> "order"
fn default_type_name(ty: &Type) -> Option<LitStr> {
    let Type::Path(path) = ty else {
        return None;
    };
    let last = path.path.segments.last()?;
    Some(LitStr::new(
        &last.ident.to_string().to_lowercase(),
        last.ident.span(),
    ))
}

// 命令方法：`&mut self` + 载荷 + 副作用句柄
fn check_signature(sig: &syn::Signature) -> Result<()> {
    let receiver_ok = matches!(
        sig.inputs.first(),
        Some(FnArg::Receiver(r)) if r.reference.is_some() && r.mutability.is_some()
    );
    if !receiver_ok || sig.inputs.len() != 3 {
        return Err(syn::Error::new(
            sig.span(),
            "#[command] method must look like `fn name(&mut self, payload: P, fx: &mut Effects<'_>)`",
        ));
    }
    if sig.asyncness.is_some() {
        return Err(syn::Error::new(
            sig.asyncness.span(),
            "#[command] method must be synchronous",
        ));
    }
    Ok(())
}

// 解析 #[command] 或 #[command(name = "...")]
fn parse_command_attr(attr: &syn::Attribute) -> Result<Option<LitStr>> {
    match &attr.meta {
        syn::Meta::Path(_) => Ok(None),
        syn::Meta::List(_) => {
            let pairs: Punctuated<AttrKv, Token![,]> =
                attr.parse_args_with(Punctuated::<AttrKv, Token![,]>::parse_terminated)?;
            let mut name: Option<LitStr> = None;
            for kv in pairs {
                if kv.key != "name" {
                    return Err(syn::Error::new(kv.key.span(), "unknown key; expected 'name'"));
                }
                if name.is_some() {
                    return Err(syn::Error::new(
                        kv.key.span(),
                        "duplicate key 'name' in attribute",
                    ));
                }
                name = Some(kv.string_value()?);
            }
            Ok(name)
        }
        other => Err(syn::Error::new(other.span(), "expected #[command(...)]")),
    }
}

// -------- parsing --------

struct AggregateAttrConfig {
    name: Option<LitStr>,
}

impl Parse for AggregateAttrConfig {
    fn parse(input: ParseStream) -> Result<Self> {
        let mut name: Option<LitStr> = None;

        if input.is_empty() {
            return Ok(Self { name });
        }

        let pairs: Punctuated<AttrKv, Token![,]> =
            Punctuated::<AttrKv, Token![,]>::parse_terminated(input)?;

        for kv in pairs.into_iter() {
            match kv.key.to_string().as_str() {
                "name" => {
                    if name.is_some() {
                        return Err(syn::Error::new(
                            kv.key.span(),
                            "duplicate key 'name' in attribute",
                        ));
                    }
                    let lit = kv.string_value()?;
                    if lit.value().trim().is_empty() {
                        return Err(syn::Error::new(lit.span(), "aggregate name must not be empty"));
                    }
                    name = Some(lit);
                }
                _ => {
                    return Err(syn::Error::new(
                        kv.key.span(),
                        "unknown key in attribute; expected 'name'",
                    ));
                }
            }
        }

        Ok(Self { name })
    }
}

struct AttrKv {
    key: Ident,
    value: Expr,
}

impl AttrKv {
    fn string_value(&self) -> Result<LitStr> {
        match &self.value {
            Expr::Lit(syn::ExprLit {
                lit: syn::Lit::Str(lit),
                ..
            }) => Ok(lit.clone()),
            other => Err(syn::Error::new(
                other.span(),
                format!("expected string literal for '{}'", self.key),
            )),
        }
    }
}

impl Parse for AttrKv {
    fn parse(input: ParseStream) -> Result<Self> {
        let key: Ident = input.parse()?;
        let _eq: Token![=] = input.parse()?;
        let value: Expr = input.parse()?;
        Ok(Self { key, value })
    }
}
