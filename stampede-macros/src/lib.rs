use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::quote;
use syn::{Ident, ItemFn};

/// Proc macro to denote a Transaction
///
/// Records `<fn>_duration` (trend, ms), `<fn>_count` (counter) and `<fn>_failed` (rate) for
/// every call, and waits on the run's rate limiter first when one is configured.
///
/// NOTE: Currently this macro only works on async functions with a `Result<T, E>` return value.
///
/// # Example
/// ```ignore
/// use stampede::prelude::*;
///
/// #[transaction]
/// async fn login(user: &str) -> Result<String, MyError> {
///     ...
/// }
/// ```
#[proc_macro_attribute]
pub fn transaction(attr: TokenStream, item: TokenStream) -> TokenStream {
    transaction_internal(attr.into(), item.into())
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn transaction_internal(_attr: TokenStream2, item: TokenStream2) -> syn::Result<TokenStream2> {
    let input = syn::parse2::<ItemFn>(item)?;

    let ItemFn {
        attrs,
        vis,
        sig,
        block,
    } = input;

    if sig.asyncness.is_none() {
        return Err(syn::Error::new_spanned(
            sig.fn_token,
            "#[transaction] only works on async functions",
        ));
    }

    let stmts = &block.stmts;
    let name = &sig.ident;

    Ok(quote! {
        #(#attrs)* #vis #sig {
            ::stampede::transaction::transaction_hook(::stampede::generate_labels!(#name), async move {
                #(#stmts)*
            }).await
        }
    })
}

/// Proc macro to denote a Scenario
///
/// NOTE: Currently this macro only works on async functions which take no arguments and with no
/// return value.
///
/// See the `Scenario` struct for more information on the methods this macro provides on functions.
///
/// # Example
/// ```ignore
/// use stampede::prelude::*;
///
/// #[scenario]
/// async fn my_scenario() {
/// }
/// ```
#[proc_macro_attribute]
pub fn scenario(attr: TokenStream, item: TokenStream) -> TokenStream {
    scenario_internal(attr.into(), item.into())
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn scenario_internal(_attr: TokenStream2, item: TokenStream2) -> syn::Result<TokenStream2> {
    let input = syn::parse2::<ItemFn>(item)?;

    let ItemFn {
        attrs,
        vis,
        sig,
        block,
    } = input;

    if !sig.inputs.is_empty() {
        return Err(syn::Error::new_spanned(
            &sig.inputs,
            "#[scenario] functions cannot take arguments",
        ));
    }

    let stmts = &block.stmts;

    let new_name = Ident::new(&format!("__stampede_{}", sig.ident), Span::call_site());
    let mut new_sig = sig.clone();
    new_sig.ident = new_name.clone();

    let mut scen_sig = sig.clone();
    let scen_name = sig.ident.clone();
    scen_sig.asyncness = None;
    scen_sig.output = syn::parse2(quote! {
        -> impl ::stampede::scenario::ConfigurableScenario<::stampede::core::ScenarioStatistics>
    })?;

    Ok(quote! {
        #(#attrs)* #vis #scen_sig {
            ::stampede::scenario::Scenario::new(stringify!(#scen_name), #new_name)
        }

        #[doc(hidden)]
        #vis #new_sig {
            #(#stmts)*
        }
    })
}
