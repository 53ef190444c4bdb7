//! Test attributes that fail a test instead of letting it hang.
//!
//! `#[test_timeout::timeout]` wraps a synchronous test, and
//! `#[test_timeout::tokio_timeout_test]` wraps an async one in a
//! current-thread runtime. Both accept an optional limit in seconds
//! (`#[test_timeout::timeout(5)]`) and default to 60. Setting
//! `TEST_TIMEOUT_SCALE` multiplies every limit, which helps on slow CI hosts.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, Attribute, ItemFn, LitInt};

const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[proc_macro_attribute]
pub fn timeout(attr: TokenStream, item: TokenStream) -> TokenStream {
    let secs = match parse_timeout(attr) {
        Ok(secs) => secs,
        Err(err) => return err.to_compile_error().into(),
    };
    let ItemFn {
        attrs,
        vis,
        sig,
        block,
    } = parse_macro_input!(item as ItemFn);

    if sig.asyncness.is_some() {
        return syn::Error::new_spanned(
            &sig.ident,
            "timeout expects a synchronous test; use tokio_timeout_test for async tests",
        )
        .to_compile_error()
        .into();
    }

    let attrs = strip(attrs, |path| *path == ["test"]);
    let body = quote! { #block };
    let guarded = watchdog(secs, body);

    quote! {
        #[test]
        #(#attrs)*
        #vis #sig {
            #guarded
        }
    }
    .into()
}

#[proc_macro_attribute]
pub fn tokio_timeout_test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let secs = match parse_timeout(attr) {
        Ok(secs) => secs,
        Err(err) => return err.to_compile_error().into(),
    };
    let ItemFn {
        attrs,
        vis,
        mut sig,
        block,
    } = parse_macro_input!(item as ItemFn);

    if sig.asyncness.take().is_none() {
        return syn::Error::new_spanned(
            &sig.ident,
            "tokio_timeout_test expects an async test function",
        )
        .to_compile_error()
        .into();
    }

    let attrs = strip(attrs, |path| *path == ["tokio", "test"]);
    // The runtime lives on the watchdog thread so a wedged reactor cannot
    // block the test harness.
    let body = quote! {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("failed to build Tokio runtime");
        runtime.block_on(async move {
            if tokio::time::timeout(__limit, async move #block).await.is_err() {
                panic!("test timed out after {:?}", __limit);
            }
        });
    };
    let guarded = watchdog(secs, body);

    quote! {
        #[test]
        #(#attrs)*
        #vis #sig {
            #guarded
        }
    }
    .into()
}

fn parse_timeout(attr: TokenStream) -> syn::Result<u64> {
    if attr.is_empty() {
        return Ok(DEFAULT_TIMEOUT_SECS);
    }
    let lit: LitInt = syn::parse(attr)?;
    let secs: u64 = lit.base10_parse()?;
    if secs == 0 {
        return Err(syn::Error::new_spanned(lit, "timeout must be greater than zero"));
    }
    Ok(secs)
}

/// Runs `body` on a separate thread and panics if it has not finished within
/// the (scaled) limit. `__limit` is in scope inside `body`.
fn watchdog(secs: u64, body: TokenStream2) -> TokenStream2 {
    quote! {
        let __scale = std::env::var("TEST_TIMEOUT_SCALE")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .filter(|scale| *scale > 0)
            .unwrap_or(1);
        let __limit = std::time::Duration::from_secs(#secs.saturating_mul(__scale));
        let (__done, __report) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
                #body
            }));
            let _ = __done.send(outcome);
        });
        match __report.recv_timeout(__limit) {
            Ok(Ok(_)) => {}
            Ok(Err(payload)) => std::panic::resume_unwind(payload),
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                panic!("test timed out after {:?}", __limit)
            }
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                panic!("test thread exited without reporting a result")
            }
        }
    }
}

/// Drops attributes whose path is exactly `matches`, so the generated
/// `#[test]` is not doubled up.
fn strip(attrs: Vec<Attribute>, matches: impl Fn(&[String]) -> bool) -> Vec<Attribute> {
    attrs
        .into_iter()
        .filter(|attr| {
            let path: Vec<String> = attr
                .path()
                .segments
                .iter()
                .map(|segment| segment.ident.to_string())
                .collect();
            !matches(&path)
        })
        .collect()
}
