//! Procedural macros for `warden`.
//!
//! * `#[derive(OwnedState)]` - generates the field walk behind `warden::lifecycle::Cascade`

use proc_macro::TokenStream;

mod owned_state;

/// Derives `warden::lifecycle::OwnedState`.
///
/// Field attributes:
/// * `#[release(not_owned)]` - record the field but never release it
/// * `#[release(base)]` - walk the field's own `OwnedState` layer after this one
///
/// Struct attributes:
/// * `#[release(teardown = method)]` - `fn method(&self) -> Result<(), ReleaseError>`,
///   run before the walk
/// * `#[release(unmanaged = method)]` - `fn method(&self)`, run on every release path
///
/// ```ignore
/// #[derive(OwnedState)]
/// #[release(teardown = flush)]
/// struct Connection {
///     socket: Arc<Socket>,
///     #[release(not_owned)]
///     pool: Arc<Pool>,
///     #[release(base)]
///     base: Endpoint,
/// }
/// ```
#[proc_macro_derive(OwnedState, attributes(release))]
pub fn derive_owned_state(input: TokenStream) -> TokenStream {
    owned_state::derive_owned_state(input)
}
