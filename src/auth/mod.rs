//! OAuth2 authorization and token lifecycle
//!
//! * [`flow`] runs the interactive authorization-code grant once per
//!   (service, user).
//! * [`refresh`] hands out ready-to-use tokens on every call afterwards.
//! * [`hooks`] is the per-provider customization seam both engines share.

pub mod callback;
pub mod exchange;
pub mod flow;
pub mod hooks;
pub mod metrics;
pub mod pkce;
pub mod refresh;
pub mod types;

pub use flow::{AuthorizationFlow, AuthorizationPresenter, BrowserPresenter, FlowSettings};
pub use hooks::{ProviderHooks, RefreshPolicy, StandardHooks};
pub use pkce::PkcePair;
pub use refresh::{RefreshSettings, TokenRefresher};
pub use types::{AuthorizationState, Credentials, OAuthConfig};
