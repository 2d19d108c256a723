//! Post-login hook: resolves the SP session for a login event and reports
//! the roles its assertion carries.

pub mod config;
pub mod event;
pub mod post_login;

pub use config::{HookConfig, HookConfigJson};
pub use event::LoginEvent;
pub use post_login::PostLoginAction;
