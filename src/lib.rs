// Client-side session handling
pub mod config;
pub mod session;
pub mod types;

// Reference auth server
pub mod server;

pub use config::{ClientConfig, load_client_config};
pub use session::{
    AuthApi, AuthContext, AuthError, AuthOptions, AuthPhase, AuthState, FileTokenStore,
    HttpAuthApi, MemoryTokenStore, RolePrecedence, TokenStore,
};
pub use types::{Email, Role, SessionToken, UserId, UserProfile};
