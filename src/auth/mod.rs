//! Client-side session handling
//!
//! Stores the bearer token issued by the backend (obfuscated, with a 7-day
//! retention cap), tracks its expiry, and announces authentication changes
//! to whoever needs to load data.

pub mod claims;
pub mod events;
pub mod flow;
pub mod obfuscator;
pub mod session;
pub mod tokens;

pub use events::{AuthEvents, Signal, SubscriptionId};
pub use flow::AuthService;
pub use session::{Persistence, SessionDiagnostics, TokenManager};
pub use tokens::{StoreKind, StoreLocations, TokenStore};
