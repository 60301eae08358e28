//! Domain types shared by authentication schemes and storage backends.

mod account;
mod binding;
mod session;

pub use account::{Account, AccountId, AccountState, Credential, PublicProfile, TrustFlags};
pub use binding::{AuthBinding, AuthLevel};
pub use session::{SessionFeatures, SessionRecord};
