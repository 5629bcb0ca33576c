pub(crate) mod refresh;
mod session;
pub(crate) mod store;

pub use refresh::{
    CredentialRenewer, HttpRenewer, RefreshCoordinator, RenewalError, Renewed, ReplayTurn,
};
pub use session::{SessionSignal, SessionState, SessionTerminator};
pub use store::{CredentialPair, CredentialStorage, CredentialStore, FileCredentialStore, StoreError};
