//! Services layer: storage contracts and their implementations.

mod database;
pub mod error;
mod memory;
mod store;

pub use database::Database;
pub use error::ServiceError;
pub use memory::MemoryStore;
pub use store::{CredentialStore, SchoolStore, SessionStore, UserDirectory};

use std::sync::Arc;

/// The four storage handles the application works against, usually backed by
/// one concrete store.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserDirectory>,
    pub sessions: Arc<dyn SessionStore>,
    pub credentials: Arc<dyn CredentialStore>,
    pub school: Arc<dyn SchoolStore>,
}

impl Stores {
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: UserDirectory + SessionStore + CredentialStore + SchoolStore + 'static,
    {
        Self {
            users: backend.clone(),
            sessions: backend.clone(),
            credentials: backend.clone(),
            school: backend,
        }
    }

    pub fn memory() -> Self {
        Self::from_backend(Arc::new(MemoryStore::new()))
    }
}
