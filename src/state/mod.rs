pub mod clock;
pub mod role_cache;
pub mod session_store;

pub use role_cache::{create_shared_role_cache, SharedRoleCache};
pub use session_store::{
    create_shared_session_store, Session, SessionId, SessionStore, SharedSessionStore,
};
