// Transactional units of work, one per calling convention.

mod async_session;
mod sync_session;

pub use async_session::AsyncSession;
pub use sync_session::SyncSession;
