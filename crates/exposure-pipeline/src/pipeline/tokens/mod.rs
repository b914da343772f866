pub mod domain;
mod file;
mod memory;
pub mod store;
mod table;

pub use domain::{ExposureToken, TokenId, TokenStatus};
pub use file::FileTokenStore;
pub use memory::MemoryTokenStore;
pub use store::{IngestOutcome, StoreError, TokenStore};
