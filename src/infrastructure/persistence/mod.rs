pub mod file_store;
pub mod heartbeat_store;
pub mod retry;

pub use file_store::{
    FileCandleStore, FileProposalStore, FileTickStore, default_data_root, sanitize_symbol,
};
pub use heartbeat_store::FileHeartbeatStore;
pub use retry::{Transient, with_retries};
