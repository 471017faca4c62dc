pub mod ops_server;

pub use ops_server::{
    FreshnessStatus, HeartbeatResponse, LivezResponse, OpsState, ReadyzResponse, router, serve,
};
