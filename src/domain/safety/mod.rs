pub mod heartbeat;
pub mod state;

pub use heartbeat::{HeartbeatInfo, HeartbeatStatus, ServiceHeartbeat};
pub use state::{
    SafetyState, assert_safe_to_run, evaluate_safety_state, is_safe_to_run, merge_reason_codes,
};
