pub mod models;
pub mod proposal;

pub use models::{
    AgentIntent, IntentAssetType, IntentConstraints, IntentKind, IntentOption, IntentOrderType,
    IntentRationale, IntentSide, OptionRight, TimeInForce,
};
pub use proposal::{OrderProposal, ProposalConstraints, ProposalSide};
