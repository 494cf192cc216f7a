pub mod jobs;
pub mod ledger;

pub use jobs::{JobTracker, PendingCharge, MAX_POLL_ATTEMPTS, POLL_INTERVAL_SECS};
pub use ledger::{
    execute_paid, refund, Charge, AD_COMPOSITION_COST, IMAGE_EDIT_COST, PROMPT_OPTIMIZE_COST,
    VIDEO_GENERATION_COST,
};
