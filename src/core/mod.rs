mod engine;
mod tax;
mod types;

pub use engine::{compound_growth, project};
pub use tax::taxes_owed;
pub use types::{
    Account, AccountKind, ContributionPlan, DEFAULT_WITHDRAWAL_RATE, EARLY_WITHDRAWAL_PENALTY,
    PENALTY_FREE_AGE, Profile, WithdrawalPlan, YearlyProjection,
};
