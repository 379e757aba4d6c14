use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Fraction of the pre-withdrawal portfolio taken in retired years when no
/// withdrawal plan covers the age.
pub const DEFAULT_WITHDRAWAL_RATE: f64 = 0.04;

/// Age from which tax-advantaged accounts can be tapped without penalty.
pub const PENALTY_FREE_AGE: f64 = 59.5;

/// Flat penalty applied to early withdrawals from tax-advantaged accounts.
pub const EARLY_WITHDRAWAL_PENALTY: f64 = 0.10;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccountKind {
    #[serde(alias = "ira", alias = "IRA", alias = "traditional")]
    TaxDeferred,
    #[serde(alias = "roth", alias = "roth-ira", alias = "Roth IRA")]
    TaxFree,
    #[serde(alias = "Brokerage", alias = "taxable")]
    Brokerage,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionPlan {
    pub yearly_amount: f64,
    pub start_age: u32,
    pub end_age: u32,
}

impl ContributionPlan {
    pub fn covers(&self, age: u32) -> bool {
        age >= self.start_age && age <= self.end_age
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalPlan {
    /// Percent of the pre-withdrawal portfolio to take each covered year.
    pub percentage: f64,
    pub start_age: u32,
    pub end_age: u32,
}

impl WithdrawalPlan {
    /// An inverted range (start above end) covers nothing.
    pub fn covers(&self, age: u32) -> bool {
        age >= self.start_age && age <= self.end_age
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: AccountKind,
    pub name: String,
    pub starting_amount: f64,
    /// Chart color; carried through storage untouched, ignored by the engine.
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub contribution_plans: Vec<ContributionPlan>,
}

/// The person being projected. Rates are percentages, not fractions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Profile {
    pub current_age: u32,
    pub retirement_age: u32,
    pub life_expectancy: u32,
    pub expected_return: f64,
    /// Used only to restate spending power at retirement; never in balance math.
    pub inflation_rate: f64,
    pub tax_rate: f64,
    pub capital_gains_rate: f64,
    #[serde(alias = "allowEarlyIRAWithdrawals")]
    pub allow_early_withdrawals: bool,
    pub current_monthly_spending: f64,
    pub withdrawal_plans: Vec<WithdrawalPlan>,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            current_age: 30,
            retirement_age: 65,
            life_expectancy: 90,
            expected_return: 7.0,
            inflation_rate: 2.5,
            tax_rate: 22.0,
            capital_gains_rate: 15.0,
            allow_early_withdrawals: false,
            current_monthly_spending: 0.0,
            withdrawal_plans: Vec::new(),
        }
    }
}

impl Profile {
    /// Withdrawal fraction for a retired year: the first plan in list order
    /// covering the age wins, otherwise the default rate applies.
    pub fn withdrawal_fraction(&self, age: u32) -> f64 {
        self.withdrawal_plans
            .iter()
            .find(|plan| plan.covers(age))
            .map(|plan| plan.percentage / 100.0)
            .unwrap_or(DEFAULT_WITHDRAWAL_RATE)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YearlyProjection {
    pub year: i32,
    pub age: u32,
    pub total_balance: f64,
    pub account_balances: BTreeMap<String, f64>,
    pub account_withdrawals: BTreeMap<String, f64>,
    pub contributions: f64,
    pub withdrawals: f64,
    pub taxes: f64,
    pub net_income: f64,
}
