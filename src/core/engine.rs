use std::collections::BTreeMap;

use super::tax::taxes_owed;
use super::types::{Account, AccountKind, PENALTY_FREE_AGE, Profile, YearlyProjection};

/// Withdrawals drain taxable money first, then tax-deferred, then tax-free;
/// within a category, accounts are drained in list order.
const WITHDRAWAL_PRIORITY: [AccountKind; 3] = [
    AccountKind::Brokerage,
    AccountKind::TaxDeferred,
    AccountKind::TaxFree,
];

/// Project every year from the current age through life expectancy.
///
/// Pure function of its inputs: same profile, accounts, and start year always
/// produce the same sequence. `start_year` is the calendar year of the first
/// row; callers that want "this year" read the clock themselves.
pub fn project(profile: &Profile, accounts: &[Account], start_year: i32) -> Vec<YearlyProjection> {
    if profile.life_expectancy < profile.current_age {
        return Vec::new();
    }
    let total_years = profile.life_expectancy - profile.current_age;

    let mut balances: BTreeMap<String, f64> = accounts
        .iter()
        .map(|account| (account.id.clone(), account.starting_amount.max(0.0)))
        .collect();

    let mut projections = Vec::with_capacity(total_years as usize + 1);

    for offset in 0..=total_years {
        let age = profile.current_age + offset;
        let is_retired = age >= profile.retirement_age;

        let (next_balances, account_withdrawals, contributions) = if is_retired {
            let (next, taken) = run_retired_year(profile, accounts, &balances, age);
            (next, taken, 0.0)
        } else {
            let (next, contributed) = run_accumulation_year(profile, accounts, &balances, age);
            (next, zero_withdrawals(accounts), contributed)
        };

        let total_balance: f64 = next_balances.values().sum();
        let withdrawals: f64 = account_withdrawals.values().sum();
        let taxes = taxes_owed(profile, accounts, &account_withdrawals, age);

        projections.push(YearlyProjection {
            year: start_year + offset as i32,
            age,
            total_balance,
            account_balances: next_balances.clone(),
            account_withdrawals,
            contributions,
            withdrawals,
            taxes,
            net_income: withdrawals - taxes,
        });

        balances = next_balances;
    }

    projections
}

/// Future value after `years` of compound growth with a level annual
/// contribution stream. `rate` is a percentage.
pub fn compound_growth(principal: f64, rate: f64, years: u32, contribution: f64) -> f64 {
    let r = rate / 100.0;
    let growth = (1.0 + r).powi(years as i32);
    if contribution == 0.0 {
        return principal * growth;
    }
    if r == 0.0 {
        return principal + contribution * f64::from(years);
    }
    principal * growth + contribution * ((growth - 1.0) / r)
}

fn run_accumulation_year(
    profile: &Profile,
    accounts: &[Account],
    balances: &BTreeMap<String, f64>,
    age: u32,
) -> (BTreeMap<String, f64>, f64) {
    let mut next = BTreeMap::new();
    let mut total_contributed = 0.0;

    for account in accounts {
        let contribution: f64 = account
            .contribution_plans
            .iter()
            .filter(|plan| plan.covers(age))
            .map(|plan| plan.yearly_amount)
            .sum::<f64>()
            .max(0.0);

        let balance = balances.get(&account.id).copied().unwrap_or(0.0);
        let grown = compound_growth(balance, profile.expected_return, 1, contribution);
        next.insert(account.id.clone(), grown.max(0.0));
        total_contributed += contribution;
    }

    (next, total_contributed)
}

fn run_retired_year(
    profile: &Profile,
    accounts: &[Account],
    balances: &BTreeMap<String, f64>,
    age: u32,
) -> (BTreeMap<String, f64>, BTreeMap<String, f64>) {
    // One year of growth with no cash flow, then fund the year's need from
    // the grown balances.
    let grown: BTreeMap<String, f64> = accounts
        .iter()
        .map(|account| {
            let balance = balances.get(&account.id).copied().unwrap_or(0.0);
            (
                account.id.clone(),
                compound_growth(balance, profile.expected_return, 1, 0.0).max(0.0),
            )
        })
        .collect();

    let total_available: f64 = grown.values().sum();
    let need = profile.withdrawal_fraction(age) * total_available;
    let taken = allocate_withdrawals(profile, accounts, &grown, age, need);

    let mut next = BTreeMap::new();
    for account in accounts {
        let balance = grown.get(&account.id).copied().unwrap_or(0.0);
        let withdrawal = taken.get(&account.id).copied().unwrap_or(0.0);
        next.insert(account.id.clone(), (balance - withdrawal).max(0.0));
    }

    (next, taken)
}

/// Split `need` across accounts in strict category priority. Stops once the
/// need is met; an under-funded portfolio simply yields less than requested.
fn allocate_withdrawals(
    profile: &Profile,
    accounts: &[Account],
    available: &BTreeMap<String, f64>,
    age: u32,
    need: f64,
) -> BTreeMap<String, f64> {
    let mut taken = zero_withdrawals(accounts);
    let mut remaining = need.max(0.0);

    for kind in WITHDRAWAL_PRIORITY {
        if remaining <= 0.0 {
            break;
        }
        if !kind_accessible(kind, profile, age) {
            continue;
        }

        for account in accounts.iter().filter(|a| a.kind == kind) {
            if remaining <= 0.0 {
                break;
            }
            let balance = available.get(&account.id).copied().unwrap_or(0.0).max(0.0);
            let amount = balance.min(remaining);
            if amount <= 0.0 {
                continue;
            }
            taken.insert(account.id.clone(), amount);
            remaining -= amount;
        }
    }

    taken
}

/// The age/flag gate is enforced here, at allocation, and nowhere else.
fn kind_accessible(kind: AccountKind, profile: &Profile, age: u32) -> bool {
    match kind {
        AccountKind::Brokerage => true,
        AccountKind::TaxDeferred | AccountKind::TaxFree => {
            f64::from(age) >= PENALTY_FREE_AGE || profile.allow_early_withdrawals
        }
    }
}

fn zero_withdrawals(accounts: &[Account]) -> BTreeMap<String, f64> {
    accounts
        .iter()
        .map(|account| (account.id.clone(), 0.0))
        .collect()
}
