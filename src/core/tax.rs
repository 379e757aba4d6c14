use std::collections::BTreeMap;

use tracing::warn;

use super::types::{
    Account, AccountKind, EARLY_WITHDRAWAL_PENALTY, PENALTY_FREE_AGE, Profile,
};

/// Total tax and penalty owed on one year's withdrawals.
///
/// Each account's withdrawal is taxed independently by its category and the
/// results summed. Eligibility is the allocator's concern; `age` here only
/// selects the rate.
pub fn taxes_owed(
    profile: &Profile,
    accounts: &[Account],
    withdrawals: &BTreeMap<String, f64>,
    age: u32,
) -> f64 {
    accounts
        .iter()
        .map(|account| {
            let amount = withdrawals.get(&account.id).copied().unwrap_or(0.0);
            if amount <= 0.0 {
                return 0.0;
            }
            amount * account_tax_rate(account, profile, age)
        })
        .sum()
}

fn account_tax_rate(account: &Account, profile: &Profile, age: u32) -> f64 {
    let penalty_free = f64::from(age) >= PENALTY_FREE_AGE;

    match account.kind {
        AccountKind::Brokerage => profile.capital_gains_rate / 100.0,
        AccountKind::TaxDeferred if penalty_free => profile.tax_rate / 100.0,
        AccountKind::TaxDeferred if profile.allow_early_withdrawals => {
            EARLY_WITHDRAWAL_PENALTY + profile.tax_rate / 100.0
        }
        AccountKind::TaxDeferred => {
            // The allocator never funds this category before eligibility.
            warn!(
                account = %account.id,
                age,
                "tax-deferred withdrawal before eligibility; taxing at zero"
            );
            0.0
        }
        AccountKind::TaxFree if penalty_free => 0.0,
        AccountKind::TaxFree if profile.allow_early_withdrawals => EARLY_WITHDRAWAL_PENALTY,
        AccountKind::TaxFree => {
            warn!(
                account = %account.id,
                age,
                "tax-free withdrawal before eligibility; taxing at zero"
            );
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn account(id: &str, kind: AccountKind) -> Account {
        Account {
            id: id.to_string(),
            kind,
            name: id.to_string(),
            starting_amount: 0.0,
            color: String::new(),
            contribution_plans: Vec::new(),
        }
    }

    fn profile() -> Profile {
        Profile {
            tax_rate: 22.0,
            capital_gains_rate: 15.0,
            ..Profile::default()
        }
    }

    fn withdrawals(entries: &[(&str, f64)]) -> BTreeMap<String, f64> {
        entries
            .iter()
            .map(|(id, amount)| (id.to_string(), *amount))
            .collect()
    }

    #[test]
    fn brokerage_withdrawals_pay_capital_gains_at_any_age() {
        let accounts = [account("b", AccountKind::Brokerage)];
        let taken = withdrawals(&[("b", 1_000.0)]);

        assert_approx(taxes_owed(&profile(), &accounts, &taken, 65), 150.0);
        assert_approx(taxes_owed(&profile(), &accounts, &taken, 50), 150.0);
    }

    #[test]
    fn tax_deferred_withdrawals_pay_ordinary_income_after_penalty_age() {
        let accounts = [account("t", AccountKind::TaxDeferred)];
        let taken = withdrawals(&[("t", 1_000.0)]);

        assert_approx(taxes_owed(&profile(), &accounts, &taken, 65), 220.0);
    }

    #[test]
    fn early_tax_deferred_withdrawals_stack_penalty_on_income_tax() {
        let accounts = [account("t", AccountKind::TaxDeferred)];
        let taken = withdrawals(&[("t", 1_000.0)]);
        let profile = Profile {
            allow_early_withdrawals: true,
            ..profile()
        };

        assert_approx(taxes_owed(&profile, &accounts, &taken, 50), 320.0);
    }

    #[test]
    fn ineligible_tax_deferred_amount_is_taxed_at_zero() {
        let accounts = [account("t", AccountKind::TaxDeferred)];
        let taken = withdrawals(&[("t", 1_000.0)]);

        assert_approx(taxes_owed(&profile(), &accounts, &taken, 50), 0.0);
    }

    #[test]
    fn tax_free_withdrawals_are_untaxed_after_penalty_age() {
        let accounts = [account("r", AccountKind::TaxFree)];
        let taken = withdrawals(&[("r", 1_000.0)]);

        assert_approx(taxes_owed(&profile(), &accounts, &taken, 60), 0.0);
    }

    #[test]
    fn early_tax_free_withdrawals_pay_penalty_only() {
        let accounts = [account("r", AccountKind::TaxFree)];
        let taken = withdrawals(&[("r", 1_000.0)]);
        let profile = Profile {
            allow_early_withdrawals: true,
            ..profile()
        };

        assert_approx(taxes_owed(&profile, &accounts, &taken, 50), 100.0);
    }

    #[test]
    fn age_59_is_still_early_and_60_is_not() {
        let accounts = [account("t", AccountKind::TaxDeferred)];
        let taken = withdrawals(&[("t", 1_000.0)]);
        let profile = Profile {
            allow_early_withdrawals: true,
            ..profile()
        };

        assert_approx(taxes_owed(&profile, &accounts, &taken, 59), 320.0);
        assert_approx(taxes_owed(&profile, &accounts, &taken, 60), 220.0);
    }

    #[test]
    fn zero_withdrawals_owe_nothing() {
        let accounts = [
            account("b", AccountKind::Brokerage),
            account("t", AccountKind::TaxDeferred),
            account("r", AccountKind::TaxFree),
        ];

        assert_approx(taxes_owed(&profile(), &accounts, &BTreeMap::new(), 70), 0.0);
        assert_approx(
            taxes_owed(
                &profile(),
                &accounts,
                &withdrawals(&[("b", 0.0), ("t", 0.0), ("r", 0.0)]),
                70,
            ),
            0.0,
        );
    }

    #[test]
    fn mixed_withdrawals_sum_per_account() {
        let accounts = [
            account("b", AccountKind::Brokerage),
            account("t", AccountKind::TaxDeferred),
            account("r", AccountKind::TaxFree),
        ];
        let taken = withdrawals(&[("b", 1_000.0), ("t", 2_000.0), ("r", 3_000.0)]);

        // 150 capital gains + 440 ordinary income + 0 on the tax-free account.
        assert_approx(taxes_owed(&profile(), &accounts, &taken, 65), 590.0);
    }
}
