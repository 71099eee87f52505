//! The reconciliation rules.
//!
//! These are pure functions so that the real-time path, the sweep and the retry path all make exactly the same
//! decision for the same inputs.
use crate::db_types::{Amount, AmountOverflow, ExceptionStep, NotifyStatus, PayStatus, ReconStatus, SplitStatus, SubStatus};

/// The verdict reached by looking only at an order's sub-statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusVerdict {
    /// A sub-status reports failure. The step identifies the first one that failed.
    Failed(ExceptionStep),
    /// Nothing has failed, but at least one sub-status is still processing
    Pending,
    /// Every sub-status is successful. The amounts still need to be checked.
    Settled,
}

impl StatusVerdict {
    /// The reconciliation status an order takes if this verdict is final.
    pub fn recon_status(&self) -> ReconStatus {
        match self {
            Self::Failed(_) => ReconStatus::Failure,
            Self::Pending => ReconStatus::Pending,
            Self::Settled => ReconStatus::Success,
        }
    }
}

/// Checks the sub-statuses in order: pay, then split, then notify. Failures take priority over processing statuses.
pub fn evaluate_statuses(pay: PayStatus, split: SplitStatus, notify: NotifyStatus) -> StatusVerdict {
    if pay.is_failure() {
        return StatusVerdict::Failed(ExceptionStep::PayStatus);
    }
    if split.is_failure() {
        return StatusVerdict::Failed(ExceptionStep::SplitStatus);
    }
    if notify.is_failure() {
        return StatusVerdict::Failed(ExceptionStep::NotifyStatus);
    }
    if pay.is_processing() || split.is_processing() || notify.is_processing() {
        StatusVerdict::Pending
    } else {
        StatusVerdict::Settled
    }
}

pub fn split_total<I: IntoIterator<Item = Amount>>(amounts: I) -> Result<Amount, AmountOverflow> {
    Amount::checked_sum(amounts)
}

/// Why the paid amount could not be matched against the amounts it was split into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountCheckError {
    /// The signed difference exceeds the tolerance
    Mismatch(Amount),
    /// The amounts are too large to be compared
    Overflow,
}

/// `split_total + platform_income + pay_fee`
pub fn accounted_amount(split_total: Amount, platform_income: Amount, pay_fee: Amount) -> Result<Amount, AmountOverflow> {
    split_total.checked_add(platform_income)?.checked_add(pay_fee)
}

/// `pay_amount - (split_total + platform_income + pay_fee)`
pub fn amount_difference(
    pay_amount: Amount,
    split_total: Amount,
    platform_income: Amount,
    pay_fee: Amount,
) -> Result<Amount, AmountOverflow> {
    pay_amount.checked_sub(accounted_amount(split_total, platform_income, pay_fee)?)
}

/// Checks that the paid amount is fully accounted for, to within `tolerance`. A difference exactly equal to the
/// tolerance passes. On failure, the signed difference is returned.
pub fn check_amounts(
    pay_amount: Amount,
    split_total: Amount,
    platform_income: Amount,
    pay_fee: Amount,
    tolerance: Amount,
) -> Result<(), AmountCheckError> {
    let diff = amount_difference(pay_amount, split_total, platform_income, pay_fee)
        .map_err(|_| AmountCheckError::Overflow)?;
    if diff.abs() > tolerance {
        Err(AmountCheckError::Mismatch(diff))
    } else {
        Ok(())
    }
}

pub fn amount_mismatch_message(pay_amount: Amount, split_total: Amount, platform_income: Amount, pay_fee: Amount) -> String {
    let accounted = accounted_amount(split_total, platform_income, pay_fee);
    match accounted.and_then(|a| pay_amount.checked_sub(a).map(|diff| (a, diff))) {
        Ok((accounted, diff)) => format!(
            "amount mismatch: paid {pay_amount}, accounted for {accounted} (splits {split_total}, income \
             {platform_income}, fee {pay_fee}), difference {diff}"
        ),
        Err(e) => format!(
            "amount mismatch: paid {pay_amount}, splits {split_total}, income {platform_income}, fee {pay_fee}. {e}"
        ),
    }
}

#[cfg(test)]
mod test {
    use rust_decimal_macros::dec;

    use super::*;

    fn amt(d: rust_decimal::Decimal) -> Amount {
        Amount::from(d)
    }

    #[test]
    fn failures_are_checked_in_order() {
        use NotifyStatus as N;
        use PayStatus as P;
        use SplitStatus as S;
        let v = evaluate_statuses(P::Failure, S::Failure, N::Failure);
        assert_eq!(v, StatusVerdict::Failed(ExceptionStep::PayStatus));
        let v = evaluate_statuses(P::Success, S::Failure, N::Failure);
        assert_eq!(v, StatusVerdict::Failed(ExceptionStep::SplitStatus));
        let v = evaluate_statuses(P::Success, S::Processing, N::Failure);
        assert_eq!(v, StatusVerdict::Failed(ExceptionStep::NotifyStatus));
        let v = evaluate_statuses(P::Processing, S::Success, N::Success);
        assert_eq!(v, StatusVerdict::Pending);
        let v = evaluate_statuses(P::Success, S::Success, N::Processing);
        assert_eq!(v, StatusVerdict::Pending);
        let v = evaluate_statuses(P::Success, S::Success, N::Success);
        assert_eq!(v, StatusVerdict::Settled);
        assert_eq!(v.recon_status(), ReconStatus::Success);
    }

    #[test]
    fn amounts_balance() {
        let splits = split_total(vec![amt(dec!(60.00)), amt(dec!(35.00))]).unwrap();
        assert_eq!(splits, amt(dec!(95.00)));
        let ok = check_amounts(amt(dec!(100.00)), splits, amt(dec!(3.00)), amt(dec!(2.00)), amt(dec!(0.01)));
        assert!(ok.is_ok());
    }

    #[test]
    fn tolerance_is_inclusive() {
        let tol = amt(dec!(0.01));
        let pay = amt(dec!(100.00));
        let ok = check_amounts(pay, amt(dec!(94.99)), amt(dec!(3.00)), amt(dec!(2.00)), tol);
        assert!(ok.is_ok());
        let err = check_amounts(pay, amt(dec!(94.98)), amt(dec!(3.00)), amt(dec!(2.00)), tol);
        assert_eq!(err, Err(AmountCheckError::Mismatch(amt(dec!(0.02)))));
        let err = check_amounts(pay, amt(dec!(95.02)), amt(dec!(3.00)), amt(dec!(2.00)), tol);
        assert_eq!(err, Err(AmountCheckError::Mismatch(amt(dec!(-0.02)))));
    }

    #[test]
    fn no_splits() {
        let splits = split_total(Vec::<Amount>::new()).unwrap();
        assert!(splits.is_zero());
        let ok = check_amounts(amt(dec!(50)), splits, amt(dec!(49.5)), amt(dec!(0.5)), Amount::ZERO);
        assert!(ok.is_ok());
    }

    #[test]
    fn oversized_amounts_fail_instead_of_panicking() {
        let max = amt(rust_decimal::Decimal::MAX);
        assert_eq!(split_total(vec![max, amt(dec!(1))]), Err(AmountOverflow));
        let err = check_amounts(amt(dec!(10)), max, amt(dec!(1)), Amount::ZERO, Amount::ZERO);
        assert_eq!(err, Err(AmountCheckError::Overflow));
        let err = check_amounts(-max, Amount::ZERO, Amount::ZERO, amt(dec!(1)), Amount::ZERO);
        assert_eq!(err, Err(AmountCheckError::Overflow));
        let message = amount_mismatch_message(amt(dec!(10)), max, amt(dec!(1)), Amount::ZERO);
        assert!(message.contains("too large"));
    }
}
