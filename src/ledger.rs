use crate::models::{
    Amount, DiscountType, FeeConfiguration, Installment, InstallmentStatus, Payment, StudentFeeRecord,
    StudentInfo,
};
use chrono::NaiveDate;
use tracing::{debug, warn};

/// Base fees minus an absolute discount, never below zero.
pub fn compute_final_fees(base_fees: Amount, discount_value: Amount) -> Amount {
    base_fees.saturating_sub(discount_value).max(0)
}

/// Sum of amounts, pinned at `Amount::MAX` instead of overflowing.
fn total(amounts: impl IntoIterator<Item = Amount>) -> Amount {
    amounts.into_iter().fold(0, Amount::saturating_add)
}

/// Status of one installment as of `today`.
///
/// Order matters: a fully paid installment is `Paid` even when its due date
/// has passed, and a zero-amount installment is always `Paid`.
pub fn derive_installment_status(installment: &Installment, today: NaiveDate) -> InstallmentStatus {
    let paid = installment.paid_amount.max(0);

    if installment.amount <= 0 || paid >= installment.amount {
        InstallmentStatus::Paid
    } else if installment.due_date < today {
        InstallmentStatus::Overdue
    } else if paid > 0 {
        InstallmentStatus::Partial
    } else {
        InstallmentStatus::Pending
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FinanceTotals {
    pub total_collected: Amount,
    pub total_pending: Amount,
}

/// Collected and pending totals for a student.
///
/// With an installment plan the collected figure is the sum of installment
/// payments; without one it falls back to the raw payment history.
pub fn aggregate_student_finance(fees: &FeeConfiguration, payments: &[Payment]) -> FinanceTotals {
    let total_collected: Amount = if fees.installments.is_empty() {
        total(payments.iter().map(|p| p.amount.max(0)))
    } else {
        total(fees.installments.iter().map(|i| i.paid_amount.max(0)))
    };

    FinanceTotals {
        total_collected,
        total_pending: (fees.final_fees() - total_collected).max(0),
    }
}

impl FinanceTotals {
    /// Count money received that no installment absorbed.
    fn with_unallocated(self, final_fees: Amount, unallocated: Amount) -> Self {
        let total_collected = self.total_collected.saturating_add(unallocated);
        Self {
            total_collected,
            total_pending: (final_fees - total_collected).max(0),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    pub installments: Vec<Installment>,
    /// Money received beyond what the plan can absorb.
    pub unallocated: Amount,
}

/// Rebuild installment `paid_amount`/`paid_date` from the payment history.
///
/// Payments apply in date order. A payment that names an installment goes
/// there first and spills into later installments; an unattributed payment
/// fills the plan from the first installment. No installment is ever credited
/// beyond its `amount`.
pub fn allocate_payments(installments: &[Installment], payments: &[Payment]) -> Allocation {
    let mut plan: Vec<Installment> = installments
        .iter()
        .cloned()
        .map(|mut installment| {
            installment.paid_amount = 0;
            installment.paid_date = None;
            installment
        })
        .collect();
    plan.sort_by_key(|i| i.installment_no);

    let mut ordered: Vec<&Payment> = payments.iter().collect();
    ordered.sort_by_key(|p| p.payment_date);

    let mut unallocated: Amount = 0;

    for payment in ordered {
        let mut remaining = payment.amount.max(0);

        let target = payment
            .installment_no
            .and_then(|no| plan.iter().position(|i| i.installment_no == no));

        if let Some(index) = target {
            remaining = credit(&mut plan[index], remaining, payment.payment_date);
        }

        let spill_from = target.map_or(0, |index| index + 1);
        for installment in plan[spill_from..].iter_mut() {
            if remaining == 0 {
                break;
            }
            remaining = credit(installment, remaining, payment.payment_date);
        }

        if remaining > 0 {
            debug!(
                payment = ?payment.id,
                remaining,
                "payment exceeds the installment plan"
            );
        }
        unallocated = unallocated.saturating_add(remaining);
    }

    Allocation {
        installments: plan,
        unallocated,
    }
}

/// Apply up to `amount` to an installment, returning what is left over.
fn credit(installment: &mut Installment, amount: Amount, date: NaiveDate) -> Amount {
    let room = (installment.amount - installment.paid_amount).max(0);
    let applied = amount.min(room);
    if applied == 0 {
        return amount;
    }

    installment.paid_amount += applied;
    if installment.paid_amount >= installment.amount && installment.paid_date.is_none() {
        installment.paid_date = Some(date);
    }
    amount - applied
}

// ============================================================================
// Statement view
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct InstallmentLine {
    pub installment_no: u32,
    pub due_date: NaiveDate,
    pub amount: Amount,
    pub paid: Amount,
    pub pending: Amount,
    pub paid_date: Option<NaiveDate>,
    pub status: InstallmentStatus,
}

impl InstallmentLine {
    fn from_installment(installment: &Installment, today: NaiveDate) -> Self {
        Self {
            installment_no: installment.installment_no,
            due_date: installment.due_date,
            amount: installment.amount.max(0),
            paid: installment.settled_amount(),
            pending: installment.pending_amount(),
            paid_date: installment.paid_date,
            status: derive_installment_status(installment, today),
        }
    }
}

/// Everything the fee screen and the statement export show for one student.
#[derive(Debug, Clone)]
pub struct FeeStatement {
    pub student: StudentInfo,
    pub as_of: NaiveDate,
    pub base_fees: Amount,
    pub discount_type: DiscountType,
    pub discount_value: Amount,
    pub final_fees: Amount,
    pub totals: FinanceTotals,
    pub lines: Vec<InstallmentLine>,
    pub unallocated: Amount,
    /// `sum(installment amounts) - final_fees`; zero for a consistent plan.
    pub plan_mismatch: Amount,
}

impl FeeStatement {
    /// Build the statement as of `today`.
    ///
    /// When the record carries a payment history the installment credits are
    /// re-derived from it; otherwise the backend's `paidAmount` values are used.
    /// Either way `totals.total_collected` is all money received, overpayment included.
    pub fn build(record: &StudentFeeRecord, today: NaiveDate) -> Self {
        let mut fees = record.fees.clone();
        let mut unallocated = 0;

        if !record.payments.is_empty() && !fees.installments.is_empty() {
            let allocation = allocate_payments(&fees.installments, &record.payments);
            fees.installments = allocation.installments;
            unallocated = allocation.unallocated;
        } else {
            fees.installments.sort_by_key(|i| i.installment_no);
        }

        let final_fees = fees.final_fees();
        let totals = aggregate_student_finance(&fees, &record.payments)
            .with_unallocated(final_fees, unallocated);

        let scheduled = total(fees.installments.iter().map(|i| i.amount.max(0)));
        let plan_mismatch = if fees.installments.is_empty() {
            0
        } else {
            scheduled - final_fees
        };
        if plan_mismatch != 0 {
            warn!(
                student = %record.student.id,
                scheduled,
                final_fees,
                "installment plan does not add up to final fees"
            );
        }

        let lines = fees
            .installments
            .iter()
            .map(|i| InstallmentLine::from_installment(i, today))
            .collect();

        Self {
            student: record.student.clone(),
            as_of: today,
            base_fees: fees.base_fees,
            discount_type: fees.discount_type,
            discount_value: fees.discount_value,
            final_fees,
            totals,
            lines,
            unallocated,
            plan_mismatch,
        }
    }

    pub fn overdue_lines(&self) -> impl Iterator<Item = &InstallmentLine> {
        self.lines
            .iter()
            .filter(|l| l.status == InstallmentStatus::Overdue)
    }

    pub fn overdue_amount(&self) -> Amount {
        total(self.overdue_lines().map(|l| l.pending))
    }

    /// Earliest installment still owed that is not yet overdue.
    pub fn next_due(&self) -> Option<&InstallmentLine> {
        self.lines
            .iter()
            .filter(|l| matches!(l.status, InstallmentStatus::Pending | InstallmentStatus::Partial))
            .min_by_key(|l| l.due_date)
    }
}
