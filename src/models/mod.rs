use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

mod lenient;

/// Money in whole currency units. The backend never deals in fractions of a unit.
pub type Amount = i64;

// ============================================================================
// Finance API Models
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum DiscountType {
    #[default]
    None,
    Onetime,
    Installments,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InstallmentStatus {
    Pending,
    Partial,
    Paid,
    Overdue,
}

impl fmt::Display for InstallmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            InstallmentStatus::Pending => "Pending",
            InstallmentStatus::Partial => "Partial",
            InstallmentStatus::Paid => "Paid",
            InstallmentStatus::Overdue => "Overdue",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Installment {
    #[serde(alias = "installmentNumber")]
    pub installment_no: u32,
    #[serde(deserialize_with = "lenient::date")]
    pub due_date: NaiveDate,
    #[serde(default, deserialize_with = "lenient::amount")]
    pub amount: Amount,
    #[serde(default, deserialize_with = "lenient::amount")]
    pub paid_amount: Amount,
    #[serde(default, deserialize_with = "lenient::optional_date")]
    pub paid_date: Option<NaiveDate>,
}

impl Installment {
    pub fn new(installment_no: u32, due_date: NaiveDate, amount: Amount) -> Self {
        Self {
            installment_no,
            due_date,
            amount,
            paid_amount: 0,
            paid_date: None,
        }
    }

    /// Portion of `amount` still owed, never negative.
    pub fn pending_amount(&self) -> Amount {
        (self.amount.max(0) - self.settled_amount()).max(0)
    }

    /// Portion of `amount` covered by payments. Overpayment is not counted here,
    /// so `settled_amount() + pending_amount() == amount` always holds.
    pub fn settled_amount(&self) -> Amount {
        self.paid_amount.clamp(0, self.amount.max(0))
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeConfiguration {
    #[serde(default, deserialize_with = "lenient::amount")]
    pub base_fees: Amount,
    #[serde(default, deserialize_with = "lenient::discount_type")]
    pub discount_type: DiscountType,
    #[serde(default, deserialize_with = "lenient::amount")]
    pub discount_value: Amount,
    #[serde(default)]
    pub installments: Vec<Installment>,
}

impl FeeConfiguration {
    pub fn final_fees(&self) -> Amount {
        crate::ledger::compute_final_fees(self.base_fees, self.discount_value)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    #[serde(default, alias = "_id")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient::amount")]
    pub amount: Amount,
    #[serde(alias = "date", deserialize_with = "lenient::date")]
    pub payment_date: NaiveDate,
    #[serde(default)]
    pub installment_no: Option<u32>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub receipt_no: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentInfo {
    #[serde(alias = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub roll_no: Option<String>,
    #[serde(default)]
    pub batch_name: Option<String>,
}

/// Body of `GET /api/finance/student/:studentId/fees`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StudentFeeRecord {
    pub student: StudentInfo,
    #[serde(default)]
    pub fees: FeeConfiguration,
    #[serde(default)]
    pub payments: Vec<Payment>,
}

// ============================================================================
// Result Import Models
// ============================================================================

/// One parsed result row: header -> cell, in column order. Blank cells are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ResultRow {
    cells: IndexMap<String, Option<String>>,
}

impl ResultRow {
    pub fn insert(&mut self, header: impl Into<String>, value: Option<String>) {
        self.cells.insert(header.into(), value);
    }

    pub fn get(&self, header: &str) -> Option<&str> {
        self.cells.get(header).and_then(|v| v.as_deref())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.cells.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Body of `POST /api/tests/:testId/results/import`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResponse {
    pub total: usize,
    pub verified: usize,
    pub rejected: usize,
    #[serde(default)]
    pub message: String,
    #[serde(default, alias = "rejectedRows", alias = "errors")]
    pub rejections: Vec<RowRejection>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowRejection {
    #[serde(default)]
    pub row: Option<usize>,
    #[serde(default, alias = "rollNo", alias = "studentId")]
    pub student: Option<String>,
    #[serde(default, alias = "error", alias = "message")]
    pub reason: String,
}

impl fmt::Display for RowRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.row, &self.student) {
            (Some(row), Some(student)) => write!(f, "Row {} ({}): {}", row, student, self.reason),
            (Some(row), None) => write!(f, "Row {}: {}", row, self.reason),
            (None, Some(student)) => write!(f, "{}: {}", student, self.reason),
            (None, None) => f.write_str(&self.reason),
        }
    }
}

/// A row dropped locally before submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRow {
    pub line: usize,
    pub reason: String,
}

impl fmt::Display for SkippedRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Line {}: {}", self.line, self.reason)
    }
}

#[derive(Debug, Clone)]
pub struct IngestSummary {
    pub test_id: String,
    pub submitted: usize,
    pub skipped: Vec<SkippedRow>,
    pub response: ImportResponse,
}

impl IngestSummary {
    pub fn verified_percentage(&self) -> f64 {
        if self.response.total > 0 {
            (self.response.verified as f64 / self.response.total as f64) * 100.0
        } else {
            0.0
        }
    }

    pub fn has_problems(&self) -> bool {
        self.response.rejected > 0 || !self.skipped.is_empty()
    }
}

// ============================================================================
// Notifications
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
    pub details: Vec<String>,
}

impl Notification {
    pub fn new(level: NotificationLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            details: Vec::new(),
        }
    }

    pub fn with_details(mut self, details: Vec<String>) -> Self {
        self.details = details;
        self
    }
}
