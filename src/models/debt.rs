use crate::error::{DebtError, Result};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Currency assigned to new debts unless the caller or settings override it.
pub const DEFAULT_CURRENCY: &str = "KES";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DebtType {
    OwedToMe,
    IOwe,
}

impl DebtType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DebtType::OwedToMe => "OWED_TO_ME",
            DebtType::IOwe => "I_OWE",
        }
    }
}

impl FromStr for DebtType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "OWED_TO_ME" => Ok(DebtType::OwedToMe),
            "I_OWE" => Ok(DebtType::IOwe),
            other => Err(format!("Unknown debt type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DebtStatus {
    Pending,
    PartiallyPaid,
    Paid,
    /// Never derived here; assigned by whatever sweeps due dates.
    Overdue,
}

impl DebtStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DebtStatus::Pending => "PENDING",
            DebtStatus::PartiallyPaid => "PARTIALLY_PAID",
            DebtStatus::Paid => "PAID",
            DebtStatus::Overdue => "OVERDUE",
        }
    }
}

impl FromStr for DebtStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(DebtStatus::Pending),
            "PARTIALLY_PAID" => Ok(DebtStatus::PartiallyPaid),
            "PAID" => Ok(DebtStatus::Paid),
            "OVERDUE" => Ok(DebtStatus::Overdue),
            other => Err(format!("Unknown debt status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Cash,
    MobileMoney,
    BankTransfer,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "CASH",
            PaymentMethod::MobileMoney => "MOBILE_MONEY",
            PaymentMethod::BankTransfer => "BANK_TRANSFER",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "CASH" => Ok(PaymentMethod::Cash),
            "MOBILE_MONEY" => Ok(PaymentMethod::MobileMoney),
            "BANK_TRANSFER" => Ok(PaymentMethod::BankTransfer),
            other => Err(format!("Unknown payment method: {other}")),
        }
    }
}

macro_rules! impl_display_via_as_str {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        })*
    };
}

impl_display_via_as_str!(DebtType, DebtStatus, PaymentMethod);

/// One debt between the user and another person.
///
/// `status` and `is_settled` follow `amount_paid` relative to `amount`; the
/// fields feeding that rule are only reachable through methods that re-run it.
/// The id belongs to the store: it is `None` until the debt is inserted.
/// Hosts send [`NewDebt`] payloads; a `Debt` is only ever built here or
/// loaded from storage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Debt {
    pub(crate) id: Option<i64>,
    pub(crate) person_name: String,
    pub(crate) amount: Decimal,
    pub(crate) debt_type: DebtType,
    pub(crate) date_created: i64,
    pub(crate) due_date: Option<i64>,
    pub(crate) status: DebtStatus,
    pub(crate) description: Option<String>,
    pub(crate) payment_method: Option<PaymentMethod>,
    pub(crate) contact_info: Option<String>,
    pub(crate) date_updated: i64,
    pub(crate) currency: String,
    pub(crate) is_settled: bool,
    pub(crate) amount_paid: Decimal,
}

impl Debt {
    pub fn new(person_name: impl Into<String>, amount: Decimal, debt_type: DebtType) -> Self {
        Self::with_currency(person_name, amount, debt_type, DEFAULT_CURRENCY)
    }

    pub fn with_currency(
        person_name: impl Into<String>,
        amount: Decimal,
        debt_type: DebtType,
        currency: impl Into<String>,
    ) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id: None,
            person_name: person_name.into(),
            amount,
            debt_type,
            date_created: now,
            due_date: None,
            status: DebtStatus::Pending,
            description: None,
            payment_method: None,
            contact_info: None,
            date_updated: now,
            currency: currency.into(),
            is_settled: false,
            amount_paid: Decimal::ZERO,
        }
    }

    pub fn id(&self) -> Option<i64> {
        self.id
    }

    pub fn person_name(&self) -> &str {
        &self.person_name
    }

    pub fn set_person_name(&mut self, person_name: impl Into<String>) {
        self.person_name = person_name.into();
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    /// Changes the principal and re-derives the status against the amount
    /// already paid.
    pub fn set_amount(&mut self, amount: Decimal) {
        self.amount = amount;
        self.apply_payment_rule();
    }

    pub fn debt_type(&self) -> DebtType {
        self.debt_type
    }

    pub fn set_debt_type(&mut self, debt_type: DebtType) {
        self.debt_type = debt_type;
    }

    pub fn date_created(&self) -> i64 {
        self.date_created
    }

    pub fn due_date(&self) -> Option<i64> {
        self.due_date
    }

    pub fn set_due_date(&mut self, due_date: Option<i64>) {
        self.due_date = due_date;
    }

    pub fn status(&self) -> DebtStatus {
        self.status
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn set_description(&mut self, description: Option<String>) {
        self.description = description;
    }

    pub fn payment_method(&self) -> Option<PaymentMethod> {
        self.payment_method
    }

    pub fn set_payment_method(&mut self, payment_method: Option<PaymentMethod>) {
        self.payment_method = payment_method;
    }

    pub fn contact_info(&self) -> Option<&str> {
        self.contact_info.as_deref()
    }

    pub fn set_contact_info(&mut self, contact_info: Option<String>) {
        self.contact_info = contact_info;
    }

    pub fn date_updated(&self) -> i64 {
        self.date_updated
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn set_currency(&mut self, currency: impl Into<String>) {
        self.currency = currency.into();
    }

    pub fn is_settled(&self) -> bool {
        self.is_settled
    }

    pub fn amount_paid(&self) -> Decimal {
        self.amount_paid
    }

    /// Records the cumulative amount paid so far (not a delta) and derives the
    /// status from it. Accepts any value, including negatives and overpayment.
    pub fn record_payment(&mut self, amount_paid: Decimal) {
        self.amount_paid = amount_paid;
        self.apply_payment_rule();
    }

    /// Manual override. `true` forces PAID whatever was paid; `false` only
    /// clears the flag and leaves the status where it is.
    pub fn mark_settled(&mut self, settled: bool) {
        self.is_settled = settled;
        if settled {
            self.status = DebtStatus::Paid;
        }
    }

    /// `amount - amount_paid`, negative when overpaid. Saturates at
    /// `Decimal::MAX`/`Decimal::MIN` instead of overflowing.
    pub fn remaining_amount(&self) -> Decimal {
        self.amount.saturating_sub(self.amount_paid)
    }

    /// Display string such as `KES 600.00`.
    pub fn formatted_amount(&self) -> String {
        let remaining = self
            .remaining_amount()
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        format!("{} {:.2}", self.currency, remaining)
    }

    /// Strict-mode checks. Nothing on the entity calls this; the store does
    /// when configured to.
    pub fn validate(&self) -> Result<()> {
        if self.person_name.trim().is_empty() {
            return Err(DebtError::EmptyPersonName);
        }
        if self.amount < Decimal::ZERO {
            return Err(DebtError::NegativeAmount(self.amount));
        }
        if self.amount_paid < Decimal::ZERO {
            return Err(DebtError::NegativeAmountPaid(self.amount_paid));
        }
        Ok(())
    }

    /// Stamps `date_updated`. The entity never calls this on its own.
    pub fn touch(&mut self, now: i64) {
        self.date_updated = now;
    }

    fn apply_payment_rule(&mut self) {
        if self.amount_paid >= self.amount {
            self.status = DebtStatus::Paid;
            self.is_settled = true;
        } else if self.amount_paid > Decimal::ZERO {
            self.status = DebtStatus::PartiallyPaid;
        } else {
            self.status = DebtStatus::Pending;
        }
    }
}

/// Payload a host sends to open a new debt. Absent `currency` means the
/// configured default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDebt {
    pub person_name: String,
    pub amount: Decimal,
    pub debt_type: DebtType,
    #[serde(default)]
    pub due_date: Option<i64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
    #[serde(default)]
    pub contact_info: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
}

impl NewDebt {
    pub fn into_debt(self, default_currency: &str) -> Debt {
        let currency = self.currency.unwrap_or_else(|| default_currency.to_string());
        let mut debt = Debt::with_currency(self.person_name, self.amount, self.debt_type, currency);
        debt.due_date = self.due_date;
        debt.description = self.description;
        debt.payment_method = self.payment_method;
        debt.contact_info = self.contact_info;
        debt
    }

    /// Overwrites the editable fields of a stored debt. Id, creation date and
    /// payment state stay as stored; a new amount re-derives the status.
    pub fn apply_to(self, debt: &mut Debt) {
        debt.set_person_name(self.person_name);
        debt.set_debt_type(self.debt_type);
        debt.set_due_date(self.due_date);
        debt.set_description(self.description);
        debt.set_payment_method(self.payment_method);
        debt.set_contact_info(self.contact_info);
        if let Some(currency) = self.currency {
            debt.set_currency(currency);
        }
        debt.set_amount(self.amount);
    }
}
