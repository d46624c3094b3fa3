//! Persistence seam. The entity knows nothing about storage; whatever owns
//! debts implements this trait.

use crate::error::Result;
use crate::models::debt::{Debt, DebtStatus, DebtType};
use serde::{Deserialize, Serialize};

/// Conjunction of optional criteria. An empty filter matches every debt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DebtFilter {
    pub debt_type: Option<DebtType>,
    pub status: Option<DebtStatus>,
    /// Case-insensitive exact match.
    pub person_name: Option<String>,
}

pub trait DebtRepository {
    /// Stores a new debt and writes the assigned id back into it.
    fn insert(&self, debt: &mut Debt) -> Result<i64>;

    /// Overwrites the stored row with `debt` as given, `date_updated` included.
    fn update(&self, debt: &Debt) -> Result<()>;

    fn delete(&self, id: i64) -> Result<bool>;

    fn get(&self, id: i64) -> Result<Option<Debt>>;

    /// Newest first.
    fn list(&self) -> Result<Vec<Debt>>;

    fn query(&self, filter: &DebtFilter) -> Result<Vec<Debt>>;

    fn find_by_type(&self, debt_type: DebtType) -> Result<Vec<Debt>> {
        self.query(&DebtFilter {
            debt_type: Some(debt_type),
            ..DebtFilter::default()
        })
    }

    fn find_by_status(&self, status: DebtStatus) -> Result<Vec<Debt>> {
        self.query(&DebtFilter {
            status: Some(status),
            ..DebtFilter::default()
        })
    }

    fn find_by_person(&self, person_name: &str) -> Result<Vec<Debt>> {
        self.query(&DebtFilter {
            person_name: Some(person_name.to_string()),
            ..DebtFilter::default()
        })
    }
}
