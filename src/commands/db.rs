use crate::commands::settings::{ensure_data_dir, load_effective_settings, ValidationMode, DATA_DIR_NAME};
use crate::error::{DebtError, Result};
use crate::models::debt::{Debt, DebtStatus, DebtType, NewDebt, PaymentMethod};
use crate::repository::{DebtFilter, DebtRepository};
use log::{debug, info};
use rust_decimal::Decimal;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, Type, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use std::path::Path;
use std::str::FromStr;

const DB_SCHEMA_VERSION: i64 = 2;

const DEBT_COLUMNS: &str = "debt_id, person_name, amount, debt_type, date_created, due_date, status, description, payment_method, contact_info, date_updated, currency, is_settled, amount_paid";

pub fn initialize_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
         PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;",
    )?;

    let mut version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if version < 1 {
        apply_migration_1(conn)?;
        version = 1;
        conn.pragma_update(None, "user_version", version)?;
        info!("Applied debts schema migration 1");
    }

    if version < 2 {
        apply_migration_2(conn)?;
        version = 2;
        conn.pragma_update(None, "user_version", version)?;
        info!("Applied debts schema migration 2");
    }

    if version > DB_SCHEMA_VERSION {
        // Written by a newer build; keep going as long as the columns we use exist.
        debug!("Database user_version {version} is newer than {DB_SCHEMA_VERSION}");
    }

    Ok(())
}

fn apply_migration_1(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS debts (
            debt_id INTEGER PRIMARY KEY AUTOINCREMENT,
            person_name TEXT NOT NULL,
            amount TEXT NOT NULL,
            debt_type TEXT NOT NULL CHECK(debt_type IN ('OWED_TO_ME', 'I_OWE')),
            date_created INTEGER NOT NULL,
            due_date INTEGER,
            status TEXT NOT NULL CHECK(status IN ('PENDING', 'PARTIALLY_PAID', 'PAID', 'OVERDUE')) DEFAULT 'PENDING',
            description TEXT,
            payment_method TEXT CHECK(payment_method IN ('CASH', 'MOBILE_MONEY', 'BANK_TRANSFER')),
            contact_info TEXT,
            date_updated INTEGER NOT NULL,
            currency TEXT NOT NULL DEFAULT 'KES',
            is_settled INTEGER NOT NULL DEFAULT 0,
            amount_paid TEXT NOT NULL DEFAULT '0'
        );
        ",
    )
}

fn apply_migration_2(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE INDEX IF NOT EXISTS idx_debts_debt_type ON debts(debt_type);
        CREATE INDEX IF NOT EXISTS idx_debts_status ON debts(status);
        CREATE INDEX IF NOT EXISTS idx_debts_person_name ON debts(person_name COLLATE NOCASE);
        ",
    )
}

pub fn get_db_connection(data_dir: &str) -> Result<Connection> {
    ensure_data_dir(data_dir)?;
    let db_path = Path::new(data_dir).join(DATA_DIR_NAME).join("debts.db");
    let conn = Connection::open(db_path)?;
    initialize_schema(&conn)?;
    Ok(conn)
}

macro_rules! impl_sql_text_enum {
    ($($ty:ty),*) => {
        $(
            impl ToSql for $ty {
                fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                    Ok(ToSqlOutput::from(self.as_str()))
                }
            }

            impl FromSql for $ty {
                fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                    value
                        .as_str()?
                        .parse()
                        .map_err(|e: String| FromSqlError::Other(e.into()))
                }
            }
        )*
    };
}

impl_sql_text_enum!(DebtType, DebtStatus, PaymentMethod);

fn decimal_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    let raw: String = row.get(idx)?;
    Decimal::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn debt_from_row(row: &Row<'_>) -> rusqlite::Result<Debt> {
    Ok(Debt {
        id: Some(row.get(0)?),
        person_name: row.get(1)?,
        amount: decimal_column(row, 2)?,
        debt_type: row.get(3)?,
        date_created: row.get(4)?,
        due_date: row.get(5)?,
        status: row.get(6)?,
        description: row.get(7)?,
        payment_method: row.get(8)?,
        contact_info: row.get(9)?,
        date_updated: row.get(10)?,
        currency: row.get(11)?,
        is_settled: row.get::<_, i32>(12)? != 0,
        amount_paid: decimal_column(row, 13)?,
    })
}

/// SQLite-backed [`DebtRepository`]. Strict mode validates every write.
pub struct SqliteDebtRepository {
    conn: Connection,
    validation_mode: ValidationMode,
}

impl SqliteDebtRepository {
    /// Expects a connection whose schema is already initialized.
    pub fn new(conn: Connection, validation_mode: ValidationMode) -> Self {
        Self {
            conn,
            validation_mode,
        }
    }

    pub fn open_in_memory(validation_mode: ValidationMode) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self::new(conn, validation_mode))
    }

    fn check(&self, debt: &Debt) -> Result<()> {
        match self.validation_mode {
            ValidationMode::Strict => debt.validate(),
            ValidationMode::Permissive => Ok(()),
        }
    }
}

impl DebtRepository for SqliteDebtRepository {
    fn insert(&self, debt: &mut Debt) -> Result<i64> {
        if let Some(id) = debt.id {
            return Err(DebtError::AlreadyPersisted(id));
        }
        self.check(debt)?;

        self.conn.execute(
            "INSERT INTO debts (person_name, amount, debt_type, date_created, due_date, status, description, payment_method, contact_info, date_updated, currency, is_settled, amount_paid) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13)",
            params![
                &debt.person_name,
                debt.amount.to_string(),
                debt.debt_type,
                debt.date_created,
                debt.due_date,
                debt.status,
                debt.description.as_deref(),
                debt.payment_method,
                debt.contact_info.as_deref(),
                debt.date_updated,
                &debt.currency,
                debt.is_settled as i32,
                debt.amount_paid.to_string(),
            ],
        )?;

        let id = self.conn.last_insert_rowid();
        debt.id = Some(id);
        info!("Inserted debt {id} ({})", debt.debt_type);
        Ok(id)
    }

    fn update(&self, debt: &Debt) -> Result<()> {
        let id = debt.id.ok_or(DebtError::MissingId)?;
        self.check(debt)?;

        let changed = self.conn.execute(
            "UPDATE debts SET person_name=?2, amount=?3, debt_type=?4, date_created=?5, due_date=?6, status=?7, description=?8, payment_method=?9, contact_info=?10, date_updated=?11, currency=?12, is_settled=?13, amount_paid=?14 WHERE debt_id=?1",
            params![
                id,
                &debt.person_name,
                debt.amount.to_string(),
                debt.debt_type,
                debt.date_created,
                debt.due_date,
                debt.status,
                debt.description.as_deref(),
                debt.payment_method,
                debt.contact_info.as_deref(),
                debt.date_updated,
                &debt.currency,
                debt.is_settled as i32,
                debt.amount_paid.to_string(),
            ],
        )?;

        if changed == 0 {
            return Err(DebtError::NotFound(id));
        }
        debug!("Updated debt {id} -> {}", debt.status);
        Ok(())
    }

    fn delete(&self, id: i64) -> Result<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM debts WHERE debt_id = ?1", params![id])?;
        if removed > 0 {
            info!("Deleted debt {id}");
        }
        Ok(removed > 0)
    }

    fn get(&self, id: i64) -> Result<Option<Debt>> {
        let debt = self
            .conn
            .query_row(
                &format!("SELECT {DEBT_COLUMNS} FROM debts WHERE debt_id = ?1"),
                params![id],
                debt_from_row,
            )
            .optional()?;
        Ok(debt)
    }

    fn list(&self) -> Result<Vec<Debt>> {
        self.query(&DebtFilter::default())
    }

    fn query(&self, filter: &DebtFilter) -> Result<Vec<Debt>> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<&dyn ToSql> = Vec::new();

        if let Some(debt_type) = &filter.debt_type {
            clauses.push("debt_type = ?");
            values.push(debt_type);
        }
        if let Some(status) = &filter.status {
            clauses.push("status = ?");
            values.push(status);
        }
        if let Some(person_name) = &filter.person_name {
            clauses.push("person_name = ? COLLATE NOCASE");
            values.push(person_name);
        }

        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };
        let sql = format!(
            "SELECT {DEBT_COLUMNS} FROM debts{where_clause} ORDER BY date_created DESC, debt_id DESC"
        );
        debug!("Querying debts: {sql}");

        let mut stmt = self.conn.prepare(&sql)?;
        let debts = stmt
            .query_map(&values[..], debt_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(debts)
    }
}

fn open_repository(data_dir: &str, validation_mode: ValidationMode) -> Result<SqliteDebtRepository> {
    let conn = get_db_connection(data_dir)?;
    Ok(SqliteDebtRepository::new(conn, validation_mode))
}

fn load_existing(repo: &SqliteDebtRepository, id: i64) -> Result<Debt> {
    repo.get(id)?.ok_or(DebtError::NotFound(id))
}

pub async fn create_debt(data_dir: String, new_debt: NewDebt) -> std::result::Result<Debt, String> {
    let settings = load_effective_settings(&data_dir).map_err(|e| e.to_string())?;
    let repo = open_repository(&data_dir, settings.validation_mode).map_err(|e| e.to_string())?;

    let mut debt = new_debt.into_debt(&settings.default_currency);
    repo.insert(&mut debt).map_err(|e| format!("Insert error: {e}"))?;
    Ok(debt)
}

/// Generic CRUD dispatcher. `create` and `update` take a [`NewDebt`] payload,
/// never a full `Debt`; `update` applies it onto the stored row named by `id`.
pub async fn debt_crud(
    data_dir: String,
    operation: String,
    item: Option<NewDebt>,
    id: Option<i64>,
) -> std::result::Result<serde_json::Value, String> {
    let settings = load_effective_settings(&data_dir).map_err(|e| e.to_string())?;
    let repo = open_repository(&data_dir, settings.validation_mode).map_err(|e| e.to_string())?;

    match operation.as_str() {
        "create" => {
            let item = item.ok_or("Item required for create")?;
            let mut debt = item.into_debt(&settings.default_currency);
            let id = repo
                .insert(&mut debt)
                .map_err(|e| format!("Insert error: {e}"))?;
            Ok(serde_json::json!({"status": "created", "id": id}))
        }
        "update" => {
            let item = item.ok_or("Item required for update")?;
            let id = id.ok_or("ID required for update")?;
            let mut debt = load_existing(&repo, id).map_err(|e| format!("Update error: {e}"))?;
            item.apply_to(&mut debt);
            debt.touch(chrono::Utc::now().timestamp());
            repo.update(&debt).map_err(|e| format!("Update error: {e}"))?;
            Ok(serde_json::json!({"status": "updated", "id": id}))
        }
        "read" => {
            let id = id.ok_or("ID required for read")?;
            let item = repo.get(id).map_err(|e| format!("Read error: {e}"))?;
            serde_json::to_value(item).map_err(|e| format!("Serialize error: {e}"))
        }
        "list" => {
            let items = repo.list().map_err(|e| format!("Query error: {e}"))?;
            serde_json::to_value(items).map_err(|e| format!("Serialize error: {e}"))
        }
        "delete" => {
            let id = id.ok_or("ID required for delete")?;
            let removed = repo.delete(id).map_err(|e| format!("Delete error: {e}"))?;
            Ok(serde_json::json!({"status": "deleted", "removed": removed}))
        }
        _ => Err(format!("Unknown operation: {operation}")),
    }
}

pub async fn query_debts(data_dir: String, filter: DebtFilter) -> std::result::Result<Vec<Debt>, String> {
    let repo = open_repository(&data_dir, ValidationMode::Permissive).map_err(|e| e.to_string())?;
    repo.query(&filter).map_err(|e| format!("Query error: {e}"))
}

pub async fn record_payment(
    data_dir: String,
    id: i64,
    amount_paid: Decimal,
) -> std::result::Result<Debt, String> {
    let settings = load_effective_settings(&data_dir).map_err(|e| e.to_string())?;
    let repo = open_repository(&data_dir, settings.validation_mode).map_err(|e| e.to_string())?;

    let mut debt = load_existing(&repo, id).map_err(|e| e.to_string())?;
    debt.record_payment(amount_paid);
    if settings.refresh_updated_on_payment {
        debt.touch(chrono::Utc::now().timestamp());
    }
    repo.update(&debt).map_err(|e| format!("Update error: {e}"))?;
    Ok(debt)
}

pub async fn mark_settled(data_dir: String, id: i64, settled: bool) -> std::result::Result<Debt, String> {
    let settings = load_effective_settings(&data_dir).map_err(|e| e.to_string())?;
    let repo = open_repository(&data_dir, settings.validation_mode).map_err(|e| e.to_string())?;

    let mut debt = load_existing(&repo, id).map_err(|e| e.to_string())?;
    debt.mark_settled(settled);
    if settings.refresh_updated_on_payment {
        debt.touch(chrono::Utc::now().timestamp());
    }
    repo.update(&debt).map_err(|e| format!("Update error: {e}"))?;
    Ok(debt)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> SqliteDebtRepository {
        SqliteDebtRepository::open_in_memory(ValidationMode::Permissive).expect("in-memory repo")
    }

    #[test]
    fn schema_initializes_with_expected_version() {
        let conn = Connection::open_in_memory().expect("in-memory db");
        initialize_schema(&conn).expect("schema init");
        let version: i64 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .expect("schema version");
        assert_eq!(version, DB_SCHEMA_VERSION);
    }

    #[test]
    fn newer_schema_version_is_tolerated() {
        let conn = Connection::open_in_memory().expect("in-memory db");
        initialize_schema(&conn).expect("schema init");
        conn.pragma_update(None, "user_version", DB_SCHEMA_VERSION + 5)
            .expect("bump version");

        initialize_schema(&conn).expect("re-init");
        let version: i64 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .expect("schema version");
        assert_eq!(version, DB_SCHEMA_VERSION + 5);
    }

    #[test]
    fn insert_assigns_id_once_and_round_trips_all_fields() {
        let repo = repo();
        let mut debt = Debt::new("Alice", Decimal::new(100_050, 2), DebtType::IOwe);
        debt.set_due_date(Some(1_900_000_000));
        debt.set_description(Some("Rent share".to_string()));
        debt.set_payment_method(Some(PaymentMethod::BankTransfer));
        debt.set_contact_info(Some("+254700000000".to_string()));
        debt.record_payment(Decimal::new(40_025, 2));

        let id = repo.insert(&mut debt).expect("insert");
        assert_eq!(debt.id(), Some(id));
        assert!(matches!(
            repo.insert(&mut debt),
            Err(DebtError::AlreadyPersisted(existing)) if existing == id
        ));

        let loaded = repo.get(id).expect("get").expect("debt exists");
        assert_eq!(loaded, debt);
        assert_eq!(loaded.status(), DebtStatus::PartiallyPaid);
        assert_eq!(loaded.remaining_amount(), Decimal::new(60_025, 2));
    }

    #[test]
    fn update_requires_an_existing_row() {
        let repo = repo();
        let mut debt = Debt::new("Bob", Decimal::from(50), DebtType::OwedToMe);
        assert!(matches!(repo.update(&debt), Err(DebtError::MissingId)));

        repo.insert(&mut debt).expect("insert");
        debt.record_payment(Decimal::from(50));
        repo.update(&debt).expect("update");

        let loaded = repo.get(debt.id().expect("id")).expect("get").expect("exists");
        assert_eq!(loaded.status(), DebtStatus::Paid);
        assert!(loaded.is_settled());

        assert!(repo.delete(debt.id().expect("id")).expect("delete"));
        assert!(matches!(repo.update(&debt), Err(DebtError::NotFound(_))));
        assert!(!repo.delete(debt.id().expect("id")).expect("second delete"));
    }

    #[test]
    fn query_combines_type_status_and_person() {
        let repo = repo();
        let mut a = Debt::new("Alice", Decimal::from(100), DebtType::IOwe);
        let mut b = Debt::new("alice", Decimal::from(200), DebtType::OwedToMe);
        let mut c = Debt::new("Carol", Decimal::from(300), DebtType::OwedToMe);
        b.record_payment(Decimal::from(20));
        for debt in [&mut a, &mut b, &mut c] {
            repo.insert(debt).expect("insert");
        }

        assert_eq!(repo.list().expect("list").len(), 3);
        assert_eq!(repo.find_by_person("ALICE").expect("by person").len(), 2);
        assert_eq!(repo.find_by_type(DebtType::OwedToMe).expect("by type").len(), 2);

        let partial = repo
            .find_by_status(DebtStatus::PartiallyPaid)
            .expect("by status");
        assert_eq!(partial.len(), 1);
        assert_eq!(partial[0].id(), b.id());

        let narrowed = repo
            .query(&DebtFilter {
                debt_type: Some(DebtType::OwedToMe),
                status: Some(DebtStatus::Pending),
                person_name: None,
            })
            .expect("combined");
        assert_eq!(narrowed.len(), 1);
        assert_eq!(narrowed[0].person_name(), "Carol");
    }

    #[test]
    fn list_returns_newest_first() {
        let repo = repo();
        let mut first = Debt::new("First", Decimal::from(1), DebtType::IOwe);
        let mut second = Debt::new("Second", Decimal::from(2), DebtType::IOwe);
        repo.insert(&mut first).expect("insert first");
        repo.insert(&mut second).expect("insert second");

        let names: Vec<String> = repo
            .list()
            .expect("list")
            .iter()
            .map(|debt| debt.person_name().to_string())
            .collect();
        assert_eq!(names, vec!["Second".to_string(), "First".to_string()]);
    }

    #[test]
    fn externally_written_overdue_status_is_loaded() {
        let repo = repo();
        let mut debt = Debt::new("Dan", Decimal::from(10), DebtType::OwedToMe);
        let id = repo.insert(&mut debt).expect("insert");

        repo.conn
            .execute(
                "UPDATE debts SET status = 'OVERDUE' WHERE debt_id = ?1",
                params![id],
            )
            .expect("sweep");

        let overdue = repo.find_by_status(DebtStatus::Overdue).expect("by status");
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].status(), DebtStatus::Overdue);
    }

    #[test]
    fn strict_mode_rejects_invalid_writes_permissive_accepts_them() {
        let strict = SqliteDebtRepository::open_in_memory(ValidationMode::Strict).expect("repo");
        let mut nameless = Debt::new("", Decimal::from(10), DebtType::IOwe);
        assert!(matches!(
            strict.insert(&mut nameless),
            Err(DebtError::EmptyPersonName)
        ));
        assert_eq!(nameless.id(), None);

        let mut negative = Debt::new("Eve", Decimal::from(-10), DebtType::IOwe);
        assert!(matches!(
            strict.insert(&mut negative),
            Err(DebtError::NegativeAmount(_))
        ));

        let permissive = repo();
        permissive.insert(&mut negative).expect("permissive insert");
        assert!(negative.id().is_some());
    }
}
