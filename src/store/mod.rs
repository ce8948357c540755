//! SQLite-backed invoice store.
//!
//! Persists invoices and payment attempts. Each invoice may have many payment
//! rows; the highest id is the authoritative one. Reads that show an invoice
//! together with its risk fields always join on that max-id row, never on an
//! aggregate across rows.
//!
//! No business validation lives here beyond uniqueness and foreign keys.

use crate::error::{Error, Result};
use crate::types::{
    Amount, Invoice, InvoiceStatus, InvoiceView, Payment, RiskAssessment, RiskLevel,
    UNKNOWN_PAYER,
};
use parking_lot::Mutex;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Schema SQL embedded at compile time.
const SCHEMA_SQL: &str = include_str!("schema.sql");

const INVOICE_COLUMNS: &str =
    "i.id, i.reference, i.customer_id, i.description, i.amount, i.currency, i.status, i.created_at";

const PAYMENT_COLUMNS: &str = "id, invoice_id, payer_wallet, tx_hash, chain_payer, \
     chain_timestamp, risk_score, risk_level, risk_reasons, created_at";

/// Fields of a new invoice.
#[derive(Debug, Clone)]
pub struct InvoiceDraft {
    /// Unique reference.
    pub reference: String,
    /// Owning customer.
    pub customer_id: i64,
    /// Free-form description.
    pub description: String,
    /// Amount due.
    pub amount: Amount,
    /// ISO currency code.
    pub currency: String,
}

/// Fields of a new payment attempt.
#[derive(Debug, Clone)]
pub struct NewPayment {
    /// Owning invoice.
    pub invoice_id: i64,
    /// Wallet the payer claimed.
    pub payer_wallet: String,
    /// Transaction hash, if already known.
    pub tx_hash: Option<String>,
    /// Risk assessment, if scored.
    pub risk: Option<RiskAssessment>,
}

/// Values written to the latest payment row after a successful confirmation.
#[derive(Debug, Clone)]
pub struct PaymentUpsert {
    /// The verified transaction.
    pub tx_hash: String,
    /// Sender observed on chain.
    pub chain_payer: Option<String>,
    /// Block timestamp observed on chain.
    pub chain_timestamp: Option<String>,
    /// Fresh risk assessment. `None` keeps whatever the row already holds.
    pub risk: Option<RiskAssessment>,
}

/// Invoice and payment persistence.
#[derive(Clone)]
pub struct InvoiceStore {
    conn: Arc<Mutex<Connection>>,
}

impl InvoiceStore {
    /// Open or create a database file. WAL mode is enabled.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        debug!("Opened {} (journal_mode={})", path.display(), mode);
        Self::initialize(conn)
    }

    /// Create an in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be applied.
    pub fn open_in_memory() -> Result<Self> {
        Self::initialize(Connection::open_in_memory()?)
    }

    fn initialize(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA_SQL)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        info!("Invoice store ready");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Insert a PENDING invoice.
    ///
    /// # Errors
    ///
    /// Returns `Error::Storage` on failure, including a duplicate reference
    /// (see [`is_unique_violation`]).
    pub fn insert_invoice(&self, draft: &InvoiceDraft) -> Result<Invoice> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO invoices (reference, customer_id, description, amount, currency, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                draft.reference,
                draft.customer_id,
                draft.description,
                draft.amount,
                draft.currency,
                InvoiceStatus::Pending,
            ],
        )?;
        let id = conn.last_insert_rowid();
        select_invoice(&conn, "i.id = ?1", params![id])?
            .ok_or_else(|| Error::Internal(format!("invoice {id} vanished after insert")))
    }

    /// Look up an invoice by reference.
    ///
    /// # Errors
    ///
    /// Returns `Error::Storage` on database failure.
    pub fn invoice_by_reference(&self, reference: &str) -> Result<Option<Invoice>> {
        select_invoice(&self.conn.lock(), "i.reference = ?1", params![reference])
    }

    /// Look up an invoice by id.
    ///
    /// # Errors
    ///
    /// Returns `Error::Storage` on database failure.
    pub fn invoice_by_id(&self, id: i64) -> Result<Option<Invoice>> {
        select_invoice(&self.conn.lock(), "i.id = ?1", params![id])
    }

    /// An invoice joined with its latest payment's risk fields.
    ///
    /// # Errors
    ///
    /// Returns `Error::Storage` on database failure.
    pub fn invoice_view(&self, id: i64) -> Result<Option<InvoiceView>> {
        let conn = self.conn.lock();
        let sql = format!("{} WHERE i.id = ?1", view_select());
        Ok(conn
            .query_row(&sql, params![id], view_from_row)
            .optional()?)
    }

    /// The newest invoices, id descending, each joined with its latest
    /// payment's risk fields.
    ///
    /// # Errors
    ///
    /// Returns `Error::Storage` on database failure.
    pub fn list_invoice_views(&self, limit: usize) -> Result<Vec<InvoiceView>> {
        let conn = self.conn.lock();
        let sql = format!("{} ORDER BY i.id DESC LIMIT ?1", view_select());
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = conn.prepare(&sql)?;
        let views = stmt
            .query_map(params![limit], view_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(views)
    }

    /// Set an invoice's status. Returns whether the invoice exists.
    ///
    /// # Errors
    ///
    /// Returns `Error::Storage` on database failure.
    pub fn update_status(&self, id: i64, status: InvoiceStatus) -> Result<bool> {
        let changed = self.conn.lock().execute(
            "UPDATE invoices SET status = ?1 WHERE id = ?2",
            params![status, id],
        )?;
        Ok(changed > 0)
    }

    /// The authoritative (max id) payment of an invoice.
    ///
    /// # Errors
    ///
    /// Returns `Error::Storage` on database failure.
    pub fn latest_payment(&self, invoice_id: i64) -> Result<Option<Payment>> {
        latest_payment_in(&self.conn.lock(), invoice_id)
    }

    /// Append a payment attempt.
    ///
    /// # Errors
    ///
    /// Returns `Error::Storage` on failure, e.g. an unknown invoice.
    pub fn insert_payment(&self, payment: &NewPayment) -> Result<Payment> {
        let conn = self.conn.lock();
        let (score, level, reasons) = risk_columns(payment.risk.as_ref())?;
        conn.execute(
            "INSERT INTO payments (invoice_id, payer_wallet, tx_hash, risk_score, risk_level, risk_reasons)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                payment.invoice_id,
                payment.payer_wallet,
                payment.tx_hash,
                score,
                level,
                reasons,
            ],
        )?;
        let id = conn.last_insert_rowid();
        select_payment(&conn, id)
    }

    /// Mark an invoice VERIFIED and update its latest payment row, or insert
    /// one if none exists, in a single transaction.
    ///
    /// On update, the chain fields are always overwritten and the risk fields
    /// only when `upsert.risk` is present. On insert, the payer is the chain
    /// payer (or the unknown-payer sentinel) and missing risk values take the
    /// confirmation defaults.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` for an unknown invoice and `Error::Storage`
    /// on database failure; in both cases nothing is written.
    pub fn record_verified_payment(
        &self,
        invoice_id: i64,
        upsert: &PaymentUpsert,
    ) -> Result<Payment> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let marked = tx.execute(
            "UPDATE invoices SET status = ?1 WHERE id = ?2",
            params![InvoiceStatus::Verified, invoice_id],
        )?;
        if marked == 0 {
            return Err(Error::NotFound(format!("invoice {invoice_id}")));
        }

        let existing: Option<i64> = tx
            .query_row(
                "SELECT MAX(id) FROM payments WHERE invoice_id = ?1",
                params![invoice_id],
                |row| row.get(0),
            )?;

        let id = if let Some(id) = existing {
            let (score, level, reasons) = risk_columns(upsert.risk.as_ref())?;
            tx.execute(
                "UPDATE payments
                    SET tx_hash = ?1,
                        chain_payer = ?2,
                        chain_timestamp = ?3,
                        risk_score = COALESCE(?4, risk_score),
                        risk_level = COALESCE(?5, risk_level),
                        risk_reasons = COALESCE(?6, risk_reasons)
                  WHERE id = ?7",
                params![
                    upsert.tx_hash,
                    upsert.chain_payer,
                    upsert.chain_timestamp,
                    score,
                    level,
                    reasons,
                    id,
                ],
            )?;
            debug!("Updated payment {} of invoice {}", id, invoice_id);
            id
        } else {
            let risk = upsert
                .risk
                .clone()
                .unwrap_or_else(RiskAssessment::confirmation_default);
            let payer = upsert.chain_payer.as_deref().unwrap_or(UNKNOWN_PAYER);
            tx.execute(
                "INSERT INTO payments
                    (invoice_id, payer_wallet, tx_hash, chain_payer, chain_timestamp,
                     risk_score, risk_level, risk_reasons)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    invoice_id,
                    payer,
                    upsert.tx_hash,
                    upsert.chain_payer,
                    upsert.chain_timestamp,
                    risk.score,
                    risk.level,
                    serde_json::to_string(&risk.reasons)?,
                ],
            )?;
            let id = tx.last_insert_rowid();
            debug!("Inserted payment {} for invoice {}", id, invoice_id);
            id
        };

        let payment = select_payment(&tx, id)?;
        tx.commit()?;
        Ok(payment)
    }

    /// Delete an invoice and its payments. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns `Error::Storage` on database failure; nothing is deleted.
    pub fn delete_invoice(&self, id: i64) -> Result<bool> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM payments WHERE invoice_id = ?1", params![id])?;
        let deleted = tx.execute("DELETE FROM invoices WHERE id = ?1", params![id])?;
        tx.commit()?;
        Ok(deleted > 0)
    }

    /// Count payment attempts created within `window` across every invoice
    /// owned by `customer_id`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Storage` on database failure.
    pub fn count_customer_payments_since(&self, customer_id: i64, window: Duration) -> Result<u64> {
        let modifier = format!("-{} seconds", window.as_secs());
        let count: i64 = self.conn.lock().query_row(
            "SELECT COUNT(*)
               FROM payments p
               JOIN invoices i ON i.id = p.invoice_id
              WHERE i.customer_id = ?1
                AND p.created_at >= datetime('now', ?2)",
            params![customer_id, modifier],
            |row| row.get(0),
        )?;
        Ok(u64::try_from(count).unwrap_or_default())
    }
}

/// Whether an error is a uniqueness (or other constraint) violation.
#[must_use]
pub fn is_unique_violation(error: &Error) -> bool {
    matches!(
        error,
        Error::Storage(rusqlite::Error::SqliteFailure(e, _))
            if e.code == ErrorCode::ConstraintViolation
    )
}

fn view_select() -> String {
    format!(
        "SELECT {INVOICE_COLUMNS}, p.risk_score, p.risk_level
           FROM invoices i
           LEFT JOIN payments p
             ON p.id = (SELECT MAX(id) FROM payments WHERE invoice_id = i.id)"
    )
}

fn select_invoice(
    conn: &Connection,
    filter: &str,
    params: impl rusqlite::Params,
) -> Result<Option<Invoice>> {
    let sql = format!("SELECT {INVOICE_COLUMNS} FROM invoices i WHERE {filter}");
    Ok(conn.query_row(&sql, params, invoice_from_row).optional()?)
}

fn select_payment(conn: &Connection, id: i64) -> Result<Payment> {
    let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = ?1");
    Ok(conn.query_row(&sql, params![id], payment_from_row)?)
}

fn latest_payment_in(conn: &Connection, invoice_id: i64) -> Result<Option<Payment>> {
    let sql = format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments WHERE invoice_id = ?1 ORDER BY id DESC LIMIT 1"
    );
    Ok(conn
        .query_row(&sql, params![invoice_id], payment_from_row)
        .optional()?)
}

type RiskColumns = (Option<i64>, Option<RiskLevel>, Option<String>);

fn risk_columns(risk: Option<&RiskAssessment>) -> Result<RiskColumns> {
    match risk {
        None => Ok((None, None, None)),
        Some(risk) => Ok((
            Some(risk.score),
            Some(risk.level),
            Some(serde_json::to_string(&risk.reasons)?),
        )),
    }
}

fn invoice_from_row(row: &Row<'_>) -> rusqlite::Result<Invoice> {
    Ok(Invoice {
        id: row.get("id")?,
        reference: row.get("reference")?,
        customer_id: row.get("customer_id")?,
        description: row.get("description")?,
        amount: row.get("amount")?,
        currency: row.get("currency")?,
        status: row.get("status")?,
        created_at: row.get("created_at")?,
    })
}

fn view_from_row(row: &Row<'_>) -> rusqlite::Result<InvoiceView> {
    Ok(InvoiceView {
        invoice: invoice_from_row(row)?,
        risk_score: row.get("risk_score")?,
        risk_level: row.get("risk_level")?,
    })
}

fn payment_from_row(row: &Row<'_>) -> rusqlite::Result<Payment> {
    let reasons: Option<String> = row.get("risk_reasons")?;
    Ok(Payment {
        id: row.get("id")?,
        invoice_id: row.get("invoice_id")?,
        payer_wallet: row.get("payer_wallet")?,
        tx_hash: row.get("tx_hash")?,
        chain_payer: row.get("chain_payer")?,
        chain_timestamp: row.get("chain_timestamp")?,
        risk_score: row.get("risk_score")?,
        risk_level: row.get("risk_level")?,
        risk_reasons: reasons
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_default(),
        created_at: row.get("created_at")?,
    })
}

impl ToSql for InvoiceStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for InvoiceStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

impl ToSql for RiskLevel {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for RiskLevel {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

impl ToSql for Amount {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Amount {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = match value {
            ValueRef::Text(_) => value.as_str()?.to_string(),
            ValueRef::Integer(i) => i.to_string(),
            _ => return Err(FromSqlError::InvalidType),
        };
        Amount::parse(&text).map_err(|e| FromSqlError::Other(e.to_string().into()))
    }
}
