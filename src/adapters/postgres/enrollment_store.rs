//! PostgreSQL implementation of EnrollmentStore.
//!
//! Each `StoreTransaction` wraps one `sqlx::Transaction`. Dropping it
//! without `commit` rolls back.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use crate::domain::foundation::{
    CalendarUnit, ContactId, Currency, DomainError, ErrorCode, FinancialTypeId, FundingId,
    LineItemId, MembershipId, MembershipStatusId, MembershipTypeId, Money, PaymentInstrumentId,
    PriceFieldId, PriceOptionId, RecurringFundingId, SoftCreditId, SoftCreditTypeId, Timestamp,
};
use crate::domain::funding::{
    Cadence, FundingRecord, FundingStatus, InstrumentSummary, LineItem, RecurringFundingRecord,
    RecurringStatus, SoftCreditEntry,
};
use crate::domain::membership::{MembershipRecord, StatusOverride};
use crate::ports::{EnrollmentStore, StoreTransaction};

/// PostgreSQL implementation of the EnrollmentStore port.
pub struct PostgresEnrollmentStore {
    pool: PgPool,
}

impl PostgresEnrollmentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn db_error(context: &'static str) -> impl Fn(sqlx::Error) -> DomainError {
    move |e| DomainError::database(format!("{}: {}", context, e))
}

fn corrupt(message: impl Into<String>) -> DomainError {
    DomainError::new(ErrorCode::DatabaseError, message)
}

// ════════════════════════════════════════════════════════════════════════════════
// Rows
// ════════════════════════════════════════════════════════════════════════════════

const MEMBERSHIP_COLUMNS: &str = "m.id, m.contact_id, m.membership_type_id, m.join_date, m.start_date, \
     m.end_date, m.status_id, m.override_kind, m.override_end_date, m.skip_status_calc, m.num_terms, \
     m.source, m.recurring_funding_id, m.max_related, m.created_at, m.updated_at";

const FUNDING_COLUMNS: &str = "f.id, f.contact_id, f.financial_type_id, f.total_minor, f.currency, \
     f.fee_minor, f.status, f.payment_instrument_id, f.transaction_id, f.invoice_id, f.check_number, \
     f.source, f.receive_date, f.receipt_date, f.is_test, f.card_type, f.pan_truncation, \
     f.recurring_funding_id, f.created_at, f.updated_at";

#[derive(Debug, sqlx::FromRow)]
struct MembershipRow {
    id: Uuid,
    contact_id: i64,
    membership_type_id: i64,
    join_date: Option<NaiveDate>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    status_id: i64,
    override_kind: String,
    override_end_date: Option<NaiveDate>,
    skip_status_calc: bool,
    num_terms: i64,
    source: Option<String>,
    recurring_funding_id: Option<Uuid>,
    max_related: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<MembershipRow> for MembershipRecord {
    type Error = DomainError;

    fn try_from(row: MembershipRow) -> Result<Self, Self::Error> {
        Ok(MembershipRecord {
            id: MembershipId::from_uuid(row.id),
            contact_id: ContactId::new(row.contact_id),
            membership_type_id: MembershipTypeId::new(row.membership_type_id),
            join_date: row.join_date,
            start_date: row.start_date,
            end_date: row.end_date,
            status_id: MembershipStatusId::new(row.status_id),
            status_override: parse_override(&row.override_kind, row.override_end_date)?,
            skip_status_calc: row.skip_status_calc,
            num_terms: to_u32(row.num_terms, "num_terms")?,
            source: row.source,
            recurring_funding_id: row.recurring_funding_id.map(RecurringFundingId::from_uuid),
            max_related: row.max_related.map(|v| to_u32(v, "max_related")).transpose()?,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct FundingRow {
    id: Uuid,
    contact_id: i64,
    financial_type_id: i64,
    total_minor: i64,
    currency: String,
    fee_minor: Option<i64>,
    status: String,
    payment_instrument_id: Option<i64>,
    transaction_id: Option<String>,
    invoice_id: Option<String>,
    check_number: Option<String>,
    source: Option<String>,
    receive_date: Option<NaiveDate>,
    receipt_date: Option<NaiveDate>,
    is_test: bool,
    card_type: Option<String>,
    pan_truncation: Option<String>,
    recurring_funding_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<FundingRow> for FundingRecord {
    type Error = DomainError;

    fn try_from(row: FundingRow) -> Result<Self, Self::Error> {
        let currency = parse_currency(&row.currency)?;
        Ok(FundingRecord {
            id: FundingId::from_uuid(row.id),
            contact_id: ContactId::new(row.contact_id),
            financial_type_id: FinancialTypeId::new(row.financial_type_id),
            total_amount: Money::new(row.total_minor, currency.clone()),
            fee_amount: row.fee_minor.map(|minor| Money::new(minor, currency)),
            status: FundingStatus::parse(&row.status)
                .ok_or_else(|| corrupt(format!("Invalid funding status: {}", row.status)))?,
            payment_instrument_id: row.payment_instrument_id.map(PaymentInstrumentId::new),
            transaction_id: row.transaction_id,
            invoice_id: row.invoice_id,
            check_number: row.check_number,
            source: row.source,
            receive_date: row.receive_date,
            receipt_date: row.receipt_date,
            is_test: row.is_test,
            instrument: InstrumentSummary {
                card_type: row.card_type,
                pan_truncation: row.pan_truncation,
            },
            recurring_funding_id: row.recurring_funding_id.map(RecurringFundingId::from_uuid),
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RecurringRow {
    id: Uuid,
    contact_id: i64,
    amount_minor: i64,
    currency: String,
    frequency_unit: String,
    frequency_interval: i64,
    status: String,
    start_date: NaiveDate,
    auto_renew: bool,
    is_test: bool,
    processor_reference: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<RecurringRow> for RecurringFundingRecord {
    type Error = DomainError;

    fn try_from(row: RecurringRow) -> Result<Self, Self::Error> {
        Ok(RecurringFundingRecord {
            id: RecurringFundingId::from_uuid(row.id),
            contact_id: ContactId::new(row.contact_id),
            amount: Money::new(row.amount_minor, parse_currency(&row.currency)?),
            cadence: Cadence {
                unit: parse_unit(&row.frequency_unit)?,
                interval: to_u32(row.frequency_interval, "frequency_interval")?,
            },
            status: RecurringStatus::parse(&row.status)
                .ok_or_else(|| corrupt(format!("Invalid recurring status: {}", row.status)))?,
            start_date: row.start_date,
            auto_renew: row.auto_renew,
            is_test: row.is_test,
            processor_reference: row.processor_reference,
            created_at: Timestamp::from_datetime(row.created_at),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LineItemRow {
    id: Uuid,
    funding_id: Uuid,
    price_field_id: Option<i64>,
    price_option_id: Option<i64>,
    label: String,
    quantity: i64,
    currency: String,
    unit_minor: i64,
    line_total_minor: i64,
    tax_rate_basis_points: Option<i64>,
    tax_minor: i64,
    financial_type_id: i64,
    membership_type_id: Option<i64>,
    membership_num_terms: Option<i64>,
}

impl TryFrom<LineItemRow> for LineItem {
    type Error = DomainError;

    fn try_from(row: LineItemRow) -> Result<Self, Self::Error> {
        let currency = parse_currency(&row.currency)?;
        Ok(LineItem {
            id: LineItemId::from_uuid(row.id),
            funding_id: FundingId::from_uuid(row.funding_id),
            price_field_id: row.price_field_id.map(PriceFieldId::new),
            price_option_id: row.price_option_id.map(PriceOptionId::new),
            label: row.label,
            quantity: to_u32(row.quantity, "quantity")?,
            unit_amount: Money::new(row.unit_minor, currency.clone()),
            line_total: Money::new(row.line_total_minor, currency.clone()),
            tax_rate_basis_points: row
                .tax_rate_basis_points
                .map(|v| to_u32(v, "tax_rate_basis_points"))
                .transpose()?,
            tax_amount: Money::new(row.tax_minor, currency),
            financial_type_id: FinancialTypeId::new(row.financial_type_id),
            membership_type_id: row.membership_type_id.map(MembershipTypeId::new),
            membership_num_terms: row
                .membership_num_terms
                .map(|v| to_u32(v, "membership_num_terms"))
                .transpose()?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SoftCreditRow {
    id: Uuid,
    funding_id: Uuid,
    contact_id: i64,
    amount_minor: i64,
    currency: String,
    soft_credit_type_id: i64,
}

impl TryFrom<SoftCreditRow> for SoftCreditEntry {
    type Error = DomainError;

    fn try_from(row: SoftCreditRow) -> Result<Self, Self::Error> {
        Ok(SoftCreditEntry {
            id: SoftCreditId::from_uuid(row.id),
            funding_id: FundingId::from_uuid(row.funding_id),
            contact_id: ContactId::new(row.contact_id),
            amount: Money::new(row.amount_minor, parse_currency(&row.currency)?),
            soft_credit_type_id: SoftCreditTypeId::new(row.soft_credit_type_id),
        })
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Column encodings
// ════════════════════════════════════════════════════════════════════════════════

fn override_kind(status_override: &StatusOverride) -> &'static str {
    match status_override {
        StatusOverride::None => "none",
        StatusOverride::Indefinite => "indefinite",
        StatusOverride::UntilDate(_) => "until_date",
    }
}

fn parse_override(kind: &str, end_date: Option<NaiveDate>) -> Result<StatusOverride, DomainError> {
    match (kind, end_date) {
        ("none", _) => Ok(StatusOverride::None),
        ("indefinite", _) => Ok(StatusOverride::Indefinite),
        ("until_date", Some(date)) => Ok(StatusOverride::UntilDate(date)),
        _ => Err(corrupt(format!("Invalid status override: {}", kind))),
    }
}

fn unit_to_str(unit: CalendarUnit) -> &'static str {
    match unit {
        CalendarUnit::Day => "day",
        CalendarUnit::Month => "month",
        CalendarUnit::Year => "year",
    }
}

fn parse_unit(s: &str) -> Result<CalendarUnit, DomainError> {
    match s {
        "day" => Ok(CalendarUnit::Day),
        "month" => Ok(CalendarUnit::Month),
        "year" => Ok(CalendarUnit::Year),
        _ => Err(corrupt(format!("Invalid frequency unit: {}", s))),
    }
}

fn parse_currency(code: &str) -> Result<Currency, DomainError> {
    Currency::new(code.trim()).map_err(|e| corrupt(format!("Invalid currency: {}", e)))
}

fn to_u32(value: i64, column: &str) -> Result<u32, DomainError> {
    u32::try_from(value).map_err(|_| corrupt(format!("{} out of range: {}", column, value)))
}

// ════════════════════════════════════════════════════════════════════════════════
// Reads
// ════════════════════════════════════════════════════════════════════════════════

#[async_trait]
impl EnrollmentStore for PostgresEnrollmentStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, DomainError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("Failed to begin transaction"))?;
        Ok(Box::new(PostgresTransaction { tx }))
    }

    async fn find_membership(&self, id: MembershipId) -> Result<Option<MembershipRecord>, DomainError> {
        let sql = format!("SELECT {} FROM memberships m WHERE m.id = $1", MEMBERSHIP_COLUMNS);
        let row: Option<MembershipRow> = sqlx::query_as(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to load membership"))?;
        row.map(MembershipRecord::try_from).transpose()
    }

    async fn find_funding(&self, id: FundingId) -> Result<Option<FundingRecord>, DomainError> {
        let sql = format!("SELECT {} FROM fundings f WHERE f.id = $1", FUNDING_COLUMNS);
        let row: Option<FundingRow> = sqlx::query_as(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to load funding"))?;
        row.map(FundingRecord::try_from).transpose()
    }

    async fn find_recurring(
        &self,
        id: RecurringFundingId,
    ) -> Result<Option<RecurringFundingRecord>, DomainError> {
        let row: Option<RecurringRow> = sqlx::query_as(
            r#"
            SELECT id, contact_id, amount_minor, currency, frequency_unit, frequency_interval,
                   status, start_date, auto_renew, is_test, processor_reference, created_at
            FROM recurring_fundings
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to load recurring funding"))?;
        row.map(RecurringFundingRecord::try_from).transpose()
    }

    async fn line_items_for(&self, funding_id: FundingId) -> Result<Vec<LineItem>, DomainError> {
        let rows: Vec<LineItemRow> = sqlx::query_as(
            r#"
            SELECT id, funding_id, price_field_id, price_option_id, label, quantity, currency,
                   unit_minor, line_total_minor, tax_rate_basis_points, tax_minor,
                   financial_type_id, membership_type_id, membership_num_terms
            FROM line_items
            WHERE funding_id = $1
            ORDER BY position
            "#,
        )
        .bind(funding_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to load line items"))?;
        rows.into_iter().map(LineItem::try_from).collect()
    }

    async fn soft_credits_for(&self, funding_id: FundingId) -> Result<Vec<SoftCreditEntry>, DomainError> {
        let rows: Vec<SoftCreditRow> = sqlx::query_as(
            r#"
            SELECT id, funding_id, contact_id, amount_minor, currency, soft_credit_type_id
            FROM soft_credits
            WHERE funding_id = $1
            "#,
        )
        .bind(funding_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to load soft credits"))?;
        rows.into_iter().map(SoftCreditEntry::try_from).collect()
    }

    async fn latest_funding_for_membership(
        &self,
        membership_id: MembershipId,
    ) -> Result<Option<FundingRecord>, DomainError> {
        let sql = format!(
            "SELECT {} FROM fundings f \
             JOIN membership_fundings mf ON mf.funding_id = f.id \
             WHERE mf.membership_id = $1 \
             ORDER BY f.created_at DESC, mf.linked_at DESC \
             LIMIT 1",
            FUNDING_COLUMNS
        );
        let row: Option<FundingRow> = sqlx::query_as(&sql)
            .bind(membership_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to load latest funding"))?;
        row.map(FundingRecord::try_from).transpose()
    }

    async fn memberships_for_funding(
        &self,
        funding_id: FundingId,
    ) -> Result<Vec<MembershipRecord>, DomainError> {
        let sql = format!(
            "SELECT {} FROM memberships m \
             JOIN membership_fundings mf ON mf.membership_id = m.id \
             WHERE mf.funding_id = $1 \
             ORDER BY mf.linked_at",
            MEMBERSHIP_COLUMNS
        );
        let rows: Vec<MembershipRow> = sqlx::query_as(&sql)
            .bind(funding_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("Failed to load memberships"))?;
        rows.into_iter().map(MembershipRecord::try_from).collect()
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Writes
// ════════════════════════════════════════════════════════════════════════════════

struct PostgresTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

fn expect_one(rows_affected: u64, code: ErrorCode, what: &str, id: impl std::fmt::Display) -> Result<(), DomainError> {
    if rows_affected == 0 {
        return Err(DomainError::new(code, format!("{} {} not found", what, id)));
    }
    Ok(())
}

#[async_trait]
impl StoreTransaction for PostgresTransaction {
    async fn insert_membership(&mut self, membership: &MembershipRecord) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO memberships (
                id, contact_id, membership_type_id, join_date, start_date, end_date, status_id,
                override_kind, override_end_date, skip_status_calc, num_terms, source,
                recurring_funding_id, max_related, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(membership.id.as_uuid())
        .bind(membership.contact_id.value())
        .bind(membership.membership_type_id.value())
        .bind(membership.join_date)
        .bind(membership.start_date)
        .bind(membership.end_date)
        .bind(membership.status_id.value())
        .bind(override_kind(&membership.status_override))
        .bind(membership.status_override.expires_on())
        .bind(membership.skip_status_calc)
        .bind(i64::from(membership.num_terms))
        .bind(&membership.source)
        .bind(membership.recurring_funding_id.map(|id| *id.as_uuid()))
        .bind(membership.max_related.map(i64::from))
        .bind(membership.created_at.as_datetime())
        .bind(membership.updated_at.as_datetime())
        .execute(&mut *self.tx)
        .await
        .map_err(db_error("Failed to insert membership"))?;
        Ok(())
    }

    async fn update_membership(&mut self, membership: &MembershipRecord) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE memberships SET
                membership_type_id = $2,
                join_date = $3,
                start_date = $4,
                end_date = $5,
                status_id = $6,
                override_kind = $7,
                override_end_date = $8,
                skip_status_calc = $9,
                num_terms = $10,
                source = $11,
                recurring_funding_id = $12,
                max_related = $13,
                updated_at = $14
            WHERE id = $1
            "#,
        )
        .bind(membership.id.as_uuid())
        .bind(membership.membership_type_id.value())
        .bind(membership.join_date)
        .bind(membership.start_date)
        .bind(membership.end_date)
        .bind(membership.status_id.value())
        .bind(override_kind(&membership.status_override))
        .bind(membership.status_override.expires_on())
        .bind(membership.skip_status_calc)
        .bind(i64::from(membership.num_terms))
        .bind(&membership.source)
        .bind(membership.recurring_funding_id.map(|id| *id.as_uuid()))
        .bind(membership.max_related.map(i64::from))
        .bind(membership.updated_at.as_datetime())
        .execute(&mut *self.tx)
        .await
        .map_err(db_error("Failed to update membership"))?;
        expect_one(result.rows_affected(), ErrorCode::MembershipNotFound, "Membership", membership.id)
    }

    async fn insert_funding(&mut self, funding: &FundingRecord) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO fundings (
                id, contact_id, financial_type_id, total_minor, currency, fee_minor, status,
                payment_instrument_id, transaction_id, invoice_id, check_number, source,
                receive_date, receipt_date, is_test, card_type, pan_truncation,
                recurring_funding_id, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
            "#,
        )
        .bind(funding.id.as_uuid())
        .bind(funding.contact_id.value())
        .bind(funding.financial_type_id.value())
        .bind(funding.total_amount.minor_units)
        .bind(funding.total_amount.currency.as_str())
        .bind(funding.fee_amount.as_ref().map(|m| m.minor_units))
        .bind(funding.status.as_str())
        .bind(funding.payment_instrument_id.map(|id| id.value()))
        .bind(&funding.transaction_id)
        .bind(&funding.invoice_id)
        .bind(&funding.check_number)
        .bind(&funding.source)
        .bind(funding.receive_date)
        .bind(funding.receipt_date)
        .bind(funding.is_test)
        .bind(&funding.instrument.card_type)
        .bind(&funding.instrument.pan_truncation)
        .bind(funding.recurring_funding_id.map(|id| *id.as_uuid()))
        .bind(funding.created_at.as_datetime())
        .bind(funding.updated_at.as_datetime())
        .execute(&mut *self.tx)
        .await
        .map_err(db_error("Failed to insert funding"))?;
        Ok(())
    }

    async fn update_funding(&mut self, funding: &FundingRecord) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE fundings SET
                financial_type_id = $2,
                total_minor = $3,
                currency = $4,
                fee_minor = $5,
                status = $6,
                payment_instrument_id = $7,
                transaction_id = $8,
                invoice_id = $9,
                check_number = $10,
                source = $11,
                receive_date = $12,
                receipt_date = $13,
                card_type = $14,
                pan_truncation = $15,
                recurring_funding_id = $16,
                updated_at = $17
            WHERE id = $1
            "#,
        )
        .bind(funding.id.as_uuid())
        .bind(funding.financial_type_id.value())
        .bind(funding.total_amount.minor_units)
        .bind(funding.total_amount.currency.as_str())
        .bind(funding.fee_amount.as_ref().map(|m| m.minor_units))
        .bind(funding.status.as_str())
        .bind(funding.payment_instrument_id.map(|id| id.value()))
        .bind(&funding.transaction_id)
        .bind(&funding.invoice_id)
        .bind(&funding.check_number)
        .bind(&funding.source)
        .bind(funding.receive_date)
        .bind(funding.receipt_date)
        .bind(&funding.instrument.card_type)
        .bind(&funding.instrument.pan_truncation)
        .bind(funding.recurring_funding_id.map(|id| *id.as_uuid()))
        .bind(funding.updated_at.as_datetime())
        .execute(&mut *self.tx)
        .await
        .map_err(db_error("Failed to update funding"))?;
        expect_one(result.rows_affected(), ErrorCode::FundingNotFound, "Funding", funding.id)
    }

    async fn insert_recurring(&mut self, recurring: &RecurringFundingRecord) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO recurring_fundings (
                id, contact_id, amount_minor, currency, frequency_unit, frequency_interval,
                status, start_date, auto_renew, is_test, processor_reference, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(recurring.id.as_uuid())
        .bind(recurring.contact_id.value())
        .bind(recurring.amount.minor_units)
        .bind(recurring.amount.currency.as_str())
        .bind(unit_to_str(recurring.cadence.unit))
        .bind(i64::from(recurring.cadence.interval))
        .bind(recurring.status.as_str())
        .bind(recurring.start_date)
        .bind(recurring.auto_renew)
        .bind(recurring.is_test)
        .bind(&recurring.processor_reference)
        .bind(recurring.created_at.as_datetime())
        .execute(&mut *self.tx)
        .await
        .map_err(db_error("Failed to insert recurring funding"))?;
        Ok(())
    }

    async fn update_recurring(&mut self, recurring: &RecurringFundingRecord) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE recurring_fundings SET
                amount_minor = $2,
                currency = $3,
                status = $4,
                start_date = $5,
                auto_renew = $6,
                processor_reference = $7
            WHERE id = $1
            "#,
        )
        .bind(recurring.id.as_uuid())
        .bind(recurring.amount.minor_units)
        .bind(recurring.amount.currency.as_str())
        .bind(recurring.status.as_str())
        .bind(recurring.start_date)
        .bind(recurring.auto_renew)
        .bind(&recurring.processor_reference)
        .execute(&mut *self.tx)
        .await
        .map_err(db_error("Failed to update recurring funding"))?;
        expect_one(
            result.rows_affected(),
            ErrorCode::RecurringFundingNotFound,
            "Recurring funding",
            recurring.id,
        )
    }

    async fn delete_recurring(&mut self, id: RecurringFundingId) -> Result<(), DomainError> {
        sqlx::query("DELETE FROM recurring_fundings WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(db_error("Failed to delete recurring funding"))?;
        Ok(())
    }

    async fn replace_line_items(
        &mut self,
        funding_id: FundingId,
        items: &[LineItem],
    ) -> Result<(), DomainError> {
        sqlx::query("DELETE FROM line_items WHERE funding_id = $1")
            .bind(funding_id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(db_error("Failed to clear line items"))?;

        for (position, item) in (0_i64..).zip(items) {
            sqlx::query(
                r#"
                INSERT INTO line_items (
                    id, funding_id, position, price_field_id, price_option_id, label, quantity,
                    currency, unit_minor, line_total_minor, tax_rate_basis_points, tax_minor,
                    financial_type_id, membership_type_id, membership_num_terms
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
                "#,
            )
            .bind(item.id.as_uuid())
            .bind(funding_id.as_uuid())
            .bind(position)
            .bind(item.price_field_id.map(|id| id.value()))
            .bind(item.price_option_id.map(|id| id.value()))
            .bind(&item.label)
            .bind(i64::from(item.quantity))
            .bind(item.line_total.currency.as_str())
            .bind(item.unit_amount.minor_units)
            .bind(item.line_total.minor_units)
            .bind(item.tax_rate_basis_points.map(i64::from))
            .bind(item.tax_amount.minor_units)
            .bind(item.financial_type_id.value())
            .bind(item.membership_type_id.map(|id| id.value()))
            .bind(item.membership_num_terms.map(i64::from))
            .execute(&mut *self.tx)
            .await
            .map_err(db_error("Failed to insert line item"))?;
        }
        Ok(())
    }

    async fn insert_soft_credit(&mut self, entry: &SoftCreditEntry) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO soft_credits (
                id, funding_id, contact_id, amount_minor, currency, soft_credit_type_id
            ) VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(entry.id.as_uuid())
        .bind(entry.funding_id.as_uuid())
        .bind(entry.contact_id.value())
        .bind(entry.amount.minor_units)
        .bind(entry.amount.currency.as_str())
        .bind(entry.soft_credit_type_id.value())
        .execute(&mut *self.tx)
        .await
        .map_err(db_error("Failed to insert soft credit"))?;
        Ok(())
    }

    async fn link_membership_funding(
        &mut self,
        membership_id: MembershipId,
        funding_id: FundingId,
    ) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO membership_fundings (membership_id, funding_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(membership_id.as_uuid())
        .bind(funding_id.as_uuid())
        .execute(&mut *self.tx)
        .await
        .map_err(db_error("Failed to link membership and funding"))?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), DomainError> {
        let PostgresTransaction { tx } = *self;
        tx.commit().await.map_err(db_error("Failed to commit transaction"))
    }

    async fn rollback(self: Box<Self>) -> Result<(), DomainError> {
        let PostgresTransaction { tx } = *self;
        tx.rollback().await.map_err(db_error("Failed to roll back transaction"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn override_columns_round_trip() {
        for status_override in [
            StatusOverride::None,
            StatusOverride::Indefinite,
            StatusOverride::UntilDate(d(2024, 6, 30)),
        ] {
            let parsed =
                parse_override(override_kind(&status_override), status_override.expires_on()).unwrap();
            assert_eq!(parsed, status_override);
        }
    }

    #[test]
    fn until_date_without_date_is_corrupt() {
        let err = parse_override("until_date", None).unwrap_err();
        assert_eq!(err.code, ErrorCode::DatabaseError);
    }

    #[test]
    fn negative_counts_are_rejected() {
        assert!(to_u32(-1, "num_terms").is_err());
        assert_eq!(to_u32(3, "num_terms").unwrap(), 3);
    }

    #[test]
    fn char_padded_currency_is_trimmed() {
        assert_eq!(parse_currency("USD").unwrap().as_str(), "USD");
        assert!(parse_unit("fortnight").is_err());
    }

    #[test]
    fn funding_row_maps_fee_into_total_currency() {
        let now = Utc::now();
        let row = FundingRow {
            id: Uuid::new_v4(),
            contact_id: 7,
            financial_type_id: 2,
            total_minor: 5000,
            currency: "EUR".to_string(),
            fee_minor: Some(120),
            status: "completed".to_string(),
            payment_instrument_id: Some(1),
            transaction_id: Some("txn".to_string()),
            invoice_id: None,
            check_number: None,
            source: None,
            receive_date: Some(d(2024, 1, 15)),
            receipt_date: None,
            is_test: false,
            card_type: Some("Visa".to_string()),
            pan_truncation: Some("4242".to_string()),
            recurring_funding_id: None,
            created_at: now,
            updated_at: now,
        };
        let funding = FundingRecord::try_from(row).unwrap();
        assert_eq!(funding.status, FundingStatus::Completed);
        assert_eq!(funding.fee_amount.unwrap().currency.as_str(), "EUR");
        assert_eq!(funding.instrument.pan_truncation.as_deref(), Some("4242"));
    }
}
