use super::model::{NewAccount, NewProduct};
use crate::model::{
    Account, AccountId, Currency, CustomerId, Entities, Invoice, InvoiceStatus, LineItem,
    PayoutDetails, Price, Product, ProductId, QuotaStatus,
};
use crate::services::InvoiceError;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Transaction};
use sqlx::{Sqlite, SqlitePool};
use std::collections::BTreeSet;
use std::str::FromStr;
use tracing::{debug, instrument};
use uuid::Uuid;

pub type Pool = SqlitePool;

const INVOICE_COLUMNS: &str = "id, issuer_id, customer_id, customer_name, customer_phone, currency, amount, status, delivery_pending, document_url, payment_link, created_at";

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized)
        .await
        .with_context(|| format!("connecting to {normalized}"))?;
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA foreign_keys=ON;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// For file-backed SQLite URLs, expand a leading `~/`, create the parent
/// directory and ask sqlx to create the file. In-memory URLs pass through.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);
    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), rest),
        _ => path_part.to_string(),
    };
    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let query = match query_part {
        Some(q) if q.contains("mode=") => q.to_string(),
        Some(q) => format!("{q}&mode=rwc"),
        None => "mode=rwc".to_string(),
    };
    format!("sqlite://{expanded_path}?{query}")
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn parse_decimal(raw: &str) -> Result<Decimal> {
    Decimal::from_str(raw).with_context(|| format!("invalid stored amount {raw:?}"))
}

fn db_err(err: sqlx::Error) -> InvoiceError {
    InvoiceError::Other(err.into())
}

fn new_invoice_id() -> String {
    let raw = Uuid::new_v4().simple().to_string();
    format!("INV-{}", raw[..8].to_uppercase())
}

fn account_from_row(row: &SqliteRow) -> Account {
    let field = |name: &str| {
        row.try_get::<Option<String>, _>(name)
            .ok()
            .flatten()
            .filter(|s| !s.trim().is_empty())
    };
    let payout = match (field("bank_name"), field("account_number"), field("account_name")) {
        (Some(bank_name), Some(account_number), Some(account_name)) => Some(PayoutDetails {
            bank_name,
            account_number,
            account_name,
        }),
        _ => None,
    };
    Account {
        id: row.get("id"),
        business_name: row.get("business_name"),
        phone: row.get("phone"),
        phone_verified: row.get("phone_verified"),
        payout,
    }
}

fn product_from_row(row: &SqliteRow) -> Result<Product> {
    let price: String = row.get("unit_price");
    Ok(Product {
        id: row.get("id"),
        account_id: row.get("account_id"),
        name: row.get("name"),
        unit_price: parse_decimal(&price)?,
        stock: row.get("stock"),
    })
}

fn invoice_from_row(row: &SqliteRow, lines: Vec<LineItem>) -> Result<Invoice> {
    let currency: String = row.get("currency");
    let status: String = row.get("status");
    let amount: String = row.get("amount");
    let id: String = row.get("id");
    Ok(Invoice {
        issuer_id: row.get("issuer_id"),
        customer_id: row.get("customer_id"),
        customer_name: row.get("customer_name"),
        customer_phone: row.get("customer_phone"),
        currency: Currency::parse_code(&currency)
            .ok_or_else(|| anyhow!("invoice {id} has unknown currency {currency}"))?,
        amount: parse_decimal(&amount)?,
        lines,
        status: InvoiceStatus::parse_status(&status)
            .ok_or_else(|| anyhow!("invoice {id} has unknown status {status}"))?,
        delivery_pending: row.get("delivery_pending"),
        document_url: row.get("document_url"),
        payment_link: row.get("payment_link"),
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
        id,
    })
}

async fn invoice_lines(pool: &Pool, invoice_id: &str) -> Result<Vec<LineItem>> {
    let rows = sqlx::query(
        "SELECT description, quantity, unit_price, product_id FROM invoice_lines WHERE invoice_id = ? ORDER BY position",
    )
    .bind(invoice_id)
    .fetch_all(pool)
    .await?;
    rows.iter()
        .map(|row| {
            let price: String = row.get("unit_price");
            Ok(LineItem {
                description: row.get("description"),
                quantity: row.get::<i64, _>("quantity").clamp(1, u32::MAX as i64) as u32,
                price: Price::Priced(parse_decimal(&price)?),
                product_id: row.get("product_id"),
            })
        })
        .collect()
}

async fn invoices_with_lines(pool: &Pool, rows: Vec<SqliteRow>) -> Result<Vec<Invoice>> {
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let id: String = row.get("id");
        let lines = invoice_lines(pool, &id).await?;
        out.push(invoice_from_row(&row, lines)?);
    }
    Ok(out)
}

#[instrument(skip_all)]
pub async fn insert_account(pool: &Pool, account: &NewAccount) -> Result<AccountId> {
    let payout = account.payout.as_ref();
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO accounts (business_name, phone, phone_verified, bank_name, account_number, account_name, plan, invoice_balance, pack_price, pack_size) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(&account.business_name)
    .bind(&account.phone)
    .bind(account.phone_verified)
    .bind(payout.map(|p| p.bank_name.as_str()))
    .bind(payout.map(|p| p.account_number.as_str()))
    .bind(payout.map(|p| p.account_name.as_str()))
    .bind(&account.plan)
    .bind(account.invoice_balance)
    .bind(account.pack_price.to_string())
    .bind(account.pack_size)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

#[instrument(skip_all)]
pub async fn insert_product(pool: &Pool, product: &NewProduct) -> Result<ProductId> {
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO products (account_id, name, unit_price, stock) VALUES (?, ?, ?, ?) RETURNING id",
    )
    .bind(product.account_id)
    .bind(&product.name)
    .bind(product.unit_price.to_string())
    .bind(product.stock)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

/// Account whose phone is one of `candidates`, filtered on verification.
#[instrument(skip_all)]
pub async fn find_account_by_phone(
    pool: &Pool,
    candidates: &BTreeSet<String>,
    verified: bool,
) -> Result<Option<Account>> {
    if candidates.is_empty() {
        return Ok(None);
    }
    let sql = format!(
        "SELECT * FROM accounts WHERE phone_verified = ? AND phone IN ({}) ORDER BY id LIMIT 1",
        placeholders(candidates.len())
    );
    let mut query = sqlx::query(&sql).bind(verified);
    for candidate in candidates {
        query = query.bind(candidate);
    }
    let row = query.fetch_optional(pool).await?;
    Ok(row.as_ref().map(account_from_row))
}

#[instrument(skip_all)]
pub async fn get_account(pool: &Pool, id: AccountId) -> Result<Option<Account>> {
    let row = sqlx::query("SELECT * FROM accounts WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(account_from_row))
}

#[instrument(skip_all)]
pub async fn quota_status(pool: &Pool, account: AccountId) -> Result<QuotaStatus> {
    let row = sqlx::query(
        "SELECT plan, invoice_balance, pack_price, pack_size FROM accounts WHERE id = ?",
    )
    .bind(account)
    .fetch_optional(pool)
    .await?;
    let Some(row) = row else {
        return Err(anyhow!("account {} not found", account));
    };
    let balance: i64 = row.get("invoice_balance");
    let pack_price: String = row.get("pack_price");
    Ok(QuotaStatus {
        can_create: balance > 0,
        balance,
        plan: row.get("plan"),
        pack_price: parse_decimal(&pack_price)?,
        pack_size: row.get("pack_size"),
    })
}

/// One page (1-based) of an account's products in catalog order, plus the
/// number of products matching `search`.
#[instrument(skip_all)]
pub async fn list_products(
    pool: &Pool,
    account: AccountId,
    page: u32,
    page_size: u32,
    search: Option<&str>,
) -> Result<(Vec<Product>, u64)> {
    let size = i64::from(page_size.max(1));
    let offset = i64::from(page.max(1) - 1) * size;
    let pattern = search
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{}%", s.to_lowercase()));

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM products WHERE account_id = ? AND (? IS NULL OR LOWER(name) LIKE ?)",
    )
    .bind(account)
    .bind(&pattern)
    .bind(&pattern)
    .fetch_one(pool)
    .await?;
    let rows = sqlx::query(
        "SELECT id, account_id, name, unit_price, stock FROM products WHERE account_id = ? AND (? IS NULL OR LOWER(name) LIKE ?) ORDER BY id LIMIT ? OFFSET ?",
    )
    .bind(account)
    .bind(&pattern)
    .bind(&pattern)
    .bind(size)
    .bind(offset)
    .fetch_all(pool)
    .await?;
    let products = rows.iter().map(product_from_row).collect::<Result<Vec<_>>>()?;
    Ok((products, total.max(0) as u64))
}

#[instrument(skip_all)]
pub async fn get_product(pool: &Pool, account: AccountId, id: ProductId) -> Result<Option<Product>> {
    let row = sqlx::query(
        "SELECT id, account_id, name, unit_price, stock FROM products WHERE id = ? AND account_id = ?",
    )
    .bind(id)
    .bind(account)
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(product_from_row).transpose()
}

async fn upsert_customer_tx(
    tx: &mut Transaction<'_, Sqlite>,
    account: AccountId,
    name: &str,
    phone: Option<&str>,
    email: Option<&str>,
) -> sqlx::Result<CustomerId> {
    if let Some(phone) = phone {
        let existing = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM customers WHERE account_id = ? AND phone = ? ORDER BY id LIMIT 1",
        )
        .bind(account)
        .bind(phone)
        .fetch_optional(&mut **tx)
        .await?;
        if let Some(id) = existing {
            sqlx::query("UPDATE customers SET name = ?, email = COALESCE(?, email) WHERE id = ?")
                .bind(name)
                .bind(email)
                .bind(id)
                .execute(&mut **tx)
                .await?;
            return Ok(id);
        }
    }
    sqlx::query_scalar::<_, i64>(
        "INSERT INTO customers (account_id, name, phone, email) VALUES (?, ?, ?, ?) RETURNING id",
    )
    .bind(account)
    .bind(name)
    .bind(phone)
    .bind(email)
    .fetch_one(&mut **tx)
    .await
}

/// Create an invoice in one transaction: allowance and payout checks,
/// customer upsert, invoice and lines, allowance decrement and stock
/// decrement for catalog lines. Nothing is written when a check fails.
#[instrument(skip_all, fields(issuer = issuer))]
pub async fn create_invoice(
    pool: &Pool,
    issuer: AccountId,
    entities: &Entities,
    document_base: Option<&str>,
    now: DateTime<Utc>,
) -> std::result::Result<Invoice, InvoiceError> {
    if entities.lines.is_empty() {
        return Err(InvoiceError::Validation("at least one item is required".into()));
    }
    if !entities.is_fully_priced() {
        return Err(InvoiceError::Validation("every item needs a price".into()));
    }
    let amount = entities
        .priced_total()
        .ok_or_else(|| InvoiceError::Validation("the amount is too large".into()))?;
    if amount <= Decimal::ZERO {
        return Err(InvoiceError::Validation("the amount must be positive".into()));
    }
    let customer_name = entities
        .customer_name()
        .ok_or_else(|| InvoiceError::Validation("the customer name is missing".into()))?
        .to_string();

    let mut tx = pool.begin().await.map_err(db_err)?;
    let row = sqlx::query("SELECT * FROM accounts WHERE id = ?")
        .bind(issuer)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;
    let Some(row) = row else {
        return Err(InvoiceError::Validation(format!("unknown account {issuer}")));
    };
    if row.get::<i64, _>("invoice_balance") <= 0 {
        return Err(InvoiceError::BalanceExhausted);
    }
    if account_from_row(&row).payout.is_none() {
        return Err(InvoiceError::MissingPayoutDetails);
    }

    let customer_phone = entities.customer_phone.as_deref();
    let customer_id = upsert_customer_tx(
        &mut tx,
        issuer,
        &customer_name,
        customer_phone,
        entities.customer_email.as_deref(),
    )
    .await
    .map_err(db_err)?;

    let id = new_invoice_id();
    let document_url =
        document_base.map(|base| format!("{}/invoices/{}.pdf", base.trim_end_matches('/'), id));
    sqlx::query(
        "INSERT INTO invoices (id, issuer_id, customer_id, customer_name, customer_phone, currency, amount, status, delivery_pending, document_url, due_date, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?)",
    )
    .bind(&id)
    .bind(issuer)
    .bind(customer_id)
    .bind(&customer_name)
    .bind(customer_phone)
    .bind(entities.currency.as_str())
    .bind(amount.to_string())
    .bind(InvoiceStatus::Unpaid.as_str())
    .bind(&document_url)
    .bind(entities.due_date)
    .bind(now)
    .execute(&mut *tx)
    .await
    .map_err(db_err)?;

    for (position, line) in entities.lines.iter().enumerate() {
        let unit_price = line.unit_price().unwrap_or_default();
        sqlx::query(
            "INSERT INTO invoice_lines (invoice_id, position, description, quantity, unit_price, product_id) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(position as i64)
        .bind(&line.description)
        .bind(i64::from(line.quantity))
        .bind(unit_price.to_string())
        .bind(line.product_id)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        if let Some(product_id) = line.product_id {
            sqlx::query(
                "UPDATE products SET stock = MAX(stock - ?, 0) WHERE id = ? AND account_id = ? AND stock IS NOT NULL",
            )
            .bind(i64::from(line.quantity))
            .bind(product_id)
            .bind(issuer)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }
    }

    sqlx::query("UPDATE accounts SET invoice_balance = invoice_balance - 1 WHERE id = ?")
        .bind(issuer)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
    tx.commit().await.map_err(db_err)?;
    debug!(invoice_id = %id, "invoice stored");

    Ok(Invoice {
        id,
        issuer_id: issuer,
        customer_id,
        customer_name,
        customer_phone: entities.customer_phone.clone(),
        currency: entities.currency,
        amount,
        lines: entities.lines.clone(),
        status: InvoiceStatus::Unpaid,
        delivery_pending: false,
        document_url,
        payment_link: None,
        created_at: now,
    })
}

#[instrument(skip_all)]
pub async fn fetch_invoice(pool: &Pool, id: &str) -> Result<Option<Invoice>> {
    let sql = format!("SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = ?");
    let row = sqlx::query(&sql).bind(id).fetch_optional(pool).await?;
    match row {
        Some(row) => {
            let lines = invoice_lines(pool, id).await?;
            Ok(Some(invoice_from_row(&row, lines)?))
        }
        None => Ok(None),
    }
}

/// Move an unpaid invoice to awaiting confirmation.
#[instrument(skip_all)]
pub async fn confirm_transfer(pool: &Pool, id: &str) -> Result<()> {
    let res = sqlx::query("UPDATE invoices SET status = ? WHERE id = ? AND status = ?")
        .bind(InvoiceStatus::AwaitingConfirmation.as_str())
        .bind(id)
        .bind(InvoiceStatus::Unpaid.as_str())
        .execute(pool)
        .await?;
    if res.rows_affected() == 0 {
        return Err(anyhow!("invoice {} is not awaiting payment", id));
    }
    Ok(())
}

#[instrument(skip_all)]
pub async fn pending_delivery_invoices(
    pool: &Pool,
    candidates: &BTreeSet<String>,
) -> Result<Vec<Invoice>> {
    if candidates.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT {INVOICE_COLUMNS} FROM invoices WHERE delivery_pending = 1 AND status = ? AND customer_phone IN ({}) ORDER BY created_at DESC, rowid DESC",
        placeholders(candidates.len())
    );
    let mut query = sqlx::query(&sql).bind(InvoiceStatus::Unpaid.as_str());
    for candidate in candidates {
        query = query.bind(candidate);
    }
    let rows = query.fetch_all(pool).await?;
    invoices_with_lines(pool, rows).await
}

#[instrument(skip_all)]
pub async fn latest_unpaid_invoice(
    pool: &Pool,
    candidates: &BTreeSet<String>,
) -> Result<Option<Invoice>> {
    if candidates.is_empty() {
        return Ok(None);
    }
    let sql = format!(
        "SELECT {INVOICE_COLUMNS} FROM invoices WHERE status = ? AND customer_phone IN ({}) ORDER BY created_at DESC, rowid DESC LIMIT 1",
        placeholders(candidates.len())
    );
    let mut query = sqlx::query(&sql).bind(InvoiceStatus::Unpaid.as_str());
    for candidate in candidates {
        query = query.bind(candidate);
    }
    let rows = query.fetch_all(pool).await?;
    Ok(invoices_with_lines(pool, rows).await?.into_iter().next())
}

#[instrument(skip_all)]
pub async fn set_delivery_pending(pool: &Pool, id: &str, pending: bool) -> Result<()> {
    sqlx::query("UPDATE invoices SET delivery_pending = ? WHERE id = ?")
        .bind(pending)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn mark_customer_opted_in(pool: &Pool, customer: CustomerId) -> Result<()> {
    sqlx::query("UPDATE customers SET opted_in = 1 WHERE id = ?")
        .bind(customer)
        .execute(pool)
        .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn customer_opted_in(pool: &Pool, customer: CustomerId) -> Result<bool> {
    let opted: Option<bool> = sqlx::query_scalar("SELECT opted_in FROM customers WHERE id = ?")
        .bind(customer)
        .fetch_optional(pool)
        .await?;
    Ok(opted.unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phone;
    use chrono::TimeZone;

    async fn setup_pool() -> Pool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    fn payout() -> PayoutDetails {
        PayoutDetails {
            bank_name: "GTBank".into(),
            account_number: "0123456789".into(),
            account_name: "Ada Hair Ltd".into(),
        }
    }

    async fn seeded_account(pool: &Pool, balance: i64) -> AccountId {
        let mut account = NewAccount::verified("Ada Hair", "08011112222");
        account.payout = Some(payout());
        account.invoice_balance = balance;
        insert_account(pool, &account).await.unwrap()
    }

    fn entities(lines: Vec<LineItem>) -> Entities {
        let mut e = Entities {
            customer_name: "Joy".into(),
            customer_phone: Some("+2348012345678".into()),
            lines,
            ..Default::default()
        };
        e.recompute_amount();
        e
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn sqlite_url_normalisation() {
        assert_eq!(prepare_sqlite_url("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(prepare_sqlite_url("postgres://x"), "postgres://x");
        let td = tempfile::tempdir().unwrap();
        let file = td.path().join("nested").join("db.sqlite");
        let url = prepare_sqlite_url(&format!("sqlite://{}", file.display()));
        assert_eq!(url, format!("sqlite://{}?mode=rwc", file.display()));
        assert!(file.parent().unwrap().exists());
    }

    #[tokio::test]
    async fn accounts_resolve_by_candidates_and_verification() {
        let pool = setup_pool().await;
        let id = seeded_account(&pool, 5).await;
        let mut unverified = NewAccount::verified("Old Shop", "+2348099999999");
        unverified.phone_verified = false;
        let old = insert_account(&pool, &unverified).await.unwrap();

        let found = find_account_by_phone(&pool, &phone::candidates("2348011112222"), true)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, id);
        assert_eq!(found.payout, Some(payout()));

        let c = phone::candidates("08099999999");
        assert!(find_account_by_phone(&pool, &c, true).await.unwrap().is_none());
        assert_eq!(
            find_account_by_phone(&pool, &c, false).await.unwrap().map(|a| a.id),
            Some(old)
        );
    }

    #[tokio::test]
    async fn catalog_paging_and_search() {
        let pool = setup_pool().await;
        let account = seeded_account(&pool, 5).await;
        for (name, price) in [("Bone Straight Wig", 45000), ("Wig Cap", 1500), ("Sneakers", 20000)] {
            insert_product(
                &pool,
                &NewProduct {
                    account_id: account,
                    name: name.into(),
                    unit_price: Decimal::from(price),
                    stock: None,
                },
            )
            .await
            .unwrap();
        }
        let (page, total) = list_products(&pool, account, 1, 2, None).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].name, "Bone Straight Wig");
        let (page2, _) = list_products(&pool, account, 2, 2, None).await.unwrap();
        assert_eq!(page2[0].name, "Sneakers");

        let (hits, total) = list_products(&pool, account, 1, 10, Some("WIG")).await.unwrap();
        assert_eq!(total, 2);
        assert!(hits.iter().all(|p| p.name.to_lowercase().contains("wig")));
        assert_eq!(
            get_product(&pool, account + 1, hits[0].id).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn create_invoice_is_transactional() {
        let pool = setup_pool().await;
        let account = seeded_account(&pool, 2).await;
        let product = insert_product(
            &pool,
            &NewProduct {
                account_id: account,
                name: "Wig".into(),
                unit_price: Decimal::from(12000),
                stock: Some(5),
            },
        )
        .await
        .unwrap();

        let mut line = LineItem::priced("Wig", 2, Decimal::from(12000));
        line.product_id = Some(product);
        let invoice = create_invoice(&pool, account, &entities(vec![line]), Some("https://docs.example/"), at(9))
            .await
            .unwrap();
        assert_eq!(invoice.amount, Decimal::from(24000));
        assert_eq!(
            invoice.document_url.as_deref(),
            Some(format!("https://docs.example/invoices/{}.pdf", invoice.id).as_str())
        );
        assert_eq!(quota_status(&pool, account).await.unwrap().balance, 1);
        assert_eq!(
            get_product(&pool, account, product).await.unwrap().unwrap().stock,
            Some(3)
        );

        let stored = fetch_invoice(&pool, &invoice.id).await.unwrap().unwrap();
        assert_eq!(stored.lines, invoice.lines);
        assert_eq!(stored.created_at, at(9));

        // Same phone reuses the customer row.
        let again = create_invoice(
            &pool,
            account,
            &entities(vec![LineItem::priced("Cap", 1, Decimal::from(1500))]),
            None,
            at(10),
        )
        .await
        .unwrap();
        assert_eq!(again.customer_id, invoice.customer_id);

        let err = create_invoice(
            &pool,
            account,
            &entities(vec![LineItem::priced("Cap", 1, Decimal::from(1500))]),
            None,
            at(11),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, InvoiceError::BalanceExhausted));
    }

    #[tokio::test]
    async fn missing_payout_details_writes_nothing() {
        let pool = setup_pool().await;
        let account = insert_account(&pool, &NewAccount::verified("No Bank", "08033334444"))
            .await
            .unwrap();
        let err = create_invoice(
            &pool,
            account,
            &entities(vec![LineItem::priced("Wig", 1, Decimal::from(12000))]),
            None,
            at(9),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, InvoiceError::MissingPayoutDetails));
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM invoices")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
        assert_eq!(quota_status(&pool, account).await.unwrap().balance, 20);
    }

    #[tokio::test]
    async fn delivery_queue_and_payment_confirmation() {
        let pool = setup_pool().await;
        let account = seeded_account(&pool, 10).await;
        let e = entities(vec![LineItem::priced("Wig", 1, Decimal::from(12000))]);
        let older = create_invoice(&pool, account, &e, None, at(8)).await.unwrap();
        let newer = create_invoice(&pool, account, &e, None, at(9)).await.unwrap();
        set_delivery_pending(&pool, &older.id, true).await.unwrap();
        set_delivery_pending(&pool, &newer.id, true).await.unwrap();

        let candidates = phone::candidates("08012345678");
        let pending = pending_delivery_invoices(&pool, &candidates).await.unwrap();
        assert_eq!(
            pending.iter().map(|i| i.id.as_str()).collect::<Vec<_>>(),
            vec![newer.id.as_str(), older.id.as_str()]
        );

        mark_customer_opted_in(&pool, newer.customer_id).await.unwrap();
        assert!(customer_opted_in(&pool, newer.customer_id).await.unwrap());

        let latest = latest_unpaid_invoice(&pool, &candidates).await.unwrap().unwrap();
        assert_eq!(latest.id, newer.id);
        confirm_transfer(&pool, &latest.id).await.unwrap();
        let stored = fetch_invoice(&pool, &newer.id).await.unwrap().unwrap();
        assert_eq!(stored.status, InvoiceStatus::AwaitingConfirmation);
        assert!(confirm_transfer(&pool, &newer.id).await.is_err());

        let pending = pending_delivery_invoices(&pool, &candidates).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, older.id);
    }
}
