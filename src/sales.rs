use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use sqlx::SqlitePool;

use crate::errors::AppError;
use crate::ids::{next_id, Entity};

/// Upper bound on one sale transaction; expiry rolls everything back instead
/// of sitting on the products write lock.
const SALE_TX_TIMEOUT: Duration = Duration::from_secs(5);

/// One requested line, as it arrives on the wire. Everything is optional:
/// malformed lines are skipped, not rejected.
#[derive(Debug, Clone, Deserialize)]
pub struct SaleLineInput {
    pub tipo: Option<String>,
    pub id: Option<String>,
    pub cantidad: Option<Value>,
}

/// `lineas` may arrive as an array or, when the form held a single line, as a
/// bare object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SaleLines {
    Many(Vec<SaleLineInput>),
    One(SaleLineInput),
}

impl SaleLines {
    pub fn into_vec(self) -> Vec<SaleLineInput> {
        match self {
            SaleLines::Many(lines) => lines,
            SaleLines::One(line) => vec![line],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineKind {
    Service,
    Product,
}

#[derive(Debug, Clone, PartialEq)]
struct ValidLine {
    kind: LineKind,
    id: String,
    quantity: i64,
}

#[derive(Debug, Clone)]
pub struct CreatedSale {
    pub id: String,
    pub total: f64,
    pub line_count: usize,
}

/// Creates a sale for `client_id` from the requested lines.
///
/// Runs as one transaction: catalog lookups, guarded stock decrements and
/// detail rows either all commit or none do. The header is written exactly
/// once, with the final total, after every line has been priced.
pub async fn create_sale(
    pool: &SqlitePool,
    client_id: &str,
    lines: Vec<SaleLineInput>,
) -> Result<CreatedSale, AppError> {
    let client_id = client_id.trim();
    if client_id.is_empty() {
        return Err(AppError::InvalidInput("Client is required".into()));
    }
    if lines.is_empty() {
        return Err(AppError::InvalidInput(
            "At least one sale line is required".into(),
        ));
    }

    tokio::time::timeout(SALE_TX_TIMEOUT, run_sale(pool, client_id, lines))
        .await
        .map_err(|_| AppError::Timeout)?
}

async fn run_sale(
    pool: &SqlitePool,
    client_id: &str,
    lines: Vec<SaleLineInput>,
) -> Result<CreatedSale, AppError> {
    let mut tx = pool.begin().await?;

    let known: Option<String> = sqlx::query_scalar("SELECT id FROM clients WHERE id = ?")
        .bind(client_id)
        .fetch_optional(&mut *tx)
        .await?;
    if known.is_none() {
        return Err(AppError::ReferenceNotFound(format!("Client {client_id}")));
    }

    let sale_id = next_id(&mut *tx, Entity::Sale).await?;

    struct Detail {
        id: String,
        service_id: Option<String>,
        product_id: Option<String>,
        quantity: i64,
        unit_price: f64,
        subtotal: f64,
    }

    let mut details: Vec<Detail> = Vec::new();
    let mut total = 0.0_f64;

    for line in normalize_lines(lines) {
        let unit_price = match line.kind {
            LineKind::Service => {
                sqlx::query_scalar::<_, f64>("SELECT price FROM services WHERE id = ?")
                    .bind(&line.id)
                    .fetch_optional(&mut *tx)
                    .await?
                    .ok_or_else(|| AppError::ReferenceNotFound(format!("Service {}", line.id)))?
            }
            LineKind::Product => {
                let price = sqlx::query_scalar::<_, f64>(
                    "SELECT sale_price FROM products WHERE id = ?",
                )
                .bind(&line.id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| AppError::ReferenceNotFound(format!("Product {}", line.id)))?;

                // Check-and-subtract in one statement; zero affected rows
                // means the stock was short and the whole sale aborts.
                let updated = sqlx::query(
                    "UPDATE products SET stock = stock - ? WHERE id = ? AND stock >= ?",
                )
                .bind(line.quantity)
                .bind(&line.id)
                .bind(line.quantity)
                .execute(&mut *tx)
                .await?;
                if updated.rows_affected() == 0 {
                    return Err(AppError::InsufficientStock(line.id.clone()));
                }
                price
            }
        };

        let subtotal = round2(line.quantity as f64 * unit_price);
        total += subtotal;

        let detail_id = next_id(&mut *tx, Entity::SaleDetail).await?;
        let (service_id, product_id) = match line.kind {
            LineKind::Service => (Some(line.id), None),
            LineKind::Product => (None, Some(line.id)),
        };
        details.push(Detail {
            id: detail_id,
            service_id,
            product_id,
            quantity: line.quantity,
            unit_price,
            subtotal,
        });
    }

    let total = round2(total);

    sqlx::query("INSERT INTO sales (id, client_id, total, sold_on) VALUES (?, ?, ?, ?)")
        .bind(&sale_id)
        .bind(client_id)
        .bind(total)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;

    for detail in &details {
        sqlx::query(
            r#"INSERT INTO sale_details (id, sale_id, service_id, product_id, quantity, unit_price, subtotal)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&detail.id)
        .bind(&sale_id)
        .bind(&detail.service_id)
        .bind(&detail.product_id)
        .bind(detail.quantity)
        .bind(detail.unit_price)
        .bind(detail.subtotal)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    Ok(CreatedSale {
        id: sale_id,
        total,
        line_count: details.len(),
    })
}

/// Drops lines with an unknown kind or missing ID and coerces quantities.
/// Lenient on purpose: a half-filled form row is ignored, not an error.
fn normalize_lines(lines: Vec<SaleLineInput>) -> Vec<ValidLine> {
    lines
        .into_iter()
        .filter_map(|line| {
            let kind = match line.tipo.as_deref().map(str::to_ascii_lowercase).as_deref() {
                Some("servicio") => LineKind::Service,
                Some("producto") => LineKind::Product,
                _ => return None,
            };
            let id = line.id.filter(|id| !id.trim().is_empty())?;
            Some(ValidLine {
                kind,
                id: id.trim().to_owned(),
                quantity: coerce_quantity(line.cantidad.as_ref()),
            })
        })
        .collect()
}

/// Integer ≥ 1; anything missing or unparseable becomes 1.
fn coerce_quantity(value: Option<&Value>) -> i64 {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(n) if n.is_finite() => (n as i64).max(1),
        _ => 1,
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
