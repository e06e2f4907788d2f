use actix_web::{http::header, middleware::from_fn, web, HttpResponse, Result};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::{
    errors::AppError,
    guards::require_staff,
    ids::{next_id, Entity},
    models::PaymentRow,
    sales::round2,
    state::AppState,
};

#[derive(Deserialize)]
struct PaymentForm {
    #[serde(rename = "VentaID", default)]
    sale_id: String,
    #[serde(rename = "Monto", default)]
    amount: String,
    #[serde(rename = "MetodoPago", default)]
    method: String,
    #[serde(rename = "FechaPago", default)]
    paid_on: String,
}

#[derive(Debug, sqlx::FromRow, serde::Serialize)]
struct PaymentListRow {
    id: String,
    sale_id: String,
    amount: f64,
    method: String,
    paid_on: String,
    sale_total: f64,
    client_name: String,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/pagos")
            .wrap(from_fn(require_staff))
            .service(web::resource("").route(web::get().to(list)))
            .service(web::resource("/nuevo").route(web::post().to(create)))
            .service(web::resource("/venta/{id}").route(web::get().to(by_sale))),
    );
}

async fn list(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let rows = sqlx::query_as::<_, PaymentListRow>(
        r#"SELECT p.id, p.sale_id, p.amount, p.method, p.paid_on,
                  v.total AS sale_total,
                  c.first_name || ' ' || c.last_name1 AS client_name
           FROM payments p
           JOIN sales v ON v.id = p.sale_id
           JOIN clients c ON c.id = v.client_id
           ORDER BY p.paid_on DESC"#,
    )
    .fetch_all(&state.db)
    .await?;

    Ok(HttpResponse::Ok().json(rows))
}

async fn create(
    state: web::Data<AppState>,
    form: web::Form<PaymentForm>,
) -> Result<HttpResponse, AppError> {
    let form = form.into_inner();
    let sale_id = form.sale_id.trim().to_owned();
    if sale_id.is_empty() {
        return Err(AppError::InvalidInput("Venta requerida".into()));
    }

    let amount: f64 = form
        .amount
        .trim()
        .parse()
        .map_err(|_| AppError::InvalidInput("Monto inválido".into()))?;
    if amount <= 0.0 {
        return Err(AppError::InvalidInput("Monto inválido".into()));
    }

    let method = form.method.trim();
    if method.is_empty() {
        return Err(AppError::InvalidInput("Método de pago requerido".into()));
    }

    let known: Option<String> = sqlx::query_scalar("SELECT id FROM sales WHERE id = ?")
        .bind(&sale_id)
        .fetch_optional(&state.db)
        .await?;
    if known.is_none() {
        return Err(AppError::ReferenceNotFound(format!("Sale {sale_id}")));
    }

    let paid_on = if form.paid_on.trim().is_empty() {
        Utc::now().format("%Y-%m-%d").to_string()
    } else {
        form.paid_on.trim().to_owned()
    };

    let id = next_id(&state.db, Entity::Payment).await?;
    sqlx::query(
        "INSERT INTO payments (id, sale_id, amount, method, paid_on) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&sale_id)
    .bind(round2(amount))
    .bind(method)
    .bind(&paid_on)
    .execute(&state.db)
    .await?;

    Ok(HttpResponse::SeeOther()
        .append_header((header::LOCATION, "/pagos"))
        .finish())
}

/// One sale's payment history plus its running balance.
async fn by_sale(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let sale_id = path.into_inner();

    let sale = sqlx::query_as::<_, (String, f64, String)>(
        r#"SELECT v.id, v.total, c.first_name || ' ' || c.last_name1 AS client_name
           FROM sales v
           JOIN clients c ON c.id = v.client_id
           WHERE v.id = ?"#,
    )
    .bind(&sale_id)
    .fetch_optional(&state.db)
    .await?;

    let Some((id, total, client_name)) = sale else {
        return Ok(HttpResponse::NotFound().body("Venta no encontrada"));
    };

    let payments = sqlx::query_as::<_, PaymentRow>(
        r#"SELECT id, sale_id, amount, method, paid_on
           FROM payments
           WHERE sale_id = ?
           ORDER BY paid_on DESC"#,
    )
    .bind(&sale_id)
    .fetch_all(&state.db)
    .await?;

    let paid: f64 = payments.iter().map(|payment| payment.amount).sum();
    let balance = round2(total - paid);

    Ok(HttpResponse::Ok().json(json!({
        "venta": { "id": id, "total": total, "cliente": client_name },
        "pagos": payments,
        "totalPagado": round2(paid),
        "saldo": balance,
    })))
}
