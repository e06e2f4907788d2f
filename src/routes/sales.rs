use actix_web::{http::header, middleware::from_fn, web, HttpResponse, Result};
use serde::Deserialize;
use serde_json::json;

use crate::{
    errors::AppError,
    guards::require_staff,
    models::{SaleDetailRow, SaleRow, STATUS_ACTIVE},
    sales::{create_sale, SaleLines},
    state::AppState,
};

#[derive(Deserialize)]
struct NewSaleRequest {
    #[serde(rename = "ClienteID", default)]
    client_id: Option<String>,
    #[serde(default)]
    lineas: Option<SaleLines>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/ventas")
            .wrap(from_fn(require_staff))
            .service(web::resource("").route(web::get().to(list)))
            .service(
                web::resource("/nueva")
                    .route(web::get().to(new_sale_data))
                    .route(web::post().to(create)),
            )
            .service(web::resource("/{id}").route(web::get().to(detail))),
    );
}

async fn list(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let rows = sqlx::query_as::<_, SaleRow>(
        r#"SELECT v.id, v.client_id,
                  c.first_name || ' ' || c.last_name1 AS client_name,
                  v.total, v.sold_on
           FROM sales v
           JOIN clients c ON c.id = v.client_id
           ORDER BY v.sold_on DESC, v.id DESC"#,
    )
    .fetch_all(&state.db)
    .await?;

    Ok(HttpResponse::Ok().json(rows))
}

/// Catalog data the new-sale form needs: active clients, services, and
/// products with their live stock.
async fn new_sale_data(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let clients = sqlx::query_as::<_, (String, String, String)>(
        "SELECT id, first_name, last_name1 FROM clients WHERE status = ? ORDER BY first_name, last_name1",
    )
    .bind(STATUS_ACTIVE)
    .fetch_all(&state.db)
    .await?;

    let services = sqlx::query_as::<_, (String, String, f64, i64)>(
        "SELECT id, name, price, duration_minutes FROM services ORDER BY name",
    )
    .fetch_all(&state.db)
    .await?;

    let products = sqlx::query_as::<_, (String, String, f64, i64)>(
        "SELECT id, name, sale_price, stock FROM products ORDER BY name",
    )
    .fetch_all(&state.db)
    .await?;

    Ok(HttpResponse::Ok().json(json!({
        "clientes": clients
            .into_iter()
            .map(|(id, first, last)| json!({ "id": id, "nombre": format!("{first} {last}") }))
            .collect::<Vec<_>>(),
        "servicios": services
            .into_iter()
            .map(|(id, name, price, minutes)| {
                json!({ "id": id, "nombre": name, "precio": price, "duracion": minutes })
            })
            .collect::<Vec<_>>(),
        "productos": products
            .into_iter()
            .map(|(id, name, price, stock)| {
                json!({ "id": id, "nombre": name, "precio": price, "stock": stock })
            })
            .collect::<Vec<_>>(),
    })))
}

async fn create(
    state: web::Data<AppState>,
    body: web::Json<NewSaleRequest>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    let client_id = body.client_id.unwrap_or_default();
    let lines = body.lineas.map(SaleLines::into_vec).unwrap_or_default();

    let sale = create_sale(&state.db, &client_id, lines).await?;
    log::info!(
        "Sale {} created for {} ({} lines, total {:.2})",
        sale.id,
        client_id.trim(),
        sale.line_count,
        sale.total
    );

    Ok(HttpResponse::SeeOther()
        .append_header((header::LOCATION, "/ventas"))
        .finish())
}

async fn detail(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let sale_id = path.into_inner();

    let header_row = sqlx::query_as::<_, SaleRow>(
        r#"SELECT v.id, v.client_id,
                  c.first_name || ' ' || c.last_name1 AS client_name,
                  v.total, v.sold_on
           FROM sales v
           JOIN clients c ON c.id = v.client_id
           WHERE v.id = ?"#,
    )
    .bind(&sale_id)
    .fetch_optional(&state.db)
    .await?;

    let Some(header_row) = header_row else {
        return Ok(HttpResponse::NotFound().body("Venta no encontrada"));
    };

    let details = sqlx::query_as::<_, SaleDetailRow>(
        r#"SELECT d.id, d.sale_id, d.service_id, d.product_id, d.quantity,
                  d.unit_price, d.subtotal,
                  COALESCE(s.name, p.name, '') AS concept
           FROM sale_details d
           LEFT JOIN services s ON s.id = d.service_id
           LEFT JOIN products p ON p.id = d.product_id
           WHERE d.sale_id = ?
           ORDER BY d.id"#,
    )
    .bind(&sale_id)
    .fetch_all(&state.db)
    .await?;

    Ok(HttpResponse::Ok().json(json!({
        "venta": header_row,
        "detalle": details,
    })))
}
