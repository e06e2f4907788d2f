use actix_web::{http::header, middleware::from_fn, web, HttpResponse, Result};
use chrono::{Duration, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;

use crate::{errors::AppError, guards::require_admin, sales::round2, state::AppState};

#[derive(Deserialize)]
struct ReportQuery {
    desde: Option<String>,
    hasta: Option<String>,
    cliente: Option<String>,
    barbero: Option<String>,
    tipo: Option<String>,
}

struct Range {
    from: String,
    /// Exclusive upper bound, one day past `hasta`.
    to: String,
    until: String,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/reportes")
            .wrap(from_fn(require_admin))
            .service(web::resource("").route(web::get().to(overview)))
            .service(web::resource("/export/csv").route(web::get().to(export_csv))),
    );
}

/// Last 30 days unless both bounds parse.
fn parse_range(query: &ReportQuery) -> Range {
    let today = Utc::now().date_naive();
    let from = query
        .desde
        .as_deref()
        .and_then(|value| NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok())
        .unwrap_or(today - Duration::days(30));
    let until = query
        .hasta
        .as_deref()
        .and_then(|value| NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok())
        .unwrap_or(today);
    Range {
        from: from.format("%Y-%m-%d").to_string(),
        to: (until + Duration::days(1)).format("%Y-%m-%d").to_string(),
        until: until.format("%Y-%m-%d").to_string(),
    }
}

fn filter_id(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
}

async fn overview(
    state: web::Data<AppState>,
    query: web::Query<ReportQuery>,
) -> Result<HttpResponse, AppError> {
    let range = parse_range(&query);
    let client = filter_id(&query.cliente);
    let barber = filter_id(&query.barbero);

    let (sale_count, amount_total): (i64, f64) = sqlx::query_as(
        r#"SELECT COUNT(*), COALESCE(SUM(total), 0.0)
           FROM sales
           WHERE SUBSTR(sold_on, 1, 10) >= ? AND SUBSTR(sold_on, 1, 10) < ?
             AND (? IS NULL OR client_id = ?)"#,
    )
    .bind(&range.from)
    .bind(&range.to)
    .bind(&client)
    .bind(&client)
    .fetch_one(&state.db)
    .await?;

    let average_ticket = if sale_count == 0 {
        0.0
    } else {
        round2(amount_total / sale_count as f64)
    };

    let per_day: Vec<(String, f64)> = sqlx::query_as(
        r#"SELECT SUBSTR(sold_on, 1, 10) AS day, SUM(total)
           FROM sales
           WHERE SUBSTR(sold_on, 1, 10) >= ? AND SUBSTR(sold_on, 1, 10) < ?
             AND (? IS NULL OR client_id = ?)
           GROUP BY day
           ORDER BY day"#,
    )
    .bind(&range.from)
    .bind(&range.to)
    .bind(&client)
    .bind(&client)
    .fetch_all(&state.db)
    .await?;

    let top_services: Vec<(String, f64)> = sqlx::query_as(
        r#"SELECT s.name, SUM(d.subtotal) AS total
           FROM sale_details d
           JOIN sales v ON v.id = d.sale_id
           JOIN services s ON s.id = d.service_id
           WHERE SUBSTR(v.sold_on, 1, 10) >= ? AND SUBSTR(v.sold_on, 1, 10) < ?
             AND (? IS NULL OR v.client_id = ?)
           GROUP BY s.name
           ORDER BY total DESC
           LIMIT 5"#,
    )
    .bind(&range.from)
    .bind(&range.to)
    .bind(&client)
    .bind(&client)
    .fetch_all(&state.db)
    .await?;

    let top_products: Vec<(String, f64, i64)> = sqlx::query_as(
        r#"SELECT p.name, SUM(d.subtotal) AS total, SUM(d.quantity)
           FROM sale_details d
           JOIN sales v ON v.id = d.sale_id
           JOIN products p ON p.id = d.product_id
           WHERE SUBSTR(v.sold_on, 1, 10) >= ? AND SUBSTR(v.sold_on, 1, 10) < ?
             AND (? IS NULL OR v.client_id = ?)
           GROUP BY p.name
           ORDER BY total DESC
           LIMIT 5"#,
    )
    .bind(&range.from)
    .bind(&range.to)
    .bind(&client)
    .bind(&client)
    .fetch_all(&state.db)
    .await?;

    let appointment_counts: Vec<(String, i64)> = sqlx::query_as(
        r#"SELECT status, COUNT(*)
           FROM appointments
           WHERE date >= ? AND date < ?
             AND (? IS NULL OR barber_id = ?)
             AND (? IS NULL OR client_id = ?)
           GROUP BY status"#,
    )
    .bind(&range.from)
    .bind(&range.to)
    .bind(&barber)
    .bind(&barber)
    .bind(&client)
    .bind(&client)
    .fetch_all(&state.db)
    .await?;

    let low_stock: Vec<(String, String, i64, i64)> = sqlx::query_as(
        r#"SELECT id, name, stock, min_stock
           FROM products
           WHERE stock <= min_stock
           ORDER BY (stock - min_stock) ASC, name
           LIMIT 10"#,
    )
    .fetch_all(&state.db)
    .await?;

    Ok(HttpResponse::Ok().json(json!({
        "desde": range.from,
        "hasta": range.until,
        "kpis": {
            "totalVentas": sale_count,
            "montoTotal": round2(amount_total),
            "ticketPromedio": average_ticket,
        },
        "porDia": per_day
            .into_iter()
            .map(|(day, total)| json!({ "dia": day, "total": round2(total) }))
            .collect::<Vec<_>>(),
        "topServicios": top_services
            .into_iter()
            .map(|(name, total)| json!({ "nombre": name, "total": round2(total) }))
            .collect::<Vec<_>>(),
        "topProductos": top_products
            .into_iter()
            .map(|(name, total, quantity)| {
                json!({ "nombre": name, "total": round2(total), "cantidad": quantity })
            })
            .collect::<Vec<_>>(),
        "citas": appointment_counts
            .into_iter()
            .map(|(status, count)| json!({ "estado": status, "cantidad": count }))
            .collect::<Vec<_>>(),
        "stockBajo": low_stock
            .into_iter()
            .map(|(id, name, stock, min_stock)| {
                json!({ "id": id, "nombre": name, "stock": stock, "stockMinimo": min_stock })
            })
            .collect::<Vec<_>>(),
    })))
}

async fn export_csv(
    state: web::Data<AppState>,
    query: web::Query<ReportQuery>,
) -> Result<HttpResponse, AppError> {
    let range = parse_range(&query);
    let client = filter_id(&query.cliente);
    let barber = filter_id(&query.barbero);
    let kind = query.tipo.as_deref().unwrap_or("");

    let (headers, rows): (Vec<&str>, Vec<Vec<String>>) = match kind {
        "porDia" => {
            let data: Vec<(String, f64)> = sqlx::query_as(
                r#"SELECT SUBSTR(sold_on, 1, 10) AS day, SUM(total)
                   FROM sales
                   WHERE SUBSTR(sold_on, 1, 10) >= ? AND SUBSTR(sold_on, 1, 10) < ?
                     AND (? IS NULL OR client_id = ?)
                   GROUP BY day
                   ORDER BY day"#,
            )
            .bind(&range.from)
            .bind(&range.to)
            .bind(&client)
            .bind(&client)
            .fetch_all(&state.db)
            .await?;
            (
                vec!["Dia", "Total"],
                data.into_iter()
                    .map(|(day, total)| vec![day, format!("{:.2}", round2(total))])
                    .collect(),
            )
        }
        "detalle" => {
            let data: Vec<(String, String, String, String, i64, f64, f64)> = sqlx::query_as(
                r#"SELECT v.id, v.sold_on,
                          c.first_name || ' ' || c.last_name1 AS client_name,
                          COALESCE(s.name, p.name, '') AS concept,
                          d.quantity, d.unit_price, d.subtotal
                   FROM sale_details d
                   JOIN sales v ON v.id = d.sale_id
                   JOIN clients c ON c.id = v.client_id
                   LEFT JOIN services s ON s.id = d.service_id
                   LEFT JOIN products p ON p.id = d.product_id
                   WHERE SUBSTR(v.sold_on, 1, 10) >= ? AND SUBSTR(v.sold_on, 1, 10) < ?
                     AND (? IS NULL OR v.client_id = ?)
                   ORDER BY v.sold_on, v.id"#,
            )
            .bind(&range.from)
            .bind(&range.to)
            .bind(&client)
            .bind(&client)
            .fetch_all(&state.db)
            .await?;
            (
                vec![
                    "VentaID",
                    "FechaVenta",
                    "Cliente",
                    "Concepto",
                    "Cantidad",
                    "PrecioUnitario",
                    "Subtotal",
                ],
                data.into_iter()
                    .map(|(id, sold_on, client_name, concept, quantity, unit_price, subtotal)| {
                        vec![
                            id,
                            sold_on,
                            client_name,
                            concept,
                            quantity.to_string(),
                            format!("{unit_price:.2}"),
                            format!("{subtotal:.2}"),
                        ]
                    })
                    .collect(),
            )
        }
        "citas" => {
            let data: Vec<(String, i64)> = sqlx::query_as(
                r#"SELECT status, COUNT(*)
                   FROM appointments
                   WHERE date >= ? AND date < ?
                     AND (? IS NULL OR barber_id = ?)
                     AND (? IS NULL OR client_id = ?)
                   GROUP BY status
                   ORDER BY status"#,
            )
            .bind(&range.from)
            .bind(&range.to)
            .bind(&barber)
            .bind(&barber)
            .bind(&client)
            .bind(&client)
            .fetch_all(&state.db)
            .await?;
            (
                vec!["Estado", "Cantidad"],
                data.into_iter()
                    .map(|(status, count)| vec![status, count.to_string()])
                    .collect(),
            )
        }
        _ => return Err(AppError::InvalidInput("Tipo inválido".into())),
    };

    let csv = to_csv(&headers, &rows);
    let filename = format!(
        "reporte_{kind}_{}.csv",
        Utc::now().format("%Y-%m-%d")
    );

    Ok(HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, "text/csv; charset=utf-8"))
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        ))
        .body(csv))
}

/// Header row first; fields containing comma, quote or newline are quoted
/// with internal quotes doubled.
fn to_csv(headers: &[&str], rows: &[Vec<String>]) -> String {
    let escape = |field: &str| -> String {
        if field.contains(',') || field.contains('"') || field.contains('\n') {
            format!("\"{}\"", field.replace('"', "\"\""))
        } else {
            field.to_owned()
        }
    };

    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(
        headers
            .iter()
            .map(|header| escape(header))
            .collect::<Vec<_>>()
            .join(","),
    );
    for row in rows {
        lines.push(
            row.iter()
                .map(|field| escape(field))
                .collect::<Vec<_>>()
                .join(","),
        );
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_quotes_only_what_needs_it() {
        let rows = vec![
            vec!["VEN001".to_owned(), "plain".to_owned()],
            vec!["VEN002".to_owned(), "with, comma".to_owned()],
            vec!["VEN003".to_owned(), "say \"hi\"".to_owned()],
            vec!["VEN004".to_owned(), "two\nlines".to_owned()],
        ];
        let csv = to_csv(&["Id", "Nota"], &rows);
        let lines: Vec<&str> = csv.split('\n').collect();
        assert_eq!(lines[0], "Id,Nota");
        assert_eq!(lines[1], "VEN001,plain");
        assert_eq!(lines[2], "VEN002,\"with, comma\"");
        assert_eq!(lines[3], "VEN003,\"say \"\"hi\"\"\"");
        assert_eq!(lines[4], "VEN004,\"two");
        assert_eq!(lines[5], "lines\"");
    }

    #[test]
    fn empty_result_is_just_the_header() {
        assert_eq!(to_csv(&["Dia", "Total"], &[]), "Dia,Total");
    }

    #[test]
    fn range_defaults_to_last_thirty_days() {
        let query = ReportQuery {
            desde: None,
            hasta: None,
            cliente: None,
            barbero: None,
            tipo: None,
        };
        let range = parse_range(&query);
        assert!(range.from < range.to);

        let pinned = ReportQuery {
            desde: Some("2026-03-01".into()),
            hasta: Some("2026-03-31".into()),
            cliente: None,
            barbero: None,
            tipo: None,
        };
        let range = parse_range(&pinned);
        assert_eq!(range.from, "2026-03-01");
        assert_eq!(range.to, "2026-04-01");
        assert_eq!(range.until, "2026-03-31");
    }
}
