use actix_web::{http::header, middleware::from_fn, web, HttpResponse, Result};
use askama::Template;
use chrono::Utc;
use serde::Deserialize;

use crate::{
    errors::AppError,
    guards::require_staff,
    ids::{next_id, Entity},
    models::ProductRow,
    state::AppState,
    templates::render,
};

#[derive(Template)]
#[template(path = "products_menu.html")]
struct ProductsMenuTemplate {
    products: Vec<ProductRow>,
}

#[derive(Deserialize)]
struct ProductForm {
    #[serde(rename = "Nombre", default)]
    name: String,
    #[serde(rename = "Marca", default)]
    brand: String,
    #[serde(rename = "Descripcion", default)]
    description: String,
    #[serde(rename = "PrecioVenta", default)]
    sale_price: String,
    #[serde(rename = "Costo", default)]
    cost: String,
    #[serde(rename = "StockActual", default)]
    stock: String,
    #[serde(rename = "StockMinimo", default)]
    min_stock: String,
    #[serde(rename = "FechaEntrada", default)]
    entry_date: String,
    #[serde(rename = "FechaSalida", default)]
    exit_date: String,
    #[serde(rename = "Imagen", default)]
    image: String,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    // Same split as /servicios: the public catalog endpoints bypass the
    // gate, everything else is staff only.
    cfg.service(
        web::scope("/productos")
            .service(web::resource("/menu").route(web::get().to(menu)))
            .service(web::resource("/api").route(web::get().to(api)))
            .service(
                web::scope("")
                    .wrap(from_fn(require_staff))
                    .service(web::resource("").route(web::get().to(list)))
                    .service(web::resource("/agregar").route(web::post().to(create)))
                    .service(web::resource("/editar/{id}").route(web::post().to(update)))
                    .service(web::resource("/eliminar/{id}").route(web::post().to(delete))),
            ),
    );
}

async fn fetch_all(state: &AppState) -> Result<Vec<ProductRow>, sqlx::Error> {
    sqlx::query_as::<_, ProductRow>(
        r#"SELECT id, name, brand, description, sale_price, cost, stock, min_stock,
                  entry_date, exit_date, image
           FROM products
           ORDER BY name"#,
    )
    .fetch_all(&state.db)
    .await
}

async fn menu(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let products = fetch_all(&state).await?;
    Ok(render(ProductsMenuTemplate { products }))
}

async fn api(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let products = fetch_all(&state).await?;
    Ok(HttpResponse::Ok()
        .insert_header((header::CACHE_CONTROL, "no-store"))
        .json(products))
}

async fn list(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let products = fetch_all(&state).await?;
    Ok(HttpResponse::Ok().json(products))
}

async fn create(
    state: web::Data<AppState>,
    form: web::Form<ProductForm>,
) -> Result<HttpResponse, AppError> {
    let form = form.into_inner();
    let fields = validated(&form)?;

    let id = next_id(&state.db, Entity::Product).await?;
    let entry_date = optional(&form.entry_date)
        .unwrap_or_else(|| Utc::now().format("%Y-%m-%d").to_string());

    sqlx::query(
        r#"INSERT INTO products
               (id, name, brand, description, sale_price, cost, stock, min_stock,
                entry_date, exit_date, image)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&id)
    .bind(fields.name)
    .bind(form.brand.trim())
    .bind(form.description.trim())
    .bind(fields.sale_price)
    .bind(fields.cost)
    .bind(fields.stock)
    .bind(fields.min_stock)
    .bind(&entry_date)
    .bind(optional(&form.exit_date))
    .bind(optional(&form.image))
    .execute(&state.db)
    .await?;

    Ok(see_other("/productos"))
}

async fn update(
    state: web::Data<AppState>,
    path: web::Path<String>,
    form: web::Form<ProductForm>,
) -> Result<HttpResponse, AppError> {
    let product_id = path.into_inner();
    let form = form.into_inner();
    let fields = validated(&form)?;

    let result = sqlx::query(
        r#"UPDATE products
              SET name = ?, brand = ?, description = ?, sale_price = ?, cost = ?,
                  stock = ?, min_stock = ?, entry_date = ?, exit_date = ?, image = ?
            WHERE id = ?"#,
    )
    .bind(fields.name)
    .bind(form.brand.trim())
    .bind(form.description.trim())
    .bind(fields.sale_price)
    .bind(fields.cost)
    .bind(fields.stock)
    .bind(fields.min_stock)
    .bind(optional(&form.entry_date))
    .bind(optional(&form.exit_date))
    .bind(optional(&form.image))
    .bind(&product_id)
    .execute(&state.db)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::Forbidden);
    }

    Ok(see_other("/productos"))
}

async fn delete(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let product_id = path.into_inner();

    // Products referenced by sale details stay; history would dangle.
    let referenced: Option<i64> =
        sqlx::query_scalar("SELECT 1 FROM sale_details WHERE product_id = ? LIMIT 1")
            .bind(&product_id)
            .fetch_optional(&state.db)
            .await?;
    if referenced.is_some() {
        return Err(AppError::InvalidInput(
            "No se puede eliminar: el producto tiene ventas asociadas.".into(),
        ));
    }

    let result = sqlx::query("DELETE FROM products WHERE id = ?")
        .bind(&product_id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::Forbidden);
    }

    Ok(see_other("/productos"))
}

struct ValidatedProduct<'a> {
    name: &'a str,
    sale_price: f64,
    cost: f64,
    stock: i64,
    min_stock: i64,
}

fn validated(form: &ProductForm) -> Result<ValidatedProduct<'_>, AppError> {
    let name = form.name.trim();
    if name.is_empty() {
        return Err(AppError::InvalidInput("Nombre requerido".into()));
    }
    let sale_price = parse_money(&form.sale_price)?;
    let cost = if form.cost.trim().is_empty() {
        0.0
    } else {
        parse_money(&form.cost)?
    };
    let stock = parse_count(&form.stock)?;
    let min_stock = parse_count(&form.min_stock)?;
    Ok(ValidatedProduct {
        name,
        sale_price,
        cost,
        stock,
        min_stock,
    })
}

fn parse_money(value: &str) -> Result<f64, AppError> {
    let parsed: f64 = value
        .trim()
        .parse()
        .map_err(|_| AppError::InvalidInput("Monto inválido".into()))?;
    if parsed < 0.0 {
        return Err(AppError::InvalidInput("Monto inválido".into()));
    }
    Ok(crate::sales::round2(parsed))
}

fn parse_count(value: &str) -> Result<i64, AppError> {
    if value.trim().is_empty() {
        return Ok(0);
    }
    let parsed: i64 = value
        .trim()
        .parse()
        .map_err(|_| AppError::InvalidInput("Cantidad inválida".into()))?;
    if parsed < 0 {
        return Err(AppError::InvalidInput("Cantidad inválida".into()));
    }
    Ok(parsed)
}

fn optional(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_owned())
}

fn see_other(location: &str) -> HttpResponse {
    HttpResponse::SeeOther()
        .append_header((header::LOCATION, location.to_owned()))
        .finish()
}
