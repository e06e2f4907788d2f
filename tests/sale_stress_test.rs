//! Concurrency check for the guarded stock decrement: whatever interleaving
//! the pool produces, stock never goes negative and every committed sale
//! accounts for exactly its own units.

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

use barberia::{db, sales};

fn product_line(quantity: i64) -> sales::SaleLineInput {
    sales::SaleLineInput {
        tipo: Some("producto".into()),
        id: Some("PRD001".into()),
        cantidad: Some(serde_json::json!(quantity)),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_sales_never_oversell() {
    let path = std::env::temp_dir().join(format!("barberia-stress-{}.db", std::process::id()));
    let _ = std::fs::remove_file(&path);

    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path.display()))
        .unwrap()
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .unwrap();

    db::run_migrations(&pool).await.unwrap();
    sqlx::query(
        "INSERT INTO clients (id, first_name, last_name1, registered_on) VALUES ('CLI001', 'Marco', 'Soto', '2026-01-01')",
    )
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query(
        "INSERT INTO products (id, name, sale_price, cost, stock, min_stock) VALUES ('PRD001', 'Pomada', 80.0, 45.0, 4, 1)",
    )
    .execute(&pool)
    .await
    .unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            sales::create_sale(&pool, "CLI001", vec![product_line(1)]).await
        }));
    }

    let mut committed = 0_i64;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            committed += 1;
        }
    }

    let stock: i64 = sqlx::query_scalar("SELECT stock FROM products WHERE id = 'PRD001'")
        .fetch_one(&pool)
        .await
        .unwrap();
    let sold: Option<i64> = sqlx::query_scalar("SELECT SUM(quantity) FROM sale_details")
        .fetch_one(&pool)
        .await
        .unwrap();
    let sales_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sales")
        .fetch_one(&pool)
        .await
        .unwrap();

    // The invariants hold no matter which requests lost the race.
    assert!(stock >= 0, "stock went negative: {stock}");
    assert!(committed >= 1);
    assert_eq!(sales_count, committed);
    assert_eq!(sold.unwrap_or(0), committed);
    assert_eq!(stock, 4 - committed);

    pool.close().await;
    let _ = std::fs::remove_file(&path);
}
