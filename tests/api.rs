use actix_web::{
    cookie::Cookie,
    http::{header, StatusCode},
    test, web, App,
};
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use barberia::{auth, configure_app, db, ids, models::Role, state::AppState};

async fn test_state() -> AppState {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    db::run_migrations(&pool).await.unwrap();
    seed(&pool).await;
    ids::sync_counters(&pool).await.unwrap();
    AppState { db: pool }
}

async fn seed(pool: &SqlitePool) {
    for statement in [
        "INSERT INTO clients (id, first_name, last_name1, status, registered_on, registered_by) VALUES ('CLI007', 'Laura', 'Mora', 'A', '2026-01-01', 'laura')",
        "INSERT INTO clients (id, first_name, last_name1, status, registered_on, registered_by) VALUES ('CLI008', 'Pedro', 'Vega', 'A', '2026-01-01', 'pedro')",
        "INSERT INTO barbers (id, first_name, last_name1, hired_on, status, registered_by) VALUES ('BAR001', 'Luis', 'Campos', '2026-01-01', 'A', 'luis')",
        "INSERT INTO barbers (id, first_name, last_name1, hired_on, status, registered_by) VALUES ('BAR002', 'Sofia', 'Nunez', '2026-01-01', 'A', 'sofia')",
        "INSERT INTO services (id, name, price, duration_minutes) VALUES ('SER002', 'Corte clasico', 150.0, 30)",
        "INSERT INTO products (id, name, sale_price, cost, stock, min_stock) VALUES ('PRD001', 'Pomada', 80.0, 45.0, 3, 1)",
        "INSERT INTO appointments (id, client_id, barber_id, service_id, date, start_time, end_time, status) VALUES ('CIT001', 'CLI007', 'BAR001', 'SER002', '2026-08-01', '10:00', '10:30', 'P')",
        "INSERT INTO appointments (id, client_id, barber_id, service_id, date, start_time, end_time, status) VALUES ('CIT002', 'CLI008', 'BAR002', 'SER002', '2026-08-02', '11:00', '11:30', 'P')",
        "INSERT INTO appointments (id, client_id, barber_id, service_id, date, start_time, end_time, status) VALUES ('CIT003', 'CLI007', 'BAR002', 'SER002', '2026-08-05', '09:00', '09:45', 'P')",
    ] {
        sqlx::query(statement).execute(pool).await.unwrap();
    }
}

async fn session_for(
    state: &AppState,
    role: Role,
    client_id: Option<&str>,
    barber_id: Option<&str>,
) -> Cookie<'static> {
    let token = auth::create_session(&state.db, "USU001", "test-user", role, client_id, barber_id)
        .await
        .unwrap();
    Cookie::new(auth::SESSION_COOKIE, token)
}

macro_rules! app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($state.clone()))
                .configure(configure_app),
        )
        .await
    };
}

#[actix_web::test]
async fn unauthenticated_json_caller_gets_401() {
    let state = test_state().await;
    let app = app!(state);

    let req = test::TestRequest::get()
        .uri("/citas")
        .insert_header((header::ACCEPT, "application/json"))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let body: Value = test::read_body_json(res).await;
    assert_eq!(body["error"], "auth_required");
}

#[actix_web::test]
async fn unauthenticated_browser_is_sent_to_login() {
    let state = test_state().await;
    let app = app!(state);

    let req = test::TestRequest::get().uri("/citas").to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::FOUND);
    assert_eq!(
        res.headers().get(header::LOCATION).unwrap(),
        "/login?next=%2Fcitas"
    );
}

#[actix_web::test]
async fn client_sees_only_their_own_appointments_newest_first() {
    let state = test_state().await;
    let app = app!(state);
    let cookie = session_for(&state, Role::Client, Some("CLI007"), None).await;

    let req = test::TestRequest::get()
        .uri("/citas")
        .cookie(cookie)
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::OK);

    let body: Value = test::read_body_json(res).await;
    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|row| row["client_id"] == "CLI007"));
    assert_eq!(rows[0]["id"], "CIT003");
    assert_eq!(rows[1]["id"], "CIT001");
}

#[actix_web::test]
async fn admin_sees_every_appointment() {
    let state = test_state().await;
    let app = app!(state);
    let cookie = session_for(&state, Role::Admin, None, None).await;

    let req = test::TestRequest::get()
        .uri("/citas")
        .cookie(cookie)
        .to_request();
    let res = test::call_service(&app, req).await;
    let body: Value = test::read_body_json(res).await;
    assert_eq!(body.as_array().unwrap().len(), 3);
}

fn appointment_form(client_id: &str, barber_id: &str) -> Vec<(String, String)> {
    vec![
        ("ClienteID".into(), client_id.into()),
        ("BarberoID".into(), barber_id.into()),
        ("ServicioID".into(), "SER002".into()),
        ("Fecha".into(), "2026-08-10".into()),
        ("HoraInicio".into(), "10:00".into()),
        ("HoraFin".into(), "11:00".into()),
        ("Estado".into(), "P".into()),
        ("Notas".into(), "".into()),
    ]
}

#[actix_web::test]
async fn foreign_appointment_writes_are_forbidden() {
    let state = test_state().await;
    let app = app!(state);

    // CIT002 belongs to CLI008; CLI007 cannot edit or delete it.
    let cookie = session_for(&state, Role::Client, Some("CLI007"), None).await;
    let req = test::TestRequest::post()
        .uri("/citas/editar/CIT002")
        .cookie(cookie.clone())
        .set_form(appointment_form("CLI008", "BAR002"))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let req = test::TestRequest::post()
        .uri("/citas/eliminar/CIT002")
        .cookie(cookie)
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    // A barber that is not BAR002 is rejected the same way.
    let cookie = session_for(&state, Role::Barber, None, Some("BAR001")).await;
    let req = test::TestRequest::post()
        .uri("/citas/editar/CIT002")
        .cookie(cookie)
        .set_form(appointment_form("CLI008", "BAR002"))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn owner_and_admin_can_edit_an_appointment() {
    let state = test_state().await;
    let app = app!(state);

    let cookie = session_for(&state, Role::Client, Some("CLI008"), None).await;
    let req = test::TestRequest::post()
        .uri("/citas/editar/CIT002")
        .cookie(cookie)
        .set_form(appointment_form("CLI008", "BAR002"))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);

    let cookie = session_for(&state, Role::Admin, None, None).await;
    let req = test::TestRequest::post()
        .uri("/citas/eliminar/CIT002")
        .cookie(cookie)
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
}

#[actix_web::test]
async fn client_payload_identity_fields_are_overwritten() {
    let state = test_state().await;
    let app = app!(state);

    // CLI007 claims the appointment is for CLI008; the session wins.
    let cookie = session_for(&state, Role::Client, Some("CLI007"), None).await;
    let req = test::TestRequest::post()
        .uri("/citas/agregar")
        .cookie(cookie)
        .set_form(appointment_form("CLI008", "BAR001"))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);

    let owner: String = sqlx::query_scalar(
        "SELECT client_id FROM appointments WHERE date = '2026-08-10' LIMIT 1",
    )
    .fetch_one(&state.db)
    .await
    .unwrap();
    assert_eq!(owner, "CLI007");
}

#[actix_web::test]
async fn invalid_time_range_is_rejected() {
    let state = test_state().await;
    let app = app!(state);
    let cookie = session_for(&state, Role::Admin, None, None).await;

    let mut form = appointment_form("CLI007", "BAR001");
    form[4].1 = "11:00".into();
    form[5].1 = "10:00".into();
    let req = test::TestRequest::post()
        .uri("/citas/agregar")
        .cookie(cookie)
        .set_form(form)
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn sale_with_insufficient_stock_rolls_back() {
    let state = test_state().await;
    let app = app!(state);
    let cookie = session_for(&state, Role::Barber, None, Some("BAR001")).await;

    let req = test::TestRequest::post()
        .uri("/ventas/nueva")
        .cookie(cookie)
        .set_json(json!({
            "ClienteID": "CLI007",
            "lineas": [{ "tipo": "producto", "id": "PRD001", "cantidad": 5 }]
        }))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let body = test::read_body(res).await;
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("Insufficient stock"));

    let stock: i64 = sqlx::query_scalar("SELECT stock FROM products WHERE id = 'PRD001'")
        .fetch_one(&state.db)
        .await
        .unwrap();
    assert_eq!(stock, 3);

    let sales: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sales")
        .fetch_one(&state.db)
        .await
        .unwrap();
    assert_eq!(sales, 0);
}

#[actix_web::test]
async fn service_sale_totals_match_the_details() {
    let state = test_state().await;
    let app = app!(state);
    let cookie = session_for(&state, Role::Admin, None, None).await;

    let req = test::TestRequest::post()
        .uri("/ventas/nueva")
        .cookie(cookie)
        .set_json(json!({
            "ClienteID": "CLI007",
            "lineas": [{ "tipo": "servicio", "id": "SER002", "cantidad": 2 }]
        }))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(res.headers().get(header::LOCATION).unwrap(), "/ventas");

    let (total, detail_sum): (f64, f64) = sqlx::query_as(
        r#"SELECT v.total, (SELECT SUM(subtotal) FROM sale_details WHERE sale_id = v.id)
           FROM sales v LIMIT 1"#,
    )
    .fetch_one(&state.db)
    .await
    .unwrap();
    assert_eq!(total, 300.0);
    assert_eq!(detail_sum, 300.0);
}

#[actix_web::test]
async fn single_line_object_bodies_are_accepted() {
    let state = test_state().await;
    let app = app!(state);
    let cookie = session_for(&state, Role::Admin, None, None).await;

    let req = test::TestRequest::post()
        .uri("/ventas/nueva")
        .cookie(cookie)
        .set_json(json!({
            "ClienteID": "CLI007",
            "lineas": { "tipo": "producto", "id": "PRD001", "cantidad": "2" }
        }))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);

    let stock: i64 = sqlx::query_scalar("SELECT stock FROM products WHERE id = 'PRD001'")
        .fetch_one(&state.db)
        .await
        .unwrap();
    assert_eq!(stock, 1);
}

#[actix_web::test]
async fn authenticated_login_page_redirects_to_landing() {
    let state = test_state().await;
    let app = app!(state);

    let cookie = session_for(&state, Role::Client, Some("CLI007"), None).await;
    let req = test::TestRequest::get()
        .uri("/login")
        .cookie(cookie)
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::FOUND);
    assert_eq!(
        res.headers().get(header::LOCATION).unwrap(),
        "/servicios/menu"
    );

    let cookie = session_for(&state, Role::Admin, None, None).await;
    let req = test::TestRequest::get()
        .uri("/login")
        .cookie(cookie)
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.headers().get(header::LOCATION).unwrap(), "/reportes");
}

#[actix_web::test]
async fn public_catalog_needs_no_session() {
    let state = test_state().await;
    let app = app!(state);

    for uri in ["/servicios/api", "/productos/api"] {
        let req = test::TestRequest::get().uri(uri).to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers().get(header::CACHE_CONTROL).unwrap(), "no-store");
    }

    for uri in ["/servicios/menu", "/productos/menu"] {
        let req = test::TestRequest::get().uri(uri).to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::OK);
    }
}

#[actix_web::test]
async fn role_gates_hold_for_staff_and_admin_areas() {
    let state = test_state().await;
    let app = app!(state);

    // Clients are neither staff nor admin.
    let cookie = session_for(&state, Role::Client, Some("CLI007"), None).await;
    for uri in ["/ventas", "/barberos", "/pagos", "/especialidades", "/reportes", "/servicios"] {
        let req = test::TestRequest::get()
            .uri(uri)
            .cookie(cookie.clone())
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN, "client reached {uri}");
    }

    // Barbers reach staff areas but not admin reports.
    let cookie = session_for(&state, Role::Barber, None, Some("BAR001")).await;
    let req = test::TestRequest::get()
        .uri("/ventas")
        .cookie(cookie.clone())
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::OK);

    let req = test::TestRequest::get()
        .uri("/reportes")
        .cookie(cookie)
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn clients_only_see_their_own_record() {
    let state = test_state().await;
    let app = app!(state);

    let cookie = session_for(&state, Role::Client, Some("CLI007"), None).await;
    let req = test::TestRequest::get()
        .uri("/clientes")
        .cookie(cookie)
        .to_request();
    let res = test::call_service(&app, req).await;
    let body: Value = test::read_body_json(res).await;
    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["id"], "CLI007");
}

#[actix_web::test]
async fn payments_track_a_sale_balance() {
    let state = test_state().await;
    let app = app!(state);
    let cookie = session_for(&state, Role::Admin, None, None).await;

    let req = test::TestRequest::post()
        .uri("/ventas/nueva")
        .cookie(cookie.clone())
        .set_json(json!({
            "ClienteID": "CLI007",
            "lineas": [{ "tipo": "servicio", "id": "SER002", "cantidad": 2 }]
        }))
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::SEE_OTHER
    );

    let sale_id: String = sqlx::query_scalar("SELECT id FROM sales LIMIT 1")
        .fetch_one(&state.db)
        .await
        .unwrap();

    let req = test::TestRequest::post()
        .uri("/pagos/nuevo")
        .cookie(cookie.clone())
        .set_form(vec![
            ("VentaID".to_owned(), sale_id.clone()),
            ("Monto".to_owned(), "100".to_owned()),
            ("MetodoPago".to_owned(), "efectivo".to_owned()),
        ])
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::SEE_OTHER
    );

    let req = test::TestRequest::get()
        .uri(&format!("/pagos/venta/{sale_id}"))
        .cookie(cookie)
        .to_request();
    let res = test::call_service(&app, req).await;
    let body: Value = test::read_body_json(res).await;
    assert_eq!(body["totalPagado"], 100.0);
    assert_eq!(body["saldo"], 200.0);
}

#[actix_web::test]
async fn registration_creates_linked_client_and_login_works() {
    let state = test_state().await;
    let app = app!(state);

    let form = vec![
        ("nombreUsuario".to_owned(), "laura2".to_owned()),
        ("correo".to_owned(), "laura2@example.com".to_owned()),
        ("contrasena".to_owned(), "s3creta".to_owned()),
        ("rol".to_owned(), "client".to_owned()),
        ("nombre".to_owned(), "Laura".to_owned()),
        ("apellido1".to_owned(), "Quesada".to_owned()),
        ("telefono".to_owned(), "8888-1234".to_owned()),
    ];
    let req = test::TestRequest::post()
        .uri("/registro")
        .set_form(form.clone())
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::OK);

    let linked: String =
        sqlx::query_scalar("SELECT id FROM clients WHERE registered_by = 'laura2'")
            .fetch_one(&state.db)
            .await
            .unwrap();
    assert!(linked.starts_with("CLI"));

    // Duplicate usernames are rejected without touching the tables.
    let req = test::TestRequest::post()
        .uri("/registro")
        .set_form(form)
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE username = 'laura2'")
        .fetch_one(&state.db)
        .await
        .unwrap();
    assert_eq!(users, 1);

    // And the fresh account can log in, landing on the client menu.
    let req = test::TestRequest::post()
        .uri("/login")
        .set_form(vec![
            ("nombreUsuario".to_owned(), "laura2".to_owned()),
            ("contrasena".to_owned(), "s3creta".to_owned()),
        ])
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        res.headers().get(header::LOCATION).unwrap(),
        "/servicios/menu"
    );
}

#[actix_web::test]
async fn wrong_password_is_rejected() {
    let state = test_state().await;
    let app = app!(state);

    let hash = auth::hash_password("correcta").unwrap();
    sqlx::query(
        "INSERT INTO users (id, username, password_hash, role, email, created_at) VALUES ('USU009', 'marco', ?, 'admin', '', '2026-01-01')",
    )
    .bind(&hash)
    .execute(&state.db)
    .await
    .unwrap();

    let req = test::TestRequest::post()
        .uri("/login")
        .set_form(vec![
            ("nombreUsuario".to_owned(), "marco".to_owned()),
            ("contrasena".to_owned(), "incorrecta".to_owned()),
        ])
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn csv_export_quotes_fields() {
    let state = test_state().await;
    let app = app!(state);

    sqlx::query("UPDATE clients SET first_name = 'Ana, \"La Tijera\"' WHERE id = 'CLI007'")
        .execute(&state.db)
        .await
        .unwrap();

    let cookie = session_for(&state, Role::Admin, None, None).await;
    let req = test::TestRequest::post()
        .uri("/ventas/nueva")
        .cookie(cookie.clone())
        .set_json(json!({
            "ClienteID": "CLI007",
            "lineas": [{ "tipo": "servicio", "id": "SER002" }]
        }))
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::SEE_OTHER
    );

    let req = test::TestRequest::get()
        .uri("/reportes/export/csv?tipo=detalle")
        .cookie(cookie)
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res
        .headers()
        .get(header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/csv"));

    let body = String::from_utf8(test::read_body(res).await.to_vec()).unwrap();
    let mut lines = body.split('\n');
    assert_eq!(
        lines.next().unwrap(),
        "VentaID,FechaVenta,Cliente,Concepto,Cantidad,PrecioUnitario,Subtotal"
    );
    assert!(body.contains("\"Ana, \"\"La Tijera\"\" Mora\""));
}
