use std::fmt;

use serde::{Deserialize, Serialize};

pub const STATUS_ACTIVE: &str = "A";
pub const STATUS_INACTIVE: &str = "I";

/// Appointment status codes, single-character as stored.
pub const APPT_PENDING: &str = "P";
pub const APPT_CONFIRMED: &str = "C";
pub const APPT_DONE: &str = "R";
pub const APPT_CANCELLED: &str = "X";

/// Closed set of login roles. Parsed once at the session boundary; everything
/// past that point matches exhaustively instead of comparing strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Barber,
    Client,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Barber => "barber",
            Role::Client => "client",
        }
    }

    pub fn parse(value: &str) -> Option<Role> {
        match value {
            "admin" => Some(Role::Admin),
            "barber" => Some(Role::Barber),
            "client" => Some(Role::Client),
            _ => None,
        }
    }

    /// Where a fresh login lands.
    pub fn landing(self) -> &'static str {
        match self {
            Role::Admin => "/reportes",
            Role::Barber => "/citas",
            Role::Client => "/servicios/menu",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password_hash: String,
    pub role: String,
    pub email: String,
    pub created_at: String,
    pub last_login: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct ClientRow {
    pub id: String,
    pub first_name: String,
    pub last_name1: String,
    pub last_name2: String,
    pub phone: String,
    pub email: String,
    pub birth_date: Option<String>,
    pub address: String,
    pub status: String,
    pub registered_on: String,
    pub registered_by: String,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct BarberRow {
    pub id: String,
    pub first_name: String,
    pub last_name1: String,
    pub last_name2: String,
    pub phone: String,
    pub email: String,
    pub birth_date: Option<String>,
    pub hired_on: String,
    pub status: String,
    pub registered_by: String,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct SpecialtyRow {
    pub id: i64,
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct ServiceRow {
    pub id: String,
    pub name: String,
    pub description: String,
    pub price: f64,
    pub duration_minutes: i64,
    pub image: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct ProductRow {
    pub id: String,
    pub name: String,
    pub brand: String,
    pub description: String,
    pub sale_price: f64,
    pub cost: f64,
    pub stock: i64,
    pub min_stock: i64,
    pub entry_date: Option<String>,
    pub exit_date: Option<String>,
    pub image: Option<String>,
}

/// Appointment joined with the display names its list screens need.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct AppointmentRow {
    pub id: String,
    pub client_id: String,
    pub barber_id: String,
    pub service_id: String,
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    pub status: String,
    pub notes: String,
    pub client_name: String,
    pub barber_name: String,
    pub service_name: String,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct SaleRow {
    pub id: String,
    pub client_id: String,
    pub client_name: String,
    pub total: f64,
    pub sold_on: String,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct SaleDetailRow {
    pub id: String,
    pub sale_id: String,
    pub service_id: Option<String>,
    pub product_id: Option<String>,
    pub quantity: i64,
    pub unit_price: f64,
    pub subtotal: f64,
    pub concept: String,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct PaymentRow {
    pub id: String,
    pub sale_id: String,
    pub amount: f64,
    pub method: String,
    pub paid_on: String,
}
