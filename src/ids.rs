use sqlx::{Executor, Sqlite, SqlitePool};

/// Entities that carry prefixed, zero-padded sequential identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    User,
    Client,
    Barber,
    Service,
    Product,
    Appointment,
    Sale,
    SaleDetail,
    Payment,
}

impl Entity {
    pub const ALL: [Entity; 9] = [
        Entity::User,
        Entity::Client,
        Entity::Barber,
        Entity::Service,
        Entity::Product,
        Entity::Appointment,
        Entity::Sale,
        Entity::SaleDetail,
        Entity::Payment,
    ];

    pub fn prefix(self) -> &'static str {
        match self {
            Entity::User => "USU",
            Entity::Client => "CLI",
            Entity::Barber => "BAR",
            Entity::Service => "SER",
            Entity::Product => "PRD",
            Entity::Appointment => "CIT",
            Entity::Sale => "VEN",
            Entity::SaleDetail => "DET",
            Entity::Payment => "PAG",
        }
    }

    /// Pad width of the numeric suffix. Values past the width keep their full
    /// digits instead of truncating.
    pub fn width(self) -> usize {
        match self {
            Entity::SaleDetail => 4,
            _ => 3,
        }
    }

    fn table(self) -> &'static str {
        match self {
            Entity::User => "users",
            Entity::Client => "clients",
            Entity::Barber => "barbers",
            Entity::Service => "services",
            Entity::Product => "products",
            Entity::Appointment => "appointments",
            Entity::Sale => "sales",
            Entity::SaleDetail => "sale_details",
            Entity::Payment => "payments",
        }
    }

    pub fn format(self, n: i64) -> String {
        format!("{}{:0width$}", self.prefix(), n, width = self.width())
    }
}

/// Returns the next identifier for `entity`, e.g. `VEN042`.
///
/// The counter row is bumped with a single atomic upsert, so concurrent
/// callers can never observe the same value. Run it on the same transaction
/// as the insert it feeds so an aborted insert does not leave a visible gap
/// mid-flight.
pub async fn next_id<'e, E>(executor: E, entity: Entity) -> Result<String, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let n: i64 = sqlx::query_scalar(
        r#"INSERT INTO id_counters (prefix, value) VALUES (?, 1)
           ON CONFLICT(prefix) DO UPDATE SET value = value + 1
           RETURNING value"#,
    )
    .bind(entity.prefix())
    .fetch_one(executor)
    .await?;

    Ok(entity.format(n))
}

/// Floors every counter to the highest numeric suffix already present in its
/// table, so databases with pre-existing rows never hand out duplicates.
pub async fn sync_counters(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for entity in Entity::ALL {
        let query = format!(
            "SELECT COALESCE(MAX(CAST(SUBSTR(id, {start}) AS INTEGER)), 0) FROM {table} WHERE id LIKE ?",
            start = entity.prefix().len() + 1,
            table = entity.table(),
        );
        let max_suffix: i64 = sqlx::query_scalar(&query)
            .bind(format!("{}%", entity.prefix()))
            .fetch_one(pool)
            .await?;

        if max_suffix > 0 {
            sqlx::query(
                r#"INSERT INTO id_counters (prefix, value) VALUES (?, ?)
                   ON CONFLICT(prefix) DO UPDATE SET value = MAX(value, excluded.value)"#,
            )
            .bind(entity.prefix())
            .bind(max_suffix)
            .execute(pool)
            .await?;
        }
    }
    Ok(())
}
