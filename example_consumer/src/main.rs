//! Example consumer: serves `/accounts` backed by an `EntityStore`.
//!
//! Run from repo root: `cargo run -p example-consumer`
//! Reads `DATABASE_URL`, `BIND_ADDR` and the `ENTITY_*` settings from the environment or `.env`.

use entity_store::{
    assign, entity_routes, service_routes, Column, EngineConfig, Entity, EntityStore, Field,
    FieldType, Patch, SqlEntity, UpdateEntity, Value, ValueError,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;

const BODY_LIMIT: usize = 1024 * 1024;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct Account {
    id: i64,
    email: String,
    display_name: Option<String>,
    active: bool,
}

impl Entity for Account {
    fn new() -> Self {
        Account::default()
    }

    fn fields() -> Vec<Field> {
        vec![
            Field::of::<i64>("id"),
            Field::of::<String>("email"),
            Field::of::<Option<String>>("display_name"),
            Field::of::<bool>("active"),
        ]
    }

    fn get(&self, name: &str) -> Option<Value> {
        Some(match name {
            "id" => self.id.to_value(),
            "email" => self.email.to_value(),
            "display_name" => self.display_name.to_value(),
            "active" => self.active.to_value(),
            _ => return None,
        })
    }

    fn set(&mut self, name: &str, value: Value) -> Result<(), ValueError> {
        match name {
            "id" => assign(&mut self.id, value),
            "email" => assign(&mut self.email, value),
            "display_name" => assign(&mut self.display_name, value),
            "active" => assign(&mut self.active, value),
            other => Err(ValueError::UnknownField(other.to_string())),
        }
    }
}

impl SqlEntity for Account {
    fn columns() -> Vec<Column> {
        vec![
            Column::new("id", "BIGINT").primary_key(),
            Column::new("email", "VARCHAR(320)"),
            Column::new("display_name", "TEXT").nullable(),
            Column::new("active", "BOOLEAN"),
        ]
    }

    fn search_fields() -> Vec<&'static str> {
        vec!["email", "display_name"]
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AccountPatch {
    id: Patch<i64>,
    email: Patch<String>,
    display_name: Patch<Option<String>>,
    active: Patch<bool>,
}

impl UpdateEntity for AccountPatch {
    fn field(&self, name: &str) -> Option<Value> {
        match name {
            "id" => self.id.value(),
            "email" => self.email.value(),
            "display_name" => self.display_name.value(),
            "active" => self.active.value(),
            _ => None,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("entity_store=info")),
        )
        .init();

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "postgres://localhost/entity_store".into());
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    let config = EngineConfig::from_env()?;
    let accounts: EntityStore<Account, AccountPatch> =
        EntityStore::new(pool.clone(), &config, "accounts").await?;

    let app = service_routes(pool).nest(
        "/accounts",
        entity_routes::<Account, AccountPatch, _>(Arc::new(accounts), config, BODY_LIMIT),
    );
    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".into());
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
