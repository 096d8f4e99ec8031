//! PostgreSQL backend over the postgres / tokio-postgres pair.
//!
//! Both handles reconnect per scope; pooling belongs to the caller's driver
//! setup, not here. Row values are decoded by column type into [`Value`].

use super::{returns_rows, AsyncDbCursor, AsyncDbQuery, DbCursor, DbQuery, DbType};
use crate::error::{Error, Result};
use crate::value::Value;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use tokio_postgres::config::SslMode;
use tokio_postgres::types::Type;

/// Connection options for the PostgreSQL backends
#[derive(Debug, Clone)]
pub struct DbConfigPg {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
    /// Request TLS from the server (sslmode=require)
    pub ssl: bool,
}

impl DbConfigPg {
    pub fn new(
        host: impl Into<String>,
        dbname: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        DbConfigPg {
            host: host.into(),
            dbname: dbname.into(),
            user: user.into(),
            password: password.into(),
            ..Default::default()
        }
    }
}

impl Default for DbConfigPg {
    fn default() -> Self {
        DbConfigPg {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "postgres".to_string(),
            user: "postgres".to_string(),
            password: String::new(),
            ssl: false,
        }
    }
}

/// Blocking PostgreSQL backend handle
pub struct PostgresQuery {
    config: DbConfigPg,
}

impl PostgresQuery {
    pub fn new(config: DbConfigPg) -> Self {
        PostgresQuery { config }
    }
}

impl DbQuery for PostgresQuery {
    fn connect(&self) -> Result<Box<dyn DbCursor>> {
        let mut config = postgres::Config::new();
        config
            .host(&self.config.host)
            .port(self.config.port)
            .dbname(&self.config.dbname)
            .user(&self.config.user)
            .password(&self.config.password)
            .ssl_mode(ssl_mode(self.config.ssl));
        let client = config.connect(postgres::NoTls)?;
        Ok(Box::new(PostgresCursor {
            client,
            rows: Vec::new(),
        }))
    }

    fn get_type(&self) -> DbType {
        DbType::Postgres
    }
}

struct PostgresCursor {
    client: postgres::Client,
    rows: Vec<Vec<Value>>,
}

impl DbCursor for PostgresCursor {
    fn execute(&mut self, sql: &str) -> Result<u64> {
        if returns_rows(sql) {
            let rows = self.client.query(sql, &[])?;
            self.rows = convert_rows(&rows)?;
            Ok(0)
        } else {
            Ok(self.client.execute(sql, &[])?)
        }
    }

    fn fetchall(&mut self) -> Result<Vec<Vec<Value>>> {
        Ok(std::mem::take(&mut self.rows))
    }
}

/// Cooperative PostgreSQL backend handle
pub struct AsyncPostgresQuery {
    config: DbConfigPg,
}

impl AsyncPostgresQuery {
    pub fn new(config: DbConfigPg) -> Self {
        AsyncPostgresQuery { config }
    }
}

#[async_trait]
impl AsyncDbQuery for AsyncPostgresQuery {
    async fn connect(&self) -> Result<Box<dyn AsyncDbCursor>> {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&self.config.host)
            .port(self.config.port)
            .dbname(&self.config.dbname)
            .user(&self.config.user)
            .password(&self.config.password)
            .ssl_mode(ssl_mode(self.config.ssl));
        let (client, connection) = config.connect(tokio_postgres::NoTls).await?;
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                log::warn!("postgres connection closed: {err}");
            }
        });
        Ok(Box::new(AsyncPostgresCursor {
            client,
            rows: Vec::new(),
        }))
    }

    fn get_type(&self) -> DbType {
        DbType::Postgres
    }
}

struct AsyncPostgresCursor {
    client: tokio_postgres::Client,
    rows: Vec<Vec<Value>>,
}

#[async_trait]
impl AsyncDbCursor for AsyncPostgresCursor {
    async fn execute(&mut self, sql: &str) -> Result<u64> {
        if returns_rows(sql) {
            let rows = self.client.query(sql, &[]).await?;
            self.rows = convert_rows(&rows)?;
            Ok(0)
        } else {
            Ok(self.client.execute(sql, &[]).await?)
        }
    }

    async fn fetchall(&mut self) -> Result<Vec<Vec<Value>>> {
        Ok(std::mem::take(&mut self.rows))
    }
}

fn ssl_mode(ssl: bool) -> SslMode {
    if ssl {
        SslMode::Require
    } else {
        SslMode::Disable
    }
}

/// Decode typed postgres rows into value tuples
fn convert_rows(rows: &[tokio_postgres::Row]) -> Result<Vec<Vec<Value>>> {
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let mut tuple = Vec::with_capacity(row.len());
        for (i, column) in row.columns().iter().enumerate() {
            tuple.push(convert_value(row, i, column.type_())?);
        }
        out.push(tuple);
    }
    Ok(out)
}

fn convert_value(row: &tokio_postgres::Row, i: usize, ty: &Type) -> Result<Value> {
    let value = if *ty == Type::BOOL {
        row.try_get::<_, Option<bool>>(i)?.into()
    } else if *ty == Type::INT2 {
        row.try_get::<_, Option<i16>>(i)?.map(i64::from).into()
    } else if *ty == Type::INT4 {
        row.try_get::<_, Option<i32>>(i)?.map(i64::from).into()
    } else if *ty == Type::INT8 {
        row.try_get::<_, Option<i64>>(i)?.into()
    } else if *ty == Type::FLOAT4 {
        row.try_get::<_, Option<f32>>(i)?.map(f64::from).into()
    } else if *ty == Type::FLOAT8 {
        row.try_get::<_, Option<f64>>(i)?.into()
    } else if *ty == Type::TEXT || *ty == Type::VARCHAR || *ty == Type::BPCHAR || *ty == Type::NAME
    {
        row.try_get::<_, Option<String>>(i)?.into()
    } else if *ty == Type::DATE {
        row.try_get::<_, Option<NaiveDate>>(i)?.into()
    } else if *ty == Type::TIMESTAMP {
        row.try_get::<_, Option<NaiveDateTime>>(i)?.into()
    } else if *ty == Type::BYTEA {
        row.try_get::<_, Option<Vec<u8>>>(i)?.into()
    } else {
        return Err(Error::Backend(format!(
            "unsupported postgres column type {ty} at index {i}"
        )));
    };
    Ok(value)
}
