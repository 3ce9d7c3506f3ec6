//! SQL Server probes over `tiberius`.
//!
//! Each observation opens its own connection, runs one statement and reads
//! the first column of the first result set.

use std::time::Duration;

use async_trait::async_trait;
use tiberius::{AuthMethod, Client, ColumnData, Config, ToSql};
use tokio::net::TcpStream;
use tokio_util::compat::TokioAsyncWriteCompatExt;

use crate::config::SqlConfig;
use crate::error::ProbeError;
use crate::outcome::Outcome;
use crate::probe::Probe;

/// First-column value of a result row.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlScalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Other(String),
}

impl SqlScalar {
    fn from_column(data: ColumnData<'static>) -> Self {
        match data {
            ColumnData::Bit(Some(v)) => SqlScalar::Bool(v),
            ColumnData::U8(Some(v)) => SqlScalar::Int(i64::from(v)),
            ColumnData::I16(Some(v)) => SqlScalar::Int(i64::from(v)),
            ColumnData::I32(Some(v)) => SqlScalar::Int(i64::from(v)),
            ColumnData::I64(Some(v)) => SqlScalar::Int(v),
            ColumnData::F32(Some(v)) => SqlScalar::Float(f64::from(v)),
            ColumnData::F64(Some(v)) => SqlScalar::Float(v),
            ColumnData::String(Some(v)) => SqlScalar::Text(v.into_owned()),
            ColumnData::Guid(Some(v)) => SqlScalar::Text(v.to_string()),
            ColumnData::Bit(None)
            | ColumnData::U8(None)
            | ColumnData::I16(None)
            | ColumnData::I32(None)
            | ColumnData::I64(None)
            | ColumnData::F32(None)
            | ColumnData::F64(None)
            | ColumnData::String(None)
            | ColumnData::Guid(None) => SqlScalar::Null,
            other => SqlScalar::Other(format!("{other:?}")),
        }
    }

    fn render(&self) -> String {
        match self {
            SqlScalar::Null => "NULL".to_string(),
            SqlScalar::Bool(v) => v.to_string(),
            SqlScalar::Int(v) => v.to_string(),
            SqlScalar::Float(v) => v.to_string(),
            SqlScalar::Text(v) => v.clone(),
            SqlScalar::Other(v) => v.clone(),
        }
    }
}

/// What the first column of the result must look like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlExpectation {
    /// At least one row.
    AnyRow,
    /// First row's first column is true / non-zero.
    Truthy,
    /// First row's first column is a count greater than zero.
    PositiveCount,
}

/// Classify the first-column values of a result set.
pub fn classify_rows(expect: SqlExpectation, label: &str, rows: &[SqlScalar]) -> Outcome {
    let Some(first) = rows.first() else {
        return Outcome::Absent;
    };

    match expect {
        SqlExpectation::AnyRow => {
            let rendered = first.render();
            let head = rendered.lines().next().unwrap_or("").trim();
            Outcome::success(format!("{label}: {head}"))
        }
        SqlExpectation::Truthy => match first {
            SqlScalar::Bool(true) => Outcome::success(format!("{label}: yes")),
            SqlScalar::Int(v) if *v != 0 => Outcome::success(format!("{label}: yes")),
            _ => Outcome::Absent,
        },
        SqlExpectation::PositiveCount => match first {
            SqlScalar::Int(n) if *n > 0 => Outcome::success(format!("{label}: {n} row(s)")),
            SqlScalar::Int(_) => Outcome::Absent,
            other => Outcome::Error(ProbeError::malformed(
                label,
                format!("expected a count, got {}", other.render()),
            )),
        },
    }
}

/// Connection settings shared by every SQL probe.
#[derive(Debug, Clone)]
pub struct SqlClient {
    config: SqlConfig,
    timeout: Duration,
}

impl SqlClient {
    pub fn new(config: SqlConfig, timeout: Duration) -> Self {
        Self { config, timeout }
    }

    /// Same server and credentials, different database.
    pub fn on_database(&self, database: &str) -> Self {
        let mut config = self.config.clone();
        config.database = database.to_string();
        Self {
            config,
            timeout: self.timeout,
        }
    }

    pub fn describe(&self) -> String {
        format!(
            "sqlserver {}:{}/{}",
            self.config.host, self.config.port, self.config.database
        )
    }

    /// Connect, run `statement` with bound `params`, return the first column
    /// of every row of the first result set. Bounded by the probe timeout.
    pub async fn query_first_column(
        &self,
        statement: &str,
        params: &[String],
    ) -> Result<Vec<SqlScalar>, ProbeError> {
        let target = self.describe();
        match tokio::time::timeout(self.timeout, self.run(statement, params)).await {
            Ok(result) => result,
            Err(_) => Err(ProbeError::timeout(target, self.timeout)),
        }
    }

    async fn run(&self, statement: &str, params: &[String]) -> Result<Vec<SqlScalar>, ProbeError> {
        let target = self.describe();

        let mut config = Config::new();
        config.host(&self.config.host);
        config.port(self.config.port);
        config.database(&self.config.database);
        config.authentication(AuthMethod::sql_server(&self.config.user, &self.config.password));
        if self.config.trust_cert {
            config.trust_cert();
        }

        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| ProbeError::unreachable(&target, e))?;
        tcp.set_nodelay(true)
            .map_err(|e| ProbeError::unreachable(&target, e))?;

        let mut client = Client::connect(config, tcp.compat_write())
            .await
            .map_err(|e| map_tiberius_error(&target, e))?;

        let bound: Vec<&dyn ToSql> = params.iter().map(|p| p as &dyn ToSql).collect();
        let rows = client
            .query(statement, &bound)
            .await
            .map_err(|e| map_tiberius_error(&target, e))?
            .into_first_result()
            .await
            .map_err(|e| map_tiberius_error(&target, e))?;

        Ok(rows
            .into_iter()
            .filter_map(|row| row.into_iter().next())
            .map(SqlScalar::from_column)
            .collect())
    }
}

fn map_tiberius_error(target: &str, err: tiberius::error::Error) -> ProbeError {
    match err {
        tiberius::error::Error::Io { message, .. } => ProbeError::unreachable(target, message),
        tiberius::error::Error::Tls(message) => ProbeError::unreachable(target, message),
        tiberius::error::Error::Server(token) => ProbeError::rejected(
            target,
            format!("error {}: {}", token.code(), token.message()),
        ),
        other => ProbeError::malformed(target, other),
    }
}

/// One statement with an expectation on its first column.
pub struct SqlProbe {
    client: SqlClient,
    label: String,
    statement: String,
    params: Vec<String>,
    expect: SqlExpectation,
}

impl SqlProbe {
    pub fn new(
        client: &SqlClient,
        label: impl Into<String>,
        statement: impl Into<String>,
        expect: SqlExpectation,
    ) -> Self {
        Self {
            client: client.clone(),
            label: label.into(),
            statement: statement.into(),
            params: Vec::new(),
            expect,
        }
    }

    /// Bind `@P1`, `@P2`, ... in order.
    pub fn bind(mut self, value: impl Into<String>) -> Self {
        self.params.push(value.into());
        self
    }
}

#[async_trait]
impl Probe for SqlProbe {
    fn target(&self) -> String {
        format!("{} ({})", self.client.describe(), self.label)
    }

    async fn observe(&self) -> Outcome {
        match self
            .client
            .query_first_column(&self.statement, &self.params)
            .await
        {
            Ok(rows) => classify_rows(self.expect, &self.label, &rows),
            Err(err) => Outcome::Error(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_result_is_absent() {
        for expect in [
            SqlExpectation::AnyRow,
            SqlExpectation::Truthy,
            SqlExpectation::PositiveCount,
        ] {
            assert_eq!(classify_rows(expect, "q", &[]), Outcome::Absent);
        }
    }

    #[test]
    fn any_row_reports_first_value() {
        let rows = vec![SqlScalar::Text(
            "Microsoft SQL Server 2022 (RTM-CU12)\n\tJan 2024\n\tDeveloper Edition".to_string(),
        )];
        assert_eq!(
            classify_rows(SqlExpectation::AnyRow, "version", &rows),
            Outcome::success("version: Microsoft SQL Server 2022 (RTM-CU12)")
        );
    }

    #[test]
    fn truthy_accepts_bit_and_int() {
        assert!(classify_rows(SqlExpectation::Truthy, "cdc", &[SqlScalar::Bool(true)]).is_success());
        assert!(classify_rows(SqlExpectation::Truthy, "cdc", &[SqlScalar::Int(1)]).is_success());
        assert_eq!(
            classify_rows(SqlExpectation::Truthy, "cdc", &[SqlScalar::Bool(false)]),
            Outcome::Absent
        );
        assert_eq!(
            classify_rows(SqlExpectation::Truthy, "cdc", &[SqlScalar::Null]),
            Outcome::Absent
        );
    }

    #[test]
    fn positive_count() {
        assert_eq!(
            classify_rows(SqlExpectation::PositiveCount, "rows", &[SqlScalar::Int(12)]),
            Outcome::success("rows: 12 row(s)")
        );
        assert_eq!(
            classify_rows(SqlExpectation::PositiveCount, "rows", &[SqlScalar::Int(0)]),
            Outcome::Absent
        );
        assert!(matches!(
            classify_rows(SqlExpectation::PositiveCount, "rows", &[SqlScalar::Text("x".into())]),
            Outcome::Error(ProbeError::Malformed { .. })
        ));
    }
}
