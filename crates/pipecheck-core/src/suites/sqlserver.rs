//! Source database reachability and change-capture configuration.

use crate::check::{Check, Interpretation};
use crate::live::LiveContext;
use crate::probes::{SqlExpectation, SqlProbe};
use crate::suite::{Suite, SuiteKind};

/// Server-level checks run against `master` so a missing application
/// database does not hide whether the server itself is up.
const SYSTEM_DATABASE: &str = "master";

pub fn suite(ctx: &LiveContext) -> Suite {
    let policy = ctx.config.suite_policy;
    let sql = &ctx.config.sql;
    let master = ctx.sql.on_database(SYSTEM_DATABASE);

    Suite::new(SuiteKind::Sqlserver)
        .with_check(Check::new(
            "SQL Server accepts connections",
            SqlProbe::new(&master, "version", "SELECT @@VERSION", SqlExpectation::AnyRow),
            policy,
            Interpretation::required("SQL Server is not accepting connections"),
        ))
        .with_check(Check::new(
            format!("Database {} exists", sql.database),
            SqlProbe::new(
                &master,
                "database_id",
                "SELECT database_id FROM sys.databases WHERE name = @P1",
                SqlExpectation::AnyRow,
            )
            .bind(&sql.database),
            policy,
            Interpretation::required(format!("database {} not found", sql.database)),
        ))
        .with_check(Check::new(
            format!("CDC enabled on database {}", sql.database),
            SqlProbe::new(
                &master,
                "is_cdc_enabled",
                "SELECT is_cdc_enabled FROM sys.databases WHERE name = @P1",
                SqlExpectation::Truthy,
            )
            .bind(&sql.database),
            policy,
            Interpretation::required(format!(
                "CDC is not enabled on database {} (run sys.sp_cdc_enable_db)",
                sql.database
            )),
        ))
        .with_check(Check::new(
            format!("CDC enabled on table {}", sql.source_table),
            SqlProbe::new(
                &ctx.sql,
                "capture_instance",
                "SELECT capture_instance FROM cdc.change_tables WHERE capture_instance = @P1",
                SqlExpectation::AnyRow,
            )
            .bind(&sql.capture_instance),
            policy,
            Interpretation::required(format!(
                "no capture instance {} for {} (run sys.sp_cdc_enable_table)",
                sql.capture_instance, sql.source_table
            )),
        ))
        .with_check(Check::new(
            format!("Table {} has rows", sql.source_table),
            SqlProbe::new(
                &ctx.sql,
                "rows",
                format!("SELECT COUNT_BIG(*) FROM {}", sql.source_table),
                SqlExpectation::PositiveCount,
            ),
            policy,
            Interpretation::advisory(
                format!("table {} is empty", sql.source_table),
                "row count unavailable",
            ),
        ))
}
