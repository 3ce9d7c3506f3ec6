//! Live probes against the pipeline's external systems.

pub mod http;
pub mod kafka;
pub mod sql;

pub use http::{
    classifier, expect_body_contains, expect_found, expect_json, expect_ok, expect_status,
    join_url, Classifier, HttpClient, HttpProbe, HttpReply,
};
pub use kafka::{match_change_event, EventMatcher, KafkaClient, KafkaOp, KafkaProbe};
pub use sql::{classify_rows, SqlClient, SqlExpectation, SqlProbe, SqlScalar};
