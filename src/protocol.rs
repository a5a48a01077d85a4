//! Upstream changefeed protocol (SPEC_FULL.md §4.1, §6).
//!
//! Lines arrive tab-delimited: `timestamp\topTag\tcol1\tcol2\t...`, with
//! `\N` as the null literal and `opTag` one of `upsert`/`delete`. Grounded on
//! the teacher's `streams/cdc` line-oriented replay loop for the
//! "parse-then-dispatch" shape, rewired onto this textual wire format
//! instead of a binary WAL record.

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio_stream::wrappers::LinesStream;

use crate::error::{Result, ViewstreamError};
use crate::schema::{DataType, ViewDefinition};
use crate::value::{Row, Value};

pub const NULL_LITERAL: &str = "\\N";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpTag {
    Upsert,
    Delete,
}

impl OpTag {
    fn parse(s: &str) -> Result<OpTag> {
        match s {
            "upsert" => Ok(OpTag::Upsert),
            "delete" => Ok(OpTag::Delete),
            other => Err(ViewstreamError::UpstreamProtocol(format!(
                "unknown opTag '{other}'"
            ))),
        }
    }
}

/// One parsed changefeed line.
#[derive(Debug, Clone)]
pub struct ChangeLine {
    pub timestamp: i64,
    pub op: OpTag,
    pub row: Row,
}

/// Parses one tab-delimited line against a view's declared column order.
/// Malformed lines (wrong column count, bad timestamp, unknown opTag) and
/// lines with an enum literal absent from the declared enum return an
/// error; per SPEC_FULL.md §4.4 the Source logs and drops these rather than
/// treating them as fatal.
pub fn parse_line(
    line: &str,
    view: &ViewDefinition,
    enums: &std::collections::HashMap<String, crate::schema::EnumType>,
) -> Result<ChangeLine> {
    let mut parts = line.split('\t');

    let timestamp: i64 = parts
        .next()
        .ok_or_else(|| ViewstreamError::UpstreamProtocol("missing timestamp field".to_string()))?
        .parse()
        .map_err(|e| ViewstreamError::UpstreamProtocol(format!("bad timestamp: {e}")))?;

    let op = OpTag::parse(
        parts
            .next()
            .ok_or_else(|| ViewstreamError::UpstreamProtocol("missing opTag field".to_string()))?,
    )?;

    let columns = view.column_order();
    let mut row = Row::with_capacity(columns.len());
    for col_name in &columns {
        let field = view.field(col_name).ok_or_else(|| {
            ViewstreamError::UpstreamProtocol(format!("view has no field '{col_name}'"))
        })?;
        let raw = parts.next().ok_or_else(|| {
            ViewstreamError::UpstreamProtocol(format!("missing column '{col_name}'"))
        })?;
        let value = parse_value(raw, &field.data_type, enums)?;
        row.insert(col_name.to_string(), value);
    }

    if parts.next().is_some() {
        return Err(ViewstreamError::UpstreamProtocol(
            "line has more columns than the view declares".to_string(),
        ));
    }

    Ok(ChangeLine { timestamp, op, row })
}

fn parse_value(
    raw: &str,
    data_type: &DataType,
    enums: &std::collections::HashMap<String, crate::schema::EnumType>,
) -> Result<Value> {
    if raw == NULL_LITERAL {
        return Ok(Value::Null);
    }
    let value = match data_type {
        DataType::Bool => Value::Bool(raw == "t" || raw == "true"),
        DataType::Int => Value::Int(
            raw.parse()
                .map_err(|e| ViewstreamError::UpstreamProtocol(format!("bad int: {e}")))?,
        ),
        DataType::BigInt => Value::BigIntStr(raw.to_string()),
        DataType::Float => Value::Float(
            raw.parse()
                .map_err(|e| ViewstreamError::UpstreamProtocol(format!("bad float: {e}")))?,
        ),
        DataType::Text | DataType::Uuid | DataType::Date | DataType::Time | DataType::Timestamp
        | DataType::Json | DataType::Array => Value::Str(raw.to_string()),
        DataType::Enum(enum_name) => {
            let enum_type = enums.get(enum_name).ok_or_else(|| {
                ViewstreamError::UpstreamProtocol(format!("unknown enum type '{enum_name}'"))
            })?;
            let ordinal = enum_type.ordinal_of(raw).ok_or_else(|| {
                ViewstreamError::UpstreamProtocol(format!(
                    "'{raw}' is not a member of enum '{enum_name}'"
                ))
            })?;
            Value::Enum { value: raw.to_string(), ordinal }
        }
    };
    Ok(value)
}

/// Builds the subscription query for a view (spec.md §6): a streaming copy
/// of an upsert-enveloped, snapshot-then-live changefeed.
pub fn build_subscription_query(view: &ViewDefinition) -> String {
    let columns = view.column_order().join(", ");
    format!(
        "SELECT {columns} FROM {view} ENVELOPE UPSERT (KEY (\"{pk}\")) WITH (SNAPSHOT)",
        columns = columns,
        view = view.name,
        pk = view.primary_key_field,
    )
}

/// Source of changefeed lines. `Source` is generic over this so tests can
/// substitute an in-memory fake instead of a real TCP connection.
#[async_trait]
pub trait UpstreamConnection: Send {
    /// Issues the subscription and returns the resulting line stream. One
    /// call per Source lifetime; reconnection is out of scope (spec.md §2
    /// Non-goals).
    async fn subscribe(&mut self, query: &str) -> Result<BoxStream<'_, Result<String>>>;
}

/// A `TcpUpstream` speaks the plain textual protocol over a `TcpStream`:
/// write the query terminated by `\n`, then read newline-delimited result
/// lines.
pub struct TcpUpstream {
    stream: Option<TcpStream>,
}

impl TcpUpstream {
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| ViewstreamError::UpstreamConnect(format!("{addr}: {e}")))?;
        Ok(Self {
            stream: Some(stream),
        })
    }
}

#[async_trait]
impl UpstreamConnection for TcpUpstream {
    async fn subscribe(&mut self, query: &str) -> Result<BoxStream<'_, Result<String>>> {
        use tokio::io::AsyncWriteExt;

        let mut stream = self
            .stream
            .take()
            .ok_or_else(|| ViewstreamError::UpstreamConnect("already subscribed".to_string()))?;
        stream
            .write_all(format!("{query}\n").as_bytes())
            .await
            .map_err(|e| ViewstreamError::UpstreamConnect(e.to_string()))?;

        let reader = BufReader::new(stream);
        let lines = LinesStream::new(reader.lines());
        let mapped = futures::StreamExt::map(lines, |r| {
            r.map_err(|e| ViewstreamError::UpstreamProtocol(e.to_string()))
        });
        Ok(Box::pin(mapped))
    }
}
