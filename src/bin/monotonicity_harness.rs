// Test-only binary: feeds a Source two lines with a decreasing timestamp
// and expects the process to exit(1), per the monotonicity invariant in
// SPEC_FULL.md §4.4. Driven from tests/source_process.rs rather than
// exercised in-process, since std::process::exit can't be caught by a test
// runner.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio::sync::mpsc;
use viewstream::error::Result;
use viewstream::protocol::UpstreamConnection;
use viewstream::schema::{DataType, FieldDef, ViewDefinition};

struct OutOfOrderUpstream;

#[async_trait]
impl UpstreamConnection for OutOfOrderUpstream {
    async fn subscribe(&mut self, _query: &str) -> Result<BoxStream<'_, Result<String>>> {
        let lines = vec![
            Ok("100\tupsert\t1\t1.0".to_string()),
            Ok("50\tupsert\t1\t2.0".to_string()),
        ];
        Ok(Box::pin(futures::stream::iter(lines)))
    }
}

#[tokio::main]
async fn main() {
    let view = ViewDefinition {
        name: "trades".to_string(),
        primary_key_field: "id".to_string(),
        fields: vec![
            FieldDef {
                name: "id".to_string(),
                data_type: DataType::Int,
            },
            FieldDef {
                name: "px".to_string(),
                data_type: DataType::Float,
            },
        ],
    };
    let enums = HashMap::new();
    let (_commands_tx, commands_rx) = mpsc::unbounded_channel();

    viewstream::source::run(view, enums, Box::new(OutOfOrderUpstream), commands_rx).await;

    // if run() returns instead of exiting the process, the invariant is
    // broken; signal that clearly rather than exiting 0.
    std::process::exit(2);
}
