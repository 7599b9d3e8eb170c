use serde_json::Value;
use std::io::{self, Write};

use crate::api::job::models::SimpleMutateResult;
use crate::client::ClientError;
use super::error::BulkJobError;

/// One line per operation outcome, then one line per structured error
pub fn write_outcomes<W: Write>(out: &mut W, result: &SimpleMutateResult) -> io::Result<()> {
    for (index, outcome) in result.results.iter().enumerate() {
        writeln!(out, "Operation [{}] - {}", index, outcome.label())?;
    }
    for error in &result.errors {
        writeln!(
            out,
            "Error, reason: '{}', trigger: '{}', field path: '{}'",
            error.reason, error.trigger, error.field_path
        )?;
    }
    Ok(())
}

/// Print a run-ending error the way users expect to read it
///
/// Transport errors get a single line; API exceptions list every field/value
/// record they carry.
pub fn write_failure<W: Write>(out: &mut W, err: &BulkJobError) -> io::Result<()> {
    match err {
        BulkJobError::Client(ClientError::Http(e)) => writeln!(out, "HTTP Error: {}", e),
        BulkJobError::Client(ClientError::Api(api_error)) => {
            writeln!(out, "Message: {}", api_error.message)?;
            writeln!(out, "Errors:")?;
            for (index, record) in api_error.errors.iter().enumerate() {
                writeln!(out, "\tError [{}]:", index + 1)?;
                for (field, value) in record {
                    writeln!(out, "\t\t{}: {}", field, plain(value))?;
                }
            }
            Ok(())
        }
        other => writeln!(out, "{}", other),
    }
}

fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
