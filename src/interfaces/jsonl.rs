use super::dispatch::Operation;
use crate::error::InputError;
use serde_json::Value;
use std::io::BufRead;

/// One line of a request file: the operation and its payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub operation: Operation,
    pub payload: Value,
}

/// Reads `{"op": "<operation>", ...fields}` lines.
///
/// Blank lines are skipped. A bad line yields an error and reading continues
/// with the next one.
pub struct RequestReader<R: BufRead> {
    source: R,
}

impl<R: BufRead> RequestReader<R> {
    pub fn new(source: R) -> Self {
        Self { source }
    }

    pub fn requests(self) -> impl Iterator<Item = Result<Envelope, InputError>> {
        self.source
            .lines()
            .enumerate()
            .filter(|(_, line)| !matches!(line, Ok(text) if text.trim().is_empty()))
            .map(|(index, line)| parse_line(index + 1, &line?))
    }
}

fn parse_line(line: usize, text: &str) -> Result<Envelope, InputError> {
    let value: Value =
        serde_json::from_str(text).map_err(|source| InputError::JsonError { line, source })?;
    let Value::Object(mut fields) = value else {
        return Err(InputError::InvalidRecord {
            line,
            reason: "expected a JSON object".to_string(),
        });
    };
    let operation = match fields.remove("op") {
        Some(Value::String(name)) => {
            name.parse::<Operation>()
                .map_err(|e| InputError::InvalidRecord {
                    line,
                    reason: e.to_string(),
                })?
        }
        _ => {
            return Err(InputError::InvalidRecord {
                line,
                reason: "missing \"op\" field".to_string(),
            });
        }
    };
    Ok(Envelope {
        operation,
        payload: Value::Object(fields),
    })
}
