use thiserror::Error;

/// Failures while parsing a CSV record.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("unknown record type '{0}'")]
    UnknownRecord(String),

    #[error("{record} record needs {expected} fields, got {got}")]
    FieldCount {
        record: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("{record} record requires {field}")]
    MissingField {
        record: &'static str,
        field: &'static str,
    },

    #[error("invalid {field}: '{value}'")]
    InvalidField { field: &'static str, value: String },

    #[error("line {line}: {source}")]
    AtLine {
        line: usize,
        #[source]
        source: Box<ProtocolError>,
    },
}

impl ProtocolError {
    pub(crate) fn invalid(field: &'static str, value: &str) -> Self {
        ProtocolError::InvalidField {
            field,
            value: value.to_string(),
        }
    }
}
