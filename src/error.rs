//! Error types for the optimizer.
//!
//! Every failure is local to one invocation. Errors are grouped into kinds so
//! that a caller can tell "the analysis failed" apart from "the analysis
//! succeeded but could not be delivered".

use std::error::Error;
use std::fmt;

use serde::Serialize;

use crate::model::{CityId, ClusterId};

/// Broad class of an [`OptimizerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad request parameters, rejected before any computation.
    Input,
    /// Reference data missing or unreadable for the requested city.
    ReferenceData,
    /// The engine was asked to do something impossible (bad cluster/duration).
    Computation,
    /// The result could not be written out.
    Output,
}

impl ErrorKind {
    /// Process exit status used by the command-line surface.
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorKind::Input | ErrorKind::Computation => 2,
            ErrorKind::ReferenceData => 3,
            ErrorKind::Output => 4,
        }
    }
}

#[derive(Debug)]
pub enum OptimizerError {
    /// City argument that is not a non-negative integer.
    InvalidCity(String),
    InvalidDate(String),
    InvalidConfig(String),
    UnknownCity { city: CityId, available: Vec<CityId> },
    UnknownCluster { city: CityId, cluster: ClusterId },
    InvalidHour(i64),
    InvalidDuration(i64),
    InvalidTopK(usize),
    InvalidWindow(String),
    /// The city is loaded but has no clusters to start from.
    EmptyResult(CityId),
    MissingReferenceData(String),
    MalformedData { line: Option<u64>, message: String },
    Io(std::io::Error),
    Serialization(serde_json::Error),
}

impl OptimizerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OptimizerError::InvalidCity(_)
            | OptimizerError::InvalidDate(_)
            | OptimizerError::InvalidConfig(_)
            | OptimizerError::UnknownCity { .. }
            | OptimizerError::InvalidHour(_)
            | OptimizerError::InvalidTopK(_)
            | OptimizerError::InvalidWindow(_) => ErrorKind::Input,
            OptimizerError::UnknownCluster { .. }
            | OptimizerError::InvalidDuration(_)
            | OptimizerError::EmptyResult(_) => ErrorKind::Computation,
            OptimizerError::MissingReferenceData(_) | OptimizerError::MalformedData { .. } => {
                ErrorKind::ReferenceData
            }
            OptimizerError::Io(_) | OptimizerError::Serialization(_) => ErrorKind::Output,
        }
    }
}

impl fmt::Display for OptimizerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptimizerError::InvalidCity(raw) => {
                write!(f, "City id must be a non-negative integer (got '{}')", raw)
            }
            OptimizerError::InvalidDate(raw) => {
                write!(f, "Date must be formatted YYYY-MM-DD (got '{}')", raw)
            }
            OptimizerError::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            OptimizerError::UnknownCity { city, available } => {
                let ids: Vec<String> = available.iter().map(|c| c.to_string()).collect();
                write!(f, "City {} not found. Available cities: [{}]", city, ids.join(", "))
            }
            OptimizerError::UnknownCluster { city, cluster } => {
                write!(f, "Cluster {} is not defined for city {}", cluster, city)
            }
            OptimizerError::InvalidHour(hour) => {
                write!(f, "Hour must be between 0 and 23 (got {})", hour)
            }
            OptimizerError::InvalidDuration(duration) => {
                write!(f, "Duration must be between 1 and 24 hours (got {})", duration)
            }
            OptimizerError::InvalidTopK(k) => write!(f, "top_k must be at least 1 (got {})", k),
            OptimizerError::InvalidWindow(msg) => write!(f, "Invalid shift window: {}", msg),
            OptimizerError::EmptyResult(city) => write!(f, "City {} has no clusters", city),
            OptimizerError::MissingReferenceData(msg) => {
                write!(f, "Missing reference data: {}", msg)
            }
            OptimizerError::MalformedData { line: Some(line), message } => {
                write!(f, "Malformed reference data at line {}: {}", line, message)
            }
            OptimizerError::MalformedData { line: None, message } => {
                write!(f, "Malformed reference data: {}", message)
            }
            OptimizerError::Io(e) => write!(f, "I/O error: {}", e),
            OptimizerError::Serialization(e) => write!(f, "Cannot serialize result: {}", e),
        }
    }
}

impl Error for OptimizerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            OptimizerError::Io(e) => Some(e),
            OptimizerError::Serialization(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for OptimizerError {
    fn from(e: std::io::Error) -> Self {
        OptimizerError::Io(e)
    }
}

impl From<serde_json::Error> for OptimizerError {
    fn from(e: serde_json::Error) -> Self {
        OptimizerError::Serialization(e)
    }
}

impl From<csv::Error> for OptimizerError {
    fn from(e: csv::Error) -> Self {
        let line = e.position().map(|p| p.line());
        OptimizerError::MalformedData { line, message: e.to_string() }
    }
}

pub type Result<T> = std::result::Result<T, OptimizerError>;
