use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CalcError {
    #[error("Unknown operation: {operation}")]
    UnknownOperation { id: i32, operation: String },

    #[error("Malformed calculation record: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl CalcError {
    /// Transaction the error belongs to, when the record could be read at all.
    pub fn id(&self) -> Option<i32> {
        match self {
            CalcError::UnknownOperation { id, .. } => Some(*id),
            CalcError::Malformed(_) => None,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Operation {
    Add,
    Subtract,
    IsPrime,
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ADD" => Ok(Operation::Add),
            "SUBTRACT" => Ok(Operation::Subtract),
            "ISPRIME" => Ok(Operation::IsPrime),
            _ => Err(s.to_string()),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Operation::Add => "ADD",
            Operation::Subtract => "SUBTRACT",
            Operation::IsPrime => "ISPRIME",
        };
        f.write_str(tag)
    }
}

/// A single request/response record as it travels on the wire.
///
/// The same record is used in both directions: the client fills in the
/// operands and tag, the server fills in `result` or `is_prime`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Calculation {
    pub id: i32,
    pub x: i64,
    pub y: i64,
    pub operation: String,
    pub result: i64,
    #[serde(rename = "isPrime")]
    pub is_prime: bool,
}

impl Calculation {
    pub fn new(id: i32, x: i64, y: i64, operation: impl Into<String>) -> Self {
        Self {
            id,
            x,
            y,
            operation: operation.into(),
            result: 0,
            is_prime: false,
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CalcError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CalcError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn op(&self) -> Result<Operation, CalcError> {
        self.operation
            .parse()
            .map_err(|operation| CalcError::UnknownOperation {
                id: self.id,
                operation,
            })
    }

    /// Apply the operation in place.
    pub fn apply(&mut self) -> Result<(), CalcError> {
        match self.op()? {
            Operation::Add => self.result = self.x.wrapping_add(self.y),
            Operation::Subtract => self.result = self.x.wrapping_sub(self.y),
            Operation::IsPrime => self.is_prime = is_prime(self.x),
        }
        Ok(())
    }
}

/// Decode a request payload, perform it and encode the answer.
pub fn perform(payload: &[u8]) -> Result<Vec<u8>, CalcError> {
    let mut calc = Calculation::from_bytes(payload)?;
    calc.apply()?;
    calc.to_bytes()
}

fn is_prime(x: i64) -> bool {
    if x <= 1 {
        return false;
    }
    let mut i: i64 = 2;
    while i <= x / i {
        if x % i == 0 {
            return false;
        }
        i += 1;
    }
    true
}

impl fmt::Display for Calculation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "id={}, x={}, y={}, operation={}, result={}, isPrime={}",
            self.id, self.x, self.y, self.operation, self.result, self.is_prime
        )
    }
}
