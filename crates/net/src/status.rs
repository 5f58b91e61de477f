//! Per-operation result codes
//!
//! Replies carry one result code per sub-operation so the client can map
//! failures back onto individual operations without aborting the whole
//! reply.

use reef_core::{Error, Result};

/// Wire result code for one sub-operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ResultCode {
    /// Operation succeeded
    Ok = 0,
    /// Entity not found
    NotFound = 1,
    /// Entity already exists
    Exists = 2,
    /// Backend failure
    Error = 3,
}

impl ResultCode {
    /// Code for an operation outcome.
    pub fn from_result<T>(result: &Result<T>) -> Self {
        match result {
            Ok(_) => ResultCode::Ok,
            Err(Error::NotFound(_)) => ResultCode::NotFound,
            Err(Error::Exists(_)) => ResultCode::Exists,
            Err(_) => ResultCode::Error,
        }
    }

    /// Decode a wire value.
    pub fn from_u32(value: u32) -> Result<Self> {
        Ok(match value {
            0 => ResultCode::Ok,
            1 => ResultCode::NotFound,
            2 => ResultCode::Exists,
            3 => ResultCode::Error,
            other => return Err(Error::Protocol(format!("unknown result code: {other}"))),
        })
    }

    /// Turn the code back into a result, attaching `context` to errors.
    pub fn into_result(self, context: &str) -> Result<()> {
        match self {
            ResultCode::Ok => Ok(()),
            ResultCode::NotFound => Err(Error::NotFound(context.to_string())),
            ResultCode::Exists => Err(Error::Exists(context.to_string())),
            ResultCode::Error => Err(Error::Backend(context.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        for code in [
            ResultCode::Ok,
            ResultCode::NotFound,
            ResultCode::Exists,
            ResultCode::Error,
        ] {
            assert_eq!(ResultCode::from_u32(code as u32).unwrap(), code);
        }
        assert!(ResultCode::from_u32(17).is_err());
    }

    #[test]
    fn maps_errors_both_ways() {
        let missing: Result<()> = Err(Error::NotFound("x".into()));
        let code = ResultCode::from_result(&missing);
        assert_eq!(code, ResultCode::NotFound);
        assert!(code.into_result("ns/key").unwrap_err().is_not_found());
        assert!(ResultCode::Ok.into_result("x").is_ok());
    }
}
