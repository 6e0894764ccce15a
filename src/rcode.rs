//! Result codes returned by map processors to the request pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of running a processor against a request.
///
/// The set mirrors the codes a policy section can branch on. `Reject`,
/// `Fail`, `Invalid` and `Disallow` are failures; everything else lets
/// processing continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultCode {
    Reject,
    Fail,
    Ok,
    Handled,
    Invalid,
    Disallow,
    NotFound,
    Noop,
    Updated,
}

impl ResultCode {
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            ResultCode::Reject | ResultCode::Fail | ResultCode::Invalid | ResultCode::Disallow
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResultCode::Reject => "reject",
            ResultCode::Fail => "fail",
            ResultCode::Ok => "ok",
            ResultCode::Handled => "handled",
            ResultCode::Invalid => "invalid",
            ResultCode::Disallow => "disallow",
            ResultCode::NotFound => "notfound",
            ResultCode::Noop => "noop",
            ResultCode::Updated => "updated",
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
