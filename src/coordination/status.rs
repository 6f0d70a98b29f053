// # Sticky Status
//
// Encodes the "OK < Cancelled < Error" latch described for `BackendState`:
// once an error is latched it is never replaced by a lower-ranked status,
// but a `Cancelled` marker may still be superseded by a genuine error.

use std::fmt;

/// Error taxonomy for the coordination layer. Grounded in the original
/// `Status` categories: a failed RPC/remote reply ("Expected"), a specific
/// instance reporting non-OK, or a backend-wide failure with no instance
/// cause attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordError {
    /// RPC transport or remote-reported failure. Never crash-worthy.
    Expected(String),
    /// A fragment instance reported a non-OK status.
    InstanceFatal(String),
    /// The backend reported non-OK overall with no instance cause.
    BackendGeneral(String),
}

impl fmt::Display for CoordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordError::Expected(m) => write!(f, "{m}"),
            CoordError::InstanceFatal(m) => write!(f, "{m}"),
            CoordError::BackendGeneral(m) => write!(f, "{m}"),
        }
    }
}

impl CoordError {
    fn append_detail(&mut self, detail: &str) {
        let msg = match self {
            CoordError::Expected(m)
            | CoordError::InstanceFatal(m)
            | CoordError::BackendGeneral(m) => m,
        };
        msg.push_str("; ");
        msg.push_str(detail);
    }
}

/// The sticky status latch: `Ok` and `Cancelled` are placeholders, `Error`
/// is terminal and additive only.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Status {
    #[default]
    Ok,
    Cancelled,
    Error(CoordError),
}

impl Status {
    pub fn is_ok(&self) -> bool {
        matches!(self, Status::Ok)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Status::Cancelled)
    }

    fn rank(&self) -> u8 {
        match self {
            Status::Ok => 0,
            Status::Cancelled => 1,
            Status::Error(_) => 2,
        }
    }

    /// Merge an incoming status into `self` per the monotonicity rule:
    /// `Ok` and `Cancelled` are replaced by anything higher-ranked; an
    /// `Error` is never replaced, but a second `Error` appends its message
    /// as additional detail (this is `MergeStatus` in the original: "keep
    /// first error, append details").
    pub fn merge(&mut self, incoming: Status) {
        if incoming.rank() > self.rank() {
            *self = incoming;
        } else if let (Status::Error(cur), Status::Error(inc)) = (&mut *self, &incoming) {
            if cur != inc {
                cur.append_detail(&inc.to_string());
            }
        }
    }

    pub fn text(&self) -> String {
        match self {
            Status::Ok => "OK".to_string(),
            Status::Cancelled => "CANCELLED".to_string(),
            Status::Error(e) => e.to_string(),
        }
    }
}
