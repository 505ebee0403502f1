use std::fmt;

/// Handshake completion status reported by the attribution service.
///
/// The wire contract is ordinal: the service reports a small integer and
/// the mapping below is fixed. The asynchronous "service disconnected"
/// notification is a connection lifecycle signal, not a member of this
/// enum — see the `relay-client` setup events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseCode {
    /// Connection usable; the referrer may be fetched.
    Ok,
    /// The service does not support referrer reporting on this install.
    FeatureNotSupported,
    /// The service is not available right now.
    ServiceUnavailable,
    /// The caller violated the service contract.
    DeveloperError,
}

impl ResponseCode {
    /// Map an ordinal wire code to a status. Unknown codes return `None`.
    #[must_use]
    pub fn from_wire(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Ok),
            1 => Some(Self::FeatureNotSupported),
            2 => Some(Self::ServiceUnavailable),
            3 => Some(Self::DeveloperError),
            _ => None,
        }
    }

    #[must_use]
    pub fn wire_code(self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::FeatureNotSupported => 1,
            Self::ServiceUnavailable => 2,
            Self::DeveloperError => 3,
        }
    }

    #[must_use]
    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ok => "OK",
            Self::FeatureNotSupported => "FEATURE_NOT_SUPPORTED",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            Self::DeveloperError => "DEVELOPER_ERROR",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::ResponseCode;

    #[test]
    fn wire_mapping_is_stable() {
        for code in [
            ResponseCode::Ok,
            ResponseCode::FeatureNotSupported,
            ResponseCode::ServiceUnavailable,
            ResponseCode::DeveloperError,
        ] {
            assert_eq!(ResponseCode::from_wire(code.wire_code()), Some(code));
        }
        assert_eq!(ResponseCode::Ok.wire_code(), 0);
        assert_eq!(ResponseCode::FeatureNotSupported.wire_code(), 1);
        assert_eq!(ResponseCode::ServiceUnavailable.wire_code(), 2);
        assert_eq!(ResponseCode::DeveloperError.wire_code(), 3);
    }

    #[test]
    fn unknown_wire_codes_are_rejected() {
        assert_eq!(ResponseCode::from_wire(-1), None);
        assert_eq!(ResponseCode::from_wire(4), None);
    }

    #[test]
    fn only_ok_is_ok() {
        assert!(ResponseCode::Ok.is_ok());
        assert!(!ResponseCode::ServiceUnavailable.is_ok());
    }
}
