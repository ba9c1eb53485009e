//! Shared status and action code space
//!
//! Every plugin and the login gateway answer with these numeric codes. The
//! set is closed: unknown integers are rejected when parsing.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

macro_rules! code_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $code:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            /// Every code in declaration order
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Numeric wire value
            #[must_use]
            pub const fn code(self) -> i32 {
                match self {
                    $( Self::$variant => $code ),+
                }
            }

            /// Parse a numeric wire value
            #[must_use]
            pub const fn from_code(code: i32) -> Option<Self> {
                match code {
                    $( $code => Some(Self::$variant), )+
                    _ => None,
                }
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                serializer.serialize_i32(self.code())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
                let code = i32::deserialize(deserializer)?;
                Self::from_code(code).ok_or_else(|| {
                    serde::de::Error::custom(format!(
                        "unknown {} code {code}",
                        stringify!($name)
                    ))
                })
            }
        }
    };
}

code_enum! {
    /// Response status codes
    Status {
        Error = 0,
        Ok = 1,
        ExpiredLoginToken = 2,
        InvalidPlayerVersion = 3,
        PasswordLock = 4,
        DisableUserDevice = 5,
        DisableUser = 6,
        ExpiredPasscode = 7,
        DataCenterUnavailable = 8,
        InvalidResource = 10,
        OtpMaxTries = 30,
        OtpTimeout = 31,
        PasswordNotMatch = 32,
        PasswordNotIncludeNumber = 33,
        PasswordNotIncludeLetter = 34,
        PasswordNotIncludeSpecialChar = 35,
        InvalidCredentials = 36,
        NotifEmpty = 50,
        ResetPasscodePending = 100,
        ResetBiometricPending = 101,
        ResetOtpPending = 102,
        AdminActivationPending = 200,
        AdminActivationValid = 201,
        AdminResetPending = 202,
        /// Client should switch to another data center URL
        ChangeUrl = 301,
    }
}

code_enum! {
    /// Administrative action codes
    Action {
        ResetPasscode = 1,
        CancelResetPasscode = 2,
        WipeResetPasscode = 3,
        ResetBiometric = 4,
        ResetOtp = 5,
    }
}

code_enum! {
    /// Client authentication requirements
    ClientAuthType {
        None = 0,
        Password = 1,
        BiometricOtp = 2,
        PasswordAndBiometricOtp = 3,
        PasswordOrBiometricOtp = 4,
    }
}

code_enum! {
    /// Second-factor method
    SecondAuthMethod {
        Biometric = 1,
        Otp = 2,
        BiometricOrOtp = 3,
    }
}

impl Status {
    /// Whether this code signals success
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for status in Status::ALL {
            assert!(seen.insert(status.code()), "duplicate code {}", status.code());
        }
    }

    #[test]
    fn serializes_as_integer() {
        let json = serde_json::to_string(&Status::OtpTimeout).unwrap();
        assert_eq!(json, "31");

        let action: Action = serde_json::from_str("5").unwrap();
        assert_eq!(action, Action::ResetOtp);
    }

    #[test]
    fn rejects_unknown_code() {
        assert!(serde_json::from_str::<Status>("999").is_err());
        assert!(SecondAuthMethod::from_code(0).is_none());
    }

    #[test]
    fn change_url_code() {
        assert_eq!(Status::ChangeUrl.code(), 301);
        assert_eq!(Status::from_code(301), Some(Status::ChangeUrl));
        assert!(!Status::Error.is_ok());
    }
}
