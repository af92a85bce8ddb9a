//! Type-safe identifiers for vehicles, trips, geofences, and alerts.
//!
//! Each id is a newtype over [`uuid::Uuid`] (v4) so that identifiers of
//! different entities cannot be confused. [`Imei`] is the device-side
//! identity: a validated 15-digit string reported by the tracker hardware.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(uuid::Uuid);

        impl $name {
            /// Creates a new random id (UUID v4).
            #[must_use]
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4())
            }

            /// Wraps an existing [`uuid::Uuid`].
            #[must_use]
            pub const fn from_uuid(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the inner [`uuid::Uuid`].
            #[must_use]
            pub const fn as_uuid(&self) -> &uuid::Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<uuid::Uuid> for $name {
            fn from(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for uuid::Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

uuid_id! {
    /// Internal identifier of a tracked vehicle. Dictionary key for the
    /// runtime-state registry, the per-vehicle worker map, and the
    /// active-trip registry.
    VehicleId
}

uuid_id! {
    /// Identifier of a trip record.
    TripId
}

uuid_id! {
    /// Identifier of a geofence.
    GeofenceId
}

uuid_id! {
    /// Identifier of an alert record.
    AlertId
}

/// Validated device IMEI: exactly 15 ASCII digits.
///
/// The IMEI is the key reported on the wire; it is resolved to a
/// [`VehicleId`] through the vehicle lookup collaborator before any
/// processing happens.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Imei(String);

impl Imei {
    /// Parses and validates an IMEI string.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidSample`] unless the input is exactly
    /// 15 ASCII digits.
    pub fn parse(value: &str) -> Result<Self, PipelineError> {
        if value.len() == 15 && value.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(value.to_string()))
        } else {
            Err(PipelineError::InvalidSample(format!(
                "imei must be 15 digits, got {value:?}"
            )))
        }
    }

    /// Returns the IMEI digits as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last digit of the IMEI as a number. The simulator uses this to
    /// assign scenarios deterministically by device.
    #[must_use]
    pub fn last_digit(&self) -> u8 {
        self.0.bytes().last().map_or(0, |b| b - b'0')
    }
}

impl fmt::Display for Imei {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for Imei {
    type Error = PipelineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Imei> for String {
    fn from(imei: Imei) -> Self {
        imei.0
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn vehicle_ids_are_unique() {
        assert_ne!(VehicleId::new(), VehicleId::new());
    }

    #[test]
    fn id_display_is_uuid_format() {
        let id = TripId::new();
        let s = format!("{id}");
        assert_eq!(s.len(), 36);
        assert!(s.contains('-'));
    }

    #[test]
    fn imei_accepts_15_digits() {
        let imei = Imei::parse("356938035643809");
        assert!(imei.is_ok());
    }

    #[test]
    fn imei_rejects_short_and_non_numeric() {
        assert!(Imei::parse("12345").is_err());
        assert!(Imei::parse("35693803564380a").is_err());
        assert!(Imei::parse("").is_err());
    }

    #[test]
    fn imei_last_digit() {
        let Ok(imei) = Imei::parse("356938035643807") else {
            panic!("valid imei");
        };
        assert_eq!(imei.last_digit(), 7);
    }

    #[test]
    fn imei_serde_round_trip() {
        let Ok(imei) = Imei::parse("356938035643809") else {
            panic!("valid imei");
        };
        let Ok(json) = serde_json::to_string(&imei) else {
            panic!("serialize");
        };
        assert_eq!(json, "\"356938035643809\"");
        let Ok(back) = serde_json::from_str::<Imei>(&json) else {
            panic!("deserialize");
        };
        assert_eq!(imei, back);
    }

    #[test]
    fn imei_deserialize_rejects_invalid() {
        let result = serde_json::from_str::<Imei>("\"not-an-imei\"");
        assert!(result.is_err());
    }
}
