//! Geofence geometry and containment tests.
//!
//! Geofences are created and edited by an external management interface;
//! this crate consumes them read-only. Circle containment is a haversine
//! distance check against the radius; polygon containment is the even-odd
//! ray-casting rule over the ordered vertex list.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::geo::{haversine_m, LatLng};
use super::ids::{GeofenceId, VehicleId};
use crate::error::PipelineError;

/// Geofence shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GeofenceGeometry {
    /// Circle: center plus radius in meters.
    Circle {
        /// Circle center.
        center: LatLng,
        /// Radius in meters.
        radius_m: f64,
    },
    /// Polygon: ordered vertex ring, at least three vertices. The first
    /// vertex need not repeat as the last.
    Polygon {
        /// Ordered vertices.
        vertices: Vec<LatLng>,
    },
}

/// A managed geofence zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geofence {
    /// Geofence identifier.
    pub id: GeofenceId,
    /// Display name.
    pub name: String,
    /// Shape.
    pub geometry: GeofenceGeometry,
    /// Inactive geofences are skipped by the evaluator.
    pub active: bool,
    /// Inverts inside/outside semantics: a `reverse` fence models
    /// "stay inside" zones where leaving is the violation.
    pub reverse: bool,
}

impl Geofence {
    /// Creates an active circle geofence.
    #[must_use]
    pub fn circle(name: impl Into<String>, center: LatLng, radius_m: f64) -> Self {
        Self {
            id: GeofenceId::new(),
            name: name.into(),
            geometry: GeofenceGeometry::Circle { center, radius_m },
            active: true,
            reverse: false,
        }
    }

    /// Creates an active polygon geofence.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidSample`] when fewer than three
    /// vertices are given.
    pub fn polygon(name: impl Into<String>, vertices: Vec<LatLng>) -> Result<Self, PipelineError> {
        if vertices.len() < 3 {
            return Err(PipelineError::InvalidSample(format!(
                "polygon geofence needs >= 3 vertices, got {}",
                vertices.len()
            )));
        }
        Ok(Self {
            id: GeofenceId::new(),
            name: name.into(),
            geometry: GeofenceGeometry::Polygon { vertices },
            active: true,
            reverse: false,
        })
    }

    /// Raw geometric containment, ignoring the `reverse` flag.
    #[must_use]
    pub fn contains_raw(&self, point: LatLng) -> bool {
        match &self.geometry {
            GeofenceGeometry::Circle { center, radius_m } => {
                haversine_m(*center, point) <= *radius_m
            }
            GeofenceGeometry::Polygon { vertices } => point_in_polygon(point, vertices),
        }
    }

    /// Effective containment: raw containment with `reverse` applied.
    /// This is the value the evaluator compares against remembered state.
    #[must_use]
    pub fn contains(&self, point: LatLng) -> bool {
        self.contains_raw(point) != self.reverse
    }
}

/// Even-odd ray-casting test. Casts a ray along +longitude and counts
/// edge crossings; an odd count means the point is inside.
fn point_in_polygon(point: LatLng, vertices: &[LatLng]) -> bool {
    let mut inside = false;
    let n = vertices.len();
    let mut j = n.wrapping_sub(1);
    for i in 0..n {
        let (Some(vi), Some(vj)) = (vertices.get(i), vertices.get(j)) else {
            return false;
        };
        let crosses = (vi.lat > point.lat) != (vj.lat > point.lat)
            && point.lng
                < (vj.lng - vi.lng) * (point.lat - vi.lat) / (vj.lat - vi.lat) + vi.lng;
        if crosses {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Geofence transition kinds emitted by the evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GeofenceTransition {
    /// Outside → inside edge.
    Entry,
    /// Inside → outside edge.
    Exit,
    /// Continuous presence past the dwell threshold.
    Dwell,
}

impl GeofenceTransition {
    /// Stable string form, matching the persisted transition column.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Entry => "ENTRY",
            Self::Exit => "EXIT",
            Self::Dwell => "DWELL",
        }
    }
}

/// Record of one geofence transition for one vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeofenceEvent {
    /// Affected vehicle.
    pub vehicle_id: VehicleId,
    /// Geofence that produced the transition.
    pub geofence_id: GeofenceId,
    /// Transition kind.
    pub transition: GeofenceTransition,
    /// Vehicle position at the transition.
    pub position: LatLng,
    /// Sample time of the transition.
    pub timestamp: DateTime<Utc>,
}
