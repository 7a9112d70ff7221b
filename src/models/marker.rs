use serde::Serialize;

use super::tour::Tour;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorClass {
    Pending,
    Completed,
    MeetingPoint,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Position {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerSpec {
    pub position: Position,
    pub label: String,
    pub color_class: ColorClass,
}

/// Projects a tour onto map markers: the meeting point first (only when it has
/// coordinates), then one marker per stop in stop order.
pub fn project_markers(tour: &Tour) -> Vec<MarkerSpec> {
    let mut markers = Vec::with_capacity(tour.stops.len() + 1);

    if let (Some(lat), Some(lng)) = (tour.meeting_point_latitude, tour.meeting_point_longitude) {
        markers.push(MarkerSpec {
            position: Position { lat, lng },
            label: tour.meeting_point.clone(),
            color_class: ColorClass::MeetingPoint,
        });
    }

    markers.extend(tour.stops.iter().map(|stop| MarkerSpec {
        position: Position {
            lat: stop.latitude,
            lng: stop.longitude,
        },
        label: format!("{}. {}", stop.order, stop.name),
        color_class: if stop.completed {
            ColorClass::Completed
        } else {
            ColorClass::Pending
        },
    }));

    markers
}
