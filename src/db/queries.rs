pub const SELECT_TOUR: &str = r#"
SELECT tour_id, meeting_point, meeting_point_lat, meeting_point_lng,
       meeting_point_confirmed, meeting_point_confirmed_at
FROM tours WHERE tour_id = $1;
"#;

pub const SELECT_TOUR_STOPS: &str = r#"
SELECT stop_order, name, description, lat, lng, stop_duration_minutes, completed, completed_at
FROM tour_stops WHERE tour_id = $1 ORDER BY stop_order;
"#;

// Guarded on the current value so a second writer shows up as zero affected rows.
pub const UPDATE_MEETING_POINT: &str = r#"
UPDATE tours
SET meeting_point_confirmed = $2,
    meeting_point_confirmed_at = $3
WHERE tour_id = $1 AND meeting_point_confirmed <> $2;
"#;

pub const UPDATE_STOP_COMPLETION: &str = r#"
UPDATE tour_stops
SET completed = $3,
    completed_at = $4
WHERE tour_id = $1 AND stop_order = $2 AND completed <> $3;
"#;

pub const TOUR_EXISTS: &str = r#"
SELECT EXISTS (SELECT 1 FROM tours WHERE tour_id = $1);
"#;
