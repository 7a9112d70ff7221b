use serde::Deserialize;
use uuid::Uuid;

/// Confirmation action published by a guide device.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuideActionMessage {
    pub tour_id: Uuid,
    #[serde(flatten)]
    pub action: GuideAction,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum GuideAction {
    ConfirmMeetingPoint,
    ConfirmStop { order: i32 },
}
