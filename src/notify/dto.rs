use chrono::{DateTime, Utc};
use serde::Serialize;

/// Events broadcast on a lecture's channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum LectureEvent {
    #[serde(rename_all = "camelCase")]
    LectureEnded {
        lecture_id: String,
        status: String,
        ended_at: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    StudentJoined {
        lecture_id: String,
        student_id: String,
        student_name: String,
        join_time: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    PasscodeRefresh {
        lecture_id: String,
        passcode: String,
        updated_at: DateTime<Utc>,
    },
}

impl LectureEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LectureEvent::LectureEnded { .. } => "lectureEnded",
            LectureEvent::StudentJoined { .. } => "studentJoined",
            LectureEvent::PasscodeRefresh { .. } => "passcodeRefresh",
        }
    }
}

pub fn lecture_channel(lecture_id: &str) -> String {
    format!("lecture-{}", lecture_id)
}

#[derive(Debug, Clone, Serialize)]
pub struct PublishRequest<'a> {
    pub channel: &'a str,
    #[serde(flatten)]
    pub event: &'a LectureEvent,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Where a push goes: a single device, or every subscriber of a topic.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PushTarget {
    Token(String),
    Topic(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct PushRequest<'a> {
    #[serde(flatten)]
    pub target: &'a PushTarget,
    pub notification: &'a PushMessage,
    pub android: AndroidConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct AndroidConfig {
    pub channel_id: &'static str,
}

impl Default for AndroidConfig {
    fn default() -> Self {
        Self { channel_id: "high-priority" }
    }
}
