use serde::{Deserialize, Serialize};

/// Session description exchanged during negotiation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpType,
    pub sdp: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

/// ICE candidate relayed between peers. Field names follow the browser
/// JSON shape the relay server already speaks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(
        rename = "sdpMLineIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_mline_index: Option<u16>,
    #[serde(
        rename = "usernameFragment",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub username_fragment: Option<String>,
}

/// Messages this client publishes to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientEvent {
    JoinMeeting {
        meeting_id: String,
    },
    LeaveMeeting {
        meeting_id: String,
    },
    Signal {
        target: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sdp: Option<SessionDescription>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        candidate: Option<IceCandidate>,
    },
    UserTalking {
        meeting_id: String,
    },
    UserNotTalking {
        meeting_id: String,
    },
    /// Voice segment upload: base64 WAV plus capture timestamp (ms).
    Audio {
        audio: String,
        meeting_id: String,
        timestamp: i64,
    },
}

/// Messages the relay delivers to this client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServerEvent {
    UserJoined {
        user_id: String,
    },
    UserLeft {
        user_id: String,
    },
    Signal {
        sender: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sdp: Option<SessionDescription>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        candidate: Option<IceCandidate>,
    },
    UserTalking {
        user_id: String,
    },
    UserNotTalking {
        user_id: String,
    },
    /// Downstream transcript line, display only.
    Transcription {
        time_stamp: String,
        user_id: String,
        sentence: String,
    },
}
