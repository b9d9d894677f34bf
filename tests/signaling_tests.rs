use huddle_client::signaling::{
    ClientEvent, IceCandidate, SdpType, ServerEvent, SessionDescription,
};

#[test]
fn test_join_meeting_serialization() {
    let msg = ClientEvent::JoinMeeting {
        meeting_id: "standup".to_string(),
    };

    let json = serde_json::to_string(&msg).unwrap();
    assert!(json.contains("\"event\":\"join_meeting\""));
    assert!(json.contains("standup"));

    let deserialized: ClientEvent = serde_json::from_str(&json).unwrap();
    assert_eq!(deserialized, msg);
}

#[test]
fn test_signal_with_offer() {
    let msg = ClientEvent::Signal {
        target: "user-2".to_string(),
        sdp: Some(SessionDescription {
            kind: SdpType::Offer,
            sdp: "v=0...".to_string(),
        }),
        candidate: None,
    };

    let json = serde_json::to_string(&msg).unwrap();
    assert!(json.contains("\"event\":\"signal\""));
    // The relay expects the browser field name, not "kind"
    assert!(json.contains("\"type\":\"offer\""));
    // Absent candidate is omitted, not null
    assert!(!json.contains("candidate"));

    let deserialized: ClientEvent = serde_json::from_str(&json).unwrap();
    assert_eq!(deserialized, msg);
}

#[test]
fn test_signal_with_candidate() {
    let msg = ClientEvent::Signal {
        target: "user-2".to_string(),
        sdp: None,
        candidate: Some(IceCandidate {
            candidate: "candidate:1 1 udp 2122260223 192.168.1.5 54321 typ host".to_string(),
            sdp_mid: Some("0".to_string()),
            sdp_mline_index: Some(0),
            username_fragment: None,
        }),
    };

    let json = serde_json::to_string(&msg).unwrap();
    assert!(json.contains("\"sdpMid\":\"0\""));
    assert!(json.contains("\"sdpMLineIndex\":0"));
    assert!(!json.contains("usernameFragment"));
    assert!(!json.contains("sdp_mid"));

    let deserialized: ClientEvent = serde_json::from_str(&json).unwrap();
    assert_eq!(deserialized, msg);
}

#[test]
fn test_server_signal_deserialization() {
    let json = r#"{
        "event": "signal",
        "sender": "user-7",
        "sdp": { "type": "answer", "sdp": "v=0..." }
    }"#;

    let event: ServerEvent = serde_json::from_str(json).unwrap();
    match event {
        ServerEvent::Signal {
            sender,
            sdp,
            candidate,
        } => {
            assert_eq!(sender, "user-7");
            assert_eq!(sdp.unwrap().kind, SdpType::Answer);
            assert!(candidate.is_none());
        }
        other => panic!("unexpected event: {:?}", other),
    }
}

#[test]
fn test_talking_events() {
    let json = r#"{"event":"user_talking","user_id":"user-3"}"#;
    let event: ServerEvent = serde_json::from_str(json).unwrap();
    assert_eq!(
        event,
        ServerEvent::UserTalking {
            user_id: "user-3".to_string()
        }
    );

    let out = ClientEvent::UserNotTalking {
        meeting_id: "standup".to_string(),
    };
    let json = serde_json::to_string(&out).unwrap();
    assert!(json.contains("\"event\":\"user_not_talking\""));
}

#[test]
fn test_audio_upload_serialization() {
    use base64::Engine;

    let msg = ClientEvent::Audio {
        audio: base64::engine::general_purpose::STANDARD.encode([0u8; 64]),
        meeting_id: "standup".to_string(),
        timestamp: 1_730_000_000_000,
    };

    let json = serde_json::to_string(&msg).unwrap();
    assert!(json.contains("\"event\":\"audio\""));
    assert!(json.contains("1730000000000"));

    let deserialized: ClientEvent = serde_json::from_str(&json).unwrap();
    assert_eq!(deserialized, msg);
}

#[test]
fn test_transcription_deserialization() {
    let json = r#"{
        "event": "transcription",
        "time_stamp": "14:30:05",
        "user_id": "user-3",
        "sentence": "Hello world"
    }"#;

    let event: ServerEvent = serde_json::from_str(json).unwrap();
    match event {
        ServerEvent::Transcription {
            time_stamp,
            user_id,
            sentence,
        } => {
            assert_eq!(time_stamp, "14:30:05");
            assert_eq!(user_id, "user-3");
            assert_eq!(sentence, "Hello world");
        }
        other => panic!("unexpected event: {:?}", other),
    }
}
