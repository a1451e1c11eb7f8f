use blinkcheck_core::LivenessSnapshot;
use serde::Serialize;

/// The three status lines shown to the user.
pub fn status_lines(snapshot: &LivenessSnapshot) -> [&'static str; 3] {
    [
        if snapshot.face_detected {
            "Face detected"
        } else {
            "No face detected"
        },
        if snapshot.blink_detected {
            "Blink detected"
        } else {
            "No blink detected"
        },
        if snapshot.user_is_real {
            "User appears real"
        } else {
            "User does not appear real"
        },
    ]
}

#[derive(Serialize)]
struct Event<'a> {
    at_ms: u64,
    #[serde(flatten)]
    snapshot: &'a LivenessSnapshot,
}

/// One output line for a snapshot observed `at_ms` into the run.
pub fn render(at_ms: u64, snapshot: &LivenessSnapshot, json: bool) -> String {
    if json {
        serde_json::to_string(&Event { at_ms, snapshot })
            .unwrap_or_else(|e| format!(r#"{{"error":"{e}"}}"#))
    } else {
        format!("[{at_ms:>6} ms] {}", status_lines(snapshot).join(" | "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_initial_state() {
        let line = render(0, &LivenessSnapshot::default(), false);
        assert_eq!(
            line,
            "[     0 ms] No face detected | No blink detected | User does not appear real"
        );
    }

    #[test]
    fn renders_live_state_as_json() {
        let snapshot = LivenessSnapshot {
            face_detected: true,
            blink_detected: true,
            user_is_real: true,
        };
        let value: serde_json::Value = serde_json::from_str(&render(1000, &snapshot, true)).unwrap();
        assert_eq!(value["at_ms"], 1000);
        assert_eq!(value["face_detected"], true);
        assert_eq!(value["blink_detected"], true);
        assert_eq!(value["user_is_real"], true);
    }
}
