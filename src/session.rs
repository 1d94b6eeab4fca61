use rand::Rng;
use uuid::Uuid;

const MACHINE_ID_LEN: usize = 65;
const HEX_CHARS: &[u8] = b"0123456789abcdef";

/// Per-process identifiers sent with every completion request.
///
/// Generated once at startup and again only on an explicit reload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentifiers {
    pub session_id: String,
    pub request_id: String,
    pub machine_id: String,
}

impl SessionIdentifiers {
    pub fn generate() -> Self {
        let session_id = format!(
            "{}{}",
            Uuid::new_v4(),
            chrono::Utc::now().timestamp_millis()
        );

        Self {
            session_id,
            request_id: Uuid::new_v4().to_string(),
            machine_id: machine_id(),
        }
    }
}

/// Random hex string standing in for a device identifier.
fn machine_id() -> String {
    let mut rng = rand::thread_rng();
    (0..MACHINE_ID_LEN)
        .map(|_| HEX_CHARS[rng.gen_range(0..HEX_CHARS.len())] as char)
        .collect()
}

/// Credential and identifiers owned by the control loop.
///
/// Workers receive a clone; they report a renewed token back as an event
/// and never write into the loop's copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Short-lived bearer token; empty until the first renewal
    pub bearer_token: String,
    pub ids: SessionIdentifiers,
}

impl Session {
    pub fn new() -> Self {
        Self {
            bearer_token: String::new(),
            ids: SessionIdentifiers::generate(),
        }
    }

    /// New identifiers and an empty token, forcing revalidation on next use
    pub fn reload(&mut self) {
        self.ids = SessionIdentifiers::generate();
        self.bearer_token.clear();
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_lower_hex(s: &str) -> bool {
        s.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
    }

    #[test]
    fn test_request_id_follows_v4_template() {
        let ids = SessionIdentifiers::generate();
        let id = ids.request_id.as_bytes();

        assert_eq!(id.len(), 36);
        for pos in [8, 13, 18, 23] {
            assert_eq!(id[pos], b'-');
        }
        assert_eq!(id[14], b'4');
        assert!(matches!(id[19], b'8' | b'9' | b'a' | b'b'));
        assert!(is_lower_hex(&ids.request_id.replace('-', "")));
    }

    #[test]
    fn test_machine_id_is_65_hex_chars() {
        let ids = SessionIdentifiers::generate();
        assert_eq!(ids.machine_id.len(), 65);
        assert!(is_lower_hex(&ids.machine_id));
    }

    #[test]
    fn test_session_id_is_uuid_then_millis() {
        let before = chrono::Utc::now().timestamp_millis();
        let ids = SessionIdentifiers::generate();
        let after = chrono::Utc::now().timestamp_millis();

        let (uuid_part, millis_part) = ids.session_id.split_at(36);
        assert!(Uuid::parse_str(uuid_part).is_ok());

        let millis: i64 = millis_part.parse().unwrap();
        assert!(millis >= before && millis <= after);
    }

    #[test]
    fn test_identifiers_differ_between_generations() {
        let a = SessionIdentifiers::generate();
        let b = SessionIdentifiers::generate();
        assert_ne!(a.request_id, b.request_id);
        assert_ne!(a.machine_id, b.machine_id);
    }

    #[test]
    fn test_reload_clears_token_and_regenerates() {
        let mut session = Session::new();
        session.bearer_token = "tid=1;exp=9999999999".into();
        let old_ids = session.ids.clone();

        session.reload();

        assert!(session.bearer_token.is_empty());
        assert_ne!(session.ids, old_ids);
    }
}
