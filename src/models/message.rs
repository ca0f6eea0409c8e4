use serde::{Deserialize, Serialize};

use super::Identity;

pub const DEFAULT_SUBJECT: &str = "Suporte Técnico";
pub const NEW_MESSAGE_STATUS: &str = "new";
/// Field the store stamps with its commit time
pub const CREATED_AT_FIELD: &str = "createdAt";

/// Contact form payload
#[derive(Debug, Clone, Deserialize)]
pub struct SupportRequest {
    #[serde(default)]
    pub subject: Option<String>,
    pub message: String,
}

/// Support message as appended to the `messages` collection
///
/// `createdAt` is not part of the payload; the store fills it at commit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SupportMessage {
    pub uid: String,
    pub email: String,
    pub display_name: String,
    pub subject: String,
    pub message: String,
    pub status: String,
}

impl SupportMessage {
    pub fn new(identity: &Identity, request: SupportRequest) -> Self {
        let subject = request
            .subject
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SUBJECT.to_string());

        Self {
            uid: identity.uid.clone(),
            email: identity.email.clone(),
            display_name: identity.display_label().to_string(),
            subject,
            message: request.message,
            status: NEW_MESSAGE_STATUS.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_message_defaults() {
        let identity = Identity {
            uid: "u1".to_string(),
            email: "ana@example.com".to_string(),
            display_name: None,
        };
        let request = SupportRequest {
            subject: None,
            message: "The trailer does not load".to_string(),
        };

        let message = SupportMessage::new(&identity, request);
        assert_eq!(message.subject, DEFAULT_SUBJECT);
        assert_eq!(message.display_name, "Usuário");
        assert_eq!(message.status, "new");

        let json = serde_json::to_value(&message).unwrap();
        assert!(json.get(CREATED_AT_FIELD).is_none());
        assert_eq!(json["displayName"], "Usuário");
    }
}
