use crate::{
    error::{AppError, AppResult},
    models::{Identity, SupportMessage, SupportRequest, CREATED_AT_FIELD},
    store::{DocumentStore, MESSAGES_COLLECTION},
};

/// Appends a support message from `identity` to the messages collection
///
/// `createdAt` comes from the store's clock. Returns the generated document key.
pub async fn submit_support_message(
    store: &dyn DocumentStore,
    identity: &Identity,
    request: SupportRequest,
) -> AppResult<String> {
    if request.message.trim().is_empty() {
        return Err(AppError::InvalidInput(
            "Support message cannot be empty".to_string(),
        ));
    }

    let message = SupportMessage::new(identity, request);
    let id = store
        .add_stamped(
            MESSAGES_COLLECTION,
            serde_json::to_value(&message)?,
            CREATED_AT_FIELD,
        )
        .await?;

    tracing::info!(uid = %identity.uid, message_id = %id, subject = %message.subject, "Support message stored");
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, MockDocumentStore};

    fn identity() -> Identity {
        Identity {
            uid: "u1".to_string(),
            email: "ana@example.com".to_string(),
            display_name: Some("Ana".to_string()),
        }
    }

    #[tokio::test]
    async fn test_message_document_shape() {
        let store = MemoryStore::new();
        let request = SupportRequest {
            subject: None,
            message: "The trailer will not play".to_string(),
        };
        let id = submit_support_message(&store, &identity(), request)
            .await
            .unwrap();

        let doc = store.get(MESSAGES_COLLECTION, &id).await.unwrap().unwrap();
        assert_eq!(doc.data["uid"], "u1");
        assert_eq!(doc.data["displayName"], "Ana");
        assert_eq!(doc.data["subject"], "Suporte Técnico");
        assert_eq!(doc.data["status"], "new");
        assert!(doc.data["createdAt"].is_string());
    }

    #[tokio::test]
    async fn test_blank_message_never_written() {
        let mut store = MockDocumentStore::new();
        store.expect_add().never();
        store.expect_add_stamped().never();

        let request = SupportRequest {
            subject: Some("Bug".to_string()),
            message: "   ".to_string(),
        };
        let result = submit_support_message(&store, &identity(), request).await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }
}
