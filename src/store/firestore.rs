use std::sync::Arc;
use std::time::Duration;

use futures_util::{stream, StreamExt};
use reqwest::{Client as HttpClient, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Number, Value};
use uuid::Uuid;

use crate::{
    auth::AuthProvider,
    error::{AppError, AppResult},
    store::{Document, DocumentStore, SnapshotStream},
};

const FIRESTORE_URL: &str = "https://firestore.googleapis.com/v1";
const LIST_PAGE_SIZE: u32 = 300;

/// Cloud Firestore over its REST API
///
/// Requests carry the project API key and, when someone is signed in, their
/// id token so per-user security rules apply. Collection subscriptions are
/// served by polling: a snapshot is emitted whenever the listed documents
/// differ from the last one delivered.
#[derive(Clone)]
pub struct FirestoreStore {
    http_client: HttpClient,
    documents_url: String,
    /// Resource name prefix of documents, as used inside commit writes
    documents_name: String,
    api_key: String,
    auth: Arc<dyn AuthProvider>,
    poll_interval: Duration,
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    documents: Vec<RawDocument>,
    #[serde(default)]
    next_page_token: Option<String>,
}

impl RawDocument {
    fn into_document(self) -> Document {
        let id = self.name.rsplit('/').next().unwrap_or_default().to_string();
        Document {
            id,
            data: decode_fields(&self.fields),
        }
    }
}

impl FirestoreStore {
    pub fn new(
        project_id: &str,
        api_key: String,
        auth: Arc<dyn AuthProvider>,
        poll_interval: Duration,
    ) -> Self {
        Self::with_endpoint(FIRESTORE_URL, project_id, api_key, auth, poll_interval)
    }

    pub fn with_endpoint(
        root_url: &str,
        project_id: &str,
        api_key: String,
        auth: Arc<dyn AuthProvider>,
        poll_interval: Duration,
    ) -> Self {
        let documents_name = format!("projects/{}/databases/(default)/documents", project_id);
        Self {
            http_client: HttpClient::new(),
            documents_url: format!("{}/{}", root_url.trim_end_matches('/'), documents_name),
            documents_name,
            api_key,
            auth,
            poll_interval,
        }
    }

    fn url(&self, collection: &str, id: Option<&str>) -> String {
        match id {
            Some(id) => format!("{}/{}/{}", self.documents_url, collection, id),
            None => format!("{}/{}", self.documents_url, collection),
        }
    }

    async fn authorize(&self, request: RequestBuilder) -> AppResult<RequestBuilder> {
        let request = request.query(&[("key", self.api_key.as_str())]);
        Ok(match self.auth.id_token().await? {
            Some(token) => request.bearer_auth(token),
            None => request,
        })
    }

    async fn send(&self, request: RequestBuilder) -> AppResult<reqwest::Response> {
        let response = self.authorize(request).await?.send().await?;
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(store_error(status, &body))
    }

    /// Lists a whole collection, following pagination
    async fn list(&self, collection: &str) -> AppResult<Vec<Document>> {
        let url = self.url(collection, None);
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .http_client
                .get(&url)
                .query(&[("pageSize", LIST_PAGE_SIZE.to_string())]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token)]);
            }

            let page: ListResponse = self.send(request).await?.json().await?;
            documents.extend(page.documents.into_iter().map(RawDocument::into_document));

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        documents.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(documents)
    }
}

fn store_error(status: StatusCode, body: &str) -> AppError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.to_string());
    AppError::Store(format!("Firestore returned status {}: {}", status, message))
}

struct Poll {
    store: FirestoreStore,
    collection: String,
    last: Option<Vec<Document>>,
    failing: bool,
    first: bool,
}

#[async_trait::async_trait]
impl DocumentStore for FirestoreStore {
    async fn get(&self, collection: &str, id: &str) -> AppResult<Option<Document>> {
        let request = self.http_client.get(self.url(collection, Some(id)));
        let response = self.authorize(request).await?.send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let raw: RawDocument = response.json().await?;
                Ok(Some(raw.into_document()))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(store_error(status, &body))
            }
        }
    }

    async fn set(&self, collection: &str, id: &str, data: Value) -> AppResult<()> {
        let body = json!({ "fields": encode_fields(&data)? });
        let request = self
            .http_client
            .patch(self.url(collection, Some(id)))
            .json(&body);
        self.send(request).await?;
        tracing::debug!(collection = %collection, id = %id, "Document written");
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> AppResult<()> {
        let request = self.http_client.delete(self.url(collection, Some(id)));
        self.send(request).await?;
        tracing::debug!(collection = %collection, id = %id, "Document deleted");
        Ok(())
    }

    async fn add(&self, collection: &str, data: Value) -> AppResult<String> {
        let body = json!({ "fields": encode_fields(&data)? });
        let request = self.http_client.post(self.url(collection, None)).json(&body);
        let raw: RawDocument = self.send(request).await?.json().await?;
        let document = raw.into_document();
        tracing::debug!(collection = %collection, id = %document.id, "Document added");
        Ok(document.id)
    }

    async fn add_stamped(
        &self,
        collection: &str,
        data: Value,
        stamp_field: &str,
    ) -> AppResult<String> {
        let id = Uuid::new_v4().simple().to_string();
        let body = json!({
            "writes": [{
                "update": {
                    "name": format!("{}/{}/{}", self.documents_name, collection, id),
                    "fields": encode_fields(&data)?,
                },
                "updateTransforms": [{
                    "fieldPath": stamp_field,
                    "setToServerValue": "REQUEST_TIME",
                }],
                "currentDocument": { "exists": false },
            }]
        });
        let request = self
            .http_client
            .post(format!("{}:commit", self.documents_url))
            .json(&body);
        self.send(request).await?;
        tracing::debug!(collection = %collection, id = %id, "Document added with server timestamp");
        Ok(id)
    }

    fn subscribe(&self, collection: &str) -> SnapshotStream {
        let state = Poll {
            store: self.clone(),
            collection: collection.to_string(),
            last: None,
            failing: false,
            first: true,
        };

        stream::unfold(state, |mut state| async move {
            loop {
                if !state.first {
                    tokio::time::sleep(state.store.poll_interval).await;
                }
                state.first = false;

                match state.store.list(&state.collection).await {
                    Ok(documents) => {
                        state.failing = false;
                        if state.last.as_ref() != Some(&documents) {
                            state.last = Some(documents.clone());
                            return Some((Ok(documents), state));
                        }
                    }
                    // one error per failure streak
                    Err(err) if !state.failing => {
                        state.failing = true;
                        return Some((Err(err), state));
                    }
                    Err(err) => {
                        tracing::debug!(
                            collection = %state.collection,
                            error = %err,
                            "Snapshot poll still failing"
                        );
                    }
                }
            }
        })
        .boxed()
    }

    fn name(&self) -> &'static str {
        "firestore"
    }
}

/// Encodes a JSON object as a Firestore `fields` map
pub fn encode_fields(data: &Value) -> AppResult<Value> {
    match data {
        Value::Object(map) => Ok(Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), encode_value(v)))
                .collect(),
        )),
        other => Err(AppError::InvalidInput(format!(
            "documents must be JSON objects, got {}",
            other
        ))),
    }
}

pub fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) if n.is_i64() || n.is_u64() => json!({ "integerValue": n.to_string() }),
        Value::Number(n) => json!({ "doubleValue": n.as_f64() }),
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => json!({
            "arrayValue": { "values": items.iter().map(encode_value).collect::<Vec<_>>() }
        }),
        Value::Object(_) => json!({
            "mapValue": { "fields": encode_fields(value).unwrap_or_else(|_| json!({})) }
        }),
    }
}

pub fn decode_fields(fields: &Map<String, Value>) -> Value {
    Value::Object(
        fields
            .iter()
            .map(|(k, v)| (k.clone(), decode_value(v)))
            .collect(),
    )
}

pub fn decode_value(value: &Value) -> Value {
    let Some((kind, inner)) = value.as_object().and_then(|m| m.iter().next()) else {
        return Value::Null;
    };

    match kind.as_str() {
        "booleanValue" => inner.clone(),
        "integerValue" => match inner {
            Value::String(s) => s.parse::<i64>().map(Value::from).unwrap_or(Value::Null),
            Value::Number(_) => inner.clone(),
            _ => Value::Null,
        },
        "doubleValue" => inner
            .as_f64()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => inner.clone(),
        "arrayValue" => Value::Array(
            inner["values"]
                .as_array()
                .map(|values| values.iter().map(decode_value).collect())
                .unwrap_or_default(),
        ),
        "mapValue" => inner["fields"]
            .as_object()
            .map(decode_fields)
            .unwrap_or_else(|| json!({})),
        "geoPointValue" => inner.clone(),
        _ => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryAuth;
    use axum::{
        http::{HeaderMap, Method, Uri},
        response::IntoResponse,
        Json, Router,
    };

    #[test]
    fn test_encode_favorite_document() {
        let encoded = encode_fields(&json!({
            "movieId": 27205,
            "title": "Inception",
            "poster_path": "/p.jpg",
            "vote_average": 8.4,
            "genre_ids": [],
        }))
        .unwrap();

        assert_eq!(encoded["movieId"], json!({"integerValue": "27205"}));
        assert_eq!(encoded["title"], json!({"stringValue": "Inception"}));
        assert_eq!(encoded["vote_average"], json!({"doubleValue": 8.4}));
        assert_eq!(encoded["genre_ids"], json!({"arrayValue": {"values": []}}));
    }

    #[test]
    fn test_encode_rejects_non_objects() {
        assert!(matches!(
            encode_fields(&json!([1, 2])),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_decode_typed_values() {
        let fields = json!({
            "movieId": {"integerValue": "603"},
            "title": {"stringValue": "The Matrix"},
            "vote_average": {"doubleValue": 8.2},
            "genre_ids": {"arrayValue": {"values": [{"integerValue": "28"}]}},
            "meta": {"mapValue": {"fields": {"ok": {"booleanValue": true}}}},
            "createdAt": {"timestampValue": "2024-05-01T12:00:00Z"},
            "missing": {"nullValue": null},
        });

        let decoded = decode_fields(fields.as_object().unwrap());
        assert_eq!(
            decoded,
            json!({
                "movieId": 603,
                "title": "The Matrix",
                "vote_average": 8.2,
                "genre_ids": [28],
                "meta": {"ok": true},
                "createdAt": "2024-05-01T12:00:00Z",
                "missing": null,
            })
        );
    }

    #[test]
    fn test_decode_empty_array_value() {
        // Firestore omits `values` for empty arrays
        assert_eq!(decode_value(&json!({"arrayValue": {}})), json!([]));
    }

    fn raw(collection: &str, id: &str, fields: Value) -> Value {
        json!({
            "name": format!("projects/demo/databases/(default)/documents/{}/{}", collection, id),
            "fields": fields,
        })
    }

    async fn fake_firestore(
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: String,
    ) -> axum::response::Response {
        let authorized = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.starts_with("Bearer memory-token-"))
            .unwrap_or(false);
        if !authorized {
            return (
                axum::http::StatusCode::FORBIDDEN,
                Json(json!({"error": {"message": "Missing or insufficient permissions."}})),
            )
                .into_response();
        }

        let path = uri.path();
        let query = uri.query().unwrap_or_default();
        match (method, path) {
            (Method::GET, p) if p.ends_with("/users/u1/favorites") => {
                if query.contains("pageToken=next") {
                    Json(json!({
                        "documents": [raw("users/u1/favorites", "27205", json!({"movieId": {"integerValue": "27205"}}))]
                    }))
                    .into_response()
                } else {
                    Json(json!({
                        "documents": [raw("users/u1/favorites", "603", json!({"movieId": {"integerValue": "603"}}))],
                        "nextPageToken": "next"
                    }))
                    .into_response()
                }
            }
            (Method::GET, p) if p.ends_with("/users/u1/favorites/603") => {
                Json(raw("users/u1/favorites", "603", json!({"movieId": {"integerValue": "603"}})))
                    .into_response()
            }
            (Method::GET, _) => (
                axum::http::StatusCode::NOT_FOUND,
                Json(json!({"error": {"message": "not found"}})),
            )
                .into_response(),
            (Method::POST, p) if p.ends_with("/documents:commit") => {
                let sent: Value = serde_json::from_str(&body).unwrap_or_default();
                let write = &sent["writes"][0];
                let stamped = write["updateTransforms"][0] == json!({
                    "fieldPath": "createdAt",
                    "setToServerValue": "REQUEST_TIME",
                });
                let named = write["update"]["name"]
                    .as_str()
                    .unwrap_or_default()
                    .starts_with("projects/demo/databases/(default)/documents/messages/");
                if stamped && named && write["update"]["fields"].get("createdAt").is_none() {
                    Json(json!({"writeResults": [{}], "commitTime": "2024-05-01T12:00:00Z"}))
                        .into_response()
                } else {
                    (axum::http::StatusCode::BAD_REQUEST, Json(json!({"error": {"message": "bad commit"}})))
                        .into_response()
                }
            }
            (Method::POST, p) if p.ends_with("/messages") => {
                let sent: Value = serde_json::from_str(&body).unwrap_or_default();
                Json(raw("messages", "generated42", sent["fields"].clone())).into_response()
            }
            _ => Json(json!({})).into_response(),
        }
    }

    async fn store(signed_in: bool) -> FirestoreStore {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, Router::new().fallback(fake_firestore))
                .await
                .unwrap()
        });

        let auth = Arc::new(MemoryAuth::new());
        if signed_in {
            auth.register("ana@example.com", "secret123", "Ana")
                .await
                .unwrap();
        }
        FirestoreStore::with_endpoint(
            &format!("http://{}", addr),
            "demo",
            "test_key".to_string(),
            auth,
            Duration::from_millis(10),
        )
    }

    #[tokio::test]
    async fn test_get_decodes_and_maps_missing() {
        let store = store(true).await;
        let doc = store.get("users/u1/favorites", "603").await.unwrap().unwrap();
        assert_eq!(doc.id, "603");
        assert_eq!(doc.data["movieId"], 603);

        assert!(store.get("users/u1/favorites", "1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_add_returns_generated_id() {
        let store = store(true).await;
        let id = store
            .add("messages", json!({"message": "hello"}))
            .await
            .unwrap();
        assert_eq!(id, "generated42");
    }

    #[tokio::test]
    async fn test_add_stamped_commits_server_time_transform() {
        let store = store(true).await;
        let id = store
            .add_stamped("messages", json!({"message": "hello"}), "createdAt")
            .await
            .unwrap();
        assert_eq!(id.len(), 32);
    }

    #[tokio::test]
    async fn test_subscribe_follows_pagination() {
        let store = store(true).await;
        let mut snapshots = store.subscribe("users/u1/favorites");
        let docs = snapshots.next().await.unwrap().unwrap();
        let ids: Vec<_> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["27205", "603"]);

        // unchanged listings are not re-emitted
        let again =
            tokio::time::timeout(Duration::from_millis(80), snapshots.next()).await;
        assert!(again.is_err());
    }

    #[tokio::test]
    async fn test_permission_errors_surface_once() {
        let store = store(false).await;
        assert!(matches!(
            store.set("users/u1/favorites", "603", json!({})).await,
            Err(AppError::Store(_))
        ));

        let mut snapshots = store.subscribe("users/u1/favorites");
        let err = snapshots.next().await.unwrap().unwrap_err();
        assert!(err.to_string().contains("insufficient permissions"));

        let repeated =
            tokio::time::timeout(Duration::from_millis(80), snapshots.next()).await;
        assert!(repeated.is_err(), "a failure streak reports only once");
    }
}
