use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::json;

use super::{pick_target, AppointmentStore, ConversationLog};
use crate::errors::StoreError;
use crate::models::{Appointment, AppointmentStatus, ConversationTurn, ListFilter, Role};

const APPOINTMENTS: &str = "appointments";
const TURNS: &str = "conversation_turns";

/// Hosted store speaking PostgREST. Authenticates with the service-role key.
pub struct SupabaseStore {
    base_url: String,
    service_key: String,
    client: reqwest::Client,
}

impl SupabaseStore {
    pub fn new(base_url: String, service_key: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key,
            client: reqwest::Client::new(),
        }
    }

    fn request(&self, method: Method, table: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}/rest/v1/{table}", self.base_url))
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }

    /// Active appointments matching the fragment, most recently created first.
    async fn candidates(&self, fragment: &str) -> Result<Vec<Appointment>, StoreError> {
        let fragment = fragment.trim();
        if fragment.is_empty() {
            return Err(StoreError::NotFound(String::new()));
        }

        let resp = self
            .request(Method::GET, APPOINTMENTS)
            .query(&[
                ("select", "*".to_string()),
                ("status", "neq.cancelled".to_string()),
                ("title", format!("ilike.*{fragment}*")),
                ("order", "created_at.desc".to_string()),
            ])
            .send()
            .await
            .context("failed to call Supabase")?;
        Ok(rows(resp, "appointment lookup").await?)
    }

    /// PATCH keyed by id that only applies while the row is still active.
    async fn update_active(
        &self,
        id: &str,
        fragment: &str,
        changes: serde_json::Value,
    ) -> Result<Appointment, StoreError> {
        let resp = self
            .request(Method::PATCH, APPOINTMENTS)
            .query(&[
                ("id", format!("eq.{id}")),
                ("status", "neq.cancelled".to_string()),
            ])
            .header("Prefer", "return=representation")
            .json(&changes)
            .send()
            .await
            .context("failed to call Supabase")?;

        rows::<Appointment>(resp, "appointment update")
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound(fragment.to_string()))
    }
}

async fn rows<T: DeserializeOwned>(resp: reqwest::Response, what: &str) -> anyhow::Result<Vec<T>> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("Supabase {what} failed ({status}): {body}");
    }
    resp.json()
        .await
        .with_context(|| format!("failed to parse Supabase {what} response"))
}

#[async_trait]
impl AppointmentStore for SupabaseStore {
    async fn create(
        &self,
        title: &str,
        scheduled_at: DateTime<FixedOffset>,
    ) -> Result<Appointment, StoreError> {
        let appt = Appointment::new(title, scheduled_at);

        let resp = self
            .request(Method::POST, APPOINTMENTS)
            .header("Prefer", "return=representation")
            .json(&appt)
            .send()
            .await
            .context("failed to call Supabase")?;

        let created = rows::<Appointment>(resp, "appointment insert")
            .await?
            .into_iter()
            .next()
            .context("Supabase returned no row for the insert")?;

        tracing::info!(appointment_id = %created.id, title = %created.title, "appointment created");
        Ok(created)
    }

    async fn cancel(&self, title_fragment: &str) -> Result<Appointment, StoreError> {
        let target = pick_target(self.candidates(title_fragment).await?, title_fragment)?;

        let cancelled = self
            .update_active(
                &target.id,
                title_fragment,
                json!({
                    "status": AppointmentStatus::Cancelled,
                    "updated_at": Utc::now(),
                }),
            )
            .await?;

        tracing::info!(appointment_id = %cancelled.id, "appointment cancelled");
        Ok(cancelled)
    }

    async fn reschedule(
        &self,
        title_fragment: &str,
        new_instant: DateTime<FixedOffset>,
    ) -> Result<Appointment, StoreError> {
        let target = pick_target(self.candidates(title_fragment).await?, title_fragment)?;

        let moved = self
            .update_active(
                &target.id,
                title_fragment,
                json!({
                    "scheduled_at": new_instant,
                    "status": AppointmentStatus::Rescheduled,
                    "updated_at": Utc::now(),
                }),
            )
            .await?;

        tracing::info!(appointment_id = %moved.id, to = %new_instant, "appointment rescheduled");
        Ok(moved)
    }

    async fn list(&self, filter: ListFilter) -> Result<Vec<Appointment>, StoreError> {
        let mut query = vec![
            ("select", "*".to_string()),
            ("order", "scheduled_at.asc,created_at.asc".to_string()),
        ];
        match filter {
            ListFilter::Active => query.push(("status", "neq.cancelled".to_string())),
            ListFilter::Status(status) => query.push(("status", format!("eq.{}", status.as_str()))),
            ListFilter::All => {}
        }

        let resp = self
            .request(Method::GET, APPOINTMENTS)
            .query(&query)
            .send()
            .await
            .context("failed to call Supabase")?;
        Ok(rows(resp, "appointment list").await?)
    }
}

#[async_trait]
impl ConversationLog for SupabaseStore {
    async fn append_turn(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
    ) -> Result<(), StoreError> {
        let turn = ConversationTurn {
            conversation_id: conversation_id.to_string(),
            role,
            content: content.to_string(),
            created_at: Utc::now(),
        };

        let resp = self
            .request(Method::POST, TURNS)
            .header("Prefer", "return=minimal")
            .json(&turn)
            .send()
            .await
            .context("failed to call Supabase")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Supabase turn insert failed ({status}): {body}").into());
        }
        Ok(())
    }

    async fn recent_turns(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, StoreError> {
        let resp = self
            .request(Method::GET, TURNS)
            .query(&[
                ("select", "conversation_id,role,content,created_at".to_string()),
                ("conversation_id", format!("eq.{conversation_id}")),
                ("order", "created_at.desc".to_string()),
                ("limit", limit.to_string()),
            ])
            .send()
            .await
            .context("failed to call Supabase")?;

        let mut turns: Vec<ConversationTurn> = rows(resp, "turn history").await?;
        turns.reverse();
        Ok(turns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn row(id: &str, title: &str, status: &str) -> serde_json::Value {
        json!({
            "id": id,
            "title": title,
            "scheduled_at": "2025-05-06T09:00:00-03:00",
            "status": status,
            "created_at": "2025-05-05T12:00:00Z",
            "updated_at": "2025-05-05T12:00:00Z",
        })
    }

    fn store(server: &MockServer) -> SupabaseStore {
        SupabaseStore::new(format!("{}/", server.uri()), "service-key".to_string())
    }

    #[tokio::test]
    async fn test_create_posts_row_with_service_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/appointments"))
            .and(header("apikey", "service-key"))
            .and(header("authorization", "Bearer service-key"))
            .and(header("prefer", "return=representation"))
            .and(body_partial_json(json!({ "title": "Meeting with Ana", "status": "scheduled" })))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(json!([row("a1", "Meeting with Ana", "scheduled")])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let at = DateTime::parse_from_rfc3339("2025-05-06T09:00:00-03:00").unwrap();
        let created = store(&server).create("Meeting with Ana", at).await.unwrap();
        assert_eq!(created.id, "a1");
        assert_eq!(created.scheduled_at, at);
    }

    #[tokio::test]
    async fn test_cancel_without_candidates_does_not_patch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/appointments"))
            .and(query_param("title", "ilike.*Tati*"))
            .and(query_param("status", "neq.cancelled"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(0)
            .mount(&server)
            .await;

        let err = store(&server).cancel("Tati").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(ref f) if f == "Tati"));
    }

    #[tokio::test]
    async fn test_cancel_patches_most_recent_candidate() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/appointments"))
            .and(query_param("order", "created_at.desc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                row("newest", "Lunch with Ana", "scheduled"),
                row("oldest", "Meeting with Ana", "scheduled"),
            ])))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/appointments"))
            .and(query_param("id", "eq.newest"))
            .and(query_param("status", "neq.cancelled"))
            .and(body_partial_json(json!({ "status": "cancelled" })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([row("newest", "Lunch with Ana", "cancelled")])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let cancelled = store(&server).cancel("ana").await.unwrap();
        assert_eq!(cancelled.id, "newest");
        assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_lost_race_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([row("a1", "Dentist", "scheduled")])),
            )
            .mount(&server)
            .await;
        // Another request cancelled it between lookup and update.
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let at = DateTime::parse_from_rfc3339("2025-05-09T15:00:00-03:00").unwrap();
        let err = store(&server).reschedule("dentist", at).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_backend_failure_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;

        let err = store(&server).list(ListFilter::Active).await.unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_recent_turns_are_oldest_first() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/conversation_turns"))
            .and(query_param("conversation_id", "eq.c1"))
            .and(query_param("limit", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "conversation_id": "c1", "role": "assistant", "content": "second", "created_at": "2025-05-05T12:00:01Z" },
                { "conversation_id": "c1", "role": "user", "content": "first", "created_at": "2025-05-05T12:00:00Z" },
            ])))
            .mount(&server)
            .await;

        let turns = store(&server).recent_turns("c1", 2).await.unwrap();
        assert_eq!(turns[0].content, "first");
        assert_eq!(turns[1].role, Role::Assistant);
    }
}
