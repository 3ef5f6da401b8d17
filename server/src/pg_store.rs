use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgPool, Row};

use crate::error::{AppError, AppResult};
use crate::store::{new_id, now_millis, Store};
use crate::types::*;

/// PostgreSQL-backed store. List-valued columns are kept as JSON text.
#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn json_column<T: serde::de::DeserializeOwned + Default>(row: &PgRow, column: &str) -> T {
    let raw = row.get::<String, _>(column);
    serde_json::from_str(&raw).unwrap_or_default()
}

fn to_json_text<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "[]".to_string())
}

fn provider_from_row(row: &PgRow) -> Provider {
    Provider {
        id: row.get("id"),
        creation_time: row.get("creation_time"),
        name: row.get("name"),
        services: json_column(row, "services"),
        email: row.get("email"),
        phone: row.get("phone"),
        address: row.get("address"),
        latitude: row.get("latitude"),
        longitude: row.get("longitude"),
        rating: row.get("rating"),
    }
}

fn lead_from_row(row: &PgRow) -> Lead {
    Lead {
        id: row.get("id"),
        creation_time: row.get("creation_time"),
        user_id: row.get("user_id"),
        issue_description: row.get("issue_description"),
        car_model: row.get("car_model"),
        status: LeadStatus::parse(&row.get::<String, _>("status")).unwrap_or_default(),
        issue_category: row.get("issue_category"),
        assigned_providers: json_column(row, "assigned_providers"),
        latitude: row.get("latitude"),
        longitude: row.get("longitude"),
    }
}

fn message_from_row(row: &PgRow) -> ChatMessage {
    ChatMessage {
        id: row.get("id"),
        creation_time: row.get("creation_time"),
        session_id: row.get("session_id"),
        sender: Sender::parse(&row.get::<String, _>("sender")),
        kind: MessageKind::parse(&row.get::<String, _>("kind")),
        message: row.get("message"),
        timestamp: row.get("timestamp"),
    }
}

fn rating_from_row(row: &PgRow) -> ProviderRating {
    ProviderRating {
        id: row.get("id"),
        creation_time: row.get("creation_time"),
        provider_id: row.get("provider_id"),
        user_id: row.get("user_id"),
        rating: row.get("rating"),
        comment: row.get("comment"),
    }
}

const PROVIDER_COLUMNS: &str = "id, creation_time, name, services, email, phone, address, \
                                latitude, longitude, rating";
const LEAD_COLUMNS: &str = "id, creation_time, user_id, issue_description, car_model, status, \
                            issue_category, assigned_providers, latitude, longitude";
const MESSAGE_COLUMNS: &str = "id, creation_time, session_id, sender, kind, message, timestamp";
const RATING_COLUMNS: &str = "id, creation_time, provider_id, user_id, rating, comment";

#[async_trait]
impl Store for PgStore {
    async fn insert_provider(&self, provider: NewProvider) -> AppResult<Provider> {
        let record = Provider {
            id: new_id(),
            creation_time: now_millis(),
            name: provider.name,
            services: provider.services,
            email: provider.email,
            phone: provider.phone,
            address: provider.address,
            latitude: provider.latitude,
            longitude: provider.longitude,
            rating: None,
        };
        sqlx::query(
            "INSERT INTO providers \
             (id, creation_time, name, services, email, phone, address, latitude, longitude) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(&record.id)
        .bind(record.creation_time)
        .bind(&record.name)
        .bind(to_json_text(&record.services))
        .bind(&record.email)
        .bind(&record.phone)
        .bind(&record.address)
        .bind(record.latitude)
        .bind(record.longitude)
        .execute(&self.db)
        .await?;
        Ok(record)
    }

    async fn list_providers(&self) -> AppResult<Vec<Provider>> {
        let rows = sqlx::query(&format!(
            "SELECT {PROVIDER_COLUMNS} FROM providers ORDER BY creation_time ASC"
        ))
        .fetch_all(&self.db)
        .await?;
        Ok(rows.iter().map(provider_from_row).collect())
    }

    async fn get_provider(&self, provider_id: &str) -> AppResult<Option<Provider>> {
        let row = sqlx::query(&format!(
            "SELECT {PROVIDER_COLUMNS} FROM providers WHERE id = $1"
        ))
        .bind(provider_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.as_ref().map(provider_from_row))
    }

    async fn update_provider_rating(&self, provider_id: &str, rating: f64) -> AppResult<()> {
        let result = sqlx::query("UPDATE providers SET rating = $1 WHERE id = $2")
            .bind(rating)
            .bind(provider_id)
            .execute(&self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("provider {provider_id}")));
        }
        Ok(())
    }

    async fn insert_lead(&self, lead: NewLead) -> AppResult<Lead> {
        let record = Lead {
            id: new_id(),
            creation_time: now_millis(),
            user_id: lead.user_id,
            issue_description: lead.issue_description,
            car_model: lead.car_model,
            status: LeadStatus::New,
            issue_category: lead.issue_category,
            assigned_providers: Vec::new(),
            latitude: lead.latitude,
            longitude: lead.longitude,
        };
        sqlx::query(
            "INSERT INTO leads \
             (id, creation_time, user_id, issue_description, car_model, status, \
              issue_category, latitude, longitude) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(&record.id)
        .bind(record.creation_time)
        .bind(&record.user_id)
        .bind(&record.issue_description)
        .bind(&record.car_model)
        .bind(record.status.as_str())
        .bind(&record.issue_category)
        .bind(record.latitude)
        .bind(record.longitude)
        .execute(&self.db)
        .await?;
        Ok(record)
    }

    async fn assign_providers(
        &self,
        lead_id: &str,
        providers: &[MatchedProvider],
    ) -> AppResult<()> {
        let result = sqlx::query("UPDATE leads SET assigned_providers = $1 WHERE id = $2")
            .bind(to_json_text(&providers))
            .bind(lead_id)
            .execute(&self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("lead {lead_id}")));
        }
        Ok(())
    }

    async fn update_lead_status(&self, lead_id: &str, status: LeadStatus) -> AppResult<Lead> {
        let row = sqlx::query(&format!(
            "UPDATE leads SET status = $1 WHERE id = $2 RETURNING {LEAD_COLUMNS}"
        ))
        .bind(status.as_str())
        .bind(lead_id)
        .fetch_optional(&self.db)
        .await?;
        row.as_ref()
            .map(lead_from_row)
            .ok_or_else(|| AppError::NotFound(format!("lead {lead_id}")))
    }

    async fn list_leads(&self) -> AppResult<Vec<Lead>> {
        let rows = sqlx::query(&format!(
            "SELECT {LEAD_COLUMNS} FROM leads ORDER BY creation_time ASC"
        ))
        .fetch_all(&self.db)
        .await?;
        Ok(rows.iter().map(lead_from_row).collect())
    }

    async fn insert_message(&self, message: NewChatMessage) -> AppResult<ChatMessage> {
        let record = ChatMessage {
            id: new_id(),
            creation_time: now_millis(),
            session_id: message.session_id,
            sender: message.sender,
            kind: message.kind,
            message: message.message,
            timestamp: message.timestamp,
        };
        sqlx::query(
            "INSERT INTO chat_messages \
             (id, creation_time, session_id, sender, kind, message, timestamp) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(&record.id)
        .bind(record.creation_time)
        .bind(&record.session_id)
        .bind(record.sender.as_str())
        .bind(record.kind.as_str())
        .bind(&record.message)
        .bind(record.timestamp)
        .execute(&self.db)
        .await?;
        Ok(record)
    }

    async fn session_messages(&self, session_id: &str) -> AppResult<Vec<ChatMessage>> {
        let rows = sqlx::query(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM chat_messages \
             WHERE session_id = $1 ORDER BY creation_time ASC"
        ))
        .bind(session_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.iter().map(message_from_row).collect())
    }

    async fn list_messages(&self) -> AppResult<Vec<ChatMessage>> {
        let rows = sqlx::query(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM chat_messages ORDER BY creation_time ASC"
        ))
        .fetch_all(&self.db)
        .await?;
        Ok(rows.iter().map(message_from_row).collect())
    }

    async fn insert_session(&self, user_id: &str, started_at: i64) -> AppResult<ChatSession> {
        let record = ChatSession {
            id: new_id(),
            creation_time: now_millis(),
            user_id: user_id.to_string(),
            provider_id: None,
            status: SessionStatus::Active,
            started_at,
            ended_at: None,
        };
        sqlx::query(
            "INSERT INTO chat_sessions (id, creation_time, user_id, status, started_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&record.id)
        .bind(record.creation_time)
        .bind(&record.user_id)
        .bind(record.status.as_str())
        .bind(record.started_at)
        .execute(&self.db)
        .await?;
        Ok(record)
    }

    async fn set_session_status(
        &self,
        session_id: &str,
        status: SessionStatus,
    ) -> AppResult<bool> {
        let ended_at = (status == SessionStatus::Closed).then(now_millis);
        let result = sqlx::query(
            "UPDATE chat_sessions SET status = $1, ended_at = COALESCE($2, ended_at) \
             WHERE id = $3",
        )
        .bind(status.as_str())
        .bind(ended_at)
        .bind(session_id)
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_whatsapp_session(
        &self,
        phone: &str,
        session_id: &str,
    ) -> AppResult<WhatsappSession> {
        let record = WhatsappSession {
            id: new_id(),
            creation_time: now_millis(),
            phone: phone.to_string(),
            session_id: session_id.to_string(),
            status: SessionStatus::Active,
        };
        sqlx::query(
            "INSERT INTO whatsapp_sessions (id, creation_time, phone, session_id, status) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&record.id)
        .bind(record.creation_time)
        .bind(&record.phone)
        .bind(&record.session_id)
        .bind(record.status.as_str())
        .execute(&self.db)
        .await?;
        Ok(record)
    }

    async fn insert_rating(&self, rating: NewRating) -> AppResult<ProviderRating> {
        let record = ProviderRating {
            id: new_id(),
            creation_time: now_millis(),
            provider_id: rating.provider_id,
            user_id: rating.user_id,
            rating: rating.rating,
            comment: rating.comment,
        };
        sqlx::query(
            "INSERT INTO provider_ratings \
             (id, creation_time, provider_id, user_id, rating, comment) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&record.id)
        .bind(record.creation_time)
        .bind(&record.provider_id)
        .bind(&record.user_id)
        .bind(record.rating)
        .bind(&record.comment)
        .execute(&self.db)
        .await?;
        Ok(record)
    }

    async fn provider_ratings(&self, provider_id: &str) -> AppResult<Vec<ProviderRating>> {
        let rows = sqlx::query(&format!(
            "SELECT {RATING_COLUMNS} FROM provider_ratings \
             WHERE provider_id = $1 ORDER BY creation_time ASC"
        ))
        .bind(provider_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.iter().map(rating_from_row).collect())
    }

    async fn list_ratings(&self) -> AppResult<Vec<ProviderRating>> {
        let rows = sqlx::query(&format!(
            "SELECT {RATING_COLUMNS} FROM provider_ratings ORDER BY creation_time ASC"
        ))
        .fetch_all(&self.db)
        .await?;
        Ok(rows.iter().map(rating_from_row).collect())
    }
}
