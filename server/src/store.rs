use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::types::*;

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Record tables backing every flow. Listing operations return rows in
/// insertion order.
#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_provider(&self, provider: NewProvider) -> AppResult<Provider>;
    async fn list_providers(&self) -> AppResult<Vec<Provider>>;
    async fn get_provider(&self, provider_id: &str) -> AppResult<Option<Provider>>;
    async fn update_provider_rating(&self, provider_id: &str, rating: f64) -> AppResult<()>;

    async fn insert_lead(&self, lead: NewLead) -> AppResult<Lead>;
    async fn assign_providers(&self, lead_id: &str, providers: &[MatchedProvider])
        -> AppResult<()>;
    async fn update_lead_status(&self, lead_id: &str, status: LeadStatus) -> AppResult<Lead>;
    async fn list_leads(&self) -> AppResult<Vec<Lead>>;

    async fn insert_message(&self, message: NewChatMessage) -> AppResult<ChatMessage>;
    async fn session_messages(&self, session_id: &str) -> AppResult<Vec<ChatMessage>>;
    async fn list_messages(&self) -> AppResult<Vec<ChatMessage>>;

    async fn insert_session(&self, user_id: &str, started_at: i64) -> AppResult<ChatSession>;
    /// Returns `false` when the key does not belong to a stored session.
    async fn set_session_status(&self, session_id: &str, status: SessionStatus)
        -> AppResult<bool>;
    async fn insert_whatsapp_session(
        &self,
        phone: &str,
        session_id: &str,
    ) -> AppResult<WhatsappSession>;

    async fn insert_rating(&self, rating: NewRating) -> AppResult<ProviderRating>;
    async fn provider_ratings(&self, provider_id: &str) -> AppResult<Vec<ProviderRating>>;
    async fn list_ratings(&self) -> AppResult<Vec<ProviderRating>>;
}

#[derive(Default)]
struct Tables {
    providers: Vec<Provider>,
    leads: Vec<Lead>,
    messages: Vec<ChatMessage>,
    sessions: Vec<ChatSession>,
    whatsapp_sessions: Vec<WhatsappSession>,
    ratings: Vec<ProviderRating>,
}

/// Process-local store used when no database is configured.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
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
        self.tables.write().await.providers.push(record.clone());
        Ok(record)
    }

    async fn list_providers(&self) -> AppResult<Vec<Provider>> {
        Ok(self.tables.read().await.providers.clone())
    }

    async fn get_provider(&self, provider_id: &str) -> AppResult<Option<Provider>> {
        let tables = self.tables.read().await;
        Ok(tables.providers.iter().find(|p| p.id == provider_id).cloned())
    }

    async fn update_provider_rating(&self, provider_id: &str, rating: f64) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        let provider = tables
            .providers
            .iter_mut()
            .find(|p| p.id == provider_id)
            .ok_or_else(|| AppError::NotFound(format!("provider {provider_id}")))?;
        provider.rating = Some(rating);
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
        self.tables.write().await.leads.push(record.clone());
        Ok(record)
    }

    async fn assign_providers(
        &self,
        lead_id: &str,
        providers: &[MatchedProvider],
    ) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        let lead = tables
            .leads
            .iter_mut()
            .find(|l| l.id == lead_id)
            .ok_or_else(|| AppError::NotFound(format!("lead {lead_id}")))?;
        lead.assigned_providers = providers.to_vec();
        Ok(())
    }

    async fn update_lead_status(&self, lead_id: &str, status: LeadStatus) -> AppResult<Lead> {
        let mut tables = self.tables.write().await;
        let lead = tables
            .leads
            .iter_mut()
            .find(|l| l.id == lead_id)
            .ok_or_else(|| AppError::NotFound(format!("lead {lead_id}")))?;
        lead.status = status;
        Ok(lead.clone())
    }

    async fn list_leads(&self) -> AppResult<Vec<Lead>> {
        Ok(self.tables.read().await.leads.clone())
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
        self.tables.write().await.messages.push(record.clone());
        Ok(record)
    }

    async fn session_messages(&self, session_id: &str) -> AppResult<Vec<ChatMessage>> {
        let tables = self.tables.read().await;
        Ok(tables
            .messages
            .iter()
            .filter(|m| m.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn list_messages(&self) -> AppResult<Vec<ChatMessage>> {
        Ok(self.tables.read().await.messages.clone())
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
        self.tables.write().await.sessions.push(record.clone());
        Ok(record)
    }

    async fn set_session_status(
        &self,
        session_id: &str,
        status: SessionStatus,
    ) -> AppResult<bool> {
        let mut tables = self.tables.write().await;
        let Some(session) = tables.sessions.iter_mut().find(|s| s.id == session_id) else {
            return Ok(false);
        };
        session.status = status;
        if status == SessionStatus::Closed {
            session.ended_at = Some(now_millis());
        }
        Ok(true)
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
        self.tables
            .write()
            .await
            .whatsapp_sessions
            .push(record.clone());
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
        self.tables.write().await.ratings.push(record.clone());
        Ok(record)
    }

    async fn provider_ratings(&self, provider_id: &str) -> AppResult<Vec<ProviderRating>> {
        let tables = self.tables.read().await;
        Ok(tables
            .ratings
            .iter()
            .filter(|r| r.provider_id == provider_id)
            .cloned()
            .collect())
    }

    async fn list_ratings(&self) -> AppResult<Vec<ProviderRating>> {
        Ok(self.tables.read().await.ratings.clone())
    }
}
