use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{QueryBuilder, SupabaseClient};
use shared_utils::validation::Validator;

use crate::models::{NewNotification, Notification, NotificationError, NotificationQuery};
use crate::services::delivery::{LogDelivery, NotificationDelivery};

const TABLE: &str = "notifications";

pub struct NotificationService {
    supabase: SupabaseClient,
    delivery: Arc<dyn NotificationDelivery>,
}

impl NotificationService {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_delivery(config, Arc::new(LogDelivery))
    }

    pub fn with_delivery(config: &AppConfig, delivery: Arc<dyn NotificationDelivery>) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            delivery,
        }
    }

    /// Stores the notification, then hands it to the delivery channel.
    /// A delivery failure is logged; the stored row is still returned.
    pub async fn notify(
        &self,
        request: NewNotification,
        auth_token: &str,
    ) -> Result<Notification, NotificationError> {
        debug!("Creating {} notification for {}", request.kind, request.recipient_id);

        Validator::new()
            .required("title", &request.title)
            .max_len("title", &request.title, 200)
            .max_len("body", &request.body, 2000)
            .optional_max_len("link", request.link.as_deref(), 500)
            .into_result()
            .map_err(NotificationError::ValidationError)?;

        let row = json!({
            "recipient_id": request.recipient_id,
            "kind": request.kind,
            "title": request.title,
            "body": request.body,
            "link": request.link,
            "created_at": Utc::now().to_rfc3339(),
        });

        let notification: Notification = self.supabase
            .insert(TABLE, row, auth_token)
            .await
            .map_err(|e| NotificationError::DatabaseError(e.to_string()))?;

        if let Err(e) = self.delivery.deliver(&notification).await {
            warn!("Delivery failed for notification {}: {}", notification.id, e);
        }

        Ok(notification)
    }

    /// Used by other cells: never fails the caller's action.
    pub async fn notify_best_effort(&self, request: NewNotification, auth_token: &str) -> Option<Notification> {
        let recipient = request.recipient_id;
        match self.notify(request, auth_token).await {
            Ok(notification) => Some(notification),
            Err(e) => {
                warn!("Could not notify {}: {}", recipient, e);
                None
            }
        }
    }

    pub async fn list_for_recipient(
        &self,
        recipient_id: Uuid,
        query: &NotificationQuery,
        auth_token: &str,
    ) -> Result<Vec<Notification>, NotificationError> {
        debug!("Listing notifications for {}", recipient_id);

        let mut q = QueryBuilder::new().eq("recipient_id", recipient_id);
        if query.unread_only.unwrap_or(false) {
            q = q.is_null("read_at");
        }
        let q = q
            .order("created_at", false)
            .limit(query.limit.unwrap_or(50).clamp(1, 200));

        self.supabase
            .select(TABLE, &q, auth_token)
            .await
            .map_err(|e| NotificationError::DatabaseError(e.to_string()))
    }

    pub async fn unread_count(&self, recipient_id: Uuid, auth_token: &str) -> Result<usize, NotificationError> {
        let q = QueryBuilder::new()
            .select("id")
            .eq("recipient_id", recipient_id)
            .is_null("read_at");

        let rows: Vec<serde_json::Value> = self.supabase
            .select(TABLE, &q, auth_token)
            .await
            .map_err(|e| NotificationError::DatabaseError(e.to_string()))?;

        Ok(rows.len())
    }

    pub async fn mark_read(
        &self,
        notification_id: Uuid,
        recipient_id: Uuid,
        auth_token: &str,
    ) -> Result<Notification, NotificationError> {
        let existing: Notification = self.supabase
            .select_one(TABLE, &QueryBuilder::new().eq("id", notification_id), auth_token)
            .await
            .map_err(|e| NotificationError::DatabaseError(e.to_string()))?
            .ok_or(NotificationError::NotFound)?;

        if existing.recipient_id != recipient_id {
            warn!("User {} tried to mark notification {} they do not own", recipient_id, notification_id);
            return Err(NotificationError::Unauthorized);
        }

        if existing.is_read() {
            return Ok(existing);
        }

        let updated: Vec<Notification> = self.supabase
            .update(
                TABLE,
                &QueryBuilder::new().eq("id", notification_id),
                json!({ "read_at": Utc::now().to_rfc3339() }),
                auth_token,
            )
            .await
            .map_err(|e| NotificationError::DatabaseError(e.to_string()))?;

        updated.into_iter().next().ok_or(NotificationError::NotFound)
    }

    /// Returns how many notifications were marked.
    pub async fn mark_all_read(&self, recipient_id: Uuid, auth_token: &str) -> Result<usize, NotificationError> {
        let q = QueryBuilder::new()
            .eq("recipient_id", recipient_id)
            .is_null("read_at");

        let updated: Vec<Notification> = self.supabase
            .update(TABLE, &q, json!({ "read_at": Utc::now().to_rfc3339() }), auth_token)
            .await
            .map_err(|e| NotificationError::DatabaseError(e.to_string()))?;

        info!("Marked {} notifications read for {}", updated.len(), recipient_id);
        Ok(updated.len())
    }
}
