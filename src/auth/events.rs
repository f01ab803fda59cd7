use async_trait::async_trait;
use time::OffsetDateTime;
use tracing::{debug, info};
use uuid::Uuid;

/// Account lifecycle notifications for downstream consumers.
#[derive(Debug, Clone)]
pub enum AccountEvent {
    ActivationNeeded {
        user_id: Uuid,
        email: String,
        code: String,
        expires_at: OffsetDateTime,
    },
    Activated {
        user_id: Uuid,
        email: String,
    },
}

#[async_trait]
pub trait AccountEvents: Send + Sync {
    async fn publish(&self, event: AccountEvent) -> anyhow::Result<()>;
}

/// Stand-in sink that only records events in the log.
#[derive(Debug, Clone, Default)]
pub struct LogEvents;

#[async_trait]
impl AccountEvents for LogEvents {
    async fn publish(&self, event: AccountEvent) -> anyhow::Result<()> {
        match event {
            AccountEvent::ActivationNeeded {
                user_id,
                email,
                code,
                expires_at,
            } => {
                info!(%user_id, %email, %expires_at, "activation needed");
                debug!(%user_id, %code, "activation code");
            }
            AccountEvent::Activated { user_id, email } => {
                info!(%user_id, %email, "account activated");
            }
        }
        Ok(())
    }
}
