//! UseCase: ヘルス統計の取得

use std::sync::Arc;

use serde::Serialize;

use crate::domain::{ChatRepository, PresenceRegistry, RepositoryError};

/// Counters reported by the health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub users: usize,
    pub groups: usize,
    pub messages: usize,
    pub connections: usize,
}

pub struct GetStatsUseCase {
    repository: Arc<dyn ChatRepository>,
    presence: Arc<PresenceRegistry>,
}

impl GetStatsUseCase {
    pub fn new(repository: Arc<dyn ChatRepository>, presence: Arc<PresenceRegistry>) -> Self {
        Self {
            repository,
            presence,
        }
    }

    pub async fn execute(&self) -> Result<Stats, RepositoryError> {
        Ok(Stats {
            users: self.repository.count_users().await?,
            groups: self.repository.count_groups().await?,
            messages: self.repository.count_messages().await?,
            connections: self.presence.live_connections().len(),
        })
    }
}
