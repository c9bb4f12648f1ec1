//! User directory contract and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use common::UserId;
use serde::{Deserialize, Serialize};

use crate::{Result, RpcError};

const SERVICE: &str = "user";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    #[default]
    User,
    Admin,
    Shipper,
    RestaurantOwner,
}

/// Contact data of a user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: UserId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
}

impl UserInfo {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

#[async_trait]
pub trait UserRpc: Send + Sync {
    /// Looks up users by id. Unknown ids are absent from the result.
    async fn find_by_ids(&self, ids: &[UserId]) -> Result<HashMap<UserId, UserInfo>>;
}

#[derive(Debug, Default)]
struct InMemoryUserState {
    users: HashMap<UserId, UserInfo>,
    unavailable: bool,
}

/// In-memory user directory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryUserRpc {
    state: Arc<RwLock<InMemoryUserState>>,
}

impl InMemoryUserRpc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, user: UserInfo) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .users
            .insert(user.id.clone(), user);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .unavailable = unavailable;
    }
}

#[async_trait]
impl UserRpc for InMemoryUserRpc {
    async fn find_by_ids(&self, ids: &[UserId]) -> Result<HashMap<UserId, UserInfo>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        if state.unavailable {
            return Err(RpcError::unavailable(SERVICE));
        }
        Ok(ids
            .iter()
            .filter_map(|id| state.users.get(id).map(|u| (id.clone(), u.clone())))
            .collect())
    }
}
