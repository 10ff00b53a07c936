//! Users, friend requests, friendships and blocks.

use chattrix_shared::{FriendRequestId, UserId};
use chattrix_store::{now, FriendRequest, FriendRequestStatus, StoreError, User};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dispatch::EventDispatcher;
use crate::error::{ServerError, ServerResult};
use crate::events::ServerEvent;
use crate::state::SharedDb;

/// Profile pushed by the auth service when a user signs up or edits their
/// profile.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub id: UserId,
    pub email: String,
    pub full_name: String,
    #[serde(default)]
    pub profile_pic: Option<String>,
}

/// Result of an email search, with the relationship to the requester.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSearchResult {
    pub user: User,
    pub is_already_friend: bool,
    pub is_blocked: bool,
    pub friend_request: Option<FriendRequest>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestAction {
    /// Receiver only.
    Accept,
    /// Receiver only.
    Reject,
    /// Sender only.
    Cancel,
}

#[derive(Clone)]
pub struct RelationshipService {
    db: SharedDb,
    dispatcher: EventDispatcher,
}

impl RelationshipService {
    pub fn new(db: SharedDb, dispatcher: EventDispatcher) -> Self {
        Self { db, dispatcher }
    }

    pub async fn upsert_user(&self, new: NewUser) -> ServerResult<User> {
        let email = new.email.trim().to_lowercase();
        if email.is_empty() || !email.contains('@') {
            return Err(ServerError::InvalidOperation("Invalid email".into()));
        }
        let full_name = new.full_name.trim().to_string();
        if full_name.is_empty() {
            return Err(ServerError::InvalidOperation("Full name is required".into()));
        }

        let db = self.db.lock().await;
        let user = User {
            id: new.id,
            email,
            full_name,
            profile_pic: new.profile_pic,
            created_at: now(),
        };
        db.upsert_user(&user).map_err(|e| match e {
            StoreError::Duplicate => ServerError::Conflict("Email already in use".into()),
            other => other.into(),
        })?;
        Ok(db.get_user(user.id)?)
    }

    pub async fn get_user(&self, id: UserId) -> ServerResult<User> {
        Ok(self.db.lock().await.get_user(id)?)
    }

    pub async fn search_by_email(
        &self,
        requester: UserId,
        email: &str,
    ) -> ServerResult<UserSearchResult> {
        let email = email.trim();
        if email.is_empty() {
            return Err(ServerError::InvalidOperation("Email is required".into()));
        }

        let db = self.db.lock().await;
        let user = db.find_user_by_email(email, requester).map_err(|e| match e {
            StoreError::NotFound => ServerError::NotFound("User not found".into()),
            other => other.into(),
        })?;

        Ok(UserSearchResult {
            is_already_friend: db.are_friends(requester, user.id)?,
            is_blocked: db.is_blocked_either(requester, user.id)?,
            friend_request: db.find_request_between(requester, user.id)?,
            user,
        })
    }

    pub async fn send_request(
        &self,
        sender: UserId,
        receiver: UserId,
    ) -> ServerResult<FriendRequest> {
        if sender == receiver {
            return Err(ServerError::InvalidOperation(
                "Cannot send friend request to yourself".into(),
            ));
        }

        let request = {
            let db = self.db.lock().await;
            if !db.user_exists(receiver)? {
                return Err(ServerError::NotFound("User not found".into()));
            }
            if db.are_friends(sender, receiver)? {
                return Err(ServerError::Conflict("Already friends".into()));
            }
            if db.is_blocked_either(sender, receiver)? {
                return Err(ServerError::Conflict("Cannot send friend request".into()));
            }
            if db.find_request_between(sender, receiver)?.is_some() {
                return Err(ServerError::Conflict("Friend request already exists".into()));
            }

            db.insert_friend_request(FriendRequestId::new(), sender, receiver, now())
                .map_err(|e| match e {
                    StoreError::Duplicate => {
                        ServerError::Conflict("Friend request already exists".into())
                    }
                    other => other.into(),
                })?
        };

        info!(sender = %sender, receiver = %receiver, request = %request.id, "Friend request sent");
        self.dispatcher
            .emit_to_user(receiver, ServerEvent::FriendRequest(request.clone()))
            .await;
        Ok(request)
    }

    /// Accept, reject or cancel a pending request.
    pub async fn respond(
        &self,
        request_id: FriendRequestId,
        actor: UserId,
        action: RequestAction,
    ) -> ServerResult<FriendRequest> {
        let request = {
            let mut db = self.db.lock().await;
            let request = db.get_friend_request(request_id).map_err(|e| match e {
                StoreError::NotFound => ServerError::NotFound("Friend request not found".into()),
                other => other.into(),
            })?;

            let allowed = match action {
                RequestAction::Accept | RequestAction::Reject => request.receiver.id == actor,
                RequestAction::Cancel => request.sender.id == actor,
            };
            if !allowed {
                return Err(ServerError::Forbidden("Not authorized".into()));
            }
            if request.status != FriendRequestStatus::Pending {
                return Err(ServerError::Conflict("Request already processed".into()));
            }

            match action {
                RequestAction::Accept => {
                    db.accept_friend_request(request_id, now())?;
                    db.get_friend_request(request_id)?
                }
                RequestAction::Reject | RequestAction::Cancel => {
                    db.delete_friend_request(request_id)?;
                    request
                }
            }
        };

        info!(request = %request_id, actor = %actor, ?action, "Friend request resolved");
        if action == RequestAction::Accept {
            self.dispatcher
                .emit_to_user(
                    request.sender.id,
                    ServerEvent::FriendRequestAccepted { user_id: actor },
                )
                .await;
        }
        Ok(request)
    }

    pub async fn list_received_requests(&self, user: UserId) -> ServerResult<Vec<FriendRequest>> {
        Ok(self.db.lock().await.list_received_requests(user)?)
    }

    pub async fn list_sent_requests(&self, user: UserId) -> ServerResult<Vec<FriendRequest>> {
        Ok(self.db.lock().await.list_sent_requests(user)?)
    }

    pub async fn list_friends(&self, user: UserId) -> ServerResult<Vec<User>> {
        Ok(self.db.lock().await.list_friends(user)?)
    }

    pub async fn list_blocked(&self, user: UserId) -> ServerResult<Vec<User>> {
        Ok(self.db.lock().await.list_blocked(user)?)
    }

    /// Symmetric unfriend. Removing someone who is not a friend is a no-op
    /// and notifies nobody.
    pub async fn remove_friend(&self, actor: UserId, friend: UserId) -> ServerResult<()> {
        if actor == friend {
            return Err(ServerError::InvalidOperation("Cannot remove yourself".into()));
        }
        if !self.db.lock().await.remove_friendship(actor, friend)? {
            debug!(actor = %actor, friend = %friend, "Not friends, nothing to remove");
            return Ok(());
        }

        info!(actor = %actor, friend = %friend, "Friend removed");
        self.dispatcher
            .emit_to_user(friend, ServerEvent::FriendRemoved { user_id: actor })
            .await;
        Ok(())
    }

    pub async fn block(&self, actor: UserId, target: UserId) -> ServerResult<()> {
        if actor == target {
            return Err(ServerError::InvalidOperation("Cannot block yourself".into()));
        }
        {
            let mut db = self.db.lock().await;
            if !db.user_exists(target)? {
                return Err(ServerError::NotFound("User not found".into()));
            }
            db.block_user(actor, target, now())?;
        }

        info!(actor = %actor, target = %target, "User blocked");
        self.dispatcher
            .emit_to_user(target, ServerEvent::UserBlocked { user_id: actor })
            .await;
        Ok(())
    }

    /// Lift a block. Friendship is not restored.
    pub async fn unblock(&self, actor: UserId, target: UserId) -> ServerResult<()> {
        let removed = self.db.lock().await.unblock_user(actor, target)?;
        if removed {
            info!(actor = %actor, target = %target, "User unblocked");
        }
        Ok(())
    }
}
