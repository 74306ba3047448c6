//! In-memory entity store
//!
//! One table per entity type, each with its own id counter starting at 1.
//! All tables sit behind a single `RwLock`; every public operation takes the
//! lock exactly once, so each call is atomic with respect to every other
//! call. Ids are never reused, even after a delete.
//!
//! The store does not validate input shape (empty titles, inverted session
//! times and so on are the route layer's job). It does enforce uniqueness
//! (usernames, emails, group membership, friendships) and the first-admin
//! invariant, because those need the lock to be race-free.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::schemas::*;
use crate::types::{Result, StudyhallError};

/// Point awards for contributions
pub mod points {
    pub const PAPER_UPLOAD: i32 = 10;
    pub const DISCUSSION_POST: i32 = 5;
    pub const DISCUSSION_REPLY: i32 = 2;
    pub const ACCEPTED_REPLY: i32 = 15;
    pub const STUDY_GROUP: i32 = 5;
    pub const RESOURCE_SHARE: i32 = 5;
}

// =============================================================================
// Tables
// =============================================================================

/// A map of rows keyed by id plus the next id to hand out
#[derive(Debug)]
pub(super) struct Table<T> {
    rows: BTreeMap<u32, T>,
    next_id: u32,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            next_id: 1,
        }
    }
}

impl<T: Clone> Table<T> {
    /// Reserve the next id, build the row with it and store it
    pub(super) fn insert(&mut self, build: impl FnOnce(u32) -> T) -> T {
        let id = self.next_id;
        self.next_id += 1;
        let row = build(id);
        self.rows.insert(id, row.clone());
        row
    }

    pub(super) fn get(&self, id: u32) -> Option<&T> {
        self.rows.get(&id)
    }

    pub(super) fn get_mut(&mut self, id: u32) -> Option<&mut T> {
        self.rows.get_mut(&id)
    }

    pub(super) fn remove(&mut self, id: u32) -> Option<T> {
        self.rows.remove(&id)
    }

    pub(super) fn contains(&self, id: u32) -> bool {
        self.rows.contains_key(&id)
    }

    /// Rows in ascending id order
    pub(super) fn iter(&self) -> impl DoubleEndedIterator<Item = &T> {
        self.rows.values()
    }

    pub(super) fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.rows.values_mut()
    }

    pub(super) fn retain(&mut self, mut keep: impl FnMut(&T) -> bool) -> usize {
        let before = self.rows.len();
        self.rows.retain(|_, row| keep(row));
        before - self.rows.len()
    }

    pub(super) fn len(&self) -> usize {
        self.rows.len()
    }
}

/// Every entity table. Only code inside `db` can reach these.
#[derive(Debug, Default)]
pub(super) struct Tables {
    pub(super) users: Table<User>,
    pub(super) papers: Table<Paper>,
    pub(super) resources: Table<Resource>,
    pub(super) posts: Table<DiscussionPost>,
    pub(super) replies: Table<DiscussionReply>,
    pub(super) comments: Table<DiscussionComment>,
    pub(super) groups: Table<StudyGroup>,
    pub(super) members: Table<StudyGroupMember>,
    pub(super) sessions: Table<StudySession>,
    pub(super) chat: Table<GroupChatMessage>,
    pub(super) activities: Table<Activity>,
    pub(super) friend_requests: Table<FriendRequest>,
    pub(super) friendships: Table<Friendship>,
    pub(super) admin_actions: Table<AdminAction>,
    pub(super) messages: Table<DirectMessage>,
    /// First user ever created with the admin role; set once
    pub(super) first_admin_id: Option<u32>,
}

impl Tables {
    /// Display name and avatar for an author id, with fallbacks for
    /// users that no longer exist
    pub(super) fn author(&self, user_id: u32) -> (String, String) {
        match self.users.get(user_id) {
            Some(user) => (user.name().to_string(), user.avatar_or_default().to_string()),
            None => (UNKNOWN_AUTHOR.to_string(), DEFAULT_AVATAR.to_string()),
        }
    }

    fn user_mut(&mut self, id: u32) -> Result<&mut User> {
        self.users
            .get_mut(id)
            .ok_or(StudyhallError::not_found("user", id))
    }

    fn require_user(&self, id: u32) -> Result<&User> {
        self.users.get(id).ok_or(StudyhallError::not_found("user", id))
    }

    fn username_taken(&self, username: &str, except: Option<u32>) -> bool {
        self.users
            .iter()
            .any(|u| Some(u.id) != except && u.username.eq_ignore_ascii_case(username))
    }

    fn email_taken(&self, email: &str, except: Option<u32>) -> bool {
        self.users
            .iter()
            .any(|u| Some(u.id) != except && u.email.eq_ignore_ascii_case(email))
    }

    pub(super) fn is_member(&self, group_id: u32, user_id: u32) -> bool {
        self.members
            .iter()
            .any(|m| m.group_id == group_id && m.user_id == user_id)
    }

    pub(super) fn friendship_between(&self, a: u32, b: u32) -> Option<&Friendship> {
        self.friendships.iter().find(|f| f.connects(a, b))
    }

    fn insert_group(&mut self, input: NewStudyGroup) -> StudyGroup {
        self.groups.insert(|id| StudyGroup {
            id,
            name: input.name,
            description: input.description,
            course: input.course,
            color: input.color,
            creator_id: input.creator_id,
            is_private: input.is_private,
            created_at: Utc::now(),
        })
    }

    fn enrol(&mut self, group_id: u32, user_id: u32, is_admin: bool) -> Result<StudyGroupMember> {
        if !self.groups.contains(group_id) {
            return Err(StudyhallError::not_found("study group", group_id));
        }
        self.require_user(user_id)?;
        if self.is_member(group_id, user_id) {
            return Err(StudyhallError::Conflict(format!(
                "User {} is already a member of group {}",
                user_id, group_id
            )));
        }
        Ok(self.members.insert(|id| StudyGroupMember {
            id,
            group_id,
            user_id,
            is_admin,
            joined_at: Utc::now(),
        }))
    }

    fn add_points(&mut self, user_id: u32, delta: i32) -> Result<u32> {
        let user = self.user_mut(user_id)?;
        user.points = user.points.saturating_add_signed(delta);
        Ok(user.points)
    }
}

/// Row counts, served by the health and admin stats endpoints
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub users: usize,
    pub banned_users: usize,
    pub admins: usize,
    pub papers: usize,
    pub resources: usize,
    pub discussions: usize,
    pub replies: usize,
    pub study_groups: usize,
    pub study_sessions: usize,
    pub friendships: usize,
    pub messages: usize,
}

// =============================================================================
// MemStorage
// =============================================================================

/// The process-wide store. Construct once at startup and share via `Arc`.
#[derive(Debug, Default)]
pub struct MemStorage {
    pub(super) tables: RwLock<Tables>,
}

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn stats(&self) -> StoreStats {
        let t = self.tables.read().await;
        StoreStats {
            users: t.users.len(),
            banned_users: t.users.iter().filter(|u| u.is_banned).count(),
            admins: t.users.iter().filter(|u| u.is_admin()).count(),
            papers: t.papers.len(),
            resources: t.resources.len(),
            discussions: t.posts.len(),
            replies: t.replies.len(),
            study_groups: t.groups.len(),
            study_sessions: t.sessions.len(),
            friendships: t.friendships.len(),
            messages: t.messages.len(),
        }
    }

    // -------------------------------------------------------------------------
    // Users
    // -------------------------------------------------------------------------

    /// Create a user. The first user ever created with the admin role
    /// becomes the first admin.
    pub async fn create_user(&self, input: NewUser) -> Result<User> {
        let mut t = self.tables.write().await;
        if t.username_taken(&input.username, None) {
            return Err(StudyhallError::Conflict(format!(
                "Username '{}' is already taken",
                input.username
            )));
        }
        if t.email_taken(&input.email, None) {
            return Err(StudyhallError::Conflict(format!(
                "Email '{}' is already registered",
                input.email
            )));
        }

        let now = Utc::now();
        let user = t.users.insert(|id| User {
            id,
            username: input.username,
            email: input.email,
            password_hash: input.password_hash,
            display_name: input.display_name,
            bio: input.bio,
            institution: input.institution,
            department: input.department,
            year_of_study: input.year_of_study,
            avatar: input.avatar,
            role: input.role,
            is_banned: false,
            points: 0,
            created_at: now,
            updated_at: now,
            last_active_at: None,
        });

        if user.is_admin() && t.first_admin_id.is_none() {
            t.first_admin_id = Some(user.id);
            info!(user_id = user.id, username = %user.username, "First admin established");
        }
        debug!(user_id = user.id, "User created");
        Ok(user)
    }

    pub async fn get_user(&self, id: u32) -> Option<User> {
        self.tables.read().await.users.get(id).cloned()
    }

    pub async fn get_user_by_username(&self, username: &str) -> Option<User> {
        let t = self.tables.read().await;
        let found = t
            .users
            .iter()
            .find(|u| u.username.eq_ignore_ascii_case(username))
            .cloned();
        found
    }

    pub async fn get_user_by_email(&self, email: &str) -> Option<User> {
        let t = self.tables.read().await;
        let found = t
            .users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned();
        found
    }

    /// All users in id order
    pub async fn get_users(&self) -> Vec<User> {
        self.tables.read().await.users.iter().cloned().collect()
    }

    pub async fn update_user(&self, id: u32, update: UpdateUser) -> Result<User> {
        let mut t = self.tables.write().await;
        if !t.users.contains(id) {
            return Err(StudyhallError::not_found("user", id));
        }
        if let Some(email) = &update.email {
            if t.email_taken(email, Some(id)) {
                return Err(StudyhallError::Conflict(format!(
                    "Email '{}' is already registered",
                    email
                )));
            }
        }

        let user = t.user_mut(id)?;
        if let Some(v) = update.display_name {
            user.display_name = v;
        }
        if let Some(v) = update.email {
            user.email = v;
        }
        if let Some(v) = update.bio {
            user.bio = Some(v);
        }
        if let Some(v) = update.institution {
            user.institution = Some(v);
        }
        if let Some(v) = update.department {
            user.department = Some(v);
        }
        if let Some(v) = update.year_of_study {
            user.year_of_study = Some(v);
        }
        if let Some(v) = update.avatar {
            user.avatar = Some(v);
        }
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    /// Stamp `last_active_at` (on login)
    pub async fn touch_user(&self, id: u32) -> Result<User> {
        let mut t = self.tables.write().await;
        let user = t.user_mut(id)?;
        user.last_active_at = Some(Utc::now());
        Ok(user.clone())
    }

    pub async fn first_admin_id(&self) -> Option<u32> {
        self.tables.read().await.first_admin_id
    }

    pub async fn award_points(&self, user_id: u32, delta: i32) -> Result<u32> {
        self.tables.write().await.add_points(user_id, delta)
    }

    /// Top users by points; banned users are left out. Ties go to the
    /// older account.
    pub async fn get_leaderboard(&self, limit: usize) -> Vec<User> {
        let t = self.tables.read().await;
        let mut users: Vec<User> = t.users.iter().filter(|u| !u.is_banned).cloned().collect();
        users.sort_by(|a, b| b.points.cmp(&a.points).then(a.id.cmp(&b.id)));
        users.truncate(limit);
        users
    }

    // -------------------------------------------------------------------------
    // Admin privilege state machine
    // -------------------------------------------------------------------------

    /// Promote `target` to admin. Only the first admin may do this.
    pub async fn grant_admin(&self, caller_id: u32, target_id: u32) -> Result<User> {
        let mut t = self.tables.write().await;
        if t.first_admin_id != Some(caller_id) {
            return Err(StudyhallError::Forbidden(
                "Only the first admin can grant admin rights".to_string(),
            ));
        }
        let user = t.user_mut(target_id)?;
        user.role = Role::Admin;
        user.updated_at = Utc::now();
        info!(caller_id, target_id, "Admin granted");
        Ok(user.clone())
    }

    /// Demote `target` to a regular user. Only the first admin may do this,
    /// and the first admin can never be demoted.
    pub async fn revoke_admin(&self, caller_id: u32, target_id: u32) -> Result<User> {
        let mut t = self.tables.write().await;
        if t.first_admin_id != Some(caller_id) {
            return Err(StudyhallError::Forbidden(
                "Only the first admin can revoke admin rights".to_string(),
            ));
        }
        if t.first_admin_id == Some(target_id) {
            return Err(StudyhallError::Conflict(
                "The first admin's role cannot be revoked".to_string(),
            ));
        }
        let user = t.user_mut(target_id)?;
        user.role = Role::Regular;
        user.updated_at = Utc::now();
        info!(caller_id, target_id, "Admin revoked");
        Ok(user.clone())
    }

    pub async fn ban_user(&self, caller_id: u32, target_id: u32) -> Result<User> {
        self.set_banned(caller_id, target_id, true).await
    }

    pub async fn unban_user(&self, caller_id: u32, target_id: u32) -> Result<User> {
        self.set_banned(caller_id, target_id, false).await
    }

    async fn set_banned(&self, caller_id: u32, target_id: u32, banned: bool) -> Result<User> {
        let mut t = self.tables.write().await;
        let caller_is_admin = t.users.get(caller_id).is_some_and(User::is_admin);
        if !caller_is_admin {
            return Err(StudyhallError::Forbidden(
                "Only admins can change ban status".to_string(),
            ));
        }
        let user = t.user_mut(target_id)?;
        user.is_banned = banned;
        user.updated_at = Utc::now();
        info!(caller_id, target_id, banned, "Ban status changed");
        Ok(user.clone())
    }

    // -------------------------------------------------------------------------
    // Papers and resources
    // -------------------------------------------------------------------------

    pub async fn create_paper(&self, input: NewPaper) -> Paper {
        let mut t = self.tables.write().await;
        let paper = t.papers.insert(|id| Paper {
            id,
            title: input.title,
            description: input.description,
            course: input.course,
            year: input.year,
            institution: input.institution,
            file_url: input.file_url,
            file_name: input.file_name,
            file_size: input.file_size,
            resource_type: input.resource_type,
            uploader_id: input.uploader_id,
            downloads: 0,
            uploaded_at: Utc::now(),
        });
        debug!(paper_id = paper.id, course = %paper.course, "Paper created");
        paper
    }

    pub async fn get_paper(&self, id: u32) -> Option<Paper> {
        self.tables.read().await.papers.get(id).cloned()
    }

    pub async fn increment_paper_downloads(&self, id: u32) -> Result<Paper> {
        let mut t = self.tables.write().await;
        let paper = t
            .papers
            .get_mut(id)
            .ok_or(StudyhallError::not_found("paper", id))?;
        paper.downloads = paper.downloads.saturating_add(1);
        Ok(paper.clone())
    }

    pub async fn delete_paper(&self, id: u32) -> Result<Paper> {
        let mut t = self.tables.write().await;
        t.papers
            .remove(id)
            .ok_or(StudyhallError::not_found("paper", id))
    }

    pub async fn create_resource(&self, input: NewResource) -> Resource {
        let mut t = self.tables.write().await;
        t.resources.insert(|id| Resource {
            id,
            title: input.title,
            description: input.description,
            course: input.course,
            resource_type: input.resource_type,
            url: input.url,
            uploader_id: input.uploader_id,
            downloads: 0,
            created_at: Utc::now(),
        })
    }

    pub async fn get_resource(&self, id: u32) -> Option<Resource> {
        self.tables.read().await.resources.get(id).cloned()
    }

    pub async fn increment_resource_downloads(&self, id: u32) -> Result<Resource> {
        let mut t = self.tables.write().await;
        let resource = t
            .resources
            .get_mut(id)
            .ok_or(StudyhallError::not_found("resource", id))?;
        resource.downloads = resource.downloads.saturating_add(1);
        Ok(resource.clone())
    }

    pub async fn delete_resource(&self, id: u32) -> Result<Resource> {
        let mut t = self.tables.write().await;
        t.resources
            .remove(id)
            .ok_or(StudyhallError::not_found("resource", id))
    }

    // -------------------------------------------------------------------------
    // Discussions
    // -------------------------------------------------------------------------

    pub async fn create_discussion_post(&self, input: NewDiscussionPost) -> DiscussionPost {
        let mut t = self.tables.write().await;
        let now = Utc::now();
        t.posts.insert(|id| DiscussionPost {
            id,
            title: input.title,
            content: input.content,
            tags: input.tags,
            course: input.course,
            author_id: input.author_id,
            votes: 0,
            views: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// The bare post row; see `get_discussion_post` for the resolved view
    pub async fn get_post(&self, id: u32) -> Option<DiscussionPost> {
        self.tables.read().await.posts.get(id).cloned()
    }

    pub async fn record_post_view(&self, id: u32) -> Result<u32> {
        let mut t = self.tables.write().await;
        let post = t
            .posts
            .get_mut(id)
            .ok_or(StudyhallError::not_found("discussion post", id))?;
        post.views = post.views.saturating_add(1);
        Ok(post.views)
    }

    pub async fn vote_discussion_post(&self, id: u32, delta: i32) -> Result<DiscussionPost> {
        let mut t = self.tables.write().await;
        let post = t
            .posts
            .get_mut(id)
            .ok_or(StudyhallError::not_found("discussion post", id))?;
        post.votes = post.votes.saturating_add(delta);
        Ok(post.clone())
    }

    /// Delete a post along with its replies and their comments
    pub async fn delete_discussion_post(&self, id: u32) -> Result<DiscussionPost> {
        let mut t = self.tables.write().await;
        let post = t
            .posts
            .remove(id)
            .ok_or(StudyhallError::not_found("discussion post", id))?;
        let reply_ids: Vec<u32> = t
            .replies
            .iter()
            .filter(|r| r.post_id == id)
            .map(|r| r.id)
            .collect();
        t.replies.retain(|r| r.post_id != id);
        let comments = t.comments.retain(|c| !reply_ids.contains(&c.reply_id));
        debug!(
            post_id = id,
            replies = reply_ids.len(),
            comments,
            "Discussion post deleted"
        );
        Ok(post)
    }

    pub async fn create_discussion_reply(&self, input: NewDiscussionReply) -> Result<DiscussionReply> {
        let mut t = self.tables.write().await;
        if !t.posts.contains(input.post_id) {
            return Err(StudyhallError::not_found("discussion post", input.post_id));
        }
        let now = Utc::now();
        Ok(t.replies.insert(|id| DiscussionReply {
            id,
            post_id: input.post_id,
            author_id: input.author_id,
            content: input.content,
            votes: 0,
            is_accepted: false,
            created_at: now,
            updated_at: now,
        }))
    }

    pub async fn get_reply(&self, id: u32) -> Option<DiscussionReply> {
        self.tables.read().await.replies.get(id).cloned()
    }

    pub async fn vote_reply(&self, id: u32, delta: i32) -> Result<DiscussionReply> {
        let mut t = self.tables.write().await;
        let reply = t
            .replies
            .get_mut(id)
            .ok_or(StudyhallError::not_found("reply", id))?;
        reply.votes = reply.votes.saturating_add(delta);
        Ok(reply.clone())
    }

    /// Mark a reply as the accepted answer, clearing any other accepted
    /// reply on the same post. The reply author earns points the first
    /// time the reply is accepted.
    pub async fn accept_reply(&self, reply_id: u32) -> Result<DiscussionReply> {
        let mut t = self.tables.write().await;
        let (post_id, author_id, already) = match t.replies.get(reply_id) {
            Some(r) => (r.post_id, r.author_id, r.is_accepted),
            None => return Err(StudyhallError::not_found("reply", reply_id)),
        };

        let now = Utc::now();
        for reply in t.replies.iter_mut().filter(|r| r.post_id == post_id) {
            let accept = reply.id == reply_id;
            if reply.is_accepted != accept {
                reply.is_accepted = accept;
                reply.updated_at = now;
            }
        }

        if !already && t.users.contains(author_id) {
            t.add_points(author_id, points::ACCEPTED_REPLY)?;
        }

        t.replies
            .get(reply_id)
            .cloned()
            .ok_or(StudyhallError::not_found("reply", reply_id))
    }

    pub async fn create_discussion_comment(
        &self,
        input: NewDiscussionComment,
    ) -> Result<DiscussionComment> {
        let mut t = self.tables.write().await;
        if !t.replies.contains(input.reply_id) {
            return Err(StudyhallError::not_found("reply", input.reply_id));
        }
        Ok(t.comments.insert(|id| DiscussionComment {
            id,
            reply_id: input.reply_id,
            author_id: input.author_id,
            content: input.content,
            created_at: Utc::now(),
        }))
    }

    // -------------------------------------------------------------------------
    // Study groups
    // -------------------------------------------------------------------------

    pub async fn create_study_group(&self, input: NewStudyGroup) -> StudyGroup {
        self.tables.write().await.insert_group(input)
    }

    /// Create a group and enrol its creator as a group admin.
    ///
    /// Both steps run under one write lock. If enrolling the creator fails
    /// the group row is removed again before the lock is released, so no
    /// caller ever observes a group without its creator. The consumed group
    /// id is not reused.
    pub async fn create_study_group_with_creator(
        &self,
        input: NewStudyGroup,
    ) -> Result<(StudyGroup, StudyGroupMember)> {
        let mut t = self.tables.write().await;
        let creator_id = input.creator_id;
        let group = t.insert_group(input);

        match t.enrol(group.id, creator_id, true) {
            Ok(member) => Ok((group, member)),
            Err(e) => {
                t.groups.remove(group.id);
                t.members.retain(|m| m.group_id != group.id);
                debug!(group_id = group.id, error = %e, "Rolled back study group creation");
                Err(e)
            }
        }
    }

    pub async fn get_study_group(&self, id: u32) -> Option<StudyGroup> {
        self.tables.read().await.groups.get(id).cloned()
    }

    /// Delete a group with its members, sessions and chat
    pub async fn delete_study_group(&self, id: u32) -> Result<StudyGroup> {
        let mut t = self.tables.write().await;
        let group = t
            .groups
            .remove(id)
            .ok_or(StudyhallError::not_found("study group", id))?;
        t.members.retain(|m| m.group_id != id);
        t.sessions.retain(|s| s.group_id != id);
        t.chat.retain(|c| c.group_id != id);
        Ok(group)
    }

    pub async fn add_group_member(
        &self,
        group_id: u32,
        user_id: u32,
        is_admin: bool,
    ) -> Result<StudyGroupMember> {
        self.tables.write().await.enrol(group_id, user_id, is_admin)
    }

    pub async fn remove_group_member(&self, group_id: u32, user_id: u32) -> Result<()> {
        let mut t = self.tables.write().await;
        let removed = t
            .members
            .retain(|m| !(m.group_id == group_id && m.user_id == user_id));
        if removed == 0 {
            return Err(StudyhallError::not_found("group member", user_id));
        }
        Ok(())
    }

    pub async fn is_group_member(&self, group_id: u32, user_id: u32) -> bool {
        self.tables.read().await.is_member(group_id, user_id)
    }

    pub async fn create_study_session(&self, input: NewStudySession) -> Result<StudySession> {
        let mut t = self.tables.write().await;
        if !t.groups.contains(input.group_id) {
            return Err(StudyhallError::not_found("study group", input.group_id));
        }
        Ok(t.sessions.insert(|id| StudySession {
            id,
            group_id: input.group_id,
            title: input.title,
            description: input.description,
            start_time: input.start_time,
            end_time: input.end_time,
            location: input.location,
            meeting_link: input.meeting_link,
            created_by: input.created_by,
            created_at: Utc::now(),
        }))
    }

    /// All sessions of a group, earliest start first
    pub async fn get_study_sessions(&self, group_id: u32) -> Vec<StudySession> {
        let t = self.tables.read().await;
        let mut sessions: Vec<StudySession> = t
            .sessions
            .iter()
            .filter(|s| s.group_id == group_id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| a.start_time.cmp(&b.start_time).then(a.id.cmp(&b.id)));
        sessions
    }

    pub async fn create_group_chat_message(
        &self,
        input: NewGroupChatMessage,
    ) -> Result<GroupChatMessage> {
        let mut t = self.tables.write().await;
        if !t.groups.contains(input.group_id) {
            return Err(StudyhallError::not_found("study group", input.group_id));
        }
        Ok(t.chat.insert(|id| GroupChatMessage {
            id,
            group_id: input.group_id,
            user_id: input.user_id,
            content: input.content,
            created_at: Utc::now(),
        }))
    }

    // -------------------------------------------------------------------------
    // Activity feed and audit log
    // -------------------------------------------------------------------------

    pub async fn create_activity(&self, input: NewActivity) -> Activity {
        let mut t = self.tables.write().await;
        t.activities.insert(|id| Activity {
            id,
            user_id: input.user_id,
            activity_type: input.activity_type,
            target_id: input.target_id,
            target_type: input.target_type,
            metadata: input.metadata,
            created_at: Utc::now(),
        })
    }

    /// Most recent activity across all users, newest first
    pub async fn get_recent_activities(&self, limit: usize) -> Vec<Activity> {
        let t = self.tables.read().await;
        t.activities.iter().rev().take(limit).cloned().collect()
    }

    pub async fn get_user_activities(&self, user_id: u32, limit: usize) -> Vec<Activity> {
        let t = self.tables.read().await;
        t.activities
            .iter()
            .rev()
            .filter(|a| a.user_id == user_id)
            .take(limit)
            .cloned()
            .collect()
    }

    pub async fn create_admin_action(&self, input: NewAdminAction) -> AdminAction {
        let mut t = self.tables.write().await;
        t.admin_actions.insert(|id| AdminAction {
            id,
            admin_id: input.admin_id,
            action: input.action,
            target_type: input.target_type,
            target_id: input.target_id,
            reason: input.reason,
            created_at: Utc::now(),
        })
    }

    pub async fn get_admin_actions(&self, limit: usize) -> Vec<AdminAction> {
        let t = self.tables.read().await;
        t.admin_actions.iter().rev().take(limit).cloned().collect()
    }

    // -------------------------------------------------------------------------
    // Friends
    // -------------------------------------------------------------------------

    pub async fn send_friend_request(&self, sender_id: u32, receiver_id: u32) -> Result<FriendRequest> {
        if sender_id == receiver_id {
            return Err(StudyhallError::BadRequest(
                "Cannot send a friend request to yourself".to_string(),
            ));
        }
        let mut t = self.tables.write().await;
        t.require_user(receiver_id)?;
        if t.friendship_between(sender_id, receiver_id).is_some() {
            return Err(StudyhallError::Conflict("Already friends".to_string()));
        }
        let pending = t.friend_requests.iter().any(|r| {
            r.status == FriendRequestStatus::Pending
                && ((r.sender_id == sender_id && r.receiver_id == receiver_id)
                    || (r.sender_id == receiver_id && r.receiver_id == sender_id))
        });
        if pending {
            return Err(StudyhallError::Conflict(
                "A friend request between these users is already pending".to_string(),
            ));
        }
        let now = Utc::now();
        Ok(t.friend_requests.insert(|id| FriendRequest {
            id,
            sender_id,
            receiver_id,
            status: FriendRequestStatus::Pending,
            created_at: now,
            updated_at: now,
        }))
    }

    pub async fn get_friend_request(&self, id: u32) -> Option<FriendRequest> {
        self.tables.read().await.friend_requests.get(id).cloned()
    }

    /// Accept or reject a pending request. Only its receiver may respond.
    /// Accepting creates the friendship unless one already exists.
    pub async fn respond_friend_request(
        &self,
        request_id: u32,
        responder_id: u32,
        accept: bool,
    ) -> Result<FriendRequest> {
        let mut t = self.tables.write().await;
        let request = t
            .friend_requests
            .get_mut(request_id)
            .ok_or(StudyhallError::not_found("friend request", request_id))?;
        if request.receiver_id != responder_id {
            return Err(StudyhallError::Forbidden(
                "Only the recipient can respond to a friend request".to_string(),
            ));
        }
        if request.status != FriendRequestStatus::Pending {
            return Err(StudyhallError::Conflict(
                "Friend request has already been answered".to_string(),
            ));
        }

        request.status = if accept {
            FriendRequestStatus::Accepted
        } else {
            FriendRequestStatus::Rejected
        };
        request.updated_at = Utc::now();
        let request = request.clone();

        if accept && t.friendship_between(request.sender_id, request.receiver_id).is_none() {
            t.friendships.insert(|id| Friendship {
                id,
                user1_id: request.sender_id,
                user2_id: request.receiver_id,
                created_at: Utc::now(),
            });
        }
        Ok(request)
    }

    /// Directly record a friendship (seeding and tests). Fails with
    /// `Conflict` if the pair are already friends.
    pub async fn create_friendship(&self, a: u32, b: u32) -> Result<Friendship> {
        if a == b {
            return Err(StudyhallError::BadRequest(
                "A user cannot befriend themselves".to_string(),
            ));
        }
        let mut t = self.tables.write().await;
        if t.friendship_between(a, b).is_some() {
            return Err(StudyhallError::Conflict("Already friends".to_string()));
        }
        Ok(t.friendships.insert(|id| Friendship {
            id,
            user1_id: a,
            user2_id: b,
            created_at: Utc::now(),
        }))
    }

    pub async fn are_friends(&self, a: u32, b: u32) -> bool {
        self.tables.read().await.friendship_between(a, b).is_some()
    }

    pub async fn remove_friendship(&self, user_id: u32, friend_id: u32) -> Result<()> {
        let mut t = self.tables.write().await;
        let removed = t.friendships.retain(|f| !f.connects(user_id, friend_id));
        if removed == 0 {
            return Err(StudyhallError::not_found("friendship", friend_id));
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Direct messages
    // -------------------------------------------------------------------------

    pub async fn send_direct_message(&self, input: NewDirectMessage) -> Result<DirectMessage> {
        let mut t = self.tables.write().await;
        t.require_user(input.receiver_id)?;
        Ok(t.messages.insert(|id| DirectMessage {
            id,
            sender_id: input.sender_id,
            receiver_id: input.receiver_id,
            content: input.content,
            is_read: false,
            created_at: Utc::now(),
        }))
    }

    /// Mark everything `other` sent to `reader` as read
    pub async fn mark_conversation_read(&self, reader_id: u32, other_id: u32) -> usize {
        let mut t = self.tables.write().await;
        let mut marked = 0;
        for msg in t
            .messages
            .iter_mut()
            .filter(|m| m.sender_id == other_id && m.receiver_id == reader_id && !m.is_read)
        {
            msg.is_read = true;
            marked += 1;
        }
        marked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Arc;

    fn new_user(name: &str, role: Role) -> NewUser {
        NewUser {
            username: name.to_lowercase(),
            email: format!("{}@example.edu", name.to_lowercase()),
            password_hash: "hash".to_string(),
            display_name: name.to_string(),
            role,
            ..Default::default()
        }
    }

    fn new_group(name: &str, creator_id: u32) -> NewStudyGroup {
        NewStudyGroup {
            name: name.to_string(),
            color: "#000000".to_string(),
            creator_id,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_user_stamps_defaults() {
        let store = MemStorage::new();
        let user = store.create_user(new_user("Alice", Role::Regular)).await.unwrap();

        assert_eq!(user.id, 1);
        assert_eq!(user.points, 0);
        assert!(!user.is_banned);
        assert!(user.last_active_at.is_none());
        assert_eq!(user.created_at, user.updated_at);
        assert_eq!(store.get_user(1).await, Some(user));
    }

    #[tokio::test]
    async fn test_ids_are_per_table() {
        let store = MemStorage::new();
        store.create_user(new_user("Alice", Role::Regular)).await.unwrap();
        let bob = store.create_user(new_user("Bob", Role::Regular)).await.unwrap();
        let paper = store
            .create_paper(NewPaper {
                title: "Algorithms Final".into(),
                course: "CS201".into(),
                file_url: "/uploads/a.pdf".into(),
                uploader_id: bob.id,
                ..Default::default()
            })
            .await;

        assert_eq!(bob.id, 2);
        assert_eq!(paper.id, 1);
        assert_eq!(paper.downloads, 0);
    }

    #[tokio::test]
    async fn test_duplicate_username_and_email_conflict() {
        let store = MemStorage::new();
        store.create_user(new_user("Alice", Role::Regular)).await.unwrap();

        let mut same_name = new_user("ALICE", Role::Regular);
        same_name.email = "other@example.edu".into();
        let err = store.create_user(same_name).await.unwrap_err();
        assert!(matches!(err, StudyhallError::Conflict(_)));

        let mut same_email = new_user("Alicia", Role::Regular);
        same_email.email = "alice@example.edu".into();
        let err = store.create_user(same_email).await.unwrap_err();
        assert!(matches!(err, StudyhallError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_update_user_merges_fields() {
        let store = MemStorage::new();
        let alice = store.create_user(new_user("Alice", Role::Regular)).await.unwrap();

        let updated = store
            .update_user(
                alice.id,
                UpdateUser {
                    bio: Some("Maths nerd".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.bio.as_deref(), Some("Maths nerd"));
        assert_eq!(updated.display_name, "Alice");

        let err = store.update_user(99, UpdateUser::default()).await.unwrap_err();
        assert!(matches!(err, StudyhallError::NotFound { kind: "user", id: 99 }));
    }

    #[tokio::test]
    async fn test_first_admin_cannot_be_revoked() {
        let store = MemStorage::new();
        let root = store.create_user(new_user("Root", Role::Admin)).await.unwrap();
        assert_eq!(store.first_admin_id().await, Some(root.id));

        let err = store.revoke_admin(root.id, root.id).await.unwrap_err();
        assert!(matches!(err, StudyhallError::Conflict(_)));
        assert!(store.get_user(root.id).await.unwrap().is_admin());
    }

    #[tokio::test]
    async fn test_only_first_admin_manages_admins() {
        let store = MemStorage::new();
        let root = store.create_user(new_user("Root", Role::Admin)).await.unwrap();
        let second = store.create_user(new_user("Second", Role::Admin)).await.unwrap();
        let carol = store.create_user(new_user("Carol", Role::Regular)).await.unwrap();

        // A later admin is still not the first admin
        assert_eq!(store.first_admin_id().await, Some(root.id));
        let err = store.grant_admin(second.id, carol.id).await.unwrap_err();
        assert!(matches!(err, StudyhallError::Forbidden(_)));
        let err = store.grant_admin(carol.id, carol.id).await.unwrap_err();
        assert!(matches!(err, StudyhallError::Forbidden(_)));

        let granted = store.grant_admin(root.id, carol.id).await.unwrap();
        assert_eq!(granted.role, Role::Admin);

        let err = store.revoke_admin(carol.id, second.id).await.unwrap_err();
        assert!(matches!(err, StudyhallError::Forbidden(_)));
        let revoked = store.revoke_admin(root.id, second.id).await.unwrap();
        assert_eq!(revoked.role, Role::Regular);
    }

    #[tokio::test]
    async fn test_ban_is_gated_on_admin_not_first_admin() {
        let store = MemStorage::new();
        let root = store.create_user(new_user("Root", Role::Admin)).await.unwrap();
        let second = store.create_user(new_user("Second", Role::Admin)).await.unwrap();
        let dave = store.create_user(new_user("Dave", Role::Regular)).await.unwrap();

        let banned = store.ban_user(second.id, dave.id).await.unwrap();
        assert!(banned.is_banned);

        // Banning an admin leaves the role untouched
        let banned_admin = store.ban_user(second.id, root.id).await.unwrap();
        assert!(banned_admin.is_banned);
        assert!(banned_admin.is_admin());

        let err = store.unban_user(dave.id, root.id).await.unwrap_err();
        assert!(matches!(err, StudyhallError::Forbidden(_)));

        let unbanned = store.unban_user(second.id, dave.id).await.unwrap();
        assert!(!unbanned.is_banned);
    }

    #[tokio::test]
    async fn test_accept_reply_is_exclusive_and_awards_once() {
        let store = MemStorage::new();
        let alice = store.create_user(new_user("Alice", Role::Regular)).await.unwrap();
        let bob = store.create_user(new_user("Bob", Role::Regular)).await.unwrap();
        let post = store
            .create_discussion_post(NewDiscussionPost {
                title: "Q".into(),
                content: "?".into(),
                author_id: alice.id,
                ..Default::default()
            })
            .await;
        let reply = |content: &str| NewDiscussionReply {
            post_id: post.id,
            author_id: bob.id,
            content: content.to_string(),
        };
        let r1 = store.create_discussion_reply(reply("first")).await.unwrap();
        let r2 = store.create_discussion_reply(reply("second")).await.unwrap();

        store.accept_reply(r1.id).await.unwrap();
        store.accept_reply(r1.id).await.unwrap();
        assert_eq!(
            store.get_user(bob.id).await.unwrap().points,
            points::ACCEPTED_REPLY as u32
        );

        store.accept_reply(r2.id).await.unwrap();
        assert!(!store.get_reply(r1.id).await.unwrap().is_accepted);
        assert!(store.get_reply(r2.id).await.unwrap().is_accepted);
    }

    #[tokio::test]
    async fn test_reply_to_missing_post_is_not_found() {
        let store = MemStorage::new();
        let err = store
            .create_discussion_reply(NewDiscussionReply {
                post_id: 7,
                author_id: 1,
                content: "hello".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StudyhallError::NotFound { kind: "discussion post", id: 7 }));
    }

    #[tokio::test]
    async fn test_delete_post_cascades() {
        let store = MemStorage::new();
        let post = store
            .create_discussion_post(NewDiscussionPost {
                title: "Q".into(),
                content: "?".into(),
                author_id: 1,
                ..Default::default()
            })
            .await;
        let reply = store
            .create_discussion_reply(NewDiscussionReply {
                post_id: post.id,
                author_id: 1,
                content: "r".into(),
            })
            .await
            .unwrap();
        store
            .create_discussion_comment(NewDiscussionComment {
                reply_id: reply.id,
                author_id: 1,
                content: "c".into(),
            })
            .await
            .unwrap();

        store.delete_discussion_post(post.id).await.unwrap();
        let stats = store.stats().await;
        assert_eq!(stats.discussions, 0);
        assert_eq!(stats.replies, 0);
        assert!(store.get_reply(reply.id).await.is_none());
    }

    #[tokio::test]
    async fn test_group_creation_enrols_creator_as_admin() {
        let store = MemStorage::new();
        let alice = store.create_user(new_user("Alice", Role::Regular)).await.unwrap();

        let (group, member) = store
            .create_study_group_with_creator(new_group("Linear Algebra", alice.id))
            .await
            .unwrap();
        assert_eq!(member.group_id, group.id);
        assert!(member.is_admin);
        assert!(store.is_group_member(group.id, alice.id).await);

        let err = store.add_group_member(group.id, alice.id, false).await.unwrap_err();
        assert!(matches!(err, StudyhallError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_group_creation_is_compensated_when_creator_missing() {
        let store = MemStorage::new();

        let err = store
            .create_study_group_with_creator(new_group("Ghost Group", 42))
            .await
            .unwrap_err();
        assert!(matches!(err, StudyhallError::NotFound { kind: "user", id: 42 }));
        assert!(store.get_study_group(1).await.is_none());
        assert_eq!(store.stats().await.study_groups, 0);

        // The consumed id is not handed out again
        let alice = store.create_user(new_user("Alice", Role::Regular)).await.unwrap();
        let (group, _) = store
            .create_study_group_with_creator(new_group("Real Group", alice.id))
            .await
            .unwrap();
        assert_eq!(group.id, 2);
    }

    #[tokio::test]
    async fn test_group_creation_is_not_interleaved_with_joins() {
        let store = Arc::new(MemStorage::new());
        let alice_id = store.create_user(new_user("Alice", Role::Regular)).await.unwrap().id;

        // Queue both writers behind a reader so they contend for the lock
        let guard = store.tables.read().await;
        let create = tokio::spawn({
            let store = store.clone();
            async move {
                store
                    .create_study_group_with_creator(new_group("Ghost Group", 42))
                    .await
            }
        });
        tokio::task::yield_now().await;
        let join = tokio::spawn({
            let store = store.clone();
            async move { store.add_group_member(1, alice_id, false).await }
        });
        tokio::task::yield_now().await;
        drop(guard);

        let created = create.await.unwrap();
        let joined = join.await.unwrap();
        assert!(matches!(created, Err(StudyhallError::NotFound { kind: "user", id: 42 })));
        assert!(matches!(
            joined,
            Err(StudyhallError::NotFound { kind: "study group", id: 1 })
        ));
        assert!(store.get_study_group(1).await.is_none());
        assert!(!store.is_group_member(1, alice_id).await);
        assert_eq!(store.tables.read().await.members.len(), 0);
    }

    #[tokio::test]
    async fn test_create_then_get_stamps_defaults() {
        let store = MemStorage::new();
        let alice = store.create_user(new_user("Alice", Role::Regular)).await.unwrap();
        let bob = store.create_user(new_user("Bob", Role::Regular)).await.unwrap();

        let resource = store
            .create_resource(NewResource {
                title: "Lecture notes".into(),
                resource_type: "link".into(),
                url: "https://example.edu/notes".into(),
                uploader_id: alice.id,
                ..Default::default()
            })
            .await;
        assert_eq!((resource.id, resource.downloads), (1, 0));
        assert_eq!(store.get_resource(resource.id).await, Some(resource));

        let post = store
            .create_discussion_post(NewDiscussionPost {
                title: "Eigenvalues".into(),
                content: "Intuition?".into(),
                author_id: alice.id,
                ..Default::default()
            })
            .await;
        assert_eq!((post.votes, post.views), (0, 0));
        assert_eq!(post.created_at, post.updated_at);
        assert_eq!(store.get_post(post.id).await, Some(post.clone()));

        let reply = store
            .create_discussion_reply(NewDiscussionReply {
                post_id: post.id,
                author_id: bob.id,
                content: "Stretch factors".into(),
            })
            .await
            .unwrap();
        assert_eq!(reply.votes, 0);
        assert!(!reply.is_accepted);
        assert_eq!(store.get_reply(reply.id).await, Some(reply));

        let (group, member) = store
            .create_study_group_with_creator(new_group("Linear Algebra", alice.id))
            .await
            .unwrap();
        assert!(!group.is_private);
        assert_eq!(member.user_id, alice.id);
        assert_eq!(store.get_study_group(group.id).await, Some(group.clone()));

        let start = Utc::now() + Duration::days(1);
        let session = store
            .create_study_session(NewStudySession {
                group_id: group.id,
                title: "Exam prep".into(),
                description: None,
                start_time: start,
                end_time: start + Duration::hours(2),
                location: None,
                meeting_link: Some("https://meet.example.edu/la".into()),
                created_by: alice.id,
            })
            .await
            .unwrap();
        assert!(session.is_virtual());
        assert_eq!(store.get_study_sessions(group.id).await, vec![session]);

        let message = store
            .send_direct_message(NewDirectMessage {
                sender_id: alice.id,
                receiver_id: bob.id,
                content: "see you there".into(),
            })
            .await
            .unwrap();
        assert!(!message.is_read);
        assert_eq!(store.get_conversation(bob.id, alice.id, 10).await, vec![message]);
    }

    #[tokio::test]
    async fn test_download_and_view_counters() {
        let store = MemStorage::new();
        let paper = store
            .create_paper(NewPaper {
                title: "Algorithms Final".into(),
                course: "CS201".into(),
                file_url: "/uploads/a.pdf".into(),
                uploader_id: 1,
                ..Default::default()
            })
            .await;
        store.increment_paper_downloads(paper.id).await.unwrap();
        let paper = store.increment_paper_downloads(paper.id).await.unwrap();
        assert_eq!(paper.downloads, 2);
        assert_eq!(store.get_paper(paper.id).await.unwrap().downloads, 2);

        let err = store.increment_paper_downloads(99).await.unwrap_err();
        assert!(matches!(err, StudyhallError::NotFound { kind: "paper", id: 99 }));

        let post = store
            .create_discussion_post(NewDiscussionPost {
                title: "Q".into(),
                content: "?".into(),
                author_id: 1,
                ..Default::default()
            })
            .await;
        assert_eq!(store.record_post_view(post.id).await.unwrap(), 1);
        assert_eq!(store.record_post_view(post.id).await.unwrap(), 2);
        assert_eq!(store.get_post(post.id).await.unwrap().views, 2);
        assert!(store.record_post_view(post.id + 1).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_group_cascades() {
        let store = MemStorage::new();
        let alice = store.create_user(new_user("Alice", Role::Regular)).await.unwrap();
        let (group, _) = store
            .create_study_group_with_creator(new_group("Physics", alice.id))
            .await
            .unwrap();
        store
            .create_group_chat_message(NewGroupChatMessage {
                group_id: group.id,
                user_id: alice.id,
                content: "hi".into(),
            })
            .await
            .unwrap();

        store.delete_study_group(group.id).await.unwrap();
        assert!(!store.is_group_member(group.id, alice.id).await);
        assert!(store.get_group_chat_messages(group.id, 10).await.is_empty());
    }

    #[tokio::test]
    async fn test_friend_request_flow() {
        let store = MemStorage::new();
        let alice = store.create_user(new_user("Alice", Role::Regular)).await.unwrap();
        let bob = store.create_user(new_user("Bob", Role::Regular)).await.unwrap();

        let request = store.send_friend_request(alice.id, bob.id).await.unwrap();
        assert_eq!(request.status, FriendRequestStatus::Pending);

        let err = store.send_friend_request(bob.id, alice.id).await.unwrap_err();
        assert!(matches!(err, StudyhallError::Conflict(_)));

        let err = store
            .respond_friend_request(request.id, alice.id, true)
            .await
            .unwrap_err();
        assert!(matches!(err, StudyhallError::Forbidden(_)));

        let answered = store.respond_friend_request(request.id, bob.id, true).await.unwrap();
        assert_eq!(answered.status, FriendRequestStatus::Accepted);
        assert!(store.are_friends(bob.id, alice.id).await);

        let err = store
            .respond_friend_request(request.id, bob.id, false)
            .await
            .unwrap_err();
        assert!(matches!(err, StudyhallError::Conflict(_)));

        store.remove_friendship(bob.id, alice.id).await.unwrap();
        assert!(!store.are_friends(alice.id, bob.id).await);
    }

    #[tokio::test]
    async fn test_friendship_unique_per_pair() {
        let store = MemStorage::new();
        store.create_friendship(1, 2).await.unwrap();
        let err = store.create_friendship(2, 1).await.unwrap_err();
        assert!(matches!(err, StudyhallError::Conflict(_)));
        assert_eq!(store.stats().await.friendships, 1);
    }

    #[tokio::test]
    async fn test_leaderboard_skips_banned_users() {
        let store = MemStorage::new();
        let root = store.create_user(new_user("Root", Role::Admin)).await.unwrap();
        let alice = store.create_user(new_user("Alice", Role::Regular)).await.unwrap();
        let bob = store.create_user(new_user("Bob", Role::Regular)).await.unwrap();

        store.award_points(alice.id, 10).await.unwrap();
        store.award_points(bob.id, 20).await.unwrap();
        store.ban_user(root.id, bob.id).await.unwrap();

        let board = store.get_leaderboard(2).await;
        let ids: Vec<u32> = board.iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![alice.id, root.id]);
    }

    #[tokio::test]
    async fn test_points_never_underflow() {
        let store = MemStorage::new();
        let alice = store.create_user(new_user("Alice", Role::Regular)).await.unwrap();
        store.award_points(alice.id, 3).await.unwrap();
        assert_eq!(store.award_points(alice.id, -10).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_mark_conversation_read() {
        let store = MemStorage::new();
        let alice = store.create_user(new_user("Alice", Role::Regular)).await.unwrap();
        let bob = store.create_user(new_user("Bob", Role::Regular)).await.unwrap();
        for content in ["hey", "you there?"] {
            store
                .send_direct_message(NewDirectMessage {
                    sender_id: alice.id,
                    receiver_id: bob.id,
                    content: content.into(),
                })
                .await
                .unwrap();
        }

        assert_eq!(store.mark_conversation_read(alice.id, bob.id).await, 0);
        assert_eq!(store.mark_conversation_read(bob.id, alice.id).await, 2);
        assert_eq!(store.mark_conversation_read(bob.id, alice.id).await, 0);
    }
}
