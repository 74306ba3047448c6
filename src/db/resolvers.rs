//! Joined, denormalized views
//!
//! Nothing here fails. A reference to a user that no longer exists resolves
//! to the "Unknown" name and default avatar, except in friend lists where
//! the dangling friendship is dropped.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::query::DiscussionFilter;
use super::schemas::*;
use super::store::MemStorage;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    #[serde(flatten)]
    pub comment: DiscussionComment,
    pub author_name: String,
    pub author_avatar: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyView {
    #[serde(flatten)]
    pub reply: DiscussionReply,
    pub author_name: String,
    pub author_avatar: String,
    pub comments: Vec<CommentView>,
}

/// A post with its whole reply/comment tree
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscussionPostView {
    #[serde(flatten)]
    pub post: DiscussionPost,
    pub author_name: String,
    pub author_avatar: String,
    pub replies: Vec<ReplyView>,
}

/// List entry for the forum index
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscussionPostSummary {
    #[serde(flatten)]
    pub post: DiscussionPost,
    pub author_name: String,
    pub author_avatar: String,
    pub reply_count: usize,
    pub has_accepted_reply: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyGroupView {
    #[serde(flatten)]
    pub group: StudyGroup,
    pub creator_name: String,
    pub member_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMemberView {
    #[serde(flatten)]
    pub member: StudyGroupMember,
    pub name: String,
    pub avatar: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpcomingSession {
    #[serde(flatten)]
    pub session: StudySession,
    pub group_name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageView {
    #[serde(flatten)]
    pub message: GroupChatMessage,
    pub author_name: String,
    pub author_avatar: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendView {
    #[serde(flatten)]
    pub profile: UserProfile,
    pub friends_since: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequestView {
    #[serde(flatten)]
    pub request: FriendRequest,
    pub sender_name: String,
    pub sender_avatar: String,
}

/// One row of the inbox: the latest message per counterpart
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub partner_id: u32,
    pub partner_name: String,
    pub partner_avatar: String,
    pub last_message: DirectMessage,
    pub unread_count: usize,
}

/// Keep the last `limit` items of an already chronological list
fn tail<T>(mut items: Vec<T>, limit: usize) -> Vec<T> {
    let skip = items.len().saturating_sub(limit);
    items.drain(..skip);
    items
}

impl MemStorage {
    /// Post, replies (accepted first, then oldest first) and each reply's
    /// comments (oldest first), with author names resolved at every level
    pub async fn get_discussion_post(&self, id: u32) -> Option<DiscussionPostView> {
        let t = self.tables.read().await;
        let post = t.posts.get(id)?.clone();

        let mut replies: Vec<ReplyView> = t
            .replies
            .iter()
            .filter(|r| r.post_id == id)
            .map(|reply| {
                let comments = t
                    .comments
                    .iter()
                    .filter(|c| c.reply_id == reply.id)
                    .map(|comment| {
                        let (author_name, author_avatar) = t.author(comment.author_id);
                        CommentView {
                            comment: comment.clone(),
                            author_name,
                            author_avatar,
                        }
                    })
                    .collect();
                let (author_name, author_avatar) = t.author(reply.author_id);
                ReplyView {
                    reply: reply.clone(),
                    author_name,
                    author_avatar,
                    comments,
                }
            })
            .collect();
        // Stable sort keeps id (creation) order within each group
        replies.sort_by_key(|r| !r.reply.is_accepted);

        let (author_name, author_avatar) = t.author(post.author_id);
        Some(DiscussionPostView {
            post,
            author_name,
            author_avatar,
            replies,
        })
    }

    /// Filtered posts, newest first, with author and reply counts
    pub async fn get_discussion_post_summaries(
        &self,
        filter: &DiscussionFilter,
    ) -> Vec<DiscussionPostSummary> {
        let t = self.tables.read().await;
        let mut reply_stats: BTreeMap<u32, (usize, bool)> = BTreeMap::new();
        for reply in t.replies.iter() {
            let entry = reply_stats.entry(reply.post_id).or_default();
            entry.0 += 1;
            entry.1 |= reply.is_accepted;
        }

        let summaries = t
            .discussion_posts(filter)
            .into_iter()
            .map(|post| {
                let (author_name, author_avatar) = t.author(post.author_id);
                let (reply_count, has_accepted_reply) =
                    reply_stats.get(&post.id).copied().unwrap_or_default();
                DiscussionPostSummary {
                    post: post.clone(),
                    author_name,
                    author_avatar,
                    reply_count,
                    has_accepted_reply,
                }
            })
            .collect();
        summaries
    }

    pub async fn get_study_group_view(&self, id: u32) -> Option<StudyGroupView> {
        let t = self.tables.read().await;
        let group = t.groups.get(id)?.clone();
        let member_count = t.members.iter().filter(|m| m.group_id == id).count();
        let (creator_name, _) = t.author(group.creator_id);
        Some(StudyGroupView {
            group,
            creator_name,
            member_count,
        })
    }

    /// Groups the user belongs to, most recently joined first
    pub async fn get_user_study_groups(&self, user_id: u32) -> Vec<StudyGroup> {
        let t = self.tables.read().await;
        t.members
            .iter()
            .rev()
            .filter(|m| m.user_id == user_id)
            .filter_map(|m| t.groups.get(m.group_id).cloned())
            .collect()
    }

    /// Sessions in the user's groups that have not started yet, soonest first
    pub async fn get_upcoming_study_sessions(&self, user_id: u32) -> Vec<UpcomingSession> {
        let now = Utc::now();
        let t = self.tables.read().await;
        let group_ids: Vec<u32> = t
            .members
            .iter()
            .filter(|m| m.user_id == user_id)
            .map(|m| m.group_id)
            .collect();

        let mut sessions: Vec<UpcomingSession> = t
            .sessions
            .iter()
            .filter(|s| group_ids.contains(&s.group_id) && s.start_time > now)
            .map(|s| UpcomingSession {
                session: s.clone(),
                group_name: t
                    .groups
                    .get(s.group_id)
                    .map(|g| g.name.clone())
                    .unwrap_or_default(),
            })
            .collect();
        sessions.sort_by(|a, b| {
            a.session
                .start_time
                .cmp(&b.session.start_time)
                .then(a.session.id.cmp(&b.session.id))
        });
        sessions
    }

    /// Members in join order
    pub async fn get_group_members(&self, group_id: u32) -> Vec<GroupMemberView> {
        let t = self.tables.read().await;
        t.members
            .iter()
            .filter(|m| m.group_id == group_id)
            .map(|m| {
                let (name, avatar) = t.author(m.user_id);
                GroupMemberView {
                    member: m.clone(),
                    name,
                    avatar,
                }
            })
            .collect()
    }

    /// The last `limit` chat messages of a group, oldest first
    pub async fn get_group_chat_messages(&self, group_id: u32, limit: usize) -> Vec<ChatMessageView> {
        let t = self.tables.read().await;
        let messages = t
            .chat
            .iter()
            .filter(|m| m.group_id == group_id)
            .map(|m| {
                let (author_name, author_avatar) = t.author(m.user_id);
                ChatMessageView {
                    message: m.clone(),
                    author_name,
                    author_avatar,
                }
            })
            .collect();
        tail(messages, limit)
    }

    /// The other side of every friendship `user_id` is part of
    pub async fn get_friends(&self, user_id: u32) -> Vec<FriendView> {
        let t = self.tables.read().await;
        t.friendships
            .iter()
            .filter_map(|f| {
                let friend = t.users.get(f.other(user_id)?)?;
                Some(FriendView {
                    profile: UserProfile::from(friend),
                    friends_since: f.created_at,
                })
            })
            .collect()
    }

    /// Pending requests addressed to `user_id`, newest first
    pub async fn get_pending_friend_requests(&self, user_id: u32) -> Vec<FriendRequestView> {
        let t = self.tables.read().await;
        t.friend_requests
            .iter()
            .rev()
            .filter(|r| r.receiver_id == user_id && r.status == FriendRequestStatus::Pending)
            .map(|r| {
                let (sender_name, sender_avatar) = t.author(r.sender_id);
                FriendRequestView {
                    request: r.clone(),
                    sender_name,
                    sender_avatar,
                }
            })
            .collect()
    }

    /// The last `limit` messages between two users, oldest first
    pub async fn get_conversation(&self, a: u32, b: u32, limit: usize) -> Vec<DirectMessage> {
        let t = self.tables.read().await;
        let messages = t.messages.iter().filter(|m| m.between(a, b)).cloned().collect();
        tail(messages, limit)
    }

    /// Everyone `user_id` has exchanged messages with, most recent first
    pub async fn get_conversation_partners(&self, user_id: u32) -> Vec<ConversationSummary> {
        let t = self.tables.read().await;
        let mut latest: BTreeMap<u32, (DirectMessage, usize)> = BTreeMap::new();
        for msg in t.messages.iter() {
            let partner = if msg.sender_id == user_id {
                msg.receiver_id
            } else if msg.receiver_id == user_id {
                msg.sender_id
            } else {
                continue;
            };
            let unread = usize::from(msg.receiver_id == user_id && !msg.is_read);
            latest
                .entry(partner)
                .and_modify(|(last, count)| {
                    *last = msg.clone();
                    *count += unread;
                })
                .or_insert_with(|| (msg.clone(), unread));
        }

        let mut summaries: Vec<ConversationSummary> = latest
            .into_iter()
            .map(|(partner_id, (last_message, unread_count))| {
                let (partner_name, partner_avatar) = t.author(partner_id);
                ConversationSummary {
                    partner_id,
                    partner_name,
                    partner_avatar,
                    last_message,
                    unread_count,
                }
            })
            .collect();
        summaries.sort_by(|a, b| b.last_message.id.cmp(&a.last_message.id));
        summaries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn user(store: &MemStorage, name: &str) -> User {
        store
            .create_user(NewUser {
                username: name.to_lowercase(),
                email: format!("{}@example.edu", name.to_lowercase()),
                password_hash: "hash".into(),
                display_name: name.to_string(),
                ..Default::default()
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_alice_and_bob_thread() {
        let store = MemStorage::new();
        let alice = user(&store, "Alice").await;
        let bob = user(&store, "Bob").await;
        assert_eq!((alice.id, bob.id), (1, 2));

        let post = store
            .create_discussion_post(NewDiscussionPost {
                title: "Q1".into(),
                content: "How do I invert a matrix?".into(),
                author_id: alice.id,
                ..Default::default()
            })
            .await;
        assert_eq!(post.id, 1);
        let reply = store
            .create_discussion_reply(NewDiscussionReply {
                post_id: post.id,
                author_id: bob.id,
                content: "R1".into(),
            })
            .await
            .unwrap();
        assert_eq!((reply.id, reply.post_id), (1, 1));
        store
            .create_discussion_comment(NewDiscussionComment {
                reply_id: reply.id,
                author_id: alice.id,
                content: "C1".into(),
            })
            .await
            .unwrap();

        let view = store.get_discussion_post(1).await.unwrap();
        assert_eq!(view.author_name, "Alice");
        assert_eq!(view.replies.len(), 1);
        assert_eq!(view.replies[0].author_name, "Bob");
        assert_eq!(view.replies[0].comments.len(), 1);
        assert_eq!(view.replies[0].comments[0].author_name, "Alice");
        assert_eq!(view.replies[0].comments[0].comment.content, "C1");

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["title"], "Q1");
        assert_eq!(json["replies"][0]["authorName"], "Bob");
        assert_eq!(json["replies"][0]["comments"][0]["authorName"], "Alice");
    }

    #[tokio::test]
    async fn test_missing_author_falls_back() {
        let store = MemStorage::new();
        let post = store
            .create_discussion_post(NewDiscussionPost {
                title: "Orphan".into(),
                content: "author was never created".into(),
                author_id: 77,
                ..Default::default()
            })
            .await;

        let view = store.get_discussion_post(post.id).await.unwrap();
        assert_eq!(view.author_name, UNKNOWN_AUTHOR);
        assert_eq!(view.author_avatar, DEFAULT_AVATAR);
        assert!(store.get_discussion_post(post.id + 1).await.is_none());
    }

    #[tokio::test]
    async fn test_accepted_reply_listed_first() {
        let store = MemStorage::new();
        let alice = user(&store, "Alice").await;
        let post = store
            .create_discussion_post(NewDiscussionPost {
                title: "Q".into(),
                content: "?".into(),
                author_id: alice.id,
                ..Default::default()
            })
            .await;
        let mut ids = Vec::new();
        for content in ["one", "two", "three"] {
            let r = store
                .create_discussion_reply(NewDiscussionReply {
                    post_id: post.id,
                    author_id: alice.id,
                    content: content.into(),
                })
                .await
                .unwrap();
            ids.push(r.id);
        }
        store.accept_reply(ids[2]).await.unwrap();

        let view = store.get_discussion_post(post.id).await.unwrap();
        let order: Vec<u32> = view.replies.iter().map(|r| r.reply.id).collect();
        assert_eq!(order, vec![ids[2], ids[0], ids[1]]);

        let summaries = store
            .get_discussion_post_summaries(&DiscussionFilter::default())
            .await;
        assert_eq!(summaries[0].reply_count, 3);
        assert!(summaries[0].has_accepted_reply);
    }

    #[tokio::test]
    async fn test_friends_are_symmetric() {
        let store = MemStorage::new();
        let a = user(&store, "Alice").await;
        let b = user(&store, "Bob").await;
        store.create_friendship(a.id, b.id).await.unwrap();

        let of_a = store.get_friends(a.id).await;
        let of_b = store.get_friends(b.id).await;
        assert_eq!(of_a.len(), 1);
        assert_eq!(of_a[0].profile.id, b.id);
        assert_eq!(of_b.len(), 1);
        assert_eq!(of_b[0].profile.id, a.id);
        assert_eq!(store.stats().await.friendships, 1);
    }

    #[tokio::test]
    async fn test_pending_requests_are_incoming_only() {
        let store = MemStorage::new();
        let alice = user(&store, "Alice").await;
        let bob = user(&store, "Bob").await;
        let carol = user(&store, "Carol").await;

        let from_bob = store.send_friend_request(bob.id, alice.id).await.unwrap();
        let from_carol = store.send_friend_request(carol.id, alice.id).await.unwrap();
        store.send_friend_request(alice.id, bob.id).await.unwrap_err();

        let pending = store.get_pending_friend_requests(alice.id).await;
        let ids: Vec<u32> = pending.iter().map(|r| r.request.id).collect();
        assert_eq!(ids, vec![from_carol.id, from_bob.id]);
        assert_eq!(pending[0].sender_name, "Carol");
        assert!(store.get_pending_friend_requests(bob.id).await.is_empty());

        store
            .respond_friend_request(from_bob.id, alice.id, false)
            .await
            .unwrap();
        let pending = store.get_pending_friend_requests(alice.id).await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].request.sender_id, carol.id);
    }

    #[tokio::test]
    async fn test_user_study_groups_lists_memberships() {
        let store = MemStorage::new();
        let alice = user(&store, "Alice").await;
        let bob = user(&store, "Bob").await;
        let group = |name: &str, creator_id: u32| NewStudyGroup {
            name: name.to_string(),
            creator_id,
            ..Default::default()
        };
        let (algebra, _) = store
            .create_study_group_with_creator(group("Algebra", alice.id))
            .await
            .unwrap();
        let (chemistry, _) = store
            .create_study_group_with_creator(group("Chemistry", bob.id))
            .await
            .unwrap();
        store
            .create_study_group_with_creator(group("History", bob.id))
            .await
            .unwrap();
        store
            .add_group_member(chemistry.id, alice.id, false)
            .await
            .unwrap();

        let mine = store.get_user_study_groups(alice.id).await;
        let ids: Vec<u32> = mine.iter().map(|g| g.id).collect();
        assert_eq!(ids, vec![chemistry.id, algebra.id]);

        store.remove_group_member(chemistry.id, alice.id).await.unwrap();
        let mine = store.get_user_study_groups(alice.id).await;
        assert_eq!(mine, vec![algebra]);
    }

    #[tokio::test]
    async fn test_friend_with_missing_user_is_dropped() {
        let store = MemStorage::new();
        let a = user(&store, "Alice").await;
        store.create_friendship(a.id, 500).await.unwrap();
        assert!(store.get_friends(a.id).await.is_empty());
    }

    #[tokio::test]
    async fn test_upcoming_sessions_only_for_member_groups() {
        let store = MemStorage::new();
        let alice = user(&store, "Alice").await;
        let bob = user(&store, "Bob").await;
        let (mine, _) = store
            .create_study_group_with_creator(NewStudyGroup {
                name: "Mine".into(),
                creator_id: alice.id,
                ..Default::default()
            })
            .await
            .unwrap();
        let (theirs, _) = store
            .create_study_group_with_creator(NewStudyGroup {
                name: "Theirs".into(),
                creator_id: bob.id,
                ..Default::default()
            })
            .await
            .unwrap();

        let now = Utc::now();
        let session = |group_id: u32, title: &str, hours: i64| NewStudySession {
            group_id,
            title: title.to_string(),
            description: None,
            start_time: now + Duration::hours(hours),
            end_time: now + Duration::hours(hours + 1),
            location: None,
            meeting_link: None,
            created_by: alice.id,
        };
        store.create_study_session(session(mine.id, "later", 5)).await.unwrap();
        store.create_study_session(session(mine.id, "sooner", 1)).await.unwrap();
        store.create_study_session(session(mine.id, "past", -4)).await.unwrap();
        store.create_study_session(session(theirs.id, "other", 2)).await.unwrap();

        let upcoming = store.get_upcoming_study_sessions(alice.id).await;
        let titles: Vec<&str> = upcoming.iter().map(|s| s.session.title.as_str()).collect();
        assert_eq!(titles, vec!["sooner", "later"]);
        assert_eq!(upcoming[0].group_name, "Mine");
    }

    #[tokio::test]
    async fn test_chat_returns_trailing_messages_in_order() {
        let store = MemStorage::new();
        let alice = user(&store, "Alice").await;
        let (group, _) = store
            .create_study_group_with_creator(NewStudyGroup {
                name: "Chatty".into(),
                creator_id: alice.id,
                ..Default::default()
            })
            .await
            .unwrap();
        for i in 0..5 {
            store
                .create_group_chat_message(NewGroupChatMessage {
                    group_id: group.id,
                    user_id: alice.id,
                    content: format!("msg {}", i),
                })
                .await
                .unwrap();
        }

        let last = store.get_group_chat_messages(group.id, 2).await;
        let contents: Vec<&str> = last.iter().map(|m| m.message.content.as_str()).collect();
        assert_eq!(contents, vec!["msg 3", "msg 4"]);
        assert_eq!(last[0].author_name, "Alice");
    }

    #[tokio::test]
    async fn test_conversation_partners() {
        let store = MemStorage::new();
        let alice = user(&store, "Alice").await;
        let bob = user(&store, "Bob").await;
        let carol = user(&store, "Carol").await;
        let send = |from: u32, to: u32, content: &str| NewDirectMessage {
            sender_id: from,
            receiver_id: to,
            content: content.to_string(),
        };
        store.send_direct_message(send(bob.id, alice.id, "hi")).await.unwrap();
        store.send_direct_message(send(bob.id, alice.id, "still there?")).await.unwrap();
        store.send_direct_message(send(alice.id, carol.id, "notes?")).await.unwrap();

        let inbox = store.get_conversation_partners(alice.id).await;
        assert_eq!(inbox.len(), 2);
        assert_eq!(inbox[0].partner_id, carol.id);
        assert_eq!(inbox[0].unread_count, 0);
        assert_eq!(inbox[1].partner_name, "Bob");
        assert_eq!(inbox[1].unread_count, 2);
        assert_eq!(inbox[1].last_message.content, "still there?");

        let thread = store.get_conversation(alice.id, bob.id, 10).await;
        assert_eq!(thread.len(), 2);
        assert_eq!(thread[0].content, "hi");
    }
}
