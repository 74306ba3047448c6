//! Filtering and search over the store tables
//!
//! Filters are exact-match and AND-combined: every `Some` field must equal
//! the record's field, and an empty filter matches everything. Search is a
//! case-insensitive substring match over a handful of text fields, ranked
//! so that a hit in the title (or name) beats a hit anywhere else.

use std::cmp::Ordering;

use chrono::Utc;
use serde::Deserialize;

use super::schemas::*;
use super::store::{MemStorage, Tables};

/// Upper bound on any single search result
pub const MAX_SEARCH_LIMIT: usize = 100;

// =============================================================================
// Filters
// =============================================================================

pub trait Filter<T> {
    fn matches(&self, item: &T) -> bool;
}

fn field<V: PartialEq>(want: &Option<V>, have: &V) -> bool {
    want.as_ref().map_or(true, |w| w == have)
}

fn opt_field<V: PartialEq>(want: &Option<V>, have: &Option<V>) -> bool {
    want.as_ref().map_or(true, |w| have.as_ref() == Some(w))
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaperFilter {
    pub course: Option<String>,
    pub year: Option<u16>,
    pub institution: Option<String>,
    pub uploader_id: Option<u32>,
    pub resource_type: Option<String>,
}

impl Filter<Paper> for PaperFilter {
    fn matches(&self, p: &Paper) -> bool {
        field(&self.course, &p.course)
            && opt_field(&self.year, &p.year)
            && opt_field(&self.institution, &p.institution)
            && field(&self.uploader_id, &p.uploader_id)
            && field(&self.resource_type, &p.resource_type)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceFilter {
    pub course: Option<String>,
    pub resource_type: Option<String>,
    pub uploader_id: Option<u32>,
}

impl Filter<Resource> for ResourceFilter {
    fn matches(&self, r: &Resource) -> bool {
        opt_field(&self.course, &r.course)
            && field(&self.resource_type, &r.resource_type)
            && field(&self.uploader_id, &r.uploader_id)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyGroupFilter {
    pub course: Option<String>,
    pub creator_id: Option<u32>,
    pub is_private: Option<bool>,
}

impl Filter<StudyGroup> for StudyGroupFilter {
    fn matches(&self, g: &StudyGroup) -> bool {
        opt_field(&self.course, &g.course)
            && field(&self.creator_id, &g.creator_id)
            && field(&self.is_private, &g.is_private)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscussionFilter {
    pub course: Option<String>,
    pub author_id: Option<u32>,
    /// Matches when the post carries this tag, compared the way tags are
    /// stored (trimmed, lowercase)
    pub tag: Option<String>,
}

impl Filter<DiscussionPost> for DiscussionFilter {
    fn matches(&self, d: &DiscussionPost) -> bool {
        opt_field(&self.course, &d.course)
            && field(&self.author_id, &d.author_id)
            && self
                .tag
                .as_deref()
                .map_or(true, |t| d.tags.contains(&t.trim().to_lowercase()))
    }
}

// =============================================================================
// Search
// =============================================================================

/// `?q=...&limit=...` as sent by the search endpoints
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    pub limit: Option<usize>,
}

impl SearchQuery {
    pub fn new(q: impl Into<String>, limit: Option<usize>) -> Self {
        Self { q: q.into(), limit }
    }

    /// Lowercased, trimmed needle; `None` for a blank query
    fn needle(&self) -> Option<String> {
        let q = self.q.trim();
        (!q.is_empty()).then(|| q.to_lowercase())
    }

    fn limit(&self) -> usize {
        self.limit.unwrap_or(MAX_SEARCH_LIMIT).min(MAX_SEARCH_LIMIT)
    }
}

/// Where a search hit landed. Lower sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchRank {
    Primary,
    Secondary,
}

/// Text fields a record exposes to search
pub trait Searchable {
    /// The title or name
    fn primary_fields(&self) -> Vec<&str>;
    fn secondary_fields(&self) -> Vec<&str>;

    fn match_rank(&self, needle: &str) -> Option<MatchRank> {
        let hit = |s: &&str| s.to_lowercase().contains(needle);
        if self.primary_fields().iter().any(hit) {
            Some(MatchRank::Primary)
        } else if self.secondary_fields().iter().any(hit) {
            Some(MatchRank::Secondary)
        } else {
            None
        }
    }
}

impl Searchable for Paper {
    fn primary_fields(&self) -> Vec<&str> {
        vec![self.title.as_str()]
    }

    fn secondary_fields(&self) -> Vec<&str> {
        let mut fields = vec![self.course.as_str()];
        fields.extend(self.institution.as_deref());
        fields.extend(self.description.as_deref());
        fields
    }
}

impl Searchable for DiscussionPost {
    fn primary_fields(&self) -> Vec<&str> {
        vec![self.title.as_str()]
    }

    fn secondary_fields(&self) -> Vec<&str> {
        let mut fields = vec![self.content.as_str()];
        fields.extend(self.course.as_deref());
        fields.extend(self.tags.iter().map(String::as_str));
        fields
    }
}

impl Searchable for StudyGroup {
    fn primary_fields(&self) -> Vec<&str> {
        vec![self.name.as_str()]
    }

    fn secondary_fields(&self) -> Vec<&str> {
        self.description
            .as_deref()
            .into_iter()
            .chain(self.course.as_deref())
            .collect()
    }
}

impl Searchable for StudySession {
    fn primary_fields(&self) -> Vec<&str> {
        vec![self.title.as_str()]
    }

    fn secondary_fields(&self) -> Vec<&str> {
        self.description
            .as_deref()
            .into_iter()
            .chain(self.location.as_deref())
            .collect()
    }
}

impl Searchable for User {
    fn primary_fields(&self) -> Vec<&str> {
        vec![self.username.as_str(), self.display_name.as_str()]
    }

    fn secondary_fields(&self) -> Vec<&str> {
        self.institution.as_deref().into_iter().collect()
    }
}

/// Rank `items` against `query`: primary hits first, then by `tie_break`.
/// Blank queries match nothing.
pub fn ranked_search<'a, T, I, F>(items: I, query: &SearchQuery, tie_break: F) -> Vec<T>
where
    T: Searchable + Clone + 'a,
    I: IntoIterator<Item = &'a T>,
    F: Fn(&T, &T) -> Ordering,
{
    let Some(needle) = query.needle() else {
        return Vec::new();
    };

    let mut hits: Vec<(MatchRank, &T)> = items
        .into_iter()
        .filter_map(|item| item.match_rank(&needle).map(|rank| (rank, item)))
        .collect();
    hits.sort_by(|(ra, a), (rb, b)| ra.cmp(rb).then_with(|| tie_break(*a, *b)));
    hits.into_iter()
        .take(query.limit())
        .map(|(_, item)| item.clone())
        .collect()
}

// =============================================================================
// Store queries
// =============================================================================

impl Tables {
    /// Borrowed posts matching `filter`, newest first. Shared by the bare
    /// listing and the summary view.
    pub(super) fn discussion_posts(&self, filter: &DiscussionFilter) -> Vec<&DiscussionPost> {
        let mut posts: Vec<&DiscussionPost> = self.posts.iter().filter(|d| filter.matches(d)).collect();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        posts
    }
}

impl MemStorage {
    /// Papers matching `filter`, newest upload first
    pub async fn get_papers(&self, filter: &PaperFilter) -> Vec<Paper> {
        let t = self.tables.read().await;
        let mut papers: Vec<Paper> = t.papers.iter().filter(|p| filter.matches(p)).cloned().collect();
        papers.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at).then(b.id.cmp(&a.id)));
        papers
    }

    pub async fn get_resources(&self, filter: &ResourceFilter) -> Vec<Resource> {
        let t = self.tables.read().await;
        let mut resources: Vec<Resource> = t
            .resources
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        resources.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        resources
    }

    pub async fn get_study_groups(&self, filter: &StudyGroupFilter) -> Vec<StudyGroup> {
        let t = self.tables.read().await;
        let mut groups: Vec<StudyGroup> = t.groups.iter().filter(|g| filter.matches(g)).cloned().collect();
        groups.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        groups
    }

    /// Posts matching `filter`, newest first
    pub async fn get_discussion_posts(&self, filter: &DiscussionFilter) -> Vec<DiscussionPost> {
        let t = self.tables.read().await;
        let posts = t.discussion_posts(filter).into_iter().cloned().collect();
        posts
    }

    /// Title hits first, then newest upload
    pub async fn search_papers(&self, query: &SearchQuery) -> Vec<Paper> {
        let t = self.tables.read().await;
        ranked_search(t.papers.iter(), query, |a, b| {
            b.uploaded_at.cmp(&a.uploaded_at).then(b.id.cmp(&a.id))
        })
    }

    /// Title hits first, then most votes
    pub async fn search_discussions(&self, query: &SearchQuery) -> Vec<DiscussionPost> {
        let t = self.tables.read().await;
        ranked_search(t.posts.iter(), query, |a, b| {
            b.votes.cmp(&a.votes).then(b.id.cmp(&a.id))
        })
    }

    /// Name hits first, then newest group
    pub async fn search_groups(&self, query: &SearchQuery) -> Vec<StudyGroup> {
        let t = self.tables.read().await;
        ranked_search(t.groups.iter(), query, |a, b| {
            b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id))
        })
    }

    /// Sessions that have not ended yet. Title hits first, then the
    /// soonest start.
    pub async fn search_sessions(&self, query: &SearchQuery) -> Vec<StudySession> {
        let now = Utc::now();
        let t = self.tables.read().await;
        ranked_search(t.sessions.iter().filter(|s| s.end_time > now), query, |a, b| {
            a.start_time.cmp(&b.start_time).then(a.id.cmp(&b.id))
        })
    }

    /// Username or display-name hits first, then most points
    pub async fn search_users(&self, query: &SearchQuery) -> Vec<User> {
        let t = self.tables.read().await;
        ranked_search(t.users.iter().filter(|u| !u.is_banned), query, |a, b| {
            b.points.cmp(&a.points).then(a.id.cmp(&b.id))
        })
    }
}
