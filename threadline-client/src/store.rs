use std::{
    collections::{hash_map, HashMap, HashSet},
    sync::Arc,
};

use crate::api::{self, Comment, CommentId};

/// How an incoming comment is merged when its id is already known
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Merge {
    /// Server data fetched on purpose: replaces what we have, counters included
    Authoritative,

    /// Comments handed over one by one (local submission, push): never overwrites, so
    /// that a counter update received in between is not lost
    InsertOnly,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct UpsertReport {
    pub inserted: Vec<CommentId>,
    pub replaced: Vec<CommentId>,
    pub unchanged: Vec<CommentId>,
    pub rejected: Vec<api::Error>,
}

impl UpsertReport {
    /// Whether the store changed at all
    pub fn changed(&self) -> bool {
        !self.inserted.is_empty() || !self.replaced.is_empty()
    }

    /// Ids of all accepted comments, whether they changed the store or not
    pub fn accepted(&self) -> impl Iterator<Item = &CommentId> {
        self.inserted
            .iter()
            .chain(self.replaced.iter())
            .chain(self.unchanged.iter())
    }
}

/// All the comments currently known for one post, keyed by id
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CommentStore {
    comments: Arc<HashMap<CommentId, Arc<Comment>>>,
}

impl CommentStore {
    pub fn new() -> CommentStore {
        CommentStore::default()
    }

    pub fn len(&self) -> usize {
        self.comments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.comments.is_empty()
    }

    pub fn contains(&self, id: &CommentId) -> bool {
        self.comments.contains_key(id)
    }

    pub fn get(&self, id: &CommentId) -> Option<&Arc<Comment>> {
        self.comments.get(id)
    }

    /// Snapshot of the store, in no particular order
    pub fn all(&self) -> Vec<Arc<Comment>> {
        self.comments.values().cloned().collect()
    }

    pub fn upsert_one(&mut self, comment: Comment, merge: Merge) -> UpsertReport {
        self.upsert_many(vec![comment], merge)
    }

    pub fn upsert_many(&mut self, comments: Vec<Comment>, merge: Merge) -> UpsertReport {
        let mut report = UpsertReport::default();
        let mut flat = Vec::with_capacity(comments.len());
        for c in comments {
            flatten_into(c, &mut flat, &mut report);
        }

        let store = Arc::make_mut(&mut self.comments);
        for c in flat {
            if let Err(err) = c.validate() {
                tracing::warn!(id = ?c.id, %err, "dropping malformed comment");
                report.rejected.push(err);
                continue;
            }
            match store.entry(c.id.clone()) {
                hash_map::Entry::Vacant(entry) => {
                    report.inserted.push(c.id.clone());
                    entry.insert(Arc::new(c));
                }
                hash_map::Entry::Occupied(mut entry) => {
                    if merge == Merge::Authoritative && **entry.get() != c {
                        report.replaced.push(c.id.clone());
                        entry.insert(Arc::new(c));
                    } else {
                        report.unchanged.push(c.id.clone());
                    }
                }
            }
        }
        report
    }

    /// Applies server-side counters to an already-known comment, returning whether
    /// the comment is known
    pub fn set_counters(&mut self, id: &CommentId, likes_count: u64, replies_count: u64) -> bool {
        let store = Arc::make_mut(&mut self.comments);
        match store.get_mut(id) {
            None => false,
            Some(c) => {
                let c = Arc::make_mut(c);
                c.likes_count = likes_count;
                c.replies_count = replies_count;
                true
            }
        }
    }

    /// Flips the current user's like on a comment, returning the new liked state
    pub fn toggle_like(&mut self, id: &CommentId) -> Option<bool> {
        let store = Arc::make_mut(&mut self.comments);
        let c = Arc::make_mut(store.get_mut(id)?);
        c.is_liked = !c.is_liked;
        c.likes_count = match c.is_liked {
            true => c.likes_count.saturating_add(1),
            false => c.likes_count.saturating_sub(1),
        };
        Some(c.is_liked)
    }

    /// Number of resolved ancestors of `id`, or None if its parent chain does not reach a
    /// root comment in this store
    pub fn depth_of(&self, id: &CommentId) -> Option<usize> {
        let mut seen = HashSet::new();
        let mut current = self.comments.get(id)?;
        let mut depth = 0;
        while let Some(parent) = &current.parent_comment_id {
            if !seen.insert(parent) {
                return None;
            }
            current = self.comments.get(parent)?;
            depth += 1;
        }
        Some(depth)
    }
}

/// Moves server-inlined replies out of their parent, so that hierarchy only ever comes from
/// `parent_comment_id`
fn flatten_into(mut c: Comment, out: &mut Vec<Comment>, report: &mut UpsertReport) {
    let replies = c.replies.take().unwrap_or_default();
    if !replies.is_empty() && c.id.is_empty() {
        tracing::warn!(
            num_replies = replies.len(),
            "dropping replies inlined in a comment without id"
        );
        report.rejected.push(api::Error::MissingId);
        return;
    }
    let parent = c.id.clone();
    out.push(c);
    for mut r in replies {
        if r.parent_comment_id.is_none() {
            r.parent_comment_id = Some(parent.clone());
        }
        flatten_into(r, out, report);
    }
}
