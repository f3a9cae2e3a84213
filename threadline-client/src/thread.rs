use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use crate::{
    api::{Comment, CommentId},
    ThreadPolicy,
};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommentThread {
    pub comment: Arc<Comment>,

    /// Direct replies, oldest first
    pub children: Vec<CommentThread>,

    /// 0 for comments made directly on the post
    pub depth: usize,

    /// Deep threads start collapsed in the view
    pub is_beyond_depth_limit: bool,

    /// Whether this comment's replies have been explicitly fetched. This is unrelated to
    /// `children` being empty: some replies can already be known from inlined seeds or
    /// from the event feed.
    pub replies_loaded: bool,
}

impl CommentThread {
    pub fn id(&self) -> &CommentId {
        &self.comment.id
    }

    pub fn can_reply(&self, policy: &ThreadPolicy) -> bool {
        self.depth < policy.max_reply_depth
    }

    /// Whether the server reports replies that are not fetched yet
    pub fn has_unloaded_replies(&self) -> bool {
        !self.replies_loaded && self.comment.replies_count as usize > self.children.len()
    }

}

// Threads can be arbitrarily deep, so children are dropped from a heap stack rather than
// through nested drop glue.
impl Drop for CommentThread {
    fn drop(&mut self) {
        let mut stack = std::mem::take(&mut self.children);
        while let Some(mut t) = stack.pop() {
            stack.append(&mut t.children);
        }
    }
}

/// Ordered root threads of a post
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Forest(Vec<CommentThread>);

impl Forest {
    pub fn roots(&self) -> &[CommentThread] {
        &self.0
    }

    pub fn into_roots(self) -> Vec<CommentThread> {
        self.0
    }

    /// Total number of threads, at all depths
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn find(&self, id: &CommentId) -> Option<&CommentThread> {
        self.iter().find(|t| t.id() == id)
    }

    /// Depth-first, parents before their children
    pub fn iter(&self) -> ForestIter<'_> {
        ForestIter {
            stack: self.0.iter().rev().collect(),
        }
    }

    /// Root threads with the most recent first; replies stay chronological
    pub fn newest_first(&self) -> impl Iterator<Item = &CommentThread> {
        self.0.iter().rev()
    }
}

pub struct ForestIter<'a> {
    stack: Vec<&'a CommentThread>,
}

impl<'a> Iterator for ForestIter<'a> {
    type Item = &'a CommentThread;

    fn next(&mut self) -> Option<&'a CommentThread> {
        let t = self.stack.pop()?;
        self.stack.extend(t.children.iter().rev());
        Some(t)
    }
}

fn chronological(a: &Arc<Comment>, b: &Arc<Comment>) -> std::cmp::Ordering {
    (a.created_at, &a.id).cmp(&(b.created_at, &b.id))
}

/// Builds the forest of threads out of a flat list of comments.
///
/// Comments whose parent is not in `comments` are left out until their parent shows up,
/// as are comments caught in a parent cycle. Depths are assigned from the roots down, so
/// the result does not depend on the order of `comments`.
pub fn build(
    comments: &[Arc<Comment>],
    policy: &ThreadPolicy,
    replies_loaded: &HashSet<CommentId>,
) -> Forest {
    let known = comments
        .iter()
        .map(|c| &c.id)
        .collect::<HashSet<&CommentId>>();

    let mut roots = Vec::new();
    let mut children: HashMap<&CommentId, Vec<&Arc<Comment>>> = HashMap::new();
    let mut orphans = 0;
    for c in comments {
        match &c.parent_comment_id {
            None => roots.push(c),
            Some(p) if known.contains(p) => children.entry(p).or_default().push(c),
            Some(_) => orphans += 1,
        }
    }
    if orphans > 0 {
        tracing::debug!(orphans, "comments waiting for their parent");
    }
    for siblings in children.values_mut() {
        siblings.sort_unstable_by(|a, b| chronological(a, b));
    }
    roots.sort_unstable_by(|a, b| chronological(a, b));

    // Pre-order walk from the roots. Comments caught in a cycle are never reached.
    let mut order = Vec::with_capacity(comments.len());
    let mut stack = roots.iter().rev().map(|c| (*c, 0)).collect::<Vec<_>>();
    while let Some((c, depth)) = stack.pop() {
        order.push((c, depth));
        if let Some(cs) = children.get(&c.id) {
            stack.extend(cs.iter().rev().map(|c| (*c, depth + 1)));
        }
    }

    // Every child comes after its parent in `order`, so walking it backwards finds all
    // children of a comment already built.
    let mut built: HashMap<&CommentId, CommentThread> = HashMap::with_capacity(order.len());
    for (c, depth) in order.into_iter().rev() {
        let threads = children
            .get(&c.id)
            .map(|cs| cs.iter().filter_map(|c| built.remove(&c.id)).collect())
            .unwrap_or_default();
        built.insert(
            &c.id,
            CommentThread {
                comment: c.clone(),
                children: threads,
                depth,
                is_beyond_depth_limit: depth >= policy.max_display_depth,
                replies_loaded: replies_loaded.contains(&c.id),
            },
        );
    }
    Forest(roots.iter().filter_map(|c| built.remove(&c.id)).collect())
}
