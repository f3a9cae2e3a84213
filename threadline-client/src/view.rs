use std::collections::HashSet;

use crate::{
    api::{Comment, CommentId},
    CommentThread, Forest,
};

/// Which threads the user expanded or collapsed. Owned by the view, the engine never
/// looks at it.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ViewState {
    expanded: HashSet<CommentId>,
    collapsed: HashSet<CommentId>,
}

impl ViewState {
    pub fn new() -> ViewState {
        ViewState::default()
    }

    /// Returns whether the thread is now explicitly expanded
    pub fn toggle_expanded(&mut self, id: &CommentId) -> bool {
        toggle(&mut self.expanded, id)
    }

    /// Returns whether the thread is now explicitly collapsed
    pub fn toggle_collapsed(&mut self, id: &CommentId) -> bool {
        toggle(&mut self.collapsed, id)
    }

    /// Deep threads start collapsed until the user expands them
    pub fn is_expanded(&self, thread: &CommentThread) -> bool {
        self.expanded.contains(thread.id()) || !thread.is_beyond_depth_limit
    }

    pub fn is_collapsed(&self, id: &CommentId) -> bool {
        self.collapsed.contains(id)
    }

    /// Forgets about threads that are no longer in `forest`
    pub fn retain_known(&mut self, forest: &Forest) {
        let known = forest.iter().map(|t| t.id()).collect::<HashSet<_>>();
        self.expanded.retain(|id| known.contains(id));
        self.collapsed.retain(|id| known.contains(id));
    }
}

fn toggle(set: &mut HashSet<CommentId>, id: &CommentId) -> bool {
    if set.remove(id) {
        false
    } else {
        set.insert(id.clone());
        true
    }
}

/// Text a reply to `comment` starts with in the composer
pub fn reply_prefix(comment: &Comment) -> String {
    match &comment.author {
        Some(author) if !author.username.is_empty() => format!("@{} ", author.username),
        _ => String::new(),
    }
}
