use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use futures::{
    future::{BoxFuture, Shared},
    pin_mut, FutureExt, Stream, StreamExt,
};
use parking_lot::Mutex;

use crate::{
    api::{Comment, CommentId, FeedMessage, NewComment, PageRequest, PostId, RootPage},
    thread, CommentSource, CommentStore, Error, Forest, Merge, PaginationConfig, RootCursor,
    ThreadPolicy, UpsertReport,
};

type FetchResult = Result<Vec<Arc<Comment>>, Error>;
type SharedFetch = Shared<BoxFuture<'static, FetchResult>>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Phase {
    /// No root page received yet for the current post
    Empty,
    LoadingInitial,
    Ready,
    LoadingMore,
}

/// What happened to a comment handed to `on_comment_created`
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Delivery {
    Merged,
    Duplicate,
    OtherSubject,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum RootsRequest {
    Initial,
    More,
}

struct State {
    subject: Option<PostId>,

    /// Bumped every time the subject changes, results of fetches started under another
    /// epoch are dropped
    epoch: u64,

    phase: Phase,
    store: CommentStore,
    cursor: RootCursor,
    nested_loaded: HashSet<CommentId>,

    // At most one root fetch and one reply fetch per parent, later callers wait on the
    // same result
    roots_in_flight: Option<(RootsRequest, SharedFetch)>,
    replies_in_flight: HashMap<CommentId, SharedFetch>,

    forest: Arc<Forest>,
}

impl State {
    fn new() -> State {
        State {
            subject: None,
            epoch: 0,
            phase: Phase::Empty,
            store: CommentStore::new(),
            cursor: RootCursor::default(),
            nested_loaded: HashSet::new(),
            roots_in_flight: None,
            replies_in_flight: HashMap::new(),
            forest: Arc::new(Forest::default()),
        }
    }

    fn reset(&mut self, subject: Option<PostId>) {
        let epoch = self.epoch + 1;
        *self = State::new();
        self.subject = subject;
        self.epoch = epoch;
    }

    fn rebuild(&mut self, policy: &ThreadPolicy) {
        self.forest = Arc::new(thread::build(
            &self.store.all(),
            policy,
            &self.nested_loaded,
        ));
    }

    fn resolve(&self, report: &UpsertReport) -> Vec<Arc<Comment>> {
        report
            .accepted()
            .filter_map(|id| self.store.get(id).cloned())
            .collect()
    }

    fn finish_roots(
        &mut self,
        epoch: u64,
        kind: RootsRequest,
        req: PageRequest,
        res: anyhow::Result<RootPage>,
        policy: &ThreadPolicy,
    ) -> FetchResult {
        if epoch != self.epoch {
            tracing::debug!(epoch, current = self.epoch, "dropping root page of a closed post");
            return Err(Error::SubjectChanged);
        }
        self.roots_in_flight = None;
        let page = match res {
            Ok(page) => page,
            Err(err) => {
                tracing::warn!(?err, page = req.page, "failed fetching root comments");
                self.phase = match self.cursor == RootCursor::default() {
                    true => Phase::Empty,
                    false => Phase::Ready,
                };
                return Err(Error::transport(err));
            }
        };
        self.phase = Phase::Ready;
        let base = match kind {
            RootsRequest::Initial => RootCursor::default(),
            RootsRequest::More => self.cursor,
        };
        self.cursor = base.advance(&req, &page);
        let report = self.store.upsert_many(page.comments, Merge::Authoritative);
        tracing::debug!(
            page = req.page,
            inserted = report.inserted.len(),
            replaced = report.replaced.len(),
            rejected = report.rejected.len(),
            has_more = self.cursor.has_more,
            "merged root page"
        );
        self.rebuild(policy);
        Ok(self.resolve(&report))
    }

    fn finish_replies(
        &mut self,
        epoch: u64,
        parent: CommentId,
        res: anyhow::Result<Vec<Comment>>,
        policy: &ThreadPolicy,
    ) -> FetchResult {
        if epoch != self.epoch {
            tracing::debug!(epoch, current = self.epoch, ?parent, "dropping replies of a closed post");
            return Err(Error::SubjectChanged);
        }
        self.replies_in_flight.remove(&parent);
        let mut replies = match res {
            Ok(replies) => replies,
            Err(err) => {
                tracing::warn!(?err, ?parent, "failed fetching replies");
                return Err(Error::transport(err));
            }
        };
        for r in replies.iter_mut() {
            if r.parent_comment_id.is_none() {
                r.parent_comment_id = Some(parent.clone());
            }
        }
        let report = self.store.upsert_many(replies, Merge::Authoritative);
        tracing::debug!(
            ?parent,
            inserted = report.inserted.len(),
            rejected = report.rejected.len(),
            "merged replies"
        );
        // Marked even when the server returned nothing
        self.nested_loaded.insert(parent);
        self.rebuild(policy);
        Ok(self.resolve(&report))
    }

    fn merge_created(
        &mut self,
        post: &PostId,
        comment: Comment,
        policy: &ThreadPolicy,
    ) -> Result<Delivery, Error> {
        if self.subject.as_ref() != Some(post) {
            tracing::debug!(?post, id = ?comment.id, "ignoring comment for another post");
            return Ok(Delivery::OtherSubject);
        }
        if let Some(parent) = &comment.parent_comment_id {
            if !self.nested_loaded.contains(parent) {
                tracing::debug!(?parent, id = ?comment.id, "new reply under unexpanded comment");
            }
        }
        let report = self.store.upsert_one(comment, Merge::InsertOnly);
        if let Some(err) = report.rejected.first() {
            return Err(err.clone().into());
        }
        if !report.changed() {
            return Ok(Delivery::Duplicate);
        }
        self.rebuild(policy);
        Ok(Delivery::Merged)
    }
}

/// Comment thread of one post at a time, as seen by the client.
///
/// Fetched pages, fetched replies and comments created in real time are all merged in the
/// same store, and the forest is rebuilt from scratch after every change.
#[derive(Clone)]
pub struct ThreadSession {
    source: Arc<dyn CommentSource>,
    config: PaginationConfig,
    policy: ThreadPolicy,
    state: Arc<Mutex<State>>,
}

impl ThreadSession {
    pub fn new<S>(source: S, config: PaginationConfig, policy: ThreadPolicy) -> ThreadSession
    where
        S: 'static + CommentSource,
    {
        ThreadSession {
            source: Arc::new(source),
            config,
            policy,
            state: Arc::new(Mutex::new(State::new())),
        }
    }

    pub fn config(&self) -> &PaginationConfig {
        &self.config
    }

    pub fn policy(&self) -> &ThreadPolicy {
        &self.policy
    }

    /// Switches to `post`, forgetting everything about the previous one
    pub fn open(&self, post: PostId) {
        let mut state = self.state.lock();
        tracing::info!(?post, "opening comment thread");
        state.reset(Some(post));
    }

    pub fn close(&self) {
        let mut state = self.state.lock();
        tracing::info!(post = ?state.subject, "closing comment thread");
        state.reset(None);
    }

    pub fn subject(&self) -> Option<PostId> {
        self.state.lock().subject.clone()
    }

    pub fn epoch(&self) -> u64 {
        self.state.lock().epoch
    }

    pub fn phase(&self) -> Phase {
        self.state.lock().phase
    }

    pub fn forest(&self) -> Arc<Forest> {
        self.state.lock().forest.clone()
    }

    /// Every comment known for the current post, including those not in the forest yet
    pub fn comments(&self) -> Vec<Arc<Comment>> {
        self.state.lock().store.all()
    }

    pub fn store(&self) -> CommentStore {
        self.state.lock().store.clone()
    }

    pub fn cursor(&self) -> RootCursor {
        self.state.lock().cursor
    }

    pub fn root_has_more(&self) -> bool {
        self.state.lock().cursor.has_more
    }

    pub fn total_count(&self) -> Option<u64> {
        self.state.lock().cursor.total_count
    }

    pub fn is_nested_loaded(&self, id: &CommentId) -> bool {
        self.state.lock().nested_loaded.contains(id)
    }

    fn fetch_roots(
        &self,
        post: PostId,
        kind: RootsRequest,
        req: PageRequest,
        epoch: u64,
    ) -> SharedFetch {
        let source = self.source.clone();
        let state = self.state.clone();
        let policy = self.policy;
        async move {
            let res = source.fetch_roots(&post, req).await;
            let mut state = state.lock();
            state.finish_roots(epoch, kind, req, res, &policy)
        }
        .boxed()
        .shared()
    }

    fn fetch_replies(&self, parent: CommentId, epoch: u64) -> SharedFetch {
        let source = self.source.clone();
        let state = self.state.clone();
        let policy = self.policy;
        async move {
            let res = source.fetch_replies(&parent).await;
            let mut state = state.lock();
            state.finish_replies(epoch, parent, res, &policy)
        }
        .boxed()
        .shared()
    }

    /// Fetches the first page of root comments, resetting the pagination cursor once it
    /// arrives. Joins an initial fetch already in flight, and waits for a next-page fetch
    /// in flight to settle before starting its own.
    pub async fn load_initial_roots(&self) -> FetchResult {
        let epoch = self.state.lock().epoch;
        loop {
            let (kind, fetch) = {
                let mut state = self.state.lock();
                if state.epoch != epoch {
                    return Err(Error::SubjectChanged);
                }
                let post = state.subject.clone().ok_or(Error::NoSubject)?;
                match state.roots_in_flight.clone() {
                    Some(in_flight) => in_flight,
                    None => {
                        let req = RootCursor::initial_request(&self.config);
                        let f = self.fetch_roots(post, RootsRequest::Initial, req, state.epoch);
                        state.phase = Phase::LoadingInitial;
                        state.roots_in_flight = Some((RootsRequest::Initial, f.clone()));
                        (RootsRequest::Initial, f)
                    }
                }
            };
            match kind {
                RootsRequest::Initial => return fetch.await,
                RootsRequest::More => {
                    tracing::debug!("waiting for next-page fetch before reloading first page");
                    // Its outcome belongs to its own callers
                    let _ = fetch.await;
                }
            }
        }
    }

    /// Fetches the next page of root comments. Does nothing if the server said there are
    /// no more, and joins any root fetch already in flight.
    pub async fn load_more_roots(&self) -> FetchResult {
        let fetch = {
            let mut state = self.state.lock();
            let post = state.subject.clone().ok_or(Error::NoSubject)?;
            if let Some((_, f)) = state.roots_in_flight.clone() {
                tracing::debug!(?post, "joining root fetch in flight");
                f
            } else if state.phase == Phase::Empty {
                let req = RootCursor::initial_request(&self.config);
                let f = self.fetch_roots(post, RootsRequest::Initial, req, state.epoch);
                state.phase = Phase::LoadingInitial;
                state.roots_in_flight = Some((RootsRequest::Initial, f.clone()));
                f
            } else if !state.cursor.has_more {
                return Ok(Vec::new());
            } else {
                let req = state.cursor.next_request(&self.config);
                let f = self.fetch_roots(post, RootsRequest::More, req, state.epoch);
                state.phase = Phase::LoadingMore;
                state.roots_in_flight = Some((RootsRequest::More, f.clone()));
                f
            }
        };
        fetch.await
    }

    /// Fetches all the replies to `parent`, once. Returns nothing if they were already
    /// loaded, and joins a fetch for the same parent already in flight.
    pub async fn load_nested_replies(&self, parent: &CommentId) -> FetchResult {
        let fetch = {
            let mut state = self.state.lock();
            if state.subject.is_none() {
                return Err(Error::NoSubject);
            }
            if state.nested_loaded.contains(parent) {
                return Ok(Vec::new());
            }
            match state.replies_in_flight.get(parent).cloned() {
                Some(f) => {
                    tracing::debug!(?parent, "joining replies fetch in flight");
                    f
                }
                None => {
                    let f = self.fetch_replies(parent.clone(), state.epoch);
                    state.replies_in_flight.insert(parent.clone(), f.clone());
                    f
                }
            }
        };
        fetch.await
    }

    /// Merges a comment that was just created, by us or by someone else. Never overwrites
    /// a comment that is already known.
    pub fn on_comment_created(&self, post: &PostId, comment: Comment) -> Result<Delivery, Error> {
        self.state.lock().merge_created(post, comment, &self.policy)
    }

    /// Applies counters pushed by the server, returning whether the comment is known
    pub fn on_counters_changed(
        &self,
        post: &PostId,
        id: &CommentId,
        likes_count: u64,
        replies_count: u64,
    ) -> bool {
        let mut state = self.state.lock();
        if state.subject.as_ref() != Some(post) {
            return false;
        }
        if !state.store.set_counters(id, likes_count, replies_count) {
            return false;
        }
        state.rebuild(&self.policy);
        true
    }

    /// Locally flips the current user's like on `id`, returning whether it is now liked
    pub fn toggle_like(&self, id: &CommentId) -> Result<bool, Error> {
        let mut state = self.state.lock();
        let liked = state
            .store
            .toggle_like(id)
            .ok_or_else(|| Error::UnknownComment(id.clone()))?;
        state.rebuild(&self.policy);
        Ok(liked)
    }

    /// Posts a new comment on the current post and merges what the server answered
    pub async fn submit(
        &self,
        content: String,
        parent: Option<CommentId>,
    ) -> Result<Arc<Comment>, Error> {
        let new = NewComment::new(content, parent);
        new.validate()?;
        let (post, epoch) = {
            let state = self.state.lock();
            let post = state.subject.clone().ok_or(Error::NoSubject)?;
            if let Some(parent) = &new.parent_comment_id {
                let depth = state
                    .store
                    .depth_of(parent)
                    .ok_or_else(|| Error::UnknownComment(parent.clone()))?;
                if depth >= self.policy.max_reply_depth {
                    return Err(Error::ReplyDepthExceeded {
                        parent: parent.clone(),
                        depth,
                    });
                }
            }
            (post, state.epoch)
        };

        let created = self
            .source
            .submit(&post, new)
            .await
            .map_err(Error::transport)?;

        let mut state = self.state.lock();
        if state.epoch != epoch {
            return Err(Error::SubjectChanged);
        }
        let id = created.id.clone();
        state.merge_created(&post, created, &self.policy)?;
        state
            .store
            .get(&id)
            .cloned()
            .ok_or(Error::UnknownComment(id))
    }

    /// Applies messages from the server's event feed until it ends
    pub async fn run_feed<S>(&self, feed: S)
    where
        S: Stream<Item = FeedMessage>,
    {
        pin_mut!(feed);
        while let Some(msg) = feed.next().await {
            match msg {
                FeedMessage::Pong => (),
                FeedMessage::NewComment { post_id, comment } => {
                    if let Err(err) = self.on_comment_created(&post_id, comment) {
                        tracing::warn!(%err, "ignoring comment from event feed");
                    }
                }
                FeedMessage::CountersChanged {
                    post_id,
                    comment_id,
                    likes_count,
                    replies_count,
                } => {
                    self.on_counters_changed(&post_id, &comment_id, likes_count, replies_count);
                }
            }
        }
        tracing::info!("event feed ended");
    }
}
