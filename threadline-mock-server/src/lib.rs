use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use futures::channel::mpsc;
use threadline_client::{
    api::{
        self, Author, Comment, CommentId, FeedMessage, NewComment, PageRequest, PostId, RootPage,
        UserId,
    },
    CommentSource,
};
use tokio::sync::{watch, Mutex};

/// In-memory stand-in for the comment API
pub struct MockServer {
    posts: BTreeMap<PostId, Vec<Comment>>,
    feeds: Vec<mpsc::UnboundedSender<FeedMessage>>,
}

impl MockServer {
    pub fn new() -> MockServer {
        MockServer {
            posts: BTreeMap::new(),
            feeds: Vec::new(),
        }
    }

    fn relay(&mut self, msg: FeedMessage) {
        self.feeds
            .retain(|f| matches!(f.unbounded_send(msg.clone()), Ok(())));
    }

    fn find_mut(&mut self, id: &CommentId) -> Option<&mut Comment> {
        self.posts
            .values_mut()
            .flat_map(|cs| cs.iter_mut())
            .find(|c| c.id == *id)
    }

    /// Inserts a comment as-is, counters included, without notifying anyone
    pub fn admin_add_comment(&mut self, c: Comment) {
        self.posts.entry(c.post_id.clone()).or_default().push(c);
    }

    /// Inserts a comment and counts it in its parent's replies
    fn insert(&mut self, c: Comment) {
        if let Some(parent) = &c.parent_comment_id {
            let parent = parent.clone();
            if let Some(p) = self.find_mut(&parent) {
                p.replies_count += 1;
            }
        }
        self.admin_add_comment(c);
    }

    /// Fills `post` with `roots` root comments, each with `replies` direct replies.
    ///
    /// Root `i` is `"{post}-{i:03}"` and its replies `"{post}-{i:03}-{j:03}"`. Root `i` is
    /// posted `i` minutes after the first one, and reply `j` follows its root by `j + 1`
    /// seconds.
    pub fn test_seed_post(&mut self, post: &PostId, roots: usize, replies: usize) {
        let base = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        for i in 0..roots {
            let root_id = CommentId(format!("{post}-{i:03}"));
            let root_time = base + Duration::minutes(i as i64);
            self.insert(Comment::new(
                root_id.clone(),
                post.clone(),
                None,
                format!("root comment {i}"),
                root_time,
            ));
            for j in 0..replies {
                self.insert(Comment::new(
                    CommentId(format!("{post}-{i:03}-{j:03}")),
                    post.clone(),
                    Some(root_id.clone()),
                    format!("reply {j} to root comment {i}"),
                    root_time + Duration::seconds(j as i64 + 1),
                ));
            }
        }
    }

    pub fn test_num_comments(&self, post: &PostId) -> usize {
        self.posts.get(post).map(|cs| cs.len()).unwrap_or(0)
    }

    /// Pages by `req.offset`, so that pages of different sizes never overlap
    pub fn fetch_roots(&self, post: &PostId, req: PageRequest) -> RootPage {
        let mut roots = self
            .posts
            .get(post)
            .map(|cs| cs.iter().filter(|c| c.is_root()).collect::<Vec<_>>())
            .unwrap_or_default();
        roots.sort_unstable_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        let skip = req.offset;
        let comments = roots
            .iter()
            .skip(skip)
            .take(req.page_size)
            .map(|c| (*c).clone())
            .collect::<Vec<_>>();
        RootPage {
            has_more: Some(skip + comments.len() < roots.len()),
            total_count: Some(roots.len() as u64),
            comments,
        }
    }

    pub fn fetch_replies(&self, parent: &CommentId) -> Vec<Comment> {
        self.posts
            .values()
            .flat_map(|cs| cs.iter())
            .filter(|c| c.parent_comment_id.as_ref() == Some(parent))
            .cloned()
            .collect()
    }

    pub fn create_comment(
        &mut self,
        post: &PostId,
        author: Author,
        new: NewComment,
    ) -> Result<Comment, api::Error> {
        new.validate()?;
        if let Some(parent) = &new.parent_comment_id {
            let known = self
                .posts
                .get(post)
                .map(|cs| cs.iter().any(|c| c.id == *parent))
                .unwrap_or(false);
            if !known {
                return Err(api::Error::Unknown(format!("no comment {parent} on post {post}")));
            }
        }
        let mut c = Comment::new(
            CommentId::random(),
            post.clone(),
            new.parent_comment_id,
            new.content,
            Utc::now(),
        );
        c.author = Some(author);
        self.insert(c.clone());
        self.relay(FeedMessage::NewComment {
            post_id: post.clone(),
            comment: c.clone(),
        });
        if let Some(parent) = c.parent_comment_id.clone() {
            self.relay_counters(&parent);
        }
        Ok(c)
    }

    /// Adds a like from someone else, as if it happened on another client
    pub fn like(&mut self, id: &CommentId) -> Result<(), api::Error> {
        let c = self
            .find_mut(id)
            .ok_or_else(|| api::Error::Unknown(format!("no comment {id}")))?;
        c.likes_count += 1;
        self.relay_counters(id);
        Ok(())
    }

    fn relay_counters(&mut self, id: &CommentId) {
        let msg = self.find_mut(id).map(|c| FeedMessage::CountersChanged {
            post_id: c.post_id.clone(),
            comment_id: c.id.clone(),
            likes_count: c.likes_count,
            replies_count: c.replies_count,
        });
        if let Some(msg) = msg {
            self.relay(msg);
        }
    }

    pub fn event_feed(&mut self) -> mpsc::UnboundedReceiver<FeedMessage> {
        let (sender, receiver) = mpsc::unbounded();
        self.feeds.push(sender);
        receiver
    }
}

impl Default for MockServer {
    fn default() -> MockServer {
        MockServer::new()
    }
}

struct Controls {
    root_fetches: AtomicUsize,
    reply_fetches: AtomicUsize,
    submissions: AtomicUsize,
    failures: AtomicUsize,
    paused: watch::Sender<bool>,
}

/// `CommentSource` backed by a `MockServer`, that tests can pause, make fail and count
/// requests of
#[derive(Clone)]
pub struct MockSource {
    server: Arc<Mutex<MockServer>>,
    controls: Arc<Controls>,
    author: Author,
}

impl MockSource {
    pub fn new(server: MockServer) -> MockSource {
        let (paused, _) = watch::channel(false);
        MockSource {
            server: Arc::new(Mutex::new(server)),
            controls: Arc::new(Controls {
                root_fetches: AtomicUsize::new(0),
                reply_fetches: AtomicUsize::new(0),
                submissions: AtomicUsize::new(0),
                failures: AtomicUsize::new(0),
                paused,
            }),
            author: Author {
                id: UserId::new("me"),
                username: String::from("me"),
                display_name: String::from("Me"),
                avatar_url: None,
                is_verified: false,
            },
        }
    }

    pub fn server(&self) -> &Arc<Mutex<MockServer>> {
        &self.server
    }

    pub fn root_fetches(&self) -> usize {
        self.controls.root_fetches.load(Ordering::SeqCst)
    }

    pub fn reply_fetches(&self) -> usize {
        self.controls.reply_fetches.load(Ordering::SeqCst)
    }

    pub fn submissions(&self) -> usize {
        self.controls.submissions.load(Ordering::SeqCst)
    }

    /// Holds every response until `resume` is called. Requests are still counted.
    pub fn pause(&self) {
        self.controls.paused.send_replace(true);
    }

    pub fn resume(&self) {
        self.controls.paused.send_replace(false);
    }

    /// Makes the next `n` requests fail
    pub fn fail_next(&self, n: usize) {
        self.controls.failures.store(n, Ordering::SeqCst);
    }

    async fn respond(&self) -> anyhow::Result<()> {
        let mut paused = self.controls.paused.subscribe();
        loop {
            let is_paused = *paused.borrow_and_update();
            if !is_paused {
                break;
            }
            if paused.changed().await.is_err() {
                break;
            }
        }
        let fail = self
            .controls
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        match fail {
            true => Err(anyhow!("mock server was told to fail this request")),
            false => Ok(()),
        }
    }
}

#[async_trait]
impl CommentSource for MockSource {
    async fn fetch_roots(&self, post: &PostId, req: PageRequest) -> anyhow::Result<RootPage> {
        self.controls.root_fetches.fetch_add(1, Ordering::SeqCst);
        self.respond().await?;
        Ok(self.server.lock().await.fetch_roots(post, req))
    }

    async fn fetch_replies(&self, parent: &CommentId) -> anyhow::Result<Vec<Comment>> {
        self.controls.reply_fetches.fetch_add(1, Ordering::SeqCst);
        self.respond().await?;
        Ok(self.server.lock().await.fetch_replies(parent))
    }

    async fn submit(&self, post: &PostId, comment: NewComment) -> anyhow::Result<Comment> {
        self.controls.submissions.fetch_add(1, Ordering::SeqCst);
        self.respond().await?;
        let created = self
            .server
            .lock()
            .await
            .create_comment(post, self.author.clone(), comment)?;
        tracing::debug!(id = ?created.id, ?post, "mock server created comment");
        Ok(created)
    }
}
