use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use threadline_client::{
    api::{Comment, CommentId, NewComment, PageRequest, PostId, RootPage},
    CommentSource, Error, PaginationConfig, Phase, ThreadPolicy, ThreadSession,
};
use threadline_mock_server::{MockServer, MockSource};

fn post() -> PostId {
    PostId::new("post")
}

fn seeded(roots: usize, replies: usize) -> (MockSource, ThreadSession) {
    let mut server = MockServer::new();
    server.test_seed_post(&post(), roots, replies);
    let source = MockSource::new(server);
    let session = ThreadSession::new(
        source.clone(),
        PaginationConfig::default(),
        ThreadPolicy::default(),
    );
    session.open(post());
    (source, session)
}

/// Answers root fetches with pre-recorded pages, in order
struct Scripted {
    pages: Mutex<VecDeque<RootPage>>,
    requests: Mutex<Vec<PageRequest>>,
    replies: AtomicUsize,
}

impl Scripted {
    fn new(pages: Vec<RootPage>) -> Scripted {
        Scripted {
            pages: Mutex::new(pages.into()),
            requests: Mutex::new(Vec::new()),
            replies: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CommentSource for Scripted {
    async fn fetch_roots(&self, _post: &PostId, req: PageRequest) -> anyhow::Result<RootPage> {
        self.requests.lock().unwrap().push(req);
        Ok(self.pages.lock().unwrap().pop_front().unwrap_or_default())
    }

    async fn fetch_replies(&self, _parent: &CommentId) -> anyhow::Result<Vec<Comment>> {
        self.replies.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    }

    async fn submit(&self, _post: &PostId, _comment: NewComment) -> anyhow::Result<Comment> {
        anyhow::bail!("scripted source does not accept comments")
    }
}

fn root(i: usize) -> Comment {
    Comment::new(
        CommentId(format!("c{i:02}")),
        post(),
        None,
        format!("comment {i}"),
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap() + Duration::minutes(i as i64),
    )
}

/// Pages by page number like the real endpoint, with a total count but no `hasMore` flag
struct PageNumbered {
    roots: Vec<Comment>,
}

#[async_trait]
impl CommentSource for PageNumbered {
    async fn fetch_roots(&self, _post: &PostId, req: PageRequest) -> anyhow::Result<RootPage> {
        let skip = (req.page as usize - 1) * req.page_size;
        Ok(RootPage {
            comments: self.roots.iter().skip(skip).take(req.page_size).cloned().collect(),
            has_more: None,
            total_count: Some(self.roots.len() as u64),
        })
    }

    async fn fetch_replies(&self, _parent: &CommentId) -> anyhow::Result<Vec<Comment>> {
        Ok(Vec::new())
    }

    async fn submit(&self, _post: &PostId, _comment: NewComment) -> anyhow::Result<Comment> {
        anyhow::bail!("page-numbered source does not accept comments")
    }
}

#[tokio::test]
async fn overlapping_pages_are_deduplicated() {
    let source = Arc::new(Scripted::new(vec![
        RootPage {
            comments: (0..15).map(root).collect(),
            has_more: Some(true),
            total_count: None,
        },
        RootPage {
            comments: (13..23).map(root).collect(),
            has_more: Some(false),
            total_count: None,
        },
    ]));
    let session = ThreadSession::new(
        source.clone(),
        PaginationConfig::default(),
        ThreadPolicy::default(),
    );
    session.open(post());

    assert_eq!(session.load_initial_roots().await.unwrap().len(), 15);
    assert!(session.root_has_more());
    session.load_more_roots().await.unwrap();

    assert_eq!(session.comments().len(), 23);
    assert_eq!(session.forest().roots().len(), 23);
    assert!(!session.root_has_more());
    assert_eq!(session.phase(), Phase::Ready);

    // Exhausted: no more requests go out
    assert!(session.load_more_roots().await.unwrap().is_empty());
    let requests = source.requests.lock().unwrap().clone();
    assert_eq!(
        requests,
        vec![
            PageRequest {
                page: 1,
                page_size: 15,
                offset: 0
            },
            PageRequest {
                page: 2,
                page_size: 10,
                offset: 15
            },
        ]
    );
}

#[tokio::test]
async fn ordering_follows_creation_time_not_arrival() {
    let mut late = root(0);
    late.id = CommentId::new("late");
    late.created_at = root(20).created_at;
    let source = Scripted::new(vec![
        RootPage {
            comments: vec![late, root(1)],
            has_more: Some(true),
            total_count: None,
        },
        RootPage {
            comments: vec![root(5)],
            has_more: Some(false),
            total_count: None,
        },
    ]);
    let session = ThreadSession::new(source, PaginationConfig::default(), ThreadPolicy::default());
    session.open(post());
    session.load_initial_roots().await.unwrap();
    session.load_more_roots().await.unwrap();

    let ids = session
        .forest()
        .roots()
        .iter()
        .map(|t| t.id().to_string())
        .collect::<Vec<_>>();
    assert_eq!(ids, vec!["c01", "c05", "late"]);
}

#[tokio::test]
async fn pages_through_the_mock_server() {
    let (source, session) = seeded(32, 0);
    assert_eq!(session.phase(), Phase::Empty);
    session.load_initial_roots().await.unwrap();
    assert_eq!(session.comments().len(), 15);
    assert_eq!(session.total_count(), Some(32));

    while session.root_has_more() {
        session.load_more_roots().await.unwrap();
    }
    assert_eq!(session.comments().len(), 32);
    assert!(source.root_fetches() >= 3);
    for t in session.forest().iter() {
        assert_eq!(t.depth, 0);
    }
}

#[tokio::test]
async fn page_numbers_with_changing_sizes_reach_the_last_root() {
    let session = ThreadSession::new(
        PageNumbered {
            roots: (0..22).map(root).collect(),
        },
        PaginationConfig::default(),
        ThreadPolicy::default(),
    );
    session.open(post());

    session.load_initial_roots().await.unwrap();
    let mut pages = 1;
    while session.root_has_more() {
        session.load_more_roots().await.unwrap();
        pages += 1;
        assert!(pages <= 5, "pagination never ends");
    }

    // Page 2 of size 10 repeats c10 to c14, so more comments are received than exist
    assert_eq!(pages, 3);
    assert_eq!(session.total_count(), Some(22));
    assert!(session.cursor().fetched > 22);
    assert_eq!(session.comments().len(), 22);
    assert!(session.store().contains(&CommentId::new("c21")));
}

#[tokio::test]
async fn load_more_before_initial_acts_as_initial() {
    let (source, session) = seeded(20, 0);
    let got = session.load_more_roots().await.unwrap();
    assert_eq!(got.len(), 15);
    assert_eq!(source.root_fetches(), 1);
    assert_eq!(session.cursor().next_page, 2);
}

#[tokio::test]
async fn nothing_to_load_without_a_post() {
    let (source, session) = seeded(20, 0);
    session.close();
    assert!(matches!(session.load_initial_roots().await, Err(Error::NoSubject)));
    assert!(matches!(session.load_more_roots().await, Err(Error::NoSubject)));
    assert!(matches!(
        session.load_nested_replies(&CommentId::new("x")).await,
        Err(Error::NoSubject)
    ));
    assert_eq!(source.root_fetches(), 0);
}

#[tokio::test]
async fn concurrent_load_more_is_single_flight() {
    let (source, session) = seeded(40, 0);
    session.load_initial_roots().await.unwrap();
    assert_eq!(source.root_fetches(), 1);

    source.pause();
    let (a, b, ()) = tokio::join!(session.load_more_roots(), session.load_more_roots(), async {
        while source.root_fetches() < 2 {
            tokio::task::yield_now().await;
        }
        tokio::task::yield_now().await;
        assert_eq!(session.phase(), Phase::LoadingMore);
        source.resume();
    });

    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a.len(), 10);
    assert_eq!(a, b);
    assert_eq!(source.root_fetches(), 2);
    assert_eq!(session.comments().len(), 25);
    assert_eq!(session.cursor().next_page, 3);
}

#[tokio::test]
async fn initial_load_does_not_join_a_next_page_fetch() {
    let (source, session) = seeded(40, 0);
    session.load_initial_roots().await.unwrap();

    source.pause();
    let (more, initial, ()) = tokio::join!(
        session.load_more_roots(),
        session.load_initial_roots(),
        async {
            while source.root_fetches() < 2 {
                tokio::task::yield_now().await;
            }
            source.resume();
        }
    );

    let more = more.unwrap();
    assert_eq!(more.len(), 10);
    assert_eq!(more[0].id, CommentId::new("post-015"));
    let initial = initial.unwrap();
    assert_eq!(initial.len(), 15);
    assert_eq!(initial[0].id, CommentId::new("post-000"));
    assert_eq!(source.root_fetches(), 3);

    // The first page was fetched last, so the cursor points right after it
    let cursor = session.cursor();
    assert_eq!(cursor.next_page, 2);
    assert_eq!(cursor.fetched, 15);
    assert!(cursor.has_more);
    assert_eq!(session.comments().len(), 25);
    assert_eq!(session.phase(), Phase::Ready);
}

#[tokio::test]
async fn stale_page_is_dropped_after_switching_post() {
    let mut server = MockServer::new();
    server.test_seed_post(&post(), 20, 0);
    server.test_seed_post(&PostId::new("other"), 5, 0);
    let source = MockSource::new(server);
    let session = ThreadSession::new(
        source.clone(),
        PaginationConfig::default(),
        ThreadPolicy::default(),
    );
    session.open(post());
    let epoch = session.epoch();

    source.pause();
    let (res, ()) = tokio::join!(session.load_initial_roots(), async {
        while source.root_fetches() < 1 {
            tokio::task::yield_now().await;
        }
        session.open(PostId::new("other"));
        source.resume();
    });

    assert!(matches!(res, Err(Error::SubjectChanged)));
    assert!(session.epoch() > epoch);
    assert_eq!(session.subject(), Some(PostId::new("other")));
    assert!(session.comments().is_empty());
    assert!(session.forest().is_empty());
    assert_eq!(session.phase(), Phase::Empty);
    assert_eq!(session.cursor().next_page, 1);

    // The new post loads on its own, without joining the stale fetch
    session.load_initial_roots().await.unwrap();
    assert_eq!(source.root_fetches(), 2);
    assert_eq!(session.comments().len(), 5);
    assert!(session
        .comments()
        .iter()
        .all(|c| c.post_id == PostId::new("other")));
}

#[tokio::test]
async fn transport_failure_leaves_cursor_untouched() {
    let (source, session) = seeded(30, 0);
    session.load_initial_roots().await.unwrap();
    let cursor = session.cursor();

    source.fail_next(1);
    let err = session.load_more_roots().await.unwrap_err();
    assert!(matches!(err, Error::Transport(_)));
    assert!(err.is_retryable());
    assert_eq!(session.cursor(), cursor);
    assert_eq!(session.comments().len(), 15);
    assert_eq!(session.phase(), Phase::Ready);

    // Retrying asks for the same page again
    session.load_more_roots().await.unwrap();
    assert_eq!(session.comments().len(), 25);
    assert_eq!(session.cursor().next_page, cursor.next_page + 1);
}

#[tokio::test]
async fn failed_initial_load_can_be_retried() {
    let (source, session) = seeded(30, 0);
    source.fail_next(1);
    assert!(session.load_initial_roots().await.is_err());
    assert_eq!(session.phase(), Phase::Empty);
    assert!(session.comments().is_empty());

    session.load_more_roots().await.unwrap();
    assert_eq!(session.comments().len(), 15);
    assert_eq!(source.root_fetches(), 2);
}

#[tokio::test]
async fn nested_replies_are_fetched_once() {
    let (source, session) = seeded(3, 4);
    session.load_initial_roots().await.unwrap();
    let parent = CommentId::new("post-000");
    assert!(session.forest().find(&parent).unwrap().has_unloaded_replies());

    let (a, b) = tokio::join!(
        session.load_nested_replies(&parent),
        session.load_nested_replies(&parent)
    );
    assert_eq!(a.unwrap().len(), 4);
    assert_eq!(b.unwrap().len(), 4);
    assert_eq!(source.reply_fetches(), 1);
    assert!(session.is_nested_loaded(&parent));

    assert!(session.load_nested_replies(&parent).await.unwrap().is_empty());
    assert_eq!(source.reply_fetches(), 1);

    let forest = session.forest();
    let thread = forest.find(&parent).unwrap();
    assert!(thread.replies_loaded);
    assert!(!thread.has_unloaded_replies());
    assert_eq!(thread.children.len(), 4);
    assert!(thread.children.iter().all(|c| c.depth == 1));
}

#[tokio::test]
async fn empty_replies_still_count_as_loaded() {
    let source = Scripted::new(vec![RootPage {
        comments: vec![root(0)],
        has_more: Some(false),
        total_count: None,
    }]);
    let session = ThreadSession::new(source, PaginationConfig::default(), ThreadPolicy::default());
    session.open(post());
    session.load_initial_roots().await.unwrap();
    let id = CommentId::new("c00");
    assert!(session.load_nested_replies(&id).await.unwrap().is_empty());
    assert!(session.is_nested_loaded(&id));
    assert!(session.forest().find(&id).unwrap().replies_loaded);
}

#[tokio::test]
async fn failed_reply_fetch_is_not_marked_loaded() {
    let (source, session) = seeded(1, 2);
    session.load_initial_roots().await.unwrap();
    let parent = CommentId::new("post-000");

    source.fail_next(1);
    assert!(session.load_nested_replies(&parent).await.is_err());
    assert!(!session.is_nested_loaded(&parent));

    assert_eq!(session.load_nested_replies(&parent).await.unwrap().len(), 2);
    assert_eq!(source.reply_fetches(), 2);
}
