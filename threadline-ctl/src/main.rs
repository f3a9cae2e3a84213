use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use threadline_client::{
    api::{Comment, CommentId, CommentsResponse, PostId},
    CommentSource, CommentThread, Forest, PaginationConfig, ThreadPolicy, ThreadSession,
    ViewState,
};
use threadline_mock_server::{MockServer, MockSource};

mod http;

#[derive(structopt::StructOpt)]
struct Opt {
    /// Server to talk to, eg. `https://example.org`
    #[structopt(short, long, required_unless = "dump")]
    host: Option<String>,

    /// Read comments from a JSON dump instead of a server
    #[structopt(long, parse(from_os_str), conflicts_with = "host")]
    dump: Option<PathBuf>,

    /// JSON file with `pagination` and `policy` sections
    #[structopt(long, parse(from_os_str))]
    config: Option<PathBuf>,

    #[structopt(long)]
    initial_page_size: Option<usize>,

    #[structopt(long)]
    page_size: Option<usize>,

    /// Depth from which threads are collapsed
    #[structopt(long)]
    max_display_depth: Option<usize>,

    /// Depth from which comments cannot be replied to
    #[structopt(long)]
    max_reply_depth: Option<usize>,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(structopt::StructOpt)]
enum Command {
    /// Print the comment threads of a post
    Thread {
        post: String,

        /// Keep loading root comments until there are no more
        #[structopt(long)]
        all: bool,

        /// Fetch all replies and expand every thread
        #[structopt(long)]
        expand: bool,
    },

    /// Post a comment
    Comment {
        post: String,

        content: String,

        /// Comment to reply to
        #[structopt(long)]
        reply_to: Option<String>,
    },
}

#[derive(Default, serde::Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Config {
    pagination: PaginationConfig,
    policy: ThreadPolicy,
}

impl Opt {
    fn config(&self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            None => Config::default(),
            Some(path) => {
                let file = std::fs::read(path)
                    .with_context(|| format!("reading config file {path:?}"))?;
                serde_json::from_slice(&file)
                    .with_context(|| format!("parsing config file {path:?}"))?
            }
        };
        if let Some(s) = self.initial_page_size {
            config.pagination.initial_page_size = s;
        }
        if let Some(s) = self.page_size {
            config.pagination.subsequent_page_size = s;
        }
        if let Some(d) = self.max_display_depth {
            config.policy.max_display_depth = d;
        }
        if let Some(d) = self.max_reply_depth {
            config.policy.max_reply_depth = d;
        }
        anyhow::ensure!(
            config.pagination.initial_page_size > 0 && config.pagination.subsequent_page_size > 0,
            "page sizes must be positive"
        );
        Ok(config)
    }

    fn source(&self) -> anyhow::Result<Arc<dyn CommentSource>> {
        if let Some(path) = &self.dump {
            return Ok(Arc::new(MockSource::new(load_dump(path)?)));
        }
        let host = self.host.clone().context("either --host or --dump is required")?;
        Ok(Arc::new(http::HttpSource::new(host, token())))
    }
}

fn token() -> Option<String> {
    std::env::var("THREADLINE_TOKEN").ok()
}

fn load_dump(path: &Path) -> anyhow::Result<MockServer> {
    let file = std::fs::read(path).with_context(|| format!("reading dump {path:?}"))?;
    let dump: CommentsResponse =
        serde_json::from_slice(&file).with_context(|| format!("parsing dump {path:?}"))?;
    let mut server = MockServer::new();
    let mut loaded = 0;
    let mut todo = dump.normalize().comments;
    while let Some(mut c) = todo.pop() {
        for mut r in c.replies.take().unwrap_or_default() {
            if r.post_id.is_empty() {
                r.post_id = c.post_id.clone();
            }
            r.parent_comment_id.get_or_insert_with(|| c.id.clone());
            todo.push(r);
        }
        server.admin_add_comment(c);
        loaded += 1;
    }
    tracing::info!(comments = loaded, ?path, "loaded comment dump");
    Ok(server)
}

async fn load_all_roots(session: &ThreadSession) -> anyhow::Result<()> {
    while session.root_has_more() {
        session.load_more_roots().await?;
    }
    Ok(())
}

/// Fetches replies until no thread has unloaded replies left
async fn load_all_replies(session: &ThreadSession) -> anyhow::Result<()> {
    loop {
        let forest = session.forest();
        let missing = forest
            .iter()
            .filter(|t| t.has_unloaded_replies())
            .map(|t| t.id().clone())
            .collect::<Vec<_>>();
        if missing.is_empty() {
            return Ok(());
        }
        tracing::debug!(threads = missing.len(), "fetching unloaded replies");
        for id in missing {
            session.load_nested_replies(&id).await?;
        }
    }
}

enum Line<'a> {
    Thread(&'a CommentThread),
    Collapsed { depth: usize },
}

fn print_forest(forest: &Forest, view: &ViewState, policy: &ThreadPolicy) {
    let mut stack = forest.roots().iter().rev().map(Line::Thread).collect::<Vec<_>>();
    while let Some(line) = stack.pop() {
        let t = match line {
            Line::Thread(t) => t,
            Line::Collapsed { depth } => {
                println!("{}(thread continues, use --expand)", "    ".repeat(depth));
                continue;
            }
        };
        let indent = "    ".repeat(t.depth);
        let c = &t.comment;
        println!(
            "{indent}{} [{}] {} likes, {} replies{}",
            author_name(c),
            c.created_at.format("%Y-%m-%d %H:%M"),
            c.likes_count,
            c.replies_count,
            if t.can_reply(policy) { "" } else { ", closed" },
        );
        for line in c.content.lines() {
            println!("{indent}  {line}");
        }
        if t.has_unloaded_replies() {
            let unloaded = (c.replies_count as usize).saturating_sub(t.children.len());
            println!("{indent}  ({unloaded} more replies, use --expand)");
        }
        stack.extend(t.children.iter().rev().map(|child| match view.is_expanded(child) {
            true => Line::Thread(child),
            false => Line::Collapsed { depth: child.depth },
        }));
    }
}

fn author_name(c: &Comment) -> &str {
    match &c.author {
        Some(a) if !a.display_name.is_empty() => &a.display_name,
        Some(a) => &a.username,
        None => "unknown",
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let opt = <Opt as structopt::StructOpt>::from_args();
    let config = opt.config()?;
    let session = ThreadSession::new(opt.source()?, config.pagination, config.policy);

    match opt.cmd {
        Command::Thread { post, all, expand } => {
            session.open(PostId::new(post));
            session.load_initial_roots().await?;
            if all {
                load_all_roots(&session).await?;
            }
            let mut view = ViewState::new();
            if expand {
                load_all_replies(&session).await?;
                for t in session.forest().iter() {
                    if t.is_beyond_depth_limit {
                        view.toggle_expanded(t.id());
                    }
                }
            }
            let forest = session.forest();
            print_forest(&forest, &view, session.policy());
            match (session.root_has_more(), session.total_count()) {
                (true, Some(total)) => println!(
                    "({} of {total} comments shown, use --all)",
                    forest.roots().len()
                ),
                (true, None) => println!("(more comments available, use --all)"),
                (false, _) => (),
            }
        }
        Command::Comment {
            post,
            content,
            reply_to,
        } => {
            session.open(PostId::new(post));
            let parent = reply_to.map(CommentId::new);
            if parent.is_some() {
                // The parent's depth must be known before replying
                session.load_initial_roots().await?;
                load_all_roots(&session).await?;
                load_all_replies(&session).await?;
            }
            let created = session
                .submit(content, parent)
                .await
                .context("submitting comment")?;
            println!("{}", created.id);
        }
    }

    Ok(())
}
