use anyhow::Context;
use async_trait::async_trait;
use threadline_client::{
    api::{Comment, CommentId, CommentsResponse, NewComment, PageRequest, PostId, RootPage},
    CommentSource,
};

/// Shapes the server answers a comment submission with
#[derive(serde::Deserialize)]
#[serde(untagged)]
enum Created {
    Bare(Comment),
    Comment { comment: Comment },
    Data { data: Comment },
}

impl Created {
    fn into_comment(self) -> Comment {
        match self {
            Created::Bare(c) | Created::Comment { comment: c } | Created::Data { data: c } => c,
        }
    }
}

pub struct HttpSource {
    client: reqwest::Client,
    host: String,
    token: Option<String>,
}

impl HttpSource {
    pub fn new(host: String, token: Option<String>) -> HttpSource {
        HttpSource {
            client: reqwest::Client::new(),
            host: host.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let req = self
            .client
            .request(method, format!("{}/api/mongo/comments/{}", self.host, path));
        match &self.token {
            Some(tok) => req.bearer_auth(tok),
            None => req,
        }
    }
}

#[async_trait]
impl CommentSource for HttpSource {
    async fn fetch_roots(&self, post: &PostId, req: PageRequest) -> anyhow::Result<RootPage> {
        let res: CommentsResponse = self
            .request(reqwest::Method::GET, &format!("post/{post}"))
            .query(&[("page", req.page as usize), ("limit", req.page_size)])
            .send()
            .await
            .with_context(|| format!("fetching page {} of post {post}", req.page))?
            .error_for_status()?
            .json()
            .await
            .with_context(|| format!("parsing page {} of post {post}", req.page))?;
        Ok(res.normalize())
    }

    async fn fetch_replies(&self, parent: &CommentId) -> anyhow::Result<Vec<Comment>> {
        let res: CommentsResponse = self
            .request(reqwest::Method::GET, &format!("parent/{parent}"))
            .send()
            .await
            .with_context(|| format!("fetching replies to {parent}"))?
            .error_for_status()?
            .json()
            .await
            .with_context(|| format!("parsing replies to {parent}"))?;
        Ok(res.normalize().comments)
    }

    async fn submit(&self, post: &PostId, comment: NewComment) -> anyhow::Result<Comment> {
        anyhow::ensure!(
            self.token.is_some(),
            "posting a comment requires the THREADLINE_TOKEN environment variable"
        );
        let res: Created = self
            .request(reqwest::Method::POST, &format!("post/{post}"))
            .json(&comment)
            .send()
            .await
            .with_context(|| format!("submitting comment to post {post}"))?
            .error_for_status()?
            .json()
            .await
            .context("parsing submitted comment")?;
        Ok(res.into_comment())
    }
}
