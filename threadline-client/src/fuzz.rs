#![cfg(test)]

use std::{collections::HashSet, sync::Arc};

use chrono::{Duration, TimeZone, Utc};

use crate::{
    api::{Comment, CommentId, PostId},
    thread, CommentStore, Forest, Merge, ThreadPolicy,
};

// (id, parent, minutes after the post, likes)
type Input = Vec<(u8, Option<u8>, u8, u8)>;

fn comments(input: &Input) -> Vec<Comment> {
    let base = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
    input
        .iter()
        .map(|(id, parent, minutes, likes)| {
            let mut c = Comment::new(
                CommentId::new(format!("c{}", id % 32)),
                PostId::stub(),
                parent.map(|p| CommentId::new(format!("c{}", p % 32))),
                format!("comment {id}"),
                base + Duration::minutes(i64::from(*minutes)),
            );
            c.likes_count = u64::from(*likes);
            c
        })
        .collect()
}

fn build(comments: &[Arc<Comment>]) -> Forest {
    thread::build(comments, &ThreadPolicy::default(), &HashSet::new())
}

#[test]
fn fuzz_upsert_is_idempotent() {
    bolero::check!()
        .with_type::<Input>()
        .cloned()
        .for_each(|input| {
            for merge in [Merge::Authoritative, Merge::InsertOnly] {
                let mut once = CommentStore::new();
                for c in comments(&input) {
                    once.upsert_one(c, merge);
                }
                let mut twice = once.clone();
                for c in comments(&input) {
                    twice.upsert_one(c.clone(), merge);
                    twice.upsert_one(c, merge);
                }
                assert_eq!(once, twice);
            }
        })
}

#[test]
fn fuzz_build_is_order_independent() {
    bolero::check!()
        .with_type::<Input>()
        .cloned()
        .for_each(|input| {
            let mut store = CommentStore::new();
            store.upsert_many(comments(&input), Merge::Authoritative);
            let mut all = store.all();
            let forest = build(&all);
            assert_eq!(forest, build(&all));
            all.reverse();
            assert_eq!(forest, build(&all));
            all.sort_unstable_by(|a, b| b.id.cmp(&a.id));
            assert_eq!(forest, build(&all));
        })
}

#[test]
fn fuzz_depths_follow_parent_chains() {
    bolero::check!()
        .with_type::<Input>()
        .cloned()
        .for_each(|input| {
            let mut store = CommentStore::new();
            store.upsert_many(comments(&input), Merge::Authoritative);
            let forest = build(&store.all());

            for root in forest.roots() {
                assert!(root.comment.is_root(), "orphan {:?} promoted to root", root.id());
            }
            let mut in_forest = 0;
            for t in forest.iter() {
                in_forest += 1;
                assert_eq!(Some(t.depth), store.depth_of(t.id()));
                assert_eq!(t.is_beyond_depth_limit, t.depth >= 3);
                for w in t.children.windows(2) {
                    let (a, b) = (&w[0].comment, &w[1].comment);
                    assert!((a.created_at, &a.id) < (b.created_at, &b.id));
                }
            }
            // Everything reachable from a root is in the forest, nothing else is
            let reachable = store
                .all()
                .iter()
                .filter(|c| store.depth_of(&c.id).is_some())
                .count();
            assert_eq!(in_forest, reachable);
        })
}
