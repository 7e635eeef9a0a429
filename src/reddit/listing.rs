/// Listing Module
///
/// Wire shapes of Reddit listing responses and the comment-tree bookkeeping needed
/// to turn nested, partially collapsed trees into a flat breadth-first list.
use crate::models::{RawComment, RawPost};
use crate::source::PostPage;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{HashMap, HashSet, VecDeque};

const KIND_POST: &str = "t3";
const KIND_COMMENT: &str = "t1";
const KIND_MORE: &str = "more";

/// A `{ kind, data }` envelope. `data` stays untyped until the kind is known.
#[derive(Debug, Deserialize)]
pub struct Thing {
    pub kind: String,
    pub data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct Listing {
    pub data: ListingData,
}

#[derive(Debug, Deserialize)]
pub struct ListingData {
    #[serde(default)]
    pub after: Option<String>,
    #[serde(default)]
    pub children: Vec<Thing>,
}

/// Placeholder for collapsed replies
#[derive(Debug, Deserialize)]
struct MoreStub {
    #[serde(default)]
    children: Vec<String>,
}

/// Response of `/api/morechildren?api_type=json`
#[derive(Debug, Deserialize)]
pub struct MoreChildrenResponse {
    pub json: MoreChildrenBody,
}

#[derive(Debug, Deserialize)]
pub struct MoreChildrenBody {
    #[serde(default)]
    pub errors: Vec<serde_json::Value>,
    pub data: Option<MoreChildrenData>,
}

#[derive(Debug, Deserialize)]
pub struct MoreChildrenData {
    #[serde(default)]
    pub things: Vec<Thing>,
}

/// Convert a post listing into a page, ignoring anything that is not a submission
pub fn post_page(listing: Listing) -> Result<PostPage> {
    let mut posts = Vec::with_capacity(listing.data.children.len());

    for thing in listing.data.children {
        if thing.kind != KIND_POST {
            tracing::debug!("Skipping non-post thing of kind '{}' in listing", thing.kind);
            continue;
        }
        let post: RawPost = serde_json::from_value(thing.data).context("Malformed post in listing")?;
        posts.push(post);
    }

    Ok(PostPage { posts, after: listing.data.after })
}

/// Collects comments from a tree and from expansion responses, tracking which
/// collapsed ids still need to be fetched.
#[derive(Debug, Default)]
pub struct CommentForest {
    comments: Vec<RawComment>,
    seen: HashSet<String>,
    pending: VecDeque<String>,
    requested: HashSet<String>,
}

impl CommentForest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a batch of things. Replies nested under comments are walked recursively.
    pub fn absorb(&mut self, things: Vec<Thing>) -> Result<()> {
        for thing in things {
            match thing.kind.as_str() {
                KIND_COMMENT => {
                    let mut data = thing.data;
                    let replies = data.get_mut("replies").map(serde_json::Value::take);
                    let comment: RawComment = serde_json::from_value(data).context("Malformed comment")?;

                    if self.seen.insert(comment.id.clone()) {
                        self.comments.push(comment);
                    }

                    // Leaf comments carry an empty string instead of a listing
                    if let Some(replies @ serde_json::Value::Object(_)) = replies {
                        let listing: Listing = serde_json::from_value(replies).context("Malformed replies listing")?;
                        self.absorb(listing.data.children)?;
                    }
                }
                KIND_MORE => {
                    let stub: MoreStub = serde_json::from_value(thing.data).context("Malformed 'more' stub")?;
                    // "continue this thread" stubs have no ids and cannot be expanded here
                    for id in stub.children {
                        if !self.seen.contains(&id) && self.requested.insert(id.clone()) {
                            self.pending.push_back(id);
                        }
                    }
                }
                other => tracing::debug!("Skipping thing of kind '{}' in comment tree", other),
            }
        }

        Ok(())
    }

    /// Take up to `max` collapsed ids that still need expanding
    pub fn take_pending(&mut self, max: usize) -> Vec<String> {
        let n = max.min(self.pending.len());
        self.pending.drain(..n).collect()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.comments.len()
    }

    /// Order comments breadth first from the post and keep the first `limit`
    pub fn flatten(self, post_id: &str, limit: usize) -> Vec<RawComment> {
        let mut children: HashMap<&str, Vec<usize>> = HashMap::new();
        for (idx, comment) in self.comments.iter().enumerate() {
            children.entry(comment.parent_id.as_str()).or_default().push(idx);
        }

        let fullnames: Vec<String> = self.comments.iter().map(|c| format!("{}_{}", KIND_COMMENT, c.id)).collect();
        let root = format!("{}_{}", KIND_POST, post_id);

        let mut order = Vec::with_capacity(self.comments.len());
        let mut visited = vec![false; self.comments.len()];
        let mut queue: VecDeque<&str> = VecDeque::from([root.as_str()]);

        while let Some(parent) = queue.pop_front() {
            if let Some(kids) = children.get(parent) {
                for &idx in kids {
                    if !visited[idx] {
                        visited[idx] = true;
                        order.push(idx);
                        queue.push_back(fullnames[idx].as_str());
                    }
                }
            }
        }

        // Replies whose parent never arrived still count, after everything reachable
        order.extend((0..self.comments.len()).filter(|&idx| !visited[idx]));
        order.truncate(limit);

        let mut slots: Vec<Option<RawComment>> = self.comments.into_iter().map(Some).collect();
        order.into_iter().filter_map(|idx| slots[idx].take()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn comment(id: &str, parent: &str, replies: serde_json::Value) -> serde_json::Value {
        json!({
            "kind": "t1",
            "data": {
                "id": id,
                "author": "someone",
                "body": format!("body {}", id),
                "score": 1,
                "created_utc": 1700000000.0,
                "parent_id": parent,
                "is_submitter": false,
                "replies": replies
            }
        })
    }

    fn replies(children: Vec<serde_json::Value>) -> serde_json::Value {
        json!({ "kind": "Listing", "data": { "after": null, "children": children } })
    }

    fn things(value: serde_json::Value) -> Vec<Thing> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_post_page_skips_non_posts() {
        let listing: Listing = serde_json::from_value(json!({
            "kind": "Listing",
            "data": {
                "after": "t3_b",
                "children": [
                    { "kind": "t3", "data": {
                        "id": "a", "title": "A", "author": "x", "subreddit": "rust", "score": 1,
                        "upvote_ratio": 1.0, "num_comments": 0, "created_utc": 1700000000.0,
                        "selftext": "", "url": "https://example.com", "is_video": false
                    }},
                    { "kind": "t5", "data": { "display_name": "rust" } }
                ]
            }
        }))
        .unwrap();

        let page = post_page(listing).unwrap();
        assert_eq!(page.posts.len(), 1);
        assert_eq!(page.posts[0].id, "a");
        assert_eq!(page.after.as_deref(), Some("t3_b"));
    }

    #[test]
    fn test_flatten_is_breadth_first() {
        let tree = things(json!([
            comment("a", "t3_p", replies(vec![comment("a1", "t1_a", replies(vec![comment("a11", "t1_a1", json!(""))]))])),
            comment("b", "t3_p", replies(vec![comment("b1", "t1_b", json!(""))])),
        ]));

        let mut forest = CommentForest::new();
        forest.absorb(tree).unwrap();
        assert_eq!(forest.len(), 5);

        let ids: Vec<String> = forest.flatten("p", 10).into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["a", "b", "a1", "b1", "a11"]);
    }

    #[test]
    fn test_flatten_truncates_after_ordering() {
        let tree = things(json!([
            comment("a", "t3_p", replies(vec![comment("a1", "t1_a", json!(""))])),
            comment("b", "t3_p", json!("")),
        ]));

        let mut forest = CommentForest::new();
        forest.absorb(tree).unwrap();

        let ids: Vec<String> = forest.flatten("p", 2).into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_more_stubs_are_queued_once() {
        let tree = things(json!([
            comment("a", "t3_p", json!("")),
            { "kind": "more", "data": { "count": 3, "children": ["c", "d", "a"], "parent_id": "t3_p" } },
            { "kind": "more", "data": { "count": 0, "children": [], "parent_id": "t1_a" } },
        ]));

        let mut forest = CommentForest::new();
        forest.absorb(tree).unwrap();
        assert!(forest.has_pending());
        assert_eq!(forest.take_pending(1), vec!["c"]);
        assert_eq!(forest.take_pending(100), vec!["d"]);
        assert!(!forest.has_pending());

        // expansion brings back the collapsed comments flat
        forest.absorb(things(json!([comment("c", "t3_p", json!("")), comment("d", "t1_c", json!(""))]))).unwrap();
        let ids: Vec<String> = forest.flatten("p", 10).into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["a", "c", "d"]);
    }

    #[test]
    fn test_orphans_follow_reachable_comments() {
        let tree = things(json!([comment("x", "t1_missing", json!("")), comment("a", "t3_p", json!(""))]));

        let mut forest = CommentForest::new();
        forest.absorb(tree).unwrap();

        let ids: Vec<String> = forest.flatten("p", 10).into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["a", "x"]);
    }
}
