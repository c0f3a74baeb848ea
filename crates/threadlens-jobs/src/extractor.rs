//! Flattening of a nested comment tree into a bounded item list.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value as JsonValue;

use threadlens_core::{CommentItem, ThreadPayload};

use crate::fetcher::lenient_i64;

/// Bodies that mark a comment as deleted or removed.
const REMOVED_BODIES: &[&str] = &["[deleted]", "[removed]"];

/// Author used when the field is absent.
const MISSING_AUTHOR: &str = "[deleted]";

/// Output of [`flatten`].
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// Qualifying items in depth-first pre-order, truncated to `max_items`.
    pub items: Vec<CommentItem>,
    /// Qualifying items in the whole tree, before truncation.
    pub total_found: usize,
}

/// Flatten the comment listing in depth-first pre-order.
///
/// A node is visited before its replies and siblings keep upstream order.
/// Deleted, removed and empty comments are skipped together with their
/// replies. Placeholder nodes (anything but a comment) are skipped too. Traversal keeps an explicit stack, so
/// nesting depth does not consume call stack.
pub fn flatten(payload: &ThreadPayload, max_items: usize) -> Extraction {
    let mut items = Vec::new();
    let mut stack: Vec<std::slice::Iter<'_, JsonValue>> = Vec::new();

    if let Some(children) = listing_children(&payload.comments) {
        stack.push(children.iter());
    }

    while let Some(siblings) = stack.last_mut() {
        let Some(node) = siblings.next() else {
            stack.pop();
            continue;
        };
        if !is_comment(node) {
            continue;
        }
        let Some(data) = node.get("data") else {
            continue;
        };

        let Some(item) = comment_item(data) else {
            continue;
        };
        items.push(item);
        if let Some(replies) = data.get("replies").and_then(listing_children) {
            if !replies.is_empty() {
                stack.push(replies.iter());
            }
        }
    }

    let total_found = items.len();
    items.truncate(max_items);
    Extraction { items, total_found }
}

fn listing_children(listing: &JsonValue) -> Option<&Vec<JsonValue>> {
    listing.get("data")?.get("children")?.as_array()
}

fn is_comment(node: &JsonValue) -> bool {
    matches!(
        node.get("kind").and_then(JsonValue::as_str),
        Some("t1") | Some("comment")
    )
}

fn comment_item(data: &JsonValue) -> Option<CommentItem> {
    let body = data.get("body").and_then(JsonValue::as_str).unwrap_or_default();
    if body.is_empty() || REMOVED_BODIES.contains(&body) {
        return None;
    }

    Some(CommentItem {
        text: body.to_string(),
        author: data
            .get("author")
            .and_then(JsonValue::as_str)
            .unwrap_or(MISSING_AUTHOR)
            .to_string(),
        score: lenient_i64(data.get("score")),
        created_at: data
            .get("created_utc")
            .and_then(JsonValue::as_f64)
            .and_then(epoch_to_datetime),
        external_id: data
            .get("id")
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
            .to_string(),
    })
}

fn epoch_to_datetime(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.trunc() as i64;
    let nanos = ((secs - secs.trunc()) * 1e9) as u32;
    Utc.timestamp_opt(whole, nanos).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use threadlens_core::PostMetadata;

    fn comment(id: &str, body: &str, replies: Vec<JsonValue>) -> JsonValue {
        json!({
            "kind": "t1",
            "data": {
                "id": id,
                "body": body,
                "author": format!("user_{}", id),
                "score": 3,
                "created_utc": 1700000000.5,
                "replies": if replies.is_empty() {
                    json!("")
                } else {
                    json!({"kind": "Listing", "data": {"children": replies}})
                }
            }
        })
    }

    fn payload(children: Vec<JsonValue>) -> ThreadPayload {
        ThreadPayload {
            source_url: "https://www.reddit.com/r/x/comments/1/t".into(),
            post: PostMetadata::unknown(),
            comments: json!({"kind": "Listing", "data": {"children": children}}),
        }
    }

    fn ids(extraction: &Extraction) -> Vec<&str> {
        extraction
            .items
            .iter()
            .map(|i| i.external_id.as_str())
            .collect()
    }

    #[test]
    fn test_preorder_with_deleted_and_placeholder() {
        // A(B(C), D[deleted](E)), F, more: E goes with its deleted parent
        let tree = payload(vec![
            comment(
                "a",
                "first",
                vec![
                    comment("b", "second", vec![comment("c", "third", vec![])]),
                    comment("d", "[deleted]", vec![comment("e", "fourth", vec![])]),
                ],
            ),
            comment("f", "fifth", vec![]),
            json!({"kind": "more", "data": {"count": 40, "children": ["x", "y"]}}),
        ]);

        let extraction = flatten(&tree, 100);
        assert_eq!(ids(&extraction), vec!["a", "b", "c", "f"]);
        assert_eq!(extraction.total_found, 4);
    }

    #[test]
    fn test_truncation_keeps_total() {
        let tree = payload(vec![
            comment("a", "one", vec![comment("b", "two", vec![])]),
            comment("c", "three", vec![]),
        ]);
        let extraction = flatten(&tree, 2);
        assert_eq!(ids(&extraction), vec!["a", "b"]);
        assert_eq!(extraction.total_found, 3);
    }

    #[test]
    fn test_removed_and_empty_bodies_skipped() {
        let tree = payload(vec![
            comment("a", "[removed]", vec![]),
            comment("b", "", vec![comment("b1", "orphan", vec![])]),
            comment("c", "kept", vec![]),
        ]);
        assert_eq!(ids(&flatten(&tree, 10)), vec!["c"]);
    }

    #[test]
    fn test_whitespace_body_is_kept() {
        let tree = payload(vec![comment("a", "   ", vec![])]);
        let extraction = flatten(&tree, 10);
        assert_eq!(ids(&extraction), vec!["a"]);
    }

    #[test]
    fn test_deleted_parent_drops_subtree() {
        let tree = payload(vec![
            comment("d", "[deleted]", vec![comment("e", "reply", vec![])]),
            comment("f", "sibling", vec![]),
        ]);
        let extraction = flatten(&tree, 10);
        assert_eq!(ids(&extraction), vec!["f"]);
        assert_eq!(extraction.total_found, 1);
    }

    #[test]
    fn test_item_fields() {
        let tree = payload(vec![comment("a", "hello there", vec![])]);
        let extraction = flatten(&tree, 10);
        let item = &extraction.items[0];
        assert_eq!(item.text, "hello there");
        assert_eq!(item.author, "user_a");
        assert_eq!(item.score, 3);
        assert_eq!(
            item.created_at.map(|t| t.timestamp()),
            Some(1_700_000_000)
        );
    }

    #[test]
    fn test_missing_author_defaults() {
        let tree = payload(vec![json!({"kind": "t1", "data": {"body": "anon"}})]);
        let extraction = flatten(&tree, 10);
        let item = &extraction.items[0];
        assert_eq!(item.author, "[deleted]");
        assert_eq!(item.external_id, "");
        assert!(item.created_at.is_none());
    }

    #[test]
    fn test_missing_comment_listing() {
        let empty = ThreadPayload {
            source_url: "u".into(),
            post: PostMetadata::unknown(),
            comments: JsonValue::Null,
        };
        let extraction = flatten(&empty, 10);
        assert!(extraction.items.is_empty());
        assert_eq!(extraction.total_found, 0);
    }

    #[test]
    fn test_deep_nesting() {
        let depth = 200;
        let mut node = comment(&depth.to_string(), "leaf", vec![]);
        for level in (0..depth).rev() {
            node = comment(&level.to_string(), "reply", vec![node]);
        }
        let extraction = flatten(&payload(vec![node]), usize::MAX);
        assert_eq!(extraction.total_found, depth + 1);
        assert_eq!(extraction.items[0].external_id, "0");
        assert_eq!(extraction.items[depth].text, "leaf");
    }
}
