use std::collections::HashMap;

use log::debug;

use crate::entity::comment;

/// A root comment and its direct replies. Replies never carry replies.
#[derive(Clone, Debug, PartialEq)]
pub struct CommentThread {
    pub root: comment::Model,
    pub replies: Vec<comment::Model>,
}

/// Groups one article's comments into root threads.
///
/// Input order is kept for both roots and replies. Replies whose parent is not
/// a root in `comments` are dropped.
pub fn build_threads(comments: Vec<comment::Model>) -> Vec<CommentThread> {
    let total = comments.len();
    let mut roots = Vec::new();
    let mut replies_by_parent: HashMap<i32, Vec<comment::Model>> = HashMap::new();

    for c in comments {
        match c.parent_comment_id {
            None => roots.push(c),
            Some(parent_id) => replies_by_parent.entry(parent_id).or_default().push(c),
        }
    }

    let threads = roots
        .into_iter()
        .map(|root| {
            let replies = replies_by_parent.remove(&root.id).unwrap_or_default();
            CommentThread { root, replies }
        })
        .collect::<Vec<_>>();

    let orphaned: usize = replies_by_parent.values().map(Vec::len).sum();
    if orphaned > 0 {
        debug!("dropped {} orphaned replies out of {} comments", orphaned, total);
    }
    threads
}
