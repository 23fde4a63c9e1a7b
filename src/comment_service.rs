use std::sync::Arc;

use chrono::Utc;
use log::{debug, error, info};
use sea_orm::DbErr;

use crate::auth::AuthUser;
use crate::entity::comment;
use crate::error::AppError;
use crate::moderation::{Decision, ModerationGate};
use crate::store::{BlogDirectory, CommentStore, NewComment};
use crate::thread::{build_threads, CommentThread};
use crate::toxicity::ToxicityClassifier;

/// Where a comment was posted from. Each channel has its own approval policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmissionChannel {
    /// Classic form post; stored pending approval.
    WebForm,
    /// Signed-in AJAX post; stored approved.
    Ajax,
}

impl SubmissionChannel {
    pub fn approves_on_submit(self) -> bool {
        matches!(self, Self::Ajax)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SubmitOutcome {
    Stored(comment::Model),
    Rejected { score: f64 },
}

#[derive(Clone, Debug, Default)]
pub struct CommentDraft {
    pub article_id: i32,
    pub parent_comment_id: Option<i32>,
    pub content: Option<String>,
}

pub struct CommentService {
    store: Arc<dyn CommentStore>,
    directory: Arc<dyn BlogDirectory>,
    classifier: ToxicityClassifier,
    gate: ModerationGate,
}

impl CommentService {
    pub fn new(
        store: Arc<dyn CommentStore>,
        directory: Arc<dyn BlogDirectory>,
        classifier: ToxicityClassifier,
        gate: ModerationGate,
    ) -> Self {
        Self {
            store,
            directory,
            classifier,
            gate,
        }
    }

    pub async fn submit(
        &self,
        draft: CommentDraft,
        caller: &AuthUser,
        channel: SubmissionChannel,
    ) -> Result<SubmitOutcome, AppError> {
        let content = validated_text(draft.content.as_deref())?;
        self.directory
            .article_owner(draft.article_id)
            .await
            .map_err(storage_error)?
            .ok_or_else(|| AppError::fail("article not found"))?;
        let parent_comment_id = match draft.parent_comment_id {
            Some(parent_id) => Some(self.resolve_root(draft.article_id, parent_id).await?),
            None => None,
        };
        let author = self
            .directory
            .author_profile(caller.user_id)
            .await
            .map_err(storage_error)?
            .ok_or_else(|| AppError::fail("user not found"))?;

        let score = self.classifier.score(&content).await;
        if self.gate.decide(score) == Decision::Reject {
            info!(
                "comment by user {} on article {} rejected, toxicity {}",
                author.user_id, draft.article_id, score
            );
            return Ok(SubmitOutcome::Rejected { score });
        }

        let new = NewComment {
            article_id: draft.article_id,
            parent_comment_id,
            user_id: author.user_id,
            user_name: author.display_name,
            content,
            created: Utc::now(),
            approved: channel.approves_on_submit(),
            toxicity_score: Some(score),
        };
        let stored = self.store.insert_comment(new).await.map_err(|e| {
            error!("comment insert failed: {}", e);
            AppError::persistence_failure()
        })?;
        debug!("comment saved id={} channel={:?} toxicity={}", stored.id, channel, score);
        Ok(SubmitOutcome::Stored(stored))
    }

    /// Re-scores the new text; a rejected edit leaves the stored comment as is.
    pub async fn edit(
        &self,
        id: i32,
        content: Option<&str>,
        caller: &AuthUser,
    ) -> Result<SubmitOutcome, AppError> {
        let content = validated_text(content)?;
        let mut existing = self.find(id).await?;
        self.authorize(&existing, caller).await?;

        let score = self.classifier.score(&content).await;
        if self.gate.decide(score) == Decision::Reject {
            info!("edit of comment {} rejected, toxicity {}", id, score);
            return Ok(SubmitOutcome::Rejected { score });
        }

        existing.content = content;
        existing.created = Some(Utc::now());
        existing.approved = SubmissionChannel::WebForm.approves_on_submit();
        existing.toxicity_score = Some(score);
        let updated = self.store.update_comment(existing).await.map_err(|e| {
            error!("comment update failed id={}: {}", id, e);
            AppError::persistence_failure()
        })?;
        Ok(SubmitOutcome::Stored(updated))
    }

    pub async fn remove(&self, id: i32, caller: &AuthUser) -> Result<(), AppError> {
        let existing = self.find(id).await?;
        self.authorize(&existing, caller).await?;
        self.store.delete_comment(id).await.map_err(storage_error)
    }

    pub async fn approve(&self, id: i32, caller: &AuthUser) -> Result<comment::Model, AppError> {
        let mut existing = self.find(id).await?;
        self.authorize(&existing, caller).await?;
        if existing.approved {
            return Ok(existing);
        }
        existing.approved = true;
        self.store.update_comment(existing).await.map_err(|e| {
            error!("comment approve failed id={}: {}", id, e);
            AppError::persistence_failure()
        })
    }

    pub async fn find(&self, id: i32) -> Result<comment::Model, AppError> {
        self.store
            .get_comment_by_id(id)
            .await
            .map_err(storage_error)?
            .ok_or_else(|| AppError::fail("comment not found"))
    }

    pub async fn thread(&self, article_id: i32) -> Result<Vec<CommentThread>, AppError> {
        let comments = self
            .store
            .comments_for_article(article_id)
            .await
            .map_err(storage_error)?;
        let threads = build_threads(comments);
        debug!("article {} has {} comment threads", article_id, threads.len());
        Ok(threads)
    }

    pub async fn on_articles_of(&self, caller: &AuthUser) -> Result<Vec<comment::Model>, AppError> {
        self.store
            .comments_on_articles_of(caller.user_id)
            .await
            .map_err(storage_error)
    }

    pub async fn by_author(&self, author_id: i32) -> Result<Vec<comment::Model>, AppError> {
        self.store
            .comments_by_author(author_id)
            .await
            .map_err(storage_error)
    }

    /// Replies always hang off a root; a reply to a reply moves up to its root.
    async fn resolve_root(&self, article_id: i32, parent_id: i32) -> Result<i32, AppError> {
        let parent = self
            .store
            .get_comment_by_id(parent_id)
            .await
            .map_err(storage_error)?
            .ok_or_else(|| AppError::param_error("parent comment not found"))?;
        if parent.article_id != article_id {
            return Err(AppError::param_error("parent comment belongs to another article"));
        }
        Ok(parent.parent_comment_id.unwrap_or(parent.id))
    }

    async fn authorize(&self, target: &comment::Model, caller: &AuthUser) -> Result<(), AppError> {
        if caller.is_admin() {
            return Ok(());
        }
        let owner = self
            .directory
            .article_owner(target.article_id)
            .await
            .map_err(storage_error)?;
        if owner == Some(caller.user_id) {
            Ok(())
        } else {
            Err(AppError::fail("only the article owner can manage its comments"))
        }
    }
}

fn validated_text(content: Option<&str>) -> Result<String, AppError> {
    let text = content.map(str::trim).unwrap_or_default();
    if text.is_empty() {
        return Err(AppError::param_error("comment content must not be empty"));
    }
    Ok(text.to_string())
}

fn storage_error(e: DbErr) -> AppError {
    error!("comment storage failed: {}", e);
    AppError::system_exception()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::CommentAuthor;
    use crate::toxicity::{ClassifierError, InferenceBackend, ToxicityConfig};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    const OWNER: i32 = 1;
    const READER: i32 = 2;
    const ADMIN: i32 = 3;

    struct FixedScoreBackend {
        score: Option<f64>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl InferenceBackend for FixedScoreBackend {
        async fn infer(&self, _model: &str, _text: &str) -> Result<String, ClassifierError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.score {
                Some(score) => Ok(format!(
                    r#"[[{{"label":"toxic","score":{}}},{{"label":"neutral","score":0.0}}]]"#,
                    score
                )),
                None => Err(ClassifierError::Status(500)),
            }
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        rows: Mutex<Vec<comment::Model>>,
        inserts: AtomicUsize,
        updates: AtomicUsize,
        fail_writes: bool,
    }

    impl MemoryStore {
        fn seed(&self, model: comment::Model) {
            self.rows.lock().unwrap().push(model);
        }

        fn row(&self, id: i32) -> Option<comment::Model> {
            self.rows.lock().unwrap().iter().find(|c| c.id == id).cloned()
        }
    }

    #[async_trait]
    impl CommentStore for MemoryStore {
        async fn insert_comment(&self, new: NewComment) -> Result<comment::Model, DbErr> {
            self.inserts.fetch_add(1, Ordering::SeqCst);
            if self.fail_writes {
                return Err(DbErr::Custom("disk full".to_string()));
            }
            let mut rows = self.rows.lock().unwrap();
            let model = comment::Model {
                id: rows.iter().map(|c| c.id).max().unwrap_or(0) + 1,
                article_id: new.article_id,
                parent_comment_id: new.parent_comment_id,
                user_id: new.user_id,
                user_name: new.user_name,
                content: new.content,
                created: Some(new.created),
                approved: new.approved,
                toxicity_score: new.toxicity_score,
            };
            rows.push(model.clone());
            Ok(model)
        }

        async fn update_comment(&self, model: comment::Model) -> Result<comment::Model, DbErr> {
            self.updates.fetch_add(1, Ordering::SeqCst);
            if self.fail_writes {
                return Err(DbErr::Custom("disk full".to_string()));
            }
            let mut rows = self.rows.lock().unwrap();
            let slot = rows
                .iter_mut()
                .find(|c| c.id == model.id)
                .ok_or(DbErr::RecordNotUpdated)?;
            *slot = model.clone();
            Ok(model)
        }

        async fn delete_comment(&self, id: i32) -> Result<(), DbErr> {
            self.rows.lock().unwrap().retain(|c| c.id != id);
            Ok(())
        }

        async fn get_comment_by_id(&self, id: i32) -> Result<Option<comment::Model>, DbErr> {
            Ok(self.row(id))
        }

        async fn comments_for_article(&self, article_id: i32) -> Result<Vec<comment::Model>, DbErr> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.article_id == article_id)
                .cloned()
                .collect())
        }

        async fn comments_by_author(&self, user_id: i32) -> Result<Vec<comment::Model>, DbErr> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.user_id == user_id)
                .cloned()
                .collect())
        }

        async fn comments_on_articles_of(&self, owner_id: i32) -> Result<Vec<comment::Model>, DbErr> {
            let owned = Directory::default().articles;
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .filter(|c| owned.get(&c.article_id) == Some(&owner_id))
                .cloned()
                .collect())
        }
    }

    struct Directory {
        articles: HashMap<i32, i32>,
    }

    impl Default for Directory {
        fn default() -> Self {
            // article 10 and 11 belong to OWNER
            Self {
                articles: HashMap::from([(10, OWNER), (11, OWNER)]),
            }
        }
    }

    #[async_trait]
    impl BlogDirectory for Directory {
        async fn article_owner(&self, article_id: i32) -> Result<Option<i32>, DbErr> {
            Ok(self.articles.get(&article_id).copied())
        }

        async fn author_profile(&self, user_id: i32) -> Result<Option<CommentAuthor>, DbErr> {
            let name = match user_id {
                OWNER => "Ayse Kaya",
                READER => "Mehmet Demir",
                ADMIN => "admin",
                _ => return Ok(None),
            };
            Ok(Some(CommentAuthor {
                user_id,
                display_name: name.to_string(),
            }))
        }
    }

    struct Harness {
        service: CommentService,
        store: Arc<MemoryStore>,
        backend: Arc<FixedScoreBackend>,
    }

    fn harness_with(score: Option<f64>, store: MemoryStore) -> Harness {
        let store = Arc::new(store);
        let backend = Arc::new(FixedScoreBackend {
            score,
            calls: AtomicUsize::new(0),
        });
        let config = ToxicityConfig {
            model_name: Some("toxic-bert".to_string()),
            timeout: Duration::from_secs(1),
            ..ToxicityConfig::default()
        };
        let classifier = ToxicityClassifier::new(&config, backend.clone());
        let service = CommentService::new(
            store.clone(),
            Arc::new(Directory::default()),
            classifier,
            ModerationGate::default(),
        );
        Harness {
            service,
            store,
            backend,
        }
    }

    fn harness(score: f64) -> Harness {
        harness_with(Some(score), MemoryStore::default())
    }

    fn user(user_id: i32) -> AuthUser {
        AuthUser {
            user_id,
            role: if user_id == ADMIN { Some("ADMIN".to_string()) } else { None },
        }
    }

    fn draft(text: &str) -> CommentDraft {
        CommentDraft {
            article_id: 10,
            parent_comment_id: None,
            content: Some(text.to_string()),
        }
    }

    fn existing(id: i32, parent: Option<i32>, article_id: i32) -> comment::Model {
        comment::Model {
            id,
            article_id,
            parent_comment_id: parent,
            user_id: READER,
            user_name: "Mehmet Demir".to_string(),
            content: "first!".to_string(),
            created: Some(Utc::now()),
            approved: true,
            toxicity_score: Some(0.0),
        }
    }

    #[actix_rt::test]
    async fn toxic_comment_is_rejected_without_insert() {
        let h = harness(0.3);
        let outcome = h
            .service
            .submit(draft("you are an idiot"), &user(READER), SubmissionChannel::Ajax)
            .await
            .unwrap();
        assert_eq!(outcome, SubmitOutcome::Rejected { score: 0.3 });
        assert_eq!(h.store.inserts.load(Ordering::SeqCst), 0);
        assert_eq!(h.backend.calls.load(Ordering::SeqCst), 1);
    }

    #[actix_rt::test]
    async fn clean_comment_is_stored_once_with_channel_policy() {
        for (channel, approved) in [(SubmissionChannel::WebForm, false), (SubmissionChannel::Ajax, true)] {
            let h = harness(0.0001);
            let before = Utc::now();
            let outcome = h
                .service
                .submit(draft("  great article, thanks  "), &user(READER), channel)
                .await
                .unwrap();
            let after = Utc::now();

            let SubmitOutcome::Stored(stored) = outcome else {
                panic!("expected stored comment for {:?}", channel);
            };
            assert_eq!(h.store.inserts.load(Ordering::SeqCst), 1);
            assert_eq!(stored.approved, approved);
            assert_eq!(stored.content, "great article, thanks");
            assert_eq!(stored.user_id, READER);
            assert_eq!(stored.user_name, "Mehmet Demir");
            assert_eq!(stored.toxicity_score, Some(0.0001));
            let created = stored.created.expect("timestamp");
            assert!(before <= created && created <= after);
        }
    }

    #[actix_rt::test]
    async fn empty_text_fails_before_scoring() {
        let h = harness(0.0);
        for content in [None, Some(""), Some("   ")] {
            let d = CommentDraft {
                content: content.map(str::to_string),
                ..draft("")
            };
            let err = h
                .service
                .submit(d, &user(READER), SubmissionChannel::WebForm)
                .await
                .unwrap_err();
            assert_eq!(err.code(), 1);
        }
        assert_eq!(h.backend.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.store.inserts.load(Ordering::SeqCst), 0);
    }

    #[actix_rt::test]
    async fn classifier_outage_lets_comment_through() {
        let h = harness_with(None, MemoryStore::default());
        let outcome = h
            .service
            .submit(draft("hello"), &user(READER), SubmissionChannel::Ajax)
            .await
            .unwrap();
        assert!(matches!(outcome, SubmitOutcome::Stored(ref c) if c.toxicity_score == Some(0.0)));
    }

    #[actix_rt::test]
    async fn persistence_failure_is_distinct_from_rejection() {
        let h = harness_with(
            Some(0.0),
            MemoryStore {
                fail_writes: true,
                ..MemoryStore::default()
            },
        );
        let err = h
            .service
            .submit(draft("hello"), &user(READER), SubmissionChannel::Ajax)
            .await
            .unwrap_err();
        assert_eq!(err.code(), AppError::persistence_failure().code());
        assert_ne!(err.code(), AppError::moderation_rejected("").code());
    }

    #[actix_rt::test]
    async fn unknown_article_fails_without_scoring() {
        let h = harness(0.0);
        let d = CommentDraft {
            article_id: 404,
            ..draft("hello")
        };
        let err = h
            .service
            .submit(d, &user(READER), SubmissionChannel::Ajax)
            .await
            .unwrap_err();
        assert_eq!(err.code(), 2);
        assert_eq!(h.backend.calls.load(Ordering::SeqCst), 0);
    }

    #[actix_rt::test]
    async fn reply_to_reply_is_anchored_on_root() {
        let h = harness(0.0);
        h.store.seed(existing(1, None, 10));
        h.store.seed(existing(2, Some(1), 10));

        let d = CommentDraft {
            parent_comment_id: Some(2),
            ..draft("agreed")
        };
        let outcome = h
            .service
            .submit(d, &user(OWNER), SubmissionChannel::Ajax)
            .await
            .unwrap();
        let SubmitOutcome::Stored(reply) = outcome else {
            panic!("reply should be stored");
        };
        assert_eq!(reply.parent_comment_id, Some(1));

        let threads = h.service.thread(10).await.unwrap();
        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].replies.iter().map(|r| r.id).collect::<Vec<_>>(), vec![2, reply.id]);
    }

    #[actix_rt::test]
    async fn reply_parent_must_exist_on_same_article() {
        let h = harness(0.0);
        h.store.seed(existing(1, None, 11));
        for parent in [1, 77] {
            let d = CommentDraft {
                parent_comment_id: Some(parent),
                ..draft("agreed")
            };
            let err = h
                .service
                .submit(d, &user(READER), SubmissionChannel::Ajax)
                .await
                .unwrap_err();
            assert_eq!(err.code(), 1);
        }
        assert_eq!(h.backend.calls.load(Ordering::SeqCst), 0);
    }

    #[actix_rt::test]
    async fn rejected_edit_leaves_comment_unchanged() {
        let h = harness(0.9);
        h.store.seed(existing(1, None, 10));
        let before = h.store.row(1).unwrap();
        let outcome = h.service.edit(1, Some("rude words"), &user(OWNER)).await.unwrap();
        assert_eq!(outcome, SubmitOutcome::Rejected { score: 0.9 });
        assert_eq!(h.store.row(1).unwrap(), before);
        assert_eq!(h.store.updates.load(Ordering::SeqCst), 0);
    }

    #[actix_rt::test]
    async fn accepted_edit_goes_back_to_pending() {
        let h = harness(0.001);
        h.store.seed(existing(1, None, 10));
        let outcome = h.service.edit(1, Some("kinder words"), &user(OWNER)).await.unwrap();
        let SubmitOutcome::Stored(updated) = outcome else {
            panic!("edit should be stored");
        };
        assert_eq!(updated.content, "kinder words");
        assert!(!updated.approved);
        assert_eq!(updated.toxicity_score, Some(0.001));
        assert_eq!(h.store.row(1).unwrap().content, "kinder words");
    }

    #[actix_rt::test]
    async fn only_owner_or_admin_manages_comments() {
        let h = harness(0.0);
        h.store.seed(existing(1, None, 10));
        h.store.seed(existing(2, None, 10));

        let err = h.service.remove(1, &user(READER)).await.unwrap_err();
        assert_eq!(err.code(), 2);
        let err = h.service.edit(1, Some("mine now"), &user(READER)).await.unwrap_err();
        assert_eq!(err.code(), 2);
        assert_eq!(h.backend.calls.load(Ordering::SeqCst), 0);

        h.service.remove(1, &user(OWNER)).await.unwrap();
        h.service.remove(2, &user(ADMIN)).await.unwrap();
        assert!(h.store.row(1).is_none() && h.store.row(2).is_none());
        assert_eq!(h.service.remove(1, &user(OWNER)).await.unwrap_err().code(), 2);
    }

    #[actix_rt::test]
    async fn approve_flips_pending_comment() {
        let h = harness(0.0);
        let mut pending = existing(1, None, 10);
        pending.approved = false;
        h.store.seed(pending);

        assert_eq!(h.service.approve(1, &user(READER)).await.unwrap_err().code(), 2);
        let approved = h.service.approve(1, &user(OWNER)).await.unwrap();
        assert!(approved.approved);
        assert!(h.store.row(1).unwrap().approved);
        assert_eq!(h.backend.calls.load(Ordering::SeqCst), 0);
    }

    #[actix_rt::test]
    async fn listings_by_author_and_owner() {
        let h = harness(0.0);
        h.store.seed(existing(1, None, 10));
        h.store.seed(existing(2, None, 12));
        let mut own = existing(3, None, 11);
        own.user_id = OWNER;
        h.store.seed(own);

        let mine = h.service.on_articles_of(&user(OWNER)).await.unwrap();
        assert_eq!(mine.iter().map(|c| c.id).collect::<Vec<_>>(), vec![1, 3]);
        let by_reader = h.service.by_author(READER).await.unwrap();
        assert_eq!(by_reader.iter().map(|c| c.id).collect::<Vec<_>>(), vec![1, 2]);
    }
}
