use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Unchanged, ColumnTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder, Set,
};

use crate::entity::{article, comment, user};

/// A comment that passed moderation and is about to be stored.
#[derive(Clone, Debug, PartialEq)]
pub struct NewComment {
    pub article_id: i32,
    pub parent_comment_id: Option<i32>,
    pub user_id: i32,
    pub user_name: String,
    pub content: String,
    pub created: DateTime<Utc>,
    pub approved: bool,
    pub toxicity_score: Option<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CommentAuthor {
    pub user_id: i32,
    pub display_name: String,
}

/// Comment persistence. Lists come back oldest first.
#[async_trait]
pub trait CommentStore: Send + Sync {
    async fn insert_comment(&self, comment: NewComment) -> Result<comment::Model, DbErr>;
    async fn update_comment(&self, comment: comment::Model) -> Result<comment::Model, DbErr>;
    async fn delete_comment(&self, id: i32) -> Result<(), DbErr>;
    async fn get_comment_by_id(&self, id: i32) -> Result<Option<comment::Model>, DbErr>;
    async fn comments_for_article(&self, article_id: i32) -> Result<Vec<comment::Model>, DbErr>;
    async fn comments_by_author(&self, user_id: i32) -> Result<Vec<comment::Model>, DbErr>;
    async fn comments_on_articles_of(&self, owner_id: i32) -> Result<Vec<comment::Model>, DbErr>;
}

/// Article ownership and author identity lookups.
#[async_trait]
pub trait BlogDirectory: Send + Sync {
    async fn article_owner(&self, article_id: i32) -> Result<Option<i32>, DbErr>;
    async fn author_profile(&self, user_id: i32) -> Result<Option<CommentAuthor>, DbErr>;
}

#[derive(Clone)]
pub struct SeaOrmStore {
    db: DatabaseConnection,
}

impl SeaOrmStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CommentStore for SeaOrmStore {
    async fn insert_comment(&self, new: NewComment) -> Result<comment::Model, DbErr> {
        comment::ActiveModel {
            article_id: Set(new.article_id),
            parent_comment_id: Set(new.parent_comment_id),
            user_id: Set(new.user_id),
            user_name: Set(new.user_name),
            content: Set(new.content),
            created: Set(Some(new.created)),
            approved: Set(new.approved),
            toxicity_score: Set(new.toxicity_score),
            ..Default::default()
        }
        .insert(&self.db)
        .await
    }

    async fn update_comment(&self, model: comment::Model) -> Result<comment::Model, DbErr> {
        comment::ActiveModel {
            id: Unchanged(model.id),
            article_id: Set(model.article_id),
            parent_comment_id: Set(model.parent_comment_id),
            user_id: Set(model.user_id),
            user_name: Set(model.user_name),
            content: Set(model.content),
            created: Set(model.created),
            approved: Set(model.approved),
            toxicity_score: Set(model.toxicity_score),
        }
        .update(&self.db)
        .await
    }

    async fn delete_comment(&self, id: i32) -> Result<(), DbErr> {
        comment::Entity::delete_by_id(id).exec(&self.db).await?;
        Ok(())
    }

    async fn get_comment_by_id(&self, id: i32) -> Result<Option<comment::Model>, DbErr> {
        comment::Entity::find_by_id(id).one(&self.db).await
    }

    async fn comments_for_article(&self, article_id: i32) -> Result<Vec<comment::Model>, DbErr> {
        comment::Entity::find()
            .filter(comment::Column::ArticleId.eq(article_id))
            .order_by_asc(comment::Column::Created)
            .order_by_asc(comment::Column::Id)
            .all(&self.db)
            .await
    }

    async fn comments_by_author(&self, user_id: i32) -> Result<Vec<comment::Model>, DbErr> {
        comment::Entity::find()
            .filter(comment::Column::UserId.eq(user_id))
            .order_by_asc(comment::Column::Created)
            .order_by_asc(comment::Column::Id)
            .all(&self.db)
            .await
    }

    async fn comments_on_articles_of(&self, owner_id: i32) -> Result<Vec<comment::Model>, DbErr> {
        let article_ids = article::Entity::find()
            .filter(article::Column::UserId.eq(owner_id))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|a| a.id)
            .collect::<Vec<_>>();
        if article_ids.is_empty() {
            return Ok(Vec::new());
        }
        comment::Entity::find()
            .filter(comment::Column::ArticleId.is_in(article_ids))
            .order_by_asc(comment::Column::Created)
            .order_by_asc(comment::Column::Id)
            .all(&self.db)
            .await
    }
}

#[async_trait]
impl BlogDirectory for SeaOrmStore {
    async fn article_owner(&self, article_id: i32) -> Result<Option<i32>, DbErr> {
        Ok(article::Entity::find_by_id(article_id)
            .one(&self.db)
            .await?
            .map(|a| a.user_id))
    }

    async fn author_profile(&self, user_id: i32) -> Result<Option<CommentAuthor>, DbErr> {
        Ok(user::Entity::find_by_id(user_id)
            .one(&self.db)
            .await?
            .map(|u| CommentAuthor {
                user_id: u.id,
                display_name: u.display_name(),
            }))
    }
}
