use actix_web::{web, HttpResponse};
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::comment_service::{CommentDraft, CommentService, SubmissionChannel, SubmitOutcome};
use crate::entity::comment;
use crate::error::AppError;
use crate::response::ResponseDto;
use crate::thread::CommentThread;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/add").route(web::post().to(add)))
        .service(web::resource("/addAjax").route(web::post().to(add_ajax)))
        .service(web::resource("/addReplyAjax").route(web::post().to(add_reply_ajax)))
        .service(web::resource("/update").route(web::post().to(update)))
        .service(web::resource("/remove").route(web::post().to(remove)))
        .service(web::resource("/approve").route(web::post().to(approve)))
        .service(web::resource("/get").route(web::post().to(get)))
        .service(web::resource("/thread").route(web::post().to(thread)))
        .service(web::resource("/mine").route(web::post().to(mine)))
        .service(web::resource("/byAuthor").route(web::post().to(by_author)));
}

const COMMENT_REJECTED: &str = "This comment is not appropriate. Please use respectful, constructive language. Your comment was not published.";
const REPLY_REJECTED: &str = "This reply is not appropriate. Please use respectful, constructive language. Your reply was not published.";
const EDIT_REJECTED: &str = "This comment is not appropriate. Please use respectful, constructive language. Your comment was not updated.";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaveCommentRequest {
    article_id: i32,
    parent_comment_id: Option<i32>,
    content: Option<String>,
}

impl From<SaveCommentRequest> for CommentDraft {
    fn from(req: SaveCommentRequest) -> Self {
        CommentDraft {
            article_id: req.article_id,
            parent_comment_id: req.parent_comment_id,
            content: req.content,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateCommentRequest {
    id: i32,
    content: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThreadRequest {
    article_id: i32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ByAuthorRequest {
    author_id: Option<i32>,
}

#[derive(Deserialize)]
struct IdQuery {
    id: i32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CommentDto {
    id: i32,
    article_id: i32,
    parent_comment_id: Option<i32>,
    user_id: i32,
    user_name: String,
    content: String,
    created: Option<String>,
    approved: bool,
    toxicity_score: Option<f64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CommentThreadDto {
    #[serde(flatten)]
    root: CommentDto,
    replies: Vec<CommentDto>,
}

impl From<comment::Model> for CommentDto {
    fn from(c: comment::Model) -> Self {
        CommentDto {
            id: c.id,
            article_id: c.article_id,
            parent_comment_id: c.parent_comment_id,
            user_id: c.user_id,
            user_name: c.user_name,
            content: c.content,
            created: c.created.map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, false)),
            approved: c.approved,
            toxicity_score: c.toxicity_score,
        }
    }
}

impl From<CommentThread> for CommentThreadDto {
    fn from(t: CommentThread) -> Self {
        CommentThreadDto {
            root: t.root.into(),
            replies: t.replies.into_iter().map(CommentDto::from).collect(),
        }
    }
}

async fn add(
    service: web::Data<CommentService>,
    auth: AuthUser,
    payload: web::Json<SaveCommentRequest>,
) -> Result<HttpResponse, AppError> {
    let outcome = service
        .submit(payload.into_inner().into(), &auth, SubmissionChannel::WebForm)
        .await?;
    stored_or_rejected(outcome, COMMENT_REJECTED, "Your comment was received and is awaiting approval.")
}

async fn add_ajax(
    service: web::Data<CommentService>,
    auth: AuthUser,
    payload: web::Json<SaveCommentRequest>,
) -> Result<HttpResponse, AppError> {
    let outcome = service
        .submit(payload.into_inner().into(), &auth, SubmissionChannel::Ajax)
        .await?;
    stored_or_rejected(outcome, COMMENT_REJECTED, "Comment added.")
}

async fn add_reply_ajax(
    service: web::Data<CommentService>,
    auth: AuthUser,
    payload: web::Json<SaveCommentRequest>,
) -> Result<HttpResponse, AppError> {
    let draft: CommentDraft = payload.into_inner().into();
    if draft.parent_comment_id.is_none() {
        return Err(AppError::param_error("parentCommentId"));
    }
    let outcome = service.submit(draft, &auth, SubmissionChannel::Ajax).await?;
    stored_or_rejected(outcome, REPLY_REJECTED, "Reply added.")
}

async fn update(
    service: web::Data<CommentService>,
    auth: AuthUser,
    payload: web::Json<UpdateCommentRequest>,
) -> Result<HttpResponse, AppError> {
    let outcome = service
        .edit(payload.id, payload.content.as_deref(), &auth)
        .await?;
    stored_or_rejected(outcome, EDIT_REJECTED, "Comment updated.")
}

async fn remove(
    service: web::Data<CommentService>,
    auth: AuthUser,
    query: web::Query<IdQuery>,
) -> Result<HttpResponse, AppError> {
    service.remove(query.id, &auth).await?;
    Ok(HttpResponse::Ok().json(ResponseDto::<()>::success(None)))
}

async fn approve(
    service: web::Data<CommentService>,
    auth: AuthUser,
    query: web::Query<IdQuery>,
) -> Result<HttpResponse, AppError> {
    let approved = service.approve(query.id, &auth).await?;
    Ok(HttpResponse::Ok().json(ResponseDto::success(Some(CommentDto::from(approved)))))
}

async fn get(
    service: web::Data<CommentService>,
    query: web::Query<IdQuery>,
) -> Result<HttpResponse, AppError> {
    let found = service.find(query.id).await?;
    Ok(HttpResponse::Ok().json(ResponseDto::success(Some(CommentDto::from(found)))))
}

async fn thread(
    service: web::Data<CommentService>,
    payload: web::Json<ThreadRequest>,
) -> Result<HttpResponse, AppError> {
    let threads = service
        .thread(payload.article_id)
        .await?
        .into_iter()
        .map(CommentThreadDto::from)
        .collect::<Vec<_>>();
    Ok(HttpResponse::Ok().json(ResponseDto::success(Some(threads))))
}

async fn mine(
    service: web::Data<CommentService>,
    auth: AuthUser,
) -> Result<HttpResponse, AppError> {
    let list = to_dtos(service.on_articles_of(&auth).await?);
    Ok(HttpResponse::Ok().json(ResponseDto::success(Some(list))))
}

async fn by_author(
    service: web::Data<CommentService>,
    auth: AuthUser,
    payload: web::Json<ByAuthorRequest>,
) -> Result<HttpResponse, AppError> {
    let author_id = payload.author_id.unwrap_or(auth.user_id);
    let list = to_dtos(service.by_author(author_id).await?);
    Ok(HttpResponse::Ok().json(ResponseDto::success(Some(list))))
}

fn stored_or_rejected(
    outcome: SubmitOutcome,
    rejected_msg: &str,
    stored_msg: &str,
) -> Result<HttpResponse, AppError> {
    match outcome {
        SubmitOutcome::Stored(c) => Ok(HttpResponse::Ok().json(ResponseDto::success_with_msg(
            Some(CommentDto::from(c)),
            stored_msg,
        ))),
        SubmitOutcome::Rejected { .. } => Err(AppError::moderation_rejected(rejected_msg)),
    }
}

fn to_dtos(list: Vec<comment::Model>) -> Vec<CommentDto> {
    list.into_iter().map(CommentDto::from).collect()
}
