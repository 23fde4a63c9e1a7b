mod auth;
mod comment_service;
mod config;
mod db;
mod entity;
mod error;
mod moderation;
mod response;
mod routes;
mod store;
mod thread;
mod toxicity;

use std::sync::Arc;

use actix_web::{middleware, web, App, HttpServer};
use comment_service::CommentService;
use config::AppConfig;
use db::connect_db;
use log::{info, warn};
use moderation::ModerationGate;
use response::json_error_handler;
use routes::comment;
use store::SeaOrmStore;
use toxicity::ToxicityClassifier;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();
    let config = AppConfig::from_env();
    let db = connect_db(&config).await;

    let classifier = ToxicityClassifier::from_config(&config.toxicity_config())
        .unwrap_or_else(|e| panic!("toxicity classifier init failed: {}", e));
    match classifier.model_name() {
        Some(model) => info!("toxicity model {} via {}", model, config.inference_host),
        None => warn!("HF_MODEL_NAME not set, every comment scores 0.0"),
    }
    let gate = ModerationGate::new(config.toxicity_threshold);
    info!("toxicity threshold {}", gate.threshold());

    let store = Arc::new(SeaOrmStore::new(db.clone()));
    let service = web::Data::new(CommentService::new(store.clone(), store, classifier, gate));
    let server_port = config.server_port;

    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(config.clone()))
            .app_data(web::Data::new(db.clone()))
            .app_data(service.clone())
            .app_data(web::JsonConfig::default().error_handler(json_error_handler))
            .wrap(middleware::Logger::default())
            .wrap(actix_web::middleware::from_fn(routes::cors::cors_handler))
            .service(web::scope("/api")
                .service(web::scope("/comment").configure(comment::config))
            )
    })
    .bind(("0.0.0.0", server_port))?;
    info!("server started at http://0.0.0.0:{}", server_port);
    server.run().await
}
