use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use std::io;

use crate::config::ServerConfig;
use crate::handlers;
use crate::state::AppState;

pub fn app_config(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(handlers::health::handler))
        .service(
            web::scope("/chat")
                .route("", web::post().to(handlers::chat::handler))
                .route("/sessions", web::get().to(handlers::sessions::list))
                .route(
                    "/sessions/{session_id}",
                    web::delete().to(handlers::sessions::delete),
                ),
        )
        .service(
            web::scope("/admin")
                .route("/sessions", web::get().to(handlers::admin::list_all))
                .route(
                    "/sessions/{user_id}/{session_id}",
                    web::delete().to(handlers::admin::delete),
                ),
        )
        .service(
            web::scope("/ws")
                .route("/chat", web::get().to(handlers::socket::handler))
                .route("/chat/{session_id}", web::get().to(handlers::socket::handler)),
        )
        .route("/hub/chat", web::get().to(handlers::hub::handler))
        .service(
            web::scope("/sse")
                .route("/chat/sessions", web::get().to(handlers::feed::sessions))
                .route(
                    "/chat/sessions/{session_id}",
                    web::get().to(handlers::feed::messages),
                ),
        );
}

pub async fn run_server(config: ServerConfig) -> io::Result<()> {
    log::info!(
        "Initializing server with provider: {:?}, base URL: {}",
        config.provider,
        config.llm_base_url
    );

    let state = AppState::from_config(&config)
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
    let state = web::Data::new(state);

    let bind = (config.bind_address.clone(), config.port);
    log::info!("Starting server on {}:{}", bind.0, bind.1);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Cors::permissive())
            .configure(app_config)
    })
    .bind(bind)?
    .run()
    .await
}
