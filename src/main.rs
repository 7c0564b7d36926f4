use actix_web::middleware::Logger;
use actix_web::web::Data;
use actix_web::{App, HttpServer};
use env_logger::Env;
use ripple::storage::{ImageStore, PlaceholderStore};
use std::sync::Arc;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    ripple::session::init();
    ripple::db::init_db(std::env::var("DATABASE_URL").expect("DATABASE_URL must be set.")).await;

    let store: Data<Arc<dyn ImageStore>> = Data::new(Arc::new(PlaceholderStore));
    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_owned());

    log::info!("listening on {}", bind_addr);

    HttpServer::new(move || {
        // Order of middleware IS IMPORTANT and is in REVERSE EXECUTION ORDER.
        App::new()
            .app_data(store.clone())
            .wrap(ripple::web::cors_headers())
            .wrap(Logger::new("%a %{User-Agent}i"))
            .configure(ripple::web::configure)
    })
    .bind(bind_addr)?
    .run()
    .await
}
