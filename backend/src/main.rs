mod classifier;
mod data;
mod routes;
mod viz;

use actix_cors::Cors;
use actix_web::{App, HttpServer, web};
use classifier::ClassifierModel;
use routes::configure_routes;
use std::env;
use std::path::Path;
use viz::PlotStore;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    dotenv::dotenv().ok();

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    }

    let model_path = env::var("MODEL_PATH").unwrap_or_else(|_| "model.json".to_string());
    let static_dir = env::var("STATIC_DIR").unwrap_or_else(|_| "static".to_string());

    // No fallback model and no lazy reload: a broken artifact stops the
    // process before it can accept a single request.
    let model = match ClassifierModel::load(Path::new(&model_path)) {
        Ok(model) => model,
        Err(e) => {
            log::error!("Failed to load model from '{}': {}", model_path, e);
            return Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Model loading failed: {e}"),
            ));
        }
    };
    log::info!(
        "Loaded classifier: features {:?}, classes {:?}",
        model.feature_names(),
        model.classes()
    );

    let plot_store = match PlotStore::new(static_dir.as_str()) {
        Ok(store) => store,
        Err(e) => {
            log::error!("Failed to prepare static directory '{}': {}", static_dir, e);
            return Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Static directory setup failed: {e}"),
            ));
        }
    };

    let model = web::Data::new(model);
    let plot_store = web::Data::new(plot_store);

    let port = env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    let bind_address = format!("0.0.0.0:{}", port);

    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
                    .max_age(3600),
            )
            .app_data(model.clone())
            .app_data(plot_store.clone())
            .configure(|cfg| configure_routes(cfg, static_dir.clone()))
    })
    .bind(&bind_address)?
    .run()
    .await
}
