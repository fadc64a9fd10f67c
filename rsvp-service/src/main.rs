use lambda_http::{run, Error};
use log::info;

mod error;
mod handlers;
mod models;
mod routes;
mod state;

#[cfg(test)]
mod tests;

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    info!("Starting rsvp service");

    let app = routes::create_router().await;
    run(app).await
}
