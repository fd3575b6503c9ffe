use std::env;

use dotenv::dotenv;
use env_logger::Env;
use log::info;
use rocket::{
    figment::{
        providers::{Format, Toml},
        Figment, Profile,
    },
    Config,
};

#[rocket::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    // Initialize logger
    env_logger::init_from_env(Env::default().default_filter_or("info"));

    // Load config
    let mut figment = Figment::from(Config::default())
        .merge(Toml::file("App.toml").nested());

    if let Ok(dir) = env::var("IMAGE_CACHE_DIR") {
        figment = figment.merge(("image_cache_dir", dir));
    }

    if let Ok(user_agent) = env::var("IMAGE_USER_AGENT") {
        figment = figment.merge(("user_agent", user_agent));
    }

    figment = figment.select(Profile::from_env_or("APP_PROFILE", "default"));

    let server = imgcache::build(figment)?;
    info!("Configuration loaded successfully");

    server.launch().await?;
    Ok(())
}
