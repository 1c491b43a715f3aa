use stability_bucket::{logger, Config, Pipeline};

#[actix_web::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dotenv_loaded = dotenv::dotenv().is_ok();

    logger::init()?;
    if dotenv_loaded {
        log::info!("✅ .env file loaded");
    } else {
        log::debug!("No .env file found, using process environment");
    }

    let config = Config::from_env();
    logger::log_config_info(&config);

    let pipeline = match Pipeline::from_config(&config) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            log::error!("❌ Failed to initialize pipeline: {}", e);
            return Err(e.into());
        }
    };

    stability_bucket::server::run(&config, pipeline).await?;
    Ok(())
}
