use arena::{apply_env_overrides, get_settings, setup_logger, Application};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut settings = get_settings()?;
    apply_env_overrides(&mut settings);
    settings.validate_production()?;

    setup_logger(
        settings.level.clone(),
        vec![String::from("hyper"), String::from("reqwest")],
    )?;

    let application = Application::build(settings).await?;
    application.run_until_stopped().await?;
    Ok(())
}
