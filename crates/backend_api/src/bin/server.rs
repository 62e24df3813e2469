use ai_client::{LlmClient, LlmClientConfig, SavingsAdvisor};
use backend_api::{run_server, AppState};
use services::{
    AnalysisStore, AuthConfig, AuthService, InMemorySavingsActor, PriceService,
    StaticIdentityProvider, TaskScope,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // SAVR_SETTINGS points at a settings file; otherwise settings.json is tried
    let settings_path = std::env::var("SAVR_SETTINGS").ok().map(PathBuf::from);
    let settings = settings_loader::load_settings_or_default(settings_path.as_ref())?;

    println!("SAVR API Server");
    println!("===============");
    println!("Canister: {}", settings.canister_id);
    println!("Identity provider: {}", settings.identity_provider_url);
    println!("Price API: {}", settings.price.api_url);
    println!("Listening on: {}:{}", settings.server.host, settings.server.port);
    println!();

    let actor = Arc::new(InMemorySavingsActor::new());
    let auth = AuthService::new(
        AuthConfig {
            identity_provider_url: settings.identity_provider_url.clone(),
            canister_id: settings.canister_id.clone(),
        },
        Arc::new(StaticIdentityProvider::new(settings.dev_principal.clone())),
        actor,
    );
    auth.init().await?;

    let llm_config = LlmClientConfig::from_settings(&settings.llm);
    let client = if llm_config.api_key.is_some() {
        Some(LlmClient::new(llm_config)?)
    } else {
        eprintln!("[WARN] {} not set; goal analysis will use default content", ai_client::API_KEY_ENV);
        None
    };

    let price = Arc::new(PriceService::new(
        &settings.price,
        settings_loader::secret(services::price::PRICE_API_KEY_ENV),
    )?);

    let analysis = match &settings.analysis_cache_dir {
        Some(dir) => AnalysisStore::with_mirror(dir)?,
        None => AnalysisStore::in_memory(),
    };

    let scope = Arc::new(TaskScope::new());
    price.spawn_refresher(&scope, Duration::from_secs(settings.price.refresh_interval_secs.max(1)));

    let state = AppState {
        auth: Arc::new(auth),
        price,
        analysis: Arc::new(analysis),
        advisor: Arc::new(SavingsAdvisor::new(client)),
        scope,
        price_max_age: Duration::from_secs(settings.price.max_age_secs),
    };

    run_server(state, &settings.server.host, settings.server.port).await?;

    Ok(())
}
