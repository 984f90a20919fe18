//! playrate-sim: run the whole three-party stack over the in-memory browser
//! as one scripted session, with tracing output showing every handshake.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use playrate_extension::{
    AgentConfig, ConfigFile, ContentAgent, Coordinator, CoordinatorConfig, Popup,
};
use playrate_runtime::{MemoryBrowser, MemoryPage, Page, Runtime, Video};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config_path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "playrate.toml".to_string());
    tracing::info!("Loading configuration from: {}", config_path);

    let mut config = ConfigFile::load_or_default(&config_path)?;
    config.validate()?;
    // Keep the scripted session brisk regardless of the configured tick.
    config.poll.interval_ms = config.poll.interval_ms.min(200);

    let (browser, events) = MemoryBrowser::new(config.poll.response_timeout());
    let runtime: Arc<dyn Runtime> = browser.clone();
    let background = browser.register_background();
    Coordinator::spawn(
        runtime.clone(),
        CoordinatorConfig::from_config(&config),
        events,
        background,
    );
    tracing::info!("🚀 coordinator running, starting scripted session");

    let watch_url = format!("https://www.{}?v=dQw4w9WgXcQ", config.site.watch_fragment);
    let agent_config = AgentConfig::from_config(&config);

    // 1. Open a watch tab. The page is still loading, so the coordinator's
    //    injection poll has to retry before the agent answers.
    let tab = browser.open_tab(&watch_url);
    let page = MemoryPage::bare(&watch_url);
    tokio::time::sleep(config.poll.interval() * 2).await;
    page.attach_player();
    let agent = ContentAgent::attach(
        runtime.clone(),
        page.clone(),
        agent_config.clone(),
        browser.register_content(tab),
    );
    wait_for_controls(&page).await?;
    tracing::info!(
        "controls installed; injected stylesheets: {:?}",
        browser.injected_css(tab)
    );

    // 2. Click through the controls.
    agent.click_increase();
    agent.click_increase();
    agent.click_decrease();
    let video = page.video().expect("video present");
    tracing::info!("rate after clicks: {}", video.playback_rate());

    // 3. Popup: bigger steps, persistence on.
    let mut popup = Popup::open(runtime.clone()).await?;
    tracing::info!(
        "popup opened with decrease={} increase={}",
        popup.decrease_input(),
        popup.increase_input()
    );
    popup.set_decrease_input("0.5");
    popup.set_increase_input("0.5");
    popup.set_persist_checked(true);
    popup.save().await?;
    tracing::info!("popup saved and closed: {}", popup.is_closed());

    tokio::time::sleep(Duration::from_millis(100)).await;
    agent.click_increase();
    tokio::time::sleep(Duration::from_millis(100)).await;
    tracing::info!("rate reported upward: {}", video.playback_rate());

    // 4. Same-tab navigation to another video: the fresh element comes up at
    //    rate 1 until the injection handshake restores the persisted rate.
    let next_url = format!("https://www.{}?v=oHg5SJYRHA0", config.site.watch_fragment);
    page.replace_video(&next_url);
    browser.navigate(tab, &next_url);
    tokio::time::sleep(config.poll.interval() * 2).await;
    tracing::info!(
        "rate restored after navigation: {}",
        page.video().expect("video present").playback_rate()
    );

    // 5. Page refresh: no tab event fires; a fresh agent pulls settings by
    //    itself.
    browser.refresh(tab);
    drop(agent);
    let fresh_page = MemoryPage::watch(&next_url);
    let _agent = ContentAgent::attach(
        runtime,
        fresh_page.clone(),
        agent_config,
        browser.register_content(tab),
    );
    wait_for_controls(&fresh_page).await?;
    tracing::info!(
        "self-initiated after refresh; rate restored: {}",
        fresh_page.video().expect("video present").playback_rate()
    );

    tracing::info!("session complete");
    Ok(())
}

async fn wait_for_controls(page: &Arc<MemoryPage>) -> Result<()> {
    for _ in 0..200 {
        if page.controls_present() {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    anyhow::bail!("controls never appeared")
}
