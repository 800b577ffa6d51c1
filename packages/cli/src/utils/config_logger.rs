use tracing::info;

pub fn log_config(config: &crate::config::Config) {
    info!(
        "Config settings: network={}, root={}, secure={}, reconnect={}, socket_timeout={}ms, heartbeat_interval={}ms",
        config.network,
        config.root,
        !config.insecure,
        config.reconnect,
        config.socket_timeout,
        config.heartbeat_interval
    );

    if config.apikey.is_empty() {
        info!("No API key configured, requests are anonymous");
    } else {
        info!("API key configured ({} characters)", config.apikey.len());
    }
}
