use crate::config::Timeouts;
use reqwest::Client;

const USER_AGENT: &str = concat!("realtypost/", env!("CARGO_PKG_VERSION"));

pub fn build_client(timeouts: Timeouts) -> Client {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeouts.request)
        .connect_timeout(timeouts.connect)
        .build()
        .unwrap_or_else(|_| Client::new())
}
