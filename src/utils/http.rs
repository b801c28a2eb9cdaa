use once_cell::sync::Lazy;
use reqwest::Client;
use std::time::Duration;

// No overall request timeout: the placement resolver owns that decision.
static HTTP_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .build()
        .expect("Failed to build HTTP client")
});

pub fn get_http_client() -> &'static Client {
    &HTTP_CLIENT
}
