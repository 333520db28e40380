use mock_plex::MockPlex;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    let port = std::env::var("PORT").unwrap_or_else(|_| "32400".to_string());
    let token = std::env::var("PLEX_MOCK_TOKEN").unwrap_or_else(|_| "mock-token".to_string());
    let addr = format!("127.0.0.1:{port}");

    let mock = MockPlex::new(&token)
        .with_account("plex", "plex", "signed-in-token")
        .with_section("1", "Movies", "movie", 237)
        .with_section("2", "TV Shows", "show", 42);

    let listener = TcpListener::bind(&addr).await?;
    println!("mock Plex listening on {addr} (token {token})");
    mock_plex::run(listener, mock).await
}
