#[tokio::main]
async fn main() {
    nft_amm::start(std::env::args()).await;
}
