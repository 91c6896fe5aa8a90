// docpipe/src/main.rs
use std::sync::{Arc, Mutex};

use docpipe::api::start_api_server;
use docpipe::chunker::SemanticChunker;
use docpipe::config::ApiConfig;
use docpipe::db::documents::DocumentStore;
use docpipe::db::schema_init::SchemaInitializer;
use docpipe::embedder::HttpEmbeddingProvider;
use docpipe::extractor::PdfExtractor;
use docpipe::fetcher::HttpStorageClient;
use docpipe::llm::OpenAiChatProvider;
use docpipe::pipeline::Pipeline;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = ApiConfig::from_env();

    println!("📦 Initializing database at {}...", config.database_path);
    let db_conn = Arc::new(Mutex::new(
        rusqlite::Connection::open(&config.database_path).expect("Failed to open database"),
    ));
    {
        let conn = db_conn.lock().unwrap();
        SchemaInitializer::init(&conn).expect("Failed to initialize schema");
    }

    let storage = Arc::new(HttpStorageClient::new(
        config.storage_url.clone(),
        config.storage_service_key.clone(),
    ));
    let llm = Arc::new(
        OpenAiChatProvider::new(
            config.llm_url.clone(),
            config.llm_api_key.clone(),
            config.llm_model.clone(),
            config.llm_temperature,
        )
        .with_json_mode(config.llm_json_mode),
    );
    let embedder = Arc::new(HttpEmbeddingProvider::new(
        config.embedding_url.clone(),
        config.embedding_api_key.clone(),
        config.embedding_model.clone(),
    ));

    let pipeline = Pipeline::new(
        storage,
        Arc::new(PdfExtractor),
        SemanticChunker::new(llm),
        embedder,
        DocumentStore::new(db_conn),
    );

    println!("🚀 Starting API server on http://{} ...", config.bind_addr());
    start_api_server(&config, pipeline).await
}
