// src/config.rs
use std::env;

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub storage_url: String,
    pub storage_service_key: String,
    pub llm_url: String,
    pub llm_api_key: String,
    pub llm_model: String,
    pub llm_temperature: f32,
    pub llm_json_mode: bool,
    pub embedding_url: String,
    pub embedding_api_key: String,
    pub embedding_model: String,
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

impl ApiConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let host = var_or("BACKEND_HOST", "127.0.0.1");
        let port = var_or("BACKEND_PORT", "3010")
            .parse()
            .expect("BACKEND_PORT must be a valid u16");
        let llm_temperature = var_or("LLM_TEMPERATURE", "0.1")
            .parse()
            .expect("LLM_TEMPERATURE must be a valid f32");
        let llm_json_mode = var_or("LLM_JSON_MODE", "false")
            .to_lowercase()
            .parse()
            .unwrap_or(false);

        Self {
            host,
            port,
            database_path: var_or("DOCPIPE_DB", "docpipe.db"),
            storage_url: var_or("STORAGE_URL", "http://127.0.0.1:8000/storage/v1"),
            storage_service_key: var_or("STORAGE_SERVICE_KEY", ""),
            llm_url: var_or("LLM_URL", "https://api.openai.com/v1"),
            llm_api_key: var_or("LLM_API_KEY", ""),
            llm_model: var_or("LLM_MODEL", "gpt-4o-mini"),
            llm_temperature,
            llm_json_mode,
            embedding_url: var_or("EMBEDDING_URL", "https://api.openai.com/v1"),
            embedding_api_key: var_or("EMBEDDING_API_KEY", ""),
            embedding_model: var_or("EMBEDDING_MODEL", "text-embedding-3-small"),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
