use anyhow::{Result, anyhow};
use reqwest::{
    Client,
    header::{HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION},
    Method,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, error};

use shared_config::AppConfig;

use crate::query::QueryBuilder;

pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            anon_key: config.supabase_anon_key.clone(),
        }
    }

    fn get_headers(&self, auth_token: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();

        if let Ok(value) = HeaderValue::from_str(&self.anon_key) {
            headers.insert("apikey", value);
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(token) = auth_token {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", token)) {
                headers.insert(AUTHORIZATION, value);
            }
        }

        headers
    }

    pub async fn request<T>(&self, method: Method, path: &str,
                            auth_token: Option<&str>, body: Option<Value>)
                            -> Result<T>
    where T: DeserializeOwned {
        self.request_with_headers(method, path, auth_token, body, None).await
    }

    pub async fn request_with_headers<T>(
        &self,
        method: Method,
        path: &str,
        auth_token: Option<&str>,
        body: Option<Value>,
        extra_headers: Option<HeaderMap>,
    ) -> Result<T>
    where T: DeserializeOwned {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making {} request to {}", method, url);

        let mut headers = self.get_headers(auth_token);
        if let Some(extra) = extra_headers {
            headers.extend(extra);
        }

        let mut req = self.client.request(method, &url)
            .headers(headers);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            error!("API error ({}): {}", status, error_text);

            return Err(match status.as_u16() {
                401 | 403 => anyhow!("Authentication error: {}", error_text),
                404 => anyhow!("Resource not found: {}", error_text),
                409 => anyhow!("Conflict: {}", error_text),
                _ => anyhow!("API error ({}): {}", status, error_text),
            });
        }

        let data = response.json::<T>().await?;
        Ok(data)
    }

    fn representation_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));
        headers
    }

    pub async fn select<T>(&self, table: &str, query: &QueryBuilder, auth_token: &str) -> Result<Vec<T>>
    where T: DeserializeOwned {
        self.request(Method::GET, &query.path(table), Some(auth_token), None).await
    }

    pub async fn select_one<T>(&self, table: &str, query: &QueryBuilder, auth_token: &str) -> Result<Option<T>>
    where T: DeserializeOwned {
        let rows: Vec<T> = self.select(table, query, auth_token).await?;
        Ok(rows.into_iter().next())
    }

    /// Inserts a row and returns the stored representation.
    pub async fn insert<T>(&self, table: &str, row: Value, auth_token: &str) -> Result<T>
    where T: DeserializeOwned {
        let rows: Vec<T> = self.request_with_headers(
            Method::POST,
            &format!("/rest/v1/{}", table),
            Some(auth_token),
            Some(row),
            Some(Self::representation_headers()),
        ).await?;

        rows.into_iter()
            .next()
            .ok_or_else(|| anyhow!("Insert into {} returned no rows", table))
    }

    /// PATCHes every row matching `query`; returns the updated rows.
    pub async fn update<T>(&self, table: &str, query: &QueryBuilder, changes: Value, auth_token: &str) -> Result<Vec<T>>
    where T: DeserializeOwned {
        self.request_with_headers(
            Method::PATCH,
            &query.path(table),
            Some(auth_token),
            Some(changes),
            Some(Self::representation_headers()),
        ).await
    }

    pub async fn get_auth_user(&self, auth_token: &str) -> Result<Value> {
        self.request::<Value>(
            Method::GET,
            "/auth/v1/user",
            Some(auth_token),
            None,
        ).await
    }

    /// Exchanges a refresh token for a new session.
    pub async fn refresh_session(&self, refresh_token: &str) -> Result<Value> {
        self.request::<Value>(
            Method::POST,
            "/auth/v1/token?grant_type=refresh_token",
            None,
            Some(json!({ "refresh_token": refresh_token })),
        ).await
    }

    pub fn get_base_url(&self) -> &str {
        &self.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{MockServer, Mock, ResponseTemplate};
    use wiremock::matchers::{method, path, query_param, header};

    fn config_for(uri: &str) -> AppConfig {
        AppConfig {
            supabase_url: uri.to_string(),
            supabase_anon_key: "anon".to_string(),
            supabase_jwt_secret: "secret".to_string(),
            supabase_service_role_key: String::new(),
            stripe_secret_key: String::new(),
            stripe_webhook_secret: String::new(),
            stripe_api_base_url: String::new(),
            app_base_url: String::new(),
            telemedicine_base_url: String::new(),
            api_port: 3000,
        }
    }

    #[tokio::test]
    async fn test_select_sends_filters_and_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/locations"))
            .and(query_param("is_active", "eq.true"))
            .and(header("apikey", "anon"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}, {"id": 2}])))
            .mount(&server)
            .await;

        let client = SupabaseClient::new(&config_for(&server.uri()));
        let rows: Vec<Value> = client
            .select("locations", &QueryBuilder::new().eq("is_active", true), "tok")
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_insert_returns_first_row() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/notifications"))
            .and(header("prefer", "return=representation"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([{"id": "n1"}])))
            .mount(&server)
            .await;

        let client = SupabaseClient::new(&config_for(&server.uri()));
        let row: Value = client.insert("notifications", json!({"title": "x"}), "tok").await.unwrap();
        assert_eq!(row["id"], "n1");
    }

    #[tokio::test]
    async fn test_not_found_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("missing"))
            .mount(&server)
            .await;

        let client = SupabaseClient::new(&config_for(&server.uri()));
        let err = client
            .select::<Value>("claims", &QueryBuilder::new(), "tok")
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Resource not found"));
    }
}
