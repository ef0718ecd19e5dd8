use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::error::ClientError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteBook {
    pub id: i64,
    pub title: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub authors: Vec<Author>,
    pub isbn: Option<String>,
    pub isbn10: Option<String>,
    pub isbn13: Option<String>,
    pub publisher: Option<String>,
    pub published_date: Option<String>,
    pub page_count: Option<u32>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub categories: Vec<String>,
    pub metadata: Option<RemoteMetadata>,
}

/// BookLore sends `null` rather than `[]` for some empty lists.
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteMetadata {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub categories: Vec<String>,
}

impl RemoteBook {
    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or("")
    }

    pub fn primary_author(&self) -> Option<&str> {
        self.authors.first().map(|a| a.name.as_str())
    }

    /// Categories currently on the book, whether BookLore reports them at
    /// the top level or inside `metadata`.
    pub fn categories(&self) -> Vec<String> {
        let nested = self.metadata.iter().flat_map(|m| m.categories.iter());
        let mut all: Vec<String> = Vec::new();
        for category in self.categories.iter().chain(nested) {
            if !all.contains(category) {
                all.push(category.clone());
            }
        }
        all
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shelf {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Library {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginTokens {
    access_token: String,
    refresh_token: Option<String>,
}

/// The calls tag reconciliation makes against the library.
pub trait LibraryApi {
    fn get_book(&self, book_id: i64, with_description: bool) -> Result<RemoteBook, ClientError>;
    fn get_shelves(&self) -> Result<Vec<Shelf>, ClientError>;
    fn create_shelf(&self, name: &str) -> Result<Shelf, ClientError>;
    fn assign_books_to_shelf(&self, shelf_id: i64, book_ids: &[i64]) -> Result<(), ClientError>;
    fn update_book_metadata(
        &self,
        book_id: i64,
        categories: &[String],
        merge_categories: bool,
    ) -> Result<(), ClientError>;
}

/// Blocking client for the BookLore REST API. Calls are never retried.
pub struct LibraryClient {
    http: Client,
    base_url: String,
    access_token: Option<String>,
    refresh_token: Option<String>,
}

impl LibraryClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: None,
            refresh_token: None,
        })
    }

    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some()
    }

    fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<T, ClientError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("{} {}", method, url);

        let mut request = self
            .http
            .request(method, &url)
            .header(CONTENT_TYPE, "application/json");
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send()?;
        let status = response.status();
        let text = response.text()?;
        if !status.is_success() {
            return Err(ClientError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        let value: Value = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text)?
        };
        // Most endpoints wrap their payload as {"status": .., "data": ..}.
        let payload = match value {
            Value::Object(mut map) => match map.remove("data") {
                Some(data) => data,
                None => Value::Object(map),
            },
            other => other,
        };
        Ok(serde_json::from_value(payload)?)
    }

    pub fn login(&mut self, username: &str, password: &str) -> Result<(), ClientError> {
        let body = json!({ "username": username, "password": password });
        let tokens: LoginTokens =
            self.request(Method::POST, "/api/v1/auth/login", &[], Some(&body))?;
        self.access_token = Some(tokens.access_token);
        self.refresh_token = tokens.refresh_token;
        debug!("Logged in as {} (refresh token: {})", username, self.refresh_token.is_some());
        Ok(())
    }

    pub fn get_books(&self, with_description: bool) -> Result<Vec<RemoteBook>, ClientError> {
        self.request(Method::GET, "/api/v1/books", description_query(with_description), None)
    }

    pub fn get_libraries(&self) -> Result<Vec<Library>, ClientError> {
        self.request(Method::GET, "/api/v1/libraries", &[], None)
    }
}

fn description_query(with_description: bool) -> &'static [(&'static str, &'static str)] {
    if with_description {
        &[("withDescription", "true")]
    } else {
        &[]
    }
}

impl LibraryApi for LibraryClient {
    fn get_book(&self, book_id: i64, with_description: bool) -> Result<RemoteBook, ClientError> {
        let path = format!("/api/v1/books/{}", book_id);
        self.request(Method::GET, &path, description_query(with_description), None)
    }

    fn get_shelves(&self) -> Result<Vec<Shelf>, ClientError> {
        self.request(Method::GET, "/api/v1/shelves", &[], None)
    }

    fn create_shelf(&self, name: &str) -> Result<Shelf, ClientError> {
        let body = json!({ "name": name });
        self.request(Method::POST, "/api/v1/shelves", &[], Some(&body))
    }

    fn assign_books_to_shelf(&self, shelf_id: i64, book_ids: &[i64]) -> Result<(), ClientError> {
        let body = json!({ "shelfId": shelf_id, "bookIds": book_ids });
        let _: Value = self.request(Method::POST, "/api/v1/books/shelves", &[], Some(&body))?;
        Ok(())
    }

    fn update_book_metadata(
        &self,
        book_id: i64,
        categories: &[String],
        merge_categories: bool,
    ) -> Result<(), ClientError> {
        let path = format!("/api/v1/books/{}/metadata", book_id);
        let merge = if merge_categories { "true" } else { "false" };
        let body = json!({ "categories": categories });
        let _: Value = self.request(Method::PUT, &path, &[("mergeCategories", merge)], Some(&body))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount_login(server: &MockServer, token: &str) {
        Mock::given(method("POST"))
            .and(path("/api/v1/auth/login"))
            .and(body_json(json!({ "username": "user", "password": "pass" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": 200,
                "data": { "accessToken": token, "refreshToken": "ref" }
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_login_then_get_books_with_bearer() {
        let server = MockServer::start().await;
        mount_login(&server, "my-token").await;
        Mock::given(method("GET"))
            .and(path("/api/v1/books"))
            .and(header("authorization", "Bearer my-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": 200,
                "data": [
                    { "id": 1, "title": "Book One", "authors": [{ "name": "Author A" }], "isbn": "111" },
                    { "id": 2, "title": "Book Two", "authors": [{ "name": "Author B" }], "isbn": "222" }
                ]
            })))
            .mount(&server)
            .await;

        let uri = server.uri();
        let (authenticated, books) = tokio::task::spawn_blocking(move || {
            let mut client = LibraryClient::new(&uri)?;
            client.login("user", "pass")?;
            Ok::<_, ClientError>((client.is_authenticated(), client.get_books(false)?))
        })
        .await
        .unwrap()
        .unwrap();

        assert!(authenticated);
        assert_eq!(books.len(), 2);
        assert_eq!(books[0].title(), "Book One");
        assert_eq!(books[1].primary_author(), Some("Author B"));
    }

    #[tokio::test]
    async fn test_error_status_carries_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/shelves"))
            .respond_with(ResponseTemplate::new(404).set_body_string(r#"{"error":"not found"}"#))
            .mount(&server)
            .await;

        let uri = server.uri();
        let result = tokio::task::spawn_blocking(move || LibraryClient::new(&uri)?.get_shelves())
            .await
            .unwrap();

        match result {
            Err(ClientError::Api { status, body }) => {
                assert_eq!(status, 404);
                assert!(body.contains("not found"));
            }
            other => panic!("expected API error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_shelves_and_unwrapped_payloads() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/shelves"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "id": 1, "name": "Currently Reading" },
                { "id": 2, "name": "Favorites" }
            ])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/shelves"))
            .and(body_json(json!({ "name": "Slow Burn" })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": 9, "name": "Slow Burn" })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/books/shelves"))
            .and(body_json(json!({ "shelfId": 9, "bookIds": [1, 2] })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let uri = server.uri();
        let (shelves, created) = tokio::task::spawn_blocking(move || {
            let client = LibraryClient::new(&format!("{}/", uri))?;
            let shelves = client.get_shelves()?;
            let created = client.create_shelf("Slow Burn")?;
            client.assign_books_to_shelf(created.id, &[1, 2])?;
            Ok::<_, ClientError>((shelves, created))
        })
        .await
        .unwrap()
        .unwrap();

        assert_eq!(shelves.len(), 2);
        assert_eq!(created, Shelf { id: 9, name: "Slow Burn".to_string() });
    }

    #[tokio::test]
    async fn test_get_book_and_update_metadata() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/books/7"))
            .and(query_param("withDescription", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 7,
                "title": "Tagged",
                "metadata": { "categories": ["Romance", "slow-burn"] }
            })))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/api/v1/books/7/metadata"))
            .and(query_param("mergeCategories", "true"))
            .and(body_json(json!({ "categories": ["dark"] })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 7 })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/libraries"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{ "id": 1, "name": "Main" }]
            })))
            .mount(&server)
            .await;

        let uri = server.uri();
        let (book, libraries) = tokio::task::spawn_blocking(move || {
            let client = LibraryClient::new(&uri)?;
            let book = client.get_book(7, true)?;
            client.update_book_metadata(7, &["dark".to_string()], true)?;
            Ok::<_, ClientError>((book, client.get_libraries()?))
        })
        .await
        .unwrap()
        .unwrap();

        assert_eq!(book.categories(), vec!["Romance", "slow-burn"]);
        assert_eq!(libraries[0].name, "Main");
    }

    #[test]
    fn test_null_lists_decode_as_empty() {
        let books: Vec<RemoteBook> = serde_json::from_value(json!([
            { "id": 1, "title": "A", "authors": [{ "name": "X" }] },
            {
                "id": 2,
                "title": "B",
                "authors": null,
                "categories": null,
                "metadata": { "categories": null }
            }
        ]))
        .unwrap();

        assert_eq!(books.len(), 2);
        assert_eq!(books[0].primary_author(), Some("X"));
        assert!(books[1].authors.is_empty());
        assert_eq!(books[1].primary_author(), None);
        assert!(books[1].categories().is_empty());
    }
}
