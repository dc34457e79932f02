//! Server access for effects. [`CookbookBackend`] is the seam: effects only
//! see this trait, and [`HttpBackend`] speaks the server's JSON API.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::{de::DeserializeOwned, Serialize};
use shared::{
    domain::{Recipe, RecipeFields, RecipeId, TaskId, UserId},
    error::ApiError,
    protocol::{
        CreateSubtaskRequest, CreateTaskListRequest, LoginRequest, LoginResponse, RecipeCommand,
        RecipeCommandResult, RenameTaskRequest, TaskInfo,
    },
};
use tracing::{debug, info};

use crate::error::{code_for_status, ClientError};

#[async_trait]
pub trait CookbookBackend: Send + Sync {
    async fn list_recipes(&self) -> Result<Vec<Recipe>, ApiError>;
    async fn get_recipe(&self, id: RecipeId) -> Result<Recipe, ApiError>;
    async fn create_recipe(&self, fields: RecipeFields) -> Result<Recipe, ApiError>;
    async fn update_recipe(&self, id: RecipeId, fields: RecipeFields) -> Result<Recipe, ApiError>;
    async fn delete_recipe(&self, id: RecipeId) -> Result<(), ApiError>;
    async fn recipe_command(
        &self,
        id: RecipeId,
        command: RecipeCommand,
    ) -> Result<RecipeCommandResult, ApiError>;

    async fn list_task_lists(&self) -> Result<Vec<TaskInfo>, ApiError>;
    async fn create_task_list(&self, name: &str) -> Result<TaskInfo, ApiError>;
    async fn get_subtasks(&self, parent: TaskId) -> Result<Vec<TaskInfo>, ApiError>;
    async fn create_subtask(
        &self,
        parent: TaskId,
        name: &str,
        after: Option<TaskId>,
    ) -> Result<TaskInfo, ApiError>;
    async fn rename_task(&self, id: TaskId, name: &str) -> Result<TaskInfo, ApiError>;
    async fn delete_task(&self, id: TaskId) -> Result<(), ApiError>;
    async fn complete_task(&self, id: TaskId) -> Result<(), ApiError>;
}

#[derive(Debug, Clone)]
pub struct HttpBackend {
    http: Client,
    base: Url,
    user_id: UserId,
}

impl HttpBackend {
    pub fn new(server_url: &str, user_id: UserId) -> Result<Self, ClientError> {
        Ok(Self {
            http: Client::new(),
            base: parse_base(server_url)?,
            user_id,
        })
    }

    /// Logs in as `username` and returns a backend acting as that user.
    pub async fn login(server_url: &str, username: &str) -> Result<Self, ClientError> {
        let mut backend = Self::new(server_url, UserId(0))?;
        let url = backend.url("login")?;
        let response: LoginResponse = read_json(
            backend.http.post(url).json(&LoginRequest {
                username: username.to_string(),
            }),
        )
        .await?;
        backend.user_id = response.user_id;
        info!(user_id = %backend.user_id, "logged in");
        Ok(backend)
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    fn url(&self, path: &str) -> Result<Url, ClientError> {
        self.base.join(path).map_err(|source| ClientError::InvalidUrl {
            url: format!("{}{path}", self.base),
            source,
        })
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ClientError> {
        let url = self.url(path)?;
        debug!(%method, %url, "api request");
        Ok(self
            .http
            .request(method, url)
            .query(&[("user_id", self.user_id.0)]))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        Ok(read_json(self.request(Method::GET, path)?).await?)
    }

    async fn send<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        Ok(read_json(self.request(method, path)?.json(body)).await?)
    }

    async fn send_empty(&self, method: Method, path: &str) -> Result<(), ApiError> {
        read_body(self.request(method, path)?).await?;
        Ok(())
    }
}

fn parse_base(server_url: &str) -> Result<Url, ClientError> {
    let normalized = if server_url.ends_with('/') {
        server_url.to_string()
    } else {
        format!("{server_url}/")
    };
    Url::parse(&normalized).map_err(|source| ClientError::InvalidUrl {
        url: server_url.to_string(),
        source,
    })
}

/// Sends the request; a non-2xx answer becomes the server's [`ApiError`], or
/// one derived from the status when the body is not one.
async fn read_body(request: RequestBuilder) -> Result<Vec<u8>, ClientError> {
    let response = request.send().await?;
    let status = response.status();
    let bytes = response.bytes().await?;
    if !status.is_success() {
        let err = serde_json::from_slice::<ApiError>(&bytes).unwrap_or_else(|_| {
            let body = String::from_utf8_lossy(&bytes);
            ApiError::new(code_for_status(status), format!("{status}: {}", body.trim()))
        });
        return Err(ClientError::Api(err));
    }
    Ok(bytes.to_vec())
}

async fn read_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, ClientError> {
    let bytes = read_body(request).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[async_trait]
impl CookbookBackend for HttpBackend {
    async fn list_recipes(&self) -> Result<Vec<Recipe>, ApiError> {
        self.get("api/recipe").await
    }

    async fn get_recipe(&self, id: RecipeId) -> Result<Recipe, ApiError> {
        self.get(&format!("api/recipe/{id}")).await
    }

    async fn create_recipe(&self, fields: RecipeFields) -> Result<Recipe, ApiError> {
        self.send(Method::POST, "api/recipe", &fields).await
    }

    async fn update_recipe(&self, id: RecipeId, fields: RecipeFields) -> Result<Recipe, ApiError> {
        self.send(Method::PUT, &format!("api/recipe/{id}"), &fields)
            .await
    }

    async fn delete_recipe(&self, id: RecipeId) -> Result<(), ApiError> {
        self.send_empty(Method::DELETE, &format!("api/recipe/{id}"))
            .await
    }

    async fn recipe_command(
        &self,
        id: RecipeId,
        command: RecipeCommand,
    ) -> Result<RecipeCommandResult, ApiError> {
        self.send(Method::POST, &format!("api/recipe/{id}/_actions"), &command)
            .await
    }

    async fn list_task_lists(&self) -> Result<Vec<TaskInfo>, ApiError> {
        self.get("api/tasks").await
    }

    async fn create_task_list(&self, name: &str) -> Result<TaskInfo, ApiError> {
        let body = CreateTaskListRequest {
            name: name.to_string(),
        };
        self.send(Method::POST, "api/tasks", &body).await
    }

    async fn get_subtasks(&self, parent: TaskId) -> Result<Vec<TaskInfo>, ApiError> {
        self.get(&format!("api/tasks/{parent}/subtasks")).await
    }

    async fn create_subtask(
        &self,
        parent: TaskId,
        name: &str,
        after: Option<TaskId>,
    ) -> Result<TaskInfo, ApiError> {
        let body = CreateSubtaskRequest {
            name: name.to_string(),
            after,
        };
        self.send(Method::POST, &format!("api/tasks/{parent}/subtasks"), &body)
            .await
    }

    async fn rename_task(&self, id: TaskId, name: &str) -> Result<TaskInfo, ApiError> {
        let body = RenameTaskRequest {
            name: name.to_string(),
        };
        self.send(Method::PUT, &format!("api/tasks/{id}/name"), &body)
            .await
    }

    async fn delete_task(&self, id: TaskId) -> Result<(), ApiError> {
        self.send_empty(Method::DELETE, &format!("api/tasks/{id}"))
            .await
    }

    async fn complete_task(&self, id: TaskId) -> Result<(), ApiError> {
        self.send_empty(Method::POST, &format!("api/tasks/{id}/complete"))
            .await
    }
}

#[cfg(test)]
#[path = "tests/backend_tests.rs"]
mod tests;
