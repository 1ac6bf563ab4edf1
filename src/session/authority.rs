//! Client access to the duel authority, bound to one caller.

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::{
    dto::duel::{
        AnswerRequest, AnswerResponse, DuelResponse, FinishRequest, FinishResponse, StartResponse,
    },
    services::duel_service,
    session::error::SessionError,
    state::SharedState,
};

/// Authority operations as seen by one participant.
pub trait AuthorityClient: Send + Sync {
    fn start(&self, duel_id: Uuid) -> BoxFuture<'static, Result<StartResponse, SessionError>>;
    fn answer(
        &self,
        duel_id: Uuid,
        request: AnswerRequest,
    ) -> BoxFuture<'static, Result<AnswerResponse, SessionError>>;
    fn finish(
        &self,
        duel_id: Uuid,
        request: FinishRequest,
    ) -> BoxFuture<'static, Result<FinishResponse, SessionError>>;
    fn forfeit(&self, duel_id: Uuid) -> BoxFuture<'static, Result<FinishResponse, SessionError>>;
    fn get(&self, duel_id: Uuid) -> BoxFuture<'static, Result<DuelResponse, SessionError>>;
}

/// Calls the service layer in-process.
#[derive(Clone)]
pub struct LocalAuthorityClient {
    state: SharedState,
    user_id: Uuid,
}

impl LocalAuthorityClient {
    pub fn new(state: SharedState, user_id: Uuid) -> Self {
        Self { state, user_id }
    }
}

impl AuthorityClient for LocalAuthorityClient {
    fn start(&self, duel_id: Uuid) -> BoxFuture<'static, Result<StartResponse, SessionError>> {
        let client = self.clone();
        Box::pin(async move { Ok(duel_service::start(&client.state, duel_id, client.user_id).await?) })
    }

    fn answer(
        &self,
        duel_id: Uuid,
        request: AnswerRequest,
    ) -> BoxFuture<'static, Result<AnswerResponse, SessionError>> {
        let client = self.clone();
        Box::pin(async move {
            Ok(duel_service::answer(&client.state, duel_id, client.user_id, request).await?)
        })
    }

    fn finish(
        &self,
        duel_id: Uuid,
        request: FinishRequest,
    ) -> BoxFuture<'static, Result<FinishResponse, SessionError>> {
        let client = self.clone();
        Box::pin(async move {
            Ok(duel_service::finish(&client.state, duel_id, client.user_id, request).await?)
        })
    }

    fn forfeit(&self, duel_id: Uuid) -> BoxFuture<'static, Result<FinishResponse, SessionError>> {
        let client = self.clone();
        Box::pin(
            async move { Ok(duel_service::forfeit(&client.state, duel_id, client.user_id).await?) },
        )
    }

    fn get(&self, duel_id: Uuid) -> BoxFuture<'static, Result<DuelResponse, SessionError>> {
        let client = self.clone();
        Box::pin(async move { Ok(duel_service::get(&client.state, duel_id, client.user_id).await?) })
    }
}

#[cfg(feature = "http")]
pub use self::http::HttpAuthorityClient;

#[cfg(feature = "http")]
mod http {
    use reqwest::{Method, RequestBuilder};
    use serde::{Serialize, de::DeserializeOwned};

    use super::*;
    use crate::{error::ErrorBody, routes::caller::CALLER_HEADER};

    /// Talks to the authority's HTTP surface, identifying as `user_id`.
    #[derive(Clone)]
    pub struct HttpAuthorityClient {
        client: reqwest::Client,
        base_url: String,
        user_id: Uuid,
    }

    impl HttpAuthorityClient {
        /// `base_url` is the server root, e.g. `http://localhost:8080`.
        pub fn new(base_url: impl Into<String>, user_id: Uuid) -> Self {
            Self {
                client: reqwest::Client::new(),
                base_url: base_url.into().trim_end_matches('/').to_string(),
                user_id,
            }
        }

        fn request(&self, method: Method, path: &str) -> RequestBuilder {
            self.client
                .request(method, format!("{}{}", self.base_url, path))
                .header(CALLER_HEADER, self.user_id.to_string())
        }

        fn post<B, T>(&self, path: String, body: Option<B>) -> BoxFuture<'static, Result<T, SessionError>>
        where
            B: Serialize + Send + 'static,
            T: DeserializeOwned + Send + 'static,
        {
            let mut request = self.request(Method::POST, &path);
            if let Some(body) = body {
                request = request.json(&body);
            }
            Box::pin(execute(request))
        }
    }

    async fn execute<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, SessionError> {
        let response = request.send().await?;
        if response.status().is_success() {
            return Ok(response.json().await?);
        }
        let status = response.status();
        match response.json::<ErrorBody>().await {
            Ok(body) => Err(SessionError::Rejected {
                code: body.code,
                message: body.message,
            }),
            Err(_) => Err(SessionError::Rejected {
                code: if status.is_server_error() {
                    crate::error::ErrorCode::Internal
                } else {
                    crate::error::ErrorCode::InvalidInput
                },
                message: format!("authority answered {status}"),
            }),
        }
    }

    impl AuthorityClient for HttpAuthorityClient {
        fn start(&self, duel_id: Uuid) -> BoxFuture<'static, Result<StartResponse, SessionError>> {
            self.post::<(), _>(format!("/duels/{duel_id}/start"), None)
        }

        fn answer(
            &self,
            duel_id: Uuid,
            request: AnswerRequest,
        ) -> BoxFuture<'static, Result<AnswerResponse, SessionError>> {
            self.post(format!("/duels/{duel_id}/answers"), Some(request))
        }

        fn finish(
            &self,
            duel_id: Uuid,
            request: FinishRequest,
        ) -> BoxFuture<'static, Result<FinishResponse, SessionError>> {
            self.post(format!("/duels/{duel_id}/finish"), Some(request))
        }

        fn forfeit(
            &self,
            duel_id: Uuid,
        ) -> BoxFuture<'static, Result<FinishResponse, SessionError>> {
            self.post::<(), _>(format!("/duels/{duel_id}/forfeit"), None)
        }

        fn get(&self, duel_id: Uuid) -> BoxFuture<'static, Result<DuelResponse, SessionError>> {
            let request = self.request(Method::GET, &format!("/duels/{duel_id}"));
            Box::pin(execute(request))
        }
    }
}
